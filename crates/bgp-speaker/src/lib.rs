// Copyright (C) 2023-present The NetGauze Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! BGP-4 peer session engine.
//!
//! [`session::Session`] is the RFC 4271 finite state machine for a single
//! connection, driven by [`events::BgpEvent`]s and talking to its
//! environment through the [`session::SessionServices`] traits.
//! [`peer::Peer`] pairs the main session with a tracked one to resolve
//! connection collisions, and [`runtime::SessionRunner`] drives a session
//! over a tokio byte stream.

#![deny(missing_debug_implementations)]
#![deny(rust_2018_idioms)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(clippy::clone_on_ref_ptr)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![forbid(unsafe_code)]

pub mod events;
pub mod fsm;
pub mod orf;
pub mod peer;
pub mod runtime;
pub mod session;
pub mod stats;

#[cfg(test)]
mod tests;
