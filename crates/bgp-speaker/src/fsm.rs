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

//! States of the BGP peer finite state machine, see
//! [RFC4271 Section 8](https://datatracker.ietf.org/doc/html/rfc4271#section-8)

use peerwire_bgp_pkt::wire::serializer::BgpMessageWritingError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum FsmState {
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

impl FsmState {
    /// The OPEN message was sent and the session waits for or already has
    /// the peer's OPEN
    pub const fn is_opening(&self) -> bool {
        matches!(self, Self::OpenSent | Self::OpenConfirm)
    }
}

impl Display for FsmState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FsmState::Idle => write!(f, "Idle"),
            FsmState::Connect => write!(f, "Connect"),
            FsmState::Active => write!(f, "Active"),
            FsmState::OpenSent => write!(f, "OpenSent"),
            FsmState::OpenConfirm => write!(f, "OpenConfirm"),
            FsmState::Established => write!(f, "Established"),
        }
    }
}

/// Failures the FSM cannot turn into a protocol reaction by itself
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FsmStateError {
    BgpMessageWritingError(BgpMessageWritingError),
}

impl From<BgpMessageWritingError> for FsmStateError {
    fn from(value: BgpMessageWritingError) -> Self {
        FsmStateError::BgpMessageWritingError(value)
    }
}

impl Display for FsmStateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FsmStateError::BgpMessageWritingError(err) => {
                write!(f, "BgpMessageWritingError({err:?})")
            }
        }
    }
}

impl std::error::Error for FsmStateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(FsmState::OpenConfirm.to_string(), "OpenConfirm");
        assert!(FsmState::OpenSent.is_opening());
        assert!(!FsmState::Established.is_opening());
        let err = FsmStateError::from(BgpMessageWritingError::BgpMessageLengthOverflow(5000));
        assert_eq!(
            err.to_string(),
            "BgpMessageWritingError(BgpMessageLengthOverflow(5000))"
        );
    }
}
