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


//! Helpers shared by the unit tests of the wire crates.

use crate::{ring_buffer::RingBuffer, WritablePdu, WritablePduWithOneInput};
use std::fmt::Debug;

/// Concatenate wire fragments into a single buffer
pub fn combine(v: Vec<&[u8]>) -> Vec<u8> {
    v.iter()
        .flat_map(|x| x.iter())
        .cloned()
        .collect::<Vec<u8>>()
}

/// Build a [RingBuffer] holding exactly `input`
pub fn ring_from(input: &[u8]) -> RingBuffer {
    let mut ring = RingBuffer::with_capacity(input.len().max(64));
    let written = ring.write(input);
    assert_eq!(written, input.len());
    ring
}

/// Serialize `input` and check both the produced bytes and the reported
/// length
pub fn test_write<T: WritablePdu<E>, E: Eq + Debug>(input: &T, expected: &[u8]) -> Result<(), E> {
    let mut buf: Vec<u8> = vec![];
    let mut cursor = std::io::Cursor::new(&mut buf);
    input.write(&mut cursor)?;
    assert_eq!(buf, expected);
    assert_eq!(input.len(), expected.len());
    Ok(())
}

pub fn test_write_with_one_input<I: Clone, T: WritablePduWithOneInput<I, E>, E: Eq + Debug>(
    input: &T,
    extra: I,
    expected: &[u8],
) -> Result<(), E> {
    let mut buf: Vec<u8> = vec![];
    let mut cursor = std::io::Cursor::new(&mut buf);
    input.write(&mut cursor, extra.clone())?;
    assert_eq!(buf, expected);
    assert_eq!(input.len(extra), expected.len());
    Ok(())
}
