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


//! Bounded circular byte buffer used as the single read primitive between a
//! transport connection and the message decoders.
//!
//! ```rust
//! use peerwire_parse_utils::ring_buffer::RingBuffer;
//!
//! let mut ring = RingBuffer::with_capacity(8);
//! assert_eq!(ring.write(&[0x00, 0x13, 0x04]), 3);
//! let snapshot = ring.take_snapshot();
//! assert_eq!(ring.read_u16(), Ok(19));
//! ring.restore_snapshot(&snapshot).unwrap();
//! assert_eq!(ring.bytes_available_to_read(), 3);
//! ```

use byteorder::{ByteOrder, NetworkEndian};
use bytes::Bytes;
use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RingBufferError {
    /// More bytes were requested than currently buffered
    Insufficient { requested: usize, available: usize },

    /// Rewinding further back than the bytes consumed since the consumed
    /// region was last overwritten
    RewindTooFar { requested: usize, rewindable: usize },

    /// New bytes were written after the snapshot was taken
    StaleSnapshot,

    /// The owned copy for a read couldn't be allocated
    AllocationFailed(usize),
}

impl Display for RingBufferError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insufficient {
                requested,
                available,
            } => write!(
                f,
                "requested {requested} bytes while only {available} are buffered"
            ),
            Self::RewindTooFar {
                requested,
                rewindable,
            } => write!(
                f,
                "cannot rewind {requested} bytes, only {rewindable} can be rewound"
            ),
            Self::StaleSnapshot => write!(f, "snapshot taken before the last write"),
            Self::AllocationFailed(len) => write!(f, "failed to allocate {len} bytes"),
        }
    }
}

impl std::error::Error for RingBufferError {}

/// Immutable capture of the buffer cursors, see
/// [RingBuffer::take_snapshot].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Snapshot {
    read: usize,
    write: usize,
    count: usize,
    rewindable: usize,
    generation: u64,
}

impl Snapshot {
    /// Number of bytes that were buffered when the snapshot was taken
    pub const fn available(&self) -> usize {
        self.count
    }
}

/// Fixed capacity circular byte buffer.
///
/// Invariant: `count == (write - read) mod capacity`, with `count ==
/// capacity` marking a full buffer when `read == write`.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Box<[u8]>,
    read: usize,
    write: usize,
    count: usize,
    /// Consumed bytes behind `read` that were not overwritten yet
    rewindable: usize,
    /// Bumped on every non-empty write, used to detect stale snapshots
    generation: u64,
}

impl RingBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            read: 0,
            write: 0,
            count: 0,
            rewindable: 0,
            generation: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub const fn bytes_available_to_read(&self) -> usize {
        self.count
    }

    pub fn free_space(&self) -> usize {
        self.capacity() - self.count
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drop all buffered data and reset the cursors
    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
        self.count = 0;
        self.rewindable = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Copy as much of `data` as fits into the free space, returning the
    /// number of bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(self.free_space());
        if len == 0 {
            return 0;
        }
        let capacity = self.capacity();
        let first = len.min(capacity - self.write);
        self.buf[self.write..self.write + first].copy_from_slice(&data[..first]);
        self.buf[..len - first].copy_from_slice(&data[first..len]);
        self.write = (self.write + len) % capacity;
        self.count += len;
        self.rewindable = self.rewindable.min(self.free_space());
        self.generation = self.generation.wrapping_add(1);
        len
    }

    #[inline]
    fn check_available(&self, requested: usize) -> Result<(), RingBufferError> {
        if requested > self.count {
            return Err(RingBufferError::Insufficient {
                requested,
                available: self.count,
            });
        }
        Ok(())
    }

    /// Copy `dst.len()` bytes without consuming them
    pub fn peek_into(&self, dst: &mut [u8]) -> Result<(), RingBufferError> {
        let len = dst.len();
        self.check_available(len)?;
        let capacity = self.capacity();
        let first = len.min(capacity - self.read);
        dst[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        dst[first..].copy_from_slice(&self.buf[..len - first]);
        Ok(())
    }

    /// Copy `dst.len()` bytes out and consume them
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<(), RingBufferError> {
        self.peek_into(dst)?;
        self.consume(dst.len());
        Ok(())
    }

    /// Read exactly `len` bytes into an owned buffer. The allocation is
    /// fallible so an oversized request is reported rather than aborting.
    pub fn read_fixed(&mut self, len: usize) -> Result<Bytes, RingBufferError> {
        self.check_available(len)?;
        let mut owned = Vec::new();
        owned
            .try_reserve_exact(len)
            .map_err(|_| RingBufferError::AllocationFailed(len))?;
        owned.resize(len, 0);
        self.read_into(&mut owned)?;
        Ok(Bytes::from(owned))
    }

    pub fn read_u8(&mut self) -> Result<u8, RingBufferError> {
        let mut tmp = [0u8; 1];
        self.read_into(&mut tmp)?;
        Ok(tmp[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, RingBufferError> {
        let mut tmp = [0u8; 2];
        self.read_into(&mut tmp)?;
        Ok(NetworkEndian::read_u16(&tmp))
    }

    pub fn read_u32(&mut self) -> Result<u32, RingBufferError> {
        let mut tmp = [0u8; 4];
        self.read_into(&mut tmp)?;
        Ok(NetworkEndian::read_u32(&tmp))
    }

    pub fn read_u128(&mut self) -> Result<u128, RingBufferError> {
        let mut tmp = [0u8; 16];
        self.read_into(&mut tmp)?;
        Ok(NetworkEndian::read_u128(&tmp))
    }

    /// Discard `len` bytes without copying them
    pub fn advance(&mut self, len: usize) -> Result<(), RingBufferError> {
        self.check_available(len)?;
        self.consume(len);
        Ok(())
    }

    /// Move the read cursor back over `len` already consumed bytes
    pub fn rewind(&mut self, len: usize) -> Result<(), RingBufferError> {
        if len > self.rewindable {
            return Err(RingBufferError::RewindTooFar {
                requested: len,
                rewindable: self.rewindable,
            });
        }
        let capacity = self.capacity();
        self.read = (self.read + capacity - len) % capacity;
        self.count += len;
        self.rewindable -= len;
        Ok(())
    }

    pub const fn take_snapshot(&self) -> Snapshot {
        Snapshot {
            read: self.read,
            write: self.write,
            count: self.count,
            rewindable: self.rewindable,
            generation: self.generation,
        }
    }

    /// Return the cursors to a previous [Snapshot]. Only valid as long as
    /// nothing was written in between.
    pub fn restore_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), RingBufferError> {
        if snapshot.generation != self.generation || snapshot.write != self.write {
            return Err(RingBufferError::StaleSnapshot);
        }
        self.read = snapshot.read;
        self.count = snapshot.count;
        self.rewindable = snapshot.rewindable;
        Ok(())
    }

    #[inline]
    fn consume(&mut self, len: usize) {
        self.read = (self.read + len) % self.capacity();
        self.count -= len;
        self.rewindable = (self.rewindable + len).min(self.free_space());
    }
}
