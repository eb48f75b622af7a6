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


//! Traits and primitives shared by the peerwire wire codecs.
//!
//! Two layers are provided:
//!   1. [ring_buffer::RingBuffer]: the bounded byte store a transport
//!      connection writes into. It is the only place where index arithmetic
//!      happens; all reads are bounds checked.
//!   2. nom helpers for decoding values that were already copied out of the
//!      ring buffer, together with the [ReadablePdu]/[WritablePdu] traits.

#![deny(missing_debug_implementations)]
#![deny(rust_2018_idioms)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![forbid(unsafe_code)]

pub mod ring_buffer;
#[cfg(feature = "test-helpers")]
pub mod test_helpers;

pub use nom;

use nom::{
    error::{ErrorKind, ParseError},
    IResult,
};
use std::fmt::Debug;

/// Generic trait for Readable Protocol Data Unit that doesn't need any external
/// input while parsing the packet.
pub trait ReadablePdu<'a, Error: Debug> {
    fn from_wire(buf: &'a [u8]) -> IResult<&'a [u8], Self, Error>
    where
        Self: Sized;
}

/// Generic trait Readable Protocol Data Unit that does need a single external
/// input
pub trait ReadablePduWithOneInput<'a, T, ErrorType> {
    fn from_wire(buf: &'a [u8], input: T) -> IResult<&'a [u8], Self, ErrorType>
    where
        Self: Sized;
}

/// Generic trait for Writable Protocol Data Unit that doesn't need any external
/// input while writing the packet.
#[allow(clippy::len_without_is_empty)]
pub trait WritablePdu<ErrorType> {
    const BASE_LENGTH: usize;

    /// The total length of the written buffer
    ///
    /// *Note*: the [`Self::len`] might be less than the length value written in
    /// the PDU, since most PDUs don't include the length of their 'length'
    /// field in the calculation
    fn len(&self) -> usize;

    fn write<T: std::io::Write>(&self, _writer: &mut T) -> Result<(), ErrorType>
    where
        Self: Sized;
}

/// Generic trait for Writable Protocol Data Unit that needs a single external
/// input (i.e., the negotiated AS number encoding) while writing the packet.
#[allow(clippy::len_without_is_empty)]
pub trait WritablePduWithOneInput<I, ErrorType> {
    const BASE_LENGTH: usize;

    /// The total length of the written buffer
    fn len(&self, input: I) -> usize;

    fn write<T: std::io::Write>(&self, _writer: &mut T, input: I) -> Result<(), ErrorType>
    where
        Self: Sized;
}

/// Implement [nom::error::ParseError] for an error enum that carries a
/// `NomError(ErrorKind)` variant, so the enum can be used directly as the
/// error type of nom parsers.
///
/// ```rust
/// use peerwire_parse_utils::{impl_nom_parse_error, nom::error::ErrorKind};
///
/// #[derive(Debug, PartialEq)]
/// pub enum OriginParsingError {
///     NomError(ErrorKind),
///     UndefinedOrigin(u8),
/// }
/// impl_nom_parse_error!(OriginParsingError);
/// ```
#[macro_export]
macro_rules! impl_nom_parse_error {
    ($error:ty) => {
        impl<I> $crate::nom::error::ParseError<I> for $error {
            fn from_error_kind(_input: I, kind: $crate::nom::error::ErrorKind) -> Self {
                Self::NomError(kind)
            }

            fn append(_input: I, _kind: $crate::nom::error::ErrorKind, other: Self) -> Self {
                other
            }
        }
    };
}

/// Run a nom parser over the whole of `buf`, treating leftover bytes as an
/// error. Used on values that have already been length delimited by an outer
/// TLV.
#[inline]
pub fn parse_complete<'a, O, E, F>(buf: &'a [u8], mut parser: F) -> Result<O, E>
where
    E: ParseError<&'a [u8]>,
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], O, E>,
{
    match parser(buf) {
        Ok((rest, value)) if rest.is_empty() => Ok(value),
        Ok((rest, _)) => Err(E::from_error_kind(rest, ErrorKind::Eof)),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Err(err),
        Err(nom::Err::Incomplete(_)) => Err(E::from_error_kind(buf, ErrorKind::Complete)),
    }
}

#[inline]
pub fn parse_till_empty<'a, T: ReadablePdu<'a, E>, E: Debug>(
    buf: &'a [u8],
) -> IResult<&'a [u8], Vec<T>, E> {
    let mut buf = buf;
    let mut ret = Vec::new();
    while !buf.is_empty() {
        let (tmp, element) = T::from_wire(buf)?;
        ret.push(element);
        buf = tmp;
    }
    Ok((buf, ret))
}

#[inline]
pub fn parse_till_empty_with_one_input<
    'a,
    I: Clone,
    T: ReadablePduWithOneInput<'a, I, E>,
    E: Debug,
>(
    buf: &'a [u8],
    input: I,
) -> IResult<&'a [u8], Vec<T>, E> {
    let mut buf = buf;
    let mut ret = Vec::new();
    while !buf.is_empty() {
        let (tmp, element) = T::from_wire(buf, input.clone())?;
        ret.push(element);
        buf = tmp;
    }
    Ok((buf, ret))
}
