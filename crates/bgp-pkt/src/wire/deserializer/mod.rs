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


//! Session aware deserializer for BGP's wire protocol.
//!
//! Messages are decoded straight out of the session [RingBuffer] in two
//! steps: the fixed header first, then the body once it is fully buffered.
//! Every read is bounded by the length the header announced, and the body is
//! always consumed to its end so the next step starts on a message boundary.

pub mod capabilities;
pub mod context;
pub mod dynamic_capability;
pub mod nlri;
pub mod notification;
pub mod open;
pub mod path_attribute;
pub mod route_refresh;
pub mod update;

use crate::{
    dynamic_capability::BgpCapabilityMessage,
    iana::BgpMessageType,
    notification::{BgpNotificationMessage, MessageHeaderError},
    route_refresh::BgpRouteRefreshMessage,
    update::BgpUpdateMessage,
    wire::{
        deserializer::{
            capabilities::CapabilityDecoderRegistry,
            context::SessionContext,
            dynamic_capability::{decode_capability_message, BgpCapabilityMessageParsingError},
            notification::{decode_notification, BgpNotificationMessageParsingError},
            open::{decode_open, BgpOpenMessageParsingError, ReceivedOpen},
            path_attribute::PathAttributeDecoderRegistry,
            route_refresh::{decode_route_refresh, BgpRouteRefreshMessageParsingError},
            update::{decode_update, BgpUpdateMessageParsingError},
        },
        BGP_HEADER_LENGTH, BGP_MARKER, BGP_MAX_MESSAGE_LENGTH,
    },
};
use byteorder::{ByteOrder, NetworkEndian};
use bytes::Bytes;
use peerwire_iana::address_family::InvalidAddressType;
use peerwire_parse_utils::ring_buffer::{RingBuffer, RingBufferError, Snapshot};

/// Smallest body an OPEN can have: version, AS, hold time, BGP Id and the
/// optional parameters length
pub const BGP_OPEN_MIN_BODY_LENGTH: u16 = 10;
/// Withdrawn routes length and total path attributes length
pub const BGP_UPDATE_MIN_BODY_LENGTH: u16 = 4;
pub const BGP_NOTIFICATION_MIN_BODY_LENGTH: u16 = 2;
/// AFI, reserved and SAFI
pub const BGP_ROUTE_REFRESH_MIN_BODY_LENGTH: u16 = 4;
pub const BGP_CAPABILITY_MIN_BODY_LENGTH: u16 = 3;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HeaderParsingError {
    ConnectionNotSynchronized,
    BadMessageLength(u16),
    BadMessageType(u8),
}

impl From<HeaderParsingError> for BgpNotificationMessage {
    fn from(value: HeaderParsingError) -> Self {
        let error = match value {
            HeaderParsingError::ConnectionNotSynchronized => {
                MessageHeaderError::ConnectionNotSynchronized { value: vec![] }
            }
            HeaderParsingError::BadMessageLength(length) => MessageHeaderError::BadMessageLength {
                value: length.to_be_bytes().to_vec(),
            },
            HeaderParsingError::BadMessageType(message_type) => {
                MessageHeaderError::BadMessageType {
                    value: vec![message_type],
                }
            }
        };
        BgpNotificationMessage::MessageHeaderError(error)
    }
}

/// Reasons a well-formed message is dropped without affecting the session
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DiscardReason {
    /// ORIGINATOR_ID carries our own BGP Id
    OriginatorIdLoop,
    /// Owned copy of the given size could not be allocated
    AllocationFailed(usize),
    UnsupportedAddressType(InvalidAddressType),
}

/// Outcome of a body decoder that may drop the message
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Decoded<T> {
    Message(T),
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BgpMessageParsingError {
    Header(HeaderParsingError),
    /// The body is shorter than its own fields claim
    Buffer(RingBufferError),
    Open(BgpOpenMessageParsingError),
    Update(BgpUpdateMessageParsingError),
    Notification(BgpNotificationMessageParsingError),
    RouteRefresh(BgpRouteRefreshMessageParsingError),
    Capability(BgpCapabilityMessageParsingError),
}

impl From<RingBufferError> for BgpMessageParsingError {
    fn from(value: RingBufferError) -> Self {
        Self::Buffer(value)
    }
}

impl From<BgpOpenMessageParsingError> for BgpMessageParsingError {
    fn from(value: BgpOpenMessageParsingError) -> Self {
        Self::Open(value)
    }
}

impl From<BgpUpdateMessageParsingError> for BgpMessageParsingError {
    fn from(value: BgpUpdateMessageParsingError) -> Self {
        match value {
            BgpUpdateMessageParsingError::Buffer(err) => Self::Buffer(err),
            err => Self::Update(err),
        }
    }
}

impl From<BgpNotificationMessageParsingError> for BgpMessageParsingError {
    fn from(value: BgpNotificationMessageParsingError) -> Self {
        Self::Notification(value)
    }
}

impl From<BgpRouteRefreshMessageParsingError> for BgpMessageParsingError {
    fn from(value: BgpRouteRefreshMessageParsingError) -> Self {
        Self::RouteRefresh(value)
    }
}

impl From<BgpCapabilityMessageParsingError> for BgpMessageParsingError {
    fn from(value: BgpCapabilityMessageParsingError) -> Self {
        Self::Capability(value)
    }
}

/// The NOTIFICATION to send to the peer before closing the session
impl From<BgpMessageParsingError> for BgpNotificationMessage {
    fn from(value: BgpMessageParsingError) -> Self {
        match value {
            BgpMessageParsingError::Header(err) => err.into(),
            BgpMessageParsingError::Buffer(_) | BgpMessageParsingError::Notification(_) => {
                BgpNotificationMessage::MessageHeaderError(MessageHeaderError::BadMessageLength {
                    value: vec![],
                })
            }
            BgpMessageParsingError::Open(err) => err.into(),
            BgpMessageParsingError::Update(err) => err.into(),
            BgpMessageParsingError::RouteRefresh(err) => err.into(),
            BgpMessageParsingError::Capability(err) => err.into(),
        }
    }
}

/// A fully validated message
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ReceivedMessage {
    Open(ReceivedOpen),
    Update(BgpUpdateMessage),
    Notification(BgpNotificationMessage),
    KeepAlive,
    RouteRefresh(BgpRouteRefreshMessage),
    Capability(BgpCapabilityMessage),
}

impl ReceivedMessage {
    pub const fn message_type(&self) -> BgpMessageType {
        match self {
            Self::Open(_) => BgpMessageType::Open,
            Self::Update(_) => BgpMessageType::Update,
            Self::Notification(_) => BgpMessageType::Notification,
            Self::KeepAlive => BgpMessageType::KeepAlive,
            Self::RouteRefresh(_) => BgpMessageType::RouteRefresh,
            Self::Capability(_) => BgpMessageType::Capability,
        }
    }
}

/// Result of a single [MessageDecoder::decode_step]
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DecodeStatus {
    /// Wait until the socket has more bytes
    NeedMoreData,
    /// The next step can run right away on the bytes already buffered
    ReadLoop,
    Decoded(ReceivedMessage),
    /// The message was consumed and dropped, the session is unaffected
    Discarded(DiscardReason),
    /// The session must be closed with the matching NOTIFICATION
    Malformed(BgpMessageParsingError),
}

/// Bounded view over the body of the message being decoded. No read can go
/// past the length announced in the header, regardless of how many bytes
/// the ring holds.
#[derive(Debug)]
pub struct BodyReader<'a> {
    ring: &'a mut RingBuffer,
    remaining: usize,
}

/// Read position inside a body, see [BodyReader::take_snapshot]
#[derive(Debug, Copy, Clone)]
pub struct BodySnapshot {
    snapshot: Snapshot,
    remaining: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(ring: &'a mut RingBuffer, len: usize) -> Self {
        Self {
            ring,
            remaining: len,
        }
    }

    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    #[inline]
    const fn check_remaining(&self, len: usize) -> Result<(), RingBufferError> {
        if len > self.remaining {
            return Err(RingBufferError::Insufficient {
                requested: len,
                available: self.remaining,
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, RingBufferError> {
        self.check_remaining(1)?;
        let value = self.ring.read_u8()?;
        self.remaining -= 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, RingBufferError> {
        self.check_remaining(2)?;
        let value = self.ring.read_u16()?;
        self.remaining -= 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32, RingBufferError> {
        self.check_remaining(4)?;
        let value = self.ring.read_u32()?;
        self.remaining -= 4;
        Ok(value)
    }

    pub fn read_fixed(&mut self, len: usize) -> Result<Bytes, RingBufferError> {
        self.check_remaining(len)?;
        let value = self.ring.read_fixed(len)?;
        self.remaining -= len;
        Ok(value)
    }

    /// Owned copy of whatever is left of the body
    pub fn read_rest(&mut self) -> Result<Bytes, RingBufferError> {
        self.read_fixed(self.remaining)
    }

    pub fn advance(&mut self, len: usize) -> Result<(), RingBufferError> {
        self.check_remaining(len)?;
        self.ring.advance(len)?;
        self.remaining -= len;
        Ok(())
    }

    pub const fn take_snapshot(&self) -> BodySnapshot {
        BodySnapshot {
            snapshot: self.ring.take_snapshot(),
            remaining: self.remaining,
        }
    }

    pub fn restore_snapshot(&mut self, snapshot: &BodySnapshot) -> Result<(), RingBufferError> {
        self.ring.restore_snapshot(&snapshot.snapshot)?;
        self.remaining = snapshot.remaining;
        Ok(())
    }

    /// Drop the unread part of the body, leaving the ring on the next
    /// message boundary
    pub fn skip_rest(&mut self) -> Result<(), RingBufferError> {
        self.ring.advance(self.remaining)?;
        self.remaining = 0;
        Ok(())
    }
}

/// Validate the fixed 19 octets header, returning the message type and the
/// total message length
pub fn check_header(
    header: &[u8; BGP_HEADER_LENGTH as usize],
    ctx: &SessionContext<'_>,
) -> Result<(BgpMessageType, u16), HeaderParsingError> {
    if header[..BGP_MARKER.len()] != BGP_MARKER {
        return Err(HeaderParsingError::ConnectionNotSynchronized);
    }
    let length = NetworkEndian::read_u16(&header[16..18]);
    if !(BGP_HEADER_LENGTH..=BGP_MAX_MESSAGE_LENGTH).contains(&length) {
        return Err(HeaderParsingError::BadMessageLength(length));
    }
    let type_code = header[18];
    let message_type = BgpMessageType::try_from(type_code)
        .map_err(|_| HeaderParsingError::BadMessageType(type_code))?;
    let body_length = length - BGP_HEADER_LENGTH;
    let length_valid = match message_type {
        BgpMessageType::Open => body_length >= BGP_OPEN_MIN_BODY_LENGTH,
        BgpMessageType::Update => body_length >= BGP_UPDATE_MIN_BODY_LENGTH,
        BgpMessageType::Notification => body_length >= BGP_NOTIFICATION_MIN_BODY_LENGTH,
        BgpMessageType::KeepAlive => body_length == 0,
        BgpMessageType::RouteRefresh | BgpMessageType::RouteRefreshOld => {
            body_length >= BGP_ROUTE_REFRESH_MIN_BODY_LENGTH
        }
        BgpMessageType::Capability => body_length >= BGP_CAPABILITY_MIN_BODY_LENGTH,
    };
    if !length_valid {
        return Err(HeaderParsingError::BadMessageLength(length));
    }
    let negotiated = match message_type {
        BgpMessageType::RouteRefresh | BgpMessageType::RouteRefreshOld => {
            ctx.capabilities().route_refresh_advertised()
        }
        BgpMessageType::Capability => ctx.capabilities().dynamic_capability_negotiated(),
        _ => true,
    };
    if !negotiated {
        return Err(HeaderParsingError::BadMessageType(type_code));
    }
    Ok((message_type, length))
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
enum DecodeStep {
    #[default]
    AwaitingHeader,
    AwaitingBody {
        message_type: BgpMessageType,
        length: u16,
    },
}

/// Incremental decoder of the messages received on one session
#[derive(Debug, Default)]
pub struct MessageDecoder {
    step: DecodeStep,
    capabilities: CapabilityDecoderRegistry,
    attributes: PathAttributeDecoderRegistry,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registries(
        capabilities: CapabilityDecoderRegistry,
        attributes: PathAttributeDecoderRegistry,
    ) -> Self {
        Self {
            step: DecodeStep::AwaitingHeader,
            capabilities,
            attributes,
        }
    }

    pub const fn capability_registry(&self) -> &CapabilityDecoderRegistry {
        &self.capabilities
    }

    /// Forget any partially decoded message, used when the connection is
    /// replaced
    pub fn reset(&mut self) {
        self.step = DecodeStep::AwaitingHeader;
    }

    /// Run one decode step. At most one message is produced per call.
    pub fn decode_step(&mut self, ring: &mut RingBuffer, ctx: &SessionContext<'_>) -> DecodeStatus {
        match self.step {
            DecodeStep::AwaitingHeader => {
                let mut header = [0u8; BGP_HEADER_LENGTH as usize];
                if ring.read_into(&mut header).is_err() {
                    return DecodeStatus::NeedMoreData;
                }
                match check_header(&header, ctx) {
                    Ok((message_type, length)) => {
                        log::trace!("Received {message_type} header of length {length}");
                        self.step = DecodeStep::AwaitingBody {
                            message_type,
                            length,
                        };
                        if ring.bytes_available_to_read() >= (length - BGP_HEADER_LENGTH) as usize {
                            DecodeStatus::ReadLoop
                        } else {
                            DecodeStatus::NeedMoreData
                        }
                    }
                    Err(err) => DecodeStatus::Malformed(BgpMessageParsingError::Header(err)),
                }
            }
            DecodeStep::AwaitingBody {
                message_type,
                length,
            } => {
                let body_len = (length - BGP_HEADER_LENGTH) as usize;
                if ring.bytes_available_to_read() < body_len {
                    return DecodeStatus::NeedMoreData;
                }
                self.step = DecodeStep::AwaitingHeader;
                let mut body = BodyReader::new(ring, body_len);
                let result = self.decode_body(message_type, &mut body, ctx);
                if let Err(err) = body.skip_rest() {
                    log::error!("Failed to skip to the end of {message_type} message: {err}");
                }
                match result {
                    Ok(Decoded::Message(message)) => DecodeStatus::Decoded(message),
                    Ok(Decoded::Discarded(reason)) => {
                        log::debug!("Discarding {message_type} message: {reason:?}");
                        DecodeStatus::Discarded(reason)
                    }
                    Err(BgpMessageParsingError::Buffer(RingBufferError::AllocationFailed(len))) => {
                        log::warn!("Discarding {message_type} message, cannot allocate {len} bytes");
                        DecodeStatus::Discarded(DiscardReason::AllocationFailed(len))
                    }
                    Err(BgpMessageParsingError::Buffer(err)) => {
                        log::debug!("Truncated {message_type} message: {err}");
                        DecodeStatus::Malformed(BgpMessageParsingError::Header(
                            HeaderParsingError::BadMessageLength(length),
                        ))
                    }
                    Err(err) => DecodeStatus::Malformed(err),
                }
            }
        }
    }

    fn decode_body(
        &self,
        message_type: BgpMessageType,
        body: &mut BodyReader<'_>,
        ctx: &SessionContext<'_>,
    ) -> Result<Decoded<ReceivedMessage>, BgpMessageParsingError> {
        let message = match message_type {
            BgpMessageType::Open => {
                let raw = body.read_rest()?;
                ReceivedMessage::Open(decode_open(&raw, ctx, &self.capabilities)?)
            }
            BgpMessageType::Update => match decode_update(body, ctx, &self.attributes)? {
                Decoded::Message(update) => ReceivedMessage::Update(update),
                Decoded::Discarded(reason) => return Ok(Decoded::Discarded(reason)),
            },
            BgpMessageType::Notification => {
                let raw = body.read_rest()?;
                ReceivedMessage::Notification(decode_notification(&raw)?)
            }
            BgpMessageType::KeepAlive => ReceivedMessage::KeepAlive,
            BgpMessageType::RouteRefresh | BgpMessageType::RouteRefreshOld => {
                let raw = body.read_rest()?;
                match decode_route_refresh(&raw)? {
                    Decoded::Message(refresh) => ReceivedMessage::RouteRefresh(refresh),
                    Decoded::Discarded(reason) => return Ok(Decoded::Discarded(reason)),
                }
            }
            BgpMessageType::Capability => {
                let raw = body.read_rest()?;
                ReceivedMessage::Capability(decode_capability_message(
                    &raw,
                    ctx,
                    &self.capabilities,
                )?)
            }
        };
        Ok(Decoded::Message(message))
    }
}
