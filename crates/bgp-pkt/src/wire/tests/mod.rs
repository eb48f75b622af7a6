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


use std::net::Ipv4Addr;

use peerwire_parse_utils::{
    ring_buffer::RingBuffer,
    test_helpers::{combine, ring_from},
    WritablePduWithOneInput,
};

use crate::{
    capabilities::{BgpCapability, CapabilityRecord, PeerCapabilities},
    notification::{BgpNotificationMessage, MessageHeaderError},
    wire::deserializer::{
        context::{SessionContext, SessionParameters},
        BgpMessageParsingError, DecodeStatus, HeaderParsingError, MessageDecoder,
    },
    BgpMessage,
};

mod dynamic_capability;
mod keepalive;
mod open;
mod route_refresh;
mod update;

pub(crate) const BGP_MARKER: &[u8] = &[0xff; 16];
pub(crate) const LOCAL_ID: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub(crate) const PEER_ID: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub(crate) const LOCAL_AS: u32 = 65000;
pub(crate) const PEER_AS: u32 = 65001;

/// EBGP session between AS65000 and AS65001, legacy AS numbers
pub(crate) fn ebgp_params() -> SessionParameters {
    SessionParameters::new(LOCAL_AS, PEER_AS, LOCAL_ID).with_four_octet_asn(false)
}

pub(crate) fn record(advertised: &[BgpCapability], received: &[BgpCapability]) -> CapabilityRecord {
    CapabilityRecord::new(
        PeerCapabilities::from_capabilities(advertised),
        PeerCapabilities::from_capabilities(received),
    )
}

/// BGP header for a message with the given body length
pub(crate) fn header(message_type: u8, body_len: usize) -> Vec<u8> {
    let len = (body_len + 19) as u16;
    combine(vec![BGP_MARKER, &len.to_be_bytes(), &[message_type]])
}

/// UPDATE message with the given withdrawn routes, attributes and NLRI
pub(crate) fn update_wire(withdrawn: &[u8], attributes: &[u8], nlri: &[u8]) -> Vec<u8> {
    let body_len = 4 + withdrawn.len() + attributes.len() + nlri.len();
    combine(vec![
        header(2, body_len).as_slice(),
        &(withdrawn.len() as u16).to_be_bytes(),
        withdrawn,
        &(attributes.len() as u16).to_be_bytes(),
        attributes,
        nlri,
    ])
}

/// Run decode steps until one of them produces something other than
/// [DecodeStatus::ReadLoop]
pub(crate) fn decode_next(
    decoder: &mut MessageDecoder,
    ring: &mut RingBuffer,
    params: &SessionParameters,
    capabilities: &CapabilityRecord,
) -> DecodeStatus {
    let ctx = SessionContext::new(params, capabilities);
    loop {
        match decoder.decode_step(ring, &ctx) {
            DecodeStatus::ReadLoop => continue,
            status => return status,
        }
    }
}

/// Decode a single message held entirely in `wire`
pub(crate) fn decode_wire(
    wire: &[u8],
    params: &SessionParameters,
    capabilities: &CapabilityRecord,
) -> DecodeStatus {
    let mut ring = ring_from(wire);
    decode_next(&mut MessageDecoder::new(), &mut ring, params, capabilities)
}

/// The NOTIFICATION a malformed message should be answered with
pub(crate) fn expect_notification(status: DecodeStatus) -> BgpNotificationMessage {
    match status {
        DecodeStatus::Malformed(err) => err.into(),
        other => panic!("expected a malformed message, got {other:?}"),
    }
}

pub(crate) fn encode(message: &BgpMessage, asn4: bool) -> Vec<u8> {
    let mut buf = vec![];
    message.write(&mut buf, asn4).unwrap();
    buf
}

#[test]
fn test_not_synchronized_marker() {
    let bad_wire = combine(vec![&[0x00; 16], &[0x00, 0x13, 0x04]]);
    let status = decode_wire(&bad_wire, &ebgp_params(), &CapabilityRecord::default());
    assert_eq!(
        status,
        DecodeStatus::Malformed(BgpMessageParsingError::Header(
            HeaderParsingError::ConnectionNotSynchronized
        ))
    );
    assert_eq!(
        expect_notification(status),
        BgpNotificationMessage::MessageHeaderError(MessageHeaderError::ConnectionNotSynchronized {
            value: vec![]
        })
    );
}

#[test]
fn test_message_length_bounds() {
    let params = ebgp_params();
    let capabilities = CapabilityRecord::default();
    let bad_length = |wire: Vec<u8>, length: u16| {
        assert_eq!(
            decode_wire(&wire, &params, &capabilities),
            DecodeStatus::Malformed(BgpMessageParsingError::Header(
                HeaderParsingError::BadMessageLength(length)
            ))
        );
    };
    // Shorter than a header
    bad_length(combine(vec![BGP_MARKER, &[0x00, 0x12, 0x04]]), 18);
    // Longer than 4096
    bad_length(combine(vec![BGP_MARKER, &[0x10, 0x01, 0x02]]), 4097);
    // Keepalive with a body
    bad_length(combine(vec![BGP_MARKER, &[0x00, 0x14, 0x04, 0x00]]), 20);
    // Below the minimum of each message type
    bad_length(combine(vec![BGP_MARKER, &[0x00, 0x1c, 0x01]]), 28);
    bad_length(combine(vec![BGP_MARKER, &[0x00, 0x16, 0x02]]), 22);
    bad_length(combine(vec![BGP_MARKER, &[0x00, 0x14, 0x03]]), 20);

    let status = decode_wire(
        &combine(vec![BGP_MARKER, &[0x00, 0x12, 0x04]]),
        &params,
        &capabilities,
    );
    assert_eq!(
        expect_notification(status),
        BgpNotificationMessage::MessageHeaderError(MessageHeaderError::BadMessageLength {
            value: vec![0x00, 0x12]
        })
    );
}

#[test]
fn test_message_type() {
    let params = ebgp_params();
    let capabilities = CapabilityRecord::default();

    let undefined_wire = combine(vec![BGP_MARKER, &[0x00, 0x13, 0x09]]);
    let status = decode_wire(&undefined_wire, &params, &capabilities);
    assert_eq!(
        expect_notification(status),
        BgpNotificationMessage::MessageHeaderError(MessageHeaderError::BadMessageType {
            value: vec![0x09]
        })
    );

    // ROUTE-REFRESH without the capability being advertised
    let refresh_wire = [header(5, 4), vec![0x00, 0x01, 0x00, 0x01]].concat();
    assert_eq!(
        decode_wire(&refresh_wire, &params, &capabilities),
        DecodeStatus::Malformed(BgpMessageParsingError::Header(
            HeaderParsingError::BadMessageType(5)
        ))
    );

    // CAPABILITY without dynamic capability negotiated
    let capability_wire = [header(6, 3), vec![0x00, 0x00, 0x00]].concat();
    assert_eq!(
        decode_wire(&capability_wire, &params, &capabilities),
        DecodeStatus::Malformed(BgpMessageParsingError::Header(
            HeaderParsingError::BadMessageType(6)
        ))
    );
}
