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


use peerwire_iana::address_family::AddressType;

use crate::{
    capabilities::{BgpCapability, CapabilityRecord},
    dynamic_capability::{BgpCapabilityMessage, DynamicCapabilityAction, DynamicCapabilityEntry},
    notification::{BgpNotificationMessage, CapabilityMessageError},
    wire::{
        deserializer::{DecodeStatus, ReceivedMessage},
        tests::{decode_wire, ebgp_params, encode, expect_notification, header, record},
    },
    BgpMessage,
};

fn dynamic_capabilities() -> CapabilityRecord {
    let dynamic = [BgpCapability::DynamicCapability(vec![1, 2])];
    record(&dynamic, &dynamic)
}

fn decode_capability(body: &[u8]) -> DecodeStatus {
    decode_wire(
        &[header(6, body.len()), body.to_vec()].concat(),
        &ebgp_params(),
        &dynamic_capabilities(),
    )
}

fn expect_capability(status: DecodeStatus) -> BgpCapabilityMessage {
    match status {
        DecodeStatus::Decoded(ReceivedMessage::Capability(message)) => message,
        other => panic!("expected a CAPABILITY, got {other:?}"),
    }
}

#[test]
fn test_capability_message() {
    let body = [
        0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x04, 0x00, 0x02, 0x00, 0x01, // set IPv6
        0x41, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, // unset route refresh, ack requested
    ];
    let message = expect_capability(decode_capability(&body));
    assert_eq!(
        message,
        BgpCapabilityMessage::new(vec![
            DynamicCapabilityEntry::new(
                false,
                false,
                DynamicCapabilityAction::Set,
                1,
                BgpCapability::MultiProtocolExtensions(AddressType::Ipv6Unicast),
            ),
            DynamicCapabilityEntry::new(
                false,
                true,
                DynamicCapabilityAction::Unset,
                2,
                BgpCapability::RouteRefresh,
            ),
        ])
    );
    assert_eq!(
        encode(&BgpMessage::Capability(message), true),
        [header(6, body.len()), body.to_vec()].concat()
    );
}

#[test]
fn test_unrecognized_capability_kept() {
    let body = [0x80, 0x00, 0x00, 0x00, 0x07, 0x49, 0x01, 0xff];
    let message = expect_capability(decode_capability(&body));
    assert_eq!(message.entries().len(), 1);
    assert!(message.entries()[0].init_ack());
    assert_eq!(
        message.entries()[0].capability(),
        &BgpCapability::Unrecognized {
            code: 0x49,
            value: vec![0xff]
        }
    );
}

#[test]
fn test_invalid_action() {
    let body = [0x02, 0x00, 0x00, 0x00, 0x01, 0x02, 0x00];
    assert_eq!(
        expect_notification(decode_capability(&body)),
        BgpNotificationMessage::CapabilityMessageError(CapabilityMessageError::InvalidAction {
            value: vec![0x02]
        })
    );
}

#[test]
fn test_invalid_capability_length() {
    let short_header = [0x00, 0x00, 0x00];
    assert_eq!(
        expect_notification(decode_capability(&short_header)),
        BgpNotificationMessage::CapabilityMessageError(
            CapabilityMessageError::InvalidCapabilityLength {
                value: short_header.to_vec()
            }
        )
    );

    let overrun = [0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x04, 0x00, 0x02];
    assert_eq!(
        expect_notification(decode_capability(&overrun)),
        BgpNotificationMessage::CapabilityMessageError(
            CapabilityMessageError::InvalidCapabilityLength {
                value: overrun.to_vec()
            }
        )
    );
}

#[test]
fn test_malformed_capability_value() {
    // Four-octet AS capability with a 2 octets value
    let body = [0x00, 0x00, 0x00, 0x00, 0x01, 0x41, 0x02, 0xfd, 0xe9];
    assert_eq!(
        expect_notification(decode_capability(&body)),
        BgpNotificationMessage::CapabilityMessageError(
            CapabilityMessageError::MalformedCapabilityValue {
                value: body.to_vec()
            }
        )
    );
}

#[test]
fn test_not_negotiated() {
    let body = [0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x00];
    let status = decode_wire(
        &[header(6, body.len()), body.to_vec()].concat(),
        &ebgp_params(),
        &CapabilityRecord::default(),
    );
    assert!(matches!(status, DecodeStatus::Malformed(_)));
}
