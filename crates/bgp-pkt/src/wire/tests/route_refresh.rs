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


use std::str::FromStr;

use ipnet::IpNet;
use peerwire_iana::address_family::AddressType;

use crate::{
    capabilities::{BgpCapability, CapabilityRecord},
    iana::{OrfType, RouteRefreshWhen},
    notification::{BgpNotificationMessage, MessageHeaderError},
    route_refresh::{
        BgpRouteRefreshMessage, OrfAction, OrfFilter, OrfMatch, OrfRequest, PrefixOrfEntry,
    },
    wire::{
        deserializer::{DecodeStatus, DiscardReason, ReceivedMessage},
        tests::{decode_wire, ebgp_params, encode, expect_notification, header, record},
    },
    BgpMessage,
};

fn refresh_capabilities() -> CapabilityRecord {
    record(&[BgpCapability::RouteRefresh], &[BgpCapability::RouteRefresh])
}

fn decode_refresh(message_type: u8, body: &[u8]) -> DecodeStatus {
    decode_wire(
        &[header(message_type, body.len()), body.to_vec()].concat(),
        &ebgp_params(),
        &refresh_capabilities(),
    )
}

fn expect_refresh(status: DecodeStatus) -> BgpRouteRefreshMessage {
    match status {
        DecodeStatus::Decoded(ReceivedMessage::RouteRefresh(refresh)) => refresh,
        other => panic!("expected a ROUTE-REFRESH, got {other:?}"),
    }
}

#[test]
fn test_route_refresh() {
    let refresh = expect_refresh(decode_refresh(5, &[0x00, 0x01, 0x00, 0x01]));
    assert_eq!(
        refresh,
        BgpRouteRefreshMessage::new(AddressType::Ipv4Unicast, None)
    );
    assert!(refresh.is_immediate());

    // Pre-standard message type
    let refresh = expect_refresh(decode_refresh(128, &[0x00, 0x02, 0x00, 0x01]));
    assert_eq!(refresh.address_type(), AddressType::Ipv6Unicast);
}

#[test]
fn test_unsupported_address_type() {
    let status = decode_refresh(5, &[0x40, 0x04, 0x00, 0x47]);
    assert!(matches!(
        status,
        DecodeStatus::Discarded(DiscardReason::UnsupportedAddressType(_))
    ));
}

#[test]
fn test_orf_round_trip() {
    let refresh = BgpRouteRefreshMessage::new(
        AddressType::Ipv4Unicast,
        Some(OrfRequest::new(
            RouteRefreshWhen::Defer,
            vec![OrfFilter::new(
                OrfType::AddressPrefix,
                vec![
                    PrefixOrfEntry::new(
                        OrfAction::Add,
                        OrfMatch::Permit,
                        5,
                        0,
                        24,
                        IpNet::from_str("192.168.0.0/16").unwrap(),
                    ),
                    PrefixOrfEntry::new(
                        OrfAction::Remove,
                        OrfMatch::Deny,
                        10,
                        0,
                        0,
                        IpNet::from_str("10.0.0.0/8").unwrap(),
                    ),
                ],
            )]),
        ),
    );
    let wire = encode(&BgpMessage::RouteRefresh(refresh.clone()), false);
    let decoded = expect_refresh(decode_wire(&wire, &ebgp_params(), &refresh_capabilities()));
    assert_eq!(decoded, refresh);
    assert!(!decoded.is_immediate());
}

#[test]
fn test_unknown_orf_type_skipped() {
    let body = [
        0x00, 0x01, 0x00, 0x01, // IPv4 unicast
        0x01, // immediate
        0x99, 0x00, 0x02, 0xab, 0xcd, // unknown ORF type
        0x40, 0x00, 0x01, 0x80, // remove all
    ];
    let refresh = expect_refresh(decode_refresh(5, &body));
    assert_eq!(
        refresh.orf(),
        Some(&OrfRequest::new(
            RouteRefreshWhen::Immediate,
            vec![OrfFilter::new(
                OrfType::AddressPrefix,
                vec![PrefixOrfEntry::remove_all()]
            )]
        ))
    );
}

#[test]
fn test_malformed_orf() {
    let bad_length = |value: Vec<u8>| {
        BgpNotificationMessage::MessageHeaderError(MessageHeaderError::BadMessageLength { value })
    };

    let undefined_when = [0x00, 0x01, 0x00, 0x01, 0x03];
    assert_eq!(
        expect_notification(decode_refresh(5, &undefined_when)),
        bad_length(vec![0x03])
    );

    let truncated_block = [0x00, 0x01, 0x00, 0x01, 0x01, 0x40, 0x00, 0x05, 0x80];
    assert_eq!(
        expect_notification(decode_refresh(5, &truncated_block)),
        bad_length(vec![0x40, 0x00, 0x05])
    );

    // Remove-all sharing its block with another entry
    let shared_remove_all = [
        0x00, 0x01, 0x00, 0x01, 0x01, 0x40, 0x00, 0x0a, 0x80, 0x00, 0x00, 0x00, 0x00, 0x01,
        0x00, 0x00, 0x08, 0x0a,
    ];
    assert_eq!(
        expect_notification(decode_refresh(5, &shared_remove_all)),
        bad_length(vec![0x00, 0x0a])
    );

    let undefined_action = [0x00, 0x01, 0x00, 0x01, 0x01, 0x40, 0x00, 0x01, 0xc0];
    assert_eq!(
        expect_notification(decode_refresh(5, &undefined_action)),
        bad_length(vec![0x03])
    );
}
