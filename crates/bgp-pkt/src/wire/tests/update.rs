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


use std::{
    net::{Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use ipnet::IpNet;
use peerwire_iana::address_family::AddressType;
use peerwire_parse_utils::test_helpers::combine;

use crate::{
    capabilities::{BgpCapability, CapabilityRecord},
    iana::{AsPathSegmentType, Origin},
    notification::{BgpNotificationMessage, UpdateMessageError},
    path_attribute::{Aggregator, AsPath, AsPathSegment, Communities, PathAttributes},
    update::{BgpUpdateMessage, MpReach, NlriSpan},
    wire::{
        deserializer::{DecodeStatus, ReceivedMessage},
        tests::{
            decode_wire, ebgp_params, encode, expect_notification, header, record, update_wire,
            LOCAL_AS, PEER_AS,
        },
    },
    BgpMessage,
};

const ORIGIN: &[u8] = &[0x40, 0x01, 0x01, 0x00];
const AS_PATH: &[u8] = &[0x40, 0x02, 0x04, 0x02, 0x01, 0xfd, 0xe9];
const NEXT_HOP: &[u8] = &[0x40, 0x03, 0x04, 0x0a, 0x00, 0x00, 0x02];

fn expect_update(status: DecodeStatus) -> BgpUpdateMessage {
    match status {
        DecodeStatus::Decoded(ReceivedMessage::Update(update)) => update,
        other => panic!("expected an UPDATE, got {other:?}"),
    }
}

fn net(value: &str) -> IpNet {
    IpNet::from_str(value).unwrap()
}

#[test]
fn test_update() {
    let withdrawn = [0x10, 0x0a, 0x01];
    let nlri = [0x18, 0xc0, 0xa8, 0x01, 0x20, 0xc0, 0xa8, 0x02, 0x01];
    let update = expect_update(decode_wire(
        &update_wire(&withdrawn, &combine(vec![ORIGIN, AS_PATH, NEXT_HOP]), &nlri),
        &ebgp_params(),
        &CapabilityRecord::default(),
    ));
    assert_eq!(update.withdrawn().prefixes(), &vec![net("10.1.0.0/16")]);
    assert_eq!(&update.withdrawn().raw()[..], &withdrawn);
    assert_eq!(
        update.nlri().prefixes(),
        &vec![net("192.168.1.0/24"), net("192.168.2.1/32")]
    );
    assert_eq!(update.attributes().origin(), Some(Origin::Igp));
    assert_eq!(
        update.attributes().next_hop(),
        Some(Ipv4Addr::new(10, 0, 0, 2))
    );
    assert!(!update.is_end_of_rib());
}

#[test]
fn test_withdraw_only() {
    // Withdrawn routes need no attributes
    let update = expect_update(decode_wire(
        &update_wire(&[0x08, 0x0a], &[], &[]),
        &ebgp_params(),
        &CapabilityRecord::default(),
    ));
    assert_eq!(update.withdrawn().prefixes(), &vec![net("10.0.0.0/8")]);
    assert!(update.nlri().is_empty());
}

#[test]
fn test_end_of_rib() {
    let update = expect_update(decode_wire(
        &update_wire(&[], &[], &[]),
        &ebgp_params(),
        &CapabilityRecord::default(),
    ));
    assert!(update.is_end_of_rib());
    assert_eq!(
        encode(&BgpMessage::Update(update), false),
        combine(vec![header(2, 4).as_slice(), &[0x00, 0x00, 0x00, 0x00]])
    );
}

#[test]
fn test_section_lengths() {
    let params = ebgp_params();
    let capabilities = CapabilityRecord::default();
    let malformed = BgpNotificationMessage::UpdateMessageError(
        UpdateMessageError::MalformedAttributeList { value: vec![] },
    );

    let withdrawn_overflow = combine(vec![header(2, 4).as_slice(), &[0x00, 0x05, 0x00, 0x00]]);
    assert_eq!(
        expect_notification(decode_wire(&withdrawn_overflow, &params, &capabilities)),
        malformed
    );

    let attributes_overflow = combine(vec![
        header(2, 6).as_slice(),
        &[0x00, 0x01, 0x08, 0x00, 0x02, 0x00],
    ]);
    assert_eq!(
        expect_notification(decode_wire(&attributes_overflow, &params, &capabilities)),
        malformed
    );
}

#[test]
fn test_invalid_network_field() {
    let params = ebgp_params();
    let capabilities = CapabilityRecord::default();
    let invalid_network = BgpNotificationMessage::UpdateMessageError(
        UpdateMessageError::InvalidNetworkField { value: vec![] },
    );
    let attributes = combine(vec![ORIGIN, AS_PATH, NEXT_HOP]);

    let too_long = [0x21, 0xc0, 0xa8, 0x01, 0x01, 0x01];
    assert_eq!(
        expect_notification(decode_wire(
            &update_wire(&[], &attributes, &too_long),
            &params,
            &capabilities
        )),
        invalid_network
    );

    let truncated = [0x18, 0xc0, 0xa8];
    assert_eq!(
        expect_notification(decode_wire(
            &update_wire(&[], &attributes, &truncated),
            &params,
            &capabilities
        )),
        invalid_network
    );

    let zero_host = [0x20, 0x00, 0x00, 0x00, 0x00];
    assert_eq!(
        expect_notification(decode_wire(
            &update_wire(&[], &attributes, &zero_host),
            &params,
            &capabilities
        )),
        invalid_network
    );
}

#[test]
fn test_multicast_prefix_dropped() {
    let nlri = [0x18, 0xc0, 0xa8, 0x01, 0x08, 0xe0];
    let update = expect_update(decode_wire(
        &update_wire(&[], &combine(vec![ORIGIN, AS_PATH, NEXT_HOP]), &nlri),
        &ebgp_params(),
        &CapabilityRecord::default(),
    ));
    assert_eq!(update.nlri().prefixes(), &vec![net("192.168.1.0/24")]);
}

#[test]
fn test_mp_unreach() {
    let mp_unreach = [0x80, 0x0f, 0x08, 0x00, 0x02, 0x01, 0x20, 0x20, 0x01, 0x0d, 0xb8];
    let wire = update_wire(&[], &mp_unreach, &[]);

    // IPv6 is not negotiated, the attribute is ignored
    let update = expect_update(decode_wire(
        &wire,
        &ebgp_params(),
        &CapabilityRecord::default(),
    ));
    assert_eq!(update.mp_unreach(), None);

    let ipv6 = [BgpCapability::MultiProtocolExtensions(AddressType::Ipv6Unicast)];
    let update = expect_update(decode_wire(&wire, &ebgp_params(), &record(&ipv6, &ipv6)));
    let unreach = update.mp_unreach().unwrap();
    assert_eq!(unreach.address_type(), AddressType::Ipv6Unicast);
    assert_eq!(unreach.nlri().prefixes(), &vec![net("2001:db8::/32")]);
}

#[test]
fn test_mp_nlri_error() {
    let ipv6 = [BgpCapability::MultiProtocolExtensions(AddressType::Ipv6Unicast)];
    let mp_unreach = [0x80, 0x0f, 0x05, 0x00, 0x02, 0x01, 0x81, 0x20];
    let status = decode_wire(
        &update_wire(&[], &mp_unreach, &[]),
        &ebgp_params(),
        &record(&ipv6, &ipv6),
    );
    assert_eq!(
        expect_notification(status),
        BgpNotificationMessage::UpdateMessageError(UpdateMessageError::OptionalAttributeError {
            value: vec![]
        })
    );
}

fn originated_update() -> BgpUpdateMessage {
    let mut attributes = PathAttributes::new();
    attributes.set_origin(Some(Origin::Igp));
    attributes.set_as_path(Some(AsPath::new(vec![AsPathSegment::new(
        AsPathSegmentType::AsSequence,
        vec![PEER_AS, 4200000000],
    )])));
    attributes.set_next_hop(Some(Ipv4Addr::new(10, 0, 0, 2)));
    attributes.set_med(Some(50));
    attributes.set_aggregator(Some(Aggregator::new(
        4200000000,
        Ipv4Addr::new(10, 0, 0, 9),
    )));
    attributes.set_communities(Some(Communities::new(vec![0xfde90064], false)));
    BgpUpdateMessage::new(
        NlriSpan::from_prefixes(AddressType::Ipv4Unicast, vec![net("10.1.0.0/16")]).unwrap(),
        attributes,
        NlriSpan::from_prefixes(
            AddressType::Ipv4Unicast,
            vec![net("192.168.1.0/24"), net("172.16.0.0/12")],
        )
        .unwrap(),
        None,
        None,
    )
}

fn assert_same_routes(decoded: &BgpUpdateMessage, original: &BgpUpdateMessage) {
    assert_eq!(decoded.withdrawn().prefixes(), original.withdrawn().prefixes());
    assert_eq!(decoded.nlri().prefixes(), original.nlri().prefixes());
    let (decoded, original) = (decoded.attributes(), original.attributes());
    assert_eq!(decoded.origin(), original.origin());
    assert_eq!(decoded.as_path(), original.as_path());
    assert_eq!(decoded.next_hop(), original.next_hop());
    assert_eq!(decoded.med(), original.med());
    assert_eq!(decoded.aggregator(), original.aggregator());
    assert_eq!(decoded.communities(), original.communities());
    assert!(decoded.transit().is_empty());
}

#[test]
fn test_round_trip_legacy_peer() {
    let original = originated_update();
    let wire = encode(&BgpMessage::Update(original.clone()), false);
    let params = ebgp_params().with_four_octet_asn(true);
    let decoded = expect_update(decode_wire(&wire, &params, &CapabilityRecord::default()));
    assert_same_routes(&decoded, &original);
}

#[test]
fn test_round_trip_as4_peer() {
    let original = originated_update();
    let wire = encode(&BgpMessage::Update(original.clone()), true);
    let params = ebgp_params().with_four_octet_asn(true);
    let capabilities = record(
        &[BgpCapability::FourOctetAs(LOCAL_AS)],
        &[BgpCapability::FourOctetAs(PEER_AS)],
    );
    let decoded = expect_update(decode_wire(&wire, &params, &capabilities));
    assert_same_routes(&decoded, &original);
    assert_eq!(decoded.attributes().as_path_legacy(), None);
}

#[test]
fn test_round_trip_mp_reach() {
    let ipv6 = [BgpCapability::MultiProtocolExtensions(AddressType::Ipv6Unicast)];
    let capabilities = record(&ipv6, &ipv6);
    let mut attributes = PathAttributes::new();
    attributes.set_origin(Some(Origin::Egp));
    attributes.set_as_path(Some(AsPath::new(vec![AsPathSegment::new(
        AsPathSegmentType::AsSequence,
        vec![PEER_AS],
    )])));
    let next_hop = Ipv6Addr::from_str("2001:db8::1").unwrap();
    let link_local = Ipv6Addr::from_str("fe80::1").unwrap();
    let reach = MpReach::new(
        next_hop.into(),
        Some(link_local),
        NlriSpan::from_prefixes(AddressType::Ipv6Unicast, vec![net("2001:db8:1::/48")]).unwrap(),
    );
    let original = BgpUpdateMessage::new(
        NlriSpan::empty(AddressType::Ipv4Unicast),
        attributes,
        NlriSpan::empty(AddressType::Ipv4Unicast),
        Some(reach),
        None,
    );
    let wire = encode(&BgpMessage::Update(original.clone()), false);
    let decoded = expect_update(decode_wire(&wire, &ebgp_params(), &capabilities));
    assert_eq!(decoded.mp_reach(), original.mp_reach());
    assert_eq!(
        decoded.attributes().as_path_legacy(),
        Some(&AsPath::new(vec![AsPathSegment::new(
            AsPathSegmentType::AsSequence,
            vec![65001u16]
        )]))
    );
}
