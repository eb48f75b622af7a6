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
use peerwire_parse_utils::test_helpers::{combine, test_write};

use crate::{
    capabilities::{BgpCapability, CapabilityRecord},
    notification::{BgpNotificationMessage, OpenMessageError},
    open::{BgpOpenMessage, BgpOpenMessageParameter, BGP_VERSION},
    wire::{
        deserializer::{
            capabilities::CapabilityDecoderRegistry,
            context::{SessionContext, SessionParameters},
            open::{decode_open, BgpOpenMessageParsingError, ReceivedOpen},
        },
        serializer::open::BgpOpenMessageWritingError,
        tests::{ebgp_params, LOCAL_ID, PEER_AS, PEER_ID},
    },
};

const MY_AS: &[u8] = &[0xfd, 0xe9];
const HOLD_TIME: &[u8] = &[0x00, 0xb4];
const BGP_ID: &[u8] = &[0x0a, 0x00, 0x00, 0x02];

fn decode(
    body: &[u8],
    params: &SessionParameters,
) -> Result<ReceivedOpen, BgpOpenMessageParsingError> {
    let capabilities = CapabilityRecord::default();
    let ctx = SessionContext::new(params, &capabilities);
    decode_open(body, &ctx, &CapabilityDecoderRegistry::default())
}

#[test]
fn test_open_no_params() -> Result<(), BgpOpenMessageWritingError> {
    let good_wire = combine(vec![&[BGP_VERSION], MY_AS, HOLD_TIME, BGP_ID, &[0x00]]);
    let good = BgpOpenMessage::new(65001, 180, PEER_ID, vec![]);

    let received = decode(&good_wire, &ebgp_params().with_hold_time(90)).unwrap();
    assert_eq!(received.message(), &good);
    assert_eq!(received.remote_asn(), PEER_AS);
    assert_eq!(received.hold_time(), 90);
    assert_eq!(received.keepalive(), 30);
    assert!(received.capabilities().is_empty());

    test_write(&good, &good_wire)?;
    Ok(())
}

#[test]
fn test_open_capabilities() -> Result<(), BgpOpenMessageWritingError> {
    let good_wire = combine(vec![
        &[BGP_VERSION],
        MY_AS,
        &[0x00, 0x0f],
        BGP_ID,
        &[0x0a, 0x02, 0x08],
        &[0x01, 0x04, 0x00, 0x02, 0x00, 0x01],
        &[0x02, 0x00],
    ]);
    let good = BgpOpenMessage::new(
        65001,
        15,
        PEER_ID,
        vec![BgpOpenMessageParameter::Capabilities(vec![
            BgpCapability::MultiProtocolExtensions(AddressType::Ipv6Unicast),
            BgpCapability::RouteRefresh,
        ])],
    );

    let received = decode(&good_wire, &ebgp_params()).unwrap();
    assert_eq!(received.message(), &good);
    assert_eq!(received.hold_time(), 15);
    assert_eq!(received.keepalive(), 5);
    assert!(received
        .capabilities()
        .address_types()
        .contains(&AddressType::Ipv6Unicast));

    test_write(&good, &good_wire)?;
    Ok(())
}

#[test]
fn test_open_wrong_version() {
    let bad_wire = combine(vec![&[5], MY_AS, HOLD_TIME, BGP_ID, &[0x00]]);
    let err = decode(&bad_wire, &ebgp_params()).unwrap_err();
    assert_eq!(err, BgpOpenMessageParsingError::UnsupportedVersionNumber(5));
    assert_eq!(
        BgpNotificationMessage::from(err),
        BgpNotificationMessage::OpenMessageError(OpenMessageError::UnsupportedVersionNumber {
            value: vec![0x00, 0x04]
        })
    );
}

#[test]
fn test_open_bad_peer_as() {
    let bad_wire = combine(vec![&[BGP_VERSION], &[0xfd, 0xea], HOLD_TIME, BGP_ID, &[0x00]]);
    let err = decode(&bad_wire, &ebgp_params()).unwrap_err();
    assert_eq!(err, BgpOpenMessageParsingError::BadPeerAs(65002));
    assert_eq!(
        BgpNotificationMessage::from(err),
        BgpNotificationMessage::OpenMessageError(OpenMessageError::BadPeerAs {
            value: vec![0xfd, 0xea]
        })
    );
}

#[test]
fn test_open_hold_time() {
    let short_wire = combine(vec![&[BGP_VERSION], MY_AS, &[0x00, 0x02], BGP_ID, &[0x00]]);
    let err = decode(&short_wire, &ebgp_params()).unwrap_err();
    assert_eq!(err, BgpOpenMessageParsingError::UnacceptableHoldTime(2));
    assert_eq!(
        BgpNotificationMessage::from(err),
        BgpNotificationMessage::OpenMessageError(OpenMessageError::UnacceptableHoldTime {
            value: vec![0x00, 0x02]
        })
    );

    let zero_wire = combine(vec![&[BGP_VERSION], MY_AS, &[0x00, 0x00], BGP_ID, &[0x00]]);
    assert_eq!(
        decode(
            &zero_wire,
            &ebgp_params().with_allow_infinite_hold_time(false)
        ),
        Err(BgpOpenMessageParsingError::UnacceptableHoldTime(0))
    );
    let received = decode(&zero_wire, &ebgp_params()).unwrap();
    assert_eq!(received.hold_time(), 0);
    assert_eq!(received.keepalive(), 0);
}

#[test]
fn test_open_bad_bgp_id() {
    let local_id = LOCAL_ID.octets();
    let bad_wire = combine(vec![&[BGP_VERSION], MY_AS, HOLD_TIME, &local_id, &[0x00]]);
    let err = decode(&bad_wire, &ebgp_params()).unwrap_err();
    assert_eq!(err, BgpOpenMessageParsingError::BadBgpIdentifier(LOCAL_ID));
    assert_eq!(
        BgpNotificationMessage::from(err),
        BgpNotificationMessage::OpenMessageError(OpenMessageError::BadBgpIdentifier {
            value: vec![10, 0, 0, 1]
        })
    );

    let zero_wire = combine(vec![&[BGP_VERSION], MY_AS, HOLD_TIME, &[0; 4], &[0x00]]);
    assert!(matches!(
        decode(&zero_wire, &ebgp_params()),
        Err(BgpOpenMessageParsingError::BadBgpIdentifier(_))
    ));
}

#[test]
fn test_open_unsupported_parameter() {
    let bad_wire = combine(vec![
        &[BGP_VERSION],
        MY_AS,
        HOLD_TIME,
        BGP_ID,
        &[0x03, 0x01, 0x01, 0x00],
    ]);
    let err = decode(&bad_wire, &ebgp_params()).unwrap_err();
    assert_eq!(err, BgpOpenMessageParsingError::UnsupportedOptionalParameter(1));
    assert_eq!(
        BgpNotificationMessage::from(err),
        BgpNotificationMessage::OpenMessageError(
            OpenMessageError::UnsupportedOptionalParameter { value: vec![] }
        )
    );
}

#[test]
fn test_open_four_octet_as() {
    let good_wire = combine(vec![
        &[BGP_VERSION],
        &[0x5b, 0xa0],
        HOLD_TIME,
        BGP_ID,
        &[0x08, 0x02, 0x06],
        &[0x41, 0x04, 0xfa, 0x56, 0xea, 0x00],
    ]);
    let params = SessionParameters::new(65000, 4200000000, LOCAL_ID).with_four_octet_asn(true);
    let received = decode(&good_wire, &params).unwrap();
    assert_eq!(received.remote_asn(), 4200000000);
    assert_eq!(received.capabilities().four_octet_as(), Some(4200000000));

    // Capability doesn't match the configured peer
    let other = SessionParameters::new(65000, 4200000001, LOCAL_ID).with_four_octet_asn(true);
    assert_eq!(
        decode(&good_wire, &other),
        Err(BgpOpenMessageParsingError::BadPeerAs(4200000000))
    );
    // Too wide for two octets, reported in full
    assert_eq!(
        BgpNotificationMessage::from(BgpOpenMessageParsingError::BadPeerAs(4200000000)),
        BgpNotificationMessage::OpenMessageError(OpenMessageError::BadPeerAs {
            value: vec![0xfa, 0x56, 0xea, 0x00]
        })
    );
}

#[test]
fn test_open_unsupported_capability() {
    let wire = combine(vec![
        &[BGP_VERSION],
        MY_AS,
        HOLD_TIME,
        BGP_ID,
        &[0x04, 0x02, 0x02],
        &[0x49, 0x00],
    ]);

    let received = decode(&wire, &ebgp_params()).unwrap();
    assert_eq!(
        received.message().capabilities().collect::<Vec<_>>(),
        vec![&BgpCapability::Unrecognized {
            code: 0x49,
            value: vec![]
        }]
    );

    let strict = ebgp_params().with_strict_capability_match(true);
    let err = decode(&wire, &strict).unwrap_err();
    assert_eq!(
        err,
        BgpOpenMessageParsingError::UnsupportedCapability(vec![0x49, 0x00])
    );
    assert_eq!(
        BgpNotificationMessage::from(err),
        BgpNotificationMessage::OpenMessageError(OpenMessageError::UnsupportedCapability {
            value: vec![0x49, 0x00]
        })
    );

    // Strict matching against a peer that sent no capability at all
    let no_caps_wire = combine(vec![&[BGP_VERSION], MY_AS, HOLD_TIME, BGP_ID, &[0x00]]);
    assert_eq!(
        decode(&no_caps_wire, &strict),
        Err(BgpOpenMessageParsingError::UnsupportedCapability(vec![]))
    );
    assert!(decode(&no_caps_wire, &strict.with_dont_capability(true)).is_ok());
}

#[test]
fn test_open_unsupported_address_family() {
    let wire = combine(vec![
        &[BGP_VERSION],
        MY_AS,
        HOLD_TIME,
        BGP_ID,
        &[0x08, 0x02, 0x06],
        &[0x01, 0x04, 0x40, 0x04, 0x00, 0x47],
    ]);
    assert_eq!(
        decode(&wire, &ebgp_params()),
        Err(BgpOpenMessageParsingError::UnsupportedCapability(vec![
            0x01, 0x04, 0x40, 0x04, 0x00, 0x47
        ]))
    );
}
