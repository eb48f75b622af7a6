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

use crate::{
    events::{BgpEvent, TimerKind},
    fsm::FsmState,
    peer::{ConnectionType, PeerConfig, PeerConfigBuilder},
    session::Session,
    tests::*,
};
use ipnet::IpNet;
use peerwire_bgp_pkt::{
    capabilities::{BgpCapability, OrfCapability, OrfCapabilityEntry},
    dynamic_capability::{BgpCapabilityMessage, DynamicCapabilityAction, DynamicCapabilityEntry},
    iana::{CeaseErrorSubCode, FiniteStateMachineErrorSubCode, OrfMode, OrfType, RouteRefreshWhen},
    notification::BgpNotificationMessage,
    open::{BgpOpenMessage, BgpOpenMessageParameter},
    path_attribute::PathAttributes,
    route_refresh::{BgpRouteRefreshMessage, OrfAction, OrfFilter, OrfMatch, OrfRequest, PrefixOrfEntry},
    update::{BgpUpdateMessage, NlriSpan},
    BgpMessage,
};
use peerwire_iana::address_family::AddressType;
use std::{net::SocketAddr, time::Duration};

fn end_of_rib() -> BgpUpdateMessage {
    BgpUpdateMessage::new(
        NlriSpan::empty(AddressType::Ipv4Unicast),
        PathAttributes::default(),
        NlriSpan::empty(AddressType::Ipv4Unicast),
        None,
        None,
    )
}

/// Drive a fresh session over an active connection up to OpenSent
fn open_sent(config: PeerConfig) -> (Session<SocketAddr>, RecordingServices) {
    let mut session = Session::new(PROPERTIES, config);
    let mut services = RecordingServices::default();
    session
        .handle_event(&mut services, BgpEvent::ManualStart)
        .unwrap();
    session
        .handle_event(&mut services, BgpEvent::TcpConnectionRequestAcked(PEER_ADDR))
        .unwrap();
    (session, services)
}

fn established_with(
    config: PeerConfig,
    peer_open: &BgpMessage,
) -> (Session<SocketAddr>, RecordingServices) {
    let (mut session, mut services) = open_sent(config);
    feed(&mut session, &mut services, peer_open);
    feed(&mut session, &mut services, &BgpMessage::KeepAlive);
    assert_eq!(session.state(), FsmState::Established);
    (session, services)
}

#[test_log::test]
fn test_active_session_established() {
    let mut session = Session::new(PROPERTIES, test_config());
    let mut services = RecordingServices::default();
    assert_eq!(session.state(), FsmState::Idle);

    session
        .handle_event(&mut services, BgpEvent::ManualStart)
        .unwrap();
    assert_eq!(session.state(), FsmState::Connect);
    assert_eq!(services.connects, 1);
    let connect_retry = services.timers[&TimerKind::ConnectRetry];
    assert!(connect_retry >= Duration::from_millis(7500));
    assert!(connect_retry <= Duration::from_secs(10));

    session
        .handle_event(&mut services, BgpEvent::TcpConnectionRequestAcked(PEER_ADDR))
        .unwrap();
    assert_eq!(session.state(), FsmState::OpenSent);
    assert_eq!(session.connection_type(), Some(ConnectionType::Active));
    assert_eq!(services.sent, vec![BgpMessage::Open(session.open_message())]);
    assert_eq!(services.timers[&TimerKind::Hold], Duration::from_secs(240));
    assert!(!services.is_running(TimerKind::ConnectRetry));

    feed(&mut session, &mut services, &peer_open(PEER_BGP_ID, 180));
    assert_eq!(session.state(), FsmState::OpenConfirm);
    assert_eq!(services.sent.last(), Some(&BgpMessage::KeepAlive));
    assert_eq!(session.remote_bgp_id(), Some(PEER_BGP_ID));
    assert_eq!(session.hold_time(), 180);
    assert_eq!(session.keepalive(), 30);
    assert_eq!(services.timers[&TimerKind::Hold], Duration::from_secs(180));
    assert_eq!(services.timers[&TimerKind::Keepalive], Duration::from_secs(30));

    feed(&mut session, &mut services, &BgpMessage::KeepAlive);
    assert_eq!(session.state(), FsmState::Established);
    assert_eq!(services.established.len(), 1);
    assert!(services.established[0].is_active(AddressType::Ipv4Unicast));
    assert!(services.established[0].as4_negotiated());
    assert_eq!(
        services.timers[&TimerKind::RouteAdvertisement],
        Duration::from_secs(30)
    );
    assert_eq!(
        services.timers[&TimerKind::AsOrigination],
        Duration::from_secs(15)
    );

    let stats = session.stats();
    assert_eq!(stats.open_sent(), 1);
    assert_eq!(stats.open_received(), 1);
    assert_eq!(stats.keepalive_sent(), 1);
    assert_eq!(stats.keepalive_received(), 1);
    assert_eq!(stats.established_transitions(), 1);
    assert_eq!(session.connect_retry_counter(), 0);
}

#[test_log::test]
fn test_open_uses_as_trans_for_wide_asn() {
    let properties = crate::peer::PeerProperties::new(4200000000, PEER_AS, MY_BGP_ID, PEER_ADDR);
    let session = Session::new(properties, test_config());
    let open = session.open_message();
    assert_eq!(open.my_as(), 23456);
    assert_eq!(open.hold_time(), 180);
    assert_eq!(open.bgp_id(), MY_BGP_ID);
}

#[test_log::test]
fn test_passive_start() {
    let config = PeerConfigBuilder::new()
        .allow_auto_start(false)
        .passive_tcp_establishment(true)
        .build();
    let mut session = Session::new(PROPERTIES, config);
    let mut services = RecordingServices::default();
    session
        .handle_event(&mut services, BgpEvent::ManualStart)
        .unwrap();
    assert_eq!(session.state(), FsmState::Active);
    assert_eq!(services.connects, 0);
    assert!(services.is_running(TimerKind::ConnectRetry));

    session
        .handle_event(&mut services, BgpEvent::TcpConnectionConfirmed(PEER_ADDR))
        .unwrap();
    assert_eq!(session.state(), FsmState::OpenSent);
    assert_eq!(session.connection_type(), Some(ConnectionType::Passive));
}

#[test_log::test]
fn test_connect_retry_from_active() {
    let config = PeerConfigBuilder::new()
        .allow_auto_start(false)
        .passive_tcp_establishment(true)
        .build();
    let mut session = Session::new(PROPERTIES, config);
    let mut services = RecordingServices::default();
    session
        .handle_event(&mut services, BgpEvent::ManualStart)
        .unwrap();
    services.expire(&mut session, TimerKind::ConnectRetry);
    assert_eq!(session.state(), FsmState::Connect);
    assert_eq!(services.connects, 1);
    assert!(services.is_running(TimerKind::ConnectRetry));
}

#[test_log::test]
fn test_idle_refuses_connection() {
    let mut session = Session::new(PROPERTIES, test_config());
    let mut services = RecordingServices::default();
    session
        .handle_event(&mut services, BgpEvent::TcpConnectionConfirmed(PEER_ADDR))
        .unwrap();
    assert_eq!(session.state(), FsmState::Idle);
    assert_eq!(services.disconnects, 1);
}

#[test_log::test]
fn test_delay_open() {
    let config = PeerConfigBuilder::new()
        .allow_auto_start(false)
        .open_delay_timer_duration(5)
        .build();
    let (mut session, mut services) = open_sent(config);
    assert_eq!(session.state(), FsmState::Connect);
    assert!(session.delay_open_running());
    assert!(services.sent.is_empty());
    assert_eq!(services.timers[&TimerKind::DelayOpen], Duration::from_secs(5));

    services.expire(&mut session, TimerKind::DelayOpen);
    assert_eq!(session.state(), FsmState::OpenSent);
    assert!(!session.delay_open_running());
    assert_eq!(services.sent, vec![BgpMessage::Open(session.open_message())]);
}

#[test_log::test]
fn test_open_during_delay_open() {
    let config = PeerConfigBuilder::new()
        .allow_auto_start(false)
        .open_delay_timer_duration(5)
        .build();
    let (mut session, mut services) = open_sent(config);
    feed(&mut session, &mut services, &peer_open(PEER_BGP_ID, 180));
    assert_eq!(session.state(), FsmState::OpenConfirm);
    assert_eq!(
        services.sent,
        vec![BgpMessage::Open(session.open_message()), BgpMessage::KeepAlive]
    );
    assert!(!services.is_running(TimerKind::DelayOpen));
}

#[test_log::test]
fn test_hold_time_negotiation() {
    let config = PeerConfigBuilder::new()
        .allow_auto_start(false)
        .hold_timer_duration(90)
        .build();
    let (mut session, mut services) = open_sent(config);
    feed(&mut session, &mut services, &peer_open(PEER_BGP_ID, 180));
    assert_eq!(session.hold_time(), 90);
    assert_eq!(session.keepalive(), 30);
    assert_eq!(services.timers[&TimerKind::Hold], Duration::from_secs(90));
}

#[test_log::test]
fn test_zero_hold_time_disables_timers() {
    let (mut session, mut services) = open_sent(test_config());
    feed(&mut session, &mut services, &peer_open(PEER_BGP_ID, 0));
    assert_eq!(session.state(), FsmState::OpenConfirm);
    assert_eq!(session.hold_time(), 0);
    assert_eq!(session.keepalive(), 0);
    assert!(!services.is_running(TimerKind::Hold));
    assert!(!services.is_running(TimerKind::Keepalive));
}

#[test_log::test]
fn test_hold_timer_expires_in_open_confirm() {
    let (mut session, mut services) = open_sent(PeerConfig::default());
    feed(&mut session, &mut services, &peer_open(PEER_BGP_ID, 180));
    services.expire(&mut session, TimerKind::Hold);

    assert_eq!(session.state(), FsmState::Idle);
    assert_eq!(
        services.sent.last(),
        Some(&BgpMessage::Notification(
            BgpNotificationMessage::hold_timer_expired()
        ))
    );
    assert_eq!(session.connect_retry_counter(), 1);
    assert_eq!(services.disconnects, 1);
    assert_eq!(services.timers.len(), 1);
    assert_eq!(services.timers[&TimerKind::IdleHold], Duration::from_secs(1));
    assert_eq!(session.remote_bgp_id(), None);

    // Automatic restart after the idle hold time
    services.expire(&mut session, TimerKind::IdleHold);
    assert_eq!(session.state(), FsmState::Connect);
    assert_eq!(services.connects, 2);
    assert_eq!(session.connect_retry_counter(), 1);
}

#[test_log::test]
fn test_keepalive_timer_sends_keepalive() {
    let (mut session, mut services) =
        established_with(test_config(), &peer_open(PEER_BGP_ID, 180));
    services.sent.clear();
    services.expire(&mut session, TimerKind::Keepalive);
    assert_eq!(services.sent, vec![BgpMessage::KeepAlive]);
    assert!(services.is_running(TimerKind::Keepalive));
    assert_eq!(session.state(), FsmState::Established);
}

#[test_log::test]
fn test_manual_stop_established() {
    let (mut session, mut services) =
        established_with(PeerConfig::default(), &peer_open(PEER_BGP_ID, 180));
    session
        .handle_event(&mut services, BgpEvent::ManualStop)
        .unwrap();
    assert_eq!(session.state(), FsmState::Idle);
    assert_eq!(
        services.sent.last(),
        Some(&BgpMessage::Notification(BgpNotificationMessage::cease(
            CeaseErrorSubCode::AdministrativeShutdown
        )))
    );
    assert_eq!(services.closed, 1);
    assert_eq!(session.connect_retry_counter(), 0);
    assert!(services.timers.is_empty());
}

#[test_log::test]
fn test_notification_received_established() {
    let (mut session, mut services) =
        established_with(test_config(), &peer_open(PEER_BGP_ID, 180));
    let cease = BgpNotificationMessage::cease(CeaseErrorSubCode::PeerDeConfigured);
    feed(&mut session, &mut services, &BgpMessage::Notification(cease.clone()));
    assert_eq!(session.state(), FsmState::Idle);
    assert_eq!(services.closed, 1);
    assert_eq!(session.connect_retry_counter(), 1);
    let last = session.stats().last_notification_received().unwrap();
    assert_eq!(last.notification(), &cease);
}

#[test_log::test]
fn test_version_error_notification_while_opening() {
    // Unsupported version number, we speak version 4
    let version_error = BgpMessage::Notification(BgpNotificationMessage::from_parts(2, 1, vec![0, 4]));

    let (mut session, mut services) = open_sent(test_config());
    assert_eq!(session.state(), FsmState::OpenSent);
    feed(&mut session, &mut services, &version_error);
    assert_eq!(session.state(), FsmState::Idle);
    assert_eq!(session.connect_retry_counter(), 0);
    assert_eq!(services.disconnects, 1);
    assert!(services.timers.is_empty());
    assert_eq!(session.connection_type(), None);
    assert_eq!(
        services.sent,
        vec![BgpMessage::Open(session.open_message())],
        "nothing is sent back for a received NOTIFICATION"
    );

    let (mut session, mut services) = open_sent(test_config());
    feed(&mut session, &mut services, &peer_open(PEER_BGP_ID, 180));
    assert_eq!(session.state(), FsmState::OpenConfirm);
    feed(&mut session, &mut services, &version_error);
    assert_eq!(session.state(), FsmState::Idle);
    assert_eq!(session.connect_retry_counter(), 0);
    assert_eq!(services.disconnects, 1);
    assert!(services.timers.is_empty());
    assert_eq!(session.remote_bgp_id(), None);
    assert_eq!(services.sent.last(), Some(&BgpMessage::KeepAlive));
    assert!(services.established.is_empty());
    let last = session.stats().last_notification_received().unwrap();
    assert_eq!(last.notification().code(), 2);
    assert_eq!(last.notification().sub_code(), 1);
}

#[test_log::test]
fn test_unexpected_keepalive_in_open_sent() {
    let (mut session, mut services) = open_sent(test_config());
    feed(&mut session, &mut services, &BgpMessage::KeepAlive);
    assert_eq!(session.state(), FsmState::Idle);
    assert_eq!(
        services.sent.last(),
        Some(&BgpMessage::Notification(BgpNotificationMessage::fsm_error(
            FiniteStateMachineErrorSubCode::ReceiveUnexpectedMessageInOpenSentState
        )))
    );
}

#[test_log::test]
fn test_open_with_our_bgp_id() {
    let (mut session, mut services) = open_sent(test_config());
    feed(&mut session, &mut services, &peer_open(MY_BGP_ID, 180));
    assert_eq!(session.state(), FsmState::Idle);
    match services.sent.last() {
        Some(BgpMessage::Notification(notification)) => assert_eq!(notification.code(), 2),
        other => panic!("expected an OPEN error notification, got {other:?}"),
    }
}

#[test_log::test]
fn test_updates_reach_rib() {
    let (mut session, mut services) =
        established_with(test_config(), &peer_open(PEER_BGP_ID, 180));
    session
        .handle_event(&mut services, BgpEvent::UpdateMsg(end_of_rib()))
        .unwrap();
    assert_eq!(services.updates, vec![end_of_rib()]);

    services.sent.clear();
    services.pending_advertisements = vec![end_of_rib(), end_of_rib()];
    services.expire(&mut session, TimerKind::RouteAdvertisement);
    assert_eq!(
        services.sent,
        vec![
            BgpMessage::Update(end_of_rib()),
            BgpMessage::Update(end_of_rib())
        ]
    );
    assert!(services.is_running(TimerKind::RouteAdvertisement));
    assert_eq!(session.stats().update_sent(), 2);
}

fn orf_open() -> BgpMessage {
    BgpMessage::Open(BgpOpenMessage::new(
        PEER_AS as u16,
        180,
        PEER_BGP_ID,
        vec![BgpOpenMessageParameter::Capabilities(vec![
            BgpCapability::MultiProtocolExtensions(AddressType::Ipv4Unicast),
            BgpCapability::RouteRefresh,
            BgpCapability::OutboundRouteFiltering(OrfCapability::new(
                AddressType::Ipv4Unicast,
                vec![OrfCapabilityEntry::new(OrfType::AddressPrefix, OrfMode::Send)],
            )),
            BgpCapability::FourOctetAs(PEER_AS),
        ])],
    ))
}

fn prefix_entry(sequence: u32, prefix: &str) -> PrefixOrfEntry {
    PrefixOrfEntry::new(
        OrfAction::Add,
        OrfMatch::Permit,
        sequence,
        0,
        0,
        prefix.parse().unwrap(),
    )
}

fn refresh(
    address_type: AddressType,
    when: RouteRefreshWhen,
    entries: Vec<PrefixOrfEntry>,
) -> BgpEvent<SocketAddr> {
    BgpEvent::RouteRefreshMsg(BgpRouteRefreshMessage::new(
        address_type,
        Some(OrfRequest::new(
            when,
            vec![OrfFilter::new(OrfType::AddressPrefix, entries)],
        )),
    ))
}

#[test_log::test]
fn test_route_refresh_with_orf() {
    let config = PeerConfigBuilder::new()
        .allow_auto_start(false)
        .orf_prefix(vec![(AddressType::Ipv4Unicast, OrfMode::Receive)])
        .build();
    let (mut session, mut services) = established_with(config, &orf_open());

    session
        .handle_event(
            &mut services,
            refresh(
                AddressType::Ipv4Unicast,
                RouteRefreshWhen::Defer,
                vec![prefix_entry(10, "192.0.2.0/24")],
            ),
        )
        .unwrap();
    assert!(services.refreshes.is_empty());
    assert_eq!(
        session.orf_filter(AddressType::Ipv4Unicast).map(|f| f.len()),
        Some(1)
    );

    session
        .handle_event(
            &mut services,
            refresh(
                AddressType::Ipv4Unicast,
                RouteRefreshWhen::Immediate,
                vec![prefix_entry(20, "198.51.100.0/24")],
            ),
        )
        .unwrap();
    assert_eq!(services.refreshes.len(), 1);
    let (address_type, filter) = &services.refreshes[0];
    assert_eq!(*address_type, AddressType::Ipv4Unicast);
    let filter = filter.as_ref().unwrap();
    assert_eq!(filter.len(), 2);
    let permitted: IpNet = "198.51.100.0/24".parse().unwrap();
    let unknown: IpNet = "203.0.113.0/24".parse().unwrap();
    assert!(filter.permits(&permitted));
    assert!(!filter.permits(&unknown));

    // Not negotiated for IPv6, nothing happens
    session
        .handle_event(
            &mut services,
            refresh(
                AddressType::Ipv6Unicast,
                RouteRefreshWhen::Immediate,
                vec![prefix_entry(10, "2001:db8::/32")],
            ),
        )
        .unwrap();
    assert_eq!(services.refreshes.len(), 1);
    assert!(session.orf_filter(AddressType::Ipv6Unicast).is_none());
    assert_eq!(session.state(), FsmState::Established);
}

#[test_log::test]
fn test_orf_without_negotiation() {
    let (mut session, mut services) =
        established_with(test_config(), &peer_open(PEER_BGP_ID, 180));
    session
        .handle_event(
            &mut services,
            refresh(
                AddressType::Ipv4Unicast,
                RouteRefreshWhen::Immediate,
                vec![prefix_entry(10, "192.0.2.0/24")],
            ),
        )
        .unwrap();
    assert!(session.orf_filter(AddressType::Ipv4Unicast).is_none());
    assert_eq!(services.refreshes, vec![(AddressType::Ipv4Unicast, None)]);
}

#[test_log::test]
fn test_dynamic_capability() {
    let config = PeerConfigBuilder::new()
        .allow_auto_start(false)
        .dynamic_capability(true)
        .build();
    let (mut session, mut services) =
        established_with(config, &peer_open(PEER_BGP_ID, 180));
    services.sent.clear();

    let ipv6 = BgpCapability::MultiProtocolExtensions(AddressType::Ipv6Unicast);
    let message = BgpCapabilityMessage::new(vec![
        DynamicCapabilityEntry::new(false, true, DynamicCapabilityAction::Set, 7, ipv6.clone()),
        DynamicCapabilityEntry::new(
            false,
            false,
            DynamicCapabilityAction::Unset,
            8,
            BgpCapability::FourOctetAs(PEER_AS),
        ),
    ]);
    session
        .handle_event(&mut services, BgpEvent::CapabilityMsg(message))
        .unwrap();

    let received = session.capabilities().received();
    assert!(received
        .multi_protocol()
        .contains(&AddressType::Ipv6Unicast));
    assert_eq!(received.four_octet_as(), Some(PEER_AS));
    assert_eq!(
        services.sent,
        vec![BgpMessage::Capability(BgpCapabilityMessage::new(vec![
            DynamicCapabilityEntry::new(true, false, DynamicCapabilityAction::Set, 7, ipv6)
        ]))]
    );
    assert_eq!(session.state(), FsmState::Established);
}
