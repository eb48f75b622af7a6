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
    events::BgpEvent,
    fsm::{FsmState, FsmStateError},
    session::{Session, SessionServices},
};
use peerwire_bgp_pkt::{
    capabilities::{BgpCapability, OrfCapability, OrfCapabilityEntry, PeerCapabilities},
    iana::{BgpCapabilityCode, OrfMode, OrfType},
    wire::deserializer::context::SessionParameters,
};
use peerwire_iana::address_family::AddressType;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, net::Ipv4Addr, time::Duration};

/// Capabilities that can be changed on an established session with a
/// CAPABILITY message when dynamic capability is enabled
pub const DYNAMIC_CAPABILITY_CODES: [BgpCapabilityCode; 3] = [
    BgpCapabilityCode::MultiProtocolExtensions,
    BgpCapabilityCode::RouteRefresh,
    BgpCapabilityCode::OutboundRouteFiltering,
];

/// Which side initiated the TCP connection. [`ConnectionType::Active`] means
/// we connected to the peer, [`ConnectionType::Passive`] means the peer
/// connected to us.
#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display)]
pub enum ConnectionType {
    Active,
    Passive,
}

/// Peer configurations that are not changed without restarting the peer
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PeerProperties<A> {
    my_asn: u32,
    peer_asn: u32,
    my_bgp_id: Ipv4Addr,
    peer_addr: A,
}

impl<A: Clone> PeerProperties<A> {
    pub const fn new(my_asn: u32, peer_asn: u32, my_bgp_id: Ipv4Addr, peer_addr: A) -> Self {
        Self {
            my_asn,
            peer_asn,
            my_bgp_id,
            peer_addr,
        }
    }

    pub const fn my_asn(&self) -> u32 {
        self.my_asn
    }

    pub const fn peer_asn(&self) -> u32 {
        self.peer_asn
    }

    pub const fn my_bgp_id(&self) -> Ipv4Addr {
        self.my_bgp_id
    }

    pub fn peer_addr(&self) -> A {
        self.peer_addr.clone()
    }
}

/// Per peer configuration. Durations are kept as seconds, the getters return
/// [`Duration`]. Missing fields take the [`Default`] values when loaded with
/// serde.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    allow_auto_start: bool,
    passive_tcp_establishment: bool,
    send_notif_without_open: bool,
    collision_detect_established_state: bool,
    connect_retry_duration: u16,
    hold_timer_duration: u16,
    hold_timer_duration_large_value: u16,
    keepalive_timer_duration: u16,
    open_delay_timer_duration: u16,
    idle_hold_duration: u16,
    route_advertisement_duration: u16,
    as_origination_duration: u16,
    four_octet_asn: bool,
    allow_infinite_hold_time: bool,
    strict_capability_match: bool,
    dont_capability: bool,
    enforce_first_as: bool,
    confederation_id: Option<u32>,
    confederation_peers: Vec<u32>,
    address_families: Vec<AddressType>,
    orf_prefix: Vec<(AddressType, OrfMode)>,
    dynamic_capability: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            allow_auto_start: true,
            passive_tcp_establishment: false,
            send_notif_without_open: true,
            collision_detect_established_state: false,
            connect_retry_duration: 10,
            hold_timer_duration: 180,
            // RFC 4271 recommends hold timer large value to be 4 minutes
            hold_timer_duration_large_value: 240,
            keepalive_timer_duration: 30,
            open_delay_timer_duration: 0,
            idle_hold_duration: 1,
            route_advertisement_duration: 30,
            as_origination_duration: 15,
            four_octet_asn: true,
            allow_infinite_hold_time: true,
            strict_capability_match: false,
            dont_capability: false,
            enforce_first_as: false,
            confederation_id: None,
            confederation_peers: vec![],
            address_families: vec![AddressType::Ipv4Unicast],
            orf_prefix: vec![],
            dynamic_capability: false,
        }
    }
}

impl PeerConfig {
    pub const fn allow_auto_start(&self) -> bool {
        self.allow_auto_start
    }

    pub const fn passive_tcp_establishment(&self) -> bool {
        self.passive_tcp_establishment
    }

    pub const fn send_notif_without_open(&self) -> bool {
        self.send_notif_without_open
    }

    pub const fn collision_detect_established_state(&self) -> bool {
        self.collision_detect_established_state
    }

    pub const fn connect_retry_duration(&self) -> Duration {
        if self.connect_retry_duration == 0 {
            Duration::from_millis(1)
        } else {
            Duration::from_secs(self.connect_retry_duration as u64)
        }
    }

    /// Hold time proposed in our OPEN
    pub const fn hold_timer_duration(&self) -> Duration {
        Duration::from_secs(self.hold_timer_duration as u64)
    }

    /// Hold timer used while waiting for the peer's OPEN
    pub const fn hold_timer_duration_large_value(&self) -> Duration {
        Duration::from_secs(self.hold_timer_duration_large_value as u64)
    }

    pub const fn keepalive_timer_duration(&self) -> Duration {
        Duration::from_secs(self.keepalive_timer_duration as u64)
    }

    /// Zero disables the delay open timer
    pub const fn open_delay_timer_duration(&self) -> Duration {
        Duration::from_secs(self.open_delay_timer_duration as u64)
    }

    pub const fn idle_hold_duration(&self) -> Duration {
        Duration::from_secs(self.idle_hold_duration as u64)
    }

    pub const fn route_advertisement_duration(&self) -> Duration {
        Duration::from_secs(self.route_advertisement_duration as u64)
    }

    pub const fn as_origination_duration(&self) -> Duration {
        Duration::from_secs(self.as_origination_duration as u64)
    }

    pub const fn four_octet_asn(&self) -> bool {
        self.four_octet_asn
    }

    pub const fn dont_capability(&self) -> bool {
        self.dont_capability
    }

    pub const fn address_families(&self) -> &Vec<AddressType> {
        &self.address_families
    }

    pub const fn orf_prefix(&self) -> &Vec<(AddressType, OrfMode)> {
        &self.orf_prefix
    }

    pub const fn dynamic_capability(&self) -> bool {
        self.dynamic_capability
    }

    /// Parameters the decoder validates received messages against
    pub fn session_parameters<A: Clone>(&self, properties: &PeerProperties<A>) -> SessionParameters {
        let params = SessionParameters::new(
            properties.my_asn(),
            properties.peer_asn(),
            properties.my_bgp_id(),
        )
        .with_hold_time(self.hold_timer_duration)
        .with_keepalive(self.keepalive_timer_duration)
        .with_four_octet_asn(self.four_octet_asn)
        .with_allow_infinite_hold_time(self.allow_infinite_hold_time)
        .with_strict_capability_match(self.strict_capability_match)
        .with_dont_capability(self.dont_capability)
        .with_enforce_first_as(self.enforce_first_as);
        match self.confederation_id {
            Some(confederation_id) => {
                params.with_confederation(confederation_id, self.confederation_peers.clone())
            }
            None => params,
        }
    }

    /// Capabilities announced in our OPEN, none when `dont_capability` is
    /// set
    pub fn advertised_capabilities<A: Clone>(
        &self,
        properties: &PeerProperties<A>,
    ) -> PeerCapabilities {
        if self.dont_capability {
            return PeerCapabilities::default();
        }
        let mut capabilities: Vec<BgpCapability> = self
            .address_families
            .iter()
            .map(|address_type| BgpCapability::MultiProtocolExtensions(*address_type))
            .collect();
        capabilities.push(BgpCapability::RouteRefresh);
        for (address_type, mode) in &self.orf_prefix {
            capabilities.push(BgpCapability::OutboundRouteFiltering(OrfCapability::new(
                *address_type,
                vec![OrfCapabilityEntry::new(OrfType::AddressPrefix, *mode)],
            )));
        }
        if self.four_octet_asn {
            capabilities.push(BgpCapability::FourOctetAs(properties.my_asn()));
        }
        if self.dynamic_capability {
            capabilities.push(BgpCapability::DynamicCapability(
                DYNAMIC_CAPABILITY_CODES.iter().map(|code| u8::from(*code)).collect(),
            ));
        }
        PeerCapabilities::from_capabilities(&capabilities)
    }
}

#[derive(Debug, Default)]
pub struct PeerConfigBuilder {
    config: PeerConfig,
}

impl PeerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn allow_auto_start(mut self, value: bool) -> Self {
        self.config.allow_auto_start = value;
        self
    }

    pub const fn passive_tcp_establishment(mut self, value: bool) -> Self {
        self.config.passive_tcp_establishment = value;
        self
    }

    pub const fn send_notif_without_open(mut self, value: bool) -> Self {
        self.config.send_notif_without_open = value;
        self
    }

    pub const fn collision_detect_established_state(mut self, value: bool) -> Self {
        self.config.collision_detect_established_state = value;
        self
    }

    pub const fn connect_retry_duration(mut self, value: u16) -> Self {
        self.config.connect_retry_duration = value;
        self
    }

    pub const fn hold_timer_duration(mut self, value: u16) -> Self {
        self.config.hold_timer_duration = value;
        self
    }

    pub const fn hold_timer_duration_large_value(mut self, value: u16) -> Self {
        self.config.hold_timer_duration_large_value = value;
        self
    }

    pub const fn keepalive_timer_duration(mut self, value: u16) -> Self {
        self.config.keepalive_timer_duration = value;
        self
    }

    pub const fn open_delay_timer_duration(mut self, value: u16) -> Self {
        self.config.open_delay_timer_duration = value;
        self
    }

    pub const fn idle_hold_duration(mut self, value: u16) -> Self {
        self.config.idle_hold_duration = value;
        self
    }

    pub const fn route_advertisement_duration(mut self, value: u16) -> Self {
        self.config.route_advertisement_duration = value;
        self
    }

    pub const fn as_origination_duration(mut self, value: u16) -> Self {
        self.config.as_origination_duration = value;
        self
    }

    pub const fn four_octet_asn(mut self, value: bool) -> Self {
        self.config.four_octet_asn = value;
        self
    }

    pub const fn allow_infinite_hold_time(mut self, value: bool) -> Self {
        self.config.allow_infinite_hold_time = value;
        self
    }

    pub const fn strict_capability_match(mut self, value: bool) -> Self {
        self.config.strict_capability_match = value;
        self
    }

    pub const fn dont_capability(mut self, value: bool) -> Self {
        self.config.dont_capability = value;
        self
    }

    pub const fn enforce_first_as(mut self, value: bool) -> Self {
        self.config.enforce_first_as = value;
        self
    }

    pub fn confederation(mut self, confederation_id: u32, peers: Vec<u32>) -> Self {
        self.config.confederation_id = Some(confederation_id);
        self.config.confederation_peers = peers;
        self
    }

    pub fn address_families(mut self, value: Vec<AddressType>) -> Self {
        self.config.address_families = value;
        self
    }

    pub fn orf_prefix(mut self, value: Vec<(AddressType, OrfMode)>) -> Self {
        self.config.orf_prefix = value;
        self
    }

    pub const fn dynamic_capability(mut self, value: bool) -> Self {
        self.config.dynamic_capability = value;
        self
    }

    pub fn build(self) -> PeerConfig {
        self.config
    }
}

/// One of the two connections a [`Peer`] can hold at the same time
#[derive(Debug, Copy, Clone, Eq, PartialEq, strum_macros::Display)]
pub enum ConnectionSlot {
    Main,
    Tracked,
}

/// A BGP peer with its main session and, during a connection collision, the
/// session of the second connection.
#[derive(Debug)]
pub struct Peer<A> {
    properties: PeerProperties<A>,
    config: PeerConfig,
    session: Session<A>,
    tracked_session: Option<Session<A>>,
}

impl<A: Display + Clone> Peer<A> {
    pub fn new(properties: PeerProperties<A>, config: PeerConfig) -> Self {
        let session = Session::new(properties.clone(), config.clone());
        Self {
            properties,
            config,
            session,
            tracked_session: None,
        }
    }

    pub const fn properties(&self) -> &PeerProperties<A> {
        &self.properties
    }

    pub const fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub const fn session(&self) -> &Session<A> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<A> {
        &mut self.session
    }

    pub const fn tracked_session(&self) -> Option<&Session<A>> {
        self.tracked_session.as_ref()
    }

    pub fn tracked_session_mut(&mut self) -> Option<&mut Session<A>> {
        self.tracked_session.as_mut()
    }

    /// Open a second session for a connection arriving while the main
    /// session already has one. Returns `None` when the connection must be
    /// refused: a second connection is already tracked, or the main session
    /// is established and collisions are not detected in that state.
    pub fn track_connection(&mut self) -> Option<&mut Session<A>> {
        if self.tracked_session.is_some() {
            log::info!(
                "[{}][{}] Refusing connection, a second connection is already tracked",
                self.properties.peer_addr(),
                self.session.state()
            );
            return None;
        }
        if self.session.state() == FsmState::Established
            && !self.config.collision_detect_established_state()
        {
            log::info!(
                "[{}][{}] Refusing connection to established peer",
                self.properties.peer_addr(),
                self.session.state()
            );
            return None;
        }
        let session = Session::new(self.properties.clone(), self.config.clone());
        Some(self.tracked_session.insert(session))
    }

    /// Connection to close when both connections reached the OPEN exchange,
    /// following [RFC4271 Section 6.8](https://datatracker.ietf.org/doc/html/rfc4271#section-6.8):
    /// if our BGP identifier is lower than the peer's, the connection we
    /// initiated is closed, otherwise the one the peer initiated. An
    /// established main session always wins unless collisions are detected
    /// in Established.
    pub fn collision_loser(&self) -> Option<ConnectionSlot> {
        let tracked = self.tracked_session.as_ref()?;
        if tracked.state() == FsmState::Idle {
            return None;
        }
        if self.session.state() == FsmState::Established
            && !self.config.collision_detect_established_state()
        {
            return Some(ConnectionSlot::Tracked);
        }
        let remote_bgp_id = tracked
            .remote_bgp_id()
            .or_else(|| self.session.remote_bgp_id())?;
        let colliding = |session: &Session<A>| {
            session.state().is_opening()
                || session.delay_open_running()
                || (session.state() == FsmState::Established
                    && self.config.collision_detect_established_state())
        };
        if !colliding(&self.session) || !colliding(tracked) {
            return None;
        }
        let losing_type = if self.properties.my_bgp_id() < remote_bgp_id {
            ConnectionType::Active
        } else {
            ConnectionType::Passive
        };
        if self.session.connection_type() == Some(losing_type)
            && tracked.connection_type() != Some(losing_type)
        {
            Some(ConnectionSlot::Main)
        } else {
            Some(ConnectionSlot::Tracked)
        }
    }

    /// Close the `loser` connection, as picked by [`Peer::collision_loser`],
    /// with a Cease NOTIFICATION sent through the services of that
    /// connection. The surviving session is the main session afterwards, the
    /// caller swaps whatever it keeps per connection when
    /// [`ConnectionSlot::Main`] lost.
    pub fn resolve_collision<S: SessionServices>(
        &mut self,
        loser: ConnectionSlot,
        loser_services: &mut S,
    ) -> Result<(), FsmStateError> {
        let mut tracked = match self.tracked_session.take() {
            Some(tracked) => tracked,
            None => return Ok(()),
        };
        log::info!(
            "[{}][{}] Connection collision detected, closing the {loser} connection",
            self.properties.peer_addr(),
            self.session.state()
        );
        match loser {
            ConnectionSlot::Main => {
                std::mem::swap(&mut self.session, &mut tracked);
                tracked.handle_event(loser_services, BgpEvent::OpenCollisionDump)
            }
            ConnectionSlot::Tracked => {
                tracked.handle_event(loser_services, BgpEvent::OpenCollisionDump)
            }
        }
    }

    /// Replace the main session with the tracked one, used when the main
    /// connection went away while the second one is still up
    pub fn promote_tracked(&mut self) -> bool {
        match self.tracked_session.take() {
            Some(tracked) => {
                log::info!(
                    "[{}][{}] Main connection is gone, continuing with the second connection",
                    self.properties.peer_addr(),
                    tracked.state()
                );
                self.session = tracked;
                true
            }
            None => false,
        }
    }

    /// Drop the tracked session once it fell back to Idle on its own
    pub fn clear_idle_tracked(&mut self) -> bool {
        if self
            .tracked_session
            .as_ref()
            .is_some_and(|tracked| tracked.state() == FsmState::Idle)
        {
            self.tracked_session = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PeerConfig::default();
        assert_eq!(config.connect_retry_duration(), Duration::from_secs(10));
        assert_eq!(config.hold_timer_duration(), Duration::from_secs(180));
        assert_eq!(
            config.hold_timer_duration_large_value(),
            Duration::from_secs(240)
        );
        assert_eq!(config.keepalive_timer_duration(), Duration::from_secs(30));
        assert_eq!(config.open_delay_timer_duration(), Duration::ZERO);
        assert_eq!(config.route_advertisement_duration(), Duration::from_secs(30));
        assert_eq!(config.as_origination_duration(), Duration::from_secs(15));
        assert_eq!(config.address_families(), &vec![AddressType::Ipv4Unicast]);

        let config = PeerConfigBuilder::new().connect_retry_duration(0).build();
        assert_eq!(config.connect_retry_duration(), Duration::from_millis(1));
    }

    #[test]
    fn test_config_serde() {
        let config: PeerConfig =
            serde_json::from_str(r#"{"hold_timer_duration": 90, "passive_tcp_establishment": true}"#)
                .unwrap();
        let expected = PeerConfigBuilder::new()
            .hold_timer_duration(90)
            .passive_tcp_establishment(true)
            .build();
        assert_eq!(config, expected);
    }

    #[test]
    fn test_advertised_capabilities() {
        let properties = PeerProperties::new(4200000000, 65001, Ipv4Addr::new(10, 0, 0, 2), "peer");
        let config = PeerConfigBuilder::new()
            .address_families(vec![AddressType::Ipv4Unicast, AddressType::Ipv6Unicast])
            .orf_prefix(vec![(AddressType::Ipv4Unicast, OrfMode::Both)])
            .dynamic_capability(true)
            .build();
        let caps = config.advertised_capabilities(&properties);
        assert_eq!(caps.address_types().len(), 2);
        assert!(caps.route_refresh());
        assert_eq!(caps.orf_mode(AddressType::Ipv4Unicast), Some(OrfMode::Both));
        assert_eq!(caps.four_octet_as(), Some(4200000000));
        assert_eq!(caps.dynamic_capability(), Some(&vec![1, 2, 3]));

        let config = PeerConfigBuilder::new().dont_capability(true).build();
        assert!(config.advertised_capabilities(&properties).is_empty());
        assert!(config.session_parameters(&properties).dont_capability());
    }

    #[test]
    fn test_session_parameters() {
        let properties = PeerProperties::new(65000, 65000, Ipv4Addr::new(10, 0, 0, 2), "peer");
        let config = PeerConfigBuilder::new()
            .hold_timer_duration(90)
            .confederation(64512, vec![65010])
            .build();
        let params = config.session_parameters(&properties);
        assert_eq!(params.hold_time(), 90);
        assert_eq!(params.keepalive(), 30);
        assert_eq!(params.confederation_id(), Some(64512));
        assert!(!params.is_ebgp());
    }
}
