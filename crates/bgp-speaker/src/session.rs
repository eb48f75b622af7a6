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

//! A single BGP session: one TCP connection to a peer, the bytes received on
//! it and the finite state machine reacting to them.
//!
//! The session performs no I/O on its own. Timers, the connection and the
//! routing table are collaborators passed to every call as
//! [`SessionServices`], which keeps the state machine synchronous and
//! deterministic.

use crate::{
    events::{BgpEvent, TimerKind},
    fsm::{FsmState, FsmStateError},
    orf::PrefixOrfFilter,
    peer::{ConnectionType, PeerConfig, PeerProperties},
    stats::SessionStats,
};
use peerwire_bgp_pkt::{
    capabilities::{CapabilityRecord, PeerCapabilities},
    dynamic_capability::{BgpCapabilityMessage, DynamicCapabilityAction, DynamicCapabilityEntry},
    iana::{CeaseErrorSubCode, FiniteStateMachineErrorSubCode, AS_TRANS},
    notification::BgpNotificationMessage,
    open::{BgpOpenMessage, BgpOpenMessageParameter},
    route_refresh::BgpRouteRefreshMessage,
    update::BgpUpdateMessage,
    wire::{
        deserializer::{
            context::{SessionContext, SessionParameters},
            open::ReceivedOpen,
            DecodeStatus, MessageDecoder,
        },
        serializer::BgpMessageWritingError,
        BGP_HEADER_LENGTH, BGP_MAX_MESSAGE_LENGTH,
    },
    BgpMessage,
};
use peerwire_iana::address_family::AddressType;
use peerwire_parse_utils::ring_buffer::RingBuffer;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::{collections::BTreeMap, fmt::Display, net::Ipv4Addr, time::Duration};

/// Size of the receive ring of each session
pub const RING_BUFFER_CAPACITY: usize = 4 * BGP_MAX_MESSAGE_LENGTH as usize;

/// Arms and cancels the timers of a session. Expired timers are fed back to
/// [`Session::handle_event`] as their [`BgpEvent`].
pub trait TimerService {
    /// Start the timer, replacing it if it is already running
    fn start_timer(&mut self, timer: TimerKind, duration: Duration);

    fn stop_timer(&mut self, timer: TimerKind);
}

/// The TCP connection of a session
pub trait Transport {
    /// Queue a message for the peer
    fn send(&mut self, message: &BgpMessage, asn4: bool) -> Result<(), BgpMessageWritingError>;

    /// Initiate a connection to the peer. The outcome comes back as
    /// [`BgpEvent::TcpConnectionRequestAcked`] or
    /// [`BgpEvent::TcpConnectionFails`].
    fn connect(&mut self);

    /// Close the connection once the queued messages are written
    fn disconnect(&mut self);
}

/// Routing table side of a session
pub trait RibService {
    fn session_established(&mut self, capabilities: &CapabilityRecord);

    fn session_closed(&mut self);

    fn update_received(&mut self, update: BgpUpdateMessage);

    /// The peer asked for the routes of the AFI/SAFI to be sent again, the
    /// filter holds the prefix ORF the peer installed, if any.
    fn refresh_requested(&mut self, address_type: AddressType, filter: Option<&PrefixOrfFilter>);

    /// Updates held back until the route advertisement interval elapsed
    fn pending_advertisements(&mut self) -> Vec<BgpUpdateMessage>;

    /// Locally originated updates held back until the AS origination
    /// interval elapsed
    fn pending_originations(&mut self) -> Vec<BgpUpdateMessage>;
}

/// Everything a [`Session`] needs from its environment
pub trait SessionServices: TimerService + Transport + RibService {}

impl<T: TimerService + Transport + RibService> SessionServices for T {}

/// Result of [`Session::process_input`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReadStatus {
    /// Wait for the socket to be readable again
    NeedMoreData,
    /// Enough bytes are buffered to run the next step right away
    ReadLoop,
}

#[derive(Debug)]
pub struct Session<A> {
    properties: PeerProperties<A>,
    config: PeerConfig,
    params: SessionParameters,
    state: FsmState,
    connection_type: Option<ConnectionType>,
    capabilities: CapabilityRecord,
    ring: RingBuffer,
    decoder: MessageDecoder,
    remote_bgp_id: Option<Ipv4Addr>,
    hold_time: u16,
    keepalive: u16,
    delay_open_running: bool,
    connect_retry_counter: u32,
    orf_filters: BTreeMap<AddressType, PrefixOrfFilter>,
    stats: SessionStats,
    rng: SmallRng,
}

impl<A: Display + Clone> Session<A> {
    pub fn new(properties: PeerProperties<A>, config: PeerConfig) -> Self {
        Self::with_rng(properties, config, SmallRng::from_os_rng())
    }

    /// Same as [`Session::new`] with a caller provided source for the
    /// connect retry jitter
    pub fn with_rng(properties: PeerProperties<A>, config: PeerConfig, rng: SmallRng) -> Self {
        let params = config.session_parameters(&properties);
        let advertised = config.advertised_capabilities(&properties);
        Self {
            hold_time: params.hold_time(),
            keepalive: params.keepalive(),
            properties,
            config,
            params,
            state: FsmState::Idle,
            connection_type: None,
            capabilities: CapabilityRecord::new(advertised, PeerCapabilities::default()),
            ring: RingBuffer::with_capacity(RING_BUFFER_CAPACITY),
            decoder: MessageDecoder::new(),
            remote_bgp_id: None,
            delay_open_running: false,
            connect_retry_counter: 0,
            orf_filters: BTreeMap::new(),
            stats: SessionStats::default(),
            rng,
        }
    }

    pub const fn state(&self) -> FsmState {
        self.state
    }

    pub const fn properties(&self) -> &PeerProperties<A> {
        &self.properties
    }

    pub const fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub const fn session_parameters(&self) -> &SessionParameters {
        &self.params
    }

    pub const fn capabilities(&self) -> &CapabilityRecord {
        &self.capabilities
    }

    pub const fn connection_type(&self) -> Option<ConnectionType> {
        self.connection_type
    }

    /// BGP identifier from the peer's OPEN
    pub const fn remote_bgp_id(&self) -> Option<Ipv4Addr> {
        self.remote_bgp_id
    }

    /// Hold time in effect, the negotiated one once the peer's OPEN arrived
    pub const fn hold_time(&self) -> u16 {
        self.hold_time
    }

    /// Keepalive interval in effect, the negotiated one once the peer's OPEN
    /// arrived
    pub const fn keepalive(&self) -> u16 {
        self.keepalive
    }

    pub const fn delay_open_running(&self) -> bool {
        self.delay_open_running
    }

    pub const fn connect_retry_counter(&self) -> u32 {
        self.connect_retry_counter
    }

    pub const fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn orf_filter(&self, address_type: AddressType) -> Option<&PrefixOrfFilter> {
        self.orf_filters.get(&address_type)
    }

    /// Free space in the receive ring
    pub fn free_space(&self) -> usize {
        self.ring.free_space()
    }

    /// The OPEN message we send to the peer. ASNs that don't fit in two
    /// octets are sent as AS_TRANS, the real value travels in the 4-octet AS
    /// capability.
    pub fn open_message(&self) -> BgpOpenMessage {
        let my_as = u16::try_from(self.params.local_asn()).unwrap_or(AS_TRANS);
        let capabilities = self.capabilities.advertised().to_capabilities();
        let params = if capabilities.is_empty() {
            vec![]
        } else {
            vec![BgpOpenMessageParameter::Capabilities(capabilities)]
        };
        BgpOpenMessage::new(
            my_as,
            self.params.hold_time(),
            self.params.local_bgp_id(),
            params,
        )
    }

    /// Copy bytes read from the connection into the receive ring. Returns how
    /// many bytes were taken, the rest must be offered again after
    /// [`Session::process_input`] made room.
    pub fn receive(&mut self, data: &[u8]) -> usize {
        let written = self.ring.write(data);
        if written < data.len() {
            log::debug!(
                "[{}][{}] Receive buffer full, {} bytes left for later",
                self.properties.peer_addr(),
                self.state,
                data.len() - written
            );
        }
        written
    }

    /// Run one decode step over the buffered bytes and hand the outcome to
    /// the state machine. Produces at most one message.
    pub fn process_input<S: SessionServices>(
        &mut self,
        services: &mut S,
    ) -> Result<ReadStatus, FsmStateError> {
        if self.state == FsmState::Idle {
            self.ring.reset();
            return Ok(ReadStatus::NeedMoreData);
        }
        let status = {
            let ctx = SessionContext::new(&self.params, &self.capabilities);
            self.decoder.decode_step(&mut self.ring, &ctx)
        };
        let event = match status {
            DecodeStatus::NeedMoreData => return Ok(ReadStatus::NeedMoreData),
            DecodeStatus::ReadLoop => return Ok(ReadStatus::ReadLoop),
            DecodeStatus::Decoded(message) => {
                self.stats.message_received(&message);
                BgpEvent::from_message(message, self.delay_open_running)
            }
            DecodeStatus::Discarded(reason) => {
                self.stats.message_discarded();
                BgpEvent::MessageDiscarded(reason)
            }
            DecodeStatus::Malformed(err) => {
                log::warn!(
                    "[{}][{}] Malformed message received: {err:?}",
                    self.properties.peer_addr(),
                    self.state
                );
                BgpEvent::from(err)
            }
        };
        self.handle_event(services, event)?;
        if self.state != FsmState::Idle
            && self.ring.bytes_available_to_read() >= BGP_HEADER_LENGTH as usize
        {
            Ok(ReadStatus::ReadLoop)
        } else {
            Ok(ReadStatus::NeedMoreData)
        }
    }

    pub fn handle_event<S: SessionServices>(
        &mut self,
        services: &mut S,
        event: BgpEvent<A>,
    ) -> Result<(), FsmStateError> {
        log::debug!(
            "[{}][{}] Handling event: {event}",
            self.properties.peer_addr(),
            self.state
        );
        match self.state {
            FsmState::Idle => self.handle_idle_event(services, event),
            FsmState::Connect | FsmState::Active => self.handle_connect_event(services, event),
            FsmState::OpenSent => self.handle_open_sent_event(services, event),
            FsmState::OpenConfirm => self.handle_open_confirm_event(services, event),
            FsmState::Established => self.handle_established_event(services, event),
        }
    }

    fn handle_idle_event<S: SessionServices>(
        &mut self,
        services: &mut S,
        event: BgpEvent<A>,
    ) -> Result<(), FsmStateError> {
        let passive = self.config.passive_tcp_establishment();
        match event {
            BgpEvent::ManualStart => self.start(services, passive, true),
            BgpEvent::ManualStartWithPassiveTcp => self.start(services, true, true),
            BgpEvent::AutomaticStart | BgpEvent::AutomaticStartWithDampPeerOscillations => {
                self.start(services, passive, false)
            }
            BgpEvent::AutomaticStartWithPassiveTcp
            | BgpEvent::AutomaticStartWithDampPeerOscillationsPassiveTcp => {
                self.start(services, true, false)
            }
            BgpEvent::IdleHoldTimerExpires => {
                if self.config.allow_auto_start() {
                    log::info!(
                        "[{}][{}] Idle hold time elapsed, restarting",
                        self.properties.peer_addr(),
                        self.state
                    );
                    self.start(services, passive, false);
                }
            }
            BgpEvent::ManualStop => services.stop_timer(TimerKind::IdleHold),
            BgpEvent::TcpConnectionRequestAcked(_) | BgpEvent::TcpConnectionConfirmed(_) => {
                log::info!(
                    "[{}][{}] Rejecting connection, the session is not started",
                    self.properties.peer_addr(),
                    self.state
                );
                services.disconnect();
            }
            BgpEvent::AutomaticStop
            | BgpEvent::ConnectRetryTimerExpires
            | BgpEvent::HoldTimerExpires
            | BgpEvent::KeepAliveTimerExpires
            | BgpEvent::DelayOpenTimerExpires
            | BgpEvent::TcpConnectionValid(_)
            | BgpEvent::TcpConnectionRequestInvalid
            | BgpEvent::TcpConnectionFails
            | BgpEvent::BGPOpen(_)
            | BgpEvent::BGPOpenWithDelayOpenTimer(_)
            | BgpEvent::BGPHeaderErr(_)
            | BgpEvent::BGPOpenMsgErr(_)
            | BgpEvent::OpenCollisionDump
            | BgpEvent::NotifMsgVerErr
            | BgpEvent::NotifMsg(_)
            | BgpEvent::KeepAliveMsg
            | BgpEvent::UpdateMsg(_)
            | BgpEvent::UpdateMsgErr(_)
            | BgpEvent::RouteRefreshMsg(_)
            | BgpEvent::RouteRefreshMsgErr(_)
            | BgpEvent::CapabilityMsg(_)
            | BgpEvent::CapabilityMsgErr(_)
            | BgpEvent::MessageDiscarded(_)
            | BgpEvent::RouteAdvertisementTimerExpires
            | BgpEvent::AsOriginationTimerExpires => {}
        }
        Ok(())
    }

    /// Connect and Active share their transitions, they only differ on
    /// connection failures and connect retry expiry
    fn handle_connect_event<S: SessionServices>(
        &mut self,
        services: &mut S,
        event: BgpEvent<A>,
    ) -> Result<(), FsmStateError> {
        match event {
            BgpEvent::ManualStart
            | BgpEvent::AutomaticStart
            | BgpEvent::ManualStartWithPassiveTcp
            | BgpEvent::AutomaticStartWithPassiveTcp
            | BgpEvent::AutomaticStartWithDampPeerOscillations
            | BgpEvent::AutomaticStartWithDampPeerOscillationsPassiveTcp => {}
            BgpEvent::ManualStop => {
                self.connect_retry_counter = 0;
                self.release(services, false);
            }
            BgpEvent::AutomaticStop => {
                self.connect_retry_counter += 1;
                self.release(services, false);
            }
            BgpEvent::ConnectRetryTimerExpires => {
                if self.state == FsmState::Connect {
                    services.disconnect();
                    services.stop_timer(TimerKind::DelayOpen);
                    self.reset_connection();
                }
                self.start_connect_retry_timer(services);
                services.connect();
                self.fsm_transition(FsmState::Connect);
            }
            BgpEvent::DelayOpenTimerExpires => {
                if self.delay_open_running {
                    self.delay_open_running = false;
                    self.send_open(services)?;
                }
            }
            BgpEvent::TcpConnectionValid(_) | BgpEvent::TcpConnectionRequestInvalid => {}
            BgpEvent::TcpConnectionRequestAcked(_) => {
                self.connection_made(services, ConnectionType::Active)?
            }
            BgpEvent::TcpConnectionConfirmed(_) => {
                self.connection_made(services, ConnectionType::Passive)?
            }
            BgpEvent::TcpConnectionFails => {
                if self.state == FsmState::Connect && self.delay_open_running {
                    services.stop_timer(TimerKind::DelayOpen);
                    self.reset_connection();
                    self.start_connect_retry_timer(services);
                    self.fsm_transition(FsmState::Active);
                } else if self.state == FsmState::Connect {
                    self.release(services, true);
                } else {
                    self.connect_retry_counter += 1;
                    self.release(services, true);
                }
            }
            BgpEvent::BGPOpenWithDelayOpenTimer(open) => {
                self.open_received(services, open);
                self.send(services, BgpMessage::Open(self.open_message()))?;
                self.send(services, BgpMessage::KeepAlive)?;
                self.fsm_transition(FsmState::OpenConfirm);
                self.start_session_timers(services);
            }
            event @ (BgpEvent::BGPHeaderErr(_)
            | BgpEvent::RouteRefreshMsgErr(_)
            | BgpEvent::BGPOpenMsgErr(_)) => {
                let notification = event
                    .notification()
                    .filter(|_| self.config.send_notif_without_open());
                self.fail(services, notification);
            }
            BgpEvent::NotifMsgVerErr => {
                if !self.delay_open_running {
                    self.connect_retry_counter += 1;
                }
                self.release(services, true);
            }
            BgpEvent::HoldTimerExpires
            | BgpEvent::KeepAliveTimerExpires
            | BgpEvent::IdleHoldTimerExpires
            | BgpEvent::BGPOpen(_)
            | BgpEvent::OpenCollisionDump
            | BgpEvent::NotifMsg(_)
            | BgpEvent::KeepAliveMsg
            | BgpEvent::UpdateMsg(_)
            | BgpEvent::UpdateMsgErr(_)
            | BgpEvent::RouteRefreshMsg(_)
            | BgpEvent::CapabilityMsg(_)
            | BgpEvent::CapabilityMsgErr(_)
            | BgpEvent::MessageDiscarded(_)
            | BgpEvent::RouteAdvertisementTimerExpires
            | BgpEvent::AsOriginationTimerExpires => self.fail(services, None),
        }
        Ok(())
    }

    fn handle_open_sent_event<S: SessionServices>(
        &mut self,
        services: &mut S,
        event: BgpEvent<A>,
    ) -> Result<(), FsmStateError> {
        match event {
            BgpEvent::ManualStart
            | BgpEvent::AutomaticStart
            | BgpEvent::ManualStartWithPassiveTcp
            | BgpEvent::AutomaticStartWithPassiveTcp
            | BgpEvent::AutomaticStartWithDampPeerOscillations
            | BgpEvent::AutomaticStartWithDampPeerOscillationsPassiveTcp => {}
            BgpEvent::ManualStop => self.stop(services, true),
            BgpEvent::AutomaticStop => self.stop(services, false),
            BgpEvent::HoldTimerExpires => {
                self.fail(services, Some(BgpNotificationMessage::hold_timer_expired()))
            }
            BgpEvent::TcpConnectionValid(_)
            | BgpEvent::TcpConnectionRequestInvalid
            | BgpEvent::TcpConnectionRequestAcked(_)
            | BgpEvent::TcpConnectionConfirmed(_) => {}
            BgpEvent::TcpConnectionFails => {
                services.disconnect();
                services.stop_timer(TimerKind::Hold);
                self.reset_connection();
                self.start_connect_retry_timer(services);
                self.fsm_transition(FsmState::Active);
            }
            BgpEvent::BGPOpen(open) => {
                self.open_received(services, open);
                self.send(services, BgpMessage::KeepAlive)?;
                self.fsm_transition(FsmState::OpenConfirm);
                self.start_session_timers(services);
            }
            event @ (BgpEvent::BGPHeaderErr(_)
            | BgpEvent::RouteRefreshMsgErr(_)
            | BgpEvent::BGPOpenMsgErr(_)) => {
                let notification = event.notification();
                self.fail(services, notification);
            }
            BgpEvent::OpenCollisionDump => self.fail(
                services,
                Some(BgpNotificationMessage::cease(
                    CeaseErrorSubCode::ConnectionCollisionResolution,
                )),
            ),
            BgpEvent::NotifMsgVerErr => self.release(services, true),
            BgpEvent::NotifMsg(_) => self.fail(services, None),
            BgpEvent::ConnectRetryTimerExpires
            | BgpEvent::KeepAliveTimerExpires
            | BgpEvent::DelayOpenTimerExpires
            | BgpEvent::IdleHoldTimerExpires
            | BgpEvent::BGPOpenWithDelayOpenTimer(_)
            | BgpEvent::KeepAliveMsg
            | BgpEvent::UpdateMsg(_)
            | BgpEvent::UpdateMsgErr(_)
            | BgpEvent::RouteRefreshMsg(_)
            | BgpEvent::CapabilityMsg(_)
            | BgpEvent::CapabilityMsgErr(_)
            | BgpEvent::MessageDiscarded(_)
            | BgpEvent::RouteAdvertisementTimerExpires
            | BgpEvent::AsOriginationTimerExpires => self.fail(
                services,
                Some(BgpNotificationMessage::fsm_error(
                    FiniteStateMachineErrorSubCode::ReceiveUnexpectedMessageInOpenSentState,
                )),
            ),
        }
        Ok(())
    }

    fn handle_open_confirm_event<S: SessionServices>(
        &mut self,
        services: &mut S,
        event: BgpEvent<A>,
    ) -> Result<(), FsmStateError> {
        match event {
            BgpEvent::ManualStart
            | BgpEvent::AutomaticStart
            | BgpEvent::ManualStartWithPassiveTcp
            | BgpEvent::AutomaticStartWithPassiveTcp
            | BgpEvent::AutomaticStartWithDampPeerOscillations
            | BgpEvent::AutomaticStartWithDampPeerOscillationsPassiveTcp => {}
            BgpEvent::ManualStop => self.stop(services, true),
            BgpEvent::AutomaticStop => self.stop(services, false),
            BgpEvent::HoldTimerExpires => {
                self.fail(services, Some(BgpNotificationMessage::hold_timer_expired()))
            }
            BgpEvent::KeepAliveTimerExpires => {
                self.send(services, BgpMessage::KeepAlive)?;
                self.restart_keepalive_timer(services);
            }
            BgpEvent::TcpConnectionValid(_)
            | BgpEvent::TcpConnectionRequestInvalid
            | BgpEvent::TcpConnectionRequestAcked(_)
            | BgpEvent::TcpConnectionConfirmed(_) => {}
            BgpEvent::TcpConnectionFails | BgpEvent::NotifMsg(_) => self.fail(services, None),
            BgpEvent::NotifMsgVerErr => self.release(services, true),
            event @ (BgpEvent::BGPHeaderErr(_)
            | BgpEvent::RouteRefreshMsgErr(_)
            | BgpEvent::BGPOpenMsgErr(_)) => {
                let notification = event.notification();
                self.fail(services, notification);
            }
            BgpEvent::OpenCollisionDump => self.fail(
                services,
                Some(BgpNotificationMessage::cease(
                    CeaseErrorSubCode::ConnectionCollisionResolution,
                )),
            ),
            BgpEvent::KeepAliveMsg => {
                self.restart_hold_timer(services);
                self.fsm_transition(FsmState::Established);
                self.stats.established();
                services.session_established(&self.capabilities);
                self.start_advertisement_timers(services);
            }
            BgpEvent::ConnectRetryTimerExpires
            | BgpEvent::DelayOpenTimerExpires
            | BgpEvent::IdleHoldTimerExpires
            | BgpEvent::BGPOpen(_)
            | BgpEvent::BGPOpenWithDelayOpenTimer(_)
            | BgpEvent::UpdateMsg(_)
            | BgpEvent::UpdateMsgErr(_)
            | BgpEvent::RouteRefreshMsg(_)
            | BgpEvent::CapabilityMsg(_)
            | BgpEvent::CapabilityMsgErr(_)
            | BgpEvent::MessageDiscarded(_)
            | BgpEvent::RouteAdvertisementTimerExpires
            | BgpEvent::AsOriginationTimerExpires => self.fail(
                services,
                Some(BgpNotificationMessage::fsm_error(
                    FiniteStateMachineErrorSubCode::ReceiveUnexpectedMessageInOpenConfirmState,
                )),
            ),
        }
        Ok(())
    }

    fn handle_established_event<S: SessionServices>(
        &mut self,
        services: &mut S,
        event: BgpEvent<A>,
    ) -> Result<(), FsmStateError> {
        match event {
            BgpEvent::ManualStart
            | BgpEvent::AutomaticStart
            | BgpEvent::ManualStartWithPassiveTcp
            | BgpEvent::AutomaticStartWithPassiveTcp
            | BgpEvent::AutomaticStartWithDampPeerOscillations
            | BgpEvent::AutomaticStartWithDampPeerOscillationsPassiveTcp => {}
            BgpEvent::ManualStop => self.stop(services, true),
            BgpEvent::AutomaticStop => self.stop(services, false),
            BgpEvent::HoldTimerExpires => {
                self.fail(services, Some(BgpNotificationMessage::hold_timer_expired()))
            }
            BgpEvent::KeepAliveTimerExpires => {
                self.send(services, BgpMessage::KeepAlive)?;
                self.restart_keepalive_timer(services);
            }
            BgpEvent::TcpConnectionValid(_)
            | BgpEvent::TcpConnectionRequestInvalid
            | BgpEvent::TcpConnectionRequestAcked(_)
            | BgpEvent::TcpConnectionConfirmed(_) => {}
            BgpEvent::OpenCollisionDump => {
                if self.config.collision_detect_established_state() {
                    self.fail(
                        services,
                        Some(BgpNotificationMessage::cease(
                            CeaseErrorSubCode::ConnectionCollisionResolution,
                        )),
                    );
                }
            }
            BgpEvent::TcpConnectionFails | BgpEvent::NotifMsgVerErr | BgpEvent::NotifMsg(_) => {
                self.fail(services, None)
            }
            BgpEvent::KeepAliveMsg => self.restart_hold_timer(services),
            BgpEvent::UpdateMsg(update) => {
                self.restart_hold_timer(services);
                services.update_received(update);
            }
            BgpEvent::RouteRefreshMsg(route_refresh) => {
                self.restart_hold_timer(services);
                self.route_refresh_received(services, route_refresh);
            }
            BgpEvent::CapabilityMsg(capability) => {
                self.restart_hold_timer(services);
                self.capability_message_received(services, capability)?;
            }
            BgpEvent::MessageDiscarded(reason) => {
                log::debug!(
                    "[{}][{}] Message discarded: {reason:?}",
                    self.properties.peer_addr(),
                    self.state
                );
                self.restart_hold_timer(services);
            }
            event @ (BgpEvent::BGPHeaderErr(_)
            | BgpEvent::RouteRefreshMsgErr(_)
            | BgpEvent::BGPOpenMsgErr(_)
            | BgpEvent::UpdateMsgErr(_)
            | BgpEvent::CapabilityMsgErr(_)) => {
                let notification = event.notification();
                self.fail(services, notification);
            }
            BgpEvent::RouteAdvertisementTimerExpires => {
                let updates = services.pending_advertisements();
                self.send_updates(services, updates)?;
                services.start_timer(
                    TimerKind::RouteAdvertisement,
                    self.config.route_advertisement_duration(),
                );
            }
            BgpEvent::AsOriginationTimerExpires => {
                let updates = services.pending_originations();
                self.send_updates(services, updates)?;
                services.start_timer(
                    TimerKind::AsOrigination,
                    self.config.as_origination_duration(),
                );
            }
            BgpEvent::ConnectRetryTimerExpires
            | BgpEvent::DelayOpenTimerExpires
            | BgpEvent::IdleHoldTimerExpires
            | BgpEvent::BGPOpen(_)
            | BgpEvent::BGPOpenWithDelayOpenTimer(_) => self.fail(
                services,
                Some(BgpNotificationMessage::fsm_error(
                    FiniteStateMachineErrorSubCode::ReceiveUnexpectedMessageInEstablishedState,
                )),
            ),
        }
        Ok(())
    }

    fn fsm_transition(&mut self, new_state: FsmState) {
        if self.state == new_state {
            return;
        }
        log::info!(
            "[{}][{}] FSM state transitions from {} to {}",
            self.properties.peer_addr(),
            self.state,
            self.state,
            new_state
        );
        self.state = new_state;
    }

    fn start<S: SessionServices>(&mut self, services: &mut S, passive: bool, manual: bool) {
        if manual {
            self.connect_retry_counter = 0;
        }
        services.stop_timer(TimerKind::IdleHold);
        self.start_connect_retry_timer(services);
        if passive {
            self.fsm_transition(FsmState::Active);
        } else {
            services.connect();
            self.fsm_transition(FsmState::Connect);
        }
    }

    /// Administrative stop after the OPEN was sent
    fn stop<S: SessionServices>(&mut self, services: &mut S, manual: bool) {
        self.send_notification(
            services,
            BgpNotificationMessage::cease(CeaseErrorSubCode::AdministrativeShutdown),
        );
        if manual {
            self.connect_retry_counter = 0;
        } else {
            self.connect_retry_counter += 1;
        }
        self.release(services, false);
    }

    /// Close the session on an error, optionally telling the peer why
    fn fail<S: SessionServices>(
        &mut self,
        services: &mut S,
        notification: Option<BgpNotificationMessage>,
    ) {
        if let Some(notification) = notification {
            self.send_notification(services, notification);
        }
        self.connect_retry_counter += 1;
        self.release(services, true);
    }

    /// Drop the connection and everything learned from it, then go back to
    /// Idle. Non administrative closes restart the session after the idle
    /// hold time when automatic start is allowed.
    fn release<S: SessionServices>(&mut self, services: &mut S, restart: bool) {
        for timer in TimerKind::ALL {
            services.stop_timer(timer);
        }
        services.disconnect();
        let was_established = self.state == FsmState::Established;
        self.reset_connection();
        self.orf_filters.clear();
        if was_established {
            services.session_closed();
        }
        self.fsm_transition(FsmState::Idle);
        if restart && self.config.allow_auto_start() {
            log::info!(
                "[{}][{}] Restarting in {:?}",
                self.properties.peer_addr(),
                self.state,
                self.config.idle_hold_duration()
            );
            services.start_timer(TimerKind::IdleHold, self.config.idle_hold_duration());
        }
    }

    fn reset_connection(&mut self) {
        self.ring.reset();
        self.decoder.reset();
        self.capabilities.set_received(PeerCapabilities::default());
        self.remote_bgp_id = None;
        self.hold_time = self.params.hold_time();
        self.keepalive = self.params.keepalive();
        self.delay_open_running = false;
        self.connection_type = None;
    }

    fn connection_made<S: SessionServices>(
        &mut self,
        services: &mut S,
        connection_type: ConnectionType,
    ) -> Result<(), FsmStateError> {
        log::info!(
            "[{}][{}] {connection_type} TCP connection established",
            self.properties.peer_addr(),
            self.state
        );
        self.connection_type = Some(connection_type);
        services.stop_timer(TimerKind::ConnectRetry);
        let delay_open = self.config.open_delay_timer_duration();
        if delay_open.is_zero() {
            self.send_open(services)
        } else {
            self.delay_open_running = true;
            services.start_timer(TimerKind::DelayOpen, delay_open);
            Ok(())
        }
    }

    fn send_open<S: SessionServices>(&mut self, services: &mut S) -> Result<(), FsmStateError> {
        self.send(services, BgpMessage::Open(self.open_message()))?;
        services.start_timer(
            TimerKind::Hold,
            self.config.hold_timer_duration_large_value(),
        );
        self.fsm_transition(FsmState::OpenSent);
        Ok(())
    }

    fn open_received<S: SessionServices>(&mut self, services: &mut S, open: ReceivedOpen) {
        services.stop_timer(TimerKind::ConnectRetry);
        services.stop_timer(TimerKind::DelayOpen);
        self.delay_open_running = false;
        self.remote_bgp_id = Some(open.message().bgp_id());
        self.hold_time = open.hold_time();
        self.keepalive = open.keepalive();
        log::info!(
            "[{}][{}] Peer {} AS{} negotiated hold time {}s and keepalive {}s",
            self.properties.peer_addr(),
            self.state,
            open.message().bgp_id(),
            open.remote_asn(),
            self.hold_time,
            self.keepalive
        );
        self.capabilities.set_received(open.into_capabilities());
    }

    /// Hold and keepalive timers with the negotiated values, a zero hold time
    /// disables both
    fn start_session_timers<S: SessionServices>(&mut self, services: &mut S) {
        services.stop_timer(TimerKind::Hold);
        if self.hold_time == 0 {
            return;
        }
        self.restart_hold_timer(services);
        self.restart_keepalive_timer(services);
    }

    fn restart_hold_timer<S: SessionServices>(&mut self, services: &mut S) {
        if self.hold_time != 0 {
            services.start_timer(
                TimerKind::Hold,
                Duration::from_secs(self.hold_time as u64),
            );
        }
    }

    fn restart_keepalive_timer<S: SessionServices>(&mut self, services: &mut S) {
        if self.hold_time != 0 && self.keepalive != 0 {
            services.start_timer(
                TimerKind::Keepalive,
                Duration::from_secs(self.keepalive as u64),
            );
        }
    }

    fn start_advertisement_timers<S: SessionServices>(&mut self, services: &mut S) {
        services.start_timer(
            TimerKind::RouteAdvertisement,
            self.config.route_advertisement_duration(),
        );
        services.start_timer(
            TimerKind::AsOrigination,
            self.config.as_origination_duration(),
        );
    }

    /// Connect retry timer with [RFC4271 Section 10](https://datatracker.ietf.org/doc/html/rfc4271#section-10)
    /// jitter, 75% to 100% of the configured value
    fn start_connect_retry_timer<S: SessionServices>(&mut self, services: &mut S) {
        let factor = self.rng.random_range(0.75..=1.0);
        let duration = self.config.connect_retry_duration().mul_f64(factor);
        services.start_timer(TimerKind::ConnectRetry, duration);
    }

    fn as4(&self) -> bool {
        SessionContext::new(&self.params, &self.capabilities).as4()
    }

    fn send<S: SessionServices>(
        &mut self,
        services: &mut S,
        message: BgpMessage,
    ) -> Result<(), FsmStateError> {
        log::debug!(
            "[{}][{}] Sending {} message",
            self.properties.peer_addr(),
            self.state,
            message.get_type()
        );
        services.send(&message, self.as4())?;
        self.stats.message_sent(&message);
        Ok(())
    }

    /// The session is closing anyway, failing to send the NOTIFICATION is
    /// only logged
    fn send_notification<S: SessionServices>(
        &mut self,
        services: &mut S,
        notification: BgpNotificationMessage,
    ) {
        log::info!(
            "[{}][{}] Sending notification: {notification}",
            self.properties.peer_addr(),
            self.state
        );
        if let Err(err) = self.send(services, BgpMessage::Notification(notification)) {
            log::error!(
                "[{}][{}] Error sending notification message to peer: {err:?}",
                self.properties.peer_addr(),
                self.state
            );
        }
    }

    fn send_updates<S: SessionServices>(
        &mut self,
        services: &mut S,
        updates: Vec<BgpUpdateMessage>,
    ) -> Result<(), FsmStateError> {
        if updates.is_empty() {
            return Ok(());
        }
        for update in updates {
            self.send(services, BgpMessage::Update(update))?;
        }
        self.restart_keepalive_timer(services);
        Ok(())
    }

    fn route_refresh_received<S: SessionServices>(
        &mut self,
        services: &mut S,
        route_refresh: BgpRouteRefreshMessage,
    ) {
        let address_type = route_refresh.address_type();
        if !self.capabilities.is_active(address_type) {
            log::info!(
                "[{}][{}] Ignoring ROUTE-REFRESH for inactive {address_type:?}",
                self.properties.peer_addr(),
                self.state
            );
            return;
        }
        if let Some(orf) = route_refresh.orf() {
            if self.capabilities.orf_receive_negotiated(address_type) {
                let filter = self
                    .orf_filters
                    .entry(address_type)
                    .or_insert_with(|| PrefixOrfFilter::new(address_type));
                for entry in orf.filters().iter().flat_map(|filter| filter.entries()) {
                    if !filter.apply(entry) {
                        log::debug!(
                            "[{}][{}] ORF entry {entry:?} changed nothing",
                            self.properties.peer_addr(),
                            self.state
                        );
                    }
                }
            } else {
                log::warn!(
                    "[{}][{}] Ignoring ORF entries for {address_type:?}, prefix ORF was not negotiated",
                    self.properties.peer_addr(),
                    self.state
                );
            }
        }
        if route_refresh.is_immediate() {
            services.refresh_requested(address_type, self.orf_filters.get(&address_type));
        } else {
            log::debug!(
                "[{}][{}] Deferring refresh of {address_type:?}",
                self.properties.peer_addr(),
                self.state
            );
        }
    }

    /// Apply a dynamic capability update. Only the capability codes we
    /// announced as dynamic are accepted, requests asking for it are
    /// acknowledged.
    fn capability_message_received<S: SessionServices>(
        &mut self,
        services: &mut S,
        message: BgpCapabilityMessage,
    ) -> Result<(), FsmStateError> {
        let dynamic_codes = self
            .capabilities
            .advertised()
            .dynamic_capability()
            .cloned()
            .unwrap_or_default();
        let mut acks = vec![];
        for entry in message.entries() {
            let capability = entry.capability();
            if entry.init_ack() {
                log::debug!(
                    "[{}][{}] Peer acknowledged dynamic capability sequence {}",
                    self.properties.peer_addr(),
                    self.state,
                    entry.sequence()
                );
                continue;
            }
            if !dynamic_codes.contains(&capability.code()) {
                log::warn!(
                    "[{}][{}] Ignoring dynamic capability code {}, it was not announced as dynamic",
                    self.properties.peer_addr(),
                    self.state,
                    capability.code()
                );
                continue;
            }
            match entry.action() {
                DynamicCapabilityAction::Set => self.capabilities.received_mut().insert(capability),
                DynamicCapabilityAction::Unset => {
                    self.capabilities.received_mut().remove(capability)
                }
            }
            log::info!(
                "[{}][{}] Peer capability {:?}: {capability:?}",
                self.properties.peer_addr(),
                self.state,
                entry.action()
            );
            if entry.ack_request() {
                acks.push(DynamicCapabilityEntry::new(
                    true,
                    false,
                    entry.action(),
                    entry.sequence(),
                    capability.clone(),
                ));
            }
        }
        if !acks.is_empty() {
            self.send(
                services,
                BgpMessage::Capability(BgpCapabilityMessage::new(acks)),
            )?;
        }
        Ok(())
    }
}
