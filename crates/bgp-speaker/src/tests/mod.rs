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
    orf::PrefixOrfFilter,
    peer::{PeerConfig, PeerConfigBuilder, PeerProperties},
    runtime::ActiveConnect,
    session::{ReadStatus, RibService, Session, TimerService, Transport},
};
use async_trait::async_trait;
use peerwire_bgp_pkt::{
    capabilities::{BgpCapability, CapabilityRecord},
    open::{BgpOpenMessage, BgpOpenMessageParameter},
    update::BgpUpdateMessage,
    wire::serializer::BgpMessageWritingError,
    BgpMessage,
};
use peerwire_iana::address_family::AddressType;
use peerwire_parse_utils::WritablePduWithOneInput;
use std::{
    collections::HashMap,
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
    time::Duration,
};

mod session;

pub(crate) const MY_AS: u32 = 65000;
pub(crate) const PEER_AS: u32 = 65001;
pub(crate) const MY_BGP_ID: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub(crate) const PEER_BGP_ID: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub(crate) const PEER_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 179);

pub(crate) const PROPERTIES: PeerProperties<SocketAddr> =
    PeerProperties::new(MY_AS, PEER_AS, MY_BGP_ID, PEER_ADDR);

/// Config that never restarts on its own, so tests see every transition
pub(crate) fn test_config() -> PeerConfig {
    PeerConfigBuilder::new().allow_auto_start(false).build()
}

pub(crate) fn peer_open(bgp_id: Ipv4Addr, hold_time: u16) -> BgpMessage {
    BgpMessage::Open(BgpOpenMessage::new(
        PEER_AS as u16,
        hold_time,
        bgp_id,
        vec![BgpOpenMessageParameter::Capabilities(vec![
            BgpCapability::MultiProtocolExtensions(AddressType::Ipv4Unicast),
            BgpCapability::RouteRefresh,
            BgpCapability::FourOctetAs(PEER_AS),
        ])],
    ))
}

pub(crate) fn encode(message: &BgpMessage) -> Vec<u8> {
    let mut buf = vec![];
    message.write(&mut buf, true).unwrap();
    buf
}

/// Push the encoded message into the session and decode until it wants
/// more data
pub(crate) fn feed<S: crate::session::SessionServices>(
    session: &mut Session<SocketAddr>,
    services: &mut S,
    message: &BgpMessage,
) {
    let buf = encode(message);
    assert_eq!(session.receive(&buf), buf.len());
    while session.process_input(services).unwrap() == ReadStatus::ReadLoop {}
}

/// Records everything a [`Session`] asks from its environment
#[derive(Debug, Default)]
pub(crate) struct RecordingServices {
    pub sent: Vec<BgpMessage>,
    pub timers: HashMap<TimerKind, Duration>,
    pub connects: usize,
    pub disconnects: usize,
    pub established: Vec<CapabilityRecord>,
    pub closed: usize,
    pub updates: Vec<BgpUpdateMessage>,
    pub refreshes: Vec<(AddressType, Option<PrefixOrfFilter>)>,
    pub pending_advertisements: Vec<BgpUpdateMessage>,
    pub pending_originations: Vec<BgpUpdateMessage>,
}

impl RecordingServices {
    pub fn is_running(&self, timer: TimerKind) -> bool {
        self.timers.contains_key(&timer)
    }

    /// Fire a running timer into the session
    pub fn expire(&mut self, session: &mut Session<SocketAddr>, timer: TimerKind) {
        assert!(self.timers.remove(&timer).is_some(), "{timer} is not running");
        session.handle_event(self, BgpEvent::from(timer)).unwrap();
    }
}

impl TimerService for RecordingServices {
    fn start_timer(&mut self, timer: TimerKind, duration: Duration) {
        self.timers.insert(timer, duration);
    }

    fn stop_timer(&mut self, timer: TimerKind) {
        self.timers.remove(&timer);
    }
}

impl Transport for RecordingServices {
    fn send(&mut self, message: &BgpMessage, _asn4: bool) -> Result<(), BgpMessageWritingError> {
        self.sent.push(message.clone());
        Ok(())
    }

    fn connect(&mut self) {
        self.connects += 1;
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

impl RibService for RecordingServices {
    fn session_established(&mut self, capabilities: &CapabilityRecord) {
        self.established.push(capabilities.clone());
    }

    fn session_closed(&mut self) {
        self.closed += 1;
    }

    fn update_received(&mut self, update: BgpUpdateMessage) {
        self.updates.push(update);
    }

    fn refresh_requested(&mut self, address_type: AddressType, filter: Option<&PrefixOrfFilter>) {
        self.refreshes.push((address_type, filter.cloned()));
    }

    fn pending_advertisements(&mut self) -> Vec<BgpUpdateMessage> {
        std::mem::take(&mut self.pending_advertisements)
    }

    fn pending_originations(&mut self) -> Vec<BgpUpdateMessage> {
        std::mem::take(&mut self.pending_originations)
    }
}

/// Wrap [`tokio_test::io::Builder`] allowing it to accept BgpMessages for
/// read and write mocks rather than `&[u8]`.
#[derive(Default, Debug)]
pub(crate) struct BgpIoMockBuilder {
    io_builder: tokio_test::io::Builder,
}

impl BgpIoMockBuilder {
    pub fn new() -> Self {
        Self {
            io_builder: tokio_test::io::Builder::new(),
        }
    }

    pub fn read(&mut self, msg: &BgpMessage) -> &mut Self {
        self.io_builder.read(&encode(msg));
        self
    }

    pub fn write(&mut self, msg: &BgpMessage) -> &mut Self {
        self.io_builder.write(&encode(msg));
        self
    }

    pub fn build(&mut self) -> tokio_test::io::Mock {
        self.io_builder.build()
    }
}

/// Hands out the prepared mock once, later attempts are refused
#[derive(Debug, Clone, Default)]
pub(crate) struct MockActiveConnect {
    pub mock: Arc<Mutex<Option<tokio_test::io::Mock>>>,
    pub attempts: Arc<Mutex<usize>>,
}

impl MockActiveConnect {
    pub fn new(mock: tokio_test::io::Mock) -> Self {
        Self {
            mock: Arc::new(Mutex::new(Some(mock))),
            attempts: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl ActiveConnect<SocketAddr, tokio_test::io::Mock> for MockActiveConnect {
    async fn connect(&mut self, peer_addr: SocketAddr) -> io::Result<tokio_test::io::Mock> {
        assert_eq!(peer_addr, PEER_ADDR);
        *self.attempts.lock().unwrap() += 1;
        self.mock.lock().unwrap().take().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "MockActiveConnect connection refused",
            )
        })
    }
}
