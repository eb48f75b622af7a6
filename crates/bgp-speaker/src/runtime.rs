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

//! Tokio glue driving a [`Session`] over an async byte stream.
//!
//! Every wake up of [`SessionRunner::run`] (socket readable, timer expired,
//! administrative event, connection attempt finished) is handled to
//! completion before the next one, queued output is flushed after each.
//!
//! A connection arriving while the session already has one runs as the
//! tracked session of the [`Peer`] until the collision is resolved.

use crate::{
    events::{BgpEvent, TimerKind},
    fsm::FsmState,
    orf::PrefixOrfFilter,
    peer::{ConnectionSlot, Peer},
    session::{ReadStatus, RibService, Session, TimerService, Transport},
};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use futures::{future::BoxFuture, StreamExt};
use peerwire_bgp_pkt::{
    capabilities::CapabilityRecord, update::BgpUpdateMessage,
    wire::serializer::BgpMessageWritingError, BgpMessage,
};
use peerwire_iana::address_family::AddressType;
use peerwire_parse_utils::WritablePduWithOneInput;
use std::{
    collections::HashMap,
    fmt::{Debug, Display, Formatter},
    io,
    net::SocketAddr,
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc::{self, error::SendError},
};
use tokio_util::time::{delay_queue::Key, DelayQueue};

/// Bytes read from the connection in one go
pub const READ_CHUNK_SIZE: usize = 4096;

#[async_trait]
pub trait ActiveConnect<A, I: AsyncRead + AsyncWrite> {
    async fn connect(&mut self, peer_addr: A) -> io::Result<I>;
}

#[derive(Debug, Clone)]
pub struct TcpActiveConnect;

#[async_trait]
impl ActiveConnect<SocketAddr, TcpStream> for TcpActiveConnect {
    async fn connect(&mut self, peer_addr: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(peer_addr).await
    }
}

/// Subset from standard BGP events that are administrative
#[derive(Debug)]
pub enum PeerAdminEvent<A, I> {
    ManualStart,
    ManualStop,
    AutomaticStart,
    AutomaticStop,
    TcpConnectionConfirmed((A, I)),
}

/// Control side of a [`SessionRunner`]. Dropping it stops the session and
/// ends [`SessionRunner::run`].
#[derive(Debug)]
pub struct SessionHandle<A, I> {
    admin_tx: mpsc::UnboundedSender<PeerAdminEvent<A, I>>,
    state_rx: mpsc::UnboundedReceiver<FsmState>,
}

impl<A, I> SessionHandle<A, I> {
    pub fn send(&self, event: PeerAdminEvent<A, I>) -> Result<(), SendError<PeerAdminEvent<A, I>>> {
        self.admin_tx.send(event)
    }

    pub fn start(&self) -> Result<(), SendError<PeerAdminEvent<A, I>>> {
        self.send(PeerAdminEvent::ManualStart)
    }

    pub fn shutdown(&self) -> Result<(), SendError<PeerAdminEvent<A, I>>> {
        self.send(PeerAdminEvent::ManualStop)
    }

    /// Hand over a connection the peer initiated
    pub fn accept_connection(
        &self,
        peer_addr: A,
        connection: I,
    ) -> Result<(), SendError<PeerAdminEvent<A, I>>> {
        self.send(PeerAdminEvent::TcpConnectionConfirmed((peer_addr, connection)))
    }

    /// Next state the session moved to, `None` once the runner is gone
    pub async fn next_state(&mut self) -> Option<FsmState> {
        self.state_rx.recv().await
    }
}

/// Timers, output and connection requests of one session
#[derive(Debug)]
pub struct ConnectionServices {
    timers: DelayQueue<TimerKind>,
    timer_keys: HashMap<TimerKind, Key>,
    output: BytesMut,
    connect_requested: bool,
    disconnect_requested: bool,
}

impl ConnectionServices {
    fn new() -> Self {
        Self {
            timers: DelayQueue::new(),
            timer_keys: HashMap::new(),
            output: BytesMut::new(),
            connect_requested: false,
            disconnect_requested: false,
        }
    }

    pub fn is_timer_running(&self, timer: TimerKind) -> bool {
        self.timer_keys.contains_key(&timer)
    }

    fn timer_expired(&mut self, timer: TimerKind) {
        self.timer_keys.remove(&timer);
    }
}

/// [`SessionServices`](crate::session::SessionServices) handed to a session
/// for one callback: its own [`ConnectionServices`] and the RIB shared by
/// both connections of the peer
struct RunnerServices<'a, R> {
    connection: &'a mut ConnectionServices,
    rib: &'a mut R,
}

impl<R> TimerService for RunnerServices<'_, R> {
    fn start_timer(&mut self, timer: TimerKind, duration: Duration) {
        let connection = &mut *self.connection;
        match connection.timer_keys.get(&timer) {
            Some(key) => connection.timers.reset(key, duration),
            None => {
                let key = connection.timers.insert(timer, duration);
                connection.timer_keys.insert(timer, key);
            }
        }
    }

    fn stop_timer(&mut self, timer: TimerKind) {
        if let Some(key) = self.connection.timer_keys.remove(&timer) {
            self.connection.timers.remove(&key);
        }
    }
}

impl<R> Transport for RunnerServices<'_, R> {
    fn send(&mut self, message: &BgpMessage, asn4: bool) -> Result<(), BgpMessageWritingError> {
        let output = &mut self.connection.output;
        output.reserve(message.len(asn4));
        message.write(&mut output.writer(), asn4)
    }

    fn connect(&mut self) {
        self.connection.connect_requested = true;
    }

    fn disconnect(&mut self) {
        self.connection.disconnect_requested = true;
    }
}

impl<R: RibService> RibService for RunnerServices<'_, R> {
    fn session_established(&mut self, capabilities: &CapabilityRecord) {
        self.rib.session_established(capabilities)
    }

    fn session_closed(&mut self) {
        self.rib.session_closed()
    }

    fn update_received(&mut self, update: BgpUpdateMessage) {
        self.rib.update_received(update)
    }

    fn refresh_requested(&mut self, address_type: AddressType, filter: Option<&PrefixOrfFilter>) {
        self.rib.refresh_requested(address_type, filter)
    }

    fn pending_advertisements(&mut self) -> Vec<BgpUpdateMessage> {
        self.rib.pending_advertisements()
    }

    fn pending_originations(&mut self) -> Vec<BgpUpdateMessage> {
        self.rib.pending_originations()
    }
}

/// Stream of one session and what is queued for it
struct PeerConnection<I> {
    services: ConnectionServices,
    stream: Option<I>,
    pending_connect: Option<BoxFuture<'static, io::Result<I>>>,
    read_buf: Vec<u8>,
}

impl<I: AsyncWrite + Unpin> PeerConnection<I> {
    fn new() -> Self {
        Self {
            services: ConnectionServices::new(),
            stream: None,
            pending_connect: None,
            read_buf: vec![0; READ_CHUNK_SIZE],
        }
    }

    fn is_unused(&self) -> bool {
        self.stream.is_none()
            && self.pending_connect.is_none()
            && self.services.timer_keys.is_empty()
            && self.services.output.is_empty()
    }

    /// Write the queued output, then close the stream if the session asked
    /// for it. Returns false when writing failed and the stream is gone.
    async fn flush<A: Display>(&mut self, peer_addr: &A, state: FsmState) -> bool {
        let mut written = true;
        if !self.services.output.is_empty() {
            let data = self.services.output.split();
            let result = match self.stream.as_mut() {
                Some(stream) => Some(write_out(stream, &data).await),
                None => None,
            };
            match result {
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    log::info!("[{peer_addr}][{state}] Error writing to connection: {err}");
                    self.stream = None;
                    written = false;
                }
                None => {
                    log::debug!(
                        "[{peer_addr}][{state}] Dropping {} bytes of output, not connected",
                        data.len()
                    );
                }
            }
        }
        if self.services.disconnect_requested {
            self.services.disconnect_requested = false;
            self.pending_connect = None;
            if let Some(mut stream) = self.stream.take() {
                if let Err(err) = stream.shutdown().await {
                    log::debug!("[{peer_addr}][{state}] Error closing connection: {err}");
                }
            }
        }
        written
    }
}

/// Owns a [`Peer`] with its connections and runs it until the
/// [`SessionHandle`] is dropped
pub struct SessionRunner<A, I, C, R> {
    peer: Peer<A>,
    main: PeerConnection<I>,
    tracked: PeerConnection<I>,
    rib: R,
    active_connect: C,
    admin_rx: mpsc::UnboundedReceiver<PeerAdminEvent<A, I>>,
    state_tx: mpsc::UnboundedSender<FsmState>,
    published_state: FsmState,
}

impl<A: Display + Clone, I, C, R> Debug for SessionRunner<A, I, C, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRunner")
            .field("state", &self.peer.session().state())
            .field(
                "tracked_state",
                &self.peer.tracked_session().map(Session::state),
            )
            .field("connected", &self.main.stream.is_some())
            .field("connecting", &self.main.pending_connect.is_some())
            .finish()
    }
}

impl<A, I, C, R> SessionRunner<A, I, C, R>
where
    A: Display + Clone + Send + 'static,
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    C: ActiveConnect<A, I> + Clone + Send + 'static,
    R: RibService,
{
    pub fn new(peer: Peer<A>, active_connect: C, rib: R) -> (Self, SessionHandle<A, I>) {
        let (admin_tx, admin_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = mpsc::unbounded_channel();
        let published_state = peer.session().state();
        let runner = Self {
            peer,
            main: PeerConnection::new(),
            tracked: PeerConnection::new(),
            rib,
            active_connect,
            admin_rx,
            state_tx,
            published_state,
        };
        (runner, SessionHandle { admin_tx, state_rx })
    }

    pub const fn peer(&self) -> &Peer<A> {
        &self.peer
    }

    pub const fn session(&self) -> &Session<A> {
        self.peer.session()
    }

    /// Services of the main session
    pub const fn services(&self) -> &ConnectionServices {
        &self.main.services
    }

    pub const fn rib(&self) -> &R {
        &self.rib
    }

    pub async fn run(&mut self) {
        loop {
            let main_free = self
                .peer
                .session()
                .free_space()
                .min(self.main.read_buf.len());
            let tracked_free = self
                .peer
                .tracked_session()
                .map_or(0, Session::free_space)
                .min(self.tracked.read_buf.len());
            let main_stream = self.main.stream.as_mut().filter(|_| main_free > 0);
            let tracked_stream = self.tracked.stream.as_mut().filter(|_| tracked_free > 0);
            tokio::select! {
                admin = self.admin_rx.recv() => match admin {
                    Some(event) => self.admin_event(event),
                    None => {
                        log::info!(
                            "[{}][{}] Session handle dropped, stopping the session",
                            self.peer.properties().peer_addr(),
                            self.peer.session().state()
                        );
                        self.handle_event(ConnectionSlot::Tracked, BgpEvent::ManualStop);
                        self.handle_event(ConnectionSlot::Main, BgpEvent::ManualStop);
                        self.after_callback().await;
                        return;
                    }
                },
                Some(expired) = self.main.services.timers.next(), if !self.main.services.timers.is_empty() => {
                    let timer = expired.into_inner();
                    self.main.services.timer_expired(timer);
                    self.handle_event(ConnectionSlot::Main, timer.into());
                }
                Some(expired) = self.tracked.services.timers.next(), if !self.tracked.services.timers.is_empty() => {
                    let timer = expired.into_inner();
                    self.tracked.services.timer_expired(timer);
                    self.handle_event(ConnectionSlot::Tracked, timer.into());
                }
                result = wait_connect(self.main.pending_connect.as_mut()) => {
                    self.main.pending_connect = None;
                    self.connect_result(result);
                }
                result = read_some(main_stream, &mut self.main.read_buf[..main_free]) => {
                    self.read_result(ConnectionSlot::Main, result).await;
                }
                result = read_some(tracked_stream, &mut self.tracked.read_buf[..tracked_free]) => {
                    self.read_result(ConnectionSlot::Tracked, result).await;
                }
            }
            self.after_callback().await;
        }
    }

    fn connection_mut(&mut self, slot: ConnectionSlot) -> &mut PeerConnection<I> {
        match slot {
            ConnectionSlot::Main => &mut self.main,
            ConnectionSlot::Tracked => &mut self.tracked,
        }
    }

    fn state(&self, slot: ConnectionSlot) -> FsmState {
        match slot {
            ConnectionSlot::Main => self.peer.session().state(),
            ConnectionSlot::Tracked => self
                .peer
                .tracked_session()
                .map_or(FsmState::Idle, Session::state),
        }
    }

    /// Session of the slot with the services it runs against
    fn parts(&mut self, slot: ConnectionSlot) -> (Option<&mut Session<A>>, RunnerServices<'_, R>) {
        let (session, connection) = match slot {
            ConnectionSlot::Main => (Some(self.peer.session_mut()), &mut self.main.services),
            ConnectionSlot::Tracked => (
                self.peer.tracked_session_mut(),
                &mut self.tracked.services,
            ),
        };
        (
            session,
            RunnerServices {
                connection,
                rib: &mut self.rib,
            },
        )
    }

    fn handle_event(&mut self, slot: ConnectionSlot, event: BgpEvent<A>) {
        let (session, mut services) = self.parts(slot);
        if let Some(session) = session {
            if let Err(err) = session.handle_event(&mut services, event) {
                log::error!(
                    "[{}][{}] Error handling event: {err}",
                    session.properties().peer_addr(),
                    session.state()
                );
            }
        }
    }

    fn admin_event(&mut self, event: PeerAdminEvent<A, I>) {
        match event {
            PeerAdminEvent::ManualStart => {
                self.handle_event(ConnectionSlot::Main, BgpEvent::ManualStart)
            }
            PeerAdminEvent::ManualStop => {
                self.handle_event(ConnectionSlot::Tracked, BgpEvent::ManualStop);
                self.handle_event(ConnectionSlot::Main, BgpEvent::ManualStop);
            }
            PeerAdminEvent::AutomaticStart => {
                self.handle_event(ConnectionSlot::Main, BgpEvent::AutomaticStart)
            }
            PeerAdminEvent::AutomaticStop => {
                self.handle_event(ConnectionSlot::Tracked, BgpEvent::AutomaticStop);
                self.handle_event(ConnectionSlot::Main, BgpEvent::AutomaticStop);
            }
            PeerAdminEvent::TcpConnectionConfirmed((peer_addr, stream)) => {
                if self.main.stream.is_none() {
                    self.main.stream = Some(stream);
                    self.handle_event(
                        ConnectionSlot::Main,
                        BgpEvent::TcpConnectionConfirmed(peer_addr),
                    );
                } else {
                    self.track_connection(stream, BgpEvent::TcpConnectionConfirmed(peer_addr));
                }
            }
        }
    }

    fn connect_result(&mut self, result: io::Result<I>) {
        let peer_addr = self.peer.properties().peer_addr();
        match result {
            Ok(stream) if self.main.stream.is_none() => {
                self.main.stream = Some(stream);
                self.handle_event(
                    ConnectionSlot::Main,
                    BgpEvent::TcpConnectionRequestAcked(peer_addr),
                );
            }
            Ok(stream) => {
                self.track_connection(stream, BgpEvent::TcpConnectionRequestAcked(peer_addr));
            }
            Err(err) => {
                log::info!(
                    "[{}][{}] TCP connection to peer failed: {err}",
                    peer_addr,
                    self.peer.session().state()
                );
                self.handle_event(ConnectionSlot::Main, BgpEvent::TcpConnectionFails);
            }
        }
    }

    /// Run a connection made while the main session already has one as the
    /// tracked session. `connected` tells the session which side initiated it.
    fn track_connection(&mut self, stream: I, connected: BgpEvent<A>) {
        if self.peer.track_connection().is_none() {
            return;
        }
        self.tracked = PeerConnection::new();
        self.tracked.stream = Some(stream);
        self.handle_event(
            ConnectionSlot::Tracked,
            BgpEvent::AutomaticStartWithPassiveTcp,
        );
        self.handle_event(ConnectionSlot::Tracked, connected);
    }

    async fn read_result(&mut self, slot: ConnectionSlot, result: io::Result<usize>) {
        match result {
            Ok(n) if n > 0 => {
                {
                    let (session, connection) = match slot {
                        ConnectionSlot::Main => (Some(self.peer.session_mut()), &self.main),
                        ConnectionSlot::Tracked => {
                            (self.peer.tracked_session_mut(), &self.tracked)
                        }
                    };
                    if let Some(session) = session {
                        session.receive(&connection.read_buf[..n]);
                    }
                }
                self.process_input(slot).await;
            }
            Ok(_) => {
                log::info!(
                    "[{}][{}] Connection closed by peer",
                    self.peer.properties().peer_addr(),
                    self.state(slot)
                );
                self.connection_mut(slot).stream = None;
                self.handle_event(slot, BgpEvent::TcpConnectionFails);
            }
            Err(err) => {
                log::info!(
                    "[{}][{}] Error reading from connection: {err}",
                    self.peer.properties().peer_addr(),
                    self.state(slot)
                );
                self.connection_mut(slot).stream = None;
                self.handle_event(slot, BgpEvent::TcpConnectionFails);
            }
        }
    }

    /// Decode everything buffered, one message per step, yielding between
    /// steps
    async fn process_input(&mut self, mut slot: ConnectionSlot) {
        loop {
            let status = {
                let (session, mut services) = self.parts(slot);
                match session {
                    Some(session) => session.process_input(&mut services),
                    None => return,
                }
            };
            match status {
                Ok(ReadStatus::ReadLoop) => {
                    self.after_callback().await;
                    // A resolved collision leaves whatever is still buffered
                    // with the main session
                    if self.peer.tracked_session().is_none() {
                        slot = ConnectionSlot::Main;
                    }
                    tokio::task::yield_now().await;
                }
                Ok(ReadStatus::NeedMoreData) => return,
                Err(err) => {
                    log::error!(
                        "[{}][{}] Error processing input: {err}",
                        self.peer.properties().peer_addr(),
                        self.state(slot)
                    );
                    return;
                }
            }
        }
    }

    /// Write queued output, act on the connection requests the sessions made
    /// and settle which connection carries the peer
    async fn after_callback(&mut self) {
        let peer_addr = self.peer.properties().peer_addr();
        loop {
            let written = self
                .main
                .flush(&peer_addr, self.peer.session().state())
                .await;
            if self.main.services.connect_requested {
                self.main.services.connect_requested = false;
                if self.main.stream.is_none() {
                    let mut connector = self.active_connect.clone();
                    let peer_addr = peer_addr.clone();
                    self.main.pending_connect =
                        Some(Box::pin(async move { connector.connect(peer_addr).await }));
                }
            }
            if !written {
                self.publish_state();
                self.handle_event(ConnectionSlot::Main, BgpEvent::TcpConnectionFails);
                continue;
            }
            let tracked_state = self.state(ConnectionSlot::Tracked);
            let written = self.tracked.flush(&peer_addr, tracked_state).await;
            // The tracked connection is never re-established
            self.tracked.services.connect_requested = false;
            if !written {
                self.handle_event(ConnectionSlot::Tracked, BgpEvent::TcpConnectionFails);
                continue;
            }
            let settled = self.settle_connections();
            self.publish_state();
            if settled {
                return;
            }
        }
    }

    /// Resolve a connection collision, or drop the tracked connection once
    /// it is no longer needed. Returns false when the sessions have new work
    /// to flush.
    fn settle_connections(&mut self) -> bool {
        if self.peer.tracked_session().is_none() {
            if !self.tracked.is_unused() {
                self.tracked = PeerConnection::new();
            }
            return true;
        }
        if let Some(loser) = self.peer.collision_loser() {
            let connection = match loser {
                ConnectionSlot::Main => &mut self.main.services,
                ConnectionSlot::Tracked => &mut self.tracked.services,
            };
            let mut services = RunnerServices {
                connection,
                rib: &mut self.rib,
            };
            if let Err(err) = self.peer.resolve_collision(loser, &mut services) {
                log::error!(
                    "[{}][{}] Error resolving connection collision: {err}",
                    self.peer.properties().peer_addr(),
                    self.peer.session().state()
                );
            }
            if loser == ConnectionSlot::Main {
                std::mem::swap(&mut self.main, &mut self.tracked);
            }
            return false;
        }
        if self.tracked.stream.is_none() {
            self.handle_event(ConnectionSlot::Tracked, BgpEvent::ManualStop);
            self.peer.clear_idle_tracked();
            return false;
        }
        if self.main.stream.is_none() {
            self.peer.promote_tracked();
            self.main = std::mem::replace(&mut self.tracked, PeerConnection::new());
            return false;
        }
        true
    }

    fn publish_state(&mut self) {
        let state = self.peer.session().state();
        if state != self.published_state {
            self.published_state = state;
            // Nobody listening is fine
            let _ = self.state_tx.send(state);
        }
    }
}

async fn write_out<I: AsyncWrite + Unpin>(stream: &mut I, data: &[u8]) -> io::Result<()> {
    stream.write_all(data).await?;
    stream.flush().await
}

async fn read_some<I: AsyncRead + Unpin>(
    stream: Option<&mut I>,
    buf: &mut [u8],
) -> io::Result<usize> {
    match stream {
        Some(stream) => stream.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn wait_connect<I>(pending: Option<&mut BoxFuture<'static, io::Result<I>>>) -> io::Result<I> {
    match pending {
        Some(pending) => pending.await,
        None => std::future::pending().await,
    }
}
