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

use peerwire_bgp_pkt::{
    dynamic_capability::BgpCapabilityMessage,
    notification::{
        BgpNotificationMessage, CapabilityMessageError, MessageHeaderError, OpenMessageError,
        UpdateMessageError,
    },
    route_refresh::BgpRouteRefreshMessage,
    update::BgpUpdateMessage,
    wire::deserializer::{
        open::ReceivedOpen, BgpMessageParsingError, DiscardReason, ReceivedMessage,
    },
};

#[derive(Debug, Clone, Eq, PartialEq, strum_macros::Display)]
pub enum BgpEvent<A> {
    /// **Event 1:** Local system administrator manually starts the peer
    /// connection.
    ///
    /// **Status:** Mandatory
    ///
    /// **Optional Attribute Status:**
    ///    * The
    ///      [`PassiveTcpEstablishment`](crate::peer::PeerConfig::passive_tcp_establishment)
    ///      attribute decides whether the session connects or listens.
    ManualStart,

    /// **Event 2:** Local system administrator manually stops the peer
    /// connection.
    ///
    /// **Status:** Mandatory
    ManualStop,

    /// **Event 3:** Local system automatically starts the BGP connection.
    ///
    /// **Status:** Optional, depending on local system
    AutomaticStart,

    /// **Event 4:** Local system administrator manually starts the peer
    /// connection and listens for the peer to connect.
    ///
    /// **Status:** Optional, depending on local system
    ManualStartWithPassiveTcp,

    /// **Event 5:** Local system automatically starts the BGP connection and
    /// listens for the peer to connect.
    ///
    /// **Status:** Optional, depending on local system
    AutomaticStartWithPassiveTcp,

    /// **Event 6:** Automatic start with peer oscillation damping. Damping is
    /// done with the IdleHold timer, so it starts like
    /// [`BgpEvent::AutomaticStart`].
    ///
    /// **Status:** Optional, used only if the bgp peer has enabled
    /// _DampPeerOscillations_.
    AutomaticStartWithDampPeerOscillations,

    /// **Event 7:** Passive flavour of
    /// [`BgpEvent::AutomaticStartWithDampPeerOscillations`].
    ///
    /// **Status:** Optional, used only if the bgp peer has enabled
    /// _DampPeerOscillations_.
    AutomaticStartWithDampPeerOscillationsPassiveTcp,

    /// **Event 8:** Local system automatically stops the BGP connection.
    ///
    /// **Status:** Optional, depending on local system
    AutomaticStop,

    /// **Event 9:** Generated when the ConnectRetryTimer expires.
    ///
    /// **Status:** Mandatory
    ConnectRetryTimerExpires,

    /// **Event 10:** Generated when the HoldTimer expires.
    ///
    /// **Status:** Mandatory
    HoldTimerExpires,

    /// **Event 11:** Generated when the KeepaliveTimer expires.
    ///
    /// **Status:** Mandatory
    KeepAliveTimerExpires,

    /// **Event 12:** Generated when the DelayOpenTimer expires.
    ///
    /// **Status:** Optional
    DelayOpenTimerExpires,

    /// **Event 13:** Generated when the IdleHoldTimer expires, indicating
    /// that the BGP connection has completed waiting for the back-off period
    /// to prevent BGP peer oscillation.
    ///
    /// **Status:** Optional
    IdleHoldTimerExpires,

    /// **Event 14:** A valid TCP connection request was received, the
    /// connection is not yet accepted.
    ///
    /// **Status:** Optional
    TcpConnectionValid(A),

    /// **Event 15:** A TCP connection request was received from an invalid
    /// source or destination address or port.
    ///
    /// **Status:** Optional
    TcpConnectionRequestInvalid,

    /// **Event 16:** The TCP connection initiated by the local system is
    /// established.
    ///
    /// **Status:** Mandatory
    TcpConnectionRequestAcked(A),

    /// **Event 17:** The TCP connection initiated by the peer is
    /// established.
    ///
    /// **Status:** Mandatory
    TcpConnectionConfirmed(A),

    /// **Event 18:** The TCP connection failed or was closed by the peer.
    ///
    /// **Status:** Mandatory
    TcpConnectionFails,

    /// **Event 19:** A valid OPEN message has been received.
    ///
    /// **Status:** Mandatory
    BGPOpen(ReceivedOpen),

    /// **Event 20:** A valid OPEN message has been received while the
    /// DelayOpenTimer is running.
    ///
    /// **Status:** Optional
    BGPOpenWithDelayOpenTimer(ReceivedOpen),

    /// **Event 21:** A received message header is not valid.
    ///
    /// **Status:** Mandatory
    BGPHeaderErr(MessageHeaderError),

    /// **Event 22:** An OPEN message has been received with errors.
    ///
    /// **Status:** Mandatory
    BGPOpenMsgErr(OpenMessageError),

    /// **Event 23:** The connection lost the collision resolution and must be
    /// closed.
    ///
    /// **Status:** Optional
    OpenCollisionDump,

    /// **Event 24:** A NOTIFICATION with a version error was received.
    ///
    /// **Status:** Mandatory
    NotifMsgVerErr,

    /// **Event 25:** A NOTIFICATION without a version error was received.
    ///
    /// **Status:** Mandatory
    NotifMsg(BgpNotificationMessage),

    /// **Event 26:** A KEEPALIVE message was received.
    ///
    /// **Status:** Mandatory
    KeepAliveMsg,

    /// **Event 27:** A valid UPDATE message was received.
    ///
    /// **Status:** Mandatory
    UpdateMsg(BgpUpdateMessage),

    /// **Event 28:** An invalid UPDATE message was received.
    ///
    /// **Status:** Mandatory
    UpdateMsgErr(UpdateMessageError),

    /// A ROUTE-REFRESH message was received
    /// [RFC2918](https://datatracker.ietf.org/doc/html/rfc2918).
    RouteRefreshMsg(BgpRouteRefreshMessage),

    /// A ROUTE-REFRESH message could not be parsed, reported as a header
    /// length error.
    RouteRefreshMsgErr(MessageHeaderError),

    /// A CAPABILITY message was received (dynamic capability).
    CapabilityMsg(BgpCapabilityMessage),

    /// A CAPABILITY message could not be parsed.
    CapabilityMsgErr(CapabilityMessageError),

    /// A message was dropped without affecting the session, e.g. an UPDATE
    /// looping back through our ORIGINATOR_ID.
    MessageDiscarded(DiscardReason),

    /// MinRouteAdvertisementIntervalTimer expired
    RouteAdvertisementTimerExpires,

    /// MinASOriginationIntervalTimer expired
    AsOriginationTimerExpires,
}

impl<A> BgpEvent<A> {
    /// Map a decoded message to its FSM event. An OPEN maps to
    /// [`BgpEvent::BGPOpenWithDelayOpenTimer`] while the delay open timer
    /// runs.
    pub fn from_message(message: ReceivedMessage, delay_open_running: bool) -> Self {
        match message {
            ReceivedMessage::Open(open) if delay_open_running => {
                BgpEvent::BGPOpenWithDelayOpenTimer(open)
            }
            ReceivedMessage::Open(open) => BgpEvent::BGPOpen(open),
            ReceivedMessage::Update(update) => BgpEvent::UpdateMsg(update),
            ReceivedMessage::Notification(notification) if notification.is_version_error() => {
                BgpEvent::NotifMsgVerErr
            }
            ReceivedMessage::Notification(notification) => BgpEvent::NotifMsg(notification),
            ReceivedMessage::KeepAlive => BgpEvent::KeepAliveMsg,
            ReceivedMessage::RouteRefresh(route_refresh) => BgpEvent::RouteRefreshMsg(route_refresh),
            ReceivedMessage::Capability(capability) => BgpEvent::CapabilityMsg(capability),
        }
    }

    /// The NOTIFICATION to send to the peer before closing the session, if
    /// the event carries one.
    pub fn notification(&self) -> Option<BgpNotificationMessage> {
        match self {
            BgpEvent::BGPHeaderErr(err) | BgpEvent::RouteRefreshMsgErr(err) => {
                Some(BgpNotificationMessage::MessageHeaderError(err.clone()))
            }
            BgpEvent::BGPOpenMsgErr(err) => {
                Some(BgpNotificationMessage::OpenMessageError(err.clone()))
            }
            BgpEvent::UpdateMsgErr(err) => {
                Some(BgpNotificationMessage::UpdateMessageError(err.clone()))
            }
            BgpEvent::CapabilityMsgErr(err) => {
                Some(BgpNotificationMessage::CapabilityMessageError(err.clone()))
            }
            _ => None,
        }
    }
}

impl<A> From<BgpMessageParsingError> for BgpEvent<A> {
    fn from(err: BgpMessageParsingError) -> Self {
        let route_refresh = matches!(err, BgpMessageParsingError::RouteRefresh(_));
        match BgpNotificationMessage::from(err) {
            BgpNotificationMessage::MessageHeaderError(err) if route_refresh => {
                BgpEvent::RouteRefreshMsgErr(err)
            }
            BgpNotificationMessage::MessageHeaderError(err) => BgpEvent::BGPHeaderErr(err),
            BgpNotificationMessage::OpenMessageError(err) => BgpEvent::BGPOpenMsgErr(err),
            BgpNotificationMessage::UpdateMessageError(err) => BgpEvent::UpdateMsgErr(err),
            BgpNotificationMessage::CapabilityMessageError(err) => BgpEvent::CapabilityMsgErr(err),
            other => {
                log::warn!("Parsing error without a message error class: {other}");
                BgpEvent::BGPHeaderErr(MessageHeaderError::Unspecific {
                    value: other.value().to_vec(),
                })
            }
        }
    }
}

/// Timers run on behalf of a session by its
/// [`TimerService`](crate::session::TimerService)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, strum_macros::Display)]
pub enum TimerKind {
    ConnectRetry,
    Hold,
    Keepalive,
    DelayOpen,
    IdleHold,
    RouteAdvertisement,
    AsOrigination,
}

impl TimerKind {
    pub const ALL: [TimerKind; 7] = [
        TimerKind::ConnectRetry,
        TimerKind::Hold,
        TimerKind::Keepalive,
        TimerKind::DelayOpen,
        TimerKind::IdleHold,
        TimerKind::RouteAdvertisement,
        TimerKind::AsOrigination,
    ];
}

impl<A> From<TimerKind> for BgpEvent<A> {
    fn from(value: TimerKind) -> Self {
        match value {
            TimerKind::ConnectRetry => BgpEvent::ConnectRetryTimerExpires,
            TimerKind::Hold => BgpEvent::HoldTimerExpires,
            TimerKind::Keepalive => BgpEvent::KeepAliveTimerExpires,
            TimerKind::DelayOpen => BgpEvent::DelayOpenTimerExpires,
            TimerKind::IdleHold => BgpEvent::IdleHoldTimerExpires,
            TimerKind::RouteAdvertisement => BgpEvent::RouteAdvertisementTimerExpires,
            TimerKind::AsOrigination => BgpEvent::AsOriginationTimerExpires,
        }
    }
}
