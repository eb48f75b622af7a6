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

//! Per session counters

use chrono::{DateTime, Utc};
use peerwire_bgp_pkt::{
    iana::BgpMessageType, notification::BgpNotificationMessage,
    wire::deserializer::ReceivedMessage, BgpMessage,
};

/// A NOTIFICATION exchanged with the peer and when it happened
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NotificationInfo {
    notification: BgpNotificationMessage,
    timestamp: DateTime<Utc>,
}

impl NotificationInfo {
    pub fn new(notification: BgpNotificationMessage) -> Self {
        Self {
            notification,
            timestamp: Utc::now(),
        }
    }

    pub const fn notification(&self) -> &BgpNotificationMessage {
        &self.notification
    }

    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone)]
pub struct SessionStats {
    created: DateTime<Utc>,
    messages_received: u64,
    messages_sent: u64,
    open_received: u64,
    open_sent: u64,
    update_received: u64,
    update_sent: u64,
    keepalive_received: u64,
    keepalive_sent: u64,
    notification_received: u64,
    notification_sent: u64,
    route_refresh_received: u64,
    route_refresh_sent: u64,
    capability_received: u64,
    capability_sent: u64,
    discarded_received: u64,
    established_transitions: u64,
    last_received: Option<DateTime<Utc>>,
    last_sent: Option<DateTime<Utc>>,
    last_notification_received: Option<NotificationInfo>,
    last_notification_sent: Option<NotificationInfo>,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            created: Utc::now(),
            messages_received: 0,
            messages_sent: 0,
            open_received: 0,
            open_sent: 0,
            update_received: 0,
            update_sent: 0,
            keepalive_received: 0,
            keepalive_sent: 0,
            notification_received: 0,
            notification_sent: 0,
            route_refresh_received: 0,
            route_refresh_sent: 0,
            capability_received: 0,
            capability_sent: 0,
            discarded_received: 0,
            established_transitions: 0,
            last_received: None,
            last_sent: None,
            last_notification_received: None,
            last_notification_sent: None,
        }
    }
}

impl SessionStats {
    pub(crate) fn message_received(&mut self, message: &ReceivedMessage) {
        self.messages_received += 1;
        self.last_received = Some(Utc::now());
        match message.message_type() {
            BgpMessageType::Open => self.open_received += 1,
            BgpMessageType::Update => self.update_received += 1,
            BgpMessageType::Notification => self.notification_received += 1,
            BgpMessageType::KeepAlive => self.keepalive_received += 1,
            BgpMessageType::RouteRefresh | BgpMessageType::RouteRefreshOld => {
                self.route_refresh_received += 1
            }
            BgpMessageType::Capability => self.capability_received += 1,
        }
        if let ReceivedMessage::Notification(notification) = message {
            self.last_notification_received = Some(NotificationInfo::new(notification.clone()));
        }
    }

    /// A message that was read completely but dropped by the decoder
    pub(crate) fn message_discarded(&mut self) {
        self.messages_received += 1;
        self.discarded_received += 1;
        self.last_received = Some(Utc::now());
    }

    pub(crate) fn message_sent(&mut self, message: &BgpMessage) {
        self.messages_sent += 1;
        self.last_sent = Some(Utc::now());
        match message {
            BgpMessage::Open(_) => self.open_sent += 1,
            BgpMessage::Update(_) => self.update_sent += 1,
            BgpMessage::Notification(notification) => {
                self.notification_sent += 1;
                self.last_notification_sent = Some(NotificationInfo::new(notification.clone()));
            }
            BgpMessage::KeepAlive => self.keepalive_sent += 1,
            BgpMessage::RouteRefresh(_) => self.route_refresh_sent += 1,
            BgpMessage::Capability(_) => self.capability_sent += 1,
        }
    }

    pub(crate) fn established(&mut self) {
        self.established_transitions += 1;
    }

    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub const fn messages_received(&self) -> u64 {
        self.messages_received
    }

    pub const fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    pub const fn open_received(&self) -> u64 {
        self.open_received
    }

    pub const fn open_sent(&self) -> u64 {
        self.open_sent
    }

    pub const fn update_received(&self) -> u64 {
        self.update_received
    }

    pub const fn update_sent(&self) -> u64 {
        self.update_sent
    }

    pub const fn keepalive_received(&self) -> u64 {
        self.keepalive_received
    }

    pub const fn keepalive_sent(&self) -> u64 {
        self.keepalive_sent
    }

    pub const fn notification_received(&self) -> u64 {
        self.notification_received
    }

    pub const fn notification_sent(&self) -> u64 {
        self.notification_sent
    }

    pub const fn route_refresh_received(&self) -> u64 {
        self.route_refresh_received
    }

    pub const fn route_refresh_sent(&self) -> u64 {
        self.route_refresh_sent
    }

    pub const fn capability_received(&self) -> u64 {
        self.capability_received
    }

    pub const fn capability_sent(&self) -> u64 {
        self.capability_sent
    }

    /// UPDATE messages dropped without tearing down the session
    pub const fn discarded_received(&self) -> u64 {
        self.discarded_received
    }

    /// How many times the session reached Established
    pub const fn established_transitions(&self) -> u64 {
        self.established_transitions
    }

    pub const fn last_received(&self) -> Option<DateTime<Utc>> {
        self.last_received
    }

    pub const fn last_sent(&self) -> Option<DateTime<Utc>> {
        self.last_sent
    }

    pub const fn last_notification_received(&self) -> Option<&NotificationInfo> {
        self.last_notification_received.as_ref()
    }

    pub const fn last_notification_sent(&self) -> Option<&NotificationInfo> {
        self.last_notification_sent.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerwire_bgp_pkt::iana::CeaseErrorSubCode;

    #[test]
    fn test_counters() {
        let mut stats = SessionStats::default();
        stats.message_received(&ReceivedMessage::KeepAlive);
        stats.message_sent(&BgpMessage::KeepAlive);
        stats.message_sent(&BgpMessage::Notification(BgpNotificationMessage::cease(
            CeaseErrorSubCode::AdministrativeShutdown,
        )));
        stats.message_discarded();

        assert_eq!(stats.messages_received(), 2);
        assert_eq!(stats.keepalive_received(), 1);
        assert_eq!(stats.discarded_received(), 1);
        assert_eq!(stats.messages_sent(), 2);
        assert_eq!(stats.keepalive_sent(), 1);
        assert_eq!(stats.notification_sent(), 1);
        assert!(stats.last_received().is_some());
        assert!(stats.last_notification_received().is_none());
        let sent = stats.last_notification_sent().map(|info| info.notification().clone());
        assert_eq!(
            sent,
            Some(BgpNotificationMessage::cease(
                CeaseErrorSubCode::AdministrativeShutdown
            ))
        );
    }
}
