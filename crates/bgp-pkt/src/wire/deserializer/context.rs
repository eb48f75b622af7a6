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


//! Session scoped parameters handed to every decode call

use crate::capabilities::CapabilityRecord;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Local view of the session needed to validate messages received from the
/// peer. Built once per session from the peer configuration.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionParameters {
    local_asn: u32,
    peer_asn: u32,
    local_bgp_id: Ipv4Addr,
    hold_time: u16,
    keepalive: u16,
    four_octet_asn: bool,
    allow_infinite_hold_time: bool,
    strict_capability_match: bool,
    dont_capability: bool,
    enforce_first_as: bool,
    confederation_id: Option<u32>,
    confederation_peers: Vec<u32>,
}

impl SessionParameters {
    pub const DEFAULT_HOLD_TIME: u16 = 180;
    pub const DEFAULT_KEEPALIVE: u16 = 30;

    pub const fn new(local_asn: u32, peer_asn: u32, local_bgp_id: Ipv4Addr) -> Self {
        Self {
            local_asn,
            peer_asn,
            local_bgp_id,
            hold_time: Self::DEFAULT_HOLD_TIME,
            keepalive: Self::DEFAULT_KEEPALIVE,
            four_octet_asn: true,
            allow_infinite_hold_time: true,
            strict_capability_match: false,
            dont_capability: false,
            enforce_first_as: false,
            confederation_id: None,
            confederation_peers: vec![],
        }
    }

    pub const fn with_hold_time(mut self, hold_time: u16) -> Self {
        self.hold_time = hold_time;
        self
    }

    pub const fn with_keepalive(mut self, keepalive: u16) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub const fn with_four_octet_asn(mut self, four_octet_asn: bool) -> Self {
        self.four_octet_asn = four_octet_asn;
        self
    }

    pub const fn with_allow_infinite_hold_time(mut self, allow: bool) -> Self {
        self.allow_infinite_hold_time = allow;
        self
    }

    pub const fn with_strict_capability_match(mut self, strict: bool) -> Self {
        self.strict_capability_match = strict;
        self
    }

    pub const fn with_dont_capability(mut self, dont_capability: bool) -> Self {
        self.dont_capability = dont_capability;
        self
    }

    pub const fn with_enforce_first_as(mut self, enforce_first_as: bool) -> Self {
        self.enforce_first_as = enforce_first_as;
        self
    }

    pub fn with_confederation(mut self, confederation_id: u32, peers: Vec<u32>) -> Self {
        self.confederation_id = Some(confederation_id);
        self.confederation_peers = peers;
        self
    }

    pub const fn local_asn(&self) -> u32 {
        self.local_asn
    }

    pub const fn peer_asn(&self) -> u32 {
        self.peer_asn
    }

    pub const fn local_bgp_id(&self) -> Ipv4Addr {
        self.local_bgp_id
    }

    pub const fn hold_time(&self) -> u16 {
        self.hold_time
    }

    pub const fn keepalive(&self) -> u16 {
        self.keepalive
    }

    /// Local speaker runs with 4-octet AS numbers
    pub const fn four_octet_asn(&self) -> bool {
        self.four_octet_asn
    }

    pub const fn allow_infinite_hold_time(&self) -> bool {
        self.allow_infinite_hold_time
    }

    pub const fn strict_capability_match(&self) -> bool {
        self.strict_capability_match
    }

    pub const fn dont_capability(&self) -> bool {
        self.dont_capability
    }

    pub const fn enforce_first_as(&self) -> bool {
        self.enforce_first_as
    }

    pub const fn confederation_id(&self) -> Option<u32> {
        self.confederation_id
    }

    pub const fn confederation_peers(&self) -> &Vec<u32> {
        &self.confederation_peers
    }

    pub fn is_confederation_peer(&self) -> bool {
        self.confederation_id.is_some() && self.confederation_peers.contains(&self.peer_asn)
    }

    /// Peer is in another AS, members of our confederation count as internal
    pub fn is_ebgp(&self) -> bool {
        self.peer_asn != self.local_asn && !self.is_confederation_peer()
    }
}

/// Explicit decode context, borrowed for the duration of a single decode
/// step
#[derive(Debug, Copy, Clone)]
pub struct SessionContext<'a> {
    params: &'a SessionParameters,
    capabilities: &'a CapabilityRecord,
}

impl<'a> SessionContext<'a> {
    pub const fn new(params: &'a SessionParameters, capabilities: &'a CapabilityRecord) -> Self {
        Self {
            params,
            capabilities,
        }
    }

    pub const fn params(&self) -> &'a SessionParameters {
        self.params
    }

    pub const fn capabilities(&self) -> &'a CapabilityRecord {
        self.capabilities
    }

    /// AS numbers in AS_PATH and AGGREGATOR are 4 octets wide
    pub const fn as4(&self) -> bool {
        self.params.four_octet_asn && self.capabilities.as4_negotiated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ebgp() {
        let params = SessionParameters::new(65000, 65001, Ipv4Addr::new(10, 0, 0, 2));
        assert!(params.is_ebgp());
        let params = params.with_confederation(100, vec![65001]);
        assert!(!params.is_ebgp());
        let ibgp = SessionParameters::new(65000, 65000, Ipv4Addr::new(10, 0, 0, 2));
        assert!(!ibgp.is_ebgp());
    }
}
