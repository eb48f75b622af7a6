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


//! Representations for BGP Capabilities and the negotiated capability state
//! of a session, see [RFC5492](https://datatracker.ietf.org/doc/html/rfc5492)

use crate::iana::{BgpCapabilityCode, OrfMode, OrfType};
use peerwire_iana::address_family::AddressType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// BGP Capability advertised in an OPEN message or in a dynamic CAPABILITY
/// message
///
/// ```text
/// +------------------------------+
/// | Capability Code (1 octet)    |
/// +------------------------------+
/// | Capability Length (1 octet)  |
/// +------------------------------+
/// | Capability Value (variable)  |
/// ~                              ~
/// +------------------------------+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BgpCapability {
    MultiProtocolExtensions(AddressType),
    RouteRefresh,
    RouteRefreshOld,
    OutboundRouteFiltering(OrfCapability),
    OutboundRouteFilteringOld(OrfCapability),
    FourOctetAs(u32),
    /// Capability codes the peer is willing to exchange dynamically
    DynamicCapability(Vec<u8>),
    /// Capability without a decoder, kept verbatim
    Unrecognized { code: u8, value: Vec<u8> },
}

impl BgpCapability {
    pub fn code(&self) -> u8 {
        match self {
            Self::MultiProtocolExtensions(_) => BgpCapabilityCode::MultiProtocolExtensions.into(),
            Self::RouteRefresh => BgpCapabilityCode::RouteRefresh.into(),
            Self::RouteRefreshOld => BgpCapabilityCode::RouteRefreshOld.into(),
            Self::OutboundRouteFiltering(_) => BgpCapabilityCode::OutboundRouteFiltering.into(),
            Self::OutboundRouteFilteringOld(_) => {
                BgpCapabilityCode::OutboundRouteFilteringOld.into()
            }
            Self::FourOctetAs(_) => BgpCapabilityCode::FourOctetAs.into(),
            Self::DynamicCapability(_) => BgpCapabilityCode::DynamicCapability.into(),
            Self::Unrecognized { code, .. } => *code,
        }
    }
}

/// Outbound Route Filtering capability for one AFI/SAFI,
/// [RFC5291](https://datatracker.ietf.org/doc/html/rfc5291)
///
/// ```text
/// +--------------------------------------------------+
/// | Address Family Identifier (2 octets)             |
/// +--------------------------------------------------+
/// | Reserved (1 octet)                               |
/// +--------------------------------------------------+
/// | Subsequent Address Family Identifier (1 octet)   |
/// +--------------------------------------------------+
/// | Number of ORFs (1 octet)                         |
/// +--------------------------------------------------+
/// | ORF Type (1 octet)                               |
/// +--------------------------------------------------+
/// | Send/Receive (1 octet)                           |
/// +--------------------------------------------------+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct OrfCapability {
    address_type: AddressType,
    entries: Vec<OrfCapabilityEntry>,
}

impl OrfCapability {
    pub const fn new(address_type: AddressType, entries: Vec<OrfCapabilityEntry>) -> Self {
        Self {
            address_type,
            entries,
        }
    }

    pub const fn address_type(&self) -> AddressType {
        self.address_type
    }

    pub const fn entries(&self) -> &Vec<OrfCapabilityEntry> {
        &self.entries
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct OrfCapabilityEntry {
    orf_type: OrfType,
    mode: OrfMode,
}

impl OrfCapabilityEntry {
    pub const fn new(orf_type: OrfType, mode: OrfMode) -> Self {
        Self { orf_type, mode }
    }

    pub const fn orf_type(&self) -> OrfType {
        self.orf_type
    }

    pub const fn mode(&self) -> OrfMode {
        self.mode
    }
}

/// Set of capabilities announced by one side of the session
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PeerCapabilities {
    multi_protocol: BTreeSet<AddressType>,
    route_refresh: bool,
    route_refresh_old: bool,
    orf: BTreeMap<AddressType, OrfMode>,
    orf_old: BTreeMap<AddressType, OrfMode>,
    four_octet_as: Option<u32>,
    dynamic_capability: Option<Vec<u8>>,
    /// Number of capabilities seen, including unrecognized ones
    count: usize,
}

impl PeerCapabilities {
    pub fn from_capabilities<'a>(capabilities: impl IntoIterator<Item = &'a BgpCapability>) -> Self {
        let mut caps = Self::default();
        for capability in capabilities {
            caps.insert(capability);
        }
        caps
    }

    pub fn insert(&mut self, capability: &BgpCapability) {
        self.count += 1;
        match capability {
            BgpCapability::MultiProtocolExtensions(address_type) => {
                self.multi_protocol.insert(*address_type);
            }
            BgpCapability::RouteRefresh => self.route_refresh = true,
            BgpCapability::RouteRefreshOld => self.route_refresh_old = true,
            BgpCapability::OutboundRouteFiltering(orf) => {
                Self::insert_orf(&mut self.orf, orf);
            }
            BgpCapability::OutboundRouteFilteringOld(orf) => {
                Self::insert_orf(&mut self.orf_old, orf);
            }
            BgpCapability::FourOctetAs(asn) => self.four_octet_as = Some(*asn),
            BgpCapability::DynamicCapability(codes) => {
                self.dynamic_capability = Some(codes.clone())
            }
            BgpCapability::Unrecognized { .. } => {}
        }
    }

    /// Withdraw a previously announced capability, used by dynamic
    /// capability "unset" actions
    pub fn remove(&mut self, capability: &BgpCapability) {
        self.count = self.count.saturating_sub(1);
        match capability {
            BgpCapability::MultiProtocolExtensions(address_type) => {
                self.multi_protocol.remove(address_type);
            }
            BgpCapability::RouteRefresh => self.route_refresh = false,
            BgpCapability::RouteRefreshOld => self.route_refresh_old = false,
            BgpCapability::OutboundRouteFiltering(orf) => {
                self.orf.remove(&orf.address_type());
            }
            BgpCapability::OutboundRouteFilteringOld(orf) => {
                self.orf_old.remove(&orf.address_type());
            }
            BgpCapability::FourOctetAs(_) => self.four_octet_as = None,
            BgpCapability::DynamicCapability(_) => self.dynamic_capability = None,
            BgpCapability::Unrecognized { .. } => {}
        }
    }

    fn insert_orf(map: &mut BTreeMap<AddressType, OrfMode>, orf: &OrfCapability) {
        for entry in orf.entries() {
            if matches!(
                entry.orf_type(),
                OrfType::AddressPrefix | OrfType::AddressPrefixOld
            ) {
                map.insert(orf.address_type(), entry.mode());
            }
        }
    }

    pub const fn multi_protocol(&self) -> &BTreeSet<AddressType> {
        &self.multi_protocol
    }

    pub const fn route_refresh(&self) -> bool {
        self.route_refresh
    }

    pub const fn route_refresh_old(&self) -> bool {
        self.route_refresh_old
    }

    /// Prefix ORF mode for the given AFI/SAFI, standard code first
    pub fn orf_mode(&self, address_type: AddressType) -> Option<OrfMode> {
        self.orf
            .get(&address_type)
            .or_else(|| self.orf_old.get(&address_type))
            .copied()
    }

    pub const fn four_octet_as(&self) -> Option<u32> {
        self.four_octet_as
    }

    pub const fn dynamic_capability(&self) -> Option<&Vec<u8>> {
        self.dynamic_capability.as_ref()
    }

    pub const fn count(&self) -> usize {
        self.count
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Address families in effect for this side. A speaker that announced
    /// no multiprotocol capability implicitly runs IPv4 unicast only.
    pub fn address_types(&self) -> BTreeSet<AddressType> {
        if self.multi_protocol.is_empty() {
            BTreeSet::from([AddressType::Ipv4Unicast])
        } else {
            self.multi_protocol.clone()
        }
    }

    /// Capabilities to announce in an OPEN message
    pub fn to_capabilities(&self) -> Vec<BgpCapability> {
        let mut ret = self
            .multi_protocol
            .iter()
            .map(|address_type| BgpCapability::MultiProtocolExtensions(*address_type))
            .collect::<Vec<_>>();
        if self.route_refresh {
            ret.push(BgpCapability::RouteRefresh);
        }
        if self.route_refresh_old {
            ret.push(BgpCapability::RouteRefreshOld);
        }
        for (address_type, mode) in &self.orf {
            ret.push(BgpCapability::OutboundRouteFiltering(OrfCapability::new(
                *address_type,
                vec![OrfCapabilityEntry::new(OrfType::AddressPrefix, *mode)],
            )));
        }
        for (address_type, mode) in &self.orf_old {
            ret.push(BgpCapability::OutboundRouteFilteringOld(OrfCapability::new(
                *address_type,
                vec![OrfCapabilityEntry::new(OrfType::AddressPrefixOld, *mode)],
            )));
        }
        if let Some(asn) = self.four_octet_as {
            ret.push(BgpCapability::FourOctetAs(asn));
        }
        if let Some(codes) = &self.dynamic_capability {
            ret.push(BgpCapability::DynamicCapability(codes.clone()));
        }
        ret
    }
}

/// Negotiated capability state of a session: what we sent and what the peer
/// sent back
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    advertised: PeerCapabilities,
    received: PeerCapabilities,
}

impl CapabilityRecord {
    pub const fn new(advertised: PeerCapabilities, received: PeerCapabilities) -> Self {
        Self {
            advertised,
            received,
        }
    }

    pub const fn advertised(&self) -> &PeerCapabilities {
        &self.advertised
    }

    pub fn advertised_mut(&mut self) -> &mut PeerCapabilities {
        &mut self.advertised
    }

    pub const fn received(&self) -> &PeerCapabilities {
        &self.received
    }

    pub fn received_mut(&mut self) -> &mut PeerCapabilities {
        &mut self.received
    }

    pub fn set_received(&mut self, received: PeerCapabilities) {
        self.received = received;
    }

    /// The AFI/SAFI was negotiated by both sides
    pub fn is_active(&self, address_type: AddressType) -> bool {
        self.advertised.address_types().contains(&address_type)
            && self.received.address_types().contains(&address_type)
    }

    pub fn active_address_types(&self) -> Vec<AddressType> {
        self.advertised
            .address_types()
            .intersection(&self.received.address_types())
            .copied()
            .collect()
    }

    /// Both sides announced the 4-octet AS capability
    pub const fn as4_negotiated(&self) -> bool {
        self.advertised.four_octet_as.is_some() && self.received.four_octet_as.is_some()
    }

    pub const fn route_refresh_received(&self) -> bool {
        self.received.route_refresh || self.received.route_refresh_old
    }

    pub const fn route_refresh_advertised(&self) -> bool {
        self.advertised.route_refresh || self.advertised.route_refresh_old
    }

    pub const fn dynamic_capability_negotiated(&self) -> bool {
        self.advertised.dynamic_capability.is_some() && self.received.dynamic_capability.is_some()
    }

    /// We accept prefix ORFs from the peer for the given AFI/SAFI
    pub fn orf_receive_negotiated(&self, address_type: AddressType) -> bool {
        match (
            self.advertised.orf_mode(address_type),
            self.received.orf_mode(address_type),
        ) {
            (Some(local), Some(remote)) => local.can_receive() && remote.can_send(),
            _ => false,
        }
    }

    /// The peer accepts prefix ORFs from us for the given AFI/SAFI
    pub fn orf_send_negotiated(&self, address_type: AddressType) -> bool {
        match (
            self.advertised.orf_mode(address_type),
            self.received.orf_mode(address_type),
        ) {
            (Some(local), Some(remote)) => local.can_send() && remote.can_receive(),
            _ => false,
        }
    }
}
