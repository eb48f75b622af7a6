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


//! Representations for BGP Update message

use crate::{
    path_attribute::PathAttributes,
    wire::serializer::nlri::{encode_prefixes, IpNetWritingError},
};
use bytes::Bytes;
use ipnet::IpNet;
use peerwire_iana::address_family::AddressType;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv6Addr};

/// NLRI of one address family. The raw wire bytes are kept next to the
/// decoded prefixes so they can be re-read or re-advertised as is.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NlriSpan {
    address_type: AddressType,
    raw: Bytes,
    prefixes: Vec<IpNet>,
}

impl NlriSpan {
    pub const fn new(address_type: AddressType, raw: Bytes, prefixes: Vec<IpNet>) -> Self {
        Self {
            address_type,
            raw,
            prefixes,
        }
    }

    pub const fn empty(address_type: AddressType) -> Self {
        Self {
            address_type,
            raw: Bytes::new(),
            prefixes: vec![],
        }
    }

    /// Span for locally originated prefixes, the raw form is encoded from
    /// the given list
    pub fn from_prefixes(
        address_type: AddressType,
        prefixes: Vec<IpNet>,
    ) -> Result<Self, IpNetWritingError> {
        let raw = encode_prefixes(&prefixes)?;
        Ok(Self::new(address_type, Bytes::from(raw), prefixes))
    }

    pub const fn address_type(&self) -> AddressType {
        self.address_type
    }

    pub const fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub const fn prefixes(&self) -> &Vec<IpNet> {
        &self.prefixes
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// MP_REACH_NLRI [RFC4760](https://datatracker.ietf.org/doc/html/rfc4760)
///
/// ```text
/// +---------------------------------------------------------+
/// | Address Family Identifier (2 octets)                    |
/// +---------------------------------------------------------+
/// | Subsequent Address Family Identifier (1 octet)          |
/// +---------------------------------------------------------+
/// | Length of Next Hop Network Address (1 octet)            |
/// +---------------------------------------------------------+
/// | Network Address of Next Hop (variable)                  |
/// +---------------------------------------------------------+
/// | Reserved (1 octet)                                      |
/// +---------------------------------------------------------+
/// | Network Layer Reachability Information (variable)       |
/// +---------------------------------------------------------+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MpReach {
    next_hop: IpAddr,
    link_local: Option<Ipv6Addr>,
    nlri: NlriSpan,
}

impl MpReach {
    pub const fn new(next_hop: IpAddr, link_local: Option<Ipv6Addr>, nlri: NlriSpan) -> Self {
        Self {
            next_hop,
            link_local,
            nlri,
        }
    }

    pub const fn address_type(&self) -> AddressType {
        self.nlri.address_type
    }

    pub const fn next_hop(&self) -> IpAddr {
        self.next_hop
    }

    /// Second IPv6 next hop, only kept when it is link local
    pub const fn link_local(&self) -> Option<Ipv6Addr> {
        self.link_local
    }

    pub const fn nlri(&self) -> &NlriSpan {
        &self.nlri
    }
}

/// MP_UNREACH_NLRI [RFC4760](https://datatracker.ietf.org/doc/html/rfc4760)
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MpUnreach {
    nlri: NlriSpan,
}

impl MpUnreach {
    pub const fn new(nlri: NlriSpan) -> Self {
        Self { nlri }
    }

    pub const fn address_type(&self) -> AddressType {
        self.nlri.address_type
    }

    pub const fn nlri(&self) -> &NlriSpan {
        &self.nlri
    }
}

/// BGP Update message, the classic withdrawn and NLRI fields are always
/// IPv4 unicast.
///
/// ```text
/// +-----------------------------------------------------+
/// |   Withdrawn Routes Length (2 octets)                |
/// +-----------------------------------------------------+
/// |   Withdrawn Routes (variable)                       |
/// +-----------------------------------------------------+
/// |   Total Path Attribute Length (2 octets)            |
/// +-----------------------------------------------------+
/// |   Path Attributes (variable)                        |
/// +-----------------------------------------------------+
/// |   Network Layer Reachability Information (variable) |
/// +-----------------------------------------------------+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BgpUpdateMessage {
    withdrawn: NlriSpan,
    attributes: PathAttributes,
    nlri: NlriSpan,
    mp_reach: Option<MpReach>,
    mp_unreach: Option<MpUnreach>,
}

impl BgpUpdateMessage {
    pub const fn new(
        withdrawn: NlriSpan,
        attributes: PathAttributes,
        nlri: NlriSpan,
        mp_reach: Option<MpReach>,
        mp_unreach: Option<MpUnreach>,
    ) -> Self {
        Self {
            withdrawn,
            attributes,
            nlri,
            mp_reach,
            mp_unreach,
        }
    }

    pub const fn withdrawn(&self) -> &NlriSpan {
        &self.withdrawn
    }

    pub const fn attributes(&self) -> &PathAttributes {
        &self.attributes
    }

    pub const fn nlri(&self) -> &NlriSpan {
        &self.nlri
    }

    pub const fn mp_reach(&self) -> Option<&MpReach> {
        self.mp_reach.as_ref()
    }

    pub const fn mp_unreach(&self) -> Option<&MpUnreach> {
        self.mp_unreach.as_ref()
    }

    /// An UPDATE without any route is an End-of-RIB marker for IPv4 unicast
    pub fn is_end_of_rib(&self) -> bool {
        self.withdrawn.is_empty()
            && self.nlri.is_empty()
            && self.mp_reach.is_none()
            && self.mp_unreach.is_none()
            && self.attributes.present().is_empty()
    }
}
