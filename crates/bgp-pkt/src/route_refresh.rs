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


//! Representations for BGP Route Refresh message and Outbound Route Filters

use crate::iana::{OrfType, RouteRefreshWhen};
use ipnet::IpNet;
use peerwire_iana::address_family::AddressType;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, FromRepr};

/// Route Refresh message [RFC2918](https://datatracker.ietf.org/doc/html/rfc2918),
/// optionally carrying ORF entries [RFC5291](https://datatracker.ietf.org/doc/html/rfc5291)
///
/// ```text
/// 0       7      15      23      31
/// +-------+-------+-------+-------+
/// |      AFI      | Res.  | SAFI  |
/// +-------+-------+-------+-------+
/// | When-to-refresh (1 octet)     |
/// +-------------------------------+
/// | ORF Type | Length (2) | entries ...
/// +-------------------------------+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BgpRouteRefreshMessage {
    address_type: AddressType,
    orf: Option<OrfRequest>,
}

impl BgpRouteRefreshMessage {
    pub const fn new(address_type: AddressType, orf: Option<OrfRequest>) -> Self {
        Self { address_type, orf }
    }

    pub const fn address_type(&self) -> AddressType {
        self.address_type
    }

    pub const fn orf(&self) -> Option<&OrfRequest> {
        self.orf.as_ref()
    }

    /// Re-advertisement is expected now rather than with a later refresh
    pub fn is_immediate(&self) -> bool {
        match &self.orf {
            Some(orf) => orf.when_to_refresh == RouteRefreshWhen::Immediate,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrfRequest {
    when_to_refresh: RouteRefreshWhen,
    filters: Vec<OrfFilter>,
}

impl OrfRequest {
    pub const fn new(when_to_refresh: RouteRefreshWhen, filters: Vec<OrfFilter>) -> Self {
        Self {
            when_to_refresh,
            filters,
        }
    }

    pub const fn when_to_refresh(&self) -> RouteRefreshWhen {
        self.when_to_refresh
    }

    pub const fn filters(&self) -> &Vec<OrfFilter> {
        &self.filters
    }
}

/// Entries of one ORF type
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct OrfFilter {
    orf_type: OrfType,
    entries: Vec<PrefixOrfEntry>,
}

impl OrfFilter {
    pub const fn new(orf_type: OrfType, entries: Vec<PrefixOrfEntry>) -> Self {
        Self { orf_type, entries }
    }

    pub const fn orf_type(&self) -> OrfType {
        self.orf_type
    }

    pub const fn entries(&self) -> &Vec<PrefixOrfEntry> {
        &self.entries
    }
}

#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum OrfAction {
    Add = 0,
    Remove = 1,
    RemoveAll = 2,
}

#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum OrfMatch {
    Permit = 0,
    Deny = 1,
}

/// Address Prefix ORF entry [RFC5292](https://datatracker.ietf.org/doc/html/rfc5292).
/// A remove-all entry only carries its action, the other fields are zero.
///
/// ```text
/// +--------------------------------+
/// | Action (2 bit) | Match (1 bit) |
/// +--------------------------------+
/// | Sequence (4 octets)            |
/// +--------------------------------+
/// | Minlen (1 octet)               |
/// +--------------------------------+
/// | Maxlen (1 octet)               |
/// +--------------------------------+
/// | Length (1 octet)               |
/// +--------------------------------+
/// | Prefix (variable length)       |
/// +--------------------------------+
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PrefixOrfEntry {
    action: OrfAction,
    match_type: OrfMatch,
    sequence: u32,
    min_len: u8,
    max_len: u8,
    prefix: Option<IpNet>,
}

impl PrefixOrfEntry {
    pub const fn new(
        action: OrfAction,
        match_type: OrfMatch,
        sequence: u32,
        min_len: u8,
        max_len: u8,
        prefix: IpNet,
    ) -> Self {
        Self {
            action,
            match_type,
            sequence,
            min_len,
            max_len,
            prefix: Some(prefix),
        }
    }

    pub const fn remove_all() -> Self {
        Self {
            action: OrfAction::RemoveAll,
            match_type: OrfMatch::Permit,
            sequence: 0,
            min_len: 0,
            max_len: 0,
            prefix: None,
        }
    }

    pub const fn action(&self) -> OrfAction {
        self.action
    }

    pub const fn match_type(&self) -> OrfMatch {
        self.match_type
    }

    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    pub const fn min_len(&self) -> u8 {
        self.min_len
    }

    pub const fn max_len(&self) -> u8 {
        self.max_len
    }

    pub const fn prefix(&self) -> Option<IpNet> {
        self.prefix
    }
}
