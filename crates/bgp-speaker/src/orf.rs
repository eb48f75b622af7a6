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

//! Address prefix outbound route filters received from a peer
//! [RFC5292](https://datatracker.ietf.org/doc/html/rfc5292)

use ipnet::IpNet;
use peerwire_bgp_pkt::route_refresh::{OrfAction, OrfMatch, PrefixOrfEntry};
use peerwire_iana::address_family::AddressType;
use std::collections::BTreeMap;

/// A single installed entry of a [`PrefixOrfFilter`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PrefixOrfRule {
    match_type: OrfMatch,
    prefix: IpNet,
    min_len: u8,
    max_len: u8,
}

impl PrefixOrfRule {
    pub const fn new(match_type: OrfMatch, prefix: IpNet, min_len: u8, max_len: u8) -> Self {
        Self {
            match_type,
            prefix,
            min_len,
            max_len,
        }
    }

    pub const fn match_type(&self) -> OrfMatch {
        self.match_type
    }

    pub const fn prefix(&self) -> IpNet {
        self.prefix
    }

    pub const fn min_len(&self) -> u8 {
        self.min_len
    }

    pub const fn max_len(&self) -> u8 {
        self.max_len
    }

    /// Accepted prefix length range. Zero minlen/maxlen mean unset: with
    /// neither set only the exact prefix length matches, a missing maxlen
    /// opens the range up to the host length and a missing minlen starts it
    /// at the entry's own length.
    pub fn length_range(&self) -> (u8, u8) {
        let len = self.prefix.prefix_len();
        match (self.min_len, self.max_len) {
            (0, 0) => (len, len),
            (0, max) => (len, max),
            (min, 0) => (min, self.prefix.max_prefix_len()),
            (min, max) => (min, max),
        }
    }

    pub fn matches(&self, prefix: &IpNet) -> bool {
        let (ge, le) = self.length_range();
        self.prefix.contains(prefix) && (ge..=le).contains(&prefix.prefix_len())
    }
}

/// Prefix ORF installed for one AFI/SAFI, rules evaluated in ascending
/// sequence number order
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PrefixOrfFilter {
    address_type: AddressType,
    rules: BTreeMap<u32, PrefixOrfRule>,
}

impl PrefixOrfFilter {
    pub const fn new(address_type: AddressType) -> Self {
        Self {
            address_type,
            rules: BTreeMap::new(),
        }
    }

    pub const fn address_type(&self) -> AddressType {
        self.address_type
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = (&u32, &PrefixOrfRule)> {
        self.rules.iter()
    }

    /// Apply an entry received in a ROUTE-REFRESH. Returns false if the entry
    /// changed nothing, e.g. removing an unknown sequence number.
    pub fn apply(&mut self, entry: &PrefixOrfEntry) -> bool {
        match entry.action() {
            OrfAction::RemoveAll => {
                let had_rules = !self.rules.is_empty();
                self.rules.clear();
                had_rules
            }
            OrfAction::Add => match entry.prefix() {
                Some(prefix) => {
                    let rule = PrefixOrfRule::new(
                        entry.match_type(),
                        prefix,
                        entry.min_len(),
                        entry.max_len(),
                    );
                    self.rules.insert(entry.sequence(), rule);
                    true
                }
                None => false,
            },
            OrfAction::Remove => {
                let same_prefix = self
                    .rules
                    .get(&entry.sequence())
                    .is_some_and(|rule| Some(rule.prefix) == entry.prefix());
                if same_prefix {
                    self.rules.remove(&entry.sequence());
                }
                same_prefix
            }
        }
    }

    /// Match type of the first rule covering the prefix
    pub fn matches(&self, prefix: &IpNet) -> Option<OrfMatch> {
        self.rules
            .values()
            .find(|rule| rule.matches(prefix))
            .map(|rule| rule.match_type)
    }

    /// Whether a route for the prefix may be sent to the peer. An empty
    /// filter permits everything, otherwise unmatched prefixes are denied.
    pub fn permits(&self, prefix: &IpNet) -> bool {
        match self.matches(prefix) {
            Some(OrfMatch::Permit) => true,
            Some(OrfMatch::Deny) => false,
            None => self.rules.is_empty(),
        }
    }
}
