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


//! Representations for the BGP path attribute set carried by UPDATE
//! messages

use crate::iana::{AsPathSegmentType, Origin, PathAttributeType, AS_TRANS};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    net::Ipv4Addr,
};

/// Path attribute flags octet
///
/// ```text
/// 0                   1
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |O|T|P|E| Unused|  Attr. Type   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct PathAttributeFlags {
    optional: bool,
    transitive: bool,
    partial: bool,
    extended_length: bool,
}

impl PathAttributeFlags {
    pub const OPTIONAL_MASK: u8 = 0x80;
    pub const TRANSITIVE_MASK: u8 = 0x40;
    pub const PARTIAL_MASK: u8 = 0x20;
    pub const EXTENDED_LENGTH_MASK: u8 = 0x10;

    pub const fn new(optional: bool, transitive: bool, partial: bool, extended_length: bool) -> Self {
        Self {
            optional,
            transitive,
            partial,
            extended_length,
        }
    }

    pub const fn from_byte(value: u8) -> Self {
        Self {
            optional: value & Self::OPTIONAL_MASK == Self::OPTIONAL_MASK,
            transitive: value & Self::TRANSITIVE_MASK == Self::TRANSITIVE_MASK,
            partial: value & Self::PARTIAL_MASK == Self::PARTIAL_MASK,
            extended_length: value & Self::EXTENDED_LENGTH_MASK == Self::EXTENDED_LENGTH_MASK,
        }
    }

    pub const fn to_byte(&self) -> u8 {
        let mut value = 0;
        if self.optional {
            value |= Self::OPTIONAL_MASK;
        }
        if self.transitive {
            value |= Self::TRANSITIVE_MASK;
        }
        if self.partial {
            value |= Self::PARTIAL_MASK;
        }
        if self.extended_length {
            value |= Self::EXTENDED_LENGTH_MASK;
        }
        value
    }

    pub const fn optional(&self) -> bool {
        self.optional
    }

    pub const fn transitive(&self) -> bool {
        self.transitive
    }

    pub const fn partial(&self) -> bool {
        self.partial
    }

    pub const fn extended_length(&self) -> bool {
        self.extended_length
    }

    pub const fn with_partial(self, partial: bool) -> Self {
        Self { partial, ..self }
    }

    pub const fn with_extended_length(self, extended_length: bool) -> Self {
        Self {
            extended_length,
            ..self
        }
    }

    /// Check the flags against the attribute category. The extended length
    /// bit is never significant, the partial bit only matters for attributes
    /// that are not optional transitive where it must be zero.
    pub const fn matches(&self, category: AttributeCategory) -> bool {
        let (optional, transitive) = match category {
            AttributeCategory::WellKnown => (false, true),
            AttributeCategory::OptionalTransitive => (true, true),
            AttributeCategory::OptionalNonTransitive => (true, false),
        };
        if self.optional != optional || self.transitive != transitive {
            return false;
        }
        match category {
            AttributeCategory::OptionalTransitive => true,
            _ => !self.partial,
        }
    }
}

/// Expected flag combination for a given attribute type
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AttributeCategory {
    WellKnown,
    OptionalTransitive,
    OptionalNonTransitive,
}

impl AttributeCategory {
    pub const fn flags(&self) -> PathAttributeFlags {
        match self {
            Self::WellKnown => PathAttributeFlags::new(false, true, false, false),
            Self::OptionalTransitive => PathAttributeFlags::new(true, true, false, false),
            Self::OptionalNonTransitive => PathAttributeFlags::new(true, false, false, false),
        }
    }
}

impl PathAttributeType {
    pub const fn category(&self) -> AttributeCategory {
        match self {
            Self::Origin
            | Self::AsPath
            | Self::NextHop
            | Self::LocalPreference
            | Self::AtomicAggregate => AttributeCategory::WellKnown,
            Self::Aggregator
            | Self::Communities
            | Self::ExtendedCommunities
            | Self::As4Path
            | Self::As4Aggregator => AttributeCategory::OptionalTransitive,
            Self::MultiExitDiscriminator
            | Self::OriginatorId
            | Self::ClusterList
            | Self::MpReachNlri
            | Self::MpUnreachNlri => AttributeCategory::OptionalNonTransitive,
        }
    }
}

/// Set of attribute type codes, one bit per code
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
pub struct AttributeTypeSet([u64; 4]);

impl AttributeTypeSet {
    pub const fn new() -> Self {
        Self([0; 4])
    }

    /// Returns false when the code was already present
    pub fn insert(&mut self, code: u8) -> bool {
        let (word, bit) = Self::position(code);
        let present = self.0[word] & bit != 0;
        self.0[word] |= bit;
        !present
    }

    pub fn remove(&mut self, code: u8) {
        let (word, bit) = Self::position(code);
        self.0[word] &= !bit;
    }

    pub const fn contains(&self, code: u8) -> bool {
        let (word, bit) = Self::position(code);
        self.0[word] & bit != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0[0] == 0 && self.0[1] == 0 && self.0[2] == 0 && self.0[3] == 0
    }

    #[inline]
    const fn position(code: u8) -> (usize, u64) {
        ((code / 64) as usize, 1u64 << (code % 64))
    }
}

/// One AS_PATH segment, `T` is either `u16` for the legacy encoding or `u32`
/// for 4-octet AS numbers
///
/// ```text
/// +-----------------------------+
/// | segment type | segment len  |
/// +-----------------------------+
/// |  AS numbers (len x 2 or 4)  |
/// ~                             ~
/// +-----------------------------+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AsPathSegment<T> {
    segment_type: AsPathSegmentType,
    members: Vec<T>,
}

impl<T> AsPathSegment<T> {
    pub const fn new(segment_type: AsPathSegmentType, members: Vec<T>) -> Self {
        Self {
            segment_type,
            members,
        }
    }

    pub const fn segment_type(&self) -> AsPathSegmentType {
        self.segment_type
    }

    pub const fn members(&self) -> &Vec<T> {
        &self.members
    }

    /// Contribution to the path length used in path selection, RFC4271 9.1.2.2
    pub fn hop_count(&self) -> usize {
        match self.segment_type {
            AsPathSegmentType::AsSequence => self.members.len(),
            AsPathSegmentType::AsSet => usize::from(!self.members.is_empty()),
            AsPathSegmentType::ConfedSequence | AsPathSegmentType::ConfedSet => 0,
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AsPath<T> {
    segments: Vec<AsPathSegment<T>>,
}

impl<T: Copy + Into<u32>> AsPath<T> {
    pub const fn new(segments: Vec<AsPathSegment<T>>) -> Self {
        Self { segments }
    }

    pub const fn segments(&self) -> &Vec<AsPathSegment<T>> {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn hop_count(&self) -> usize {
        self.segments.iter().map(AsPathSegment::hop_count).sum()
    }

    /// Number of members equal to [AS_TRANS]
    pub fn count_as_trans(&self) -> usize {
        self.segments
            .iter()
            .flat_map(|segment| segment.members.iter())
            .filter(|asn| (**asn).into() == u32::from(AS_TRANS))
            .count()
    }

    /// Number of AS numbers in all the segments
    pub fn member_count(&self) -> usize {
        self.segments.iter().map(|segment| segment.members.len()).sum()
    }

    pub fn has_confed_segments(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.segment_type.is_confed())
    }

    /// Left most AS of the path when the path starts with a sequence
    pub fn first_as(&self) -> Option<u32> {
        self.segments
            .first()
            .filter(|segment| segment.segment_type == AsPathSegmentType::AsSequence)
            .and_then(|segment| segment.members.first())
            .map(|asn| (*asn).into())
    }
}

impl AsPath<u16> {
    /// Lossless conversion to the 4-octet representation, any [AS_TRANS]
    /// stays in place as a marker
    pub fn to_as4(&self) -> AsPath<u32> {
        AsPath::new(
            self.segments
                .iter()
                .map(|segment| {
                    AsPathSegment::new(
                        segment.segment_type,
                        segment.members.iter().map(|asn| u32::from(*asn)).collect(),
                    )
                })
                .collect(),
        )
    }
}

impl AsPath<u32> {
    /// Legacy representation, AS numbers that don't fit are replaced by
    /// [AS_TRANS]
    pub fn to_legacy(&self) -> AsPath<u16> {
        AsPath::new(
            self.segments
                .iter()
                .map(|segment| {
                    AsPathSegment::new(
                        segment.segment_type,
                        segment
                            .members
                            .iter()
                            .map(|asn| u16::try_from(*asn).unwrap_or(AS_TRANS))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    /// Any AS number needs the 4-octet encoding
    pub fn has_as4_members(&self) -> bool {
        self.segments
            .iter()
            .flat_map(|segment| segment.members.iter())
            .any(|asn| *asn > u32::from(u16::MAX))
    }

    /// Copy of the path without confederation segments
    pub fn without_confed_segments(&self) -> Self {
        Self::new(
            self.segments
                .iter()
                .filter(|segment| !segment.segment_type.is_confed())
                .cloned()
                .collect(),
        )
    }

    /// Leading part of the path covering `hops` path-length units.
    /// Confederation segments met on the way are kept as is.
    fn leading_hops(&self, hops: usize) -> Vec<AsPathSegment<u32>> {
        let mut remaining = hops;
        let mut ret = vec![];
        for segment in &self.segments {
            if remaining == 0 {
                break;
            }
            match segment.segment_type {
                AsPathSegmentType::AsSequence => {
                    let take = remaining.min(segment.members.len());
                    ret.push(AsPathSegment::new(
                        segment.segment_type,
                        segment.members[..take].to_vec(),
                    ));
                    remaining -= take;
                }
                AsPathSegmentType::AsSet => {
                    ret.push(segment.clone());
                    remaining -= segment.hop_count();
                }
                AsPathSegmentType::ConfedSequence | AsPathSegmentType::ConfedSet => {
                    ret.push(segment.clone());
                }
            }
        }
        ret
    }
}

/// Error while merging AS_PATH and AS4_PATH
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum As4PathReconcileError {
    /// AS4_PATH can't fill all the [AS_TRANS] placeholders of AS_PATH
    NotEnoughAs4Members { as_trans: usize, as4_members: usize },
}

impl Display for As4PathReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotEnoughAs4Members {
                as_trans,
                as4_members,
            } => write!(
                f,
                "AS4_PATH carries {as4_members} AS numbers for {as_trans} AS_TRANS placeholders"
            ),
        }
    }
}

impl std::error::Error for As4PathReconcileError {}

/// Rebuild the 4-octet AS path from the AS_PATH received from a legacy
/// speaker and the AS4_PATH it carried, see
/// [RFC6793 Section 4.2.3](https://datatracker.ietf.org/doc/html/rfc6793#section-4.2.3)
///
/// When AS_PATH is shorter than AS4_PATH, AS4_PATH is ignored. Otherwise the
/// result is the leading part of AS_PATH that AS4_PATH doesn't cover followed
/// by AS4_PATH, with adjacent sequences merged. Reconciling a path with the
/// same AS4_PATH again yields the same path.
pub fn reconcile_as4_path(
    as_path: &AsPath<u32>,
    as4_path: &AsPath<u32>,
) -> Result<AsPath<u32>, As4PathReconcileError> {
    let as_trans = as_path.count_as_trans();
    let as4_members = as4_path.member_count();
    if as4_members < as_trans {
        return Err(As4PathReconcileError::NotEnoughAs4Members {
            as_trans,
            as4_members,
        });
    }
    let as_path_hops = as_path.hop_count();
    let as4_path_hops = as4_path.hop_count();
    if as_path_hops < as4_path_hops {
        return Ok(as_path.clone());
    }
    let mut segments = as_path.leading_hops(as_path_hops - as4_path_hops);
    for segment in &as4_path.segments {
        match segments.last_mut() {
            Some(last)
                if last.segment_type == AsPathSegmentType::AsSequence
                    && segment.segment_type == AsPathSegmentType::AsSequence =>
            {
                last.members.extend_from_slice(&segment.members);
            }
            _ => segments.push(segment.clone()),
        }
    }
    segments.retain(|segment| !segment.members.is_empty());
    Ok(AsPath::new(segments))
}

/// AGGREGATOR, the AS number is always kept in its 4-octet form
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Aggregator {
    asn: u32,
    origin: Ipv4Addr,
}

impl Aggregator {
    pub const fn new(asn: u32, origin: Ipv4Addr) -> Self {
        Self { asn, origin }
    }

    pub const fn asn(&self) -> u32 {
        self.asn
    }

    pub const fn origin(&self) -> Ipv4Addr {
        self.origin
    }
}

/// COMMUNITIES [RFC1997](https://datatracker.ietf.org/doc/html/rfc1997)
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Communities {
    values: Vec<u32>,
    partial: bool,
}

impl Communities {
    pub const fn new(values: Vec<u32>, partial: bool) -> Self {
        Self { values, partial }
    }

    pub const fn values(&self) -> &Vec<u32> {
        &self.values
    }

    pub const fn partial(&self) -> bool {
        self.partial
    }
}

/// EXTENDED COMMUNITIES [RFC4360](https://datatracker.ietf.org/doc/html/rfc4360),
/// each community is kept as its raw 8 octets
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ExtendedCommunities {
    values: Vec<u64>,
    partial: bool,
}

impl ExtendedCommunities {
    pub const fn new(values: Vec<u64>, partial: bool) -> Self {
        Self { values, partial }
    }

    pub const fn values(&self) -> &Vec<u64> {
        &self.values
    }

    pub const fn partial(&self) -> bool {
        self.partial
    }
}

/// The attribute set of an UPDATE message in canonical form. Every
/// attribute is optional and the `present` set tracks which ones are
/// attached. The AS path is kept both in the legacy 2-octet form and in the
/// 4-octet form, see [AsPath::to_as4] and [AsPath::to_legacy].
///
/// Unknown optional transitive attributes are carried verbatim in `transit`
/// so they can be re-advertised.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PathAttributes {
    present: AttributeTypeSet,
    origin: Option<Origin>,
    as_path_legacy: Option<AsPath<u16>>,
    as_path: Option<AsPath<u32>>,
    next_hop: Option<Ipv4Addr>,
    med: Option<u32>,
    local_pref: Option<u32>,
    atomic_aggregate: bool,
    aggregator: Option<Aggregator>,
    communities: Option<Communities>,
    extended_communities: Option<ExtendedCommunities>,
    originator_id: Option<Ipv4Addr>,
    cluster_list: Option<Vec<Ipv4Addr>>,
    transit: Vec<u8>,
}

impl PathAttributes {
    pub const fn new() -> Self {
        Self {
            present: AttributeTypeSet::new(),
            origin: None,
            as_path_legacy: None,
            as_path: None,
            next_hop: None,
            med: None,
            local_pref: None,
            atomic_aggregate: false,
            aggregator: None,
            communities: None,
            extended_communities: None,
            originator_id: None,
            cluster_list: None,
            transit: vec![],
        }
    }

    pub const fn contains(&self, attribute_type: PathAttributeType) -> bool {
        self.present.contains(attribute_type as u8)
    }

    pub const fn present(&self) -> &AttributeTypeSet {
        &self.present
    }

    #[inline]
    fn mark(&mut self, attribute_type: PathAttributeType, set: bool) {
        if set {
            self.present.insert(attribute_type.into());
        } else {
            self.present.remove(attribute_type.into());
        }
    }

    pub const fn origin(&self) -> Option<Origin> {
        self.origin
    }

    pub fn set_origin(&mut self, origin: Option<Origin>) {
        self.mark(PathAttributeType::Origin, origin.is_some());
        self.origin = origin;
    }

    /// The 2-octet AS path as received from or sent to a legacy speaker
    pub const fn as_path_legacy(&self) -> Option<&AsPath<u16>> {
        self.as_path_legacy.as_ref()
    }

    /// The 4-octet AS path, reconciled with AS4_PATH when needed
    pub const fn as_path(&self) -> Option<&AsPath<u32>> {
        self.as_path.as_ref()
    }

    pub fn set_as_path_legacy(&mut self, as_path: Option<AsPath<u16>>) {
        self.as_path_legacy = as_path;
        self.mark(
            PathAttributeType::AsPath,
            self.as_path_legacy.is_some() || self.as_path.is_some(),
        );
    }

    pub fn set_as_path(&mut self, as_path: Option<AsPath<u32>>) {
        self.as_path = as_path;
        self.mark(
            PathAttributeType::AsPath,
            self.as_path_legacy.is_some() || self.as_path.is_some(),
        );
    }

    /// AS path in 4-octet form, derived from the legacy form if that's the
    /// only one present
    pub fn effective_as_path(&self) -> Option<AsPath<u32>> {
        match (&self.as_path, &self.as_path_legacy) {
            (Some(as_path), _) => Some(as_path.clone()),
            (None, Some(legacy)) => Some(legacy.to_as4()),
            (None, None) => None,
        }
    }

    pub const fn next_hop(&self) -> Option<Ipv4Addr> {
        self.next_hop
    }

    pub fn set_next_hop(&mut self, next_hop: Option<Ipv4Addr>) {
        self.mark(PathAttributeType::NextHop, next_hop.is_some());
        self.next_hop = next_hop;
    }

    pub const fn med(&self) -> Option<u32> {
        self.med
    }

    pub fn set_med(&mut self, med: Option<u32>) {
        self.mark(PathAttributeType::MultiExitDiscriminator, med.is_some());
        self.med = med;
    }

    pub const fn local_pref(&self) -> Option<u32> {
        self.local_pref
    }

    pub fn set_local_pref(&mut self, local_pref: Option<u32>) {
        self.mark(PathAttributeType::LocalPreference, local_pref.is_some());
        self.local_pref = local_pref;
    }

    pub const fn atomic_aggregate(&self) -> bool {
        self.atomic_aggregate
    }

    pub fn set_atomic_aggregate(&mut self, atomic_aggregate: bool) {
        self.mark(PathAttributeType::AtomicAggregate, atomic_aggregate);
        self.atomic_aggregate = atomic_aggregate;
    }

    pub const fn aggregator(&self) -> Option<Aggregator> {
        self.aggregator
    }

    pub fn set_aggregator(&mut self, aggregator: Option<Aggregator>) {
        self.mark(PathAttributeType::Aggregator, aggregator.is_some());
        self.aggregator = aggregator;
    }

    pub const fn communities(&self) -> Option<&Communities> {
        self.communities.as_ref()
    }

    pub fn set_communities(&mut self, communities: Option<Communities>) {
        self.mark(PathAttributeType::Communities, communities.is_some());
        self.communities = communities;
    }

    pub const fn extended_communities(&self) -> Option<&ExtendedCommunities> {
        self.extended_communities.as_ref()
    }

    pub fn set_extended_communities(&mut self, extended_communities: Option<ExtendedCommunities>) {
        self.mark(
            PathAttributeType::ExtendedCommunities,
            extended_communities.is_some(),
        );
        self.extended_communities = extended_communities;
    }

    pub const fn originator_id(&self) -> Option<Ipv4Addr> {
        self.originator_id
    }

    pub fn set_originator_id(&mut self, originator_id: Option<Ipv4Addr>) {
        self.mark(PathAttributeType::OriginatorId, originator_id.is_some());
        self.originator_id = originator_id;
    }

    pub const fn cluster_list(&self) -> Option<&Vec<Ipv4Addr>> {
        self.cluster_list.as_ref()
    }

    pub fn set_cluster_list(&mut self, cluster_list: Option<Vec<Ipv4Addr>>) {
        self.mark(PathAttributeType::ClusterList, cluster_list.is_some());
        self.cluster_list = cluster_list;
    }

    /// Unknown optional transitive attributes in wire format
    pub fn transit(&self) -> &[u8] {
        &self.transit
    }

    pub fn push_transit(&mut self, attribute: &[u8]) {
        self.transit.extend_from_slice(attribute);
    }
}
