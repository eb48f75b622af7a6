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


//! Path attribute decoders. Each attribute type has its own decoder
//! registered by type code, the TLV loop in [decode_path_attributes] enforces
//! the checks common to all attributes before dispatching.

use crate::{
    iana::{AsPathSegmentType, Origin, PathAttributeType},
    notification::UpdateMessageError,
    path_attribute::{
        Aggregator, AsPath, AsPathSegment, AttributeTypeSet, Communities, ExtendedCommunities,
        PathAttributeFlags, PathAttributes,
    },
    wire::{
        deserializer::{context::SessionContext, DiscardReason},
        IPV4_LEN, IPV6_LEN, IPV6_WITH_LINK_LOCAL_LEN,
    },
};
use bytes::Bytes;
use nom::{
    error::ErrorKind,
    number::complete::{be_u16, be_u32, be_u64, be_u8},
    IResult,
};
use peerwire_iana::address_family::{AddressFamily, AddressType};
use peerwire_parse_utils::{impl_nom_parse_error, parse_complete};
use std::{
    collections::HashMap,
    fmt::Debug,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

/// Highest MULTI_EXIT_DISC value kept, larger values are clamped
pub const MAX_MED: u32 = u32::MAX - 1;

/// Error found while decoding a single attribute value. The TLV loop
/// attaches the offending attribute to build a [PathAttributeParsingError].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PathAttributeErrorKind {
    /// Errors triggered by the nom parser, see [ErrorKind] for
    /// additional information.
    NomError(ErrorKind),
    AttributeLength,
    InvalidOrigin,
    InvalidNextHop,
    OptionalAttribute,
    MalformedAsPath,
}

impl_nom_parse_error!(PathAttributeErrorKind);

/// Attribute level errors, each carries the whole offending attribute
/// (flags, type, length and value) as notification data
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PathAttributeParsingError {
    UnrecognizedWellKnownAttribute(Vec<u8>),
    AttributeFlagsError(Vec<u8>),
    AttributeLengthError(Vec<u8>),
    InvalidOriginAttribute(Vec<u8>),
    InvalidNextHopAttribute(Vec<u8>),
    OptionalAttributeError(Vec<u8>),
    MalformedAsPath(Vec<u8>),
}

impl PathAttributeParsingError {
    pub fn from_kind(kind: PathAttributeErrorKind, attribute: &[u8]) -> Self {
        let attribute = attribute.to_vec();
        match kind {
            PathAttributeErrorKind::NomError(_) | PathAttributeErrorKind::AttributeLength => {
                Self::AttributeLengthError(attribute)
            }
            PathAttributeErrorKind::InvalidOrigin => Self::InvalidOriginAttribute(attribute),
            PathAttributeErrorKind::InvalidNextHop => Self::InvalidNextHopAttribute(attribute),
            PathAttributeErrorKind::OptionalAttribute => Self::OptionalAttributeError(attribute),
            PathAttributeErrorKind::MalformedAsPath => Self::MalformedAsPath(attribute),
        }
    }
}

impl From<PathAttributeParsingError> for UpdateMessageError {
    fn from(value: PathAttributeParsingError) -> Self {
        match value {
            PathAttributeParsingError::UnrecognizedWellKnownAttribute(value) => {
                UpdateMessageError::UnrecognizedWellKnownAttribute { value }
            }
            PathAttributeParsingError::AttributeFlagsError(value) => {
                UpdateMessageError::AttributeFlagsError { value }
            }
            PathAttributeParsingError::AttributeLengthError(value) => {
                UpdateMessageError::AttributeLengthError { value }
            }
            PathAttributeParsingError::InvalidOriginAttribute(value) => {
                UpdateMessageError::InvalidOriginAttribute { value }
            }
            PathAttributeParsingError::InvalidNextHopAttribute(value) => {
                UpdateMessageError::InvalidNextHopAttribute { value }
            }
            PathAttributeParsingError::OptionalAttributeError(value) => {
                UpdateMessageError::OptionalAttributeError { value }
            }
            PathAttributeParsingError::MalformedAsPath(_) => {
                UpdateMessageError::MalformedAsPath { value: vec![] }
            }
        }
    }
}

/// Result of decoding a single attribute
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AttributeOutcome {
    Accepted,
    /// Attribute is valid but dropped
    Skipped,
    /// The whole UPDATE must be ignored
    DiscardUpdate(DiscardReason),
}

/// MP_REACH_NLRI value with the NLRI still in wire format
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MpReachValue {
    pub address_type: AddressType,
    pub next_hop: IpAddr,
    pub link_local: Option<Ipv6Addr>,
    pub nlri: Bytes,
}

/// MP_UNREACH_NLRI value with the withdrawn routes still in wire format
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MpUnreachValue {
    pub address_type: AddressType,
    pub nlri: Bytes,
}

/// Everything gathered while walking the attributes of one UPDATE. The
/// AS path and aggregator variants are kept apart until the whole attribute
/// section is known, since they have to be reconciled together.
#[derive(Debug, Default)]
pub struct UpdateAccumulator {
    pub(crate) attributes: PathAttributes,
    pub(crate) seen: AttributeTypeSet,
    pub(crate) as_path_legacy: Option<AsPath<u16>>,
    pub(crate) as_path: Option<AsPath<u32>>,
    pub(crate) as4_path: Option<AsPath<u32>>,
    pub(crate) aggregator: Option<Aggregator>,
    pub(crate) as4_aggregator: Option<Aggregator>,
    pub(crate) mp_reach: Option<MpReachValue>,
    pub(crate) mp_unreach: Option<MpUnreachValue>,
}

impl UpdateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn attributes(&self) -> &PathAttributes {
        &self.attributes
    }
}

/// Decoder of a single path attribute type
pub trait PathAttributeDecoder: Debug + Send + Sync {
    fn attribute_type(&self) -> PathAttributeType;

    /// When false the attribute is handled as an unknown attribute for this
    /// session
    fn applies(&self, _ctx: &SessionContext<'_>) -> bool {
        true
    }

    fn decode(
        &self,
        flags: PathAttributeFlags,
        value: &[u8],
        ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind>;
}

#[inline]
const fn check_length(value: &[u8], expected: usize) -> Result<(), PathAttributeErrorKind> {
    if value.len() != expected {
        return Err(PathAttributeErrorKind::AttributeLength);
    }
    Ok(())
}

#[inline]
const fn check_length_multiple(value: &[u8], multiple: usize) -> Result<(), PathAttributeErrorKind> {
    if value.is_empty() || value.len() % multiple != 0 {
        return Err(PathAttributeErrorKind::AttributeLength);
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct OriginDecoder;

impl PathAttributeDecoder for OriginDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::Origin
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        _ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        check_length(value, 1)?;
        let origin = parse_complete(value, be_u8)?;
        let origin =
            Origin::try_from(origin).map_err(|_| PathAttributeErrorKind::InvalidOrigin)?;
        update.attributes.set_origin(Some(origin));
        Ok(AttributeOutcome::Accepted)
    }
}

fn parse_as_path_segment_header(buf: &[u8]) -> IResult<&[u8], (u8, u8), PathAttributeErrorKind> {
    let (buf, segment_type) = be_u8(buf)?;
    let (buf, count) = be_u8(buf)?;
    Ok((buf, (segment_type, count)))
}

/// Parse AS path segments where each AS number is read by `parse_asn`
fn parse_as_path<T, F>(value: &[u8], parse_asn: F) -> Result<AsPath<T>, PathAttributeErrorKind>
where
    T: Copy + Into<u32>,
    F: Fn(&[u8]) -> IResult<&[u8], T, PathAttributeErrorKind> + Copy,
{
    let mut buf = value;
    let mut segments = vec![];
    while !buf.is_empty() {
        let (rest, (segment_type, count)) = parse_as_path_segment_header(buf)
            .map_err(|_| PathAttributeErrorKind::MalformedAsPath)?;
        let segment_type = AsPathSegmentType::try_from(segment_type)
            .map_err(|_| PathAttributeErrorKind::MalformedAsPath)?;
        if count == 0 {
            return Err(PathAttributeErrorKind::MalformedAsPath);
        }
        let (rest, members) = nom::multi::count(parse_asn, count as usize)(rest)
            .map_err(|_| PathAttributeErrorKind::MalformedAsPath)?;
        segments.push(AsPathSegment::new(segment_type, members));
        buf = rest;
    }
    Ok(AsPath::new(segments))
}

#[derive(Debug, Default)]
pub struct AsPathDecoder;

impl PathAttributeDecoder for AsPathDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::AsPath
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        if ctx.as4() {
            update.as_path = Some(parse_as_path(value, |buf| be_u32(buf))?);
        } else {
            update.as_path_legacy = Some(parse_as_path(value, |buf| be_u16(buf))?);
        }
        Ok(AttributeOutcome::Accepted)
    }
}

/// AS4_PATH is only understood when the local speaker runs with 4-octet AS
/// numbers, otherwise it is passed through like any unknown attribute
#[derive(Debug, Default)]
pub struct As4PathDecoder;

impl PathAttributeDecoder for As4PathDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::As4Path
    }

    fn applies(&self, ctx: &SessionContext<'_>) -> bool {
        ctx.params().four_octet_asn()
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        if ctx.as4() {
            log::debug!("Ignoring AS4_PATH received over a 4-octet AS session");
            return Ok(AttributeOutcome::Skipped);
        }
        let as4_path = parse_as_path(value, |buf| be_u32(buf))?;
        if as4_path.has_confed_segments() {
            log::debug!("Dropping confederation segments from AS4_PATH");
        }
        update.as4_path = Some(as4_path.without_confed_segments());
        Ok(AttributeOutcome::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct NextHopDecoder;

impl PathAttributeDecoder for NextHopDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::NextHop
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        _ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        check_length(value, IPV4_LEN as usize)?;
        let next_hop = Ipv4Addr::from(parse_complete(value, be_u32)?);
        // 0.0.0.0, class D and class E
        if next_hop.is_unspecified() || next_hop.is_multicast() || next_hop.octets()[0] >= 240 {
            return Err(PathAttributeErrorKind::InvalidNextHop);
        }
        update.attributes.set_next_hop(Some(next_hop));
        Ok(AttributeOutcome::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct MultiExitDiscriminatorDecoder;

impl PathAttributeDecoder for MultiExitDiscriminatorDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::MultiExitDiscriminator
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        _ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        check_length(value, 4)?;
        let med = parse_complete(value, be_u32)?;
        update.attributes.set_med(Some(med.min(MAX_MED)));
        Ok(AttributeOutcome::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct LocalPreferenceDecoder;

impl PathAttributeDecoder for LocalPreferenceDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::LocalPreference
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        check_length(value, 4)?;
        let local_pref = parse_complete(value, be_u32)?;
        if ctx.params().is_ebgp() {
            log::warn!(
                "Ignoring LOCAL_PREF {local_pref} received from EBGP peer AS{}",
                ctx.params().peer_asn()
            );
            return Ok(AttributeOutcome::Skipped);
        }
        update.attributes.set_local_pref(Some(local_pref));
        Ok(AttributeOutcome::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct AtomicAggregateDecoder;

impl PathAttributeDecoder for AtomicAggregateDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::AtomicAggregate
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        _ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        check_length(value, 0)?;
        update.attributes.set_atomic_aggregate(true);
        Ok(AttributeOutcome::Accepted)
    }
}

fn parse_aggregator<T: Into<u32>>(
    buf: &[u8],
    parse_asn: fn(&[u8]) -> IResult<&[u8], T, PathAttributeErrorKind>,
) -> IResult<&[u8], Aggregator, PathAttributeErrorKind> {
    let (buf, asn) = parse_asn(buf)?;
    let (buf, origin) = be_u32(buf)?;
    Ok((buf, Aggregator::new(asn.into(), Ipv4Addr::from(origin))))
}

#[derive(Debug, Default)]
pub struct AggregatorDecoder;

impl PathAttributeDecoder for AggregatorDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::Aggregator
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        let aggregator = if ctx.as4() {
            check_length(value, 8)?;
            parse_complete(value, |buf| parse_aggregator(buf, |asn| be_u32(asn)))?
        } else {
            check_length(value, 6)?;
            parse_complete(value, |buf| parse_aggregator(buf, |asn| be_u16(asn)))?
        };
        if aggregator.asn() == 0 {
            log::warn!(
                "AGGREGATOR with AS 0 from {} accepted",
                aggregator.origin()
            );
        }
        update.aggregator = Some(aggregator);
        update.attributes.set_aggregator(Some(aggregator));
        Ok(AttributeOutcome::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct As4AggregatorDecoder;

impl PathAttributeDecoder for As4AggregatorDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::As4Aggregator
    }

    fn applies(&self, ctx: &SessionContext<'_>) -> bool {
        ctx.params().four_octet_asn()
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        if ctx.as4() {
            log::debug!("Ignoring AS4_AGGREGATOR received over a 4-octet AS session");
            return Ok(AttributeOutcome::Skipped);
        }
        if update.aggregator.is_none() {
            return Err(PathAttributeErrorKind::OptionalAttribute);
        }
        check_length(value, 8)?;
        let aggregator = parse_complete(value, |buf| parse_aggregator(buf, |asn| be_u32(asn)))?;
        update.as4_aggregator = Some(aggregator);
        Ok(AttributeOutcome::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct CommunitiesDecoder;

impl PathAttributeDecoder for CommunitiesDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::Communities
    }

    fn decode(
        &self,
        flags: PathAttributeFlags,
        value: &[u8],
        _ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        check_length_multiple(value, 4)?;
        let values = parse_complete(value, nom::multi::many0(be_u32))?;
        update
            .attributes
            .set_communities(Some(Communities::new(values, flags.partial())));
        Ok(AttributeOutcome::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct ExtendedCommunitiesDecoder;

impl PathAttributeDecoder for ExtendedCommunitiesDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::ExtendedCommunities
    }

    fn decode(
        &self,
        flags: PathAttributeFlags,
        value: &[u8],
        _ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        check_length_multiple(value, 8)?;
        let values = parse_complete(value, nom::multi::many0(be_u64))?;
        update
            .attributes
            .set_extended_communities(Some(ExtendedCommunities::new(values, flags.partial())));
        Ok(AttributeOutcome::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct OriginatorIdDecoder;

impl PathAttributeDecoder for OriginatorIdDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::OriginatorId
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        check_length(value, 4)?;
        let originator_id = Ipv4Addr::from(parse_complete(value, be_u32)?);
        if originator_id == ctx.params().local_bgp_id() {
            return Ok(AttributeOutcome::DiscardUpdate(
                DiscardReason::OriginatorIdLoop,
            ));
        }
        update.attributes.set_originator_id(Some(originator_id));
        Ok(AttributeOutcome::Accepted)
    }
}

#[derive(Debug, Default)]
pub struct ClusterListDecoder;

impl PathAttributeDecoder for ClusterListDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::ClusterList
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        _ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        check_length_multiple(value, 4)?;
        let ids = parse_complete(value, nom::multi::many0(be_u32))?;
        update
            .attributes
            .set_cluster_list(Some(ids.into_iter().map(Ipv4Addr::from).collect()));
        Ok(AttributeOutcome::Accepted)
    }
}

type MpReachFields<'a> = (u16, u8, &'a [u8], &'a [u8]);

/// AFI, SAFI, next hop and NLRI. The SNPA list of RFC2858 is skipped, with
/// RFC4760 it collapsed into a single reserved zero octet.
fn parse_mp_reach(buf: &[u8]) -> IResult<&[u8], MpReachFields<'_>, PathAttributeErrorKind> {
    let (buf, afi) = be_u16(buf)?;
    let (buf, safi) = be_u8(buf)?;
    let (buf, next_hop) = nom::multi::length_data(be_u8)(buf)?;
    let (mut buf, snpa_count) = be_u8(buf)?;
    for _ in 0..snpa_count {
        let (rest, snpa_len) = be_u8(buf)?;
        // length is counted in semi-octets
        let (rest, _snpa) = nom::bytes::complete::take(snpa_len.div_ceil(2))(rest)?;
        buf = rest;
    }
    Ok((&buf[buf.len()..], (afi, safi, next_hop, buf)))
}

fn is_link_local(addr: &Ipv6Addr) -> bool {
    addr.segments()[0] & 0xffc0 == 0xfe80
}

#[derive(Debug, Default)]
pub struct MpReachDecoder;

impl PathAttributeDecoder for MpReachDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::MpReachNlri
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        _ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        let (afi, safi, next_hop, nlri) = parse_complete(value, parse_mp_reach)
            .map_err(|_| PathAttributeErrorKind::OptionalAttribute)?;
        let address_type = match AddressType::from_wire(afi, safi) {
            Ok(address_type) => address_type,
            Err(_) => {
                log::warn!("Skipping MP_REACH_NLRI for unsupported AFI/SAFI {afi}/{safi}");
                return Ok(AttributeOutcome::Skipped);
            }
        };
        let (next_hop, link_local) = match (address_type.address_family(), next_hop.len() as u8)
        {
            (AddressFamily::IPv4, IPV4_LEN) => {
                let octets: [u8; 4] = next_hop
                    .try_into()
                    .map_err(|_| PathAttributeErrorKind::OptionalAttribute)?;
                (IpAddr::V4(Ipv4Addr::from(octets)), None)
            }
            (AddressFamily::IPv6, IPV6_LEN) => {
                let octets: [u8; 16] = next_hop
                    .try_into()
                    .map_err(|_| PathAttributeErrorKind::OptionalAttribute)?;
                (IpAddr::V6(Ipv6Addr::from(octets)), None)
            }
            (AddressFamily::IPv6, IPV6_WITH_LINK_LOCAL_LEN) => {
                let (global, second) = next_hop.split_at(IPV6_LEN as usize);
                let global: [u8; 16] = global
                    .try_into()
                    .map_err(|_| PathAttributeErrorKind::OptionalAttribute)?;
                let second: [u8; 16] = second
                    .try_into()
                    .map_err(|_| PathAttributeErrorKind::OptionalAttribute)?;
                let second = Ipv6Addr::from(second);
                let link_local = if is_link_local(&second) {
                    Some(second)
                } else {
                    log::warn!("Discarding second IPv6 next hop {second}, not link local");
                    None
                };
                (IpAddr::V6(Ipv6Addr::from(global)), link_local)
            }
            _ => return Err(PathAttributeErrorKind::OptionalAttribute),
        };
        update.mp_reach = Some(MpReachValue {
            address_type,
            next_hop,
            link_local,
            nlri: Bytes::copy_from_slice(nlri),
        });
        Ok(AttributeOutcome::Accepted)
    }
}

fn parse_mp_unreach(buf: &[u8]) -> IResult<&[u8], (u16, u8, &[u8]), PathAttributeErrorKind> {
    let (buf, afi) = be_u16(buf)?;
    let (buf, safi) = be_u8(buf)?;
    Ok((&buf[buf.len()..], (afi, safi, buf)))
}

#[derive(Debug, Default)]
pub struct MpUnreachDecoder;

impl PathAttributeDecoder for MpUnreachDecoder {
    fn attribute_type(&self) -> PathAttributeType {
        PathAttributeType::MpUnreachNlri
    }

    fn decode(
        &self,
        _flags: PathAttributeFlags,
        value: &[u8],
        _ctx: &SessionContext<'_>,
        update: &mut UpdateAccumulator,
    ) -> Result<AttributeOutcome, PathAttributeErrorKind> {
        let (afi, safi, nlri) = parse_complete(value, parse_mp_unreach)
            .map_err(|_| PathAttributeErrorKind::OptionalAttribute)?;
        let address_type = match AddressType::from_wire(afi, safi) {
            Ok(address_type) => address_type,
            Err(_) => {
                log::warn!("Skipping MP_UNREACH_NLRI for unsupported AFI/SAFI {afi}/{safi}");
                return Ok(AttributeOutcome::Skipped);
            }
        };
        update.mp_unreach = Some(MpUnreachValue {
            address_type,
            nlri: Bytes::copy_from_slice(nlri),
        });
        Ok(AttributeOutcome::Accepted)
    }
}

/// Lookup table of attribute decoders keyed by attribute type code
#[derive(Debug)]
pub struct PathAttributeDecoderRegistry {
    decoders: HashMap<u8, Box<dyn PathAttributeDecoder>>,
}

impl PathAttributeDecoderRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    pub fn register(&mut self, decoder: Box<dyn PathAttributeDecoder>) {
        self.decoders
            .insert(decoder.attribute_type().into(), decoder);
    }

    pub fn get(&self, code: u8) -> Option<&dyn PathAttributeDecoder> {
        self.decoders.get(&code).map(|decoder| decoder.as_ref())
    }
}

impl Default for PathAttributeDecoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(OriginDecoder));
        registry.register(Box::new(AsPathDecoder));
        registry.register(Box::new(NextHopDecoder));
        registry.register(Box::new(MultiExitDiscriminatorDecoder));
        registry.register(Box::new(LocalPreferenceDecoder));
        registry.register(Box::new(AtomicAggregateDecoder));
        registry.register(Box::new(AggregatorDecoder));
        registry.register(Box::new(CommunitiesDecoder));
        registry.register(Box::new(OriginatorIdDecoder));
        registry.register(Box::new(ClusterListDecoder));
        registry.register(Box::new(MpReachDecoder));
        registry.register(Box::new(MpUnreachDecoder));
        registry.register(Box::new(ExtendedCommunitiesDecoder));
        registry.register(Box::new(As4PathDecoder));
        registry.register(Box::new(As4AggregatorDecoder));
        registry
    }
}

/// Errors of the attribute section as a whole
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum AttributeListError {
    MalformedAttributeList,
    Attribute(PathAttributeParsingError),
}

/// Flags, type code and value length
fn parse_attribute_header(buf: &[u8]) -> IResult<&[u8], (PathAttributeFlags, u8, usize)> {
    let (buf, flags) = be_u8(buf)?;
    let flags = PathAttributeFlags::from_byte(flags);
    let (buf, code) = be_u8(buf)?;
    if flags.extended_length() {
        let (buf, len) = be_u16(buf)?;
        Ok((buf, (flags, code, len as usize)))
    } else {
        let (buf, len) = be_u8(buf)?;
        Ok((buf, (flags, code, len as usize)))
    }
}

/// Re-encode an unknown transitive attribute for pass through: partial bit
/// set and compact length when the value fits.
fn transit_attribute(flags: PathAttributeFlags, code: u8, value: &[u8]) -> Vec<u8> {
    let extended = value.len() > u8::MAX as usize;
    let flags = flags.with_partial(true).with_extended_length(extended);
    let mut ret = Vec::with_capacity(value.len() + 4);
    ret.push(flags.to_byte());
    ret.push(code);
    if extended {
        ret.extend_from_slice(&(value.len() as u16).to_be_bytes());
    } else {
        ret.push(value.len() as u8);
    }
    ret.extend_from_slice(value);
    ret
}

/// Walk the attribute section TLV by TLV. Returns the discard reason when
/// the UPDATE has to be ignored.
pub fn decode_path_attributes(
    buf: &[u8],
    ctx: &SessionContext<'_>,
    registry: &PathAttributeDecoderRegistry,
    update: &mut UpdateAccumulator,
) -> Result<Option<DiscardReason>, AttributeListError> {
    let mut buf = buf;
    while !buf.is_empty() {
        let (value_buf, (flags, code, len)) =
            parse_attribute_header(buf).map_err(|_| AttributeListError::MalformedAttributeList)?;
        let header_len = buf.len() - value_buf.len();
        if len > value_buf.len() {
            return Err(AttributeListError::Attribute(
                PathAttributeParsingError::AttributeLengthError(buf.to_vec()),
            ));
        }
        let (attribute, rest) = buf.split_at(header_len + len);
        let value = &attribute[header_len..];
        buf = rest;

        if !update.seen.insert(code) {
            log::debug!("Duplicate path attribute {code}");
            return Err(AttributeListError::MalformedAttributeList);
        }

        let decoder = registry.get(code).filter(|decoder| decoder.applies(ctx));
        let decoder = match decoder {
            Some(decoder) => decoder,
            None => {
                if !flags.optional() {
                    return Err(AttributeListError::Attribute(
                        PathAttributeParsingError::UnrecognizedWellKnownAttribute(
                            attribute.to_vec(),
                        ),
                    ));
                }
                if flags.transitive() {
                    update
                        .attributes
                        .push_transit(&transit_attribute(flags, code, value));
                } else {
                    log::debug!("Dropping unknown optional non-transitive attribute {code}");
                }
                continue;
            }
        };
        if !flags.matches(decoder.attribute_type().category()) {
            return Err(AttributeListError::Attribute(
                PathAttributeParsingError::AttributeFlagsError(attribute.to_vec()),
            ));
        }
        match decoder.decode(flags, value, ctx, update) {
            Ok(AttributeOutcome::Accepted) | Ok(AttributeOutcome::Skipped) => {}
            Ok(AttributeOutcome::DiscardUpdate(reason)) => return Ok(Some(reason)),
            Err(kind) => {
                return Err(AttributeListError::Attribute(
                    PathAttributeParsingError::from_kind(kind, attribute),
                ))
            }
        }
    }
    Ok(None)
}
