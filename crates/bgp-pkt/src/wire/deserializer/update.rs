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


//! Deserializer for BGP Update message

use crate::{
    iana::{PathAttributeType, AS_TRANS},
    notification::{BgpNotificationMessage, MessageHeaderError, UpdateMessageError},
    path_attribute::{reconcile_as4_path, AsPath},
    update::{BgpUpdateMessage, MpReach, MpUnreach, NlriSpan},
    wire::deserializer::{
        context::SessionContext,
        nlri::{parse_prefixes, NlriParsingError},
        path_attribute::{
            decode_path_attributes, AttributeListError, MpReachValue, MpUnreachValue,
            PathAttributeDecoderRegistry, PathAttributeParsingError, UpdateAccumulator,
        },
        BodyReader, Decoded,
    },
};
use bytes::Bytes;
use peerwire_iana::address_family::AddressType;
use peerwire_parse_utils::ring_buffer::RingBufferError;

/// BGP Update Message Parsing errors
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BgpUpdateMessageParsingError {
    Buffer(RingBufferError),
    /// Withdrawn routes and attributes lengths exceed the message, or the
    /// attribute list itself can't be walked
    MalformedAttributeList,
    Attribute(PathAttributeParsingError),
    MissingWellKnownAttribute(PathAttributeType),
    MalformedAsPath,
    InvalidNetworkField(NlriParsingError),
    /// NLRI carried in MP_REACH_NLRI or MP_UNREACH_NLRI
    InvalidMpNlri(NlriParsingError),
}

impl From<RingBufferError> for BgpUpdateMessageParsingError {
    fn from(value: RingBufferError) -> Self {
        Self::Buffer(value)
    }
}

impl From<BgpUpdateMessageParsingError> for BgpNotificationMessage {
    fn from(value: BgpUpdateMessageParsingError) -> Self {
        let error = match value {
            BgpUpdateMessageParsingError::Buffer(_) => {
                return BgpNotificationMessage::MessageHeaderError(
                    MessageHeaderError::BadMessageLength { value: vec![] },
                )
            }
            BgpUpdateMessageParsingError::MalformedAttributeList => {
                UpdateMessageError::MalformedAttributeList { value: vec![] }
            }
            BgpUpdateMessageParsingError::Attribute(err) => err.into(),
            BgpUpdateMessageParsingError::MissingWellKnownAttribute(attribute_type) => {
                UpdateMessageError::MissingWellKnownAttribute {
                    value: vec![attribute_type.into()],
                }
            }
            BgpUpdateMessageParsingError::MalformedAsPath => {
                UpdateMessageError::MalformedAsPath { value: vec![] }
            }
            BgpUpdateMessageParsingError::InvalidNetworkField(_) => {
                UpdateMessageError::InvalidNetworkField { value: vec![] }
            }
            BgpUpdateMessageParsingError::InvalidMpNlri(_) => {
                UpdateMessageError::OptionalAttributeError { value: vec![] }
            }
        };
        BgpNotificationMessage::UpdateMessageError(error)
    }
}

/// Decode an UPDATE body straight from the ring.
///
/// The withdrawn routes are skipped on the first pass and re-read from a
/// snapshot once the attributes are known to be valid, so no prefix is
/// processed for a message that is rejected later on.
pub fn decode_update(
    body: &mut BodyReader<'_>,
    ctx: &SessionContext<'_>,
    registry: &PathAttributeDecoderRegistry,
) -> Result<Decoded<BgpUpdateMessage>, BgpUpdateMessageParsingError> {
    let body_len = body.remaining();
    let withdrawn_len = body.read_u16()? as usize;
    if withdrawn_len + 4 > body_len {
        return Err(BgpUpdateMessageParsingError::MalformedAttributeList);
    }
    let withdrawn_start = body.take_snapshot();
    body.advance(withdrawn_len)?;
    let attributes_len = body.read_u16()? as usize;
    if withdrawn_len + attributes_len + 4 > body_len {
        return Err(BgpUpdateMessageParsingError::MalformedAttributeList);
    }
    let attributes_raw = body.read_fixed(attributes_len)?;
    let nlri_raw = body.read_rest()?;

    let mut update = UpdateAccumulator::new();
    match decode_path_attributes(&attributes_raw, ctx, registry, &mut update) {
        Ok(Some(reason)) => return Ok(Decoded::Discarded(reason)),
        Ok(None) => {}
        Err(AttributeListError::MalformedAttributeList) => {
            return Err(BgpUpdateMessageParsingError::MalformedAttributeList)
        }
        Err(AttributeListError::Attribute(err)) => {
            return Err(BgpUpdateMessageParsingError::Attribute(err))
        }
    }

    body.restore_snapshot(&withdrawn_start)?;
    let withdrawn_raw = body.read_fixed(withdrawn_len)?;
    finalize_update(update, withdrawn_raw, nlri_raw, ctx).map(Decoded::Message)
}

/// Cross attribute checks and NLRI decoding, run once the whole attribute
/// section was accepted
fn finalize_update(
    update: UpdateAccumulator,
    withdrawn_raw: Bytes,
    nlri_raw: Bytes,
    ctx: &SessionContext<'_>,
) -> Result<BgpUpdateMessage, BgpUpdateMessageParsingError> {
    let UpdateAccumulator {
        mut attributes,
        as_path_legacy,
        as_path,
        mut as4_path,
        aggregator,
        mut as4_aggregator,
        mp_reach,
        mp_unreach,
        ..
    } = update;
    let params = ctx.params();

    if let Some(aggregator) = aggregator {
        if aggregator.asn() != u32::from(AS_TRANS)
            && (as4_aggregator.is_some() || as4_path.is_some())
        {
            log::debug!(
                "AGGREGATOR carries AS{} rather than AS_TRANS, ignoring AS4_AGGREGATOR and AS4_PATH",
                aggregator.asn()
            );
            as4_aggregator = None;
            as4_path = None;
        }
    }
    if let Some(as4_aggregator) = as4_aggregator {
        attributes.set_aggregator(Some(as4_aggregator));
    }

    match (as_path, as_path_legacy) {
        (Some(as_path), _) => attributes.set_as_path(Some(as_path)),
        (None, Some(legacy)) if params.four_octet_asn() => {
            let upgraded = legacy.to_as4();
            let reconciled = match &as4_path {
                Some(as4_path) => reconcile_as4_path(&upgraded, as4_path).map_err(|err| {
                    log::debug!("Cannot reconcile AS_PATH and AS4_PATH: {err}");
                    BgpUpdateMessageParsingError::MalformedAsPath
                })?,
                None => upgraded,
            };
            attributes.set_as_path_legacy(Some(legacy));
            attributes.set_as_path(Some(reconciled));
        }
        (None, legacy) => attributes.set_as_path_legacy(legacy),
    }
    if as4_path.is_some() && !attributes.contains(PathAttributeType::AsPath) {
        log::debug!("Ignoring AS4_PATH received without AS_PATH");
    }

    if let Some(path) = attributes.effective_as_path() {
        check_as_path(&path, ctx)?;
    }

    let ipv4_active = ctx.capabilities().is_active(AddressType::Ipv4Unicast);
    let classic_reach = ipv4_active && !nlri_raw.is_empty();
    let mp_reach = build_mp_reach(mp_reach, ctx)?;
    let mp_unreach = build_mp_unreach(mp_unreach, ctx)?;
    let mp_reach_present = mp_reach
        .as_ref()
        .is_some_and(|reach| !reach.nlri().raw().is_empty());
    if classic_reach || mp_reach_present {
        let mut mandatory = vec![PathAttributeType::Origin, PathAttributeType::AsPath];
        if classic_reach {
            mandatory.push(PathAttributeType::NextHop);
        }
        if params.peer_asn() == params.local_asn() {
            mandatory.push(PathAttributeType::LocalPreference);
        }
        if let Some(missing) = mandatory
            .into_iter()
            .find(|attribute_type| !attributes.contains(*attribute_type))
        {
            return Err(BgpUpdateMessageParsingError::MissingWellKnownAttribute(
                missing,
            ));
        }
    }

    let (withdrawn, nlri) = if ipv4_active {
        let withdrawn = parse_prefixes(&withdrawn_raw, AddressType::Ipv4Unicast)
            .map_err(BgpUpdateMessageParsingError::InvalidNetworkField)?;
        let nlri = parse_prefixes(&nlri_raw, AddressType::Ipv4Unicast)
            .map_err(BgpUpdateMessageParsingError::InvalidNetworkField)?;
        (
            NlriSpan::new(AddressType::Ipv4Unicast, withdrawn_raw, withdrawn),
            NlriSpan::new(AddressType::Ipv4Unicast, nlri_raw, nlri),
        )
    } else {
        if !withdrawn_raw.is_empty() || !nlri_raw.is_empty() {
            log::debug!("Ignoring IPv4 unicast NLRI, the address family is not active");
        }
        (
            NlriSpan::empty(AddressType::Ipv4Unicast),
            NlriSpan::empty(AddressType::Ipv4Unicast),
        )
    };

    Ok(BgpUpdateMessage::new(
        withdrawn, attributes, nlri, mp_reach, mp_unreach,
    ))
}

/// Confederation segments and first AS enforcement
fn check_as_path(
    path: &AsPath<u32>,
    ctx: &SessionContext<'_>,
) -> Result<(), BgpUpdateMessageParsingError> {
    let params = ctx.params();
    if path.has_confed_segments() && params.confederation_id().is_none() {
        log::debug!("AS_PATH with confederation segments while no confederation is configured");
        return Err(BgpUpdateMessageParsingError::MalformedAsPath);
    }
    if params.enforce_first_as() && params.is_ebgp() {
        let first_as = path.first_as();
        if first_as != Some(params.peer_asn()) {
            log::debug!(
                "AS_PATH starts with {first_as:?} while the peer is AS{}",
                params.peer_asn()
            );
            return Err(BgpUpdateMessageParsingError::MalformedAsPath);
        }
    }
    Ok(())
}

fn build_mp_reach(
    value: Option<MpReachValue>,
    ctx: &SessionContext<'_>,
) -> Result<Option<MpReach>, BgpUpdateMessageParsingError> {
    let value = match value {
        Some(value) => value,
        None => return Ok(None),
    };
    if !ctx.capabilities().is_active(value.address_type) {
        log::debug!(
            "Ignoring MP_REACH_NLRI for inactive {}",
            value.address_type
        );
        return Ok(None);
    }
    let prefixes = parse_prefixes(&value.nlri, value.address_type)
        .map_err(BgpUpdateMessageParsingError::InvalidMpNlri)?;
    Ok(Some(MpReach::new(
        value.next_hop,
        value.link_local,
        NlriSpan::new(value.address_type, value.nlri, prefixes),
    )))
}

fn build_mp_unreach(
    value: Option<MpUnreachValue>,
    ctx: &SessionContext<'_>,
) -> Result<Option<MpUnreach>, BgpUpdateMessageParsingError> {
    let value = match value {
        Some(value) => value,
        None => return Ok(None),
    };
    if !ctx.capabilities().is_active(value.address_type) {
        log::debug!(
            "Ignoring MP_UNREACH_NLRI for inactive {}",
            value.address_type
        );
        return Ok(None);
    }
    let prefixes = parse_prefixes(&value.nlri, value.address_type)
        .map_err(BgpUpdateMessageParsingError::InvalidMpNlri)?;
    Ok(Some(MpUnreach::new(NlriSpan::new(
        value.address_type,
        value.nlri,
        prefixes,
    ))))
}
