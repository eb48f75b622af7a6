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


//! Deserializer for BGP Route Refresh message, including the Outbound Route
//! Filtering extension of [RFC5291](https://datatracker.ietf.org/doc/html/rfc5291)

use crate::{
    iana::{OrfType, RouteRefreshWhen},
    notification::{BgpNotificationMessage, MessageHeaderError},
    route_refresh::{
        BgpRouteRefreshMessage, OrfAction, OrfFilter, OrfMatch, OrfRequest, PrefixOrfEntry,
    },
    wire::{
        deserializer::{
            nlri::{parse_prefix, NlriParsingError},
            Decoded, DiscardReason,
        },
        serializer::nlri::encode_prefixes,
    },
};
use nom::{
    error::ErrorKind,
    number::complete::{be_u16, be_u32, be_u8},
    IResult,
};
use peerwire_iana::address_family::AddressType;
use peerwire_parse_utils::{impl_nom_parse_error, parse_complete};

/// Length of a remove-all entry, it only carries the common octet
const ORF_REMOVE_ALL_LENGTH: u16 = 1;

/// BGP Route Refresh Message Parsing errors
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BgpRouteRefreshMessageParsingError {
    /// Errors triggered by the nom parser, see [nom::error::ErrorKind] for
    /// additional information.
    NomError(ErrorKind),
    UndefinedWhenToRefresh(u8),
    /// ORF block longer than what is left of the message
    TruncatedOrf { orf_type: u8, length: u16 },
    /// Remove-all must be the only entry of its ORF block
    InvalidRemoveAll { length: u16 },
    UndefinedOrfAction(u8),
    InvalidPrefix(NlriParsingError),
}

impl_nom_parse_error!(BgpRouteRefreshMessageParsingError);

/// Every malformed ROUTE-REFRESH is reported as a bad message length, the
/// data carries the octets that could not be parsed
impl From<BgpRouteRefreshMessageParsingError> for BgpNotificationMessage {
    fn from(value: BgpRouteRefreshMessageParsingError) -> Self {
        let value = match value {
            BgpRouteRefreshMessageParsingError::NomError(_) => vec![],
            BgpRouteRefreshMessageParsingError::UndefinedWhenToRefresh(when) => vec![when],
            BgpRouteRefreshMessageParsingError::TruncatedOrf { orf_type, length } => {
                let [high, low] = length.to_be_bytes();
                vec![orf_type, high, low]
            }
            BgpRouteRefreshMessageParsingError::InvalidRemoveAll { length } => {
                length.to_be_bytes().to_vec()
            }
            BgpRouteRefreshMessageParsingError::UndefinedOrfAction(action) => vec![action],
            BgpRouteRefreshMessageParsingError::InvalidPrefix(err) => match err {
                NlriParsingError::NomError(_) => vec![],
                NlriParsingError::InvalidPrefixLength { prefix_len, .. } => vec![prefix_len],
                NlriParsingError::InvalidPrefix(prefix) => {
                    encode_prefixes(std::slice::from_ref(&prefix)).unwrap_or_default()
                }
            },
        };
        BgpNotificationMessage::MessageHeaderError(MessageHeaderError::BadMessageLength { value })
    }
}

fn parse_prefix_orf_entry(
    buf: &[u8],
    address_type: AddressType,
) -> IResult<&[u8], PrefixOrfEntry, BgpRouteRefreshMessageParsingError> {
    let (buf, common) = be_u8(buf)?;
    let action = (common >> 6) & 0x03;
    let action = OrfAction::from_repr(action).ok_or(nom::Err::Error(
        BgpRouteRefreshMessageParsingError::UndefinedOrfAction(action),
    ))?;
    if action == OrfAction::RemoveAll {
        return Ok((buf, PrefixOrfEntry::remove_all()));
    }
    let match_type = if common & 0x20 == 0 {
        OrfMatch::Permit
    } else {
        OrfMatch::Deny
    };
    let (buf, sequence) = be_u32(buf)?;
    let (buf, min_len) = be_u8(buf)?;
    let (buf, max_len) = be_u8(buf)?;
    let (buf, prefix) = match parse_prefix(buf, address_type) {
        Ok(value) => value,
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            return Err(nom::Err::Error(
                BgpRouteRefreshMessageParsingError::InvalidPrefix(err),
            ))
        }
        Err(nom::Err::Incomplete(needed)) => return Err(nom::Err::Incomplete(needed)),
    };
    Ok((
        buf,
        PrefixOrfEntry::new(action, match_type, sequence, min_len, max_len, prefix),
    ))
}

/// One ORF block, `None` when the ORF type is not understood
fn parse_orf_block(
    buf: &[u8],
    address_type: AddressType,
) -> IResult<&[u8], Option<OrfFilter>, BgpRouteRefreshMessageParsingError> {
    let (buf, orf_type) = be_u8(buf)?;
    let (buf, length) = be_u16(buf)?;
    if length as usize > buf.len() {
        return Err(nom::Err::Error(
            BgpRouteRefreshMessageParsingError::TruncatedOrf { orf_type, length },
        ));
    }
    let (entries_buf, buf) = buf.split_at(length as usize);
    let orf_type = match OrfType::try_from(orf_type) {
        Ok(orf_type) => orf_type,
        Err(_) => {
            log::debug!("Skipping ORF block of unknown type {orf_type}");
            return Ok((buf, None));
        }
    };
    let mut entries = vec![];
    let mut remaining = entries_buf;
    while !remaining.is_empty() {
        let (rest, entry) = parse_prefix_orf_entry(remaining, address_type)?;
        if entry.action() == OrfAction::RemoveAll && length != ORF_REMOVE_ALL_LENGTH {
            return Err(nom::Err::Error(
                BgpRouteRefreshMessageParsingError::InvalidRemoveAll { length },
            ));
        }
        entries.push(entry);
        remaining = rest;
    }
    Ok((buf, Some(OrfFilter::new(orf_type, entries))))
}

fn parse_orf_request(
    buf: &[u8],
    address_type: AddressType,
) -> IResult<&[u8], OrfRequest, BgpRouteRefreshMessageParsingError> {
    let (mut buf, when) = be_u8(buf)?;
    let when_to_refresh = RouteRefreshWhen::try_from(when).map_err(|_| {
        nom::Err::Error(BgpRouteRefreshMessageParsingError::UndefinedWhenToRefresh(
            when,
        ))
    })?;
    let mut filters = vec![];
    while !buf.is_empty() {
        let (rest, filter) = parse_orf_block(buf, address_type)?;
        filters.extend(filter);
        buf = rest;
    }
    Ok((buf, OrfRequest::new(when_to_refresh, filters)))
}

fn parse_route_refresh_header(
    buf: &[u8],
) -> IResult<&[u8], (u16, u8), BgpRouteRefreshMessageParsingError> {
    let (buf, afi) = be_u16(buf)?;
    let (buf, _reserved) = be_u8(buf)?;
    let (buf, safi) = be_u8(buf)?;
    Ok((buf, (afi, safi)))
}

/// Decode a ROUTE-REFRESH body. A request for an AFI/SAFI we don't support
/// is dropped rather than treated as an error.
pub fn decode_route_refresh(
    body: &[u8],
) -> Result<Decoded<BgpRouteRefreshMessage>, BgpRouteRefreshMessageParsingError> {
    let (buf, (afi, safi)) = match parse_route_refresh_header(body) {
        Ok(value) => value,
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => return Err(err),
        Err(nom::Err::Incomplete(_)) => {
            return Err(BgpRouteRefreshMessageParsingError::NomError(
                ErrorKind::Complete,
            ))
        }
    };
    let address_type = match AddressType::from_wire(afi, safi) {
        Ok(address_type) => address_type,
        Err(err) => {
            log::warn!("Ignoring ROUTE-REFRESH for unsupported AFI/SAFI {afi}/{safi}");
            return Ok(Decoded::Discarded(DiscardReason::UnsupportedAddressType(
                err,
            )));
        }
    };
    let orf = if buf.is_empty() {
        None
    } else {
        Some(parse_complete(buf, |buf| {
            parse_orf_request(buf, address_type)
        })?)
    };
    Ok(Decoded::Message(BgpRouteRefreshMessage::new(
        address_type,
        orf,
    )))
}
