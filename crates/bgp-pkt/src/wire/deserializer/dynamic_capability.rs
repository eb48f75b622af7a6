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


//! Deserializer for the dynamic CAPABILITY message

use crate::{
    capabilities::BgpCapability,
    dynamic_capability::{
        BgpCapabilityMessage, DynamicCapabilityAction, DynamicCapabilityEntry,
        DYNAMIC_CAPABILITY_ACK_REQUEST, DYNAMIC_CAPABILITY_INIT_ACK, DYNAMIC_CAPABILITY_RESERVED,
        DYNAMIC_CAPABILITY_UNSET,
    },
    notification::{BgpNotificationMessage, CapabilityMessageError},
    wire::deserializer::{capabilities::CapabilityDecoderRegistry, context::SessionContext},
};
use nom::{
    error::ErrorKind,
    number::complete::{be_u32, be_u8},
    IResult,
};
use peerwire_parse_utils::impl_nom_parse_error;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BgpCapabilityMessageParsingError {
    /// Errors triggered by the nom parser, see [nom::error::ErrorKind] for
    /// additional information.
    NomError(ErrorKind),
    /// Reserved bits set in the action octet
    InvalidAction(u8),
    /// Entry runs past the end of the message, carries the entry
    InvalidCapabilityLength(Vec<u8>),
    /// Capability value rejected by its decoder, carries the entry
    MalformedCapabilityValue(Vec<u8>),
}

impl_nom_parse_error!(BgpCapabilityMessageParsingError);

impl From<BgpCapabilityMessageParsingError> for BgpNotificationMessage {
    fn from(value: BgpCapabilityMessageParsingError) -> Self {
        let error = match value {
            BgpCapabilityMessageParsingError::NomError(_) => {
                CapabilityMessageError::InvalidCapabilityLength { value: vec![] }
            }
            BgpCapabilityMessageParsingError::InvalidAction(action) => {
                CapabilityMessageError::InvalidAction {
                    value: vec![action],
                }
            }
            BgpCapabilityMessageParsingError::InvalidCapabilityLength(value) => {
                CapabilityMessageError::InvalidCapabilityLength { value }
            }
            BgpCapabilityMessageParsingError::MalformedCapabilityValue(value) => {
                CapabilityMessageError::MalformedCapabilityValue { value }
            }
        };
        BgpNotificationMessage::CapabilityMessageError(error)
    }
}

/// Action octet, sequence number, capability code and capability length
const ENTRY_HEADER_LENGTH: usize = 7;

type EntryHeader = (u8, u32, u8, u8);

fn parse_entry_header(buf: &[u8]) -> IResult<&[u8], EntryHeader, BgpCapabilityMessageParsingError> {
    let (buf, action) = be_u8(buf)?;
    let (buf, sequence) = be_u32(buf)?;
    let (buf, code) = be_u8(buf)?;
    let (buf, length) = be_u8(buf)?;
    Ok((buf, (action, sequence, code, length)))
}

/// Decode the entries of a CAPABILITY message with the same capability
/// decoders used for OPEN. Capability codes without a decoder are kept as
/// [BgpCapability::Unrecognized] and logged, they never fail the message.
pub fn decode_capability_message(
    body: &[u8],
    ctx: &SessionContext<'_>,
    registry: &CapabilityDecoderRegistry,
) -> Result<BgpCapabilityMessage, BgpCapabilityMessageParsingError> {
    let mut buf = body;
    let mut entries = vec![];
    while !buf.is_empty() {
        if buf.len() < ENTRY_HEADER_LENGTH {
            return Err(BgpCapabilityMessageParsingError::InvalidCapabilityLength(
                buf.to_vec(),
            ));
        }
        let (value_buf, (action_byte, sequence, code, length)) = parse_entry_header(buf)
            .map_err(|_| BgpCapabilityMessageParsingError::InvalidCapabilityLength(buf.to_vec()))?;
        if action_byte & DYNAMIC_CAPABILITY_RESERVED != 0 {
            return Err(BgpCapabilityMessageParsingError::InvalidAction(action_byte));
        }
        if length as usize > value_buf.len() {
            return Err(BgpCapabilityMessageParsingError::InvalidCapabilityLength(
                buf.to_vec(),
            ));
        }
        let (entry, rest) = buf.split_at(ENTRY_HEADER_LENGTH + length as usize);
        let value = &entry[ENTRY_HEADER_LENGTH..];
        buf = rest;

        let capability = match registry.decode(code, value, ctx) {
            Ok(Some(capability)) => capability,
            Ok(None) => {
                log::debug!("Skipping dynamic capability {code}, not relevant locally");
                continue;
            }
            Err(err) => {
                log::debug!("Malformed dynamic capability {code}: {err:?}");
                return Err(BgpCapabilityMessageParsingError::MalformedCapabilityValue(
                    entry.to_vec(),
                ));
            }
        };
        if let BgpCapability::Unrecognized { code, .. } = &capability {
            log::info!("Ignoring dynamic capability with unknown code {code}");
        }
        let action = if action_byte & DYNAMIC_CAPABILITY_UNSET == 0 {
            DynamicCapabilityAction::Set
        } else {
            DynamicCapabilityAction::Unset
        };
        entries.push(DynamicCapabilityEntry::new(
            action_byte & DYNAMIC_CAPABILITY_INIT_ACK != 0,
            action_byte & DYNAMIC_CAPABILITY_ACK_REQUEST != 0,
            action,
            sequence,
            capability,
        ));
    }
    Ok(BgpCapabilityMessage::new(entries))
}
