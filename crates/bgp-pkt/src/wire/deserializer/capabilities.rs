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


//! Per-capability decoders, registered by capability code and shared by the
//! OPEN and the dynamic CAPABILITY message decoders

use crate::{
    capabilities::{BgpCapability, OrfCapability, OrfCapabilityEntry},
    iana::{BgpCapabilityCode, OrfMode, OrfType},
    wire::{
        deserializer::context::SessionContext, FOUR_OCTET_AS_CAPABILITY_LENGTH,
        MULTI_PROTOCOL_EXTENSIONS_CAPABILITY_LENGTH, ROUTE_REFRESH_CAPABILITY_LENGTH,
    },
};
use nom::{
    error::ErrorKind,
    number::complete::{be_u16, be_u32, be_u8},
    IResult,
};
use peerwire_iana::address_family::{AddressType, InvalidAddressType};
use peerwire_parse_utils::{impl_nom_parse_error, parse_complete};
use std::{collections::HashMap, fmt::Debug};

/// BGP Capability Parsing errors
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum BgpCapabilityParsingError {
    /// Errors triggered by the nom parser, see [ErrorKind] for
    /// additional information.
    NomError(ErrorKind),
    InvalidLength { code: u8, length: usize },
    UnsupportedAddressType(InvalidAddressType),
    /// 4-octet AS capability doesn't carry the configured peer AS
    AsnMismatch { expected: u32, received: u32 },
}

impl_nom_parse_error!(BgpCapabilityParsingError);

/// Decoder for the value of a single capability code
pub trait CapabilityDecoder: Debug + Send + Sync {
    fn code(&self) -> u8;

    /// Decode the capability value. `Ok(None)` means the capability is
    /// valid but not relevant to this speaker and is skipped silently.
    fn decode(
        &self,
        value: &[u8],
        ctx: &SessionContext<'_>,
    ) -> Result<Option<BgpCapability>, BgpCapabilityParsingError>;
}

#[inline]
fn check_length(code: u8, value: &[u8], expected: u8) -> Result<(), BgpCapabilityParsingError> {
    if value.len() != expected as usize {
        return Err(BgpCapabilityParsingError::InvalidLength {
            code,
            length: value.len(),
        });
    }
    Ok(())
}

/// AFI (2 octets), reserved (1 octet), SAFI (1 octet)
fn parse_afi_safi(buf: &[u8]) -> IResult<&[u8], (u16, u8), BgpCapabilityParsingError> {
    let (buf, afi) = be_u16(buf)?;
    let (buf, _reserved) = be_u8(buf)?;
    let (buf, safi) = be_u8(buf)?;
    Ok((buf, (afi, safi)))
}

#[derive(Debug, Default)]
pub struct MultiProtocolDecoder;

impl CapabilityDecoder for MultiProtocolDecoder {
    fn code(&self) -> u8 {
        BgpCapabilityCode::MultiProtocolExtensions.into()
    }

    fn decode(
        &self,
        value: &[u8],
        _ctx: &SessionContext<'_>,
    ) -> Result<Option<BgpCapability>, BgpCapabilityParsingError> {
        check_length(self.code(), value, MULTI_PROTOCOL_EXTENSIONS_CAPABILITY_LENGTH)?;
        let (afi, safi) = parse_complete(value, parse_afi_safi)?;
        let address_type = AddressType::from_wire(afi, safi)
            .map_err(BgpCapabilityParsingError::UnsupportedAddressType)?;
        Ok(Some(BgpCapability::MultiProtocolExtensions(address_type)))
    }
}

/// Route refresh, either the standard or the pre-standard code
#[derive(Debug)]
pub struct RouteRefreshDecoder {
    old: bool,
}

impl RouteRefreshDecoder {
    pub const fn new(old: bool) -> Self {
        Self { old }
    }
}

impl CapabilityDecoder for RouteRefreshDecoder {
    fn code(&self) -> u8 {
        if self.old {
            BgpCapabilityCode::RouteRefreshOld.into()
        } else {
            BgpCapabilityCode::RouteRefresh.into()
        }
    }

    fn decode(
        &self,
        value: &[u8],
        _ctx: &SessionContext<'_>,
    ) -> Result<Option<BgpCapability>, BgpCapabilityParsingError> {
        check_length(self.code(), value, ROUTE_REFRESH_CAPABILITY_LENGTH)?;
        Ok(Some(if self.old {
            BgpCapability::RouteRefreshOld
        } else {
            BgpCapability::RouteRefresh
        }))
    }
}

/// Outbound route filtering, either the standard or the pre-standard code
#[derive(Debug)]
pub struct OrfDecoder {
    old: bool,
}

impl OrfDecoder {
    pub const fn new(old: bool) -> Self {
        Self { old }
    }
}

fn parse_orf_capability(
    buf: &[u8],
) -> IResult<&[u8], (u16, u8, Vec<(u8, u8)>), BgpCapabilityParsingError> {
    let (buf, (afi, safi)) = parse_afi_safi(buf)?;
    let (buf, count) = be_u8(buf)?;
    let (buf, entries) = nom::multi::count(nom::sequence::tuple((be_u8, be_u8)), count as usize)(buf)?;
    Ok((buf, (afi, safi, entries)))
}

impl CapabilityDecoder for OrfDecoder {
    fn code(&self) -> u8 {
        if self.old {
            BgpCapabilityCode::OutboundRouteFilteringOld.into()
        } else {
            BgpCapabilityCode::OutboundRouteFiltering.into()
        }
    }

    fn decode(
        &self,
        value: &[u8],
        _ctx: &SessionContext<'_>,
    ) -> Result<Option<BgpCapability>, BgpCapabilityParsingError> {
        let (afi, safi, raw_entries) = parse_complete(value, parse_orf_capability)?;
        let address_type = match AddressType::from_wire(afi, safi) {
            Ok(address_type) => address_type,
            Err(_) => {
                log::debug!("Skipping ORF capability for unsupported AFI/SAFI {afi}/{safi}");
                return Ok(None);
            }
        };
        let entries = raw_entries
            .into_iter()
            .filter_map(
                |(orf_type, mode)| match (OrfType::try_from(orf_type), OrfMode::try_from(mode)) {
                    (Ok(orf_type), Ok(mode)) => Some(OrfCapabilityEntry::new(orf_type, mode)),
                    _ => {
                        log::debug!("Skipping ORF type {orf_type} with mode {mode}");
                        None
                    }
                },
            )
            .collect();
        let orf = OrfCapability::new(address_type, entries);
        Ok(Some(if self.old {
            BgpCapability::OutboundRouteFilteringOld(orf)
        } else {
            BgpCapability::OutboundRouteFiltering(orf)
        }))
    }
}

#[derive(Debug, Default)]
pub struct FourOctetAsDecoder;

impl CapabilityDecoder for FourOctetAsDecoder {
    fn code(&self) -> u8 {
        BgpCapabilityCode::FourOctetAs.into()
    }

    fn decode(
        &self,
        value: &[u8],
        ctx: &SessionContext<'_>,
    ) -> Result<Option<BgpCapability>, BgpCapabilityParsingError> {
        check_length(self.code(), value, FOUR_OCTET_AS_CAPABILITY_LENGTH)?;
        let asn = parse_complete(value, be_u32)?;
        let params = ctx.params();
        if params.four_octet_asn() && asn != params.peer_asn() {
            return Err(BgpCapabilityParsingError::AsnMismatch {
                expected: params.peer_asn(),
                received: asn,
            });
        }
        Ok(Some(BgpCapability::FourOctetAs(asn)))
    }
}

#[derive(Debug, Default)]
pub struct DynamicCapabilityDecoder;

impl CapabilityDecoder for DynamicCapabilityDecoder {
    fn code(&self) -> u8 {
        BgpCapabilityCode::DynamicCapability.into()
    }

    fn decode(
        &self,
        value: &[u8],
        _ctx: &SessionContext<'_>,
    ) -> Result<Option<BgpCapability>, BgpCapabilityParsingError> {
        Ok(Some(BgpCapability::DynamicCapability(value.to_vec())))
    }
}

/// Lookup table of capability decoders keyed by capability code
#[derive(Debug)]
pub struct CapabilityDecoderRegistry {
    decoders: HashMap<u8, Box<dyn CapabilityDecoder>>,
}

impl CapabilityDecoderRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    pub fn register(&mut self, decoder: Box<dyn CapabilityDecoder>) {
        self.decoders.insert(decoder.code(), decoder);
    }

    pub fn get(&self, code: u8) -> Option<&dyn CapabilityDecoder> {
        self.decoders.get(&code).map(|decoder| decoder.as_ref())
    }

    /// Decode one capability value. Codes without a decoder are returned as
    /// [`BgpCapability::Unrecognized`].
    pub fn decode(
        &self,
        code: u8,
        value: &[u8],
        ctx: &SessionContext<'_>,
    ) -> Result<Option<BgpCapability>, BgpCapabilityParsingError> {
        match self.get(code) {
            Some(decoder) => decoder.decode(value, ctx),
            None => Ok(Some(BgpCapability::Unrecognized {
                code,
                value: value.to_vec(),
            })),
        }
    }
}

impl Default for CapabilityDecoderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(MultiProtocolDecoder));
        registry.register(Box::new(RouteRefreshDecoder::new(false)));
        registry.register(Box::new(RouteRefreshDecoder::new(true)));
        registry.register(Box::new(OrfDecoder::new(false)));
        registry.register(Box::new(OrfDecoder::new(true)));
        registry.register(Box::new(FourOctetAsDecoder));
        registry.register(Box::new(DynamicCapabilityDecoder));
        registry
    }
}

/// Split a capability TLV into its code and value
pub(crate) fn parse_capability_tlv(
    buf: &[u8],
) -> IResult<&[u8], (u8, &[u8]), BgpCapabilityParsingError> {
    let (buf, code) = be_u8(buf)?;
    let (buf, value) = nom::multi::length_data(be_u8)(buf)?;
    Ok((buf, (code, value)))
}
