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


use crate::{
    capabilities::{BgpCapability, OrfCapability},
    wire::{
        FOUR_OCTET_AS_CAPABILITY_LENGTH, MULTI_PROTOCOL_EXTENSIONS_CAPABILITY_LENGTH,
        ROUTE_REFRESH_CAPABILITY_LENGTH,
    },
};
use byteorder::{NetworkEndian, WriteBytesExt};
use peerwire_iana::address_family::AddressType;
use peerwire_parse_utils::WritablePdu;
use peerwire_serde_macros::WritingError;
use std::io::Write;

#[derive(WritingError, Eq, PartialEq, Clone, Debug)]
pub enum BgpCapabilityWritingError {
    StdIOError(#[from_std_io_error] String),
    /// Capability value doesn't fit the one octet length field
    ValueTooLong { code: u8, length: usize },
}

/// AFI (2 octets), reserved (1 octet), SAFI (1 octet)
#[inline]
pub(crate) fn write_afi_safi<T: Write>(
    writer: &mut T,
    address_type: AddressType,
) -> Result<(), std::io::Error> {
    writer.write_u16::<NetworkEndian>(address_type.address_family().into())?;
    writer.write_u8(0)?;
    writer.write_u8(address_type.subsequent_address_family().into())?;
    Ok(())
}

impl WritablePdu<BgpCapabilityWritingError> for OrfCapability {
    /// AFI, reserved, SAFI and number of ORF entries
    const BASE_LENGTH: usize = 5;

    fn len(&self) -> usize {
        Self::BASE_LENGTH + 2 * self.entries().len()
    }

    fn write<T: Write>(&self, writer: &mut T) -> Result<(), BgpCapabilityWritingError> {
        write_afi_safi(writer, self.address_type())?;
        writer.write_u8(self.entries().len() as u8)?;
        for entry in self.entries() {
            writer.write_u8(entry.orf_type().into())?;
            writer.write_u8(entry.mode().into())?;
        }
        Ok(())
    }
}

impl WritablePdu<BgpCapabilityWritingError> for BgpCapability {
    /// Capability code and length
    const BASE_LENGTH: usize = 2;

    fn len(&self) -> usize {
        let value_len = match self {
            Self::MultiProtocolExtensions(_) => {
                MULTI_PROTOCOL_EXTENSIONS_CAPABILITY_LENGTH as usize
            }
            Self::RouteRefresh | Self::RouteRefreshOld => ROUTE_REFRESH_CAPABILITY_LENGTH as usize,
            Self::OutboundRouteFiltering(orf) | Self::OutboundRouteFilteringOld(orf) => orf.len(),
            Self::FourOctetAs(_) => FOUR_OCTET_AS_CAPABILITY_LENGTH as usize,
            Self::DynamicCapability(codes) => codes.len(),
            Self::Unrecognized { value, .. } => value.len(),
        };
        Self::BASE_LENGTH + value_len
    }

    fn write<T: Write>(&self, writer: &mut T) -> Result<(), BgpCapabilityWritingError> {
        let value_len = self.len() - Self::BASE_LENGTH;
        if value_len > u8::MAX as usize {
            return Err(BgpCapabilityWritingError::ValueTooLong {
                code: self.code(),
                length: value_len,
            });
        }
        writer.write_u8(self.code())?;
        writer.write_u8(value_len as u8)?;
        match self {
            Self::MultiProtocolExtensions(address_type) => {
                write_afi_safi(writer, *address_type)?;
            }
            Self::RouteRefresh | Self::RouteRefreshOld => {}
            Self::OutboundRouteFiltering(orf) | Self::OutboundRouteFilteringOld(orf) => {
                orf.write(writer)?;
            }
            Self::FourOctetAs(asn) => writer.write_u32::<NetworkEndian>(*asn)?,
            Self::DynamicCapability(codes) => writer.write_all(codes)?,
            Self::Unrecognized { value, .. } => writer.write_all(value)?,
        }
        Ok(())
    }
}
