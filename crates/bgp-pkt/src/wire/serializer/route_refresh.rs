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
    route_refresh::{BgpRouteRefreshMessage, OrfAction, OrfFilter, OrfRequest, PrefixOrfEntry},
    wire::serializer::{
        capabilities::write_afi_safi,
        nlri::{prefix_wire_len, write_prefix, IpNetWritingError},
    },
};
use byteorder::{NetworkEndian, WriteBytesExt};
use peerwire_parse_utils::WritablePdu;
use peerwire_serde_macros::WritingError;
use std::io::Write;

#[derive(WritingError, Eq, PartialEq, Clone, Debug)]
pub enum BgpRouteRefreshMessageWritingError {
    StdIOError(#[from_std_io_error] String),
    PrefixError(#[from] IpNetWritingError),
    OrfFilterTooLong(usize),
}

impl WritablePdu<BgpRouteRefreshMessageWritingError> for PrefixOrfEntry {
    /// Action and match octet
    const BASE_LENGTH: usize = 1;

    fn len(&self) -> usize {
        match (self.action(), self.prefix()) {
            (OrfAction::RemoveAll, _) | (_, None) => Self::BASE_LENGTH,
            (_, Some(prefix)) => Self::BASE_LENGTH + 6 + prefix_wire_len(&prefix),
        }
    }

    fn write<T: Write>(&self, writer: &mut T) -> Result<(), BgpRouteRefreshMessageWritingError> {
        let common = ((self.action() as u8) << 6) | ((self.match_type() as u8) << 5);
        writer.write_u8(common)?;
        if self.action() == OrfAction::RemoveAll {
            return Ok(());
        }
        if let Some(prefix) = self.prefix() {
            writer.write_u32::<NetworkEndian>(self.sequence())?;
            writer.write_u8(self.min_len())?;
            writer.write_u8(self.max_len())?;
            write_prefix(writer, &prefix)?;
        }
        Ok(())
    }
}

impl WritablePdu<BgpRouteRefreshMessageWritingError> for OrfFilter {
    /// ORF type and the two octets length of the entries
    const BASE_LENGTH: usize = 3;

    fn len(&self) -> usize {
        Self::BASE_LENGTH + self.entries().iter().map(WritablePdu::len).sum::<usize>()
    }

    fn write<T: Write>(&self, writer: &mut T) -> Result<(), BgpRouteRefreshMessageWritingError> {
        let entries_len = self.len() - Self::BASE_LENGTH;
        if entries_len > u16::MAX as usize {
            return Err(BgpRouteRefreshMessageWritingError::OrfFilterTooLong(
                entries_len,
            ));
        }
        writer.write_u8(self.orf_type().into())?;
        writer.write_u16::<NetworkEndian>(entries_len as u16)?;
        for entry in self.entries() {
            entry.write(writer)?;
        }
        Ok(())
    }
}

impl WritablePdu<BgpRouteRefreshMessageWritingError> for OrfRequest {
    /// When to refresh
    const BASE_LENGTH: usize = 1;

    fn len(&self) -> usize {
        Self::BASE_LENGTH + self.filters().iter().map(WritablePdu::len).sum::<usize>()
    }

    fn write<T: Write>(&self, writer: &mut T) -> Result<(), BgpRouteRefreshMessageWritingError> {
        writer.write_u8(self.when_to_refresh().into())?;
        for filter in self.filters() {
            filter.write(writer)?;
        }
        Ok(())
    }
}

impl WritablePdu<BgpRouteRefreshMessageWritingError> for BgpRouteRefreshMessage {
    /// AFI, reserved, SAFI
    const BASE_LENGTH: usize = 4;

    fn len(&self) -> usize {
        Self::BASE_LENGTH + self.orf().map_or(0, WritablePdu::len)
    }

    fn write<T: Write>(&self, writer: &mut T) -> Result<(), BgpRouteRefreshMessageWritingError> {
        write_afi_safi(writer, self.address_type())?;
        if let Some(orf) = self.orf() {
            orf.write(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        iana::{OrfType, RouteRefreshWhen},
        route_refresh::OrfMatch,
    };
    use ipnet::IpNet;
    use peerwire_iana::address_family::AddressType;
    use peerwire_parse_utils::test_helpers::test_write;
    use std::str::FromStr;

    #[test]
    fn test_plain_route_refresh() -> Result<(), BgpRouteRefreshMessageWritingError> {
        let good_wire = [0x00, 0x02, 0x00, 0x01];
        let good = BgpRouteRefreshMessage::new(AddressType::Ipv6Unicast, None);
        test_write(&good, &good_wire)?;
        Ok(())
    }

    #[test]
    fn test_prefix_orf() -> Result<(), BgpRouteRefreshMessageWritingError> {
        let good_wire = [
            0x00, 0x01, 0x00, 0x01, // IPv4 unicast
            0x01, // immediate
            0x40, 0x00, 0x01, 0x80, // remove all
            0x40, 0x00, 0x0a, // address prefix ORF, 10 octets
            0x20, 0x00, 0x00, 0x00, 0x0a, 0x18, 0x20, 0x10, 0x0a, 0x01, // deny 10.1/16
        ];
        let good = BgpRouteRefreshMessage::new(
            AddressType::Ipv4Unicast,
            Some(OrfRequest::new(
                RouteRefreshWhen::Immediate,
                vec![
                    OrfFilter::new(OrfType::AddressPrefix, vec![PrefixOrfEntry::remove_all()]),
                    OrfFilter::new(
                        OrfType::AddressPrefix,
                        vec![PrefixOrfEntry::new(
                            OrfAction::Add,
                            OrfMatch::Deny,
                            10,
                            24,
                            32,
                            IpNet::from_str("10.1.0.0/16").unwrap(),
                        )],
                    ),
                ],
            )),
        );
        test_write(&good, &good_wire)?;
        Ok(())
    }
}
