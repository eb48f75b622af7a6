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
    dynamic_capability::{BgpCapabilityMessage, DynamicCapabilityEntry},
    wire::serializer::capabilities::BgpCapabilityWritingError,
};
use byteorder::{NetworkEndian, WriteBytesExt};
use peerwire_parse_utils::WritablePdu;
use peerwire_serde_macros::WritingError;
use std::io::Write;

#[derive(WritingError, Eq, PartialEq, Clone, Debug)]
pub enum BgpCapabilityMessageWritingError {
    StdIOError(#[from_std_io_error] String),
    CapabilityError(#[from] BgpCapabilityWritingError),
}

impl WritablePdu<BgpCapabilityMessageWritingError> for DynamicCapabilityEntry {
    /// Action octet and the 4 octets sequence number, the capability TLV
    /// follows
    const BASE_LENGTH: usize = 5;

    fn len(&self) -> usize {
        Self::BASE_LENGTH + self.capability().len()
    }

    fn write<T: Write>(&self, writer: &mut T) -> Result<(), BgpCapabilityMessageWritingError> {
        writer.write_u8(self.action_byte())?;
        writer.write_u32::<NetworkEndian>(self.sequence())?;
        self.capability().write(writer)?;
        Ok(())
    }
}

impl WritablePdu<BgpCapabilityMessageWritingError> for BgpCapabilityMessage {
    const BASE_LENGTH: usize = 0;

    fn len(&self) -> usize {
        Self::BASE_LENGTH + self.entries().iter().map(WritablePdu::len).sum::<usize>()
    }

    fn write<T: Write>(&self, writer: &mut T) -> Result<(), BgpCapabilityMessageWritingError> {
        for entry in self.entries() {
            entry.write(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{capabilities::BgpCapability, dynamic_capability::DynamicCapabilityAction};
    use peerwire_iana::address_family::AddressType;
    use peerwire_parse_utils::test_helpers::test_write;

    #[test]
    fn test_unset_multiprotocol() -> Result<(), BgpCapabilityMessageWritingError> {
        let good_wire = [
            0x41, // ack request, unset
            0x00, 0x00, 0x00, 0x07, // sequence
            0x01, 0x04, 0x00, 0x02, 0x00, 0x01, // IPv6 unicast
        ];
        let good = BgpCapabilityMessage::new(vec![DynamicCapabilityEntry::new(
            false,
            true,
            DynamicCapabilityAction::Unset,
            7,
            BgpCapability::MultiProtocolExtensions(AddressType::Ipv6Unicast),
        )]);
        test_write(&good, &good_wire)?;
        Ok(())
    }
}
