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
    update::BgpUpdateMessage,
    wire::serializer::path_attribute::{
        encode_path_attributes, EncodedPathAttribute, PathAttributeWritingError,
    },
};
use byteorder::{NetworkEndian, WriteBytesExt};
use peerwire_parse_utils::{WritablePdu, WritablePduWithOneInput};
use peerwire_serde_macros::WritingError;

#[derive(WritingError, Eq, PartialEq, Clone, Debug)]
pub enum BgpUpdateMessageWritingError {
    StdIOError(#[from_std_io_error] String),
    PathAttributeError(#[from] PathAttributeWritingError),
    WithdrawnRoutesTooLong(usize),
    PathAttributesTooLong(usize),
}

impl BgpUpdateMessage {
    fn encoded_attributes(
        &self,
        asn4: bool,
    ) -> Result<Vec<EncodedPathAttribute>, PathAttributeWritingError> {
        encode_path_attributes(
            self.attributes(),
            asn4,
            self.mp_reach(),
            self.mp_unreach(),
        )
    }
}

/// The input is whether 4-octet AS numbers were negotiated on the session
impl WritablePduWithOneInput<bool, BgpUpdateMessageWritingError> for BgpUpdateMessage {
    /// Withdrawn routes length and total path attribute length
    const BASE_LENGTH: usize = 4;

    fn len(&self, asn4: bool) -> usize {
        let attributes_len = self.encoded_attributes(asn4).map_or(0, |attributes| {
            attributes.iter().map(WritablePdu::len).sum::<usize>()
        });
        Self::BASE_LENGTH
            + self.withdrawn().raw().len()
            + attributes_len
            + self.attributes().transit().len()
            + self.nlri().raw().len()
    }

    fn write<T: std::io::Write>(
        &self,
        writer: &mut T,
        asn4: bool,
    ) -> Result<(), BgpUpdateMessageWritingError> {
        let withdrawn = self.withdrawn().raw();
        if withdrawn.len() > u16::MAX as usize {
            return Err(BgpUpdateMessageWritingError::WithdrawnRoutesTooLong(
                withdrawn.len(),
            ));
        }
        writer.write_u16::<NetworkEndian>(withdrawn.len() as u16)?;
        writer.write_all(withdrawn)?;

        let attributes = self.encoded_attributes(asn4)?;
        let transit = self.attributes().transit();
        let attributes_len =
            attributes.iter().map(WritablePdu::len).sum::<usize>() + transit.len();
        if attributes_len > u16::MAX as usize {
            return Err(BgpUpdateMessageWritingError::PathAttributesTooLong(
                attributes_len,
            ));
        }
        writer.write_u16::<NetworkEndian>(attributes_len as u16)?;
        for attribute in &attributes {
            attribute.write(writer)?;
        }
        writer.write_all(transit)?;
        writer.write_all(self.nlri().raw())?;
        Ok(())
    }
}
