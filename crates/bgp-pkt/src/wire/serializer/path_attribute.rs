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
    iana::{PathAttributeType, AS_TRANS},
    path_attribute::{AsPath, PathAttributeFlags, PathAttributes},
    update::{MpReach, MpUnreach},
    wire::serializer::capabilities::write_afi_safi,
};
use byteorder::{NetworkEndian, WriteBytesExt};
use peerwire_parse_utils::WritablePdu;
use peerwire_serde_macros::WritingError;
use std::{io::Write, net::IpAddr};

/// Max number of AS numbers a single AS path segment can carry
const MAX_SEGMENT_MEMBERS: usize = u8::MAX as usize;

#[derive(WritingError, Eq, PartialEq, Clone, Debug)]
pub enum PathAttributeWritingError {
    StdIOError(#[from_std_io_error] String),
    AttributeTooLong { code: u8, length: usize },
}

/// A path attribute with its value already in wire format
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EncodedPathAttribute {
    flags: PathAttributeFlags,
    code: u8,
    value: Vec<u8>,
}

impl EncodedPathAttribute {
    pub fn new(attribute_type: PathAttributeType, value: Vec<u8>) -> Self {
        Self {
            flags: attribute_type.category().flags(),
            code: attribute_type.into(),
            value,
        }
    }

    pub fn with_partial(mut self, partial: bool) -> Self {
        self.flags = self.flags.with_partial(partial);
        self
    }

    pub const fn code(&self) -> u8 {
        self.code
    }

    pub const fn value(&self) -> &Vec<u8> {
        &self.value
    }

    fn extended_length(&self) -> bool {
        self.value.len() > u8::MAX as usize
    }
}

impl WritablePdu<PathAttributeWritingError> for EncodedPathAttribute {
    /// flags, type code and a single octet length
    const BASE_LENGTH: usize = 3;

    fn len(&self) -> usize {
        let length_len = if self.extended_length() { 1 } else { 0 };
        Self::BASE_LENGTH + length_len + self.value.len()
    }

    fn write<T: Write>(&self, writer: &mut T) -> Result<(), PathAttributeWritingError> {
        if self.value.len() > u16::MAX as usize {
            return Err(PathAttributeWritingError::AttributeTooLong {
                code: self.code,
                length: self.value.len(),
            });
        }
        let extended_length = self.extended_length();
        writer.write_u8(self.flags.with_extended_length(extended_length).to_byte())?;
        writer.write_u8(self.code)?;
        if extended_length {
            writer.write_u16::<NetworkEndian>(self.value.len() as u16)?;
        } else {
            writer.write_u8(self.value.len() as u8)?;
        }
        writer.write_all(&self.value)?;
        Ok(())
    }
}

/// Segments longer than 255 AS numbers are split into consecutive segments
/// of the same type
fn encode_as_path<T: Copy + Into<u32>>(
    path: &AsPath<T>,
    write_member: impl Fn(&mut Vec<u8>, T),
) -> Vec<u8> {
    let mut buf = vec![];
    for segment in path.segments() {
        for chunk in segment.members().chunks(MAX_SEGMENT_MEMBERS) {
            buf.push(segment.segment_type().into());
            buf.push(chunk.len() as u8);
            for member in chunk {
                write_member(&mut buf, *member);
            }
        }
    }
    buf
}

fn encode_as4_path(path: &AsPath<u32>) -> Vec<u8> {
    encode_as_path(path, |buf, asn| buf.extend_from_slice(&asn.to_be_bytes()))
}

fn encode_legacy_path(path: &AsPath<u16>) -> Vec<u8> {
    encode_as_path(path, |buf, asn| buf.extend_from_slice(&asn.to_be_bytes()))
}

fn encode_mp_reach(mp_reach: &MpReach) -> Result<Vec<u8>, PathAttributeWritingError> {
    let mut buf = vec![];
    write_afi_safi(&mut buf, mp_reach.address_type())?;
    match (mp_reach.next_hop(), mp_reach.link_local()) {
        (IpAddr::V4(next_hop), _) => {
            buf.write_u8(4)?;
            buf.write_all(&next_hop.octets())?;
        }
        (IpAddr::V6(next_hop), None) => {
            buf.write_u8(16)?;
            buf.write_all(&next_hop.octets())?;
        }
        (IpAddr::V6(next_hop), Some(link_local)) => {
            buf.write_u8(32)?;
            buf.write_all(&next_hop.octets())?;
            buf.write_all(&link_local.octets())?;
        }
    }
    // No SNPAs
    buf.write_u8(0)?;
    buf.write_all(mp_reach.nlri().raw())?;
    Ok(buf)
}

fn encode_mp_unreach(mp_unreach: &MpUnreach) -> Result<Vec<u8>, PathAttributeWritingError> {
    let mut buf = vec![];
    write_afi_safi(&mut buf, mp_unreach.address_type())?;
    buf.write_all(mp_unreach.nlri().raw())?;
    Ok(buf)
}

/// Encode the attributes of an UPDATE in ascending type code order.
///
/// With `asn4` the AS numbers are written in 4 octets. Otherwise the
/// AS_PATH and AGGREGATOR are written in 2 octets with [AS_TRANS] standing
/// for the AS numbers that don't fit, and AS4_PATH/AS4_AGGREGATOR carry the
/// real values.
pub fn encode_path_attributes(
    attributes: &PathAttributes,
    asn4: bool,
    mp_reach: Option<&MpReach>,
    mp_unreach: Option<&MpUnreach>,
) -> Result<Vec<EncodedPathAttribute>, PathAttributeWritingError> {
    let mut encoded = vec![];
    let mut as4_path = None;
    let mut as4_aggregator = None;

    if let Some(origin) = attributes.origin() {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::Origin,
            vec![origin.into()],
        ));
    }
    if asn4 {
        if let Some(as_path) = attributes.effective_as_path() {
            encoded.push(EncodedPathAttribute::new(
                PathAttributeType::AsPath,
                encode_as4_path(&as_path),
            ));
        }
    } else if let Some(as_path) = attributes.as_path() {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::AsPath,
            encode_legacy_path(&as_path.to_legacy()),
        ));
        if as_path.has_as4_members() {
            as4_path = Some(as_path.without_confed_segments());
        }
    } else if let Some(legacy) = attributes.as_path_legacy() {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::AsPath,
            encode_legacy_path(legacy),
        ));
    }
    if let Some(next_hop) = attributes.next_hop() {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::NextHop,
            next_hop.octets().to_vec(),
        ));
    }
    if let Some(med) = attributes.med() {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::MultiExitDiscriminator,
            med.to_be_bytes().to_vec(),
        ));
    }
    if let Some(local_pref) = attributes.local_pref() {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::LocalPreference,
            local_pref.to_be_bytes().to_vec(),
        ));
    }
    if attributes.atomic_aggregate() {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::AtomicAggregate,
            vec![],
        ));
    }
    if let Some(aggregator) = attributes.aggregator() {
        let mut value = vec![];
        if asn4 {
            value.write_u32::<NetworkEndian>(aggregator.asn())?;
        } else {
            let asn = match u16::try_from(aggregator.asn()) {
                Ok(asn) => asn,
                Err(_) => {
                    as4_aggregator = Some(aggregator);
                    AS_TRANS
                }
            };
            value.write_u16::<NetworkEndian>(asn)?;
        }
        value.write_all(&aggregator.origin().octets())?;
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::Aggregator,
            value,
        ));
    }
    if let Some(communities) = attributes.communities() {
        let value = communities
            .values()
            .iter()
            .flat_map(|community| community.to_be_bytes())
            .collect();
        encoded.push(
            EncodedPathAttribute::new(PathAttributeType::Communities, value)
                .with_partial(communities.partial()),
        );
    }
    if let Some(originator_id) = attributes.originator_id() {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::OriginatorId,
            originator_id.octets().to_vec(),
        ));
    }
    if let Some(cluster_list) = attributes.cluster_list() {
        let value = cluster_list.iter().flat_map(|id| id.octets()).collect();
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::ClusterList,
            value,
        ));
    }
    if let Some(mp_reach) = mp_reach {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::MpReachNlri,
            encode_mp_reach(mp_reach)?,
        ));
    }
    if let Some(mp_unreach) = mp_unreach {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::MpUnreachNlri,
            encode_mp_unreach(mp_unreach)?,
        ));
    }
    if let Some(extended_communities) = attributes.extended_communities() {
        let value = extended_communities
            .values()
            .iter()
            .flat_map(|community| community.to_be_bytes())
            .collect();
        encoded.push(
            EncodedPathAttribute::new(PathAttributeType::ExtendedCommunities, value)
                .with_partial(extended_communities.partial()),
        );
    }
    if let Some(as4_path) = as4_path {
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::As4Path,
            encode_as4_path(&as4_path),
        ));
    }
    if let Some(aggregator) = as4_aggregator {
        let mut value = vec![];
        value.write_u32::<NetworkEndian>(aggregator.asn())?;
        value.write_all(&aggregator.origin().octets())?;
        encoded.push(EncodedPathAttribute::new(
            PathAttributeType::As4Aggregator,
            value,
        ));
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        iana::{AsPathSegmentType, Origin},
        path_attribute::{Aggregator, AsPathSegment},
    };
    use peerwire_parse_utils::test_helpers::test_write;
    use std::net::Ipv4Addr;

    #[test]
    fn test_extended_length() -> Result<(), PathAttributeWritingError> {
        let short = EncodedPathAttribute::new(PathAttributeType::Origin, vec![0]);
        test_write(&short, &[0x40, 0x01, 0x01, 0x00])?;

        let long = EncodedPathAttribute::new(PathAttributeType::Communities, vec![0; 256]);
        let mut long_wire = vec![0xd0, 0x08, 0x01, 0x00];
        long_wire.extend(vec![0; 256]);
        test_write(&long, &long_wire)?;
        Ok(())
    }

    #[test]
    fn test_long_segment_split() {
        let members: Vec<u32> = (1..=300).collect();
        let path = AsPath::new(vec![AsPathSegment::new(
            AsPathSegmentType::AsSequence,
            members,
        )]);
        let value = encode_as4_path(&path);
        assert_eq!(value.len(), 2 + 255 * 4 + 2 + 45 * 4);
        assert_eq!(&value[..2], &[2, 255]);
        assert_eq!(&value[2 + 255 * 4..2 + 255 * 4 + 2], &[2, 45]);
    }

    #[test]
    fn test_legacy_encoding_adds_as4_attributes() -> Result<(), PathAttributeWritingError> {
        let mut attributes = PathAttributes::new();
        attributes.set_origin(Some(Origin::Igp));
        attributes.set_as_path(Some(AsPath::new(vec![AsPathSegment::new(
            AsPathSegmentType::AsSequence,
            vec![65001, 4200000000],
        )])));
        attributes.set_aggregator(Some(Aggregator::new(
            4200000000,
            Ipv4Addr::new(10, 0, 0, 1),
        )));

        let legacy = encode_path_attributes(&attributes, false, None, None)?;
        let codes: Vec<u8> = legacy.iter().map(EncodedPathAttribute::code).collect();
        assert_eq!(codes, vec![1, 2, 7, 17, 18]);
        assert_eq!(legacy[1].value(), &vec![2, 2, 0xfd, 0xe9, 0x5b, 0xa0]);
        assert_eq!(legacy[2].value(), &vec![0x5b, 0xa0, 10, 0, 0, 1]);

        let as4 = encode_path_attributes(&attributes, true, None, None)?;
        let codes: Vec<u8> = as4.iter().map(EncodedPathAttribute::code).collect();
        assert_eq!(codes, vec![1, 2, 7]);
        assert_eq!(
            as4[1].value(),
            &vec![2, 2, 0, 0, 0xfd, 0xe9, 0xfa, 0x56, 0xea, 0x00]
        );
        Ok(())
    }
}
