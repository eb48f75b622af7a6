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


//! NLRI prefix decoding and validation shared by the classic UPDATE fields
//! and the multiprotocol attributes

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use nom::{error::ErrorKind, number::complete::be_u8, IResult};
use peerwire_iana::address_family::{AddressFamily, AddressType};
use peerwire_parse_utils::impl_nom_parse_error;
use std::net::{Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NlriParsingError {
    /// Errors triggered by the nom parser, see [ErrorKind] for
    /// additional information.
    NomError(ErrorKind),
    InvalidPrefixLength {
        address_type: AddressType,
        prefix_len: u8,
    },
    InvalidPrefix(IpNet),
}

impl_nom_parse_error!(NlriParsingError);

/// Parse a single length-prefixed IP prefix of the given address type. Only
/// the octets covering the prefix length are present on the wire.
pub fn parse_prefix(
    buf: &[u8],
    address_type: AddressType,
) -> IResult<&[u8], IpNet, NlriParsingError> {
    let (buf, prefix_len) = be_u8(buf)?;
    if prefix_len > address_type.max_prefix_len() {
        return Err(nom::Err::Error(NlriParsingError::InvalidPrefixLength {
            address_type,
            prefix_len,
        }));
    }
    let (buf, prefix) = nom::bytes::complete::take(prefix_len.div_ceil(8))(buf)?;
    let invalid = || {
        nom::Err::Error(NlriParsingError::InvalidPrefixLength {
            address_type,
            prefix_len,
        })
    };
    let net = match address_type.address_family() {
        AddressFamily::IPv4 => {
            let mut network = [0u8; 4];
            network[..prefix.len()].copy_from_slice(prefix);
            IpNet::V4(
                Ipv4Net::new(Ipv4Addr::from(network), prefix_len)
                    .map_err(|_| invalid())?
                    .trunc(),
            )
        }
        _ => {
            let mut network = [0u8; 16];
            network[..prefix.len()].copy_from_slice(prefix);
            IpNet::V6(
                Ipv6Net::new(Ipv6Addr::from(network), prefix_len)
                    .map_err(|_| invalid())?
                    .trunc(),
            )
        }
    };
    Ok((buf, net))
}

/// Decode and validate a whole NLRI field. IPv4 unicast rejects
/// `0.0.0.0/32` and drops multicast prefixes.
pub fn parse_prefixes(
    raw: &[u8],
    address_type: AddressType,
) -> Result<Vec<IpNet>, NlriParsingError> {
    let mut buf = raw;
    let mut prefixes = vec![];
    while !buf.is_empty() {
        let (rest, prefix) = match parse_prefix(buf, address_type) {
            Ok(value) => value,
            Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => return Err(err),
            Err(nom::Err::Incomplete(_)) => {
                return Err(NlriParsingError::NomError(ErrorKind::Complete))
            }
        };
        buf = rest;
        if address_type == AddressType::Ipv4Unicast {
            if let IpNet::V4(net) = prefix {
                if net.addr().is_unspecified() && net.prefix_len() == 32 {
                    return Err(NlriParsingError::InvalidPrefix(prefix));
                }
                if net.addr().is_multicast() {
                    log::warn!("Dropping multicast prefix {net} received as IPv4 unicast");
                    continue;
                }
            }
        }
        prefixes.push(prefix);
    }
    Ok(prefixes)
}
