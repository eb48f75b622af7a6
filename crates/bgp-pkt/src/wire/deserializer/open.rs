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
    capabilities::{BgpCapability, PeerCapabilities},
    iana::{BgpOpenMessageParameterType, AS_TRANS},
    notification::{BgpNotificationMessage, OpenMessageError},
    open::{BgpOpenMessage, BgpOpenMessageParameter, BGP_VERSION},
    wire::deserializer::{
        capabilities::{parse_capability_tlv, BgpCapabilityParsingError, CapabilityDecoderRegistry},
        context::SessionContext,
    },
};
use nom::{
    error::ErrorKind,
    number::complete::{be_u16, be_u32, be_u8},
    IResult,
};
use peerwire_parse_utils::{impl_nom_parse_error, parse_complete};
use std::net::Ipv4Addr;

/// Minimum acceptable non-zero hold time in seconds
pub const MIN_HOLD_TIME: u16 = 3;

/// BGP Open Message Parsing errors
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum BgpOpenMessageParsingError {
    /// Errors triggered by the nom parser, see [nom::error::ErrorKind] for
    /// additional information.
    NomError(ErrorKind),
    UnsupportedVersionNumber(u8),
    BadPeerAs(u32),
    UnacceptableHoldTime(u16),
    BadBgpIdentifier(Ipv4Addr),
    UnsupportedOptionalParameter(u8),
    /// Optional parameters don't add up to the advertised length
    MalformedOptionalParameters,
    /// Capability TLVs to echo back to the peer
    UnsupportedCapability(Vec<u8>),
    CapabilityError(BgpCapabilityParsingError),
}

impl_nom_parse_error!(BgpOpenMessageParsingError);

impl From<BgpOpenMessageParsingError> for BgpNotificationMessage {
    fn from(value: BgpOpenMessageParsingError) -> Self {
        let err = match value {
            BgpOpenMessageParsingError::UnsupportedVersionNumber(_) => {
                OpenMessageError::UnsupportedVersionNumber {
                    value: u16::from(BGP_VERSION).to_be_bytes().to_vec(),
                }
            }
            BgpOpenMessageParsingError::BadPeerAs(asn) => OpenMessageError::BadPeerAs {
                // Same width as the My Autonomous System field when it fits
                value: match u16::try_from(asn) {
                    Ok(two_octet) => two_octet.to_be_bytes().to_vec(),
                    Err(_) => asn.to_be_bytes().to_vec(),
                },
            },
            BgpOpenMessageParsingError::UnacceptableHoldTime(hold_time) => {
                OpenMessageError::UnacceptableHoldTime {
                    value: hold_time.to_be_bytes().to_vec(),
                }
            }
            BgpOpenMessageParsingError::BadBgpIdentifier(bgp_id) => {
                OpenMessageError::BadBgpIdentifier {
                    value: bgp_id.octets().to_vec(),
                }
            }
            BgpOpenMessageParsingError::UnsupportedOptionalParameter(_) => {
                OpenMessageError::UnsupportedOptionalParameter { value: vec![] }
            }
            BgpOpenMessageParsingError::UnsupportedCapability(value) => {
                OpenMessageError::UnsupportedCapability { value }
            }
            BgpOpenMessageParsingError::NomError(_)
            | BgpOpenMessageParsingError::MalformedOptionalParameters
            | BgpOpenMessageParsingError::CapabilityError(_) => {
                OpenMessageError::Unspecific { value: vec![] }
            }
        };
        BgpNotificationMessage::OpenMessageError(err)
    }
}

/// A validated OPEN message together with the values negotiated from it
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReceivedOpen {
    message: BgpOpenMessage,
    remote_asn: u32,
    hold_time: u16,
    keepalive: u16,
    capabilities: PeerCapabilities,
}

impl ReceivedOpen {
    pub const fn message(&self) -> &BgpOpenMessage {
        &self.message
    }

    /// Peer AS, taken from the 4-octet AS capability when it is in use
    pub const fn remote_asn(&self) -> u32 {
        self.remote_asn
    }

    /// Negotiated hold time, the smaller of ours and the peer's
    pub const fn hold_time(&self) -> u16 {
        self.hold_time
    }

    /// Negotiated keepalive interval
    pub const fn keepalive(&self) -> u16 {
        self.keepalive
    }

    /// Capabilities announced by the peer
    pub const fn capabilities(&self) -> &PeerCapabilities {
        &self.capabilities
    }

    pub fn into_capabilities(self) -> PeerCapabilities {
        self.capabilities
    }
}

type OpenFields<'a> = (u8, u16, u16, Ipv4Addr, &'a [u8]);

fn parse_open_fields(buf: &[u8]) -> IResult<&[u8], OpenFields<'_>, BgpOpenMessageParsingError> {
    let (buf, version) = be_u8(buf)?;
    let (buf, my_as) = be_u16(buf)?;
    let (buf, hold_time) = be_u16(buf)?;
    let (buf, bgp_id) = be_u32(buf)?;
    let (buf, params) = nom::multi::length_data(be_u8)(buf)?;
    Ok((buf, (version, my_as, hold_time, Ipv4Addr::from(bgp_id), params)))
}

fn parse_parameter_tlv(buf: &[u8]) -> IResult<&[u8], (u8, &[u8]), BgpOpenMessageParsingError> {
    let (buf, param_type) = be_u8(buf)?;
    let (buf, value) = nom::multi::length_data(be_u8)(buf)?;
    Ok((buf, (param_type, value)))
}

/// Capabilities found in the optional parameters, plus the TLVs of the
/// capabilities this speaker doesn't support
fn decode_parameters(
    mut buf: &[u8],
    ctx: &SessionContext<'_>,
    registry: &CapabilityDecoderRegistry,
) -> Result<(Vec<BgpCapability>, Vec<u8>), BgpOpenMessageParsingError> {
    let mut capabilities = vec![];
    let mut unsupported = vec![];
    while !buf.is_empty() {
        let (rest, (param_type, value)) = parse_parameter_tlv(buf)
            .map_err(|_| BgpOpenMessageParsingError::MalformedOptionalParameters)?;
        buf = rest;
        if param_type != u8::from(BgpOpenMessageParameterType::Capability) {
            return Err(BgpOpenMessageParsingError::UnsupportedOptionalParameter(
                param_type,
            ));
        }
        let mut caps_buf = value;
        while !caps_buf.is_empty() {
            let begin = caps_buf;
            let (rest, (code, cap_value)) = parse_capability_tlv(caps_buf)
                .map_err(|_| BgpOpenMessageParsingError::MalformedOptionalParameters)?;
            let tlv = &begin[..begin.len() - rest.len()];
            caps_buf = rest;
            match registry.decode(code, cap_value, ctx) {
                Ok(Some(capability @ BgpCapability::Unrecognized { .. })) => {
                    log::debug!("Unsupported capability code {code} received");
                    unsupported.extend_from_slice(tlv);
                    capabilities.push(capability);
                }
                Ok(Some(capability)) => capabilities.push(capability),
                Ok(None) => {}
                Err(BgpCapabilityParsingError::UnsupportedAddressType(address_type)) => {
                    log::warn!(
                        "Multiprotocol capability for unsupported AFI/SAFI {}/{}",
                        address_type.afi(),
                        address_type.safi()
                    );
                    return Err(BgpOpenMessageParsingError::UnsupportedCapability(
                        tlv.to_vec(),
                    ));
                }
                Err(BgpCapabilityParsingError::AsnMismatch { received, .. }) => {
                    return Err(BgpOpenMessageParsingError::BadPeerAs(received));
                }
                Err(err) => return Err(BgpOpenMessageParsingError::CapabilityError(err)),
            }
        }
    }
    Ok((capabilities, unsupported))
}

/// Decode and validate an OPEN message body, then negotiate the session
/// timers from it
pub fn decode_open(
    body: &[u8],
    ctx: &SessionContext<'_>,
    registry: &CapabilityDecoderRegistry,
) -> Result<ReceivedOpen, BgpOpenMessageParsingError> {
    let params = ctx.params();
    if let Some(version) = body.first().filter(|version| **version != BGP_VERSION) {
        return Err(BgpOpenMessageParsingError::UnsupportedVersionNumber(
            *version,
        ));
    }
    let (version, my_as, remote_hold_time, bgp_id, opt_params) =
        parse_complete(body, parse_open_fields)
            .map_err(|_| BgpOpenMessageParsingError::MalformedOptionalParameters)?;
    if !params.four_octet_asn() && u32::from(my_as) != params.peer_asn() {
        return Err(BgpOpenMessageParsingError::BadPeerAs(u32::from(my_as)));
    }
    if remote_hold_time < MIN_HOLD_TIME
        && (remote_hold_time != 0 || !params.allow_infinite_hold_time())
    {
        return Err(BgpOpenMessageParsingError::UnacceptableHoldTime(
            remote_hold_time,
        ));
    }
    if bgp_id.is_unspecified() || bgp_id.is_multicast() || bgp_id == params.local_bgp_id() {
        return Err(BgpOpenMessageParsingError::BadBgpIdentifier(bgp_id));
    }

    let (capabilities, unsupported) = decode_parameters(opt_params, ctx, registry)?;
    let peer_capabilities = PeerCapabilities::from_capabilities(&capabilities);

    let remote_asn = match (params.four_octet_asn(), peer_capabilities.four_octet_as()) {
        (true, Some(as4)) => {
            let header_valid = match u16::try_from(as4) {
                Ok(as2) => as2 == my_as,
                Err(_) => my_as == AS_TRANS,
            };
            if !header_valid {
                return Err(BgpOpenMessageParsingError::BadPeerAs(u32::from(my_as)));
            }
            as4
        }
        _ => u32::from(my_as),
    };
    if remote_asn != params.peer_asn() {
        return Err(BgpOpenMessageParsingError::BadPeerAs(remote_asn));
    }

    if params.strict_capability_match() {
        if !unsupported.is_empty() {
            return Err(BgpOpenMessageParsingError::UnsupportedCapability(
                unsupported,
            ));
        }
        if peer_capabilities.is_empty() && !params.dont_capability() {
            return Err(BgpOpenMessageParsingError::UnsupportedCapability(vec![]));
        }
    }

    let hold_time = params.hold_time().min(remote_hold_time);
    let keepalive = if hold_time == 0 {
        0
    } else {
        params.keepalive().min(hold_time / 3)
    };
    let open_params = if capabilities.is_empty() {
        vec![]
    } else {
        vec![BgpOpenMessageParameter::Capabilities(capabilities)]
    };
    Ok(ReceivedOpen {
        message: BgpOpenMessage::with_version(
            version,
            my_as,
            remote_hold_time,
            bgp_id,
            open_params,
        ),
        remote_asn,
        hold_time,
        keepalive,
        capabilities: peer_capabilities,
    })
}
