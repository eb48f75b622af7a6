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


//! Address family identifiers (AFI) and subsequent address family
//! identifiers (SAFI), plus [AddressType], the pair of both restricted to the
//! combinations a BGP session can negotiate.
//!
//! ```rust
//! use peerwire_iana::address_family::*;
//!
//! let ipv6_unicast =
//!     AddressType::from_afi_safi(AddressFamily::IPv6, SubsequentAddressFamily::Unicast);
//! assert_eq!(ipv6_unicast, Ok(AddressType::Ipv6Unicast));
//! assert_eq!(AddressType::Ipv4Unicast.max_prefix_len(), 32);
//! ```

use serde::{Deserialize, Serialize};
use strum_macros::{Display, FromRepr};

/// Address families identifiers (AFI) registered at IANA [Address Family Number](https://www.iana.org/assignments/address-family-numbers/address-family-numbers.xhtml)
#[repr(u16)]
#[derive(
    FromRepr, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub enum AddressFamily {
    IPv4 = 1,
    IPv6 = 2,
    L2vpn = 25,
    BgpLs = 16388,
}

/// Address family is not one of [`AddressFamily`], the carried value is the
/// undefined code.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct UndefinedAddressFamily(pub u16);

impl From<AddressFamily> for u16 {
    fn from(value: AddressFamily) -> Self {
        value as u16
    }
}

impl TryFrom<u16> for AddressFamily {
    type Error = UndefinedAddressFamily;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match Self::from_repr(value) {
            Some(val) => Ok(val),
            None => Err(UndefinedAddressFamily(value)),
        }
    }
}

/// Subsequent address families identifiers (SAFI) registered at IANA [SAFI Values](https://www.iana.org/assignments/safi-namespace/safi-namespace.xhtml)
#[repr(u8)]
#[derive(
    FromRepr, Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub enum SubsequentAddressFamily {
    /// [RFC4760](https://datatracker.ietf.org/doc/html/rfc4760)
    Unicast = 1,

    /// [RFC4760](https://datatracker.ietf.org/doc/html/rfc4760)
    Multicast = 2,

    /// [RFC8277](https://datatracker.ietf.org/doc/html/rfc8277)
    NlriMplsLabels = 4,

    /// [RFC7432](https://datatracker.ietf.org/doc/html/rfc7432)
    BgpEvpn = 70,

    /// [RFC4364](https://datatracker.ietf.org/doc/html/rfc4364)
    MplsVpn = 128,
}

/// SAFI is not one of [`SubsequentAddressFamily`], the carried value is the
/// undefined code.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct UndefinedSubsequentAddressFamily(pub u8);

impl From<SubsequentAddressFamily> for u8 {
    fn from(value: SubsequentAddressFamily) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for SubsequentAddressFamily {
    type Error = UndefinedSubsequentAddressFamily;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match Self::from_repr(value) {
            Some(val) => Ok(val),
            None => Err(UndefinedSubsequentAddressFamily(value)),
        }
    }
}

/// The AFI/SAFI combinations a session can activate and negotiate.
#[derive(
    Display, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub enum AddressType {
    Ipv4Unicast,
    Ipv4Multicast,
    Ipv6Unicast,
    Ipv6Multicast,
}

/// AFI/SAFI pair that doesn't map to any [AddressType]. The raw wire values
/// are kept, since either of them might be undefined at IANA as well.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct InvalidAddressType {
    afi: u16,
    safi: u8,
}

impl InvalidAddressType {
    pub const fn new(afi: u16, safi: u8) -> Self {
        Self { afi, safi }
    }

    pub const fn afi(&self) -> u16 {
        self.afi
    }

    pub const fn safi(&self) -> u8 {
        self.safi
    }
}

impl AddressType {
    pub const ALL: [AddressType; 4] = [
        Self::Ipv4Unicast,
        Self::Ipv4Multicast,
        Self::Ipv6Unicast,
        Self::Ipv6Multicast,
    ];

    pub const fn address_family(&self) -> AddressFamily {
        match self {
            Self::Ipv4Unicast | Self::Ipv4Multicast => AddressFamily::IPv4,
            Self::Ipv6Unicast | Self::Ipv6Multicast => AddressFamily::IPv6,
        }
    }

    pub const fn subsequent_address_family(&self) -> SubsequentAddressFamily {
        match self {
            Self::Ipv4Unicast | Self::Ipv6Unicast => SubsequentAddressFamily::Unicast,
            Self::Ipv4Multicast | Self::Ipv6Multicast => SubsequentAddressFamily::Multicast,
        }
    }

    /// Longest prefix length an NLRI of this address type may carry
    pub const fn max_prefix_len(&self) -> u8 {
        match self.address_family() {
            AddressFamily::IPv4 => 32,
            _ => 128,
        }
    }

    pub const fn from_afi_safi(
        afi: AddressFamily,
        safi: SubsequentAddressFamily,
    ) -> Result<Self, InvalidAddressType> {
        match (afi, safi) {
            (AddressFamily::IPv4, SubsequentAddressFamily::Unicast) => Ok(Self::Ipv4Unicast),
            (AddressFamily::IPv4, SubsequentAddressFamily::Multicast) => Ok(Self::Ipv4Multicast),
            (AddressFamily::IPv6, SubsequentAddressFamily::Unicast) => Ok(Self::Ipv6Unicast),
            (AddressFamily::IPv6, SubsequentAddressFamily::Multicast) => Ok(Self::Ipv6Multicast),
            _ => Err(InvalidAddressType::new(afi as u16, safi as u8)),
        }
    }

    /// Resolve raw wire values, failing when either value is undefined or the
    /// combination is not supported.
    pub fn from_wire(afi: u16, safi: u8) -> Result<Self, InvalidAddressType> {
        match (
            AddressFamily::try_from(afi),
            SubsequentAddressFamily::try_from(safi),
        ) {
            (Ok(afi), Ok(safi)) => Self::from_afi_safi(afi, safi),
            _ => Err(InvalidAddressType::new(afi, safi)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_afi_try_from() {
        assert_eq!(AddressFamily::try_from(2), Ok(AddressFamily::IPv6));
        assert_eq!(
            AddressFamily::try_from(65000),
            Err(UndefinedAddressFamily(65000))
        );
        let ipv6: u16 = AddressFamily::IPv6.into();
        assert_eq!(ipv6, 2);
    }

    #[test]
    fn test_safi_try_from() {
        assert_eq!(
            SubsequentAddressFamily::try_from(2),
            Ok(SubsequentAddressFamily::Multicast)
        );
        assert_eq!(
            SubsequentAddressFamily::try_from(100),
            Err(UndefinedSubsequentAddressFamily(100))
        );
    }

    #[test]
    fn test_address_type_from_wire() {
        assert_eq!(AddressType::from_wire(1, 1), Ok(AddressType::Ipv4Unicast));
        assert_eq!(AddressType::from_wire(2, 2), Ok(AddressType::Ipv6Multicast));
        assert_eq!(
            AddressType::from_wire(1, 128),
            Err(InvalidAddressType::new(1, 128))
        );
        assert_eq!(
            AddressType::from_wire(3, 1),
            Err(InvalidAddressType::new(3, 1))
        );
    }

    #[test]
    fn test_address_type_serde() {
        let json = serde_json::to_string(&AddressType::Ipv6Unicast).unwrap();
        assert_eq!(json, "\"Ipv6Unicast\"");
        let back: AddressType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AddressType::Ipv6Unicast);
    }

    #[test]
    fn test_max_prefix_len() {
        for address_type in AddressType::ALL {
            match address_type.address_family() {
                AddressFamily::IPv4 => assert_eq!(address_type.max_prefix_len(), 32),
                _ => assert_eq!(address_type.max_prefix_len(), 128),
            }
        }
    }
}
