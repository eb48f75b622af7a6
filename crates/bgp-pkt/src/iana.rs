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


//! Contains BGP codes that are registered at IANA [BGP Parameters](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml)

use serde::{Deserialize, Serialize};
use strum_macros::{Display, FromRepr};

/// Placeholder 2-octet AS number standing in for a 4-octet AS number that
/// can't be mapped, see [RFC6793](https://datatracker.ietf.org/doc/html/rfc6793)
pub const AS_TRANS: u16 = 23456;

/// Generate the `u8` conversions shared by all the registries in this module:
/// `From<Registry> for u8` and a `TryFrom<u8>` that fails with the given
/// `Undefined*` newtype carrying the unknown code.
macro_rules! u8_registry {
    ($registry:ident, $undefined:ident) => {
        #[doc = concat!("Code is not one of [`", stringify!($registry), "`], the carried value is the undefined code.")]
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
        pub struct $undefined(pub u8);

        impl From<$registry> for u8 {
            fn from(value: $registry) -> Self {
                value as u8
            }
        }

        impl TryFrom<u8> for $registry {
            type Error = $undefined;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match Self::from_repr(value) {
                    Some(val) => Ok(val),
                    None => Err($undefined(value)),
                }
            }
        }
    };
}

/// BGP Message types as registered in IANA [BGP Message Types](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-1)
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BgpMessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    KeepAlive = 4,
    /// Route Refresh message is registered in [RFC2918](https://datatracker.ietf.org/doc/html/rfc2918)
    RouteRefresh = 5,
    /// Dynamic capability exchange [draft-ietf-idr-dynamic-cap](https://datatracker.ietf.org/doc/html/draft-ietf-idr-dynamic-cap)
    Capability = 6,
    /// Pre-standard route refresh code still sent by older speakers
    RouteRefreshOld = 128,
}
u8_registry!(BgpMessageType, UndefinedBgpMessageType);

/// BGP Path Attributes as defined by IANA [BGP Path Attributes](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-2)
///
/// Only the attributes with a dedicated decoder are listed, the rest are
/// carried opaquely.
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PathAttributeType {
    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    Origin = 1,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    AsPath = 2,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    NextHop = 3,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    MultiExitDiscriminator = 4,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    LocalPreference = 5,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    AtomicAggregate = 6,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    Aggregator = 7,

    /// [RFC1997](https://datatracker.ietf.org/doc/html/rfc1997)
    Communities = 8,

    /// [RFC4456](https://datatracker.ietf.org/doc/html/rfc4456)
    OriginatorId = 9,

    /// [RFC4456](https://datatracker.ietf.org/doc/html/rfc4456)
    ClusterList = 10,

    /// [RFC4760](https://datatracker.ietf.org/doc/html/rfc4760)
    MpReachNlri = 14,

    /// [RFC4760](https://datatracker.ietf.org/doc/html/rfc4760)
    MpUnreachNlri = 15,

    /// [RFC4360](https://datatracker.ietf.org/doc/html/rfc4360)
    ExtendedCommunities = 16,

    /// [RFC6793](https://datatracker.ietf.org/doc/html/rfc6793)
    As4Path = 17,

    /// [RFC6793](https://datatracker.ietf.org/doc/html/rfc6793)
    As4Aggregator = 18,
}
u8_registry!(PathAttributeType, UndefinedPathAttributeType);

/// BGP Error (Notification) Codes as defined by IANA [BGP Error (Notification) Codes](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-3)
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BgpErrorNotificationCode {
    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    MessageHeaderError = 1,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    OpenMessageError = 2,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    UpdateMessageError = 3,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    HoldTimerExpired = 4,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    FiniteStateMachineError = 5,

    /// [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
    Cease = 6,

    /// Errors in the dynamic CAPABILITY message [draft-ietf-idr-dynamic-cap](https://datatracker.ietf.org/doc/html/draft-ietf-idr-dynamic-cap)
    CapabilityMessageError = 7,
}
u8_registry!(BgpErrorNotificationCode, UndefinedBgpErrorNotificationCode);

/// Message Header Error sub-codes for [`BgpErrorNotificationCode::MessageHeaderError`] as defined by IANA [Message Header Error subcodes](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-5)
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum MessageHeaderErrorSubCode {
    /// [RFC Errata 4493](https://www.rfc-editor.org/errata_search.php?eid=4493)
    Unspecific = 0,
    ConnectionNotSynchronized = 1,
    BadMessageLength = 2,
    BadMessageType = 3,
}
u8_registry!(
    MessageHeaderErrorSubCode,
    UndefinedMessageHeaderErrorSubCode
);

/// OPEN Message Error sub-codes for [`BgpErrorNotificationCode::OpenMessageError`] as defined by IANA [OPEN Message Error subcodes](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-6)
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum OpenMessageErrorSubCode {
    /// [RFC Errata 4493](https://www.rfc-editor.org/errata_search.php?eid=4493)
    Unspecific = 0,
    UnsupportedVersionNumber = 1,
    BadPeerAs = 2,
    BadBgpIdentifier = 3,
    UnsupportedOptionalParameter = 4,
    UnacceptableHoldTime = 6,

    /// [RFC5492](https://datatracker.ietf.org/doc/html/rfc5492)
    UnsupportedCapability = 7,
}
u8_registry!(OpenMessageErrorSubCode, UndefinedOpenMessageErrorSubCode);

/// UPDATE Message Error sub-codes for [`BgpErrorNotificationCode::UpdateMessageError`] as defined by IANA [UPDATE Message Error subcodes](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-7)
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum UpdateMessageErrorSubCode {
    /// [RFC Errata 4493](https://www.rfc-editor.org/errata_search.php?eid=4493)
    Unspecific = 0,
    MalformedAttributeList = 1,
    UnrecognizedWellKnownAttribute = 2,
    MissingWellKnownAttribute = 3,
    AttributeFlagsError = 4,
    AttributeLengthError = 5,
    InvalidOriginAttribute = 6,
    /// Deprecated by RFC4271, still recognized when received
    AsRoutingLoop = 7,
    InvalidNextHopAttribute = 8,
    OptionalAttributeError = 9,
    InvalidNetworkField = 10,
    MalformedAsPath = 11,
}
u8_registry!(
    UpdateMessageErrorSubCode,
    UndefinedUpdateMessageErrorSubCode
);

/// Hold timer expiry carries no sub-code, the wire value is always zero
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum HoldTimerExpiredErrorSubCode {
    Unspecific = 0,
}
u8_registry!(
    HoldTimerExpiredErrorSubCode,
    UndefinedHoldTimerExpiredErrorSubCode
);

/// BGP Finite State Machine Error sub-codes for [`BgpErrorNotificationCode::FiniteStateMachineError`] as defined by IANA [BGP Finite State Machine Error Subcodes](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-finite-state-machine-error-subcodes)
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum FiniteStateMachineErrorSubCode {
    /// [RFC6608](https://datatracker.ietf.org/doc/html/rfc6608)
    UnspecifiedError = 0,

    /// [RFC6608](https://datatracker.ietf.org/doc/html/rfc6608)
    ReceiveUnexpectedMessageInOpenSentState = 1,

    /// [RFC6608](https://datatracker.ietf.org/doc/html/rfc6608)
    ReceiveUnexpectedMessageInOpenConfirmState = 2,

    /// [RFC6608](https://datatracker.ietf.org/doc/html/rfc6608)
    ReceiveUnexpectedMessageInEstablishedState = 3,
}
u8_registry!(
    FiniteStateMachineErrorSubCode,
    UndefinedFiniteStateMachineErrorSubCode
);

/// BGP Cease NOTIFICATION message Error sub-codes for [`BgpErrorNotificationCode::Cease`] as defined by IANA [BGP Cease NOTIFICATION message subcodes](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-8)
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum CeaseErrorSubCode {
    /// [RFC4486](https://datatracker.ietf.org/doc/html/rfc4486)
    MaximumNumberOfPrefixesReached = 1,

    /// [RFC4486](https://datatracker.ietf.org/doc/html/rfc4486)
    AdministrativeShutdown = 2,

    /// [RFC4486](https://datatracker.ietf.org/doc/html/rfc4486)
    PeerDeConfigured = 3,

    /// [RFC4486](https://datatracker.ietf.org/doc/html/rfc4486)
    AdministrativeReset = 4,

    /// [RFC4486](https://datatracker.ietf.org/doc/html/rfc4486)
    ConnectionRejected = 5,

    /// [RFC4486](https://datatracker.ietf.org/doc/html/rfc4486)
    OtherConfigurationChange = 6,

    /// [RFC4486](https://datatracker.ietf.org/doc/html/rfc4486)
    ConnectionCollisionResolution = 7,

    /// [RFC4486](https://datatracker.ietf.org/doc/html/rfc4486)
    OutOfResources = 8,
}
u8_registry!(CeaseErrorSubCode, UndefinedCeaseErrorSubCode);

/// CAPABILITY message error sub-codes for
/// [`BgpErrorNotificationCode::CapabilityMessageError`]
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum CapabilityMessageErrorSubCode {
    InvalidAction = 1,
    InvalidCapabilityLength = 2,
    MalformedCapabilityValue = 3,
    UnsupportedCapabilityCode = 4,
}
u8_registry!(
    CapabilityMessageErrorSubCode,
    UndefinedCapabilityMessageErrorSubCode
);

/// [BGP OPEN Optional Parameter Types](https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-11)
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BgpOpenMessageParameterType {
    /// [RFC5492](https://datatracker.ietf.org/doc/html/rfc5492)
    Capability = 2,
}
u8_registry!(
    BgpOpenMessageParameterType,
    UndefinedBgpOpenMessageParameterType
);

/// [Capability Codes](https://www.iana.org/assignments/capability-codes/capability-codes.xhtml)
/// that have a dedicated decoder. Any other code is kept as
/// [`crate::capabilities::BgpCapability::Unrecognized`].
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BgpCapabilityCode {
    /// [RFC2858](https://datatracker.ietf.org/doc/html/rfc2858)
    MultiProtocolExtensions = 1,

    /// [RFC2918](https://datatracker.ietf.org/doc/html/rfc2918)
    RouteRefresh = 2,

    /// [RFC5291](https://datatracker.ietf.org/doc/html/rfc5291)
    OutboundRouteFiltering = 3,

    /// [RFC6793](https://datatracker.ietf.org/doc/html/rfc6793)
    FourOctetAs = 65,

    /// [draft-ietf-idr-dynamic-cap](https://datatracker.ietf.org/doc/html/draft-ietf-idr-dynamic-cap)
    DynamicCapability = 67,

    /// Pre-standard route refresh code
    RouteRefreshOld = 128,

    /// Pre-standard outbound route filtering code
    OutboundRouteFilteringOld = 130,
}
u8_registry!(BgpCapabilityCode, UndefinedBgpCapabilityCode);

/// ORIGIN attribute values [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
#[repr(u8)]
#[derive(
    Display, FromRepr, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub enum Origin {
    #[strum(to_string = "IGP")]
    Igp = 0,
    #[strum(to_string = "EGP")]
    Egp = 1,
    Incomplete = 2,
}
u8_registry!(Origin, UndefinedOrigin);

/// AS_PATH segment types, [RFC4271](https://datatracker.ietf.org/doc/html/rfc4271)
/// and [RFC5065](https://datatracker.ietf.org/doc/html/rfc5065)
#[repr(u8)]
#[derive(
    Display, FromRepr, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub enum AsPathSegmentType {
    AsSet = 1,
    AsSequence = 2,
    ConfedSequence = 3,
    ConfedSet = 4,
}
u8_registry!(AsPathSegmentType, UndefinedAsPathSegmentType);

impl AsPathSegmentType {
    pub const fn is_confed(&self) -> bool {
        matches!(self, Self::ConfedSequence | Self::ConfedSet)
    }
}

/// Outbound Route Filter types [RFC5291](https://datatracker.ietf.org/doc/html/rfc5291)
#[repr(u8)]
#[derive(
    Display, FromRepr, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub enum OrfType {
    /// [RFC5292](https://datatracker.ietf.org/doc/html/rfc5292)
    AddressPrefix = 64,
    /// Pre-standard address prefix ORF code
    AddressPrefixOld = 128,
}
u8_registry!(OrfType, UndefinedOrfType);

/// Send/Receive mode advertised for an ORF type
#[repr(u8)]
#[derive(
    Display, FromRepr, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize,
)]
pub enum OrfMode {
    Receive = 1,
    Send = 2,
    Both = 3,
}
u8_registry!(OrfMode, UndefinedOrfMode);

impl OrfMode {
    pub const fn can_send(&self) -> bool {
        matches!(self, Self::Send | Self::Both)
    }

    pub const fn can_receive(&self) -> bool {
        matches!(self, Self::Receive | Self::Both)
    }
}

/// When-to-refresh flag of a ROUTE-REFRESH carrying ORF entries
#[repr(u8)]
#[derive(Display, FromRepr, Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum RouteRefreshWhen {
    Immediate = 1,
    Defer = 2,
}
u8_registry!(RouteRefreshWhen, UndefinedRouteRefreshWhen);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type() {
        assert_eq!(BgpMessageType::try_from(6), Ok(BgpMessageType::Capability));
        assert_eq!(
            BgpMessageType::try_from(128),
            Ok(BgpMessageType::RouteRefreshOld)
        );
        assert_eq!(
            BgpMessageType::try_from(7),
            Err(UndefinedBgpMessageType(7))
        );
        assert_eq!(u8::from(BgpMessageType::KeepAlive), 4);
    }

    #[test]
    fn test_origin_display() {
        assert_eq!(Origin::Igp.to_string(), "IGP");
        assert_eq!(Origin::try_from(3), Err(UndefinedOrigin(3)));
    }

    #[test]
    fn test_orf_mode() {
        assert!(OrfMode::Both.can_send());
        assert!(OrfMode::Both.can_receive());
        assert!(!OrfMode::Receive.can_send());
        assert_eq!(OrfMode::try_from(0), Err(UndefinedOrfMode(0)));
    }
}
