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


//! Representations for BGP Notification message and its error sub-codes

use crate::iana::{
    BgpErrorNotificationCode, CapabilityMessageErrorSubCode, CeaseErrorSubCode,
    FiniteStateMachineErrorSubCode, HoldTimerExpiredErrorSubCode, MessageHeaderErrorSubCode,
    OpenMessageErrorSubCode, UpdateMessageErrorSubCode,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Generate an error enum with one `{ value }` variant per sub-code of the
/// given IANA registry, along with the conversions back and forth.
macro_rules! notification_error {
    ($(#[$meta:meta])* $name:ident, $sub_code:ident, [$($variant:ident),+ $(,)?]) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant { value: Vec<u8> },)+
        }

        impl $name {
            pub const fn sub_code(&self) -> $sub_code {
                match self {
                    $(Self::$variant { .. } => $sub_code::$variant,)+
                }
            }

            /// Error data carried in the notification
            pub fn value(&self) -> &[u8] {
                match self {
                    $(Self::$variant { value } => value,)+
                }
            }

            pub fn from_sub_code(sub_code: $sub_code, value: Vec<u8>) -> Self {
                match sub_code {
                    $($sub_code::$variant => Self::$variant { value },)+
                }
            }
        }
    };
}

notification_error!(
    /// Errors detected while processing the message header
    MessageHeaderError,
    MessageHeaderErrorSubCode,
    [
        Unspecific,
        ConnectionNotSynchronized,
        BadMessageLength,
        BadMessageType
    ]
);

notification_error!(
    /// Errors detected while processing the OPEN message
    OpenMessageError,
    OpenMessageErrorSubCode,
    [
        Unspecific,
        UnsupportedVersionNumber,
        BadPeerAs,
        BadBgpIdentifier,
        UnsupportedOptionalParameter,
        UnacceptableHoldTime,
        UnsupportedCapability
    ]
);

notification_error!(
    /// Errors detected while processing the UPDATE message
    UpdateMessageError,
    UpdateMessageErrorSubCode,
    [
        Unspecific,
        MalformedAttributeList,
        UnrecognizedWellKnownAttribute,
        MissingWellKnownAttribute,
        AttributeFlagsError,
        AttributeLengthError,
        InvalidOriginAttribute,
        AsRoutingLoop,
        InvalidNextHopAttribute,
        OptionalAttributeError,
        InvalidNetworkField,
        MalformedAsPath
    ]
);

notification_error!(HoldTimerExpiredError, HoldTimerExpiredErrorSubCode, [Unspecific]);

notification_error!(
    /// [RFC6608](https://datatracker.ietf.org/doc/html/rfc6608) FSM errors
    FiniteStateMachineError,
    FiniteStateMachineErrorSubCode,
    [
        UnspecifiedError,
        ReceiveUnexpectedMessageInOpenSentState,
        ReceiveUnexpectedMessageInOpenConfirmState,
        ReceiveUnexpectedMessageInEstablishedState
    ]
);

notification_error!(
    CeaseError,
    CeaseErrorSubCode,
    [
        MaximumNumberOfPrefixesReached,
        AdministrativeShutdown,
        PeerDeConfigured,
        AdministrativeReset,
        ConnectionRejected,
        OtherConfigurationChange,
        ConnectionCollisionResolution,
        OutOfResources
    ]
);

notification_error!(
    /// Errors in a dynamic CAPABILITY message
    CapabilityMessageError,
    CapabilityMessageErrorSubCode,
    [
        InvalidAction,
        InvalidCapabilityLength,
        MalformedCapabilityValue,
        UnsupportedCapabilityCode
    ]
);

/// BGP Notification message
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Error code    | Error subcode |   Data (variable)             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Codes or sub-codes that are not registered are kept as
/// [`BgpNotificationMessage::Unknown`] so they can still be logged and
/// reported.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BgpNotificationMessage {
    MessageHeaderError(MessageHeaderError),
    OpenMessageError(OpenMessageError),
    UpdateMessageError(UpdateMessageError),
    HoldTimerExpiredError(HoldTimerExpiredError),
    FiniteStateMachineError(FiniteStateMachineError),
    CeaseError(CeaseError),
    CapabilityMessageError(CapabilityMessageError),
    Unknown {
        code: u8,
        sub_code: u8,
        value: Vec<u8>,
    },
}

impl BgpNotificationMessage {
    /// Build a notification from its wire parts. Never fails, unknown codes
    /// end up in [`BgpNotificationMessage::Unknown`].
    pub fn from_parts(code: u8, sub_code: u8, value: Vec<u8>) -> Self {
        let unknown = |value| Self::Unknown {
            code,
            sub_code,
            value,
        };
        let code = match BgpErrorNotificationCode::try_from(code) {
            Ok(code) => code,
            Err(_) => return unknown(value),
        };
        match code {
            BgpErrorNotificationCode::MessageHeaderError => {
                match MessageHeaderErrorSubCode::try_from(sub_code) {
                    Ok(sub) => Self::MessageHeaderError(MessageHeaderError::from_sub_code(sub, value)),
                    Err(_) => unknown(value),
                }
            }
            BgpErrorNotificationCode::OpenMessageError => {
                match OpenMessageErrorSubCode::try_from(sub_code) {
                    Ok(sub) => Self::OpenMessageError(OpenMessageError::from_sub_code(sub, value)),
                    Err(_) => unknown(value),
                }
            }
            BgpErrorNotificationCode::UpdateMessageError => {
                match UpdateMessageErrorSubCode::try_from(sub_code) {
                    Ok(sub) => {
                        Self::UpdateMessageError(UpdateMessageError::from_sub_code(sub, value))
                    }
                    Err(_) => unknown(value),
                }
            }
            BgpErrorNotificationCode::HoldTimerExpired => {
                match HoldTimerExpiredErrorSubCode::try_from(sub_code) {
                    Ok(sub) => {
                        Self::HoldTimerExpiredError(HoldTimerExpiredError::from_sub_code(sub, value))
                    }
                    Err(_) => unknown(value),
                }
            }
            BgpErrorNotificationCode::FiniteStateMachineError => {
                match FiniteStateMachineErrorSubCode::try_from(sub_code) {
                    Ok(sub) => Self::FiniteStateMachineError(
                        FiniteStateMachineError::from_sub_code(sub, value),
                    ),
                    Err(_) => unknown(value),
                }
            }
            BgpErrorNotificationCode::Cease => match CeaseErrorSubCode::try_from(sub_code) {
                Ok(sub) => Self::CeaseError(CeaseError::from_sub_code(sub, value)),
                Err(_) => unknown(value),
            },
            BgpErrorNotificationCode::CapabilityMessageError => {
                match CapabilityMessageErrorSubCode::try_from(sub_code) {
                    Ok(sub) => Self::CapabilityMessageError(
                        CapabilityMessageError::from_sub_code(sub, value),
                    ),
                    Err(_) => unknown(value),
                }
            }
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::MessageHeaderError(_) => BgpErrorNotificationCode::MessageHeaderError.into(),
            Self::OpenMessageError(_) => BgpErrorNotificationCode::OpenMessageError.into(),
            Self::UpdateMessageError(_) => BgpErrorNotificationCode::UpdateMessageError.into(),
            Self::HoldTimerExpiredError(_) => BgpErrorNotificationCode::HoldTimerExpired.into(),
            Self::FiniteStateMachineError(_) => {
                BgpErrorNotificationCode::FiniteStateMachineError.into()
            }
            Self::CeaseError(_) => BgpErrorNotificationCode::Cease.into(),
            Self::CapabilityMessageError(_) => {
                BgpErrorNotificationCode::CapabilityMessageError.into()
            }
            Self::Unknown { code, .. } => *code,
        }
    }

    pub fn sub_code(&self) -> u8 {
        match self {
            Self::MessageHeaderError(err) => err.sub_code().into(),
            Self::OpenMessageError(err) => err.sub_code().into(),
            Self::UpdateMessageError(err) => err.sub_code().into(),
            Self::HoldTimerExpiredError(err) => err.sub_code().into(),
            Self::FiniteStateMachineError(err) => err.sub_code().into(),
            Self::CeaseError(err) => err.sub_code().into(),
            Self::CapabilityMessageError(err) => err.sub_code().into(),
            Self::Unknown { sub_code, .. } => *sub_code,
        }
    }

    pub fn value(&self) -> &[u8] {
        match self {
            Self::MessageHeaderError(err) => err.value(),
            Self::OpenMessageError(err) => err.value(),
            Self::UpdateMessageError(err) => err.value(),
            Self::HoldTimerExpiredError(err) => err.value(),
            Self::FiniteStateMachineError(err) => err.value(),
            Self::CeaseError(err) => err.value(),
            Self::CapabilityMessageError(err) => err.value(),
            Self::Unknown { value, .. } => value,
        }
    }

    /// The peer doesn't speak our BGP version. Raised as a distinct event
    /// since the session may be retried with a different version.
    pub const fn is_version_error(&self) -> bool {
        matches!(
            self,
            Self::OpenMessageError(OpenMessageError::UnsupportedVersionNumber { .. })
        )
    }

    pub const fn cease(sub_code: CeaseErrorSubCode) -> Self {
        Self::CeaseError(match sub_code {
            CeaseErrorSubCode::MaximumNumberOfPrefixesReached => {
                CeaseError::MaximumNumberOfPrefixesReached { value: vec![] }
            }
            CeaseErrorSubCode::AdministrativeShutdown => {
                CeaseError::AdministrativeShutdown { value: vec![] }
            }
            CeaseErrorSubCode::PeerDeConfigured => CeaseError::PeerDeConfigured { value: vec![] },
            CeaseErrorSubCode::AdministrativeReset => {
                CeaseError::AdministrativeReset { value: vec![] }
            }
            CeaseErrorSubCode::ConnectionRejected => {
                CeaseError::ConnectionRejected { value: vec![] }
            }
            CeaseErrorSubCode::OtherConfigurationChange => {
                CeaseError::OtherConfigurationChange { value: vec![] }
            }
            CeaseErrorSubCode::ConnectionCollisionResolution => {
                CeaseError::ConnectionCollisionResolution { value: vec![] }
            }
            CeaseErrorSubCode::OutOfResources => CeaseError::OutOfResources { value: vec![] },
        })
    }

    pub const fn hold_timer_expired() -> Self {
        Self::HoldTimerExpiredError(HoldTimerExpiredError::Unspecific { value: vec![] })
    }

    pub const fn fsm_error(sub_code: FiniteStateMachineErrorSubCode) -> Self {
        Self::FiniteStateMachineError(match sub_code {
            FiniteStateMachineErrorSubCode::UnspecifiedError => {
                FiniteStateMachineError::UnspecifiedError { value: vec![] }
            }
            FiniteStateMachineErrorSubCode::ReceiveUnexpectedMessageInOpenSentState => {
                FiniteStateMachineError::ReceiveUnexpectedMessageInOpenSentState { value: vec![] }
            }
            FiniteStateMachineErrorSubCode::ReceiveUnexpectedMessageInOpenConfirmState => {
                FiniteStateMachineError::ReceiveUnexpectedMessageInOpenConfirmState {
                    value: vec![],
                }
            }
            FiniteStateMachineErrorSubCode::ReceiveUnexpectedMessageInEstablishedState => {
                FiniteStateMachineError::ReceiveUnexpectedMessageInEstablishedState {
                    value: vec![],
                }
            }
        })
    }
}

impl Display for BgpNotificationMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let code = self.code();
        let sub_code = self.sub_code();
        match BgpErrorNotificationCode::try_from(code) {
            Ok(name) => write!(f, "{name} ({code}/{sub_code})")?,
            Err(_) => write!(f, "unknown error ({code}/{sub_code})")?,
        }
        if !self.value().is_empty() {
            write!(f, " data {:02x?}", self.value())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts() {
        let msg = BgpNotificationMessage::from_parts(3, 5, vec![0xc0, 0x08, 0x06]);
        assert_eq!(
            msg,
            BgpNotificationMessage::UpdateMessageError(UpdateMessageError::AttributeLengthError {
                value: vec![0xc0, 0x08, 0x06]
            })
        );
        assert_eq!(msg.code(), 3);
        assert_eq!(msg.sub_code(), 5);

        let unknown = BgpNotificationMessage::from_parts(2, 5, vec![]);
        assert_eq!(
            unknown,
            BgpNotificationMessage::Unknown {
                code: 2,
                sub_code: 5,
                value: vec![]
            }
        );
        assert_eq!(unknown.code(), 2);
        assert_eq!(unknown.sub_code(), 5);
    }

    #[test]
    fn test_version_error() {
        let msg = BgpNotificationMessage::from_parts(2, 1, vec![0, 4]);
        assert!(msg.is_version_error());
        assert!(!BgpNotificationMessage::hold_timer_expired().is_version_error());
    }

    #[test]
    fn test_display() {
        let msg = BgpNotificationMessage::cease(CeaseErrorSubCode::ConnectionCollisionResolution);
        assert_eq!(msg.to_string(), "Cease (6/7)");
        assert_eq!(
            BgpNotificationMessage::from_parts(1, 2, vec![0x00, 0x12]).to_string(),
            "MessageHeaderError (1/2) data [00, 12]"
        );
    }
}
