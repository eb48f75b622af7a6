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


//! Deserializer for BGP Notification message

use crate::notification::BgpNotificationMessage;
use nom::{error::ErrorKind, number::complete::be_u8, IResult};
use peerwire_parse_utils::{impl_nom_parse_error, parse_complete};

/// BGP Notification Message Parsing errors
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BgpNotificationMessageParsingError {
    /// Errors triggered by the nom parser, see [nom::error::ErrorKind] for
    /// additional information.
    NomError(ErrorKind),
}

impl_nom_parse_error!(BgpNotificationMessageParsingError);

fn parse_notification(
    buf: &[u8],
) -> IResult<&[u8], BgpNotificationMessage, BgpNotificationMessageParsingError> {
    let (buf, code) = be_u8(buf)?;
    let (buf, sub_code) = be_u8(buf)?;
    let value = buf.to_vec();
    Ok((
        &buf[buf.len()..],
        BgpNotificationMessage::from_parts(code, sub_code, value),
    ))
}

/// Decode a NOTIFICATION body. Codes and sub-codes that are not registered
/// are kept as [BgpNotificationMessage::Unknown].
pub fn decode_notification(
    body: &[u8],
) -> Result<BgpNotificationMessage, BgpNotificationMessageParsingError> {
    parse_complete(body, parse_notification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::CeaseError;

    #[test]
    fn test_decode_notification() {
        let notification = decode_notification(&[0x06, 0x02, 0x01]).unwrap();
        assert_eq!(
            notification,
            BgpNotificationMessage::CeaseError(CeaseError::AdministrativeShutdown {
                value: vec![0x01]
            })
        );
    }

    #[test]
    fn test_decode_notification_unknown_code() {
        let notification = decode_notification(&[0x63, 0x05]).unwrap();
        assert_eq!(
            notification,
            BgpNotificationMessage::Unknown {
                code: 0x63,
                sub_code: 0x05,
                value: vec![],
            }
        );
    }

    #[test]
    fn test_decode_notification_too_short() {
        assert!(decode_notification(&[0x06]).is_err());
    }
}
