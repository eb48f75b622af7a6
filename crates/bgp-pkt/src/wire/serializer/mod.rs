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


pub mod capabilities;
pub mod dynamic_capability;
pub mod nlri;
pub mod notification;
pub mod open;
pub mod path_attribute;
pub mod route_refresh;
pub mod update;

use byteorder::{NetworkEndian, WriteBytesExt};

use peerwire_parse_utils::{WritablePdu, WritablePduWithOneInput};
use peerwire_serde_macros::WritingError;

use crate::{
    wire::{
        serializer::{
            dynamic_capability::BgpCapabilityMessageWritingError,
            notification::BgpNotificationMessageWritingError, open::BgpOpenMessageWritingError,
            route_refresh::BgpRouteRefreshMessageWritingError,
            update::BgpUpdateMessageWritingError,
        },
        BGP_HEADER_LENGTH, BGP_MARKER, BGP_MAX_MESSAGE_LENGTH,
    },
    BgpMessage,
};

#[derive(WritingError, Eq, PartialEq, Clone, Debug)]
pub enum BgpMessageWritingError {
    /// The size of written message is larger than 4,096 octets
    BgpMessageLengthOverflow(usize),

    StdIOError(#[from_std_io_error] String),

    /// Error encountered during writing a [crate::open::BgpOpenMessage]
    OpenError(#[from] BgpOpenMessageWritingError),

    /// Error encountered during writing a [crate::update::BgpUpdateMessage]
    UpdateError(#[from] BgpUpdateMessageWritingError),

    NotificationError(#[from] BgpNotificationMessageWritingError),

    RouteRefreshError(#[from] BgpRouteRefreshMessageWritingError),

    CapabilityError(#[from] BgpCapabilityMessageWritingError),
}

/// The input tells whether 4-octet AS numbers are in use on the session,
/// only UPDATE messages depend on it.
impl WritablePduWithOneInput<bool, BgpMessageWritingError> for BgpMessage {
    const BASE_LENGTH: usize = BGP_HEADER_LENGTH as usize;

    fn len(&self, asn4: bool) -> usize {
        let body_len = match self {
            Self::Open(open) => open.len(),
            Self::Update(update) => update.len(asn4),
            Self::Notification(notification) => notification.len(),
            Self::KeepAlive => 0,
            Self::RouteRefresh(route_refresh) => route_refresh.len(),
            Self::Capability(capability) => capability.len(),
        };
        Self::BASE_LENGTH + body_len
    }

    fn write<T: std::io::Write>(
        &self,
        writer: &mut T,
        asn4: bool,
    ) -> Result<(), BgpMessageWritingError> {
        let len = self.len(asn4);
        if len > BGP_MAX_MESSAGE_LENGTH as usize {
            return Err(BgpMessageWritingError::BgpMessageLengthOverflow(len));
        }
        writer.write_all(&BGP_MARKER)?;
        writer.write_u16::<NetworkEndian>(len as u16)?;
        writer.write_u8(self.get_type().into())?;
        match self {
            Self::Open(open) => open.write(writer)?,
            Self::Update(update) => update.write(writer, asn4)?,
            Self::Notification(notification) => notification.write(writer)?,
            Self::KeepAlive => {}
            Self::RouteRefresh(route_refresh) => route_refresh.write(writer)?,
            Self::Capability(capability) => capability.write(writer)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capabilities::BgpCapability,
        dynamic_capability::{
            BgpCapabilityMessage, DynamicCapabilityAction, DynamicCapabilityEntry,
        },
        open::{BgpOpenMessage, BgpOpenMessageParameter},
    };
    use peerwire_iana::address_family::AddressType;
    use peerwire_parse_utils::test_helpers::test_write_with_one_input;
    use std::net::Ipv4Addr;

    #[test]
    fn test_keepalive() -> Result<(), BgpMessageWritingError> {
        let good_wire = [
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0x00, 0x13, 0x04,
        ];
        test_write_with_one_input(&BgpMessage::KeepAlive, true, &good_wire)?;
        Ok(())
    }

    #[test]
    fn test_open() -> Result<(), BgpMessageWritingError> {
        let good_wire = [
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0x00, 0x2d, 0x01, // header, length 45
            0x04, 0xfd, 0xe9, 0x00, 0xb4, 0x0a, 0x00, 0x00, 0x01, // v4, AS 65001, hold 180
            0x10, 0x02, 0x0e, // capabilities parameter
            0x01, 0x04, 0x00, 0x01, 0x00, 0x01, // IPv4 unicast
            0x02, 0x00, // route refresh
            0x41, 0x04, 0x00, 0x00, 0xfd, 0xe9, // four octet AS 65001
        ];
        let good = BgpMessage::Open(BgpOpenMessage::new(
            65001,
            180,
            Ipv4Addr::new(10, 0, 0, 1),
            vec![BgpOpenMessageParameter::Capabilities(vec![
                BgpCapability::MultiProtocolExtensions(AddressType::Ipv4Unicast),
                BgpCapability::RouteRefresh,
                BgpCapability::FourOctetAs(65001),
            ])],
        ));
        test_write_with_one_input(&good, true, &good_wire)?;
        Ok(())
    }

    #[test]
    fn test_length_overflow() {
        let entries = (0..400)
            .map(|sequence| {
                DynamicCapabilityEntry::new(
                    false,
                    false,
                    DynamicCapabilityAction::Set,
                    sequence,
                    BgpCapability::RouteRefresh,
                )
            })
            .collect();
        let good = BgpMessage::Capability(BgpCapabilityMessage::new(entries));
        let mut buf = vec![];
        assert_eq!(
            good.write(&mut buf, true),
            Err(BgpMessageWritingError::BgpMessageLengthOverflow(19 + 400 * 7))
        );
        assert!(buf.is_empty());
    }
}
