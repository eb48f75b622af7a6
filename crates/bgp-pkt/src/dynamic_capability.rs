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


//! In-session capability exchange, the CAPABILITY message of
//! [draft-ietf-idr-dynamic-cap](https://datatracker.ietf.org/doc/html/draft-ietf-idr-dynamic-cap)

use crate::capabilities::BgpCapability;
use serde::{Deserialize, Serialize};

/// Mask of the init/ack bit in the action octet
pub const DYNAMIC_CAPABILITY_INIT_ACK: u8 = 0x80;
/// Mask of the ack-request bit in the action octet
pub const DYNAMIC_CAPABILITY_ACK_REQUEST: u8 = 0x40;
/// Mask of the action bit, set means the capability is removed
pub const DYNAMIC_CAPABILITY_UNSET: u8 = 0x01;
/// Bits of the action octet that must be zero
pub const DYNAMIC_CAPABILITY_RESERVED: u8 =
    !(DYNAMIC_CAPABILITY_INIT_ACK | DYNAMIC_CAPABILITY_ACK_REQUEST | DYNAMIC_CAPABILITY_UNSET);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DynamicCapabilityAction {
    Set,
    Unset,
}

/// ```text
/// +------------------------------+
/// | Init/Ack (1 bit)             |
/// +------------------------------+
/// | Ack Request (1 bit)          |
/// +------------------------------+
/// | Reserved (5 bits)            |
/// +------------------------------+
/// | Action (1 bit)               |
/// +------------------------------+
/// | Sequence Number (4 octets)   |
/// +------------------------------+
/// | Capability Code (1 octet)    |
/// +------------------------------+
/// | Capability Length (1 octet)  |
/// +------------------------------+
/// | Capability Value (variable)  |
/// +------------------------------+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DynamicCapabilityEntry {
    init_ack: bool,
    ack_request: bool,
    action: DynamicCapabilityAction,
    sequence: u32,
    capability: BgpCapability,
}

impl DynamicCapabilityEntry {
    pub const fn new(
        init_ack: bool,
        ack_request: bool,
        action: DynamicCapabilityAction,
        sequence: u32,
        capability: BgpCapability,
    ) -> Self {
        Self {
            init_ack,
            ack_request,
            action,
            sequence,
            capability,
        }
    }

    pub const fn init_ack(&self) -> bool {
        self.init_ack
    }

    pub const fn ack_request(&self) -> bool {
        self.ack_request
    }

    pub const fn action(&self) -> DynamicCapabilityAction {
        self.action
    }

    pub const fn sequence(&self) -> u32 {
        self.sequence
    }

    pub const fn capability(&self) -> &BgpCapability {
        &self.capability
    }

    /// Action octet as carried on the wire
    pub const fn action_byte(&self) -> u8 {
        let mut value = 0;
        if self.init_ack {
            value |= DYNAMIC_CAPABILITY_INIT_ACK;
        }
        if self.ack_request {
            value |= DYNAMIC_CAPABILITY_ACK_REQUEST;
        }
        if let DynamicCapabilityAction::Unset = self.action {
            value |= DYNAMIC_CAPABILITY_UNSET;
        }
        value
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct BgpCapabilityMessage {
    entries: Vec<DynamicCapabilityEntry>,
}

impl BgpCapabilityMessage {
    pub const fn new(entries: Vec<DynamicCapabilityEntry>) -> Self {
        Self { entries }
    }

    pub const fn entries(&self) -> &Vec<DynamicCapabilityEntry> {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_byte() {
        let entry = DynamicCapabilityEntry::new(
            false,
            true,
            DynamicCapabilityAction::Unset,
            10,
            BgpCapability::RouteRefresh,
        );
        assert_eq!(entry.action_byte(), 0x41);
        assert_eq!(DYNAMIC_CAPABILITY_RESERVED, 0x3e);
    }
}
