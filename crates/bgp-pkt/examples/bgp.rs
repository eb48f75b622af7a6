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

//! Build an OPEN message, serialize it and run it through the streaming
//! decoder the way a session receiving it from the peer would.

use peerwire_bgp_pkt::{
    capabilities::{BgpCapability, CapabilityRecord, PeerCapabilities},
    open::{BgpOpenMessage, BgpOpenMessageParameter},
    wire::deserializer::{
        context::{SessionContext, SessionParameters},
        DecodeStatus, MessageDecoder, ReceivedMessage,
    },
    BgpMessage,
};
use peerwire_iana::address_family::AddressType;
use peerwire_parse_utils::{ring_buffer::RingBuffer, WritablePduWithOneInput};
use std::net::Ipv4Addr;

pub fn main() {
    let capabilities = vec![
        BgpCapability::MultiProtocolExtensions(AddressType::Ipv4Unicast),
        BgpCapability::MultiProtocolExtensions(AddressType::Ipv6Unicast),
        BgpCapability::RouteRefresh,
        BgpCapability::FourOctetAs(65001),
    ];
    let msg = BgpMessage::Open(BgpOpenMessage::new(
        65001,
        180,
        Ipv4Addr::new(10, 0, 0, 1),
        vec![BgpOpenMessageParameter::Capabilities(capabilities.clone())],
    ));

    let mut buf: Vec<u8> = vec![];
    msg.write(&mut buf, true).unwrap();
    println!("OPEN on the wire: {buf:02x?}");

    // The receiving side: local AS 65000 expecting AS 65001, with a
    // shorter hold time than the peer offers
    let params =
        SessionParameters::new(65000, 65001, Ipv4Addr::new(10, 0, 0, 2)).with_hold_time(90);
    let record = CapabilityRecord::new(
        PeerCapabilities::from_capabilities(&capabilities),
        PeerCapabilities::default(),
    );
    let ctx = SessionContext::new(&params, &record);

    let mut ring = RingBuffer::with_capacity(4096);
    assert_eq!(ring.write(&buf), buf.len());
    let mut decoder = MessageDecoder::new();
    loop {
        match decoder.decode_step(&mut ring, &ctx) {
            DecodeStatus::ReadLoop => continue,
            DecodeStatus::Decoded(ReceivedMessage::Open(open)) => {
                println!(
                    "Peer AS{} negotiated hold time {}s keepalive {}s, address families {:?}",
                    open.remote_asn(),
                    open.hold_time(),
                    open.keepalive(),
                    open.capabilities().address_types()
                );
                assert_eq!(open.hold_time(), 90);
                assert_eq!(open.keepalive(), 30);
                break;
            }
            other => panic!("unexpected decode status {other:?}"),
        }
    }
}
