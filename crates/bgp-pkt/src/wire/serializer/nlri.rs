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


use byteorder::WriteBytesExt;
use ipnet::IpNet;
use peerwire_serde_macros::WritingError;
use std::io::Write;

#[derive(WritingError, Eq, PartialEq, Clone, Debug)]
pub enum IpNetWritingError {
    StdIOError(#[from_std_io_error] String),
}

/// Prefix length octet followed by the significant octets of the network
#[inline]
pub fn prefix_wire_len(prefix: &IpNet) -> usize {
    1 + prefix.prefix_len().div_ceil(8) as usize
}

pub fn write_prefix<T: Write>(writer: &mut T, prefix: &IpNet) -> Result<(), IpNetWritingError> {
    let octets = prefix.prefix_len().div_ceil(8) as usize;
    writer.write_u8(prefix.prefix_len())?;
    match prefix.trunc() {
        IpNet::V4(net) => writer.write_all(&net.network().octets()[..octets])?,
        IpNet::V6(net) => writer.write_all(&net.network().octets()[..octets])?,
    }
    Ok(())
}

/// Encode a list of prefixes as a NLRI field
pub fn encode_prefixes(prefixes: &[IpNet]) -> Result<Vec<u8>, IpNetWritingError> {
    let mut buf = Vec::with_capacity(prefixes.iter().map(prefix_wire_len).sum());
    for prefix in prefixes {
        write_prefix(&mut buf, prefix)?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_prefix() -> Result<(), IpNetWritingError> {
        let good_v4_wire = vec![0x16, 0xc0, 0xa8, 0x04];
        let good_v4 = IpNet::from_str("192.168.4.0/22").unwrap();
        let default_wire = vec![0x00];
        let default = IpNet::from_str("0.0.0.0/0").unwrap();
        let good_v6_wire = vec![0x20, 0x20, 0x01, 0x0d, 0xb8];
        let good_v6 = IpNet::from_str("2001:db8::/32").unwrap();

        assert_eq!(encode_prefixes(&[good_v4])?, good_v4_wire);
        assert_eq!(prefix_wire_len(&good_v4), 4);
        assert_eq!(encode_prefixes(&[default])?, default_wire);
        assert_eq!(encode_prefixes(&[good_v6])?, good_v6_wire);
        Ok(())
    }

    #[test]
    fn test_host_bits_are_dropped() {
        let net = IpNet::from_str("10.1.2.3/16").unwrap();
        assert_eq!(encode_prefixes(&[net]), Ok(vec![0x10, 0x0a, 0x01]));
    }
}
