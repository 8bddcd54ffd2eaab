/*!
Small value types shared by the forwarding core.
*/

use std::error;
use std::fmt;
use std::str::FromStr;

/// Error for parsing the colon separated hexadecimal
/// notation of datapath ids and MAC addresses
#[derive(Debug, PartialEq)]
pub struct ParseHexError(String);

impl fmt::Display for ParseHexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "'{}' is not a valid colon separated hex address", self.0)
    }
}

impl error::Error for ParseHexError {
    fn description(&self) -> &str {
        "hex address parser error"
    }
}

fn parse_hex_bytes(s: &str, out: &mut [u8]) -> Result<(), ParseHexError> {
    let err = || ParseHexError(s.to_string());
    let parts: Vec<_> = s.split(':').collect();
    if parts.len() != out.len() {
        return Err(err());
    }
    for (byte, part) in out.iter_mut().zip(parts) {
        if part.is_empty() || part.len() > 2 {
            return Err(err());
        }
        *byte = u8::from_str_radix(part, 16).map_err(|_| err())?;
    }
    Ok(())
}

fn write_hex_bytes(f: &mut fmt::Formatter, bytes: &[u8]) -> fmt::Result {
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            write!(f, ":")?;
        }
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

/// The unique 64 bit id of an OpenFlow switch.
/// The lower 48 bits usually carry a MAC address.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct DatapathId(pub u64);

impl DatapathId {
    /// The id reported for a missing endpoint
    pub const NONE: DatapathId = DatapathId(0);

    pub fn is_none(&self) -> bool {
        *self == DatapathId::NONE
    }
}

impl fmt::Display for DatapathId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = [
            (self.0 >> 56) as u8,
            (self.0 >> 48) as u8,
            (self.0 >> 40) as u8,
            (self.0 >> 32) as u8,
            (self.0 >> 24) as u8,
            (self.0 >> 16) as u8,
            (self.0 >> 8) as u8,
            self.0 as u8,
        ];
        write_hex_bytes(f, &bytes)
    }
}

impl FromStr for DatapathId {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<DatapathId, Self::Err> {
        let mut bytes = [0; 8];
        parse_hex_bytes(s, &mut bytes)?;
        Ok(DatapathId(bytes.iter().fold(0, |acc, b| (acc << 8) | u64::from(*b))))
    }
}

/// An Ethernet hardware address
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == MacAddr::BROADCAST
    }

    /// The group bit is set, broadcast excluded.
    pub fn is_multicast(&self) -> bool {
        !self.is_broadcast() && self.0[0] & 0x01 == 0x01
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_hex_bytes(f, &self.0)
    }
}

impl FromStr for MacAddr {
    type Err = ParseHexError;

    fn from_str(s: &str) -> Result<MacAddr, Self::Err> {
        let mut bytes = [0; 6];
        parse_hex_bytes(s, &mut bytes)?;
        Ok(MacAddr(bytes))
    }
}

/// A switch port, identified by the switch's datapath id and the port number.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodePort {
    pub node: DatapathId,
    pub port: u32,
}

impl NodePort {
    pub fn new(node: DatapathId, port: u32) -> NodePort {
        NodePort { node, port }
    }
}

impl fmt::Display for NodePort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datapath_id_notation() {
        let dpid = DatapathId::from_str("00:00:08:00:27:1b:a2:7c").unwrap();
        assert_eq!(DatapathId(0x0800_271b_a27c), dpid);
        assert_eq!("00:00:08:00:27:1b:a2:7c", dpid.to_string());
    }

    #[test]
    fn invalid_datapath_id() {
        assert!(DatapathId::from_str("00:00:08:00:27:1b:a2").is_err());
        assert!(DatapathId::from_str("00:00:08:00:27:1b:a2:7g").is_err());
        assert!(DatapathId::from_str("000:0:08:00:27:1b:a2:7c").is_err());
    }

    #[test]
    fn mac_predicates() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(!MacAddr::BROADCAST.is_multicast());
        let mcast = MacAddr::from_str("01:00:5e:00:00:fb").unwrap();
        assert!(mcast.is_multicast());
        let ucast = MacAddr::from_str("08:00:27:1b:a2:7c").unwrap();
        assert!(!ucast.is_multicast());
        assert!(!ucast.is_broadcast());
        assert_eq!("08:00:27:1b:a2:7c", ucast.to_string());
    }
}
