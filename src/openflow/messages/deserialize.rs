/*!
All deserialization routines for the OpenFlow message primitives

The header uses a special deserialization because its size is known.
Use the trait `Deserialize` for any other deserialization implementation.
*/

use byteorder::{ByteOrder, NetworkEndian};
use openflow::error::{Error, Result};
use openflow::messages::*;

use std::mem::size_of;

impl OfpHeader {
    /// Deserializes an OpenFlow header
    pub fn deserialize(bytes: &[u8; 8]) -> OfpHeader {
        OfpHeader {
            version: bytes[0],
            typ: bytes[1],
            length: NetworkEndian::read_u16(&bytes[2..4]),
            xid: NetworkEndian::read_u32(&bytes[4..]),
        }
    }

    /// Returns the body length in byte
    pub fn body_length(&self) -> usize {
        (self.length as usize).saturating_sub(OfpHeader::header_length())
    }
}

/// To be implemented by all OpenFlow message parts that are received.
pub trait Deserialize {
    /// The type to deserialize
    type R;

    /// Deserialize the bytes buffer
    /// Fails on providing a too small or too large buffer
    fn deserialize(bytes: Vec<u8>) -> Result<Self::R> {
        if Self::min_length() > bytes.len() || Self::max_length() < bytes.len() {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen, bytes));
        }
        Self::deserialize_len_ok(bytes)
    }

    /// Deserializes the byte buffer (network byte order)
    /// Implementers can rely on the bytes buffer's size to be greater or equal Self::min_length()
    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R>;

    /// The minimum length of the message part in bytes
    /// If Self::R contains dynamically sized fields,
    /// you probably have to override this implementation.
    fn min_length() -> usize {
        size_of::<Self::R>()
    }

    /// The maximum length of the message part in bytes
    /// May not return a value greater than 0xFFF7
    /// If Self::R is fixed size, you probably have to
    /// override this implementation.
    fn max_length() -> usize {
        0xffff - OfpHeader::header_length()
    }
}

impl Deserialize for OfpEchoRequest {
    type R = OfpEchoRequest;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        Ok(OfpEchoRequest { arbitrary: bytes })
    }

    fn min_length() -> usize {
        0
    }
}

impl Deserialize for OfpSwitchFeatures {
    type R = OfpSwitchFeatures;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        Ok(OfpSwitchFeatures {
            datapath_id: NetworkEndian::read_u64(&bytes[0..8]),
            n_buffers: NetworkEndian::read_u32(&bytes[8..12]),
            n_tables: bytes[12],
            auxiliary_id: bytes[13],
            pad: [bytes[14], bytes[15]],
            capabilities: NetworkEndian::read_u32(&bytes[16..20]),
            reserved: NetworkEndian::read_u32(&bytes[20..]),
        })
    }

    fn max_length() -> usize {
        24
    }
}

impl Deserialize for OfpErrorMsg {
    type R = OfpErrorMsg;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        let typ = NetworkEndian::read_u16(&bytes[0..2]);
        let code = NetworkEndian::read_u16(&bytes[2..4]);
        Ok(OfpErrorMsg {
            typ,
            code,
            data: bytes[4..].to_vec(),
        })
    }

    fn min_length() -> usize {
        4
    }
}

impl OfpMatch {
    /// Deserializes a padded match from the start of `bytes`.
    /// Returns the match and the number of bytes it occupies including padding.
    fn deserialize_prefix(bytes: &[u8]) -> Option<(OfpMatch, usize)> {
        if bytes.len() < 4 {
            return None;
        }
        let typ = NetworkEndian::read_u16(&bytes[0..2]);
        let length = NetworkEndian::read_u16(&bytes[2..4]) as usize;
        let padded = (length + 7) / 8 * 8;
        if length < 4 || bytes.len() < padded {
            return None;
        }
        let mut oxm_fields = vec![];
        let mut pos = 4;
        while pos + 4 <= length {
            let header = NetworkEndian::read_u32(&bytes[pos..pos + 4]);
            let class = (header >> 16) as u16;
            let code = ((header >> 9) & 0x7f) as u8;
            let hasmask = (header >> 8) & 1 == 1;
            let len = (header & 0xff) as usize;
            pos += 4;
            if pos + len > length {
                return None;
            }
            oxm_fields.push(OfpOxmTlv::new(
                OxmField::from_class_and_code(class, code),
                hasmask,
                bytes[pos..pos + len].to_vec(),
            ));
            pos += len;
        }
        Some((OfpMatch { typ, oxm_fields }, padded))
    }
}

impl OfpPacketIn {
    /// Constructs a packet-in as received from a switch of the given version.
    pub fn new(
        version: OfpVersion,
        buffer_id: Option<u32>,
        in_port: u32,
        match_field: OfpMatch,
        data: Vec<u8>,
    ) -> OfpPacketIn {
        OfpPacketIn {
            version,
            buffer_id: buffer_id.unwrap_or(OFP_NO_BUFFER),
            total_len: data.len() as u16,
            in_port,
            reason: OfpPacketInReason::NoMatch as u8,
            table_id: 0,
            cookie: 0,
            match_field,
            data,
        }
    }
}

impl Deserialize for OfpPacketIn {
    type R = OfpPacketIn;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        let (match_field, match_len) = match OfpMatch::deserialize_prefix(&bytes[16..]) {
            Some(m) => m,
            None => return Err(Error::BadRequest(OfpBadRequestCode::BadLen, bytes)),
        };
        // two bytes of padding follow the match
        let data_start = 16 + match_len + 2;
        if data_start > bytes.len() {
            return Err(Error::BadRequest(OfpBadRequestCode::BadLen, bytes));
        }
        Ok(OfpPacketIn {
            version: OfpVersion::Of13,
            buffer_id: NetworkEndian::read_u32(&bytes[0..4]),
            total_len: NetworkEndian::read_u16(&bytes[4..6]),
            in_port: OFPP_ANY,
            reason: bytes[6],
            table_id: bytes[7],
            cookie: NetworkEndian::read_u64(&bytes[8..16]),
            match_field,
            data: bytes[data_start..].to_vec(),
        })
    }

    fn min_length() -> usize {
        // fixed fields, an empty match and the padding
        16 + 8 + 2
    }
}

const OFP_PORT_LENGTH: usize = 64;
const OFP_MAX_PORT_NAME_LEN: usize = 16;

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl OfpPort {
    /// Constructs a port description with neither config nor state flags
    pub fn new(port_no: u32, hw_addr: MacAddr, name: &str) -> OfpPort {
        OfpPort {
            port_no,
            hw_addr,
            name: name.to_owned(),
            config: 0,
            state: 0,
        }
    }

    /// Deserializes a port from a slice of at least `OFP_PORT_LENGTH` bytes
    fn deserialize_fixed(bytes: &[u8]) -> OfpPort {
        let mut hw_addr = [0; 6];
        hw_addr.copy_from_slice(&bytes[8..14]);
        OfpPort {
            port_no: NetworkEndian::read_u32(&bytes[0..4]),
            hw_addr: MacAddr(hw_addr),
            name: c_string(&bytes[16..16 + OFP_MAX_PORT_NAME_LEN]),
            config: NetworkEndian::read_u32(&bytes[32..36]),
            state: NetworkEndian::read_u32(&bytes[36..40]),
        }
    }
}

impl Deserialize for OfpPortStatus {
    type R = OfpPortStatus;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        Ok(OfpPortStatus {
            reason: bytes[0],
            desc: OfpPort::deserialize_fixed(&bytes[8..]),
        })
    }

    fn min_length() -> usize {
        8 + OFP_PORT_LENGTH
    }

    fn max_length() -> usize {
        8 + OFP_PORT_LENGTH
    }
}

const DESC_STR_LEN: usize = 256;
const SERIAL_NUM_LEN: usize = 32;

impl Deserialize for OfpMultipartReply {
    type R = OfpMultipartReply;

    fn deserialize_len_ok(bytes: Vec<u8>) -> Result<Self::R> {
        let typ = NetworkEndian::read_u16(&bytes[0..2]);
        let body = &bytes[8..];
        if typ == OfpMultipartType::Desc as u16 {
            if body.len() < 4 * DESC_STR_LEN + SERIAL_NUM_LEN {
                return Err(Error::BadRequest(OfpBadRequestCode::BadLen, bytes));
            }
            let mut pos = 0;
            let mut next = |len: usize| {
                let s = c_string(&body[pos..pos + len]);
                pos += len;
                s
            };
            Ok(OfpMultipartReply::Desc(SwitchDescription {
                manufacturer: next(DESC_STR_LEN),
                hardware: next(DESC_STR_LEN),
                software: next(DESC_STR_LEN),
                serial_num: next(SERIAL_NUM_LEN),
                datapath: next(DESC_STR_LEN),
            }))
        }
        else if typ == OfpMultipartType::PortDesc as u16 {
            Ok(OfpMultipartReply::PortDesc(
                body.chunks(OFP_PORT_LENGTH)
                    .filter(|c| c.len() == OFP_PORT_LENGTH)
                    .map(OfpPort::deserialize_fixed)
                    .collect(),
            ))
        }
        else {
            Ok(OfpMultipartReply::Other(typ))
        }
    }

    fn min_length() -> usize {
        8
    }
}

impl OfpPortStatus {
    /// Constructs a port status message
    pub fn new(reason: OfpPortReason, desc: OfpPort) -> OfpPortStatus {
        OfpPortStatus {
            reason: reason as u8,
            desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_deserialization() {
        let expected = OfpHeader {
            version: 3,
            typ: 1,
            length: 0x5234,
            xid: 0x12345678,
        };
        let bytes = [3, 1, 0x52, 0x34, 0x12, 0x34, 0x56, 0x78];
        assert_eq!(expected, OfpHeader::deserialize(&bytes));
    }

    #[test]
    fn min_lengths() {
        assert_eq!(0, OfpEchoRequest::min_length());
        assert_eq!(24, OfpSwitchFeatures::min_length());
        assert_eq!(4, OfpErrorMsg::min_length());
        assert_eq!(72, OfpPortStatus::min_length());
    }

    #[test]
    fn max_lengths() {
        assert_eq!(0xFFF7, OfpEchoRequest::max_length());
        assert_eq!(24, OfpSwitchFeatures::max_length());
        assert_eq!(0xFFF7, OfpErrorMsg::max_length());
    }

    fn packet_in_bytes() -> Vec<u8> {
        let mut bytes = vec![
            0xff, 0xff, 0xff, 0xff, // buffer id
            0, 4, // total length
            0, 0, // reason and table
            0, 0, 0, 0, 0, 0, 0, 0, // cookie
            0, 1, 0, 12, // match header
            0x80, 0x00, 0x00, 0x04, 0, 0, 0, 3, // in port 3
            0, 0, 0, 0, // match padding
            0, 0, // padding
        ];
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        bytes
    }

    #[test]
    fn packet_in_deserialization() {
        let pi = OfpPacketIn::deserialize(packet_in_bytes()).unwrap();
        assert_eq!(None, pi.buffer_id());
        assert_eq!(3, pi.in_port());
        assert_eq!(Some(3), pi.match_field().in_port());
        assert_eq!(&[0xde, 0xad, 0xbe, 0xef][..], pi.data());
    }

    #[test]
    fn truncated_packet_in_is_rejected() {
        let mut bytes = packet_in_bytes();
        bytes.truncate(24);
        assert!(OfpPacketIn::deserialize(bytes).is_err());
    }

    #[test]
    fn port_status_deserialization() {
        let mut bytes = vec![OfpPortReason::Modify as u8, 0, 0, 0, 0, 0, 0, 0];
        let mut port = vec![0; OFP_PORT_LENGTH];
        port[3] = 7;
        port[8..14].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        port[16..20].copy_from_slice(b"eth7");
        port[39] = OFPPS_LINK_DOWN as u8;
        bytes.extend(port);
        let ps = OfpPortStatus::deserialize(bytes).unwrap();
        assert_eq!(7, ps.port_no());
        assert_eq!("eth7", ps.desc.name());
        assert!(ps.is_down());
    }

    #[test]
    fn desc_reply_deserialization() {
        let mut bytes = vec![0; 8 + 4 * DESC_STR_LEN + SERIAL_NUM_LEN];
        bytes[8..12].copy_from_slice(b"ACME");
        bytes[8 + DESC_STR_LEN..8 + DESC_STR_LEN + 12].copy_from_slice(b"Open vSwitch");
        bytes[8 + 2 * DESC_STR_LEN..8 + 2 * DESC_STR_LEN + 5].copy_from_slice(b"2.5.0");
        match OfpMultipartReply::deserialize(bytes).unwrap() {
            OfpMultipartReply::Desc(desc) => {
                assert_eq!("ACME", desc.manufacturer);
                assert_eq!("Open vSwitch", desc.hardware);
                assert_eq!("2.5.0", desc.software);
                assert_eq!("", desc.datapath);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn port_desc_reply_deserialization() {
        let mut bytes = vec![0, 13, 0, 0, 0, 0, 0, 0];
        for p in 1..3 {
            let mut port = vec![0; OFP_PORT_LENGTH];
            port[3] = p;
            bytes.extend(port);
        }
        match OfpMultipartReply::deserialize(bytes).unwrap() {
            OfpMultipartReply::PortDesc(ports) => {
                assert_eq!(vec![1, 2], ports.iter().map(|p| p.port_no()).collect::<Vec<_>>());
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
