/*!
Parsing and construction of the frames carried by packet-in and packet-out messages.

Ethernet (with an optional 802.1Q tag), ARP, IPv4 and IPv6 are parsed
together with TCP, UDP and ICMP on top of IP. Anything else is kept as raw
bytes. Serialization covers Ethernet frames carrying ARP or IPv4 with
TCP, UDP or ICMP, checksums included.
*/

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use types::MacAddr;

use std::error;
use std::fmt;
use std::io;
use std::io::{Cursor, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr};

pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;
pub const ETH_TYPE_VLAN: u16 = 0x8100;
pub const ETH_TYPE_IPV6: u16 = 0x86dd;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

pub const ARP_REQUEST: u16 = 1;
pub const ARP_REPLY: u16 = 2;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_ECHO_REQUEST: u8 = 8;

/// Frames shorter than this are padded with zeros on serialization
const ETH_MIN_LEN: usize = 60;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Unsupported(&'static str),
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "packet codec error"
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "malformed frame: {}", e),
            Error::Unsupported(what) => write!(f, "cannot serialize {}", what),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

fn read_mac<R: Read>(bytes: &mut R) -> io::Result<MacAddr> {
    let mut mac = [0; 6];
    bytes.read_exact(&mut mac)?;
    Ok(MacAddr(mac))
}

fn read_ipv4<R: Read>(bytes: &mut R) -> io::Result<Ipv4Addr> {
    Ok(Ipv4Addr::from(bytes.read_u32::<NetworkEndian>()?))
}

fn read_rest(bytes: &mut Cursor<&[u8]>) -> Vec<u8> {
    let pos = bytes.position() as usize;
    let all = *bytes.get_ref();
    if pos >= all.len() {
        vec![]
    }
    else {
        all[pos..].to_vec()
    }
}

/// One's complement sum over 16 bit words, as used by IPv4, ICMP, TCP and UDP
fn checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in bytes.chunks(2) {
        let word = if chunk.len() == 2 {
            (u32::from(chunk[0]) << 8) | u32::from(chunk[1])
        }
        else {
            u32::from(chunk[0]) << 8
        };
        sum += word;
    }
    while (sum >> 16) != 0 {
        sum = (sum >> 16) + (sum & 0xffff);
    }
    !(sum as u16)
}

/// TCP segment header fields of interest
#[derive(Debug, Clone, PartialEq)]
pub struct Tcp {
    pub src_port: u16,
    pub dst_port: u16,
    /// The 12 flag bits
    pub flags: u16,
}

impl Tcp {
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<Tcp> {
        let src_port = bytes.read_u16::<NetworkEndian>()?;
        let dst_port = bytes.read_u16::<NetworkEndian>()?;
        // sequence and acknowledgement numbers
        bytes.read_u64::<NetworkEndian>()?;
        let offset_flags = bytes.read_u16::<NetworkEndian>()?;
        Ok(Tcp {
            src_port,
            dst_port,
            flags: offset_flags & 0x0fff,
        })
    }

    /// Writes a header without options. Sequence numbers are zero.
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.write_u16::<NetworkEndian>(self.src_port)?;
        buf.write_u16::<NetworkEndian>(self.dst_port)?;
        buf.write_u64::<NetworkEndian>(0)?;
        buf.write_u16::<NetworkEndian>((5 << 12) | (self.flags & 0x0fff))?;
        // window, checksum and urgent pointer
        buf.write_u16::<NetworkEndian>(0xffff)?;
        buf.write_u16::<NetworkEndian>(0)?;
        buf.write_u16::<NetworkEndian>(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Udp {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Vec<u8>,
}

impl Udp {
    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<Udp> {
        let src_port = bytes.read_u16::<NetworkEndian>()?;
        let dst_port = bytes.read_u16::<NetworkEndian>()?;
        // length and checksum
        bytes.read_u32::<NetworkEndian>()?;
        Ok(Udp {
            src_port,
            dst_port,
            payload: read_rest(bytes),
        })
    }

    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.write_u16::<NetworkEndian>(self.src_port)?;
        buf.write_u16::<NetworkEndian>(self.dst_port)?;
        buf.write_u16::<NetworkEndian>((8 + self.payload.len()) as u16)?;
        buf.write_u16::<NetworkEndian>(0)?;
        buf.write_all(&self.payload)
    }
}

/// Checksum of a TCP segment or UDP datagram including the IPv4 pseudo header
fn pseudo_header_checksum(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, segment: &[u8]) -> u16 {
    let mut buf = Vec::with_capacity(12 + segment.len());
    buf.extend_from_slice(&src.octets());
    buf.extend_from_slice(&dst.octets());
    buf.push(0);
    buf.push(protocol);
    buf.push((segment.len() >> 8) as u8);
    buf.push(segment.len() as u8);
    buf.extend_from_slice(segment);
    checksum(&buf)
}

/// An ICMP message. The payload holds everything after the checksum,
/// i.e. identifier and sequence number of echo messages plus their data.
#[derive(Debug, Clone, PartialEq)]
pub struct Icmp {
    pub typ: u8,
    pub code: u8,
    pub payload: Vec<u8>,
}

impl Icmp {
    pub fn is_echo_request(&self) -> bool {
        self.typ == ICMP_ECHO_REQUEST && self.code == 0
    }

    /// Constructs the reply to an echo request, echoing its payload
    pub fn echo_reply(&self) -> Icmp {
        Icmp {
            typ: ICMP_ECHO_REPLY,
            code: 0,
            payload: self.payload.clone(),
        }
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> io::Result<Icmp> {
        let typ = bytes.read_u8()?;
        let code = bytes.read_u8()?;
        bytes.read_u16::<NetworkEndian>()?;
        Ok(Icmp {
            typ,
            code,
            payload: read_rest(bytes),
        })
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let mut buf = vec![self.typ, self.code, 0, 0];
        buf.extend_from_slice(&self.payload);
        let sum = checksum(&buf);
        buf[2] = (sum >> 8) as u8;
        buf[3] = sum as u8;
        stream.write_all(&buf)
    }
}

/// Transport layer content of an IP packet
#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    Tcp(Tcp),
    Udp(Udp),
    Icmp(Icmp),
    /// IP protocol number and raw bytes
    Unparsable(u8, Vec<u8>),
}

impl Transport {
    fn parse(proto: u8, bytes: &[u8]) -> Transport {
        let mut cursor = Cursor::new(bytes);
        let parsed = match proto {
            IP_PROTO_TCP => Tcp::parse(&mut cursor).map(Transport::Tcp),
            IP_PROTO_UDP => Udp::parse(&mut cursor).map(Transport::Udp),
            IP_PROTO_ICMP => Icmp::parse(&mut cursor).map(Transport::Icmp),
            _ => return Transport::Unparsable(proto, bytes.to_vec()),
        };
        parsed.unwrap_or_else(|_| Transport::Unparsable(proto, bytes.to_vec()))
    }

    /// Writes the content of an IPv4 packet from `src` to `dst`
    fn serialize<S: Write>(&self, src: Ipv4Addr, dst: Ipv4Addr, stream: &mut S) -> io::Result<()> {
        let mut segment = vec![];
        // protocol and checksum offset
        let (proto, sum_at) = match *self {
            Transport::Icmp(ref icmp) => return icmp.serialize(stream),
            Transport::Unparsable(_, ref bytes) => return stream.write_all(bytes),
            Transport::Tcp(ref tcp) => {
                tcp.serialize(&mut segment)?;
                (IP_PROTO_TCP, 16)
            }
            Transport::Udp(ref udp) => {
                udp.serialize(&mut segment)?;
                (IP_PROTO_UDP, 6)
            }
        };
        let mut sum = pseudo_header_checksum(src, dst, proto, &segment);
        // zero means "no checksum" for UDP
        if sum == 0 && proto == IP_PROTO_UDP {
            sum = 0xffff;
        }
        segment[sum_at] = (sum >> 8) as u8;
        segment[sum_at + 1] = sum as u8;
        stream.write_all(&segment)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ipv4 {
    pub tos: u8,
    pub ident: u16,
    /// Flags and fragment offset
    pub fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: Transport,
}

impl Ipv4 {
    /// Constructs an unfragmented IPv4 packet with the protocol taken from `payload`
    pub fn new(src: Ipv4Addr, dst: Ipv4Addr, ttl: u8, payload: Transport) -> Ipv4 {
        let protocol = match payload {
            Transport::Tcp(_) => IP_PROTO_TCP,
            Transport::Udp(_) => IP_PROTO_UDP,
            Transport::Icmp(_) => IP_PROTO_ICMP,
            Transport::Unparsable(p, _) => p,
        };
        Ipv4 {
            tos: 0,
            ident: 0,
            fragment: 0,
            ttl,
            protocol,
            src,
            dst,
            payload,
        }
    }

    fn parse(bytes: &[u8]) -> io::Result<Ipv4> {
        let mut cursor = Cursor::new(bytes);
        let vhl = cursor.read_u8()?;
        if vhl >> 4 != 4 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an IPv4 header"));
        }
        let ihl = (vhl & 0x0f) as usize * 4;
        let tos = cursor.read_u8()?;
        let total_len = cursor.read_u16::<NetworkEndian>()? as usize;
        let ident = cursor.read_u16::<NetworkEndian>()?;
        let fragment = cursor.read_u16::<NetworkEndian>()?;
        let ttl = cursor.read_u8()?;
        let protocol = cursor.read_u8()?;
        cursor.read_u16::<NetworkEndian>()?;
        let src = read_ipv4(&mut cursor)?;
        let dst = read_ipv4(&mut cursor)?;
        if ihl < 20 || ihl > bytes.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad IPv4 header length"));
        }
        // Ethernet padding is not part of the packet
        let end = if total_len >= ihl && total_len <= bytes.len() {
            total_len
        }
        else {
            bytes.len()
        };
        Ok(Ipv4 {
            tos,
            ident,
            fragment,
            ttl,
            protocol,
            src,
            dst,
            payload: Transport::parse(protocol, &bytes[ihl..end]),
        })
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> Result<()> {
        let mut payload = vec![];
        self.payload.serialize(self.src, self.dst, &mut payload)?;
        let mut header = Vec::with_capacity(20);
        header.write_u8(0x45)?;
        header.write_u8(self.tos)?;
        header.write_u16::<NetworkEndian>((20 + payload.len()) as u16)?;
        header.write_u16::<NetworkEndian>(self.ident)?;
        header.write_u16::<NetworkEndian>(self.fragment)?;
        header.write_u8(self.ttl)?;
        header.write_u8(self.protocol)?;
        header.write_u16::<NetworkEndian>(0)?;
        header.write_all(&self.src.octets())?;
        header.write_all(&self.dst.octets())?;
        let sum = checksum(&header);
        header[10] = (sum >> 8) as u8;
        header[11] = sum as u8;
        stream.write_all(&header)?;
        Ok(stream.write_all(&payload)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ipv6 {
    pub next_header: u8,
    pub hop_limit: u8,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub payload: Transport,
}

impl Ipv6 {
    fn parse(bytes: &[u8]) -> io::Result<Ipv6> {
        let mut cursor = Cursor::new(bytes);
        let vtf = cursor.read_u32::<NetworkEndian>()?;
        if vtf >> 28 != 6 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an IPv6 header"));
        }
        let payload_len = cursor.read_u16::<NetworkEndian>()? as usize;
        let next_header = cursor.read_u8()?;
        let hop_limit = cursor.read_u8()?;
        let mut src = [0; 16];
        cursor.read_exact(&mut src)?;
        let mut dst = [0; 16];
        cursor.read_exact(&mut dst)?;
        let end = ::std::cmp::min(40 + payload_len, bytes.len());
        Ok(Ipv6 {
            next_header,
            hop_limit,
            src: Ipv6Addr::from(src),
            dst: Ipv6Addr::from(dst),
            payload: Transport::parse(next_header, &bytes[40..end]),
        })
    }
}

/// An ARP packet for IPv4 over Ethernet
#[derive(Debug, Clone, PartialEq)]
pub struct Arp {
    pub operation: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl Arp {
    pub fn is_request(&self) -> bool {
        self.operation == ARP_REQUEST
    }

    fn parse(bytes: &[u8]) -> io::Result<Arp> {
        let mut cursor = Cursor::new(bytes);
        let hw_type = cursor.read_u16::<NetworkEndian>()?;
        let proto_type = cursor.read_u16::<NetworkEndian>()?;
        let hw_len = cursor.read_u8()?;
        let proto_len = cursor.read_u8()?;
        if hw_type != 1 || proto_type != ETH_TYPE_IPV4 || hw_len != 6 || proto_len != 4 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not an Ethernet/IPv4 ARP packet"));
        }
        Ok(Arp {
            operation: cursor.read_u16::<NetworkEndian>()?,
            sender_mac: read_mac(&mut cursor)?,
            sender_ip: read_ipv4(&mut cursor)?,
            target_mac: read_mac(&mut cursor)?,
            target_ip: read_ipv4(&mut cursor)?,
        })
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(1)?;
        stream.write_u16::<NetworkEndian>(ETH_TYPE_IPV4)?;
        stream.write_all(&[6, 4])?;
        stream.write_u16::<NetworkEndian>(self.operation)?;
        stream.write_all(&self.sender_mac.octets())?;
        stream.write_all(&self.sender_ip.octets())?;
        stream.write_all(&self.target_mac.octets())?;
        stream.write_all(&self.target_ip.octets())
    }
}

/// Network layer content of an Ethernet frame
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Arp(Arp),
    Ipv4(Ipv4),
    Ipv6(Ipv6),
    Unparsable(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ethernet {
    pub dst: MacAddr,
    pub src: MacAddr,
    /// The VLAN id of an 802.1Q tag
    pub vlan: Option<u16>,
    /// The priority code point of an 802.1Q tag
    pub priority: u8,
    pub ether_type: u16,
    pub payload: Payload,
}

impl Ethernet {
    /// Constructs an untagged frame with the Ethertype taken from `payload`
    pub fn new(src: MacAddr, dst: MacAddr, payload: Payload) -> Ethernet {
        let ether_type = match payload {
            Payload::Arp(_) => ETH_TYPE_ARP,
            Payload::Ipv4(_) => ETH_TYPE_IPV4,
            Payload::Ipv6(_) => ETH_TYPE_IPV6,
            Payload::Unparsable(_) => 0,
        };
        Ethernet {
            dst,
            src,
            vlan: None,
            priority: 0,
            ether_type,
            payload,
        }
    }

    /// Copies the 802.1Q tag of another frame
    pub fn with_tag_of(mut self, other: &Ethernet) -> Ethernet {
        self.vlan = other.vlan;
        self.priority = other.priority;
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.dst.is_broadcast()
    }

    pub fn is_multicast(&self) -> bool {
        self.dst.is_multicast()
    }

    /// Parses a frame. Fails only if the Ethernet header itself is truncated;
    /// payloads that cannot be parsed are kept as raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Ethernet> {
        let mut cursor = Cursor::new(bytes);
        let dst = read_mac(&mut cursor)?;
        let src = read_mac(&mut cursor)?;
        let mut ether_type = cursor.read_u16::<NetworkEndian>()?;
        let mut vlan = None;
        let mut priority = 0;
        if ether_type == ETH_TYPE_VLAN {
            let tci = cursor.read_u16::<NetworkEndian>()?;
            vlan = Some(tci & 0x0fff);
            priority = (tci >> 13) as u8;
            ether_type = cursor.read_u16::<NetworkEndian>()?;
        }
        let rest = &bytes[cursor.position() as usize..];
        let payload = match ether_type {
            ETH_TYPE_ARP => Arp::parse(rest).map(Payload::Arp),
            ETH_TYPE_IPV4 => Ipv4::parse(rest).map(Payload::Ipv4),
            ETH_TYPE_IPV6 => Ipv6::parse(rest).map(Payload::Ipv6),
            _ => Ok(Payload::Unparsable(rest.to_vec())),
        };
        Ok(Ethernet {
            dst,
            src,
            vlan,
            priority,
            ether_type,
            payload: payload.unwrap_or_else(|_| Payload::Unparsable(rest.to_vec())),
        })
    }

    /// Serializes the frame, padded to the Ethernet minimum length
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut buf = vec![];
        buf.write_all(&self.dst.octets())?;
        buf.write_all(&self.src.octets())?;
        if let Some(vid) = self.vlan {
            buf.write_u16::<NetworkEndian>(ETH_TYPE_VLAN)?;
            buf.write_u16::<NetworkEndian>((u16::from(self.priority) << 13) | (vid & 0x0fff))?;
        }
        buf.write_u16::<NetworkEndian>(self.ether_type)?;
        match self.payload {
            Payload::Arp(ref arp) => arp.serialize(&mut buf)?,
            Payload::Ipv4(ref ip) => ip.serialize(&mut buf)?,
            Payload::Ipv6(_) => return Err(Error::Unsupported("IPv6 packets")),
            Payload::Unparsable(ref bytes) => buf.write_all(bytes)?,
        }
        if buf.len() < ETH_MIN_LEN {
            buf.resize(ETH_MIN_LEN, 0);
        }
        Ok(buf)
    }

    pub fn arp(&self) -> Option<&Arp> {
        match self.payload {
            Payload::Arp(ref arp) => Some(arp),
            _ => None,
        }
    }

    pub fn ipv4(&self) -> Option<&Ipv4> {
        match self.payload {
            Payload::Ipv4(ref ip) => Some(ip),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn mac(s: &str) -> MacAddr {
        MacAddr::from_str(s).unwrap()
    }

    fn arp_request() -> Ethernet {
        let arp = Arp {
            operation: ARP_REQUEST,
            sender_mac: mac("52:54:00:12:34:56"),
            sender_ip: Ipv4Addr::new(192, 168, 126, 10),
            target_mac: MacAddr::ZERO,
            target_ip: Ipv4Addr::new(192, 168, 126, 1),
        };
        Ethernet::new(mac("52:54:00:12:34:56"), MacAddr::BROADCAST, Payload::Arp(arp))
    }

    #[test]
    fn arp_frame_is_padded_and_parses_back() {
        let frame = arp_request();
        let bytes = frame.serialize().unwrap();
        assert_eq!(60, bytes.len());
        assert_eq!(&[0x08, 0x06][..], &bytes[12..14]);
        assert_eq!(frame, Ethernet::parse(&bytes).unwrap());
    }

    #[test]
    fn vlan_tag_is_kept() {
        let mut frame = arp_request();
        frame.vlan = Some(42);
        frame.priority = 5;
        let bytes = frame.serialize().unwrap();
        assert_eq!(&[0x81, 0x00, 0xa0, 42, 0x08, 0x06][..], &bytes[12..18]);
        let parsed = Ethernet::parse(&bytes).unwrap();
        assert_eq!(Some(42), parsed.vlan);
        assert_eq!(5, parsed.priority);
        assert!(parsed.arp().is_some());
    }

    #[test]
    fn truncated_header_is_an_error() {
        assert!(Ethernet::parse(&[0xff; 13]).is_err());
    }

    #[test]
    fn unknown_ethertype_is_unparsable() {
        let mut bytes = vec![0xff; 12];
        bytes.extend_from_slice(&[0x88, 0xcc, 1, 2, 3]);
        let frame = Ethernet::parse(&bytes).unwrap();
        assert_eq!(0x88cc, frame.ether_type);
        assert_eq!(Payload::Unparsable(vec![1, 2, 3]), frame.payload);
    }

    #[test]
    fn ipv4_icmp_checksums() {
        let icmp = Icmp {
            typ: ICMP_ECHO_REQUEST,
            code: 0,
            payload: vec![0, 1, 0, 7, b'p', b'i', b'n', b'g'],
        };
        let ip = Ipv4::new(
            Ipv4Addr::new(192, 168, 126, 10),
            Ipv4Addr::new(192, 168, 126, 1),
            64,
            Transport::Icmp(icmp.clone()),
        );
        let mut bytes = vec![];
        ip.serialize(&mut bytes).unwrap();
        assert_eq!(20 + 12, bytes.len());
        // a correct checksum sums up to zero
        assert_eq!(0, checksum(&bytes[0..20]));
        assert_eq!(0, checksum(&bytes[20..]));

        let parsed = Ipv4::parse(&bytes).unwrap();
        assert_eq!(IP_PROTO_ICMP, parsed.protocol);
        assert_eq!(Transport::Icmp(icmp), parsed.payload);
    }

    #[test]
    fn ethernet_padding_is_not_ip_payload() {
        let ip = Ipv4::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            64,
            Transport::Icmp(Icmp {
                typ: ICMP_ECHO_REQUEST,
                code: 0,
                payload: vec![0, 1, 0, 1],
            }),
        );
        let frame = Ethernet::new(MacAddr::ZERO, MacAddr::BROADCAST, Payload::Ipv4(ip));
        let bytes = frame.serialize().unwrap();
        assert_eq!(60, bytes.len());
        match Ethernet::parse(&bytes).unwrap().ipv4().map(|ip| ip.payload.clone()) {
            Some(Transport::Icmp(icmp)) => assert_eq!(vec![0, 1, 0, 1], icmp.payload),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn tcp_and_udp_ports() {
        let mut tcp = vec![0x45, 0, 0, 40, 0, 0, 0, 0, 64, IP_PROTO_TCP, 0, 0, 10, 0, 0, 1, 10, 0, 0, 2];
        tcp.extend_from_slice(&[0x04, 0xd2, 0x00, 0x50, 0, 0, 0, 0, 0, 0, 0, 0, 0x50, 0x12, 0, 0, 0, 0, 0, 0]);
        match Ipv4::parse(&tcp).unwrap().payload {
            Transport::Tcp(t) => {
                assert_eq!(1234, t.src_port);
                assert_eq!(80, t.dst_port);
                assert_eq!(0x012, t.flags);
            }
            other => panic!("unexpected transport {:?}", other),
        }

        let mut udp = vec![0x45, 0, 0, 30, 0, 0, 0, 0, 64, IP_PROTO_UDP, 0, 0, 10, 0, 0, 1, 10, 0, 0, 2];
        udp.extend_from_slice(&[0, 53, 0x30, 0x39, 0, 10, 0, 0, 1, 2]);
        match Ipv4::parse(&udp).unwrap().payload {
            Transport::Udp(u) => {
                assert_eq!(53, u.src_port);
                assert_eq!(12345, u.dst_port);
                assert_eq!(vec![1, 2], u.payload);
            }
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn tcp_frame_checksum_and_parse_back() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        let tcp = Tcp {
            src_port: 1234,
            dst_port: 80,
            flags: 0x002,
        };
        let ip = Ipv4::new(src, dst, 64, Transport::Tcp(tcp.clone()));
        let frame = Ethernet::new(mac("00:00:00:00:00:01"), mac("00:00:00:00:00:02"), Payload::Ipv4(ip));
        let bytes = frame.serialize().unwrap();
        // 14 + 20 + 20 bytes, padded
        assert_eq!(60, bytes.len());
        assert_eq!(0, pseudo_header_checksum(src, dst, IP_PROTO_TCP, &bytes[34..54]));
        assert_eq!(frame, Ethernet::parse(&bytes).unwrap());
    }

    #[test]
    fn udp_datagram_checksum_and_parse_back() {
        let src = Ipv4Addr::new(192, 168, 126, 10);
        let dst = Ipv4Addr::new(192, 168, 150, 20);
        let udp = Udp {
            src_port: 5353,
            dst_port: 53,
            payload: vec![1, 2, 3],
        };
        let ip = Ipv4::new(src, dst, 64, Transport::Udp(udp.clone()));
        let mut bytes = vec![];
        ip.serialize(&mut bytes).unwrap();
        assert_eq!(20 + 8 + 3, bytes.len());
        assert_eq!(&[0, 11][..], &bytes[24..26]);
        assert_eq!(0, pseudo_header_checksum(src, dst, IP_PROTO_UDP, &bytes[20..]));
        assert_eq!(Transport::Udp(udp), Ipv4::parse(&bytes).unwrap().payload);
    }

    #[test]
    fn ipv6_addresses() {
        let mut bytes = vec![0x60, 0, 0, 0, 0, 8, IP_PROTO_UDP, 64];
        bytes.extend_from_slice(&Ipv6Addr::from_str("fe80::1").unwrap().octets());
        bytes.extend_from_slice(&Ipv6Addr::from_str("fe80::2").unwrap().octets());
        bytes.extend_from_slice(&[0, 1, 0, 2, 0, 8, 0, 0]);
        let ip = Ipv6::parse(&bytes).unwrap();
        assert_eq!(Ipv6Addr::from_str("fe80::2").unwrap(), ip.dst);
        match ip.payload {
            Transport::Udp(u) => assert_eq!(2, u.dst_port),
            other => panic!("unexpected transport {:?}", other),
        }
    }
}
