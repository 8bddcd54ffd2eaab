/*!
The OpenFlow message primitives needed for reactive forwarding

This is based on the openflow.h from OpenFlow Switch Specification 1.3.5.
The type names are changed to align with the Rust conventions.
Each outgoing message carries the protocol version of the switch it is
built for, so that version dependent fields (table id, cookie mask) can be
left out where the switch does not support them.
*/

pub mod deserialize;
pub mod serialize;

use byteorder::{ByteOrder, NetworkEndian};
use types::{DatapathId, MacAddr};

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A marker to express the endpoint
/// of any end-to-end network protocol
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtocolEndpoint {
    /// The endpoint is the source
    Src,
    /// The endpoint is the destination
    Dst,
}

/// The OpenFlow protocol versions, ordered by release.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum OfpVersion {
    Of10 = 0x01,
    Of11 = 0x02,
    Of12 = 0x03,
    Of13 = 0x04,
    Of14 = 0x05,
    Of15 = 0x06,
}

impl OfpVersion {
    /// Maps the version byte of an `OfpHeader`
    pub fn from_wire(version: u8) -> Option<OfpVersion> {
        match version {
            0x01 => Some(OfpVersion::Of10),
            0x02 => Some(OfpVersion::Of11),
            0x03 => Some(OfpVersion::Of12),
            0x04 => Some(OfpVersion::Of13),
            0x05 => Some(OfpVersion::Of14),
            0x06 => Some(OfpVersion::Of15),
            _ => None,
        }
    }
}

impl OfpErrorMsg {
    fn first_64_bytes(header: &[u8], body: &[u8]) -> Vec<u8> {
        let mut buf = vec![];
        buf.extend_from_slice(header);
        let target_length = 64 - header.len();
        let shrunk_body = if body.len() < target_length {
            body
        }
        else {
            &body[0..target_length]
        };
        buf.extend_from_slice(shrunk_body);
        buf
    }

    /// Constructs a Hello Failed error
    pub fn new_hello_failed() -> OfpErrorMsg {
        OfpErrorMsg {
            typ: OfpErrorType::HelloFailed as u16,
            code: OfpHelloFailedCode::Incompatible as u16,
            data: vec![],
        }
    }

    /// Constructs a Bad Request error
    pub fn new_bad_request(code: OfpBadRequestCode, header: &[u8], body: &[u8]) -> OfpErrorMsg {
        OfpErrorMsg {
            typ: OfpErrorType::BadRequest as u16,
            code: code as u16,
            data: Self::first_64_bytes(header, body),
        }
    }

    /// Checks if this `OfpErrorMsg` describes the target OpenFlow Table being full
    pub fn check_table_full(&self) -> bool {
        self.typ == OfpErrorType::FlowModFailed as u16
            && self.code == OfpFlowModFailedCode::TableFull as u16
    }
}

impl fmt::Display for OfpErrorMsg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let t = self.typ;
        let typ = if t == OfpErrorType::HelloFailed as u16 {
            OfpErrorType::HelloFailed
        }
        else if t == OfpErrorType::BadRequest as u16 {
            OfpErrorType::BadRequest
        }
        else if t == OfpErrorType::BadAction as u16 {
            OfpErrorType::BadAction
        }
        else if t == OfpErrorType::BadInstruction as u16 {
            OfpErrorType::BadInstruction
        }
        else if t == OfpErrorType::BadMatch as u16 {
            OfpErrorType::BadMatch
        }
        else if t == OfpErrorType::FlowModFailed as u16 {
            OfpErrorType::FlowModFailed
        }
        else if t == OfpErrorType::GroupModFailed as u16 {
            OfpErrorType::GroupModFailed
        }
        else if t == OfpErrorType::Experimenter as u16 {
            OfpErrorType::Experimenter
        }
        else {
            return write!(f, "OpenFlow Error: type({}), code({})", self.typ, self.code);
        };
        write!(f, "OpenFlow Error: {:?}, code({})", typ, self.code)
    }
}

/* Some getters */

impl OfpHeader {
    /// Gets the packet's OpenFlow version
    pub fn version(&self) -> u8 {
        self.version
    }
    /// Gets this packet's `OfpType`'s numerical respresentation.
    pub fn typ(&self) -> u8 {
        self.typ
    }
    /// Gets the packet's transaction id
    pub fn xid(&self) -> u32 {
        self.xid
    }
}
impl OfpSwitchFeatures {
    /// Gets the datapath unique ID
    pub fn datapath_id(&self) -> DatapathId {
        DatapathId(self.datapath_id)
    }
    /// Gets the number of packets the switch can buffer
    pub fn n_buffers(&self) -> u32 {
        self.n_buffers
    }
}
impl OfpEchoRequest {
    /// Gets the message's content
    pub fn arbitrary(self) -> Vec<u8> {
        self.arbitrary
    }
}
impl OfpPacketIn {
    pub fn version(&self) -> OfpVersion {
        self.version
    }
    /// Gets the id of the switch buffer holding the packet, if any
    pub fn buffer_id(&self) -> Option<u32> {
        if self.buffer_id == OFP_NO_BUFFER {
            None
        }
        else {
            Some(self.buffer_id)
        }
    }
    pub fn match_field(&self) -> &OfpMatch {
        &self.match_field
    }
    /// Gets the Ethernet frame
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Determines the ingress port of the packet.
    /// Up to OpenFlow 1.1 it is part of the packet-in message itself,
    /// later versions carry it in the match.
    pub fn in_port(&self) -> u32 {
        if self.version < OfpVersion::Of12 {
            self.in_port
        }
        else {
            self.match_field.in_port().unwrap_or(OFPP_ANY)
        }
    }
}
impl OfpPortStatus {
    pub fn reason(&self) -> u8 {
        self.reason
    }
    pub fn port_no(&self) -> u32 {
        self.desc.port_no
    }
    /// Checks for the port being removed, administratively down or without link
    pub fn is_down(&self) -> bool {
        self.reason == OfpPortReason::Delete as u8
            || self.desc.config & OFPPC_PORT_DOWN != 0
            || self.desc.state & OFPPS_LINK_DOWN != 0
    }
}

/// Description of a switch as reported by a `OfpMultipartType::Desc` reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwitchDescription {
    pub manufacturer: String,
    pub hardware: String,
    pub software: String,
    pub serial_num: String,
    pub datapath: String,
}

/// An OpenFlow Echo Request
#[derive(Debug)]
pub struct OfpEchoRequest {
    arbitrary: Vec<u8>,
}

/// An OpenFlow Echo Reply
#[derive(Debug)]
pub struct OfpEchoReply {
    arbitrary: Vec<u8>,
}

/// An OpenFlow TLV (Type, Length, Value) for
/// the OpenFlow Extensible Match format
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct OfpOxmTlv {
    /// Header field
    field: OxmField,
    /// Header hasmask
    hasmask: bool,
    /// Body
    body: Vec<u8>,
}

/* Copyright (c) 2008 The Board of Trustees of The Leland Stanford Junior University
 * Copyright (c) 2011, 2012 Open Networking Foundation
 *
 * We are making the OpenFlow specification and associated documentation
 * (Software) available for public use and benefit with the expectation
 * that others will use, modify and enhance the Software and contribute
 * those enhancements back to the community. However, since we would
 * like to make the Software available for broadest use, with as few
 * restrictions as possible permission is hereby granted, free of
 * charge, to any person obtaining a copy of this Software to deal in
 * the Software under the copyrights without restriction, including
 * without limitation the rights to use, copy, modify, merge, publish,
 * distribute, sublicense, and/or sell copies of the Software, and to
 * permit persons to whom the Software is furnished to do so, subject to
 * the following conditions:
 *
 * The above copyright notice and this permission notice shall be
 * included in all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
 * EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
 * MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT.  IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
 * BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
 * ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
 * CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 *
 * The name and trademarks of copyright holder(s) may NOT be used in
 * advertising or publicity pertaining to the Software or any
 * derivatives without specific, written prior permission.
 */

/// The version number this controller speaks on the wire.
///
/// The most significant bit in the version field is reserved and must be set to zero.
pub const OFP_VERSION: u8 = 0x04;

/// Official IANA registered port for OpenFlow.
pub const OFP_TCP_PORT: u16 = 6653;

/// Maximum number of physical and logical switch ports. Ports are numbered starting from 1.
pub const OFPP_MAX: u32 = 0xffff_ff00;
/// Send the packet out the input port.
pub const OFPP_IN_PORT: u32 = 0xffff_fff8;
/// All physical ports in VLAN, except input port and those blocked or link down.
pub const OFPP_FLOOD: u32 = 0xffff_fffb;
/// Send to controller.
pub const OFPP_CONTROLLER: u32 = 0xffff_fffd;
/// Special value used in some requests when no port is specified (i.e. wildcarded).
pub const OFPP_ANY: u32 = 0xffff_ffff;

/// Wildcard table used for table config, flow stats and flow deletes.
pub const OFPTT_ALL: u8 = 0xff;

/// Wildcard group used only for flow stats requests and group deletes.
pub const OFPG_ANY: u32 = 0xffff_ffff;

/// Maximum `max_len` value which can be used to request a specific byte length.
pub const OFPCML_MAX: u16 = 0xffe5;
/// Indicates that no buffering should be applied and the whole packet is to be sent to the controller.
pub const OFPCML_NO_BUFFER: u16 = 0xffff;

/// Bit that indicate that a VLAN id is set.
pub const OFPVID_PRESENT: u16 = 0x1000;

/// Port is administratively down.
pub const OFPPC_PORT_DOWN: u32 = 1 << 0;
/// No physical link present.
pub const OFPPS_LINK_DOWN: u32 = 1 << 0;

/// A message's type, the most fundamental to
/// distinguish information between messages
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum OfpType {
    /* Immutable messages. */
    /// Symmetric message
    Hello = 0,
    /// Symmetric message
    Error = 1,
    /// Symmetric message
    EchoRequest = 2,
    /// Symmetric message
    EchoReply = 3,

    /* Switch configuration messages. */
    /// Controller/switch message
    FeaturesRequest = 5,
    /// Controller/switch message
    FeaturesReply = 6,

    /* Asynchronous messages. */
    /// Async message
    PacketIn = 10,
    /// Async message
    FlowRemoved = 11,
    /// Async message
    PortStatus = 12,

    /* Controller command messages. */
    /// Controller/switch message
    PacketOut = 13,
    /// Controller/switch message
    FlowMod = 14,
    /// Controller/switch message
    GroupMod = 15,

    /* Multipart messages. */
    /// Controller/switch message
    MultipartRequest = 18,
    /// Controller/switch message
    MultipartReply = 19,

    /* Barrier messages. */
    /// Controller/switch message
    BarrierRequest = 20,
    /// Controller/switch message
    BarrierReply = 21,
}

/// Header on all OpenFlow packets.
#[derive(Debug, PartialEq)]
pub struct OfpHeader {
    /// OFP_VERSION.
    version: u8,
    /// This packet's OfpType.
    typ: u8,
    /// This packet's length including this OfpHeader.
    length: u16,
    /// Transaction id associated with this packet.
    /// Replies use the same id as was in the request
    /// to facilitate pairing.
    xid: u32,
}

/// Switch features.
#[derive(Debug, PartialEq)]
pub struct OfpSwitchFeatures {
    /// Datapath unique ID. The lower 48-bits are for
    /// a MAC address, while the upper 16-bits are
    /// implementer-defined.
    datapath_id: u64,
    /// Max packets buffered at once.
    n_buffers: u32,
    /// Number of tables supported by datapath.
    n_tables: u8,
    /// Identify auxiliary connections
    auxiliary_id: u8,
    /// Align to 64-bits.
    pad: [u8; 2],

    /* Features. */
    /// Bitmap of support OfpCapabilities.
    capabilities: u32,
    reserved: u32,
}

/* ## -------------------------- ## */
/* ## OpenFlow Extensible Match. ## */
/* ## -------------------------- ## */

/// The match type indicates the match structure (set of fields that compose the match) in use.
///
/// The match type is placed in the type field at the beginning
/// of all match structures. The "OpenFlow Extensible Match" type corresponds
/// to OXM TLV format described below and must be supported by all OpenFlow
/// switches. Extensions that define other match types may be published on the
/// ONF wiki. Support for extensions is optional.
pub enum OfpMatchType {
    /// OpenFlow Extensible Match
    Oxm = 1,
}

/// Fields to match against flows
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct OfpMatch {
    /// One of OfpMatchType
    typ: u16,
    // length(): Length of OfpMatch (excluding padding)
    /* Followed by:
     *   - Exactly (length - 4) (possibly 0) bytes containing OXM TLVs, then
     *   - Exactly ((length + 7)/8*8 - length) (between 0 and 7) bytes of
     *     all-zero bytes
     * In summary, OfpMatch is padded as needed, to make its overall size
     * a multiple of 8, to preserve alignment in structures using it.
     */
    /// 0 or more OXM match fields
    oxm_fields: Vec<OfpOxmTlv>,
    // Zero bytes - see above for sizing
}

impl Default for OfpMatch {
    fn default() -> Self {
        OfpMatch::new()
    }
}

impl OfpMatch {
    /// Gets the body of the given field, if it is part of this match
    pub fn get(&self, field: OxmField) -> Option<&[u8]> {
        self.oxm_fields
            .iter()
            .find(|tlv| tlv.field == field)
            .map(|tlv| &tlv.body[..])
    }

    /// Checks if the given field is part of this match
    pub fn is_exact(&self, field: OxmField) -> bool {
        self.get(field).is_some()
    }

    /// Gets the exactly matched input port
    pub fn in_port(&self) -> Option<u32> {
        self.get(OxmField::InPort)
            .filter(|b| b.len() == 4)
            .map(NetworkEndian::read_u32)
    }

    /// Gets the exactly matched VLAN id without the `OFPVID_PRESENT` bit
    pub fn vlan_vid(&self) -> Option<u16> {
        self.get(OxmField::VlanVid)
            .filter(|b| b.len() == 2)
            .map(|b| NetworkEndian::read_u16(b) & !OFPVID_PRESENT)
    }

    /// Gets the fields in order of insertion
    pub fn fields(&self) -> Vec<OxmField> {
        self.oxm_fields.iter().map(|tlv| tlv.field).collect()
    }

    /// Sets a field, replacing an earlier value of the same field.
    pub fn set(&mut self, oxm_tlv: OfpOxmTlv) -> &mut OfpMatch {
        match self.oxm_fields.iter().position(|t| t.field == oxm_tlv.field) {
            Some(i) => self.oxm_fields[i] = oxm_tlv,
            None => self.oxm_fields.push(oxm_tlv),
        }
        self
    }
}

/// Construction of an OXM TLV.
impl OfpOxmTlv {
    fn new(field: OxmField, hasmask: bool, body: Vec<u8>) -> OfpOxmTlv {
        OfpOxmTlv {
            hasmask,
            field,
            body,
        }
    }

    /// Gets the field this TLV matches on
    pub fn field(&self) -> OxmField {
        self.field
    }

    /// Gets the TLV's value (and mask, if it has one)
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// OpenFlow port on which the packet was received.
    /// May be a physical port, a logical port, or the reserved port OFPP_LOCAL
    /// Prereqs: None.
    /// Format: 32-bit integer in network byte order.
    pub fn new_in_port(in_port: u32) -> OfpOxmTlv {
        let mut port_bytes = vec![0; 4];
        NetworkEndian::write_u32(&mut port_bytes, in_port);
        OfpOxmTlv::new(OxmField::InPort, false, port_bytes)
    }

    /// Ethernet source or destination address.
    /// Prereqs: None.
    /// Format: 48-bit Ethernet MAC address.
    pub fn new_eth(mac: MacAddr, endpoint: ProtocolEndpoint) -> OfpOxmTlv {
        let field = match endpoint {
            ProtocolEndpoint::Src => OxmField::EthSrc,
            ProtocolEndpoint::Dst => OxmField::EthDst,
        };
        OfpOxmTlv::new(field, false, mac.octets().to_vec())
    }

    /// Packet's Ethernet type.
    /// Prereqs: None.
    /// Format: 16-bit integer in network byte order.
    pub fn new_eth_type(eth_type: u16) -> OfpOxmTlv {
        let mut type_bytes = vec![0; 2];
        NetworkEndian::write_u16(&mut type_bytes, eth_type);
        OfpOxmTlv::new(OxmField::EthType, false, type_bytes)
    }

    /// 802.1Q VLAN id. `OFPVID_PRESENT` is added to `vid`.
    /// Prereqs: None.
    /// Format: 16-bit integer in network byte order with bit 13 indicating
    /// presence of VLAN header and 3 most-significant bits forced to 0.
    pub fn new_vlan_vid(vid: u16) -> OfpOxmTlv {
        let mut vid_bytes = vec![0; 2];
        NetworkEndian::write_u16(&mut vid_bytes, (vid & 0x0fff) | OFPVID_PRESENT);
        OfpOxmTlv::new(OxmField::VlanVid, false, vid_bytes)
    }

    /// Matches packets without a VLAN tag.
    pub fn new_vlan_none() -> OfpOxmTlv {
        OfpOxmTlv::new(OxmField::VlanVid, false, vec![0, 0])
    }

    /// The "protocol" byte in the IP header.
    /// Prereqs: OxmField::EthType must be either 0x0800 or 0x86dd.
    /// Format: 8-bit integer.
    pub fn new_ip_proto(proto: u8) -> OfpOxmTlv {
        OfpOxmTlv::new(OxmField::IpProto, false, vec![proto])
    }

    /// The source or destination address in the IPv4 header.
    /// Prereqs: OxmField::EthType must match 0x0800 exactly.
    /// Format: 32-bit integer in network byte order.
    pub fn new_ipv4(ip: Ipv4Addr, endpoint: ProtocolEndpoint) -> OfpOxmTlv {
        let field = match endpoint {
            ProtocolEndpoint::Src => OxmField::Ipv4Src,
            ProtocolEndpoint::Dst => OxmField::Ipv4Dst,
        };
        OfpOxmTlv::new(field, false, ip.octets().to_vec())
    }

    /// The source or destination address in the IPv6 header.
    /// Prereqs: OxmField::EthType must match 0x86dd exactly.
    /// Format: 128-bit IPv6 address.
    pub fn new_ipv6(ip: Ipv6Addr, endpoint: ProtocolEndpoint) -> OfpOxmTlv {
        let field = match endpoint {
            ProtocolEndpoint::Src => OxmField::Ipv6Src,
            ProtocolEndpoint::Dst => OxmField::Ipv6Dst,
        };
        OfpOxmTlv::new(field, false, ip.octets().to_vec())
    }

    /// The source or destination port in the TCP/UDP header.
    /// Prereqs:
    /// OxmField::EthType must be either 0x0800 or 0x86dd.
    /// OxmField::IpProto must match 6 or 17 exactly.
    /// Format: 16-bit integer in network byte order.
    pub fn new_port(proto: u8, port: u16, endpoint: ProtocolEndpoint) -> Option<OfpOxmTlv> {
        let field = match (proto, endpoint) {
            (IP_PROTO_TCP, ProtocolEndpoint::Src) => OxmField::TcpSrc,
            (IP_PROTO_TCP, ProtocolEndpoint::Dst) => OxmField::TcpDst,
            (IP_PROTO_UDP, ProtocolEndpoint::Src) => OxmField::UdpSrc,
            (IP_PROTO_UDP, ProtocolEndpoint::Dst) => OxmField::UdpDst,
            _ => return None,
        };
        let mut port_bytes = vec![0; 2];
        NetworkEndian::write_u16(&mut port_bytes, port);
        Some(OfpOxmTlv::new(field, false, port_bytes))
    }

    /// The TCP flags, either as the OpenFlow 1.5 basic field or as
    /// the Nicira extension understood by Open vSwitch 2.1 and later.
    /// Prereqs: OxmField::IpProto must match 6 exactly.
    /// Format: 16-bit integer with 4 most-significant bits forced to 0.
    pub fn new_tcp_flags(flags: u16, field: OxmField) -> OfpOxmTlv {
        let mut flag_bytes = vec![0; 2];
        NetworkEndian::write_u16(&mut flag_bytes, flags & 0x0fff);
        OfpOxmTlv::new(field, false, flag_bytes)
    }
}

/// IP protocol number of TCP
pub const IP_PROTO_TCP: u8 = 6;
/// IP protocol number of UDP
pub const IP_PROTO_UDP: u8 = 17;

/// OXM Class IDs.
/// The high order bit differentiate reserved classes from member classes.
/// Classes 0x0000 to 0x7FFF are member classes, allocated by ONF.
/// Classes 0x8000 to 0xFFFE are reserved classes, reserved for standardisation.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum OfpOxmClass {
    /// Backward compatibility with NXM
    Nxm1 = 0x0001,
    /// Basic class for OpenFlow
    OpenflowBasic = 0x8000,
}

/// OXM Flow match fields known to this controller.
/// Fields of other classes or codes are kept as `Unknown`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum OxmField {
    /// Switch input port.
    InPort,
    /// Ethernet destination address.
    EthDst,
    /// Ethernet source address.
    EthSrc,
    /// Ethernet frame type.
    EthType,
    /// VLAN id.
    VlanVid,
    /// IP protocol.
    IpProto,
    /// IPv4 source address.
    Ipv4Src,
    /// IPv4 destination address.
    Ipv4Dst,
    /// TCP source port.
    TcpSrc,
    /// TCP destination port.
    TcpDst,
    /// UDP source port.
    UdpSrc,
    /// UDP destination port.
    UdpDst,
    /// IPv6 source address.
    Ipv6Src,
    /// IPv6 destination address.
    Ipv6Dst,
    /// TCP flags (OpenFlow 1.5).
    TcpFlags,
    /// TCP flags (Nicira extension, Open vSwitch).
    OvsTcpFlags,
    /// Any other field
    Unknown(u16, u8),
}

impl OxmField {
    /// Gets the OXM class and field code
    pub fn class_and_code(&self) -> (u16, u8) {
        let basic = OfpOxmClass::OpenflowBasic as u16;
        match *self {
            OxmField::InPort => (basic, 0),
            OxmField::EthDst => (basic, 3),
            OxmField::EthSrc => (basic, 4),
            OxmField::EthType => (basic, 5),
            OxmField::VlanVid => (basic, 6),
            OxmField::IpProto => (basic, 10),
            OxmField::Ipv4Src => (basic, 11),
            OxmField::Ipv4Dst => (basic, 12),
            OxmField::TcpSrc => (basic, 13),
            OxmField::TcpDst => (basic, 14),
            OxmField::UdpSrc => (basic, 15),
            OxmField::UdpDst => (basic, 16),
            OxmField::Ipv6Src => (basic, 26),
            OxmField::Ipv6Dst => (basic, 27),
            OxmField::TcpFlags => (basic, 42),
            OxmField::OvsTcpFlags => (OfpOxmClass::Nxm1 as u16, 34),
            OxmField::Unknown(class, code) => (class, code),
        }
    }

    /// Maps an OXM class and field code
    pub fn from_class_and_code(class: u16, code: u8) -> OxmField {
        let fields = [
            OxmField::InPort,
            OxmField::EthDst,
            OxmField::EthSrc,
            OxmField::EthType,
            OxmField::VlanVid,
            OxmField::IpProto,
            OxmField::Ipv4Src,
            OxmField::Ipv4Dst,
            OxmField::TcpSrc,
            OxmField::TcpDst,
            OxmField::UdpSrc,
            OxmField::UdpDst,
            OxmField::Ipv6Src,
            OxmField::Ipv6Dst,
            OxmField::TcpFlags,
            OxmField::OvsTcpFlags,
        ];
        fields
            .iter()
            .find(|f| f.class_and_code() == (class, code))
            .cloned()
            .unwrap_or(OxmField::Unknown(class, code))
    }
}

/// Values for 'type' in `OfpErrorMsg`. These values are immutable: they will
/// not change in future versions of the protocol (although new values may be added).
#[derive(Debug)]
pub enum OfpErrorType {
    /// Hello protocol failed.
    HelloFailed = 0,
    /// Request was not understood.
    BadRequest = 1,
    /// Error in action description.
    BadAction = 2,
    /// Error in instruction list.
    BadInstruction = 3,
    /// Error in match.
    BadMatch = 4,
    /// Problem modifying flow entry.
    FlowModFailed = 5,
    /// Problem modifying group entry.
    GroupModFailed = 6,
    /// Experimenter error messages.
    Experimenter = 0xffff,
}

/// `OfpErrorMsg` 'code' values for `OfpErrorType::HelloFailed`.
///
/// 'data' contains an ASCII text string that may give failure details.
pub enum OfpHelloFailedCode {
    /// No compatible version.
    Incompatible = 0,
}

/// `OfpErrorMsg` 'code' values for `OfpErrorType::BadRequest`.
///
/// 'data' contains at least the first 64 bytes of the failed request.
#[derive(Debug)]
pub enum OfpBadRequestCode {
    /// ofp_header.version not supported.
    BadVersion = 0,
    /// ofp_header.type not supported.
    BadType = 1,
    /// Wrong request length for type.
    BadLen = 6,
}

/* ## ----------------- ## */
/* ## OpenFlow Actions. ## */
/* ## ----------------- ## */

/// The type of an OpenFlow Action
pub enum OfpActionType {
    /// Output to switch port.
    Output = 0,
    /// Pop the outer VLAN tag.
    PopVlan = 18,
    /// Apply group.
    Group = 22,
    /// Set a header field using OXM TLV format.
    SetField = 25,
}

/// An OpenFlow action.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum OfpAction {
    /// Sends packets out `port`. A `max_len` of zero means
    /// no bytes of the packet should be sent to the controller.
    Output { port: u32, max_len: u16 },
    /// Pops the outer VLAN tag.
    PopVlan,
    /// Processes the packet through the group.
    Group(u32),
    /// Overwrites the header field described by the TLV.
    SetField(OfpOxmTlv),
}

impl OfpAction {
    /// Constructs an output action that sends whole packets to the controller
    pub fn output(port: u32) -> OfpAction {
        OfpAction::Output {
            port,
            max_len: OFPCML_NO_BUFFER,
        }
    }
}

/* ## ---------------------- ## */
/* ## OpenFlow Instructions. ## */
/* ## ---------------------- ## */

/// The type of an OpenFlow Instruction
pub enum OfpInstructionType {
    /// Setup the next table in the lookup pipeline
    GotoTable = 1,
    /// Write the action(s) onto the datapath action set
    WriteActions = 3,
    /// Applies the action(s) immediately
    ApplyActions = 4,
}

/// An OpenFlow instruction.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum OfpInstruction {
    GotoTable(u8),
    WriteActions(Vec<OfpAction>),
    ApplyActions(Vec<OfpAction>),
}

/* ## --------------------------- ## */
/* ## OpenFlow Flow Modification. ## */
/* ## --------------------------- ## */

/// The command that is embedded in a flow mod message
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum OfpFlowModCommand {
    /// New flow.
    Add = 0,
    /// Modify all matching flows.
    Modify = 1,
    /// Modify entry strictly matching wildcards and priority.
    ModifyStrict = 2,
    /// Delete all matching flows.
    Delete = 3,
    /// Delete entry strictly matching wildcards and priority.
    DeleteStrict = 4,
}

impl OfpFlowModCommand {
    pub fn from_wire(command: u8) -> Option<OfpFlowModCommand> {
        match command {
            0 => Some(OfpFlowModCommand::Add),
            1 => Some(OfpFlowModCommand::Modify),
            2 => Some(OfpFlowModCommand::ModifyStrict),
            3 => Some(OfpFlowModCommand::Delete),
            4 => Some(OfpFlowModCommand::DeleteStrict),
            _ => None,
        }
    }

    /// Checks for `Delete` or `DeleteStrict`
    pub fn is_delete(&self) -> bool {
        *self == OfpFlowModCommand::Delete || *self == OfpFlowModCommand::DeleteStrict
    }
}

/// Send flow removed message when flow expires or is deleted.
pub const OFPFF_SEND_FLOW_REM: u16 = 1 << 0;

/// Value used in `idle_timeout` and `hard_timeout` to indicate that the entry is permanent.
pub const OFP_FLOW_PERMANENT: u16 = 0;

/// By default, choose a priority in the middle.
pub const OFP_DEFAULT_PRIORITY: u16 = 0x8000;

/// Flow setup and teardown (controller -> datapath).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct OfpFlowMod {
    /// The version of the switch this is built for.
    version: OfpVersion,
    /// Opaque controller-issued identifier.
    cookie: u64,
    /// Mask used to restrict the cookie bits
    /// that must match when the command is
    /// OfpFlowModCommand::Modify* or OfpFlowModCommand::Delete*.
    /// None for OpenFlow 1.0, which has no cookie mask.
    cookie_mask: Option<u64>,
    /// ID of the table to put the flow in.
    /// None for OpenFlow 1.0, which has no table id.
    /// For OfpFlowModCommand::Delete* commands
    /// None addresses all tables.
    table_id: Option<u8>,
    /// One of OfpFlowModCommand.
    command: OfpFlowModCommand,
    /// Idle time before discarding (seconds).
    idle_timeout: u16,
    /// Max time before discarding (seconds).
    hard_timeout: u16,
    /// Priority level of flow entry.
    priority: u16,
    /// Buffered packet to apply to, or
    /// OFP_NO_BUFFER.
    /// Not meaningful for OfpFlowModCommand::Delete*.
    buffer_id: u32,
    /// For OfpFlowModCommand::Delete* commands, require
    /// matching entries to include this as an
    /// output port.  A value of OFPP_ANY
    /// indicates no restriction.
    out_port: u32,
    /// For OfpFlowModCommand::Delete* commands, require
    /// matching entries to include this as an
    /// output group.  A value of OFPG_ANY
    /// indicates no restriction.
    out_group: u32,
    /// Bitmap of OFPFF_* flags.
    flags: u16,
    /// Fields to match. Variable size.
    match_field: OfpMatch,

    /* The variable size and padded match is always followed by instructions. */
    /// Instruction set - 0 or more.
    /// The length of the instruction
    /// set is inferred from the
    /// length field in the header.
    instructions: Vec<OfpInstruction>,
}

impl OfpFlowMod {
    pub fn version(&self) -> OfpVersion {
        self.version
    }
    pub fn command(&self) -> OfpFlowModCommand {
        self.command
    }
    pub fn cookie(&self) -> u64 {
        self.cookie
    }
    pub fn cookie_mask(&self) -> Option<u64> {
        self.cookie_mask
    }
    pub fn table_id(&self) -> Option<u8> {
        self.table_id
    }
    pub fn idle_timeout(&self) -> u16 {
        self.idle_timeout
    }
    pub fn hard_timeout(&self) -> u16 {
        self.hard_timeout
    }
    pub fn priority(&self) -> u16 {
        self.priority
    }
    pub fn buffer_id(&self) -> u32 {
        self.buffer_id
    }
    pub fn out_port(&self) -> u32 {
        self.out_port
    }
    pub fn flags(&self) -> u16 {
        self.flags
    }
    pub fn match_field(&self) -> &OfpMatch {
        &self.match_field
    }
    pub fn instructions(&self) -> &[OfpInstruction] {
        &self.instructions
    }

    /// Gets the actions of the apply-actions instruction; empty means drop.
    pub fn actions(&self) -> &[OfpAction] {
        for instr in &self.instructions {
            if let OfpInstruction::ApplyActions(ref actions) = *instr {
                return actions;
            }
        }
        &[]
    }
}

/// A reserved buffer ID to express that no buffer is assigned
pub const OFP_NO_BUFFER: u32 = 0xffff_ffff;

/// `OfpErrorMsg` 'code' values for `OfpErrorType::FlowModFailed`.
///
/// 'data' contains at least the first 64 bytes of the failed request.
#[derive(Debug)]
pub enum OfpFlowModFailedCode {
    /// Flow not added because table was full.
    TableFull = 1,
}

/// Error message (datapath -> controller).
#[derive(Debug)]
pub struct OfpErrorMsg {
    typ: u16,
    code: u16,
    /// Variable-length data. Interpreted based on the type and code. No padding.
    data: Vec<u8>,
}

/* ## --------------------- ## */
/* ## Packet-In / Packet-Out ## */
/* ## --------------------- ## */

/// Why is this packet being sent to the controller?
pub enum OfpPacketInReason {
    /// No matching flow (table-miss flow entry).
    NoMatch = 0,
    /// Action explicitly output to controller.
    Action = 1,
}

/// Packet received on port (datapath -> controller).
#[derive(Debug, Clone, PartialEq)]
pub struct OfpPacketIn {
    /// The version of the switch that sent this.
    version: OfpVersion,
    /// ID assigned by datapath.
    buffer_id: u32,
    /// Full length of frame.
    total_len: u16,
    /// Port on which frame was received (OpenFlow 1.0 and 1.1 only).
    in_port: u32,
    /// Reason packet is being sent (one of OFPR_*)
    reason: u8,
    /// ID of the table that was looked up
    table_id: u8,
    /// Cookie of the flow entry that was looked up.
    cookie: u64,
    /// Packet metadata. Variable size.
    match_field: OfpMatch,
    /// Ethernet frame
    data: Vec<u8>,
}

/// Send packet (controller -> datapath).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct OfpPacketOut {
    version: OfpVersion,
    /// ID assigned by datapath (OFP_NO_BUFFER if none).
    buffer_id: u32,
    /// Packet's input port or OFPP_CONTROLLER.
    in_port: u32,
    /// Action list - 0 or more.
    actions: Vec<OfpAction>,
    /// Packet data. Only meaningful if buffer_id == OFP_NO_BUFFER.
    data: Vec<u8>,
}

impl OfpPacketOut {
    pub fn buffer_id(&self) -> u32 {
        self.buffer_id
    }
    pub fn in_port(&self) -> u32 {
        self.in_port
    }
    pub fn actions(&self) -> &[OfpAction] {
        &self.actions
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Gets the ports of all output actions
    pub fn output_ports(&self) -> Vec<u32> {
        self.actions
            .iter()
            .filter_map(|a| match *a {
                OfpAction::Output { port, .. } => Some(port),
                _ => None,
            })
            .collect()
    }
}

/* ## ---------------------------- ## */
/* ## OpenFlow Group Modification. ## */
/* ## ---------------------------- ## */

/// Group commands
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum OfpGroupModCommand {
    /// New group.
    Add = 0,
    /// Delete all matching groups.
    Delete = 2,
}

/// Group types.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum OfpGroupType {
    /// All (multicast/broadcast) group.
    All = 0,
    /// Indirect group.
    Indirect = 2,
}

/// Bucket for use in groups.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct OfpBucket {
    pub actions: Vec<OfpAction>,
}

/// Group setup and teardown (controller -> datapath).
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct OfpGroupMod {
    version: OfpVersion,
    command: OfpGroupModCommand,
    group_type: OfpGroupType,
    group_id: u32,
    buckets: Vec<OfpBucket>,
}

impl OfpGroupMod {
    pub fn command(&self) -> OfpGroupModCommand {
        self.command
    }
    pub fn group_type(&self) -> OfpGroupType {
        self.group_type
    }
    pub fn group_id(&self) -> u32 {
        self.group_id
    }
    pub fn buckets(&self) -> &[OfpBucket] {
        &self.buckets
    }
}

/* ## ------------------ ## */
/* ## Ports and multipart ## */
/* ## ------------------ ## */

/// What changed about the physical port
pub enum OfpPortReason {
    /// The port was added.
    Add = 0,
    /// The port was removed.
    Delete = 1,
    /// Some attribute of the port has changed.
    Modify = 2,
}

/// Description of a port
#[derive(Debug, Clone, PartialEq)]
pub struct OfpPort {
    port_no: u32,
    hw_addr: MacAddr,
    name: String,
    /// Bitmap of OFPPC_* flags.
    config: u32,
    /// Bitmap of OFPPS_* flags.
    state: u32,
}

impl OfpPort {
    pub fn port_no(&self) -> u32 {
        self.port_no
    }
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A physical port has changed in the datapath
#[derive(Debug, Clone, PartialEq)]
pub struct OfpPortStatus {
    /// One of OfpPortReason.
    reason: u8,
    desc: OfpPort,
}

/// The types of multipart requests and replies used here
pub enum OfpMultipartType {
    /// Description of this OpenFlow switch.
    Desc = 0,
    /// Port description.
    PortDesc = 13,
}

/// A multipart request body-less query
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct OfpMultipartRequest {
    typ: u16,
}

impl OfpMultipartRequest {
    pub fn new_desc() -> OfpMultipartRequest {
        OfpMultipartRequest {
            typ: OfpMultipartType::Desc as u16,
        }
    }

    pub fn new_port_desc() -> OfpMultipartRequest {
        OfpMultipartRequest {
            typ: OfpMultipartType::PortDesc as u16,
        }
    }
}

/// The multipart replies this controller understands
#[derive(Debug, PartialEq)]
pub enum OfpMultipartReply {
    Desc(SwitchDescription),
    PortDesc(Vec<OfpPort>),
    Other(u16),
}

/// Any message the forwarding core sends to a switch
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum OfpMessage {
    FlowMod(OfpFlowMod),
    PacketOut(OfpPacketOut),
    GroupMod(OfpGroupMod),
    BarrierRequest,
    MultipartRequest(OfpMultipartRequest),
}

impl OfpMessage {
    pub fn typ(&self) -> OfpType {
        match *self {
            OfpMessage::FlowMod(_) => OfpType::FlowMod,
            OfpMessage::PacketOut(_) => OfpType::PacketOut,
            OfpMessage::GroupMod(_) => OfpType::GroupMod,
            OfpMessage::BarrierRequest => OfpType::BarrierRequest,
            OfpMessage::MultipartRequest(_) => OfpType::MultipartRequest,
        }
    }

    pub fn as_flow_mod(&self) -> Option<&OfpFlowMod> {
        match *self {
            OfpMessage::FlowMod(ref fm) => Some(fm),
            _ => None,
        }
    }

    pub fn as_packet_out(&self) -> Option<&OfpPacketOut> {
        match *self {
            OfpMessage::PacketOut(ref po) => Some(po),
            _ => None,
        }
    }
}

impl From<OfpFlowMod> for OfpMessage {
    fn from(fm: OfpFlowMod) -> Self {
        OfpMessage::FlowMod(fm)
    }
}

impl From<OfpPacketOut> for OfpMessage {
    fn from(po: OfpPacketOut) -> Self {
        OfpMessage::PacketOut(po)
    }
}

impl From<OfpGroupMod> for OfpMessage {
    fn from(gm: OfpGroupMod) -> Self {
        OfpMessage::GroupMod(gm)
    }
}
