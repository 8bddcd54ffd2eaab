/*!
All serialization and construction routines for the OpenFlow message primitives

Use the trait `OfpPacket` for serialization implementations of messages
that are sent. Other primitives that are part of a message should
implement a serialize funtion that operates on a given byte stream.
*/

use byteorder::{NetworkEndian, WriteBytesExt};
use openflow::messages::*;
use std::io;
use std::io::Write;
use std::mem::size_of;

impl OfpHeader {
    /// Constructs an `OfpHeader`
    pub fn new(typ: OfpType, xid: u32) -> OfpHeader {
        OfpHeader {
            version: OFP_VERSION,
            typ: typ as u8,
            length: OfpHeader::header_length() as u16,
            xid,
        }
    }

    /// Returns the fixed header length of 8 (in byte)
    pub fn header_length() -> usize {
        size_of::<OfpHeader>()
    }

    /// Serializes this header on the given stream
    pub fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_all(&[self.version, self.typ])?;
        stream.write_u16::<NetworkEndian>(self.length)?;
        stream.write_u32::<NetworkEndian>(self.xid)
    }
}

fn pad_to_8(len: usize) -> usize {
    (len + 7) / 8 * 8 - len
}

impl OfpMatch {
    /// Constructs an empty match.
    pub fn new() -> OfpMatch {
        OfpMatch {
            typ: OfpMatchType::Oxm as u16,
            oxm_fields: vec![],
        }
    }

    /// Adds a single match field to the match.
    pub fn add_tlv(&mut self, oxm_tlv: OfpOxmTlv) -> &mut OfpMatch {
        self.oxm_fields.push(oxm_tlv);
        self
    }

    /// Length of OfpMatch (excluding padding)
    pub(crate) fn length(&self) -> usize {
        let mut length = 4;
        for oxm in &self.oxm_fields {
            length += oxm.length();
        }
        length
    }

    /// Padding of OfpMatch
    fn pad_len(&self) -> usize {
        pad_to_8(self.length())
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.length() as u16)?;
        for oxm in &self.oxm_fields {
            oxm.serialize(stream)?;
        }
        // make its overall size a multiple of 8; fill with zeros
        stream.write_all(&vec![0; self.pad_len()])
    }
}

impl OfpOxmTlv {
    fn length(&self) -> usize {
        4 + self.body.len()
    }

    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let (class, code) = self.field.class_and_code();
        let hasmask_u32 = if self.hasmask { 1 } else { 0 };
        let header = (u32::from(class) << 16) | (u32::from(code) << 9) | (hasmask_u32 << 8)
            | self.body.len() as u32;
        stream.write_u32::<NetworkEndian>(header)?;
        stream.write_all(&self.body)
    }
}

impl OfpAction {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        match *self {
            OfpAction::Output { port, max_len } => {
                stream.write_u16::<NetworkEndian>(OfpActionType::Output as u16)?;
                stream.write_u16::<NetworkEndian>(16)?;
                stream.write_u32::<NetworkEndian>(port)?;
                stream.write_u16::<NetworkEndian>(max_len)?;
                stream.write_all(&[0; 6])
            }
            OfpAction::PopVlan => {
                stream.write_u16::<NetworkEndian>(OfpActionType::PopVlan as u16)?;
                stream.write_u16::<NetworkEndian>(8)?;
                stream.write_all(&[0; 4])
            }
            OfpAction::Group(group_id) => {
                stream.write_u16::<NetworkEndian>(OfpActionType::Group as u16)?;
                stream.write_u16::<NetworkEndian>(8)?;
                stream.write_u32::<NetworkEndian>(group_id)
            }
            OfpAction::SetField(ref tlv) => {
                let len = 4 + tlv.length();
                let pad = pad_to_8(len);
                stream.write_u16::<NetworkEndian>(OfpActionType::SetField as u16)?;
                stream.write_u16::<NetworkEndian>((len + pad) as u16)?;
                tlv.serialize(stream)?;
                stream.write_all(&vec![0; pad])
            }
        }
    }
}

fn serialize_actions<S: Write>(actions: &[OfpAction], stream: &mut S) -> io::Result<()> {
    for action in actions {
        action.serialize(stream)?;
    }
    Ok(())
}

impl OfpInstruction {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let (typ, actions) = match *self {
            OfpInstruction::GotoTable(table_id) => {
                stream.write_u16::<NetworkEndian>(OfpInstructionType::GotoTable as u16)?;
                stream.write_u16::<NetworkEndian>(8)?;
                return stream.write_all(&[table_id, 0, 0, 0]);
            }
            OfpInstruction::WriteActions(ref a) => (OfpInstructionType::WriteActions, a),
            OfpInstruction::ApplyActions(ref a) => (OfpInstructionType::ApplyActions, a),
        };
        let buf = &mut vec![];
        serialize_actions(actions, buf)?;
        stream.write_u16::<NetworkEndian>(typ as u16)?;
        stream.write_u16::<NetworkEndian>(8 + buf.len() as u16)?;
        stream.write_all(&[0; 4])?;
        stream.write_all(buf)
    }
}

impl OfpFlowMod {
    /// Constructs an `OfpFlowMod` for a switch of the given version.
    /// The other fields default to a permanent, unbuffered flow entry
    /// with default priority, no cookie and an empty match.
    pub fn new(version: OfpVersion, command: OfpFlowModCommand) -> OfpFlowMod {
        OfpFlowMod {
            version,
            cookie: 0,
            cookie_mask: None,
            table_id: None,
            command,
            idle_timeout: OFP_FLOW_PERMANENT,
            hard_timeout: OFP_FLOW_PERMANENT,
            priority: OFP_DEFAULT_PRIORITY,
            buffer_id: OFP_NO_BUFFER,
            out_port: OFPP_ANY,
            out_group: OFPG_ANY,
            flags: 0,
            match_field: OfpMatch::new(),
            instructions: vec![],
        }
    }

    pub fn with_cookie(mut self, cookie: u64) -> OfpFlowMod {
        self.cookie = cookie;
        self
    }

    /// Sets the cookie mask. OpenFlow 1.0 has no cookie mask, so it is ignored there.
    pub fn with_cookie_mask(mut self, mask: u64) -> OfpFlowMod {
        if self.version > OfpVersion::Of10 {
            self.cookie_mask = Some(mask);
        }
        self
    }

    /// Sets the table id. OpenFlow 1.0 has no table id, so it is ignored there.
    pub fn with_table_id(mut self, table_id: u8) -> OfpFlowMod {
        if self.version > OfpVersion::Of10 {
            self.table_id = Some(table_id);
        }
        self
    }

    pub fn with_timeouts(mut self, idle_timeout: u16, hard_timeout: u16) -> OfpFlowMod {
        self.idle_timeout = idle_timeout;
        self.hard_timeout = hard_timeout;
        self
    }

    pub fn with_priority(mut self, priority: u16) -> OfpFlowMod {
        self.priority = priority;
        self
    }

    pub fn with_out_port(mut self, out_port: u32) -> OfpFlowMod {
        self.out_port = out_port;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> OfpFlowMod {
        self.flags = flags;
        self
    }

    pub fn with_match(mut self, match_field: OfpMatch) -> OfpFlowMod {
        self.match_field = match_field;
        self
    }

    pub fn with_instructions(mut self, instructions: Vec<OfpInstruction>) -> OfpFlowMod {
        self.instructions = instructions;
        self
    }

    /// Replaces the instructions by a single apply-actions instruction.
    /// An empty list of actions drops matching packets.
    pub fn with_actions(self, actions: Vec<OfpAction>) -> OfpFlowMod {
        if actions.is_empty() {
            self.with_instructions(vec![])
        }
        else {
            self.with_instructions(vec![OfpInstruction::ApplyActions(actions)])
        }
    }

    fn wire_table_id(&self) -> u8 {
        match self.table_id {
            Some(t) => t,
            None if self.command.is_delete() => OFPTT_ALL,
            None => 0,
        }
    }
}

impl OfpPacketOut {
    /// Constructs an `OfpPacketOut`. `data` is only sent if no buffer id is given.
    pub fn new(
        version: OfpVersion,
        buffer_id: Option<u32>,
        in_port: u32,
        actions: Vec<OfpAction>,
        data: Vec<u8>,
    ) -> OfpPacketOut {
        let (buffer_id, data) = match buffer_id {
            Some(id) => (id, vec![]),
            None => (OFP_NO_BUFFER, data),
        };
        OfpPacketOut {
            version,
            buffer_id,
            in_port,
            actions,
            data,
        }
    }
}

impl OfpGroupMod {
    pub fn new(
        version: OfpVersion,
        command: OfpGroupModCommand,
        group_type: OfpGroupType,
        group_id: u32,
        buckets: Vec<OfpBucket>,
    ) -> OfpGroupMod {
        OfpGroupMod {
            version,
            command,
            group_type,
            group_id,
            buckets,
        }
    }
}

impl OfpBucket {
    fn serialize<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let buf = &mut vec![];
        serialize_actions(&self.actions, buf)?;
        stream.write_u16::<NetworkEndian>(16 + buf.len() as u16)?;
        // weight
        stream.write_u16::<NetworkEndian>(0)?;
        stream.write_u32::<NetworkEndian>(OFPP_ANY)?;
        stream.write_u32::<NetworkEndian>(OFPG_ANY)?;
        stream.write_all(&[0; 4])?;
        stream.write_all(buf)
    }
}

/// An OpenFlow packet. Must be implemented for all OpenFlow messsages that are sent.
pub trait OfpPacket {
    /// Constructs an OfpHeader with the given body length and transaction ID
    fn header(&self, body_length: usize, xid: u32) -> OfpHeader {
        OfpHeader {
            version: OFP_VERSION,
            typ: Self::typ() as u8,
            length: (OfpHeader::header_length() + body_length) as u16,
            xid,
        }
    }

    /// Returns the packet's type
    fn typ() -> OfpType;

    /// Serializes this packet with network byte order.
    /// The xid is used as its header's transaction id.
    fn serialize<S: Write>(&self, stream: &mut S, xid: u32) -> io::Result<()> {
        let mut body = vec![];
        self.serialize_body(&mut body)?;
        let header = self.header(body.len(), xid);
        trace!("Outgoing message: {:?}", header);
        header.serialize(stream)?;
        stream.write_all(&body)
    }

    /// Serializes this packet's body.
    /// Implementers have to output network byte order on the given stream.
    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()>;
}

impl OfpEchoReply {
    /// Constructs a new `OfpEchoReply` with `arbitrary` content.
    /// This should be the same as in the `OfpEchoRequest` that issued this reply.
    pub fn new(arbitrary: Vec<u8>) -> OfpEchoReply {
        OfpEchoReply { arbitrary }
    }
}
impl OfpPacket for OfpEchoReply {
    fn typ() -> OfpType {
        OfpType::EchoReply
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_all(&self.arbitrary)
    }
}

impl OfpPacket for OfpErrorMsg {
    fn typ() -> OfpType {
        OfpType::Error
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        stream.write_u16::<NetworkEndian>(self.code)?;
        stream.write_all(&self.data)
    }
}

impl OfpPacket for OfpFlowMod {
    fn typ() -> OfpType {
        OfpType::FlowMod
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u64::<NetworkEndian>(self.cookie)?;
        stream.write_u64::<NetworkEndian>(self.cookie_mask.unwrap_or(0))?;
        stream.write_all(&[self.wire_table_id(), self.command as u8])?;
        stream.write_u16::<NetworkEndian>(self.idle_timeout)?;
        stream.write_u16::<NetworkEndian>(self.hard_timeout)?;
        stream.write_u16::<NetworkEndian>(self.priority)?;
        stream.write_u32::<NetworkEndian>(self.buffer_id)?;
        stream.write_u32::<NetworkEndian>(self.out_port)?;
        stream.write_u32::<NetworkEndian>(self.out_group)?;
        stream.write_u16::<NetworkEndian>(self.flags)?;
        stream.write_all(&[0; 2])?;
        self.match_field.serialize(stream)?;
        for instr in &self.instructions {
            instr.serialize(stream)?;
        }
        Ok(())
    }
}

impl OfpPacket for OfpPacketOut {
    fn typ() -> OfpType {
        OfpType::PacketOut
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let actions = &mut vec![];
        serialize_actions(&self.actions, actions)?;
        stream.write_u32::<NetworkEndian>(self.buffer_id)?;
        stream.write_u32::<NetworkEndian>(self.in_port)?;
        stream.write_u16::<NetworkEndian>(actions.len() as u16)?;
        stream.write_all(&[0; 6])?;
        stream.write_all(actions)?;
        stream.write_all(&self.data)
    }
}

impl OfpPacket for OfpGroupMod {
    fn typ() -> OfpType {
        OfpType::GroupMod
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.command as u16)?;
        stream.write_all(&[self.group_type as u8, 0])?;
        stream.write_u32::<NetworkEndian>(self.group_id)?;
        for bucket in &self.buckets {
            bucket.serialize(stream)?;
        }
        Ok(())
    }
}

impl OfpPacket for OfpMultipartRequest {
    fn typ() -> OfpType {
        OfpType::MultipartRequest
    }

    fn serialize_body<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        stream.write_u16::<NetworkEndian>(self.typ)?;
        // flags
        stream.write_u16::<NetworkEndian>(0)?;
        stream.write_all(&[0; 4])
    }
}

impl OfpMessage {
    /// Serializes the wrapped message with network byte order.
    pub fn serialize<S: Write>(&self, stream: &mut S, xid: u32) -> io::Result<()> {
        match *self {
            OfpMessage::FlowMod(ref m) => m.serialize(stream, xid),
            OfpMessage::PacketOut(ref m) => m.serialize(stream, xid),
            OfpMessage::GroupMod(ref m) => m.serialize(stream, xid),
            OfpMessage::MultipartRequest(ref m) => m.serialize(stream, xid),
            OfpMessage::BarrierRequest => OfpHeader::new(OfpType::BarrierRequest, xid).serialize(stream),
        }
    }
}
