/*!
Implements an OpenFlow Controller with protocol version 0x04 compatibility.
Every connected switch is served by its own thread that answers the
handshake and keepalives and hands packet-ins, port changes and the
switch activation to the forwarding core.
*/

pub mod error;
pub mod messages;

use listener::ListenerChain;
use openflow::error::{Error, Result};
use openflow::messages::*;
use openflow::messages::deserialize::Deserialize;
use openflow::messages::serialize::OfpPacket;
use packet::Ethernet;
use services::{LinkDiscoveryListener, LinkUpdate, OfSwitch, PacketContext, SwitchListener, SwitchService};
use types::DatapathId;

use rand;

use std::collections::HashMap;
use std::io;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Priority of the flow sending unmatched packets to the controller
const TABLE_MISS_PRIORITY: u16 = 0;

fn gen_xid() -> u32 {
    let xid = rand::random();
    trace!("Using xid {} for the outgoing message", xid);
    xid
}

/// The sending half of a switch connection, shared by the connection's
/// thread and everyone writing to the switch
pub type Writer = Arc<Mutex<Box<dyn Write + Send>>>;

fn send<P: OfpPacket>(writer: &Writer, packet: &P, xid: u32) -> io::Result<()> {
    let mut stream = match writer.lock() {
        Ok(s) => s,
        Err(poisoned) => poisoned.into_inner(),
    };
    packet.serialize(&mut *stream, xid)
}

fn send_header(writer: &Writer, typ: OfpType, xid: u32) -> io::Result<()> {
    let mut stream = match writer.lock() {
        Ok(s) => s,
        Err(poisoned) => poisoned.into_inner(),
    };
    OfpHeader::new(typ, xid).serialize(&mut *stream)
}

/// A switch that completed the features handshake
pub struct SwitchHandle {
    id: DatapathId,
    description: RwLock<SwitchDescription>,
    ports: RwLock<Vec<u32>>,
    active: AtomicBool,
    writer: Writer,
}

impl SwitchHandle {
    fn new(id: DatapathId, writer: Writer) -> SwitchHandle {
        SwitchHandle {
            id,
            description: RwLock::new(SwitchDescription::default()),
            ports: RwLock::new(vec![]),
            active: AtomicBool::new(false),
            writer,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn set_description(&self, desc: SwitchDescription) {
        match self.description.write() {
            Ok(mut d) => *d = desc,
            Err(poisoned) => *poisoned.into_inner() = desc,
        }
    }

    fn update_ports<F: FnOnce(&mut Vec<u32>)>(&self, f: F) {
        let mut ports = match self.ports.write() {
            Ok(p) => p,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut ports);
        ports.sort();
        ports.dedup();
    }
}

impl OfSwitch for SwitchHandle {
    fn id(&self) -> DatapathId {
        self.id
    }

    /// The controller speaks OpenFlow 1.3 only
    fn version(&self) -> OfpVersion {
        OfpVersion::Of13
    }

    fn description(&self) -> SwitchDescription {
        match self.description.read() {
            Ok(d) => d.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn ports(&self) -> Vec<u32> {
        match self.ports.read() {
            Ok(p) => p.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn write(&self, msg: &OfpMessage) -> io::Result<()> {
        trace!("Outgoing message to {}: {:?}", self.id, msg);
        let mut stream = match self.writer.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        msg.serialize(&mut *stream, gen_xid())
    }
}

/// All switches currently connected to the controller
#[derive(Default)]
pub struct SwitchRegistry {
    switches: RwLock<HashMap<DatapathId, Arc<SwitchHandle>>>,
}

impl SwitchRegistry {
    pub fn new() -> SwitchRegistry {
        SwitchRegistry::default()
    }

    fn insert(&self, sw: Arc<SwitchHandle>) {
        let mut switches = match self.switches.write() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if switches.insert(sw.id, sw.clone()).is_some() {
            warn!("Switch {} reconnected, replacing the old connection", sw.id);
        }
    }

    /// Removes the switch unless it has been replaced by a newer connection
    fn remove(&self, sw: &Arc<SwitchHandle>) {
        let mut switches = match self.switches.write() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        let current = switches.get(&sw.id).map_or(false, |s| Arc::ptr_eq(s, sw));
        if current {
            switches.remove(&sw.id);
        }
    }

    fn handle(&self, dpid: DatapathId) -> Option<Arc<SwitchHandle>> {
        match self.switches.read() {
            Ok(s) => s.get(&dpid).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&dpid).cloned(),
        }
    }
}

impl SwitchService for SwitchRegistry {
    fn switch(&self, dpid: DatapathId) -> Option<Arc<dyn OfSwitch>> {
        self.handle(dpid).map(|sw| sw as Arc<dyn OfSwitch>)
    }

    fn active_switch(&self, dpid: DatapathId) -> Option<Arc<dyn OfSwitch>> {
        self.handle(dpid)
            .filter(|sw| sw.is_active())
            .map(|sw| sw as Arc<dyn OfSwitch>)
    }

    fn switch_ids(&self) -> Vec<DatapathId> {
        let mut ids: Vec<_> = match self.switches.read() {
            Ok(s) => s.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        ids.sort();
        ids
    }
}

/// The receivers of everything the switches report
pub struct Dispatcher {
    pub switches: Arc<SwitchRegistry>,
    pub packet_in: ListenerChain,
    pub switch_listeners: Vec<Arc<dyn SwitchListener>>,
    pub link_listeners: Vec<Arc<dyn LinkDiscoveryListener>>,
}

impl Dispatcher {
    pub fn new(switches: Arc<SwitchRegistry>) -> Dispatcher {
        Dispatcher {
            switches,
            packet_in: ListenerChain::new(),
            switch_listeners: vec![],
            link_listeners: vec![],
        }
    }
}

/// One switch connection.
/// Use the run function to serve it until it breaks.
pub struct OfController<'a, R: Read> {
    dispatcher: &'a Dispatcher,
    reader: R,
    writer: Writer,
    hello_received: bool,
    switch: Option<Arc<SwitchHandle>>,
}

impl<'a, R: Read> OfController<'a, R> {
    pub fn new(dispatcher: &'a Dispatcher, reader: R, writer: Writer) -> OfController<'a, R> {
        OfController {
            dispatcher,
            reader,
            writer,
            hello_received: false,
            switch: None,
        }
    }

    fn connected_switch(&self, buf: Vec<u8>) -> Result<Arc<SwitchHandle>> {
        match self.switch {
            Some(ref sw) => Ok(sw.clone()),
            None => Err(Error::BadRequest(OfpBadRequestCode::BadType, buf)),
        }
    }

    fn handle_features(&mut self, buf: Vec<u8>) -> Result<()> {
        let features = OfpSwitchFeatures::deserialize(buf)?;
        let datapath_id = features.datapath_id();
        info!(
            "The connected switch identified itself with datapath id {}",
            datapath_id
        );

        let sw = Arc::new(SwitchHandle::new(datapath_id, self.writer.clone()));
        self.dispatcher.switches.insert(sw.clone());
        self.switch = Some(sw.clone());

        let table_miss = OfpFlowMod::new(sw.version(), OfpFlowModCommand::Add)
            .with_table_id(0)
            .with_priority(TABLE_MISS_PRIORITY)
            .with_actions(vec![OfpAction::output(OFPP_CONTROLLER)]);
        sw.write(&table_miss.into())?;

        // the port description reply comes last and activates the switch
        sw.write(&OfpMessage::MultipartRequest(OfpMultipartRequest::new_desc()))?;
        sw.write(&OfpMessage::MultipartRequest(OfpMultipartRequest::new_port_desc()))?;
        Ok(())
    }

    fn handle_multipart(&mut self, buf: Vec<u8>) -> Result<()> {
        let sw = self.connected_switch(buf.clone())?;
        match OfpMultipartReply::deserialize(buf)? {
            OfpMultipartReply::Desc(desc) => {
                info!(
                    "Switch {} runs {} {} by {}",
                    sw.id, desc.hardware, desc.software, desc.manufacturer
                );
                sw.set_description(desc);
            }
            OfpMultipartReply::PortDesc(ports) => {
                let numbers: Vec<_> = ports
                    .iter()
                    .map(|p| p.port_no())
                    .filter(|p| *p <= OFPP_MAX)
                    .collect();
                debug!("Switch {} has ports {:?}", sw.id, numbers);
                sw.update_ports(|p| *p = numbers);
                if !sw.active.swap(true, Ordering::SeqCst) {
                    info!("Switch {} activated", sw.id);
                    for listener in &self.dispatcher.switch_listeners {
                        listener.switch_activated(sw.id);
                    }
                }
            }
            OfpMultipartReply::Other(typ) => debug!("Ignoring multipart reply of type {}", typ),
        }
        Ok(())
    }

    fn handle_port_status(&mut self, buf: Vec<u8>) -> Result<()> {
        let sw = self.connected_switch(buf.clone())?;
        let status = OfpPortStatus::deserialize(buf)?;
        let port = status.port_no();
        if status.is_down() {
            info!("Port {} of switch {} is down", port, sw.id);
            sw.update_ports(|p| p.retain(|&n| n != port));
            let updates = [LinkUpdate::port_down(sw.id, port)];
            for listener in &self.dispatcher.link_listeners {
                listener.link_discovery_update(&updates);
            }
        }
        else if status.reason() == OfpPortReason::Add as u8 {
            info!("Port {} was added to switch {}", port, sw.id);
            sw.update_ports(|p| p.push(port));
        }
        Ok(())
    }

    fn handle_packet_in(&mut self, buf: Vec<u8>) -> Result<()> {
        let sw = self.connected_switch(buf.clone())?;
        let pi = OfpPacketIn::deserialize(buf)?;
        let eth = match Ethernet::parse(pi.data()) {
            Ok(eth) => eth,
            Err(e) => {
                debug!("Ignoring packet-in from {} with undecodable frame: {}", sw.id, e);
                return Ok(());
            }
        };
        trace!("Packet-in from {}/{}: {:?}", sw.id, pi.in_port(), eth);
        let mut ctx = PacketContext::new(eth);
        self.dispatcher.packet_in.dispatch(&*sw, &pi, &mut ctx);
        Ok(())
    }

    fn handle_ofp_message(&mut self, header: &OfpHeader) -> Result<()> {
        debug!("Incoming message: {:?}", header);

        // Read the body
        let mut buf = vec![0; header.body_length()];
        self.reader.read_exact(&mut buf)?;

        // Process the message
        let t = header.typ();
        if t == OfpType::Hello as u8 {
            // simple version discovery
            if header.version() < OFP_VERSION {
                return Err(Error::HelloFailed);
            }
            self.hello_received = true;
            send_header(&self.writer, OfpType::FeaturesRequest, gen_xid())?;
        }
        else if !self.hello_received || header.version() != OFP_VERSION {
            return Err(Error::BadRequest(OfpBadRequestCode::BadVersion, buf));
        }
        else if t == OfpType::EchoRequest as u8 {
            // The EchoReply takes the same body byte stream as the EchoRequest
            let req = OfpEchoRequest::deserialize(buf)?;
            let rep = OfpEchoReply::new(req.arbitrary());
            send(&self.writer, &rep, header.xid())?;
        }
        else if t == OfpType::FeaturesReply as u8 {
            self.handle_features(buf)?;
        }
        else if t == OfpType::PacketIn as u8 {
            self.handle_packet_in(buf)?;
        }
        else if t == OfpType::PortStatus as u8 {
            self.handle_port_status(buf)?;
        }
        else if t == OfpType::MultipartReply as u8 {
            self.handle_multipart(buf)?;
        }
        else if t == OfpType::BarrierReply as u8 || t == OfpType::FlowRemoved as u8 {
            trace!("Ignoring message of type {}", t);
        }
        else if t == OfpType::Error as u8 {
            let error = OfpErrorMsg::deserialize(buf)?;
            if error.check_table_full() {
                error!("A flow table of switch {:?} is full. {}", self.switch.as_ref().map(|s| s.id), error);
            }
            else {
                error!("Unexpected {}", error);
                debug!("Full error message: {:?}", error);
            }
        }
        else {
            debug!(
                "Cannot interpret message of type {}. Full message body: {:?}",
                header.typ(),
                buf
            );
            return Err(Error::BadRequest(OfpBadRequestCode::BadType, buf));
        }
        Ok(())
    }

    fn handle_of_errors(&mut self, error: Error, header: &OfpHeader, header_buf: &[u8]) -> io::Result<()> {
        let err_msg = match error {
            Error::Io(e) => return Err(e),
            Error::HelloFailed => {
                let msg = format!(
                    "The connected switch supports only OpenFlow protocol version {:x}",
                    header.version()
                );
                let err = OfpErrorMsg::new_hello_failed();
                send(&self.writer, &err, header.xid())?;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, msg));
            }
            Error::BadRequest(code, buf) => OfpErrorMsg::new_bad_request(code, header_buf, &buf),
        };
        debug!("Outgoing error message: {:?}", err_msg);
        send(&self.writer, &err_msg, header.xid())
    }

    fn serve(&mut self) -> io::Result<()> {
        // Send a Hello
        // Rely on the simple version: If one Hello is empty,
        // the smaller OfpHeader::version is agreed upon
        send_header(&self.writer, OfpType::Hello, gen_xid())?;

        loop {
            // Read the header
            let mut hbuf = [0; 8];
            self.reader.read_exact(&mut hbuf)?;
            let header = OfpHeader::deserialize(&hbuf);
            if let Err(e) = self.handle_ofp_message(&header) {
                self.handle_of_errors(e, &header, &hbuf)?;
            }
        }
    }

    /// Serves the connection until it fails.
    /// The switch is unregistered afterwards.
    pub fn run(&mut self) -> io::Result<()> {
        let res = self.serve();
        if let Some(sw) = self.switch.take() {
            info!("Switch {} disconnected", sw.id);
            self.dispatcher.switches.remove(&sw);
        }
        res
    }
}

/// Starts serving an accepted switch connection on its own thread
fn spawn_connection(stream: TcpStream, dispatcher: &Arc<Dispatcher>) -> io::Result<()> {
    let addr = stream.peer_addr()?;
    info!("connection from {}", addr);
    let sending: Box<dyn Write + Send> = Box::new(stream.try_clone()?);
    let writer: Writer = Arc::new(Mutex::new(sending));
    let dispatcher = dispatcher.clone();
    thread::spawn(move || {
        let mut ctrl = OfController::new(&dispatcher, stream, writer);
        if let Err(e) = ctrl.run() {
            warn!("Connection from {} closed: {}", addr, e);
        }
    });
    Ok(())
}

/// Accepts switch connections and serves each of them on its own thread.
/// A connection that fails its setup is dropped without stopping the others.
pub fn listen(listener: &TcpListener, dispatcher: &Arc<Dispatcher>) -> io::Result<()> {
    info!("Listening on {}", listener.local_addr()?);
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("Unable to accept a switch connection: {}", e);
                continue;
            }
        };
        if let Err(e) = spawn_connection(stream, dispatcher) {
            warn!("Unable to set up a switch connection: {}", e);
        }
    }
    Ok(())
}
