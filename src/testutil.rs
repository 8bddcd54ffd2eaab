//! Test doubles for the services the forwarding core depends on

use damper::MessageDamper;
use flowset::FlowsetRegistry;
use gateway::{Gateway, GatewayStore};
use openflow::messages::{OfpFlowMod, OfpMatch, OfpMessage, OfpOxmTlv, OfpPacketIn, OfpPacketOut, OfpType,
                         OfpVersion, SwitchDescription};
use packet::Ethernet;
use services::{Device, DeviceRole, DeviceService, Entity, OfSwitch, PacketContext, RoutingService, Services,
               SwitchService, TopologyService};
use types::{DatapathId, MacAddr, NodePort};

use ipnetwork::Ipv4Network;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn dpid(id: u64) -> DatapathId {
    DatapathId(id)
}

pub fn mac(s: &str) -> MacAddr {
    MacAddr::from_str(s).unwrap()
}

/// The switch the sample gateways live on
pub fn gateway_dpid() -> DatapathId {
    DatapathId::from_str("00:00:08:00:27:1b:a2:7c").unwrap()
}

pub fn sample_gateways() -> Vec<Gateway> {
    vec![
        Gateway::new(
            gateway_dpid(),
            Ipv4Addr::new(192, 168, 126, 1),
            Ipv4Network::from_str("192.168.126.0/24").unwrap(),
            mac("08:00:27:1b:a2:7c"),
            5,
            5,
        ),
        Gateway::new(
            gateway_dpid(),
            Ipv4Addr::new(192, 168, 150, 1),
            Ipv4Network::from_str("192.168.150.0/24").unwrap(),
            mac("08:00:27:45:9a:46"),
            6,
            6,
        ),
    ]
}

/// Builds the packet-in a switch of `version` sends for `eth` arriving at `in_port`
pub fn packet_in_on(version: OfpVersion, in_port: u32, eth: &Ethernet) -> OfpPacketIn {
    let data = eth.serialize().unwrap();
    if version < OfpVersion::Of12 {
        OfpPacketIn::new(version, None, in_port, OfpMatch::new(), data)
    }
    else {
        let mut m = OfpMatch::new();
        m.set(OfpOxmTlv::new_in_port(in_port));
        OfpPacketIn::new(version, None, 0, m, data)
    }
}

/// Records the messages written to any switch in write order
#[derive(Default)]
pub struct Recorder {
    log: Mutex<Vec<(DatapathId, OfpMessage)>>,
}

impl Recorder {
    pub fn log(&self) -> Vec<(DatapathId, OfpMessage)> {
        self.log.lock().unwrap().clone()
    }
}

pub struct MockSwitch {
    id: DatapathId,
    version: OfpVersion,
    description: SwitchDescription,
    ports: Vec<u32>,
    written: Mutex<Vec<OfpMessage>>,
    recorder: Option<Arc<Recorder>>,
}

impl MockSwitch {
    pub fn new(id: DatapathId, version: OfpVersion) -> MockSwitch {
        MockSwitch {
            id,
            version,
            description: SwitchDescription::default(),
            ports: vec![],
            written: Mutex::new(vec![]),
            recorder: None,
        }
    }

    pub fn with_description(mut self, description: SwitchDescription) -> MockSwitch {
        self.description = description;
        self
    }

    pub fn with_ports(mut self, ports: &[u32]) -> MockSwitch {
        self.ports = ports.to_vec();
        self
    }

    fn with_recorder(mut self, recorder: Arc<Recorder>) -> MockSwitch {
        self.recorder = Some(recorder);
        self
    }

    pub fn written(&self) -> Vec<OfpMessage> {
        self.written.lock().unwrap().clone()
    }

    pub fn flow_mods(&self) -> Vec<OfpFlowMod> {
        self.written()
            .iter()
            .filter_map(|m| m.as_flow_mod().cloned())
            .collect()
    }

    pub fn packet_outs(&self) -> Vec<OfpPacketOut> {
        self.written()
            .iter()
            .filter_map(|m| m.as_packet_out().cloned())
            .collect()
    }
}

impl OfSwitch for MockSwitch {
    fn id(&self) -> DatapathId {
        self.id
    }

    fn version(&self) -> OfpVersion {
        self.version
    }

    fn description(&self) -> SwitchDescription {
        self.description.clone()
    }

    fn ports(&self) -> Vec<u32> {
        self.ports.clone()
    }

    fn write(&self, msg: &OfpMessage) -> io::Result<()> {
        self.written.lock().unwrap().push(msg.clone());
        if let Some(ref recorder) = self.recorder {
            recorder.log.lock().unwrap().push((self.id, msg.clone()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockSwitches {
    switches: Mutex<HashMap<DatapathId, Arc<MockSwitch>>>,
    inactive: Mutex<HashSet<DatapathId>>,
}

impl MockSwitches {
    pub fn add(&self, sw: Arc<MockSwitch>) {
        self.switches.lock().unwrap().insert(sw.id, sw);
    }

    /// Keeps the switch connected, but not ready for flow modifications
    pub fn deactivate(&self, dpid: DatapathId) {
        self.inactive.lock().unwrap().insert(dpid);
    }
}

impl SwitchService for MockSwitches {
    fn switch(&self, dpid: DatapathId) -> Option<Arc<dyn OfSwitch>> {
        self.switches
            .lock()
            .unwrap()
            .get(&dpid)
            .map(|sw| sw.clone() as Arc<dyn OfSwitch>)
    }

    fn active_switch(&self, dpid: DatapathId) -> Option<Arc<dyn OfSwitch>> {
        if self.inactive.lock().unwrap().contains(&dpid) {
            None
        }
        else {
            self.switch(dpid)
        }
    }

    fn switch_ids(&self) -> Vec<DatapathId> {
        let mut ids: Vec<_> = self.switches.lock().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[derive(Default)]
pub struct MockDevices {
    devices: Mutex<Vec<Device>>,
    registered: Mutex<Vec<Entity>>,
}

impl MockDevices {
    pub fn new() -> MockDevices {
        MockDevices::default()
    }

    pub fn add(&self, device: Device) {
        self.devices.lock().unwrap().push(device);
    }

    /// Gets the entities registered through the device service
    pub fn registered(&self) -> Vec<Entity> {
        self.registered.lock().unwrap().clone()
    }

    fn by_mac(&self, mac: MacAddr) -> Option<Device> {
        self.devices.lock().unwrap().iter().find(|d| d.mac == mac).cloned()
    }
}

impl DeviceService for MockDevices {
    fn device(&self, ctx: &PacketContext, role: DeviceRole) -> Option<Device> {
        match role {
            DeviceRole::Source => self.by_mac(ctx.eth.src),
            DeviceRole::Destination => self.by_mac(ctx.eth.dst),
        }
    }

    fn find_by_ipv4(&self, ip: Ipv4Addr) -> Option<Device> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.ipv4 == Some(ip))
            .cloned()
    }

    fn register_device(&self, entity: Entity) {
        self.add(Device {
            mac: entity.mac,
            ipv4: entity.ipv4,
            attachment_points: vec![entity.attachment_point],
            virtual_interface: entity.virtual_interface,
        });
        self.registered.lock().unwrap().push(entity);
    }
}

/// Every port is an edge unless marked otherwise
#[derive(Default)]
pub struct MockTopology {
    non_edge: Mutex<HashSet<NodePort>>,
    broadcast: Mutex<HashMap<DatapathId, BTreeSet<u32>>>,
}

impl MockTopology {
    pub fn set_non_edge(&self, npts: &[NodePort]) {
        self.non_edge.lock().unwrap().extend(npts.iter().cloned());
    }

    pub fn set_broadcast_ports(&self, dpid: DatapathId, ports: &[u32]) {
        self.broadcast
            .lock()
            .unwrap()
            .insert(dpid, ports.iter().cloned().collect());
    }
}

impl TopologyService for MockTopology {
    fn is_edge(&self, dpid: DatapathId, port: u32) -> bool {
        !self.non_edge.lock().unwrap().contains(&NodePort::new(dpid, port))
    }

    fn broadcast_ports(&self, dpid: DatapathId) -> BTreeSet<u32> {
        self.broadcast
            .lock()
            .unwrap()
            .get(&dpid)
            .cloned()
            .unwrap_or_default()
    }
}

/// Answers every request with the same scripted path
#[derive(Default)]
pub struct MockRouting {
    path: Mutex<Vec<NodePort>>,
    requests: Mutex<Vec<(DatapathId, u32, DatapathId, u32)>>,
}

impl MockRouting {
    pub fn set_path(&self, path: Vec<NodePort>) {
        *self.path.lock().unwrap() = path;
    }

    pub fn requests(&self) -> Vec<(DatapathId, u32, DatapathId, u32)> {
        self.requests.lock().unwrap().clone()
    }
}

impl RoutingService for MockRouting {
    fn path(&self, src: DatapathId, src_port: u32, dst: DatapathId, dst_port: u32) -> Vec<NodePort> {
        self.requests.lock().unwrap().push((src, src_port, dst, dst_port));
        self.path.lock().unwrap().clone()
    }
}

/// The mocked services plus the shared state of the forwarding core
pub struct Env {
    pub switches: Arc<MockSwitches>,
    pub devices: Arc<MockDevices>,
    pub topology: Arc<MockTopology>,
    pub routing: Arc<MockRouting>,
    pub gateways: Arc<GatewayStore>,
    pub registry: Arc<FlowsetRegistry>,
    pub damper: Arc<MessageDamper>,
    pub recorder: Arc<Recorder>,
}

impl Env {
    pub fn new() -> Env {
        Env::with_gateways(vec![])
    }

    pub fn with_gateways(gateways: Vec<Gateway>) -> Env {
        Env {
            switches: Arc::new(MockSwitches::default()),
            devices: Arc::new(MockDevices::new()),
            topology: Arc::new(MockTopology::default()),
            routing: Arc::new(MockRouting::default()),
            gateways: Arc::new(GatewayStore::with_gateways(gateways)),
            registry: Arc::new(FlowsetRegistry::new()),
            damper: Arc::new(MessageDamper::new(
                10_000,
                Duration::from_millis(250),
                &[OfpType::FlowMod],
            )),
            recorder: Arc::new(Recorder::default()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            switches: self.switches.clone(),
            devices: self.devices.clone(),
            topology: self.topology.clone(),
            routing: self.routing.clone(),
        }
    }

    pub fn add_switch(&self, id: u64, version: OfpVersion, ports: &[u32]) -> Arc<MockSwitch> {
        self.add_switch_with(MockSwitch::new(dpid(id), version).with_ports(ports))
    }

    pub fn add_switch_with(&self, sw: MockSwitch) -> Arc<MockSwitch> {
        let sw = Arc::new(sw.with_recorder(self.recorder.clone()));
        self.switches.add(sw.clone());
        sw
    }
}
