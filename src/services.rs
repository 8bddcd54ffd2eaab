/*!
The collaborators of the forwarding core.

Switch connections, device tracking, topology and path computation live
outside of the core. They are reached through the traits in this module,
so the core can be driven by the standalone controller in `main.rs` as well
as by test doubles.
*/

use cookie::Masked;
use openflow::messages::{OfpMessage, OfpPacketIn, OfpVersion, SwitchDescription};
use packet::Ethernet;
use types::{DatapathId, MacAddr, NodePort};

use std::collections::BTreeSet;
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// A handle to a connected OpenFlow switch
pub trait OfSwitch: Send + Sync {
    fn id(&self) -> DatapathId;

    /// The negotiated protocol version
    fn version(&self) -> OfpVersion;

    /// The switch's self description, empty until the switch answered the probe
    fn description(&self) -> SwitchDescription;

    /// The port numbers of all physical ports
    fn ports(&self) -> Vec<u32>;

    fn write(&self, msg: &OfpMessage) -> io::Result<()>;

    fn write_all(&self, msgs: &[OfpMessage]) -> io::Result<()> {
        for msg in msgs {
            self.write(msg)?;
        }
        Ok(())
    }
}

pub trait SwitchService: Send + Sync {
    /// Gets a connected switch
    fn switch(&self, dpid: DatapathId) -> Option<Arc<dyn OfSwitch>>;

    /// Gets a connected switch that is ready to accept flow modifications
    fn active_switch(&self, dpid: DatapathId) -> Option<Arc<dyn OfSwitch>>;

    fn switch_ids(&self) -> Vec<DatapathId>;
}

/// A host known to the device service
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub mac: MacAddr,
    pub ipv4: Option<Ipv4Addr>,
    pub attachment_points: Vec<NodePort>,
    /// The device is a controller owned gateway
    pub virtual_interface: bool,
}

/// An observation of a host, used to learn devices
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub mac: MacAddr,
    pub ipv4: Option<Ipv4Addr>,
    pub attachment_point: NodePort,
    pub virtual_interface: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceRole {
    Source,
    Destination,
}

pub trait DeviceService: Send + Sync {
    /// Gets the source or destination device of the packet being processed
    fn device(&self, ctx: &PacketContext, role: DeviceRole) -> Option<Device>;

    fn find_by_ipv4(&self, ip: Ipv4Addr) -> Option<Device>;

    fn register_device(&self, entity: Entity);
}

pub trait TopologyService: Send + Sync {
    /// Checks whether a port is not part of an inter-switch link
    fn is_edge(&self, dpid: DatapathId, port: u32) -> bool;

    fn broadcast_ports(&self, dpid: DatapathId) -> BTreeSet<u32>;
}

pub trait RoutingService: Send + Sync {
    /// Computes a path of (ingress, egress) port pairs per switch.
    /// An empty path means there is no route.
    fn path(&self, src: DatapathId, src_port: u32, dst: DatapathId, dst_port: u32) -> Vec<NodePort>;
}

/// The collaborators the forwarding core depends on
#[derive(Clone)]
pub struct Services {
    pub switches: Arc<dyn SwitchService>,
    pub devices: Arc<dyn DeviceService>,
    pub topology: Arc<dyn TopologyService>,
    pub routing: Arc<dyn RoutingService>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoutingAction {
    None,
    Forward,
    ForwardOrFlood,
    Multicast,
    Drop,
}

/// A verdict by a policy module such as a firewall
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingDecision {
    pub action: RoutingAction,
    /// Ends up in the decision slot of the flow cookie
    pub descriptor: u64,
}

/// Tells the listener chain whether the next listener sees the packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Continue,
    Stop,
}

/// Everything known about a packet-in while the listeners process it
#[derive(Debug, Clone)]
pub struct PacketContext {
    pub eth: Ethernet,
    pub decision: Option<RoutingDecision>,
}

impl PacketContext {
    pub fn new(eth: Ethernet) -> PacketContext {
        PacketContext {
            eth,
            decision: None,
        }
    }
}

pub trait PacketInListener: Send + Sync {
    fn name(&self) -> &str;

    fn receive(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, ctx: &mut PacketContext) -> Command;

    /// Names of the listeners that have to see a packet before this one
    fn after(&self) -> Vec<&str> {
        vec![]
    }

    /// Names of the listeners that have to see a packet after this one
    fn before(&self) -> Vec<&str> {
        vec![]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOperation {
    LinkUpdated,
    LinkRemoved,
    PortUp,
    PortDown,
    SwitchUpdated,
    SwitchRemoved,
    TunnelPortAdded,
    TunnelPortRemoved,
}

/// A topology change. Endpoints that do not apply are `DatapathId::NONE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkUpdate {
    pub operation: UpdateOperation,
    pub src: DatapathId,
    pub src_port: u32,
    pub dst: DatapathId,
    pub dst_port: u32,
}

impl LinkUpdate {
    pub fn port_down(dpid: DatapathId, port: u32) -> LinkUpdate {
        LinkUpdate {
            operation: UpdateOperation::PortDown,
            src: dpid,
            src_port: port,
            dst: DatapathId::NONE,
            dst_port: 0,
        }
    }

    pub fn link_removed(src: NodePort, dst: NodePort) -> LinkUpdate {
        LinkUpdate {
            operation: UpdateOperation::LinkRemoved,
            src: src.node,
            src_port: src.port,
            dst: dst.node,
            dst_port: dst.port,
        }
    }

    /// Checks whether flows through the endpoints have become stale
    pub fn is_teardown(&self) -> bool {
        match self.operation {
            UpdateOperation::LinkRemoved
            | UpdateOperation::PortDown
            | UpdateOperation::TunnelPortRemoved => true,
            _ => false,
        }
    }
}

pub trait LinkDiscoveryListener: Send + Sync {
    fn link_discovery_update(&self, updates: &[LinkUpdate]);
}

/// Notified when routing decisions are revoked or changed.
/// Each descriptor names the decision bits and the mask they are compared under.
pub trait RoutingDecisionListener: Send + Sync {
    fn routing_decision_changed(&self, descriptors: &[Masked]);
}

pub trait SwitchListener: Send + Sync {
    fn switch_activated(&self, dpid: DatapathId);
}
