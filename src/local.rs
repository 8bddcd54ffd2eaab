/*!
Minimal in-process services for a controller without link discovery.

Every switch is treated as standalone: all ports are edge ports, a switch
floods to all of its ports and paths never leave a switch. Devices are
learned from the packet-ins the controller receives.
*/

use packet::Payload;
use services::{Command, Device, DeviceRole, DeviceService, Entity, OfSwitch, PacketContext, PacketInListener,
               RoutingService, SwitchService, TopologyService};
use openflow::messages::OfpPacketIn;
use types::{DatapathId, MacAddr, NodePort};

use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock};

/// The name of the device learning listener
pub const DEVICE_MANAGER: &str = "devicemanager";

/// Learns devices from the source of every packet-in
#[derive(Default)]
pub struct LocalDevices {
    devices: RwLock<HashMap<MacAddr, Device>>,
}

impl LocalDevices {
    pub fn new() -> LocalDevices {
        LocalDevices::default()
    }

    fn learn(&self, entity: Entity) {
        let mut devices = match self.devices.write() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        let device = devices.entry(entity.mac).or_insert_with(|| Device {
            mac: entity.mac,
            ipv4: None,
            attachment_points: vec![],
            virtual_interface: entity.virtual_interface,
        });
        if device.virtual_interface && !entity.virtual_interface {
            trace!("Not moving virtual device {}", entity.mac);
            return;
        }
        if entity.ipv4.is_some() {
            device.ipv4 = entity.ipv4;
        }
        if device.attachment_points.first() != Some(&entity.attachment_point) {
            debug!("Device {} is attached to {}", entity.mac, entity.attachment_point);
            // hosts move, so the latest attachment point wins
            device.attachment_points = vec![entity.attachment_point];
        }
    }

    fn get(&self, mac: MacAddr) -> Option<Device> {
        let devices = match self.devices.read() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        devices.get(&mac).cloned()
    }
}

/// Gets the IPv4 address a frame reveals about its sender
fn sender_ipv4(payload: &Payload) -> Option<Ipv4Addr> {
    let ip = match *payload {
        Payload::Arp(ref arp) => arp.sender_ip,
        Payload::Ipv4(ref ip) => ip.src,
        _ => return None,
    };
    if ip.is_unspecified() || ip.is_broadcast() || ip.is_multicast() {
        None
    }
    else {
        Some(ip)
    }
}

impl DeviceService for LocalDevices {
    fn device(&self, ctx: &PacketContext, role: DeviceRole) -> Option<Device> {
        match role {
            DeviceRole::Source => self.get(ctx.eth.src),
            DeviceRole::Destination => self.get(ctx.eth.dst),
        }
    }

    fn find_by_ipv4(&self, ip: Ipv4Addr) -> Option<Device> {
        let devices = match self.devices.read() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        devices.values().find(|d| d.ipv4 == Some(ip)).cloned()
    }

    fn register_device(&self, entity: Entity) {
        self.learn(entity);
    }
}

impl PacketInListener for LocalDevices {
    fn name(&self) -> &str {
        DEVICE_MANAGER
    }

    fn receive(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, ctx: &mut PacketContext) -> Command {
        let src = ctx.eth.src;
        if src.is_multicast() || src == MacAddr::ZERO {
            return Command::Continue;
        }
        self.learn(Entity {
            mac: src,
            ipv4: sender_ipv4(&ctx.eth.payload),
            attachment_point: NodePort::new(sw.id(), pi.in_port()),
            virtual_interface: false,
        });
        Command::Continue
    }
}

/// Topology of unconnected switches
pub struct LocalTopology {
    switches: Arc<dyn SwitchService>,
}

impl LocalTopology {
    pub fn new(switches: Arc<dyn SwitchService>) -> LocalTopology {
        LocalTopology { switches }
    }
}

impl TopologyService for LocalTopology {
    fn is_edge(&self, _dpid: DatapathId, _port: u32) -> bool {
        true
    }

    fn broadcast_ports(&self, dpid: DatapathId) -> BTreeSet<u32> {
        self.switches
            .switch(dpid)
            .map(|sw| sw.ports().into_iter().collect())
            .unwrap_or_default()
    }
}

/// Routes between two ports of the same switch
#[derive(Default)]
pub struct LocalRouting;

impl RoutingService for LocalRouting {
    fn path(&self, src: DatapathId, src_port: u32, dst: DatapathId, dst_port: u32) -> Vec<NodePort> {
        if src != dst {
            debug!("No route from {} to {} without inter-switch links", src, dst);
            return vec![];
        }
        vec![NodePort::new(src, src_port), NodePort::new(dst, dst_port)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openflow::messages::{OfpMatch, OfpOxmTlv, OfpVersion};
    use packet::{Arp, Ethernet, ARP_REQUEST};
    use std::sync::Arc;
    use testutil::{dpid, mac, MockSwitch, MockSwitches};

    fn packet_in(in_port: u32) -> OfpPacketIn {
        let mut m = OfpMatch::new();
        m.set(OfpOxmTlv::new_in_port(in_port));
        OfpPacketIn::new(OfpVersion::Of13, None, 0, m, vec![])
    }

    fn arp_from(src: &str, ip: Ipv4Addr) -> Ethernet {
        let arp = Arp {
            operation: ARP_REQUEST,
            sender_mac: mac(src),
            sender_ip: ip,
            target_mac: MacAddr::ZERO,
            target_ip: Ipv4Addr::new(10, 0, 0, 254),
        };
        Ethernet::new(mac(src), MacAddr::BROADCAST, Payload::Arp(arp))
    }

    #[test]
    fn learns_source_devices() {
        let devices = LocalDevices::new();
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13);
        let mut ctx = PacketContext::new(arp_from("00:00:00:00:00:01", Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(devices.receive(&sw, &packet_in(3), &mut ctx), Command::Continue);

        let device = devices.device(&ctx, DeviceRole::Source).unwrap();
        assert_eq!(device.attachment_points, vec![NodePort::new(dpid(1), 3)]);
        assert_eq!(device.ipv4, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!device.virtual_interface);
        assert!(devices.device(&ctx, DeviceRole::Destination).is_none());
        assert_eq!(
            devices.find_by_ipv4(Ipv4Addr::new(10, 0, 0, 1)).map(|d| d.mac),
            Some(mac("00:00:00:00:00:01"))
        );

        // the host moved
        devices.receive(&sw, &packet_in(4), &mut ctx);
        let device = devices.device(&ctx, DeviceRole::Source).unwrap();
        assert_eq!(device.attachment_points, vec![NodePort::new(dpid(1), 4)]);
    }

    #[test]
    fn virtual_devices_stay_in_place() {
        let devices = LocalDevices::new();
        devices.register_device(Entity {
            mac: mac("08:00:27:1b:a2:7c"),
            ipv4: Some(Ipv4Addr::new(192, 168, 126, 1)),
            attachment_point: NodePort::new(dpid(1), 5),
            virtual_interface: true,
        });
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13);
        let mut ctx = PacketContext::new(arp_from("08:00:27:1b:a2:7c", Ipv4Addr::new(192, 168, 126, 1)));
        devices.receive(&sw, &packet_in(2), &mut ctx);

        let device = devices.device(&ctx, DeviceRole::Source).unwrap();
        assert!(device.virtual_interface);
        assert_eq!(device.attachment_points, vec![NodePort::new(dpid(1), 5)]);
    }

    #[test]
    fn unspecified_sender_ip_is_not_learned() {
        let devices = LocalDevices::new();
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13);
        let mut ctx = PacketContext::new(arp_from("00:00:00:00:00:01", Ipv4Addr::new(0, 0, 0, 0)));
        devices.receive(&sw, &packet_in(1), &mut ctx);
        assert_eq!(devices.device(&ctx, DeviceRole::Source).unwrap().ipv4, None);
    }

    #[test]
    fn standalone_topology_and_routing() {
        let switches = Arc::new(MockSwitches::default());
        switches.add(Arc::new(MockSwitch::new(dpid(1), OfpVersion::Of13).with_ports(&[3, 1, 2])));
        let topology = LocalTopology::new(switches);
        assert!(topology.is_edge(dpid(1), 1));
        assert_eq!(topology.broadcast_ports(dpid(1)).into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(topology.broadcast_ports(dpid(2)).is_empty());

        let routing = LocalRouting;
        assert_eq!(
            routing.path(dpid(1), 1, dpid(1), 2),
            vec![NodePort::new(dpid(1), 1), NodePort::new(dpid(1), 2)]
        );
        assert!(routing.path(dpid(1), 1, dpid(2), 2).is_empty());
    }
}
