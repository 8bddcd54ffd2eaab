/*!
Controller owned gateways.

A gateway is an IP and MAC address that the controller answers for on a
switch. Hosts use it as their default router; ARP and ICMP echo requests for
it are answered by the [`VirtualGateway`](handler/struct.VirtualGateway.html),
routed traffic is rewritten by the forwarding reactor.
*/

pub mod csv;
pub mod handler;

pub use self::handler::VirtualGateway;

use ipnetwork::Ipv4Network;

use services::Entity;
use types::{DatapathId, MacAddr, NodePort};

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The prefix of the network that routed requests are looked up with
pub const ROUTED_PREFIX: u8 = 24;

/// Sets all host bits of `net` to zero
pub fn normalize(net: Ipv4Network) -> Ipv4Network {
    Ipv4Network::new(net.network(), net.prefix()).unwrap_or(net)
}

/// Gets the network of the given size that `ip` is part of
pub fn network_of(ip: Ipv4Addr, prefix: u8) -> Option<Ipv4Network> {
    Ipv4Network::new(ip, prefix).ok().map(normalize)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gateway {
    switch: DatapathId,
    ip: Ipv4Addr,
    network: Ipv4Network,
    mac: MacAddr,
    forwarding_port: u32,
    device_port: u32,
}

impl Gateway {
    pub fn new(
        switch: DatapathId,
        ip: Ipv4Addr,
        network: Ipv4Network,
        mac: MacAddr,
        forwarding_port: u32,
        device_port: u32,
    ) -> Gateway {
        Gateway {
            switch,
            ip,
            network: normalize(network),
            mac,
            forwarding_port,
            device_port,
        }
    }

    pub fn switch(&self) -> DatapathId {
        self.switch
    }
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }
    pub fn network(&self) -> Ipv4Network {
        self.network
    }
    pub fn mac(&self) -> MacAddr {
        self.mac
    }
    /// The port routed traffic leaves the switch through
    pub fn forwarding_port(&self) -> u32 {
        self.forwarding_port
    }
    /// The port the gateway device is attached to
    pub fn device_port(&self) -> u32 {
        self.device_port
    }

    /// Describes the gateway as a virtual device
    pub fn to_entity(&self) -> Entity {
        Entity {
            mac: self.mac,
            ipv4: Some(self.ip),
            attachment_point: NodePort::new(self.switch, self.device_port),
            virtual_interface: true,
        }
    }
}

#[derive(Debug, Default)]
struct SwitchGateways {
    by_ip: HashMap<Ipv4Addr, Gateway>,
    by_network: HashMap<Ipv4Network, Gateway>,
}

/// The gateways of all switches
#[derive(Debug, Default)]
pub struct GatewayStore {
    switches: RwLock<HashMap<DatapathId, SwitchGateways>>,
}

impl GatewayStore {
    pub fn new() -> GatewayStore {
        GatewayStore::default()
    }

    pub fn with_gateways<I: IntoIterator<Item = Gateway>>(gateways: I) -> GatewayStore {
        let store = GatewayStore::new();
        store.replace(gateways);
        store
    }

    fn read(&self) -> RwLockReadGuard<HashMap<DatapathId, SwitchGateways>> {
        match self.switches.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<HashMap<DatapathId, SwitchGateways>> {
        match self.switches.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replaces all gateways. A later gateway wins over an earlier one with
    /// the same switch and IP or network.
    pub fn replace<I: IntoIterator<Item = Gateway>>(&self, gateways: I) {
        let mut switches: HashMap<DatapathId, SwitchGateways> = HashMap::new();
        for gw in gateways {
            let entry = switches.entry(gw.switch).or_insert_with(SwitchGateways::default);
            entry.by_ip.insert(gw.ip, gw.clone());
            entry.by_network.insert(gw.network, gw);
        }
        let count: usize = switches.values().map(|s| s.by_ip.len()).sum();
        info!("Using {} gateways on {} switches", count, switches.len());
        *self.write() = switches;
    }

    pub fn gateway_by_ip(&self, ip: Ipv4Addr, switch: DatapathId) -> Option<Gateway> {
        self.read()
            .get(&switch)
            .and_then(|s| s.by_ip.get(&ip))
            .cloned()
    }

    pub fn gateway_by_network(&self, network: Ipv4Network, switch: DatapathId) -> Option<Gateway> {
        self.read()
            .get(&switch)
            .and_then(|s| s.by_network.get(&normalize(network)))
            .cloned()
    }

    pub fn gateways_for(&self, switch: DatapathId) -> Vec<Gateway> {
        let mut gateways: Vec<Gateway> = self.read()
            .get(&switch)
            .map(|s| s.by_ip.values().cloned().collect())
            .unwrap_or_default();
        gateways.sort_by_key(|gw| gw.ip);
        gateways
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use testutil::{mac, sample_gateways};

    fn dpid() -> DatapathId {
        DatapathId::from_str("00:00:08:00:27:1b:a2:7c").unwrap()
    }

    #[test]
    fn lookup_by_ip_and_network() {
        let store = GatewayStore::with_gateways(sample_gateways());
        let gw = store
            .gateway_by_ip(Ipv4Addr::new(192, 168, 126, 1), dpid())
            .unwrap();
        assert_eq!(gw.mac(), mac("08:00:27:1b:a2:7c"));
        assert_eq!(gw.forwarding_port(), 5);

        let net = network_of(Ipv4Addr::new(192, 168, 150, 77), ROUTED_PREFIX).unwrap();
        let gw = store.gateway_by_network(net, dpid()).unwrap();
        assert_eq!(gw.ip(), Ipv4Addr::new(192, 168, 150, 1));

        assert!(store
            .gateway_by_ip(Ipv4Addr::new(192, 168, 126, 1), DatapathId(99))
            .is_none());
        assert!(store
            .gateway_by_ip(Ipv4Addr::new(192, 168, 126, 2), dpid())
            .is_none());
    }

    #[test]
    fn networks_are_normalized() {
        let gw = Gateway::new(
            dpid(),
            Ipv4Addr::new(10, 1, 2, 1),
            Ipv4Network::from_str("10.1.2.1/24").unwrap(),
            mac("02:00:00:00:00:01"),
            1,
            1,
        );
        assert_eq!(gw.network(), Ipv4Network::from_str("10.1.2.0/24").unwrap());
        let store = GatewayStore::with_gateways(vec![gw]);
        assert!(store
            .gateway_by_network(Ipv4Network::from_str("10.1.2.200/24").unwrap(), dpid())
            .is_some());
    }

    #[test]
    fn replace_drops_old_gateways() {
        let store = GatewayStore::with_gateways(sample_gateways());
        assert_eq!(store.gateways_for(dpid()).len(), 2);
        store.replace(vec![]);
        assert!(store.gateways_for(dpid()).is_empty());
    }

    #[test]
    fn entity_is_virtual_at_device_port() {
        let gw = &sample_gateways()[0];
        let entity = gw.to_entity();
        assert!(entity.virtual_interface);
        assert_eq!(entity.attachment_point, NodePort::new(dpid(), gw.device_port()));
        assert_eq!(entity.ipv4, Some(gw.ip()));
    }
}
