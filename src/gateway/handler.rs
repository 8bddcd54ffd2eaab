//! Answers ARP and ICMP echo requests addressed to a gateway

use super::{Gateway, GatewayStore};

use openflow::messages::{OfpAction, OfpMessage, OfpPacketIn, OfpPacketOut, OFPP_ANY};
use packet::{Arp, Ethernet, Icmp, Ipv4, Payload, Transport, ARP_REPLY};
use services::{Command, DeviceService, OfSwitch, PacketContext, PacketInListener, SwitchListener};
use types::DatapathId;

use std::sync::Arc;

pub const NAME: &str = "virtualrouter";

/// TTL of the echo replies sent on behalf of a gateway
const REPLY_TTL: u8 = 10;

pub struct VirtualGateway {
    gateways: Arc<GatewayStore>,
    devices: Arc<dyn DeviceService>,
}

impl VirtualGateway {
    pub fn new(gateways: Arc<GatewayStore>, devices: Arc<dyn DeviceService>) -> VirtualGateway {
        VirtualGateway { gateways, devices }
    }

    /// Makes the gateways of a switch known as virtual devices
    pub fn register_devices(&self, dpid: DatapathId) {
        for gw in self.gateways.gateways_for(dpid) {
            debug!("Registering gateway {} ({}) on switch {}", gw.ip(), gw.mac(), dpid);
            self.devices.register_device(gw.to_entity());
        }
    }

    fn handle_arp(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, eth: &Ethernet, arp: &Arp) -> Command {
        debug!(
            "{} is asking for the MAC address of {}, source MAC {}",
            arp.sender_ip, arp.target_ip, arp.sender_mac
        );
        let gw = match self.gateways.gateway_by_ip(arp.target_ip, sw.id()) {
            Some(gw) => gw,
            None => return Command::Continue,
        };
        let reply = Arp {
            operation: ARP_REPLY,
            sender_mac: gw.mac(),
            sender_ip: gw.ip(),
            target_mac: arp.sender_mac,
            target_ip: arp.sender_ip,
        };
        let frame = Ethernet::new(gw.mac(), arp.sender_mac, Payload::Arp(reply)).with_tag_of(eth);
        self.reply(sw, pi, &gw, &frame)
    }

    fn handle_icmp(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, eth: &Ethernet, ip: &Ipv4, icmp: &Icmp) -> Command {
        let gw = match self.gateways.gateway_by_ip(ip.dst, sw.id()) {
            Some(gw) => gw,
            None => return Command::Continue,
        };
        debug!("Echo request from {} for gateway {}", ip.src, gw.ip());
        let reply = Ipv4::new(ip.dst, ip.src, REPLY_TTL, Transport::Icmp(icmp.echo_reply()));
        let frame = Ethernet::new(gw.mac(), eth.src, Payload::Ipv4(reply)).with_tag_of(eth);
        self.reply(sw, pi, &gw, &frame)
    }

    /// Sends `frame` back through the port the request came in on
    fn reply(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, gw: &Gateway, frame: &Ethernet) -> Command {
        let data = match frame.serialize() {
            Ok(data) => data,
            Err(e) => {
                error!("Unable to build the reply of gateway {}: {}", gw.ip(), e);
                return Command::Continue;
            }
        };
        let po = OfpPacketOut::new(
            sw.version(),
            None,
            OFPP_ANY,
            vec![OfpAction::output(pi.in_port())],
            data,
        );
        match sw.write(&OfpMessage::PacketOut(po)) {
            Ok(_) => debug!("Sent reply of gateway {} to switch {}", gw.ip(), sw.id()),
            Err(e) => warn!("Unable to send reply of gateway {} to switch {}: {}", gw.ip(), sw.id(), e),
        }
        Command::Stop
    }
}

impl PacketInListener for VirtualGateway {
    fn name(&self) -> &str {
        NAME
    }

    fn receive(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, ctx: &mut PacketContext) -> Command {
        let eth = &ctx.eth;
        match eth.payload {
            Payload::Arp(ref arp) if arp.is_request() => self.handle_arp(sw, pi, eth, arp),
            Payload::Ipv4(ref ip) => match ip.payload {
                Transport::Icmp(ref icmp) if icmp.is_echo_request() => self.handle_icmp(sw, pi, eth, ip, icmp),
                _ => Command::Continue,
            },
            _ => Command::Continue,
        }
    }

    fn before(&self) -> Vec<&str> {
        vec![::forwarding::NAME]
    }
}

impl SwitchListener for VirtualGateway {
    fn switch_activated(&self, dpid: DatapathId) {
        self.register_devices(dpid);
    }
}
