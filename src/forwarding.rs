/*!
The packet-in reactor.

Each packet-in is either flooded, dropped by a flow, or forwarded along a
path from the ingress port to the destination's attachment point. The rules
of one forwarded connection share a flowset id that is registered for every
switch port on the path, so that the [`reaper`](../reaper/index.html) can
remove all of them once a port or link on the path goes down.
*/

use cookie;
use cookie::Masked;
use damper::MessageDamper;
use flowset::FlowsetRegistry;
use gateway;
use gateway::GatewayStore;
use matcher::{MatchingConfig, PacketMatcher};
use ofdpa;
use openflow::messages::{OfpAction, OfpFlowMod, OfpFlowModCommand, OfpMatch, OfpMessage, OfpOxmTlv,
                         OfpPacketIn, OfpPacketOut, OfpVersion, ProtocolEndpoint, OFPFF_SEND_FLOW_REM,
                         OFPP_FLOOD};
use packet::{Payload, ETH_TYPE_ARP, ETH_TYPE_IPV4};
use services::{Command, DeviceRole, OfSwitch, PacketContext, PacketInListener, RoutingAction,
               RoutingDecision, RoutingDecisionListener, Services, SwitchListener};
use types::{DatapathId, MacAddr, NodePort};

use std::collections::HashMap;
use std::sync::Arc;

pub const NAME: &str = "forwarding";

/// Defaults of the flows installed by the reactor
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardingConfig {
    pub hard_timeout: u16,
    pub idle_timeout: u16,
    /// Ignored for OpenFlow 1.0 switches
    pub table_id: u8,
    /// Never 0, which is the priority of the table-miss flow
    pub priority: u16,
    pub send_flow_rem: bool,
    pub matching: MatchingConfig,
    /// Flood ARP packets instead of installing flows for them
    pub flood_arp: bool,
    pub remove_flows_on_link_or_port_down: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        ForwardingConfig {
            hard_timeout: 0,
            idle_timeout: 5,
            table_id: 0,
            priority: 1,
            send_flow_rem: false,
            matching: MatchingConfig::default(),
            flood_arp: false,
            remove_flows_on_link_or_port_down: true,
        }
    }
}

/// How the last hop of a path treats the packets
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoutingData {
    /// Output to the port the path ends at
    Direct,
    /// The packets are routed by a gateway: the MAC addresses are rewritten
    /// and the packets leave through the gateway's forwarding port.
    Routed {
        output_port: u32,
        output_mac: MacAddr,
        target_mac: MacAddr,
    },
}

/// Maps a raw flow-mod command, falling back to `ModifyStrict` for unknown ones
pub fn decode_command(command: u8) -> OfpFlowModCommand {
    match OfpFlowModCommand::from_wire(command) {
        Some(c) => c,
        None => {
            error!("Could not decode flow-mod command {}. Using MODIFY_STRICT.", command);
            OfpFlowModCommand::ModifyStrict
        }
    }
}

pub struct Forwarding {
    config: ForwardingConfig,
    matcher: PacketMatcher,
    services: Services,
    gateways: Arc<GatewayStore>,
    registry: Arc<FlowsetRegistry>,
    damper: Arc<MessageDamper>,
}

impl Forwarding {
    pub fn new(
        config: ForwardingConfig,
        services: Services,
        gateways: Arc<GatewayStore>,
        registry: Arc<FlowsetRegistry>,
        damper: Arc<MessageDamper>,
    ) -> Forwarding {
        info!(
            "Forwarding with idle timeout {}, hard timeout {}, table {}, priority {}",
            config.idle_timeout, config.hard_timeout, config.table_id, config.priority
        );
        Forwarding {
            matcher: PacketMatcher::new(config.matching),
            config,
            services,
            gateways,
            registry,
            damper,
        }
    }

    fn write(&self, sw: &dyn OfSwitch, msg: OfpMessage) {
        match self.damper.write(sw, &msg) {
            Ok(written) => trace!("{:?} to switch {} written: {}", msg.typ(), sw.id(), written),
            Err(e) => warn!("Unable to write {:?} to switch {}: {}", msg.typ(), sw.id(), e),
        }
    }

    pub fn process_packet_in(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, ctx: &PacketContext) -> Command {
        match ctx.decision {
            Some(decision) => {
                trace!("Forwarding decision {:?} was made for the packet-in", decision.action);
                match decision.action {
                    RoutingAction::None => {}
                    RoutingAction::Forward | RoutingAction::ForwardOrFlood => {
                        self.do_forward_flow(sw, pi, Some(decision), ctx, false)
                    }
                    RoutingAction::Multicast => self.do_flood(sw, pi),
                    RoutingAction::Drop => self.do_drop_flow(sw, pi, Some(decision), ctx),
                }
            }
            None => {
                if ctx.eth.is_broadcast() || ctx.eth.is_multicast() {
                    debug!("Flooding broadcast or multicast from {}", ctx.eth.src);
                    self.do_flood(sw, pi);
                }
                else {
                    self.do_forward_flow(sw, pi, None, ctx, false);
                }
            }
        }
        Command::Continue
    }

    /// Sends the packet out of all broadcast ports of the switch except its ingress port
    pub fn do_flood(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn) {
        let in_port = pi.in_port();
        let mut ports = self.services.topology.broadcast_ports(sw.id());
        if ports.is_empty() {
            debug!("No broadcast ports found. Using FLOOD output action");
            ports.insert(OFPP_FLOOD);
        }
        let actions = ports
            .into_iter()
            .filter(|p| *p != in_port)
            .map(OfpAction::output)
            .collect();
        let po = OfpPacketOut::new(sw.version(), None, in_port, actions, pi.data().to_vec());
        trace!("Writing flood packet-out to switch {}", sw.id());
        self.write(sw, po.into());
    }

    pub fn do_drop_flow(
        &self,
        sw: &dyn OfSwitch,
        pi: &OfpPacketIn,
        decision: Option<RoutingDecision>,
        ctx: &PacketContext,
    ) {
        let in_port = pi.in_port();
        let m = self.matcher.create_match(sw, pi, &ctx.eth, in_port);
        let flowset = self.registry.generate();
        let cookie = cookie::make_forwarding_cookie(decision.map(|d| d.descriptor), Some(flowset));

        if let Some(port) = m.in_port() {
            self.registry.register(NodePort::new(sw.id(), port), flowset);
        }

        let fm = OfpFlowMod::new(sw.version(), OfpFlowModCommand::Add)
            .with_cookie(cookie)
            .with_timeouts(self.config.idle_timeout, self.config.hard_timeout)
            .with_priority(self.config.priority)
            .with_table_id(self.config.table_id)
            .with_match(m)
            .with_actions(vec![]);
        debug!("Writing drop flow-mod to switch {}", sw.id());
        self.write(sw, fm.into());
    }

    /// Looks up the gateway routing a packet to a virtual interface
    fn routing_data(&self, sw: &dyn OfSwitch, ctx: &PacketContext) -> RoutingData {
        let ip = match ctx.eth.payload {
            Payload::Ipv4(ref ip) if ctx.eth.ether_type == ETH_TYPE_IPV4 => ip,
            _ => return RoutingData::Direct,
        };
        let network = match gateway::network_of(ip.dst, gateway::ROUTED_PREFIX) {
            Some(n) => n,
            None => return RoutingData::Direct,
        };
        debug!("Searching gateway for network {} on switch {}", network, sw.id());
        let gw = self.gateways.gateway_by_network(network, sw.id());
        let target = self.services.devices.find_by_ipv4(ip.dst);
        match (gw, target) {
            (Some(gw), Some(target)) => {
                debug!("Routing to {} ({}) through gateway {}", ip.dst, target.mac, gw.ip());
                RoutingData::Routed {
                    output_port: gw.forwarding_port(),
                    output_mac: gw.mac(),
                    target_mac: target.mac,
                }
            }
            _ => RoutingData::Direct,
        }
    }

    pub fn do_forward_flow(
        &self,
        sw: &dyn OfSwitch,
        pi: &OfpPacketIn,
        decision: Option<RoutingDecision>,
        ctx: &PacketContext,
        request_flow_removed: bool,
    ) {
        let src_port = pi.in_port();
        let src_sw = sw.id();
        let devices = &self.services.devices;
        let topology = &self.services.topology;

        let dst_device = match devices.device(ctx, DeviceRole::Destination) {
            Some(d) => d,
            None => {
                debug!("Destination device unknown. Flooding packet");
                self.do_flood(sw, pi);
                return;
            }
        };

        let routing_data = if dst_device.virtual_interface {
            debug!("Target device {} is a virtual gateway", dst_device.mac);
            self.routing_data(sw, ctx)
        }
        else {
            RoutingData::Direct
        };

        let src_device = match devices.device(ctx, DeviceRole::Source) {
            Some(d) => d,
            None => {
                info!("No device entry found for source device {}", ctx.eth.src);
                return;
            }
        };

        // some physical switches partially support or do not support ARP flows
        if self.config.flood_arp && ctx.eth.ether_type == ETH_TYPE_ARP {
            debug!("ARP flows disabled. Flooding ARP packet");
            self.do_flood(sw, pi);
            return;
        }

        // the packet-in is from a switch on the path before its flow was installed
        if !topology.is_edge(src_sw, src_port) && !dst_device.virtual_interface && !src_device.virtual_interface {
            debug!(
                "Packet destination is known, but packet was not received on an edge port ({}/{}). Flooding packet",
                src_sw, src_port
            );
            self.do_flood(sw, pi);
            return;
        }

        let dst_ap = dst_device
            .attachment_points
            .iter()
            .find(|ap| topology.is_edge(ap.node, ap.port))
            .cloned();
        let dst_ap = match dst_ap {
            Some(ap) => ap,
            None => {
                debug!(
                    "Could not locate edge attachment point for destination device {}. Flooding packet",
                    dst_device.mac
                );
                self.do_flood(sw, pi);
                return;
            }
        };

        if !dst_device.virtual_interface && src_sw == dst_ap.node && src_port == dst_ap.port {
            debug!(
                "Both source and destination are on the same switch/port {}/{}. Dropping packet",
                src_sw, src_port
            );
            return;
        }

        let flowset = self.registry.generate();
        let cookie = cookie::make_forwarding_cookie(decision.map(|d| d.descriptor), Some(flowset));
        let path = self.services
            .routing
            .path(src_sw, src_port, dst_ap.node, dst_ap.port);

        if path.is_empty() {
            debug!("No path from {}/{} to {}", src_sw, src_port, dst_ap);
            return;
        }

        let m = self.matcher.create_match(sw, pi, &ctx.eth, src_port);
        debug!("Pushing route from {}/{} to {}", src_sw, src_port, dst_ap);
        self.push_route(
            &path,
            &m,
            pi,
            src_sw,
            cookie,
            request_flow_removed,
            OfpFlowModCommand::Add,
            routing_data,
        );

        for npt in path {
            self.registry.register(npt, flowset);
        }
    }

    /// Installs flows along `path` from its end back to its start, so that
    /// the packet sent out at the first hop finds the rest of the path ready.
    /// Returns whether a packet-out was sent on `pin_switch`.
    pub fn push_route(
        &self,
        path: &[NodePort],
        m: &OfpMatch,
        pi: &OfpPacketIn,
        pin_switch: DatapathId,
        cookie: u64,
        request_flow_removed: bool,
        command: OfpFlowModCommand,
        routing_data: RoutingData,
    ) -> bool {
        let mut packet_out_sent = false;

        let mut indx = path.len();
        while indx >= 2 {
            indx -= 1;
            let out_npt = path[indx];
            let in_npt = path[indx - 1];
            indx -= 1;

            let sw = match self.services.switches.switch(out_npt.node) {
                Some(sw) => sw,
                None => {
                    warn!("Unable to push route, switch at DPID {} not available", out_npt.node);
                    return packet_out_sent;
                }
            };
            let sw = &*sw;

            let mut hop_match = m.clone();
            if self.config.matching.in_port {
                hop_match.set(OfpOxmTlv::new_in_port(in_npt.port));
            }

            let mut actions = vec![];
            let output_port = match routing_data {
                RoutingData::Direct => out_npt.port,
                RoutingData::Routed {
                    output_port,
                    output_mac,
                    target_mac,
                } => {
                    actions.push(OfpAction::SetField(OfpOxmTlv::new_eth(output_mac, ProtocolEndpoint::Src)));
                    actions.push(OfpAction::SetField(OfpOxmTlv::new_eth(target_mac, ProtocolEndpoint::Dst)));
                    output_port
                }
            };
            actions.push(OfpAction::output(output_port));

            let flags = if self.config.send_flow_rem || request_flow_removed {
                OFPFF_SEND_FLOW_REM
            }
            else {
                0
            };

            trace!(
                "Pushing route flow-mod routeIndx={} sw={} inPort={} outPort={}",
                indx + 1,
                sw.id(),
                in_npt.port,
                out_npt.port
            );

            if ofdpa::is_ofdpa_switch(sw) {
                let settings = ofdpa::FlowSettings {
                    cookie,
                    priority: self.config.priority,
                    hard_timeout: self.config.hard_timeout,
                    idle_timeout: self.config.idle_timeout,
                };
                if let Some(msg) = ofdpa::learning_switch_flow(sw.version(), settings, &hop_match, None, out_npt.port) {
                    self.write(sw, msg);
                }
            }
            else {
                let fm = OfpFlowMod::new(sw.version(), command)
                    .with_cookie(cookie)
                    .with_timeouts(self.config.idle_timeout, self.config.hard_timeout)
                    .with_priority(self.config.priority)
                    .with_out_port(out_npt.port)
                    .with_flags(flags)
                    .with_table_id(self.config.table_id)
                    .with_match(hop_match)
                    .with_actions(actions);
                self.write(sw, fm.into());
            }

            if sw.id() == pin_switch && !command.is_delete() {
                self.push_packet(sw, pi, out_npt.port, true);
                packet_out_sent = true;
            }
        }

        packet_out_sent
    }

    /// Sends the packet of a packet-in out of `out_port` of the same switch.
    /// Nothing is sent if that is the port the packet came in on.
    pub fn push_packet(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, out_port: u32, use_buffered_packet: bool) {
        let in_port = pi.in_port();
        if in_port == out_port {
            debug!(
                "Attempting to do packet-out to the same interface as packet-in. Dropping packet. SrcSwitch={}, port={}",
                sw.id(),
                in_port
            );
            return;
        }

        let buffer_id = if use_buffered_packet {
            pi.buffer_id()
        }
        else {
            None
        };
        let po = OfpPacketOut::new(
            sw.version(),
            buffer_id,
            in_port,
            vec![OfpAction::output(out_port)],
            pi.data().to_vec(),
        );
        trace!("Packet-out to switch {} port {}", sw.id(), out_port);
        self.write(sw, po.into());
    }
}

impl PacketInListener for Forwarding {
    fn name(&self) -> &str {
        NAME
    }

    fn receive(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, ctx: &mut PacketContext) -> Command {
        self.process_packet_in(sw, pi, ctx)
    }

    fn after(&self) -> Vec<&str> {
        vec!["topology", ::local::DEVICE_MANAGER]
    }
}

impl RoutingDecisionListener for Forwarding {
    /// Deletes the flows of revoked routing decisions on all active switches
    fn routing_decision_changed(&self, descriptors: &[Masked]) {
        let masked_cookies = cookie::convert_descriptors(descriptors);
        if masked_cookies.is_empty() {
            return;
        }

        let mut cache: HashMap<OfpVersion, Vec<OfpMessage>> = HashMap::new();
        let switches = &self.services.switches;
        for dpid in switches.switch_ids() {
            let sw = match switches.active_switch(dpid) {
                Some(sw) => sw,
                None => continue,
            };
            let version = sw.version();
            let msgs = cache.entry(version).or_insert_with(|| {
                masked_cookies
                    .iter()
                    .map(|mc| {
                        OfpFlowMod::new(version, OfpFlowModCommand::Delete)
                            .with_cookie(mc.value)
                            .with_cookie_mask(mc.mask)
                            .into()
                    })
                    .collect()
            });
            if let Err(e) = sw.write_all(msgs) {
                warn!("Unable to delete flows of changed routing decisions on switch {}: {}", dpid, e);
            }
        }
    }
}

impl SwitchListener for Forwarding {
    fn switch_activated(&self, dpid: DatapathId) {
        let sw = match self.services.switches.switch(dpid) {
            Some(sw) => sw,
            None => {
                warn!(
                    "Switch {} was activated but had no switch object in the switch service. Perhaps it quickly disconnected",
                    dpid
                );
                return;
            }
        };
        let sw = &*sw;
        if !ofdpa::is_ofdpa_switch(sw) {
            return;
        }
        for msg in ofdpa::reset_messages(sw.version()) {
            self.write(sw, msg);
        }
        let ports: Vec<_> = sw.ports()
            .into_iter()
            .map(|p| (p, ofdpa::PortMode::Access))
            .collect();
        warn!(
            "For OF-DPA switch {}, initializing VLAN 0 on access ports {:?}",
            dpid,
            ports.iter().map(|&(p, _)| p).collect::<Vec<_>>()
        );
        for msg in ofdpa::learning_switch_prereqs(sw.version(), 0, &ports) {
            self.write(sw, msg);
        }
    }
}
