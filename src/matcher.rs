//! Builds the match of a reactively installed flow from a packet-in

use openflow::messages::{OfpMatch, OfpOxmTlv, OfpPacketIn, OfpVersion, OxmField, ProtocolEndpoint};
use packet::{Ethernet, Payload, Transport, ETH_TYPE_ARP, ETH_TYPE_IPV4, ETH_TYPE_IPV6, IP_PROTO_TCP,
             IP_PROTO_UDP};
use services::OfSwitch;

/// Selects the header fields a flow matches on.
/// A fine grained toggle is only consulted if its coarse parent is on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingConfig {
    pub in_port: bool,
    pub vlan: bool,
    pub mac: bool,
    pub mac_src: bool,
    pub mac_dst: bool,
    pub ip: bool,
    pub ip_src: bool,
    pub ip_dst: bool,
    pub transport: bool,
    pub transport_src: bool,
    pub transport_dst: bool,
    pub tcp_flag: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        MatchingConfig {
            in_port: true,
            vlan: true,
            mac: true,
            mac_src: true,
            mac_dst: true,
            ip: true,
            ip_src: true,
            ip_dst: true,
            transport: true,
            transport_src: true,
            transport_dst: true,
            tcp_flag: true,
        }
    }
}

pub struct PacketMatcher {
    config: MatchingConfig,
}

impl PacketMatcher {
    pub fn new(config: MatchingConfig) -> PacketMatcher {
        PacketMatcher { config }
    }

    pub fn create_match(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, eth: &Ethernet, in_port: u32) -> OfpMatch {
        let config = &self.config;
        let mut m = OfpMatch::new();

        if config.in_port {
            m.set(OfpOxmTlv::new_in_port(in_port));
        }

        if config.mac {
            if config.mac_src {
                m.set(OfpOxmTlv::new_eth(eth.src, ProtocolEndpoint::Src));
            }
            if config.mac_dst {
                m.set(OfpOxmTlv::new_eth(eth.dst, ProtocolEndpoint::Dst));
            }
        }

        if config.vlan {
            let vlan = effective_vlan(pi, eth);
            if vlan != 0 {
                m.set(OfpOxmTlv::new_vlan_vid(vlan));
            }
        }

        match eth.payload {
            Payload::Ipv4(ref ip) if eth.ether_type == ETH_TYPE_IPV4 => {
                if config.ip {
                    m.set(OfpOxmTlv::new_eth_type(ETH_TYPE_IPV4));
                    if config.ip_src {
                        m.set(OfpOxmTlv::new_ipv4(ip.src, ProtocolEndpoint::Src));
                    }
                    if config.ip_dst {
                        m.set(OfpOxmTlv::new_ipv4(ip.dst, ProtocolEndpoint::Dst));
                    }
                }
                if config.transport {
                    if !config.ip {
                        m.set(OfpOxmTlv::new_eth_type(ETH_TYPE_IPV4));
                    }
                    self.add_transport(&mut m, sw, &ip.payload);
                }
            }
            Payload::Ipv6(ref ip) if eth.ether_type == ETH_TYPE_IPV6 => {
                if config.ip {
                    m.set(OfpOxmTlv::new_eth_type(ETH_TYPE_IPV6));
                    if config.ip_src {
                        m.set(OfpOxmTlv::new_ipv6(ip.src, ProtocolEndpoint::Src));
                    }
                    if config.ip_dst {
                        m.set(OfpOxmTlv::new_ipv6(ip.dst, ProtocolEndpoint::Dst));
                    }
                }
                if config.transport {
                    if !config.ip {
                        m.set(OfpOxmTlv::new_eth_type(ETH_TYPE_IPV6));
                    }
                    self.add_transport(&mut m, sw, &ip.payload);
                }
            }
            _ if eth.ether_type == ETH_TYPE_ARP => {
                m.set(OfpOxmTlv::new_eth_type(ETH_TYPE_ARP));
            }
            _ => {}
        }
        m
    }

    fn add_transport(&self, m: &mut OfpMatch, sw: &dyn OfSwitch, transport: &Transport) {
        let config = &self.config;
        let (proto, src, dst) = match *transport {
            Transport::Tcp(ref tcp) => (IP_PROTO_TCP, tcp.src_port, tcp.dst_port),
            Transport::Udp(ref udp) => (IP_PROTO_UDP, udp.src_port, udp.dst_port),
            _ => return,
        };
        m.set(OfpOxmTlv::new_ip_proto(proto));
        if config.transport_src {
            if let Some(tlv) = OfpOxmTlv::new_port(proto, src, ProtocolEndpoint::Src) {
                m.set(tlv);
            }
        }
        if config.transport_dst {
            if let Some(tlv) = OfpOxmTlv::new_port(proto, dst, ProtocolEndpoint::Dst) {
                m.set(tlv);
            }
        }
        if let Transport::Tcp(ref tcp) = *transport {
            if config.tcp_flag {
                if let Some(field) = tcp_flags_field(sw) {
                    m.set(OfpOxmTlv::new_tcp_flags(tcp.flags, field));
                }
            }
        }
    }
}

/// The VLAN may have been popped by the switch, in which case only
/// the packet-in match of OpenFlow 1.2 and later still carries it.
fn effective_vlan(pi: &OfpPacketIn, eth: &Ethernet) -> u16 {
    let from_match = if pi.version() > OfpVersion::Of11 {
        pi.match_field().vlan_vid()
    }
    else {
        None
    };
    from_match.or(eth.vlan).unwrap_or(0)
}

/// Gets the match field for TCP flags if the switch supports one
fn tcp_flags_field(sw: &dyn OfSwitch) -> Option<OxmField> {
    if sw.version() >= OfpVersion::Of15 {
        return Some(OxmField::TcpFlags);
    }
    let desc = sw.description();
    if desc.hardware.to_lowercase().contains("open vswitch") && is_ovs_2_1_or_later(&desc.software) {
        Some(OxmField::OvsTcpFlags)
    }
    else {
        None
    }
}

fn is_ovs_2_1_or_later(software: &str) -> bool {
    let mut parts = software.trim().split('.').map(|p| p.parse::<u32>());
    match (parts.next(), parts.next()) {
        (Some(Ok(major)), _) if major > 2 => true,
        (Some(Ok(2)), Some(Ok(minor))) => minor >= 1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openflow::messages::SwitchDescription;
    use packet::{Ipv4, Tcp, Udp};
    use std::net::Ipv4Addr;
    use testutil::{dpid, mac, MockSwitch};

    fn tcp_frame(flags: u16) -> Ethernet {
        let tcp = Transport::Tcp(Tcp {
            src_port: 40000,
            dst_port: 80,
            flags,
        });
        let ip = Ipv4::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 64, tcp);
        Ethernet::new(mac("00:00:00:00:00:01"), mac("00:00:00:00:00:02"), Payload::Ipv4(ip))
    }

    fn udp_frame() -> Ethernet {
        let udp = Transport::Udp(Udp {
            src_port: 5353,
            dst_port: 53,
            payload: vec![],
        });
        let ip = Ipv4::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 64, udp);
        Ethernet::new(mac("00:00:00:00:00:01"), mac("00:00:00:00:00:02"), Payload::Ipv4(ip))
    }

    fn packet_in(version: OfpVersion, m: OfpMatch) -> OfpPacketIn {
        OfpPacketIn::new(version, None, 1, m, vec![])
    }

    #[test]
    fn full_tcp_match_on_of13() {
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13);
        let matcher = PacketMatcher::new(MatchingConfig::default());
        let m = matcher.create_match(&sw, &packet_in(OfpVersion::Of13, OfpMatch::new()), &tcp_frame(0x12), 1);
        assert_eq!(
            m.fields(),
            vec![
                OxmField::InPort,
                OxmField::EthSrc,
                OxmField::EthDst,
                OxmField::EthType,
                OxmField::Ipv4Src,
                OxmField::Ipv4Dst,
                OxmField::IpProto,
                OxmField::TcpSrc,
                OxmField::TcpDst,
            ]
        );
        assert_eq!(m.in_port(), Some(1));
        assert_eq!(m.get(OxmField::TcpDst), Some(&[0, 80][..]));
    }

    #[test]
    fn tcp_flags_on_of15() {
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of15);
        let matcher = PacketMatcher::new(MatchingConfig::default());
        let m = matcher.create_match(&sw, &packet_in(OfpVersion::Of15, OfpMatch::new()), &tcp_frame(0x12), 1);
        assert_eq!(m.get(OxmField::TcpFlags), Some(&[0, 0x12][..]));
        assert!(!m.is_exact(OxmField::OvsTcpFlags));
    }

    #[test]
    fn tcp_flags_on_recent_ovs() {
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13).with_description(SwitchDescription {
            hardware: "Open vSwitch".to_owned(),
            software: "2.5.0".to_owned(),
            ..Default::default()
        });
        let matcher = PacketMatcher::new(MatchingConfig::default());
        let m = matcher.create_match(&sw, &packet_in(OfpVersion::Of13, OfpMatch::new()), &tcp_frame(0x02), 1);
        assert_eq!(m.get(OxmField::OvsTcpFlags), Some(&[0, 0x02][..]));

        let mut config = MatchingConfig::default();
        config.tcp_flag = false;
        let m = PacketMatcher::new(config).create_match(
            &sw,
            &packet_in(OfpVersion::Of13, OfpMatch::new()),
            &tcp_frame(0x02),
            1,
        );
        assert!(!m.is_exact(OxmField::OvsTcpFlags));
    }

    #[test]
    fn ovs_version_detection() {
        assert!(is_ovs_2_1_or_later("2.1.0"));
        assert!(is_ovs_2_1_or_later("3.0"));
        assert!(!is_ovs_2_1_or_later("2.0.2"));
        assert!(!is_ovs_2_1_or_later("1.11"));
        assert!(!is_ovs_2_1_or_later("2"));
        assert!(!is_ovs_2_1_or_later("unknown"));
    }

    #[test]
    fn udp_ports_honor_detail_toggles() {
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13);
        let mut config = MatchingConfig::default();
        config.transport_src = false;
        config.ip = false;
        let m = PacketMatcher::new(config).create_match(
            &sw,
            &packet_in(OfpVersion::Of13, OfpMatch::new()),
            &udp_frame(),
            1,
        );
        assert!(m.is_exact(OxmField::EthType));
        assert!(!m.is_exact(OxmField::Ipv4Src));
        assert!(m.is_exact(OxmField::IpProto));
        assert!(!m.is_exact(OxmField::UdpSrc));
        assert_eq!(m.get(OxmField::UdpDst), Some(&[0, 53][..]));
    }

    #[test]
    fn coarse_toggle_disables_fine_ones() {
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13);
        let mut config = MatchingConfig::default();
        config.mac = false;
        config.in_port = false;
        config.transport = false;
        let m = PacketMatcher::new(config).create_match(
            &sw,
            &packet_in(OfpVersion::Of13, OfpMatch::new()),
            &tcp_frame(0),
            1,
        );
        assert_eq!(m.fields(), vec![OxmField::EthType, OxmField::Ipv4Src, OxmField::Ipv4Dst]);
    }

    #[test]
    fn vlan_from_packet_in_match_or_frame() {
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13);
        let matcher = PacketMatcher::new(MatchingConfig::default());

        let mut pi_match = OfpMatch::new();
        pi_match.set(OfpOxmTlv::new_vlan_vid(42));
        let m = matcher.create_match(&sw, &packet_in(OfpVersion::Of13, pi_match), &udp_frame(), 1);
        assert_eq!(m.vlan_vid(), Some(42));

        let mut tagged = udp_frame();
        tagged.vlan = Some(7);
        let m = matcher.create_match(&sw, &packet_in(OfpVersion::Of13, OfpMatch::new()), &tagged, 1);
        assert_eq!(m.vlan_vid(), Some(7));

        let m = matcher.create_match(&sw, &packet_in(OfpVersion::Of13, OfpMatch::new()), &udp_frame(), 1);
        assert!(!m.is_exact(OxmField::VlanVid));
    }

    #[test]
    fn of10_ignores_packet_in_match_vlan() {
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of10);
        let matcher = PacketMatcher::new(MatchingConfig::default());
        let mut pi_match = OfpMatch::new();
        pi_match.set(OfpOxmTlv::new_vlan_vid(42));
        let m = matcher.create_match(&sw, &packet_in(OfpVersion::Of10, pi_match), &udp_frame(), 1);
        assert!(!m.is_exact(OxmField::VlanVid));
    }

    #[test]
    fn arp_and_unknown_ethertypes() {
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13);
        let matcher = PacketMatcher::new(MatchingConfig::default());
        let mut frame = Ethernet::new(
            mac("00:00:00:00:00:01"),
            mac("00:00:00:00:00:02"),
            Payload::Unparsable(vec![0; 28]),
        );
        frame.ether_type = ETH_TYPE_ARP;
        let m = matcher.create_match(&sw, &packet_in(OfpVersion::Of13, OfpMatch::new()), &frame, 3);
        assert_eq!(m.get(OxmField::EthType), Some(&[0x08, 0x06][..]));

        frame.ether_type = 0x88cc;
        let m = matcher.create_match(&sw, &packet_in(OfpVersion::Of13, OfpMatch::new()), &frame, 3);
        assert_eq!(m.fields(), vec![OxmField::InPort, OxmField::EthSrc, OxmField::EthDst]);
    }
}
