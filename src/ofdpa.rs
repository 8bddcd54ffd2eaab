/*!
Support for switches running Broadcom's OpenFlow Data Plane Abstraction.

OF-DPA hardware has a fixed multi-table pipeline. Bridged traffic needs a
VLAN assignment in the VLAN table, a bridging table rule that writes an L2
interface group, and the group itself, which pops the VLAN tag again for
access ports.
*/

use openflow::messages::{OfpAction, OfpBucket, OfpFlowMod, OfpFlowModCommand, OfpGroupMod,
                         OfpGroupModCommand, OfpGroupType, OfpInstruction, OfpMatch, OfpMessage,
                         OfpOxmTlv, OfpVersion, OxmField, ProtocolEndpoint, OFPG_ANY, OFPP_CONTROLLER,
                         OFPTT_ALL};
use services::OfSwitch;
use types::MacAddr;

pub const VLAN_TABLE: u8 = 10;
pub const TERMINATION_MAC_TABLE: u8 = 20;
pub const BRIDGING_TABLE: u8 = 50;
pub const ACL_TABLE: u8 = 60;

/// OF-DPA cannot bridge untagged traffic, so access ports use this VLAN internally
pub const UNTAGGED_VLAN: u16 = 1;

const PREREQ_PRIORITY: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortMode {
    /// Untagged traffic is assigned the port's VLAN
    Access,
    /// Traffic arrives tagged
    Trunk,
}

/// Detects an OF-DPA switch by its software description
pub fn is_ofdpa_switch(sw: &dyn OfSwitch) -> bool {
    sw.description().software.to_lowercase().contains("of-dpa")
}

fn internal_vlan(vlan: u16) -> u16 {
    if vlan == 0 {
        UNTAGGED_VLAN
    }
    else {
        vlan
    }
}

/// The id of the L2 interface group of `port` in `vlan`
pub fn l2_interface_group_id(vlan: u16, port: u32) -> u32 {
    (u32::from(internal_vlan(vlan) & 0x0fff) << 16) | (port & 0xffff)
}

/// Removes all flows and groups, followed by a barrier
pub fn reset_messages(version: OfpVersion) -> Vec<OfpMessage> {
    vec![
        OfpFlowMod::new(version, OfpFlowModCommand::Delete)
            .with_table_id(OFPTT_ALL)
            .into(),
        OfpGroupMod::new(version, OfpGroupModCommand::Delete, OfpGroupType::All, OFPG_ANY, vec![]).into(),
        OfpGroupMod::new(version, OfpGroupModCommand::Delete, OfpGroupType::Indirect, OFPG_ANY, vec![]).into(),
        OfpMessage::BarrierRequest,
    ]
}

/// Builds the groups and flows every port needs before learned flows can be added.
/// Trunk ports are not supported yet and skipped.
pub fn learning_switch_prereqs(version: OfpVersion, vlan: u16, ports: &[(u32, PortMode)]) -> Vec<OfpMessage> {
    let vlan = internal_vlan(vlan);
    let mut msgs = vec![];
    for &(port, mode) in ports {
        if mode != PortMode::Access {
            warn!("Skipping OF-DPA trunk port {}", port);
            continue;
        }
        let bucket = OfpBucket {
            actions: vec![OfpAction::PopVlan, OfpAction::output(port)],
        };
        msgs.push(
            OfpGroupMod::new(
                version,
                OfpGroupModCommand::Add,
                OfpGroupType::Indirect,
                l2_interface_group_id(vlan, port),
                vec![bucket],
            ).into(),
        );

        let mut m = OfpMatch::new();
        m.set(OfpOxmTlv::new_in_port(port));
        m.set(OfpOxmTlv::new_vlan_none());
        msgs.push(
            OfpFlowMod::new(version, OfpFlowModCommand::Add)
                .with_table_id(VLAN_TABLE)
                .with_priority(PREREQ_PRIORITY)
                .with_match(m)
                .with_instructions(vec![
                    OfpInstruction::ApplyActions(vec![OfpAction::SetField(OfpOxmTlv::new_vlan_vid(vlan))]),
                    OfpInstruction::GotoTable(TERMINATION_MAC_TABLE),
                ])
                .into(),
        );
    }

    // unmatched packets go to the controller
    msgs.push(
        OfpFlowMod::new(version, OfpFlowModCommand::Add)
            .with_table_id(ACL_TABLE)
            .with_priority(0)
            .with_actions(vec![OfpAction::output(OFPP_CONTROLLER)])
            .into(),
    );
    msgs
}

/// Settings of a bridging flow
#[derive(Debug, Clone, Copy)]
pub struct FlowSettings {
    pub cookie: u64,
    pub priority: u16,
    pub hard_timeout: u16,
    pub idle_timeout: u16,
}

/// Builds the bridging table flow forwarding the destination MAC of `m`
/// to the L2 interface group of `out_port`. The VLAN is taken from `m`,
/// then from `out_vlan`. Without a destination MAC nothing can be bridged.
pub fn learning_switch_flow(
    version: OfpVersion,
    settings: FlowSettings,
    m: &OfpMatch,
    out_vlan: Option<u16>,
    out_port: u32,
) -> Option<OfpMessage> {
    let dst = match m.get(OxmField::EthDst) {
        Some(b) if b.len() == 6 => {
            let mut mac = [0; 6];
            mac.copy_from_slice(b);
            MacAddr(mac)
        }
        _ => {
            warn!("Cannot add an OF-DPA bridging flow without destination MAC");
            return None;
        }
    };
    let vlan = internal_vlan(m.vlan_vid().or(out_vlan).unwrap_or(0));

    let mut bridging = OfpMatch::new();
    bridging.set(OfpOxmTlv::new_vlan_vid(vlan));
    bridging.set(OfpOxmTlv::new_eth(dst, ProtocolEndpoint::Dst));

    Some(
        OfpFlowMod::new(version, OfpFlowModCommand::Add)
            .with_table_id(BRIDGING_TABLE)
            .with_cookie(settings.cookie)
            .with_priority(settings.priority)
            .with_timeouts(settings.idle_timeout, settings.hard_timeout)
            .with_match(bridging)
            .with_instructions(vec![
                OfpInstruction::WriteActions(vec![OfpAction::Group(l2_interface_group_id(vlan, out_port))]),
                OfpInstruction::GotoTable(ACL_TABLE),
            ])
            .into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use openflow::messages::SwitchDescription;
    use testutil::{dpid, mac, MockSwitch};

    #[test]
    fn detection() {
        let sw = MockSwitch::new(dpid(1), OfpVersion::Of13).with_description(SwitchDescription {
            software: "OF-DPA 2.0".to_owned(),
            ..Default::default()
        });
        assert!(is_ofdpa_switch(&sw));
        assert!(!is_ofdpa_switch(&MockSwitch::new(dpid(1), OfpVersion::Of13)));
    }

    #[test]
    fn group_ids() {
        assert_eq!(l2_interface_group_id(10, 3), 0x000a_0003);
        assert_eq!(l2_interface_group_id(0, 3), 0x0001_0003);
    }

    #[test]
    fn reset_deletes_everything() {
        let msgs = reset_messages(OfpVersion::Of13);
        assert_eq!(msgs.len(), 4);
        let fm = msgs[0].as_flow_mod().unwrap();
        assert_eq!(fm.command(), OfpFlowModCommand::Delete);
        assert_eq!(fm.table_id(), Some(OFPTT_ALL));
        match msgs[2] {
            OfpMessage::GroupMod(ref gm) => {
                assert_eq!(gm.group_type(), OfpGroupType::Indirect);
                assert_eq!(gm.group_id(), OFPG_ANY);
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert_eq!(msgs[3], OfpMessage::BarrierRequest);
    }

    #[test]
    fn prereqs_per_access_port() {
        let msgs = learning_switch_prereqs(
            OfpVersion::Of13,
            0,
            &[(1, PortMode::Access), (2, PortMode::Trunk), (3, PortMode::Access)],
        );
        // group and VLAN flow per access port plus the ACL miss flow
        assert_eq!(msgs.len(), 5);
        let vlan_flow = msgs[1].as_flow_mod().unwrap();
        assert_eq!(vlan_flow.table_id(), Some(VLAN_TABLE));
        assert_eq!(vlan_flow.match_field().in_port(), Some(1));
        let miss = msgs[4].as_flow_mod().unwrap();
        assert_eq!(miss.table_id(), Some(ACL_TABLE));
        assert_eq!(miss.priority(), 0);
    }

    #[test]
    fn bridging_flow_writes_group() {
        let mut m = OfpMatch::new();
        m.set(OfpOxmTlv::new_in_port(1));
        m.set(OfpOxmTlv::new_eth(mac("00:00:00:00:00:02"), ProtocolEndpoint::Dst));
        let settings = FlowSettings {
            cookie: 7,
            priority: 1,
            hard_timeout: 0,
            idle_timeout: 5,
        };
        let msg = learning_switch_flow(OfpVersion::Of13, settings, &m, None, 4).unwrap();
        let fm = msg.as_flow_mod().unwrap();
        assert_eq!(fm.table_id(), Some(BRIDGING_TABLE));
        assert_eq!(fm.match_field().vlan_vid(), Some(UNTAGGED_VLAN));
        assert!(!fm.match_field().is_exact(OxmField::InPort));
        assert_eq!(
            fm.instructions()[0],
            OfpInstruction::WriteActions(vec![OfpAction::Group(l2_interface_group_id(0, 4))])
        );

        assert!(learning_switch_flow(OfpVersion::Of13, settings, &OfpMatch::new(), None, 4).is_none());
    }
}
