/*!
Removal of flowsets that went stale with a topology change.

When a link is removed or a port goes down, every flowset whose rules
traverse one of the affected endpoints is deleted on every hop it touches.
The rules are addressed by their cookie, with the flowset and application
slots significant, once matching the port as ingress and once as egress.
*/

use cookie::{app_field_mask, FlowsetId, DEFAULT_FORWARDING_COOKIE, FLOWSET_MASK};
use damper::MessageDamper;
use flowset::FlowsetRegistry;
use openflow::messages::{OfpFlowMod, OfpFlowModCommand, OfpMatch, OfpMessage, OfpOxmTlv, OfpVersion};
use services::{LinkDiscoveryListener, LinkUpdate, OfSwitch, SwitchService};
use types::NodePort;

use std::sync::Arc;

pub struct Reaper {
    registry: Arc<FlowsetRegistry>,
    switches: Arc<dyn SwitchService>,
    damper: Arc<MessageDamper>,
}

/// Builds the two deletions of a flowset's rules using `port`
fn deletions(version: OfpVersion, id: FlowsetId, port: u32) -> [OfpMessage; 2] {
    let cookie = id.as_cookie() | DEFAULT_FORWARDING_COOKIE;
    let mask = FLOWSET_MASK | app_field_mask();
    let delete = || {
        OfpFlowMod::new(version, OfpFlowModCommand::Delete)
            .with_cookie(cookie)
            .with_cookie_mask(mask)
    };

    let mut in_port = OfpMatch::new();
    in_port.set(OfpOxmTlv::new_in_port(port));
    [
        delete().with_match(in_port).into(),
        delete().with_out_port(port).into(),
    ]
}

impl Reaper {
    pub fn new(
        registry: Arc<FlowsetRegistry>,
        switches: Arc<dyn SwitchService>,
        damper: Arc<MessageDamper>,
    ) -> Reaper {
        Reaper {
            registry,
            switches,
            damper,
        }
    }

    fn delete_on(&self, sw: &dyn OfSwitch, id: FlowsetId, port: u32) {
        for msg in &deletions(sw.version(), id, port) {
            if let Err(e) = self.damper.write(sw, msg) {
                warn!("Unable to delete flowset {} on {}/{}: {}", id.counter(), sw.id(), port, e);
            }
        }
    }

    /// Deletes every flowset traversing `npt` and forgets the port
    pub fn remove_flowsets_at(&self, npt: NodePort) {
        if let Some(sw) = self.switches.switch(npt.node) {
            let ids = self.registry.ids_for(&npt);
            if !ids.is_empty() {
                debug!("Removing {} flowsets touching {}", ids.len(), npt);
            }
            for id in ids {
                self.delete_on(&*sw, id, npt.port);

                for other in self.registry.node_ports_for(&id) {
                    if other == npt {
                        continue;
                    }
                    match self.switches.switch(other.node) {
                        Some(other_sw) => self.delete_on(&*other_sw, id, other.port),
                        None => trace!("Switch {} of flowset {} is gone", other.node, id.counter()),
                    }
                }
                self.registry.expire(&id);
            }
        }
        self.registry.forget(&npt);
    }
}

impl LinkDiscoveryListener for Reaper {
    fn link_discovery_update(&self, updates: &[LinkUpdate]) {
        for update in updates.iter().filter(|u| u.is_teardown()) {
            if !update.src.is_none() {
                debug!("{:?} at {}/{}", update.operation, update.src, update.src_port);
                self.remove_flowsets_at(NodePort::new(update.src, update.src_port));
            }
            if !update.dst.is_none() {
                debug!("{:?} at {}/{}", update.operation, update.dst, update.dst_port);
                self.remove_flowsets_at(NodePort::new(update.dst, update.dst_port));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookie::{extract_app, extract_flowset, FORWARDING_APP_ID};
    use services::UpdateOperation;
    use testutil::{dpid, Env};
    use types::DatapathId;

    fn reaper(env: &Env) -> Reaper {
        Reaper::new(env.registry.clone(), env.switches.clone(), env.damper.clone())
    }

    #[test]
    fn link_removal_reaps_every_hop() {
        let env = Env::new();
        let sa = env.add_switch(1, OfpVersion::Of13, &[1, 2]);
        let sb = env.add_switch(2, OfpVersion::Of13, &[1, 2]);
        let sc = env.add_switch(3, OfpVersion::Of13, &[1, 2]);
        let id = env.registry.generate();
        let a = NodePort::new(dpid(1), 2);
        let b = NodePort::new(dpid(2), 1);
        let c = NodePort::new(dpid(3), 2);
        for npt in &[a, b, c] {
            env.registry.register(*npt, id);
        }

        reaper(&env).link_discovery_update(&[LinkUpdate::link_removed(a, b)]);

        let all: Vec<_> = sa.flow_mods()
            .into_iter()
            .chain(sb.flow_mods())
            .chain(sc.flow_mods())
            .collect();
        assert_eq!(all.len(), 6);
        for fm in &all {
            assert_eq!(fm.command(), OfpFlowModCommand::Delete);
            assert_eq!(extract_flowset(fm.cookie()), id);
            assert_eq!(extract_app(fm.cookie()), FORWARDING_APP_ID);
            assert_eq!(fm.cookie_mask(), Some(FLOWSET_MASK | app_field_mask()));
        }
        for (sw, port) in &[(&sa, 2), (&sb, 1), (&sc, 2)] {
            let fms = sw.flow_mods();
            assert_eq!(fms.len(), 2);
            assert_eq!(fms[0].match_field().in_port(), Some(*port));
            assert_eq!(fms[1].match_field().in_port(), None);
            assert_eq!(fms[1].out_port(), *port);
        }

        assert!(env.registry.node_ports_for(&id).is_empty());
        assert!(env.registry.ids_for(&a).is_empty());
        assert!(env.registry.ids_for(&c).is_empty());
        assert!(env.registry.is_consistent());
    }

    #[test]
    fn of10_deletions_have_no_mask() {
        let env = Env::new();
        let sw = env.add_switch(1, OfpVersion::Of10, &[1]);
        let id = env.registry.generate();
        env.registry.register(NodePort::new(dpid(1), 1), id);

        reaper(&env).link_discovery_update(&[LinkUpdate::port_down(dpid(1), 1)]);

        let fms = sw.flow_mods();
        assert_eq!(fms.len(), 2);
        assert!(fms.iter().all(|fm| fm.cookie_mask().is_none() && fm.table_id().is_none()));
    }

    #[test]
    fn other_updates_are_ignored() {
        let env = Env::new();
        let sw = env.add_switch(1, OfpVersion::Of13, &[1]);
        let id = env.registry.generate();
        let npt = NodePort::new(dpid(1), 1);
        env.registry.register(npt, id);

        let mut update = LinkUpdate::port_down(dpid(1), 1);
        update.operation = UpdateOperation::PortUp;
        reaper(&env).link_discovery_update(&[update]);

        assert!(sw.written().is_empty());
        assert!(env.registry.ids_for(&npt).contains(&id));
    }

    #[test]
    fn unknown_switch_is_forgotten() {
        let env = Env::new();
        let id = env.registry.generate();
        let npt = NodePort::new(dpid(7), 1);
        env.registry.register(npt, id);

        reaper(&env).link_discovery_update(&[LinkUpdate::port_down(dpid(7), 1)]);

        assert!(env.registry.ids_for(&npt).is_empty());
        assert!(env.registry.node_ports_for(&id).is_empty());
    }

    #[test]
    fn every_flowset_on_the_port_is_reaped() {
        let env = Env::new();
        let sw = env.add_switch(1, OfpVersion::Of13, &[1, 2]);
        let npt = NodePort::new(dpid(1), 1);
        let first = env.registry.generate();
        let second = env.registry.generate();
        env.registry.register(npt, first);
        env.registry.register(npt, second);
        env.registry.register(NodePort::new(dpid(1), 2), second);

        let update = LinkUpdate {
            operation: UpdateOperation::TunnelPortRemoved,
            src: DatapathId::NONE,
            src_port: 0,
            dst: dpid(1),
            dst_port: 1,
        };
        reaper(&env).link_discovery_update(&[update]);

        // two for the first flowset, four for the second
        assert_eq!(sw.flow_mods().len(), 6);
        assert!(env.registry.node_ports_for(&second).is_empty());
        assert!(env.registry.is_consistent());
    }
}
