/*!
Bookkeeping of flowsets: which switch ports a flowset's rules touch and
which flowsets traverse a switch port.

Both directions of the index are kept behind one lock so that every
mutation updates them together. For each pair the node port is in the
flowset's port set iff the flowset is in the node port's id set.
*/

use cookie::{FlowsetId, FLOWSET_MAX};
use types::NodePort;

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

#[derive(Debug, Default)]
struct Index {
    by_port: HashMap<NodePort, HashSet<FlowsetId>>,
    by_flowset: HashMap<FlowsetId, HashSet<NodePort>>,
}

/// Mints flowset ids and indexes them by the switch ports they traverse.
///
/// One instance is shared by the packet-in reactor and the topology
/// reaper for the lifetime of the forwarding module.
#[derive(Debug)]
pub struct FlowsetRegistry {
    generator: Mutex<i64>,
    index: RwLock<Index>,
}

impl Default for FlowsetRegistry {
    fn default() -> Self {
        FlowsetRegistry::new()
    }
}

impl FlowsetRegistry {
    pub fn new() -> FlowsetRegistry {
        FlowsetRegistry {
            generator: Mutex::new(-1),
            index: RwLock::new(Index::default()),
        }
    }

    /// Sets the generator's counter. The next generated id will use `counter + 1`.
    pub fn seed(&self, counter: i64) {
        *self.generator.lock().unwrap_or_else(|e| e.into_inner()) = counter;
    }

    /// Returns the next flowset id.
    /// After `FLOWSET_MAX` the counter restarts at 0.
    pub fn generate(&self) -> FlowsetId {
        let mut counter = self.generator.lock().unwrap_or_else(|e| e.into_inner());
        *counter += 1;
        if (*counter as u64) > FLOWSET_MAX {
            *counter = 0;
            warn!(
                "Flowset IDs have exceeded capacity of {}. Flowset ID generator resetting back to 0",
                FLOWSET_MAX
            );
        }
        let id = FlowsetId::from_counter(*counter as u64);
        debug!("Generating flowset ID {}, shifted {:#x}", *counter, id.as_cookie());
        id
    }

    /// Records that the flowset's rules touch `npt`.
    pub fn register(&self, npt: NodePort, id: FlowsetId) {
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        index.by_port.entry(npt).or_insert_with(HashSet::new).insert(id);
        index.by_flowset.entry(id).or_insert_with(HashSet::new).insert(npt);
    }

    /// Gets the flowsets traversing `npt`, possibly none.
    pub fn ids_for(&self, npt: &NodePort) -> HashSet<FlowsetId> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        index.by_port.get(npt).cloned().unwrap_or_default()
    }

    /// Gets the node ports a flowset touches, possibly none.
    pub fn node_ports_for(&self, id: &FlowsetId) -> HashSet<NodePort> {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        index.by_flowset.get(id).cloned().unwrap_or_default()
    }

    /// Removes `npt` from both directions of the index.
    pub fn forget(&self, npt: &NodePort) {
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        if let Some(ids) = index.by_port.remove(npt) {
            for id in ids {
                let now_empty = match index.by_flowset.get_mut(&id) {
                    Some(npts) => {
                        npts.remove(npt);
                        npts.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    index.by_flowset.remove(&id);
                }
            }
        }
    }

    /// Removes the flowset from both directions of the index.
    ///
    /// Callers walking the flowsets of a node port iterate over the
    /// snapshot returned by `ids_for`, so expiring any id while doing so
    /// is safe, including the id currently visited.
    pub fn expire(&self, id: &FlowsetId) {
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        if let Some(npts) = index.by_flowset.remove(id) {
            for npt in npts {
                let now_empty = match index.by_port.get_mut(&npt) {
                    Some(ids) => {
                        ids.remove(id);
                        ids.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    index.by_port.remove(&npt);
                }
            }
        }
    }

    /// Checks that each direction of the index is the inverse of the other
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        let index = self.index.read().unwrap();
        let forward = index.by_port.iter().all(|(npt, ids)| {
            ids.iter().all(|id| index.by_flowset.get(id).map_or(false, |n| n.contains(npt)))
        });
        let backward = index.by_flowset.iter().all(|(id, npts)| {
            npts.iter().all(|npt| index.by_port.get(npt).map_or(false, |i| i.contains(id)))
        });
        forward && backward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::DatapathId;

    fn npt(sw: u64, port: u32) -> NodePort {
        NodePort::new(DatapathId(sw), port)
    }

    #[test]
    fn first_id_is_zero_and_ids_increase() {
        let testee = FlowsetRegistry::new();
        let ids: Vec<_> = (0..5).map(|_| testee.generate().counter()).collect();
        assert_eq!(vec![0, 1, 2, 3, 4], ids);
    }

    #[test]
    fn generator_wraps_after_max() {
        let testee = FlowsetRegistry::new();
        testee.seed(FLOWSET_MAX as i64 - 1);
        assert_eq!(FLOWSET_MAX, testee.generate().counter());
        assert_eq!(0, testee.generate().counter());
        assert_eq!(1, testee.generate().counter());
    }

    #[test]
    fn register_is_idempotent() {
        let testee = FlowsetRegistry::new();
        let id = testee.generate();
        testee.register(npt(1, 1), id);
        testee.register(npt(1, 1), id);
        assert_eq!(1, testee.ids_for(&npt(1, 1)).len());
        assert_eq!(1, testee.node_ports_for(&id).len());
        assert!(testee.is_consistent());
    }

    #[test]
    fn lookups_of_unknown_keys_are_empty() {
        let testee = FlowsetRegistry::new();
        assert!(testee.ids_for(&npt(9, 9)).is_empty());
        assert!(testee.node_ports_for(&FlowsetId::from_counter(9)).is_empty());
    }

    #[test]
    fn forget_removes_node_port_everywhere() {
        let testee = FlowsetRegistry::new();
        let a = testee.generate();
        let b = testee.generate();
        testee.register(npt(1, 1), a);
        testee.register(npt(1, 2), a);
        testee.register(npt(1, 1), b);
        testee.forget(&npt(1, 1));
        assert!(testee.ids_for(&npt(1, 1)).is_empty());
        assert_eq!(vec![npt(1, 2)], testee.node_ports_for(&a).into_iter().collect::<Vec<_>>());
        assert!(testee.node_ports_for(&b).is_empty());
        assert!(testee.is_consistent());
    }

    #[test]
    fn expire_removes_flowset_everywhere() {
        let testee = FlowsetRegistry::new();
        let a = testee.generate();
        let b = testee.generate();
        for p in 1..4 {
            testee.register(npt(p, p as u32), a);
        }
        testee.register(npt(1, 1), b);

        for id in testee.ids_for(&npt(1, 1)) {
            if id == a {
                testee.expire(&id);
            }
        }

        assert!(testee.node_ports_for(&a).is_empty());
        assert!(testee.ids_for(&npt(2, 2)).is_empty());
        assert!(testee.ids_for(&npt(3, 3)).is_empty());
        assert_eq!(vec![b], testee.ids_for(&npt(1, 1)).into_iter().collect::<Vec<_>>());
        assert!(testee.is_consistent());
    }

    #[test]
    fn index_stays_consistent_under_mixed_operations() {
        let testee = FlowsetRegistry::new();
        let ids: Vec<_> = (0..8).map(|_| testee.generate()).collect();
        for (i, id) in ids.iter().enumerate() {
            for p in 0..(i as u32 % 4 + 1) {
                testee.register(npt(i as u64 % 3, p), *id);
            }
        }
        assert!(testee.is_consistent());
        testee.forget(&npt(0, 0));
        assert!(testee.is_consistent());
        testee.expire(&ids[3]);
        testee.expire(&ids[5]);
        assert!(testee.is_consistent());
        testee.forget(&npt(2, 1));
        testee.register(npt(2, 1), ids[0]);
        assert!(testee.is_consistent());
        assert!(testee.node_ports_for(&ids[3]).is_empty());
    }

    #[test]
    fn concurrent_generation_yields_unique_ids() {
        use std::sync::Arc;
        use std::thread;

        let testee = Arc::new(FlowsetRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = testee.clone();
                thread::spawn(move || (0..100).map(|_| registry.generate()).collect::<Vec<_>>())
            })
            .collect();
        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id));
            }
        }
        assert_eq!(400, all.len());
    }
}
