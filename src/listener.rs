//! Ordered dispatch of packet-ins to the registered listeners

use openflow::messages::OfpPacketIn;
use services::{Command, OfSwitch, PacketContext, PacketInListener};

use std::error;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, PartialEq)]
pub struct CycleError(pub Vec<String>);

impl error::Error for CycleError {
    fn description(&self) -> &str {
        "cyclic listener ordering"
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cyclic ordering between listeners {}", self.0.join(", "))
    }
}

/// Packet-in listeners in an order that satisfies their `after`/`before` constraints.
/// Listeners without constraints between them keep their registration order.
#[derive(Default)]
pub struct ListenerChain {
    listeners: Vec<Arc<dyn PacketInListener>>,
}

impl ListenerChain {
    pub fn new() -> ListenerChain {
        ListenerChain { listeners: vec![] }
    }

    /// Adds a listener and reorders the chain.
    /// On a cycle the chain stays as it was.
    pub fn register(&mut self, listener: Arc<dyn PacketInListener>) -> Result<(), CycleError> {
        let mut candidate = self.listeners.clone();
        candidate.push(listener);
        self.listeners = order(candidate)?;
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }

    /// Hands the packet to each listener in turn until one of them stops it
    pub fn dispatch(&self, sw: &dyn OfSwitch, pi: &OfpPacketIn, ctx: &mut PacketContext) -> Command {
        for listener in &self.listeners {
            if let Command::Stop = listener.receive(sw, pi, ctx) {
                debug!("Listener {} stopped processing the packet-in", listener.name());
                return Command::Stop;
            }
        }
        Command::Continue
    }
}

fn order(listeners: Vec<Arc<dyn PacketInListener>>) -> Result<Vec<Arc<dyn PacketInListener>>, CycleError> {
    let n = listeners.len();
    let index_of = |name: &str| listeners.iter().position(|l| l.name() == name);

    // successors[i] must run after i
    let mut successors = vec![vec![]; n];
    let mut predecessors = vec![0usize; n];
    for (i, l) in listeners.iter().enumerate() {
        for name in l.after() {
            if let Some(j) = index_of(name) {
                successors[j].push(i);
                predecessors[i] += 1;
            }
        }
        for name in l.before() {
            if let Some(j) = index_of(name) {
                successors[i].push(j);
                predecessors[j] += 1;
            }
        }
    }

    let mut done = vec![false; n];
    let mut ordered = Vec::with_capacity(n);
    while ordered.len() < n {
        let next = (0..n).find(|&i| !done[i] && predecessors[i] == 0);
        match next {
            Some(i) => {
                done[i] = true;
                for &j in &successors[i] {
                    predecessors[j] -= 1;
                }
                ordered.push(i);
            }
            None => {
                let cycle = (0..n)
                    .filter(|&i| !done[i])
                    .map(|i| listeners[i].name().to_owned())
                    .collect();
                return Err(CycleError(cycle));
            }
        }
    }
    Ok(ordered.into_iter().map(|i| listeners[i].clone()).collect())
}
