/*!
The reactive forwarding core of an OpenFlow controller.

Packets punted to the controller are classified, matched against the
attachment points known to the device service and forwarded along a path
computed by the routing service. Every rule installed for one connection
shares a flowset id that is encoded into its cookie, so that a link or port
going down anywhere on the path removes the whole family of rules.

A virtual gateway answers ARP and ICMP echo requests addressed to
controller owned gateway IPs before the forwarding reactor sees them.

The surrounding services (switch connections, topology, devices, routing)
are described by the traits in [`services`](services/index.html).
The `offorward` binary wires them to a small standalone OpenFlow 1.3
controller.
*/

#[macro_use]
extern crate log;
extern crate byteorder;
extern crate ini;
extern crate ipnetwork;
extern crate notify;
extern crate rand;

pub mod conf;
pub mod cookie;
pub mod damper;
pub mod flowset;
pub mod forwarding;
pub mod gateway;
pub mod listener;
pub mod local;
pub mod matcher;
pub mod ofdpa;
pub mod openflow;
pub mod packet;
pub mod reaper;
pub mod services;
pub mod types;

#[cfg(test)]
mod testutil;
