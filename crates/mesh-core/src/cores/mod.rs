//! Routing cores (§4.4): the pluggable top-level routing state machines.
//!
//! Expressed as tagged variants over one `RoutingCore` enum rather than a
//! trait object, per the design note in §9 — the device loop holds a
//! concrete `RoutingCore` value and dispatches through a handful of inherent
//! methods that match on the variant.

mod forwarder;
mod home;
mod root;

pub use forwarder::ForwarderCore;
pub use home::HomeCore;
pub use root::RootCore;

use crate::messages::{PeerMessage, SiblingMessage};
use crate::routing_table::{Hop, Interface, RoutingTable};
use crate::types::{Orientation, TimeSource};

/// The narrow surface a routing core uses to cause externally visible side
/// effects. Implemented by `Device` (device.rs); cores never store a
/// back-reference to their device, only borrow one for the duration of a
/// hook call (§9 cyclic-reference resolution).
pub trait DeviceOutput {
    fn send_peer_message(&mut self, message: &PeerMessage);
    /// Returns `true` once the frame has been placed on the wire (the token
    /// ring never fails to accept a broadcast in this design).
    fn broadcast_to_siblings(&mut self, message: SiblingMessage) -> bool;
    fn switch_default_gateway(&mut self, iface: Interface);
    fn add_route(&mut self, network: u32, mask: u32, iface: Interface);
    fn remove_route(&mut self, network: u32, mask: u32);
    /// Remove a hop from the device-local legacy table (`ROUTE_LOST`), as
    /// distinct from `remove_route`'s node-global table.
    fn remove_legacy_route(&mut self, network: u32, mask: u32);
    fn remove_routes_for_interface(&mut self, iface: Interface) -> Vec<Hop>;
    fn enable_ap_mode(&mut self, network: u32, mask: u32);
    /// Wholesale replacement of the node-global table (`UPDATE_NODE_TABLE`
    /// received from a sibling).
    fn replace_routing_table(&mut self, entries: Vec<(u32, u32, Interface)>);
    /// Broadcast the current node-global table as `UPDATE_NODE_TABLE`.
    fn broadcast_routing_table(&mut self) -> bool;
    /// Read-only access to the node-global table, for forwarding decisions.
    fn routing_table(&self) -> &RoutingTable;
    /// Record an observer event (§4.6) and mirror it to the log stream.
    /// Token-ring control messages never reach this call (§4.6).
    fn emit_event(&mut self, name: &str, fields: &[(&str, String)]);
}

/// An event buffered on a routing core's internal FIFOs until the next
/// critical section (§3 event queues, §4.4 "only enqueue").
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Connected { network: u32, mask: u32 },
    Message(PeerMessage),
    Lost { network: u32, mask: u32 },
}

/// One of the four concrete routing cores a sub-device can run.
pub enum RoutingCore {
    Forwarder(ForwarderCore),
    Home(HomeCore),
    Root(RootCore),
}

impl RoutingCore {
    pub fn new_forwarder(orientation: Orientation) -> Self {
        RoutingCore::Forwarder(ForwarderCore::new(orientation, false))
    }

    pub fn new_root_forwarder(orientation: Orientation) -> Self {
        RoutingCore::Forwarder(ForwarderCore::new(orientation, true))
    }

    pub fn new_home() -> Self {
        RoutingCore::Home(HomeCore::new())
    }

    pub fn new_root(time_source: std::sync::Arc<dyn TimeSource>) -> Self {
        RoutingCore::Root(RootCore::new(time_source))
    }

    pub fn on_start(&mut self, out: &mut dyn DeviceOutput) {
        match self {
            RoutingCore::Forwarder(c) => c.on_start(out),
            RoutingCore::Home(c) => c.on_start(out),
            RoutingCore::Root(c) => c.on_start(out),
        }
    }

    pub fn on_peer_connected(&mut self, network: u32, mask: u32) {
        match self {
            RoutingCore::Forwarder(c) => c.on_peer_connected(network, mask),
            RoutingCore::Home(_) | RoutingCore::Root(_) => {}
        }
    }

    pub fn on_peer_lost(&mut self, network: u32, mask: u32) {
        match self {
            RoutingCore::Forwarder(c) => c.on_peer_lost(network, mask),
            RoutingCore::Home(_) | RoutingCore::Root(_) => {}
        }
    }

    pub fn on_peer_message(&mut self, message: PeerMessage) {
        match self {
            RoutingCore::Forwarder(c) => c.on_peer_message(message),
            RoutingCore::Home(_) | RoutingCore::Root(_) => {}
        }
    }

    /// Forwarders still defer every sibling message through their own
    /// critical-section-gated queue; home and root apply `UPDATE_NODE_TABLE`
    /// (and, for root, `SEND_NEW_GTW_REQUEST`) immediately (§4.4.5, §4.4.6).
    pub fn on_sibling_message(&mut self, message: SiblingMessage, out: &mut dyn DeviceOutput) {
        match self {
            RoutingCore::Forwarder(c) => c.on_sibling_message(message),
            RoutingCore::Home(c) => c.on_sibling_message(message, out),
            RoutingCore::Root(c) => c.on_sibling_message(message, out),
        }
    }

    pub fn on_tick(&mut self, out: &mut dyn DeviceOutput) {
        match self {
            RoutingCore::Forwarder(_) | RoutingCore::Home(_) => {}
            RoutingCore::Root(c) => c.on_tick(out),
        }
    }

    pub fn on_critical_section(&mut self, out: &mut dyn DeviceOutput) {
        match self {
            RoutingCore::Forwarder(c) => c.on_critical_section(out),
            RoutingCore::Home(c) => c.on_critical_section(out),
            RoutingCore::Root(c) => c.on_critical_section(out),
        }
    }

    pub fn on_forward(&mut self, src: u32, dst: u32, out: &dyn DeviceOutput) {
        match self {
            RoutingCore::Forwarder(c) => c.on_forward(src, dst, out.routing_table()),
            RoutingCore::Home(_) => {}
            RoutingCore::Root(c) => c.on_forward(src, dst),
        }
    }

    /// Forwarding decision is identical across variants: consult the
    /// node-global table Device hands in and surface only orientation hops
    /// (§4.4.1); raw `spi`/`wlan` seed hops yield `None`.
    pub fn do_forward(&self, dst: u32, out: &dyn DeviceOutput) -> Option<Orientation> {
        out.routing_table().route(dst).interface.as_orientation()
    }

    pub fn on_change_default_gateway(&mut self, iface: Interface, out: &mut dyn DeviceOutput) {
        if let RoutingCore::Forwarder(c) = self {
            c.on_change_default_gateway(iface, out);
        }
    }

    pub fn status(&self, out: &dyn DeviceOutput) -> String {
        let table = out.routing_table();
        match self {
            RoutingCore::Forwarder(c) => c.status(table),
            RoutingCore::Home(c) => c.status(table),
            RoutingCore::Root(c) => c.status(table),
        }
    }
}
