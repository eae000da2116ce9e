//! Per-forwarder network state (§3).
//!
//! The node-global routing table itself is owned by `Device`, not by this
//! struct — a routing core only ever reaches it through the `DeviceOutput`
//! surface (mutation) or a borrowed reference passed into read-only hooks
//! like `do_forward` (§9 cyclic-reference resolution).

use crate::types::Orientation;

/// Whether this sub-device currently has a wireless peer attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    NotConnected,
    Connected,
}

/// Provisioning state of this sub-device's node-global subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalState {
    WithoutNetwork,
    WithNetwork,
    OnGtwReq,
}

/// The state a `ForwarderCore`/`RootForwarderCore` carries between
/// invocations: its slice of the node-global subnet assignment, its distance
/// to the root, and the node-global routing table it replicates.
#[derive(Debug, Clone)]
pub struct Network {
    pub orientation: Orientation,
    pub node_network: u32,
    pub node_network_mask: u32,
    pub my_network: u32,
    pub my_network_mask: u32,
    pub my_wlan_ip: Option<u32>,
    pub is_local_root: bool,
    pub dtr: u32,
    pub local_state: LocalState,
    pub global_state: GlobalState,
}

impl Network {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            node_network: 0,
            node_network_mask: 0,
            my_network: 0,
            my_network_mask: 0,
            my_wlan_ip: None,
            is_local_root: false,
            dtr: 0,
            local_state: LocalState::NotConnected,
            global_state: GlobalState::WithoutNetwork,
        }
    }

    pub fn is_root_adjacent_network(network: u32) -> bool {
        // 10.0.0.0 as an integer, the well-known root network (§4.4.3).
        network == 167_772_160
    }
}
