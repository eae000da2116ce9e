//! Sibling-ring wiring (§4.3, §5, §6).
//!
//! Builds the five directed SPI channel edges — slot N's outgoing edge feeds
//! slot N+1's incoming edge, wrapping 5 back to 1, matching the token-ring
//! order every sync core already assumes — and constructs the matching
//! routing/sync core pair for each slot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use mesh_core::{
    Device, DeviceEvent, DeviceQuery, NodeConfig, Orientation, PeerLink, PeerMessage, RoutingCore,
    SiblingFrame, SyncCore, SystemTimeSource, TimeSource,
};

pub(crate) struct DeviceSlot {
    pub orientation: Orientation,
    pub device: Device,
    pub event_tx: mpsc::Sender<DeviceEvent>,
    pub query_tx: mpsc::Sender<DeviceQuery>,
    /// Receiving end of this forwarder's outgoing peer-message channel,
    /// for a real `PeerTransport` driver to claim and actually transmit.
    pub peer_outbox: Option<mpsc::Receiver<PeerMessage>>,
}

/// Constructs one `DeviceSlot` per orientation. The center runs `RootCore`
/// when this node won the root election at startup (`is_root`), `HomeCore`
/// otherwise; the four forwarders run `ForwarderCore`, tagged root-side when
/// `is_root` (§4.4 — `RootForwarderCore` is `ForwarderCore` with a flag).
pub(crate) fn build_ring(config: &NodeConfig, is_root: bool) -> Vec<DeviceSlot> {
    let time_source: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);

    let mut outgoing: HashMap<u8, mpsc::Sender<SiblingFrame>> = HashMap::new();
    let mut incoming: HashMap<u8, mpsc::Receiver<SiblingFrame>> = HashMap::new();
    for slot in 1..=5u8 {
        let (tx, rx) = mpsc::channel(config.sibling_channel_capacity);
        outgoing.insert(slot, tx);
        incoming.insert(slot, rx);
    }

    Orientation::ALL
        .into_iter()
        .map(|orientation| {
            let slot = orientation.slot();
            let prev_slot = if slot == 1 { 5 } else { slot - 1 };
            let sibling_tx = outgoing.remove(&slot).expect("edge built above");
            let sibling_rx = incoming.remove(&prev_slot).expect("edge built above");

            let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity);

            let (routing_core, sync_core, peer_link, peer_outbox) = if orientation == Orientation::Center
            {
                let routing_core = if is_root {
                    RoutingCore::new_root(time_source.clone())
                } else {
                    RoutingCore::new_home()
                };
                (routing_core, SyncCore::new_center(), None, None)
            } else {
                let routing_core = if is_root {
                    RoutingCore::new_root_forwarder(orientation)
                } else {
                    RoutingCore::new_forwarder(orientation)
                };
                let (peer_tx, peer_rx) = mpsc::channel(config.event_queue_capacity);
                (
                    routing_core,
                    SyncCore::new_forwarder(orientation),
                    Some(PeerLink { tx: peer_tx }),
                    Some(peer_rx),
                )
            };

            let (device, query_tx) = Device::new(
                orientation,
                routing_core,
                sync_core,
                event_rx,
                sibling_tx,
                sibling_rx,
                peer_link,
                config.clone(),
                time_source.clone(),
            );

            DeviceSlot {
                orientation,
                device,
                event_tx,
                query_tx,
                peer_outbox,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_slot_per_orientation() {
        let slots = build_ring(&NodeConfig::testing(), true);
        assert_eq!(slots.len(), 5);
        for orientation in Orientation::ALL {
            assert!(slots.iter().any(|s| s.orientation == orientation));
        }
    }

    #[test]
    fn center_runs_home_core_unless_root() {
        let non_root = build_ring(&NodeConfig::testing(), false);
        let center = non_root
            .iter()
            .find(|s| s.orientation == Orientation::Center)
            .unwrap();
        assert!(center.device.status().starts_with("home"));

        let root = build_ring(&NodeConfig::testing(), true);
        let center = root
            .iter()
            .find(|s| s.orientation == Orientation::Center)
            .unwrap();
        assert!(center.device.status().starts_with("root"));
    }

    #[test]
    fn forwarders_tag_root_side_when_node_is_root() {
        let root = build_ring(&NodeConfig::testing(), true);
        let north = root
            .iter()
            .find(|s| s.orientation == Orientation::North)
            .unwrap();
        assert!(north.device.status().starts_with("root-forwarder"));
    }
}
