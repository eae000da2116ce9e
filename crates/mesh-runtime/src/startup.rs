//! Startup ordering barrier (§5).
//!
//! An optional linearization of forwarder slots (`NodeConfig::connect_order`)
//! gates each listed slot's WLAN interface behind the previous slot's first
//! peer connection, enforcing deterministic link-up order for tests. Slots
//! absent from the list start unlatched. A driver integration is expected to
//! call `wait_for_turn` before it starts connecting a gated forwarder's
//! interface, and `release_next` the first time that forwarder's peer
//! connects — `NodeRuntime` only builds the gate chain, since observing
//! "first peer connection" is the driver's event to report (§1 Non-goals:
//! hardware drivers are out of scope here).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::Notify;

use mesh_core::Orientation;

/// One slot's view of the barrier.
#[derive(Default, Clone)]
pub struct ConnectGate {
    wait: Option<Arc<Notify>>,
    release: Option<Arc<Notify>>,
}

impl ConnectGate {
    /// Resolves immediately for a slot outside the connect order, or once
    /// the previous slot in the order calls `release_next`.
    pub async fn wait_for_turn(&self) {
        if let Some(wait) = &self.wait {
            wait.notified().await;
        }
    }

    /// Releases the next slot's gate. A no-op for the last slot in the
    /// order, or for a slot outside it.
    pub fn release_next(&self) {
        if let Some(release) = &self.release {
            release.notify_one();
        }
    }
}

/// Builds one `ConnectGate` per orientation named in `connect_order`;
/// unrecognized names are ignored. Orientations absent from the list get a
/// `ConnectGate::default()` (immediately open, nothing to release).
pub(crate) fn build_connect_gates(connect_order: &[String]) -> HashMap<Orientation, ConnectGate> {
    let slots: Vec<Orientation> = connect_order
        .iter()
        .filter_map(|s| Orientation::from_str(s).ok())
        .collect();

    let notifies: Vec<Arc<Notify>> = slots.iter().map(|_| Arc::new(Notify::new())).collect();

    let mut gates = HashMap::new();
    for (i, &orientation) in slots.iter().enumerate() {
        let wait = if i == 0 { None } else { Some(notifies[i].clone()) };
        let release = notifies.get(i + 1).cloned();
        gates.insert(orientation, ConnectGate { wait, release });
    }
    gates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn first_slot_in_the_order_starts_unlatched() {
        let gates = build_connect_gates(&["north".to_string(), "east".to_string()]);
        timeout(Duration::from_millis(50), gates[&Orientation::North].wait_for_turn())
            .await
            .expect("first slot should not block");
    }

    #[tokio::test]
    async fn second_slot_waits_until_released() {
        let gates = build_connect_gates(&["north".to_string(), "east".to_string()]);
        let east = gates[&Orientation::East].clone();

        let blocked = timeout(Duration::from_millis(20), east.wait_for_turn()).await;
        assert!(blocked.is_err(), "east should still be gated");

        gates[&Orientation::North].release_next();
        timeout(Duration::from_millis(50), east.wait_for_turn())
            .await
            .expect("east should unblock once north releases it");
    }

    #[test]
    fn slots_outside_the_order_are_unlatched() {
        let gates = build_connect_gates(&["north".to_string()]);
        assert!(!gates.contains_key(&Orientation::West));
    }
}
