//! Drives a full five-device SPI ring through a scripted peer-connect and
//! provisioning sequence, asserting on the events and peer messages that
//! come out the other side. Channel pairs are wired directly rather than
//! going through a real NIC, mirroring the channel-construction style used
//! for protocol-runtime integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use mesh_core::{
    Device, DeviceEvent, DeviceQuery, NodeConfig, Orientation, PeerLink, PeerMessage, RoutingCore,
    SiblingFrame, SyncCore, SystemTimeSource,
};

struct Handle {
    event_tx: mpsc::Sender<DeviceEvent>,
    query_tx: mpsc::Sender<DeviceQuery>,
    peer_rx: Option<mpsc::Receiver<PeerMessage>>,
}

/// Builds the five-slot SPI ring the same way the runtime does: slot N's
/// outgoing edge feeds slot N+1's incoming edge, wrapping 5 back to 1.
fn spawn_ring(config: &NodeConfig) -> HashMap<Orientation, Handle> {
    let time_source: Arc<dyn mesh_core::TimeSource> = Arc::new(SystemTimeSource);

    let mut outgoing = HashMap::new();
    let mut incoming = HashMap::new();
    for slot in 1..=5u8 {
        let (tx, rx) = mpsc::channel::<SiblingFrame>(config.sibling_channel_capacity);
        outgoing.insert(slot, tx);
        incoming.insert(slot, rx);
    }

    let mut handles = HashMap::new();
    for orientation in Orientation::ALL {
        let slot = orientation.slot();
        let prev_slot = if slot == 1 { 5 } else { slot - 1 };
        let sibling_tx = outgoing.remove(&slot).unwrap();
        let sibling_rx = incoming.remove(&prev_slot).unwrap();
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity);

        let (routing_core, sync_core, peer_link, peer_rx) = if orientation == Orientation::Center {
            (RoutingCore::new_home(), SyncCore::new_center(), None, None)
        } else {
            let (peer_tx, peer_rx_ours) = mpsc::channel(config.event_queue_capacity);
            (
                RoutingCore::new_forwarder(orientation),
                SyncCore::new_forwarder(orientation),
                Some(PeerLink { tx: peer_tx }),
                Some(peer_rx_ours),
            )
        };

        let (mut device, query_tx) = Device::new(
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
        tokio::spawn(async move { device.run().await });

        handles.insert(
            orientation,
            Handle {
                event_tx,
                query_tx,
                peer_rx,
            },
        );
    }
    handles
}

async fn status_of(handles: &HashMap<Orientation, Handle>, orientation: Orientation) -> String {
    let (reply, rx) = tokio::sync::oneshot::channel();
    handles[&orientation]
        .query_tx
        .send(DeviceQuery::Status { reply })
        .await
        .unwrap();
    rx.await.unwrap()
}

async fn events_of(handles: &HashMap<Orientation, Handle>, orientation: Orientation) -> Vec<String> {
    let (reply, rx) = tokio::sync::oneshot::channel();
    handles[&orientation]
        .query_tx
        .send(DeviceQuery::Events { reply })
        .await
        .unwrap();
    rx.await.unwrap().into_iter().map(|e| e.name).collect()
}

#[tokio::test]
async fn peer_connect_requests_token_and_runs_critical_section() {
    let config = NodeConfig::testing();
    let handles = spawn_ring(&config);

    handles[&Orientation::North]
        .event_tx
        .send(DeviceEvent::PeerConnected {
            network: 0x0A00_0000,
            mask: 0xFFFF_FF00,
        })
        .await
        .unwrap();

    sleep(Duration::from_millis(200)).await;

    let north_events = events_of(&handles, Orientation::North).await;
    assert!(
        north_events.contains(&"on-connected".to_string()),
        "expected an on-connected event once the token reached North, got {north_events:?}"
    );

    let status = status_of(&handles, Orientation::North).await;
    assert!(status.starts_with("forwarder"));
}

#[tokio::test]
async fn home_center_stays_home_until_provisioned() {
    let config = NodeConfig::testing();
    let handles = spawn_ring(&config);

    let status = status_of(&handles, Orientation::Center).await;
    assert!(status.starts_with("home"));
}

#[tokio::test]
async fn shutdown_event_stops_every_device() {
    let config = NodeConfig::testing();
    let handles = spawn_ring(&config);

    for handle in handles.values() {
        handle.event_tx.send(DeviceEvent::Shutdown).await.unwrap();
    }
    sleep(Duration::from_millis(100)).await;

    // the query channel receiver has been dropped along with the device
    // task, so a fresh query should fail to deliver.
    let (reply, _rx) = tokio::sync::oneshot::channel();
    let result = handles[&Orientation::Center]
        .query_tx
        .send(DeviceQuery::Status { reply })
        .await;
    assert!(result.is_err());
}
