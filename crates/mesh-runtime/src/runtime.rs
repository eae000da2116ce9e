//! Node runtime
//!
//! Spawns the five sub-device tasks that make up one mesh node and wires
//! their SPI sibling ring (§4.3, §5), mirroring the protocol runtime's
//! `start`/`stop`/`Drop`-aborts-everything lifecycle but over a fixed set of
//! five device tasks instead of a dynamic set of registered transports.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use mesh_core::{DeviceEvent, DeviceQuery, NodeConfig, Orientation, PeerMessage};

use crate::errors::{RuntimeError, RuntimeResult};
use crate::ring::build_ring;
use crate::startup::{build_connect_gates, ConnectGate};
use crate::supervisor::{DeviceHealth, RingSupervisor, SupervisorCommand};

const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(1);
const SUPERVISOR_COMMAND_CAPACITY: usize = 8;

/// Coordinates the five device tasks making up one mesh node.
///
/// ## Design
///
/// All per-sub-device protocol logic lives in `mesh-core`'s `Device`; this
/// type's only job is to build the sibling ring, spawn one task per
/// orientation, and hand external callers the event/query channel
/// endpoints they need without taking ownership of a running `Device`.
pub struct NodeRuntime {
    config: NodeConfig,
    is_root: bool,
    event_senders: HashMap<Orientation, mpsc::Sender<DeviceEvent>>,
    query_senders: HashMap<Orientation, mpsc::Sender<DeviceQuery>>,
    /// Outgoing peer-message receivers, one per forwarder, waiting for a
    /// `PeerTransport` driver to claim them (§6).
    peer_outboxes: HashMap<Orientation, mpsc::Receiver<PeerMessage>>,
    /// Startup ordering barrier gates, one per forwarder named in
    /// `NodeConfig::connect_order` (§5).
    connect_gates: HashMap<Orientation, ConnectGate>,
    supervisor_commands: Option<mpsc::Sender<SupervisorCommand>>,
    supervisor_handle: Option<JoinHandle<()>>,
    running: bool,
}

impl NodeRuntime {
    pub fn new(config: NodeConfig, is_root: bool) -> Self {
        Self {
            config,
            is_root,
            event_senders: HashMap::new(),
            query_senders: HashMap::new(),
            peer_outboxes: HashMap::new(),
            connect_gates: HashMap::new(),
            supervisor_commands: None,
            supervisor_handle: None,
            running: false,
        }
    }

    pub fn for_testing(is_root: bool) -> Self {
        Self::new(NodeConfig::testing(), is_root)
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Build the sibling ring, spawn all five device tasks, and start the
    /// supervisor that watches them.
    pub fn start(&mut self) -> RuntimeResult<()> {
        if self.running {
            return Err(RuntimeError::AlreadyRunning);
        }

        let slots = build_ring(&self.config, self.is_root);
        let mut handles = HashMap::new();
        self.connect_gates = build_connect_gates(&self.config.connect_order);

        for mut slot in slots {
            self.event_senders.insert(slot.orientation, slot.event_tx);
            self.query_senders.insert(slot.orientation, slot.query_tx);
            if let Some(outbox) = slot.peer_outbox.take() {
                self.peer_outboxes.insert(slot.orientation, outbox);
            }

            let orientation = slot.orientation;
            let mut device = slot.device;
            let handle = tokio::spawn(async move {
                device.run().await;
            });
            handles.insert(orientation, handle);
        }

        let (command_tx, command_rx) = mpsc::channel(SUPERVISOR_COMMAND_CAPACITY);
        let supervisor = RingSupervisor::new(handles, command_rx, HEALTH_POLL_INTERVAL);
        self.supervisor_handle = Some(tokio::spawn(supervisor.run()));
        self.supervisor_commands = Some(command_tx);

        self.running = true;
        info!(root = self.is_root, "node runtime started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The channel a driver or test harness pushes `DeviceEvent`s into for
    /// one sub-device (peer connect/lost, raw packet bytes).
    pub fn event_sender(&self, orientation: Orientation) -> Option<mpsc::Sender<DeviceEvent>> {
        self.event_senders.get(&orientation).cloned()
    }

    /// Claims the receiving end of a forwarder's outgoing peer-message
    /// channel for a `PeerTransport` driver to transmit from. Returns
    /// `None` for the center slot or once already claimed.
    pub fn take_peer_outbox(
        &mut self,
        orientation: Orientation,
    ) -> Option<mpsc::Receiver<PeerMessage>> {
        self.peer_outboxes.remove(&orientation)
    }

    /// The startup ordering barrier gate for a forwarder slot (§5). A
    /// driver should await `wait_for_turn` before bringing up that slot's
    /// WLAN interface, then call `release_next` on its first peer
    /// connection. Slots outside `NodeConfig::connect_order` get a gate
    /// that opens immediately.
    pub fn connect_gate(&self, orientation: Orientation) -> ConnectGate {
        self.connect_gates.get(&orientation).cloned().unwrap_or_default()
    }

    /// Query a running sub-device's observer log without owning it.
    pub async fn query_events(
        &self,
        orientation: Orientation,
    ) -> RuntimeResult<Vec<mesh_core::Event>> {
        let sender = self
            .query_senders
            .get(&orientation)
            .ok_or_else(|| RuntimeError::UnknownDevice(orientation.name()))?;
        let (reply, rx) = oneshot::channel();
        sender
            .send(DeviceQuery::Events { reply })
            .await
            .map_err(|_| RuntimeError::NotRunning)?;
        rx.await.map_err(|_| RuntimeError::QueryTimedOut)
    }

    /// Query a running sub-device's status line without owning it.
    pub async fn query_status(&self, orientation: Orientation) -> RuntimeResult<String> {
        let sender = self
            .query_senders
            .get(&orientation)
            .ok_or_else(|| RuntimeError::UnknownDevice(orientation.name()))?;
        let (reply, rx) = oneshot::channel();
        sender
            .send(DeviceQuery::Status { reply })
            .await
            .map_err(|_| RuntimeError::NotRunning)?;
        rx.await.map_err(|_| RuntimeError::QueryTimedOut)
    }

    /// Clear one sub-device's observer log.
    pub async fn clear(&self, orientation: Orientation) -> RuntimeResult<()> {
        let sender = self
            .query_senders
            .get(&orientation)
            .ok_or_else(|| RuntimeError::UnknownDevice(orientation.name()))?;
        let (reply, rx) = oneshot::channel();
        sender
            .send(DeviceQuery::Clear { reply })
            .await
            .map_err(|_| RuntimeError::NotRunning)?;
        rx.await.map_err(|_| RuntimeError::QueryTimedOut)
    }

    /// Health of every device task, as last observed by the supervisor.
    pub async fn health(&self) -> RuntimeResult<HashMap<Orientation, DeviceHealth>> {
        let commands = self
            .supervisor_commands
            .as_ref()
            .ok_or(RuntimeError::NotRunning)?;
        let (reply, rx) = oneshot::channel();
        commands
            .send(SupervisorCommand::Health { reply })
            .await
            .map_err(|_| RuntimeError::NotRunning)?;
        rx.await.map_err(|_| RuntimeError::QueryTimedOut)
    }

    /// Push `Shutdown` into every device's event queue, then let the
    /// supervisor join (with a timeout) and abort any stragglers.
    pub async fn shutdown(&mut self) -> RuntimeResult<()> {
        if !self.running {
            return Ok(());
        }

        for sender in self.event_senders.values() {
            let _ = sender.send(DeviceEvent::Shutdown).await;
        }

        if let Some(commands) = self.supervisor_commands.take() {
            let (reply, rx) = oneshot::channel();
            if commands
                .send(SupervisorCommand::Shutdown { reply })
                .await
                .is_ok()
            {
                let _ = rx.await;
            }
        }
        if let Some(handle) = self.supervisor_handle.take() {
            let _ = handle.await;
        }

        self.event_senders.clear();
        self.query_senders.clear();
        self.peer_outboxes.clear();
        self.connect_gates.clear();
        self.running = false;
        info!("node runtime shut down");
        Ok(())
    }
}

impl Drop for NodeRuntime {
    fn drop(&mut self) {
        if self.running {
            if let Some(handle) = self.supervisor_handle.take() {
                handle.abort();
            }
        }
    }
}
