//! The per-sub-device event loop (§4.2, §5).
//!
//! `Device` owns the node-global routing table, both cores, and the channel
//! endpoints; `DeviceOutputHandle` borrows only the fields a core hook needs
//! to mutate, never `routing_core`/`sync_core` themselves, so a core method
//! already holding `&mut self` can still be handed a `DeviceOutput` without
//! aliasing back into its own storage (§9).

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::NodeConfig;
use crate::cores::{DeviceOutput, RoutingCore};
use crate::messages::{PeerMessage, SiblingMessage};
use crate::observer::{Event, EventLog, Stream, Value};
use crate::packet::{
    checksum_valid, icmp_type, null_checksum, parse_ipv4_header, udp_dst_port, Ipv4Header,
    ICMP_PEER_MESSAGE_TYPE, SIBLINGS_UDP_PORT,
};
use crate::routing_table::{Hop, Interface, RoutingTable};
use crate::sync::SyncCore;
use crate::types::{ip_to_string, Orientation, TimeSource};

/// An event arriving at a sub-device's bounded queue (§3, §4.2).
#[derive(Debug)]
pub enum DeviceEvent {
    PacketReceived { bytes: Vec<u8> },
    PeerConnected { network: u32, mask: u32 },
    PeerLost { network: u32, mask: u32 },
    Shutdown,
}

/// A sibling broadcast in flight on the SPI ring: the originator's slot plus
/// the message body (§4.3). Wire-level byte framing is a driver concern out
/// of scope here; the ring is modeled as typed bounded channels.
#[derive(Debug, Clone)]
pub struct SiblingFrame {
    pub originator: Orientation,
    pub message: SiblingMessage,
}

/// Where to hand outgoing peer-plane traffic, standing in for the wireless
/// driver (station/AP) this core addresses frames to (§6, out of scope as a
/// driver but modeled as a channel so the loop is exercisable in tests).
/// Incoming peer traffic arrives the other way, as ICMP-encoded bytes on
/// `DeviceEvent::PacketReceived` (§6) — there is no separate inbound half
/// here, since the driver that owns this channel's receiver is also the one
/// responsible for feeding decoded frames back in as `DeviceEvent`s.
pub struct PeerLink {
    pub tx: mpsc::Sender<PeerMessage>,
}

/// A request for a running device task's live state, answered from inside
/// `Device::run`'s select loop. Once a `Device` is moved into a spawned task,
/// `observer()`/`status()` are unreachable from the outside (the task owns
/// `&mut self`); this is the only way in, mirroring the runtime's
/// request/reply pattern for system status (§6 observer surface).
pub enum DeviceQuery {
    Events { reply: oneshot::Sender<Vec<Event>> },
    Status { reply: oneshot::Sender<String> },
    Clear { reply: oneshot::Sender<()> },
}

const QUERY_CHANNEL_CAPACITY: usize = 16;

/// `127.0.0.0/8`, masked to `/24` for the legacy table's static seed route.
const LOOPBACK_NETWORK: u32 = 0x7F00_0000;
const LOOPBACK_MASK: u32 = 0xFF00_0000;

pub struct Device {
    orientation: Orientation,
    routing_core: RoutingCore,
    sync_core: SyncCore,
    /// Node-global table, replicated node-wide via `UPDATE_NODE_TABLE`.
    routing_table: RoutingTable,
    /// Device-local fallback, consulted only when `do_forward` can't resolve
    /// an orientation from the global table (§4.2 step 4, §4.4.1).
    legacy_table: RoutingTable,
    event_rx: mpsc::Receiver<DeviceEvent>,
    sibling_tx: mpsc::Sender<SiblingFrame>,
    sibling_rx: mpsc::Receiver<SiblingFrame>,
    peer_link: Option<PeerLink>,
    query_rx: mpsc::Receiver<DeviceQuery>,
    observer: EventLog,
    config: NodeConfig,
    time_source: Arc<dyn TimeSource>,
    in_critical_section: bool,
}

impl Device {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        orientation: Orientation,
        routing_core: RoutingCore,
        sync_core: SyncCore,
        event_rx: mpsc::Receiver<DeviceEvent>,
        sibling_tx: mpsc::Sender<SiblingFrame>,
        sibling_rx: mpsc::Receiver<SiblingFrame>,
        peer_link: Option<PeerLink>,
        config: NodeConfig,
        time_source: Arc<dyn TimeSource>,
    ) -> (Self, mpsc::Sender<DeviceQuery>) {
        let (query_tx, query_rx) = mpsc::channel(QUERY_CHANNEL_CAPACITY);
        let mut legacy_table = RoutingTable::new(Interface::Spi);
        legacy_table.add_route(LOOPBACK_NETWORK, 24, Interface::Spi, true);
        let device = Self {
            orientation,
            routing_core,
            sync_core,
            routing_table: RoutingTable::new(Interface::Spi),
            legacy_table,
            event_rx,
            sibling_tx,
            sibling_rx,
            peer_link,
            query_rx,
            observer: EventLog::new(config.event_queue_capacity),
            config,
            time_source,
            in_critical_section: false,
        };
        (device, query_tx)
    }

    pub fn observer(&self) -> &EventLog {
        &self.observer
    }

    pub fn status(&self) -> String {
        let view = DeviceOutputView {
            routing_table: &self.routing_table,
        };
        self.routing_core.status(&view)
    }

    /// Borrow just the fields `DeviceOutputHandle` needs, leaving
    /// `routing_core`/`sync_core` free to be borrowed separately by the
    /// caller in the same statement (§9: disjoint field borrows, never a
    /// back-reference stored on either core).
    fn split(&mut self) -> (&mut RoutingCore, &mut SyncCore, DeviceOutputHandle<'_>) {
        (
            &mut self.routing_core,
            &mut self.sync_core,
            DeviceOutputHandle {
                orientation: self.orientation,
                routing_table: &mut self.routing_table,
                legacy_table: &mut self.legacy_table,
                sibling_tx: &self.sibling_tx,
                peer_link: &self.peer_link,
                observer: &mut self.observer,
                time_source: &self.time_source,
                in_critical_section: &mut self.in_critical_section,
            },
        )
    }

    /// Drive the event loop until a `Shutdown` event drains (§4.7 graceful
    /// shutdown, §5 suspension points).
    pub async fn run(&mut self) {
        {
            let (routing_core, _sync_core, mut output) = self.split();
            routing_core.on_start(&mut output);
        }

        let mut ticker = tokio::time::interval(self.config.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(DeviceEvent::Shutdown) | None => break,
                        Some(event) => self.dispatch_event(event).await,
                    }
                }
                Some(frame) = self.sibling_rx.recv() => {
                    self.dispatch_sibling_frame(frame).await;
                }
                _ = ticker.tick() => {
                    self.dispatch_tick();
                }
                Some(query) = self.query_rx.recv() => {
                    self.dispatch_query(query);
                }
            }
            tokio::task::yield_now().await;
        }
    }

    fn dispatch_query(&mut self, query: DeviceQuery) {
        match query {
            DeviceQuery::Events { reply } => {
                let events = self.observer.events_for(None, None).into_iter().cloned().collect();
                let _ = reply.send(events);
            }
            DeviceQuery::Status { reply } => {
                let _ = reply.send(self.status());
            }
            DeviceQuery::Clear { reply } => {
                self.observer.clear();
                let _ = reply.send(());
            }
        }
    }

    async fn dispatch_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::PacketReceived { bytes } => self.classify_packet(&bytes).await,
            DeviceEvent::PeerConnected { network, mask } => {
                self.routing_core.on_peer_connected(network, mask);
                self.request_critical_section();
            }
            DeviceEvent::PeerLost { network, mask } => {
                self.routing_core.on_peer_lost(network, mask);
                self.request_critical_section();
            }
            DeviceEvent::Shutdown => {}
        }
    }

    fn dispatch_tick(&mut self) {
        let (routing_core, _sync_core, mut output) = self.split();
        routing_core.on_tick(&mut output);
    }

    /// Packet classifier (§4.2): checksum, self-addressed control traffic,
    /// sibling frames, or forward.
    async fn classify_packet(&mut self, bytes: &[u8]) {
        let Some(header) = parse_ipv4_header(bytes) else {
            return;
        };
        if !checksum_valid(bytes, &header) {
            return;
        }

        if header.is_icmp() && icmp_type(bytes, header.header_len()) == Some(ICMP_PEER_MESSAGE_TYPE)
        {
            let payload = bytes.get(header.header_len() + 1..).unwrap_or(&[]);
            if let Ok(message) = serde_json::from_slice::<PeerMessage>(payload) {
                self.emit_event(
                    message_event_name(&message),
                    &peer_message_fields(&message),
                );
                self.routing_core.on_peer_message(message);
                self.request_critical_section();
                return;
            }
        }

        if header.is_udp() && udp_dst_port(bytes, header.header_len()) == Some(SIBLINGS_UDP_PORT) {
            // sibling frames arrive over the typed ring channel in this
            // implementation, not via raw packet bytes.
            return;
        }

        self.forward_packet(&header, bytes).await;
    }

    async fn forward_packet(&mut self, header: &Ipv4Header, bytes: &[u8]) {
        if header.ttl.decrement().is_none() {
            warn!(dst = %ip_to_string(header.dst), "forward: ttl exhausted, dropping");
            return;
        }

        let (routing_core, _sync_core, output) = self.split();
        routing_core.on_forward(header.src, header.dst, &output);
        let interface = match routing_core.do_forward(header.dst, &output) {
            Some(orientation) => Interface::Orientation(orientation),
            None => output.legacy_table.route(header.dst).interface,
        };

        let mut forwarded = bytes.to_vec();
        null_checksum(&mut forwarded);
        let is_loopback_source = header.src & LOOPBACK_MASK == LOOPBACK_NETWORK;

        match interface {
            Interface::Orientation(o) if o == self.orientation && !is_loopback_source => {
                self.send_on_wlan(&forwarded).await
            }
            _ => self.send_on_spi(&forwarded).await,
        }
    }

    async fn send_on_wlan(&mut self, _bytes: &[u8]) {
        // driver hand-off point (out of scope, §1); no-op placeholder.
    }

    async fn send_on_spi(&mut self, _bytes: &[u8]) {
        // driver hand-off point (out of scope, §1); no-op placeholder.
    }

    /// Ring forwarding rule (§4.3): drop on return to originator, else relay
    /// unchanged, then deliver locally (sync core first).
    async fn dispatch_sibling_frame(&mut self, frame: SiblingFrame) {
        if frame.originator == self.orientation {
            return;
        }
        let _ = self.sibling_tx.try_send(frame.clone());
        self.deliver_sibling_message(frame.message);
    }

    fn deliver_sibling_message(&mut self, message: SiblingMessage) {
        let was_control = message.is_token_control();
        let outcome = {
            let (_routing_core, sync_core, mut output) = self.split();
            sync_core.on_sibling_message(&message, &mut output)
        };
        if !outcome.claimed {
            if !was_control {
                self.emit_event(message.id(), &[]);
            }
            let (routing_core, _sync_core, mut output) = self.split();
            routing_core.on_sibling_message(message, &mut output);
        }
        if outcome.run_critical_section {
            self.run_critical_section();
        }
    }

    fn request_critical_section(&mut self) {
        let (_routing_core, sync_core, mut output) = self.split();
        sync_core.request_critical_section(&mut output);
    }

    fn run_critical_section(&mut self) {
        self.in_critical_section = true;
        let (routing_core, _sync_core, mut output) = self.split();
        routing_core.on_critical_section(&mut output);
        self.in_critical_section = false;
    }

    fn emit_event(&mut self, name: &str, fields: &[(&str, String)]) {
        debug!(event = name, "device event");
        self.observer.push(Event {
            timestamp: self.time_source.now(),
            source: self.orientation.name().to_string(),
            stream: Stream::Events,
            name: name.to_string(),
            data: fields
                .iter()
                .map(|(k, v)| (k.to_string(), Value::Text(v.clone())))
                .collect(),
            in_critical_section: self.in_critical_section,
        });
    }
}

fn message_event_name(message: &PeerMessage) -> &'static str {
    match message {
        PeerMessage::OnConnected { .. } => "on-connected",
        PeerMessage::Handshake { .. } => "handshake",
        PeerMessage::DtrUpdate { .. } => "dtr-update",
        PeerMessage::NewGtwRequest { .. } => "new-gtw-request",
        PeerMessage::NewGtwResponse { .. } => "new-gtw-response",
        PeerMessage::PeerLost { .. } => "peer-lost",
    }
}

fn peer_message_fields(message: &PeerMessage) -> Vec<(&'static str, String)> {
    match message {
        PeerMessage::DtrUpdate { dtr } => vec![("dtr", dtr.to_string())],
        PeerMessage::NewGtwRequest { hag_ips } => vec![("hag_ips", hag_ips.clone())],
        PeerMessage::NewGtwResponse {
            ext_network,
            ext_mask,
            dtr,
        } => vec![
            ("ext_network", ip_to_string(*ext_network)),
            ("ext_mask", ext_mask.to_string()),
            ("dtr", dtr.to_string()),
        ],
        _ => Vec::new(),
    }
}

/// A read-only projection used for `status()`, where no mutation is needed.
struct DeviceOutputView<'a> {
    routing_table: &'a RoutingTable,
}

impl<'a> DeviceOutput for DeviceOutputView<'a> {
    fn send_peer_message(&mut self, _message: &PeerMessage) {}
    fn broadcast_to_siblings(&mut self, _message: SiblingMessage) -> bool {
        false
    }
    fn switch_default_gateway(&mut self, _iface: Interface) {}
    fn add_route(&mut self, _network: u32, _mask: u32, _iface: Interface) {}
    fn remove_route(&mut self, _network: u32, _mask: u32) {}
    fn remove_legacy_route(&mut self, _network: u32, _mask: u32) {}
    fn remove_routes_for_interface(&mut self, _iface: Interface) -> Vec<Hop> {
        Vec::new()
    }
    fn enable_ap_mode(&mut self, _network: u32, _mask: u32) {}
    fn replace_routing_table(&mut self, _entries: Vec<(u32, u32, Interface)>) {}
    fn broadcast_routing_table(&mut self) -> bool {
        false
    }
    fn routing_table(&self) -> &RoutingTable {
        self.routing_table
    }
    fn emit_event(&mut self, _name: &str, _fields: &[(&str, String)]) {}
}

/// The live projection handed to a core hook for the duration of one call.
/// Borrows only the fields a hook may touch — never `routing_core` or
/// `sync_core` — so `Device::split` can hand this out while a core method
/// already holds `&mut self` on its own struct (§9).
struct DeviceOutputHandle<'a> {
    orientation: Orientation,
    routing_table: &'a mut RoutingTable,
    legacy_table: &'a mut RoutingTable,
    sibling_tx: &'a mpsc::Sender<SiblingFrame>,
    peer_link: &'a Option<PeerLink>,
    observer: &'a mut EventLog,
    time_source: &'a Arc<dyn TimeSource>,
    in_critical_section: &'a mut bool,
}

impl<'a> DeviceOutputHandle<'a> {
    fn record(&mut self, name: &str, fields: &[(&str, String)]) {
        self.observer.push(Event {
            timestamp: self.time_source.now(),
            source: self.orientation.name().to_string(),
            stream: Stream::Events,
            name: name.to_string(),
            data: fields
                .iter()
                .map(|(k, v)| (k.to_string(), Value::Text(v.clone())))
                .collect(),
            in_critical_section: *self.in_critical_section,
        });
    }
}

impl<'a> DeviceOutput for DeviceOutputHandle<'a> {
    fn send_peer_message(&mut self, message: &PeerMessage) {
        if let Some(link) = self.peer_link {
            if link.tx.try_send(message.clone()).is_err() {
                warn!("peer link queue full, dropping message");
            }
        }
    }

    fn broadcast_to_siblings(&mut self, message: SiblingMessage) -> bool {
        if !message.is_token_control() {
            self.record(message.id(), &[]);
        }
        let frame = SiblingFrame {
            originator: self.orientation,
            message,
        };
        self.sibling_tx.try_send(frame).is_ok()
    }

    fn switch_default_gateway(&mut self, iface: Interface) {
        self.routing_table.switch_default_gateway(iface);
    }

    fn add_route(&mut self, network: u32, mask: u32, iface: Interface) {
        self.routing_table.add_route(
            network,
            crate::types::prefix_len_of_mask(mask),
            iface,
            true,
        );
    }

    fn remove_route(&mut self, network: u32, mask: u32) {
        self.routing_table
            .remove_route(network, crate::types::prefix_len_of_mask(mask));
    }

    fn remove_legacy_route(&mut self, network: u32, mask: u32) {
        self.legacy_table
            .remove_route(network, crate::types::prefix_len_of_mask(mask));
    }

    fn remove_routes_for_interface(&mut self, iface: Interface) -> Vec<Hop> {
        self.routing_table.remove_routes_for_interface(iface)
    }

    fn enable_ap_mode(&mut self, _network: u32, _mask: u32) {
        // driver hand-off point (out of scope, §1); no-op placeholder.
    }

    fn replace_routing_table(&mut self, entries: Vec<(u32, u32, Interface)>) {
        *self.routing_table = RoutingTable::from_entries(entries);
    }

    fn broadcast_routing_table(&mut self) -> bool {
        let entries = self.routing_table.to_entries();
        self.broadcast_to_siblings(SiblingMessage::UpdateNodeTable { table: entries })
    }

    fn routing_table(&self) -> &RoutingTable {
        self.routing_table
    }

    fn emit_event(&mut self, name: &str, fields: &[(&str, String)]) {
        debug!(event = name, "device event");
        self.record(name, fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cores::RoutingCore;
    use crate::types::SystemTimeSource;

    fn make_device(orientation: Orientation, routing_core: RoutingCore, sync_core: SyncCore) -> Device {
        let (_event_tx, event_rx) = mpsc::channel(8);
        let (sibling_tx, sibling_rx) = mpsc::channel(8);
        let (device, _query_tx) = Device::new(
            orientation,
            routing_core,
            sync_core,
            event_rx,
            sibling_tx,
            sibling_rx,
            None,
            NodeConfig::testing(),
            Arc::new(SystemTimeSource),
        );
        device
    }

    #[tokio::test]
    async fn on_start_broadcasts_initial_provision_for_root() {
        let mut device = make_device(
            Orientation::Center,
            RoutingCore::new_root(Arc::new(SystemTimeSource)),
            SyncCore::new_center(),
        );
        let (routing_core, _sync_core, mut output) = device.split();
        routing_core.on_start(&mut output);
        assert_eq!(
            output.routing_table.route(0).interface,
            Interface::Wlan
        );
    }

    #[tokio::test]
    async fn sibling_frame_returning_to_originator_is_dropped() {
        let mut device = make_device(
            Orientation::North,
            RoutingCore::new_forwarder(Orientation::North),
            SyncCore::new_forwarder(Orientation::North),
        );
        device
            .dispatch_sibling_frame(SiblingFrame {
                originator: Orientation::North,
                message: SiblingMessage::RequestToken,
            })
            .await;
        assert!(device.sibling_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn forwarder_applies_queued_provision_once_critical_section_runs() {
        let mut device = make_device(
            Orientation::East,
            RoutingCore::new_forwarder(Orientation::East),
            SyncCore::new_forwarder(Orientation::East),
        );
        {
            let (routing_core, _sync_core, mut output) = device.split();
            routing_core.on_sibling_message(
                SiblingMessage::Provision {
                    provider_id: 5,
                    network: crate::types::ip_from_str("10.0.0.0").unwrap(),
                    mask: crate::types::mask_from_prefix_len(8),
                },
                &mut output,
            );
        }
        device.run_critical_section();
        assert!(device
            .routing_table
            .routes()
            .iter()
            .any(|h| h.interface == Interface::Wlan));
    }

    #[tokio::test]
    async fn legacy_table_is_seeded_with_loopback_static_route_and_global_is_not() {
        let device = make_device(
            Orientation::East,
            RoutingCore::new_forwarder(Orientation::East),
            SyncCore::new_forwarder(Orientation::East),
        );
        let loopback_addr = crate::types::ip_from_str("127.0.0.5").unwrap();
        let hop = device.legacy_table.route(loopback_addr);
        assert_eq!(hop.interface, Interface::Spi);
        assert!(hop.static_route);
        assert_eq!(hop.prefix_len, 24);

        // The global table only ever has the default-gateway seed hop.
        assert_eq!(device.routing_table.routes().len(), 1);
    }
}
