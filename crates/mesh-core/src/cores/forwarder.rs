//! ForwarderCore / RootForwarderCore (§4.4.1, §4.4.2).

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use super::{DeviceOutput, PeerEvent};
use crate::messages::{PeerMessage, SiblingMessage};
use crate::network::{GlobalState, LocalState, Network};
use crate::routing_table::Interface;
use crate::subnet::get_node_subnets;
use crate::types::{ip_to_string, mask_from_prefix_len, prefix_len_of_mask, Orientation};

const ROOT_NETWORK: u32 = 167_772_160; // 10.0.0.0
const ROOT_MASK: u32 = 0xFF00_0000; // /8

/// A forwarder sub-device's routing core. `root` only changes the status
/// text presented — behaviorally this is `RootForwarderCore` when `true`
/// (§4.4.2: "behaviorally identical ... reused verbatim").
pub struct ForwarderCore {
    network: Network,
    root: bool,
    peer_queue: VecDeque<PeerEvent>,
    sibling_queue: VecDeque<SiblingMessage>,
}

impl ForwarderCore {
    pub fn new(orientation: Orientation, root: bool) -> Self {
        Self {
            network: Network::new(orientation),
            root,
            peer_queue: VecDeque::new(),
            sibling_queue: VecDeque::new(),
        }
    }

    pub fn on_start(&mut self, _out: &mut dyn DeviceOutput) {
        debug!(orientation = %self.network.orientation, "forwarder started");
    }

    pub fn on_peer_connected(&mut self, network: u32, mask: u32) {
        self.peer_queue.push_back(PeerEvent::Connected { network, mask });
    }

    pub fn on_peer_lost(&mut self, network: u32, mask: u32) {
        self.peer_queue.push_back(PeerEvent::Lost { network, mask });
    }

    pub fn on_peer_message(&mut self, message: PeerMessage) {
        self.peer_queue.push_back(PeerEvent::Message(message));
    }

    pub fn on_sibling_message(&mut self, message: SiblingMessage) {
        self.sibling_queue.push_back(message);
    }

    /// Sibling queue drains first, then peer queue, preserving intra-queue
    /// FIFO order (§4.4.1).
    pub fn on_critical_section(&mut self, out: &mut dyn DeviceOutput) {
        while let Some(message) = self.sibling_queue.pop_front() {
            self.handle_sibling(message, out);
        }
        while let Some(event) = self.peer_queue.pop_front() {
            self.handle_peer(event, out);
        }
    }

    pub fn on_forward(&mut self, src: u32, dst: u32, table: &crate::routing_table::RoutingTable) {
        let src_hop = table.route(src);
        let dst_hop = table.route(dst);
        let own_subnet = self.network.my_network & self.network.my_network_mask == src & self.network.my_network_mask
            || self.network.my_network & self.network.my_network_mask == dst & self.network.my_network_mask;
        if src_hop.interface == dst_hop.interface && !own_subnet {
            warn!(
                src = %ip_to_string(src),
                dst = %ip_to_string(dst),
                "routing loop detected"
            );
        }
    }

    pub fn on_change_default_gateway(&mut self, iface: Interface, out: &mut dyn DeviceOutput) {
        if iface == Interface::Wlan {
            self.network.is_local_root = true;
            out.switch_default_gateway(Interface::Orientation(self.network.orientation));
            out.emit_event(
                "local-root",
                &[("orientation", self.network.orientation.to_string())],
            );
            out.broadcast_routing_table();
        }
    }

    pub fn status(&self, table: &crate::routing_table::RoutingTable) -> String {
        let role = if self.root { "root-forwarder" } else { "forwarder" };
        format!(
            "{role}({}) dtr={} local={:?} global={:?}\n{}",
            self.network.orientation,
            self.network.dtr,
            self.network.local_state,
            self.network.global_state,
            table.status()
        )
    }

    // ------------------------------------------------------------------
    // internal forwarder (§4.4.3) — sibling message reactions
    // ------------------------------------------------------------------

    fn handle_sibling(&mut self, message: SiblingMessage, out: &mut dyn DeviceOutput) {
        match message {
            SiblingMessage::Provision {
                provider_id,
                network,
                mask,
            } => self.on_provision(provider_id, network, mask, out),
            SiblingMessage::RouteLost { routes } => {
                for (network, mask) in routes {
                    out.remove_legacy_route(network, mask);
                }
            }
            SiblingMessage::DtrUpdate { dtr } => self.on_sibling_dtr_update(dtr, out),
            SiblingMessage::SendNewGtwRequest { hag_ips } => {
                self.on_send_new_gtw_request(hag_ips, out)
            }
            SiblingMessage::NewGtwWinner { network, mask, dtr } => {
                self.on_new_gtw_winner(network, mask, dtr, out)
            }
            SiblingMessage::UpdateNodeTable { table } => {
                out.replace_routing_table(table);
            }
            SiblingMessage::RequestToken | SiblingMessage::TokenGrant { .. } => {
                // claimed by the sync core before routing delivery (§4.3)
            }
        }
    }

    fn on_provision(&mut self, provider_id: u8, network: u32, mask: u32, out: &mut dyn DeviceOutput) {
        if self.network.global_state == GlobalState::WithNetwork {
            info!("provision attempted twice, ignoring");
            return;
        }
        let (subnets, new_mask) = get_node_subnets(network, mask);
        let my_slot = self.network.orientation.slot();
        let my_subnet = subnets[&my_slot];
        let prefix_len = prefix_len_of_mask(new_mask);

        if network == ROOT_NETWORK && mask == ROOT_MASK {
            self.network.dtr = 1;
        }

        self.network.my_network = my_subnet;
        self.network.my_network_mask = new_mask;
        self.network.node_network = network;
        self.network.node_network_mask = mask;

        out.add_route(my_subnet, new_mask, Interface::Wlan);
        for slot in 1u8..=5 {
            if slot == my_slot || slot == provider_id {
                continue;
            }
            out.add_route(subnets[&slot], new_mask, Interface::Spi);
        }
        out.enable_ap_mode(my_subnet, new_mask);
        self.network.global_state = GlobalState::WithNetwork;

        out.emit_event(
            "provision",
            &[
                ("network", ip_to_string(network)),
                ("mask", prefix_len_of_mask(mask).to_string()),
                ("my_network", ip_to_string(my_subnet)),
                ("my_mask", prefix_len.to_string()),
            ],
        );
    }

    fn on_sibling_dtr_update(&mut self, peer_dtr: u32, out: &mut dyn DeviceOutput) {
        if peer_dtr == 0 {
            warn!("dtr update with distance 0 ignored");
            return;
        }
        if self.network.dtr == 0 || peer_dtr < self.network.dtr {
            self.network.dtr = peer_dtr;
            out.switch_default_gateway(Interface::Spi);
            self.network.is_local_root = false;
            if self.network.local_state == LocalState::Connected {
                out.send_peer_message(&PeerMessage::DtrUpdate { dtr: self.network.dtr });
            }
            out.emit_event("dtr-update", &[("dtr", self.network.dtr.to_string())]);
        }
    }

    fn on_send_new_gtw_request(&mut self, mut hag_ips: String, out: &mut dyn DeviceOutput) {
        if self.network.dtr == 1 {
            return;
        }
        if self.network.global_state == GlobalState::OnGtwReq {
            return;
        }
        self.network.global_state = GlobalState::OnGtwReq;
        self.network.dtr = 0;
        if !hag_ips.is_empty() {
            hag_ips.push(',');
        }
        hag_ips.push_str(&format!(
            "{}/{}",
            ip_to_string(self.network.node_network),
            prefix_len_of_mask(self.network.node_network_mask)
        ));
        out.send_peer_message(&PeerMessage::NewGtwRequest { hag_ips });
    }

    fn on_new_gtw_winner(&mut self, network: u32, mask: u32, dtr: u32, out: &mut dyn DeviceOutput) {
        if self.network.dtr == 1 {
            out.send_peer_message(&PeerMessage::NewGtwResponse {
                ext_network: self.network.node_network,
                ext_mask: self.network.node_network_mask,
                dtr: self.network.dtr,
            });
            return;
        }
        self.network.global_state = GlobalState::WithNetwork;
        out.switch_default_gateway(Interface::Spi);
        self.network.is_local_root = false;
        self.network.dtr = dtr + 1;
        out.send_peer_message(&PeerMessage::NewGtwResponse {
            ext_network: network,
            ext_mask: mask,
            dtr: self.network.dtr,
        });
    }

    // ------------------------------------------------------------------
    // external forwarder (§4.4.4) — peer message reactions
    // ------------------------------------------------------------------

    fn handle_peer(&mut self, event: PeerEvent, out: &mut dyn DeviceOutput) {
        match event {
            PeerEvent::Connected { network, mask } => self.on_peer_connected_cs(network, mask, out),
            PeerEvent::Message(message) => self.on_peer_message_cs(message, out),
            PeerEvent::Lost { network, mask } => self.on_peer_lost_cs(network, mask, out),
        }
    }

    fn on_peer_connected_cs(&mut self, peer_network: u32, peer_mask: u32, out: &mut dyn DeviceOutput) {
        self.network.local_state = LocalState::Connected;
        out.send_peer_message(&PeerMessage::Handshake {
            ext_network: self.network.node_network,
            ext_mask: self.network.node_network_mask,
            prov_network: self.network.my_network,
            prov_mask: self.network.my_network_mask,
            dtr: self.network.dtr,
        });
        out.add_route(peer_network, peer_mask, Interface::Orientation(self.network.orientation));
        out.broadcast_routing_table();
        out.emit_event(
            "on-connected",
            &[
                ("network", ip_to_string(peer_network)),
                ("mask", prefix_len_of_mask(peer_mask).to_string()),
            ],
        );
    }

    fn on_peer_message_cs(&mut self, message: PeerMessage, out: &mut dyn DeviceOutput) {
        match message {
            PeerMessage::Handshake {
                ext_network,
                ext_mask,
                prov_network,
                prov_mask,
                dtr: peer_dtr,
            } => {
                out.emit_event(
                    "handshake",
                    &[
                        ("ext_network", ip_to_string(ext_network)),
                        ("ext_mask", prefix_len_of_mask(ext_mask).to_string()),
                        ("dtr", peer_dtr.to_string()),
                    ],
                );
                if self.network.global_state == GlobalState::WithoutNetwork
                    && self.network.local_state == LocalState::Connected
                {
                    let (subnets, new_mask) = get_node_subnets(prov_network, prov_mask);
                    let my_slot = self.network.orientation.slot();
                    let my_subnet = subnets[&my_slot];
                    self.network.my_network = my_subnet;
                    self.network.my_network_mask = new_mask;
                    self.network.node_network = prov_network;
                    self.network.node_network_mask = prov_mask;
                    out.add_route(self.network.node_network, self.network.node_network_mask, Interface::Spi);
                    out.add_route(ext_network, ext_mask, Interface::Wlan);
                    out.broadcast_to_siblings(SiblingMessage::Provision {
                        provider_id: my_slot,
                        network: prov_network,
                        mask: prov_mask,
                    });
                    self.network.global_state = GlobalState::WithNetwork;
                } else if ext_network != 0 || ext_mask != 0 {
                    out.add_route(ext_network, ext_mask, Interface::Wlan);
                }
                self.apply_peer_dtr_update(peer_dtr, out);
            }
            PeerMessage::DtrUpdate { dtr: peer_dtr } => {
                out.emit_event("dtr-update", &[("dtr", peer_dtr.to_string())]);
                self.apply_peer_dtr_update(peer_dtr, out);
            }
            PeerMessage::NewGtwRequest { hag_ips } => self.on_peer_new_gtw_request(hag_ips, out),
            PeerMessage::NewGtwResponse {
                ext_network,
                ext_mask,
                dtr: peer_dtr,
            } => self.on_peer_new_gtw_response(ext_network, ext_mask, peer_dtr, out),
            PeerMessage::OnConnected { .. } | PeerMessage::PeerLost { .. } => {
                // these arrive as PeerEvent::Connected/Lost, never as messages
            }
        }
    }

    fn apply_peer_dtr_update(&mut self, peer_dtr: u32, out: &mut dyn DeviceOutput) {
        if peer_dtr == 0 {
            return;
        }
        if self.network.dtr == 0 || peer_dtr + 1 < self.network.dtr {
            self.network.dtr = peer_dtr + 1;
            out.broadcast_to_siblings(SiblingMessage::DtrUpdate { dtr: self.network.dtr });
            out.switch_default_gateway(Interface::Wlan);
            self.network.is_local_root = true;
        }
    }

    fn on_peer_new_gtw_request(&mut self, hag_ips: String, out: &mut dyn DeviceOutput) {
        if !hag_ips.is_empty() {
            for token in hag_ips.split(',') {
                if let Some((addr, prefix)) = token.split_once('/') {
                    if let (Some(network), Ok(prefix_len)) =
                        (crate::types::ip_from_str(addr), prefix.parse::<u32>())
                    {
                        out.add_route(network, mask_from_prefix_len(prefix_len), Interface::Orientation(self.network.orientation));
                    }
                }
            }
            out.broadcast_routing_table();
        }
        out.broadcast_to_siblings(SiblingMessage::SendNewGtwRequest { hag_ips });
        if self.network.dtr == 1 {
            return;
        }
        if self.network.global_state == GlobalState::OnGtwReq {
            return;
        }
        self.network.global_state = GlobalState::OnGtwReq;
        self.network.dtr = 0;
    }

    fn on_peer_new_gtw_response(&mut self, ext_network: u32, ext_mask: u32, peer_dtr: u32, out: &mut dyn DeviceOutput) {
        if self.network.dtr != 0 && self.network.dtr <= peer_dtr {
            return;
        }
        self.network.global_state = GlobalState::WithNetwork;
        out.switch_default_gateway(Interface::Wlan);
        self.network.is_local_root = true;
        self.network.dtr = peer_dtr + 1;
        out.broadcast_to_siblings(SiblingMessage::NewGtwWinner {
            network: ext_network,
            mask: ext_mask,
            dtr: peer_dtr,
        });
    }

    fn on_peer_lost_cs(&mut self, _network: u32, _mask: u32, out: &mut dyn DeviceOutput) {
        self.network.my_wlan_ip = None;
        self.network.local_state = LocalState::NotConnected;
        out.switch_default_gateway(Interface::Spi);
        let removed = out.remove_routes_for_interface(Interface::Wlan);
        let routes: Vec<(u32, u32)> = removed
            .iter()
            .map(|h| (h.network, mask_from_prefix_len(h.prefix_len)))
            .collect();
        out.broadcast_to_siblings(SiblingMessage::RouteLost { routes });

        if self.network.is_local_root {
            self.network.is_local_root = false;
            self.network.dtr = 0;
            self.network.global_state = GlobalState::OnGtwReq;
            out.broadcast_to_siblings(SiblingMessage::SendNewGtwRequest {
                hag_ips: String::new(),
            });
        }
        out.emit_event("peer-lost", &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing_table::{Hop, RoutingTable};

    struct RecordingOutput {
        broadcasts: Vec<SiblingMessage>,
        peer_messages: Vec<PeerMessage>,
        table: RoutingTable,
        legacy_table: RoutingTable,
    }

    impl RecordingOutput {
        fn new() -> Self {
            Self {
                broadcasts: Vec::new(),
                peer_messages: Vec::new(),
                table: RoutingTable::new(Interface::Spi),
                legacy_table: RoutingTable::new(Interface::Spi),
            }
        }
    }

    impl DeviceOutput for RecordingOutput {
        fn send_peer_message(&mut self, message: &PeerMessage) {
            self.peer_messages.push(message.clone());
        }
        fn broadcast_to_siblings(&mut self, message: SiblingMessage) -> bool {
            self.broadcasts.push(message);
            true
        }
        fn switch_default_gateway(&mut self, iface: Interface) {
            self.table.switch_default_gateway(iface);
        }
        fn add_route(&mut self, network: u32, mask: u32, iface: Interface) {
            self.table
                .add_route(network, prefix_len_of_mask(mask), iface, true);
        }
        fn remove_route(&mut self, network: u32, mask: u32) {
            self.table.remove_route(network, prefix_len_of_mask(mask));
        }
        fn remove_legacy_route(&mut self, network: u32, mask: u32) {
            self.legacy_table
                .remove_route(network, prefix_len_of_mask(mask));
        }
        fn remove_routes_for_interface(&mut self, iface: Interface) -> Vec<Hop> {
            self.table.remove_routes_for_interface(iface)
        }
        fn enable_ap_mode(&mut self, _network: u32, _mask: u32) {}
        fn replace_routing_table(&mut self, entries: Vec<(u32, u32, Interface)>) {
            self.table = RoutingTable::from_entries(entries);
        }
        fn broadcast_routing_table(&mut self) -> bool {
            let entries = self.table.to_entries();
            self.broadcast_to_siblings(SiblingMessage::UpdateNodeTable { table: entries })
        }
        fn routing_table(&self) -> &RoutingTable {
            &self.table
        }
        fn emit_event(&mut self, _name: &str, _fields: &[(&str, String)]) {}
    }

    #[test]
    fn provision_claims_own_slot_and_sets_root_adjacent_dtr() {
        let mut core = ForwarderCore::new(Orientation::North, false);
        let mut out = RecordingOutput::new();
        core.on_sibling_message(SiblingMessage::Provision {
            provider_id: 5,
            network: ROOT_NETWORK,
            mask: ROOT_MASK,
        });
        core.on_critical_section(&mut out);

        assert_eq!(core.network.dtr, 1);
        assert_eq!(core.network.global_state, GlobalState::WithNetwork);
        assert!(out.table.routes().iter().any(|h| h.interface == Interface::Wlan));
    }

    #[test]
    fn peer_lost_while_local_root_triggers_reelection() {
        let mut core = ForwarderCore::new(Orientation::East, false);
        core.network.is_local_root = true;
        core.network.local_state = LocalState::Connected;
        let mut out = RecordingOutput::new();

        core.on_peer_lost(0, 0);
        core.on_critical_section(&mut out);

        assert!(!core.network.is_local_root);
        assert_eq!(core.network.dtr, 0);
        assert_eq!(core.network.global_state, GlobalState::OnGtwReq);
        assert!(out
            .broadcasts
            .iter()
            .any(|m| matches!(m, SiblingMessage::SendNewGtwRequest { .. })));
    }

    #[test]
    fn route_lost_removes_from_legacy_table_not_global() {
        let mut core = ForwarderCore::new(Orientation::North, false);
        let mut out = RecordingOutput::new();
        out.table.add_route(ip("10.32.0.0"), 11, Interface::Wlan, false);
        out.legacy_table.add_route(ip("10.32.0.0"), 11, Interface::Wlan, false);

        core.on_sibling_message(SiblingMessage::RouteLost {
            routes: vec![(ip("10.32.0.0"), mask_from_prefix_len(11))],
        });
        core.on_critical_section(&mut out);

        assert!(!out
            .legacy_table
            .routes()
            .iter()
            .any(|h| h.network == ip("10.32.0.0")));
        assert!(out
            .table
            .routes()
            .iter()
            .any(|h| h.network == ip("10.32.0.0")));
    }

    fn ip(s: &str) -> u32 {
        crate::types::ip_from_str(s).unwrap()
    }
}
