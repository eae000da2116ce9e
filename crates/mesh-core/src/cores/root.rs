//! RootCore (center, root) — §4.4.6.

use std::sync::Arc;
use std::time::Duration;

use super::DeviceOutput;
use crate::messages::SiblingMessage;
use crate::routing_table::{Interface, RoutingTable};
use crate::types::{ip_from_str, mask_from_prefix_len, Orientation, TimeSource, Timestamp};

const ROOT_NETWORK_STR: &str = "10.0.0.0";
const ROOT_PREFIX_LEN: u32 = 8;
const DEFAULT_GATEWAY_WINNER_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RootCore {
    time_source: Arc<dyn TimeSource>,
    gateway_winner_timeout: Duration,
    pending_gtw_request_since: Option<Timestamp>,
}

impl RootCore {
    pub fn new(time_source: Arc<dyn TimeSource>) -> Self {
        Self::with_timeout(time_source, DEFAULT_GATEWAY_WINNER_TIMEOUT)
    }

    pub fn with_timeout(time_source: Arc<dyn TimeSource>, gateway_winner_timeout: Duration) -> Self {
        Self {
            time_source,
            gateway_winner_timeout,
            pending_gtw_request_since: None,
        }
    }

    pub fn on_start(&mut self, out: &mut dyn DeviceOutput) {
        out.switch_default_gateway(Interface::Wlan);
        let root_network = ip_from_str(ROOT_NETWORK_STR).expect("literal root network");
        let mask = mask_from_prefix_len(ROOT_PREFIX_LEN);
        out.add_route(root_network, mask, Interface::Spi);
        out.broadcast_to_siblings(SiblingMessage::Provision {
            provider_id: Orientation::Center.slot(),
            network: root_network,
            mask,
        });
    }

    /// Root has no sibling event queue: both effects land immediately, with
    /// no critical-section gating (§4.4.6).
    pub fn on_sibling_message(&mut self, message: SiblingMessage, out: &mut dyn DeviceOutput) {
        match message {
            SiblingMessage::SendNewGtwRequest { .. } => {
                self.pending_gtw_request_since = Some(self.time_source.now());
            }
            SiblingMessage::UpdateNodeTable { table } => out.replace_routing_table(table),
            _ => {}
        }
    }

    pub fn on_critical_section(&mut self, _out: &mut dyn DeviceOutput) {}

    pub fn on_tick(&mut self, out: &mut dyn DeviceOutput) {
        let Some(since) = self.pending_gtw_request_since else {
            return;
        };
        if self.time_source.now().duration_since(since) >= self.gateway_winner_timeout {
            let root_network = ip_from_str(ROOT_NETWORK_STR).expect("literal root network");
            let mask = mask_from_prefix_len(ROOT_PREFIX_LEN);
            out.broadcast_to_siblings(SiblingMessage::NewGtwWinner {
                network: root_network,
                mask,
                dtr: 1,
            });
            self.pending_gtw_request_since = None;
        }
    }

    pub fn on_forward(&mut self, _src: u32, _dst: u32) {}

    pub fn do_forward(&self, dst: u32, table: &RoutingTable) -> Option<Orientation> {
        table.route(dst).interface.as_orientation()
    }

    pub fn status(&self, table: &RoutingTable) -> String {
        format!("root\n{}", table.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing_table::Hop;
    use std::cell::Cell;

    struct FakeTime(Cell<u64>);

    impl TimeSource for FakeTime {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0.get())
        }
    }

    struct RecordingOutput {
        broadcasts: Vec<SiblingMessage>,
        table: RoutingTable,
    }

    impl DeviceOutput for RecordingOutput {
        fn send_peer_message(&mut self, _message: &crate::messages::PeerMessage) {}
        fn broadcast_to_siblings(&mut self, message: SiblingMessage) -> bool {
            self.broadcasts.push(message);
            true
        }
        fn switch_default_gateway(&mut self, iface: Interface) {
            self.table.switch_default_gateway(iface);
        }
        fn add_route(&mut self, network: u32, mask: u32, iface: Interface) {
            self.table
                .add_route(network, crate::types::prefix_len_of_mask(mask), iface, true);
        }
        fn remove_route(&mut self, network: u32, mask: u32) {
            self.table
                .remove_route(network, crate::types::prefix_len_of_mask(mask));
        }
        fn remove_legacy_route(&mut self, _network: u32, _mask: u32) {}
        fn remove_routes_for_interface(&mut self, iface: Interface) -> Vec<Hop> {
            self.table.remove_routes_for_interface(iface)
        }
        fn enable_ap_mode(&mut self, _network: u32, _mask: u32) {}
        fn replace_routing_table(&mut self, entries: Vec<(u32, u32, Interface)>) {
            self.table = RoutingTable::from_entries(entries);
        }
        fn broadcast_routing_table(&mut self) -> bool {
            true
        }
        fn routing_table(&self) -> &RoutingTable {
            &self.table
        }
        fn emit_event(&mut self, _name: &str, _fields: &[(&str, String)]) {}
    }

    #[test]
    fn gateway_winner_broadcast_fires_after_timeout() {
        let time = Arc::new(FakeTime(Cell::new(0)));
        let mut core = RootCore::with_timeout(time.clone(), Duration::from_millis(200));
        let mut out = RecordingOutput {
            broadcasts: Vec::new(),
            table: RoutingTable::new(Interface::Wlan),
        };

        core.on_sibling_message(
            SiblingMessage::SendNewGtwRequest {
                hag_ips: String::new(),
            },
            &mut out,
        );
        time.0.set(100);
        core.on_tick(&mut out);
        assert!(out.broadcasts.is_empty());

        time.0.set(300);
        core.on_tick(&mut out);
        assert!(matches!(
            out.broadcasts.last(),
            Some(SiblingMessage::NewGtwWinner { dtr: 1, .. })
        ));
        assert!(core.pending_gtw_request_since.is_none());
    }

    #[test]
    fn update_node_table_is_applied_immediately_with_no_queue() {
        let time = Arc::new(FakeTime(Cell::new(0)));
        let mut core = RootCore::new(time);
        let mut out = RecordingOutput {
            broadcasts: Vec::new(),
            table: RoutingTable::new(Interface::Spi),
        };

        core.on_sibling_message(
            SiblingMessage::UpdateNodeTable {
                table: vec![(0, 0, Interface::Wlan)],
            },
            &mut out,
        );
        assert_eq!(out.table.route(0).interface, Interface::Wlan);
    }
}
