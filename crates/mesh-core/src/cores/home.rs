//! HomeCore (center, non-root) — §4.4.5.

use std::collections::VecDeque;

use tracing::info;

use super::DeviceOutput;
use crate::messages::SiblingMessage;
use crate::routing_table::{Interface, RoutingTable};
use crate::subnet::get_node_subnets;
use crate::types::{ip_to_string, Orientation};

pub struct HomeCore {
    provisioned: bool,
    my_network: u32,
    my_network_mask: u32,
    provision_queue: VecDeque<SiblingMessage>,
}

impl HomeCore {
    pub fn new() -> Self {
        Self {
            provisioned: false,
            my_network: 0,
            my_network_mask: 0,
            provision_queue: VecDeque::new(),
        }
    }

    pub fn on_start(&mut self, _out: &mut dyn DeviceOutput) {}

    pub fn on_sibling_message(&mut self, message: SiblingMessage, out: &mut dyn DeviceOutput) {
        match message {
            SiblingMessage::Provision { .. } => self.provision_queue.push_back(message),
            // Applied immediately, not deferred through the provision queue (§4.4.5).
            SiblingMessage::UpdateNodeTable { table } => out.replace_routing_table(table),
            _ => {}
        }
    }

    pub fn on_critical_section(&mut self, out: &mut dyn DeviceOutput) {
        while let Some(message) = self.provision_queue.pop_front() {
            if let SiblingMessage::Provision {
                provider_id,
                network,
                mask,
            } = message
            {
                if !self.provisioned {
                    self.provision(provider_id, network, mask, out);
                }
            }
        }
    }

    fn provision(&mut self, provider_id: u8, network: u32, mask: u32, out: &mut dyn DeviceOutput) {
        let (subnets, new_mask) = get_node_subnets(network, mask);
        let my_subnet = subnets[&Orientation::Center.slot()];
        self.my_network = my_subnet;
        self.my_network_mask = new_mask;

        out.add_route(my_subnet, new_mask, Interface::Wlan);
        for slot in 1u8..=5 {
            if slot == Orientation::Center.slot() || slot == provider_id {
                continue;
            }
            out.add_route(subnets[&slot], new_mask, Interface::Spi);
        }
        out.enable_ap_mode(my_subnet, new_mask);
        self.provisioned = true;

        out.broadcast_routing_table();
        out.emit_event(
            "provision",
            &[
                ("network", ip_to_string(network)),
                ("my_network", ip_to_string(my_subnet)),
            ],
        );
        info!(network = %ip_to_string(my_subnet), "home provisioned");
    }

    pub fn do_forward(&self, dst: u32, table: &RoutingTable) -> Option<Orientation> {
        table.route(dst).interface.as_orientation()
    }

    pub fn status(&self, table: &RoutingTable) -> String {
        format!(
            "home provisioned={} my_network={}\n{}",
            self.provisioned,
            ip_to_string(self.my_network),
            table.status()
        )
    }
}

impl Default for HomeCore {
    fn default() -> Self {
        Self::new()
    }
}
