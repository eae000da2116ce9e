//! Longest-prefix-match routing table (§4.1).

use serde::{Deserialize, Serialize};

use crate::types::{mask_from_prefix_len, prefix_len_of_mask, Orientation};

/// The egress an entry's hop routes through: either a sibling orientation
/// (a node-global route) or a raw device interface (a per-device legacy
/// route seeded before the node is provisioned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interface {
    Orientation(Orientation),
    Spi,
    Wlan,
}

impl Interface {
    pub fn as_orientation(self) -> Option<Orientation> {
        match self {
            Interface::Orientation(o) => Some(o),
            _ => None,
        }
    }
}

impl std::fmt::Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interface::Orientation(o) => write!(f, "{o}"),
            Interface::Spi => write!(f, "spi"),
            Interface::Wlan => write!(f, "wlan"),
        }
    }
}

/// A single routing-table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub network: u32,
    pub prefix_len: u32,
    pub interface: Interface,
    pub static_route: bool,
}

impl Hop {
    pub fn new(network: u32, prefix_len: u32, interface: Interface, static_route: bool) -> Self {
        let mask = mask_from_prefix_len(prefix_len);
        Self {
            network: network & mask,
            prefix_len,
            interface,
            static_route,
        }
    }

    pub fn matches(&self, addr: u32) -> bool {
        let mask = mask_from_prefix_len(self.prefix_len);
        (addr & mask) == self.network
    }
}

impl std::fmt::Display for Hop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = if self.static_route { "[STATIC] " } else { "" };
        write!(
            f,
            "{prefix}{}/{} -> {}",
            crate::types::ip_to_string(self.network),
            self.prefix_len,
            self.interface
        )
    }
}

/// An ordered list of hops, sorted by descending prefix length, with a
/// mandatory `prefix_len == 0` default gateway always last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingTable {
    routes: Vec<Hop>,
}

impl RoutingTable {
    /// A fresh table whose only entry is the default gateway through `gateway`.
    pub fn new(gateway: Interface) -> Self {
        Self {
            routes: vec![Hop::new(0, 0, gateway, true)],
        }
    }

    /// Reconstruct from a serialized `[(network, mask, interface)]` list; the
    /// last entry is treated as the (forced-static) default gateway.
    pub fn from_entries(entries: Vec<(u32, u32, Interface)>) -> Self {
        let mut routes: Vec<Hop> = entries
            .into_iter()
            .map(|(network, mask, interface)| {
                Hop::new(network, prefix_len_of_mask(mask), interface, false)
            })
            .collect();
        if let Some(last) = routes.last_mut() {
            last.static_route = true;
        }
        Self { routes }
    }

    /// Serialize to `[(network, mask, interface)]`.
    pub fn to_entries(&self) -> Vec<(u32, u32, Interface)> {
        self.routes
            .iter()
            .map(|h| (h.network, mask_from_prefix_len(h.prefix_len), h.interface))
            .collect()
    }

    pub fn routes(&self) -> &[Hop] {
        &self.routes
    }

    /// Insert a route, masking `network` to `prefix_len`. Inserted at the
    /// first position whose existing entry has `prefix_len <= new prefix_len`;
    /// if no such position exists, appended immediately before the default
    /// gateway (§9 open-question resolution).
    pub fn add_route(&mut self, network: u32, prefix_len: u32, interface: Interface, static_route: bool) {
        let hop = Hop::new(network, prefix_len, interface, static_route);
        let insert_at = self
            .routes
            .iter()
            .position(|r| r.prefix_len <= prefix_len)
            .unwrap_or_else(|| self.routes.len().saturating_sub(1));
        self.routes.insert(insert_at, hop);
    }

    pub fn remove_route(&mut self, network: u32, prefix_len: u32) {
        let mask = mask_from_prefix_len(prefix_len);
        let masked = network & mask;
        self.routes
            .retain(|r| !(r.network == masked && r.prefix_len == prefix_len));
    }

    /// First matching hop (longest-prefix match); always defined because the
    /// default gateway matches every address.
    pub fn route(&self, addr: u32) -> &Hop {
        self.routes
            .iter()
            .find(|r| r.matches(addr))
            .expect("default gateway always matches")
    }

    pub fn switch_default_gateway(&mut self, interface: Interface) {
        if let Some(gateway) = self.routes.last_mut() {
            gateway.interface = interface;
        }
    }

    /// Remove and return all non-static hops through `interface`.
    pub fn remove_routes_for_interface(&mut self, interface: Interface) -> Vec<Hop> {
        let mut removed = Vec::new();
        self.routes.retain(|r| {
            if !r.static_route && r.interface == interface {
                removed.push(r.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Reinstall only the default gateway, discarding all other routes.
    pub fn reset(&mut self, gateway: Interface) {
        self.routes = vec![Hop::new(0, 0, gateway, true)];
    }

    pub fn status(&self) -> String {
        self.routes
            .iter()
            .map(|h| h.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
