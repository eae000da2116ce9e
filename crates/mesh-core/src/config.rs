//! Node configuration (§10.3).
//!
//! Mirrors the teacher's multi-constructor config convention: a struct of
//! plain fields, a `default()` tuned for production wiring, and a
//! `testing()` tuned for fast, deterministic unit/integration tests.

use std::time::Duration;

use crate::errors::{ConfigError, MeshResult};

/// Tunables for a single node's device tasks.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Budget a device loop blocks on its event queue before running a tick (§5).
    pub tick_period: Duration,
    /// Bounded channel capacity for each directed sibling-ring edge.
    pub sibling_channel_capacity: usize,
    /// Bounded channel capacity for a device's own interface-event queue.
    pub event_queue_capacity: usize,
    /// How long a root waits after `SEND_NEW_GTW_REQUEST` before declaring
    /// itself the gateway winner (§4.4.6).
    pub gateway_winner_timeout: Duration,
    /// Root of the static observability UI assets.
    pub assets_dir: String,
    /// Base URL of the simulation controller.
    pub pysim_url: String,
    /// Optional linearization of forwarder slots enforcing deterministic
    /// link-up order in tests (§5 startup barrier).
    pub connect_order: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            sibling_channel_capacity: 64,
            event_queue_capacity: 256,
            gateway_winner_timeout: Duration::from_secs(10),
            assets_dir: "./assets".to_string(),
            pysim_url: "http://pysim:8080".to_string(),
            connect_order: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Fast, deterministic settings for unit/integration tests: short tick
    /// period and a short gateway timeout so scenario tests don't block.
    pub fn testing() -> Self {
        Self {
            tick_period: Duration::from_millis(50),
            sibling_channel_capacity: 16,
            event_queue_capacity: 32,
            gateway_winner_timeout: Duration::from_millis(200),
            assets_dir: "./assets".to_string(),
            pysim_url: "http://localhost:8080".to_string(),
            connect_order: Vec::new(),
        }
    }

    /// Overlay values from the environment (§6 Environment), falling back to
    /// whatever defaults are already set on `self`.
    pub fn apply_env(mut self) -> MeshResult<Self> {
        if let Ok(dir) = std::env::var("ASSETS_DIR") {
            self.assets_dir = dir;
        }
        if let Ok(url) = std::env::var("PYSIM_URL") {
            self.pysim_url = url;
        }
        if let Ok(raw) = std::env::var("MESH_GATEWAY_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .map_err(|_| ConfigError::BadEnvVar("MESH_GATEWAY_TIMEOUT_SECS".into(), raw))?;
            self.gateway_winner_timeout = Duration::from_secs(secs);
        }
        if let Ok(raw) = std::env::var("MESH_CONNECT_ORDER") {
            self.connect_order = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn testing_config_has_short_timeouts() {
        let cfg = NodeConfig::testing();
        assert!(cfg.gateway_winner_timeout < NodeConfig::default().gateway_winner_timeout);
    }

    #[test]
    fn connect_order_env_var_splits_on_commas() {
        std::env::set_var("MESH_CONNECT_ORDER", "north, east,south");
        let cfg = NodeConfig::testing().apply_env().unwrap();
        std::env::remove_var("MESH_CONNECT_ORDER");
        assert_eq!(cfg.connect_order, vec!["north", "east", "south"]);
    }
}
