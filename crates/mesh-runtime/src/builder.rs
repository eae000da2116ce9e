//! Node builder API.
//!
//! A fluent builder over `NodeRuntime`, the same shape as the protocol
//! runtime's `RuntimeBuilder` → `RuntimeHandle` pair, reduced to the handful
//! of knobs a mesh node actually needs: its config and whether it won the
//! root election at startup.

use mesh_core::NodeConfig;

use crate::errors::RuntimeResult;
use crate::runtime::NodeRuntime;

pub struct NodeBuilder {
    config: NodeConfig,
    is_root: bool,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            config: NodeConfig::default(),
            is_root: false,
        }
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Mark this node as the root of the mesh (§4.4.6): its center runs
    /// `RootCore` instead of `HomeCore`, and its forwarders run root-tagged.
    pub fn as_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    pub fn build_and_start(self) -> RuntimeResult<NodeRuntime> {
        let mut runtime = NodeRuntime::new(self.config, self.is_root);
        runtime.start()?;
        Ok(runtime)
    }
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_and_start_produces_a_running_root_node() {
        let mut runtime = NodeBuilder::new()
            .with_config(NodeConfig::testing())
            .as_root(true)
            .build_and_start()
            .unwrap();

        assert!(runtime.is_running());
        assert!(runtime.is_root());
        runtime.shutdown().await.unwrap();
    }
}
