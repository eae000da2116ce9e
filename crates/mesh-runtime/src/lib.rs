//! Mesh Node Runtime
//!
//! Spawns and supervises the five sub-device tasks that make up one mesh
//! node: four forwarders and one center device, wired into an SPI sibling
//! ring. `mesh-core` provides the per-sub-device state machines; this crate
//! is the "engine" that turns five `Device`s into one running node.

pub mod builder;
pub mod driver;
pub mod errors;
mod ring;
pub mod runtime;
mod startup;
mod supervisor;

pub use builder::NodeBuilder;
pub use driver::{NullPeerTransport, PeerTransport};
pub use errors::{RuntimeError, RuntimeResult};
pub use runtime::NodeRuntime;
pub use startup::ConnectGate;
pub use supervisor::DeviceHealth;

// Re-export core types consumers typically need alongside the runtime.
pub use mesh_core::{
    DeviceEvent, Event, MeshError, MeshResult, NodeConfig, Orientation, Stream, Value,
};
