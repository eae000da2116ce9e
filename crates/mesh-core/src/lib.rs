//! Mesh Node Routing and Synchronization Core
//!
//! This crate provides the per-node routing and synchronization state
//! machines for a five-device wireless mesh node: four outward-facing
//! forwarders and one center device, connected by an SPI sibling ring and
//! paired one-to-one with wireless peers on the four cardinal links.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod cores;
pub mod device;
pub mod errors;
pub mod messages;
pub mod network;
pub mod observer;
pub mod packet;
pub mod routing_table;
pub mod subnet;
pub mod sync;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::NodeConfig;
pub use cores::{DeviceOutput, ForwarderCore, HomeCore, PeerEvent, RootCore, RoutingCore};
pub use device::{Device, DeviceEvent, DeviceQuery, PeerLink, SiblingFrame};
pub use errors::{MeshError, MeshResult};
pub use messages::{PeerMessage, SiblingMessage};
pub use observer::{Event, EventLog, Stream, Value};
pub use routing_table::{Hop, Interface, RoutingTable};
pub use sync::{CenterSync, ForwarderSync, SyncCore, SyncOutcome};
pub use types::{Orientation, SystemTimeSource, TimeSource, Timestamp, Ttl};
