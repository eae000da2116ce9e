//! Pluggable peer-link transport (§6).
//!
//! The actual station/AP wireless driver is a hardware concern out of scope
//! here; `PeerTransport` is the seam a real driver implements, mirroring the
//! protocol core's `TransportTask` abstraction — register one per forwarder,
//! hand it the `PeerLink` half it doesn't already own, and let the runtime
//! spawn it alongside the device tasks.

use async_trait::async_trait;

use mesh_core::Orientation;

#[async_trait]
pub trait PeerTransport: Send {
    /// Orientation this transport instance is wired to.
    fn orientation(&self) -> Orientation;

    /// Drive the transport's own event loop until the runtime drops it.
    async fn run(&mut self) -> mesh_core::MeshResult<()>;
}

/// Stands in for a driver that hasn't been wired up yet: the `--qemu` stub
/// path and unit tests attach this so the forwarder's peer link exists
/// without a real radio behind it.
pub struct NullPeerTransport {
    orientation: Orientation,
}

impl NullPeerTransport {
    pub fn new(orientation: Orientation) -> Self {
        Self { orientation }
    }
}

#[async_trait]
impl PeerTransport for NullPeerTransport {
    fn orientation(&self) -> Orientation {
        self.orientation
    }

    async fn run(&mut self) -> mesh_core::MeshResult<()> {
        std::future::pending().await
    }
}
