//! Token-ring synchronization cores (§4.5).

mod center;
mod forwarder;

pub use center::CenterSync;
pub use forwarder::ForwarderSync;

use crate::cores::DeviceOutput;
use crate::messages::SiblingMessage;
use crate::types::Orientation;

/// What a sync core did with a sibling message, and whether the device
/// should now run the routing core's critical section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// `true` if the sync core claimed the message (a token-ring control
    /// frame); claimed messages are never forwarded to the routing core.
    pub claimed: bool,
    /// `true` if the device should invoke `RoutingCore::on_critical_section`
    /// as a direct result of this message.
    pub run_critical_section: bool,
}

impl SyncOutcome {
    fn not_claimed() -> Self {
        Self {
            claimed: false,
            run_critical_section: false,
        }
    }

    fn claimed(run_critical_section: bool) -> Self {
        Self {
            claimed: true,
            run_critical_section,
        }
    }
}

/// The token-ring synchronization core a sub-device runs: the center issues
/// and retires tokens, the four forwarders request and relay them.
pub enum SyncCore {
    Center(CenterSync),
    Forwarder(ForwarderSync),
}

impl SyncCore {
    pub fn new_center() -> Self {
        SyncCore::Center(CenterSync::new())
    }

    pub fn new_forwarder(orientation: Orientation) -> Self {
        SyncCore::Forwarder(ForwarderSync::new(orientation))
    }

    pub fn request_critical_section(&mut self, out: &mut dyn DeviceOutput) {
        match self {
            SyncCore::Center(c) => c.request_critical_section(),
            SyncCore::Forwarder(c) => c.request_critical_section(out),
        }
    }

    pub fn on_sibling_message(
        &mut self,
        message: &SiblingMessage,
        out: &mut dyn DeviceOutput,
    ) -> SyncOutcome {
        match self {
            SyncCore::Center(c) => c.on_sibling_message(message, out),
            SyncCore::Forwarder(c) => c.on_sibling_message(message, out),
        }
    }
}
