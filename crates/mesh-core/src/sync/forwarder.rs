//! ForwarderSync (slots 1-4): requests and relays the token (§4.5).

use super::SyncOutcome;
use crate::cores::DeviceOutput;
use crate::messages::SiblingMessage;
use crate::types::Orientation;

pub struct ForwarderSync {
    slot: u8,
    requested_cs: bool,
}

impl ForwarderSync {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            slot: orientation.slot(),
            requested_cs: false,
        }
    }

    pub fn request_critical_section(&mut self, out: &mut dyn DeviceOutput) {
        self.requested_cs = true;
        out.broadcast_to_siblings(SiblingMessage::RequestToken);
    }

    pub fn on_sibling_message(
        &mut self,
        message: &SiblingMessage,
        out: &mut dyn DeviceOutput,
    ) -> SyncOutcome {
        match message {
            SiblingMessage::TokenGrant { destination } if *destination == self.slot => {
                let mut run_cs = false;
                if self.requested_cs {
                    self.requested_cs = false;
                    run_cs = true;
                }
                // the grant always forwards, whether or not this slot had a request
                out.broadcast_to_siblings(SiblingMessage::TokenGrant {
                    destination: self.next_slot(),
                });
                SyncOutcome::claimed(run_cs)
            }
            SiblingMessage::TokenGrant { .. } | SiblingMessage::RequestToken => {
                SyncOutcome::claimed(false)
            }
            _ => SyncOutcome::not_claimed(),
        }
    }

    fn next_slot(&self) -> u8 {
        (self.slot % 5) + 1
    }
}
