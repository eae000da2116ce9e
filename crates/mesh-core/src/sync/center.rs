//! CenterSync (slot 5): the token source (§4.5).

use super::SyncOutcome;
use crate::cores::DeviceOutput;
use crate::messages::SiblingMessage;

const CENTER_SLOT: u8 = 5;
const FIRST_FORWARDER_SLOT: u8 = 1;

pub struct CenterSync {
    requested_cs: bool,
    requested_tokens: u32,
    is_token_out: bool,
}

impl CenterSync {
    pub fn new() -> Self {
        Self {
            // the center always wants a turn when the token returns (§4.5)
            requested_cs: true,
            requested_tokens: 0,
            is_token_out: false,
        }
    }

    pub fn request_critical_section(&mut self) {
        self.requested_cs = true;
    }

    pub fn on_sibling_message(
        &mut self,
        message: &SiblingMessage,
        out: &mut dyn DeviceOutput,
    ) -> SyncOutcome {
        match message {
            SiblingMessage::RequestToken => {
                if self.is_token_out {
                    self.requested_tokens += 1;
                } else {
                    self.is_token_out = true;
                    out.broadcast_to_siblings(SiblingMessage::TokenGrant {
                        destination: FIRST_FORWARDER_SLOT,
                    });
                }
                SyncOutcome::claimed(false)
            }
            SiblingMessage::TokenGrant { destination } if *destination == CENTER_SLOT => {
                let mut run_cs = false;
                if self.requested_cs {
                    self.requested_cs = false;
                    run_cs = true;
                }
                if self.requested_tokens > 0 {
                    self.requested_tokens -= 1;
                    out.broadcast_to_siblings(SiblingMessage::TokenGrant {
                        destination: FIRST_FORWARDER_SLOT,
                    });
                } else {
                    self.is_token_out = false;
                }
                SyncOutcome::claimed(run_cs)
            }
            SiblingMessage::TokenGrant { .. } => SyncOutcome::claimed(false),
            _ => SyncOutcome::not_claimed(),
        }
    }
}

impl Default for CenterSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing_table::{Hop, Interface};

    struct RecordingOutput(Vec<SiblingMessage>, crate::routing_table::RoutingTable);

    impl DeviceOutput for RecordingOutput {
        fn send_peer_message(&mut self, _message: &crate::messages::PeerMessage) {}
        fn broadcast_to_siblings(&mut self, message: SiblingMessage) -> bool {
            self.0.push(message);
            true
        }
        fn switch_default_gateway(&mut self, _iface: Interface) {}
        fn add_route(&mut self, _network: u32, _mask: u32, _iface: Interface) {}
        fn remove_route(&mut self, _network: u32, _mask: u32) {}
        fn remove_legacy_route(&mut self, _network: u32, _mask: u32) {}
        fn remove_routes_for_interface(&mut self, _iface: Interface) -> Vec<Hop> {
            Vec::new()
        }
        fn enable_ap_mode(&mut self, _network: u32, _mask: u32) {}
        fn replace_routing_table(&mut self, entries: Vec<(u32, u32, Interface)>) {
            self.1 = crate::routing_table::RoutingTable::from_entries(entries);
        }
        fn broadcast_routing_table(&mut self) -> bool {
            true
        }
        fn routing_table(&self) -> &crate::routing_table::RoutingTable {
            &self.1
        }
        fn emit_event(&mut self, _name: &str, _fields: &[(&str, String)]) {}
    }

    #[test]
    fn issues_token_to_slot_one_on_first_request() {
        let mut sync = CenterSync::new();
        let mut out = RecordingOutput(Vec::new(), crate::routing_table::RoutingTable::new(Interface::Spi));
        let outcome = sync.on_sibling_message(&SiblingMessage::RequestToken, &mut out);
        assert!(outcome.claimed);
        assert!(matches!(
            out.0.last(),
            Some(SiblingMessage::TokenGrant { destination: 1 })
        ));
    }

    #[test]
    fn runs_critical_section_when_token_returns() {
        let mut sync = CenterSync::new();
        let mut out = RecordingOutput(Vec::new(), crate::routing_table::RoutingTable::new(Interface::Spi));
        let outcome =
            sync.on_sibling_message(&SiblingMessage::TokenGrant { destination: 5 }, &mut out);
        assert!(outcome.claimed);
        assert!(outcome.run_critical_section);
        assert!(!sync.is_token_out);
    }

    #[test]
    fn re_issues_token_when_requests_accumulated() {
        let mut sync = CenterSync::new();
        let mut out = RecordingOutput(Vec::new(), crate::routing_table::RoutingTable::new(Interface::Spi));
        sync.on_sibling_message(&SiblingMessage::RequestToken, &mut out);
        sync.on_sibling_message(&SiblingMessage::RequestToken, &mut out);
        sync.on_sibling_message(&SiblingMessage::TokenGrant { destination: 5 }, &mut out);
        assert!(sync.is_token_out);
        assert_eq!(
            out.0.iter().filter(|m| matches!(m, SiblingMessage::TokenGrant { .. })).count(),
            2
        );
    }
}
