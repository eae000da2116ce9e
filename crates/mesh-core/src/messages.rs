//! The two message planes (§3): peer (wireless, unicast) and sibling
//! (SPI ring, broadcast), each a tagged union serialized as self-describing
//! JSON (any encoding preserving the documented fields is spec-conformant).

use serde::{Deserialize, Serialize};

use crate::routing_table::Interface;

/// A message exchanged between a forwarder and its paired wireless peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id")]
pub enum PeerMessage {
    #[serde(rename = "on-connected")]
    OnConnected { network: u32, mask: u32 },
    #[serde(rename = "handshake")]
    Handshake {
        ext_network: u32,
        ext_mask: u32,
        prov_network: u32,
        prov_mask: u32,
        dtr: u32,
    },
    #[serde(rename = "dtr-update")]
    DtrUpdate { dtr: u32 },
    #[serde(rename = "new-gtw-request")]
    NewGtwRequest { hag_ips: String },
    #[serde(rename = "new-gtw-response")]
    NewGtwResponse {
        ext_network: u32,
        ext_mask: u32,
        dtr: u32,
    },
    #[serde(rename = "peer-lost")]
    PeerLost { network: u32, mask: u32 },
}

/// A message broadcast around the SPI ring between siblings of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id")]
pub enum SiblingMessage {
    #[serde(rename = "provision")]
    Provision {
        provider_id: u8,
        network: u32,
        mask: u32,
    },
    #[serde(rename = "route-lost")]
    RouteLost { routes: Vec<(u32, u32)> },
    #[serde(rename = "dtr-update")]
    DtrUpdate { dtr: u32 },
    #[serde(rename = "send-new-gtw-request")]
    SendNewGtwRequest { hag_ips: String },
    #[serde(rename = "new-gtw-winner")]
    NewGtwWinner { network: u32, mask: u32, dtr: u32 },
    #[serde(rename = "update-node-table")]
    UpdateNodeTable {
        table: Vec<(u32, u32, Interface)>,
    },
    #[serde(rename = "request-token")]
    RequestToken,
    #[serde(rename = "token-grant")]
    TokenGrant { destination: u8 },
}

impl SiblingMessage {
    /// Token-ring control messages are claimed by the sync core and never
    /// surface on the observability event stream (§4.6).
    pub fn is_token_control(&self) -> bool {
        matches!(
            self,
            SiblingMessage::RequestToken | SiblingMessage::TokenGrant { .. }
        )
    }

    /// The wire `id` tag, used for logging without re-serializing.
    pub fn id(&self) -> &'static str {
        match self {
            SiblingMessage::Provision { .. } => "provision",
            SiblingMessage::RouteLost { .. } => "route-lost",
            SiblingMessage::DtrUpdate { .. } => "dtr-update",
            SiblingMessage::SendNewGtwRequest { .. } => "send-new-gtw-request",
            SiblingMessage::NewGtwWinner { .. } => "new-gtw-winner",
            SiblingMessage::UpdateNodeTable { .. } => "update-node-table",
            SiblingMessage::RequestToken => "request-token",
            SiblingMessage::TokenGrant { .. } => "token-grant",
        }
    }
}
