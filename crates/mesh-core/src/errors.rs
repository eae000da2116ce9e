//! Layered error types for the routing and synchronization core.
//!
//! Follows the same shape as the protocol core this workspace is descended
//! from: a handful of narrow error enums for each subsystem, unified by one
//! top-level enum with `#[from]` conversions, per §10.2.

use thiserror::Error;

/// Errors from routing-table and routing-core operations.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("invalid interface name: `{0}` (expected `spi` or `wlan`)")]
    InvalidInterfaceName(String),

    #[error("routing table is empty (missing default gateway)")]
    MissingDefaultGateway,

    #[error("unknown sibling message id: `{0}`")]
    UnknownMessageId(String),
}

/// Errors sending across the sibling ring or to a wireless peer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    #[error("no peer currently connected")]
    NoPeer,

    #[error("packet too short to be a valid IPv4 header ({0} bytes)")]
    PacketTooShort(usize),

    #[error("IPv4 header checksum mismatch")]
    ChecksumMismatch,
}

/// Errors loading or validating node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("environment variable `{0}` could not be parsed: {1}")]
    BadEnvVar(String, String),
}

/// Errors from the observability HTTP client/service.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("simulation controller unreachable at `{0}`")]
    ControllerUnreachable(String),

    #[error("http request failed: {0}")]
    Request(String),
}

/// Unified error type for the mesh core.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("observer error: {0}")]
    Observer(#[from] ObserverError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type MeshResult<T> = Result<T, MeshError>;

impl MeshError {
    pub fn invalid_interface<T: Into<String>>(name: T) -> Self {
        MeshError::Routing(RoutingError::InvalidInterfaceName(name.into()))
    }

    pub fn unknown_message_id<T: Into<String>>(id: T) -> Self {
        MeshError::Routing(RoutingError::UnknownMessageId(id.into()))
    }

    pub fn channel_send<T: Into<String>>(reason: T) -> Self {
        MeshError::Transport(TransportError::ChannelSend(reason.into()))
    }

    pub fn controller_unreachable<T: Into<String>>(url: T) -> Self {
        MeshError::Observer(ObserverError::ControllerUnreachable(url.into()))
    }
}
