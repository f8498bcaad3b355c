//! Error types for the node runtime.

use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop a node from starting.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad argument or environment value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Topology could not be loaded or addressed
    #[error("Topology error: {0}")]
    Topology(#[from] dvr_topology::Error),

    /// Router could not be built
    #[error("Protocol error: {0}")]
    Protocol(#[from] dvr_protocols::Error),

    /// Endpoint could not be bound
    #[error("Transport error: {0:#}")]
    Transport(anyhow::Error),
}
