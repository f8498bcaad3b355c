//! Error types for dvr-protocols.

use dvr_topology::NodeId;
use thiserror::Error;

/// Result type for dvr-protocols operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Message could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Encoded message does not fit in one datagram.
    #[error("encoded message is {len} bytes, datagram limit is {max}")]
    Oversized { len: usize, max: usize },

    /// Path computation rejected the merged table.
    #[error("routing error: {0}")]
    Routing(#[from] dvr_routing::Error),

    /// Topology could not be loaded.
    #[error("topology error: {0}")]
    Topology(#[from] dvr_topology::Error),

    /// A link can only be cut towards a current neighbour.
    #[error("{0} is not a neighbour")]
    NotNeighbor(NodeId),
}
