//! Error types for dvr-topology.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for dvr-topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while naming nodes or loading a topology.
#[derive(Debug, Error)]
pub enum Error {
    /// Identifier is not part of the node alphabet.
    #[error("unknown node identifier: {0:?}")]
    UnknownNode(String),

    /// Port cannot host the given node (offset would underflow or overflow).
    #[error("port {port} cannot be assigned to node {node}")]
    PortOutOfRange { port: u16, node: char },

    /// Topology config could not be read.
    #[error("cannot read topology config {path:?}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
