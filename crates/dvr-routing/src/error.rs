//! Error types for dvr-routing.

use dvr_topology::NodeId;
use thiserror::Error;

/// Result type for dvr-routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during path computation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// An edge could still be relaxed after `N - 1` passes.
    #[error("negative cost cycle reachable from {origin} (edge {from}->{to} still relaxes)")]
    NegativeCycle {
        origin: NodeId,
        from: NodeId,
        to: NodeId,
    },
}
