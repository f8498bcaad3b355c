//! DVR Routing
//!
//! The per-node routing state and the algorithms that run over it.
//!
//! # Routing Table
//!
//! Every node keeps the full `N×N` cost matrix, not just its own row. Rows
//! learned from peers feed the local shortest-path computation; the own row
//! is what the node would actually route with.
//!
//! # Monotone Merge
//!
//! Outside of a topology reset, cells only ever decrease. Merging a peer's
//! table takes the cell-wise minimum, so repeated or reordered deliveries of
//! the same table are harmless and the network approaches a fixed point.
//!
//! # Convergence
//!
//! A matrix is treated as converged when it is symmetric and fully finite.
//! This is a proxy, not a proof of optimality; see [`is_converged`].

mod convergence;
mod error;
mod solver;
mod table;

pub use convergence::{is_converged, ConvergenceMonitor, Transition};
pub use error::{Error, Result};
pub use solver::{recompute, ShortestPaths};
pub use table::{NeighborSet, RoutingTable};
