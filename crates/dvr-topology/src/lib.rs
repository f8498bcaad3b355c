//! DVR Topology
//!
//! The fixed node alphabet and everything derived from it.
//!
//! # Node Alphabet
//!
//! Every participant is named by a single letter from a closed, totally
//! ordered alphabet (`A`..=`F`). The letter doubles as:
//! - the row/column index of the routing matrix
//! - the port offset of the node's datagram endpoint
//!
//! # Costs
//!
//! Link costs are small non-negative integers. [`INFINITY`] marks an
//! unreachable destination and is strictly larger than the cost of any simple
//! path, so a relaxed distance can never be mistaken for a real route.
//!
//! # Topology Config
//!
//! One line per node: `NODEID={NEIGHBOR:COST(,NEIGHBOR:COST)*}`. A node only
//! loads its own line. See [`parse_config`] and [`TopologySource`].

mod address;
mod config;
mod error;
mod link;
mod node;

pub use address::Addressing;
pub use config::{parse_config, ConfigFile, Links, StaticTopology, TopologySource};
pub use error::{Error, Result};
pub use link::Link;
pub use node::NodeId;

/// Path or edge weight.
///
/// Signed so that malformed matrices (negative edges) stay representable and
/// can be rejected by the solver instead of wrapping.
pub type Cost = i64;

/// Number of nodes in the alphabet.
pub const NODE_COUNT: usize = 6;

/// Sentinel cost for "unreachable".
pub const INFINITY: Cost = 999;

/// Largest link cost accepted from a topology config.
///
/// A simple path has at most `NODE_COUNT - 1` edges, so capping each edge here
/// keeps every real path strictly below [`INFINITY`].
pub const MAX_LINK_COST: Cost = (INFINITY - 1) / (NODE_COUNT as Cost - 1);

// Any simple path must stay strictly below the sentinel
const _: () = assert!(MAX_LINK_COST * (NODE_COUNT as Cost - 1) < INFINITY);
