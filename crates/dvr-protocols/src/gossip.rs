//! Gossip: monotone exchange of full routing tables.
//!
//! Merging takes the cell-wise minimum of every foreign row and then lets the
//! local solver derive any cheaper routes the new rows make possible. The
//! node's own row is never copied from a peer: it only ever comes from its
//! links and the solver. Because nothing ever goes up, decreases spread and
//! the network settles; increases (a severed link) cannot be expressed this
//! way at all and go through [`crate::broadcast`] instead.
//!
//! Every update carries the sender's topology epoch, the number of link
//! failures it has applied. Tables from different epochs describe different
//! graphs and are never merged.

use dvr_routing::{recompute, NeighborSet, RoutingTable};
use dvr_topology::NodeId;
use tracing::{debug, error};

use crate::error::Result;
use crate::message::{Envelope, Message};

/// Gossip counters for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GossipStats {
    /// Updates received
    pub received: u64,
    /// Updates that changed the table
    pub merged: u64,
    /// Updates dropped (suppressed, or from a non-neighbour)
    pub dropped: u64,
    /// Updates dropped because they were taken at another topology epoch
    pub stale: u64,
    /// Updates sent
    pub sent: u64,
}

/// Merge a peer's table into `table`.
///
/// Adopts every strictly lower remote cell outside `self_id`'s row,
/// recomputes `self_id`'s shortest paths over the result and adopts any
/// strictly lower own-row distance. Returns whether anything changed.
///
/// If the solver finds a negative cycle the whole round is discarded and
/// `table` is left exactly as it was.
pub fn merge_incoming(
    table: &mut RoutingTable,
    self_id: NodeId,
    sender: NodeId,
    remote: &RoutingTable,
) -> Result<bool> {
    let mut next = table.clone();
    let mut changed = next.merge_min_except(remote, self_id);

    let paths = recompute(&next, self_id).map_err(|e| {
        error!(%sender, error = %e, "discarding merge round");
        e
    })?;

    for dest in NodeId::all() {
        changed |= next.lower(self_id, dest, paths.distance(dest));
    }

    if changed {
        debug!(%sender, cells = next.diff_count(table), "merged update");
        *table = next;
    }
    Ok(changed)
}

/// Full-table updates for every neighbour, stamped with `epoch`.
pub fn announce(
    self_id: NodeId,
    epoch: u64,
    table: &RoutingTable,
    neighbors: &NeighborSet,
) -> Vec<Envelope> {
    neighbors
        .iter()
        .map(|n| Envelope::new(n, Message::update(self_id, epoch, table.clone())))
        .collect()
}
