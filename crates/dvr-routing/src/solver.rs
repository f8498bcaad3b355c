//! Bellman-Ford shortest paths over the routing matrix.
//!
//! The matrix is treated as a directed graph: every finite off-diagonal cell
//! `(u, v)` is an edge of weight `table[u][v]`. After `N - 1` relaxation
//! passes one extra pass checks that nothing can still relax; if something
//! can, a negative-cost cycle is reachable and the result is rejected.

use dvr_topology::{Cost, NodeId, INFINITY, NODE_COUNT};
use tracing::trace;

use crate::{Error, Result, RoutingTable};

/// Distances and predecessors from one source node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortestPaths {
    origin: NodeId,
    distances: [Cost; NODE_COUNT],
    predecessors: [Option<NodeId>; NODE_COUNT],
}

impl ShortestPaths {
    /// Node the paths start from.
    pub fn origin(&self) -> NodeId {
        self.origin
    }

    /// Best known cost to `dest` (INFINITY if unreachable).
    pub fn distance(&self, dest: NodeId) -> Cost {
        self.distances[dest.index()]
    }

    /// All distances in node order.
    pub fn distances(&self) -> &[Cost; NODE_COUNT] {
        &self.distances
    }

    /// Node preceding `dest` on its best path.
    pub fn predecessor(&self, dest: NodeId) -> Option<NodeId> {
        self.predecessors[dest.index()]
    }

    /// Full path `origin, ..., dest`, or `None` if unreachable.
    pub fn path(&self, dest: NodeId) -> Option<Vec<NodeId>> {
        if dest == self.origin {
            return Some(vec![dest]);
        }
        if self.distance(dest) >= INFINITY {
            return None;
        }

        let mut path = vec![dest];
        let mut current = dest;
        // A simple path visits each node at most once
        for _ in 0..NODE_COUNT {
            current = self.predecessor(current)?;
            path.push(current);
            if current == self.origin {
                path.reverse();
                return Some(path);
            }
        }
        None
    }

    /// First hop out of `origin` towards `dest`.
    pub fn next_hop(&self, dest: NodeId) -> Option<NodeId> {
        if dest == self.origin {
            return None;
        }
        self.path(dest).and_then(|path| path.get(1).copied())
    }
}

/// Recompute `origin`'s shortest paths over the whole matrix.
///
/// Does not touch the table; the caller decides which improvements to adopt.
pub fn recompute(table: &RoutingTable, origin: NodeId) -> Result<ShortestPaths> {
    let mut distances = [INFINITY; NODE_COUNT];
    let mut predecessors = [None; NODE_COUNT];
    distances[origin.index()] = 0;

    for pass in 0..NODE_COUNT - 1 {
        let mut relaxed = false;
        for (u, v, w) in table.edges() {
            if let Some(candidate) = extend(distances[u.index()], w) {
                if candidate < distances[v.index()] {
                    distances[v.index()] = candidate;
                    predecessors[v.index()] = Some(u);
                    relaxed = true;
                }
            }
        }
        if !relaxed {
            trace!(%origin, passes = pass + 1, "relaxation settled early");
            break;
        }
    }

    for (u, v, w) in table.edges() {
        if let Some(candidate) = extend(distances[u.index()], w) {
            if candidate < distances[v.index()] {
                return Err(Error::NegativeCycle { origin, from: u, to: v });
            }
        }
    }

    Ok(ShortestPaths {
        origin,
        distances,
        predecessors,
    })
}

/// Extend a path of cost `base` by an edge of weight `w`.
///
/// Unreachable bases never extend; sums are clamped to INFINITY.
fn extend(base: Cost, w: Cost) -> Option<Cost> {
    if base >= INFINITY {
        return None;
    }
    Some(base.saturating_add(w).min(INFINITY))
}
