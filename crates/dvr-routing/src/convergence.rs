//! Convergence detection.
//!
//! # Symmetry Proxy
//!
//! Links are undirected, so at the true fixed point every node agrees that
//! `cost(a, b) == cost(b, a)` and every participant can reach every other.
//! The predicate checks exactly that and nothing more. A pathological weight
//! assignment could satisfy symmetry before the last improvement arrives, so
//! this is a termination heuristic, not a proof of optimality.
//!
//! # Participants
//!
//! The alphabet is fixed but a topology may use only part of it. Nodes with
//! no finite entry in their row or column are not participants and are left
//! out of the check.

use dvr_topology::{NodeId, INFINITY};
use tracing::info;

use crate::RoutingTable;

/// Whether `table` looks converged.
///
/// True iff there are at least two participants and, for every unordered
/// pair of participants `(a, b)`, `table[a][b] == table[b][a]` and neither
/// is INFINITY.
pub fn is_converged(table: &RoutingTable) -> bool {
    let participants: Vec<NodeId> = NodeId::all().filter(|&n| participates(table, n)).collect();
    if participants.len() < 2 {
        return false;
    }

    participants.iter().enumerate().all(|(i, &a)| {
        participants[i + 1..].iter().all(|&b| {
            let ab = table.get(a, b);
            ab < INFINITY && ab == table.get(b, a)
        })
    })
}

fn participates(table: &RoutingTable, node: NodeId) -> bool {
    NodeId::all()
        .filter(|&other| other != node)
        .any(|other| table.get(node, other) < INFINITY || table.get(other, node) < INFINITY)
}

/// Change in convergence status since the previous check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Just became converged.
    Converged,
    /// Was converged, no longer is.
    Diverged,
    /// Same as before.
    Unchanged,
}

/// Gated convergence tracking for one node.
///
/// The symmetry predicate alone would happily accept a freshly loaded table
/// that was symmetric by accident, or stale state left over from before a
/// topology change. The monitor only reports convergence once at least one
/// update has been merged since the last reset, and only while the caller
/// says no topology change is in flight.
#[derive(Debug, Default)]
pub struct ConvergenceMonitor {
    updates_since_reset: u64,
    converged: bool,
}

impl ConvergenceMonitor {
    /// Create a monitor that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a merge that changed the table.
    pub fn record_update(&mut self) {
        self.updates_since_reset += 1;
    }

    /// Forget progress after a topology reload.
    pub fn reset(&mut self) {
        self.updates_since_reset = 0;
    }

    /// Changing merges since the last reset.
    pub fn updates_since_reset(&self) -> u64 {
        self.updates_since_reset
    }

    /// Result of the last [`ConvergenceMonitor::check`].
    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Re-evaluate against `table`.
    ///
    /// `quiescent` must be false while a topology change is still being
    /// announced.
    pub fn check(&mut self, table: &RoutingTable, quiescent: bool) -> Transition {
        let now = quiescent && self.updates_since_reset > 0 && is_converged(table);
        let transition = match (self.converged, now) {
            (false, true) => {
                info!(updates = self.updates_since_reset, "routing table converged");
                Transition::Converged
            }
            (true, false) => {
                info!("routing table no longer converged");
                Transition::Diverged
            }
            _ => Transition::Unchanged,
        };
        self.converged = now;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvr_topology::Cost;

    fn id(c: char) -> NodeId {
        NodeId::from_char(c).unwrap()
    }

    fn table(cells: &[(char, char, Cost)]) -> RoutingTable {
        let mut table = RoutingTable::new();
        for &(a, b, w) in cells {
            table.set(id(a), id(b), w);
        }
        table
    }

    fn full_ring() -> RoutingTable {
        let mut cells = Vec::new();
        for (a, b, w) in [
            ('A', 'B', 1), ('A', 'C', 2), ('A', 'D', 1),
            ('B', 'C', 1), ('B', 'D', 2), ('C', 'D', 1),
        ] {
            cells.push((a, b, w));
            cells.push((b, a, w));
        }
        table(&cells)
    }

    #[test]
    fn symmetric_finite_table_is_converged() {
        assert!(is_converged(&full_ring()));
    }

    #[test]
    fn asymmetry_blocks_convergence() {
        let mut t = full_ring();
        t.set(id('C'), id('A'), 3);
        assert!(!is_converged(&t));
    }

    #[test]
    fn unreachable_participant_blocks_convergence() {
        let t = table(&[('A', 'B', 1), ('B', 'A', 1), ('B', 'C', 1)]);
        assert!(!is_converged(&t));
    }

    #[test]
    fn lone_node_is_never_converged() {
        assert!(!is_converged(&RoutingTable::new()));
    }

    #[test]
    fn monitor_waits_for_an_update() {
        let mut monitor = ConvergenceMonitor::new();
        let t = full_ring();
        assert_eq!(monitor.check(&t, true), Transition::Unchanged);
        assert!(!monitor.is_converged());

        monitor.record_update();
        assert_eq!(monitor.check(&t, true), Transition::Converged);
        assert_eq!(monitor.check(&t, true), Transition::Unchanged);
        assert!(monitor.is_converged());
    }

    #[test]
    fn monitor_respects_quiescence_and_reset() {
        let mut monitor = ConvergenceMonitor::new();
        let t = full_ring();
        monitor.record_update();
        assert_eq!(monitor.check(&t, false), Transition::Unchanged);
        assert_eq!(monitor.check(&t, true), Transition::Converged);
        assert_eq!(monitor.check(&t, false), Transition::Diverged);

        monitor.reset();
        assert_eq!(monitor.updates_since_reset(), 0);
        assert_eq!(monitor.check(&t, true), Transition::Unchanged);
        assert!(!monitor.is_converged());
    }
}
