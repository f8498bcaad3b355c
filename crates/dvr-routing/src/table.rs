//! Routing table and neighbour set.

use std::collections::BTreeSet;
use std::fmt;

use dvr_topology::{Cost, Links, NodeId, INFINITY, NODE_COUNT};

/// Full `N×N` cost matrix, indexed `(source, destination)`.
///
/// The diagonal is pinned to zero: writes to `(x, x)` are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RoutingTable {
    cells: [[Cost; NODE_COUNT]; NODE_COUNT],
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    /// Table with nothing learned: zero diagonal, INFINITY elsewhere.
    pub fn new() -> Self {
        let mut cells = [[INFINITY; NODE_COUNT]; NODE_COUNT];
        for (i, row) in cells.iter_mut().enumerate() {
            row[i] = 0;
        }
        Self { cells }
    }

    /// Fresh table seeded with `owner`'s direct links.
    pub fn from_links(owner: NodeId, links: &Links) -> Self {
        let mut table = Self::new();
        for (neighbor, cost) in links.iter() {
            table.set(owner, neighbor, cost);
        }
        table
    }

    /// Cost from `src` to `dst`.
    pub fn get(&self, src: NodeId, dst: NodeId) -> Cost {
        self.cells[src.index()][dst.index()]
    }

    /// Overwrite a cell. Ignored on the diagonal.
    ///
    /// This bypasses monotonicity and is meant for construction; protocol
    /// code goes through [`RoutingTable::lower`] or [`RoutingTable::merge_min_except`].
    pub fn set(&mut self, src: NodeId, dst: NodeId, cost: Cost) {
        if src != dst {
            self.cells[src.index()][dst.index()] = cost;
        }
    }

    /// Adopt `cost` if it is strictly lower than the current cell.
    pub fn lower(&mut self, src: NodeId, dst: NodeId, cost: Cost) -> bool {
        if src == dst || cost >= self.get(src, dst) {
            return false;
        }
        self.cells[src.index()][dst.index()] = cost;
        true
    }

    /// Cell-wise minimum with another table, leaving `owner`'s row alone.
    /// Returns whether anything changed.
    pub fn merge_min_except(&mut self, other: &RoutingTable, owner: NodeId) -> bool {
        let mut changed = false;
        for src in NodeId::all().filter(|&src| src != owner) {
            for dst in NodeId::all() {
                changed |= self.lower(src, dst, other.get(src, dst));
            }
        }
        changed
    }

    /// Finite off-diagonal cells as directed edges `(u, v, w)`.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, Cost)> + '_ {
        NodeId::all().flat_map(move |u| {
            NodeId::all()
                .filter(move |&v| v != u)
                .map(move |v| (u, v, self.get(u, v)))
                .filter(|&(_, _, w)| w < INFINITY)
        })
    }

    /// Number of cells that differ from `other`.
    pub fn diff_count(&self, other: &RoutingTable) -> usize {
        self.cells
            .iter()
            .flatten()
            .zip(other.cells.iter().flatten())
            .filter(|(a, b)| a != b)
            .count()
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " ")?;
        for dst in NodeId::all() {
            write!(f, " {:>4}", dst.as_char())?;
        }
        for src in NodeId::all() {
            writeln!(f)?;
            write!(f, "{}", src)?;
            for dst in NodeId::all() {
                match self.get(src, dst) {
                    cost if cost >= INFINITY => write!(f, " {:>4}", "inf")?,
                    cost => write!(f, " {:>4}", cost)?,
                }
            }
        }
        Ok(())
    }
}

/// Nodes directly reachable from the local node.
///
/// Only changes through a topology reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeighborSet(BTreeSet<NodeId>);

impl NeighborSet {
    /// Neighbours declared by `links`.
    pub fn from_links(links: &Links) -> Self {
        Self(links.neighbors().collect())
    }

    /// Whether `id` is a neighbour.
    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    /// Iterate neighbours in node order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }

    /// Number of neighbours.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the node is isolated.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<NodeId> for NeighborSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(c: char) -> NodeId {
        NodeId::from_char(c).unwrap()
    }

    #[test]
    fn new_table_has_zero_diagonal() {
        let table = RoutingTable::new();
        for x in NodeId::all() {
            for y in NodeId::all() {
                let expected = if x == y { 0 } else { INFINITY };
                assert_eq!(table.get(x, y), expected);
            }
        }
    }

    #[test]
    fn diagonal_writes_are_ignored() {
        let mut table = RoutingTable::new();
        table.set(id('A'), id('A'), 5);
        assert!(!table.lower(id('B'), id('B'), -3));
        assert_eq!(table.get(id('A'), id('A')), 0);
        assert_eq!(table.get(id('B'), id('B')), 0);
    }

    #[test]
    fn from_links_fills_owner_row_only() {
        let links = Links::new().with(id('B'), 2).with(id('D'), 7);
        let table = RoutingTable::from_links(id('A'), &links);
        assert_eq!(table.get(id('A'), id('B')), 2);
        assert_eq!(table.get(id('A'), id('D')), 7);
        assert_eq!(table.get(id('A'), id('C')), INFINITY);
        assert_eq!(table.get(id('B'), id('A')), INFINITY);
        assert_eq!(table.edges().count(), 2);
    }

    #[test]
    fn lower_only_accepts_strict_decrease() {
        let mut table = RoutingTable::new();
        assert!(table.lower(id('A'), id('B'), 4));
        assert!(!table.lower(id('A'), id('B'), 4));
        assert!(!table.lower(id('A'), id('B'), 6));
        assert!(table.lower(id('A'), id('B'), 3));
        assert_eq!(table.get(id('A'), id('B')), 3);
    }

    #[test]
    fn merge_takes_minimum() {
        let mut local = RoutingTable::new();
        local.set(id('A'), id('B'), 5);
        let mut remote = RoutingTable::new();
        remote.set(id('A'), id('B'), 9);
        remote.set(id('C'), id('D'), 1);
        remote.set(id('F'), id('A'), 1);

        assert!(local.merge_min_except(&remote, id('F')));
        assert_eq!(local.get(id('A'), id('B')), 5);
        assert_eq!(local.get(id('C'), id('D')), 1);
        assert_eq!(local.get(id('F'), id('A')), INFINITY);
        assert!(!local.merge_min_except(&remote, id('F')));
    }

    #[test]
    fn display_marks_unreachable() {
        let table = RoutingTable::new();
        let text = table.to_string();
        assert!(text.contains("inf"));
        assert_eq!(text.lines().count(), NODE_COUNT + 1);
    }

    #[test]
    fn neighbor_set_follows_links() {
        let links = Links::new().with(id('C'), 1).with(id('B'), 1);
        let neighbors = NeighborSet::from_links(&links);
        assert_eq!(neighbors.iter().collect::<Vec<_>>(), vec![id('B'), id('C')]);
        assert!(!neighbors.contains(id('A')));
    }

    fn arb_table() -> impl Strategy<Value = RoutingTable> {
        proptest::collection::vec(0..=INFINITY, NODE_COUNT * NODE_COUNT).prop_map(|costs| {
            let mut table = RoutingTable::new();
            for (i, cost) in costs.into_iter().enumerate() {
                let src = NodeId::ALL[i / NODE_COUNT];
                let dst = NodeId::ALL[i % NODE_COUNT];
                table.set(src, dst, cost);
            }
            table
        })
    }

    proptest! {
        #[test]
        fn merge_never_raises_a_cell(mut local in arb_table(), updates in proptest::collection::vec(arb_table(), 1..8)) {
            for remote in &updates {
                let before = local.clone();
                local.merge_min_except(remote, NodeId::ALL[0]);
                for src in NodeId::all() {
                    for dst in NodeId::all() {
                        prop_assert!(local.get(src, dst) <= before.get(src, dst));
                    }
                }
            }
        }

        #[test]
        fn merge_is_idempotent(mut local in arb_table(), remote in arb_table()) {
            local.merge_min_except(&remote, NodeId::ALL[0]);
            let settled = local.clone();
            prop_assert!(!local.merge_min_except(&remote, NodeId::ALL[0]));
            prop_assert_eq!(local, settled);
        }
    }
}
