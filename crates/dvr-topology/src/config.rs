//! Topology config loading.
//!
//! ```text
//! A={B:1,D:1}
//! B={A:1,C:1}
//! ```
//!
//! Each node reads only the line naming itself. Malformed lines are reported
//! and skipped so that a partially broken file still yields a usable (if
//! incomplete) neighbourhood.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Cost, Error, NodeId, Result, MAX_LINK_COST};

/// Direct neighbours of one node and the cost of each link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links(BTreeMap<NodeId, Cost>);

impl Links {
    /// No neighbours.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a link.
    pub fn insert(&mut self, neighbor: NodeId, cost: Cost) -> Option<Cost> {
        self.0.insert(neighbor, cost)
    }

    /// Builder form of [`Links::insert`].
    #[must_use]
    pub fn with(mut self, neighbor: NodeId, cost: Cost) -> Self {
        self.insert(neighbor, cost);
        self
    }

    /// Drop the link to `neighbor`.
    pub fn remove(&mut self, neighbor: NodeId) -> Option<Cost> {
        self.0.remove(&neighbor)
    }

    /// Cost of the link to `neighbor`, if connected.
    pub fn cost(&self, neighbor: NodeId) -> Option<Cost> {
        self.0.get(&neighbor).copied()
    }

    /// Whether `neighbor` is directly connected.
    pub fn contains(&self, neighbor: NodeId) -> bool {
        self.0.contains_key(&neighbor)
    }

    /// Iterate `(neighbor, cost)` in node order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Cost)> + '_ {
        self.0.iter().map(|(&n, &c)| (n, c))
    }

    /// Iterate neighbours in node order.
    pub fn neighbors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.keys().copied()
    }

    /// Number of links.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no links.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(NodeId, Cost)> for Links {
    fn from_iter<I: IntoIterator<Item = (NodeId, Cost)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Something that can (re)produce a node's neighbourhood.
///
/// Called once at startup and again on every topology reset, so file-backed
/// sources must re-read rather than cache.
pub trait TopologySource: Send + Sync {
    /// Load the links of `id`.
    fn load(&self, id: NodeId) -> Result<Links>;
}

/// Topology backed by a config file on disk.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    /// Use the config file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the config file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TopologySource for ConfigFile {
    fn load(&self, id: NodeId) -> Result<Links> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| Error::Unreadable {
            path: self.path.clone(),
            source,
        })?;
        Ok(parse_config(&text, id))
    }
}

/// Topology held in memory, for simulations and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    nodes: HashMap<NodeId, Links>,
}

impl StaticTopology {
    /// Empty topology (every node isolated).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an undirected link with the same cost both ways.
    #[must_use]
    pub fn link(mut self, a: NodeId, b: NodeId, cost: Cost) -> Self {
        self.nodes.entry(a).or_default().insert(b, cost);
        self.nodes.entry(b).or_default().insert(a, cost);
        self
    }

    /// Build from config text, loading every node's line.
    pub fn from_config(text: &str) -> Self {
        let nodes = NodeId::all()
            .map(|id| (id, parse_config(text, id)))
            .filter(|(_, links)| !links.is_empty())
            .collect();
        Self { nodes }
    }
}

impl TopologySource for StaticTopology {
    fn load(&self, id: NodeId) -> Result<Links> {
        Ok(self.nodes.get(&id).cloned().unwrap_or_default())
    }
}

/// Parse config text and return the links declared for `id`.
///
/// Every malformed line is reported with its 1-based line number, whichever
/// node it names, and skipped. Repeated lines for `id` are merged, later
/// entries overriding earlier ones.
pub fn parse_config(text: &str, id: NodeId) -> Links {
    let mut links = Links::new();

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Some((node, declared)) if node == id => {
                for (neighbor, cost) in declared.iter() {
                    debug!(%node, %neighbor, cost, "loaded link");
                    links.insert(neighbor, cost);
                }
            }
            Some(_) => {}
            None => warn!(line = i + 1, text = line, "topology line is incorrectly formatted, skipping"),
        }
    }

    links
}

/// Parse one `X={Y:c,...}` line. `None` if any part is malformed.
pub(crate) fn parse_line(line: &str) -> Option<(NodeId, Links)> {
    let (head, body) = line.split_once('=')?;
    let node: NodeId = head.parse().ok()?;
    let inner = body.trim().strip_prefix('{')?.strip_suffix('}')?;

    let mut links = Links::new();
    for item in inner.split(',') {
        let (neighbor, cost) = item.split_once(':')?;
        let neighbor: NodeId = neighbor.parse().ok()?;
        let cost = cost.trim();
        if neighbor == node || cost.is_empty() || !cost.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let cost: Cost = cost.parse().ok()?;
        if cost > MAX_LINK_COST || links.insert(neighbor, cost).is_some() {
            return None;
        }
    }

    Some((node, links))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NODE_COUNT;
    use proptest::prelude::*;
    use std::io::Write;

    fn id(c: char) -> NodeId {
        NodeId::from_char(c).unwrap()
    }

    const RING: &str = "\
A={B:1,D:1}
B={A:1,C:1}
C={B:1,D:1}
D={A:1,C:1}
";

    #[test]
    fn loads_only_own_line() {
        let links = parse_config(RING, id('B'));
        assert_eq!(links.len(), 2);
        assert_eq!(links.cost(id('A')), Some(1));
        assert_eq!(links.cost(id('C')), Some(1));
        assert!(!links.contains(id('D')));
    }

    #[test]
    fn node_without_line_is_isolated() {
        assert!(parse_config(RING, id('F')).is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "\
A={B:3}
A={C:x}
garbage
A={D:1,}
A=B:1
A={A:0}
A={E:5000}
A={C:2}
";
        let links = parse_config(text, id('A'));
        assert_eq!(links, Links::new().with(id('B'), 3).with(id('C'), 2));
    }

    #[test]
    fn line_parser_rejects_bad_shapes() {
        assert!(parse_line("A={B:1,C:22}").is_some());
        assert!(parse_line(" A = { B:1 } ").is_some());
        assert!(parse_line("G={B:1}").is_none());
        assert!(parse_line("A={}").is_none());
        assert!(parse_line("A={B:-1}").is_none());
        assert!(parse_line("A={B:1,B:2}").is_none());
        assert!(parse_line("AB={C:1}").is_none());
    }

    #[test]
    fn static_topology_is_symmetric() {
        let topo = StaticTopology::new().link(id('A'), id('B'), 4);
        assert_eq!(topo.load(id('A')).unwrap().cost(id('B')), Some(4));
        assert_eq!(topo.load(id('B')).unwrap().cost(id('A')), Some(4));
        assert!(topo.load(id('C')).unwrap().is_empty());
    }

    #[test]
    fn static_topology_from_config_text() {
        let topo = StaticTopology::from_config(RING);
        assert_eq!(topo.load(id('D')).unwrap().neighbors().collect::<Vec<_>>(), vec![id('A'), id('C')]);
    }

    #[test]
    fn config_file_rereads_on_every_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "A={{B:1}}").unwrap();
        let source = ConfigFile::new(file.path());
        assert_eq!(source.load(id('A')).unwrap().cost(id('B')), Some(1));

        writeln!(file, "A={{B:7}}").unwrap();
        assert_eq!(source.load(id('A')).unwrap().cost(id('B')), Some(7));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let source = ConfigFile::new("/nonexistent/dvr/topology.config");
        assert!(matches!(source.load(id('A')), Err(Error::Unreadable { .. })));
    }

    fn render(node: NodeId, links: &Links, spaced: bool) -> String {
        let sep = if spaced { ", " } else { "," };
        let body: Vec<String> = links.iter().map(|(n, c)| format!("{n}:{c}")).collect();
        format!("{node}={{{}}}", body.join(sep))
    }

    proptest! {
        #[test]
        fn rendered_lines_parse_back(
            owner in 0..NODE_COUNT,
            costs in proptest::collection::vec(proptest::option::of(0..=MAX_LINK_COST), NODE_COUNT),
            spaced in any::<bool>(),
        ) {
            let node = NodeId::ALL[owner];
            let links: Links = NodeId::all()
                .zip(costs)
                .filter(|&(n, _)| n != node)
                .filter_map(|(n, c)| c.map(|c| (n, c)))
                .collect();
            prop_assume!(!links.is_empty());

            let line = render(node, &links, spaced);
            prop_assert_eq!(parse_line(&line), Some((node, links.clone())));
            prop_assert_eq!(parse_config(&line, node), links);
        }

        #[test]
        fn cost_past_the_limit_rejects_the_line(owner in 0..NODE_COUNT, excess in (1 as Cost)..1000) {
            let node = NodeId::ALL[owner];
            let peer = NodeId::ALL[(owner + 1) % NODE_COUNT];
            let line = format!("{node}={{{peer}:{}}}", MAX_LINK_COST + excess);
            prop_assert!(parse_line(&line).is_none());
        }
    }
}
