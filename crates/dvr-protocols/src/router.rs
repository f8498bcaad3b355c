//! Per-node routing engine.
//!
//! [`Router`] owns all state of one node and ties gossip, the reliable
//! broadcast and convergence tracking together. It never touches the network:
//! every handler returns the envelopes to send, and the caller decides how
//! (UDP socket, in-memory channel, or a test's own queue).

use std::collections::BTreeSet;
use std::fmt;

use dvr_routing::{recompute, ConvergenceMonitor, NeighborSet, RoutingTable, ShortestPaths};
use dvr_topology::{Link, Links, NodeId, TopologySource};
use tracing::{debug, error, info, trace, warn};

use crate::broadcast::{BroadcastConfig, BroadcastReport, BroadcastStats, ReliableBroadcast, Step};
use crate::error::{Error, Result};
use crate::gossip::{self, GossipStats};
use crate::message::{Envelope, Message, Payload};

/// Router configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouterConfig {
    /// Reliable broadcast settings
    pub broadcast: BroadcastConfig,
}

impl RouterConfig {
    /// Set the originator's attempt budget for link failure broadcasts.
    #[must_use]
    pub fn with_origin_attempts(mut self, attempts: u32) -> Self {
        self.broadcast = self.broadcast.with_origin_attempts(attempts);
        self
    }
}

/// Counters for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Gossip counters
    pub gossip: GossipStats,
    /// Broadcast counters
    pub broadcast: BroadcastStats,
    /// Topology reloads after startup
    pub reloads: u64,
}

/// Routing engine for one node.
pub struct Router {
    id: NodeId,
    source: Box<dyn TopologySource>,
    /// Links from the last successful load, before severed links are applied.
    base_links: Links,
    links: Links,
    table: RoutingTable,
    neighbors: NeighborSet,
    severed: BTreeSet<Link>,
    broadcast: ReliableBroadcast,
    monitor: ConvergenceMonitor,
    gossip: GossipStats,
    reloads: u64,
    reports: Vec<BroadcastReport>,
    inbound_since_tick: bool,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .field("links", &self.links)
            .field("severed", &self.severed)
            .field("converged", &self.monitor.is_converged())
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Load the topology for `id` and seed the table from it.
    ///
    /// Fails only if the initial load fails; later reload failures keep the
    /// previous links.
    pub fn new(
        id: NodeId,
        source: impl TopologySource + 'static,
        config: RouterConfig,
    ) -> Result<Self> {
        let base_links = source.load(id)?;
        info!(node = %id, neighbors = base_links.len(), "loaded topology");

        let mut router = Self {
            id,
            source: Box::new(source),
            links: Links::new(),
            base_links,
            table: RoutingTable::new(),
            neighbors: NeighborSet::default(),
            severed: BTreeSet::new(),
            broadcast: ReliableBroadcast::new(id, config.broadcast),
            monitor: ConvergenceMonitor::new(),
            gossip: GossipStats::default(),
            reloads: 0,
            reports: Vec::new(),
            inbound_since_tick: false,
        };
        router.rebuild();
        Ok(router)
    }

    /// This node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Current routing table.
    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Current neighbours.
    pub fn neighbors(&self) -> &NeighborSet {
        &self.neighbors
    }

    /// Current direct links, severed ones removed.
    pub fn links(&self) -> &Links {
        &self.links
    }

    /// Severed links this node has acted on.
    pub fn severed(&self) -> impl Iterator<Item = Link> + '_ {
        self.severed.iter().copied()
    }

    /// Topology epoch: the number of link failures this node has applied.
    ///
    /// Only reloads advance it, and every reload starts a fresh table, so a
    /// table stamped with the current epoch never holds costs from an older
    /// graph.
    pub fn epoch(&self) -> u64 {
        self.severed.len() as u64
    }

    /// Broadcast state, for inspection.
    pub fn broadcast(&self) -> &ReliableBroadcast {
        &self.broadcast
    }

    /// Whether the table is settled.
    pub fn is_converged(&self) -> bool {
        self.monitor.is_converged()
    }

    /// Shortest paths from this node over the current table.
    pub fn paths(&self) -> Result<ShortestPaths> {
        Ok(recompute(&self.table, self.id)?)
    }

    /// Counters.
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            gossip: self.gossip,
            broadcast: self.broadcast.stats(),
            reloads: self.reloads,
        }
    }

    /// Broadcast outcomes since the last call.
    pub fn take_reports(&mut self) -> Vec<BroadcastReport> {
        std::mem::take(&mut self.reports)
    }

    /// Initial announcement to every neighbour.
    pub fn start(&mut self) -> Vec<Envelope> {
        self.announce()
    }

    /// Process one inbound message.
    pub fn handle(&mut self, message: Message) -> Vec<Envelope> {
        let sender = message.sender;
        if sender == self.id {
            trace!(kind = message.kind(), "ignoring message from self");
            return Vec::new();
        }
        self.inbound_since_tick = true;

        let outbound = match message.body {
            Payload::Update { epoch, table } => self.on_update(sender, epoch, &table),
            Payload::LinkBroken { link } => {
                let step = self.broadcast.receive(sender, link);
                self.drive(step)
            }
            Payload::Ack { link } => {
                let step = self.broadcast.acknowledge(sender, link);
                self.drive(step)
            }
        };

        self.monitor.check(&self.table, self.broadcast.is_idle());
        outbound
    }

    /// Periodic work when the receive window elapses.
    ///
    /// A pending broadcast is retransmitted; otherwise, if nothing arrived
    /// since the previous tick, the table is re-sent as a heartbeat.
    pub fn on_tick(&mut self) -> Vec<Envelope> {
        let quiet = !std::mem::replace(&mut self.inbound_since_tick, false);

        let outbound = if !self.broadcast.is_idle() {
            let step = self.broadcast.on_tick();
            self.drive(step)
        } else if quiet {
            trace!(node = %self.id, "heartbeat");
            self.announce()
        } else {
            Vec::new()
        };

        self.monitor.check(&self.table, self.broadcast.is_idle());
        outbound
    }

    /// Sever the link to `peer` and start announcing it.
    pub fn cut_link(&mut self, peer: NodeId) -> Result<Vec<Envelope>> {
        if !self.neighbors.contains(peer) {
            return Err(Error::NotNeighbor(peer));
        }

        let link = Link::new(self.id, peer);
        let targets: Vec<NodeId> = self.neighbors.iter().collect();
        warn!(%link, "cutting link");

        self.severed.insert(link);
        self.reload();
        let step = self.broadcast.originate(link, targets);
        let outbound = self.drive(step);

        self.monitor.check(&self.table, self.broadcast.is_idle());
        Ok(outbound)
    }

    fn on_update(&mut self, sender: NodeId, epoch: u64, remote: &RoutingTable) -> Vec<Envelope> {
        self.gossip.received += 1;

        if !self.broadcast.is_idle() {
            debug!(%sender, "topology change in flight, dropping update");
            self.gossip.dropped += 1;
            return Vec::new();
        }
        if !self.neighbors.contains(sender) {
            debug!(%sender, "update from non-neighbour, dropping");
            self.gossip.dropped += 1;
            return Vec::new();
        }
        // Older: taken before a reset this node has applied. Newer: the
        // sender knows a failure that has not reached us yet; our own reload
        // would discard it, and the sender re-announces once we catch up.
        if epoch != self.epoch() {
            debug!(%sender, epoch, local = self.epoch(), "update from another topology epoch, dropping");
            self.gossip.stale += 1;
            return Vec::new();
        }

        match gossip::merge_incoming(&mut self.table, self.id, sender, remote) {
            Ok(true) => {
                self.gossip.merged += 1;
                self.monitor.record_update();
                info!(node = %self.id, %sender, "routing table changed");
                debug!(node = %self.id, "\n{}", self.table);
                self.announce()
            }
            Ok(false) => Vec::new(),
            Err(e) => {
                warn!(%sender, error = %e, "rejected update");
                Vec::new()
            }
        }
    }

    /// Apply a broadcast step, launching whatever heads become ready.
    ///
    /// Relayed heads trigger a reload before they are flooded. Once the
    /// broadcast goes idle after retiring an event the fresh table is
    /// announced, since gossip was suppressed in the meantime.
    fn drive(&mut self, step: Step) -> Vec<Envelope> {
        let mut outbound = step.outbound;
        let mut retired = self.record(step.reports);

        while let Some((link, originated)) = self.broadcast.needs_launch() {
            if !originated {
                self.severed.insert(link);
                self.reload();
            }
            let step = self.broadcast.launch(&self.neighbors);
            outbound.extend(step.outbound);
            retired |= self.record(step.reports);
        }

        if retired && self.broadcast.is_idle() {
            outbound.extend(self.announce());
        }
        outbound
    }

    fn record(&mut self, reports: Vec<BroadcastReport>) -> bool {
        let retired = !reports.is_empty();
        for report in &reports {
            if let BroadcastReport::DeliveryFailed { link, unacked } = report {
                warn!(%link, ?unacked, "topology change not confirmed by every neighbour");
            }
        }
        self.reports.extend(reports);
        retired
    }

    /// Re-read the topology and discard everything learned so far.
    fn reload(&mut self) {
        match self.source.load(self.id) {
            Ok(links) => self.base_links = links,
            Err(e) => error!(node = %self.id, error = %e, "topology reload failed, keeping previous links"),
        }
        self.rebuild();
        self.reloads += 1;
        info!(
            node = %self.id,
            neighbors = self.neighbors.len(),
            severed = self.severed.len(),
            "topology reloaded"
        );
    }

    fn rebuild(&mut self) {
        let mut links = self.base_links.clone();
        for link in &self.severed {
            if let Some(peer) = link.peer_of(self.id) {
                links.remove(peer);
            }
        }
        self.table = RoutingTable::from_links(self.id, &links);
        self.neighbors = NeighborSet::from_links(&links);
        self.links = links;
        self.monitor.reset();
    }

    fn announce(&mut self) -> Vec<Envelope> {
        let outbound = gossip::announce(self.id, self.epoch(), &self.table, &self.neighbors);
        self.gossip.sent += outbound.len() as u64;
        outbound
    }
}
