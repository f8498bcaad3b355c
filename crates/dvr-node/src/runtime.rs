//! Event loop binding one [`Router`] to one datagram endpoint.

use std::future::Future;
use std::net::SocketAddr;

use dvr_protocols::{BroadcastReport, Envelope, Message, Router, RouterStats, MAX_DATAGRAM};
use dvr_routing::RoutingTable;
use dvr_topology::{Addressing, ConfigFile, Link, NodeId, TopologySource};
use dvr_transfer::{Transport, TransportConfig, UdpTransport};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result};

/// Consecutive settled ticks before a node running until convergence stops.
///
/// The node keeps heartbeating meanwhile, so neighbours that are still
/// catching up get its final table.
pub const SETTLE_TICKS: u32 = 3;

/// Externally visible node state, published after every event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStatus {
    /// Routing table settled
    pub converged: bool,
    /// No link failure broadcast in flight
    pub idle: bool,
    /// Topology reloads since startup
    pub reloads: u64,
}

/// What a node looked like when it stopped.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The node
    pub id: NodeId,
    /// Final routing table
    pub table: RoutingTable,
    /// Whether the table was settled at shutdown
    pub converged: bool,
    /// Protocol counters
    pub stats: RouterStats,
    /// Links severed during the run
    pub severed: Vec<Link>,
    /// Broadcast outcomes
    pub reports: Vec<BroadcastReport>,
    /// Datagrams received
    pub datagrams_in: u64,
    /// Datagrams sent
    pub datagrams_out: u64,
    /// Datagrams that failed to decode
    pub decode_errors: u64,
    /// Datagrams whose claimed sender does not own the source address
    pub rejected: u64,
    /// Sends the transport refused
    pub send_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    datagrams_in: u64,
    datagrams_out: u64,
    decode_errors: u64,
    rejected: u64,
    send_errors: u64,
}

/// A running node.
pub struct NodeRuntime<T> {
    config: NodeConfig,
    addressing: Addressing,
    router: Router,
    transport: T,
    pending_cut: Option<NodeId>,
    reports: Vec<BroadcastReport>,
    counters: Counters,
    status: watch::Sender<NodeStatus>,
}

impl NodeRuntime<UdpTransport> {
    /// Load the topology file and bind the node's UDP port.
    pub async fn bind(config: NodeConfig) -> Result<Self> {
        let source = ConfigFile::new(&config.config_path);
        let transport = UdpTransport::bind(TransportConfig::new(config.bind_addr()))
            .await
            .map_err(Error::Transport)?;
        Self::new(config, source, transport)
    }
}

impl<T: Transport> NodeRuntime<T> {
    /// Assemble a node from its parts.
    pub fn new(
        config: NodeConfig,
        source: impl TopologySource + 'static,
        transport: T,
    ) -> Result<Self> {
        config.validate()?;
        let addressing = config.addressing()?;
        let router = Router::new(config.id, source, config.router)?;
        let (status, _) = watch::channel(NodeStatus::default());

        Ok(Self {
            pending_cut: config.cut,
            config,
            addressing,
            router,
            transport,
            reports: Vec::new(),
            counters: Counters::default(),
            status,
        })
    }

    /// The routing engine.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Watch the node's status while it runs.
    pub fn subscribe(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    /// Run until `shutdown` resolves, or until the table has settled when
    /// [`NodeConfig::until_converged`] is set.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<RunSummary> {
        let local = self.transport.local_addr().map_err(Error::Transport)?;
        info!(
            node = %self.config.id,
            %local,
            neighbors = self.router.neighbors().len(),
            timeout_ms = self.config.timeout.as_millis() as u64,
            "node starting"
        );

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut ticker = tokio::time::interval(self.config.timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let outbound = self.router.start();
        self.send_all(outbound).await;
        self.publish();

        tokio::pin!(shutdown);
        let mut settled_ticks = 0;
        loop {
            let mut ticked = false;
            tokio::select! {
                _ = &mut shutdown => {
                    info!(node = %self.config.id, "shutdown requested");
                    break;
                }
                received = self.transport.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.on_datagram(&buf[..len], from).await,
                    Err(e) => warn!(error = %e, "receive failed"),
                },
                _ = ticker.tick() => {
                    let outbound = self.router.on_tick();
                    self.send_all(outbound).await;
                    ticked = true;
                }
            }

            self.maybe_cut().await;
            self.publish();

            if ticked && self.config.until_converged {
                settled_ticks = if self.is_settled() { settled_ticks + 1 } else { 0 };
                if settled_ticks >= SETTLE_TICKS {
                    info!(node = %self.config.id, "table settled, stopping");
                    break;
                }
            }
        }

        Ok(self.finish())
    }

    /// Converged, no broadcast in flight, and no cut left to perform.
    fn is_settled(&self) -> bool {
        self.router.is_converged() && self.router.broadcast().is_idle() && self.pending_cut.is_none()
    }

    async fn on_datagram(&mut self, bytes: &[u8], from: SocketAddr) {
        self.counters.datagrams_in += 1;
        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                self.counters.decode_errors += 1;
                debug!(%from, error = %e, "dropping undecodable datagram");
                return;
            }
        };
        if self.addressing.node_at(from) != Some(message.sender) {
            self.counters.rejected += 1;
            debug!(%from, sender = %message.sender, "sender does not match source address, dropping");
            return;
        }
        trace!(%from, sender = %message.sender, kind = message.kind(), "received");

        let outbound = self.router.handle(message);
        self.send_all(outbound).await;
    }

    /// Perform the scheduled cut once the table has settled.
    async fn maybe_cut(&mut self) {
        if !self.router.is_converged() {
            return;
        }
        let Some(peer) = self.pending_cut.take() else {
            return;
        };

        match self.router.cut_link(peer) {
            Ok(outbound) => self.send_all(outbound).await,
            Err(e) => error!(node = %self.config.id, %peer, error = %e, "scheduled cut failed"),
        }
    }

    /// Fire-and-forget; a failed send is a dropped packet.
    async fn send_all(&mut self, outbound: Vec<Envelope>) {
        for envelope in outbound {
            let bytes = match envelope.message.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(to = %envelope.to, error = %e, "failed to encode message");
                    continue;
                }
            };
            let addr = self.addressing.addr_of(envelope.to);
            match self.transport.send_to(addr, &bytes).await {
                Ok(()) => {
                    self.counters.datagrams_out += 1;
                    trace!(to = %envelope.to, kind = envelope.message.kind(), "sent");
                }
                Err(e) => {
                    self.counters.send_errors += 1;
                    warn!(to = %envelope.to, %addr, error = %e, "send failed");
                }
            }
        }
        self.reports.extend(self.router.take_reports());
    }

    fn publish(&self) {
        let now = NodeStatus {
            converged: self.router.is_converged(),
            idle: self.router.broadcast().is_idle(),
            reloads: self.router.stats().reloads,
        };
        self.status.send_if_modified(|status| {
            if *status == now {
                return false;
            }
            *status = now;
            true
        });
    }

    fn finish(mut self) -> RunSummary {
        self.reports.extend(self.router.take_reports());
        let summary = RunSummary {
            id: self.config.id,
            table: self.router.table().clone(),
            converged: self.router.is_converged(),
            stats: self.router.stats(),
            severed: self.router.severed().collect(),
            reports: self.reports,
            datagrams_in: self.counters.datagrams_in,
            datagrams_out: self.counters.datagrams_out,
            decode_errors: self.counters.decode_errors,
            rejected: self.counters.rejected,
            send_errors: self.counters.send_errors,
        };
        info!(
            node = %summary.id,
            converged = summary.converged,
            datagrams_in = summary.datagrams_in,
            datagrams_out = summary.datagrams_out,
            "node stopped\n{}",
            summary.table
        );
        summary
    }
}
