//! DVR Protocols - Table Gossip and Reliable Link-Failure Broadcast
//!
//! The protocol layer of a node. Everything here is sans-IO: handlers take
//! decoded messages and return [`Envelope`]s for the caller to send.
//!
//! # Overview
//!
//! ## Gossip
//!
//! Nodes exchange full routing tables with their neighbours. Merging takes
//! the cell-wise minimum and re-runs the local path solver, so:
//!
//! - **Monotone**: costs only go down between topology resets
//! - **Idempotent**: duplicated or reordered updates are harmless
//! - **Self-limiting**: an update that changes nothing triggers nothing
//!
//! Updates are stamped with the sender's topology epoch and only merged
//! within the same epoch, so a snapshot that was in flight across a reset
//! cannot bring a severed link back.
//!
//! ## Link-Failure Broadcast
//!
//! A severed link makes routes worse, which gossip cannot express. The
//! [`broadcast`] module floods a `link_broken` event with per-neighbour acks
//! and retransmission so every node resets its topology exactly once per
//! event.
//!
//! ## Router
//!
//! [`Router`] combines both with convergence tracking for one node.
//!
//! # Example
//!
//! ```rust,ignore
//! use dvr_protocols::{Router, RouterConfig};
//! use dvr_topology::{NodeId, StaticTopology};
//!
//! let a = NodeId::from_char('A').unwrap();
//! let b = NodeId::from_char('B').unwrap();
//! let topology = StaticTopology::new().link(a, b, 1);
//!
//! let mut alice = Router::new(a, topology.clone(), RouterConfig::default())?;
//! let mut bob = Router::new(b, topology, RouterConfig::default())?;
//!
//! let mut queue: Vec<_> = alice.start().into_iter().chain(bob.start()).collect();
//! while let Some(envelope) = queue.pop() {
//!     let target = if envelope.to == a { &mut alice } else { &mut bob };
//!     queue.extend(target.handle(envelope.message));
//! }
//! assert!(alice.is_converged() && bob.is_converged());
//! ```

pub mod broadcast;
pub mod error;
pub mod gossip;
pub mod message;
pub mod router;

pub use broadcast::{BroadcastConfig, BroadcastReport, BroadcastStats, EventStatus, ReliableBroadcast};
pub use error::{Error, Result};
pub use gossip::GossipStats;
pub use message::{Envelope, Message, Payload, MAX_DATAGRAM};
pub use router::{Router, RouterConfig, RouterStats};
