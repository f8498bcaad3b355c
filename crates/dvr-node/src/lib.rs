//! DVR Node
//!
//! Hosts one routing participant: loads its topology line, binds its
//! datagram port and runs the protocol loop until told to stop, or until
//! its table settles.
//!
//! The loop is a single task owning all state. It waits on three things at
//! once: the shutdown signal, the next datagram, and a periodic tick that
//! drives heartbeats and retransmission.

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{NodeConfig, DEFAULT_CONFIG_PATH, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use runtime::{NodeRuntime, NodeStatus, RunSummary, SETTLE_TICKS};
