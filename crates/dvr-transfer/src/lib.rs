//! DVR Transfer - Datagram transports for routing nodes
//!
//! This crate provides:
//! - A [`Transport`] trait: unreliable, unordered, message-oriented delivery
//! - [`UdpTransport`]: a UDP socket with configurable buffers
//! - [`MemoryNetwork`]: an in-process network with seeded packet loss, for
//!   running many nodes in one test
//!
//! # Design Philosophy
//!
//! The routing protocols above assume nothing stronger than UDP. Loss is
//! handled by periodic re-sends (heartbeats, retransmission), not by the
//! transport, so both implementations are deliberately thin: a failed send
//! is just a dropped packet.
//!
//! # Example
//!
//! ```rust,ignore
//! use dvr_transfer::{Transport, TransportConfig, UdpTransport};
//!
//! let transport = UdpTransport::bind(TransportConfig::new("127.0.0.1:9000".parse()?)).await?;
//! transport.send_to("127.0.0.1:9001".parse()?, b"hello").await?;
//! ```

pub mod memory;
pub mod transport;

// Re-export main types at crate root
pub use memory::{MemoryNetwork, MemoryTransport};
pub use transport::{Transport, TransportConfig, UdpTransport};
