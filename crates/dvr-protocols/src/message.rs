//! Wire messages.
//!
//! Every datagram is one JSON object:
//!
//! ```text
//! {"sender":"A","body":{"type":"update","epoch":0,"table":[[0,1,...],...]}}
//! {"sender":"B","body":{"type":"link_broken","link":{"from":"A","to":"B"}}}
//! {"sender":"C","body":{"type":"ack","link":{"from":"A","to":"B"}}}
//! ```

use dvr_routing::RoutingTable;
use dvr_topology::{Link, NodeId};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest datagram a node will send or accept.
pub const MAX_DATAGRAM: usize = 4096;

/// Protocol payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Full routing table snapshot (gossip), stamped with the number of
    /// topology changes the sender had applied when it was taken
    Update { epoch: u64, table: RoutingTable },
    /// Announcement that a link was severed
    LinkBroken { link: Link },
    /// Receipt of a `LinkBroken`
    Ack { link: Link },
}

/// A payload plus the node that sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sending node
    pub sender: NodeId,
    /// What was sent
    pub body: Payload,
}

impl Message {
    /// Gossip a table snapshot taken at topology `epoch`.
    pub fn update(sender: NodeId, epoch: u64, table: RoutingTable) -> Self {
        Self {
            sender,
            body: Payload::Update { epoch, table },
        }
    }

    /// Announce a severed link.
    pub fn link_broken(sender: NodeId, link: Link) -> Self {
        Self {
            sender,
            body: Payload::LinkBroken { link },
        }
    }

    /// Acknowledge a link announcement.
    pub fn ack(sender: NodeId, link: Link) -> Self {
        Self {
            sender,
            body: Payload::Ack { link },
        }
    }

    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self.body {
            Payload::Update { .. } => "update",
            Payload::LinkBroken { .. } => "link_broken",
            Payload::Ack { .. } => "ack",
        }
    }

    /// Serialize into one datagram.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(Error::Oversized {
                len: bytes.len(),
                max: MAX_DATAGRAM,
            });
        }
        Ok(bytes)
    }

    /// Parse one datagram.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A message addressed to one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Destination node
    pub to: NodeId,
    /// Message to deliver
    pub message: Message,
}

impl Envelope {
    /// Address `message` to `to`.
    pub fn new(to: NodeId, message: Message) -> Self {
        Self { to, message }
    }
}
