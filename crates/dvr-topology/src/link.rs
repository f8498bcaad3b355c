//! Severed-link events.

use std::fmt;

use crate::NodeId;

/// A severed link, named by the node that announced it and its peer.
///
/// The pair is ordered: `(A, B)` and `(B, A)` are distinct announcements even
/// though they describe the same physical edge. [`Link::involves`] and
/// [`Link::peer_of`] ignore the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Link {
    /// Node that announced the break
    pub from: NodeId,
    /// The other endpoint
    pub to: NodeId,
}

impl Link {
    /// Create a link event.
    pub const fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }

    /// Whether `id` is one of the two endpoints.
    pub fn involves(&self, id: NodeId) -> bool {
        self.from == id || self.to == id
    }

    /// The endpoint opposite `id`, if `id` is an endpoint.
    pub fn peer_of(&self, id: NodeId) -> Option<NodeId> {
        if self.from == id {
            Some(self.to)
        } else if self.to == id {
            Some(self.from)
        } else {
            None
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}
