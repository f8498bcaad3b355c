//! Node identifiers drawn from the closed alphabet.

use std::fmt;
use std::str::FromStr;

use crate::{Error, NODE_COUNT};

/// Identifier of a routing participant.
///
/// Stored as the offset into the alphabet, so ordering, indexing and port
/// derivation are all the same number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "char", into = "char"))]
pub struct NodeId(u8);

impl NodeId {
    /// First letter of the alphabet.
    pub const FIRST: char = 'A';

    /// Every node, in alphabet order.
    pub const ALL: [Self; NODE_COUNT] = [
        Self(0),
        Self(1),
        Self(2),
        Self(3),
        Self(4),
        Self(5),
    ];

    /// Node at the given offset, if it is inside the alphabet.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < NODE_COUNT {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Node named by a letter.
    pub fn from_char(c: char) -> Option<Self> {
        let offset = (c as u32).checked_sub(Self::FIRST as u32)?;
        Self::from_index(offset as usize)
    }

    /// Offset into the alphabet (matrix index, port offset).
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The letter naming this node.
    pub fn as_char(self) -> char {
        char::from(Self::FIRST as u8 + self.0)
    }

    /// Iterate all nodes in order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::ALL.into_iter()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl TryFrom<char> for NodeId {
    type Error = Error;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        Self::from_char(c).ok_or_else(|| Error::UnknownNode(c.to_string()))
    }
}

impl From<NodeId> for char {
    fn from(id: NodeId) -> Self {
        id.as_char()
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::try_from(c),
            _ => Err(Error::UnknownNode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn letters_round_trip_through_index() {
        for (i, id) in NodeId::all().enumerate() {
            assert_eq!(id.index(), i);
            assert_eq!(NodeId::from_char(id.as_char()), Some(id));
        }
        assert_eq!(NodeId::ALL[0].as_char(), 'A');
        assert_eq!(NodeId::ALL[5].as_char(), 'F');
    }

    #[test]
    fn outside_alphabet_is_rejected() {
        assert_eq!(NodeId::from_char('G'), None);
        assert_eq!(NodeId::from_char('a'), None);
        assert_eq!(NodeId::from_char('0'), None);
        assert!("AB".parse::<NodeId>().is_err());
        assert!("".parse::<NodeId>().is_err());
        assert!(NodeId::try_from('Z').is_err());
    }

    #[test]
    fn parses_with_surrounding_whitespace() {
        let id: NodeId = " C\n".parse().unwrap();
        assert_eq!(id.to_string(), "C");
    }

    #[test]
    fn ordering_follows_alphabet() {
        let a = NodeId::from_char('A').unwrap();
        let d = NodeId::from_char('D').unwrap();
        assert!(a < d);
    }

    proptest! {
        #[test]
        fn any_char_maps_back_to_itself(c in any::<char>()) {
            match NodeId::from_char(c) {
                Some(id) => {
                    prop_assert_eq!(id.as_char(), c);
                    prop_assert_eq!(c.to_string().parse::<NodeId>().ok(), Some(id));
                }
                None => prop_assert!(NodeId::try_from(c).is_err()),
            }
        }
    }
}
