//! Deterministic node addressing: `port = base_port + offset(id)`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::{Error, NodeId, Result, NODE_COUNT};

/// Maps node identifiers to datagram endpoints and back.
///
/// There is no discovery: every node derives every peer's address from the
/// same base, so all nodes must agree on `ip` and `base_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addressing {
    ip: IpAddr,
    base_port: u16,
}

impl Default for Addressing {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 9000,
        }
    }
}

impl Addressing {
    /// Create an addressing scheme from an explicit base port.
    pub fn new(ip: IpAddr, base_port: u16) -> Result<Self> {
        let last = NODE_COUNT as u16 - 1;
        if base_port.checked_add(last).is_none() {
            return Err(Error::PortOutOfRange {
                port: base_port,
                node: NodeId::ALL[NODE_COUNT - 1].as_char(),
            });
        }
        Ok(Self { ip, base_port })
    }

    /// Recover the base port from one node's own port.
    ///
    /// A node is started with its own port and id; the base is whatever port
    /// node `A` would have.
    pub fn from_own_port(ip: IpAddr, port: u16, id: NodeId) -> Result<Self> {
        let base_port = port
            .checked_sub(id.index() as u16)
            .ok_or(Error::PortOutOfRange { port, node: id.as_char() })?;
        Self::new(ip, base_port)
    }

    /// Host all nodes listen on.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Port of node `A`.
    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    /// Port assigned to a node.
    ///
    /// Cannot overflow: `new` rejects any base whose last port is past `u16::MAX`.
    pub fn port_of(&self, id: NodeId) -> u16 {
        self.base_port + id.index() as u16
    }

    /// Socket address assigned to a node.
    pub fn addr_of(&self, id: NodeId) -> SocketAddr {
        SocketAddr::new(self.ip, self.port_of(id))
    }

    /// Node owning a socket address, if any.
    ///
    /// With an unspecified host (`0.0.0.0`) datagrams arrive from whatever
    /// interface the peer used, so only the port is checked.
    pub fn node_at(&self, addr: SocketAddr) -> Option<NodeId> {
        if !self.ip.is_unspecified() && addr.ip() != self.ip {
            return None;
        }
        let offset = addr.port().checked_sub(self.base_port)?;
        NodeId::from_index(offset as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(c: char) -> NodeId {
        NodeId::from_char(c).unwrap()
    }

    #[test]
    fn ports_are_offset_from_base() {
        let addressing = Addressing::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000).unwrap();
        assert_eq!(addressing.port_of(id('A')), 8000);
        assert_eq!(addressing.port_of(id('D')), 8003);
        assert_eq!(addressing.node_at(addressing.addr_of(id('F'))), Some(id('F')));
    }

    #[test]
    fn base_recovered_from_own_port() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let addressing = Addressing::from_own_port(ip, 8002, id('C')).unwrap();
        assert_eq!(addressing.base_port(), 8000);
        assert_eq!(addressing.port_of(id('C')), 8002);
    }

    #[test]
    fn port_underflow_is_rejected() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert!(Addressing::from_own_port(ip, 2, id('D')).is_err());
        assert!(Addressing::new(ip, u16::MAX - 2).is_err());
    }

    #[test]
    fn highest_accepted_base_reaches_the_top_port() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let last = NodeId::ALL[NODE_COUNT - 1];
        let top = u16::MAX - last.index() as u16;

        let addressing = Addressing::new(ip, top).unwrap();
        assert_eq!(addressing.port_of(last), u16::MAX);
        assert!(Addressing::new(ip, top + 1).is_err());
        assert!(Addressing::from_own_port(ip, u16::MAX, id('A')).is_err());
        assert_eq!(Addressing::from_own_port(ip, u16::MAX, last).unwrap().base_port(), top);
    }

    #[test]
    fn foreign_addresses_map_to_no_node() {
        let addressing = Addressing::default();
        let outside: SocketAddr = "127.0.0.1:8999".parse().unwrap();
        let past_end: SocketAddr = "127.0.0.1:9006".parse().unwrap();
        let other_host: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        assert_eq!(addressing.node_at(outside), None);
        assert_eq!(addressing.node_at(past_end), None);
        assert_eq!(addressing.node_at(other_host), None);
    }

    #[test]
    fn unspecified_host_matches_on_port_only() {
        let addressing = Addressing::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9000).unwrap();
        let loopback: SocketAddr = "127.0.0.1:9002".parse().unwrap();
        assert_eq!(addressing.node_at(loopback), Some(id('C')));
        assert_eq!(addressing.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}
