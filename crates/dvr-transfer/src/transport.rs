//! UDP transport layer
//!
//! Provides a thin wrapper around tokio's UdpSocket with:
//! - Configurable send/receive buffer sizes
//! - Address reuse, so a restarted node can rebind its port at once

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// A datagram endpoint.
///
/// Delivery is best effort: datagrams may be lost, duplicated or reordered.
pub trait Transport: Send + Sync {
    /// Send one datagram to `addr`.
    fn send_to(
        &self,
        addr: SocketAddr,
        data: &[u8],
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Wait for the next datagram, copying it into `buf`.
    ///
    /// Returns the number of bytes written and the sender's address. Bytes
    /// beyond `buf.len()` are discarded.
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = anyhow::Result<(usize, SocketAddr)>> + Send;

    /// Address this endpoint receives on.
    fn local_addr(&self) -> anyhow::Result<SocketAddr>;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Address to bind to
    pub bind: SocketAddr,
    /// Send buffer size in bytes
    pub sndbuf: usize,
    /// Receive buffer size in bytes
    pub rcvbuf: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 9000)))
    }
}

impl TransportConfig {
    /// Configuration for `bind` with default buffer sizes.
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            sndbuf: 256 * 1024,
            rcvbuf: 256 * 1024,
        }
    }
}

/// UDP socket transport
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind to the configured address with configured buffer sizes
    pub async fn bind(cfg: TransportConfig) -> anyhow::Result<Self> {
        let addr = cfg.bind;
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        // Set buffer sizes before binding
        socket.set_send_buffer_size(cfg.sndbuf)?;
        socket.set_recv_buffer_size(cfg.rcvbuf)?;
        socket.set_reuse_address(true)?;

        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;

        // Convert to tokio socket
        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;

        tracing::info!(
            %addr,
            sndbuf = cfg.sndbuf,
            rcvbuf = cfg.rcvbuf,
            "UDP transport bound"
        );

        Ok(Self { socket })
    }
}

impl Transport for UdpTransport {
    async fn send_to(&self, addr: SocketAddr, data: &[u8]) -> anyhow::Result<()> {
        self.socket.send_to(data, addr).await?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> anyhow::Result<(usize, SocketAddr)> {
        Ok(self.socket.recv_from(buf).await?)
    }

    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}
