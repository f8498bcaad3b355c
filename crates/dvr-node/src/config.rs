//! Node configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use dvr_protocols::RouterConfig;
use dvr_topology::{Addressing, NodeId};

use crate::error::{Error, Result};

/// Topology file read when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "topology.config";

/// Receive window before a tick fires.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Configuration for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node
    pub id: NodeId,

    /// Port this node listens on; peers' ports are derived from it
    pub port: u16,

    /// Host all nodes share
    pub ip: IpAddr,

    /// Topology file
    pub config_path: PathBuf,

    /// Heartbeat / retransmission interval
    pub timeout: Duration,

    /// Peer to cut the link to once the table first converges
    pub cut: Option<NodeId>,

    /// Stop on its own once settled instead of waiting for shutdown
    pub until_converged: bool,

    /// Protocol settings
    pub router: RouterConfig,
}

impl NodeConfig {
    /// Configuration with built-in defaults.
    pub fn new(id: NodeId, port: u16) -> Self {
        Self {
            id,
            port,
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            timeout: DEFAULT_TIMEOUT,
            cut: None,
            until_converged: false,
            router: RouterConfig::default(),
        }
    }

    /// Create config from environment variables with sensible defaults.
    ///
    /// Reads `DVR_CONFIG`, `DVR_TIMEOUT_MS` and `DVR_IP`.
    pub fn from_env(id: NodeId, port: u16) -> Result<Self> {
        let mut config = Self::new(id, port);

        if let Ok(path) = std::env::var("DVR_CONFIG") {
            config.config_path = PathBuf::from(path);
        }
        if let Ok(ms) = std::env::var("DVR_TIMEOUT_MS") {
            let ms = ms
                .trim()
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("DVR_TIMEOUT_MS={ms} is not a number")))?;
            config = config.with_timeout(Duration::from_millis(ms));
        }
        if let Ok(ip) = std::env::var("DVR_IP") {
            config.ip = ip
                .trim()
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("DVR_IP={ip} is not an IP address")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Use a different topology file.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    /// Use a different tick interval.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a different host address.
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    /// Cut the link to `peer` after first convergence.
    pub fn with_cut(mut self, peer: NodeId) -> Self {
        self.cut = Some(peer);
        self
    }

    /// Stop once the table has settled, after the scheduled cut if any.
    pub fn with_until_converged(mut self) -> Self {
        self.until_converged = true;
        self
    }

    /// Use different protocol settings.
    pub fn with_router(mut self, router: RouterConfig) -> Self {
        self.router = router;
        self
    }

    /// Check the values that can be wrong independently of the topology.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be positive".into()));
        }
        if self.cut == Some(self.id) {
            return Err(Error::InvalidConfig(format!("node {} cannot cut a link to itself", self.id)));
        }
        self.addressing()?;
        Ok(())
    }

    /// Addressing scheme implied by this node's id and port.
    pub fn addressing(&self) -> Result<Addressing> {
        Ok(Addressing::from_own_port(self.ip, self.port, self.id)?)
    }

    /// Address to bind.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}
