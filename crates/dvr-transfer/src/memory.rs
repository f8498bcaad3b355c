//! In-process datagram network.
//!
//! Every [`MemoryTransport`] is registered under a socket address; sending to
//! an address nobody holds silently drops the datagram, as UDP would. An
//! optional loss rate drops datagrams at random from a seeded generator so
//! lossy runs are reproducible. An optional reorder rate holds datagrams back
//! until the next one for the same address has gone through.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::Transport;

type Datagram = (SocketAddr, Bytes);

struct Shared {
    endpoints: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    loss: f64,
    reorder: f64,
    held: HashMap<SocketAddr, Vec<Datagram>>,
    rng: StdRng,
    delivered: u64,
    dropped: u64,
}

/// A shared in-memory network.
#[derive(Clone)]
pub struct MemoryNetwork {
    shared: Arc<Mutex<Shared>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    /// A lossless network.
    pub fn new() -> Self {
        Self::with_loss(0.0, 0)
    }

    /// A network dropping each datagram with probability `loss`.
    pub fn with_loss(loss: f64, seed: u64) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                endpoints: HashMap::new(),
                loss: loss.clamp(0.0, 1.0),
                reorder: 0.0,
                held: HashMap::new(),
                rng: StdRng::seed_from_u64(seed),
                delivered: 0,
                dropped: 0,
            })),
        }
    }

    /// Hold each datagram back with probability `rate`, releasing it right
    /// after the next datagram to the same address.
    pub fn with_reordering(self, rate: f64) -> Self {
        self.lock().reorder = rate.clamp(0.0, 1.0);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Attach an endpoint at `addr`.
    pub fn endpoint(&self, addr: SocketAddr) -> anyhow::Result<MemoryTransport> {
        let mut shared = self.lock();
        if shared.endpoints.contains_key(&addr) {
            bail!("address {addr} already in use");
        }
        let (tx, rx) = mpsc::unbounded();
        shared.endpoints.insert(addr, tx);
        tracing::debug!(%addr, "memory endpoint attached");

        Ok(MemoryTransport {
            addr,
            network: self.clone(),
            inbox: tokio::sync::Mutex::new(rx),
        })
    }

    /// Datagrams handed to a live endpoint so far.
    pub fn delivered(&self) -> u64 {
        self.lock().delivered
    }

    /// Datagrams lost to the loss rate or sent to nobody.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn route(&self, from: SocketAddr, to: SocketAddr, data: Bytes) {
        let mut shared = self.lock();
        let loss = shared.loss;
        if loss > 0.0 && shared.rng.gen_bool(loss) {
            shared.dropped += 1;
            tracing::trace!(%from, %to, "datagram lost");
            return;
        }

        let reorder = shared.reorder;
        if reorder > 0.0 && shared.endpoints.contains_key(&to) && shared.rng.gen_bool(reorder) {
            tracing::trace!(%from, %to, "datagram held back");
            shared.held.entry(to).or_default().push((from, data));
            return;
        }

        let mut batch = vec![(from, data)];
        batch.extend(shared.held.remove(&to).unwrap_or_default());
        for (from, data) in batch {
            let sent = shared
                .endpoints
                .get(&to)
                .is_some_and(|tx| tx.unbounded_send((from, data)).is_ok());
            if sent {
                shared.delivered += 1;
            } else {
                shared.dropped += 1;
                tracing::trace!(%from, %to, "no endpoint, datagram dropped");
            }
        }
    }

    fn detach(&self, addr: SocketAddr) {
        let mut shared = self.lock();
        shared.endpoints.remove(&addr);
        let lost = shared.held.remove(&addr).map_or(0, |held| held.len() as u64);
        shared.dropped += lost;
        tracing::debug!(%addr, "memory endpoint detached");
    }
}

/// One endpoint on a [`MemoryNetwork`]. Detaches when dropped.
pub struct MemoryTransport {
    addr: SocketAddr,
    network: MemoryNetwork,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl Transport for MemoryTransport {
    async fn send_to(&self, addr: SocketAddr, data: &[u8]) -> anyhow::Result<()> {
        self.network.route(self.addr, addr, Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> anyhow::Result<(usize, SocketAddr)> {
        let (from, data) = self
            .inbox
            .lock()
            .await
            .next()
            .await
            .ok_or_else(|| anyhow!("memory network closed"))?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok((len, from))
    }

    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.addr)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network.detach(self.addr);
    }
}
