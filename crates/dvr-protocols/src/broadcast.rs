//! Reliable flood broadcast of severed links.
//!
//! # Why a Separate Protocol
//!
//! Gossip merges by minimum, so it can never tell anyone that a route got
//! *worse*. When a link is cut, every node must instead throw away its learned
//! state and reload its topology. This module makes sure every node hears
//! about the cut at least once and acts on it exactly once, over a transport
//! that drops and reorders datagrams.
//!
//! # Per-Event State
//!
//! ```text
//!   Unknown ──first link_broken / local cut──▶ Pending(awaiting)
//!   Pending ──ack from n──▶ awaiting -= n
//!   Pending ──awaiting empty──▶ Done (moved to the seen set)
//!   Done    ──link_broken──▶ lone ack, nothing else
//! ```
//!
//! Only one event is in flight at a time. Events arriving while another is
//! pending are acknowledged immediately and queued; the node reloads for
//! them and floods them once the head retires.
//!
//! # Retransmission
//!
//! Every tick resends the head to the neighbours that have not answered.
//! Relays retry forever: a neighbour is assumed reachable eventually. The
//! originator is the only node that cannot tell "slow" from "gone", so its
//! retries are capped and exhaustion is reported as a delivery failure.

use std::collections::{BTreeSet, VecDeque};

use dvr_routing::NeighborSet;
use dvr_topology::{Link, NodeId};
use tracing::{debug, error, info, trace};

use crate::message::{Envelope, Message};

/// Configuration for the broadcast protocol.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Transmissions an originator makes before giving up.
    pub origin_attempts: u32,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { origin_attempts: 3 }
    }
}

impl BroadcastConfig {
    /// Set the originator's attempt budget.
    #[must_use]
    pub fn with_origin_attempts(mut self, attempts: u32) -> Self {
        self.origin_attempts = attempts.max(1);
        self
    }
}

/// Where an event stands at this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Never heard of.
    Unknown,
    /// Accepted but waiting behind the in-flight event.
    Queued,
    /// In flight, waiting for acks.
    Pending,
    /// Fully acknowledged (or given up on); never flooded again.
    Done,
}

/// Outcome of an event leaving the pending state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastReport {
    /// Every targeted neighbour acknowledged.
    Delivered(Link),
    /// Originator ran out of attempts.
    DeliveryFailed {
        /// The event
        link: Link,
        /// Neighbours that never answered
        unacked: Vec<NodeId>,
    },
}

/// Messages to send and events that finished as a result of one input.
#[derive(Debug, Default)]
pub struct Step {
    /// Datagrams to send
    pub outbound: Vec<Envelope>,
    /// Events that left the pending state
    pub reports: Vec<BroadcastReport>,
}

impl Step {
    fn send(mut self, envelope: Envelope) -> Self {
        self.outbound.push(envelope);
        self
    }
}

/// Broadcast counters for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Events this node announced
    pub originated: u64,
    /// Events first heard from a peer
    pub relayed: u64,
    /// `link_broken` sends, first transmissions included
    pub floods_sent: u64,
    /// Resends on tick
    pub retransmissions: u64,
    /// Acks sent
    pub acks_sent: u64,
    /// Acks that cleared an outstanding neighbour
    pub acks_received: u64,
    /// `link_broken` for an already known event
    pub duplicates: u64,
}

/// One event that has been accepted but not yet retired.
#[derive(Debug, Clone)]
struct PendingBroadcast {
    link: Link,
    /// Neighbours that still owe an ack. Empty until launched.
    awaiting: BTreeSet<NodeId>,
    /// Nodes known to have the event already.
    heard_from: BTreeSet<NodeId>,
    /// Fixed target set for an originated event.
    targets: Option<BTreeSet<NodeId>>,
    launched: bool,
    attempts: u32,
}

impl PendingBroadcast {
    /// Whether this node announced the event itself.
    fn originated(&self) -> bool {
        self.targets.is_some()
    }

    fn flood(&self, self_id: NodeId) -> impl Iterator<Item = Envelope> + '_ {
        self.awaiting
            .iter()
            .map(move |&n| Envelope::new(n, Message::link_broken(self_id, self.link)))
    }
}

/// Reliable broadcast state for one node.
#[derive(Debug)]
pub struct ReliableBroadcast {
    self_id: NodeId,
    config: BroadcastConfig,
    /// Front is the in-flight event, the rest wait their turn.
    active: VecDeque<PendingBroadcast>,
    seen: BTreeSet<Link>,
    stats: BroadcastStats,
}

impl ReliableBroadcast {
    /// Create broadcast state for `self_id`.
    pub fn new(self_id: NodeId, config: BroadcastConfig) -> Self {
        Self {
            self_id,
            config,
            active: VecDeque::new(),
            seen: BTreeSet::new(),
            stats: BroadcastStats::default(),
        }
    }

    /// True when nothing is pending or queued.
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Head that still has to be launched, with whether it was originated here.
    ///
    /// A relayed head needs a topology reload before [`ReliableBroadcast::launch`].
    pub fn needs_launch(&self) -> Option<(Link, bool)> {
        self.active
            .front()
            .filter(|p| !p.launched)
            .map(|p| (p.link, p.originated()))
    }

    /// Counters.
    pub fn stats(&self) -> BroadcastStats {
        self.stats
    }

    /// Where `link` stands at this node.
    pub fn status(&self, link: Link) -> EventStatus {
        if self.seen.contains(&link) {
            return EventStatus::Done;
        }
        match self.active.iter().position(|p| p.link == link) {
            Some(0) => EventStatus::Pending,
            Some(_) => EventStatus::Queued,
            None => EventStatus::Unknown,
        }
    }

    /// Start announcing a link this node cut itself.
    ///
    /// `targets` are the neighbours to tell, typically the neighbour set from
    /// before the cut so the severed peer hears it directly.
    pub fn originate(&mut self, link: Link, targets: impl IntoIterator<Item = NodeId>) -> Step {
        if self.status(link) != EventStatus::Unknown {
            debug!(%link, "link already announced");
            return Step::default();
        }

        info!(%link, "originating link failure broadcast");
        self.stats.originated += 1;
        self.active.push_back(PendingBroadcast {
            link,
            awaiting: BTreeSet::new(),
            heard_from: BTreeSet::new(),
            targets: Some(targets.into_iter().filter(|&n| n != self.self_id).collect()),
            launched: false,
            attempts: 0,
        });
        Step::default()
    }

    /// Handle `link_broken(link)` from `sender`.
    ///
    /// Always answers with an ack. A new event is queued; the caller must
    /// check [`ReliableBroadcast::needs_launch`] afterwards.
    pub fn receive(&mut self, sender: NodeId, link: Link) -> Step {
        let ack = Envelope::new(sender, Message::ack(self.self_id, link));
        self.stats.acks_sent += 1;

        match self.status(link) {
            EventStatus::Unknown => {
                info!(%link, %sender, "received link failure notice");
                self.stats.relayed += 1;
                self.active.push_back(PendingBroadcast {
                    link,
                    awaiting: BTreeSet::new(),
                    heard_from: BTreeSet::from([sender]),
                    targets: None,
                    launched: false,
                    attempts: 0,
                });
                Step::default().send(ack)
            }
            EventStatus::Done => {
                trace!(%link, %sender, "late link failure notice, acking");
                self.stats.duplicates += 1;
                Step::default().send(ack)
            }
            EventStatus::Pending | EventStatus::Queued => {
                debug!(%link, %sender, "duplicate link failure notice, acking");
                self.stats.duplicates += 1;
                // The sender evidently has the event already
                let mut step = self.clear(sender, link);
                step.outbound.push(ack);
                step
            }
        }
    }

    /// Handle `ack(link)` from `sender`.
    pub fn acknowledge(&mut self, sender: NodeId, link: Link) -> Step {
        match self.status(link) {
            EventStatus::Pending => {
                if self.active.front().is_some_and(|p| p.awaiting.contains(&sender)) {
                    self.stats.acks_received += 1;
                }
                self.clear(sender, link)
            }
            status => {
                // Acks are never answered; replying would ping-pong forever
                trace!(%link, %sender, ?status, "ignoring stray ack");
                Step::default()
            }
        }
    }

    /// Flood the head event.
    ///
    /// A relayed event goes to `neighbors` minus everyone it was heard from;
    /// an originated one to its fixed targets. If nobody is left to tell the
    /// event retires immediately.
    pub fn launch(&mut self, neighbors: &NeighborSet) -> Step {
        let self_id = self.self_id;
        let Some(head) = self.active.front_mut().filter(|p| !p.launched) else {
            return Step::default();
        };

        let candidates: BTreeSet<NodeId> = match &head.targets {
            Some(targets) => targets.clone(),
            None => neighbors.iter().collect(),
        };
        head.awaiting = candidates.difference(&head.heard_from).copied().collect();
        head.launched = true;
        head.attempts = 1;

        let outbound: Vec<Envelope> = head.flood(self_id).collect();
        debug!(link = %head.link, awaiting = ?head.awaiting, "flooding link failure");
        self.stats.floods_sent += outbound.len() as u64;

        let mut step = Step {
            outbound,
            reports: Vec::new(),
        };
        if head.awaiting.is_empty() {
            step.reports.extend(self.retire(None));
        }
        step
    }

    /// Periodic retransmission of the head event.
    pub fn on_tick(&mut self) -> Step {
        let self_id = self.self_id;
        let limit = self.config.origin_attempts;
        let Some(head) = self.active.front_mut().filter(|p| p.launched) else {
            return Step::default();
        };

        if head.originated() && head.attempts >= limit {
            let unacked: Vec<NodeId> = head.awaiting.iter().copied().collect();
            error!(
                link = %head.link,
                attempts = head.attempts,
                ?unacked,
                "gave up, did not get acknowledgement from all neighbours"
            );
            return Step {
                outbound: Vec::new(),
                reports: self.retire(Some(unacked)).into_iter().collect(),
            };
        }

        head.attempts += 1;
        let outbound: Vec<Envelope> = head.flood(self_id).collect();
        debug!(
            link = %head.link,
            attempt = head.attempts,
            awaiting = ?head.awaiting,
            "retransmitting link failure"
        );
        self.stats.retransmissions += 1;
        self.stats.floods_sent += outbound.len() as u64;
        Step {
            outbound,
            reports: Vec::new(),
        }
    }

    /// Note that `node` has `link`, retiring the head if that was the last one.
    fn clear(&mut self, node: NodeId, link: Link) -> Step {
        let Some(record) = self.active.iter_mut().find(|p| p.link == link) else {
            return Step::default();
        };
        record.heard_from.insert(node);
        if !record.launched {
            return Step::default();
        }

        record.awaiting.remove(&node);
        if record.awaiting.is_empty() {
            return Step {
                outbound: Vec::new(),
                reports: self.retire(None).into_iter().collect(),
            };
        }
        Step::default()
    }

    /// Move the head into the seen set.
    fn retire(&mut self, unacked: Option<Vec<NodeId>>) -> Option<BroadcastReport> {
        let head = self.active.pop_front()?;
        self.seen.insert(head.link);

        Some(match unacked {
            Some(unacked) => BroadcastReport::DeliveryFailed {
                link: head.link,
                unacked,
            },
            None => {
                info!(link = %head.link, attempts = head.attempts, "link failure broadcast complete");
                BroadcastReport::Delivered(head.link)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Payload;

    fn id(c: char) -> NodeId {
        NodeId::from_char(c).unwrap()
    }

    fn neighbors(ids: &str) -> NeighborSet {
        ids.chars().map(id).collect()
    }

    fn targets(step: &Step, kind: &str) -> Vec<NodeId> {
        step.outbound
            .iter()
            .filter(|e| e.message.kind() == kind)
            .map(|e| e.to)
            .collect()
    }

    fn link_ab() -> Link {
        Link::new(id('A'), id('B'))
    }

    #[test]
    fn relay_floods_to_everyone_but_sender() {
        let mut c = ReliableBroadcast::new(id('C'), BroadcastConfig::default());
        let step = c.receive(id('B'), link_ab());
        assert_eq!(targets(&step, "ack"), vec![id('B')]);
        assert_eq!(c.needs_launch(), Some((link_ab(), false)));
        assert_eq!(c.status(link_ab()), EventStatus::Pending);

        let step = c.launch(&neighbors("BD"));
        assert_eq!(targets(&step, "link_broken"), vec![id('D')]);
        assert!(step.reports.is_empty());

        let step = c.acknowledge(id('D'), link_ab());
        assert_eq!(step.reports, vec![BroadcastReport::Delivered(link_ab())]);
        assert_eq!(c.status(link_ab()), EventStatus::Done);
        assert!(c.is_idle());
    }

    #[test]
    fn leaf_relay_completes_on_launch() {
        let mut c = ReliableBroadcast::new(id('C'), BroadcastConfig::default());
        c.receive(id('B'), link_ab());
        let step = c.launch(&neighbors("B"));
        assert!(targets(&step, "link_broken").is_empty());
        assert_eq!(step.reports, vec![BroadcastReport::Delivered(link_ab())]);
        assert!(c.is_idle());
    }

    #[test]
    fn done_event_gets_lone_ack() {
        let mut c = ReliableBroadcast::new(id('C'), BroadcastConfig::default());
        c.receive(id('B'), link_ab());
        c.launch(&neighbors("B"));

        for _ in 0..3 {
            let step = c.receive(id('B'), link_ab());
            assert_eq!(step.outbound.len(), 1);
            assert_eq!(
                step.outbound[0].message.body,
                Payload::Ack { link: link_ab() }
            );
            assert_eq!(c.needs_launch(), None);
        }
        assert_eq!(c.stats().relayed, 1);
        assert_eq!(c.stats().duplicates, 3);
    }

    #[test]
    fn duplicate_notice_counts_as_ack() {
        let mut c = ReliableBroadcast::new(id('C'), BroadcastConfig::default());
        c.receive(id('B'), link_ab());
        c.launch(&neighbors("BD"));

        let step = c.receive(id('D'), link_ab());
        assert_eq!(targets(&step, "ack"), vec![id('D')]);
        assert_eq!(step.reports, vec![BroadcastReport::Delivered(link_ab())]);
    }

    #[test]
    fn stray_acks_are_ignored() {
        let mut c = ReliableBroadcast::new(id('C'), BroadcastConfig::default());
        let step = c.acknowledge(id('B'), link_ab());
        assert!(step.outbound.is_empty() && step.reports.is_empty());

        c.receive(id('B'), link_ab());
        c.launch(&neighbors("BD"));
        let step = c.acknowledge(id('E'), link_ab());
        assert!(step.outbound.is_empty());
        assert_eq!(c.status(link_ab()), EventStatus::Pending);
    }

    #[test]
    fn second_event_waits_for_first() {
        let other = Link::new(id('D'), id('E'));
        let mut c = ReliableBroadcast::new(id('C'), BroadcastConfig::default());
        c.receive(id('B'), link_ab());
        c.launch(&neighbors("BD"));

        let step = c.receive(id('D'), other);
        assert_eq!(targets(&step, "ack"), vec![id('D')]);
        assert_eq!(c.status(other), EventStatus::Queued);
        assert_eq!(c.needs_launch(), None);

        // Retransmission only covers the head
        let step = c.on_tick();
        assert_eq!(targets(&step, "link_broken"), vec![id('D')]);
        assert!(step.outbound.iter().all(|e| e.message.body == Payload::LinkBroken { link: link_ab() }));

        c.acknowledge(id('D'), link_ab());
        assert_eq!(c.needs_launch(), Some((other, false)));
        let step = c.launch(&neighbors("BD"));
        assert_eq!(targets(&step, "link_broken"), vec![id('B')]);
    }

    #[test]
    fn relay_retries_without_limit() {
        let mut c = ReliableBroadcast::new(id('C'), BroadcastConfig::default());
        c.receive(id('B'), link_ab());
        c.launch(&neighbors("BD"));
        for _ in 0..20 {
            let step = c.on_tick();
            assert_eq!(targets(&step, "link_broken"), vec![id('D')]);
        }
        assert_eq!(c.stats().retransmissions, 20);
        assert_eq!(c.status(link_ab()), EventStatus::Pending);
    }

    #[test]
    fn originator_gives_up_after_budget() {
        let mut a = ReliableBroadcast::new(id('A'), BroadcastConfig::default());
        a.originate(link_ab(), [id('B'), id('D')]);
        assert_eq!(a.needs_launch(), Some((link_ab(), true)));

        let step = a.launch(&NeighborSet::default());
        assert_eq!(targets(&step, "link_broken"), vec![id('B'), id('D')]);
        a.acknowledge(id('B'), link_ab());

        assert_eq!(targets(&a.on_tick(), "link_broken"), vec![id('D')]);
        assert_eq!(targets(&a.on_tick(), "link_broken"), vec![id('D')]);
        let step = a.on_tick();
        assert!(step.outbound.is_empty());
        assert_eq!(
            step.reports,
            vec![BroadcastReport::DeliveryFailed {
                link: link_ab(),
                unacked: vec![id('D')],
            }]
        );
        assert_eq!(a.status(link_ab()), EventStatus::Done);
    }

    #[test]
    fn originating_twice_is_a_no_op() {
        let mut a = ReliableBroadcast::new(id('A'), BroadcastConfig::default());
        a.originate(link_ab(), [id('B')]);
        a.originate(link_ab(), [id('B')]);
        assert_eq!(a.stats().originated, 1);
    }
}
