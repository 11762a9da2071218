//! The handshake phase: bounded membership discovery before the ring
//! starts circulating.
//!
//! Every node periodically announces the peer set it knows about. A
//! newly learned peer resets the silence deadline; once the set has been
//! stable for the full handshake timeout, the node with the lowest known
//! ID elects itself the initial token holder and distributes the agreed
//! topology.

use crate::topology::Topology;
use dtr_proto::constants::BROADCAST_ID;
use dtr_proto::{MessageType, Packet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of polling the discovery deadlines.
#[derive(Debug)]
pub enum DiscoveryPoll {
    /// Nothing due yet.
    Pending,
    /// Time to rebroadcast the candidate set.
    Announce(Packet),
    /// Silence elapsed and this node has the lowest ID: it becomes the
    /// initial holder of the carried topology.
    Elected(Topology),
    /// Silence elapsed and some other node is the leader.
    Demoted,
}

/// Candidate membership and the two discovery deadlines.
#[derive(Debug)]
pub struct Discovery {
    self_id: u8,
    candidate: Topology,
    announce_period: Duration,
    silence_timeout: Duration,
    next_announce: Instant,
    silence_deadline: Instant,
}

impl Discovery {
    pub fn new(
        self_id: u8,
        announce_period: Duration,
        silence_timeout: Duration,
        now: Instant,
    ) -> Discovery {
        let mut candidate = Topology::default();
        candidate.push(self_id);
        Discovery {
            self_id,
            candidate,
            announce_period,
            silence_timeout,
            // First announcement goes out immediately.
            next_announce: now,
            silence_deadline: now + silence_timeout,
        }
    }

    pub fn candidate(&self) -> &Topology {
        &self.candidate
    }

    /// Merges a received peer set into the candidate topology. Any newly
    /// learned peer pushes the silence deadline out.
    pub fn learn(&mut self, ids: &[u8], now: Instant) -> usize {
        let mut added = 0;
        for &id in ids {
            if self.candidate.push(id) {
                debug!(peer = id, "learned ring candidate");
                added += 1;
            }
        }
        if added > 0 {
            self.silence_deadline = now + self.silence_timeout;
        }
        added
    }

    /// The earliest instant at which `poll` has something to do.
    pub fn next_wakeup(&self) -> Instant {
        self.next_announce.min(self.silence_deadline)
    }

    pub fn poll(&mut self, now: Instant) -> DiscoveryPoll {
        if now >= self.silence_deadline {
            if self.candidate.min_id() == Some(self.self_id) {
                debug!(candidates = ?self.candidate.ids(), "discovery settled, electing self");
                return DiscoveryPoll::Elected(self.candidate.clone());
            }
            debug!(candidates = ?self.candidate.ids(), "discovery settled, awaiting leader");
            return DiscoveryPoll::Demoted;
        }
        if now >= self.next_announce {
            self.next_announce += self.announce_period;
            return DiscoveryPoll::Announce(Packet::new(
                MessageType::Handshake,
                self.self_id,
                BROADCAST_ID,
                self.candidate.to_payload(),
            ));
        }
        DiscoveryPoll::Pending
    }
}
