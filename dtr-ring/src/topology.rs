//! The ring membership registry.
//!
//! A topology is an ordered sequence of distinct peer IDs; the peer at
//! index `i` follows the peer at index `i - 1`, modulo the length. The
//! ring is plain index arithmetic over the sequence, no links.

use dtr_proto::constants::{INVALID_ID, MAX_NETWORK_SIZE};
use smallvec::SmallVec;

/// Ordered ring membership with wrap-around neighbor lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topology {
    ids: SmallVec<[u8; MAX_NETWORK_SIZE]>,
}

impl Topology {
    /// Builds a topology from an ordered ID list. IDs must be distinct;
    /// duplicates and overflow entries are ignored.
    pub fn new(ids: &[u8]) -> Topology {
        let mut topology = Topology::default();
        for &id in ids {
            topology.push(id);
        }
        topology
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u8] {
        &self.ids
    }

    pub fn contains(&self, id: u8) -> bool {
        self.ids.contains(&id)
    }

    pub fn index_of(&self, id: u8) -> Option<usize> {
        self.ids.iter().position(|&member| member == id)
    }

    /// The peer after `id` in ring order, or `INVALID_ID` when `id` is
    /// not a member.
    pub fn next(&self, id: u8) -> u8 {
        match self.index_of(id) {
            Some(idx) => self.ids[(idx + 1) % self.ids.len()],
            None => INVALID_ID,
        }
    }

    /// The peer before `id` in ring order, or `INVALID_ID` when `id` is
    /// not a member.
    pub fn prev(&self, id: u8) -> u8 {
        match self.index_of(id) {
            Some(idx) => self.ids[(idx + self.ids.len() - 1) % self.ids.len()],
            None => INVALID_ID,
        }
    }

    /// Appends a peer, preserving order. Returns false on duplicates or
    /// when the ring is full.
    pub fn push(&mut self, id: u8) -> bool {
        if id == INVALID_ID || self.contains(id) || self.ids.len() >= MAX_NETWORK_SIZE {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Shift-compacting removal. Callers re-derive their neighbors.
    pub fn remove(&mut self, id: u8) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                self.ids.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Replaces the membership wholesale.
    pub fn install(&mut self, new_topology: Topology) {
        self.ids = new_topology.ids;
    }

    /// The lowest member ID; used for leader election.
    pub fn min_id(&self) -> Option<u8> {
        self.ids.iter().copied().min()
    }

    /// Serializes to the frame payload form `[size, ids...]`, shared by
    /// HANDSHAKE and TOPOLOGY_RECONFIG frames.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(1 + self.ids.len());
        payload.push(self.ids.len() as u8);
        payload.extend_from_slice(&self.ids);
        payload
    }

    /// Parses the `[size, ids...]` payload form, rejecting inconsistent
    /// sizes, oversize rings and duplicate members.
    pub fn from_payload(payload: &[u8]) -> Option<Topology> {
        let size = *payload.first()? as usize;
        if size == 0 || size > MAX_NETWORK_SIZE || payload.len() < 1 + size {
            return None;
        }
        let mut topology = Topology::default();
        for &id in &payload[1..1 + size] {
            if !topology.push(id) {
                return None;
            }
        }
        Some(topology)
    }
}
