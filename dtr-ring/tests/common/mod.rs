#![allow(dead_code)]
//! A deterministic multi-node simulation for protocol tests.
//!
//! Engines are driven directly with explicit instants; the "ether"
//! delivers each transmitted frame to every other living peer in a
//! fixed order, so every scenario replays identically.

use dtr_proto::constants::{RX_DATA_QUEUE_SIZE, TX_DATA_QUEUE_SIZE};
use dtr_proto::{MessageType, Packet};
use dtr_ring::time::{ManualTimeProvider, TimeProvider};
use dtr_ring::{PacketQueue, RadioInfo, RingConfig, RingEngine, Topology};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Peer {
    pub id: u8,
    pub engine: RingEngine,
    pub tx_data: Arc<PacketQueue>,
    pub rx_data: Arc<PacketQueue>,
    pub info: Arc<RadioInfo>,
}

impl Peer {
    /// A peer starting in the discovery handshake, for late arrivals.
    pub fn new_dynamic(id: u8, now: Instant) -> Peer {
        Peer::new(id, None, RingConfig::default(), now)
    }

    fn new(id: u8, topology: Option<Topology>, config: RingConfig, now: Instant) -> Peer {
        let tx_data = Arc::new(PacketQueue::new(TX_DATA_QUEUE_SIZE));
        let rx_data = Arc::new(PacketQueue::new(RX_DATA_QUEUE_SIZE));
        let info = Arc::new(RadioInfo::new(id));
        let engine = RingEngine::new(
            id,
            topology,
            config,
            tx_data.clone(),
            rx_data.clone(),
            info.clone(),
            now,
        );
        Peer {
            id,
            engine,
            tx_data,
            rx_data,
            info,
        }
    }
}

struct DropRule {
    message_type: MessageType,
    source_id: u8,
    remaining: u32,
}

pub struct Sim {
    pub peers: Vec<Peer>,
    time: Arc<ManualTimeProvider>,
    pending: VecDeque<(u8, Packet)>,
    /// Every transmission attempt, in channel order (dropped ones included).
    pub wire: Vec<(u8, Packet)>,
    dead: Vec<u8>,
    drops: Vec<DropRule>,
}

impl Sim {
    /// All peers share a compiled-in topology in the given ring order.
    pub fn new_static(ids: &[u8]) -> Sim {
        Sim::build(ids, true)
    }

    /// All peers start in the discovery handshake.
    pub fn new_dynamic(ids: &[u8]) -> Sim {
        Sim::build(ids, false)
    }

    fn build(ids: &[u8], static_topology: bool) -> Sim {
        let time = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
        let now = time.now_instant();
        let peers = ids
            .iter()
            .map(|&id| {
                let topology = if static_topology {
                    Some(Topology::new(ids))
                } else {
                    None
                };
                Peer::new(id, topology, RingConfig::default(), now)
            })
            .collect();
        Sim {
            peers,
            time,
            pending: VecDeque::new(),
            wire: Vec::new(),
            dead: Vec::new(),
            drops: Vec::new(),
        }
    }

    pub fn now(&self) -> Instant {
        self.time.now_instant()
    }

    pub fn peer(&mut self, id: u8) -> &mut Peer {
        self.peers
            .iter_mut()
            .find(|peer| peer.id == id)
            .expect("unknown peer")
    }

    /// Enqueues application data on a peer's TX-DATA queue.
    pub fn enqueue(&mut self, id: u8, target: u8, payload: &[u8]) {
        let packet = Packet::new(MessageType::Data, id, target, payload.to_vec());
        self.peer(id).tx_data.put(packet).expect("TX-DATA full");
    }

    /// Simulates a crashed peer: it neither transmits nor receives.
    pub fn kill(&mut self, id: u8) {
        self.dead.push(id);
    }

    /// Swallows the next `count` frames of `message_type` sent by `source_id`.
    pub fn drop_next(&mut self, message_type: MessageType, source_id: u8, count: u32) {
        self.drops.push(DropRule {
            message_type,
            source_id,
            remaining: count,
        });
    }

    /// Fires each engine's start path.
    pub fn start(&mut self) {
        let now = self.now();
        for idx in 0..self.peers.len() {
            let outs = self.peers[idx].engine.start(now);
            let from = self.peers[idx].id;
            for packet in outs {
                self.transmit(from, packet);
            }
        }
    }

    /// Adds a peer mid-simulation and fires its start path.
    pub fn adopt(&mut self, mut peer: Peer) {
        let from = peer.id;
        let outs = peer.engine.start(self.now());
        self.peers.push(peer);
        for packet in outs {
            self.transmit(from, packet);
        }
    }

    /// Delivers a crafted frame to a single peer, as if every other
    /// radio had missed the broadcast.
    pub fn inject_to(&mut self, id: u8, packet: Packet) {
        let now = self.now();
        let outs = self.peer(id).engine.handle_frame(packet, now);
        for out in outs {
            self.transmit(id, out);
        }
    }

    fn transmit(&mut self, from: u8, packet: Packet) {
        if self.dead.contains(&from) {
            return;
        }
        self.wire.push((from, packet.clone()));
        for rule in self.drops.iter_mut() {
            if rule.remaining > 0
                && rule.message_type == packet.message_type
                && rule.source_id == packet.source_id
            {
                rule.remaining -= 1;
                return;
            }
        }
        self.pending.push_back((from, packet));
    }

    /// Delivers one in-flight frame to every other living peer. Returns
    /// false once the channel is quiet.
    pub fn step(&mut self) -> bool {
        let (from, packet) = match self.pending.pop_front() {
            Some(entry) => entry,
            None => return false,
        };
        let now = self.now();
        for idx in 0..self.peers.len() {
            let id = self.peers[idx].id;
            if id == from || self.dead.contains(&id) {
                continue;
            }
            let outs = self.peers[idx].engine.handle_frame(packet.clone(), now);
            for out in outs {
                self.transmit(id, out);
            }
        }
        true
    }

    /// Steps until the channel is quiet or `max_steps` frames were
    /// delivered. A healthy ring circulates forever, so callers bound
    /// their runs.
    pub fn run(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && self.step() {
            steps += 1;
        }
        steps
    }

    /// Advances time in `tick` increments, polling every living peer's
    /// deadlines and delivering whatever they emit.
    pub fn advance(&mut self, total: Duration, tick: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            let step = tick.min(total - elapsed);
            self.time.advance(step);
            elapsed += step;
            let now = self.now();
            for idx in 0..self.peers.len() {
                let id = self.peers[idx].id;
                if self.dead.contains(&id) {
                    continue;
                }
                let outs = self.peers[idx].engine.poll(now);
                for out in outs {
                    self.transmit(id, out);
                }
            }
            self.run(200);
        }
    }

    /// `(source, target, type)` triples of everything transmitted.
    pub fn wire_headers(&self) -> Vec<(u8, u8, MessageType)> {
        self.wire
            .iter()
            .map(|(from, packet)| (*from, packet.target_id, packet.message_type))
            .collect()
    }

    /// Panics unless the token is unique: at most one peer works it, or
    /// exactly two during an in-flight handoff (the offerer still in
    /// WAIT_RTS while its successor already answered with an RTS and
    /// moved to WAIT_CTS).
    pub fn assert_token_uniqueness(&self) {
        use dtr_ring::RxState;

        let holders: Vec<&Peer> = self
            .peers
            .iter()
            .filter(|peer| peer.engine.is_holder())
            .collect();
        match holders.len() {
            0 | 1 => {}
            2 => {
                let (offerer, successor) =
                    if holders[0].engine.rx_state() == RxState::WaitRts {
                        (holders[0], holders[1])
                    } else {
                        (holders[1], holders[0])
                    };
                assert_eq!(
                    offerer.engine.rx_state(),
                    RxState::WaitRts,
                    "two holders outside a handoff"
                );
                assert_eq!(
                    successor.engine.rx_state(),
                    RxState::WaitCts,
                    "two holders outside a handoff"
                );
                assert_eq!(
                    offerer.engine.next_node_id(),
                    successor.id,
                    "handoff between non-adjacent peers"
                );
            }
            _ => panic!(
                "token held by {:?}",
                holders.iter().map(|peer| peer.id).collect::<Vec<_>>()
            ),
        }
    }

    /// Drains a peer's RX-DATA queue into a payload list.
    pub fn delivered(&mut self, id: u8) -> Vec<Vec<u8>> {
        let rx_data = self.peer(id).rx_data.clone();
        let mut payloads = Vec::new();
        while let Some(packet) = rx_data.get(Duration::ZERO) {
            payloads.push(packet.data);
        }
        payloads
    }
}
