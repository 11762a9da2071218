//! The DTR protocol engine: one state machine per node, owned by a
//! single task.
//!
//! The engine reacts to two stimuli only: an inbound frame
//! ([`RingEngine::handle_frame`]) and the passage of time
//! ([`RingEngine::poll`]). Both return the frames to broadcast in
//! response; the caller owns the radio. [`RingEngine::next_wakeup`]
//! bounds how long the caller may sleep before the next `poll`.

use crate::discovery::{Discovery, DiscoveryPoll};
use crate::info::RadioInfo;
use crate::queue::PacketQueue;
use crate::spammer::Spammer;
use crate::topology::Topology;
use dtr_proto::constants::{
    BROADCAST_ID, HANDSHAKE_PERIOD_MS, HANDSHAKE_TIMEOUT_MS, INVALID_ID,
    MAX_WAIT_TIME_FOR_CTS_MS, MAX_WAIT_TIME_FOR_DATA_ACK_MS, MAX_WAIT_TIME_FOR_RTS_MS,
    PROTOCOL_TIMEOUT_MS, TX_RECEIVED_WAIT_TIME_MS,
};
use dtr_proto::{MessageType, Packet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Receiver states of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RxState {
    Handshake = 0,
    Idle = 1,
    WaitCts = 2,
    WaitRts = 3,
    WaitDataAck = 4,
}

/// Intent of the most recently started transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TxState {
    Token = 0,
    Rts = 1,
    Cts = 2,
    DataFrame = 3,
    DataAck = 4,
}

/// Runtime-tunable timing. Defaults come from the protocol constants;
/// every peer of a ring must agree on the spam periods.
#[derive(Debug, Clone)]
pub struct RingConfig {
    pub wait_for_cts: Duration,
    pub wait_for_rts: Duration,
    pub wait_for_data_ack: Duration,
    pub protocol_timeout: Duration,
    pub handshake_timeout: Duration,
    pub handshake_period: Duration,
    pub tx_poll_wait: Duration,
}

impl Default for RingConfig {
    fn default() -> Self {
        RingConfig {
            wait_for_cts: Duration::from_millis(MAX_WAIT_TIME_FOR_CTS_MS),
            wait_for_rts: Duration::from_millis(MAX_WAIT_TIME_FOR_RTS_MS),
            wait_for_data_ack: Duration::from_millis(MAX_WAIT_TIME_FOR_DATA_ACK_MS),
            protocol_timeout: Duration::from_millis(PROTOCOL_TIMEOUT_MS),
            handshake_timeout: Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
            handshake_period: Duration::from_millis(HANDSHAKE_PERIOD_MS),
            tx_poll_wait: Duration::from_millis(TX_RECEIVED_WAIT_TIME_MS),
        }
    }
}

/// The frame currently awaiting its DATA_ACK.
#[derive(Debug, Clone)]
struct InFlight {
    packet: Packet,
    /// Whether the frame originated from the TX-DATA queue and must be
    /// released once fully acknowledged.
    from_queue: bool,
    /// Whether the frame visits every ring peer before the token moves.
    fan_out: bool,
}

/// Protocol state machine of one ring member.
pub struct RingEngine {
    node_id: u8,
    config: RingConfig,

    topology: Topology,
    next_node_id: u8,
    prev_node_id: u8,

    rx_state: RxState,
    tx_state: TxState,

    /// Source of the last accepted data frame; suppresses re-delivery
    /// when a lost ACK makes the sender repeat itself.
    last_packet_source_id: u8,
    /// Progress marker of a broadcast fan-out.
    next_sender_id: Option<u8>,
    in_flight: Option<InFlight>,

    /// Where the token was last observed on the wire.
    node_with_token: Option<u8>,
    /// First stage of the two-phase idle-timeout policy.
    has_been_timed_out: bool,

    received_any: bool,
    last_rx: Instant,

    spammer: Spammer,
    discovery: Option<Discovery>,

    tx_data: Arc<PacketQueue>,
    rx_data: Arc<PacketQueue>,
    info: Arc<RadioInfo>,
}

impl RingEngine {
    /// Builds an engine. A provided topology starts the node in steady
    /// state; without one the node enters the handshake phase.
    pub fn new(
        node_id: u8,
        topology: Option<Topology>,
        config: RingConfig,
        tx_data: Arc<PacketQueue>,
        rx_data: Arc<PacketQueue>,
        info: Arc<RadioInfo>,
        now: Instant,
    ) -> RingEngine {
        let discovery = match &topology {
            Some(_) => None,
            None => Some(Discovery::new(
                node_id,
                config.handshake_period,
                config.handshake_timeout,
                now,
            )),
        };

        let mut engine = RingEngine {
            node_id,
            config,
            topology: Topology::default(),
            next_node_id: INVALID_ID,
            prev_node_id: INVALID_ID,
            rx_state: if discovery.is_some() {
                RxState::Handshake
            } else {
                RxState::Idle
            },
            tx_state: TxState::Token,
            last_packet_source_id: node_id,
            next_sender_id: None,
            in_flight: None,
            node_with_token: None,
            has_been_timed_out: false,
            received_any: false,
            last_rx: now,
            spammer: Spammer::new(),
            discovery,
            tx_data,
            rx_data,
            info,
        };

        if let Some(topology) = topology {
            engine.install_topology(topology);
        }
        engine.sync_telemetry();
        engine
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    pub fn rx_state(&self) -> RxState {
        self.rx_state
    }

    pub fn tx_state(&self) -> TxState {
        self.tx_state
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn next_node_id(&self) -> u8 {
        self.next_node_id
    }

    pub fn prev_node_id(&self) -> u8 {
        self.prev_node_id
    }

    /// True while this node is working the token (property: at most one
    /// node per ring under lossless delivery).
    pub fn is_holder(&self) -> bool {
        matches!(
            self.rx_state,
            RxState::WaitCts | RxState::WaitRts | RxState::WaitDataAck
        )
    }

    /// Kicks the protocol off. In static mode the first topology member
    /// opens the ring by sending either the head of its TX-DATA queue or
    /// a header-only start marker; in dynamic mode the first discovery
    /// announcement goes out.
    pub fn start(&mut self, now: Instant) -> Vec<Packet> {
        if self.discovery.is_some() {
            return self.poll(now);
        }

        if self.topology.ids().first() != Some(&self.node_id) {
            return Vec::new();
        }
        if self.next_node_id == INVALID_ID || self.topology.len() < 2 {
            warn!("cannot start a ring without peers");
            return Vec::new();
        }

        let packet = match self.pick_tx_data() {
            Some(packet) => packet,
            None => {
                // Nothing queued yet: a header-only marker drives the
                // first ACK/token exchange. Receivers never deliver it.
                let marker =
                    Packet::service(MessageType::Data, self.node_id, self.next_node_id);
                self.in_flight = Some(InFlight {
                    packet: marker.clone(),
                    from_queue: false,
                    fan_out: false,
                });
                marker
            }
        };

        debug!(packet = %packet, "opening the ring");
        let out = vec![self.setup_tx(packet, TxState::DataFrame, now)];
        self.sync_telemetry();
        out
    }

    /// Reacts to one inbound frame, in arrival order.
    pub fn handle_frame(&mut self, packet: Packet, now: Instant) -> Vec<Packet> {
        self.received_any = true;
        self.last_rx = now;
        self.info.record_received();
        self.observe_token(&packet);

        trace!(packet = %packet, rx_state = ?self.rx_state, "inbound frame");

        let mut out = Vec::new();
        match self.rx_state {
            RxState::Handshake => self.on_handshake_frame(packet, now, &mut out),
            RxState::Idle => self.on_idle_frame(packet, now, &mut out),
            RxState::WaitCts => self.on_wait_cts_frame(packet, now, &mut out),
            RxState::WaitRts => self.on_wait_rts_frame(packet, now, &mut out),
            RxState::WaitDataAck => self.on_wait_data_ack_frame(packet, now, &mut out),
        }
        self.sync_telemetry();
        out
    }

    /// Fires any elapsed deadline: discovery announcements and election,
    /// spam retransmissions, and the protocol silence timeout.
    pub fn poll(&mut self, now: Instant) -> Vec<Packet> {
        let mut out = Vec::new();

        if let Some(discovery) = self.discovery.as_mut() {
            let action = discovery.poll(now);
            match action {
                DiscoveryPoll::Pending => {}
                DiscoveryPoll::Announce(packet) => {
                    self.info.record_sent();
                    out.push(packet);
                }
                DiscoveryPoll::Elected(candidate) => {
                    self.discovery = None;
                    self.install_topology(candidate);
                    out.extend(self.reconfigure(None, now));
                }
                DiscoveryPoll::Demoted => {
                    self.discovery = None;
                    self.rx_state = RxState::Idle;
                }
            }
            self.sync_telemetry();
            return out;
        }

        if let Some(packet) = self.spammer.poll(now) {
            match self.tx_state {
                TxState::Rts => self.info.record_rts_timeout(),
                TxState::Token => self.info.record_token_timeout(),
                TxState::DataFrame => self.info.record_data_timeout(),
                _ => {}
            }
            trace!(packet = %packet, "retransmitting");
            self.info.record_sent();
            out.push(packet);
        }

        if now.duration_since(self.last_rx) >= self.config.protocol_timeout {
            self.last_rx = now;
            out.extend(self.on_protocol_timeout(now));
        }

        self.sync_telemetry();
        out
    }

    /// The earliest instant at which `poll` has work to do.
    pub fn next_wakeup(&self, now: Instant) -> Instant {
        if let Some(discovery) = &self.discovery {
            return discovery.next_wakeup();
        }
        let mut wakeup = self.last_rx + self.config.protocol_timeout;
        if let Some(fire) = self.spammer.next_fire() {
            wakeup = wakeup.min(fire);
        }
        wakeup.max(now)
    }

    // --- frame handlers ---

    fn on_handshake_frame(&mut self, packet: Packet, now: Instant, out: &mut Vec<Packet>) {
        match packet.message_type {
            MessageType::Handshake => {
                if let Some(announced) = Topology::from_payload(&packet.data) {
                    if let Some(discovery) = self.discovery.as_mut() {
                        discovery.learn(announced.ids(), now);
                    }
                }
            }
            // A reconfig reaching a node still in discovery means the
            // ring has already settled around a leader; join it.
            MessageType::TopologyReconfig if packet.target_id == self.node_id => {
                self.discovery = None;
                self.accept_reconfig(packet, now, out);
            }
            _ => trace!(packet = %packet, "dropped during handshake"),
        }
    }

    fn on_idle_frame(&mut self, packet: Packet, now: Instant, out: &mut Vec<Packet>) {
        match packet.message_type {
            MessageType::Data if packet.target_id == self.node_id => {
                if packet.source_id != self.last_packet_source_id {
                    self.last_packet_source_id = packet.source_id;
                    // An empty payload is the ring-start marker, not data.
                    if !packet.data.is_empty() {
                        if self.rx_data.put(packet.clone()).is_err() {
                            self.info.record_rx_queue_full();
                            debug!("RX-DATA full, dropping payload");
                        }
                    }
                }
                // Always acknowledged, even duplicates: the sender keeps
                // repeating until it hears this.
                let ack =
                    Packet::service(MessageType::DataAck, self.node_id, packet.source_id);
                out.push(self.setup_tx(ack, TxState::DataAck, now));
            }
            MessageType::Token if packet.source_id == self.prev_node_id => {
                let rts = Packet::service(MessageType::Rts, self.node_id, self.prev_node_id);
                out.push(self.setup_tx(rts, TxState::Rts, now));
            }
            MessageType::Rts if packet.source_id == self.next_node_id => {
                let cts = Packet::service(MessageType::Cts, self.node_id, self.next_node_id);
                out.push(self.setup_tx(cts, TxState::Cts, now));
            }
            MessageType::TopologyReconfig if packet.target_id == self.node_id => {
                self.accept_reconfig(packet, now, out);
            }
            _ => trace!(packet = %packet, "dropped in idle"),
        }
    }

    fn on_wait_cts_frame(&mut self, packet: Packet, now: Instant, out: &mut Vec<Packet>) {
        if packet.message_type != MessageType::Cts || packet.source_id != self.prev_node_id {
            trace!(packet = %packet, "dropped while waiting for CTS");
            return;
        }
        self.spammer.stop();
        // Opens a fresh dedup window for the coming round trip.
        self.last_packet_source_id = self.node_id;

        match self.pick_tx_data() {
            Some(packet) => out.push(self.setup_tx(packet, TxState::DataFrame, now)),
            None => out.push(self.forward_token(now)),
        }
    }

    fn on_wait_rts_frame(&mut self, packet: Packet, now: Instant, out: &mut Vec<Packet>) {
        if packet.message_type != MessageType::Rts || packet.source_id != self.next_node_id {
            trace!(packet = %packet, "dropped while waiting for RTS");
            return;
        }
        self.spammer.stop();
        let cts = Packet::service(MessageType::Cts, self.node_id, self.next_node_id);
        out.push(self.setup_tx(cts, TxState::Cts, now));
    }

    fn on_wait_data_ack_frame(&mut self, packet: Packet, now: Instant, out: &mut Vec<Packet>) {
        if packet.message_type != MessageType::DataAck || packet.target_id != self.node_id {
            trace!(packet = %packet, "dropped while waiting for DATA_ACK");
            return;
        }
        self.spammer.stop();

        let mut in_flight = match self.in_flight.take() {
            Some(in_flight) => in_flight,
            None => {
                warn!("DATA_ACK with no frame in flight");
                out.push(self.forward_token(now));
                return;
            }
        };

        let anchor = self.next_sender_id.unwrap_or(self.node_id);
        let next_target = self.topology.next(anchor);

        if !in_flight.fan_out || next_target == self.node_id || next_target == INVALID_ID {
            if in_flight.from_queue {
                self.tx_data.release();
            }
            out.push(self.forward_token(now));
        } else {
            in_flight.packet.target_id = next_target;
            self.next_sender_id = Some(next_target);
            let packet = in_flight.packet.clone();
            self.in_flight = Some(in_flight);
            out.push(self.setup_tx(packet, TxState::DataFrame, now));
        }
    }

    // --- transmit paths ---

    /// Common transmit setup: records the intent, derives the follow-up
    /// receiver state, arms the retransmission timer for frames that
    /// expect an answer, and counts the send.
    fn setup_tx(&mut self, packet: Packet, tx_state: TxState, now: Instant) -> Packet {
        self.tx_state = tx_state;
        match tx_state {
            TxState::DataAck | TxState::Cts => {
                self.rx_state = RxState::Idle;
            }
            TxState::Rts => {
                self.rx_state = RxState::WaitCts;
                self.spammer
                    .start(packet.clone(), self.config.wait_for_cts, now);
            }
            TxState::Token => {
                self.rx_state = RxState::WaitRts;
                self.spammer
                    .start(packet.clone(), self.config.wait_for_rts, now);
            }
            TxState::DataFrame => {
                self.rx_state = RxState::WaitDataAck;
                self.spammer
                    .start(packet.clone(), self.config.wait_for_data_ack, now);
            }
        }
        trace!(packet = %packet, tx_state = ?tx_state, rx_state = ?self.rx_state, "transmit");
        self.info.record_sent();
        packet
    }

    /// Inspects the head of TX-DATA and prepares it for transmission:
    /// broadcasts start their fan-out at the successor, unreachable
    /// targets are discarded.
    fn pick_tx_data(&mut self) -> Option<Packet> {
        let mut packet = self.tx_data.peek(self.config.tx_poll_wait)?;
        packet.message_type = MessageType::Data;
        packet.source_id = self.node_id;

        if packet.target_id == BROADCAST_ID {
            packet.target_id = self.next_node_id;
            self.next_sender_id = Some(self.next_node_id);
            self.in_flight = Some(InFlight {
                packet: packet.clone(),
                from_queue: true,
                fan_out: true,
            });
            Some(packet)
        } else if packet.target_id != self.node_id && self.topology.contains(packet.target_id) {
            self.in_flight = Some(InFlight {
                packet: packet.clone(),
                from_queue: true,
                fan_out: false,
            });
            Some(packet)
        } else {
            debug!(target = packet.target_id, "target not in ring, dropping frame");
            self.tx_data.release();
            None
        }
    }

    fn forward_token(&mut self, now: Instant) -> Packet {
        self.next_sender_id = None;
        self.in_flight = None;
        let token = Packet::service(MessageType::Token, self.node_id, self.next_node_id);
        self.setup_tx(token, TxState::Token, now)
    }

    // --- membership changes ---

    /// Installs a topology received in a TOPOLOGY_RECONFIG frame and
    /// acknowledges it. Duplicate distributions (the sender's retry
    /// timer) are detected by the same last-source rule as data and are
    /// only re-acknowledged.
    fn accept_reconfig(&mut self, packet: Packet, now: Instant, out: &mut Vec<Packet>) {
        let new_topology = match Topology::from_payload(&packet.data) {
            Some(topology) => topology,
            None => {
                warn!(packet = %packet, "malformed topology payload");
                return;
            }
        };

        if packet.source_id != self.last_packet_source_id {
            self.last_packet_source_id = packet.source_id;
            debug!(ids = ?new_topology.ids(), "installing distributed topology");
            self.install_topology(new_topology);
            self.has_been_timed_out = false;
            self.node_with_token = Some(packet.source_id);

            // Queue a small reply so traffic probes the new ring.
            let reply = Packet::new(
                MessageType::Data,
                self.node_id,
                packet.source_id,
                vec![self.node_id],
            );
            if self.tx_data.put(reply).is_err() {
                self.info.record_tx_queue_full();
            }
        }

        let ack = Packet::service(MessageType::DataAck, self.node_id, packet.source_id);
        out.push(self.setup_tx(ack, TxState::DataAck, now));
    }

    /// Distributes the current topology to every surviving peer,
    /// removing `lost` first when given. The distribution travels as an
    /// acknowledged fan-out, exactly like a broadcast data frame.
    fn reconfigure(&mut self, lost: Option<u8>, now: Instant) -> Vec<Packet> {
        if let Some(lost_id) = lost {
            debug!(peer = lost_id, "removing unresponsive peer");
            self.topology.remove(lost_id);
            self.refresh_neighbors();
        }

        if self.topology.len() <= 1 || self.next_node_id == INVALID_ID {
            warn!("ring collapsed, returning to idle");
            self.reset_protocol();
            return Vec::new();
        }

        self.spammer.stop();
        self.has_been_timed_out = false;
        self.node_with_token = Some(self.node_id);

        let first = self.next_node_id;
        let reconfig = Packet::new(
            MessageType::TopologyReconfig,
            self.node_id,
            first,
            self.topology.to_payload(),
        );
        self.next_sender_id = Some(first);
        self.in_flight = Some(InFlight {
            packet: reconfig.clone(),
            from_queue: false,
            fan_out: true,
        });

        // Stale traffic refers to the old ring; replace it with a probe
        // for the new one.
        self.tx_data.drain();
        self.rx_data.drain();
        let probe = Packet::new(MessageType::Data, self.node_id, BROADCAST_ID, vec![self.node_id]);
        if self.tx_data.put(probe).is_err() {
            self.info.record_tx_queue_full();
        }

        debug!(ids = ?self.topology.ids(), "distributing topology");
        vec![self.setup_tx(reconfig, TxState::DataFrame, now)]
    }

    fn on_protocol_timeout(&mut self, now: Instant) -> Vec<Packet> {
        if self.received_any && self.is_holder() {
            // This node holds the token; the peer it is waiting on is gone.
            let lost = match self.rx_state {
                RxState::WaitCts => self.prev_node_id,
                _ => self.next_sender_id.unwrap_or(self.next_node_id),
            };
            warn!(peer = lost, rx_state = ?self.rx_state, "peer unresponsive");
            if self.topology.len() > 2 {
                return self.reconfigure(Some(lost), now);
            }
            self.reset_protocol();
            return Vec::new();
        }

        if self.rx_state != RxState::Idle {
            // Never heard anyone; keep spamming rather than reshaping a
            // ring this node has no evidence about.
            return Vec::new();
        }

        if !self.has_been_timed_out {
            debug!("silent ring, resetting");
            self.has_been_timed_out = true;
            self.reset_protocol();
            return Vec::new();
        }

        // Second consecutive silence: the observed holder died. Its
        // predecessor reshapes the ring; failing that predicate, the
        // lowest surviving ID claims the token outright.
        match self.node_with_token {
            Some(holder) if self.topology.prev(holder) == self.node_id => {
                warn!(peer = holder, "token holder lost, reconfiguring");
                self.reconfigure(Some(holder), now)
            }
            Some(holder) => {
                let lowest_survivor = self
                    .topology
                    .ids()
                    .iter()
                    .copied()
                    .filter(|&id| id != holder)
                    .min();
                if lowest_survivor == Some(self.node_id) {
                    warn!("claiming the token as lowest surviving node");
                    self.reconfigure(None, now)
                } else {
                    self.reset_protocol();
                    Vec::new()
                }
            }
            None => {
                self.reset_protocol();
                Vec::new()
            }
        }
    }

    // --- helpers ---

    fn observe_token(&mut self, packet: &Packet) {
        match packet.message_type {
            MessageType::Token => {
                let offered_to = self.topology.next(packet.source_id);
                if offered_to != INVALID_ID {
                    self.node_with_token = Some(offered_to);
                }
            }
            MessageType::Rts => {
                self.node_with_token = Some(packet.source_id);
            }
            _ => {}
        }
    }

    fn install_topology(&mut self, topology: Topology) {
        self.topology.install(topology);
        self.refresh_neighbors();
    }

    fn refresh_neighbors(&mut self) {
        self.next_node_id = self.topology.next(self.node_id);
        self.prev_node_id = self.topology.prev(self.node_id);
        if self.next_node_id == INVALID_ID && !self.topology.is_empty() {
            warn!(ids = ?self.topology.ids(), "this node is not part of the ring");
        }
    }

    fn reset_protocol(&mut self) {
        self.spammer.stop();
        self.rx_state = RxState::Idle;
        self.in_flight = None;
        self.next_sender_id = None;
        self.last_packet_source_id = self.node_id;
    }

    fn sync_telemetry(&self) {
        self.info
            .publish_states(self.rx_state as u8, self.tx_state as u8);
    }
}
