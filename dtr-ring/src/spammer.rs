//! The sender timer: periodic retransmission of the last transmitted
//! frame until a response arrives.
//!
//! The broadcast medium has no link-layer acknowledgement, so any frame
//! that expects an answer is simply rebroadcast on a fixed period until
//! the higher-layer response cancels it. At most one frame is being
//! spammed at a time.

use dtr_proto::Packet;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
enum State {
    Idle,
    Running {
        packet: Packet,
        period: Duration,
        next_fire: Instant,
    },
}

/// Deadline-driven retransmission timer, polled by the engine task.
#[derive(Debug)]
pub struct Spammer {
    state: State,
}

impl Default for Spammer {
    fn default() -> Self {
        Self::new()
    }
}

impl Spammer {
    pub fn new() -> Spammer {
        Spammer { state: State::Idle }
    }

    /// Arms the timer with the frame to repeat. Starting while already
    /// running is ignored.
    pub fn start(&mut self, packet: Packet, period: Duration, now: Instant) {
        if let State::Running { packet: current, .. } = &self.state {
            debug!(current = %current, "sender timer already running");
            return;
        }
        self.state = State::Running {
            packet,
            period,
            next_fire: now + period,
        };
    }

    /// Cancels retransmission. Idempotent: stopping an idle timer does
    /// nothing.
    pub fn stop(&mut self) {
        self.state = State::Idle;
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// The frame currently being retransmitted, if any.
    pub fn packet(&self) -> Option<&Packet> {
        match &self.state {
            State::Running { packet, .. } => Some(packet),
            State::Idle => None,
        }
    }

    /// When the timer will next fire, if running.
    pub fn next_fire(&self) -> Option<Instant> {
        match &self.state {
            State::Running { next_fire, .. } => Some(*next_fire),
            State::Idle => None,
        }
    }

    /// Returns the frame to rebroadcast when the period has elapsed, and
    /// re-arms for the following period.
    pub fn poll(&mut self, now: Instant) -> Option<Packet> {
        match &mut self.state {
            State::Running {
                packet,
                period,
                next_fire,
            } if now >= *next_fire => {
                *next_fire += *period;
                Some(packet.clone())
            }
            _ => None,
        }
    }
}
