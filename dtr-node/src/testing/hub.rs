//! A virtual broadcast channel for protocol tests.
//!
//! Every frame a registered radio transmits is delivered to every other
//! registered radio, mimicking the single shared channel of the real
//! hardware. Impairments are deterministic: a drop rule swallows the
//! next N frames matching a header pattern, so loss scenarios replay
//! identically on every run.

use crate::{Radio, RadioError};
use crossbeam::channel::{unbounded, Receiver, Sender};
use dtr_proto::{MessageType, Packet};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One transmission as observed on the channel, in order.
#[derive(Debug, Clone)]
pub struct WireRecord {
    pub from: u64,
    pub packet: Packet,
    /// Whether a drop rule swallowed the frame before delivery.
    pub dropped: bool,
}

struct DropRule {
    message_type: MessageType,
    source_id: u8,
    remaining: u32,
}

/// The shared broadcast channel.
pub struct VirtualRadioHub {
    nodes: Mutex<HashMap<u64, Sender<Vec<u8>>>>,
    drops: Mutex<Vec<DropRule>>,
    wire: Mutex<Vec<WireRecord>>,
}

impl Default for VirtualRadioHub {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualRadioHub {
    pub fn new() -> VirtualRadioHub {
        VirtualRadioHub {
            nodes: Mutex::new(HashMap::new()),
            drops: Mutex::new(Vec::new()),
            wire: Mutex::new(Vec::new()),
        }
    }

    /// Registers a radio address and returns the receiver for frames
    /// addressed to the channel.
    pub fn register(&self, address: u64) -> Receiver<Vec<u8>> {
        let (tx, rx) = unbounded();
        self.nodes.lock().insert(address, tx);
        rx
    }

    /// Removes a radio from the channel, closing its receiver.
    pub fn unregister(&self, address: u64) {
        self.nodes.lock().remove(&address);
    }

    /// Swallows the next `count` frames of `message_type` sent by
    /// `source_id`.
    pub fn drop_next(&self, message_type: MessageType, source_id: u8, count: u32) {
        self.drops.lock().push(DropRule {
            message_type,
            source_id,
            remaining: count,
        });
    }

    /// Everything transmitted so far, including dropped frames.
    pub fn wire_log(&self) -> Vec<WireRecord> {
        self.wire.lock().clone()
    }

    fn should_drop(&self, packet: &Packet) -> bool {
        let mut drops = self.drops.lock();
        for rule in drops.iter_mut() {
            if rule.remaining > 0
                && rule.message_type == packet.message_type
                && rule.source_id == packet.source_id
            {
                rule.remaining -= 1;
                return true;
            }
        }
        false
    }

    /// Broadcasts one frame from `from` to every other registered radio.
    pub fn broadcast(&self, from: u64, frame: &[u8]) {
        let dropped = match Packet::decode(frame) {
            Ok(packet) => {
                let dropped = self.should_drop(&packet);
                self.wire.lock().push(WireRecord {
                    from,
                    packet,
                    dropped,
                });
                dropped
            }
            Err(_) => false,
        };
        if dropped {
            return;
        }

        let nodes = self.nodes.lock();
        for (&address, tx) in nodes.iter() {
            if address != from {
                let _ = tx.send(frame.to_vec());
            }
        }
    }
}

/// A radio attached to a [`VirtualRadioHub`].
pub struct SimulatedRadio {
    address: u64,
    hub: Arc<VirtualRadioHub>,
}

impl SimulatedRadio {
    pub fn new(address: u64, hub: Arc<VirtualRadioHub>) -> SimulatedRadio {
        SimulatedRadio { address, hub }
    }
}

impl Radio for SimulatedRadio {
    fn local_address(&self) -> u64 {
        self.address
    }

    fn broadcast(&self, frame: &[u8]) -> Result<(), RadioError> {
        self.hub.broadcast(self.address, frame);
        Ok(())
    }
}
