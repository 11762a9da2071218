//! Glue between the broadcast radio and the engine's service queue.
//!
//! Outbound: serialize and hand to the radio. Inbound: decode, filter
//! the crudest duplicates, enqueue into RX-SRV.

use crate::Radio;
use dtr_proto::{MessageType, Packet};
use dtr_ring::PacketQueue;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{trace, warn};

/// Radio-facing side of a running node.
pub struct RadioAdapter<R: Radio> {
    radio: Arc<R>,
    rx_srv: Arc<PacketQueue>,
    /// Header key of the frame most recently enqueued. This is a
    /// single-slot filter against back-to-back repeats of one frame, not
    /// a sliding-window deduper; end-to-end dedup additionally relies on
    /// the engine's last-source check.
    last_enqueued: Mutex<Option<(MessageType, u8, u8)>>,
}

impl<R: Radio> RadioAdapter<R> {
    pub fn new(radio: Arc<R>, rx_srv: Arc<PacketQueue>) -> RadioAdapter<R> {
        RadioAdapter {
            radio,
            rx_srv,
            last_enqueued: Mutex::new(None),
        }
    }

    /// Serializes and broadcasts one frame. Radio failures are logged
    /// and swallowed; the retransmission timers cover the loss.
    pub fn send(&self, packet: &Packet) {
        if let Err(err) = self.radio.broadcast(&packet.encode()) {
            warn!(packet = %packet, error = %err, "broadcast failed");
        }
    }

    /// Inbound radio callback: decode, dedup, enqueue. May run in
    /// driver/interrupt context; it only touches the queue.
    pub fn on_radio_frame(&self, frame: &[u8]) {
        let packet = match Packet::decode(frame) {
            Ok(packet) => packet,
            Err(err) => {
                trace!(error = %err, "dropping malformed frame");
                return;
            }
        };

        // Discovery announcements repeat by design and carry a growing
        // payload under an identical header; they skip the filter.
        if packet.message_type == MessageType::Handshake {
            if self.rx_srv.put(packet).is_err() {
                trace!("RX-SRV full, handshake frame dropped");
            }
            return;
        }

        let key = (packet.message_type, packet.source_id, packet.target_id);
        let mut last = self.last_enqueued.lock();
        if *last == Some(key) && !self.rx_srv.is_empty() {
            trace!(packet = %packet, "duplicate broadcast dropped");
            return;
        }
        if self.rx_srv.put(packet).is_ok() {
            *last = Some(key);
        } else {
            trace!("RX-SRV full, frame dropped");
        }
    }
}
