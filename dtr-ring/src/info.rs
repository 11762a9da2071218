//! Protocol metadata counters, shared between the engine task and API
//! callers.
//!
//! All fields are single-word atomics so the engine can bump them from
//! its task while applications snapshot them from arbitrary threads.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Live counters plus the telemetry mirrors of the engine states.
#[derive(Debug, Default)]
pub struct RadioInfo {
    device_id: AtomicU8,
    sent_packets: AtomicU32,
    received_packets: AtomicU32,
    failed_rx_queue_full: AtomicU32,
    failed_tx_queue_full: AtomicU32,
    rts_timeouts: AtomicU32,
    token_timeouts: AtomicU32,
    data_timeouts: AtomicU32,
    rx_state: AtomicU8,
    tx_state: AtomicU8,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadioInfoSnapshot {
    pub device_id: u8,
    pub sent_packets: u32,
    pub received_packets: u32,
    pub failed_rx_queue_full: u32,
    pub failed_tx_queue_full: u32,
    pub rts_timeouts: u32,
    pub token_timeouts: u32,
    pub data_timeouts: u32,
}

impl RadioInfo {
    pub fn new(device_id: u8) -> RadioInfo {
        let info = RadioInfo::default();
        info.device_id.store(device_id, Ordering::Relaxed);
        info
    }

    pub fn record_sent(&self) {
        self.sent_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received_packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rx_queue_full(&self) {
        self.failed_rx_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_queue_full(&self) {
        self.failed_tx_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rts_timeout(&self) {
        self.rts_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_token_timeout(&self) {
        self.token_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_data_timeout(&self) {
        self.data_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Publishes the engine states for telemetry readers.
    pub fn publish_states(&self, rx_state: u8, tx_state: u8) {
        self.rx_state.store(rx_state, Ordering::Relaxed);
        self.tx_state.store(tx_state, Ordering::Relaxed);
    }

    pub fn rx_state(&self) -> u8 {
        self.rx_state.load(Ordering::Relaxed)
    }

    pub fn tx_state(&self) -> u8 {
        self.tx_state.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> RadioInfoSnapshot {
        RadioInfoSnapshot {
            device_id: self.device_id.load(Ordering::Relaxed),
            sent_packets: self.sent_packets.load(Ordering::Relaxed),
            received_packets: self.received_packets.load(Ordering::Relaxed),
            failed_rx_queue_full: self.failed_rx_queue_full.load(Ordering::Relaxed),
            failed_tx_queue_full: self.failed_tx_queue_full.load(Ordering::Relaxed),
            rts_timeouts: self.rts_timeouts.load(Ordering::Relaxed),
            token_timeouts: self.token_timeouts.load(Ordering::Relaxed),
            data_timeouts: self.data_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Clears every counter. The device ID and state mirrors persist.
    pub fn reset(&self) {
        self.sent_packets.store(0, Ordering::Relaxed);
        self.received_packets.store(0, Ordering::Relaxed);
        self.failed_rx_queue_full.store(0, Ordering::Relaxed);
        self.failed_tx_queue_full.store(0, Ordering::Relaxed);
        self.rts_timeouts.store(0, Ordering::Relaxed);
        self.token_timeouts.store(0, Ordering::Relaxed);
        self.data_timeouts.store(0, Ordering::Relaxed);
    }
}
