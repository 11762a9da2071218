//! Bounded packet FIFOs connecting the application, the engine and the
//! radio adapter.
//!
//! Three instances exist per node: TX-DATA (application -> engine),
//! RX-SRV (radio -> engine) and RX-DATA (engine -> application).
//! Producers never block: a full queue is reported back immediately.
//! Consumers block with an explicit timeout, and `close` wakes them for
//! teardown.

use crate::error::RingError;
use dtr_proto::Packet;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

struct Inner {
    items: VecDeque<Packet>,
    closed: bool,
}

/// A fixed-capacity FIFO of packets, safe for concurrent producers and
/// one consumer.
pub struct PacketQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> PacketQueue {
        PacketQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Non-blocking enqueue. Fails with `QueueFull` at capacity and
    /// `NotRunning` after `close`.
    pub fn put(&self, packet: Packet) -> Result<(), RingError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(RingError::NotRunning);
        }
        if inner.items.len() >= self.capacity {
            return Err(RingError::QueueFull);
        }
        inner.items.push_back(packet);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Dequeues the head, blocking up to `timeout`. Returns `None` on
    /// timeout or once the queue is closed and empty.
    pub fn get(&self, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(packet) = inner.items.pop_front() {
                return Some(packet);
            }
            if inner.closed {
                return None;
            }
            if self
                .available
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return inner.items.pop_front();
            }
        }
    }

    /// Like `get` but leaves the head in place.
    pub fn peek(&self, timeout: Duration) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(packet) = inner.items.front() {
                return Some(packet.clone());
            }
            if inner.closed {
                return None;
            }
            if self
                .available
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                return inner.items.front().cloned();
            }
        }
    }

    /// Drops the head without returning it. No-op on an empty queue.
    pub fn release(&self) {
        self.inner.lock().items.pop_front();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }

    /// Removes every queued packet.
    pub fn drain(&self) {
        self.inner.lock().items.clear();
    }

    /// Marks the queue closed and wakes blocked consumers. Subsequent
    /// puts fail; gets return the remaining items, then `None`.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}
