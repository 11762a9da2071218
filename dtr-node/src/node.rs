//! The host-facing node object: public API plus the engine task.

use crate::adapter::RadioAdapter;
use crate::Radio;
use dtr_proto::constants::{
    MAX_PAYLOAD_SIZE, RX_DATA_QUEUE_SIZE, RX_SRV_QUEUE_SIZE, TX_DATA_QUEUE_SIZE,
};
use dtr_proto::time::{SystemTimeProvider, TimeProvider};
use dtr_proto::{MessageType, Packet};
use dtr_ring::{PacketQueue, RadioInfo, RingConfig, RingEngine, RingError, Topology};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

struct Running<R: Radio> {
    adapter: Arc<RadioAdapter<R>>,
    rx_srv: Arc<PacketQueue>,
    tx_data: Arc<PacketQueue>,
    rx_data: Arc<PacketQueue>,
    engine_task: JoinHandle<()>,
}

/// One DTR peer bound to a broadcast radio.
///
/// Construct once per device; `enable_protocol` brings the ring up and
/// `disable_protocol` tears it down again. All methods are safe to call
/// from any thread.
pub struct DtrNode<R: Radio> {
    radio: Arc<R>,
    node_id: u8,
    config: RingConfig,
    time: Arc<dyn TimeProvider>,
    info: Arc<RadioInfo>,
    running: Mutex<Option<Running<R>>>,
}

impl<R: Radio + 'static> DtrNode<R> {
    pub fn new(radio: Arc<R>) -> DtrNode<R> {
        Self::with_config(radio, RingConfig::default())
    }

    pub fn with_config(radio: Arc<R>, config: RingConfig) -> DtrNode<R> {
        Self::with_time_provider(radio, config, Arc::new(SystemTimeProvider))
    }

    pub fn with_time_provider(
        radio: Arc<R>,
        config: RingConfig,
        time: Arc<dyn TimeProvider>,
    ) -> DtrNode<R> {
        let node_id = (radio.local_address() & 0xff) as u8;
        DtrNode {
            radio,
            node_id,
            config,
            time,
            info: Arc::new(RadioInfo::new(node_id)),
            running: Mutex::new(None),
        }
    }

    /// The ring ID of this device, derived from its radio address.
    pub fn self_id(&self) -> u8 {
        self.node_id
    }

    /// Brings the protocol up. With a topology the node starts in steady
    /// state (and, as the first member, opens the ring); without one it
    /// enters the discovery handshake.
    pub fn enable_protocol(&self, topology: Option<Topology>) -> Result<(), RingError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(RingError::AlreadyRunning);
        }

        let tx_data = Arc::new(PacketQueue::new(TX_DATA_QUEUE_SIZE));
        let rx_srv = Arc::new(PacketQueue::new(RX_SRV_QUEUE_SIZE));
        let rx_data = Arc::new(PacketQueue::new(RX_DATA_QUEUE_SIZE));
        let adapter = Arc::new(RadioAdapter::new(self.radio.clone(), rx_srv.clone()));

        let engine = RingEngine::new(
            self.node_id,
            topology,
            self.config.clone(),
            tx_data.clone(),
            rx_data.clone(),
            self.info.clone(),
            self.time.now_instant(),
        );

        let engine_task = {
            let adapter = adapter.clone();
            let rx_srv = rx_srv.clone();
            let time = self.time.clone();
            std::thread::Builder::new()
                .name(format!("dtr-engine-{}", self.node_id))
                .spawn(move || run_engine(engine, rx_srv, adapter, time))
                .expect("failed to spawn engine task")
        };

        debug!(node_id = self.node_id, "protocol enabled");
        *running = Some(Running {
            adapter,
            rx_srv,
            tx_data,
            rx_data,
            engine_task,
        });
        Ok(())
    }

    /// Stops the engine task, then drains every queue.
    pub fn disable_protocol(&self) -> Result<(), RingError> {
        let running = self.running.lock().take().ok_or(RingError::NotRunning)?;

        running.rx_srv.close();
        if running.engine_task.join().is_err() {
            warn!(node_id = self.node_id, "engine task panicked");
        }
        running.tx_data.close();
        running.rx_data.close();
        running.tx_data.drain();
        running.rx_data.drain();
        running.rx_srv.drain();
        debug!(node_id = self.node_id, "protocol disabled");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Enqueues application data for transmission on the next token
    /// hold. The packet's type and source are overwritten; its target
    /// may be a peer ID or the broadcast address.
    pub fn send_packet(&self, mut packet: Packet) -> Result<(), RingError> {
        if packet.data.len() > MAX_PAYLOAD_SIZE {
            return Err(RingError::PayloadTooLarge(packet.data.len()));
        }
        packet.message_type = MessageType::Data;
        packet.source_id = self.node_id;

        let tx_data = {
            let running = self.running.lock();
            match running.as_ref() {
                Some(running) => running.tx_data.clone(),
                None => return Err(RingError::NotRunning),
            }
        };

        tx_data.put(packet).map_err(|err| {
            if err == RingError::QueueFull {
                self.info.record_tx_queue_full();
            }
            err
        })
    }

    /// Blocks until an acknowledged data frame arrives, up to `timeout`.
    pub fn get_packet(&self, timeout: Duration) -> Option<Packet> {
        let rx_data = {
            let running = self.running.lock();
            running.as_ref()?.rx_data.clone()
        };
        rx_data.get(timeout)
    }

    /// Host inbound callback: feed every received broadcast frame here.
    pub fn on_radio_frame(&self, frame: &[u8]) {
        let adapter = {
            let running = self.running.lock();
            match running.as_ref() {
                Some(running) => running.adapter.clone(),
                None => return,
            }
        };
        adapter.on_radio_frame(frame);
    }

    pub fn radio_info(&self) -> dtr_ring::RadioInfoSnapshot {
        self.info.snapshot()
    }

    pub fn reset_radio_info(&self) {
        self.info.reset();
    }

    /// Telemetry: the engine's receiver state as its wire value.
    pub fn rx_state(&self) -> u8 {
        self.info.rx_state()
    }

    /// Telemetry: the engine's transmitter state as its wire value.
    pub fn tx_state(&self) -> u8 {
        self.info.tx_state()
    }
}

/// The engine task: blocks on RX-SRV, bounded by the next timer
/// deadline, and broadcasts whatever the engine decides.
fn run_engine<R: Radio>(
    mut engine: RingEngine,
    rx_srv: Arc<PacketQueue>,
    adapter: Arc<RadioAdapter<R>>,
    time: Arc<dyn TimeProvider>,
) {
    let now = time.now_instant();
    for packet in engine.start(now) {
        adapter.send(&packet);
    }

    loop {
        let now = time.now_instant();
        let wait = engine.next_wakeup(now).saturating_duration_since(now);

        match rx_srv.get(wait) {
            Some(packet) => {
                for out in engine.handle_frame(packet, time.now_instant()) {
                    adapter.send(&out);
                }
            }
            None => {
                if rx_srv.is_closed() {
                    break;
                }
                for out in engine.poll(time.now_instant()) {
                    adapter.send(&out);
                }
            }
        }
    }
}
