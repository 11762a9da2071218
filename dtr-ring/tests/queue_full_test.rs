mod common;

use common::Sim;
use dtr_proto::constants::{RX_DATA_QUEUE_SIZE, TX_DATA_QUEUE_SIZE};
use dtr_proto::{MessageType, Packet};
use dtr_ring::RingError;

#[test]
fn test_tx_queue_full_is_reported_to_the_producer() {
    let mut sim = Sim::new_static(&[0, 1]);
    for tag in 0..TX_DATA_QUEUE_SIZE as u8 {
        sim.enqueue(0, 1, &[tag]);
    }
    let overflow = Packet::new(MessageType::Data, 0, 1, vec![99]);
    assert_eq!(
        sim.peer(0).tx_data.put(overflow),
        Err(RingError::QueueFull)
    );
    assert_eq!(sim.peer(0).tx_data.len(), TX_DATA_QUEUE_SIZE);
}

#[test]
fn test_rx_queue_full_drops_but_still_acknowledges() {
    let mut sim = Sim::new_static(&[0, 1]);

    // Saturate the receiver's application queue.
    for tag in 0..RX_DATA_QUEUE_SIZE as u8 {
        let filler = Packet::new(MessageType::Data, 7, 1, vec![tag]);
        sim.peer(1).rx_data.put(filler).unwrap();
    }

    sim.enqueue(0, 1, &[42]);
    sim.start();
    sim.run(4);

    // The frame was acknowledged on the wire regardless of the drop.
    let wire = sim.wire_headers();
    assert_eq!(wire[0], (0, 1, MessageType::Data));
    assert_eq!(wire[1], (1, 0, MessageType::DataAck));

    // Queue size unchanged, failure counted, payload lost.
    assert_eq!(sim.peer(1).rx_data.len(), RX_DATA_QUEUE_SIZE);
    assert_eq!(sim.peer(1).info.snapshot().failed_rx_queue_full, 1);
    let delivered = sim.delivered(1);
    assert!(!delivered.contains(&vec![42]));
}
