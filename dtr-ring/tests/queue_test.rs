use dtr_proto::{MessageType, Packet};
use dtr_ring::{PacketQueue, RingError};
use std::sync::Arc;
use std::time::Duration;

fn packet(tag: u8) -> Packet {
    Packet::new(MessageType::Data, 1, 2, vec![tag])
}

#[test]
fn test_fifo_order() {
    let queue = PacketQueue::new(4);
    for tag in 0..4 {
        queue.put(packet(tag)).unwrap();
    }
    for tag in 0..4 {
        assert_eq!(queue.get(Duration::ZERO).unwrap().data, vec![tag]);
    }
    assert_eq!(queue.get(Duration::ZERO), None);
}

#[test]
fn test_put_fails_at_capacity() {
    let queue = PacketQueue::new(2);
    queue.put(packet(0)).unwrap();
    queue.put(packet(1)).unwrap();
    assert_eq!(queue.put(packet(2)), Err(RingError::QueueFull));
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_peek_is_non_destructive() {
    let queue = PacketQueue::new(2);
    queue.put(packet(7)).unwrap();
    assert_eq!(queue.peek(Duration::ZERO).unwrap().data, vec![7]);
    assert_eq!(queue.peek(Duration::ZERO).unwrap().data, vec![7]);
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_release_discards_head() {
    let queue = PacketQueue::new(2);
    queue.put(packet(1)).unwrap();
    queue.put(packet(2)).unwrap();
    queue.release();
    assert_eq!(queue.get(Duration::ZERO).unwrap().data, vec![2]);
    // Releasing an empty queue is a no-op.
    queue.release();
    assert!(queue.is_empty());
}

#[test]
fn test_drain_empties_the_queue() {
    let queue = PacketQueue::new(4);
    for tag in 0..3 {
        queue.put(packet(tag)).unwrap();
    }
    queue.drain();
    assert!(queue.is_empty());
    assert_eq!(queue.get(Duration::ZERO), None);
}

#[test]
fn test_get_times_out_on_empty_queue() {
    let queue = PacketQueue::new(2);
    let started = std::time::Instant::now();
    assert_eq!(queue.get(Duration::from_millis(30)), None);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_get_wakes_on_put_from_other_thread() {
    let queue = Arc::new(PacketQueue::new(2));
    let producer = {
        let queue = queue.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            queue.put(packet(9)).unwrap();
        })
    };
    let received = queue.get(Duration::from_secs(5));
    producer.join().unwrap();
    assert_eq!(received.unwrap().data, vec![9]);
}

#[test]
fn test_close_unblocks_consumer() {
    let queue = Arc::new(PacketQueue::new(2));
    let consumer = {
        let queue = queue.clone();
        std::thread::spawn(move || queue.get(Duration::from_secs(30)))
    };
    std::thread::sleep(Duration::from_millis(20));
    queue.close();
    assert_eq!(consumer.join().unwrap(), None);

    // Closed queues refuse producers but hand out leftovers.
    assert_eq!(queue.put(packet(1)), Err(RingError::NotRunning));
    assert!(queue.is_closed());
}
