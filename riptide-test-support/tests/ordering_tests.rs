//! Ordering and boundary tests: wrap behaviour, contiguity under
//! multi-producer commits, and producer liveness at the capacity edge.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use riptide::{
    BatchEventProcessor, BusySpinWaitStrategy, RiptideError, RingBuffer, Sequence,
    YieldingWaitStrategy,
};
use riptide_test_support::{CountingHandler, RecordingHandler, SequenceChecker, TaggedEvent};

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(start.elapsed() < deadline, "condition not reached in time");
        thread::yield_now();
    }
}

fn roundtrip_through_capacity(capacity: usize) {
    let ring = Arc::new(
        RingBuffer::single_producer(
            capacity,
            Arc::new(YieldingWaitStrategy::new()),
            TaggedEvent::default,
        )
        .unwrap(),
    );
    let barrier = Arc::new(ring.new_barrier(vec![]));

    let handler = CountingHandler::new();
    let count = handler.count();
    let sum = handler.sum();
    let last = handler.last_sequence();

    let mut processor = BatchEventProcessor::new(ring.clone(), barrier, handler);
    ring.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();
    let consumer = thread::spawn(move || processor.run().unwrap());

    // Several laps through the ring regardless of capacity.
    let total = (capacity * 3).max(16) as i64;
    for i in 1..=total {
        ring.publish_event(|event, _| event.value = i);
    }

    wait_until(Duration::from_secs(10), || {
        last.load(Ordering::Acquire) == total - 1
    });
    handle.halt();
    consumer.join().unwrap();

    assert_eq!(count.load(Ordering::Relaxed), total as u64);
    assert_eq!(sum.load(Ordering::Relaxed), total * (total + 1) / 2);
}

#[test]
fn test_roundtrip_capacity_one() {
    roundtrip_through_capacity(1);
}

#[test]
fn test_roundtrip_capacity_two() {
    roundtrip_through_capacity(2);
}

#[test]
fn test_roundtrip_capacity_1024() {
    roundtrip_through_capacity(1024);
}

#[test]
fn test_try_next_reports_exhaustion_when_full() {
    let ring = RingBuffer::single_producer(
        4,
        Arc::new(BusySpinWaitStrategy),
        TaggedEvent::default,
    )
    .unwrap();
    let gate = Arc::new(Sequence::with_initial_value());
    ring.add_gating_sequences(&[gate.clone()]);

    for i in 0..4 {
        ring.try_publish_event(|event, _| event.value = i).unwrap();
    }
    assert!(matches!(
        ring.try_next(),
        Err(RiptideError::InsufficientCapacity)
    ));
    assert_eq!(ring.remaining_capacity(), 0);

    // One consumed slot frees exactly one claim.
    gate.set(0);
    assert_eq!(ring.try_next().unwrap(), 4);
}

#[test]
fn test_blocked_producer_unblocks_when_gate_advances() {
    let ring = Arc::new(
        RingBuffer::single_producer(2, Arc::new(BusySpinWaitStrategy), TaggedEvent::default)
            .unwrap(),
    );
    let gate = Arc::new(Sequence::with_initial_value());
    ring.add_gating_sequences(&[gate.clone()]);

    let producer_ring = Arc::clone(&ring);
    let producer = thread::spawn(move || {
        for i in 0..4 {
            // Blocks inside next() once the ring is full.
            producer_ring.publish_event(|event, _| event.value = i);
        }
    });

    // Let the producer fill the ring and park against the gate.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ring.cursor().get(), 1);

    // Advancing the gating sequence past the wrap point releases it; this is
    // what shutdown does for consumers that will never run again.
    gate.set(3);
    producer.join().unwrap();
    assert_eq!(ring.cursor().get(), 3);
}

#[test]
fn test_multi_producer_prefix_is_always_contiguous() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: i64 = 5_000;

    let ring = Arc::new(
        RingBuffer::multi_producer(
            64,
            Arc::new(YieldingWaitStrategy::new()),
            TaggedEvent::default,
        )
        .unwrap(),
    );
    let barrier = Arc::new(ring.new_barrier(vec![]));

    let handler = RecordingHandler::new();
    let seen = handler.seen();
    let last = handler.last_sequence();

    let mut processor = BatchEventProcessor::new(ring.clone(), barrier, handler);
    ring.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();
    let consumer = thread::spawn(move || processor.run().unwrap());

    let mut producers = vec![];
    for id in 0..PRODUCERS {
        let ring = Arc::clone(&ring);
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                ring.publish_event(|event, _| {
                    event.value = i;
                    event.producer = id;
                });
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }

    let total = PRODUCERS as i64 * PER_PRODUCER;
    wait_until(Duration::from_secs(30), || {
        last.load(Ordering::Acquire) == total - 1
    });
    handle.halt();
    consumer.join().unwrap();

    let records = seen.lock().unwrap();
    assert_eq!(records.len(), total as usize);
    SequenceChecker::verify(&records);
}

#[test]
fn test_batch_claims_wrap_cleanly() {
    let ring = Arc::new(
        RingBuffer::single_producer(8, Arc::new(YieldingWaitStrategy::new()), TaggedEvent::default)
            .unwrap(),
    );
    let barrier = Arc::new(ring.new_barrier(vec![]));

    let handler = CountingHandler::new();
    let sum = handler.sum();
    let last = handler.last_sequence();
    let mut processor = BatchEventProcessor::new(ring.clone(), barrier, handler);
    ring.add_gating_sequences(&[processor.sequence()]);
    let handle = processor.handle();
    let consumer = thread::spawn(move || processor.run().unwrap());

    // Batches of 3 across a capacity-8 ring force mid-batch wraps.
    let mut published = 0i64;
    for _ in 0..20 {
        ring.publish_events(3, |event, sequence| {
            event.value = sequence + 1;
        });
        published += 3;
    }

    wait_until(Duration::from_secs(10), || {
        last.load(Ordering::Acquire) == published - 1
    });
    handle.halt();
    consumer.join().unwrap();

    assert_eq!(sum.load(Ordering::Relaxed), published * (published + 1) / 2);
}
