//! # riptide-test-support
//!
//! Testing infrastructure for the riptide pipeline.
//!
//! ## Components
//!
//! - **TaggedEvent** - payload carrying a value and a producer tag
//! - **CountingHandler / RecordingHandler** - handlers exposing consumed
//!   state through shared atomics
//! - **SequenceChecker** - verifies gapless, per-producer-ordered delivery

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use riptide::{EventHandler, HandlerError};

/// Event payload used across the integration tests.
#[derive(Default, Clone)]
pub struct TaggedEvent {
    pub value: i64,
    pub producer: u64,
}

/// Counts events and sums their values; state readable from the test thread.
pub struct CountingHandler {
    count: Arc<AtomicU64>,
    sum: Arc<AtomicI64>,
    last_sequence: Arc<AtomicI64>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicU64::new(0)),
            sum: Arc::new(AtomicI64::new(0)),
            last_sequence: Arc::new(AtomicI64::new(-1)),
        }
    }

    pub fn count(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.count)
    }

    pub fn sum(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.sum)
    }

    pub fn last_sequence(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.last_sequence)
    }
}

impl Default for CountingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler<TaggedEvent> for CountingHandler {
    fn on_event(
        &mut self,
        event: &mut TaggedEvent,
        sequence: i64,
        _end_of_batch: bool,
    ) -> Result<(), HandlerError> {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(event.value, Ordering::Relaxed);
        self.last_sequence.store(sequence, Ordering::Release);
        Ok(())
    }
}

/// Records every `(sequence, producer, value)` triple in arrival order.
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<(i64, u64, i64)>>>,
    last_sequence: Arc<AtomicI64>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self {
            seen: Arc::new(Mutex::new(Vec::new())),
            last_sequence: Arc::new(AtomicI64::new(-1)),
        }
    }

    pub fn seen(&self) -> Arc<Mutex<Vec<(i64, u64, i64)>>> {
        Arc::clone(&self.seen)
    }

    pub fn last_sequence(&self) -> Arc<AtomicI64> {
        Arc::clone(&self.last_sequence)
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler<TaggedEvent> for RecordingHandler {
    fn on_event(
        &mut self,
        event: &mut TaggedEvent,
        sequence: i64,
        _end_of_batch: bool,
    ) -> Result<(), HandlerError> {
        self.seen
            .lock()
            .unwrap()
            .push((sequence, event.producer, event.value));
        self.last_sequence.store(sequence, Ordering::Release);
        Ok(())
    }
}

/// Verifies a consumed record: sequences gapless from zero, and each
/// producer's values arriving in its own submission order.
pub struct SequenceChecker;

impl SequenceChecker {
    /// Panics with a description of the first violation found.
    pub fn verify(records: &[(i64, u64, i64)]) {
        for (i, (sequence, _, _)) in records.iter().enumerate() {
            assert_eq!(
                *sequence, i as i64,
                "gap in consumed sequences at position {i}"
            );
        }

        let mut last_per_producer: std::collections::HashMap<u64, i64> =
            std::collections::HashMap::new();
        for (sequence, producer, value) in records {
            if let Some(previous) = last_per_producer.insert(*producer, *value) {
                assert!(
                    *value > previous,
                    "producer {producer} out of order at sequence {sequence}: \
                     {value} after {previous}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_checker_accepts_interleaving() {
        SequenceChecker::verify(&[(0, 1, 10), (1, 2, 5), (2, 1, 11), (3, 2, 6)]);
    }

    #[test]
    #[should_panic]
    fn test_sequence_checker_rejects_gaps() {
        SequenceChecker::verify(&[(0, 1, 10), (2, 1, 11)]);
    }

    #[test]
    #[should_panic]
    fn test_sequence_checker_rejects_reordering_within_producer() {
        SequenceChecker::verify(&[(0, 1, 11), (1, 1, 10)]);
    }
}
