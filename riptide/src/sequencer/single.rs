//! Single-producer sequencer: the fast path when exactly one thread claims.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::{Result, RiptideError};
use crate::sequence::Sequence;
use crate::sequencer::{GatingSequences, Sequencer};
use crate::wait_strategy::WaitStrategy;

/// Sequencer for a single publishing thread.
///
/// `next_value` and `cached_value` are written only by the producer, so they
/// use Relaxed atomics purely to stay `Sync`; the cursor carries the actual
/// release edge at publish time.
///
/// The single-thread contract is the caller's to uphold and is not enforced
/// in release builds. Debug builds record the first claiming thread and
/// panic if another thread claims.
pub struct SingleProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating: GatingSequences,
    next_value: AtomicI64,
    cached_value: AtomicI64,
    #[cfg(debug_assertions)]
    claimer: parking_lot::Mutex<Option<thread::ThreadId>>,
}

impl SingleProducerSequencer {
    /// # Panics
    ///
    /// Panics if `buffer_size` is zero or not a power of two.
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        assert!(
            buffer_size >= 1 && buffer_size.is_power_of_two(),
            "buffer size must be a power of 2, got {buffer_size}"
        );
        Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::with_initial_value()),
            gating: GatingSequences::new(),
            next_value: AtomicI64::new(crate::constants::INITIAL_CURSOR_VALUE),
            cached_value: AtomicI64::new(crate::constants::INITIAL_CURSOR_VALUE),
            #[cfg(debug_assertions)]
            claimer: parking_lot::Mutex::new(None),
        }
    }

    #[cfg(debug_assertions)]
    fn assert_single_claimer(&self) {
        let current = thread::current().id();
        let mut owner = self.claimer.lock();
        match *owner {
            None => *owner = Some(current),
            Some(first) => assert_eq!(
                first, current,
                "SingleProducerSequencer claimed from more than one thread"
            ),
        }
    }
}

impl Sequencer for SingleProducerSequencer {
    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.cursor)
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.wait_strategy)
    }

    fn next_n(&self, n: i64) -> i64 {
        assert!(n >= 1, "claim count must be at least 1");
        #[cfg(debug_assertions)]
        self.assert_single_claimer();

        let next_value = self.next_value.load(Ordering::Relaxed);
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.buffer_size as i64;
        let cached_gating = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating || cached_gating > next_value {
            let mut min_sequence = self.gating.minimum(next_value);
            while wrap_point > min_sequence {
                thread::yield_now();
                min_sequence = self.gating.minimum(next_value);
            }
            self.cached_value.store(min_sequence, Ordering::Relaxed);
        }

        self.next_value.store(next_sequence, Ordering::Relaxed);
        next_sequence
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        assert!(n >= 1, "claim count must be at least 1");
        #[cfg(debug_assertions)]
        self.assert_single_claimer();

        if !self.has_available_capacity(n) {
            return Err(RiptideError::InsufficientCapacity);
        }

        let next_sequence = self.next_value.load(Ordering::Relaxed) + n;
        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn publish(&self, sequence: i64) {
        self.cursor.set(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _low: i64, high: i64) {
        // Single-producer publication is strictly ordered with the cursor.
        self.publish(high);
    }

    fn is_available(&self, sequence: i64) -> bool {
        sequence <= self.cursor.get()
    }

    fn highest_published_sequence(&self, _lower: i64, available: i64) -> i64 {
        available
    }

    fn has_available_capacity(&self, required: i64) -> bool {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let wrap_point = (next_value + required) - self.buffer_size as i64;
        let cached_gating = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating || cached_gating > next_value {
            let min_sequence = self.gating.minimum(next_value);
            self.cached_value.store(min_sequence, Ordering::Relaxed);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let consumed = self.gating.minimum(next_value);
        self.buffer_size as i64 - (next_value - consumed)
    }

    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.gating.add(sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.gating.remove(sequence)
    }

    fn minimum_gating_sequence(&self) -> i64 {
        self.gating.minimum(self.cursor.get())
    }
}
