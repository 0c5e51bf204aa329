//! Multi-producer sequencer: CAS claims plus an availability buffer.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use crate::error::{Result, RiptideError};
use crate::sequence::Sequence;
use crate::sequencer::{GatingSequences, Sequencer};
use crate::wait_strategy::WaitStrategy;

/// Sequencer safe for any number of publishing threads.
///
/// Claims race through a CAS on the cursor, so claim order and commit order
/// can differ. Publication is therefore tracked per slot: each cell of
/// `available` holds the lap number (`sequence >> index_shift`) of the
/// sequence that last landed on that index, which distinguishes successive
/// laps without ever clearing cells on consume. Consumers read a contiguous
/// prefix via [`highest_published_sequence`](Sequencer::highest_published_sequence).
pub struct MultiProducerSequencer {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating: GatingSequences,
    gating_cache: Sequence,
    available: Box<[AtomicI64]>,
    index_mask: usize,
    index_shift: u32,
}

impl MultiProducerSequencer {
    /// # Panics
    ///
    /// Panics if `buffer_size` is zero or not a power of two.
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        assert!(
            buffer_size >= 1 && buffer_size.is_power_of_two(),
            "buffer size must be a power of 2, got {buffer_size}"
        );

        let available = (0..buffer_size)
            .map(|_| AtomicI64::new(-1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::with_initial_value()),
            gating: GatingSequences::new(),
            gating_cache: Sequence::with_initial_value(),
            available,
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
        }
    }

    #[inline]
    fn index_of(&self, sequence: i64) -> usize {
        (sequence as usize) & self.index_mask
    }

    #[inline]
    fn flag_of(&self, sequence: i64) -> i64 {
        sequence >> self.index_shift
    }

    #[inline]
    fn set_available(&self, sequence: i64) {
        self.available[self.index_of(sequence)].store(self.flag_of(sequence), Ordering::Release);
    }

    fn has_capacity_at(&self, required: i64, cursor_value: i64) -> bool {
        let wrap_point = (cursor_value + required) - self.buffer_size as i64;
        let cached_gating = self.gating_cache.get();

        if wrap_point > cached_gating || cached_gating > cursor_value {
            let min_sequence = self.gating.minimum(cursor_value);
            self.gating_cache.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }
}

impl Sequencer for MultiProducerSequencer {
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

        loop {
            let current = self.cursor.get();
            let next = current + n;
            let wrap_point = next - self.buffer_size as i64;
            let cached_gating = self.gating_cache.get();

            if wrap_point > cached_gating || cached_gating > current {
                let gating = self.gating.minimum(current);
                if wrap_point > gating {
                    thread::yield_now();
                    continue;
                }
                self.gating_cache.set(gating);
            } else if self.cursor.compare_and_set(current, next) {
                return next;
            }
        }
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        assert!(n >= 1, "claim count must be at least 1");

        loop {
            let current = self.cursor.get();
            let next = current + n;

            if !self.has_capacity_at(n, current) {
                return Err(RiptideError::InsufficientCapacity);
            }
            if self.cursor.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, low: i64, high: i64) {
        for sequence in low..=high {
            self.set_available(sequence);
        }
        self.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        self.available[self.index_of(sequence)].load(Ordering::Acquire) == self.flag_of(sequence)
    }

    fn highest_published_sequence(&self, lower: i64, available: i64) -> i64 {
        for sequence in lower..=available {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
        available
    }

    fn has_available_capacity(&self, required: i64) -> bool {
        self.has_capacity_at(required, self.cursor.get())
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.cursor.get();
        let consumed = self.gating.minimum(produced);
        self.buffer_size as i64 - (produced - consumed)
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
