//! Slot claim and publish coordination.
//!
//! A sequencer hands out sequence numbers to producers, tracks the gating
//! consumer sequences it must not overtake, and answers availability queries
//! for consumers. Two variants specialise the claim protocol:
//!
//! - [`single::SingleProducerSequencer`] - plain counters, no CAS; caller
//!   guarantees exactly one publishing thread
//! - [`multi::MultiProducerSequencer`] - CAS claim loop plus an availability
//!   buffer that tolerates out-of-order commits

pub mod multi;
pub mod single;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::sequence::{minimum_sequence, Sequence};
use crate::wait_strategy::WaitStrategy;

/// Coordinates slot claim, publication, and availability for one ring.
pub trait Sequencer: Send + Sync {
    /// Capacity of the ring this sequencer coordinates
    fn buffer_size(&self) -> usize;

    /// The publication cursor; highest claimed sequence
    fn cursor(&self) -> Arc<Sequence>;

    /// The wait strategy publishers signal through; shared with barriers
    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    /// Claim the next sequence, waiting for capacity if needed
    fn next(&self) -> i64 {
        self.next_n(1)
    }

    /// Claim the next `n` sequences and return the highest.
    ///
    /// Spins/yields while the claim would overrun the slowest gating
    /// consumer.
    fn next_n(&self, n: i64) -> i64;

    /// Claim the next sequence without waiting
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim the next `n` sequences without waiting.
    ///
    /// Fails fast with `InsufficientCapacity` when the claim would overrun a
    /// gating consumer.
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Make a claimed sequence visible to consumers
    fn publish(&self, sequence: i64);

    /// Publish the whole claimed range `[low, high]`
    fn publish_range(&self, low: i64, high: i64);

    /// True when `sequence` has been published
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence in `[lower, available]` with no unpublished gap
    /// below it; `lower - 1` when `lower` itself is unpublished
    fn highest_published_sequence(&self, lower: i64, available: i64) -> i64;

    /// True when `required` more slots can be claimed right now
    fn has_available_capacity(&self, required: i64) -> bool;

    /// Slots not currently occupied by unconsumed events
    fn remaining_capacity(&self) -> i64;

    /// Register consumer sequences this sequencer must never overtake
    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]);

    /// Drop a gating sequence; true when it was present.
    ///
    /// Callers must not remove a sequence a producer may currently be
    /// blocked on.
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Minimum of the gating sequences and the cursor
    fn minimum_gating_sequence(&self) -> i64;
}

/// The gating-sequence snapshot shared between a sequencer and its consumers.
///
/// Consumers own their Sequence exclusively with respect to writes; the
/// sequencer only ever reads through a snapshot. Registration replaces the
/// snapshot wholesale so in-flight minimum scans see a consistent array.
pub(crate) struct GatingSequences {
    snapshot: RwLock<Arc<Vec<Arc<Sequence>>>>,
}

impl GatingSequences {
    pub(crate) fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub(crate) fn add(&self, sequences: &[Arc<Sequence>]) {
        let mut guard = self.snapshot.write();
        let mut next = (**guard).clone();
        next.extend(sequences.iter().cloned());
        *guard = Arc::new(next);
    }

    pub(crate) fn remove(&self, sequence: &Arc<Sequence>) -> bool {
        let mut guard = self.snapshot.write();
        let mut next = (**guard).clone();
        let before = next.len();
        next.retain(|s| !Arc::ptr_eq(s, sequence));
        let removed = next.len() != before;
        if removed {
            *guard = Arc::new(next);
        }
        removed
    }

    /// Minimum over the current snapshot, or `floor` when empty
    pub(crate) fn minimum(&self, floor: i64) -> i64 {
        let snapshot = Arc::clone(&self.snapshot.read());
        minimum_sequence(&snapshot, floor)
    }
}
