//! Padded monotonic sequence counters.
//!
//! A [`Sequence`] is the only synchronisation edge between producers and
//! consumers: publishing stores with Release ordering, observing loads with
//! Acquire. The counter is padded out to its own aligned block so neighbouring
//! data can never share its cache line.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::constants::{INITIAL_CURSOR_VALUE, PADDED_ALIGN};

/// A cache-line isolated monotonic 64-bit counter.
///
/// Alignment puts the counter at the start of a fresh block and the trailing
/// padding fills the remainder, so writes to adjacent fields cannot invalidate
/// the line from either side.
#[repr(align(128))]
pub struct Sequence {
    value: AtomicI64,
    _padding: [u8; PADDED_ALIGN - std::mem::size_of::<AtomicI64>()],
}

impl Sequence {
    /// Create a sequence starting at the given value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: AtomicI64::new(initial_value),
            _padding: [0; PADDED_ALIGN - std::mem::size_of::<AtomicI64>()],
        }
    }

    /// Create a sequence at [`INITIAL_CURSOR_VALUE`], meaning "nothing yet"
    pub fn with_initial_value() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }

    /// Load the current value with Acquire ordering
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Store a value with Release ordering
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Store with a full fence, for readers with no prior synchronisation
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Compare-and-set; true when the value was `expected` and is now `new`
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Atomically add one and return the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Atomically add `increment` and return the new value
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::with_initial_value()
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence").field("value", &self.get()).finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Minimum over a set of sequences, or `floor` when the set is empty.
///
/// Producers call this against the gating set with their own position as the
/// floor, so an empty set never gates.
pub fn minimum_sequence(sequences: &[Arc<Sequence>], floor: i64) -> i64 {
    sequences
        .iter()
        .map(|seq| seq.get())
        .fold(floor, std::cmp::min)
}
