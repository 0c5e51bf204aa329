//! Fixed-capacity slot array over a sequencer.
//!
//! Every slot is constructed once, up front, and mutated in place for the
//! life of the ring; steady-state publication allocates nothing. The ring is
//! a thin façade: claim/publish go to the sequencer, indexing is a mask, and
//! the translator helpers wrap claim + populate + publish into a scope that
//! publishes on every exit path.

use std::cell::UnsafeCell;
use std::sync::Arc;

use crate::barrier::ProcessingSequenceBarrier;
use crate::error::{Result, RiptideError};
use crate::sequence::Sequence;
use crate::sequencer::{multi::MultiProducerSequencer, single::SingleProducerSequencer, Sequencer};
use crate::wait_strategy::WaitStrategy;

/// Pre-allocated ring of event slots coordinated by a [`Sequencer`].
pub struct RingBuffer<E> {
    slots: Box<[UnsafeCell<E>]>,
    index_mask: usize,
    sequencer: Arc<dyn Sequencer>,
}

// Slots are plain data handed across threads under the sequence protocol; the
// protocol itself provides the exclusion UnsafeCell cannot express.
unsafe impl<E: Send> Send for RingBuffer<E> {}
unsafe impl<E: Send> Sync for RingBuffer<E> {}

impl<E> RingBuffer<E> {
    /// Ring with a [`SingleProducerSequencer`]; exactly one thread may claim
    pub fn single_producer(
        capacity: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
        factory: impl FnMut() -> E,
    ) -> Result<Self> {
        Self::check_capacity(capacity)?;
        let sequencer = Arc::new(SingleProducerSequencer::new(capacity, wait_strategy));
        Ok(Self::with_sequencer(sequencer, factory))
    }

    /// Ring with a [`MultiProducerSequencer`]; any number of claiming threads
    pub fn multi_producer(
        capacity: usize,
        wait_strategy: Arc<dyn WaitStrategy>,
        factory: impl FnMut() -> E,
    ) -> Result<Self> {
        Self::check_capacity(capacity)?;
        let sequencer = Arc::new(MultiProducerSequencer::new(capacity, wait_strategy));
        Ok(Self::with_sequencer(sequencer, factory))
    }

    /// Ring over an existing sequencer; every slot is built by `factory`
    pub fn with_sequencer(sequencer: Arc<dyn Sequencer>, mut factory: impl FnMut() -> E) -> Self {
        let capacity = sequencer.buffer_size();
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(factory()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            index_mask: capacity - 1,
            sequencer,
        }
    }

    fn check_capacity(capacity: usize) -> Result<()> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RiptideError::config(format!(
                "ring capacity must be a power of 2, got {capacity}"
            )));
        }
        Ok(())
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots not currently occupied by unconsumed events
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// The publication cursor
    pub fn cursor(&self) -> Arc<Sequence> {
        self.sequencer.cursor()
    }

    /// The coordinating sequencer
    pub fn sequencer(&self) -> &Arc<dyn Sequencer> {
        &self.sequencer
    }

    /// Read a slot.
    ///
    /// # Safety
    ///
    /// `sequence` must have been published (`is_available`) and no consumer
    /// upstream of the caller may still mutate it. The sequence protocol
    /// provides both when the caller reads only sequences its barrier
    /// returned.
    #[inline]
    pub unsafe fn slot(&self, sequence: i64) -> &E {
        &*self.slots[(sequence as usize) & self.index_mask].get()
    }

    /// Write a slot.
    ///
    /// # Safety
    ///
    /// The caller must hold the claim on `sequence` (producer between claim
    /// and publish), or be the only consumer positioned at `sequence` with
    /// every dependent consumer gated behind it.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut(&self, sequence: i64) -> &mut E {
        &mut *self.slots[(sequence as usize) & self.index_mask].get()
    }

    /// Claim the next sequence, waiting for capacity
    pub fn next(&self) -> i64 {
        self.sequencer.next()
    }

    /// Claim `n` sequences, waiting for capacity; returns the highest
    pub fn next_n(&self, n: i64) -> i64 {
        self.sequencer.next_n(n)
    }

    /// Claim the next sequence or fail fast when full
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    /// Claim `n` sequences or fail fast when full
    pub fn try_next_n(&self, n: i64) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    /// Publish a claimed sequence
    pub fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence);
    }

    /// Publish a claimed range
    pub fn publish_range(&self, low: i64, high: i64) {
        self.sequencer.publish_range(low, high);
    }

    /// True when `sequence` has been published
    pub fn is_available(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// Register consumer sequences producers must not overtake
    pub fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(sequences);
    }

    /// Drop a gating sequence; true when it was present
    pub fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    /// Barrier gating a consumer on the cursor plus `dependents`
    pub fn new_barrier(&self, dependents: Vec<Arc<Sequence>>) -> ProcessingSequenceBarrier {
        ProcessingSequenceBarrier::new(
            Arc::clone(&self.sequencer),
            self.sequencer.wait_strategy(),
            dependents,
        )
    }

    /// Claim one slot, populate it with `translate`, and publish.
    ///
    /// The publish runs on every exit path, so a panicking translator cannot
    /// leave a claimed-but-unpublished hole that would wedge consumers.
    /// Returns the published sequence.
    pub fn publish_event(&self, translate: impl FnOnce(&mut E, i64)) -> i64 {
        let sequence = self.sequencer.next();
        self.translate_one(sequence, translate);
        sequence
    }

    /// Like [`publish_event`](Self::publish_event) but failing fast when full
    pub fn try_publish_event(&self, translate: impl FnOnce(&mut E, i64)) -> Result<i64> {
        let sequence = self.sequencer.try_next()?;
        self.translate_one(sequence, translate);
        Ok(sequence)
    }

    /// Claim `n` contiguous slots, populate each, and publish the whole range
    /// with a single multi-index publish. Returns the highest sequence.
    pub fn publish_events(&self, n: usize, translate: impl FnMut(&mut E, i64)) -> i64 {
        let high = self.sequencer.next_n(n as i64);
        self.translate_range(high - n as i64 + 1, high, translate);
        high
    }

    /// Like [`publish_events`](Self::publish_events) but failing fast when
    /// the whole range cannot be claimed
    pub fn try_publish_events(
        &self,
        n: usize,
        translate: impl FnMut(&mut E, i64),
    ) -> Result<i64> {
        let high = self.sequencer.try_next_n(n as i64)?;
        self.translate_range(high - n as i64 + 1, high, translate);
        Ok(high)
    }

    fn translate_one(&self, sequence: i64, translate: impl FnOnce(&mut E, i64)) {
        let _guard = PublishGuard {
            sequencer: &*self.sequencer,
            low: sequence,
            high: sequence,
        };
        // Exclusive: the claim on `sequence` is held until the guard publishes.
        let event = unsafe { self.slot_mut(sequence) };
        translate(event, sequence);
    }

    fn translate_range(&self, low: i64, high: i64, mut translate: impl FnMut(&mut E, i64)) {
        let _guard = PublishGuard {
            sequencer: &*self.sequencer,
            low,
            high,
        };
        for sequence in low..=high {
            let event = unsafe { self.slot_mut(sequence) };
            translate(event, sequence);
        }
    }
}

/// Publishes the claimed range when dropped, panicking translators included.
struct PublishGuard<'a> {
    sequencer: &'a dyn Sequencer,
    low: i64,
    high: i64,
}

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        self.sequencer.publish_range(self.low, self.high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait_strategy::BusySpinWaitStrategy;

    #[derive(Default)]
    struct Slot {
        value: i64,
    }

    fn ring(capacity: usize) -> RingBuffer<Slot> {
        RingBuffer::single_producer(capacity, Arc::new(BusySpinWaitStrategy), Slot::default)
            .unwrap()
    }

    #[test]
    fn test_rejects_invalid_capacity() {
        assert!(RingBuffer::<Slot>::single_producer(
            0,
            Arc::new(BusySpinWaitStrategy),
            Slot::default
        )
        .is_err());
        assert!(RingBuffer::<Slot>::multi_producer(
            1000,
            Arc::new(BusySpinWaitStrategy),
            Slot::default
        )
        .is_err());
    }

    #[test]
    fn test_publish_event_translates_slot() {
        let ring = ring(8);

        let seq = ring.publish_event(|slot, sequence| {
            slot.value = sequence * 10;
        });

        assert_eq!(seq, 0);
        assert!(ring.is_available(0));
        assert_eq!(unsafe { ring.slot(0) }.value, 0);

        let seq = ring.publish_event(|slot, _| slot.value = 99);
        assert_eq!(unsafe { ring.slot(seq) }.value, 99);
    }

    #[test]
    fn test_batch_publish_is_contiguous() {
        let ring = ring(8);

        let high = ring.publish_events(4, |slot, sequence| {
            slot.value = sequence;
        });

        assert_eq!(high, 3);
        assert_eq!(ring.cursor().get(), 3);
        for seq in 0..=3 {
            assert_eq!(unsafe { ring.slot(seq) }.value, seq);
        }
    }

    #[test]
    fn test_try_publish_fails_fast_when_full() {
        let ring = ring(2);
        let gate = Arc::new(Sequence::with_initial_value());
        ring.add_gating_sequences(&[gate.clone()]);

        ring.publish_event(|slot, _| slot.value = 1);
        ring.publish_event(|slot, _| slot.value = 2);

        assert!(matches!(
            ring.try_publish_event(|slot, _| slot.value = 3),
            Err(RiptideError::InsufficientCapacity)
        ));

        gate.set(1);
        assert!(ring.try_publish_event(|slot, _| slot.value = 3).is_ok());
    }

    #[test]
    fn test_panicking_translator_still_publishes() {
        let ring = Arc::new(ring(8));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            ring.publish_event(|_, _| panic!("translator failed"));
        }));

        assert!(result.is_err());
        // The claim was still published; consumers are not wedged.
        assert_eq!(ring.cursor().get(), 0);
        assert!(ring.is_available(0));
    }

    #[test]
    fn test_slot_identity_is_stable_across_laps() {
        let ring = ring(2);
        let gate = Arc::new(Sequence::new(i64::MAX));
        ring.add_gating_sequences(&[gate]);

        let first = unsafe { ring.slot(0) } as *const Slot;
        for _ in 0..4 {
            ring.publish_event(|slot, _| slot.value += 1);
        }
        // Sequence 2 wraps onto index 0: same slot object.
        let wrapped = unsafe { ring.slot(2) } as *const Slot;
        assert_eq!(first, wrapped);
    }

    #[test]
    fn test_remaining_capacity_reflects_claims() {
        let ring = ring(8);
        let gate = Arc::new(Sequence::with_initial_value());
        ring.add_gating_sequences(&[gate]);

        assert_eq!(ring.remaining_capacity(), 8);
        ring.publish_events(3, |slot, seq| slot.value = seq);
        assert_eq!(ring.remaining_capacity(), 5);
    }
}
