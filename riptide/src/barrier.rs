//! Sequence barrier gating consumers on the cursor and upstream consumers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::WaitError;
use crate::sequence::Sequence;
use crate::sequencer::Sequencer;
use crate::wait_strategy::WaitStrategy;

/// Cooperative cancellation flag shared between a barrier and wait strategies.
///
/// Raising the flag is the only way to pull a consumer out of a wait; every
/// strategy checks it on each iteration of its wait loop.
pub struct AlertFlag {
    alerted: AtomicBool,
}

impl AlertFlag {
    pub fn new() -> Self {
        Self {
            alerted: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn raise(&self) {
        self.alerted.store(true, Ordering::Release);
    }

    #[inline]
    pub fn clear(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    /// Err([`WaitError::Alerted`]) when the flag is raised
    #[inline]
    pub fn check(&self) -> Result<(), WaitError> {
        if self.is_raised() {
            Err(WaitError::Alerted)
        } else {
            Ok(())
        }
    }
}

impl Default for AlertFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Coordination barrier a consumer reads through.
///
/// Composes the publication cursor, the sequencer (for availability queries),
/// the upstream consumer sequences this consumer depends on, and the shared
/// wait strategy. Reports the highest sequence that is both published and
/// cleared by every upstream consumer.
pub struct ProcessingSequenceBarrier {
    cursor: Arc<Sequence>,
    sequencer: Arc<dyn Sequencer>,
    dependents: Vec<Arc<Sequence>>,
    wait_strategy: Arc<dyn WaitStrategy>,
    alert: AlertFlag,
}

impl ProcessingSequenceBarrier {
    pub fn new(
        sequencer: Arc<dyn Sequencer>,
        wait_strategy: Arc<dyn WaitStrategy>,
        dependents: Vec<Arc<Sequence>>,
    ) -> Self {
        Self {
            cursor: sequencer.cursor(),
            sequencer,
            dependents,
            wait_strategy,
            alert: AlertFlag::new(),
        }
    }

    /// Wait until `sequence` is safely consumable.
    ///
    /// Returns the highest contiguous published sequence at or above
    /// `sequence`, or a value below `sequence` when the strategy gave up
    /// early (timeout strategies do this on soft expiry).
    pub fn wait_for(&self, sequence: i64) -> Result<i64, WaitError> {
        self.alert.check()?;

        let available =
            self.wait_strategy
                .wait_for(sequence, &self.cursor, &self.dependents, &self.alert)?;

        if available < sequence {
            return Ok(available);
        }

        // Multi-producer commits can be out of claim order; trim the batch to
        // the contiguous published prefix.
        Ok(self.sequencer.highest_published_sequence(sequence, available))
    }

    /// Signal cancellation and wake any parked waiter
    pub fn alert(&self) {
        self.alert.raise();
        self.wait_strategy.signal_all_when_blocking();
    }

    /// Reset the alert flag; called by a processor before entering its loop
    pub fn clear_alert(&self) {
        self.alert.clear();
    }

    pub fn is_alerted(&self) -> bool {
        self.alert.is_raised()
    }

    /// Err([`WaitError::Alerted`]) when the barrier has been alerted
    pub fn check_alert(&self) -> Result<(), WaitError> {
        self.alert.check()
    }

    /// Current value of the publication cursor
    pub fn cursor_value(&self) -> i64 {
        self.cursor.get()
    }
}
