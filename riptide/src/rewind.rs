//! Batch rewind policies.
//!
//! A rewindable handler signals [`HandlerError::Rewind`](crate::HandlerError)
//! instead of failing; the processor then asks the configured strategy
//! whether to restart the in-progress batch from its first sequence or treat
//! the signal as an ordinary failure. The attempt counter passed to the
//! strategy resets after every successfully completed batch.

use tracing::warn;

/// Decision returned by a [`BatchRewindStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewindAction {
    /// Restart the batch from its first sequence
    Rewind,
    /// Stop retrying; route the rewind signal as a handler failure
    Fail,
}

/// Policy consulted on each rewind signal.
///
/// `attempts` counts rewind requests within the current batch, starting at 1.
pub trait BatchRewindStrategy: Send {
    fn handle_rewind(&mut self, attempts: u64) -> RewindAction;
}

/// Rewind every time, forever.
///
/// Live-lock is the caller's problem; use
/// [`EventuallyGiveUpBatchRewindStrategy`] when the failure may be permanent.
pub struct SimpleBatchRewindStrategy;

impl BatchRewindStrategy for SimpleBatchRewindStrategy {
    fn handle_rewind(&mut self, _attempts: u64) -> RewindAction {
        RewindAction::Rewind
    }
}

/// Rewind up to a bounded number of times per batch, then fail.
pub struct EventuallyGiveUpBatchRewindStrategy {
    max_attempts: u64,
}

impl EventuallyGiveUpBatchRewindStrategy {
    /// Allow at most `max_attempts` rewinds of any one batch
    pub fn new(max_attempts: u64) -> Self {
        Self { max_attempts }
    }
}

impl BatchRewindStrategy for EventuallyGiveUpBatchRewindStrategy {
    fn handle_rewind(&mut self, attempts: u64) -> RewindAction {
        if attempts > self.max_attempts {
            warn!(attempts, max = self.max_attempts, "giving up on batch rewind");
            RewindAction::Fail
        } else {
            RewindAction::Rewind
        }
    }
}
