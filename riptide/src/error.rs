//! Error types and handling for the riptide library

use thiserror::Error;

/// Result type alias for riptide operations
pub type Result<T> = std::result::Result<T, RiptideError>;

/// Main error type for the riptide library
#[derive(Error, Debug)]
pub enum RiptideError {
    /// Claiming would overrun a gating consumer sequence
    #[error("insufficient capacity in ring buffer")]
    InsufficientCapacity,

    /// A sequence barrier was alerted; cooperative cancellation, not a failure
    #[error("sequence barrier alerted")]
    Alerted,

    /// A timed wait elapsed before the requested sequence became available
    #[error("operation timed out")]
    Timeout,

    /// Invalid configuration parameter
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Lifecycle misuse, such as running an already-running processor
    #[error("illegal state: {message}")]
    IllegalState {
        /// Error message describing the lifecycle violation
        message: String,
    },

    /// Thread spawn failures surfaced while starting consumers
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RiptideError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new illegal-state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by retrying later
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientCapacity | Self::Timeout)
    }

    /// Check if this error is a cooperative cancellation rather than a fault
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Alerted)
    }
}

/// Outcome of a wait strategy giving up before the sequence arrived.
///
/// Kept separate from [`RiptideError`] so the wait path returns a two-variant
/// tag with no allocation. A blocking wait woken by anything other than
/// publication surfaces here as `Alerted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The barrier was alerted while waiting
    Alerted,
    /// The configured wait duration elapsed
    Timeout,
}

impl From<WaitError> for RiptideError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Alerted => RiptideError::Alerted,
            WaitError::Timeout => RiptideError::Timeout,
        }
    }
}

/// Error returned by event handler code.
///
/// `Rewind` asks the processor to restart the current batch; anything else is
/// routed to the consumer's [`ExceptionHandler`](crate::ExceptionHandler).
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Rewindable handler requests the in-progress batch be retried
    #[error("batch rewind requested")]
    Rewind,

    /// Ordinary handler failure; the consumer advances past the event
    #[error("handler failed: {0}")]
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for HandlerError {
    fn from(source: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Failed(source)
    }
}

impl HandlerError {
    /// Create a failure from any displayable message
    pub fn failed(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Failed(message.into())
    }

    /// True for the rewind signal
    pub fn is_rewind(&self) -> bool {
        matches!(self, Self::Rewind)
    }
}
