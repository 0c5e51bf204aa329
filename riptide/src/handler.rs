//! Event handler and exception handler contracts.

use tracing::{error, warn};

use crate::error::HandlerError;

/// Consumer-side callback invoked for every event in sequence order.
///
/// Implementations run on the processor's thread and own any per-consumer
/// state; no synchronisation is needed beyond what the sequence protocol
/// already provides.
pub trait EventHandler<E>: Send {
    /// Process one event. `end_of_batch` is true on the last event of the
    /// batch the barrier handed out, which is the natural flush point.
    fn on_event(&mut self, event: &mut E, sequence: i64, end_of_batch: bool)
        -> Result<(), HandlerError>;

    /// Called before the first `on_event` of each non-empty batch
    fn on_batch_start(&mut self, _batch_size: i64) {}

    /// Called once when the processor thread starts, before any event
    fn on_start(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called once when the processor exits its loop
    fn on_shutdown(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called when a timed wait strategy expired with nothing to consume.
    /// `sequence` is the processor's current checkpoint.
    fn on_timeout(&mut self, _sequence: i64) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Receives handler failures so the consumer loop itself never has to decide
/// policy. Returning `Err` from the event callback is fatal and terminates
/// the consumer.
pub trait ExceptionHandler<E>: Send {
    /// A handler failed on `sequence`. Return `Ok(())` to advance past the
    /// event, or `Err` to terminate the consumer loop.
    fn handle_event_error(
        &mut self,
        error: HandlerError,
        sequence: i64,
        event: &E,
    ) -> Result<(), HandlerError>;

    /// The handler's start hook failed; the processor continues
    fn handle_start_error(&mut self, error: HandlerError);

    /// The handler's shutdown hook failed; the processor is already exiting
    fn handle_shutdown_error(&mut self, error: HandlerError);
}

/// Default exception handler: log the failure and terminate the consumer.
#[derive(Default)]
pub struct FatalExceptionHandler;

impl<E> ExceptionHandler<E> for FatalExceptionHandler {
    fn handle_event_error(
        &mut self,
        error: HandlerError,
        sequence: i64,
        _event: &E,
    ) -> Result<(), HandlerError> {
        error!(sequence, %error, "handler failed; terminating consumer");
        Err(error)
    }

    fn handle_start_error(&mut self, error: HandlerError) {
        error!(%error, "handler start hook failed");
    }

    fn handle_shutdown_error(&mut self, error: HandlerError) {
        error!(%error, "handler shutdown hook failed");
    }
}

/// Logs handler failures and keeps consuming.
#[derive(Default)]
pub struct IgnoreExceptionHandler;

impl<E> ExceptionHandler<E> for IgnoreExceptionHandler {
    fn handle_event_error(
        &mut self,
        error: HandlerError,
        sequence: i64,
        _event: &E,
    ) -> Result<(), HandlerError> {
        warn!(sequence, %error, "handler failed; skipping event");
        Ok(())
    }

    fn handle_start_error(&mut self, error: HandlerError) {
        warn!(%error, "handler start hook failed");
    }

    fn handle_shutdown_error(&mut self, error: HandlerError) {
        warn!(%error, "handler shutdown hook failed");
    }
}
