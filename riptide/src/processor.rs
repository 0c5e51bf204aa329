//! Batch event processor: the consumer loop.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use tracing::{debug, error};

use crate::barrier::ProcessingSequenceBarrier;
use crate::error::{HandlerError, Result, RiptideError, WaitError};
use crate::handler::{EventHandler, ExceptionHandler, FatalExceptionHandler};
use crate::rewind::{BatchRewindStrategy, RewindAction};
use crate::ring_buffer::RingBuffer;
use crate::sequence::Sequence;

const IDLE: i32 = 0;
const HALTED: i32 = 1;
const RUNNING: i32 = 2;

/// Shared run-state of a processor: `IDLE -> RUNNING -> IDLE`, with `HALTED`
/// reachable from either as the cooperative stop request.
pub struct RunState {
    state: AtomicI32,
}

impl RunState {
    fn new() -> Self {
        Self {
            state: AtomicI32::new(IDLE),
        }
    }

    /// CAS `IDLE -> RUNNING`; false when already running or halted
    fn try_start(&self) -> bool {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    fn halt(&self) {
        self.state.store(HALTED, Ordering::Release);
    }

    fn set_idle(&self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

/// Clonable remote control for a running processor.
///
/// Halting stores the HALTED state and alerts the barrier; the processor
/// observes both at its next wait point and exits.
#[derive(Clone)]
pub struct ProcessorHandle {
    run_state: Arc<RunState>,
    barrier: Arc<ProcessingSequenceBarrier>,
    sequence: Arc<Sequence>,
}

impl ProcessorHandle {
    pub fn halt(&self) {
        self.run_state.halt();
        self.barrier.alert();
    }

    pub fn is_running(&self) -> bool {
        self.run_state.is_running()
    }

    /// The processor's checkpoint sequence
    pub fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }
}

/// Single-threaded consumer that claims batches from a barrier, feeds them to
/// an [`EventHandler`], and advances its checkpoint [`Sequence`].
///
/// The checkpoint is the authoritative progress mark published to upstream
/// barriers and the producer's gating set; it advances with Release ordering
/// so downstream observers see every slot write the handler made.
pub struct BatchEventProcessor<E, H: EventHandler<E>> {
    ring: Arc<RingBuffer<E>>,
    barrier: Arc<ProcessingSequenceBarrier>,
    sequence: Arc<Sequence>,
    handler: H,
    exception_handler: Box<dyn ExceptionHandler<E>>,
    rewind_strategy: Option<Box<dyn BatchRewindStrategy>>,
    run_state: Arc<RunState>,
}

impl<E: Send, H: EventHandler<E>> BatchEventProcessor<E, H> {
    pub fn new(
        ring: Arc<RingBuffer<E>>,
        barrier: Arc<ProcessingSequenceBarrier>,
        handler: H,
    ) -> Self {
        Self {
            ring,
            barrier,
            sequence: Arc::new(Sequence::with_initial_value()),
            handler,
            exception_handler: Box::new(FatalExceptionHandler),
            rewind_strategy: None,
            run_state: Arc::new(RunState::new()),
        }
    }

    /// Replace the default [`FatalExceptionHandler`]
    pub fn with_exception_handler(
        mut self,
        exception_handler: Box<dyn ExceptionHandler<E>>,
    ) -> Self {
        self.exception_handler = exception_handler;
        self
    }

    /// Enable rewind handling for rewindable handlers
    pub fn with_rewind_strategy(mut self, strategy: Box<dyn BatchRewindStrategy>) -> Self {
        self.rewind_strategy = Some(strategy);
        self
    }

    /// The processor's checkpoint sequence; register it as a gating sequence
    /// before starting
    pub fn sequence(&self) -> Arc<Sequence> {
        Arc::clone(&self.sequence)
    }

    /// Handle for halting from another thread
    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle {
            run_state: Arc::clone(&self.run_state),
            barrier: Arc::clone(&self.barrier),
            sequence: Arc::clone(&self.sequence),
        }
    }

    /// Request the loop to stop at its next wait point
    pub fn halt(&self) {
        self.run_state.halt();
        self.barrier.alert();
    }

    pub fn is_running(&self) -> bool {
        self.run_state.is_running()
    }

    /// Run the consumer loop on the calling thread until halted.
    ///
    /// Returns [`RiptideError::IllegalState`] when the processor is already
    /// running on another thread. A processor halted before its first `run`
    /// performs only the start/shutdown notifications.
    pub fn run(&mut self) -> Result<()> {
        if self.run_state.try_start() {
            self.barrier.clear_alert();
            self.notify_start();
            if self.run_state.is_running() {
                self.process_events();
            }
            self.notify_shutdown();
            self.run_state.set_idle();
            Ok(())
        } else if self.run_state.is_running() {
            Err(RiptideError::illegal_state(
                "batch event processor is already running",
            ))
        } else {
            // Halted before start: lifecycle hooks only.
            self.notify_start();
            self.notify_shutdown();
            Ok(())
        }
    }

    fn notify_start(&mut self) {
        debug!("batch event processor starting");
        if let Err(err) = self.handler.on_start() {
            self.exception_handler.handle_start_error(err);
        }
    }

    fn notify_shutdown(&mut self) {
        debug!("batch event processor shutting down");
        if let Err(err) = self.handler.on_shutdown() {
            self.exception_handler.handle_shutdown_error(err);
        }
    }

    fn notify_timeout(&mut self, sequence: i64) {
        if let Err(err) = self.handler.on_timeout(sequence) {
            error!(sequence, error = %err, "timeout hook failed");
        }
    }

    fn process_events(&mut self) {
        let mut next_sequence = self.sequence.get() + 1;
        let mut rewind_attempts: u64 = 0;

        loop {
            let start_of_batch = next_sequence;

            match self.barrier.wait_for(next_sequence) {
                Ok(available) if available >= next_sequence => {
                    self.handler.on_batch_start(available - next_sequence + 1);

                    while next_sequence <= available {
                        let end_of_batch = next_sequence == available;
                        // Safety: the barrier reported `next_sequence..=available`
                        // published, and every dependent consumer is gated
                        // behind this processor's checkpoint.
                        let event = unsafe { self.ring.slot_mut(next_sequence) };

                        match self.handler.on_event(event, next_sequence, end_of_batch) {
                            Ok(()) => next_sequence += 1,
                            Err(err) => {
                                if err.is_rewind() {
                                    if let Some(strategy) = self.rewind_strategy.as_mut() {
                                        rewind_attempts += 1;
                                        if strategy.handle_rewind(rewind_attempts)
                                            == RewindAction::Rewind
                                        {
                                            next_sequence = start_of_batch;
                                            continue;
                                        }
                                    }
                                }
                                // Ordinary failure, or a rewind the strategy
                                // gave up on: report and advance past it.
                                if !self.dispatch_event_error(err, next_sequence) {
                                    return;
                                }
                                self.sequence.set(next_sequence);
                                next_sequence += 1;
                            }
                        }
                    }

                    rewind_attempts = 0;
                    self.sequence.set(available);
                }
                // A strategy that gave up early with nothing consumable.
                Ok(_) => {}
                Err(WaitError::Timeout) => {
                    let checkpoint = self.sequence.get();
                    self.notify_timeout(checkpoint);
                }
                Err(WaitError::Alerted) => {
                    if !self.run_state.is_running() {
                        break;
                    }
                }
            }
        }
    }

    /// Route a failure to the exception handler; false means terminate
    fn dispatch_event_error(&mut self, err: HandlerError, sequence: i64) -> bool {
        // Safety: same published-slot argument as the failed on_event call.
        let event = unsafe { self.ring.slot(sequence) };
        match self.exception_handler.handle_event_error(err, sequence, event) {
            Ok(()) => true,
            Err(fatal) => {
                error!(sequence, error = %fatal, "fatal handler failure; consumer stopping");
                // Checkpoint past the failing event so producers are not
                // wedged behind a dead consumer.
                self.sequence.set(sequence);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::IgnoreExceptionHandler;
    use crate::rewind::SimpleBatchRewindStrategy;
    use crate::wait_strategy::BusySpinWaitStrategy;
    use std::result::Result;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Slot {
        value: i64,
    }

    fn ring(capacity: usize) -> Arc<RingBuffer<Slot>> {
        Arc::new(
            RingBuffer::single_producer(capacity, Arc::new(BusySpinWaitStrategy), Slot::default)
                .unwrap(),
        )
    }

    struct Recording {
        seen: Arc<Mutex<Vec<i64>>>,
    }

    impl EventHandler<Slot> for Recording {
        fn on_event(
            &mut self,
            event: &mut Slot,
            _sequence: i64,
            _end_of_batch: bool,
        ) -> Result<(), HandlerError> {
            self.seen.lock().unwrap().push(event.value);
            Ok(())
        }
    }

    #[test]
    fn test_consumes_published_events_in_order() {
        let ring = ring(8);
        let barrier = Arc::new(ring.new_barrier(vec![]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut processor =
            BatchEventProcessor::new(ring.clone(), barrier, Recording { seen: seen.clone() });
        ring.add_gating_sequences(&[processor.sequence()]);

        for i in 0..5 {
            ring.publish_event(|slot, _| slot.value = i);
        }

        let handle = processor.handle();
        let consumer = std::thread::spawn(move || {
            processor.run().unwrap();
            processor
        });

        while handle.sequence().get() < 4 {
            std::thread::yield_now();
        }
        handle.halt();
        let processor = consumer.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(processor.sequence().get(), 4);
    }

    struct LifecycleProbe {
        started: Arc<Mutex<u32>>,
        stopped: Arc<Mutex<u32>>,
    }

    impl EventHandler<Slot> for LifecycleProbe {
        fn on_event(
            &mut self,
            _event: &mut Slot,
            _sequence: i64,
            _end_of_batch: bool,
        ) -> Result<(), HandlerError> {
            Ok(())
        }

        fn on_start(&mut self) -> Result<(), HandlerError> {
            *self.started.lock().unwrap() += 1;
            Ok(())
        }

        fn on_shutdown(&mut self) -> Result<(), HandlerError> {
            *self.stopped.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn test_halted_before_start_runs_hooks_and_exits() {
        let ring = ring(4);
        let barrier = Arc::new(ring.new_barrier(vec![]));
        let started = Arc::new(Mutex::new(0));
        let stopped = Arc::new(Mutex::new(0));
        let mut processor = BatchEventProcessor::new(
            ring.clone(),
            barrier,
            LifecycleProbe {
                started: started.clone(),
                stopped: stopped.clone(),
            },
        );

        processor.halt();
        assert!(processor.run().is_ok());
        assert!(!processor.is_running());
        assert_eq!(*started.lock().unwrap(), 1);
        assert_eq!(*stopped.lock().unwrap(), 1);
        // Nothing was consumed.
        assert_eq!(processor.sequence().get(), -1);
    }

    #[test]
    fn test_state_machine_resets_to_idle() {
        let ring = ring(4);
        let barrier = Arc::new(ring.new_barrier(vec![]));
        let started = Arc::new(Mutex::new(0));
        let stopped = Arc::new(Mutex::new(0));
        let mut processor = BatchEventProcessor::new(
            ring.clone(),
            barrier,
            LifecycleProbe {
                started: started.clone(),
                stopped: stopped.clone(),
            },
        );
        let handle = processor.handle();

        let consumer = std::thread::spawn(move || {
            processor.run().unwrap();
            processor
        });
        while !handle.is_running() {
            std::thread::yield_now();
        }
        handle.halt();
        let mut processor = consumer.join().unwrap();
        assert!(!processor.is_running());

        // Back to IDLE: a second run starts cleanly and can be halted again.
        let handle = processor.handle();
        let consumer = std::thread::spawn(move || {
            processor.run().unwrap();
        });
        while !handle.is_running() {
            std::thread::yield_now();
        }
        handle.halt();
        consumer.join().unwrap();
        assert_eq!(*started.lock().unwrap(), 2);
        assert_eq!(*stopped.lock().unwrap(), 2);
    }

    struct FailOn5 {
        invoked: Arc<Mutex<Vec<i64>>>,
    }

    impl EventHandler<Slot> for FailOn5 {
        fn on_event(
            &mut self,
            _event: &mut Slot,
            sequence: i64,
            _end_of_batch: bool,
        ) -> Result<(), HandlerError> {
            self.invoked.lock().unwrap().push(sequence);
            if sequence == 5 {
                return Err(HandlerError::failed("sequence 5 rejected"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_failure_advances_past_event() {
        let ring = ring(16);
        let barrier = Arc::new(ring.new_barrier(vec![]));
        let invoked = Arc::new(Mutex::new(Vec::new()));
        let mut processor = BatchEventProcessor::new(
            ring.clone(),
            barrier,
            FailOn5 {
                invoked: invoked.clone(),
            },
        )
        .with_exception_handler(Box::new(IgnoreExceptionHandler));
        ring.add_gating_sequences(&[processor.sequence()]);

        for i in 0..10 {
            ring.publish_event(|slot, _| slot.value = i);
        }

        let handle = processor.handle();
        let consumer = std::thread::spawn(move || {
            processor.run().unwrap();
            processor
        });
        while handle.sequence().get() < 9 {
            std::thread::yield_now();
        }
        handle.halt();
        let processor = consumer.join().unwrap();

        assert_eq!(processor.sequence().get(), 9);
        assert_eq!(*invoked.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    struct RewindOnce {
        rewound: bool,
        invocations: Arc<Mutex<u64>>,
    }

    impl EventHandler<Slot> for RewindOnce {
        fn on_event(
            &mut self,
            _event: &mut Slot,
            _sequence: i64,
            end_of_batch: bool,
        ) -> Result<(), HandlerError> {
            *self.invocations.lock().unwrap() += 1;
            if end_of_batch && !self.rewound {
                self.rewound = true;
                return Err(HandlerError::Rewind);
            }
            Ok(())
        }
    }

    #[test]
    fn test_rewind_replays_batch_from_start() {
        let ring = ring(8);
        let barrier = Arc::new(ring.new_barrier(vec![]));
        let invocations = Arc::new(Mutex::new(0));
        let mut processor = BatchEventProcessor::new(
            ring.clone(),
            barrier,
            RewindOnce {
                rewound: false,
                invocations: invocations.clone(),
            },
        )
        .with_rewind_strategy(Box::new(SimpleBatchRewindStrategy));
        ring.add_gating_sequences(&[processor.sequence()]);

        ring.publish_events(4, |slot, seq| slot.value = seq);

        let handle = processor.handle();
        let consumer = std::thread::spawn(move || {
            processor.run().unwrap();
        });
        while handle.sequence().get() < 3 {
            std::thread::yield_now();
        }
        handle.halt();
        consumer.join().unwrap();

        // First pass reached end-of-batch (4 calls) and rewound; second pass
        // replayed all 4.
        assert_eq!(*invocations.lock().unwrap(), 8);
        assert_eq!(handle.sequence().get(), 3);
    }

    #[test]
    fn test_rewind_without_strategy_is_a_failure() {
        let ring = ring(4);
        let barrier = Arc::new(ring.new_barrier(vec![]));
        let invocations = Arc::new(Mutex::new(0));
        let mut processor = BatchEventProcessor::new(
            ring.clone(),
            barrier,
            RewindOnce {
                rewound: false,
                invocations: invocations.clone(),
            },
        )
        .with_exception_handler(Box::new(IgnoreExceptionHandler));
        ring.add_gating_sequences(&[processor.sequence()]);

        ring.publish_event(|slot, _| slot.value = 1);

        let handle = processor.handle();
        let consumer = std::thread::spawn(move || {
            processor.run().unwrap();
        });
        while handle.sequence().get() < 0 {
            std::thread::yield_now();
        }
        handle.halt();
        consumer.join().unwrap();

        // Single-event batch: the rewind signal was treated as a failure and
        // the consumer advanced past it.
        assert_eq!(*invocations.lock().unwrap(), 1);
        assert_eq!(handle.sequence().get(), 0);
    }
}
