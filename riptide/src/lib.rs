//! High-throughput, low-latency in-process event pipeline.
//!
//! Producers claim slots in a pre-allocated ring, fill them in place, and
//! publish; consumers observe published slots in sequence order, optionally
//! gated behind other consumers. The entire exchange is coordinated through
//! padded atomic sequence counters rather than locks, so the common path is
//! wait-free and allocation-free.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`Sequence`] | Padded monotonic counter, the sole sync edge |
//! | [`WaitStrategy`] | How a consumer waits for a target sequence |
//! | [`SingleProducerSequencer`] / [`MultiProducerSequencer`] | Slot claim, publish, availability |
//! | [`RingBuffer`] | Fixed-capacity slot array over a sequencer |
//! | [`ProcessingSequenceBarrier`] | Gated wait over cursor + upstream sequences |
//! | [`BatchEventProcessor`] | Consumer loop with batching and rewind |
//! | [`ConsumerRegistry`] | Consumer lifecycle: start, halt, drain |
//!
//! ## Wait strategies
//!
//! | Strategy | Latency | CPU |
//! |----------|---------|-----|
//! | [`BusySpinWaitStrategy`] | lowest | 100% of a core |
//! | [`YieldingWaitStrategy`] | low | high, yields under contention |
//! | [`SleepingWaitStrategy`] | moderate | low |
//! | [`BlockingWaitStrategy`] | moderate | minimal |
//! | [`LiteBlockingWaitStrategy`] | moderate | minimal, cheap uncontended publish |
//! | [`TimeoutBlockingWaitStrategy`] | moderate | minimal, bounded waits |
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use riptide::{BatchEventProcessor, BusySpinWaitStrategy, EventHandler, HandlerError, RingBuffer};
//!
//! #[derive(Default)]
//! struct Tick { value: i64 }
//!
//! struct Sum(i64);
//! impl EventHandler<Tick> for Sum {
//!     fn on_event(&mut self, event: &mut Tick, _sequence: i64, _end_of_batch: bool)
//!         -> Result<(), HandlerError>
//!     {
//!         self.0 += event.value;
//!         Ok(())
//!     }
//! }
//!
//! let ring = Arc::new(RingBuffer::single_producer(
//!     8,
//!     Arc::new(BusySpinWaitStrategy),
//!     Tick::default,
//! ).unwrap());
//!
//! let barrier = Arc::new(ring.new_barrier(vec![]));
//! let mut processor = BatchEventProcessor::new(ring.clone(), barrier, Sum(0));
//! ring.add_gating_sequences(&[processor.sequence()]);
//!
//! let handle = processor.handle();
//! let consumer = std::thread::spawn(move || processor.run().unwrap());
//!
//! for i in 1..=3 {
//!     ring.publish_event(|tick, _seq| tick.value = i);
//! }
//!
//! let checkpoint = handle.sequence();
//! while checkpoint.get() < 2 {
//!     std::thread::yield_now();
//! }
//! handle.halt();
//! consumer.join().unwrap();
//! ```
//!
//! ## Safety
//!
//! Slot contents are shared mutable state guarded only by the sequence
//! protocol: a slot is written by its claimer between claim and publish, and
//! read by consumers only after publication. The `unsafe` surface is confined
//! to [`RingBuffer::slot`] / [`RingBuffer::slot_mut`]; everything built on top
//! upholds the protocol.

pub mod barrier;
pub mod constants;
pub mod error;
pub mod handler;
pub mod processor;
pub mod registry;
pub mod rewind;
pub mod ring_buffer;
pub mod sequence;
pub mod sequencer;
pub mod wait_strategy;

pub use barrier::{AlertFlag, ProcessingSequenceBarrier};
pub use constants::{DEFAULT_RING_BUFFER_SIZE, INITIAL_CURSOR_VALUE};
pub use error::{HandlerError, Result, RiptideError, WaitError};
pub use handler::{
    EventHandler, ExceptionHandler, FatalExceptionHandler, IgnoreExceptionHandler,
};
pub use processor::{BatchEventProcessor, ProcessorHandle, RunState};
pub use registry::{ConsumerRegistry, DefaultThreadFactory, HandlerId, ThreadFactory};
pub use rewind::{
    BatchRewindStrategy, EventuallyGiveUpBatchRewindStrategy, RewindAction,
    SimpleBatchRewindStrategy,
};
pub use ring_buffer::RingBuffer;
pub use sequence::{minimum_sequence, Sequence};
pub use sequencer::{
    multi::MultiProducerSequencer, single::SingleProducerSequencer, Sequencer,
};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, LiteBlockingWaitStrategy,
    SleepingWaitStrategy, TimeoutBlockingWaitStrategy, WaitStrategy, YieldingWaitStrategy,
};
