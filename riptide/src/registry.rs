//! Consumer registry: tracks wired consumers and drives their lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::barrier::ProcessingSequenceBarrier;
use crate::error::{Result, RiptideError};
use crate::handler::EventHandler;
use crate::processor::{BatchEventProcessor, ProcessorHandle};
use crate::sequence::Sequence;

/// Identity of a registered consumer, issued by [`ConsumerRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Creates the threads consumers run on.
pub trait ThreadFactory {
    fn spawn(
        &mut self,
        name: &str,
        f: Box<dyn FnOnce() + Send>,
    ) -> std::io::Result<JoinHandle<()>>;
}

/// Names threads `<prefix>-<n>` via [`std::thread::Builder`].
pub struct DefaultThreadFactory {
    prefix: String,
    counter: u64,
}

impl DefaultThreadFactory {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: 0,
        }
    }
}

impl Default for DefaultThreadFactory {
    fn default() -> Self {
        Self::new("riptide")
    }
}

impl ThreadFactory for DefaultThreadFactory {
    fn spawn(
        &mut self,
        name: &str,
        f: Box<dyn FnOnce() + Send>,
    ) -> std::io::Result<JoinHandle<()>> {
        let thread_name = format!("{}-{}-{}", self.prefix, name, self.counter);
        self.counter += 1;
        std::thread::Builder::new().name(thread_name).spawn(f)
    }
}

struct ConsumerEntry {
    name: String,
    handle: ProcessorHandle,
    barrier: Arc<ProcessingSequenceBarrier>,
    sequence: Arc<Sequence>,
    runner: Option<Box<dyn FnOnce() -> Result<()> + Send>>,
    join: Option<JoinHandle<()>>,
    end_of_chain: bool,
}

/// Tracks every consumer wired to a ring: its processor, checkpoint
/// sequence, barrier, and whether it is at the end of a dependency chain.
///
/// End-of-chain consumers are the ones nothing else depends on; their
/// sequences form the effective gating set and define when the pipeline has
/// drained.
pub struct ConsumerRegistry {
    entries: Vec<ConsumerEntry>,
    by_id: HashMap<HandlerId, usize>,
    next_id: u64,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_id: HashMap::new(),
            next_id: 0,
        }
    }

    /// Register a processor; consumers are added during wiring, before start.
    ///
    /// The registry takes ownership of the processor until
    /// [`start_all`](Self::start_all) moves it onto its thread.
    pub fn add<E, H>(
        &mut self,
        name: impl Into<String>,
        barrier: Arc<ProcessingSequenceBarrier>,
        mut processor: BatchEventProcessor<E, H>,
    ) -> HandlerId
    where
        E: Send + 'static,
        H: EventHandler<E> + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;

        let entry = ConsumerEntry {
            name: name.into(),
            handle: processor.handle(),
            barrier,
            sequence: processor.sequence(),
            runner: Some(Box::new(move || processor.run())),
            join: None,
            end_of_chain: true,
        };
        self.by_id.insert(id, self.entries.len());
        self.entries.push(entry);
        id
    }

    /// Checkpoint sequence of a registered consumer
    pub fn sequence_of(&self, id: HandlerId) -> Option<Arc<Sequence>> {
        self.entry(id).map(|e| Arc::clone(&e.sequence))
    }

    /// Barrier of a registered consumer
    pub fn barrier_of(&self, id: HandlerId) -> Option<Arc<ProcessingSequenceBarrier>> {
        self.entry(id).map(|e| Arc::clone(&e.barrier))
    }

    /// Record that another consumer's barrier now depends on this one.
    ///
    /// A consumer someone depends on is no longer end-of-chain and drops out
    /// of the effective gating set.
    pub fn mark_used_in_barrier(&mut self, id: HandlerId) {
        if let Some(index) = self.by_id.get(&id) {
            self.entries[*index].end_of_chain = false;
        }
    }

    /// Sequences of all end-of-chain consumers; register these as the
    /// producer's gating sequences
    pub fn end_of_chain_sequences(&self) -> Vec<Arc<Sequence>> {
        self.entries
            .iter()
            .filter(|e| e.end_of_chain)
            .map(|e| Arc::clone(&e.sequence))
            .collect()
    }

    /// Start every not-yet-started consumer on its own thread
    pub fn start_all(&mut self, factory: &mut dyn ThreadFactory) -> Result<()> {
        for entry in &mut self.entries {
            if let Some(runner) = entry.runner.take() {
                debug!(consumer = %entry.name, "starting consumer");
                let name = entry.name.clone();
                let join = factory.spawn(
                    &entry.name,
                    Box::new(move || {
                        if let Err(err) = runner() {
                            error!(consumer = %name, error = %err, "consumer exited with error");
                        }
                    }),
                )?;
                entry.join = Some(join);
            }
        }
        Ok(())
    }

    /// Alert every barrier, then halt every processor.
    ///
    /// Alerting first pulls all consumers out of their waits at once; the
    /// halt then lands on the next wait-point check.
    pub fn halt_all(&self) {
        for entry in &self.entries {
            entry.barrier.alert();
        }
        for entry in &self.entries {
            debug!(consumer = %entry.name, "halting consumer");
            entry.handle.halt();
        }
    }

    /// Join every started consumer thread
    pub fn join_all(&mut self) {
        for entry in &mut self.entries {
            if let Some(join) = entry.join.take() {
                if join.join().is_err() {
                    error!(consumer = %entry.name, "consumer thread panicked");
                }
            }
        }
    }

    /// True while any end-of-chain consumer trails the cursor
    pub fn has_backlog(&self, cursor: i64) -> bool {
        self.entries
            .iter()
            .any(|e| e.end_of_chain && e.sequence.get() < cursor)
    }

    /// Busy-poll until every end-of-chain consumer reaches the cursor.
    ///
    /// The cursor is sampled once at entry; events published afterwards are
    /// not waited for.
    pub fn drain(&self, cursor: &Sequence, timeout: Duration) -> Result<()> {
        let target = cursor.get();
        let deadline = Instant::now() + timeout;
        while self.has_backlog(target) {
            if Instant::now() >= deadline {
                return Err(RiptideError::Timeout);
            }
            std::thread::yield_now();
        }
        Ok(())
    }

    /// Number of registered consumers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: HandlerId) -> Option<&ConsumerEntry> {
        self.by_id.get(&id).map(|index| &self.entries[*index])
    }
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
