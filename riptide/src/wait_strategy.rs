//! Wait strategies for ring buffer consumers
//!
//! A wait strategy controls how a consumer waits until a target sequence has
//! been published, trading latency against CPU usage. Every strategy checks
//! the barrier's alert flag on each iteration and surrenders promptly with
//! [`WaitError::Alerted`] when cancellation is requested.
//!
//! | Strategy | Behaviour while waiting |
//! |----------|-------------------------|
//! | [`BusySpinWaitStrategy`] | tight spin loop |
//! | [`YieldingWaitStrategy`] | spin briefly, then yield per iteration |
//! | [`SleepingWaitStrategy`] | spin, yield, then short parks |
//! | [`BlockingWaitStrategy`] | condvar park until publish signal |
//! | [`LiteBlockingWaitStrategy`] | condvar park, signal elided when nobody waits |
//! | [`TimeoutBlockingWaitStrategy`] | condvar park with a deadline |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::barrier::AlertFlag;
use crate::error::WaitError;
use crate::sequence::{minimum_sequence, Sequence};

/// Policy by which a consumer waits for a sequence to become available.
///
/// `cursor` is the sequencer's publication cursor; `dependents` are the
/// upstream consumer sequences this consumer is gated behind. When
/// `dependents` is empty the cursor itself is the dependent view.
pub trait WaitStrategy: Send + Sync {
    /// Wait until the dependent view reaches `sequence`.
    ///
    /// Returns the observed dependent value, which may be greater than
    /// `sequence` when a batch is available.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AlertFlag,
    ) -> Result<i64, WaitError>;

    /// Wake any consumers parked in a blocking wait; no-op for spin variants
    fn signal_all_when_blocking(&self) {}
}

/// The value consumers are actually gated on: min of upstreams, else cursor.
#[inline]
fn dependent_value(cursor: &Sequence, dependents: &[Arc<Sequence>]) -> i64 {
    if dependents.is_empty() {
        cursor.get()
    } else {
        minimum_sequence(dependents, i64::MAX)
    }
}

/// Busy spin wait strategy - lowest latency, highest CPU usage.
///
/// Continuously re-reads the dependent view in a tight loop. Burns a whole
/// core while waiting; use when latency matters more than anything else.
pub struct BusySpinWaitStrategy;

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AlertFlag,
    ) -> Result<i64, WaitError> {
        loop {
            let available = dependent_value(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            alert.check()?;
            std::hint::spin_loop();
        }
    }
}

/// Yielding wait strategy - spins briefly, then yields the CPU per iteration.
///
/// Still uses 100% of a core but gives other runnable threads a chance,
/// making it a reasonable default on machines with fewer cores than threads.
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    pub fn new() -> Self {
        Self { spin_tries: 100 }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AlertFlag,
    ) -> Result<i64, WaitError> {
        let mut counter = self.spin_tries;
        loop {
            let available = dependent_value(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            alert.check()?;
            if counter > 0 {
                counter -= 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }
}

/// Sleeping wait strategy - lowest CPU usage, higher latency.
///
/// Spins, then yields, then parks for a short pause per iteration. Latency
/// becomes jittery once the strategy reaches the sleeping phase.
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep: Duration,
}

impl SleepingWaitStrategy {
    const DEFAULT_RETRIES: u32 = 200;
    const DEFAULT_SLEEP: Duration = Duration::from_nanos(100);

    pub fn new() -> Self {
        Self {
            retries: Self::DEFAULT_RETRIES,
            sleep: Self::DEFAULT_SLEEP,
        }
    }

    /// Custom spin/yield budget and park duration
    pub fn with_retries(retries: u32, sleep: Duration) -> Self {
        Self { retries, sleep }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AlertFlag,
    ) -> Result<i64, WaitError> {
        let mut counter = self.retries;
        loop {
            let available = dependent_value(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            alert.check()?;
            if counter > 100 {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(self.sleep);
            }
        }
    }
}

/// Blocking wait strategy - balanced latency and CPU usage.
///
/// Parks the consumer on a condition variable until a publisher signals, then
/// busy-reads the dependent view for the final approach. The default choice
/// when consumer threads share cores with other work.
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }
}

impl Default for BlockingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AlertFlag,
    ) -> Result<i64, WaitError> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                alert.check()?;
                self.condvar.wait(&mut guard);
            }
        }

        // Cursor has caught up; dependents trail it by at most a batch.
        loop {
            let available = dependent_value(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            alert.check()?;
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Blocking variant that elides the publish-side lock when no waiter exists.
///
/// A waiter raises `signal_needed` before parking; publishers only take the
/// lock and notify when the flag was set, which keeps the uncontended publish
/// path free of lock traffic.
pub struct LiteBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    signal_needed: AtomicBool,
}

impl LiteBlockingWaitStrategy {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            signal_needed: AtomicBool::new(false),
        }
    }
}

impl Default for LiteBlockingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for LiteBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AlertFlag,
    ) -> Result<i64, WaitError> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            loop {
                self.signal_needed.swap(true, Ordering::AcqRel);
                if cursor.get() >= sequence {
                    break;
                }
                alert.check()?;
                self.condvar.wait(&mut guard);
            }
        }

        loop {
            let available = dependent_value(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            alert.check()?;
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        if self.signal_needed.swap(false, Ordering::AcqRel) {
            let _guard = self.mutex.lock();
            self.condvar.notify_all();
        }
    }
}

/// Blocking wait with a deadline.
///
/// Behaves like [`BlockingWaitStrategy`] but returns [`WaitError::Timeout`]
/// once the configured duration elapses without the cursor arriving. The
/// processor treats that as a soft event and invokes the handler's timeout
/// hook.
pub struct TimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            timeout,
        }
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &[Arc<Sequence>],
        alert: &AlertFlag,
    ) -> Result<i64, WaitError> {
        if cursor.get() < sequence {
            let deadline = Instant::now() + self.timeout;
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                alert.check()?;
                let now = Instant::now();
                if now >= deadline {
                    return Err(WaitError::Timeout);
                }
                let _ = self.condvar.wait_for(&mut guard, deadline - now);
            }
        }

        loop {
            let available = dependent_value(cursor, dependents);
            if available >= sequence {
                return Ok(available);
            }
            alert.check()?;
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}
