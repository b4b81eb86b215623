//! Countdown timers backed by the tokio runtime.
//!
//! A [`TimerResource`] owns one single-shot or auto-reloading countdown. When
//! the countdown elapses its expiry closure runs on a runtime worker,
//! asynchronously with respect to whoever armed it. Timers are allocated from
//! a bounded [`TimerPool`]; creation fails with
//! [`PumpError::ResourceExhausted`] once every slot is taken, and a slot is
//! returned when its timer is dropped.
//!
//! # Invariants
//!
//! - A stopped timer never fires. Every arm bumps a generation counter and
//!   the countdown task re-checks it under the state lock before firing, so
//!   a countdown that lost a race with `stop` exits silently.
//! - A one-shot timer marks itself stopped before its closure runs, so the
//!   closure may safely call back into [`TimerResource::stop`].

use crate::error::{PumpError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

/// Closure invoked when a timer expires. Must not block.
pub type ExpiryCallback = Arc<dyn Fn() + Send + Sync>;

/// Bounded pool of timer slots.
///
/// Cloning the pool shares the same slots.
#[derive(Debug, Clone)]
pub struct TimerPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    capacity: usize,
    in_use: AtomicUsize,
}

impl TimerPool {
    /// Create a pool with room for `capacity` live timers.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    /// Maximum number of live timers.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of timers currently holding a slot.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Create a stopped timer.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::ResourceExhausted`] when the pool is full or when
    /// called outside a tokio runtime.
    pub fn create<F>(
        &self,
        name: impl Into<String>,
        period: Duration,
        auto_reload: bool,
        on_expire: F,
    ) -> Result<TimerResource>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let slot = self.reserve()?;
        Ok(TimerResource::with_slot(
            slot,
            name.into(),
            period,
            auto_reload,
            Arc::new(on_expire),
        ))
    }

    /// Take one slot without creating a timer yet.
    pub(crate) fn reserve(&self) -> Result<TimerSlot> {
        let runtime = Handle::try_current().map_err(|e| {
            PumpError::ResourceExhausted(format!("no timer service available: {e}"))
        })?;

        let capacity = self.inner.capacity;
        self.inner
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < capacity).then_some(used + 1)
            })
            .map_err(|used| {
                PumpError::ResourceExhausted(format!("all {used} of {capacity} timers in use"))
            })?;

        Ok(TimerSlot {
            pool: Arc::clone(&self.inner),
            runtime,
        })
    }
}

/// One reserved pool slot; released on drop.
pub(crate) struct TimerSlot {
    pool: Arc<PoolInner>,
    runtime: Handle,
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A single-shot or auto-reloading countdown.
pub struct TimerResource {
    name: String,
    shared: Arc<TimerShared>,
    slot: TimerSlot,
}

struct TimerShared {
    state: Mutex<TimerState>,
    on_expire: ExpiryCallback,
}

struct TimerState {
    period: Duration,
    auto_reload: bool,
    running: bool,
    generation: u64,
    countdown: Option<JoinHandle<()>>,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TimerResource {
    pub(crate) fn with_slot(
        slot: TimerSlot,
        name: String,
        period: Duration,
        auto_reload: bool,
        on_expire: ExpiryCallback,
    ) -> Self {
        Self {
            name,
            shared: Arc::new(TimerShared {
                state: Mutex::new(TimerState {
                    period,
                    auto_reload,
                    running: false,
                    generation: 0,
                    countdown: None,
                }),
                on_expire,
            }),
            slot,
        }
    }

    /// Timer name, for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Currently committed period.
    pub fn period(&self) -> Duration {
        self.shared.lock().period
    }

    /// Whether a countdown is in flight.
    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    /// Arm the countdown. No-op if already running.
    pub fn start(&self) {
        let mut state = self.shared.lock();
        if state.running {
            return;
        }
        self.arm(&mut state);
    }

    /// Cancel the countdown. No-op if already stopped.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        disarm(&mut state);
    }

    /// Restart the countdown from the full current period. No-op if stopped.
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        if !state.running {
            return;
        }
        disarm(&mut state);
        self.arm(&mut state);
    }

    /// Commit a new period, stopping the countdown first if it is running.
    ///
    /// The new period takes effect on the next [`start`](Self::start).
    pub fn change_period(&self, period: Duration) {
        let mut state = self.shared.lock();
        disarm(&mut state);
        state.period = period;
    }

    fn arm(&self, state: &mut TimerState) {
        state.generation = state.generation.wrapping_add(1);
        state.running = true;
        trace!(timer = %self.name, period_ms = state.period.as_millis() as u64, "timer armed");
        let countdown = countdown(
            Arc::downgrade(&self.shared),
            state.generation,
            state.period,
        );
        state.countdown = Some(self.slot.runtime.spawn(countdown));
    }
}

impl Drop for TimerResource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TimerResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TimerResource")
            .field("name", &self.name)
            .field("period", &state.period)
            .field("auto_reload", &state.auto_reload)
            .field("running", &state.running)
            .finish()
    }
}

fn disarm(state: &mut TimerState) {
    if !state.running {
        return;
    }
    state.running = false;
    state.generation = state.generation.wrapping_add(1);
    if let Some(task) = state.countdown.take() {
        task.abort();
    }
}

async fn countdown(shared: Weak<TimerShared>, generation: u64, period: Duration) {
    let mut deadline = Instant::now() + period;
    loop {
        tokio::time::sleep_until(deadline).await;

        let Some(shared) = shared.upgrade() else {
            return;
        };
        let next_period = {
            let mut state = shared.lock();
            if !state.running || state.generation != generation {
                return;
            }
            if state.auto_reload {
                Some(state.period)
            } else {
                state.running = false;
                state.countdown = None;
                None
            }
        };

        (shared.on_expire)();

        match next_period {
            Some(period) => deadline += period,
            None => return,
        }
    }
}
