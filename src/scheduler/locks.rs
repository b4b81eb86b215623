//! Sync locks serialising configuration and clock updates.
//!
//! In [`LockMode::Shared`] every pump and the clock share one lock, so at
//! most one network call is in flight at a time. In [`LockMode::PerPump`]
//! each pump gets its own lock and the clock gets another; a slow provider
//! then only delays the pump it is serving.

use crate::config::LockMode;
use crate::scheduler::runner::PumpId;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One sync lock. Holds no data; the guarded state lives in the pump lines
/// and the clock cache.
pub type SyncLock = Arc<Mutex<()>>;

/// The set of sync locks for one scheduler.
#[derive(Debug, Clone)]
pub struct SyncLocks {
    mode: LockMode,
    clock: SyncLock,
    pumps: Vec<SyncLock>,
}

impl SyncLocks {
    /// Locks for `pump_count` pumps.
    pub fn new(mode: LockMode, pump_count: usize) -> Self {
        let clock: SyncLock = Arc::new(Mutex::new(()));
        let pumps = (0..pump_count)
            .map(|_| match mode {
                LockMode::Shared => Arc::clone(&clock),
                LockMode::PerPump => Arc::new(Mutex::new(())),
            })
            .collect();
        Self { mode, clock, pumps }
    }

    /// Configured granularity.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Lock guarding clock updates.
    pub fn clock(&self) -> SyncLock {
        Arc::clone(&self.clock)
    }

    /// Lock guarding the settings of `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not handed out by the owning scheduler.
    pub fn pump(&self, id: PumpId) -> SyncLock {
        Arc::clone(&self.pumps[id.index()])
    }
}
