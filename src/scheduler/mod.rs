//! Task scheduling core.
//!
//! [`Scheduler`] owns the pump lines and spawns the clock sync, config sync,
//! trigger and connectivity tasks. Settings and clock writes are serialised
//! by [`SyncLocks`]; readers never take those locks.

pub mod locks;
pub mod runner;
pub mod tasks;

pub use locks::{SyncLock, SyncLocks};
pub use runner::{PumpId, Scheduler, SchedulerOptions};
pub use tasks::{ClockSyncTask, ConfigSyncTask, ConnectivityTask, TriggerTask};
