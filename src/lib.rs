//! Hydropump: scheduled irrigation pump controller.
//!
//! Drives relay outputs for a set of pump lines. Each line fires a timed
//! pulse when the local clock reaches one of its daily trigger times; the
//! trigger times and pulse duration are pulled periodically from a remote
//! configuration provider.
//!
//! # Architecture
//!
//! Independent tokio tasks share state through typed handles:
//! - **Clock sync**: refreshes the [`ClockCache`] from a [`TimeSource`]
//! - **Config sync**: one per pump, swaps its settings from a [`ConfigProvider`]
//! - **Trigger**: one per pump, compares the cached time with its schedule
//! - **Connectivity**: watches the link and asks it to reconnect
//!
//! A [`PumpLine`] owns a one-shot [`TimerResource`] whose expiry is the only
//! automatic way back to LOW, so every pulse ends after its duration no
//! matter what the tasks are doing.

pub mod clock;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod output;
pub mod provider;
pub mod pump;
pub mod schedule;
pub mod scheduler;
pub mod status;
pub mod timer;


pub use clock::{ClockCache, SntpTimeSource, SystemTimeSource, TimeSource};
pub use config::HydropumpConfig;
pub use connectivity::{Connectivity, TcpProbe};
pub use error::{PumpError, Result};
pub use output::{Level, MemoryOutput, OutputDriver, SysfsGpioOutput};
pub use provider::ConfigProvider;
pub use pump::PumpLine;
pub use schedule::{DriveTime, PumpSettings, ScheduleSet};
pub use scheduler::{PumpId, Scheduler, SchedulerOptions};
pub use status::SystemStatus;
pub use timer::{TimerPool, TimerResource};
