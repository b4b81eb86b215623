//! Digital output drivers for pump relays.
//!
//! Setting a level is synchronous and infallible from the controller's point
//! of view: a driver that hits an I/O error logs it and carries on.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, error};

/// Logic level of an output channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Relay off.
    #[default]
    Low,
    /// Relay on.
    High,
}

impl Level {
    /// `High` when `on` is true.
    pub fn from_on(on: bool) -> Self {
        if on { Self::High } else { Self::Low }
    }

    /// Whether this level drives the relay on.
    pub fn is_high(self) -> bool {
        self == Self::High
    }
}

/// Drives GPIO-style output channels.
pub trait OutputDriver: Send + Sync + 'static {
    /// Drive `channel` to `level`.
    fn set_level(&self, channel: u8, level: Level);

    /// Read back the level of `channel`.
    fn level(&self, channel: u8) -> Level;
}

/// In-memory driver for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    levels: Mutex<HashMap<u8, Level>>,
}

impl MemoryOutput {
    /// Every channel starts `Low`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given channel levels, e.g. to simulate a restart while
    /// a relay was on.
    pub fn with_levels(levels: impl IntoIterator<Item = (u8, Level)>) -> Self {
        Self {
            levels: Mutex::new(levels.into_iter().collect()),
        }
    }
}

impl OutputDriver for MemoryOutput {
    fn set_level(&self, channel: u8, level: Level) {
        debug!(channel, ?level, "output level set");
        self.levels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(channel, level);
    }

    fn level(&self, channel: u8) -> Level {
        self.levels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&channel)
            .copied()
            .unwrap_or_default()
    }
}

/// Linux sysfs GPIO driver (`/sys/class/gpio/gpioN/value`).
///
/// Channels must already be exported and configured as outputs.
#[derive(Debug, Clone)]
pub struct SysfsGpioOutput {
    root: PathBuf,
}

impl SysfsGpioOutput {
    /// Driver rooted at `root`, normally `/sys/class/gpio`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn value_path(&self, channel: u8) -> PathBuf {
        self.root.join(format!("gpio{channel}")).join("value")
    }
}

impl OutputDriver for SysfsGpioOutput {
    fn set_level(&self, channel: u8, level: Level) {
        let value = if level.is_high() { "1" } else { "0" };
        if let Err(e) = std::fs::write(self.value_path(channel), value) {
            error!(channel, ?level, error = %e, "cannot drive gpio");
        }
    }

    fn level(&self, channel: u8) -> Level {
        match std::fs::read_to_string(self.value_path(channel)) {
            Ok(raw) => Level::from_on(raw.trim() == "1"),
            Err(e) => {
                error!(channel, error = %e, "cannot read gpio");
                Level::Low
            }
        }
    }
}
