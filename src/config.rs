//! Static configuration for the pump controller.
//!
//! Loaded from TOML at startup. Every section falls back to its defaults, so
//! an empty file describes the two stock hydroponic lines polling the public
//! data API.

use crate::error::{PumpError, Result};
use chrono::FixedOffset;
use hydropump_cloud::CloudConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HydropumpConfig {
    /// Pump lines, one per output channel.
    pub pumps: Vec<PumpConfig>,
    /// Task periods.
    pub intervals: IntervalConfig,
    /// Bounds on network calls made under a sync lock.
    pub timeouts: TimeoutConfig,
    /// Sync lock granularity.
    pub locking: LockingConfig,
    /// Timer pool sizing.
    pub timers: TimerConfig,
    /// Remote configuration provider.
    pub cloud: CloudConfig,
    /// Time source.
    pub clock: ClockConfig,
    /// Output driver.
    pub output: OutputConfig,
    /// Link monitoring.
    pub link: LinkConfig,
}

impl Default for HydropumpConfig {
    fn default() -> Self {
        Self {
            pumps: vec![
                PumpConfig::new("#03", 19, 900_000),
                PumpConfig::new("#04", 18, 900_000),
            ],
            intervals: IntervalConfig::default(),
            timeouts: TimeoutConfig::default(),
            locking: LockingConfig::default(),
            timers: TimerConfig::default(),
            cloud: CloudConfig::default(),
            clock: ClockConfig::default(),
            output: OutputConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

/// One pump line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Code identifying the pump's remote document, e.g. `"#03"`.
    pub code: String,
    /// Output channel (GPIO number).
    pub channel: u8,
    /// Pulse duration used until the first successful sync, in ms.
    #[serde(default = "default_pulse_duration_ms")]
    pub pulse_duration_ms: u64,
}

fn default_pulse_duration_ms() -> u64 {
    900_000
}

impl PumpConfig {
    /// Convenience constructor.
    pub fn new(code: impl Into<String>, channel: u8, pulse_duration_ms: u64) -> Self {
        Self {
            code: code.into(),
            channel,
            pulse_duration_ms,
        }
    }

    /// Initial pulse duration.
    pub fn pulse_duration(&self) -> Duration {
        Duration::from_millis(self.pulse_duration_ms)
    }
}

/// Periods of the long-running tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    /// Trigger poll period in ms. Must stay well below one second so every
    /// scheduled second is observed.
    pub trigger_poll_ms: u64,
    /// Configuration sync period in seconds.
    pub config_sync_secs: u64,
    /// Clock sync period in seconds.
    pub clock_sync_secs: u64,
    /// Link check period in ms. Every check opens a TCP connection to
    /// `link.probe_address`.
    pub link_check_ms: u64,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            trigger_poll_ms: 100,
            config_sync_secs: 300,
            clock_sync_secs: 600,
            link_check_ms: 5_000,
        }
    }
}

impl IntervalConfig {
    /// Trigger poll period.
    pub fn trigger_poll(&self) -> Duration {
        Duration::from_millis(self.trigger_poll_ms)
    }

    /// Configuration sync period.
    pub fn config_sync(&self) -> Duration {
        Duration::from_secs(self.config_sync_secs)
    }

    /// Clock sync period.
    pub fn clock_sync(&self) -> Duration {
        Duration::from_secs(self.clock_sync_secs)
    }

    /// Link check period.
    pub fn link_check(&self) -> Duration {
        Duration::from_millis(self.link_check_ms)
    }
}

/// Timeouts for calls made while holding a sync lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Configuration fetch timeout in seconds.
    pub fetch_secs: u64,
    /// Time query timeout in seconds.
    pub time_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch_secs: 10,
            time_secs: 5,
        }
    }
}

impl TimeoutConfig {
    /// Configuration fetch timeout.
    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    /// Time query timeout.
    pub fn time(&self) -> Duration {
        Duration::from_secs(self.time_secs)
    }
}

/// Granularity of the sync locks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// One lock for every pump and the clock.
    #[default]
    Shared,
    /// One lock per pump plus one for the clock.
    PerPump,
}

/// Locking section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    /// Lock granularity.
    pub mode: LockMode,
}

/// Timer pool section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Maximum number of live timers.
    pub pool_capacity: usize,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self { pool_capacity: 8 }
    }
}

/// Which time source to query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSourceKind {
    /// SNTP over UDP.
    #[default]
    Sntp,
    /// The host clock.
    System,
}

/// Time source section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Source kind.
    pub source: ClockSourceKind,
    /// SNTP server, `host:port`.
    pub server: String,
    /// Offset of local time from UTC, in seconds (east positive).
    pub utc_offset_secs: i32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            source: ClockSourceKind::Sntp,
            server: "a.st1.ntp.br:123".into(),
            utc_offset_secs: -3 * 3600,
        }
    }
}

impl ClockConfig {
    /// Local UTC offset.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::Config`] if the offset is a day or more.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_secs).ok_or_else(|| {
            PumpError::Config(format!(
                "clock.utc_offset_secs {} is out of range",
                self.utc_offset_secs
            ))
        })
    }
}

/// Which output driver to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputDriverKind {
    /// In-memory levels only (dry run).
    #[default]
    Memory,
    /// Linux sysfs GPIO.
    Sysfs,
}

/// Output section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Driver kind.
    pub driver: OutputDriverKind,
    /// Root of the sysfs GPIO tree.
    pub sysfs_root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            driver: OutputDriverKind::Memory,
            sysfs_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

/// Link monitoring section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Address whose reachability defines "link up", `host:port`.
    pub probe_address: String,
    /// Probe connect timeout in ms.
    pub probe_timeout_ms: u64,
    /// Program and arguments run when the link is down. Empty disables
    /// reconnecting.
    pub reconnect_command: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            probe_address: "1.1.1.1:53".into(),
            probe_timeout_ms: 500,
            reconnect_command: Vec::new(),
        }
    }
}

impl LinkConfig {
    /// Probe connect timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl HydropumpConfig {
    /// Validates this configuration.
    ///
    /// Checks:
    /// - at least one pump, each with a non-empty unique code, a unique
    ///   channel and a positive pulse duration
    /// - every interval and timeout is greater than 0
    /// - the trigger poll period is below one second
    /// - the timer pool can hold one timer per pump
    /// - the UTC offset is less than a day
    /// - the cloud section is valid
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.pumps.is_empty() {
            return Err(PumpError::Config("at least one pump is required".into()));
        }

        let mut codes = HashSet::new();
        let mut channels = HashSet::new();
        for pump in &self.pumps {
            if pump.code.trim().is_empty() {
                return Err(PumpError::Config("pump code must not be empty".into()));
            }
            if !codes.insert(pump.code.as_str()) {
                return Err(PumpError::Config(format!(
                    "duplicate pump code {:?}",
                    pump.code
                )));
            }
            if !channels.insert(pump.channel) {
                return Err(PumpError::Config(format!(
                    "channel {} is used by more than one pump",
                    pump.channel
                )));
            }
            if pump.pulse_duration_ms == 0 {
                return Err(PumpError::Config(format!(
                    "pump {:?}: pulse_duration_ms must be greater than 0",
                    pump.code
                )));
            }
        }

        for (name, value) in [
            ("intervals.trigger_poll_ms", self.intervals.trigger_poll_ms),
            ("intervals.config_sync_secs", self.intervals.config_sync_secs),
            ("intervals.clock_sync_secs", self.intervals.clock_sync_secs),
            ("intervals.link_check_ms", self.intervals.link_check_ms),
            ("timeouts.fetch_secs", self.timeouts.fetch_secs),
            ("timeouts.time_secs", self.timeouts.time_secs),
            ("link.probe_timeout_ms", self.link.probe_timeout_ms),
        ] {
            if value == 0 {
                return Err(PumpError::Config(format!("{name} must be greater than 0")));
            }
        }

        if self.intervals.trigger_poll_ms >= 1_000 {
            return Err(PumpError::Config(format!(
                "intervals.trigger_poll_ms must be below 1000 to observe every \
                 scheduled second, got {}",
                self.intervals.trigger_poll_ms
            )));
        }

        if self.timers.pool_capacity == 0 {
            return Err(PumpError::Config(
                "timers.pool_capacity must be greater than 0".into(),
            ));
        }
        if self.timers.pool_capacity < self.pumps.len() {
            return Err(PumpError::Config(format!(
                "timers.pool_capacity {} cannot hold {} pumps",
                self.timers.pool_capacity,
                self.pumps.len()
            )));
        }

        self.clock.utc_offset()?;
        self.cloud
            .validate()
            .map_err(|e| PumpError::Config(format!("cloud: {e}")))?;
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PumpError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PumpError::Config(e.to_string()))
    }

    /// Returns the default config file path: `~/.config/hydropump/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("hydropump").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("hydropump")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/hydropump-config/config.toml")
        }
    }
}
