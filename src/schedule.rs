//! Daily trigger times and the per-pump settings snapshot.
//!
//! A pump's schedule is a set of exact `"HH:MM:SS"` strings. Triggering
//! compares them by string equality against the formatted clock, so every
//! [`DriveTime`] is normalised at parse time: it must round-trip through
//! the same `%H:%M:%S` format the clock uses.

use crate::error::{PumpError, Result};
use chrono::NaiveTime;
use hydropump_cloud::RemoteConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Clock format shared by schedules and the clock cache.
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// One daily trigger time, `"HH:MM:SS"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DriveTime(String);

impl DriveTime {
    /// Parse and validate a trigger time.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::InvalidSettings`] unless `raw` is a valid
    /// zero-padded `HH:MM:SS` time of day.
    pub fn parse(raw: &str) -> Result<Self> {
        let time = NaiveTime::parse_from_str(raw, TIME_FORMAT)
            .map_err(|e| PumpError::InvalidSettings(format!("invalid time {raw:?}: {e}")))?;
        let normalised = time.format(TIME_FORMAT).to_string();
        if normalised != raw {
            return Err(PumpError::InvalidSettings(format!(
                "time {raw:?} must be written as {normalised:?}"
            )));
        }
        Ok(Self(normalised))
    }

    /// The trigger time as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<NaiveTime> for DriveTime {
    fn from(time: NaiveTime) -> Self {
        Self(time.format(TIME_FORMAT).to_string())
    }
}

impl TryFrom<String> for DriveTime {
    type Error = PumpError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<DriveTime> for String {
    fn from(time: DriveTime) -> Self {
        time.0
    }
}

impl std::fmt::Display for DriveTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of daily trigger times. Entries are unique; order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleSet(BTreeSet<DriveTime>);

impl ScheduleSet {
    /// An empty schedule (the pump never triggers on its own).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schedule from time strings, collapsing duplicates.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid time string.
    pub fn from_times<I, S>(times: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        times
            .into_iter()
            .map(|raw| DriveTime::parse(raw.as_ref()))
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }

    /// Whether `formatted_now` equals one of the trigger times.
    pub fn matches(&self, formatted_now: &str) -> bool {
        self.0.iter().any(|time| time.as_str() == formatted_now)
    }

    /// Number of trigger times.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the schedule has no trigger times.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Trigger times in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &DriveTime> {
        self.0.iter()
    }
}

/// Schedule and pulse duration of one pump, swapped as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpSettings {
    /// Daily trigger times.
    pub schedule: ScheduleSet,
    /// How long one activation keeps the output on.
    pub pulse_duration: Duration,
}

impl PumpSettings {
    /// Build settings, rejecting a zero pulse duration.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::InvalidSettings`] if `pulse_duration` is zero.
    pub fn new(schedule: ScheduleSet, pulse_duration: Duration) -> Result<Self> {
        validate_pulse_duration(pulse_duration)?;
        Ok(Self {
            schedule,
            pulse_duration,
        })
    }

    /// Fold a fetched document into settings.
    ///
    /// Only enabled entries are kept. Disabled entries are not validated.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::MalformedConfig`] if an enabled entry has an
    /// invalid time or the pulse duration is zero.
    pub fn from_remote(remote: &RemoteConfig) -> Result<Self> {
        let schedule = ScheduleSet::from_times(remote.enabled_times())
            .map_err(|e| PumpError::MalformedConfig(e.to_string()))?;
        Self::new(schedule, Duration::from_millis(remote.pulse_duration))
            .map_err(|e| PumpError::MalformedConfig(e.to_string()))
    }
}

pub(crate) fn validate_pulse_duration(pulse_duration: Duration) -> Result<()> {
    if pulse_duration.is_zero() {
        return Err(PumpError::InvalidSettings(
            "pulse duration must be greater than 0".into(),
        ));
    }
    Ok(())
}
