//! Pump document types returned by the data API.

use serde::{Deserialize, Serialize};

/// One daily trigger time in a pump document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Time of day, `"HH:MM:SS"`.
    pub time: String,
    /// Whether the entry is active. Older documents call this `state`.
    #[serde(alias = "state", default)]
    pub enabled: bool,
}

impl ScheduleEntry {
    /// Create an entry.
    pub fn new(time: impl Into<String>, enabled: bool) -> Self {
        Self {
            time: time.into(),
            enabled,
        }
    }
}

/// A pump's remote configuration: schedule entries plus pulse duration.
///
/// Callers fold it into their own state and drop it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// All schedule entries, enabled or not, in document order.
    #[serde(alias = "driveTimes", default)]
    pub schedule: Vec<ScheduleEntry>,
    /// Pulse duration in milliseconds.
    pub pulse_duration: u64,
}

impl RemoteConfig {
    /// Iterate over the time strings of enabled entries.
    pub fn enabled_times(&self) -> impl Iterator<Item = &str> {
        self.schedule
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.time.as_str())
    }
}

/// Envelope returned by the data API `findOne` action.
#[derive(Debug, Deserialize)]
pub(crate) struct FindOneResponse {
    #[serde(default)]
    pub document: Option<RemoteConfig>,
}
