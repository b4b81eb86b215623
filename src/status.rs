//! Point-in-time view of the controller for operators.

use crate::output::Level;
use crate::scheduler::Scheduler;
use serde::Serialize;

/// State of one pump line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PumpStatus {
    pub code: String,
    pub channel: u8,
    pub active: bool,
    pub output: Level,
    pub pulse_duration_ms: u64,
    /// Trigger times in ascending order.
    pub schedule: Vec<String>,
}

/// Cached time plus every pump's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    /// `"HH:MM:SS"`, or `None` before the first clock sync.
    pub time: Option<String>,
    /// Seconds since the last clock sync.
    pub clock_age_secs: Option<u64>,
    pub pumps: Vec<PumpStatus>,
}

impl SystemStatus {
    /// Capture the current state of `scheduler`. Never blocks on a sync.
    pub fn capture(scheduler: &Scheduler) -> Self {
        let clock = scheduler.clock();
        Self {
            time: clock.formatted_time(),
            clock_age_secs: clock.age().map(|age| age.as_secs()),
            pumps: scheduler
                .pumps()
                .iter()
                .map(|pump| {
                    let settings = pump.settings();
                    PumpStatus {
                        code: pump.code().to_owned(),
                        channel: pump.channel(),
                        active: pump.is_active(),
                        output: pump.output_level(),
                        pulse_duration_ms: settings.pulse_duration.as_millis() as u64,
                        schedule: settings
                            .schedule
                            .iter()
                            .map(|time| time.as_str().to_owned())
                            .collect(),
                    }
                })
                .collect(),
        }
    }
}
