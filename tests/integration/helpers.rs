//! Shared helpers for integration tests.

use async_trait::async_trait;
use chrono::{NaiveTime, TimeDelta};
use hydropump::config::PumpConfig;
use hydropump::{
    ConfigProvider, MemoryOutput, PumpError, Result, Scheduler, SchedulerOptions, TimeSource,
    TimerPool,
};
use hydropump_cloud::{RemoteConfig, ScheduleEntry};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Build a remote document from `(time, enabled)` pairs.
pub(crate) fn remote(entries: &[(&str, bool)], pulse_duration_ms: u64) -> RemoteConfig {
    RemoteConfig {
        schedule: entries
            .iter()
            .map(|(time, enabled)| ScheduleEntry::new(*time, *enabled))
            .collect(),
        pulse_duration: pulse_duration_ms,
    }
}

/// What the fake provider does for one fetch.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Doc(RemoteConfig),
    Fail,
    Hang,
}

/// Per-code scripted provider. The last reply for a code repeats.
#[derive(Default)]
pub(crate) struct FakeProvider {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(self, code: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(code.to_owned(), replies.into_iter().collect());
        self
    }

    pub(crate) fn calls_for(&self, code: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == code).count()
    }

    fn next_reply(&self, code: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(code) {
            Some(replies) if replies.len() > 1 => replies.pop_front().unwrap(),
            Some(replies) => replies.front().cloned().unwrap_or(Reply::Fail),
            None => Reply::Fail,
        }
    }
}

#[async_trait]
impl ConfigProvider for FakeProvider {
    async fn fetch_config(&self, pump_code: &str) -> Result<RemoteConfig> {
        self.calls.lock().unwrap().push(pump_code.to_owned());
        match self.next_reply(pump_code) {
            Reply::Doc(doc) => Ok(doc),
            Reply::Fail => Err(PumpError::Transport(format!("{pump_code}: 503"))),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Time source that runs forward from `base` with the tokio clock.
pub(crate) struct SimulatedClock {
    base: NaiveTime,
    origin: Instant,
}

impl SimulatedClock {
    pub(crate) fn starting_at(hour: u32, min: u32, sec: u32) -> Self {
        Self {
            base: NaiveTime::from_hms_opt(hour, min, sec).unwrap(),
            origin: Instant::now(),
        }
    }
}

#[async_trait]
impl TimeSource for SimulatedClock {
    async fn current_formatted_time(&self) -> Result<String> {
        let elapsed = TimeDelta::from_std(self.origin.elapsed()).unwrap();
        let now = self.base.overflowing_add_signed(elapsed).0;
        Ok(now.format("%H:%M:%S").to_string())
    }
}

/// One pump `#03` on GPIO 19 with the given options.
pub(crate) fn single_pump_scheduler(
    output: Arc<MemoryOutput>,
    provider: Arc<dyn ConfigProvider>,
    clock: SimulatedClock,
    options: SchedulerOptions,
) -> Scheduler {
    Scheduler::new(
        &[PumpConfig::new("#03", 19, 900_000)],
        output,
        TimerPool::new(1),
        provider,
        Arc::new(clock),
        options,
    )
    .unwrap()
}

/// Pumps `#03` (GPIO 19) and `#04` (GPIO 18).
pub(crate) fn two_pump_scheduler(
    provider: Arc<dyn ConfigProvider>,
    options: SchedulerOptions,
) -> Scheduler {
    Scheduler::new(
        &[
            PumpConfig::new("#03", 19, 900_000),
            PumpConfig::new("#04", 18, 900_000),
        ],
        Arc::new(MemoryOutput::new()),
        TimerPool::new(2),
        provider,
        Arc::new(SimulatedClock::starting_at(12, 0, 0)),
        options,
    )
    .unwrap()
}
