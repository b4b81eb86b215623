//! Scheduler: owns the pump lines and spawns the long-running tasks.
//!
//! Startup order mirrors the firmware this controller replaces: force every
//! output LOW, sync the clock once, sync every pump's settings once, then
//! spawn the periodic tasks. Each startup step is fail-soft; a pump with no
//! settings yet simply never triggers until a later sync succeeds.

use crate::clock::{ClockCache, TimeSource};
use crate::config::{HydropumpConfig, LockMode, PumpConfig};
use crate::connectivity::Connectivity;
use crate::error::Result;
use crate::output::OutputDriver;
use crate::provider::ConfigProvider;
use crate::pump::PumpLine;
use crate::schedule::PumpSettings;
use crate::scheduler::locks::SyncLocks;
use crate::scheduler::tasks::{
    ClockSyncTask, ConfigSyncTask, ConnectivityTask, TriggerTask, sync_clock_once,
    sync_config_once,
};
use crate::timer::TimerPool;
use chrono::NaiveTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Index of a pump line within its scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PumpId(usize);

impl PumpId {
    /// Id of the pump at `index` in configuration order.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position in [`Scheduler::pumps`].
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for PumpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pump#{}", self.0)
    }
}

/// Task periods, timeouts and lock granularity.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Trigger poll period.
    pub trigger_poll: Duration,
    /// Configuration sync period.
    pub config_sync: Duration,
    /// Clock sync period.
    pub clock_sync: Duration,
    /// Link check period.
    pub link_check: Duration,
    /// Bound on one configuration fetch.
    pub fetch_timeout: Duration,
    /// Bound on one time query.
    pub time_timeout: Duration,
    /// Sync lock granularity.
    pub lock_mode: LockMode,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&HydropumpConfig::default())
    }
}

impl SchedulerOptions {
    /// Options taken from the static configuration.
    pub fn from_config(config: &HydropumpConfig) -> Self {
        Self {
            trigger_poll: config.intervals.trigger_poll(),
            config_sync: config.intervals.config_sync(),
            clock_sync: config.intervals.clock_sync(),
            link_check: config.intervals.link_check(),
            fetch_timeout: config.timeouts.fetch(),
            time_timeout: config.timeouts.time(),
            lock_mode: config.locking.mode,
        }
    }
}

/// Owns every pump line and the shared collaborators.
pub struct Scheduler {
    pumps: Vec<PumpLine>,
    clock: Arc<ClockCache>,
    locks: SyncLocks,
    timers: TimerPool,
    provider: Arc<dyn ConfigProvider>,
    time_source: Arc<dyn TimeSource>,
    connectivity: Option<Arc<dyn Connectivity>>,
    options: SchedulerOptions,
}

impl Scheduler {
    /// Build pump lines for `pumps`, each forced LOW and holding one timer
    /// from `timers`.
    ///
    /// # Errors
    ///
    /// [`PumpError::ResourceExhausted`](crate::PumpError::ResourceExhausted)
    /// if the pool cannot hold a timer per pump, or
    /// [`PumpError::InvalidSettings`](crate::PumpError::InvalidSettings) for a
    /// zero pulse duration.
    pub fn new(
        pumps: &[PumpConfig],
        output: Arc<dyn OutputDriver>,
        timers: TimerPool,
        provider: Arc<dyn ConfigProvider>,
        time_source: Arc<dyn TimeSource>,
        options: SchedulerOptions,
    ) -> Result<Self> {
        let lines = pumps
            .iter()
            .map(|pump| {
                PumpLine::new(
                    pump.code.clone(),
                    pump.channel,
                    pump.pulse_duration(),
                    Arc::clone(&output),
                    &timers,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            pumps = lines.len(),
            lock_mode = ?options.lock_mode,
            timers = timers.in_use(),
            "scheduler created"
        );

        Ok(Self {
            locks: SyncLocks::new(options.lock_mode, lines.len()),
            pumps: lines,
            clock: Arc::new(ClockCache::new()),
            timers,
            provider,
            time_source,
            connectivity: None,
            options,
        })
    }

    /// Validate `config` and build a scheduler from it.
    ///
    /// # Errors
    ///
    /// [`PumpError::Config`](crate::PumpError::Config) if the configuration is
    /// invalid, otherwise as [`Scheduler::new`].
    pub fn from_config(
        config: &HydropumpConfig,
        output: Arc<dyn OutputDriver>,
        provider: Arc<dyn ConfigProvider>,
        time_source: Arc<dyn TimeSource>,
    ) -> Result<Self> {
        config.validate()?;
        Self::new(
            &config.pumps,
            output,
            TimerPool::new(config.timers.pool_capacity),
            provider,
            time_source,
            SchedulerOptions::from_config(config),
        )
    }

    /// Watch `link` with a [`ConnectivityTask`] once running.
    pub fn with_connectivity(mut self, link: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(link);
        self
    }

    /// All pump lines, in configuration order.
    pub fn pumps(&self) -> &[PumpLine] {
        &self.pumps
    }

    /// Ids of all pump lines.
    pub fn pump_ids(&self) -> impl Iterator<Item = PumpId> + use<> {
        (0..self.pumps.len()).map(PumpId::new)
    }

    /// Pump line by id.
    pub fn pump(&self, id: PumpId) -> Option<&PumpLine> {
        self.pumps.get(id.index())
    }

    /// Pump line by code.
    pub fn find_by_code(&self, code: &str) -> Option<&PumpLine> {
        self.pumps.iter().find(|pump| pump.code() == code)
    }

    /// Pump line by output channel.
    pub fn find_by_channel(&self, channel: u8) -> Option<&PumpLine> {
        self.pumps.iter().find(|pump| pump.channel() == channel)
    }

    /// Manual control by channel. Returns the new active state, or `None`
    /// if no pump drives `channel`.
    pub fn toggle_channel(&self, channel: u8) -> Option<bool> {
        let pump = self.find_by_channel(channel)?;
        let active = pump.toggle();
        info!(pump = %pump.code(), channel, active, "manual toggle");
        Some(active)
    }

    /// Shared clock cache.
    pub fn clock(&self) -> &Arc<ClockCache> {
        &self.clock
    }

    /// Timer pool the pump lines draw from.
    pub fn timers(&self) -> &TimerPool {
        &self.timers
    }

    /// Active options.
    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// One clock sync under the clock lock.
    ///
    /// # Errors
    ///
    /// As [`sync_clock_once`].
    pub async fn sync_clock(&self) -> Result<NaiveTime> {
        sync_clock_once(
            self.time_source.as_ref(),
            &self.clock,
            &self.locks.clock(),
            self.options.time_timeout,
        )
        .await
    }

    /// One configuration sync of `id` under its lock.
    ///
    /// # Errors
    ///
    /// As [`sync_config_once`].
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to this scheduler.
    pub async fn sync_pump(&self, id: PumpId) -> Result<Arc<PumpSettings>> {
        sync_config_once(
            &self.pumps[id.index()],
            self.provider.as_ref(),
            &self.locks.pump(id),
            self.options.fetch_timeout,
        )
        .await
    }

    /// Initial pass: one clock sync, then one configuration sync per pump.
    /// Failures are logged and do not stop the pass.
    pub async fn startup(&self) {
        match self.sync_clock().await {
            Ok(time) => info!(%time, "initial clock sync"),
            Err(e) => error!(error = %e, "initial clock sync failed"),
        }
        for id in self.pump_ids() {
            let code = self.pumps[id.index()].code();
            match self.sync_pump(id).await {
                Ok(settings) => info!(
                    pump = %code,
                    triggers = settings.schedule.len(),
                    pulse_ms = settings.pulse_duration.as_millis() as u64,
                    "initial config loaded"
                ),
                Err(e) => error!(pump = %code, error = %e, "initial config sync failed"),
            }
        }
    }

    /// Spawn every periodic task. Tasks run until `cancel` fires, and the
    /// sync tasks do their first round immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.spawn_tasks(cancel, false)
    }

    /// Startup pass followed by the periodic tasks. The sync tasks wait one
    /// period before their first round, since startup has just done it.
    pub async fn start(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.startup().await;
        self.spawn_tasks(cancel, true)
    }

    fn spawn_tasks(&self, cancel: &CancellationToken, synced: bool) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2 * self.pumps.len() + 2);

        handles.push(tokio::spawn(
            ClockSyncTask {
                source: Arc::clone(&self.time_source),
                cache: Arc::clone(&self.clock),
                lock: self.locks.clock(),
                period: self.options.clock_sync,
                timeout: self.options.time_timeout,
                delay_first: synced,
            }
            .run(cancel.child_token()),
        ));

        for id in self.pump_ids() {
            let pump = &self.pumps[id.index()];
            handles.push(tokio::spawn(
                ConfigSyncTask {
                    pump: pump.clone(),
                    provider: Arc::clone(&self.provider),
                    lock: self.locks.pump(id),
                    period: self.options.config_sync,
                    timeout: self.options.fetch_timeout,
                    delay_first: synced,
                }
                .run(cancel.child_token()),
            ));
            handles.push(tokio::spawn(
                TriggerTask {
                    pump: pump.clone(),
                    clock: Arc::clone(&self.clock),
                    period: self.options.trigger_poll,
                }
                .run(cancel.child_token()),
            ));
        }

        if let Some(link) = &self.connectivity {
            handles.push(tokio::spawn(
                ConnectivityTask {
                    link: Arc::clone(link),
                    period: self.options.link_check,
                }
                .run(cancel.child_token()),
            ));
        }

        info!(tasks = handles.len(), "scheduler tasks spawned");
        handles
    }

    /// Wait for the tasks from [`start`](Self::start) or
    /// [`spawn`](Self::spawn) to finish, then force every pump off.
    ///
    /// Pumps are switched off even when a task failed.
    ///
    /// # Errors
    ///
    /// Returns the first task's [`JoinError`], after every pump is off.
    pub async fn shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
    ) -> std::result::Result<(), JoinError> {
        let mut first_error = None;
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler task failed");
                first_error.get_or_insert(e);
            }
        }
        self.stop_all();
        first_error.map_or(Ok(()), Err)
    }

    /// Force every pump off.
    pub fn stop_all(&self) {
        for pump in &self.pumps {
            if pump.stop_pump() {
                warn!(pump = %pump.code(), "pulse cut short by shutdown");
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pumps", &self.pumps)
            .field("lock_mode", &self.locks.mode())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
