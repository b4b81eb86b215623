//! The four long-running tasks.
//!
//! Each task is a small struct with a `run` method that loops until its
//! cancellation token fires. A failed iteration is logged and retried on
//! the next period; no task ends on error.
//!
//! The single-iteration helpers ([`sync_clock_once`], [`sync_config_once`],
//! [`trigger_once`], [`check_link_once`]) are public so the startup pass and
//! the CLI one-shots can reuse them.

use crate::clock::{ClockCache, TimeSource};
use crate::connectivity::Connectivity;
use crate::error::{PumpError, Result};
use crate::provider::ConfigProvider;
use crate::pump::PumpLine;
use crate::schedule::PumpSettings;
use crate::scheduler::locks::SyncLock;
use chrono::NaiveTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Query the time source under `lock` and record the result.
///
/// # Errors
///
/// Returns [`PumpError::Transport`] if the query fails, times out, or
/// returns an unparsable time. The cache keeps its previous sample.
pub async fn sync_clock_once(
    source: &dyn TimeSource,
    cache: &ClockCache,
    lock: &Mutex<()>,
    timeout: Duration,
) -> Result<NaiveTime> {
    let _guard = lock.lock().await;
    let raw = tokio::time::timeout(timeout, source.current_formatted_time())
        .await
        .map_err(|_| PumpError::Transport(format!("time query timed out after {timeout:?}")))??;
    cache.record_formatted(&raw)
}

/// Fetch the pump's document under `lock` and swap its settings.
///
/// Only enabled entries are kept. On any error the pump is left exactly as
/// it was.
///
/// # Errors
///
/// [`PumpError::Transport`] on fetch failure or timeout,
/// [`PumpError::MalformedConfig`] on an unusable document.
pub async fn sync_config_once(
    pump: &PumpLine,
    provider: &dyn ConfigProvider,
    lock: &Mutex<()>,
    timeout: Duration,
) -> Result<Arc<PumpSettings>> {
    let _guard = lock.lock().await;
    let remote = tokio::time::timeout(timeout, provider.fetch_config(pump.code()))
        .await
        .map_err(|_| {
            PumpError::Transport(format!(
                "fetch for {} timed out after {timeout:?}",
                pump.code()
            ))
        })??;
    let settings = PumpSettings::from_remote(&remote)?;
    pump.apply_settings(settings);
    Ok(pump.settings())
}

/// Start the pump if the cached time equals one of its trigger times.
///
/// Returns whether a new pulse was started. Nothing happens before the first
/// clock sync.
pub fn trigger_once(pump: &PumpLine, clock: &ClockCache) -> bool {
    let Some(now) = clock.formatted_time() else {
        return false;
    };
    pump.settings().schedule.matches(&now) && pump.start_pump()
}

/// Probe the link and request a reconnect if it is down.
///
/// Returns whether the link was up.
pub async fn check_link_once(link: &dyn Connectivity) -> bool {
    if link.is_connected().await {
        return true;
    }
    link.reconnect().await;
    false
}

/// Sleep for `period`, or return `false` as soon as `cancel` fires.
async fn pause(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

/// Keeps the clock cache fresh.
pub struct ClockSyncTask {
    /// Time source to query.
    pub source: Arc<dyn TimeSource>,
    /// Cache written on success.
    pub cache: Arc<ClockCache>,
    /// Clock sync lock.
    pub lock: SyncLock,
    /// Period between queries.
    pub period: Duration,
    /// Bound on one query.
    pub timeout: Duration,
    /// Wait one period before the first query. Set when a startup pass has
    /// just synced the clock.
    pub delay_first: bool,
}

impl ClockSyncTask {
    /// Loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        debug!(period = ?self.period, "clock sync task started");
        if self.delay_first && !pause(&cancel, self.period).await {
            debug!("clock sync task stopped");
            return;
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = sync_clock_once(self.source.as_ref(), &self.cache, &self.lock, self.timeout) => {
                    match result {
                        Ok(time) => debug!(%time, "clock synced"),
                        Err(e) => warn!(error = %e, "clock sync failed, keeping previous time"),
                    }
                }
            }
            if !pause(&cancel, self.period).await {
                break;
            }
        }
        debug!("clock sync task stopped");
    }
}

/// Pulls one pump's settings from the provider.
pub struct ConfigSyncTask {
    /// Pump to update.
    pub pump: PumpLine,
    /// Remote configuration provider.
    pub provider: Arc<dyn ConfigProvider>,
    /// The pump's sync lock.
    pub lock: SyncLock,
    /// Period between fetches.
    pub period: Duration,
    /// Bound on one fetch.
    pub timeout: Duration,
    /// Wait one period before the first fetch. Set when a startup pass has
    /// just loaded this pump.
    pub delay_first: bool,
}

impl ConfigSyncTask {
    /// Loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        debug!(pump = %self.pump.code(), period = ?self.period, "config sync task started");
        if self.delay_first && !pause(&cancel, self.period).await {
            debug!(pump = %self.pump.code(), "config sync task stopped");
            return;
        }
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = sync_config_once(&self.pump, self.provider.as_ref(), &self.lock, self.timeout) => {
                    match result {
                        Ok(settings) => debug!(
                            pump = %self.pump.code(),
                            triggers = settings.schedule.len(),
                            pulse_ms = settings.pulse_duration.as_millis() as u64,
                            "config synced"
                        ),
                        Err(e) => warn!(
                            pump = %self.pump.code(),
                            error = %e,
                            "config sync failed, keeping previous settings"
                        ),
                    }
                }
            }
            if !pause(&cancel, self.period).await {
                break;
            }
        }
        debug!(pump = %self.pump.code(), "config sync task stopped");
    }
}

/// Polls the clock and starts one pump at its trigger times.
pub struct TriggerTask {
    /// Pump to start.
    pub pump: PumpLine,
    /// Clock to compare against.
    pub clock: Arc<ClockCache>,
    /// Poll period.
    pub period: Duration,
}

impl TriggerTask {
    /// Loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        debug!(pump = %self.pump.code(), period = ?self.period, "trigger task started");
        loop {
            if trigger_once(&self.pump, &self.clock) {
                info!(pump = %self.pump.code(), "scheduled pulse started");
            }
            if !pause(&cancel, self.period).await {
                break;
            }
        }
        debug!(pump = %self.pump.code(), "trigger task stopped");
    }
}

/// Watches the network link and asks it to reconnect when it drops.
pub struct ConnectivityTask {
    /// Link to watch.
    pub link: Arc<dyn Connectivity>,
    /// Check period.
    pub period: Duration,
}

impl ConnectivityTask {
    /// Loop until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        debug!(period = ?self.period, "connectivity task started");
        let mut was_up = true;
        loop {
            let up = tokio::select! {
                _ = cancel.cancelled() => break,
                up = check_link_once(self.link.as_ref()) => up,
            };
            if up != was_up {
                if up {
                    info!("link restored");
                } else {
                    let e = PumpError::LinkDown("probe failed".into());
                    warn!(error = %e, "reconnecting");
                }
                was_up = up;
            }
            if !pause(&cancel, self.period).await {
                break;
            }
        }
        debug!("connectivity task stopped");
    }
}
