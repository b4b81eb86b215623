//! Pump line state machine.
//!
//! A [`PumpLine`] drives one relay output. It is either Idle (output LOW) or
//! Active (output HIGH); the output level always equals the active flag.
//!
//! ```text
//! ┌──────┐  start_pump   ┌────────┐
//! │ Idle ├──────────────►│ Active │──┐ start_pump: no-op
//! └──▲───┘               └───┬────┘◄─┘
//!    │  stop_pump / timer    │
//!    └───────────────────────┘
//! ```
//!
//! Every activation arms the line's own one-shot [`TimerResource`] for the
//! pulse duration in force at that moment; its expiry is the automatic path
//! back to Idle. A second `start_pump` while Active neither re-arms nor
//! extends the pulse, which is what keeps a trigger poll that sees the same
//! scheduled second several times from stretching the pulse.
//!
//! Schedule and pulse duration live in an immutable [`PumpSettings`]
//! snapshot behind an `RwLock<Arc<_>>`. Writers swap the whole `Arc`;
//! readers clone it, so a reader sees the old or the new settings, never a
//! mix, and never waits on a network call.

use crate::error::Result;
use crate::output::{Level, OutputDriver};
use crate::schedule::{PumpSettings, ScheduleSet, validate_pulse_duration};
use crate::timer::{ExpiryCallback, TimerPool, TimerResource};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tracing::{info, trace, warn};

/// Handle to one pump line. Clones share the same line.
#[derive(Clone)]
pub struct PumpLine {
    inner: Arc<PumpLineInner>,
}

struct PumpLineInner {
    code: String,
    channel: u8,
    output: Arc<dyn OutputDriver>,
    settings: RwLock<Arc<PumpSettings>>,
    active: Mutex<bool>,
    timer: TimerResource,
}

impl PumpLine {
    /// Create an Idle pump line with an empty schedule.
    ///
    /// The output is forced LOW before the line exists, so a restart in the
    /// middle of a pulse never leaves a relay on.
    ///
    /// # Errors
    ///
    /// - [`PumpError::InvalidSettings`](crate::PumpError::InvalidSettings) if
    ///   `pulse_duration` is zero
    /// - [`PumpError::ResourceExhausted`](crate::PumpError::ResourceExhausted)
    ///   if no timer can be allocated
    pub fn new(
        code: impl Into<String>,
        channel: u8,
        pulse_duration: Duration,
        output: Arc<dyn OutputDriver>,
        timers: &TimerPool,
    ) -> Result<Self> {
        let code = code.into();
        validate_pulse_duration(pulse_duration)?;

        if output.level(channel).is_high() {
            warn!(pump = %code, channel, "output was HIGH at startup, forcing LOW");
        }
        output.set_level(channel, Level::Low);

        let slot = timers.reserve()?;
        let timer_name = format!("pump-{code}");

        let inner = Arc::new_cyclic(|weak: &Weak<PumpLineInner>| {
            let weak = weak.clone();
            let on_expire: ExpiryCallback = Arc::new(move || {
                if let Some(line) = weak.upgrade() {
                    line.expire();
                }
            });
            PumpLineInner {
                code,
                channel,
                output,
                settings: RwLock::new(Arc::new(PumpSettings {
                    schedule: ScheduleSet::new(),
                    pulse_duration,
                })),
                active: Mutex::new(false),
                timer: TimerResource::with_slot(slot, timer_name, pulse_duration, false, on_expire),
            }
        });

        Ok(Self { inner })
    }

    /// Pump code used to look up the remote document, e.g. `"#03"`.
    pub fn code(&self) -> &str {
        &self.inner.code
    }

    /// Output channel (GPIO number).
    pub fn channel(&self) -> u8 {
        self.inner.channel
    }

    /// Start a pulse. Returns `false` (and changes nothing) if already Active.
    pub fn start_pump(&self) -> bool {
        let mut active = self.inner.lock_active();
        self.inner.activate(&mut active)
    }

    /// End the pulse. Returns `false` if the line was already Idle.
    pub fn stop_pump(&self) -> bool {
        let mut active = self.inner.lock_active();
        self.inner.deactivate(&mut active, "stopped")
    }

    /// Manual control: stop an Active line, start an Idle one.
    ///
    /// Returns the new active state.
    pub fn toggle(&self) -> bool {
        let mut active = self.inner.lock_active();
        if *active {
            self.inner.deactivate(&mut active, "toggled off");
        } else {
            self.inner.activate(&mut active);
        }
        *active
    }

    /// Whether a pulse is in progress.
    pub fn is_active(&self) -> bool {
        *self.inner.lock_active()
    }

    /// Current level of the line's output, read back from the driver.
    pub fn output_level(&self) -> Level {
        self.inner.output.level(self.inner.channel)
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Arc<PumpSettings> {
        Arc::clone(&self.inner.settings.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Current schedule.
    pub fn schedule(&self) -> ScheduleSet {
        self.settings().schedule.clone()
    }

    /// Pulse duration the next activation will use.
    pub fn pulse_duration(&self) -> Duration {
        self.settings().pulse_duration
    }

    /// Replace schedule and pulse duration in one step.
    ///
    /// An in-flight pulse keeps the duration it was armed with.
    pub fn apply_settings(&self, settings: PumpSettings) {
        *self.inner.write_settings() = Arc::new(settings);
    }

    /// Replace the schedule, keeping the pulse duration.
    pub fn set_schedule(&self, schedule: ScheduleSet) {
        let mut settings = self.inner.write_settings();
        let pulse_duration = settings.pulse_duration;
        *settings = Arc::new(PumpSettings {
            schedule,
            pulse_duration,
        });
    }

    /// Change the pulse duration used by the next activation.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::InvalidSettings`](crate::PumpError::InvalidSettings)
    /// if `pulse_duration` is zero.
    pub fn set_pulse_duration(&self, pulse_duration: Duration) -> Result<()> {
        validate_pulse_duration(pulse_duration)?;
        let mut settings = self.inner.write_settings();
        let schedule = settings.schedule.clone();
        *settings = Arc::new(PumpSettings {
            schedule,
            pulse_duration,
        });
        Ok(())
    }
}

impl PumpLineInner {
    fn lock_active(&self) -> MutexGuard<'_, bool> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_settings(&self) -> std::sync::RwLockWriteGuard<'_, Arc<PumpSettings>> {
        self.settings.write().unwrap_or_else(|e| e.into_inner())
    }

    fn activate(&self, active: &mut bool) -> bool {
        if *active {
            return false;
        }

        let pulse_duration = self
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .pulse_duration;
        if self.timer.period() != pulse_duration {
            self.timer.change_period(pulse_duration);
        }

        *active = true;
        self.output.set_level(self.channel, Level::High);
        self.timer.start();
        info!(
            pump = %self.code,
            channel = self.channel,
            pulse_ms = pulse_duration.as_millis() as u64,
            "pump on"
        );
        true
    }

    fn deactivate(&self, active: &mut bool, reason: &'static str) -> bool {
        self.timer.stop();
        self.output.set_level(self.channel, Level::Low);
        if !*active {
            return false;
        }
        *active = false;
        info!(pump = %self.code, channel = self.channel, reason, "pump off");
        true
    }

    fn expire(&self) {
        let mut active = self.lock_active();
        // The countdown clears `running` before calling back, so a running
        // timer here belongs to a pulse armed after this expiry was due.
        if self.timer.is_running() {
            trace!(pump = %self.code, "stale expiry ignored");
            return;
        }
        self.deactivate(&mut active, "pulse elapsed");
    }
}

impl std::fmt::Debug for PumpLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PumpLine")
            .field("code", &self.inner.code)
            .field("channel", &self.inner.channel)
            .field("active", &self.is_active())
            .field("settings", &self.settings())
            .finish()
    }
}
