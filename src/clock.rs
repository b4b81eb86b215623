//! Local clock approximation.
//!
//! [`ClockCache`] keeps the last successful time-of-day sample together with
//! the monotonic instant it was taken, and extrapolates from it: readers get
//! the sampled time advanced by the monotonic time elapsed since, formatted
//! as `"HH:MM:SS"`. Staleness is bounded by the clock-sync period plus the
//! drift of the local monotonic clock over that period.
//!
//! Time sources implement [`TimeSource`]: [`SntpTimeSource`] queries an NTP
//! server over UDP, [`SystemTimeSource`] reads the host clock. Both apply a
//! fixed UTC offset.

use crate::error::{PumpError, Result};
use crate::schedule::TIME_FORMAT;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta, Utc};
use std::sync::RwLock;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;

/// Seconds between the NTP era start (1900) and the Unix epoch.
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

/// SNTP packet size (RFC 4330).
const SNTP_PACKET_LEN: usize = 48;

/// LI = 0, VN = 3, Mode = 3 (client).
const SNTP_CLIENT_HEADER: u8 = 0x1B;

/// Source of the current local time of day.
#[async_trait]
pub trait TimeSource: Send + Sync + 'static {
    /// Current local time as `"HH:MM:SS"`.
    async fn current_formatted_time(&self) -> Result<String>;
}

#[derive(Debug, Clone, Copy)]
struct ClockSample {
    time: NaiveTime,
    taken_at: Instant,
}

/// Shared, extrapolating cache of the local time of day.
#[derive(Debug, Default)]
pub struct ClockCache {
    sample: RwLock<Option<ClockSample>>,
}

impl ClockCache {
    /// An empty cache; no time is reported until the first sync.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh sample taken now.
    pub fn record(&self, time: NaiveTime) {
        let sample = ClockSample {
            time,
            taken_at: Instant::now(),
        };
        *self.sample.write().unwrap_or_else(|e| e.into_inner()) = Some(sample);
    }

    /// Parse a `"HH:MM:SS"` string from a time source and record it.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::Transport`] if `raw` is not a valid time; the
    /// previous sample is kept.
    pub fn record_formatted(&self, raw: &str) -> Result<NaiveTime> {
        let time = NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT).map_err(|e| {
            PumpError::Transport(format!("time source returned {raw:?}: {e}"))
        })?;
        self.record(time);
        Ok(time)
    }

    /// Current local time of day, if a sample exists.
    pub fn now(&self) -> Option<NaiveTime> {
        let sample = (*self.sample.read().unwrap_or_else(|e| e.into_inner()))?;
        let elapsed = TimeDelta::from_std(sample.taken_at.elapsed()).unwrap_or(TimeDelta::zero());
        Some(sample.time.overflowing_add_signed(elapsed).0)
    }

    /// Current local time formatted as `"HH:MM:SS"`, if a sample exists.
    pub fn formatted_time(&self) -> Option<String> {
        self.now().map(|time| time.format(TIME_FORMAT).to_string())
    }

    /// Time since the last successful sync.
    pub fn age(&self) -> Option<Duration> {
        self.sample
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .map(|sample| sample.taken_at.elapsed())
    }
}

/// Simple NTP client over UDP.
#[derive(Debug, Clone)]
pub struct SntpTimeSource {
    server: String,
    utc_offset: FixedOffset,
    timeout: Duration,
}

impl SntpTimeSource {
    /// Query `server` (`host:port`) and shift the result by `utc_offset`.
    pub fn new(server: impl Into<String>, utc_offset: FixedOffset, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            utc_offset,
            timeout,
        }
    }

    /// One SNTP round trip.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::Transport`] on socket errors, timeout, or an
    /// unusable reply.
    pub async fn query(&self) -> Result<DateTime<Utc>> {
        let transport = |what: &str, e: std::io::Error| {
            PumpError::Transport(format!("sntp {what} {}: {e}", self.server))
        };

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| transport("bind for", e))?;
        socket
            .connect(&self.server)
            .await
            .map_err(|e| transport("connect to", e))?;

        let mut request = [0u8; SNTP_PACKET_LEN];
        request[0] = SNTP_CLIENT_HEADER;
        socket
            .send(&request)
            .await
            .map_err(|e| transport("send to", e))?;

        let mut response = [0u8; SNTP_PACKET_LEN];
        let len = tokio::time::timeout(self.timeout, socket.recv(&mut response))
            .await
            .map_err(|_| {
                PumpError::Transport(format!(
                    "sntp reply from {} timed out after {:?}",
                    self.server, self.timeout
                ))
            })?
            .map_err(|e| transport("recv from", e))?;

        parse_sntp_response(&response[..len])
    }
}

#[async_trait]
impl TimeSource for SntpTimeSource {
    async fn current_formatted_time(&self) -> Result<String> {
        let utc = self.query().await?;
        Ok(format_local(utc, self.utc_offset))
    }
}

/// Host clock with a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    utc_offset: FixedOffset,
}

impl SystemTimeSource {
    /// Read the host clock and shift it by `utc_offset`.
    pub fn new(utc_offset: FixedOffset) -> Self {
        Self { utc_offset }
    }
}

#[async_trait]
impl TimeSource for SystemTimeSource {
    async fn current_formatted_time(&self) -> Result<String> {
        Ok(format_local(Utc::now(), self.utc_offset))
    }
}

/// Format a UTC instant as local `"HH:MM:SS"`.
pub fn format_local(utc: DateTime<Utc>, utc_offset: FixedOffset) -> String {
    utc.with_timezone(&utc_offset)
        .format(TIME_FORMAT)
        .to_string()
}

fn parse_sntp_response(packet: &[u8]) -> Result<DateTime<Utc>> {
    if packet.len() < SNTP_PACKET_LEN {
        return Err(PumpError::Transport(format!(
            "sntp reply too short: {} bytes",
            packet.len()
        )));
    }
    let mode = packet[0] & 0x07;
    if mode != 4 && mode != 5 {
        return Err(PumpError::Transport(format!(
            "sntp reply has unexpected mode {mode}"
        )));
    }
    if packet[1] == 0 {
        return Err(PumpError::Transport("sntp kiss-of-death reply".into()));
    }

    let secs = u64::from(u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]));
    let fraction = u64::from(u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]));
    let unix_secs = secs.checked_sub(NTP_UNIX_OFFSET_SECS).ok_or_else(|| {
        PumpError::Transport(format!("sntp transmit timestamp {secs} predates 1970"))
    })?;
    let nanos = ((fraction * 1_000_000_000) >> 32) as u32;

    DateTime::from_timestamp(unix_secs as i64, nanos)
        .ok_or_else(|| PumpError::Transport(format!("sntp timestamp {unix_secs} out of range")))
}
