//! Throttled progress logging and human readable byte counts.

use std::time::{Duration, Instant};

use tracing::debug;

use super::constants::PROGRESS_LOG_INTERVAL;

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Formats a byte count with binary units, e.g. `1.50 MiB`.
///
/// ```
/// use chunkfetch_core::download::format_bytes;
///
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.50 KiB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Formats a transfer rate, e.g. `2.00 MiB/s`. Zero elapsed time yields `?`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn format_speed(bytes: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return "?".to_string();
    }
    let per_sec = (bytes as f64 / secs) as u64;
    format!("{}/s", format_bytes(per_sec))
}

/// Emits at most one `debug` progress line per interval for one transfer.
#[derive(Debug)]
pub(crate) struct ProgressLog {
    label: String,
    total: Option<u64>,
    base: u64,
    started: Instant,
    last_logged: Instant,
    last_bytes: u64,
    interval: Duration,
}

impl ProgressLog {
    pub(crate) fn new(label: impl Into<String>, total: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            label: label.into(),
            total,
            base: 0,
            started: now,
            last_logged: now,
            last_bytes: 0,
            interval: PROGRESS_LOG_INTERVAL,
        }
    }

    /// Reports positions offset by `base` bytes already on disk. The
    /// `written` counts passed to [`Self::record`] stay per transfer.
    #[must_use]
    pub(crate) fn starting_at(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Records `written` bytes so far, logging if the interval elapsed.
    pub(crate) fn record(&mut self, written: u64) {
        let now = Instant::now();
        let since = now.duration_since(self.last_logged);
        if since < self.interval {
            return;
        }
        let speed = format_speed(written.saturating_sub(self.last_bytes), since);
        self.log(self.position(written), &speed);
        self.last_logged = now;
        self.last_bytes = written;
    }

    /// Logs the final line with the average speed.
    pub(crate) fn finish(&self, written: u64) {
        let speed = format_speed(written, self.started.elapsed());
        self.log(self.position(written), &speed);
    }

    fn position(&self, written: u64) -> u64 {
        self.base.saturating_add(written)
    }

    fn log(&self, position: u64, speed: &str) {
        match self.total.filter(|t| *t > 0) {
            Some(total) => debug!(
                transfer = %self.label,
                bytes = position,
                progress = %format!("{} / {}", format_bytes(position), format_bytes(total)),
                percent = %format!("{:.1}", percent(position, total)),
                speed,
                "progress"
            ),
            None => debug!(
                transfer = %self.label,
                bytes = position,
                progress = %format_bytes(position),
                speed,
                "progress"
            ),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(written: u64, total: u64) -> f64 {
    written as f64 * 100.0 / total as f64
}
