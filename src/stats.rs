//! Live transfer statistics.
//!
//! [`SegmentStat`] tracks bytes and smoothed speed for one segment;
//! [`TransferStatistics`] aggregates every segment into package-wide totals,
//! speed, and ETA. Transfer tasks feed their own stat through an `Arc` without
//! touching the aggregate, which the coordinator keeps behind its own lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Width of the sample window used for the instantaneous rate.
const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Weight of each new instantaneous rate in the smoothed speed.
const SMOOTHING_FACTOR: f64 = 0.1;

/// Largest step the damped ETA may take between consecutive reads, in seconds.
const ETA_MAX_STEP_SECS: f64 = 2.0;

/// Byte counter and smoothed speed estimator for a single segment.
///
/// Shared as `Arc<SegmentStat>` between the transfer task that feeds it and the
/// aggregator that reads it. The byte counter is atomic; the sample window and
/// smoothed rate live behind an internal mutex.
#[derive(Debug)]
pub struct SegmentStat {
    name: String,
    size: u64,
    downloaded: AtomicU64,
    window: Mutex<SpeedWindow>,
}

#[derive(Debug)]
struct SpeedWindow {
    samples: VecDeque<(Instant, u64)>,
    smoothed: f64,
}

impl SegmentStat {
    /// Creates a stat for a segment of the given declared size.
    #[must_use]
    pub fn new(name: &str, size: u64) -> Self {
        Self {
            name: name.to_string(),
            size,
            downloaded: AtomicU64::new(0),
            window: Mutex::new(SpeedWindow {
                samples: VecDeque::new(),
                smoothed: 0.0,
            }),
        }
    }

    /// Returns the segment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared segment size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the cumulative bytes received so far.
    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    /// Returns the bytes still outstanding against the declared size.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.downloaded())
    }

    /// Records `n` freshly received bytes.
    ///
    /// The counter never exceeds the declared size; excess bytes are clamped so
    /// aggregate accounting stays within the package total.
    pub fn receive(&self, n: u64) {
        let mut current = self.downloaded.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(n).min(self.size);
            match self.downloaded.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(seen) => current = seen,
            }
        }
    }

    /// Samples the byte counter at `now` and refreshes the smoothed speed.
    ///
    /// Appends `(now, downloaded)` to the window, drops samples older than one
    /// second, derives the instantaneous rate across the window (zero with
    /// fewer than two samples), and folds it into the exponential moving
    /// average. The first non-zero rate seeds the average directly.
    #[allow(clippy::cast_precision_loss)]
    pub fn update(&self, now: Instant) {
        let downloaded = self.downloaded.load(Ordering::Relaxed);
        let mut window = self.window.lock().unwrap();
        window.samples.push_back((now, downloaded));
        while let Some(&(taken, _)) = window.samples.front() {
            if now.duration_since(taken) > SAMPLE_WINDOW {
                window.samples.pop_front();
            } else {
                break;
            }
        }

        let instantaneous = match (window.samples.front(), window.samples.back()) {
            (Some(&(first_at, first_bytes)), Some(&(last_at, last_bytes)))
                if last_at > first_at =>
            {
                (last_bytes - first_bytes) as f64 / last_at.duration_since(first_at).as_secs_f64()
            }
            _ => 0.0,
        };

        window.smoothed = if window.smoothed == 0.0 {
            instantaneous
        } else {
            SMOOTHING_FACTOR * instantaneous + (1.0 - SMOOTHING_FACTOR) * window.smoothed
        };
    }

    /// Returns the smoothed speed in bytes per second.
    ///
    /// Side-effect free: reading the speed never advances the window.
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.window.lock().unwrap().smoothed
    }

    /// Returns `true` once the counter has reached the declared size.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.downloaded() >= self.size
    }

    /// Clears the sample window and smoothed speed for a fresh session.
    fn reset_window(&self) {
        let mut window = self.window.lock().unwrap();
        window.samples.clear();
        window.smoothed = 0.0;
    }
}

/// Package-wide statistics aggregated over every registered [`SegmentStat`].
///
/// Construction yields an uninitialized aggregator: every operation other than
/// [`init`](Self::init) fails with [`Error::StatsUninitialized`] until the
/// package total is known. The coordinator keeps one of these behind a mutex
/// for the whole session.
#[derive(Debug)]
pub struct TransferStatistics {
    total_size: u64,
    initialized: bool,
    completed: bool,
    stats: Vec<Arc<SegmentStat>>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    last_eta_secs: Option<f64>,
}

impl Default for TransferStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferStatistics {
    /// Creates an uninitialized aggregator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_size: 0,
            initialized: false,
            completed: false,
            stats: Vec::new(),
            started_at: None,
            stopped_at: None,
            last_eta_secs: None,
        }
    }

    /// Initializes the aggregator for a package of `total_bytes`.
    ///
    /// Discards any previously registered segments and session timers, so a
    /// fresh `init` starts a fresh accounting session.
    pub fn init(&mut self, total_bytes: u64) {
        self.total_size = total_bytes;
        self.initialized = true;
        self.completed = false;
        self.stats.clear();
        self.started_at = None;
        self.stopped_at = None;
        self.last_eta_secs = None;
    }

    const fn ensure_init(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::StatsUninitialized)
        }
    }

    /// Registers a segment and returns its shared stat.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn add_segment(&mut self, name: &str, size: u64) -> Result<Arc<SegmentStat>> {
        self.ensure_init()?;
        let stat = Arc::new(SegmentStat::new(name, size));
        self.stats.push(Arc::clone(&stat));
        Ok(stat)
    }

    /// Starts the session timer and resets every sample window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn start(&mut self) -> Result<()> {
        self.ensure_init()?;
        self.started_at = Some(Instant::now());
        self.stopped_at = None;
        for stat in &self.stats {
            stat.reset_window();
        }
        Ok(())
    }

    /// Freezes the session timer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_init()?;
        self.stopped_at = Some(Instant::now());
        Ok(())
    }

    /// Samples every registered segment at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn update(&self, now: Instant) -> Result<()> {
        self.ensure_init()?;
        for stat in &self.stats {
            stat.update(now);
        }
        Ok(())
    }

    /// Returns the summed smoothed speed of segments still transferring.
    ///
    /// Completed segments are excluded so the aggregate reflects only traffic
    /// that can still move the ETA.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn total_speed(&self) -> Result<f64> {
        self.ensure_init()?;
        Ok(self
            .stats
            .iter()
            .filter(|stat| !stat.is_completed())
            .map(|stat| stat.speed())
            .sum())
    }

    /// Returns the cumulative bytes received across all segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn downloaded_bytes(&self) -> Result<u64> {
        self.ensure_init()?;
        Ok(self.stats.iter().map(|stat| stat.downloaded()).sum())
    }

    /// Returns the bytes outstanding against the package total.
    ///
    /// Zero once [`set_completed`](Self::set_completed) has been called,
    /// regardless of raw accounting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn remaining_bytes(&self) -> Result<u64> {
        self.ensure_init()?;
        if self.completed {
            return Ok(0);
        }
        let downloaded = self.stats.iter().map(|stat| stat.downloaded()).sum::<u64>();
        Ok(self.total_size.saturating_sub(downloaded))
    }

    /// Marks the whole package complete, forcing remaining bytes and ETA to
    /// zero.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn set_completed(&mut self) -> Result<()> {
        self.ensure_init()?;
        self.completed = true;
        Ok(())
    }

    /// Returns the raw ETA in seconds, zero when no speed is observable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    #[allow(clippy::cast_precision_loss)]
    pub fn eta_seconds(&self) -> Result<f64> {
        let remaining = self.remaining_bytes()?;
        let speed = self.total_speed()?;
        if speed > 0.0 {
            Ok(remaining as f64 / speed)
        } else {
            Ok(0.0)
        }
    }

    /// Returns the damped ETA in seconds.
    ///
    /// Each read clamps the raw ETA to within two seconds of the previous
    /// damped value, keeping the figure readable while speeds fluctuate. The
    /// first read seeds the damper from the raw value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn capped_eta_seconds(&mut self) -> Result<f64> {
        let raw = self.eta_seconds()?;
        let capped = cap_eta(self.last_eta_secs, raw);
        self.last_eta_secs = Some(capped);
        Ok(capped)
    }

    /// Renders the damped ETA for display.
    ///
    /// "Unknown" until the first byte arrives, then "`N` seconds" under a
    /// minute and "`M` min `S` sec" above it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn eta_string(&mut self) -> Result<String> {
        if self.downloaded_bytes()? == 0 {
            return Ok("Unknown".to_string());
        }
        let capped = self.capped_eta_seconds()?;
        Ok(crate::format::format_eta_seconds(capped))
    }

    /// Returns the session wall-clock in seconds, frozen once stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StatsUninitialized`] before [`init`](Self::init).
    pub fn elapsed_seconds(&self) -> Result<f64> {
        self.ensure_init()?;
        Ok(self.started_at.map_or(0.0, |started| {
            self.stopped_at
                .map_or_else(|| started.elapsed(), |stopped| stopped - started)
                .as_secs_f64()
        }))
    }
}

/// Clamps a raw ETA to within [`ETA_MAX_STEP_SECS`] of the previous value.
fn cap_eta(previous: Option<f64>, raw: f64) -> f64 {
    let raw = raw.max(0.0);
    match previous {
        Some(prev) => raw
            .clamp(prev - ETA_MAX_STEP_SECS, prev + ETA_MAX_STEP_SECS)
            .max(0.0),
        None => raw,
    }
}
