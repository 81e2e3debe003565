//! Session coordination.
//!
//! [`DownloadCoordinator`] owns the segment registry, bounds transfer
//! concurrency, and orchestrates start, pause, and cancel across all
//! segments. Every transfer event first mutates the owning
//! [`SegmentState`] under the registry lock, then flows on to the caller's
//! observer, so the registry is the single serialization point for session
//! state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::event::TransferObserver;
use crate::format::{format_bytes, format_speed};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::manifest::{segment_file_name, PackageManifest, SegmentDescriptor};
use crate::state::{
    SegmentResult, SegmentState, SegmentStatus, SessionOutcome, SessionReport, SessionStatus,
    StatsSnapshot,
};
use crate::stats::TransferStatistics;
use crate::transfer::SegmentTransfer;

/// Orchestrates all segment transfers for one package download session.
///
/// Constructed from a validated manifest; generic over the file system so
/// tests can inject failures. One session per coordinator: `start_all`
/// consumes the session, and a second call is rejected.
pub struct DownloadCoordinator<F: FileSystem = TokioFileSystem> {
    config: EngineConfig,
    manifest: PackageManifest,
    client: reqwest::Client,
    fs: F,
    observer: Arc<dyn TransferObserver>,
    stats: Mutex<TransferStatistics>,
    registry: Mutex<Registry>,
    cancel: CancellationToken,
}

impl<F: FileSystem> fmt::Debug for DownloadCoordinator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("config", &self.config)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

/// All mutable session state, behind one lock.
struct Registry {
    segments: Vec<SegmentState>,
    session: SessionStatus,
    downloaded_segments: usize,
    started: bool,
}

impl Registry {
    /// Applies a lifecycle transition to one segment.
    fn apply_state_change(&mut self, index: u32, status: SegmentStatus, now: Instant) {
        let Some(state) = self.segments.iter_mut().find(|s| s.index == index) else {
            return;
        };
        let newly_completed =
            status == SegmentStatus::Completed && state.status != SegmentStatus::Completed;

        match status {
            SegmentStatus::Idle => {}
            SegmentStatus::Initialized => {
                state.queued_at = Some(now);
                state.status_text = "Queued".to_string();
            }
            SegmentStatus::TransferInProgress => {
                state.started_at = Some(now);
                let ms = state
                    .queued_at
                    .map_or(0, |queued| now.duration_since(queued).as_millis());
                state.status_text = format!("Started after {ms} ms");
            }
            SegmentStatus::Pausing => {
                state.reset_progress();
                state.status_text = "Pausing".to_string();
            }
            SegmentStatus::Paused => {
                state.status_text = "Paused".to_string();
            }
            SegmentStatus::Cancelling => {
                state.reset_progress();
                state.status_text = "Cancelling".to_string();
            }
            SegmentStatus::Cancelled => {
                state.reset_progress();
                state.status_text = "Cancelled".to_string();
            }
            SegmentStatus::Completed => {
                state.downloaded = state.size;
                state.remaining = 0;
                state.remaining_text = format_bytes(0);
                state.percent = 100;
                let ms = state
                    .started_at
                    .map_or(0, |started| now.duration_since(started).as_millis());
                state.status_text = format!("Transferred in {ms} ms");
            }
            SegmentStatus::ErrorOccurred => {
                state.status_text = "Error".to_string();
            }
        }
        state.status = status;

        if newly_completed {
            self.downloaded_segments += 1;
        }
    }

    /// Applies fresh progress figures to one segment.
    #[allow(clippy::cast_precision_loss)]
    fn apply_progress(&mut self, index: u32, percent: u64, remaining: u64, total: u64) {
        let Some(state) = self.segments.iter_mut().find(|s| s.index == index) else {
            return;
        };
        state.percent = percent;
        state.remaining = remaining;
        state.remaining_text = format_bytes(remaining);
        state.downloaded = total.saturating_sub(remaining);
        if let Some(started) = state.started_at {
            let secs = started.elapsed().as_secs_f64();
            if secs > 0.0 {
                state.speed_text = format_speed(state.downloaded as f64 / secs);
            }
        }
    }

    fn count_status(&self, status: SegmentStatus) -> usize {
        self.segments.iter().filter(|s| s.status == status).count()
    }
}

/// Routes transfer events through the registry, then on to the caller.
struct Bridge<'a, F: FileSystem> {
    coordinator: &'a DownloadCoordinator<F>,
}

impl<F: FileSystem> TransferObserver for Bridge<'_, F> {
    fn on_state_change(&self, index: u32, status: SegmentStatus) {
        self.coordinator.transition(index, status);
    }

    fn on_progress(&self, index: u32, percent: u64, remaining: u64, total: u64) {
        {
            let mut registry = self.coordinator.registry.lock().unwrap();
            registry.apply_progress(index, percent, remaining, total);
        }
        self.coordinator
            .observer
            .on_progress(index, percent, remaining, total);
    }

    fn on_transfer_start(&self, index: u32) {
        self.coordinator.observer.on_transfer_start(index);
    }

    fn on_transfer_complete(&self, index: u32) {
        self.coordinator.observer.on_transfer_complete(index);
    }
}

impl DownloadCoordinator<TokioFileSystem> {
    /// Creates a coordinator with a client built from the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] for a manifest that cannot drive a
    /// download and [`Error::Http`] if the client cannot be built.
    pub fn new(
        config: EngineConfig,
        manifest: PackageManifest,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<Self> {
        let client = build_client(&config)?;
        Self::from_parts(config, manifest, observer, client, TokioFileSystem::new())
    }

    /// Creates a coordinator around an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] for a manifest that cannot drive a
    /// download.
    pub fn with_client(
        config: EngineConfig,
        manifest: PackageManifest,
        observer: Arc<dyn TransferObserver>,
        client: reqwest::Client,
    ) -> Result<Self> {
        Self::from_parts(config, manifest, observer, client, TokioFileSystem::new())
    }
}

impl<F: FileSystem> DownloadCoordinator<F> {
    /// Creates a coordinator with a custom file system implementation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] for a manifest that cannot drive a
    /// download and [`Error::Http`] if the client cannot be built.
    pub fn with_fs(
        config: EngineConfig,
        manifest: PackageManifest,
        observer: Arc<dyn TransferObserver>,
        fs: F,
    ) -> Result<Self> {
        let client = build_client(&config)?;
        Self::from_parts(config, manifest, observer, client, fs)
    }

    fn from_parts(
        config: EngineConfig,
        manifest: PackageManifest,
        observer: Arc<dyn TransferObserver>,
        client: reqwest::Client,
        fs: F,
    ) -> Result<Self> {
        manifest.validate()?;

        let mut stats = TransferStatistics::new();
        stats.init(manifest.accounted_size());

        let segments = manifest
            .parts
            .iter()
            .map(|part| {
                let file_name = segment_file_name(&part.url).unwrap_or_default();
                SegmentState::new(part.index, &file_name, part.size)
            })
            .collect();

        Ok(Self {
            config,
            manifest,
            client,
            fs,
            observer,
            stats: Mutex::new(stats),
            registry: Mutex::new(Registry {
                segments,
                session: SessionStatus::Initialized,
                downloaded_segments: 0,
                started: false,
            }),
            cancel: CancellationToken::new(),
        })
    }

    /// Runs every segment transfer to a terminal state and reports back.
    ///
    /// At most `max_parallel` segments transfer at once; the rest wait for a
    /// slot. Per-segment failures are recorded and logged, never propagated:
    /// an errored segment does not disturb its siblings. Returns once every
    /// scheduled task has resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Download`] if the session was already started.
    pub async fn start_all(&self, root: &Path) -> Result<SessionReport> {
        {
            let mut registry = self.registry.lock().unwrap();
            if registry.started {
                return Err(Error::Download("session already started".to_string()));
            }
            registry.started = true;
            if registry.session == SessionStatus::Initialized {
                registry.session = SessionStatus::TransferInProgress;
            }
        }
        self.stats.lock().unwrap().start()?;
        let started_at = Instant::now();
        log::debug!(
            "starting {} segment transfers, {} at a time",
            self.manifest.parts.len(),
            self.config.max_parallel
        );

        let bridge = Bridge { coordinator: self };
        let results: Vec<Option<SegmentResult>> = stream::iter(self.manifest.parts.iter())
            .map(|part| self.run_segment(part, root, &bridge))
            .buffer_unordered(self.config.max_parallel)
            .collect()
            .await;
        let results: Vec<SegmentResult> = results.into_iter().flatten().collect();

        self.stats.lock().unwrap().stop()?;

        let total = self.manifest.parts.len();
        let cancelled = results
            .iter()
            .filter(|r| r.status == SegmentStatus::Cancelled)
            .count();
        let errors = results
            .iter()
            .filter(|r| r.status == SegmentStatus::ErrorOccurred)
            .count();

        let outcome = if cancelled > 0 {
            SessionOutcome::Cancelled
        } else if results.len() < total {
            SessionOutcome::Paused
        } else if errors > 0 {
            SessionOutcome::CompletedWithErrors(errors)
        } else {
            SessionOutcome::Completed
        };

        if outcome == SessionOutcome::Completed {
            self.stats.lock().unwrap().set_completed()?;
        }
        {
            let mut registry = self.registry.lock().unwrap();
            registry.session = match outcome {
                SessionOutcome::Completed => SessionStatus::Completed,
                SessionOutcome::CompletedWithErrors(_) => SessionStatus::ErrorOccurred,
                SessionOutcome::Cancelled => SessionStatus::Cancelled,
                SessionOutcome::Paused => SessionStatus::Paused,
            };
        }
        log::debug!("session resolved: {outcome:?}");

        Ok(SessionReport {
            outcome,
            elapsed: started_at.elapsed(),
            results,
        })
    }

    /// Runs one segment under the session gate.
    ///
    /// A cancelled session synthesizes a Cancelled result without touching
    /// the network; a paused one gates the segment out with no result at
    /// all. In-flight siblings are unaffected either way.
    async fn run_segment(
        &self,
        part: &SegmentDescriptor,
        root: &Path,
        bridge: &Bridge<'_, F>,
    ) -> Option<SegmentResult> {
        let file_name = segment_file_name(&part.url).unwrap_or_default();
        let path: PathBuf = root.join(&file_name);

        let gate = self.registry.lock().unwrap().session;
        match gate {
            SessionStatus::Cancelled => {
                self.transition(part.index, SegmentStatus::Cancelled);
                Some(SegmentResult {
                    index: part.index,
                    file_name,
                    path,
                    status: SegmentStatus::Cancelled,
                    error_code: None,
                })
            }
            SessionStatus::Paused => {
                self.transition(part.index, SegmentStatus::Paused);
                None
            }
            _ => {
                let transfer = SegmentTransfer::new(
                    part,
                    self.config.chunk_size,
                    &self.client,
                    &self.fs,
                    &self.stats,
                    bridge,
                    &self.cancel,
                );
                match transfer.run(root).await {
                    Ok(outcome) => {
                        let status = if outcome.cancelled {
                            SegmentStatus::Cancelled
                        } else {
                            SegmentStatus::Completed
                        };
                        Some(SegmentResult {
                            index: part.index,
                            file_name,
                            path: outcome.path,
                            status,
                            error_code: None,
                        })
                    }
                    Err(e) => {
                        let code = e.code();
                        log::error!("part {} ({file_name}) failed: {e}", part.index);
                        {
                            let mut registry = self.registry.lock().unwrap();
                            if let Some(state) =
                                registry.segments.iter_mut().find(|s| s.index == part.index)
                            {
                                state.error_code = Some(code);
                                state.status_text = format!("Error {code}");
                            }
                        }
                        Some(SegmentResult {
                            index: part.index,
                            file_name,
                            path,
                            status: SegmentStatus::ErrorOccurred,
                            error_code: Some(code),
                        })
                    }
                }
            }
        }
    }

    /// Applies a lifecycle transition under the registry lock, then forwards
    /// it to the caller's observer.
    fn transition(&self, index: u32, status: SegmentStatus) {
        {
            let mut registry = self.registry.lock().unwrap();
            registry.apply_state_change(index, status, Instant::now());
        }
        self.observer.on_state_change(index, status);
    }

    /// Requests cancellation of the whole session.
    ///
    /// Trips the flag every transfer polls at chunk boundaries, sweeps every
    /// non-terminal segment to Cancelling with its progress reset, and
    /// returns how many segments were swept. A no-op returning 0 once the
    /// session already resolved or a cancel was already issued.
    pub fn cancel_all(&self) -> usize {
        let swept = {
            let mut registry = self.registry.lock().unwrap();
            if registry.session.is_terminal() {
                return 0;
            }
            registry.session = SessionStatus::Cancelled;
            self.cancel.cancel();
            let indexes: Vec<u32> = registry
                .segments
                .iter()
                .filter(|s| !s.status.is_terminal())
                .map(|s| s.index)
                .collect();
            let now = Instant::now();
            for &index in &indexes {
                registry.apply_state_change(index, SegmentStatus::Cancelling, now);
            }
            indexes
        };
        log::debug!("cancel requested, {} segments swept", swept.len());
        for &index in &swept {
            self.observer
                .on_state_change(index, SegmentStatus::Cancelling);
        }
        swept.len()
    }

    /// Requests a pause of the whole session.
    ///
    /// Sweeps every non-terminal segment to Pausing with its progress reset
    /// and returns how many were swept. Unstarted segments are gated out
    /// (Pausing to Paused, no network I/O); in-flight transfers run to their
    /// natural terminal. There is no resume, but a paused session can still
    /// be cancelled. A no-op returning 0 once the session is cancelled or
    /// resolved.
    pub fn pause_all(&self) -> usize {
        let swept = {
            let mut registry = self.registry.lock().unwrap();
            if registry.session.is_terminal() {
                return 0;
            }
            registry.session = SessionStatus::Paused;
            let indexes: Vec<u32> = registry
                .segments
                .iter()
                .filter(|s| !s.status.is_terminal())
                .map(|s| s.index)
                .collect();
            let now = Instant::now();
            for &index in &indexes {
                registry.apply_state_change(index, SegmentStatus::Pausing, now);
            }
            indexes
        };
        log::debug!("pause requested, {} segments swept", swept.len());
        for &index in &swept {
            self.observer.on_state_change(index, SegmentStatus::Pausing);
        }
        swept.len()
    }

    /// Returns a point-in-time aggregate view of the session.
    ///
    /// Samples every segment stat first, so polling this on a fixed interval
    /// (`EngineConfig::poll_interval`) is what drives speed smoothing.
    #[allow(clippy::cast_possible_truncation)]
    pub fn snapshot(&self) -> StatsSnapshot {
        let (transfer_rate, time_left, package_remaining) = {
            let mut stats = self.stats.lock().unwrap();
            let _ = stats.update(Instant::now());
            let rate = stats.total_speed().unwrap_or(0.0);
            let time_left = stats
                .eta_string()
                .unwrap_or_else(|_| "Unknown".to_string());
            let remaining = stats.remaining_bytes().unwrap_or(0);
            (format_speed(rate), time_left, format_bytes(remaining))
        };

        let registry = self.registry.lock().unwrap();
        let total_segments = registry.segments.len();
        let overall_progress = if total_segments == 0 {
            0
        } else {
            registry.segments.iter().map(|s| s.percent).sum::<u64>() / total_segments as u64
        };

        StatsSnapshot {
            transfer_rate,
            time_left,
            package_size: format_bytes(self.manifest.accounted_size()),
            package_remaining,
            downloaded_segments: registry.downloaded_segments,
            total_segments,
            error_segments: registry.count_status(SegmentStatus::ErrorOccurred),
            cancelled_segments: registry.count_status(SegmentStatus::Cancelled),
            overall_progress,
            session: registry.session,
        }
    }

    /// Returns a copy of every segment's current state.
    #[must_use]
    pub fn segment_states(&self) -> Vec<SegmentState> {
        self.registry.lock().unwrap().segments.clone()
    }

    /// Returns the cumulative bytes received across the session.
    #[must_use]
    pub fn downloaded_bytes(&self) -> u64 {
        self.stats.lock().unwrap().downloaded_bytes().unwrap_or(0)
    }

    /// Returns the manifest this session was built from.
    #[must_use]
    pub const fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }
}

/// Builds the session HTTP client from the configuration.
fn build_client(config: &EngineConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(Error::from)
}
