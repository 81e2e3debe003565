//! CLI mode for hydra - command-line package downloads with live progress.

mod progress;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar};

use crate::state::{SegmentStatus, SessionReport};
use crate::{
    format_bytes, segment_file_name, DownloadCoordinator, EngineConfig, NoObserver,
    PackageManifest, TransferObserver,
};

use progress::{make_segment_bar, make_total_bar, print_segment_list, print_summary};

/// Options collected from the command line.
#[derive(Debug, Default)]
pub struct CliOptions {
    /// Path to the package manifest JSON document.
    pub manifest_path: PathBuf,
    /// Destination directory for segment files.
    pub dest_dir: PathBuf,
    /// Override for `EngineConfig::max_parallel`.
    pub parallel: Option<usize>,
    /// Override for the per-request timeout, in seconds.
    pub timeout_secs: Option<u64>,
    /// Optional TOML configuration file.
    pub config_path: Option<PathBuf>,
    /// Suppress progress rendering.
    pub quiet: bool,
}

/// Shared rendering handles for the live display.
struct Ui {
    progress: MultiProgress,
    total_bar: ProgressBar,
}

/// Drives one indicatif bar per segment from transfer events.
///
/// Bars appear when a segment enters its transfer task and disappear at its
/// terminal state; failed segments leave their bar frozen in place.
struct BarObserver {
    progress: MultiProgress,
    total_bar: ProgressBar,
    descriptors: HashMap<u32, (String, u64)>,
    bars: Mutex<HashMap<u32, ProgressBar>>,
}

impl BarObserver {
    fn new(progress: MultiProgress, total_bar: ProgressBar, manifest: &PackageManifest) -> Self {
        let descriptors = manifest
            .parts
            .iter()
            .map(|part| {
                let name = segment_file_name(&part.url).unwrap_or_default();
                (part.index, (name, part.size))
            })
            .collect();
        Self {
            progress,
            total_bar,
            descriptors,
            bars: Mutex::new(HashMap::new()),
        }
    }
}

impl TransferObserver for BarObserver {
    fn on_state_change(&self, index: u32, status: SegmentStatus) {
        match status {
            SegmentStatus::Initialized => {
                let Some((name, size)) = self.descriptors.get(&index) else {
                    return;
                };
                let bar = self
                    .progress
                    .insert_before(&self.total_bar, make_segment_bar(*size, name));
                bar.enable_steady_tick(Duration::from_millis(250));
                self.bars.lock().unwrap().insert(index, bar);
            }
            SegmentStatus::Completed => {
                if let Some(bar) = self.bars.lock().unwrap().remove(&index) {
                    bar.finish_and_clear();
                }
                if let Some((name, size)) = self.descriptors.get(&index) {
                    let _ = self.progress.println(format!(
                        "  {} {name} ({})",
                        console::style("✓").green(),
                        format_bytes(*size)
                    ));
                }
            }
            SegmentStatus::ErrorOccurred => {
                if let Some(bar) = self.bars.lock().unwrap().remove(&index) {
                    bar.abandon();
                }
                if let Some((name, _)) = self.descriptors.get(&index) {
                    let _ = self
                        .progress
                        .println(format!("  {} {name} failed", console::style("✗").red()));
                }
            }
            SegmentStatus::Cancelled => {
                if let Some(bar) = self.bars.lock().unwrap().remove(&index) {
                    bar.finish_and_clear();
                }
            }
            _ => {}
        }
    }

    fn on_progress(&self, index: u32, _percent: u64, remaining: u64, total: u64) {
        if let Some(bar) = self.bars.lock().unwrap().get(&index) {
            bar.set_position(total.saturating_sub(remaining));
        }
    }
}

/// Runs one package download session with progress rendering.
///
/// Loads the manifest and optional TOML configuration, applies command-line
/// overrides, and drives the session to resolution. The first Ctrl-C requests
/// cancellation; the session then winds down cooperatively.
///
/// # Errors
///
/// Returns an error when the manifest or configuration cannot be read or
/// parsed, or when the session cannot be constructed. Per-segment transfer
/// failures do not surface here; they are part of the report.
pub async fn run_download(options: CliOptions) -> crate::Result<SessionReport> {
    let manifest_json = std::fs::read_to_string(&options.manifest_path)?;
    let manifest = PackageManifest::from_json(&manifest_json)?;

    let mut config = match &options.config_path {
        Some(path) => EngineConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    if let Some(parallel) = options.parallel {
        config = config.with_max_parallel(parallel);
    }
    if let Some(secs) = options.timeout_secs {
        config = config.with_request_timeout_secs(secs);
    }
    let poll_interval = config.poll_interval();

    let ui = if options.quiet {
        None
    } else {
        print_segment_list(&manifest);
        let progress = MultiProgress::new();
        let total_bar = progress.add(make_total_bar(manifest.accounted_size()));
        total_bar.enable_steady_tick(Duration::from_millis(250));
        Some(Ui {
            progress,
            total_bar,
        })
    };
    let observer: Arc<dyn TransferObserver> = match &ui {
        Some(ui) => Arc::new(BarObserver::new(
            ui.progress.clone(),
            ui.total_bar.clone(),
            &manifest,
        )),
        None => Arc::new(NoObserver),
    };

    let coordinator = DownloadCoordinator::new(config, manifest, observer)?;
    let report = drive(&coordinator, &options.dest_dir, ui.as_ref(), poll_interval).await?;

    if let Some(ui) = &ui {
        ui.total_bar.finish_and_clear();
        ui.progress.clear().ok();
    }
    print_summary(&report, coordinator.downloaded_bytes());

    Ok(report)
}

/// Polls the session to resolution, relaying Ctrl-C as a cancel request.
async fn drive(
    coordinator: &DownloadCoordinator,
    dest: &Path,
    ui: Option<&Ui>,
    poll_interval: Duration,
) -> crate::Result<SessionReport> {
    let session = coordinator.start_all(dest);
    tokio::pin!(session);
    let mut poll = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            report = &mut session => break report,
            _ = poll.tick() => {
                if let Some(ui) = ui {
                    let snapshot = coordinator.snapshot();
                    ui.total_bar.set_position(coordinator.downloaded_bytes());
                    ui.total_bar.set_message(format!(
                        "{}, ETA {}",
                        snapshot.transfer_rate, snapshot.time_left
                    ));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let swept = coordinator.cancel_all();
                if swept > 0 {
                    let line = format!("Cancelling {swept} segment(s)...");
                    match ui {
                        Some(ui) => {
                            let _ = ui.progress.println(line);
                        }
                        None => println!("{line}"),
                    }
                }
            }
        }
    }
}
