//! Progress bars and summary reporting for CLI downloads.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::state::{SegmentStatus, SessionOutcome, SessionReport};
use crate::{format_bytes, format_duration, format_speed, segment_file_name, PackageManifest};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a progress bar for a single segment transfer.
pub fn make_segment_bar(size: u64, name: &str) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_message(name.to_string());
    bar
}

/// Creates a progress bar for overall package progress.
///
/// Rate and ETA come from the engine snapshot, carried in the message slot,
/// so the smoothed figures shown here match what `snapshot()` reports.
pub fn make_total_bar(size: u64) -> ProgressBar {
    let bar = ProgressBar::new(size);
    bar.set_style(
        ProgressStyle::with_template("Total [{bar:40.green/white}] {bytes}/{total_bytes} - {msg}")
            .expect("template valid")
            .progress_chars("━━╌"),
    );
    bar
}

/// Prints the list of segments about to be transferred.
pub fn print_segment_list(manifest: &PackageManifest) {
    let label = if manifest.display_name.is_empty() {
        &manifest.package_id
    } else {
        &manifest.display_name
    };

    println!("\n{SEPARATOR}");
    println!(
        "Package: {label} ({})",
        format_bytes(manifest.accounted_size())
    );
    println!("{SEPARATOR}");

    for part in &manifest.parts {
        let name = segment_file_name(&part.url).unwrap_or_default();
        println!("  {name} ({})", format_bytes(part.size));
    }

    println!("{SEPARATOR}");
    println!(
        "  {} segment(s), {} total",
        manifest.parts.len(),
        format_bytes(manifest.parts_total_size())
    );
    println!("{SEPARATOR}\n");
}

/// Prints a summary of the resolved session.
#[allow(clippy::cast_precision_loss)]
pub fn print_summary(report: &SessionReport, downloaded_bytes: u64) {
    let completed = report
        .results
        .iter()
        .filter(|r| r.status == SegmentStatus::Completed)
        .count();
    let cancelled = report
        .results
        .iter()
        .filter(|r| r.status == SegmentStatus::Cancelled)
        .count();

    let outcome = match report.outcome {
        SessionOutcome::Completed => style("Completed".to_string()).green(),
        SessionOutcome::CompletedWithErrors(n) => {
            style(format!("Completed with {n} error(s)")).red()
        }
        SessionOutcome::Cancelled => style("Cancelled".to_string()).yellow(),
        SessionOutcome::Paused => style("Paused".to_string()).yellow(),
    };

    println!("\n{SEPARATOR}");
    println!("Transfer Summary");
    println!("{SEPARATOR}");
    println!("  Outcome:           {outcome}");
    println!("  Segments:          {completed} transferred");
    if let SessionOutcome::CompletedWithErrors(n) = report.outcome {
        println!("  Failed:            {n}");
        for result in &report.results {
            if result.status == SegmentStatus::ErrorOccurred {
                let code = result.error_code.unwrap_or_default();
                println!("    {} (error {code})", result.file_name);
            }
        }
    }
    if cancelled > 0 {
        println!("  Cancelled:         {cancelled}");
    }
    println!("  Total size:        {}", format_bytes(downloaded_bytes));
    println!("  Total time:        {}", format_duration(report.elapsed));

    let elapsed = report.elapsed.as_secs_f64();
    if elapsed > 0.0 && downloaded_bytes > 0 {
        println!(
            "  Average speed:     {}",
            format_speed(downloaded_bytes as f64 / elapsed)
        );
    }

    println!("{SEPARATOR}");
}
