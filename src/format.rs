//! Formatting helpers for human-readable sizes, speeds, ETAs, and durations.

use std::time::Duration;

/// Formats a byte count as a human-readable string (B, KB, MB, GB, TB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a transfer rate in bytes per second as "MB/s" above 1 MB/s,
/// otherwise "KB/s".
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    let kb = bytes_per_sec / 1024.0;
    let mb = kb / 1024.0;
    if mb > 1.0 {
        format!("{mb:.2} MB/s")
    } else {
        format!("{kb:.2} KB/s")
    }
}

/// Formats an ETA in seconds as "<N> seconds" under a minute, otherwise
/// "<M> min <S> sec".
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn format_eta_seconds(eta_secs: f64) -> String {
    if eta_secs < 60.0 {
        format!("{eta_secs:.0} seconds")
    } else {
        let whole = eta_secs as i64;
        format!("{} min {} sec", whole / 60, whole % 60)
    }
}

/// Formats a duration as a human-readable string (e.g. "5.0s", "1m 05s", "1h 01m 05s").
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!(
            "{}h {:02}m {:02}s",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:01}s", secs, d.subsec_millis() / 100)
    }
}
