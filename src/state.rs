//! Segment and session lifecycle state.
//!
//! The coordinator owns one [`SegmentState`] per manifest part behind a single
//! registry lock; callers observe the aggregate through [`StatsSnapshot`] and
//! receive a [`SessionReport`] when the session resolves.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::format::format_bytes;

/// Lifecycle of a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    /// Registered, nothing scheduled yet.
    Idle,
    /// Transfer task entered, request not yet issued.
    Initialized,
    /// Body bytes are flowing.
    TransferInProgress,
    /// Pause requested; the segment has not yet been gated out.
    Pausing,
    /// Gated out by a pause before any network I/O.
    Paused,
    /// Cancel requested; the transfer has not yet observed it.
    Cancelling,
    /// Terminal: stopped by a cancel request.
    Cancelled,
    /// Terminal: every declared byte written.
    Completed,
    /// Terminal: the transfer failed.
    ErrorOccurred,
}

impl SegmentStatus {
    /// Returns `true` for states no event can move the segment out of.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::ErrorOccurred)
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Initialized => "Initialized",
            Self::TransferInProgress => "Transferring",
            Self::Pausing => "Pausing",
            Self::Paused => "Paused",
            Self::Cancelling => "Cancelling",
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
            Self::ErrorOccurred => "Error",
        };
        f.write_str(name)
    }
}

/// Lifecycle of the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No coordinator constructed yet.
    Idle,
    /// Coordinator constructed, transfers not started.
    Initialized,
    /// Transfers running.
    TransferInProgress,
    /// Pause requested; unstarted segments are gated out.
    Paused,
    /// Cancel requested; the session drains to Cancelled results.
    Cancelled,
    /// Every segment completed.
    Completed,
    /// At least one segment failed and none were cancelled.
    ErrorOccurred,
}

impl SessionStatus {
    /// Returns `true` once the session can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::ErrorOccurred)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Initialized => "Initialized",
            Self::TransferInProgress => "Transferring",
            Self::Paused => "Paused",
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
            Self::ErrorOccurred => "Error",
        };
        f.write_str(name)
    }
}

/// Mutable per-segment record, owned by the coordinator behind the registry
/// lock.
///
/// Numeric fields feed the aggregate snapshot; the display strings are
/// pre-rendered so pollers never format under the lock.
#[derive(Debug, Clone)]
pub struct SegmentState {
    /// Manifest part index.
    pub index: u32,
    /// File name derived from the part URL.
    pub file_name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Current lifecycle state.
    pub status: SegmentStatus,
    /// Human-readable status line ("Pending", "Queued", "Started after 12 ms", ...).
    pub status_text: String,
    /// Bytes written so far.
    pub downloaded: u64,
    /// Bytes outstanding.
    pub remaining: u64,
    /// Progress percentage, 0 to 100.
    pub percent: u64,
    /// Declared size, formatted.
    pub size_text: String,
    /// Outstanding bytes, formatted.
    pub remaining_text: String,
    /// Average speed since the transfer started, formatted.
    pub speed_text: String,
    /// When the segment entered its transfer task.
    pub queued_at: Option<Instant>,
    /// When the first body byte arrived.
    pub started_at: Option<Instant>,
    /// Error code recorded when the segment fails.
    pub error_code: Option<i32>,
}

impl SegmentState {
    /// Creates an idle record for one manifest part.
    #[must_use]
    pub fn new(index: u32, file_name: &str, size: u64) -> Self {
        Self {
            index,
            file_name: file_name.to_string(),
            size,
            status: SegmentStatus::Idle,
            status_text: "Pending".to_string(),
            downloaded: 0,
            remaining: size,
            percent: 0,
            size_text: format_bytes(size),
            remaining_text: format_bytes(size),
            speed_text: String::new(),
            queued_at: None,
            started_at: None,
            error_code: None,
        }
    }

    /// Resets progress accounting to "nothing transferred": zero percent, the
    /// full declared size outstanding. Used when a segment is swept into a
    /// cancel or pause.
    pub fn reset_progress(&mut self) {
        self.downloaded = 0;
        self.percent = 0;
        self.remaining = self.size;
        self.remaining_text = format_bytes(self.size);
    }
}

/// Point-in-time aggregate view of the session, returned by `snapshot()`.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    /// Summed speed of still-transferring segments, formatted.
    pub transfer_rate: String,
    /// Damped ETA, formatted ("Unknown" before the first byte).
    pub time_left: String,
    /// Declared package size, formatted.
    pub package_size: String,
    /// Bytes outstanding across the package, formatted.
    pub package_remaining: String,
    /// Segments that reached [`SegmentStatus::Completed`].
    pub downloaded_segments: usize,
    /// Segments in the manifest.
    pub total_segments: usize,
    /// Segments that reached [`SegmentStatus::ErrorOccurred`].
    pub error_segments: usize,
    /// Segments that reached [`SegmentStatus::Cancelled`].
    pub cancelled_segments: usize,
    /// Arithmetic mean of per-segment progress percentages.
    pub overall_progress: u64,
    /// Session lifecycle state.
    pub session: SessionStatus,
}

/// How a finished session resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every segment completed.
    Completed,
    /// The session ran to the end but this many segments failed.
    CompletedWithErrors(usize),
    /// The session was cancelled.
    Cancelled,
    /// The session was paused; gated-out segments produced no result.
    Paused,
}

/// Terminal record for one segment.
#[derive(Debug, Clone)]
pub struct SegmentResult {
    /// Manifest part index.
    pub index: u32,
    /// File name derived from the part URL.
    pub file_name: String,
    /// Where the segment was (or would have been) written.
    pub path: PathBuf,
    /// Final lifecycle state.
    pub status: SegmentStatus,
    /// Error code for failed segments.
    pub error_code: Option<i32>,
}

/// Result of `start_all`: the outcome, the wall clock, and one terminal
/// record per segment that produced one.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// How the session resolved.
    pub outcome: SessionOutcome,
    /// Wall-clock time from start to fan-in.
    pub elapsed: Duration,
    /// Terminal segment records, in completion order.
    pub results: Vec<SegmentResult>,
}
