//! Error types for the hydra-dl library.

use thiserror::Error;

/// Errors that can occur during package download operations.
///
/// Cancellation is deliberately not represented here: a cancelled segment is a
/// normal terminal outcome reported through
/// [`SegmentStatus`](crate::state::SegmentStatus), not a failure.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request, response, or body stream error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The package manifest is missing required data.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A statistics method was called before `init`.
    ///
    /// This is a call-order bug in the caller, surfaced immediately rather than
    /// papered over.
    #[error("transfer statistics not initialized")]
    StatsUninitialized,

    /// Download operation failed or was invoked out of sequence.
    #[error("download failed: {0}")]
    Download(String),
}

impl Error {
    /// Returns the opaque error code recorded against a failed segment.
    ///
    /// HTTP failures report their status code when one was received; every other
    /// category maps to a small stable code.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Http(e) => e.status().map_or(1, |s| i32::from(s.as_u16())),
            Self::Io(_) => 2,
            Self::InvalidManifest(_) => 3,
            Self::StatsUninitialized => 4,
            Self::Download(_) => 5,
        }
    }
}

/// A specialized `Result` type for hydra-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
