//! hydra-dl - A library for downloading segmented packages over HTTP.
//!
//! A package is described by a JSON manifest listing independently
//! addressable file segments. This library downloads those segments
//! concurrently with bounded parallelism, tracks live transfer statistics
//! (smoothed speed, damped ETA), and supports cooperative pause and cancel,
//! abstracted from any specific UI or display framework.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use hydra_dl::{DownloadCoordinator, EngineConfig, NoObserver, PackageManifest};
//!
//! # async fn example() -> hydra_dl::Result<()> {
//! let manifest = PackageManifest::from_json(
//!     r#"{"PackageId":"pkg-1","Size":1000,"NumParts":1,
//!         "Parts":[{"Index":0,"Size":1000,"Url":"https://cdn.example.com/pkg-1/part0.bin"}]}"#,
//! )?;
//!
//! // Download with default settings and no progress reporting
//! let config = EngineConfig::default().with_max_parallel(8);
//! let coordinator = DownloadCoordinator::new(config, manifest, Arc::new(NoObserver))?;
//!
//! let report = coordinator.start_all(Path::new("downloads")).await?;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod format;
pub mod fs;
pub mod manifest;
pub mod state;
pub mod stats;
pub mod transfer;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use coordinator::DownloadCoordinator;
pub use error::{Error, Result};
pub use event::{ChannelObserver, NoObserver, TransferEvent, TransferObserver};
pub use format::{format_bytes, format_duration, format_eta_seconds, format_speed};
pub use fs::{FileSystem, TokioFileSystem};
pub use manifest::{segment_file_name, PackageManifest, SegmentDescriptor};
pub use state::{
    SegmentResult, SegmentState, SegmentStatus, SessionOutcome, SessionReport, SessionStatus,
    StatsSnapshot,
};
pub use stats::{SegmentStat, TransferStatistics};
pub use transfer::{SegmentTransfer, TransferOutcome};
