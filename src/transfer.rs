//! Single-segment HTTP transfer.
//!
//! A [`SegmentTransfer`] moves one manifest part from its URL to disk in
//! fixed-size chunks, feeding its [`SegmentStat`](crate::stats::SegmentStat)
//! and reporting lifecycle events through the observer. Cancellation is
//! cooperative: the token is polled between chunks, and a cancelled transfer
//! resolves `Ok` with a truncated output file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use futures::TryStreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::event::TransferObserver;
use crate::fs::FileSystem;
use crate::manifest::{segment_file_name, SegmentDescriptor};
use crate::state::SegmentStatus;
use crate::stats::TransferStatistics;

/// How many chunks pass between progress reports.
const PROGRESS_EVERY_CHUNKS: u64 = 10;

/// What a finished transfer hands back to the coordinator.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    /// Where the segment was written.
    pub path: PathBuf,
    /// Bytes actually written; for a cancelled transfer, the truncated length.
    pub bytes_written: u64,
    /// Whether the transfer stopped at a cancellation check.
    pub cancelled: bool,
}

/// Transfers one segment from its URL to `<root>/<file name>`.
///
/// Borrows the session-shared pieces from the coordinator; one instance is
/// created per segment task.
pub struct SegmentTransfer<'a, F: FileSystem> {
    descriptor: &'a SegmentDescriptor,
    chunk_size: usize,
    client: &'a reqwest::Client,
    fs: &'a F,
    stats: &'a Mutex<TransferStatistics>,
    observer: &'a dyn TransferObserver,
    cancel: &'a CancellationToken,
}

impl<'a, F: FileSystem> SegmentTransfer<'a, F> {
    /// Creates a transfer for one manifest part.
    #[must_use]
    pub fn new(
        descriptor: &'a SegmentDescriptor,
        chunk_size: usize,
        client: &'a reqwest::Client,
        fs: &'a F,
        stats: &'a Mutex<TransferStatistics>,
        observer: &'a dyn TransferObserver,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            descriptor,
            chunk_size,
            client,
            fs,
            stats,
            observer,
            cancel,
        }
    }

    /// Runs the transfer to a terminal state.
    ///
    /// Resolves `Ok` for both completion and cancellation; the outcome says
    /// which. The observer sees `ErrorOccurred` before any `Err` returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] for request, status, or body stream failures
    /// and [`Error::Io`] for file system failures.
    pub async fn run(&self, root: &Path) -> Result<TransferOutcome> {
        let index = self.descriptor.index;
        self.observer
            .on_state_change(index, SegmentStatus::Initialized);
        match self.transfer(root).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.observer
                    .on_state_change(index, SegmentStatus::ErrorOccurred);
                Err(e)
            }
        }
    }

    async fn transfer(&self, root: &Path) -> Result<TransferOutcome> {
        let index = self.descriptor.index;
        let file_name = segment_file_name(&self.descriptor.url).ok_or_else(|| {
            Error::InvalidManifest(format!("part {index} has no usable file name"))
        })?;
        let path = root.join(&file_name);

        let response = self
            .client
            .get(&self.descriptor.url)
            .send()
            .await?
            .error_for_status()?;
        let total = response.content_length();

        self.fs.create_dir_all(root).await?;
        if self.fs.file_exists(&path).await {
            log::debug!("part {index}: overwriting {}", path.display());
        }
        let mut file = self.fs.create_file(&path).await?;

        let mut reader = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut buf = vec![0u8; self.chunk_size];
        let mut read = reader.read(&mut buf).await?;

        // Lazy registration: after the first read, even when the body is empty
        let stat = {
            let mut stats = self.stats.lock().unwrap();
            stats.add_segment(&file_name, self.descriptor.size)?
        };

        let mut total_read: u64 = 0;
        let mut tick: u64 = 0;
        let mut started = false;

        while read > 0 {
            if self.cancel.is_cancelled() {
                file.flush().await?;
                self.observer.on_state_change(index, SegmentStatus::Cancelled);
                return Ok(TransferOutcome {
                    path,
                    bytes_written: total_read,
                    cancelled: true,
                });
            }

            if !started {
                started = true;
                self.observer.on_transfer_start(index);
                self.observer
                    .on_state_change(index, SegmentStatus::TransferInProgress);
                self.observer.on_progress(index, 0, 0, 0);
            }

            file.write_all(&buf[..read]).await?;
            total_read += read as u64;
            stat.receive(read as u64);

            if tick % PROGRESS_EVERY_CHUNKS == 0 {
                stat.update(Instant::now());
                let (percent, remaining, declared) = progress_figures(total, total_read);
                self.observer.on_progress(index, percent, remaining, declared);
            }
            tick += 1;

            read = reader.read(&mut buf).await?;
        }

        file.flush().await?;
        self.observer.on_transfer_complete(index);
        self.observer.on_state_change(index, SegmentStatus::Completed);
        Ok(TransferOutcome {
            path,
            bytes_written: total_read,
            cancelled: false,
        })
    }
}

/// Progress figures for a report: `(percent, remaining, total)`.
///
/// All zeros when the response declared no usable content length; the report
/// is degraded, not an error.
const fn progress_figures(total: Option<u64>, total_read: u64) -> (u64, u64, u64) {
    match total {
        Some(t) if t > 0 => (total_read * 100 / t, t.saturating_sub(total_read), t),
        _ => (0, 0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::event::{ChannelObserver, TransferEvent};
    use crate::fs::TokioFileSystem;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor(index: u32, url: &str, size: u64) -> SegmentDescriptor {
        SegmentDescriptor {
            index,
            url: url.to_string(),
            size,
            ..SegmentDescriptor::default()
        }
    }

    fn init_stats(total: u64) -> Mutex<TransferStatistics> {
        let mut stats = TransferStatistics::new();
        stats.init(total);
        Mutex::new(stats)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TransferEvent>) -> Vec<TransferEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn serve_body(server: &MockServer, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(url_path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn transfers_body_and_reports_lifecycle() {
        let server = MockServer::start().await;
        let body: Vec<u8> = (0..1200u32).map(|i| (i % 251) as u8).collect();
        serve_body(&server, "/pkg/tools.part0.bin", body.clone()).await;

        let dir = TempDir::new().unwrap();
        let part = descriptor(0, &format!("{}/pkg/tools.part0.bin", server.uri()), 1200);
        let config = EngineConfig::default().with_chunk_size(512);
        let client = reqwest::Client::new();
        let fs = TokioFileSystem::new();
        let stats = init_stats(1200);
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);

        let transfer = SegmentTransfer::new(
            &part,
            config.chunk_size,
            &client,
            &fs,
            &stats,
            &observer,
            &token,
        );
        let outcome = transfer.run(dir.path()).await.unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.bytes_written, 1200);
        assert_eq!(outcome.path, dir.path().join("tools.part0.bin"));
        assert_eq!(std::fs::read(&outcome.path).unwrap(), body);
        assert_eq!(stats.lock().unwrap().downloaded_bytes().unwrap(), 1200);

        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            TransferEvent::StateChanged {
                index: 0,
                status: SegmentStatus::Initialized
            }
        );
        assert_eq!(events[1], TransferEvent::TransferStarted { index: 0 });
        assert_eq!(
            events[2],
            TransferEvent::StateChanged {
                index: 0,
                status: SegmentStatus::TransferInProgress
            }
        );
        assert_eq!(
            events[3],
            TransferEvent::Progress {
                index: 0,
                percent: 0,
                remaining: 0,
                total: 0
            }
        );
        assert_eq!(
            events[events.len() - 2],
            TransferEvent::TransferCompleted { index: 0 }
        );
        assert_eq!(
            events[events.len() - 1],
            TransferEvent::StateChanged {
                index: 0,
                status: SegmentStatus::Completed
            }
        );
        // Everything between the start trio and the completion pair is
        // periodic progress against the declared length.
        for event in &events[4..events.len() - 2] {
            match event {
                TransferEvent::Progress {
                    percent,
                    total,
                    ..
                } => {
                    assert!(*percent <= 100);
                    assert_eq!(*total, 1200);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn http_error_reports_error_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/pkg/missing.bin"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let part = descriptor(3, &format!("{}/pkg/missing.bin", server.uri()), 1000);
        let client = reqwest::Client::new();
        let fs = TokioFileSystem::new();
        let stats = init_stats(1000);
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);

        let transfer = SegmentTransfer::new(&part, 512, &client, &fs, &stats, &observer, &token);
        let err = transfer.run(dir.path()).await.unwrap_err();
        assert_eq!(err.code(), 404);
        assert!(!dir.path().join("missing.bin").exists());

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                TransferEvent::StateChanged {
                    index: 3,
                    status: SegmentStatus::Initialized
                },
                TransferEvent::StateChanged {
                    index: 3,
                    status: SegmentStatus::ErrorOccurred
                },
            ]
        );
    }

    #[tokio::test]
    async fn cancellation_resolves_ok_with_truncated_file() {
        let server = MockServer::start().await;
        serve_body(&server, "/pkg/a.bin", vec![7u8; 4096]).await;

        let dir = TempDir::new().unwrap();
        let part = descriptor(1, &format!("{}/pkg/a.bin", server.uri()), 4096);
        let client = reqwest::Client::new();
        let fs = TokioFileSystem::new();
        let stats = init_stats(4096);
        let token = CancellationToken::new();
        token.cancel();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);

        let transfer = SegmentTransfer::new(&part, 512, &client, &fs, &stats, &observer, &token);
        let outcome = transfer.run(dir.path()).await.unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.bytes_written, 0);
        // The output file exists, truncated at what was written before the
        // cancellation check fired.
        assert_eq!(std::fs::metadata(&outcome.path).unwrap().len(), 0);

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                TransferEvent::StateChanged {
                    index: 1,
                    status: SegmentStatus::Initialized
                },
                TransferEvent::StateChanged {
                    index: 1,
                    status: SegmentStatus::Cancelled
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_body_completes() {
        let server = MockServer::start().await;
        serve_body(&server, "/pkg/empty.bin", Vec::new()).await;

        let dir = TempDir::new().unwrap();
        let part = descriptor(0, &format!("{}/pkg/empty.bin", server.uri()), 0);
        let client = reqwest::Client::new();
        let fs = TokioFileSystem::new();
        let stats = init_stats(0);
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);

        let transfer = SegmentTransfer::new(&part, 512, &client, &fs, &stats, &observer, &token);
        let outcome = transfer.run(dir.path()).await.unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.bytes_written, 0);
        assert_eq!(std::fs::metadata(&outcome.path).unwrap().len(), 0);

        let events = drain(&mut rx);
        // No body chunks, so no transfer-start trio; just the completion pair.
        assert_eq!(
            events,
            vec![
                TransferEvent::StateChanged {
                    index: 0,
                    status: SegmentStatus::Initialized
                },
                TransferEvent::TransferCompleted { index: 0 },
                TransferEvent::StateChanged {
                    index: 0,
                    status: SegmentStatus::Completed
                },
            ]
        );
    }

    #[tokio::test]
    async fn file_system_failure_reports_error_state() {
        struct FailingFileSystem;

        #[async_trait]
        impl FileSystem for FailingFileSystem {
            async fn file_exists(&self, _path: &Path) -> bool {
                false
            }

            async fn create_dir_all(&self, _path: &Path) -> std::io::Result<()> {
                Ok(())
            }

            async fn create_file(&self, _path: &Path) -> std::io::Result<tokio::fs::File> {
                Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only target",
                ))
            }
        }

        let server = MockServer::start().await;
        serve_body(&server, "/pkg/a.bin", vec![1u8; 64]).await;

        let dir = TempDir::new().unwrap();
        let part = descriptor(2, &format!("{}/pkg/a.bin", server.uri()), 64);
        let client = reqwest::Client::new();
        let fs = FailingFileSystem;
        let stats = init_stats(64);
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);

        let transfer = SegmentTransfer::new(&part, 512, &client, &fs, &stats, &observer, &token);
        let err = transfer.run(dir.path()).await.unwrap_err();
        assert_eq!(err.code(), 2);

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&TransferEvent::StateChanged {
                index: 2,
                status: SegmentStatus::ErrorOccurred
            })
        );
    }

    #[test]
    fn progress_figures_known_length() {
        assert_eq!(progress_figures(Some(1000), 0), (0, 1000, 1000));
        assert_eq!(progress_figures(Some(1000), 250), (25, 750, 1000));
        assert_eq!(progress_figures(Some(1200), 512), (42, 688, 1200));
        assert_eq!(progress_figures(Some(1000), 1000), (100, 0, 1000));
    }

    #[test]
    fn progress_figures_unknown_length_degrades() {
        assert_eq!(progress_figures(None, 500), (0, 0, 0));
        assert_eq!(progress_figures(Some(0), 500), (0, 0, 0));
    }
}
