//! Configuration types for the download engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reference chunk size for body reads (80 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 81_920;

/// Reference bound on concurrently transferring segments.
pub const DEFAULT_MAX_PARALLEL: usize = 30;

/// Configuration for a download session.
///
/// Replaces the ambient global client/parallelism state of earlier designs: the
/// coordinator receives one of these at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of segments transferring at once.
    pub max_parallel: usize,
    /// Size of each body read in bytes.
    pub chunk_size: usize,
    /// Optional per-request timeout in seconds. `None` leaves a stalled
    /// connection holding its slot indefinitely.
    pub request_timeout_secs: Option<u64>,
    /// Interval between aggregate snapshot polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: DEFAULT_MAX_PARALLEL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout_secs: None,
            poll_interval_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of concurrently transferring segments.
    #[must_use]
    pub const fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Sets the body read chunk size in bytes.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the per-request timeout in seconds.
    #[must_use]
    pub const fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Sets the snapshot polling interval in milliseconds.
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    /// Returns the per-request timeout, if configured.
    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        }
    }

    /// Returns the snapshot polling interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parses a configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Download`] if the document does not parse.
    pub fn from_toml_str(s: &str) -> crate::Result<Self> {
        toml::from_str(s).map_err(|e| crate::Error::Download(format!("bad config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_parallel, 30);
        assert_eq!(config.chunk_size, 81_920);
        assert!(config.request_timeout_secs.is_none());
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn builder_pattern() {
        let config = EngineConfig::new()
            .with_max_parallel(2)
            .with_chunk_size(512)
            .with_request_timeout_secs(30)
            .with_poll_interval_ms(100);

        assert_eq!(config.max_parallel, 2);
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn serializes_to_toml() {
        let config = EngineConfig::default().with_max_parallel(4);
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized = EngineConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(deserialized.max_parallel, 4);
        assert_eq!(deserialized.chunk_size, config.chunk_size);
        assert_eq!(deserialized.poll_interval_ms, config.poll_interval_ms);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml_str("max_parallel = 8\n").unwrap();
        assert_eq!(config.max_parallel, 8);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn bad_toml_is_rejected() {
        assert!(EngineConfig::from_toml_str("max_parallel = \"lots\"").is_err());
    }
}
