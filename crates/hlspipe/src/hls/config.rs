use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::DownloaderConfig;
use crate::hls::HlsPipeError;

/// Directory holding `download.<ext>` and the `play<N>.<ext>` ring files
pub const DEFAULT_STAGING_DIR: &str = "/var/segments/";

/// Named pipe the director writes to; it must exist before `run` (`mkfifo`)
pub const DEFAULT_SINK_PATH: &str = "/var/segments/fifo";

// --- Playlist Configuration ---
#[derive(Debug, Clone)]
pub struct PlaylistPollConfig {
    /// Delay before retrying after a failed fetch or parse
    pub failure_retry_delay: Duration,
    /// Floor for every refresh sleep, so a zero target duration cannot spin
    pub min_refresh_interval: Duration,
}

impl Default for PlaylistPollConfig {
    fn default() -> Self {
        Self {
            failure_retry_delay: Duration::from_secs(2),
            min_refresh_interval: Duration::from_millis(500),
        }
    }
}

// --- Queue Configuration ---
#[derive(Debug, Clone)]
pub struct SegmentQueueConfig {
    /// Entries not taken within this window are dropped
    pub entry_timeout: Duration,
    /// Fetcher sleep when the queue has nothing ready
    pub idle_poll_interval: Duration,
}

impl Default for SegmentQueueConfig {
    fn default() -> Self {
        Self {
            entry_timeout: Duration::from_secs(60),
            idle_poll_interval: Duration::from_secs(1),
        }
    }
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct SegmentFetchConfig {
    /// Retries after the first attempt
    pub max_segment_retries: u32,
    pub segment_retry_delay_base: Duration, // Base for exponential backoff
    pub segment_retry_delay_max: Duration,
    /// Bandwidth cap in bytes per second, zero disables throttling
    pub rate_limit_bytes_per_sec: u64,
    /// Per request HTTP timeout
    pub segment_request_timeout: Duration,
    /// How often the watchdog compares elapsed time with the segment duration
    pub watchdog_tick: Duration,
}

impl Default for SegmentFetchConfig {
    fn default() -> Self {
        Self {
            max_segment_retries: 3,
            segment_retry_delay_base: Duration::from_millis(250),
            segment_retry_delay_max: Duration::from_secs(2),
            rate_limit_bytes_per_sec: 625 * 1024,
            segment_request_timeout: Duration::from_secs(30),
            watchdog_tick: Duration::from_secs(1),
        }
    }
}

// --- Ring Configuration ---
#[derive(Debug, Clone)]
pub struct RingConfig {
    pub slot_count: usize,
    /// Segments that must be fetched before the director starts emitting
    pub min_buffered_segments: u64,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            slot_count: 7,
            min_buffered_segments: 3,
        }
    }
}

// --- Director Configuration ---
#[derive(Debug, Clone)]
pub struct DirectorConfig {
    pub pause_poll_interval: Duration,
    pub sink_retry_delay: Duration,
    /// Poll interval while waiting for the initial fill
    pub fill_poll_interval: Duration,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            pause_poll_interval: Duration::from_millis(50),
            sink_retry_delay: Duration::from_secs(1),
            fill_poll_interval: Duration::from_secs(1),
        }
    }
}

// --- Top-Level Configuration ---
#[derive(Debug, Clone)]
pub struct HlsPipeConfig {
    /// Base HTTP configuration
    pub base: DownloaderConfig,
    pub playlist_url: String,
    pub staging_dir: PathBuf,
    pub sink_path: PathBuf,
    /// Extension of staged files, without the dot
    pub segment_extension: String,
    pub playlist_config: PlaylistPollConfig,
    pub queue_config: SegmentQueueConfig,
    pub fetcher_config: SegmentFetchConfig,
    pub ring_config: RingConfig,
    pub director_config: DirectorConfig,
}

impl Default for HlsPipeConfig {
    fn default() -> Self {
        Self {
            base: DownloaderConfig::default(),
            playlist_url: String::new(),
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            sink_path: PathBuf::from(DEFAULT_SINK_PATH),
            segment_extension: "ts".to_string(),
            playlist_config: PlaylistPollConfig::default(),
            queue_config: SegmentQueueConfig::default(),
            fetcher_config: SegmentFetchConfig::default(),
            ring_config: RingConfig::default(),
            director_config: DirectorConfig::default(),
        }
    }
}

impl HlsPipeConfig {
    pub fn builder(playlist_url: impl Into<String>) -> HlsPipeConfigBuilder {
        HlsPipeConfigBuilder::new(playlist_url)
    }

    /// Working file the fetcher downloads into
    pub fn download_path(&self) -> PathBuf {
        self.staging_dir
            .join(format!("download.{}", self.segment_extension))
    }

    pub fn slot_path(&self, index: usize) -> PathBuf {
        self.staging_dir
            .join(format!("play{index}.{}", self.segment_extension))
    }

    /// True for files owned by the relay inside the staging directory
    pub fn is_staged_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.segment_extension)
    }

    pub fn validate(&self) -> Result<(), HlsPipeError> {
        if self.playlist_url.trim().is_empty() {
            return Err(HlsPipeError::ConfigError(
                "playlist URL must not be empty".to_string(),
            ));
        }
        if self.ring_config.slot_count == 0 {
            return Err(HlsPipeError::ConfigError(
                "ring needs at least one slot".to_string(),
            ));
        }
        if self.segment_extension.is_empty() || self.segment_extension.contains('.') {
            return Err(HlsPipeError::ConfigError(format!(
                "invalid segment extension '{}'",
                self.segment_extension
            )));
        }
        if self.ring_config.min_buffered_segments > self.ring_config.slot_count as u64 {
            return Err(HlsPipeError::ConfigError(format!(
                "minimum fill {} exceeds ring size {}",
                self.ring_config.min_buffered_segments, self.ring_config.slot_count
            )));
        }
        Ok(())
    }
}

/// Fluent builder for [`HlsPipeConfig`]
#[derive(Debug, Clone)]
pub struct HlsPipeConfigBuilder {
    config: HlsPipeConfig,
}

impl HlsPipeConfigBuilder {
    pub fn new(playlist_url: impl Into<String>) -> Self {
        Self {
            config: HlsPipeConfig {
                playlist_url: playlist_url.into(),
                ..HlsPipeConfig::default()
            },
        }
    }

    pub fn with_base_config(mut self, base: DownloaderConfig) -> Self {
        self.config.base = base;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    pub fn sink_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.sink_path = path.into();
        self
    }

    pub fn segment_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.segment_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn slot_count(mut self, slots: usize) -> Self {
        self.config.ring_config.slot_count = slots;
        self
    }

    pub fn min_buffered_segments(mut self, count: u64) -> Self {
        self.config.ring_config.min_buffered_segments = count;
        self
    }

    pub fn rate_limit(mut self, bytes_per_sec: u64) -> Self {
        self.config.fetcher_config.rate_limit_bytes_per_sec = bytes_per_sec;
        self
    }

    pub fn segment_retry_count(mut self, retries: u32) -> Self {
        self.config.fetcher_config.max_segment_retries = retries;
        self
    }

    pub fn queue_entry_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue_config.entry_timeout = timeout;
        self
    }

    pub fn playlist_config(mut self, config: PlaylistPollConfig) -> Self {
        self.config.playlist_config = config;
        self
    }

    pub fn queue_config(mut self, config: SegmentQueueConfig) -> Self {
        self.config.queue_config = config;
        self
    }

    pub fn fetcher_config(mut self, config: SegmentFetchConfig) -> Self {
        self.config.fetcher_config = config;
        self
    }

    pub fn director_config(mut self, config: DirectorConfig) -> Self {
        self.config.director_config = config;
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<HlsPipeConfig, HlsPipeError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
