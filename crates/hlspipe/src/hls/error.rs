use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsPipeError {
    #[error("hlspipe: session is already running")]
    AlreadyRunning,
    #[error("hlspipe: session is already stopped")]
    AlreadyStopped,
    #[error("hlspipe: session is not running")]
    NotRunning,
    #[error("Failed to open output sink {path}: {source}")]
    SinkOpen {
        path: PathBuf,
        source: Arc<std::io::Error>,
    },
    #[error("Playlist error: {0}")]
    PlaylistError(String),
    #[error("Segment fetch error: {0}")]
    SegmentFetchError(String),
    #[error("Transfer aborted by watchdog")]
    TransferAborted,
    #[error("Incomplete segment: expected {expected:?} bytes, staged {actual}")]
    IncompleteSegment { expected: Option<u64>, actual: u64 },
    #[error("Network error: {source}")]
    NetworkError {
        #[from]
        source: Arc<reqwest::Error>,
    },
    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: Arc<std::io::Error>,
    },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Operation timed out: {0}")]
    TimeoutError(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl HlsPipeError {
    pub fn sink_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::SinkOpen {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Whether the transport should attempt the request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { source } => {
                source.is_connect() || source.is_timeout() || source.is_request() || source.is_body()
            }
            Self::TimeoutError(_) => true,
            _ => false,
        }
    }
}

// Manual From impls because of the Arc wrapping.
impl From<reqwest::Error> for HlsPipeError {
    fn from(err: reqwest::Error) -> Self {
        HlsPipeError::NetworkError {
            source: Arc::new(err),
        }
    }
}

impl From<std::io::Error> for HlsPipeError {
    fn from(err: std::io::Error) -> Self {
        HlsPipeError::IoError {
            source: Arc::new(err),
        }
    }
}
