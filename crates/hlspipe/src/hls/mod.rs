// Live HLS relay: playlist poller -> queue -> fetcher -> ring -> director -> sink

pub mod config;
pub(crate) mod director;
pub mod error;
pub mod fetcher;
pub mod playlist;
pub(crate) mod poller;
pub mod queue;
pub mod retry;
pub mod ring;
pub mod session;
pub mod sink;
pub mod transport;

// Re-exports for easier access
pub use config::{HlsPipeConfig, HlsPipeConfigBuilder};
pub use error::HlsPipeError;
pub use fetcher::{FetchedSegment, SegmentFetcher, throughput_kbps};
pub use playlist::{HttpPlaylistSource, PlaylistSnapshot, PlaylistSource};
pub use queue::{QueueEntry, SegmentQueue};
pub use session::{Session, StatusSnapshot};
pub use sink::OutputSink;
pub use transport::{HttpTransport, SegmentTransport, TransferReport};
