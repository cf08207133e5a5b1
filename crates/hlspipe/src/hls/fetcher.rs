// Segment fetcher: one deadline-bounded download into the staging file, and
// the loop that drains the queue into the ring.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hls::HlsPipeError;
use crate::hls::queue::{QueueEntry, SegmentQueue};
use crate::hls::ring::next_index;
use crate::hls::session::Shared;
use crate::hls::transport::SegmentTransport;

/// Throughput in kbit/s for `size_bytes` moved in `elapsed_nanos`.
/// Zero elapsed time yields 0; the result saturates at `u64::MAX`.
pub fn throughput_kbps(size_bytes: u64, elapsed_nanos: u128) -> u64 {
    if elapsed_nanos == 0 {
        return 0;
    }
    let kbps = u128::from(size_bytes) * 8 * 1_000_000_000 / elapsed_nanos / 1000;
    u64::try_from(kbps).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSegment {
    pub bytes: u64,
    pub elapsed: Duration,
    pub kbps: u64,
}

pub struct SegmentFetcher {
    transport: Arc<dyn SegmentTransport>,
    download_path: PathBuf,
    watchdog_tick: Duration,
}

impl SegmentFetcher {
    pub fn new(
        transport: Arc<dyn SegmentTransport>,
        download_path: PathBuf,
        watchdog_tick: Duration,
    ) -> Self {
        Self {
            transport,
            download_path,
            watchdog_tick,
        }
    }

    pub fn download_path(&self) -> &Path {
        &self.download_path
    }

    /// Download `entry` into the staging file. The transfer is aborted once
    /// it runs longer than the segment's own duration. Succeeds only on a 2xx
    /// status with a staged size equal to the advertised `Content-Length`.
    pub async fn fetch(&self, entry: &QueueEntry) -> Result<FetchedSegment, HlsPipeError> {
        match tokio::fs::remove_file(&self.download_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let deadline = Duration::try_from_secs_f64(entry.duration).unwrap_or(Duration::ZERO);
        let abort = CancellationToken::new();
        let started = Instant::now();
        let watchdog = tokio::spawn(watchdog(
            abort.clone(),
            started,
            deadline,
            self.watchdog_tick,
        ));

        let result = self
            .transport
            .fetch(&entry.uri, &self.download_path, &abort)
            .await;
        let elapsed = started.elapsed();
        watchdog.abort();

        let report = result?;
        if !report.is_success() {
            return Err(HlsPipeError::SegmentFetchError(format!(
                "HTTP {} for segment {}",
                report.status, entry.uri
            )));
        }

        let staged = tokio::fs::metadata(&self.download_path).await?.len();
        if report.content_length != Some(staged) {
            return Err(HlsPipeError::IncompleteSegment {
                expected: report.content_length,
                actual: staged,
            });
        }

        Ok(FetchedSegment {
            bytes: staged,
            elapsed,
            kbps: throughput_kbps(staged, elapsed.as_nanos()),
        })
    }
}

async fn watchdog(abort: CancellationToken, started: Instant, deadline: Duration, tick: Duration) {
    loop {
        tokio::time::sleep(tick).await;
        if started.elapsed() > deadline {
            debug!(deadline_ms = deadline.as_millis() as u64, "Watchdog aborting transfer");
            abort.cancel();
            return;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FetchStep {
    /// Nothing ready in the queue
    Idle,
    Dropped,
    /// Bootstrap copied the segment into every slot
    Filled,
    Stored { slot: usize },
    /// Fetched but not copied into the ring
    StoreFailed,
    Stopped,
}

pub(crate) struct FetcherLoop {
    shared: Arc<Shared>,
    queue: Arc<SegmentQueue>,
    fetcher: SegmentFetcher,
    token: CancellationToken,
    bootstrapped: bool,
}

impl FetcherLoop {
    pub fn new(
        shared: Arc<Shared>,
        queue: Arc<SegmentQueue>,
        fetcher: SegmentFetcher,
        token: CancellationToken,
    ) -> Self {
        Self {
            shared,
            queue,
            fetcher,
            token,
            bootstrapped: false,
        }
    }

    pub async fn run(mut self) {
        let idle = self.shared.config.queue_config.idle_poll_interval;
        loop {
            match self.step().await {
                FetchStep::Stopped => break,
                FetchStep::Idle => {
                    tokio::select! {
                        _ = self.token.cancelled() => break,
                        _ = tokio::time::sleep(idle) => {}
                    }
                }
                FetchStep::Dropped
                | FetchStep::Filled
                | FetchStep::Stored { .. }
                | FetchStep::StoreFailed => {}
            }
        }
        debug!("Fetcher loop exited");
    }

    pub async fn step(&mut self) -> FetchStep {
        if self.token.is_cancelled() {
            return FetchStep::Stopped;
        }
        let Some(entry) = self.queue.take() else {
            return FetchStep::Idle;
        };

        let fetched = match self.fetcher.fetch(&entry).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(uri = %entry.uri, error = %e, "Dropping segment");
                return FetchStep::Dropped;
            }
        };

        let source = self.fetcher.download_path();
        if !self.bootstrapped {
            match self.shared.ring.fill(source, &self.token).await {
                Ok(()) => {}
                Err(HlsPipeError::Cancelled) => return FetchStep::Stopped,
                Err(e) => return self.store_failed(&entry, None, &e),
            }
            {
                let mut state = self.shared.state.lock();
                if self.token.is_cancelled() {
                    return FetchStep::Stopped;
                }
                state.segments_fetched += 1;
                state.last_kbps = fetched.kbps;
                state.durations.fill(entry.duration);
            }
            self.bootstrapped = true;
            info!(uri = %entry.uri, kbps = fetched.kbps, "First segment fetched, ring filled");
            return FetchStep::Filled;
        }

        // Only this loop moves the write cursor. The slot stays locked until
        // the cursor and count are committed, so a reader that observes the
        // new count finds the new content.
        let slot = {
            let state = self.shared.state.lock();
            next_index(state.write_cursor, state.durations.len())
        };
        let guard = self.shared.ring.lock(slot).await;
        if self.token.is_cancelled() {
            return FetchStep::Stopped;
        }
        if let Err(e) = guard.copy_from(source).await {
            drop(guard);
            return self.store_failed(&entry, Some(slot), &HlsPipeError::from(e));
        }
        {
            let mut state = self.shared.state.lock();
            if self.token.is_cancelled() {
                return FetchStep::Stopped;
            }
            state.segments_fetched += 1;
            state.last_kbps = fetched.kbps;
            state.write_cursor = slot;
            state.durations[slot] = entry.duration;
        }
        drop(guard);
        debug!(uri = %entry.uri, slot, kbps = fetched.kbps, bytes = fetched.bytes, "Segment fetched");
        FetchStep::Stored { slot }
    }

    /// The segment is lost: nothing is counted and the cursor stays put.
    fn store_failed(&self, entry: &QueueEntry, slot: Option<usize>, e: &HlsPipeError) -> FetchStep {
        let mut state = self.shared.state.lock();
        if self.token.is_cancelled() {
            return FetchStep::Stopped;
        }
        state.slot_write_failures += 1;
        warn!(uri = %entry.uri, ?slot, error = %e, "Failed to store segment in ring");
        FetchStep::StoreFailed
    }
}
