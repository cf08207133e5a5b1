// Session: owns configuration, shared state and the lifecycle of the three loops.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::create_client;
use crate::hls::HlsPipeError;
use crate::hls::config::HlsPipeConfig;
use crate::hls::director::Director;
use crate::hls::fetcher::{FetcherLoop, SegmentFetcher};
use crate::hls::playlist::{HttpPlaylistSource, PlaylistSource};
use crate::hls::poller::PlaylistPoller;
use crate::hls::queue::SegmentQueue;
use crate::hls::ring::{SegmentRing, purge_staged_files};
use crate::hls::sink::OutputSink;
use crate::hls::transport::{HttpTransport, SegmentTransport};

/// Mutable session state. Guarded by one lock that is never held across I/O.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SessionState {
    pub running: bool,
    pub pause_requested: bool,
    pub pause_in_effect: bool,
    pub sink_broken: bool,
    pub segments_fetched: u64,
    pub last_kbps: u64,
    pub playlist_failures: u64,
    /// Fetched segments that could not be copied into the ring
    pub slot_write_failures: u64,
    /// Unix seconds of the last successful playlist fetch, 0 = never
    pub last_playlist_fetch: i64,
    pub last_media_sequence: Option<u64>,
    pub last_target_duration: f64,
    pub write_cursor: usize,
    pub read_cursor: usize,
    pub durations: Vec<f64>,
}

impl SessionState {
    pub fn new(slot_count: usize) -> Self {
        Self {
            running: false,
            pause_requested: false,
            pause_in_effect: false,
            sink_broken: false,
            segments_fetched: 0,
            last_kbps: 0,
            playlist_failures: 0,
            slot_write_failures: 0,
            last_playlist_fetch: 0,
            last_media_sequence: None,
            last_target_duration: 0.0,
            write_cursor: 0,
            read_cursor: 0,
            durations: vec![0.0; slot_count],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PauseSignal {
    pub running: bool,
    pub paused: bool,
}

/// Everything the loops of one session share.
pub(crate) struct Shared {
    pub config: Arc<HlsPipeConfig>,
    pub state: Mutex<SessionState>,
    pub ring: SegmentRing,
    pub sink: Mutex<Option<Arc<OutputSink>>>,
    pause_tx: watch::Sender<PauseSignal>,
}

impl Shared {
    pub fn new(config: Arc<HlsPipeConfig>) -> Self {
        let (pause_tx, _) = watch::channel(PauseSignal {
            running: false,
            paused: false,
        });
        Self {
            state: Mutex::new(SessionState::new(config.ring_config.slot_count)),
            ring: SegmentRing::new(&config),
            sink: Mutex::new(None),
            pause_tx,
            config,
        }
    }

    /// Mirror the pause fields of `state` into the watch channel. Call with
    /// the state lock held.
    pub fn publish_pause(&self, state: &SessionState) {
        self.pause_tx.send_replace(PauseSignal {
            running: state.running,
            paused: state.pause_in_effect,
        });
    }

    pub fn current_sink(&self) -> Option<Arc<OutputSink>> {
        self.sink.lock().clone()
    }

    fn subscribe_pause(&self) -> watch::Receiver<PauseSignal> {
        self.pause_tx.subscribe()
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub segments_fetched: u64,
    /// Throughput of the last successful fetch, kbit/s
    pub last_kbps: u64,
    /// Consecutive failed playlist polls
    pub playlist_failures: u64,
    /// Fetched segments lost because the ring copy failed
    pub slot_write_failures: u64,
    pub sink_broken: bool,
    /// The director is parked and writes nothing
    pub paused: bool,
    /// Unix seconds, 0 if no playlist has been fetched since the last start
    pub last_playlist_fetch: i64,
    pub queued_segments: usize,
    pub write_cursor: usize,
    pub read_cursor: usize,
}

struct RunContext {
    token: CancellationToken,
}

pub struct Session {
    shared: Arc<Shared>,
    source: Arc<dyn PlaylistSource>,
    transport: Arc<dyn SegmentTransport>,
    queue: Mutex<Arc<SegmentQueue>>,
    run_context: Mutex<Option<RunContext>>,
    // Serializes run/stop; they await I/O, so the state lock cannot do it.
    lifecycle: tokio::sync::Mutex<()>,
}

impl Session {
    /// Session backed by the HTTP playlist source and transport.
    pub fn new(config: HlsPipeConfig) -> Result<Self, HlsPipeError> {
        config.validate()?;
        let client = create_client(&config.base)
            .map_err(|e| HlsPipeError::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        let source = HttpPlaylistSource::new(client.clone(), &config.playlist_url, config.base.timeout)?;
        let transport = HttpTransport::new(client, &config.fetcher_config);
        Self::with_components(config, Arc::new(source), Arc::new(transport))
    }

    /// Session with caller supplied collaborators.
    pub fn with_components(
        config: HlsPipeConfig,
        source: Arc<dyn PlaylistSource>,
        transport: Arc<dyn SegmentTransport>,
    ) -> Result<Self, HlsPipeError> {
        config.validate()?;
        let config = Arc::new(config);
        let queue = Arc::new(SegmentQueue::new(config.queue_config.entry_timeout));
        Ok(Self {
            shared: Arc::new(Shared::new(config)),
            source,
            transport,
            queue: Mutex::new(queue),
            run_context: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &HlsPipeConfig {
        &self.shared.config
    }

    /// Open the sink, clear staged files and start the poller, fetcher and
    /// director. Fails with [`HlsPipeError::SinkOpen`] when the sink cannot be
    /// opened; callers treat that as fatal.
    pub async fn run(&self) -> Result<(), HlsPipeError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.shared.state.lock().running {
            return Err(HlsPipeError::AlreadyRunning);
        }

        let config = Arc::clone(&self.shared.config);
        let sink = OutputSink::open(&config.sink_path).await?;
        let removed = purge_staged_files(&config).await?;
        debug!(removed, dir = %config.staging_dir.display(), "Cleared staged segments");

        let token = CancellationToken::new();
        let queue = Arc::clone(&self.queue.lock());
        *self.shared.sink.lock() = Some(Arc::new(sink));
        {
            let mut state = self.shared.state.lock();
            *state = SessionState::new(config.ring_config.slot_count);
            state.running = true;
            self.shared.publish_pause(&state);
        }

        let poller = PlaylistPoller::new(
            Arc::clone(&self.shared),
            Arc::clone(&queue),
            Arc::clone(&self.source),
            token.clone(),
        );
        let fetcher = FetcherLoop::new(
            Arc::clone(&self.shared),
            queue,
            SegmentFetcher::new(
                Arc::clone(&self.transport),
                config.download_path(),
                config.fetcher_config.watchdog_tick,
            ),
            token.clone(),
        );
        let director = Director::new(Arc::clone(&self.shared), token.clone());

        tokio::spawn(poller.run());
        tokio::spawn(fetcher.run());
        tokio::spawn(director.run());

        *self.run_context.lock() = Some(RunContext { token });
        info!(
            playlist = %config.playlist_url,
            sink = %config.sink_path.display(),
            slots = config.ring_config.slot_count,
            "Session started"
        );
        Ok(())
    }

    /// Signal the loops to exit, close the sink and reset all counters.
    /// In-flight fetches and sink writes are allowed to finish; their results
    /// are discarded.
    pub async fn stop(&self) -> Result<(), HlsPipeError> {
        let _lifecycle = self.lifecycle.lock().await;
        {
            let mut state = self.shared.state.lock();
            if !state.running {
                return Err(HlsPipeError::AlreadyStopped);
            }
            // Cancel under the state lock so no loop commits after the reset.
            if let Some(context) = self.run_context.lock().take() {
                context.token.cancel();
            }
            *state = SessionState::new(self.shared.config.ring_config.slot_count);
            self.shared.publish_pause(&state);
        }

        *self.queue.lock() = Arc::new(SegmentQueue::new(
            self.shared.config.queue_config.entry_timeout,
        ));
        // The director may still hold a clone mid-write; the pipe closes once
        // that write completes.
        drop(self.shared.sink.lock().take());

        info!("Session stopped");
        Ok(())
    }

    /// Ask the director to park at the next segment boundary. No-op unless
    /// running. Returns whether the request was recorded.
    pub fn pause(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.running {
            state.pause_requested = true;
        }
        state.running
    }

    /// Lift a pause that has taken effect. Returns whether it was lifted.
    pub fn resume(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.running && state.pause_in_effect && state.pause_requested {
            state.pause_requested = false;
            return true;
        }
        false
    }

    /// Resolves once the director is parked. Errors with
    /// [`HlsPipeError::NotRunning`] if the session is or becomes stopped.
    pub async fn wait_for_paused(&self) -> Result<(), HlsPipeError> {
        let mut rx = self.shared.subscribe_pause();
        let signal = *rx
            .wait_for(|signal| signal.paused || !signal.running)
            .await
            .map_err(|_| HlsPipeError::InternalError("pause channel closed".to_string()))?;
        if signal.paused {
            Ok(())
        } else {
            Err(HlsPipeError::NotRunning)
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let queued_segments = self.queue.lock().len();
        let state = self.shared.state.lock();
        StatusSnapshot {
            running: state.running,
            segments_fetched: state.segments_fetched,
            last_kbps: state.last_kbps,
            playlist_failures: state.playlist_failures,
            slot_write_failures: state.slot_write_failures,
            sink_broken: state.sink_broken,
            paused: state.pause_in_effect,
            last_playlist_fetch: state.last_playlist_fetch,
            queued_segments,
            write_cursor: state.write_cursor,
            read_cursor: state.read_cursor,
        }
    }

    /// Per-slot durations in seconds, as last written by the fetcher.
    pub fn slot_durations(&self) -> Vec<f64> {
        self.shared.state.lock().durations.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }
}
