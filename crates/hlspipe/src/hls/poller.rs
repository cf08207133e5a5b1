// Playlist poller: keeps the segment queue fed from the live playlist.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::hls::playlist::PlaylistSource;
use crate::hls::queue::SegmentQueue;
use crate::hls::session::Shared;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PollOutcome {
    Failed,
    /// Same media sequence as last time
    Unchanged { target_duration: f64 },
    Enqueued { count: usize, target_duration: f64 },
    Stopped,
}

pub(crate) struct PlaylistPoller {
    shared: Arc<Shared>,
    queue: Arc<SegmentQueue>,
    source: Arc<dyn PlaylistSource>,
    token: CancellationToken,
}

impl PlaylistPoller {
    pub fn new(
        shared: Arc<Shared>,
        queue: Arc<SegmentQueue>,
        source: Arc<dyn PlaylistSource>,
        token: CancellationToken,
    ) -> Self {
        Self {
            shared,
            queue,
            source,
            token,
        }
    }

    pub async fn run(self) {
        loop {
            let delay = match self.poll_once().await {
                PollOutcome::Stopped => break,
                outcome => self.delay_after(&outcome),
            };
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!("Playlist poller exited");
    }

    /// How long to wait before the next poll.
    pub fn delay_after(&self, outcome: &PollOutcome) -> Duration {
        let config = &self.shared.config.playlist_config;
        let seconds = match outcome {
            PollOutcome::Failed | PollOutcome::Stopped => return config.failure_retry_delay,
            PollOutcome::Unchanged { target_duration } => target_duration / 2.0,
            PollOutcome::Enqueued {
                target_duration, ..
            } => *target_duration,
        };
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(Duration::ZERO)
            .max(config.min_refresh_interval)
    }

    pub async fn poll_once(&self) -> PollOutcome {
        let expired = self.queue.upkeep();
        if expired > 0 {
            debug!(expired, "Dropped expired queue entries");
        }

        let result = self.source.fetch().await;

        let mut state = self.shared.state.lock();
        if self.token.is_cancelled() {
            return PollOutcome::Stopped;
        }
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                state.playlist_failures += 1;
                warn!(failures = state.playlist_failures, error = %e, "Playlist fetch failed");
                return PollOutcome::Failed;
            }
        };

        state.playlist_failures = 0;
        state.last_playlist_fetch = chrono::Utc::now().timestamp();
        if !state.running {
            return PollOutcome::Stopped;
        }

        if state.last_media_sequence == Some(snapshot.media_sequence) {
            return PollOutcome::Unchanged {
                target_duration: snapshot.target_duration,
            };
        }

        state.last_media_sequence = Some(snapshot.media_sequence);
        state.last_target_duration = snapshot.target_duration;
        for (uri, duration) in snapshot.entries() {
            self.queue.add(uri, duration);
        }
        debug!(
            sequence = snapshot.media_sequence,
            count = snapshot.len(),
            "Enqueued playlist segments"
        );
        PollOutcome::Enqueued {
            count: snapshot.len(),
            target_duration: snapshot.target_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::HlsPipeError;
    use crate::hls::config::HlsPipeConfig;
    use crate::hls::playlist::PlaylistSnapshot;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedPlaylist {
        script: Mutex<VecDeque<Result<PlaylistSnapshot, HlsPipeError>>>,
    }

    #[async_trait]
    impl PlaylistSource for ScriptedPlaylist {
        async fn fetch(&self) -> Result<PlaylistSnapshot, HlsPipeError> {
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(HlsPipeError::PlaylistError("script exhausted".into())))
        }
    }

    fn snapshot(sequence: u64, names: &[&str]) -> PlaylistSnapshot {
        PlaylistSnapshot {
            segments: names.iter().map(|n| format!("http://x/{n}")).collect(),
            durations: vec![4.0; names.len()],
            media_sequence: sequence,
            target_duration: 4.0,
        }
    }

    fn poller(
        script: Vec<Result<PlaylistSnapshot, HlsPipeError>>,
    ) -> (PlaylistPoller, Arc<Shared>, Arc<SegmentQueue>) {
        let config = HlsPipeConfig::builder("http://x/live.m3u8").build().unwrap();
        let shared = Arc::new(Shared::new(Arc::new(config)));
        shared.state.lock().running = true;
        let queue = Arc::new(SegmentQueue::new(Duration::from_secs(60)));
        let source = Arc::new(ScriptedPlaylist {
            script: Mutex::new(script.into()),
        });
        let poller = PlaylistPoller::new(
            Arc::clone(&shared),
            Arc::clone(&queue),
            source,
            CancellationToken::new(),
        );
        (poller, shared, queue)
    }

    #[tokio::test]
    async fn new_sequence_enqueues_in_playlist_order() {
        let (poller, shared, queue) = poller(vec![Ok(snapshot(1, &["a.ts", "b.ts", "c.ts"]))]);
        let outcome = poller.poll_once().await;
        assert_eq!(
            outcome,
            PollOutcome::Enqueued {
                count: 3,
                target_duration: 4.0
            }
        );
        assert_eq!(poller.delay_after(&outcome), Duration::from_secs(4));
        let uris: Vec<_> = std::iter::from_fn(|| queue.take()).map(|e| e.uri).collect();
        assert_eq!(uris, vec!["http://x/a.ts", "http://x/b.ts", "http://x/c.ts"]);
        let state = shared.state.lock();
        assert_eq!(state.last_media_sequence, Some(1));
        assert!(state.last_playlist_fetch > 0);
    }

    #[tokio::test]
    async fn repeated_sequence_enqueues_nothing() {
        let (poller, _, queue) = poller(vec![
            Ok(snapshot(7, &["a.ts"])),
            Ok(snapshot(7, &["a.ts"])),
        ]);
        poller.poll_once().await;
        let outcome = poller.poll_once().await;
        assert_eq!(
            outcome,
            PollOutcome::Unchanged {
                target_duration: 4.0
            }
        );
        assert_eq!(poller.delay_after(&outcome), Duration::from_secs(2));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn sequence_zero_is_not_mistaken_for_a_repeat() {
        let (poller, _, queue) = poller(vec![Ok(snapshot(0, &["a.ts"]))]);
        assert!(matches!(
            poller.poll_once().await,
            PollOutcome::Enqueued { count: 1, .. }
        ));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn failures_are_counted_and_reset_on_success() {
        let (poller, shared, _) = poller(vec![
            Err(HlsPipeError::PlaylistError("503".into())),
            Err(HlsPipeError::PlaylistError("503".into())),
            Ok(snapshot(3, &["a.ts"])),
        ]);
        assert_eq!(poller.poll_once().await, PollOutcome::Failed);
        assert_eq!(poller.poll_once().await, PollOutcome::Failed);
        assert_eq!(shared.state.lock().playlist_failures, 2);
        assert_eq!(
            poller.delay_after(&PollOutcome::Failed),
            Duration::from_secs(2)
        );
        poller.poll_once().await;
        assert_eq!(shared.state.lock().playlist_failures, 0);
    }

    #[tokio::test]
    async fn zero_target_duration_uses_refresh_floor() {
        let (poller, _, _) = poller(vec![]);
        let outcome = PollOutcome::Unchanged {
            target_duration: 0.0,
        };
        assert_eq!(poller.delay_after(&outcome), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn stopped_session_ends_the_poller() {
        let (poller, shared, queue) = poller(vec![Ok(snapshot(1, &["a.ts"]))]);
        shared.state.lock().running = false;
        assert_eq!(poller.poll_once().await, PollOutcome::Stopped);
        assert!(queue.is_empty());
    }
}
