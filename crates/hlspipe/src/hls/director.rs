// Director: replays ring slots in circular order into the output sink.

use std::sync::Arc;

use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hls::ring::next_index;
use crate::hls::session::Shared;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DirectorStep {
    Paused,
    Emitted { slot: usize, bytes: u64 },
    /// The slot file could not be opened; the sink was not touched
    SlotUnreadable { slot: usize },
    SinkFailed { slot: usize },
    Stopped,
}

pub(crate) struct Director {
    shared: Arc<Shared>,
    token: CancellationToken,
}

impl Director {
    pub fn new(shared: Arc<Shared>, token: CancellationToken) -> Self {
        Self { shared, token }
    }

    pub async fn run(self) {
        if self.wait_for_fill().await {
            info!("Ring filled, director started");
            let config = &self.shared.config.director_config;
            loop {
                let delay = match self.step().await {
                    DirectorStep::Stopped => break,
                    DirectorStep::Emitted { .. } => continue,
                    DirectorStep::Paused => config.pause_poll_interval,
                    DirectorStep::SlotUnreadable { .. } | DirectorStep::SinkFailed { .. } => {
                        config.sink_retry_delay
                    }
                };
                tokio::select! {
                    _ = self.token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        debug!("Director exited");
    }

    /// Waits until enough segments have been fetched. Returns false if the
    /// run was stopped first.
    pub async fn wait_for_fill(&self) -> bool {
        let minimum = self.shared.config.ring_config.min_buffered_segments;
        let interval = self.shared.config.director_config.fill_poll_interval;
        loop {
            if self.token.is_cancelled() {
                return false;
            }
            if self.shared.state.lock().segments_fetched >= minimum {
                return true;
            }
            tokio::select! {
                _ = self.token.cancelled() => return false,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// Emit the slot under the read cursor, or park if a pause is requested.
    pub async fn step(&self) -> DirectorStep {
        let slot = {
            let mut state = self.shared.state.lock();
            if self.token.is_cancelled() || !state.running {
                return DirectorStep::Stopped;
            }
            if state.pause_requested {
                if !state.pause_in_effect {
                    state.pause_in_effect = true;
                    self.shared.publish_pause(&state);
                    info!(slot = state.read_cursor, "Director paused");
                }
                return DirectorStep::Paused;
            }
            if state.pause_in_effect {
                state.pause_in_effect = false;
                self.shared.publish_pause(&state);
                info!(slot = state.read_cursor, "Director resumed");
            }
            state.read_cursor
        };

        let guard = self.shared.ring.lock(slot).await;
        let mut segment = match File::open(guard.path()).await {
            Ok(segment) => segment,
            Err(e) => {
                drop(guard);
                if self.token.is_cancelled() {
                    return DirectorStep::Stopped;
                }
                warn!(slot, error = %e, "Ring slot unreadable, retrying");
                return DirectorStep::SlotUnreadable { slot };
            }
        };
        let written = match self.shared.current_sink() {
            Some(sink) => sink.write_segment(&mut segment).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "output sink is closed",
            )),
        };
        drop(segment);
        drop(guard);

        let mut state = self.shared.state.lock();
        if self.token.is_cancelled() {
            return DirectorStep::Stopped;
        }
        match written {
            Ok(bytes) => {
                state.sink_broken = false;
                state.read_cursor = next_index(state.read_cursor, state.durations.len());
                debug!(slot, bytes, duration = state.durations[slot], "Emitted segment");
                DirectorStep::Emitted { slot, bytes }
            }
            Err(e) => {
                state.sink_broken = true;
                warn!(slot, error = %e, "Sink write failed, retrying");
                DirectorStep::SinkFailed { slot }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::config::HlsPipeConfig;
    use crate::hls::sink::OutputSink;
    use std::path::Path;
    use std::time::Duration;

    async fn director_in(dir: &Path) -> (Director, Arc<Shared>) {
        let sink_path = dir.join("fifo");
        tokio::fs::write(&sink_path, b"").await.unwrap();
        let config = HlsPipeConfig::builder("http://x/live.m3u8")
            .staging_dir(dir)
            .sink_path(&sink_path)
            .slot_count(3)
            .build()
            .unwrap();
        for i in 0..3 {
            tokio::fs::write(config.slot_path(i), format!("[{i}]")).await.unwrap();
        }
        let shared = Arc::new(Shared::new(Arc::new(config)));
        *shared.sink.lock() = Some(Arc::new(OutputSink::open(&sink_path).await.unwrap()));
        shared.state.lock().running = true;
        (Director::new(Arc::clone(&shared), CancellationToken::new()), shared)
    }

    #[tokio::test]
    async fn slots_are_emitted_in_circular_order() {
        let dir = tempfile::tempdir().unwrap();
        let (director, shared) = director_in(dir.path()).await;
        for expected in [0, 1, 2, 0] {
            assert_eq!(
                director.step().await,
                DirectorStep::Emitted {
                    slot: expected,
                    bytes: 3
                }
            );
        }
        assert_eq!(shared.state.lock().read_cursor, 1);
        let written = tokio::fs::read(dir.path().join("fifo")).await.unwrap();
        assert_eq!(written, b"[0][1][2][0]");
    }

    #[tokio::test]
    async fn pause_parks_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let (director, shared) = director_in(dir.path()).await;
        director.step().await;
        shared.state.lock().pause_requested = true;

        assert_eq!(director.step().await, DirectorStep::Paused);
        assert_eq!(director.step().await, DirectorStep::Paused);
        {
            let state = shared.state.lock();
            assert!(state.pause_in_effect);
            assert_eq!(state.read_cursor, 1);
        }
        assert_eq!(tokio::fs::read(dir.path().join("fifo")).await.unwrap(), b"[0]");

        shared.state.lock().pause_requested = false;
        assert!(matches!(
            director.step().await,
            DirectorStep::Emitted { slot: 1, .. }
        ));
        assert!(!shared.state.lock().pause_in_effect);
    }

    #[tokio::test]
    async fn sink_failure_keeps_read_position() {
        let dir = tempfile::tempdir().unwrap();
        let (director, shared) = director_in(dir.path()).await;
        director.step().await;
        let closed = shared.sink.lock().take();
        drop(closed);

        assert_eq!(director.step().await, DirectorStep::SinkFailed { slot: 1 });
        assert!(shared.state.lock().sink_broken);
        assert_eq!(shared.state.lock().read_cursor, 1);

        let sink = OutputSink::open(dir.path().join("fifo")).await.unwrap();
        *shared.sink.lock() = Some(Arc::new(sink));
        assert!(matches!(
            director.step().await,
            DirectorStep::Emitted { slot: 1, .. }
        ));
        assert!(!shared.state.lock().sink_broken);
    }

    #[tokio::test]
    async fn missing_slot_file_is_not_a_sink_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (director, shared) = director_in(dir.path()).await;
        let slot0 = shared.config.slot_path(0);
        tokio::fs::remove_file(&slot0).await.unwrap();

        assert_eq!(director.step().await, DirectorStep::SlotUnreadable { slot: 0 });
        {
            let state = shared.state.lock();
            assert!(!state.sink_broken);
            assert_eq!(state.read_cursor, 0);
        }

        tokio::fs::write(&slot0, b"[0]").await.unwrap();
        assert_eq!(
            director.step().await,
            DirectorStep::Emitted { slot: 0, bytes: 3 }
        );
        assert_eq!(tokio::fs::read(dir.path().join("fifo")).await.unwrap(), b"[0]");
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_minimum_fill() {
        let dir = tempfile::tempdir().unwrap();
        let (director, shared) = director_in(dir.path()).await;
        let waiter = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                shared.state.lock().segments_fetched = 3;
            })
        };
        assert!(director.wait_for_fill().await);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_director_stops() {
        let dir = tempfile::tempdir().unwrap();
        let (director, _) = director_in(dir.path()).await;
        director.token.cancel();
        assert!(!director.wait_for_fill().await);
        assert_eq!(director.step().await, DirectorStep::Stopped);
    }
}
