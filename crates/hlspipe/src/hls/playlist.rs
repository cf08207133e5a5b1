// Playlist source: fetches the live media playlist and flattens it into a snapshot.

use crate::hls::HlsPipeError;
use async_trait::async_trait;
use m3u8_rs::{MediaPlaylist, parse_playlist_res};
use reqwest::Client;
use std::time::Duration;
use tracing::trace;
use url::Url;

/// One successful fetch and parse of the playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSnapshot {
    /// Absolute segment URLs in playlist order
    pub segments: Vec<String>,
    /// Durations in seconds, parallel to `segments`
    pub durations: Vec<f64>,
    pub media_sequence: u64,
    /// `#EXT-X-TARGETDURATION` in seconds
    pub target_duration: f64,
}

impl PlaylistSnapshot {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// (uri, duration) pairs in playlist order
    pub fn entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.segments
            .iter()
            .map(String::as_str)
            .zip(self.durations.iter().copied())
    }
}

/// Anything that can produce playlist snapshots. Failures are values; the
/// poller decides how to back off.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch(&self) -> Result<PlaylistSnapshot, HlsPipeError>;
}

pub struct HttpPlaylistSource {
    http_client: Client,
    playlist_url: Url,
    request_timeout: Duration,
}

impl HttpPlaylistSource {
    pub fn new(
        http_client: Client,
        playlist_url: &str,
        request_timeout: Duration,
    ) -> Result<Self, HlsPipeError> {
        let playlist_url = Url::parse(playlist_url).map_err(|e| {
            HlsPipeError::PlaylistError(format!("Invalid playlist URL {playlist_url}: {e}"))
        })?;
        Ok(Self {
            http_client,
            playlist_url,
            request_timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.playlist_url
    }
}

#[async_trait]
impl PlaylistSource for HttpPlaylistSource {
    async fn fetch(&self) -> Result<PlaylistSnapshot, HlsPipeError> {
        let mut request = self.http_client.get(self.playlist_url.clone());
        if !self.request_timeout.is_zero() {
            request = request.timeout(self.request_timeout);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(HlsPipeError::PlaylistError(format!(
                "Failed to fetch playlist {}: HTTP {}",
                self.playlist_url,
                response.status()
            )));
        }
        let body = response.bytes().await?;
        trace!(url = %self.playlist_url, bytes = body.len(), "Fetched playlist");
        parse_media_playlist(&body, &self.playlist_url)
    }
}

/// Parse raw playlist bytes. Master playlists are rejected, segment URIs are
/// resolved against `playlist_url`.
pub fn parse_media_playlist(
    body: &[u8],
    playlist_url: &Url,
) -> Result<PlaylistSnapshot, HlsPipeError> {
    match parse_playlist_res(body) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(playlist)) => snapshot_from(playlist, playlist_url),
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(HlsPipeError::PlaylistError(format!(
            "Expected Media Playlist, got Master for {playlist_url}"
        ))),
        Err(e) => Err(HlsPipeError::PlaylistError(format!(
            "Failed to parse playlist {playlist_url}: {e}"
        ))),
    }
}

fn snapshot_from(
    playlist: MediaPlaylist,
    playlist_url: &Url,
) -> Result<PlaylistSnapshot, HlsPipeError> {
    let mut segments = Vec::with_capacity(playlist.segments.len());
    let mut durations = Vec::with_capacity(playlist.segments.len());
    for segment in &playlist.segments {
        let absolute = playlist_url.join(&segment.uri).map_err(|e| {
            HlsPipeError::PlaylistError(format!(
                "Could not resolve segment URI {} against {playlist_url}: {e}",
                segment.uri
            ))
        })?;
        segments.push(absolute.to_string());
        durations.push(f64::from(segment.duration));
    }

    Ok(PlaylistSnapshot {
        segments,
        durations,
        media_sequence: playlist.media_sequence,
        target_duration: playlist.target_duration as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:4
#EXT-X-MEDIA-SEQUENCE:42
#EXTINF:4.000,
seg42.ts
#EXTINF:3.500,
/abs/seg43.ts
#EXTINF:4.000,
https://cdn.example.com/seg44.ts
";

    fn base() -> Url {
        Url::parse("http://example.com/live/index.m3u8").unwrap()
    }

    #[test]
    fn media_playlist_is_flattened_in_order() {
        let snapshot = parse_media_playlist(LIVE.as_bytes(), &base()).unwrap();
        assert_eq!(snapshot.media_sequence, 42);
        assert_eq!(snapshot.target_duration, 4.0);
        assert_eq!(
            snapshot.segments,
            vec![
                "http://example.com/live/seg42.ts",
                "http://example.com/abs/seg43.ts",
                "https://cdn.example.com/seg44.ts",
            ]
        );
        assert_eq!(snapshot.durations, vec![4.0, 3.5, 4.0]);
        assert_eq!(snapshot.entries().count(), 3);
    }

    #[test]
    fn master_playlist_is_rejected() {
        let master = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=1280000
low/index.m3u8
";
        let err = parse_media_playlist(master.as_bytes(), &base()).unwrap_err();
        assert!(matches!(err, HlsPipeError::PlaylistError(msg) if msg.contains("Master")));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(parse_media_playlist(b"<html>nope</html>", &base()).is_err());
    }
}
