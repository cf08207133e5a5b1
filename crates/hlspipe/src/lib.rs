//! # hlspipe
//!
//! A live HLS relay engine. A [`hls::Session`] polls one media playlist,
//! downloads newly announced segments into a small on-disk ring and replays
//! that ring, in order, into a named pipe for a downstream remuxer or player.
//!
//! ## Features
//!
//! - Three independent loops (playlist poller, segment fetcher, director)
//! - Bandwidth capped segment downloads with a duration based watchdog
//! - Lossy cyclic ring that keeps playback continuous when fetches fail
//! - Pause/resume at segment boundaries and a pollable status snapshot

pub mod builder;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hls;
pub mod proxy;

pub use builder::DownloaderConfigBuilder;
pub use config::DownloaderConfig;
pub use error::DownloadError;

pub use downloader::create_client;

pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
