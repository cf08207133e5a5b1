//! Fluent construction of [`DownloaderConfig`].
//!
//! ```
//! use std::time::Duration;
//! use hlspipe_engine::DownloaderConfig;
//!
//! let http = DownloaderConfig::builder()
//!     .with_timeout(Duration::from_secs(20))
//!     .with_user_agent("hlspipe/0.1")
//!     .with_referer("https://example.com/live")
//!     .build();
//! assert_eq!(http.user_agent, "hlspipe/0.1");
//! assert!(http.headers.contains_key("referer"));
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER};
use tracing::warn;

use crate::{DownloaderConfig, proxy::ProxyConfig};

#[derive(Debug, Clone, Default)]
pub struct DownloaderConfigBuilder {
    inner: DownloaderConfig,
}

impl DownloaderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-request timeout, zero disables it
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.inner.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.inner.connect_timeout = timeout;
        self
    }

    /// Idle timeout for pooled connections
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.inner.read_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.inner.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.inner.user_agent = user_agent.into();
        self
    }

    /// Set a single header. Names or values reqwest rejects are logged and skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.inner.headers.insert(name, value);
            }
            _ => warn!(name, "Ignoring invalid request header"),
        }
        self
    }

    /// Many live origins refuse playlist requests without a matching Referer.
    pub fn with_referer(self, referer: &str) -> Self {
        self.with_header(REFERER.as_str(), referer)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.inner.merge_headers(&headers);
        self
    }

    /// An explicit proxy always wins over the system proxy.
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.inner.proxy = Some(proxy);
        self.inner.use_system_proxy = false;
        self
    }

    /// No effect once an explicit proxy is set.
    pub fn with_system_proxy(mut self, enabled: bool) -> Self {
        self.inner.use_system_proxy = enabled && self.inner.proxy.is_none();
        self
    }

    pub fn build(self) -> DownloaderConfig {
        self.inner
    }
}
