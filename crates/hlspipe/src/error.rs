/// Errors raised while preparing the HTTP side of the relay
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),

    #[error("TLS configuration error: {0}")]
    TlsError(String),
}
