use reqwest::Proxy;

use crate::DownloadError;

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ProxyType {
    Http,
    Https,
    Socks5,
    /// Proxy every scheme through the same endpoint
    All,
}

#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

/// Proxy used for both playlist and segment requests
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

/// Build a reqwest Proxy from the relay proxy configuration
pub fn build_proxy_from_config(config: &ProxyConfig) -> Result<Proxy, DownloadError> {
    let proxy_url = &config.url;
    let invalid = |kind: &str, e: reqwest::Error| {
        DownloadError::ProxyError(format!("Invalid {kind} proxy URL {proxy_url}: {e}"))
    };

    let mut proxy = match config.proxy_type {
        ProxyType::Http => Proxy::http(proxy_url).map_err(|e| invalid("HTTP", e))?,
        ProxyType::Https => Proxy::https(proxy_url).map_err(|e| invalid("HTTPS", e))?,
        ProxyType::Socks5 => {
            let url = if proxy_url.starts_with("socks5://") {
                proxy_url.to_string()
            } else {
                format!("socks5://{proxy_url}")
            };
            Proxy::all(&url).map_err(|e| invalid("SOCKS5", e))?
        }
        ProxyType::All => Proxy::all(proxy_url).map_err(|e| invalid("generic", e))?,
    };

    if let Some(auth) = &config.auth {
        proxy = proxy.basic_auth(&auth.username, &auth.password);
    }

    Ok(proxy)
}
