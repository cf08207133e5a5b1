use clap::Parser;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Live HLS relay into a named pipe",
    long_about = "Polls a live HLS media playlist, downloads each new segment under a\n\
                  deadline equal to its duration and replays a small cyclic buffer of\n\
                  segments, in order, into a named pipe for a downstream remuxer.\n\
                  \n\
                  The pipe must exist before starting (mkfifo /var/segments/fifo).\n\
                  While running, stdin accepts: pause, resume, wait, status, stop,\n\
                  start, quit."
)]
pub struct CliArgs {
    /// Media playlist URL
    #[arg(required = true, help = "URL of the live media playlist (.m3u8)")]
    pub playlist_url: String,

    /// Directory for download.<ext> and the play<N>.<ext> ring
    #[arg(long, default_value = "/var/segments/", help = "Staging directory for segment files")]
    pub staging_dir: PathBuf,

    /// Named pipe receiving the relayed stream
    #[arg(long = "fifo", default_value = "/var/segments/fifo", help = "Path of the output named pipe")]
    pub sink_path: PathBuf,

    #[arg(long = "ext", default_value = "ts", help = "Extension of staged segment files")]
    pub segment_extension: String,

    #[arg(long, default_value = "7", help = "Number of slots in the segment ring")]
    pub slots: usize,

    /// Bandwidth cap with optional unit (B, KB, MB)
    #[arg(
        long,
        default_value = "625KB",
        help = "Segment download bandwidth cap with optional unit (B, KB, MB). Use 0 for unlimited."
    )]
    pub rate_limit: String,

    #[arg(long, default_value = "3", help = "Retry attempts for failed segment requests")]
    pub retries: u32,

    #[arg(
        long,
        default_value = "15",
        help = "Overall timeout in seconds for playlist requests"
    )]
    pub timeout: u64,

    #[arg(
        long,
        default_value = "10",
        help = "Connection timeout in seconds (time to establish initial connection)"
    )]
    pub connect_timeout: u64,

    #[arg(
        long,
        default_value = "30",
        help = "Idle timeout in seconds for pooled connections"
    )]
    pub read_timeout: u64,

    /// Custom HTTP headers for every request
    #[arg(
        long = "header",
        short = 'H',
        help = "Add custom HTTP header to requests (can be used multiple times). Format: 'Name: Value'",
        value_name = "HEADER"
    )]
    pub headers: Vec<String>,

    #[arg(long, help = "Referer header sent with playlist and segment requests")]
    pub referer: Option<String>,

    #[arg(
        long,
        help = "Proxy server URL (e.g., \"http://proxy.example.com:8080\")"
    )]
    pub proxy: Option<String>,

    #[arg(
        long,
        default_value = "http",
        help = "Proxy type (http, https, socks5, all)",
        value_parser = ["http", "https", "socks5", "all"]
    )]
    pub proxy_type: String,

    #[arg(long, help = "Username for proxy authentication")]
    pub proxy_user: Option<String>,

    #[arg(long, help = "Password for proxy authentication")]
    pub proxy_pass: Option<String>,

    #[arg(
        long,
        default_value = "true",
        help = "Use system proxy settings if no explicit proxy is configured"
    )]
    pub use_system_proxy: bool,

    #[arg(long, help = "Disable all proxy settings (including system proxy)")]
    pub no_proxy: bool,

    /// Interval with optional unit (s, m, h)
    #[arg(
        long,
        default_value = "10s",
        help = "Print a JSON status line at this interval (s, m, h). Use 0 to disable."
    )]
    pub status_interval: String,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_relay_layout() {
        let args = CliArgs::parse_from(["hlspipe", "http://example.com/live.m3u8"]);
        assert_eq!(args.staging_dir, PathBuf::from("/var/segments/"));
        assert_eq!(args.sink_path, PathBuf::from("/var/segments/fifo"));
        assert_eq!(args.slots, 7);
        assert_eq!(args.rate_limit, "625KB");
        assert!(args.use_system_proxy);
    }

    #[test]
    fn repeated_headers_are_collected() {
        let args = CliArgs::parse_from([
            "hlspipe",
            "-H",
            "Referer: https://example.com",
            "--header",
            "Cookie: a=b",
            "http://example.com/live.m3u8",
        ]);
        assert_eq!(args.headers.len(), 2);
    }
}
