use std::time::Duration;

use clap::Parser;
use error::AppError;
use hlspipe_engine::hls::{HlsPipeConfig, HlsPipeError, Session};
use hlspipe_engine::{DownloaderConfig, ProxyAuth, ProxyConfig, ProxyType};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Interval;
use tracing::level_filters::LevelFilter;
use tracing::{Level, error, info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod control;
mod error;
mod utils;

use cli::CliArgs;
use control::Command;
use utils::{parse_headers, parse_size, parse_time};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging, RUST_LOG overrides --verbose
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("hlspipe.log")?;

    let multi_writer = MakeWriterExt::and(std::io::stdout, log_file);
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(multi_writer)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("hlspipe {} - live HLS relay", env!("CARGO_PKG_VERSION"));
    info!("==================================================================");

    let rate_limit = parse_size(&args.rate_limit)?;
    let status_interval = parse_time(&args.status_interval)?;

    info!(
        "HTTP timeout configuration: overall={}s, connect={}s, idle={}s",
        args.timeout, args.connect_timeout, args.read_timeout
    );

    let proxy_config = if args.no_proxy {
        info!("All proxy settings disabled (--no-proxy flag)");
        None
    } else if let Some(proxy_url) = args.proxy.as_ref() {
        let proxy_type = match args.proxy_type.as_str() {
            "http" => ProxyType::Http,
            "https" => ProxyType::Https,
            "socks5" => ProxyType::Socks5,
            "all" => ProxyType::All,
            other => {
                return Err(AppError::InvalidInput(format!(
                    "Invalid proxy type: '{other}'"
                )));
            }
        };

        let auth = match (&args.proxy_user, &args.proxy_pass) {
            (Some(username), Some(password)) => Some(ProxyAuth {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        info!(
            proxy_url = %proxy_url,
            proxy_type = ?proxy_type,
            has_auth = auth.is_some(),
            "Using explicit proxy configuration"
        );

        Some(ProxyConfig {
            url: proxy_url.clone(),
            proxy_type,
            auth,
        })
    } else {
        None
    };

    let download_config = {
        let builder = DownloaderConfig::builder()
            .with_timeout(Duration::from_secs(args.timeout))
            .with_connect_timeout(Duration::from_secs(args.connect_timeout))
            .with_read_timeout(Duration::from_secs(args.read_timeout))
            .with_headers(parse_headers(&args.headers));

        let builder = match args.referer.as_deref() {
            Some(referer) => builder.with_referer(referer),
            None => builder,
        };
        let builder = match proxy_config {
            Some(proxy) => builder.with_proxy(proxy),
            None => builder.with_system_proxy(args.use_system_proxy && !args.no_proxy),
        };
        builder.build()
    };

    let config = HlsPipeConfig::builder(args.playlist_url.clone())
        .with_base_config(download_config)
        .staging_dir(&args.staging_dir)
        .sink_path(&args.sink_path)
        .segment_extension(args.segment_extension.clone())
        .slot_count(args.slots)
        .rate_limit(rate_limit)
        .segment_retry_count(args.retries)
        .build()?;

    info!(
        playlist = %config.playlist_url,
        staging_dir = %config.staging_dir.display(),
        sink = %config.sink_path.display(),
        rate_limit,
        "Relay configuration"
    );

    let session = Session::new(config)?;
    // A sink that cannot be opened is fatal.
    session.run().await?;

    control_loop(&session, status_interval).await?;

    if session.is_running() {
        session.stop().await?;
    }
    info!("Bye");
    Ok(())
}

/// Serve stdin commands and periodic status until quit or Ctrl-C.
async fn control_loop(session: &Session, status_interval: Duration) -> Result<(), AppError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut status_ticker = (!status_interval.is_zero()).then(|| {
        let mut ticker = tokio::time::interval(status_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker
    });
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down");
                return Ok(());
            }
            _ = tick(&mut status_ticker) => control::print_status(session),
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin, command input disabled");
                        stdin_open = false;
                        continue;
                    }
                };
                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(e) => {
                        warn!("{e}");
                        continue;
                    }
                };
                match command {
                    Command::Quit => return Ok(()),
                    Command::Wait => {
                        tokio::select! {
                            result = session.wait_for_paused() => match result {
                                Ok(()) => info!("Director is paused"),
                                Err(e) => warn!(error = %e, "Wait for pause ended"),
                            },
                            _ = &mut ctrl_c => {
                                info!("Received Ctrl+C, shutting down");
                                return Ok(());
                            }
                        }
                    }
                    command => match control::apply(session, command).await {
                        Err(e @ HlsPipeError::SinkOpen { .. }) => return Err(e.into()),
                        Err(e) => warn!(error = %e, "Command failed"),
                        Ok(()) => {}
                    },
                }
            }
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
