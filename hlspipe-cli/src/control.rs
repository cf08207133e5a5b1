use std::str::FromStr;

use hlspipe_engine::hls::{HlsPipeError, Session};
use tracing::info;

use crate::error::AppError;

/// Line commands accepted on stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    /// Block until the director is parked
    Wait,
    Status,
    Stop,
    Start,
    Quit,
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "wait" => Ok(Self::Wait),
            "status" => Ok(Self::Status),
            "stop" => Ok(Self::Stop),
            "start" | "run" => Ok(Self::Start),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(AppError::InvalidInput(format!(
                "Unknown command '{other}' (pause, resume, wait, status, stop, start, quit)"
            ))),
        }
    }
}

/// Apply a non-blocking command. `Wait` and `Quit` are handled by the caller.
pub async fn apply(session: &Session, command: Command) -> Result<(), HlsPipeError> {
    match command {
        Command::Pause => {
            if session.pause() {
                info!("Pause requested, the director parks at the next segment boundary");
            } else {
                info!("Session is not running, pause ignored");
            }
        }
        Command::Resume => {
            if session.resume() {
                info!("Director resumed");
            } else {
                info!("Resume ignored, no pause in effect");
            }
        }
        Command::Status => print_status(session),
        Command::Stop => session.stop().await?,
        Command::Start => session.run().await?,
        Command::Wait | Command::Quit => {}
    }
    Ok(())
}

/// Print the session status as one JSON line on stdout.
pub fn print_status(session: &Session) {
    match serde_json::to_string(&session.status()) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize status"),
    }
}
