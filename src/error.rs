//! Error types

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while reading transcripts or running the watch loop.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record failed to decode
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// Startup-only configuration problems.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("cannot determine home directory")]
    NoHome,
}

/// Outbound delivery failures. These are logged and never retried.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("destination rejected message: {status} {body}")]
    Status { status: StatusCode, body: String },
}

pub type Result<T> = std::result::Result<T, RelayError>;
