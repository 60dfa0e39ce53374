use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a single certificate fetch failed. None of these stop the walk.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("connection refused")]
    ConnectionRefused,

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl ResolveError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ResolveError::Timeout(_) => FailureKind::Timeout,
            ResolveError::UnknownHost(_) => FailureKind::UnknownHost,
            ResolveError::ConnectionRefused => FailureKind::ConnectionRefused,
            ResolveError::Handshake(_) => FailureKind::Handshake,
            ResolveError::Transport(_) => FailureKind::Transport,
        }
    }
}

/// Plain classification of a [`ResolveError`], used for tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    UnknownHost,
    ConnectionRefused,
    Handshake,
    Transport,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::UnknownHost => "unknown host",
            FailureKind::ConnectionRefused => "connection refused",
            FailureKind::Handshake => "handshake error",
            FailureKind::Transport => "transport error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort a walk before (or instead of) producing a graph.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error("parallelism must be at least 1, got {0}")]
    InvalidParallelism(usize),

    #[error("no seed hosts given")]
    NoSeeds,

    #[error("task join error: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, WalkError>;
