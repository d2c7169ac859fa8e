//! Error types.
//!
//! The stream pipeline itself never fails: unknown telnet commands are
//! discarded rather than rejected. Errors only come from the transport,
//! the session registry and configuration loading.

use std::io;
use std::path::PathBuf;

/// Fatal failure while establishing a connection. Never retried here.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to connect to {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {addr}")]
    Timeout { addr: String },
}

/// Steady-state failure of an open connection, delivered on the error channel.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("read error: {0}")]
    Read(#[source] io::Error),

    #[error("write error: {0}")]
    Write(#[source] io::Error),
}

/// Failures from the shared session registry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("wrong password for session {0}")]
    BadPassword(String),

    #[error("failed to start session {id}: {source}")]
    SpawnFailed {
        id: String,
        #[source]
        source: io::Error,
    },
}

/// Failures loading a client configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown line ending {0:?}, expected lf, crlf or cr")]
    LineEnding(String),
}
