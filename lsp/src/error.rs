//! Error taxonomy for a diagnostics session.
//!
//! Every variant is local to one file's session. The batch driver turns them
//! into "no diagnostics for this file" plus a warning on stderr; none of them
//! abort a run.

use std::path::PathBuf;

/// Protocol violations detected while framing or unframing messages.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("missing Content-Length header")]
    MissingContentLength,
    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("Content-Length {len} exceeds maximum {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("parsing JSON-RPC frame: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("serializing JSON-RPC frame: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("stream ended with {buffered} bytes of an incomplete frame")]
    Truncated { buffered: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum LspError {
    #[error("{command} not found in PATH")]
    CommandNotFound {
        command: String,
        #[source]
        source: which::Error,
    },
    #[error("spawning {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("server closed its output stream")]
    ServerClosed,
    #[error("no initialize response before the deadline")]
    HandshakeTimeout,
    #[error("server rejected initialize: {0}")]
    HandshakeRejected(String),
    #[error("deadline reached while collecting diagnostics")]
    CollectionTimeout,
    #[error("server did not exit cleanly: {0}")]
    Teardown(String),
    #[error("cannot convert path to file URI: {}", path.display())]
    InvalidPath { path: PathBuf },
}

impl LspError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

pub type Result<T, E = LspError> = std::result::Result<T, E>;
