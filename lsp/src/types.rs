//! Public types consumed by the batch driver.
//!
//! The driver builds a [`ServerConfig`], converts it into [`ServerSettings`],
//! and receives a [`Collection`] of [`Diagnostic`]s per file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_COMMAND: &str = "clangd";
const DEFAULT_LANGUAGE_ID: &str = "cpp";
const DEFAULT_POLL_SLICE_MS: u64 = 100;
const DEFAULT_SETTLE_WINDOW_MS: u64 = 200;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;

fn default_command() -> String {
    DEFAULT_COMMAND.to_string()
}

fn default_args() -> Vec<String> {
    vec!["--enable-config".to_string(), "--clang-tidy".to_string()]
}

fn default_language_id() -> String {
    DEFAULT_LANGUAGE_ID.to_string()
}

const fn default_poll_slice_ms() -> u64 {
    DEFAULT_POLL_SLICE_MS
}

const fn default_settle_window_ms() -> u64 {
    DEFAULT_SETTLE_WINDOW_MS
}

const fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

/// Configuration for the analysis server, as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Executable command (e.g. "clangd").
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// LSP language identifier sent with `didOpen`.
    #[serde(default = "default_language_id")]
    pub language_id: String,
    /// Upper bound on a single channel poll.
    #[serde(default = "default_poll_slice_ms")]
    pub poll_slice_ms: u64,
    /// Quiet period after the last message that ends collection.
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,
    /// Time allowed for `shutdown`/`exit` before the server is killed.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            language_id: default_language_id(),
            poll_slice_ms: DEFAULT_POLL_SLICE_MS,
            settle_window_ms: DEFAULT_SETTLE_WINDOW_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn settings(&self) -> ServerSettings {
        ServerSettings {
            command: self.command.clone(),
            args: self.args.clone(),
            language_id: self.language_id.clone(),
            poll_slice: Duration::from_millis(self.poll_slice_ms.max(1)),
            settle_window: Duration::from_millis(self.settle_window_ms),
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

/// Resolved per-session settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub command: String,
    pub args: Vec<String>,
    pub language_id: String,
    pub poll_slice: Duration,
    pub settle_window: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerConfig::default().settings()
    }
}

/// Severity level for a diagnostic.
///
/// Lower numeric value is more severe, so `Error < Warning` under `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    ///
    /// Returns `None` for values outside the LSP-defined range.
    /// Callers (boundary code) decide the fallback policy.
    #[must_use]
    pub fn from_lsp(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    /// Errors and warnings are reported and fail the run.
    #[must_use]
    pub fn counts_toward_failure(self) -> bool {
        self <= Self::Warning
    }

    /// Lowercase name used in log output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// A single diagnostic from the analysis server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    severity: DiagnosticSeverity,
    message: String,
    /// 0-indexed line number.
    line: u32,
    /// 0-indexed column.
    col: u32,
    code: Option<String>,
    source: Option<String>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        message: String,
        line: u32,
        col: u32,
        code: Option<String>,
        source: Option<String>,
    ) -> Self {
        Self {
            severity,
            message,
            line,
            col,
            code,
            source,
        }
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 0-indexed line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 0-indexed column.
    #[must_use]
    pub fn col(&self) -> u32 {
        self.col
    }

    /// Check name (e.g. "readability-braces-around-statements").
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Producer of the diagnostic (e.g. "clang-tidy").
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Format as `path:line:col: warning: message [code]` (1-indexed for display).
    #[must_use]
    pub fn display_with_path(&self, path: &Path) -> String {
        format!(
            "{}:{}:{}: warning: {} [{}]",
            path.display(),
            self.line + 1,
            self.col + 1,
            self.message,
            self.code.as_deref().unwrap_or_default(),
        )
    }
}

/// Lifecycle of one session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Starting,
    Initialized,
    DocumentOpen,
    Collecting,
    Closed,
}

/// Why the collecting phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Diagnostics arrived and the settle window passed quietly.
    Settled,
    /// The overall deadline expired first.
    DeadlineReached,
    /// The server closed its output stream.
    ServerExited,
}

/// Diagnostics gathered for one document, in arrival order.
#[derive(Debug, Clone)]
pub struct Collection {
    pub diagnostics: Vec<Diagnostic>,
    pub completion: Completion,
}
