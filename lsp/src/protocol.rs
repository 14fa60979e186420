//! Internal LSP message serde types for JSON-RPC communication.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LspError;
use crate::types::{Diagnostic, DiagnosticSeverity};

pub(crate) const METHOD_INITIALIZE: &str = "initialize";
pub(crate) const METHOD_INITIALIZED: &str = "initialized";
pub(crate) const METHOD_DID_OPEN: &str = "textDocument/didOpen";
pub(crate) const METHOD_PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";
pub(crate) const METHOD_SHUTDOWN: &str = "shutdown";
pub(crate) const METHOD_EXIT: &str = "exit";

/// JSON-RPC error code for "method not found".
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl<'a> Notification<'a> {
    pub fn new(method: &'a str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Error member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

pub(crate) fn method_not_found(id: &serde_json::Value, method: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": METHOD_NOT_FOUND,
            "message": format!("Method not found: {method}")
        }
    })
}

pub(crate) fn initialize_params(root_uri: &str) -> serde_json::Value {
    serde_json::json!({
        "processId": std::process::id(),
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "synchronization": {
                    "dynamicRegistration": false,
                    "willSave": false,
                    "willSaveWaitUntil": false,
                    "didSave": false
                },
                "publishDiagnostics": {
                    "relatedInformation": false
                }
            }
        },
        "workspaceFolders": [{
            "uri": root_uri,
            "name": "workspace"
        }]
    })
}

pub(crate) fn did_open_params(
    uri: &str,
    language_id: &str,
    version: i32,
    text: &str,
) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

/// Entries are kept as raw JSON so one malformed diagnostic does not
/// discard the rest of the publish.
#[derive(Debug, Deserialize)]
pub(crate) struct PublishDiagnosticsParams {
    pub uri: String,
    #[serde(default)]
    pub diagnostics: Vec<serde_json::Value>,
}

impl PublishDiagnosticsParams {
    /// Decode each entry on its own, skipping the ones that do not parse.
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .iter()
            .filter_map(|raw| match LspDiagnostic::deserialize(raw) {
                Ok(diag) => Some(diag.to_diagnostic()),
                Err(e) => {
                    tracing::debug!(uri = %self.uri, error = %e, "skipping malformed diagnostic");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LspDiagnostic {
    #[serde(default)]
    pub range: LspRange,
    pub severity: Option<u64>,
    pub code: Option<DiagnosticCode>,
    pub source: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// `code` is `integer | string` on the wire.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum DiagnosticCode {
    Number(i64),
    String(String),
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LspRange {
    #[serde(default)]
    pub start: LspPosition,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LspPosition {
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub character: u32,
}

impl LspDiagnostic {
    /// Severity is optional on the wire; an absent or unknown value is
    /// treated as an error so it is never silently dropped from the report.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = self.code.as_ref().map(|code| match code {
            DiagnosticCode::Number(n) => n.to_string(),
            DiagnosticCode::String(s) => s.clone(),
        });
        Diagnostic::new(
            self.severity
                .and_then(DiagnosticSeverity::from_lsp)
                .unwrap_or(DiagnosticSeverity::Error),
            self.message.clone(),
            self.range.start.line,
            self.range.start.character,
            code,
            self.source.clone(),
        )
    }
}

pub(crate) fn path_to_file_uri(path: &Path) -> Result<url::Url, LspError> {
    url::Url::from_file_path(path).map_err(|()| LspError::InvalidPath {
        path: path.to_path_buf(),
    })
}

pub(crate) fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
}

/// Whether a URI reported by the server names the document we opened.
///
/// Servers may re-encode the URI they were given (percent-escaping, drive
/// letter case), so fall back to comparing decoded paths.
pub(crate) fn same_document(reported: &str, opened: &url::Url) -> bool {
    if reported == opened.as_str() {
        return true;
    }
    if let Ok(reported) = url::Url::parse(reported)
        && reported == *opened
    {
        return true;
    }
    match (file_uri_to_path(reported), opened.to_file_path()) {
        (Some(a), Ok(b)) => a == b,
        _ => false,
    }
}
