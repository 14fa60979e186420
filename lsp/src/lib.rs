//! LSP client that launches an analysis server, opens one document, and
//! collects the diagnostics the server pushes back before a deadline.

pub mod channel;
pub mod codec;
pub mod diagnostics;
pub mod error;
pub mod session;
pub mod types;

pub(crate) mod protocol;

pub use channel::{IncomingMessage, RpcChannel};
pub use diagnostics::DiagnosticAggregator;
pub use error::{FramingError, LspError};
pub use protocol::ResponseError;
pub use session::{Session, collect_diagnostics};
pub use types::{
    Collection, Completion, Diagnostic, DiagnosticSeverity, ServerConfig, ServerSettings,
    SessionState,
};
