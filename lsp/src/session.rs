//! Session controller: one server process, one document, one deadline.
//!
//! A session launches the server, performs the `initialize` handshake,
//! opens the document, collects pushed diagnostics until they settle or the
//! deadline passes, and always tears the server down afterwards.
//!
//! ```text
//! Starting --initialize/initialized--> Initialized --didOpen--> DocumentOpen
//!     --> Collecting --settle | deadline | EOF--> Closed
//! ```
//!
//! All waiting is a sequence of bounded polls against the monotonic clock,
//! so a server that never answers cannot hold a session past its deadline.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;

use crate::channel::{IncomingMessage, RpcChannel};
use crate::diagnostics::DiagnosticAggregator;
use crate::error::{LspError, Result};
use crate::protocol::{self, PublishDiagnosticsParams};
use crate::types::{Collection, Completion, ServerSettings, SessionState};

/// How long a killed server gets to be reaped before we give up on it.
const KILL_REAP_TIMEOUT: Duration = Duration::from_millis(500);

/// Run `fut` until `deadline`, mapping expiry to `on_timeout()`.
async fn within<T>(
    deadline: Instant,
    on_timeout: fn() -> LspError,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .unwrap_or_else(|_| Err(on_timeout()))
}

/// The server child process. Dropping it kills the process.
struct ServerProcess {
    command: String,
    child: Child,
}

impl ServerProcess {
    /// Wait for the process to exit until `wait_until`, then kill it.
    ///
    /// Never fails: a process that will not die is logged and abandoned to
    /// `kill_on_drop`.
    async fn terminate(mut self, wait_until: Instant) {
        match tokio::time::timeout_at(wait_until, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(command = %self.command, %status, "server exited");
                return;
            }
            Ok(Err(e)) => {
                tracing::debug!(command = %self.command, error = %e, "waiting for server failed");
            }
            Err(_) => {
                tracing::debug!(command = %self.command, "server didn't exit in time, killing");
            }
        }

        if let Err(e) = self.child.start_kill() {
            tracing::debug!(command = %self.command, error = %e, "kill failed");
        }

        match tokio::time::timeout(KILL_REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(command = %self.command, %status, "server killed");
            }
            Ok(Err(e)) => {
                let err = LspError::Teardown(e.to_string());
                tracing::warn!(command = %self.command, error = %err, "server teardown failed");
            }
            Err(_) => {
                let err = LspError::Teardown("not reaped after kill".to_string());
                tracing::warn!(command = %self.command, error = %err, "server teardown failed");
            }
        }
    }
}

/// One analysis session.
///
/// Built with [`Session::launch`] for a real server or
/// [`Session::from_streams`] for any framed byte stream pair.
pub struct Session<R, W> {
    channel: RpcChannel<R, W>,
    process: Option<ServerProcess>,
    settings: ServerSettings,
    state: SessionState,
    aggregator: DiagnosticAggregator,
}

impl Session<ChildStdout, ChildStdin> {
    /// Spawn the configured server in `root` with piped stdin/stdout.
    pub fn launch(settings: &ServerSettings, root: &Path) -> Result<Self> {
        let resolved = which::which(&settings.command).map_err(|source| {
            LspError::CommandNotFound {
                command: settings.command.clone(),
                source,
            }
        })?;

        let mut cmd = Command::new(&resolved);
        cmd.args(&settings.args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let launch_error = |source| LspError::Launch {
            command: settings.command.clone(),
            source,
        };

        let mut child = cmd.spawn().map_err(launch_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error(std::io::Error::other("no stdout from child")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_error(std::io::Error::other("no stdin from child")))?;

        tracing::debug!(command = %resolved.display(), pid = ?child.id(), "server started");

        let mut session = Self::from_streams(stdout, stdin, settings.clone());
        session.process = Some(ServerProcess {
            command: settings.command.clone(),
            child,
        });
        Ok(session)
    }
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// A session over an existing stream pair, with no process to manage.
    pub fn from_streams(reader: R, writer: W, settings: ServerSettings) -> Self {
        Self {
            channel: RpcChannel::new(reader, writer),
            process: None,
            settings,
            state: SessionState::Starting,
            aggregator: DiagnosticAggregator::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(next > self.state, "{:?} -> {next:?}", self.state);
        tracing::trace!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Poll duration for the next iteration, or `None` once the deadline passed.
    fn next_wait(&self, deadline: Instant) -> Option<Duration> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then(|| remaining.min(self.settings.poll_slice))
    }

    /// Handshake, open `path` with `text`, and collect its diagnostics.
    ///
    /// A relative `path` is resolved against `root`. The session is left open;
    /// call [`close`](Self::close) afterwards on every outcome.
    pub async fn run(
        &mut self,
        root: &Path,
        path: &Path,
        text: &str,
        deadline: Instant,
    ) -> Result<Collection> {
        let path: PathBuf = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        let root_uri = protocol::path_to_file_uri(root)?;
        let doc_uri = protocol::path_to_file_uri(&path)?;

        self.handshake(&root_uri, deadline).await?;
        self.open_document(&doc_uri, text, deadline).await?;
        let completion = self.collect(&doc_uri, deadline).await?;

        Ok(Collection {
            diagnostics: self.aggregator.drain(),
            completion,
        })
    }

    async fn handshake(&mut self, root_uri: &url::Url, deadline: Instant) -> Result<()> {
        let params = protocol::initialize_params(root_uri.as_str());
        let init_id = within(
            deadline,
            || LspError::HandshakeTimeout,
            self.channel
                .send_request(protocol::METHOD_INITIALIZE, Some(params)),
        )
        .await?;

        loop {
            let Some(wait) = self.next_wait(deadline) else {
                return Err(LspError::HandshakeTimeout);
            };
            match self.channel.poll(wait).await? {
                // Correlate by id: anything else may arrive first.
                Some(IncomingMessage::Response { id, error, .. }) if id == init_id => {
                    if let Some(error) = error {
                        return Err(LspError::HandshakeRejected(error.message));
                    }
                    break;
                }
                Some(IncomingMessage::ServerRequest { id, method, .. }) => {
                    within(
                        deadline,
                        || LspError::HandshakeTimeout,
                        self.channel.reply_method_not_found(&id, &method),
                    )
                    .await?;
                }
                Some(other) => {
                    tracing::trace!(
                        message = ?other,
                        "ignoring message before initialize response"
                    );
                }
                None => {}
            }
        }

        within(
            deadline,
            || LspError::HandshakeTimeout,
            self.channel.send_notification(
                protocol::METHOD_INITIALIZED,
                Some(serde_json::json!({})),
            ),
        )
        .await?;
        self.advance(SessionState::Initialized);
        Ok(())
    }

    async fn open_document(
        &mut self,
        doc_uri: &url::Url,
        text: &str,
        deadline: Instant,
    ) -> Result<()> {
        let params =
            protocol::did_open_params(doc_uri.as_str(), &self.settings.language_id, 1, text);
        within(
            deadline,
            || LspError::CollectionTimeout,
            self.channel
                .send_notification(protocol::METHOD_DID_OPEN, Some(params)),
        )
        .await?;
        self.advance(SessionState::DocumentOpen);
        Ok(())
    }

    /// Gather `publishDiagnostics` for `doc_uri` until they settle.
    ///
    /// The protocol has no "analysis complete" signal. Once at least one
    /// publish for the document has arrived, a quiet period of
    /// `settle_window` with no messages at all ends collection.
    async fn collect(&mut self, doc_uri: &url::Url, deadline: Instant) -> Result<Completion> {
        self.advance(SessionState::Collecting);
        let settle_window = self.settings.settle_window;
        let mut last_message: Option<Instant> = None;

        loop {
            let Some(mut wait) = self.next_wait(deadline) else {
                return Ok(Completion::DeadlineReached);
            };
            if let Some(last) = last_message
                && let Some(settle_at) = last.checked_add(settle_window)
            {
                let now = Instant::now();
                if now >= settle_at {
                    return Ok(Completion::Settled);
                }
                wait = wait.min(settle_at - now);
            }

            let msg = match self.channel.poll(wait).await {
                Ok(Some(msg)) => msg,
                Ok(None) => continue,
                Err(LspError::ServerClosed) => {
                    tracing::debug!(
                        collected = self.aggregator.len(),
                        "server closed output while collecting"
                    );
                    return Ok(Completion::ServerExited);
                }
                Err(e) => return Err(e),
            };

            if last_message.is_some() {
                last_message = Some(Instant::now());
            }

            match msg {
                IncomingMessage::Notification { method, params }
                    if method == protocol::METHOD_PUBLISH_DIAGNOSTICS =>
                {
                    if self.accept_publish(params, doc_uri) {
                        last_message = Some(Instant::now());
                    }
                }
                IncomingMessage::ServerRequest { id, method, .. } => {
                    within(
                        deadline,
                        || LspError::CollectionTimeout,
                        self.channel.reply_method_not_found(&id, &method),
                    )
                    .await?;
                }
                other => {
                    tracing::trace!(message = ?other, "ignoring message while collecting");
                }
            }
        }
    }

    /// Append a publish for our document to the aggregator.
    ///
    /// Returns whether the publish was for `doc_uri`.
    fn accept_publish(&mut self, params: Option<serde_json::Value>, doc_uri: &url::Url) -> bool {
        let Some(params) = params else { return false };
        let params = match serde_json::from_value::<PublishDiagnosticsParams>(params) {
            Ok(params) => params,
            Err(e) => {
                tracing::debug!(error = %e, "failed to parse publishDiagnostics");
                return false;
            }
        };

        if !protocol::same_document(&params.uri, doc_uri) {
            tracing::trace!(uri = %params.uri, "ignoring diagnostics for another document");
            return false;
        }

        let diagnostics = params.to_diagnostics();
        tracing::debug!(
            uri = %params.uri,
            count = diagnostics.len(),
            skipped = params.diagnostics.len() - diagnostics.len(),
            "diagnostics published"
        );
        self.aggregator.extend(diagnostics);
        true
    }

    /// Tear the session down. Idempotent and infallible.
    ///
    /// With time left before `deadline`, the server is asked to `shutdown`
    /// and `exit`; whatever is still running afterwards is killed.
    pub async fn close(&mut self, deadline: Instant) {
        if self.state == SessionState::Closed {
            return;
        }
        self.advance(SessionState::Closed);

        let grace_end = Instant::now()
            .checked_add(self.settings.shutdown_grace)
            .map_or(deadline, |end| deadline.min(end));
        if Instant::now() < grace_end
            && let Err(e) = self.request_shutdown(grace_end).await
        {
            tracing::debug!(error = %e, "graceful shutdown failed");
        }

        match tokio::time::timeout(KILL_REAP_TIMEOUT, self.channel.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "closing server input failed"),
            Err(_) => tracing::debug!("closing server input timed out"),
        }

        if let Some(process) = self.process.take() {
            process.terminate(grace_end).await;
        }
    }

    async fn request_shutdown(&mut self, grace_end: Instant) -> Result<()> {
        let on_timeout = || LspError::Teardown("shutdown timed out".to_string());
        let id = within(
            grace_end,
            on_timeout,
            self.channel.send_request(protocol::METHOD_SHUTDOWN, None),
        )
        .await?;

        loop {
            let Some(wait) = self.next_wait(grace_end) else {
                return Err(on_timeout());
            };
            if let Some(IncomingMessage::Response { id: got, .. }) =
                self.channel.poll(wait).await?
                && got == id
            {
                break;
            }
        }

        within(
            grace_end,
            on_timeout,
            self.channel.send_notification(protocol::METHOD_EXIT, None),
        )
        .await
    }
}

/// Collect diagnostics for one file from a freshly launched server.
///
/// The server is torn down before this returns, whatever the outcome.
pub async fn collect_diagnostics(
    settings: &ServerSettings,
    root: &Path,
    path: &Path,
    text: &str,
    deadline: Instant,
) -> Result<Collection> {
    let mut session = Session::launch(settings, root)?;
    let result = session.run(root, path, text, deadline).await;
    session.close(deadline).await;
    result
}
