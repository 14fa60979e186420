//! Batch driver: one session per file, reported in input order.

use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clint_lsp::{Completion, Diagnostic, LspError, ServerSettings, collect_diagnostics};
use futures_util::{StreamExt, stream};
use tokio::time::Instant;

const RULE_WIDTH: usize = 40;
/// Deadline used when `now + timeout` is not representable.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of checking one file.
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
    /// Why the file could not be checked. Such files report no diagnostics.
    pub failure: Option<String>,
}

impl FileReport {
    #[must_use]
    pub fn checked(path: PathBuf, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            path,
            diagnostics,
            failure: None,
        }
    }

    #[must_use]
    pub fn failed(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            path,
            diagnostics: Vec::new(),
            failure: Some(reason.into()),
        }
    }

    fn qualifying(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity().counts_toward_failure())
    }

    /// One line per Error or Warning diagnostic, in arrival order.
    pub fn write_lines(&self, out: &mut impl Write) -> io::Result<()> {
        for diag in self.qualifying() {
            writeln!(out, "{}", diag.display_with_path(&self.path))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.files.iter().map(|f| f.qualifying().count()).sum()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.files.iter().filter(|f| f.failure.is_some()).count()
    }

    /// Process exit status: 0 when clean, 1 when any Error/Warning was found.
    #[must_use]
    pub fn exit_status(&self) -> u8 {
        u8::from(self.warning_count() > 0)
    }

    pub fn write_summary(&self, out: &mut impl Write) -> io::Result<()> {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(out)?;
        writeln!(out, "{rule}")?;
        writeln!(out, "clangd lint: {} warning(s)", self.warning_count())?;
        writeln!(out, "{rule}")
    }
}

/// Run `check` over `files` with at most `jobs` in flight.
///
/// Results are yielded to `on_report` and collected in input order regardless
/// of which check finishes first.
pub async fn run_batch<F, Fut>(
    files: Vec<PathBuf>,
    jobs: usize,
    check: F,
    mut on_report: impl FnMut(&FileReport),
) -> BatchReport
where
    F: Fn(PathBuf) -> Fut,
    Fut: Future<Output = FileReport>,
{
    let mut results = stream::iter(files).map(check).buffered(jobs.max(1));

    let mut report = BatchReport::default();
    while let Some(file) = results.next().await {
        on_report(&file);
        report.files.push(file);
    }
    report
}

/// Check one file: read it, run a session, and fold every failure into the
/// report as a warning on stderr.
pub async fn check_file(
    settings: &ServerSettings,
    root: &Path,
    path: PathBuf,
    timeout: Duration,
) -> FileReport {
    let absolute = root.join(&path);
    let text = match tokio::fs::read_to_string(&absolute).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read source");
            return FileReport::failed(path, format!("read failed: {err}"));
        }
    };

    let now = Instant::now();
    let deadline = now
        .checked_add(timeout)
        .unwrap_or_else(|| now + FALLBACK_TIMEOUT);
    match collect_diagnostics(settings, root, &absolute, &text, deadline).await {
        Ok(collection) => {
            match collection.completion {
                Completion::Settled => {}
                Completion::DeadlineReached => tracing::warn!(
                    path = %path.display(),
                    collected = collection.diagnostics.len(),
                    "{}",
                    LspError::CollectionTimeout
                ),
                Completion::ServerExited => tracing::warn!(
                    path = %path.display(),
                    collected = collection.diagnostics.len(),
                    "server exited before diagnostics settled"
                ),
            }
            for diag in &collection.diagnostics {
                if !diag.severity().counts_toward_failure() {
                    tracing::debug!(
                        path = %path.display(),
                        severity = diag.severity().label(),
                        line = diag.line() + 1,
                        message = diag.message(),
                        "not reported"
                    );
                }
            }
            FileReport::checked(path, collection.diagnostics)
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "lint session failed");
            FileReport::failed(path, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use clint_lsp::DiagnosticSeverity;

    use super::*;

    fn diag(severity: DiagnosticSeverity, line: u32, message: &str) -> Diagnostic {
        Diagnostic::new(
            severity,
            message.to_string(),
            line,
            0,
            Some("bugprone-example".to_string()),
            None,
        )
    }

    fn render(report: &BatchReport) -> String {
        let mut out = Vec::new();
        for file in &report.files {
            file.write_lines(&mut out).unwrap();
        }
        report.write_summary(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn one_warning_across_two_files_fails() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_check = Arc::clone(&seen);

        let report = run_batch(
            vec![PathBuf::from("src/a.cpp"), PathBuf::from("src/b.cpp")],
            1,
            move |path| {
                seen_in_check.lock().unwrap().push(path.clone());
                async move {
                    if path.ends_with("a.cpp") {
                        FileReport::checked(
                            path,
                            vec![diag(DiagnosticSeverity::Warning, 2, "unused variable")],
                        )
                    } else {
                        FileReport::checked(path, Vec::new())
                    }
                }
            },
            |_| {},
        )
        .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![PathBuf::from("src/a.cpp"), PathBuf::from("src/b.cpp")]
        );
        assert_eq!(report.warning_count(), 1);
        assert_eq!(report.exit_status(), 1);
        assert_eq!(
            render(&report),
            "src/a.cpp:3:1: warning: unused variable [bugprone-example]\n\
             \n\
             ========================================\n\
             clangd lint: 1 warning(s)\n\
             ========================================\n"
        );
    }

    #[tokio::test]
    async fn info_and_hint_only_passes() {
        let report = run_batch(
            vec![PathBuf::from("src/a.cpp")],
            1,
            |path| async move {
                FileReport::checked(
                    path,
                    vec![
                        diag(DiagnosticSeverity::Information, 0, "note"),
                        diag(DiagnosticSeverity::Hint, 1, "hint"),
                    ],
                )
            },
            |_| {},
        )
        .await;

        assert_eq!(report.warning_count(), 0);
        assert_eq!(report.exit_status(), 0);
        assert!(!render(&report).contains("src/a.cpp"));
    }

    #[tokio::test]
    async fn errors_count_as_warnings() {
        let report = run_batch(
            vec![PathBuf::from("main.cpp")],
            1,
            |path| async move {
                FileReport::checked(
                    path,
                    vec![
                        diag(DiagnosticSeverity::Error, 0, "unknown type name 'foo'"),
                        diag(DiagnosticSeverity::Warning, 4, "narrowing conversion"),
                    ],
                )
            },
            |_| {},
        )
        .await;

        assert_eq!(report.warning_count(), 2);
        assert_eq!(report.exit_status(), 1);
    }

    #[tokio::test]
    async fn failed_files_count_as_clean() {
        let report = run_batch(
            vec![PathBuf::from("a.cpp"), PathBuf::from("b.cpp")],
            1,
            |path| async move { FileReport::failed(path, "server closed the connection") },
            |_| {},
        )
        .await;

        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.warning_count(), 0);
        assert_eq!(report.exit_status(), 0);
    }

    #[tokio::test]
    async fn parallel_results_keep_input_order() {
        let files: Vec<PathBuf> = (0..4).map(|i| PathBuf::from(format!("f{i}.cpp"))).collect();
        let mut streamed = Vec::new();

        let report = run_batch(
            files.clone(),
            4,
            |path| async move {
                // Earlier files finish last.
                let index: u64 = path
                    .to_string_lossy()
                    .trim_start_matches('f')
                    .trim_end_matches(".cpp")
                    .parse()
                    .unwrap();
                tokio::time::sleep(Duration::from_millis(80 - index * 20)).await;
                FileReport::checked(path, Vec::new())
            },
            |file| streamed.push(file.path.clone()),
        )
        .await;

        let collected: Vec<PathBuf> = report.files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(collected, files);
        assert_eq!(streamed, files);
    }

    #[tokio::test]
    async fn unreadable_file_is_a_failure_without_launching() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ServerSettings {
            command: "clint-test-no-such-server".to_string(),
            ..ServerSettings::default()
        };

        let report = check_file(
            &settings,
            dir.path(),
            PathBuf::from("missing.cpp"),
            Duration::from_secs(1),
        )
        .await;

        assert!(report.diagnostics.is_empty());
        let failure = report.failure.unwrap();
        assert!(failure.starts_with("read failed"), "{failure}");
    }

    #[tokio::test]
    async fn unrepresentable_timeout_is_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.cpp"), "int main() {}\n").unwrap();
        let settings = ServerSettings {
            command: "clint-test-no-such-server".to_string(),
            ..ServerSettings::default()
        };

        let report = check_file(
            &settings,
            dir.path(),
            PathBuf::from("main.cpp"),
            Duration::from_secs(u64::MAX),
        )
        .await;

        assert!(report.diagnostics.is_empty());
        assert!(report.failure.is_some());
    }

    #[tokio::test]
    async fn missing_server_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.cpp"), "int main() {}\n").unwrap();
        let settings = ServerSettings {
            command: "clint-test-no-such-server".to_string(),
            ..ServerSettings::default()
        };

        let report = check_file(
            &settings,
            dir.path(),
            PathBuf::from("main.cpp"),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(report.path, PathBuf::from("main.cpp"));
        assert!(report.diagnostics.is_empty());
        assert!(report.failure.is_some());
    }
}
