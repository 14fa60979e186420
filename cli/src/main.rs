//! clint - lint C++ sources with the diagnostics of a language server.
//!
//! For each file a fresh server process is launched, the file is opened, and
//! whatever the server publishes before it goes quiet (or the per-file
//! deadline passes) is reported.
//!
//! ```text
//! main() -> load config -> discover files -> run_batch(check_file) -> summary
//! ```
//!
//! stdout carries the report; logs go to stderr.

mod batch;
mod discover;

use std::env;
use std::io::{IsTerminal, Write, stderr, stdout};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use clint_config::ClintConfig;

use crate::batch::{check_file, run_batch};
use crate::discover::discover;

const LOG_ENV: &str = "CLINT_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "clint",
    version,
    about = "Lint C++ sources with clangd diagnostics"
)]
struct Cli {
    /// Files to check, relative to the root. Discovered from the include
    /// globs when omitted.
    files: Vec<PathBuf>,

    /// Config file to use instead of `clint.toml` / `~/.clint/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project root (server working directory and workspace URI).
    #[arg(long)]
    root: Option<PathBuf>,

    /// Per-file deadline in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Quiet period after the first diagnostics before a file is done.
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Number of files checked concurrently.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Glob for discovery (repeatable). Replaces the configured list.
    #[arg(long = "include", value_name = "GLOB")]
    include: Vec<String>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply_overrides(&self, config: &mut ClintConfig) {
        if let Some(secs) = self.timeout_secs {
            config.run.timeout_secs = secs;
        }
        if let Some(ms) = self.settle_ms {
            config.server.settle_window_ms = ms;
        }
        if let Some(jobs) = self.jobs {
            config.run.jobs = jobs;
        }
        if !self.include.is_empty() {
            config.run.include.clone_from(&self.include);
        }
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(stderr)
                .with_ansi(stderr().is_terminal())
                .with_target(false),
        )
        .with(env_filter)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => env::current_dir().context("failed to resolve the working directory")?,
    };
    let root = root
        .canonicalize()
        .with_context(|| format!("invalid project root {}", root.display()))?;

    let (mut config, source) = ClintConfig::load(cli.config.as_deref(), &root)?;
    tracing::info!(?source, "configuration loaded");
    cli.apply_overrides(&mut config);
    config.validate()?;

    let files = if cli.files.is_empty() {
        discover(&root, &config.run.include)?
    } else {
        cli.files
    };

    if files.is_empty() {
        println!("No files to check");
        return Ok(ExitCode::SUCCESS);
    }

    let settings = config.server.settings();
    let timeout = config.run.timeout();
    println!(
        "Checking {} file(s) with {}...",
        files.len(),
        settings.command
    );

    let settings = &settings;
    let root = root.as_path();
    let report = run_batch(
        files,
        config.run.jobs,
        move |path| check_file(settings, root, path, timeout),
        |file| {
            let mut out = stdout().lock();
            if let Err(err) = file.write_lines(&mut out).and_then(|()| out.flush()) {
                tracing::warn!(error = %err, "failed to write report line");
            }
        },
    )
    .await;

    if report.failed_count() > 0 {
        tracing::warn!(
            failed = report.failed_count(),
            "some files could not be checked"
        );
    }
    report
        .write_summary(&mut stdout().lock())
        .context("failed to write summary")?;

    Ok(ExitCode::from(report.exit_status()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("clint: {err:#}");
            ExitCode::from(2)
        }
    }
}
