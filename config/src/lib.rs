//! Configuration for clint.
//!
//! Every field has a default, so an absent file and an empty file behave the
//! same. Lookup order:
//!
//! 1. `--config <path>` (must exist)
//! 2. `clint.toml` in the project root
//! 3. `~/.clint/config.toml`
//! 4. built-in defaults

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clint_lsp::ServerConfig;
use serde::Deserialize;

/// File name looked up in the project root.
pub const PROJECT_CONFIG_FILE: &str = "clint.toml";

const DEFAULT_TIMEOUT_SECS: u64 = 5;
/// Upper bound for every configured duration.
const MAX_DURATION_SECS: u64 = 24 * 60 * 60;
const DEFAULT_INCLUDE: &str = "src/**/*.cpp";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClintConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub run: RunConfig,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_include() -> Vec<String> {
    vec![DEFAULT_INCLUDE.to_string()]
}

fn default_jobs() -> usize {
    1
}

/// Batch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Per-file deadline for the whole session.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Globs (relative to the project root) used when no files are given.
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    /// Number of sessions run concurrently.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            include: default_include(),
            jobs: 1,
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

/// Expand `${VAR}` references; unset variables expand to "".
fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + len + 1..];
    }

    out.push_str(rest);
    out
}

/// `~/.clint/config.toml`, if a home directory is known.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".clint").join("config.toml"))
}

impl ClintConfig {
    /// Resolve and load the configuration for a run rooted at `project_root`.
    pub fn load(
        explicit: Option<&Path>,
        project_root: &Path,
    ) -> Result<(Self, ConfigSource), ConfigError> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            return Ok((config, ConfigSource::File(path.to_path_buf())));
        }

        let mut candidates = vec![project_root.join(PROJECT_CONFIG_FILE)];
        candidates.extend(user_config_path());
        Self::load_first(&candidates)
    }

    /// Load the first existing file among `candidates`, or defaults.
    fn load_first(candidates: &[PathBuf]) -> Result<(Self, ConfigSource), ConfigError> {
        for path in candidates {
            if path.exists() {
                let config = Self::from_file(path)?;
                return Ok((config, ConfigSource::File(path.clone())));
            }
        }
        Ok((Self::default(), ConfigSource::Defaults))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(source) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, source);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = match toml::from_str(content) {
            Ok(config) => config,
            Err(source) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, source);
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        config.server.command = expand_env_vars(&config.server.command);
        for arg in &mut config.server.args {
            *arg = expand_env_vars(arg);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.command.trim().is_empty() {
            return Err(ConfigError::Invalid("server.command is empty".to_string()));
        }
        if self.run.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "run.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.run.timeout_secs > MAX_DURATION_SECS {
            return Err(ConfigError::Invalid(format!(
                "run.timeout_secs must be at most {MAX_DURATION_SECS}"
            )));
        }
        let max_ms = MAX_DURATION_SECS * 1000;
        for (name, value) in [
            ("server.settle_window_ms", self.server.settle_window_ms),
            ("server.poll_slice_ms", self.server.poll_slice_ms),
            ("server.shutdown_grace_ms", self.server.shutdown_grace_ms),
        ] {
            if value > max_ms {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be at most {max_ms}"
                )));
            }
        }
        if self.run.jobs == 0 {
            return Err(ConfigError::Invalid(
                "run.jobs must be at least 1".to_string(),
            ));
        }
        if self.server.poll_slice_ms == 0 {
            return Err(ConfigError::Invalid(
                "server.poll_slice_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
