//! Source discovery for runs without explicit file arguments.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let trimmed = pat.trim();
        if trimmed.is_empty() {
            bail!("include globs must be non-empty");
        }
        let mut glob = GlobBuilder::new(trimmed);
        glob.literal_separator(true);
        if cfg!(windows) {
            glob.case_insensitive(true);
        }
        let glob = glob
            .build()
            .with_context(|| format!("invalid include glob '{trimmed}'"))?;
        builder.add(glob);
    }
    builder.build().context("invalid include glob set")
}

/// Files under `root` matching any of `include`, relative to `root` and sorted.
///
/// `.gitignore` rules and hidden entries are honored the way `ignore` does by
/// default.
pub fn discover(root: &Path, include: &[String]) -> Result<Vec<PathBuf>> {
    let globs = build_globset(include)?;

    let mut files = Vec::new();
    for entry in WalkBuilder::new(root).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if globs.is_match(relative) {
            files.push(relative.to_path_buf());
        }
    }

    files.sort();
    tracing::debug!(count = files.len(), root = %root.display(), "discovered sources");
    Ok(files)
}
