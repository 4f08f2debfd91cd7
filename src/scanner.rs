//! Recursive knowledge-base traversal.
//!
//! Walks the configured root, keeps files whose extension maps to a
//! supported [`FileKind`], and applies include/exclude globs on the
//! root-relative path. Results are sorted so runs are deterministic.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{ConfigError, PipelineError};
use crate::models::FileKind;

/// A supported file discovered under the scan root.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub kind: FileKind,
}

/// Scan `root` recursively for indexable files.
///
/// Fails only when the root itself is missing or the glob configuration is
/// malformed; unreadable entries below the root are skipped with a warning.
pub fn scan(root: &Path, config: &ScanConfig) -> Result<Vec<ScannedFile>, PipelineError> {
    if !root.is_dir() {
        return Err(PipelineError::RootUnreadable(root.to_path_buf()));
    }

    let include_set = if config.include_globs.is_empty() {
        None
    } else {
        Some(build_globset(&config.include_globs)?)
    };

    let mut excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let kind = match FileKind::from_path(path) {
            Some(kind) => kind,
            None => continue,
        };

        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();
        if exclude_set.is_match(rel_str.as_ref()) {
            continue;
        }
        if let Some(ref includes) = include_set {
            if !includes.is_match(rel_str.as_ref()) {
                continue;
            }
        }

        files.push(ScannedFile {
            path: path.to_path_buf(),
            kind,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, PipelineError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            PipelineError::Config(ConfigError::Invalid(format!(
                "bad glob pattern '{}': {}",
                pattern, e
            )))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| PipelineError::Config(ConfigError::Invalid(format!("glob set build failed: {}", e))))
}
