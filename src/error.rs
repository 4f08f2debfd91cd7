//! Error taxonomy for the indexing pipeline.
//!
//! Extraction and store failures are recoverable per file; configuration
//! failures abort a run before any file is touched.

use std::path::PathBuf;

use thiserror::Error;

/// A file could not be read or parsed by its extractor.
///
/// Recovered locally: the file is recorded as failed and the run continues.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Malformed(String),
}

/// A store operation failed.
///
/// Query failures trigger the fail-open policy (reindex rather than skip);
/// write failures are surfaced per file and retried on the next run.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("store query failed: {0}")]
    Query(String),

    #[error("store write failed: {0}")]
    Write(String),
}

/// An embedding request failed for a file's chunk batch.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Invalid configuration. Fatal: propagated before any file is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A run-level failure. Per-file errors never surface here; only
/// conditions that prevent the run from starting at all. Store
/// connection failures surface from [`StoreError::Init`] when the host
/// opens the store, before a pipeline exists.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("root folder not readable: {0}")]
    RootUnreadable(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
