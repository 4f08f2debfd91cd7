use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub scan: ScanConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_window_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on files indexed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per-file budget for extract + embed + upsert, seconds.
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            file_timeout_secs: default_file_timeout_secs(),
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_file_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Reject configurations the pipeline cannot run under. Chunking bounds
/// are enforced here so the chunker itself never sees them violated.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.chunking.window_chars == 0 {
        return Err(ConfigError::Invalid(
            "chunking.window_chars must be > 0".to_string(),
        ));
    }
    if config.chunking.overlap_chars >= config.chunking.window_chars {
        return Err(ConfigError::Invalid(
            "chunking.overlap_chars must be < chunking.window_chars".to_string(),
        ));
    }
    if config.runtime.workers == 0 {
        return Err(ConfigError::Invalid(
            "runtime.workers must be >= 1".to_string(),
        ));
    }
    if config.runtime.file_timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "runtime.file_timeout_secs must be >= 1".to_string(),
        ));
    }
    match config.embedding.provider.as_str() {
        "ollama" => {}
        other => {
            return Err(ConfigError::Invalid(format!(
                "unknown embedding provider: '{}'. Must be ollama.",
                other
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            store: StoreConfig {
                path: PathBuf::from("/tmp/docdex.sqlite"),
            },
            scan: ScanConfig {
                root: PathBuf::from("/tmp/kb"),
                include_globs: vec![],
                exclude_globs: vec![],
                follow_symlinks: false,
            },
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }

    #[test]
    fn default_config_validates() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn zero_window_rejected() {
        let mut config = base_config();
        config.chunking.window_chars = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let mut config = base_config();
        config.chunking.window_chars = 100;
        config.chunking.overlap_chars = 100;
        assert!(validate(&config).is_err());

        config.chunking.overlap_chars = 99;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unknown_provider_rejected() {
        let mut config = base_config();
        config.embedding.provider = "openai".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_src = r#"
            [store]
            path = "./data/docdex.sqlite"

            [scan]
            root = "./knowledge-base"
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.chunking.window_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.runtime.workers, 4);
        assert!(validate(&config).is_ok());
    }
}
