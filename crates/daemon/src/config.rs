//! Runtime configuration for the daemon.
//! Loaded from an optional TOML file; every field has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Daemon settings. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Where the HTTP API listens, e.g. 127.0.0.1:8080
    #[serde(default = "default_listen")]
    pub listen: String,

    /// JSON registry document.
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Root directory for generated artifacts.
    #[serde(default = "default_artifacts_root")]
    pub artifacts_root: PathBuf,

    /// File extension of generated artifacts (without the dot).
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,

    /// Command used to run an artifact: `<interpreter...> <artifact path>`.
    /// Split on whitespace, so extra flags are allowed.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Synthesis backend.
    #[serde(default)]
    pub synth: SynthConfig,

    /// Background preprocessing.
    #[serde(default)]
    pub preprocess: PreprocessConfig,

    /// Log level (env-filter syntax).
    #[serde(default = "default_log")]
    pub log: String,
}

/// Code-synthesis backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Endpoint receiving `{ prompt, max_tokens }`.
    #[serde(default = "default_synth_url")]
    pub url: String,
    /// Token budget of a preview.
    #[serde(default = "default_preview_max_tokens")]
    pub preview_max_tokens: u32,
    /// Token budget of a full artifact.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Background batch preprocessing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Concurrent preprocess workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Pending jobs accepted before new submissions are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_registry_path() -> PathBuf {
    PathBuf::from(".mcpforge/registry.json")
}

fn default_artifacts_root() -> PathBuf {
    PathBuf::from(".mcpforge/mcp_servers")
}

fn default_artifact_extension() -> String {
    "py".to_string()
}

fn default_interpreter() -> String {
    "python3 -u".to_string()
}

fn default_log() -> String {
    "info".to_string()
}

fn default_synth_url() -> String {
    "http://localhost:8000/v1/generate".to_string()
}

fn default_preview_max_tokens() -> u32 {
    1200
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    32
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            url: default_synth_url(),
            preview_max_tokens: default_preview_max_tokens(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SynthConfig {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            registry_path: default_registry_path(),
            artifacts_root: default_artifacts_root(),
            artifact_extension: default_artifact_extension(),
            interpreter: default_interpreter(),
            synth: SynthConfig::default(),
            preprocess: PreprocessConfig::default(),
            log: default_log(),
        }
    }
}

impl DaemonConfig {
    /// Reads a TOML config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: DaemonConfig =
            toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    /// Anchor relative storage paths at `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        self.registry_path = make_abs(base, &self.registry_path);
        self.artifacts_root = make_abs(base, &self.artifacts_root);
        self
    }
}

fn make_abs(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
