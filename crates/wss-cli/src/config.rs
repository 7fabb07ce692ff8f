//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$WSS_CONFIG` environment variable
//! 2. `~/.config/wss/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub simulation: SimulationConfig,
    pub agent: AgentConfig,
    pub log: LogConfig,
}

/// LLM provider settings.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `gemini`, `openai` or `scripted`.
    pub provider: String,
    pub model: String,
    /// Override the provider's API root.
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_attempts: u32,
    pub timeout_secs: u64,
    /// Canned replies for the `scripted` provider.
    pub responses: Vec<String>,
}

/// Embedding backend used by memory stores and topic scoring.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `fastembed` or `hashing`.
    pub backend: String,
    /// Only used by the hashing backend.
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub data_dir: String,
    pub task_dir: String,
    pub groundtruth_dir: String,
    pub max_workers: usize,
    pub threading: bool,
    /// Serve the dataset from SQLite instead of loading it into memory.
    pub cache: bool,
    /// SQLite file for cache mode. Default: platform data dir.
    pub cache_db: Option<String>,
    /// Persist memory stores here. Unset keeps them in memory.
    pub db_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub reasoning: String,
    /// Memory variant, or `none`.
    pub memory: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// JSON Lines file receiving every LLM call and diagnostic.
    pub call_log: Option<String>,
}

// --- Defaults ---

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            model: "gemini-2.5-flash".into(),
            base_url: None,
            api_key_env: "GEMINI_API_KEY".into(),
            max_attempts: 5,
            timeout_secs: 120,
            responses: Vec::new(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "fastembed".into(),
            dimensions: 384,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            data_dir: "dataset".into(),
            task_dir: "tasks".into(),
            groundtruth_dir: "groundtruth".into(),
            max_workers: 10,
            threading: true,
            cache: false,
            cache_db: None,
            db_dir: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            reasoning: "tot".into(),
            memory: "dilu".into(),
        }
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("WSS_CONFIG") {
        return Some(PathBuf::from(p));
    }

    directories::BaseDirs::new().map(|dirs| {
        dirs.home_dir()
            .join(".config")
            .join("wss")
            .join("config.toml")
    })
}

/// Show the active config path (for `wss config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}
