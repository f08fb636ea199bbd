use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Top-level configuration for Synapse.
///
/// Loaded from `synapse.toml` by default. Each section corresponds to a
/// bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynapseConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl SynapseConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SynapseConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Absolute or `data_dir`-relative path of the durable turn log.
    pub fn log_path(&self) -> PathBuf {
        let file = Path::new(&self.memory.log_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            Path::new(&self.general.data_dir).join(file)
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the durable turn log.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Session memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Turn log file name, resolved against `general.data_dir` unless absolute.
    pub log_file: String,
    /// Ceiling on turns held in memory across all sessions.
    pub max_in_memory: usize,
    /// Default number of turns returned by a history read.
    pub history_limit: usize,
    /// Turns included in a recap transcript.
    pub recap_turns: usize,
    /// Recent turns scanned when searching memory for a topic.
    pub memory_search_turns: usize,
    /// Minimum word length considered by the fallback keyword search.
    pub min_keyword_len: usize,
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            log_file: "chat_context.jsonl".to_string(),
            max_in_memory: 2000,
            history_limit: 10,
            recap_turns: 5,
            memory_search_turns: 20,
            min_keyword_len: 4,
            max_message_length: 2000,
        }
    }
}
