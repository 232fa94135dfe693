//! Configuration management for the CLI.

use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use sift_extractor::ExtractorConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// CLI configuration, stored at `~/.sift/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Model provider settings
    #[serde(default)]
    pub model: ModelSettings,

    /// Extraction pipeline settings
    #[serde(default)]
    pub extractor: ExtractorConfig,
}

/// Model provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Base URL of the Ollama-compatible endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Transport-level retries per model call
    #[serde(default = "default_transport_retries")]
    pub max_retries: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_retries: default_transport_retries(),
        }
    }
}

impl Config {
    /// Get the default configuration file path.
    pub fn path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CliError::Config("Could not find home directory".into()))?;
        Ok(home.join(".sift").join("config.toml"))
    }

    /// Load configuration from `path`, or defaults if the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| CliError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check the extractor settings and model endpoint.
    pub fn validate(&self) -> Result<()> {
        self.extractor.validate().map_err(CliError::Config)?;
        if self.model.endpoint.trim().is_empty() {
            return Err(CliError::Config("model.endpoint must not be empty".into()));
        }
        if self.model.model.trim().is_empty() {
            return Err(CliError::Config("model.model must not be empty".into()));
        }
        Ok(())
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_transport_retries() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.endpoint, "http://localhost:11434");
        assert_eq!(config.extractor.max_retries, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.model.model = "qwen2.5".to_string();
        config.extractor.stream_deltas = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[model]\nmodel = \"mistral\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.model.model, "mistral");
        assert_eq!(config.model.endpoint, "http://localhost:11434");
        assert_eq!(config.extractor, ExtractorConfig::default());
    }

    #[test]
    fn test_invalid_extractor_settings_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.extractor.fulltext_profile.chunk_size = 0;
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        assert!(matches!(Config::load_from(&path), Err(CliError::Config(_))));
    }
}
