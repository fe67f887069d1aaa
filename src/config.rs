/// Configuration module for rekal-embed.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embedder::download;
use crate::embedder::nomic::{EMBED_DIM, MODEL_NAME};

// ── Default value functions ──────────────────────────────────────────

fn default_model_dir() -> String {
    download::default_model_dir().to_string_lossy().into_owned()
}

fn default_threads() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_model_name() -> String {
    MODEL_NAME.to_string()
}

fn default_dimensions() -> usize {
    EMBED_DIM
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Explicit GGUF file; overrides `model_dir` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,

    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default = "default_true")]
    pub auto_download: bool,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            model_path: None,
            threads: default_threads(),
            auto_download: default_true(),
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dimensions: default_dimensions(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template when the default path is used.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.threads > 0, "threads must be positive");
        anyhow::ensure!(
            u32::try_from(self.threads).is_ok(),
            "threads out of range: {}",
            self.threads
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(!self.model.name.is_empty(), "model.name must be set");
        anyhow::ensure!(
            self.model_path.as_deref().is_none_or(|p| !p.is_empty()),
            "model_path must not be empty when set"
        );
        Ok(())
    }

    /// The GGUF file to load: `model_path` if set, else the default file
    /// name inside `model_dir`.
    #[must_use]
    pub fn resolve_model_path(&self) -> PathBuf {
        match &self.model_path {
            Some(p) => PathBuf::from(p),
            None => Path::new(&self.model_dir).join(download::MODEL_FILE),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.threads, 4);
        assert!(config.auto_download);
        assert!(config.model_path.is_none());
        assert_eq!(config.model.dimensions, 768);
        assert_eq!(config.model.name, "nomic-v1.5");
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"threads": 8, "model_path": "/models/nomic.gguf"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.threads, 8);
        assert_eq!(config.model_path.as_deref(), Some("/models/nomic.gguf"));
        // Other fields should have defaults
        assert!(config.auto_download);
        assert_eq!(config.model.dimensions, 768);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_threads() {
        let mut config = Config::default();
        config.threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_model_path() {
        let mut config = Config::default();
        config.model_path = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_model_path() {
        let mut config = Config::default();
        config.model_dir = "/var/models".to_string();
        assert_eq!(
            config.resolve_model_path(),
            Path::new("/var/models").join(download::MODEL_FILE)
        );

        config.model_path = Some("/tmp/other.gguf".to_string());
        assert_eq!(config.resolve_model_path(), PathBuf::from("/tmp/other.gguf"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.threads, 4);
        // Templates are only written for the default path
        assert!(!path.exists());
    }

    #[test]
    fn test_load_invalid_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.model.name, "nomic-v1.5");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.threads = 2;
        config.auto_download = false;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.threads, 2);
        assert!(!loaded.auto_download);
        assert_eq!(loaded.model_dir, config.model_dir);
    }
}
