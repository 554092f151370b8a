//! Configuration management for Refract.
//!
//! Configuration is loaded from a TOML file with sensible defaults. Every
//! section implements `Default`, so a partial file only overrides what it names.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Refract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data and model locations
    pub general: GeneralConfig,

    /// Dataset selection
    pub dataset: DatasetConfig,

    /// Image preprocessing
    pub preprocess: PreprocessConfig,

    /// Visual-text encoder settings
    pub encoder: EncoderConfig,

    /// Combiner selection
    pub combiner: CombinerConfig,

    /// Gallery index building
    pub index: IndexConfig,

    /// Ranking defaults
    pub retrieval: RetrievalConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.refract.refract/config.toml
    /// - Linux: ~/.config/refract/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\refract\config\config.toml
    ///
    /// Falls back to ~/.refract/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "refract", "refract")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".refract").join("config.toml")
            })
    }

    /// Resolved dataset root (with ~ expansion).
    ///
    /// Every manifest and image path is resolved against this single root.
    pub fn data_root(&self) -> PathBuf {
        expand(&self.general.data_root)
    }

    /// Resolved model directory (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        expand(&self.general.model_dir)
    }

    /// Resolved learned-combiner snapshot path, if configured.
    pub fn combiner_path(&self) -> Option<PathBuf> {
        self.combiner.path.as_deref().map(expand)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.dataset.name, "fiq");
        assert_eq!(config.index.batch_size, 32);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.preprocess.transform, "targetpad");
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[dataset]"));
        assert!(toml.contains("[preprocess]"));
        assert!(toml.contains("[combiner]"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[dataset]\nname = \"cirr\"\nsplit = \"val\"\n\n[index]\nbatch_size = 8\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.dataset.name, "cirr");
        assert_eq!(config.dataset.split, "val");
        assert_eq!(config.index.batch_size, 8);
        assert_eq!(config.index.prefetch, 64);
        assert!((config.preprocess.target_ratio - 1.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[index]\nbatch_size = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_tilde_expansion() {
        let mut config = Config::default();
        config.general.data_root = PathBuf::from("/srv/datasets/fashionIQ");
        assert_eq!(config.data_root(), PathBuf::from("/srv/datasets/fashionIQ"));
        assert!(config.combiner_path().is_none());
    }
}
