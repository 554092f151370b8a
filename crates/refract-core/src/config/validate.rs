//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "index.batch_size must be > 0".into(),
            ));
        }
        if self.index.prefetch == 0 {
            return Err(ConfigError::ValidationError(
                "index.prefetch must be > 0".into(),
            ));
        }
        if self.encoder.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "encoder.image_size must be > 0".into(),
            ));
        }
        if self.encoder.embedding_dim == 0 {
            return Err(ConfigError::ValidationError(
                "encoder.embedding_dim must be > 0".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be > 0".into(),
            ));
        }
        if !self.preprocess.target_ratio.is_finite() || self.preprocess.target_ratio < 1.0 {
            return Err(ConfigError::ValidationError(
                "preprocess.target_ratio must be >= 1.0".into(),
            ));
        }
        if self.preprocess.std.iter().any(|s| *s == 0.0) {
            return Err(ConfigError::ValidationError(
                "preprocess.std entries must be non-zero".into(),
            ));
        }
        if self.dataset.caption_selector.is_some_and(|s| s > 3) {
            return Err(ConfigError::ValidationError(
                "dataset.caption_selector must be between 0 and 3".into(),
            ));
        }
        if self.combiner.strategy == "combiner" && self.combiner.path.is_none() {
            return Err(ConfigError::ValidationError(
                "combiner.path is required when combiner.strategy = \"combiner\"".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_prefetch() {
        let mut config = Config::default();
        config.index.prefetch = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("prefetch"));
    }

    #[test]
    fn test_validate_rejects_small_target_ratio() {
        let mut config = Config::default();
        config.preprocess.target_ratio = 0.8;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("target_ratio"));
    }

    #[test]
    fn test_validate_rejects_zero_std() {
        let mut config = Config::default();
        config.preprocess.std[1] = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("std"));
    }

    #[test]
    fn test_validate_requires_combiner_path() {
        let mut config = Config::default();
        config.combiner.strategy = "combiner".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("combiner.path"));

        config.combiner.path = Some("~/.refract/combiner.onnx".into());
        assert!(config.validate().is_ok());
    }
}
