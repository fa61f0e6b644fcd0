//! YAML configuration file support for the picweave pipeline.
//!
//! Lets deployments define the embedding provider and matcher tuning in a
//! single file and load it at startup.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! # Picweave Pipeline Configuration
//! embedding:
//!   mode: "stub"
//!   model_name: "bge-small-en-v1.5"
//!   dimension: 384
//!   normalize: true
//!   cache_ttl_secs: 3600
//!
//! matcher:
//!   max_concurrency: 8
//!   batch_timeout_secs: 30
//!   standard_width: 1536
//!   allocation:
//!     prevent_duplicates: true
//!     similarity_threshold: 0.1
//!     high_similarity_threshold: 0.8
//!     uniqueness_bonus: 0.1
//!     local_search_iterations: 3
//! ```

use std::fs;
use std::path::Path;

use embedding::EmbeddingConfig;
use matcher::MatcherConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level configuration for the whole pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PicweaveConfig {
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Matcher configuration (concurrency, width, allocation tuning)
    #[serde(default)]
    pub matcher: MatcherConfig,
}

impl PicweaveConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigLoadError> {
        let config: PicweaveConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, including cross-section invariants
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.embedding
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
        self.matcher
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;

        // Padding only works when the shared width covers the native one
        if self.embedding.dimension > self.matcher.standard_width {
            return Err(ConfigLoadError::Validation(format!(
                "embedding dimension {} exceeds standard width {}",
                self.embedding.dimension, self.matcher.standard_width
            )));
        }
        Ok(())
    }

    /// Width that all vectors are padded to before they reach the index
    pub fn standard_width(&self) -> usize {
        self.matcher.standard_width
    }
}
