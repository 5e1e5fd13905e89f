//! Runtime configuration loaded from TOML or JSON.
//!
//! Every section is optional and falls back to its defaults:
//!
//! ```toml
//! [runtime]
//! force_cpu = true
//!
//! [kernel]
//! precision = "promote_half"
//! check_finite = false
//!
//! [layer]
//! d_model = 6
//! d_k = 4
//! d_v = 4
//! return_attn = true
//! ```

use std::{fs, path::Path};

use attention::Config as KernelConfig;
use layers::SelfAttentionConfig;
use serde::Deserialize;
use thiserror::Error;

/// Host-process settings that used to be read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Skip accelerator detection and run on the CPU.
    pub force_cpu: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PrimerConfig {
    pub runtime: RuntimeConfig,
    pub kernel: KernelConfig,
    pub layer: SelfAttentionConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported configuration extension '{0}'")]
    Format(String),
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl PrimerConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: PrimerConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            Some("toml") | None => toml::from_str(&contents)?,
            Some(other) => return Err(ConfigError::Format(other.to_string())),
        };
        config.validate()?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.layer.d_model == 0 {
            errors.push("layer.d_model must be greater than 0".to_string());
        }
        if self.layer.d_k == 0 {
            errors.push("layer.d_k must be greater than 0".to_string());
        }
        if self.layer.d_v == 0 {
            errors.push("layer.d_v must be greater than 0".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}
