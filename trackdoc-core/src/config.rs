//! Tracking configuration

use crate::attribute::AttributeStoreKind;
use crate::error::ConfigError;
use crate::listenable::LockMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings shared by every node a [`DocumentModel`](crate::DocumentModel) creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub lock_mode: LockMode,

    /// Populate container and record fields of new documents before wiring
    #[serde(default = "default_true")]
    pub eager_defaults: bool,

    #[serde(default)]
    pub attribute_store: AttributeStoreKind,

    /// Bucket count for the bucketed store; a power of two
    #[serde(default = "default_buckets")]
    pub attribute_buckets: usize,
}

fn default_true() -> bool {
    true
}

fn default_buckets() -> usize {
    16
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            lock_mode: LockMode::default(),
            eager_defaults: default_true(),
            attribute_store: AttributeStoreKind::default(),
            attribute_buckets: default_buckets(),
        }
    }
}

impl TrackingConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: TrackingConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attribute_buckets == 0 || !self.attribute_buckets.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "attribute_buckets must be a power of two, got {}",
                self.attribute_buckets
            )));
        }
        Ok(())
    }
}
