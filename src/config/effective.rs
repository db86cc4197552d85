//! Effective configuration with provenance
//!
//! `MergedConfig` is the result of combining the inheritance layers: the
//! merged `AppConfig`, the layers that contributed to it, and a content
//! digest over its canonical JSON form.

use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::inheritance::{ConfigInheritance, ConfigOrigin};
use super::merge::{merge_configs, MergeError};
use crate::model::AppConfig;

/// Errors building the effective configuration.
#[derive(Debug, thiserror::Error)]
pub enum EffectiveConfigError {
    /// No platform layer; an override alone never yields a config.
    #[error("platform configuration not found for app '{app_id}'")]
    MissingPlatform { app_id: String },

    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
}

/// Merged configuration plus where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct MergedConfig {
    /// The effective app document
    pub config: Arc<AppConfig>,

    /// Contributing layers in precedence order
    pub sources: Vec<ConfigOrigin>,

    /// SHA-256 of the JCS canonical JSON of `config`
    pub digest: String,
}

impl MergedConfig {
    /// Merge the layers of `inheritance`.
    ///
    /// An override that cannot be applied is logged and dropped; the result
    /// then carries the platform layer alone.
    pub fn build(app_id: &str, inheritance: ConfigInheritance) -> Result<Self, EffectiveConfigError> {
        let ConfigInheritance {
            platform_config,
            org_override,
            mut inheritance_chain,
        } = inheritance;

        let platform = platform_config.ok_or_else(|| EffectiveConfigError::MissingPlatform {
            app_id: app_id.to_string(),
        })?;

        let config = match merge_configs(platform.clone(), org_override.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                log_rejected_override(app_id, &e);
                inheritance_chain.retain(|origin| *origin != ConfigOrigin::Organization);
                platform
            }
        };

        Self::from_parts(config, inheritance_chain)
    }

    /// Wrap an already merged config.
    pub fn from_parts(
        config: Arc<AppConfig>,
        sources: Vec<ConfigOrigin>,
    ) -> Result<Self, EffectiveConfigError> {
        let digest = config_digest(&config)?;
        Ok(Self {
            config,
            sources,
            digest,
        })
    }

    pub fn app_id(&self) -> &str {
        &self.config.app_id
    }
}

fn log_rejected_override(app_id: &str, error: &MergeError) {
    tracing::warn!(
        app_id,
        error = %error,
        "Organization override could not be applied, using platform layer only"
    );
}

/// Content digest of a config: hex SHA-256 over its canonical JSON.
pub fn config_digest(config: &AppConfig) -> Result<String, EffectiveConfigError> {
    let canonical = serde_json_canonicalizer::to_vec(config)
        .map_err(|e| EffectiveConfigError::Canonicalization(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}
