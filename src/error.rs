//! Service errors

use appcfg_store::StoreError;

use crate::config::{EffectiveConfigError, MergeError};
use crate::model::ConfigValidationError;

/// Errors surfaced by the public entry points.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No platform document for the app; fatal to `load_app_config`.
    #[error("app configuration not found: '{app_id}'")]
    NotFound { app_id: String },

    #[error("invalid app configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    #[error("invalid override: {0}")]
    InvalidOverride(String),

    #[error("override cannot be applied: {0}")]
    Merge(#[from] MergeError),

    #[error("invalid document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("config digest failed: {0}")]
    Digest(String),
}

impl From<EffectiveConfigError> for ServiceError {
    fn from(e: EffectiveConfigError) -> Self {
        match e {
            EffectiveConfigError::MissingPlatform { app_id } => Self::NotFound { app_id },
            EffectiveConfigError::Canonicalization(reason) => Self::Digest(reason),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
