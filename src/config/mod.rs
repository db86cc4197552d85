//! Configuration resolution
//!
//! Turns stored documents into one effective app configuration:
//! 1. Inheritance: load platform document + optional organization override
//! 2. Merge: apply the per-key merge rules
//! 3. Effective: wrap the result with provenance and a content digest
//!
//! Also hosts the service's own layered `Settings`.

mod effective;
mod inheritance;
mod merge;
mod settings;

pub use effective::{config_digest, EffectiveConfigError, MergedConfig};
pub use inheritance::{ConfigInheritance, ConfigOrigin, InheritanceResolver};
pub use merge::{
    deep_merge, merge_configs, merge_documents, merge_layers, strategy_for, MergeError,
    MergeStrategy, MERGE_RULES,
};
pub use settings::{
    Settings, SettingsError, SettingsOrigin, DEFAULT_CACHE_TTL_MINUTES, DEFAULT_SETTINGS_FILE,
    MAX_CACHE_TTL_MINUTES,
};
