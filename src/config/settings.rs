//! Service settings
//!
//! Settings are built from three layers:
//! 1. Built-in defaults
//! 2. Settings file (`appcfg.toml`)
//! 3. CLI flags
//!
//! Layers are combined with `deep_merge`, then validated.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::merge::merge_layers;

/// Default settings file name.
pub const DEFAULT_SETTINGS_FILE: &str = "appcfg.toml";

/// Default cache TTL in minutes.
pub const DEFAULT_CACHE_TTL_MINUTES: u32 = 5;

/// Longest allowed cache TTL (one day).
pub const MAX_CACHE_TTL_MINUTES: u32 = 1440;

/// Origin of a settings layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SettingsOrigin {
    Builtin,
    File,
    Cli,
}

/// Effective service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Root directory of the file-backed store
    pub store_root: PathBuf,

    /// Cache time-to-live for assembled runtimes
    pub cache_ttl_minutes: u32,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Capacity of the store's change broadcast channel
    pub change_channel_capacity: usize,

    /// Layers that contributed, in precedence order
    #[serde(default, skip_serializing)]
    pub sources: Vec<SettingsOrigin>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("appcfg-store"),
            cache_ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
            log_level: "info".to_string(),
            change_channel_capacity: appcfg_store::DEFAULT_CHANGE_CAPACITY,
            sources: vec![SettingsOrigin::Builtin],
        }
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl Settings {
    /// Build settings from the optional file and CLI overrides.
    ///
    /// A file path that does not exist is skipped.
    pub fn build(file_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, SettingsError> {
        let mut layers = vec![Self::builtin_value()];
        let mut sources = vec![SettingsOrigin::Builtin];

        if let Some(path) = file_path {
            if path.exists() {
                layers.push(Self::load_toml_file(path)?);
                sources.push(SettingsOrigin::File);
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(SettingsOrigin::Cli);
        }

        let merged = merge_layers(layers);
        let mut settings: Settings = serde_json::from_value(merged)
            .map_err(|e| SettingsError::ParseError(e.to_string()))?;
        settings.sources = sources;
        settings.validate()?;
        Ok(settings)
    }

    fn builtin_value() -> Value {
        let defaults = Self::default();
        serde_json::json!({
            "store_root": defaults.store_root,
            "cache_ttl_minutes": defaults.cache_ttl_minutes,
            "log_level": defaults.log_level,
            "change_channel_capacity": defaults.change_channel_capacity,
        })
    }

    fn load_toml_file(path: &Path) -> Result<Value, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|e| SettingsError::IoError(e.to_string()))?;
        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| SettingsError::ParseError(format!("TOML parse error: {}", e)))?;
        Ok(toml_to_json(toml_value))
    }

    /// Validate setting bounds.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cache_ttl_minutes == 0 || self.cache_ttl_minutes > MAX_CACHE_TTL_MINUTES {
            return Err(SettingsError::ValidationError(format!(
                "cache_ttl_minutes must be in (0, {}]",
                MAX_CACHE_TTL_MINUTES
            )));
        }
        if self.change_channel_capacity == 0 {
            return Err(SettingsError::ValidationError(
                "change_channel_capacity must be positive".to_string(),
            ));
        }
        if self.log_level.trim().is_empty() {
            return Err(SettingsError::ValidationError(
                "log_level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
