//! App configuration documents
//!
//! Typed shape of the platform document (`AppConfig`) and of the
//! per-organization partial document (`ConfigOverride`). Unknown top-level
//! keys of an `AppConfig` are preserved in `extra` so they survive merging
//! and re-serialization.

pub mod naming;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A complete application definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub app_id: String,

    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub entities: Vec<EntityDefinition>,

    #[serde(default)]
    pub transactions: Vec<TransactionDefinition>,

    #[serde(default)]
    pub screens: Vec<ScreenDefinition>,

    #[serde(default)]
    pub navigation: NavigationConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_theme: Option<UIThemeConfig>,

    /// Free-form app settings (shallow merged)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,

    /// Any other top-level keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A master-data entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Unique within an app
    pub entity_type: String,

    pub display_name: String,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// A transaction type with header fields and optional line fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDefinition {
    pub transaction_type: String,

    pub display_name: String,

    #[serde(default)]
    pub header_fields: Vec<FieldDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_fields: Option<Vec<FieldDefinition>>,
}

/// One field of an entity or transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub field_name: String,

    pub label: String,

    #[serde(default = "default_field_type")]
    pub field_type: String,

    #[serde(default)]
    pub required: bool,

    /// Validation rules, passed through verbatim
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub validation: Value,

    /// Determines section placement and table-column eligibility
    #[serde(default)]
    pub field_order: i32,

    /// UI hints, passed through verbatim
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub ui_hints: Value,

    #[serde(default)]
    pub searchable: bool,
}

fn default_field_type() -> String {
    "text".to_string()
}

/// A configured screen, optionally bound to a concrete component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenDefinition {
    pub screen_id: String,

    pub screen_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,

    /// Name of the component that renders this screen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

/// Navigation: dashboards and menu.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationConfig {
    #[serde(default)]
    pub dashboards: Vec<DashboardDefinition>,

    #[serde(default)]
    pub menu: Vec<MenuItem>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardDefinition {
    pub dashboard_id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub widgets: Vec<Value>,

    /// Permissions required to open the dashboard
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub label: String,

    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Theme settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UIThemeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Problems found when validating an `AppConfig`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("app_id must not be empty")]
    EmptyAppId,

    #[error("app_id '{found}' does not match storage code '{expected}'")]
    AppIdMismatch { expected: String, found: String },

    #[error("duplicate {kind} '{key}'")]
    DuplicateKey { kind: &'static str, key: String },

    #[error("{kind} '{key}' has no usable route segment")]
    EmptySlug { kind: &'static str, key: String },

    #[error("route segment '{slug}' of '{key}' is reserved")]
    ReservedSlug { key: String, slug: String },

    #[error("'{first}' and '{second}' share route segment '{slug}'")]
    SlugCollision {
        first: String,
        second: String,
        slug: String,
    },
}

impl AppConfig {
    /// Minimal config with no entities, transactions or screens.
    pub fn new(app_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: name.into(),
            version: String::new(),
            entities: Vec::new(),
            transactions: Vec::new(),
            screens: Vec::new(),
            navigation: NavigationConfig::default(),
            ui_theme: None,
            settings: Map::new(),
            extra: Map::new(),
        }
    }

    /// Look up an entity by type, ignoring case.
    pub fn entity(&self, entity_type: &str) -> Option<&EntityDefinition> {
        let key = naming::record_key(entity_type);
        self.entities
            .iter()
            .find(|e| naming::record_key(&e.entity_type) == key)
    }

    /// Look up a transaction by type, ignoring case.
    pub fn transaction(&self, transaction_type: &str) -> Option<&TransactionDefinition> {
        let key = naming::record_key(transaction_type);
        self.transactions
            .iter()
            .find(|t| naming::record_key(&t.transaction_type) == key)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.app_id.trim().is_empty() {
            return Err(ConfigValidationError::EmptyAppId);
        }
        check_unique("entity_type", self.entities.iter().map(|e| e.entity_type.as_str()))?;
        check_unique(
            "transaction_type",
            self.transactions.iter().map(|t| t.transaction_type.as_str()),
        )?;
        check_unique("screen_id", self.screens.iter().map(|s| s.screen_id.as_str()))?;
        self.check_route_slugs()
    }

    /// Entities and transactions share the `/{app_id}/{slug}` namespace.
    fn check_route_slugs(&self) -> Result<(), ConfigValidationError> {
        let types = self
            .entities
            .iter()
            .map(|e| ("entity_type", e.entity_type.as_str()))
            .chain(
                self.transactions
                    .iter()
                    .map(|t| ("transaction_type", t.transaction_type.as_str())),
            );

        let mut owners: HashMap<String, &str> = HashMap::new();
        for (kind, type_name) in types {
            let slug = naming::kebab_case(type_name);
            if slug.is_empty() {
                return Err(ConfigValidationError::EmptySlug {
                    kind,
                    key: type_name.to_string(),
                });
            }
            if naming::RESERVED_SLUGS.contains(&slug.as_str()) {
                return Err(ConfigValidationError::ReservedSlug {
                    key: type_name.to_string(),
                    slug,
                });
            }
            if let Some(first) = owners.get(&slug) {
                return Err(ConfigValidationError::SlugCollision {
                    first: first.to_string(),
                    second: type_name.to_string(),
                    slug,
                });
            }
            owners.insert(slug, type_name);
        }
        Ok(())
    }

    /// Validate and additionally require `app_id` to equal the storage code.
    pub fn validate_for(&self, app_id: &str) -> Result<(), ConfigValidationError> {
        if self.app_id != app_id {
            return Err(ConfigValidationError::AppIdMismatch {
                expected: app_id.to_string(),
                found: self.app_id.clone(),
            });
        }
        self.validate()
    }
}

fn check_unique<'a>(
    kind: &'static str,
    keys: impl Iterator<Item = &'a str>,
) -> Result<(), ConfigValidationError> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(naming::record_key(key)) {
            return Err(ConfigValidationError::DuplicateKey {
                kind,
                key: key.to_string(),
            });
        }
    }
    Ok(())
}

/// A partial app document scoped to one organization.
///
/// Only the keys present take part in merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigOverride(Map<String, Value>);

impl ConfigOverride {
    pub fn new(keys: Map<String, Value>) -> Self {
        Self(keys)
    }

    /// Build from a JSON value; only objects are valid overrides.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_document() {
        let config: AppConfig = serde_json::from_value(json!({
            "app_id": "retail",
            "name": "Retail"
        }))
        .unwrap();
        assert_eq!(config.app_id, "retail");
        assert!(config.entities.is_empty());
        assert!(config.ui_theme.is_none());
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let config: AppConfig = serde_json::from_value(json!({
            "app_id": "retail",
            "name": "Retail",
            "feature_flags": {"beta": true}
        }))
        .unwrap();
        assert_eq!(config.extra["feature_flags"]["beta"], true);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["feature_flags"]["beta"], true);
    }

    #[test]
    fn test_field_defaults() {
        let field: FieldDefinition = serde_json::from_value(json!({
            "field_name": "sku",
            "label": "SKU"
        }))
        .unwrap();
        assert_eq!(field.field_type, "text");
        assert!(!field.required);
        assert!(field.validation.is_null());
    }

    #[test]
    fn test_validate_duplicate_entity() {
        let config: AppConfig = serde_json::from_value(json!({
            "app_id": "retail",
            "name": "Retail",
            "entities": [
                {"entity_type": "PRODUCT", "display_name": "Product"},
                {"entity_type": "PRODUCT", "display_name": "Product again"}
            ]
        }))
        .unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::DuplicateKey {
                kind: "entity_type",
                key: "PRODUCT".to_string()
            })
        );
    }

    fn with_types(entities: &[&str], transactions: &[&str]) -> AppConfig {
        serde_json::from_value(json!({
            "app_id": "retail",
            "name": "Retail",
            "entities": entities
                .iter()
                .map(|t| json!({"entity_type": t, "display_name": t}))
                .collect::<Vec<_>>(),
            "transactions": transactions
                .iter()
                .map(|t| json!({"transaction_type": t, "display_name": t}))
                .collect::<Vec<_>>(),
        }))
        .unwrap()
    }

    #[test]
    fn test_validate_duplicate_ignores_case() {
        assert_eq!(
            with_types(&["CUSTOMER", "customer"], &[]).validate(),
            Err(ConfigValidationError::DuplicateKey {
                kind: "entity_type",
                key: "customer".to_string()
            })
        );
    }

    #[test]
    fn test_validate_non_ascii_types_are_distinct() {
        assert!(with_types(&["製品", "CAFÉ", "CAF"], &[]).validate().is_ok());
    }

    #[test]
    fn test_validate_empty_slug() {
        assert!(matches!(
            with_types(&["___"], &[]).validate(),
            Err(ConfigValidationError::EmptySlug { kind: "entity_type", .. })
        ));
    }

    #[test]
    fn test_validate_slug_collision_across_kinds() {
        assert_eq!(
            with_types(&["SALES_ORDER"], &["SalesOrder"]).validate(),
            Err(ConfigValidationError::SlugCollision {
                first: "SALES_ORDER".to_string(),
                second: "SalesOrder".to_string(),
                slug: "sales-order".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_reserved_slug() {
        assert!(matches!(
            with_types(&[], &["DASHBOARD"]).validate(),
            Err(ConfigValidationError::ReservedSlug { .. })
        ));
    }

    #[test]
    fn test_validate_for_app_id_mismatch() {
        let config = AppConfig::new("retail", "Retail");
        assert!(config.validate_for("retail").is_ok());
        assert!(matches!(
            config.validate_for("salon"),
            Err(ConfigValidationError::AppIdMismatch { .. })
        ));
    }

    #[test]
    fn test_entity_lookup_ignores_case() {
        let mut config = AppConfig::new("retail", "Retail");
        config.entities.push(EntityDefinition {
            entity_type: "PRODUCT".to_string(),
            display_name: "Product".to_string(),
            fields: Vec::new(),
        });
        assert!(config.entity("product").is_some());
        assert!(config.transaction("product").is_none());
    }

    #[test]
    fn test_override_from_value() {
        assert!(ConfigOverride::from_value(json!({"name": "x"})).is_some());
        assert!(ConfigOverride::from_value(json!([1, 2])).is_none());
    }
}
