//! Configuration merge logic
//!
//! Two merges live here:
//! - `merge_configs`: platform document + organization override, driven by
//!   the `MERGE_RULES` table (upsert-by-key lists, shallow-merged objects,
//!   replace for everything else)
//! - `deep_merge` / `merge_layers`: recursive merge used for layering
//!   service settings (objects deep-merge, arrays and scalars replace)

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::model::naming::record_key;
use crate::model::{AppConfig, ConfigOverride};

/// How one top-level key of an override combines with the platform value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Override value replaces the platform value outright.
    Replace,
    /// Override's top-level keys replace the platform's same keys; other
    /// platform keys are kept.
    ShallowMerge,
    /// List of records keyed by the named field. Override records replace
    /// the platform record with the same key (whole record, no field-level
    /// merge); new keys are appended; platform order is kept.
    UpsertByKey(&'static str),
}

/// Per-key merge rules. Keys not listed use `MergeStrategy::Replace`.
pub const MERGE_RULES: &[(&str, MergeStrategy)] = &[
    ("entities", MergeStrategy::UpsertByKey("entity_type")),
    ("transactions", MergeStrategy::UpsertByKey("transaction_type")),
    ("screens", MergeStrategy::UpsertByKey("screen_id")),
    ("navigation", MergeStrategy::ShallowMerge),
    ("ui_theme", MergeStrategy::ShallowMerge),
    ("settings", MergeStrategy::ShallowMerge),
];

/// Strategy for a top-level key.
pub fn strategy_for(key: &str) -> MergeStrategy {
    MERGE_RULES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, s)| *s)
        .unwrap_or(MergeStrategy::Replace)
}

/// Errors raised when an override cannot be applied.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("override key '{key}' must be an array of records")]
    NotAList { key: String },

    #[error("record in override '{key}' is missing its '{field}' key")]
    MissingRecordKey { key: String, field: String },

    #[error("merged document is not a valid app config: {0}")]
    InvalidResult(#[from] serde_json::Error),
}

/// Combine a platform document with an optional organization override.
///
/// Without an override the platform `Arc` itself is returned, so callers can
/// rely on `Arc::ptr_eq` with the input.
pub fn merge_configs(
    platform: Arc<AppConfig>,
    org_override: Option<&ConfigOverride>,
) -> Result<Arc<AppConfig>, MergeError> {
    let Some(org_override) = org_override else {
        return Ok(platform);
    };

    let platform_value = serde_json::to_value(platform.as_ref())?;
    let merged = merge_documents(platform_value, org_override.as_map())?;
    let config: AppConfig = serde_json::from_value(merged)?;
    Ok(Arc::new(config))
}

/// Apply `MERGE_RULES` to raw JSON documents.
pub fn merge_documents(platform: Value, overrides: &Map<String, Value>) -> Result<Value, MergeError> {
    let mut base = match platform {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    for (key, override_value) in overrides {
        let current = base.remove(key);
        let merged = apply_strategy(key, strategy_for(key), current, override_value)?;
        base.insert(key.clone(), merged);
    }

    Ok(Value::Object(base))
}

fn apply_strategy(
    key: &str,
    strategy: MergeStrategy,
    current: Option<Value>,
    override_value: &Value,
) -> Result<Value, MergeError> {
    match strategy {
        MergeStrategy::Replace => Ok(override_value.clone()),
        MergeStrategy::ShallowMerge => Ok(shallow_merge(current, override_value)),
        MergeStrategy::UpsertByKey(field) => upsert_by_key(key, field, current, override_value),
    }
}

fn shallow_merge(current: Option<Value>, override_value: &Value) -> Value {
    match (current, override_value) {
        (Some(Value::Object(mut base)), Value::Object(overlay)) => {
            for (k, v) in overlay {
                base.insert(k.clone(), v.clone());
            }
            Value::Object(base)
        }
        (_, overlay) => overlay.clone(),
    }
}

fn upsert_by_key(
    key: &str,
    field: &str,
    current: Option<Value>,
    override_value: &Value,
) -> Result<Value, MergeError> {
    let Value::Array(overlay) = override_value else {
        return Err(MergeError::NotAList { key: key.to_string() });
    };

    let mut records = match current {
        Some(Value::Array(records)) => records,
        _ => Vec::new(),
    };

    for record in overlay {
        let key_name = record
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| MergeError::MissingRecordKey {
                key: key.to_string(),
                field: field.to_string(),
            })?;

        let folded = record_key(key_name);
        let existing = records.iter().position(|r| {
            r.get(field)
                .and_then(Value::as_str)
                .is_some_and(|k| record_key(k) == folded)
        });

        match existing {
            Some(index) => records[index] = record.clone(),
            None => records.push(record.clone()),
        }
    }

    Ok(Value::Array(records))
}

/// Deep merge two JSON values.
///
/// Merge semantics:
/// - Objects: deep-merge by key (recursive)
/// - Arrays: REPLACE (second wins entirely)
/// - Scalars: override (second wins)
/// - Null: override (null can override any value)
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }

        (Value::Array(_), overlay @ Value::Array(_)) => overlay,

        (_, overlay) => overlay,
    }
}

/// Merge multiple layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn platform() -> Arc<AppConfig> {
        Arc::new(
            serde_json::from_value(json!({
                "app_id": "crm",
                "name": "CRM",
                "version": "1.0.0",
                "entities": [
                    {
                        "entity_type": "CUSTOMER",
                        "display_name": "Customer",
                        "fields": [
                            {"field_name": "name", "label": "Name", "field_order": 1},
                            {"field_name": "email", "label": "Email", "field_order": 2},
                            {"field_name": "phone", "label": "Phone", "field_order": 3}
                        ]
                    },
                    {"entity_type": "CONTACT", "display_name": "Contact"}
                ],
                "screens": [
                    {"screen_id": "home", "screen_type": "dashboard"}
                ],
                "navigation": {"dashboards": [], "menu": [], "collapsed": false},
                "ui_theme": {"primary_color": "#000000", "mode": "light"},
                "reports": ["monthly"]
            }))
            .unwrap(),
        )
    }

    fn override_of(value: Value) -> ConfigOverride {
        ConfigOverride::from_value(value).unwrap()
    }

    #[test]
    fn test_no_override_is_identity() {
        let platform = platform();
        let merged = merge_configs(platform.clone(), None).unwrap();
        assert!(Arc::ptr_eq(&platform, &merged));
    }

    #[test]
    fn test_override_replaces_entity_whole() {
        let merged = merge_configs(
            platform(),
            Some(&override_of(json!({
                "entities": [{
                    "entity_type": "CUSTOMER",
                    "display_name": "Client",
                    "fields": [{"field_name": "name", "label": "Name"}]
                }]
            }))),
        )
        .unwrap();

        let customer = merged.entity("CUSTOMER").unwrap();
        assert_eq!(customer.fields.len(), 1);
        assert_eq!(customer.display_name, "Client");
        // Untouched record passes through
        assert!(merged.entity("CONTACT").is_some());
    }

    #[test]
    fn test_upsert_key_ignores_case() {
        let merged = merge_configs(
            platform(),
            Some(&override_of(json!({
                "entities": [{
                    "entity_type": "customer",
                    "display_name": "Client",
                    "fields": [{"field_name": "company", "label": "Company"}]
                }]
            }))),
        )
        .unwrap();

        assert_eq!(merged.entities.len(), 2);
        assert_eq!(merged.entities[0].entity_type, "customer");
        assert_eq!(merged.entity("CUSTOMER").unwrap().fields.len(), 1);
        assert!(merged.validate().is_ok());
    }

    #[test]
    fn test_new_records_appended_after_platform_order() {
        let merged = merge_configs(
            platform(),
            Some(&override_of(json!({
                "entities": [
                    {"entity_type": "LEAD", "display_name": "Lead"},
                    {"entity_type": "CUSTOMER", "display_name": "Client"}
                ]
            }))),
        )
        .unwrap();

        let order: Vec<&str> = merged.entities.iter().map(|e| e.entity_type.as_str()).collect();
        assert_eq!(order, vec!["CUSTOMER", "CONTACT", "LEAD"]);
    }

    #[test]
    fn test_theme_shallow_merge() {
        let merged = merge_configs(
            platform(),
            Some(&override_of(json!({"ui_theme": {"mode": "dark"}}))),
        )
        .unwrap();

        let theme = merged.ui_theme.as_ref().unwrap();
        assert_eq!(theme.mode.as_deref(), Some("dark"));
        assert_eq!(theme.primary_color.as_deref(), Some("#000000"));
    }

    #[test]
    fn test_navigation_shallow_merge_keeps_absent_keys() {
        let merged = merge_configs(
            platform(),
            Some(&override_of(json!({
                "navigation": {"dashboards": [{"dashboard_id": "sales"}]}
            }))),
        )
        .unwrap();

        assert_eq!(merged.navigation.dashboards.len(), 1);
        assert_eq!(merged.navigation.extra["collapsed"], false);
    }

    #[test]
    fn test_other_keys_replace() {
        let merged = merge_configs(
            platform(),
            Some(&override_of(json!({"name": "Acme CRM", "reports": ["weekly"]}))),
        )
        .unwrap();

        assert_eq!(merged.name, "Acme CRM");
        assert_eq!(merged.extra["reports"], json!(["weekly"]));
        assert_eq!(merged.version, "1.0.0");
    }

    #[test]
    fn test_absent_keys_unchanged() {
        let platform = platform();
        let merged = merge_configs(
            platform.clone(),
            Some(&override_of(json!({"entities": [{"entity_type": "LEAD", "display_name": "Lead"}]}))),
        )
        .unwrap();

        let before = serde_json::to_value(platform.as_ref()).unwrap();
        let after = serde_json::to_value(merged.as_ref()).unwrap();
        for key in ["app_id", "name", "version", "screens", "navigation", "ui_theme", "reports"] {
            assert_eq!(before[key], after[key], "key {key} changed");
        }
    }

    #[test]
    fn test_remerge_is_idempotent() {
        let o = override_of(json!({
            "entities": [
                {"entity_type": "CUSTOMER", "display_name": "Client"},
                {"entity_type": "LEAD", "display_name": "Lead"}
            ],
            "screens": [{"screen_id": "leads", "screen_type": "list"}],
            "ui_theme": {"mode": "dark"}
        }));

        let once = merge_configs(platform(), Some(&o)).unwrap();
        let twice = merge_configs(once.clone(), Some(&o)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_list_key_must_be_array() {
        let result = merge_configs(platform(), Some(&override_of(json!({"entities": {"x": 1}}))));
        assert!(matches!(result, Err(MergeError::NotAList { .. })));
    }

    #[test]
    fn test_record_without_key_rejected() {
        let result = merge_configs(
            platform(),
            Some(&override_of(json!({"screens": [{"screen_type": "list"}]}))),
        );
        assert!(matches!(result, Err(MergeError::MissingRecordKey { .. })));
    }

    #[test]
    fn test_strategy_table() {
        assert_eq!(strategy_for("entities"), MergeStrategy::UpsertByKey("entity_type"));
        assert_eq!(strategy_for("ui_theme"), MergeStrategy::ShallowMerge);
        assert_eq!(strategy_for("name"), MergeStrategy::Replace);
    }

    #[test]
    fn test_deep_merge_layers() {
        let builtin = json!({"cache_ttl_minutes": 5, "store": {"root": "a", "capacity": 64}});
        let file = json!({"store": {"root": "b"}});
        let cli = json!({"cache_ttl_minutes": 10});

        let result = merge_layers(vec![builtin, file, cli]);

        assert_eq!(result["cache_ttl_minutes"], 10);
        assert_eq!(result["store"]["root"], "b");
        assert_eq!(result["store"]["capacity"], 64);
    }

    #[test]
    fn test_deep_merge_array_replace() {
        let result = deep_merge(json!({"levels": [1, 2, 3]}), json!({"levels": [9]}));
        assert_eq!(result["levels"], json!([9]));
    }
}
