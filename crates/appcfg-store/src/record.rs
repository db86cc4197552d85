//! Stored document records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scope::{DocumentKind, Scope};

/// One stored configuration document.
///
/// The payload lives in a single JSON field whose name depends on the
/// document kind (`app_definition` or `app_override`). Other fields are
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub scope: Scope,

    #[serde(rename = "entity_type")]
    pub kind: DocumentKind,

    /// App identifier
    pub entity_code: String,

    /// Dynamic fields attached to the record
    #[serde(default)]
    pub fields: Map<String, Value>,

    pub updated_at: DateTime<Utc>,

    /// Actor that performed the last write (opaque)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl DocumentRecord {
    /// Create a record carrying `payload` in the kind's payload field.
    pub fn new(scope: Scope, kind: DocumentKind, entity_code: impl Into<String>, payload: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(kind.field_name().to_string(), payload);
        Self {
            scope,
            kind,
            entity_code: entity_code.into(),
            fields,
            updated_at: Utc::now(),
            updated_by: None,
        }
    }

    /// Set the writing actor.
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.updated_by = Some(actor_id.into());
        self
    }

    /// The document payload, if the expected field is present.
    pub fn payload(&self) -> Option<&Value> {
        self.fields.get(self.kind.field_name())
    }

    /// Take ownership of the payload.
    pub fn into_payload(mut self) -> Option<Value> {
        self.fields.remove(self.kind.field_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_uses_kind_field() {
        let record = DocumentRecord::new(
            Scope::Platform,
            DocumentKind::AppConfig,
            "retail",
            json!({"app_id": "retail"}),
        );
        assert!(record.fields.contains_key("app_definition"));
        assert_eq!(record.payload().unwrap()["app_id"], "retail");
    }

    #[test]
    fn test_missing_payload_field() {
        let mut record = DocumentRecord::new(
            Scope::Organization("acme".to_string()),
            DocumentKind::AppConfigOverride,
            "retail",
            json!({}),
        );
        record.fields.clear();
        record.fields.insert("something_else".to_string(), json!(1));
        assert!(record.payload().is_none());
        assert!(record.into_payload().is_none());
    }

    #[test]
    fn test_record_serializes_wire_names() {
        let record = DocumentRecord::new(
            Scope::Organization("acme".to_string()),
            DocumentKind::AppConfigOverride,
            "retail",
            json!({"ui_theme": {"mode": "dark"}}),
        )
        .with_actor("user-1");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["scope"], "acme");
        assert_eq!(value["entity_type"], "APP_CONFIG_OVERRIDE");
        assert_eq!(value["fields"]["app_override"]["ui_theme"]["mode"], "dark");
        assert_eq!(value["updated_by"], "user-1");
    }
}
