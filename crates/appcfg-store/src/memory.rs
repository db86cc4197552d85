//! In-memory store backend.
//!
//! Holds documents in a map behind a lock and publishes change events on a
//! broadcast bus. Supports failure injection so callers can exercise the
//! "store unreachable" paths without a real backend.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::change::{ChangeBus, ChangeEvent, ChangeFilter, ChangeKind, ChangeStream};
use crate::error::{StoreError, StoreResult};
use crate::record::DocumentRecord;
use crate::scope::{validate_entity_code, DocumentKind, Scope};
use crate::{ConfigStore, DEFAULT_CHANGE_CAPACITY};

type DocumentKey = (Scope, DocumentKind, String);

/// Where an injected failure applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FailureTarget {
    All,
    Layer(Scope, DocumentKind),
}

/// Map-backed `ConfigStore`.
#[derive(Debug)]
pub struct InMemoryStore {
    documents: RwLock<BTreeMap<DocumentKey, DocumentRecord>>,
    failures: RwLock<HashSet<FailureTarget>>,
    bus: ChangeBus,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_CAPACITY)
    }

    /// Create with a specific change channel capacity.
    pub fn with_capacity(change_capacity: usize) -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            failures: RwLock::new(HashSet::new()),
            bus: ChangeBus::new(change_capacity),
        }
    }

    /// Make every call fail with `StoreError::Unavailable`.
    pub fn inject_outage(&self) {
        self.failures.write().insert(FailureTarget::All);
    }

    /// Make calls for one (scope, kind) layer fail.
    pub fn inject_failure(&self, scope: Scope, kind: DocumentKind) {
        self.failures.write().insert(FailureTarget::Layer(scope, kind));
    }

    /// Remove all injected failures.
    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Emit a change event without touching stored data.
    pub fn emit(&self, event: ChangeEvent) {
        self.bus.publish(event);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn check_failure(&self, scope: &Scope, kind: DocumentKind) -> StoreResult<()> {
        let failures = self.failures.read();
        if failures.contains(&FailureTarget::All)
            || failures.contains(&FailureTarget::Layer(scope.clone(), kind))
        {
            return Err(StoreError::Unavailable(format!(
                "injected failure for {}/{}",
                scope, kind
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn read(
        &self,
        scope: &Scope,
        kind: DocumentKind,
        entity_code: &str,
    ) -> StoreResult<Option<DocumentRecord>> {
        self.check_failure(scope, kind)?;
        let key = (scope.clone(), kind, entity_code.to_string());
        Ok(self.documents.read().get(&key).cloned())
    }

    async fn write(&self, record: DocumentRecord) -> StoreResult<()> {
        self.check_failure(&record.scope, record.kind)?;
        validate_entity_code(&record.entity_code)?;

        let event = ChangeEvent::new(
            record.scope.clone(),
            record.kind,
            record.entity_code.clone(),
            ChangeKind::Upserted,
        );
        let key = (record.scope.clone(), record.kind, record.entity_code.clone());
        self.documents.write().insert(key, record);
        self.bus.publish(event);
        Ok(())
    }

    async fn delete(
        &self,
        scope: &Scope,
        kind: DocumentKind,
        entity_code: &str,
    ) -> StoreResult<bool> {
        self.check_failure(scope, kind)?;
        let key = (scope.clone(), kind, entity_code.to_string());
        let removed = self.documents.write().remove(&key).is_some();
        if removed {
            self.bus.publish(ChangeEvent::new(
                scope.clone(),
                kind,
                entity_code,
                ChangeKind::Deleted,
            ));
        }
        Ok(removed)
    }

    async fn list_codes(&self, scope: &Scope, kind: DocumentKind) -> StoreResult<Vec<String>> {
        self.check_failure(scope, kind)?;
        let documents = self.documents.read();
        Ok(documents
            .keys()
            .filter(|(s, k, _)| s == scope && *k == kind)
            .map(|(_, _, code)| code.clone())
            .collect())
    }

    fn subscribe_to_changes(&self, filter: ChangeFilter) -> ChangeStream {
        self.bus.subscribe(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn platform_record(code: &str) -> DocumentRecord {
        DocumentRecord::new(
            Scope::Platform,
            DocumentKind::AppConfig,
            code,
            json!({"app_id": code}),
        )
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = InMemoryStore::new();
        store.write(platform_record("retail")).await.unwrap();

        let record = store
            .read(&Scope::Platform, DocumentKind::AppConfig, "retail")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.payload().unwrap()["app_id"], "retail");

        let missing = store
            .read(&Scope::Platform, DocumentKind::AppConfig, "salon")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_codes_sorted_and_scoped() {
        let store = InMemoryStore::new();
        store.write(platform_record("salon")).await.unwrap();
        store.write(platform_record("retail")).await.unwrap();
        store
            .write(DocumentRecord::new(
                Scope::Organization("acme".to_string()),
                DocumentKind::AppConfigOverride,
                "crm",
                json!({}),
            ))
            .await
            .unwrap();

        let codes = store
            .list_codes(&Scope::Platform, DocumentKind::AppConfig)
            .await
            .unwrap();
        assert_eq!(codes, vec!["retail", "salon"]);
    }

    #[tokio::test]
    async fn test_injected_layer_failure() {
        let store = InMemoryStore::new();
        store.write(platform_record("retail")).await.unwrap();
        store.inject_failure(Scope::Platform, DocumentKind::AppConfig);

        let result = store
            .read(&Scope::Platform, DocumentKind::AppConfig, "retail")
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        let other = store
            .read(
                &Scope::Organization("acme".to_string()),
                DocumentKind::AppConfigOverride,
                "retail",
            )
            .await;
        assert!(other.is_ok());

        store.clear_failures();
        assert!(store
            .read(&Scope::Platform, DocumentKind::AppConfig, "retail")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_write_publishes_change() {
        let store = InMemoryStore::new();
        let mut stream = store.subscribe_to_changes(ChangeFilter::for_app("retail"));

        store.write(platform_record("retail")).await.unwrap();

        let event = stream.next().await.unwrap();
        assert_eq!(event.change, ChangeKind::Upserted);
        assert_eq!(event.scope, Scope::Platform);
    }

    #[tokio::test]
    async fn test_delete_publishes_only_when_removed() {
        let store = InMemoryStore::new();
        store.write(platform_record("retail")).await.unwrap();
        let mut stream = store.subscribe_to_changes(ChangeFilter::all());

        assert!(!store
            .delete(&Scope::Platform, DocumentKind::AppConfig, "salon")
            .await
            .unwrap());
        assert!(store
            .delete(&Scope::Platform, DocumentKind::AppConfig, "retail")
            .await
            .unwrap());

        let event = stream.next().await.unwrap();
        assert_eq!(event.entity_code, "retail");
        assert_eq!(event.change, ChangeKind::Deleted);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_write_rejects_invalid_code() {
        let store = InMemoryStore::new();
        let result = store.write(platform_record("../escape")).await;
        assert!(matches!(result, Err(StoreError::InvalidCode { .. })));
    }
}
