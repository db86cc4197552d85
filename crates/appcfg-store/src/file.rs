//! Directory-backed store backend.
//!
//! Layout: `<root>/<scope>/<ENTITY_TYPE>/<entity_code>.json`, one pretty
//! printed `DocumentRecord` per file. Writes go to a temporary sibling and
//! are renamed into place. Writes made through this instance emit change
//! events directly; writes by other processes surface through
//! `scan_changes`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::change::{ChangeBus, ChangeEvent, ChangeFilter, ChangeKind, ChangeStream};
use crate::error::StoreResult;
use crate::record::DocumentRecord;
use crate::scope::{validate_entity_code, DocumentKind, Scope};
use crate::{ConfigStore, DEFAULT_CHANGE_CAPACITY};

const DOCUMENT_EXTENSION: &str = "json";

type DocumentKey = (Scope, DocumentKind, String);

/// Modification time and length of a document file.
type Fingerprint = (SystemTime, u64);

/// File-per-document `ConfigStore`.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    bus: ChangeBus,
    /// Last scanned state; `None` until the first `scan_changes`
    snapshot: Mutex<Option<HashMap<DocumentKey, Fingerprint>>>,
}

impl FileStore {
    /// Open a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_capacity(root, DEFAULT_CHANGE_CAPACITY)
    }

    pub fn with_capacity(root: impl Into<PathBuf>, change_capacity: usize) -> Self {
        Self {
            root: root.into(),
            bus: ChangeBus::new(change_capacity),
            snapshot: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Compare the directory against the previous scan and publish a change
    /// event for every document added, modified or removed since.
    ///
    /// The first call only records a baseline. Returns the number of events
    /// published.
    pub fn scan_changes(&self) -> StoreResult<usize> {
        let current = self.fingerprints()?;
        let mut snapshot = self.snapshot.lock();

        let Some(previous) = snapshot.as_ref() else {
            tracing::debug!(documents = current.len(), root = %self.root.display(), "Store baseline recorded");
            *snapshot = Some(current);
            return Ok(0);
        };

        let mut events = Vec::new();
        for (key, fingerprint) in &current {
            if previous.get(key) != Some(fingerprint) {
                events.push((key.clone(), ChangeKind::Upserted));
            }
        }
        for key in previous.keys() {
            if !current.contains_key(key) {
                events.push((key.clone(), ChangeKind::Deleted));
            }
        }
        *snapshot = Some(current);
        drop(snapshot);

        let published = events.len();
        for ((scope, kind, code), change) in events {
            tracing::debug!(%scope, entity_type = %kind, entity_code = %code, ?change, "External change detected");
            self.bus.publish(ChangeEvent::new(scope, kind, code, change));
        }
        Ok(published)
    }

    fn fingerprints(&self) -> StoreResult<HashMap<DocumentKey, Fingerprint>> {
        let mut found = HashMap::new();
        if !self.root.exists() {
            return Ok(found);
        }

        for entry in WalkDir::new(&self.root).min_depth(3).max_depth(3) {
            let entry = entry.map_err(|e| {
                io::Error::new(io::ErrorKind::Other, format!("failed to scan {}: {}", self.root.display(), e))
            })?;
            if let Some(key) = self.key_for(entry.path()) {
                let metadata = entry.metadata().map_err(|e| {
                    io::Error::new(io::ErrorKind::Other, format!("failed to stat {}: {}", entry.path().display(), e))
                })?;
                found.insert(key, (metadata.modified()?, metadata.len()));
            }
        }
        Ok(found)
    }

    /// Document address of a path under the root, if it is a document file.
    fn key_for(&self, path: &Path) -> Option<DocumentKey> {
        if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
            return None;
        }
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut parts = relative.iter().filter_map(|p| p.to_str());
        let scope = parts.next()?;
        let kind = DocumentKind::parse(parts.next()?)?;
        let code = path.file_stem()?.to_str()?;
        validate_entity_code(code).ok()?;
        Some((Scope::from(scope.to_string()), kind, code.to_string()))
    }

    /// Keep the snapshot in step with this instance's own writes so a later
    /// scan does not report them again.
    fn record_own_change(&self, path: &Path, key: DocumentKey) {
        let mut snapshot = self.snapshot.lock();
        let Some(entries) = snapshot.as_mut() else {
            return;
        };
        match std::fs::metadata(path).and_then(|m| Ok((m.modified()?, m.len()))) {
            Ok(fingerprint) => {
                entries.insert(key, fingerprint);
            }
            Err(_) => {
                entries.remove(&key);
            }
        }
    }

    fn kind_dir(&self, scope: &Scope, kind: DocumentKind) -> StoreResult<PathBuf> {
        validate_entity_code(scope.as_str())?;
        Ok(self.root.join(scope.as_str()).join(kind.as_str()))
    }

    fn document_path(&self, scope: &Scope, kind: DocumentKind, entity_code: &str) -> StoreResult<PathBuf> {
        validate_entity_code(entity_code)?;
        Ok(self
            .kind_dir(scope, kind)?
            .join(format!("{}.{}", entity_code, DOCUMENT_EXTENSION)))
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn read(
        &self,
        scope: &Scope,
        kind: DocumentKind,
        entity_code: &str,
    ) -> StoreResult<Option<DocumentRecord>> {
        let path = self.document_path(scope, kind, entity_code)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: DocumentRecord = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    async fn write(&self, record: DocumentRecord) -> StoreResult<()> {
        let path = self.document_path(&record.scope, record.kind, &record.entity_code)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&record)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        tracing::debug!(
            scope = %record.scope,
            entity_type = %record.kind,
            entity_code = %record.entity_code,
            path = %path.display(),
            "Document written"
        );

        self.record_own_change(
            &path,
            (record.scope.clone(), record.kind, record.entity_code.clone()),
        );
        self.bus.publish(ChangeEvent::new(
            record.scope,
            record.kind,
            record.entity_code,
            ChangeKind::Upserted,
        ));
        Ok(())
    }

    async fn delete(
        &self,
        scope: &Scope,
        kind: DocumentKind,
        entity_code: &str,
    ) -> StoreResult<bool> {
        let path = self.document_path(scope, kind, entity_code)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.record_own_change(&path, (scope.clone(), kind, entity_code.to_string()));
                self.bus.publish(ChangeEvent::new(
                    scope.clone(),
                    kind,
                    entity_code,
                    ChangeKind::Deleted,
                ));
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_codes(&self, scope: &Scope, kind: DocumentKind) -> StoreResult<Vec<String>> {
        let dir = self.kind_dir(scope, kind)?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut codes = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                io::Error::new(io::ErrorKind::Other, format!("failed to list {}: {}", dir.display(), e))
            })?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                codes.push(stem.to_string());
            }
        }
        codes.sort();
        Ok(codes)
    }

    fn subscribe_to_changes(&self, filter: ChangeFilter) -> ChangeStream {
        self.bus.subscribe(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_layout() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());

        let record = DocumentRecord::new(
            Scope::Organization("acme".to_string()),
            DocumentKind::AppConfigOverride,
            "retail",
            json!({"ui_theme": {"mode": "dark"}}),
        );
        store.write(record.clone()).await.unwrap();

        let expected = temp
            .path()
            .join("acme")
            .join("APP_CONFIG_OVERRIDE")
            .join("retail.json");
        assert!(expected.exists());

        let read = store
            .read(
                &Scope::Organization("acme".to_string()),
                DocumentKind::AppConfigOverride,
                "retail",
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read, record);
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let result = store
            .read(&Scope::Platform, DocumentKind::AppConfig, "retail")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_document_is_error() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("platform").join("APP_CONFIG");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("retail.json"), "{not json").unwrap();

        let store = FileStore::new(temp.path());
        let result = store
            .read(&Scope::Platform, DocumentKind::AppConfig, "retail")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_codes_ignores_other_files() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        for code in ["salon", "retail"] {
            store
                .write(DocumentRecord::new(
                    Scope::Platform,
                    DocumentKind::AppConfig,
                    code,
                    json!({"app_id": code}),
                ))
                .await
                .unwrap();
        }
        let dir = temp.path().join("platform").join("APP_CONFIG");
        std::fs::write(dir.join("README.txt"), "notes").unwrap();

        let codes = store
            .list_codes(&Scope::Platform, DocumentKind::AppConfig)
            .await
            .unwrap();
        assert_eq!(codes, vec!["retail", "salon"]);

        let empty = store
            .list_codes(&Scope::Organization("acme".to_string()), DocumentKind::AppConfigOverride)
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_events() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let mut stream = store.subscribe_to_changes(ChangeFilter::for_app("retail"));

        store
            .write(DocumentRecord::new(
                Scope::Platform,
                DocumentKind::AppConfig,
                "retail",
                json!({}),
            ))
            .await
            .unwrap();
        assert!(store
            .delete(&Scope::Platform, DocumentKind::AppConfig, "retail")
            .await
            .unwrap());

        assert_eq!(stream.next().await.unwrap().change, ChangeKind::Upserted);
        assert_eq!(stream.next().await.unwrap().change, ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn test_scan_detects_external_changes() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let writer = FileStore::new(temp.path());
        let mut stream = store.subscribe_to_changes(ChangeFilter::all());

        assert_eq!(store.scan_changes().unwrap(), 0);

        writer
            .write(DocumentRecord::new(
                Scope::Organization("acme".to_string()),
                DocumentKind::AppConfigOverride,
                "retail",
                json!({"ui_theme": {"mode": "dark"}}),
            ))
            .await
            .unwrap();
        assert_eq!(store.scan_changes().unwrap(), 1);
        let event = stream.next().await.unwrap();
        assert_eq!(event.scope, Scope::Organization("acme".to_string()));
        assert_eq!(event.kind, DocumentKind::AppConfigOverride);
        assert_eq!(event.change, ChangeKind::Upserted);

        // Nothing new
        assert_eq!(store.scan_changes().unwrap(), 0);

        writer
            .delete(
                &Scope::Organization("acme".to_string()),
                DocumentKind::AppConfigOverride,
                "retail",
            )
            .await
            .unwrap();
        assert_eq!(store.scan_changes().unwrap(), 1);
        assert_eq!(stream.next().await.unwrap().change, ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn test_scan_skips_own_writes() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        store.scan_changes().unwrap();

        store
            .write(DocumentRecord::new(
                Scope::Platform,
                DocumentKind::AppConfig,
                "retail",
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(store.scan_changes().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let temp = TempDir::new().unwrap();
        let store = FileStore::new(temp.path());
        let result = store
            .read(&Scope::Platform, DocumentKind::AppConfig, "../../etc/passwd")
            .await;
        assert!(result.is_err());
    }
}
