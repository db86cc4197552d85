//! appcfg Store Client
//!
//! Defines the contract between the configuration engine and the persisted
//! store of app documents, plus two backends:
//! - `InMemoryStore`: maps behind a lock, with failure injection for tests
//! - `FileStore`: one JSON file per document under `<root>/<scope>/<TYPE>/<code>.json`
//!
//! Documents are addressed by `(scope, kind, entity_code)` where the entity
//! code is the app identifier. Every write emits a `ChangeEvent` that
//! subscribers can consume through a filtered `ChangeStream`.

pub mod change;
pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod scope;

pub use change::{ChangeBus, ChangeEvent, ChangeFilter, ChangeKind, ChangeStream};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use record::DocumentRecord;
pub use scope::{validate_entity_code, DocumentKind, Scope, PLATFORM_SCOPE_ID};

use async_trait::async_trait;

/// Default capacity of the change broadcast channel.
pub const DEFAULT_CHANGE_CAPACITY: usize = 64;

/// Read/write access to configuration documents.
///
/// Implementations must be safe to share across tasks. A read of a document
/// that does not exist is `Ok(None)`; `Err` is reserved for the store itself
/// being unreachable or broken.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read one document.
    async fn read(
        &self,
        scope: &Scope,
        kind: DocumentKind,
        entity_code: &str,
    ) -> StoreResult<Option<DocumentRecord>>;

    /// Insert or fully replace one document.
    async fn write(&self, record: DocumentRecord) -> StoreResult<()>;

    /// Delete one document. Returns whether anything was removed.
    async fn delete(&self, scope: &Scope, kind: DocumentKind, entity_code: &str)
        -> StoreResult<bool>;

    /// List entity codes stored under a scope for a document kind, sorted.
    async fn list_codes(&self, scope: &Scope, kind: DocumentKind) -> StoreResult<Vec<String>>;

    /// Open a stream of change events matching `filter`.
    fn subscribe_to_changes(&self, filter: ChangeFilter) -> ChangeStream;
}
