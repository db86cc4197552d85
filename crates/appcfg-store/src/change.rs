//! Change notification stream.
//!
//! Stores publish a `ChangeEvent` on every write or delete through a
//! `ChangeBus` (a tokio broadcast channel). Consumers open a `ChangeStream`
//! with a `ChangeFilter` and pull matching events with `next()`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::scope::{DocumentKind, Scope};

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Upserted,
    Deleted,
}

/// A document change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub scope: Scope,
    #[serde(rename = "entity_type")]
    pub kind: DocumentKind,
    pub entity_code: String,
    pub change: ChangeKind,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(scope: Scope, kind: DocumentKind, entity_code: impl Into<String>, change: ChangeKind) -> Self {
        Self {
            scope,
            kind,
            entity_code: entity_code.into(),
            change,
            occurred_at: Utc::now(),
        }
    }
}

/// Selects which change events a stream delivers.
///
/// Empty lists match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    pub entity_code: Option<String>,
    pub scopes: Vec<Scope>,
    pub kinds: Vec<DocumentKind>,
}

impl ChangeFilter {
    /// Filter matching every event.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter for one app across all scopes.
    pub fn for_app(entity_code: impl Into<String>) -> Self {
        Self {
            entity_code: Some(entity_code.into()),
            ..Default::default()
        }
    }

    /// Restrict to the given scopes.
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = Scope>) -> Self {
        self.scopes.extend(scopes);
        self
    }

    /// Restrict to the given document kinds.
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = DocumentKind>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(ref code) = self.entity_code {
            if code != &event.entity_code {
                return false;
            }
        }
        if !self.scopes.is_empty() && !self.scopes.contains(&event.scope) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        true
    }
}

/// Broadcast fan-out shared by store backends.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Having no listeners is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("No change subscribers to receive event");
        }
    }

    /// Open a filtered stream.
    pub fn subscribe(&self, filter: ChangeFilter) -> ChangeStream {
        ChangeStream {
            receiver: self.sender.subscribe(),
            filter,
        }
    }
}

/// A filtered receiver of change events.
#[derive(Debug)]
pub struct ChangeStream {
    receiver: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
}

impl ChangeStream {
    /// Wait for the next matching event. Returns `None` once the store side
    /// of the channel is gone.
    ///
    /// Events dropped because this receiver fell behind are skipped with a
    /// warning; the stream keeps delivering newer events.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change stream lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn filter(&self) -> &ChangeFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(scope: Scope, code: &str) -> ChangeEvent {
        ChangeEvent::new(scope, DocumentKind::AppConfig, code, ChangeKind::Upserted)
    }

    #[test]
    fn test_filter_matches_app_and_scope() {
        let filter = ChangeFilter::for_app("retail")
            .with_scopes([Scope::Platform, Scope::Organization("acme".to_string())]);

        assert!(filter.matches(&event(Scope::Platform, "retail")));
        assert!(filter.matches(&event(Scope::Organization("acme".to_string()), "retail")));
        assert!(!filter.matches(&event(Scope::Organization("other".to_string()), "retail")));
        assert!(!filter.matches(&event(Scope::Platform, "salon")));
    }

    #[test]
    fn test_filter_kinds() {
        let filter = ChangeFilter::all().with_kinds([DocumentKind::AppConfigOverride]);
        assert!(!filter.matches(&event(Scope::Platform, "retail")));
    }

    #[tokio::test]
    async fn test_stream_skips_non_matching_events() {
        let bus = ChangeBus::new(8);
        let mut stream = bus.subscribe(ChangeFilter::for_app("retail"));

        bus.publish(event(Scope::Platform, "salon"));
        bus.publish(event(Scope::Platform, "retail"));

        let received = stream.next().await.unwrap();
        assert_eq!(received.entity_code, "retail");
    }

    #[tokio::test]
    async fn test_stream_survives_lag() {
        let bus = ChangeBus::new(2);
        let mut stream = bus.subscribe(ChangeFilter::all());

        for i in 0..5 {
            bus.publish(event(Scope::Platform, &format!("app-{i}")));
        }

        let received = stream.next().await.unwrap();
        assert_eq!(received.entity_code, "app-3");
    }

    #[tokio::test]
    async fn test_stream_ends_when_bus_dropped() {
        let bus = ChangeBus::new(2);
        let mut stream = bus.subscribe(ChangeFilter::all());
        drop(bus);
        assert!(stream.next().await.is_none());
    }
}
