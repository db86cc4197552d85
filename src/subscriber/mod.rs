//! Change subscriber
//!
//! Keeps one listener task per (app, organization) pair. On a matching
//! store change the task asks its `RuntimeReloader` to invalidate and
//! reassemble the runtime, then hands the result to the callback.
//!
//! A platform-scope change reaches every subscription of the app; an
//! organization-scope change reaches only that organization's subscription.
//! Reload failures are logged and the listener keeps running. A listener
//! whose change stream closes cancels its own subscription.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use appcfg_store::{ChangeFilter, ConfigStore, Scope};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::CacheKey;
use crate::error::ServiceError;
use crate::runtime::GeneratedRuntime;

/// Rebuilds a runtime after its inputs changed.
#[async_trait]
pub trait RuntimeReloader: Send + Sync {
    /// Invalidate the cached runtime for the pair and assemble a fresh one.
    async fn reload(
        &self,
        app_id: &str,
        organization_id: Option<&str>,
    ) -> Result<Arc<GeneratedRuntime>, ServiceError>;
}

/// Receives each reloaded runtime.
pub type ChangeCallback = Arc<dyn Fn(Arc<GeneratedRuntime>) + Send + Sync>;

/// Handle to an active subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: Uuid,
    key: CacheKey,
    token: CancellationToken,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Stop the listener. Idempotent.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Owns the listener tasks.
pub struct ChangeSubscriber {
    store: Arc<dyn ConfigStore>,
    active: Mutex<HashMap<CacheKey, Subscription>>,
}

impl fmt::Debug for ChangeSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSubscriber")
            .field("active", &self.active.lock().len())
            .finish()
    }
}

impl ChangeSubscriber {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Listen for changes to `app_id` as seen by `organization_id`.
    ///
    /// Replaces any existing subscription for the same pair. Must be called
    /// from within a tokio runtime.
    pub fn subscribe(
        &self,
        app_id: &str,
        organization_id: Option<&str>,
        reloader: Arc<dyn RuntimeReloader>,
        on_change: ChangeCallback,
    ) -> Subscription {
        let key = CacheKey::new(app_id, organization_id);
        let mut scopes = vec![Scope::Platform];
        if let Some(org) = organization_id {
            scopes.push(Scope::Organization(org.to_string()));
        }
        let mut stream = self
            .store
            .subscribe_to_changes(ChangeFilter::for_app(app_id).with_scopes(scopes));

        let subscription = Subscription {
            id: Uuid::new_v4(),
            key: key.clone(),
            token: CancellationToken::new(),
        };

        if let Some(previous) = self.active.lock().insert(key.clone(), subscription.clone()) {
            tracing::debug!(cache_key = %key, subscription_id = %previous.id, "Replacing subscription");
            previous.close();
        }

        let token = subscription.token.clone();
        let id = subscription.id;
        tokio::spawn(async move {
            tracing::debug!(cache_key = %key, subscription_id = %id, "Change listener started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = stream.next() => {
                        let Some(event) = event else {
                            tracing::warn!(cache_key = %key, subscription_id = %id, "Change stream closed");
                            token.cancel();
                            break;
                        };
                        tracing::info!(
                            cache_key = %key,
                            scope = %event.scope,
                            change = ?event.change,
                            "Configuration changed, reloading"
                        );
                        match reloader.reload(key.app_id(), key.organization_id()).await {
                            Ok(runtime) => on_change(runtime),
                            Err(e) => {
                                tracing::error!(cache_key = %key, error = %e, "Reload after change failed");
                            }
                        }
                    }
                }
            }
            tracing::debug!(cache_key = %key, subscription_id = %id, "Change listener stopped");
        });

        subscription
    }

    /// Close the subscription for a pair, if any.
    pub fn unsubscribe(&self, app_id: &str, organization_id: Option<&str>) -> bool {
        match self.active.lock().remove(&CacheKey::new(app_id, organization_id)) {
            Some(subscription) => {
                subscription.close();
                true
            }
            None => false,
        }
    }

    /// Keys with a live subscription, sorted.
    pub fn active_subscriptions(&self) -> Vec<CacheKey> {
        let mut active = self.active.lock();
        active.retain(|_, s| !s.is_closed());
        let mut keys: Vec<CacheKey> = active.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Close every subscription.
    pub fn close_all(&self) {
        for (_, subscription) in self.active.lock().drain() {
            subscription.close();
        }
    }
}

impl Drop for ChangeSubscriber {
    fn drop(&mut self) {
        self.close_all();
    }
}
