//! Configuration inheritance loading
//!
//! Loads the two layers of an app's configuration from the store:
//! 1. Platform document (`APP_CONFIG` in the platform scope)
//! 2. Organization override (`APP_CONFIG_OVERRIDE` in the organization's scope)
//!
//! Both loads are attempted independently. A store failure on either layer
//! is logged and the layer is recorded as absent; whether a missing platform
//! layer is fatal is decided by the caller.

use std::sync::Arc;

use appcfg_store::{ConfigStore, DocumentKind, Scope};
use serde::{Deserialize, Serialize};

use crate::model::{AppConfig, ConfigOverride};

/// Configuration layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Platform,
    Organization,
}

/// Layers found for one (app, organization) pair.
#[derive(Debug, Clone, Default)]
pub struct ConfigInheritance {
    /// `None` means the platform document was not found (or unreadable).
    pub platform_config: Option<Arc<AppConfig>>,

    /// `None` when no organization was requested or none was found.
    pub org_override: Option<ConfigOverride>,

    /// Layers actually present, in precedence order. Empty when the
    /// platform layer is missing, even if an override was loaded.
    pub inheritance_chain: Vec<ConfigOrigin>,
}

impl ConfigInheritance {
    pub fn has_platform(&self) -> bool {
        self.platform_config.is_some()
    }
}

/// Loads configuration layers from a store.
#[derive(Clone)]
pub struct InheritanceResolver {
    store: Arc<dyn ConfigStore>,
}

impl std::fmt::Debug for InheritanceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InheritanceResolver").finish_non_exhaustive()
    }
}

impl InheritanceResolver {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Load the platform layer and, if `organization_id` is given, the
    /// organization layer.
    pub async fn resolve(
        &self,
        app_id: &str,
        actor_id: &str,
        organization_id: Option<&str>,
    ) -> ConfigInheritance {
        let platform = self.load_platform(app_id, actor_id);
        let org_override = async {
            match organization_id {
                Some(org) => self.load_override(app_id, actor_id, org).await,
                None => None,
            }
        };
        let (platform_config, org_override) = tokio::join!(platform, org_override);

        // An override is only a layer when there is a platform layer under it.
        let mut inheritance_chain = Vec::new();
        if platform_config.is_some() {
            inheritance_chain.push(ConfigOrigin::Platform);
            if org_override.is_some() {
                inheritance_chain.push(ConfigOrigin::Organization);
            }
        }

        tracing::debug!(
            app_id,
            organization_id,
            chain = ?inheritance_chain,
            "Resolved configuration inheritance"
        );

        ConfigInheritance {
            platform_config,
            org_override,
            inheritance_chain,
        }
    }

    async fn load_platform(&self, app_id: &str, actor_id: &str) -> Option<Arc<AppConfig>> {
        let record = match self
            .store
            .read(&Scope::Platform, DocumentKind::AppConfig, app_id)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(app_id, "No platform configuration stored");
                return None;
            }
            Err(e) => {
                tracing::warn!(app_id, actor_id, error = %e, "Platform configuration unavailable");
                return None;
            }
        };

        let Some(payload) = record.into_payload() else {
            tracing::warn!(
                app_id,
                field = DocumentKind::AppConfig.field_name(),
                "Platform record has no app definition field"
            );
            return None;
        };

        match serde_json::from_value::<AppConfig>(payload) {
            Ok(config) => Some(Arc::new(config)),
            Err(e) => {
                tracing::error!(app_id, error = %e, "Platform app definition is malformed");
                None
            }
        }
    }

    async fn load_override(
        &self,
        app_id: &str,
        actor_id: &str,
        organization_id: &str,
    ) -> Option<ConfigOverride> {
        let scope = Scope::Organization(organization_id.to_string());
        let record = match self
            .store
            .read(&scope, DocumentKind::AppConfigOverride, app_id)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    app_id,
                    organization_id,
                    actor_id,
                    error = %e,
                    "Organization override unavailable, using platform layer only"
                );
                return None;
            }
        };

        let override_doc = record.into_payload().and_then(ConfigOverride::from_value);
        if override_doc.is_none() {
            tracing::warn!(
                app_id,
                organization_id,
                field = DocumentKind::AppConfigOverride.field_name(),
                "Override record lacks a valid override document, ignoring"
            );
        }
        override_doc
    }
}
