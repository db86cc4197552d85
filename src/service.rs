//! Service facade
//!
//! `AppConfigService` is the explicitly constructed entry point: it owns the
//! cache, the component registry and the change subscriber, and reaches the
//! store only through the injected `ConfigStore`.
//!
//! Load pipeline: cache → inheritance → merge → assemble → cache.

use std::fmt;
use std::sync::Arc;

use appcfg_store::{ConfigStore, DocumentKind, DocumentRecord, Scope};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheKey, CacheStats, RuntimeCache};
use crate::clock::{Clock, SystemClock};
use crate::components::{
    Component, ComponentLoader, ComponentMapping, ComponentRegistry, ComponentResolver,
    RegistryError, ResolutionContext, ResolvedComponent, RuntimeSource,
};
use crate::config::{
    merge_configs, InheritanceResolver, MergedConfig, Settings, DEFAULT_CACHE_TTL_MINUTES,
};
use crate::error::{ServiceError, ServiceResult};
use crate::model::{AppConfig, ConfigOverride};
use crate::runtime::{assemble, AssembleOptions, GeneratedRuntime};
use crate::subscriber::{ChangeCallback, ChangeSubscriber, RuntimeReloader, Subscription};

/// Actor recorded for loads issued by component resolution.
const RESOLVER_ACTOR: &str = "component-resolver";

/// Actor recorded for loads issued by change reloads.
const RELOAD_ACTOR: &str = "change-subscriber";

/// Options for `load_app_config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Read and populate the runtime cache
    pub include_cache: bool,

    /// TTL for a newly cached runtime; service default when `None`
    pub cache_ttl_minutes: Option<u32>,

    pub organization_id: Option<String>,

    /// Apply the organization override; `false` loads the platform layer only
    pub resolve_inheritance: bool,

    /// Attach permission requirements to routes
    pub include_permissions: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            include_cache: true,
            cache_ttl_minutes: None,
            organization_id: None,
            resolve_inheritance: true,
            include_permissions: true,
        }
    }
}

impl LoadOptions {
    pub fn for_organization(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: Some(organization_id.into()),
            ..Default::default()
        }
    }

    pub fn without_cache(mut self) -> Self {
        self.include_cache = false;
        self
    }

    pub fn with_cache_ttl(mut self, minutes: u32) -> Self {
        self.cache_ttl_minutes = Some(minutes);
        self
    }

    pub fn platform_only(mut self) -> Self {
        self.resolve_inheritance = false;
        self
    }

    pub fn without_permissions(mut self) -> Self {
        self.include_permissions = false;
        self
    }

    /// Organization whose override takes part in the load.
    fn effective_organization(&self) -> Option<&str> {
        if self.resolve_inheritance {
            self.organization_id.as_deref()
        } else {
            None
        }
    }
}

/// Result of `save_app_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveOutcome {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Shared state of the service; also the reload and runtime source for
/// subscriptions and component resolution.
struct ServiceCore {
    store: Arc<dyn ConfigStore>,
    inheritance: InheritanceResolver,
    clock: Arc<dyn Clock>,
    cache: RuntimeCache,
    default_ttl_minutes: u32,
}

impl ServiceCore {
    async fn load(
        &self,
        app_id: &str,
        actor_id: &str,
        options: &LoadOptions,
    ) -> ServiceResult<Arc<GeneratedRuntime>> {
        let organization_id = options.effective_organization();
        let key = CacheKey::new(app_id, organization_id);
        // Runtimes without permissions are never shared through the cache
        let cacheable = options.include_cache && options.include_permissions;

        if cacheable {
            if let Some(runtime) = self.cache.get(&key) {
                tracing::debug!(cache_key = %key, "Runtime cache hit");
                return Ok(runtime);
            }
        }

        let inheritance = self
            .inheritance
            .resolve(app_id, actor_id, organization_id)
            .await;
        let merged = MergedConfig::build(app_id, inheritance).map_err(|e| {
            tracing::warn!(app_id, organization_id, error = %e, "App configuration unavailable");
            ServiceError::from(e)
        })?;

        let runtime = Arc::new(assemble(
            &merged,
            organization_id,
            key.to_string(),
            self.clock.now(),
            AssembleOptions {
                include_permissions: options.include_permissions,
            },
        ));

        tracing::info!(
            cache_key = %key,
            routes = runtime.routes.len(),
            digest = %runtime.config_digest,
            "Runtime assembled"
        );

        if cacheable {
            let ttl = options.cache_ttl_minutes.unwrap_or(self.default_ttl_minutes);
            self.cache.set(key, runtime.clone(), ttl);
        }
        Ok(runtime)
    }

    async fn save(
        &self,
        app_id: &str,
        document: Value,
        actor_id: &str,
        organization_id: Option<&str>,
    ) -> ServiceResult<()> {
        let record = match organization_id {
            None => {
                let config: AppConfig = serde_json::from_value(document.clone())?;
                config.validate_for(app_id)?;
                DocumentRecord::new(Scope::Platform, DocumentKind::AppConfig, app_id, document)
            }
            Some(org) => {
                self.check_override(app_id, &document).await?;
                DocumentRecord::new(
                    Scope::Organization(org.to_string()),
                    DocumentKind::AppConfigOverride,
                    app_id,
                    document,
                )
            }
        }
        .with_actor(actor_id);

        self.store.write(record).await?;

        match organization_id {
            None => {
                let dropped = self.cache.invalidate_app(app_id);
                tracing::info!(app_id, actor_id, dropped, "Platform configuration saved");
            }
            Some(org) => {
                self.cache.invalidate(&CacheKey::new(app_id, Some(org)));
                tracing::info!(app_id, organization_id = org, actor_id, "Organization override saved");
            }
        }
        Ok(())
    }

    /// An override must be an object and, if the platform document exists,
    /// must merge into a valid config.
    async fn check_override(&self, app_id: &str, document: &Value) -> ServiceResult<()> {
        let overlay = ConfigOverride::from_value(document.clone()).ok_or_else(|| {
            ServiceError::InvalidOverride("override document must be a JSON object".to_string())
        })?;
        if let Some(found) = overlay.get("app_id") {
            if found.as_str() != Some(app_id) {
                return Err(ServiceError::InvalidOverride(format!(
                    "override app_id {} does not match '{}'",
                    found, app_id
                )));
            }
        }

        let platform = self
            .store
            .read(&Scope::Platform, DocumentKind::AppConfig, app_id)
            .await?
            .and_then(DocumentRecord::into_payload);
        if let Some(payload) = platform {
            let platform: AppConfig = serde_json::from_value(payload)?;
            merge_configs(Arc::new(platform), Some(&overlay))?.validate_for(app_id)?;
        }
        Ok(())
    }
}

#[async_trait]
impl RuntimeSource for ServiceCore {
    async fn runtime_for(
        &self,
        app_id: &str,
        organization_id: Option<&str>,
    ) -> ServiceResult<Arc<GeneratedRuntime>> {
        let options = LoadOptions {
            organization_id: organization_id.map(str::to_string),
            ..Default::default()
        };
        self.load(app_id, RESOLVER_ACTOR, &options).await
    }
}

#[async_trait]
impl RuntimeReloader for ServiceCore {
    async fn reload(
        &self,
        app_id: &str,
        organization_id: Option<&str>,
    ) -> ServiceResult<Arc<GeneratedRuntime>> {
        self.cache.invalidate(&CacheKey::new(app_id, organization_id));
        let options = LoadOptions {
            organization_id: organization_id.map(str::to_string),
            ..Default::default()
        };
        self.load(app_id, RELOAD_ACTOR, &options).await
    }
}

/// Multi-tenant app configuration engine.
pub struct AppConfigService {
    core: Arc<ServiceCore>,
    resolver: ComponentResolver,
    subscriber: ChangeSubscriber,
}

impl fmt::Debug for AppConfigService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfigService")
            .field("cache", &self.core.cache)
            .field("subscriber", &self.subscriber)
            .finish_non_exhaustive()
    }
}

impl AppConfigService {
    /// Service on the system clock with default cache TTL.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn ConfigStore>, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(
            store,
            clock,
            Arc::new(ComponentRegistry::new()),
            DEFAULT_CACHE_TTL_MINUTES,
        )
    }

    pub fn from_settings(store: Arc<dyn ConfigStore>, settings: &Settings) -> Self {
        Self::from_parts(
            store,
            Arc::new(SystemClock),
            Arc::new(ComponentRegistry::new()),
            settings.cache_ttl_minutes,
        )
    }

    pub fn from_parts(
        store: Arc<dyn ConfigStore>,
        clock: Arc<dyn Clock>,
        registry: Arc<ComponentRegistry>,
        default_ttl_minutes: u32,
    ) -> Self {
        let core = Arc::new(ServiceCore {
            inheritance: InheritanceResolver::new(store.clone()),
            cache: RuntimeCache::new(clock.clone()),
            store: store.clone(),
            clock,
            default_ttl_minutes,
        });
        Self {
            core,
            resolver: ComponentResolver::new(registry),
            subscriber: ChangeSubscriber::new(store),
        }
    }

    /// Effective runtime of an app for an organization (or the platform).
    ///
    /// Fails with `ServiceError::NotFound` when no platform document exists.
    pub async fn load_app_config(
        &self,
        app_id: &str,
        actor_id: &str,
        options: LoadOptions,
    ) -> ServiceResult<Arc<GeneratedRuntime>> {
        self.core.load(app_id, actor_id, &options).await
    }

    /// Sorted ids of every app with a platform document.
    ///
    /// A store failure yields an empty list.
    pub async fn list_available_apps(&self, actor_id: &str, organization_id: Option<&str>) -> Vec<String> {
        match self
            .core
            .store
            .list_codes(&Scope::Platform, DocumentKind::AppConfig)
            .await
        {
            Ok(mut apps) => {
                apps.sort();
                apps.dedup();
                apps
            }
            Err(e) => {
                tracing::warn!(actor_id, organization_id, error = %e, "Failed to list apps");
                Vec::new()
            }
        }
    }

    /// Store a platform document (`organization_id = None`) or an
    /// organization override, invalidating the affected cache entries.
    pub async fn save_app_config(
        &self,
        app_id: &str,
        document: Value,
        actor_id: &str,
        organization_id: Option<&str>,
    ) -> SaveOutcome {
        match self.core.save(app_id, document, actor_id, organization_id).await {
            Ok(()) => SaveOutcome::ok(),
            Err(e) => {
                tracing::warn!(app_id, organization_id, actor_id, error = %e, "Save rejected");
                SaveOutcome::failed(e)
            }
        }
    }

    /// Component that renders `ctx`. Never fails.
    pub async fn resolve_component(&self, ctx: &ResolutionContext) -> ResolvedComponent {
        self.resolver.resolve(ctx, self.core.as_ref()).await
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        self.resolver.registry()
    }

    pub fn register_custom_component(
        &self,
        mapping: ComponentMapping,
        component: Arc<dyn Component>,
    ) -> Result<String, RegistryError> {
        self.registry().register_custom(mapping, component)
    }

    pub fn register_lazy_component(
        &self,
        mapping: ComponentMapping,
        loader: Arc<dyn ComponentLoader>,
    ) -> Result<String, RegistryError> {
        self.registry().register_lazy(mapping, loader)
    }

    pub fn unregister_component(&self, name: &str, organization_id: Option<&str>) -> bool {
        self.registry().unregister(name, organization_id)
    }

    pub fn clear_organization_components(&self, organization_id: &str) -> usize {
        self.registry().clear_organization_components(organization_id)
    }

    /// Reload on every change affecting the pair and pass the new runtime
    /// to `on_change`. Replaces an existing subscription for the pair.
    pub fn subscribe(
        &self,
        app_id: &str,
        organization_id: Option<&str>,
        on_change: ChangeCallback,
    ) -> Subscription {
        self.subscriber
            .subscribe(app_id, organization_id, self.core.clone(), on_change)
    }

    pub fn unsubscribe(&self, app_id: &str, organization_id: Option<&str>) -> bool {
        self.subscriber.unsubscribe(app_id, organization_id)
    }

    pub fn active_subscriptions(&self) -> Vec<CacheKey> {
        self.subscriber.active_subscriptions()
    }

    pub fn invalidate_cache(&self, app_id: &str, organization_id: Option<&str>) -> bool {
        self.core.cache.invalidate(&CacheKey::new(app_id, organization_id))
    }

    pub fn clear_cache(&self) {
        self.core.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.core.cache.stats()
    }
}
