//! Component resolution chain
//!
//! Strategies run in a fixed order and the first hit wins:
//! 1. `app_specific`: screen binding or type metadata of the app's runtime
//! 2. `organization_custom`: `{org}:{type}:{operation}` in the custom tier
//! 3. `type_specific`: `{type}_{PageComponent}` in any tier
//! 4. `fallback`: fixed table by target kind and operation
//!
//! A strategy error aborts the chain and yields the master-data component
//! (`ultimate_fallback`). Errors never reach the caller.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::context::ResolutionContext;
use super::names::{self, context_target, fallback_component, fallback_key, page_component};
use super::registry::{Component, ComponentHandle, ComponentRegistry, RegistryError};
use crate::error::ServiceError;
use crate::model::naming::record_key;
use crate::runtime::GeneratedRuntime;

/// Strategies of the chain, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    AppSpecific,
    OrganizationCustom,
    TypeSpecific,
    Fallback,
    UltimateFallback,
}

impl ResolutionStrategy {
    /// Strategies tried before the ultimate fallback.
    pub const CHAIN: [ResolutionStrategy; 4] = [
        ResolutionStrategy::AppSpecific,
        ResolutionStrategy::OrganizationCustom,
        ResolutionStrategy::TypeSpecific,
        ResolutionStrategy::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppSpecific => "app_specific",
            Self::OrganizationCustom => "organization_custom",
            Self::TypeSpecific => "type_specific",
            Self::Fallback => "fallback",
            Self::UltimateFallback => "ultimate_fallback",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised inside a strategy.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("runtime unavailable: {0}")]
    Runtime(#[from] ServiceError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to encode component config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("component '{0}' is not registered")]
    Unregistered(String),
}

/// Outcome of a resolution.
#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    pub component: Arc<dyn Component>,

    /// Name the component was resolved under
    pub name: String,

    /// Per-resolution payload (screen config or type metadata)
    pub config: Option<Value>,

    pub fallback_used: bool,

    /// Strategies attempted, ending with the one that produced this result
    pub resolution_path: Vec<ResolutionStrategy>,
}

/// Serializable summary of a `ResolvedComponent`.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport<'a> {
    pub component: &'a str,
    pub name: &'a str,
    pub fallback_used: bool,
    pub resolution_path: &'a [ResolutionStrategy],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<&'a Value>,
}

impl ResolvedComponent {
    pub fn report(&self) -> ResolutionReport<'_> {
        ResolutionReport {
            component: self.component.name(),
            name: &self.name,
            fallback_used: self.fallback_used,
            resolution_path: &self.resolution_path,
            config: self.config.as_ref(),
        }
    }

    pub fn path_names(&self) -> Vec<&'static str> {
        self.resolution_path.iter().map(|s| s.as_str()).collect()
    }
}

/// Source of assembled runtimes for the app-specific strategy.
#[async_trait]
pub trait RuntimeSource: Send + Sync {
    async fn runtime_for(
        &self,
        app_id: &str,
        organization_id: Option<&str>,
    ) -> Result<Arc<GeneratedRuntime>, ServiceError>;
}

/// A strategy hit before `fallback_used` and the path are attached.
struct Candidate {
    component: Arc<dyn Component>,
    name: String,
    config: Option<Value>,
}

/// Walks the strategy chain against a registry and a runtime source.
#[derive(Debug, Clone)]
pub struct ComponentResolver {
    registry: Arc<ComponentRegistry>,
}

impl ComponentResolver {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Resolve the component for `ctx`. Never fails.
    pub async fn resolve(&self, ctx: &ResolutionContext, runtimes: &dyn RuntimeSource) -> ResolvedComponent {
        let mut path = Vec::with_capacity(ResolutionStrategy::CHAIN.len() + 1);

        for strategy in ResolutionStrategy::CHAIN {
            path.push(strategy);
            match self.run(strategy, ctx, runtimes).await {
                Ok(Some(candidate)) => {
                    tracing::debug!(
                        app_id = %ctx.app_id,
                        organization_id = %ctx.organization_id,
                        %strategy,
                        component = %candidate.name,
                        "Component resolved"
                    );
                    return ResolvedComponent {
                        component: candidate.component,
                        name: candidate.name,
                        config: candidate.config,
                        fallback_used: strategy != ResolutionStrategy::AppSpecific,
                        resolution_path: path,
                    };
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(
                        app_id = %ctx.app_id,
                        organization_id = %ctx.organization_id,
                        %strategy,
                        error = %e,
                        "Resolution strategy failed, using master data component"
                    );
                    break;
                }
            }
        }

        path.push(ResolutionStrategy::UltimateFallback);
        ResolvedComponent {
            component: self.registry.master_data(),
            name: names::MASTER_DATA.to_string(),
            config: None,
            fallback_used: true,
            resolution_path: path,
        }
    }

    async fn run(
        &self,
        strategy: ResolutionStrategy,
        ctx: &ResolutionContext,
        runtimes: &dyn RuntimeSource,
    ) -> Result<Option<Candidate>, ResolutionError> {
        match strategy {
            ResolutionStrategy::AppSpecific => self.app_specific(ctx, runtimes).await,
            ResolutionStrategy::OrganizationCustom => Ok(self.organization_custom(ctx)),
            ResolutionStrategy::TypeSpecific => self.type_specific(ctx).await,
            ResolutionStrategy::Fallback => self.fallback(ctx).await.map(Some),
            ResolutionStrategy::UltimateFallback => Ok(None),
        }
    }

    async fn app_specific(
        &self,
        ctx: &ResolutionContext,
        runtimes: &dyn RuntimeSource,
    ) -> Result<Option<Candidate>, ResolutionError> {
        let runtime = runtimes
            .runtime_for(&ctx.app_id, Some(&ctx.organization_id))
            .await?;

        if let Some(screen_type) = ctx.screen_type.as_deref() {
            let bound = runtime.screens.iter().find(|screen| {
                screen.screen_type.eq_ignore_ascii_case(screen_type)
                    && compatible(screen.entity_type.as_deref(), ctx.entity_type.as_deref())
                    && compatible(screen.transaction_type.as_deref(), ctx.transaction_type.as_deref())
            });
            if let Some(screen) = bound {
                if let Some(name) = screen.component.as_deref() {
                    if let Some(handle) = self.registry.lookup(name, ctx) {
                        let config = (!screen.config.is_null()).then(|| screen.config.clone());
                        return self.candidate(name, handle, config).await.map(Some);
                    }
                    tracing::debug!(component = name, "Screen component not registered");
                }
            }
        }

        if let Some(entity_type) = ctx.entity_type.as_deref() {
            if let Some(meta) = runtime.entity_config(entity_type) {
                let name = page_component(names::TargetKind::Entity, ctx.operation);
                let config = serde_json::to_value(meta)?;
                return self.core_candidate(name, ctx, Some(config)).await.map(Some);
            }
        }

        if let Some(transaction_type) = ctx.transaction_type.as_deref() {
            if let Some(meta) = runtime.transaction_config(transaction_type) {
                let name = page_component(names::TargetKind::Transaction, ctx.operation);
                let config = serde_json::to_value(meta)?;
                return self.core_candidate(name, ctx, Some(config)).await.map(Some);
            }
        }

        Ok(None)
    }

    fn organization_custom(&self, ctx: &ResolutionContext) -> Option<Candidate> {
        let target = ctx.target_type()?;
        let key = format!("{}:{}:{}", ctx.organization_id, target, ctx.operation);
        self.registry.custom_exact(&key).map(|component| Candidate {
            component,
            name: key,
            config: None,
        })
    }

    async fn type_specific(&self, ctx: &ResolutionContext) -> Result<Option<Candidate>, ResolutionError> {
        let Some((target, type_name)) = context_target(ctx) else {
            return Ok(None);
        };
        let name = format!("{}_{}", type_name, page_component(target, ctx.operation));
        match self.registry.lookup(&name, ctx) {
            Some(handle) => self.candidate(&name, handle, None).await.map(Some),
            None => Ok(None),
        }
    }

    async fn fallback(&self, ctx: &ResolutionContext) -> Result<Candidate, ResolutionError> {
        let name = fallback_key(ctx)
            .and_then(|key| fallback_component(&key))
            .unwrap_or(names::MASTER_DATA);
        self.core_candidate(name, ctx, None).await
    }

    async fn core_candidate(
        &self,
        name: &str,
        ctx: &ResolutionContext,
        config: Option<Value>,
    ) -> Result<Candidate, ResolutionError> {
        let handle = self
            .registry
            .lookup(name, ctx)
            .ok_or_else(|| ResolutionError::Unregistered(name.to_string()))?;
        self.candidate(name, handle, config).await
    }

    async fn candidate(
        &self,
        name: &str,
        handle: ComponentHandle,
        config: Option<Value>,
    ) -> Result<Candidate, ResolutionError> {
        Ok(Candidate {
            component: handle.load().await?,
            name: name.to_string(),
            config,
        })
    }
}

/// A screen constraint admits the context when unset or equal.
fn compatible(screen_value: Option<&str>, ctx_value: Option<&str>) -> bool {
    match (screen_value, ctx_value) {
        (None, _) => true,
        (Some(s), Some(c)) => record_key(s) == record_key(c),
        (Some(_), None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::registry::{ComponentLoader, ComponentMapping, StaticComponent};
    use crate::components::Operation;
    use crate::config::{ConfigOrigin, MergedConfig};
    use crate::model::AppConfig;
    use crate::runtime::{assemble, AssembleOptions};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves one runtime for every request and counts calls.
    struct FixedRuntime {
        runtime: Option<Arc<GeneratedRuntime>>,
        calls: AtomicUsize,
    }

    impl FixedRuntime {
        fn new(config: serde_json::Value) -> Self {
            let config: AppConfig = serde_json::from_value(config).unwrap();
            let merged = MergedConfig::from_parts(Arc::new(config), vec![ConfigOrigin::Platform]).unwrap();
            let runtime = assemble(&merged, None, "k".into(), Utc::now(), AssembleOptions::default());
            Self {
                runtime: Some(Arc::new(runtime)),
                calls: AtomicUsize::new(0),
            }
        }

        fn missing() -> Self {
            Self {
                runtime: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RuntimeSource for FixedRuntime {
        async fn runtime_for(
            &self,
            app_id: &str,
            _organization_id: Option<&str>,
        ) -> Result<Arc<GeneratedRuntime>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.runtime.clone().ok_or_else(|| ServiceError::NotFound {
                app_id: app_id.to_string(),
            })
        }
    }

    #[derive(Debug)]
    struct BrokenLoader;

    #[async_trait]
    impl ComponentLoader for BrokenLoader {
        async fn load(&self) -> Result<Arc<dyn Component>, RegistryError> {
            Err(RegistryError::LoadFailed {
                name: "Broken".into(),
                reason: "bundle missing".into(),
            })
        }
    }

    fn marine() -> FixedRuntime {
        FixedRuntime::new(json!({
            "app_id": "marine",
            "name": "Marine",
            "entities": [{"entity_type": "VESSEL", "display_name": "Vessel"}],
            "transactions": [{"transaction_type": "VOYAGE", "display_name": "Voyage"}],
            "screens": [
                {"screen_id": "fleet", "screen_type": "dashboard", "component": "FleetBoard", "config": {"refresh": 30}},
                {"screen_id": "orphan", "screen_type": "report", "component": "NotRegistered"}
            ]
        }))
    }

    fn resolver() -> ComponentResolver {
        ComponentResolver::new(Arc::new(ComponentRegistry::new()))
    }

    fn ctx(op: Operation) -> ResolutionContext {
        ResolutionContext::new("marine", "acme", op)
    }

    #[tokio::test]
    async fn test_app_specific_entity() {
        let resolver = resolver();
        let resolved = resolver.resolve(&ctx(Operation::Update).with_entity("VESSEL"), &marine()).await;

        assert_eq!(resolved.name, names::ENTITY_WIZARD);
        assert!(!resolved.fallback_used);
        assert_eq!(resolved.path_names(), vec!["app_specific"]);
        assert_eq!(resolved.config.unwrap()["entity_type"], "VESSEL");
    }

    #[tokio::test]
    async fn test_app_specific_wins_over_later_matches() {
        let resolver = resolver();
        resolver
            .registry()
            .register_custom(
                ComponentMapping::custom("VESSEL:read").for_organization("acme"),
                StaticComponent::shared("AcmeVessel"),
            )
            .unwrap();
        resolver
            .registry()
            .register_custom(
                ComponentMapping::custom("VESSEL_EntityDetail"),
                StaticComponent::shared("VesselDetail"),
            )
            .unwrap();

        let resolved = resolver.resolve(&ctx(Operation::Read).with_entity("VESSEL"), &marine()).await;
        assert_eq!(resolved.path_names(), vec!["app_specific"]);
        assert_eq!(resolved.name, names::ENTITY_DETAIL);
    }

    #[tokio::test]
    async fn test_app_specific_transaction() {
        let resolved = resolver()
            .resolve(&ctx(Operation::List).with_transaction("VOYAGE"), &marine())
            .await;
        assert_eq!(resolved.name, names::TRANSACTION_LIST);
        assert!(!resolved.fallback_used);
    }

    #[tokio::test]
    async fn test_screen_binding() {
        let resolver = resolver();
        resolver
            .registry()
            .register_custom(ComponentMapping::custom("FleetBoard"), StaticComponent::shared("FleetBoard"))
            .unwrap();

        let resolved = resolver.resolve(&ctx(Operation::Read).with_screen("dashboard"), &marine()).await;
        assert_eq!(resolved.name, "FleetBoard");
        assert!(!resolved.fallback_used);
        assert_eq!(resolved.config.unwrap()["refresh"], 30);
    }

    #[tokio::test]
    async fn test_unregistered_screen_component_falls_through() {
        let resolved = resolver()
            .resolve(&ctx(Operation::Read).with_screen("report"), &marine())
            .await;
        assert_eq!(
            resolved.path_names(),
            vec!["app_specific", "organization_custom", "type_specific", "fallback"]
        );
        assert_eq!(resolved.name, names::REPORT_VIEWER);
    }

    #[tokio::test]
    async fn test_organization_custom() {
        let resolver = resolver();
        resolver
            .registry()
            .register_custom(
                ComponentMapping::custom("BARGE:create").for_organization("acme"),
                StaticComponent::shared("AcmeBargeWizard"),
            )
            .unwrap();

        let resolved = resolver.resolve(&ctx(Operation::Create).with_entity("BARGE"), &marine()).await;
        assert_eq!(resolved.component.name(), "AcmeBargeWizard");
        assert_eq!(resolved.name, "acme:BARGE:create");
        assert!(resolved.fallback_used);
        assert_eq!(resolved.path_names(), vec!["app_specific", "organization_custom"]);
    }

    #[tokio::test]
    async fn test_type_specific() {
        let resolver = resolver();
        resolver
            .registry()
            .register_custom(
                ComponentMapping::custom("BARGE_EntityWizard"),
                StaticComponent::shared("BargeWizard"),
            )
            .unwrap();

        let resolved = resolver.resolve(&ctx(Operation::Create).with_entity("BARGE"), &marine()).await;
        assert_eq!(resolved.name, "BARGE_EntityWizard");
        assert!(resolved.fallback_used);
        assert_eq!(
            resolved.path_names(),
            vec!["app_specific", "organization_custom", "type_specific"]
        );
    }

    #[tokio::test]
    async fn test_fallback_table() {
        let resolved = resolver()
            .resolve(&ctx(Operation::Create).with_entity("WIDGET"), &marine())
            .await;
        assert!(resolved.fallback_used);
        assert_eq!(
            resolved.path_names(),
            vec!["app_specific", "organization_custom", "type_specific", "fallback"]
        );
        assert_eq!(resolved.name, names::ENTITY_WIZARD);
    }

    #[tokio::test]
    async fn test_fallback_without_any_type() {
        let resolved = resolver().resolve(&ctx(Operation::Read), &marine()).await;
        assert_eq!(resolved.name, names::MASTER_DATA);
        assert_eq!(resolved.resolution_path.last(), Some(&ResolutionStrategy::Fallback));
    }

    #[tokio::test]
    async fn test_missing_runtime_uses_ultimate_fallback() {
        let source = FixedRuntime::missing();
        let resolved = resolver()
            .resolve(&ctx(Operation::Read).with_entity("VESSEL"), &source)
            .await;
        assert_eq!(resolved.name, names::MASTER_DATA);
        assert!(resolved.fallback_used);
        assert_eq!(resolved.path_names(), vec!["app_specific", "ultimate_fallback"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lazy_load_failure_uses_ultimate_fallback() {
        let resolver = resolver();
        resolver
            .registry()
            .register_lazy(ComponentMapping::lazy("BARGE_EntityList"), Arc::new(BrokenLoader))
            .unwrap();

        let resolved = resolver.resolve(&ctx(Operation::List).with_entity("BARGE"), &marine()).await;
        assert_eq!(
            resolved.path_names(),
            vec!["app_specific", "organization_custom", "type_specific", "ultimate_fallback"]
        );
        assert_eq!(resolved.component.name(), names::MASTER_DATA);
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let resolved = resolver()
            .resolve(&ctx(Operation::Create).with_entity("WIDGET"), &marine())
            .await;
        let report = serde_json::to_value(resolved.report()).unwrap();
        assert_eq!(report["fallback_used"], true);
        assert_eq!(report["resolution_path"][3], "fallback");
    }
}
