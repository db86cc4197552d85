//! Component registry
//!
//! Three tiers of renderable components:
//! - Core: fixed set of built-in page components, never removed
//! - Custom: registered at runtime, global or scoped to one organization
//! - Lazy: deferred-load handles, same keying as custom
//!
//! Scoped entries are keyed `{organization_id}:{name}`, global entries by
//! bare name. Lookup order is core, custom, lazy; within custom and lazy the
//! organization-scoped entry shadows the global one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::context::ResolutionContext;
use super::names;

/// A renderable component.
pub trait Component: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;
}

/// Component that is nothing but its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticComponent {
    name: String,
}

impl StaticComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn shared(name: impl Into<String>) -> Arc<dyn Component> {
        Arc::new(Self::new(name))
    }
}

impl Component for StaticComponent {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Loads a lazily registered component on first use.
#[async_trait]
pub trait ComponentLoader: Send + Sync + fmt::Debug {
    async fn load(&self) -> Result<Arc<dyn Component>, RegistryError>;
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("'{0}' is a core component name and cannot be registered")]
    ReservedName(String),

    #[error("failed to load component '{name}': {reason}")]
    LoadFailed { name: String, reason: String },
}

/// Registry tier of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Core,
    Universal,
    Custom,
    Lazy,
}

/// Lazily loaded component; the loader runs at most once successfully.
#[derive(Debug)]
pub struct LazyComponent {
    name: String,
    loader: Arc<dyn ComponentLoader>,
    loaded: OnceCell<Arc<dyn Component>>,
}

impl LazyComponent {
    fn new(name: String, loader: Arc<dyn ComponentLoader>) -> Self {
        Self {
            name,
            loader,
            loaded: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    pub async fn get(&self) -> Result<Arc<dyn Component>, RegistryError> {
        self.loaded
            .get_or_try_init(|| async {
                tracing::debug!(component = %self.name, "Loading lazy component");
                self.loader.load().await
            })
            .await
            .cloned()
    }
}

/// A component found in the registry.
#[derive(Debug, Clone)]
pub enum ComponentHandle {
    Core(Arc<dyn Component>),
    Universal(Arc<dyn Component>),
    Custom(Arc<dyn Component>),
    Lazy(Arc<LazyComponent>),
}

impl ComponentHandle {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Core(_) => ComponentKind::Core,
            Self::Universal(_) => ComponentKind::Universal,
            Self::Custom(_) => ComponentKind::Custom,
            Self::Lazy(_) => ComponentKind::Lazy,
        }
    }

    /// The component, loading it first if lazy.
    pub async fn load(&self) -> Result<Arc<dyn Component>, RegistryError> {
        match self {
            Self::Core(c) | Self::Universal(c) | Self::Custom(c) => Ok(c.clone()),
            Self::Lazy(lazy) => lazy.get().await,
        }
    }
}

/// Registration record with optional applicability filters.
///
/// Empty filter lists match everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMapping {
    pub name: String,

    pub kind: ComponentKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    #[serde(default)]
    pub entity_types: Vec<String>,

    #[serde(default)]
    pub transaction_types: Vec<String>,

    #[serde(default)]
    pub screen_types: Vec<String>,

    /// All of these must be held by the caller
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl ComponentMapping {
    fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            organization_id: None,
            entity_types: Vec::new(),
            transaction_types: Vec::new(),
            screen_types: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Self::new(name, ComponentKind::Custom)
    }

    pub fn lazy(name: impl Into<String>) -> Self {
        Self::new(name, ComponentKind::Lazy)
    }

    pub fn for_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_entity_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.entity_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_transaction_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.transaction_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_screen_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.screen_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Registry key: `{organization_id}:{name}` or `{name}`.
    pub fn key(&self) -> String {
        registry_key(&self.name, self.organization_id.as_deref())
    }

    /// Whether the filters admit `ctx`.
    pub fn applies_to(&self, ctx: &ResolutionContext) -> bool {
        fn admits(filter: &[String], value: Option<&str>) -> bool {
            filter.is_empty()
                || value.is_some_and(|v| filter.iter().any(|f| f.eq_ignore_ascii_case(v)))
        }

        self.organization_id
            .as_deref()
            .map_or(true, |org| org == ctx.organization_id)
            && admits(&self.entity_types, ctx.entity_type.as_deref())
            && admits(&self.transaction_types, ctx.transaction_type.as_deref())
            && admits(&self.screen_types, ctx.screen_type.as_deref())
            && self.permissions.iter().all(|p| ctx.has_permission(p))
    }
}

/// Key under which a component is stored.
pub fn registry_key(name: &str, organization_id: Option<&str>) -> String {
    match organization_id {
        Some(org) => format!("{}:{}", org, name),
        None => name.to_string(),
    }
}

/// Built-in components and their tier.
const CORE_COMPONENTS: &[(&str, ComponentKind)] = &[
    (names::APP_HOME, ComponentKind::Core),
    (names::DASHBOARD, ComponentKind::Core),
    (names::SCREEN_FORM, ComponentKind::Core),
    (names::REPORT_VIEWER, ComponentKind::Core),
    (names::ENTITY_LIST, ComponentKind::Universal),
    (names::ENTITY_WIZARD, ComponentKind::Universal),
    (names::ENTITY_DETAIL, ComponentKind::Universal),
    (names::TRANSACTION_LIST, ComponentKind::Universal),
    (names::TRANSACTION_WIZARD, ComponentKind::Universal),
    (names::TRANSACTION_DETAIL, ComponentKind::Universal),
    (names::MASTER_DATA, ComponentKind::Universal),
];

#[derive(Debug, Default)]
struct RuntimeTables {
    custom: HashMap<String, Arc<dyn Component>>,
    lazy: HashMap<String, Arc<LazyComponent>>,
    mappings: HashMap<String, ComponentMapping>,
}

impl RuntimeTables {
    fn admits(&self, key: &str, ctx: Option<&ResolutionContext>) -> bool {
        match (ctx, self.mappings.get(key)) {
            (Some(ctx), Some(mapping)) => mapping.applies_to(ctx),
            _ => true,
        }
    }
}

/// Name → component maps for the three tiers.
#[derive(Debug)]
pub struct ComponentRegistry {
    core: HashMap<&'static str, ComponentHandle>,
    master_data: Arc<dyn Component>,
    tables: RwLock<RuntimeTables>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    /// Registry holding only the core components.
    pub fn new() -> Self {
        let core: HashMap<&'static str, ComponentHandle> = CORE_COMPONENTS
            .iter()
            .map(|(name, kind)| {
                let component = StaticComponent::shared(*name);
                let handle = match kind {
                    ComponentKind::Universal => ComponentHandle::Universal(component),
                    _ => ComponentHandle::Core(component),
                };
                (*name, handle)
            })
            .collect();

        Self {
            core,
            master_data: StaticComponent::shared(names::MASTER_DATA),
            tables: RwLock::new(RuntimeTables::default()),
        }
    }

    /// Generic master-data component (always available).
    pub fn master_data(&self) -> Arc<dyn Component> {
        self.master_data.clone()
    }

    pub fn is_core(&self, name: &str) -> bool {
        self.core.contains_key(name)
    }

    /// Register a ready component.
    pub fn register_custom(
        &self,
        mapping: ComponentMapping,
        component: Arc<dyn Component>,
    ) -> Result<String, RegistryError> {
        self.check_reserved(&mapping.name)?;
        let key = mapping.key();
        let mut tables = self.tables.write();
        tables.lazy.remove(&key);
        tables.custom.insert(key.clone(), component);
        tables.mappings.insert(
            key.clone(),
            ComponentMapping {
                kind: ComponentKind::Custom,
                ..mapping
            },
        );
        tracing::debug!(component_key = %key, "Registered custom component");
        Ok(key)
    }

    /// Register a component whose loader runs on first resolution.
    pub fn register_lazy(
        &self,
        mapping: ComponentMapping,
        loader: Arc<dyn ComponentLoader>,
    ) -> Result<String, RegistryError> {
        self.check_reserved(&mapping.name)?;
        let key = mapping.key();
        let lazy = Arc::new(LazyComponent::new(mapping.name.clone(), loader));
        let mut tables = self.tables.write();
        tables.custom.remove(&key);
        tables.lazy.insert(key.clone(), lazy);
        tables.mappings.insert(
            key.clone(),
            ComponentMapping {
                kind: ComponentKind::Lazy,
                ..mapping
            },
        );
        tracing::debug!(component_key = %key, "Registered lazy component");
        Ok(key)
    }

    fn check_reserved(&self, name: &str) -> Result<(), RegistryError> {
        if self.is_core(name) {
            return Err(RegistryError::ReservedName(name.to_string()));
        }
        Ok(())
    }

    /// Look up a bare name: core, then custom, then lazy.
    ///
    /// Organization-scoped entries are considered when `organization_id` is
    /// given and shadow global ones. Mapping filters are not applied.
    pub fn get(&self, name: &str, organization_id: Option<&str>) -> Option<ComponentHandle> {
        self.find(name, organization_id, None)
    }

    /// Like `get`, scoped to the context's organization and honoring the
    /// mapping filters of custom and lazy entries.
    pub fn lookup(&self, name: &str, ctx: &ResolutionContext) -> Option<ComponentHandle> {
        self.find(name, Some(&ctx.organization_id), Some(ctx))
    }

    fn find(
        &self,
        name: &str,
        organization_id: Option<&str>,
        ctx: Option<&ResolutionContext>,
    ) -> Option<ComponentHandle> {
        if let Some(core) = self.core.get(name) {
            return Some(core.clone());
        }

        let mut keys = Vec::with_capacity(2);
        if let Some(org) = organization_id {
            keys.push(registry_key(name, Some(org)));
        }
        keys.push(name.to_string());

        let tables = self.tables.read();
        for key in &keys {
            if let Some(c) = tables.custom.get(key) {
                if tables.admits(key, ctx) {
                    return Some(ComponentHandle::Custom(c.clone()));
                }
            }
        }
        for key in &keys {
            if let Some(l) = tables.lazy.get(key) {
                if tables.admits(key, ctx) {
                    return Some(ComponentHandle::Lazy(l.clone()));
                }
            }
        }
        None
    }

    /// Exact key lookup in the custom tier only.
    pub fn custom_exact(&self, key: &str) -> Option<Arc<dyn Component>> {
        self.tables.read().custom.get(key).cloned()
    }

    pub fn mapping(&self, name: &str, organization_id: Option<&str>) -> Option<ComponentMapping> {
        self.tables
            .read()
            .mappings
            .get(&registry_key(name, organization_id))
            .cloned()
    }

    /// Remove a custom or lazy registration. Core components stay.
    pub fn unregister(&self, name: &str, organization_id: Option<&str>) -> bool {
        let key = registry_key(name, organization_id);
        let mut tables = self.tables.write();
        let custom = tables.custom.remove(&key).is_some();
        let lazy = tables.lazy.remove(&key).is_some();
        let mapping = tables.mappings.remove(&key).is_some();
        let removed = custom || lazy || mapping;
        if removed {
            tracing::debug!(component_key = %key, "Unregistered component");
        }
        removed
    }

    /// Remove every custom, lazy and mapping entry of an organization.
    ///
    /// Returns the number of components removed.
    pub fn clear_organization_components(&self, organization_id: &str) -> usize {
        let prefix = format!("{}:", organization_id);
        let mut tables = self.tables.write();
        let before = tables.custom.len() + tables.lazy.len();
        tables.custom.retain(|key, _| !key.starts_with(&prefix));
        tables.lazy.retain(|key, _| !key.starts_with(&prefix));
        tables.mappings.retain(|key, _| !key.starts_with(&prefix));
        let removed = before - (tables.custom.len() + tables.lazy.len());
        tracing::info!(organization_id, removed, "Cleared organization components");
        removed
    }

    /// Counts per tier: (core, custom, lazy).
    pub fn counts(&self) -> (usize, usize, usize) {
        let tables = self.tables.read();
        (self.core.len(), tables.custom.len(), tables.lazy.len())
    }
}
