//! Runtime assembly
//!
//! Derives the routable structure of an app from its merged configuration:
//! - Routes: list/create/detail per entity and transaction, one per
//!   dashboard, one exact home route
//! - Entity metadata keyed by `{app_id}.{entity_type_lowercased}`
//! - Transaction metadata keyed by `{app_id}.{transaction_type_lowercased}`
//!
//! `assemble` is a pure function of its inputs. Only `cache_key` and
//! `loaded_at` are supplied by the caller and may vary between calls.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::components::names::{page_component, TargetKind, APP_HOME, DASHBOARD};
use crate::components::Operation;
use crate::config::{ConfigOrigin, MergedConfig};
use crate::model::{
    EntityDefinition, FieldDefinition, NavigationConfig, ScreenDefinition, TransactionDefinition,
    UIThemeConfig,
};

pub use crate::model::naming::{kebab_case, metadata_key, permission_prefix};

/// Number of fields (by `field_order`) placed in the basic info section.
pub const BASIC_SECTION_FIELDS: usize = 5;

/// Number of fields (by `field_order`) eligible as table columns.
pub const TABLE_COLUMN_FIELDS: usize = 6;

/// Version prefix of generated API paths.
pub const API_PREFIX: &str = "/api/v1";

/// What a route renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    Home,
    List,
    Create,
    Detail,
    Dashboard,
}

/// One generated route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub path: String,

    /// Component that renders the route
    pub component: String,

    pub kind: RouteKind,

    /// Required permissions (empty when permissions are not included)
    pub permissions: Vec<String>,

    /// Exact-match route
    #[serde(default)]
    pub exact: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,

    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointTemplate {
    pub method: HttpMethod,
    pub path: String,
}

/// REST-shaped API description for one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    pub base_path: String,
    pub list: EndpointTemplate,
    pub create: EndpointTemplate,
    pub read: EndpointTemplate,
    pub update: EndpointTemplate,
    pub delete: EndpointTemplate,
}

impl ApiDescriptor {
    fn for_type(app_id: &str, type_name: &str) -> Self {
        let base_path = format!("{}/{}/{}", API_PREFIX, app_id, kebab_case(type_name));
        let item_path = format!("{}/{{id}}", base_path);
        let endpoint = |method, path: &str| EndpointTemplate {
            method,
            path: path.to_string(),
        };
        Self {
            list: endpoint(HttpMethod::Get, &base_path),
            create: endpoint(HttpMethod::Post, &base_path),
            read: endpoint(HttpMethod::Get, &item_path),
            update: endpoint(HttpMethod::Put, &item_path),
            delete: endpoint(HttpMethod::Delete, &item_path),
            base_path,
        }
    }
}

/// A generated form section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSection {
    pub section_id: String,
    pub title: String,
    /// Field names in display order
    pub fields: Vec<String>,
}

/// Runtime metadata for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRuntimeConfig {
    pub entity_type: String,
    pub display_name: String,
    pub fields: Vec<FieldDefinition>,
    pub sections: Vec<UiSection>,
    pub table_columns: Vec<String>,
    pub search_fields: Vec<String>,
    pub api: ApiDescriptor,
}

/// Runtime metadata for one transaction type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRuntimeConfig {
    pub transaction_type: String,
    pub display_name: String,
    pub header_fields: Vec<FieldDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_fields: Option<Vec<FieldDefinition>>,
    pub sections: Vec<UiSection>,
    pub table_columns: Vec<String>,
    pub search_fields: Vec<String>,
    pub api: ApiDescriptor,
}

/// Read-only runtime view of a merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRuntime {
    pub app_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    pub name: String,

    pub version: String,

    pub routes: Vec<RouteDefinition>,

    pub entity_configs: BTreeMap<String, EntityRuntimeConfig>,

    pub transaction_configs: BTreeMap<String, TransactionRuntimeConfig>,

    /// Screens of the merged config, used for component binding
    pub screens: Vec<ScreenDefinition>,

    pub navigation: NavigationConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_theme: Option<UIThemeConfig>,

    /// Layers that produced this runtime
    pub inheritance_chain: Vec<ConfigOrigin>,

    /// Digest of the merged config
    pub config_digest: String,

    pub cache_key: String,

    pub loaded_at: DateTime<Utc>,
}

impl GeneratedRuntime {
    /// Entity metadata by type name (any case).
    pub fn entity_config(&self, entity_type: &str) -> Option<&EntityRuntimeConfig> {
        self.entity_configs.get(&metadata_key(&self.app_id, entity_type))
    }

    /// Transaction metadata by type name (any case).
    pub fn transaction_config(&self, transaction_type: &str) -> Option<&TransactionRuntimeConfig> {
        self.transaction_configs
            .get(&metadata_key(&self.app_id, transaction_type))
    }

    /// The route with the given path.
    pub fn route(&self, path: &str) -> Option<&RouteDefinition> {
        self.routes.iter().find(|r| r.path == path)
    }

    /// True when routes, metadata and screens equal `other`'s, ignoring
    /// `cache_key` and `loaded_at`.
    pub fn same_structure(&self, other: &GeneratedRuntime) -> bool {
        self.routes == other.routes
            && self.entity_configs == other.entity_configs
            && self.transaction_configs == other.transaction_configs
            && self.screens == other.screens
            && self.config_digest == other.config_digest
    }
}

/// Knobs for assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssembleOptions {
    /// Attach permission requirements to routes
    pub include_permissions: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            include_permissions: true,
        }
    }
}

/// Build the runtime view of `merged`.
pub fn assemble(
    merged: &MergedConfig,
    organization_id: Option<&str>,
    cache_key: String,
    loaded_at: DateTime<Utc>,
    options: AssembleOptions,
) -> GeneratedRuntime {
    let config = &merged.config;
    let app_id = config.app_id.as_str();

    let mut routes = Vec::new();
    for entity in &config.entities {
        routes.extend(type_routes(
            app_id,
            TargetKind::Entity,
            &entity.entity_type,
            &entity.display_name,
            options,
        ));
    }
    for transaction in &config.transactions {
        routes.extend(type_routes(
            app_id,
            TargetKind::Transaction,
            &transaction.transaction_type,
            &transaction.display_name,
            options,
        ));
    }
    for dashboard in &config.navigation.dashboards {
        routes.push(RouteDefinition {
            path: format!("/{}/dashboard/{}", app_id, dashboard.dashboard_id),
            component: DASHBOARD.to_string(),
            kind: RouteKind::Dashboard,
            permissions: if options.include_permissions {
                dashboard.permissions.clone()
            } else {
                Vec::new()
            },
            exact: false,
            entity_type: None,
            transaction_type: None,
            title: dashboard.title.clone(),
        });
    }
    routes.push(RouteDefinition {
        path: format!("/{}", app_id),
        component: APP_HOME.to_string(),
        kind: RouteKind::Home,
        permissions: Vec::new(),
        exact: true,
        entity_type: None,
        transaction_type: None,
        title: config.name.clone(),
    });

    let entity_configs = config
        .entities
        .iter()
        .map(|e| (metadata_key(app_id, &e.entity_type), entity_runtime(app_id, e)))
        .collect();

    let transaction_configs = config
        .transactions
        .iter()
        .map(|t| {
            (
                metadata_key(app_id, &t.transaction_type),
                transaction_runtime(app_id, t),
            )
        })
        .collect();

    GeneratedRuntime {
        app_id: app_id.to_string(),
        organization_id: organization_id.map(str::to_string),
        name: config.name.clone(),
        version: config.version.clone(),
        routes,
        entity_configs,
        transaction_configs,
        screens: config.screens.clone(),
        navigation: config.navigation.clone(),
        ui_theme: config.ui_theme.clone(),
        inheritance_chain: merged.sources.clone(),
        config_digest: merged.digest.clone(),
        cache_key,
        loaded_at,
    }
}

fn type_routes(
    app_id: &str,
    target: TargetKind,
    type_name: &str,
    display_name: &str,
    options: AssembleOptions,
) -> [RouteDefinition; 3] {
    let base = format!("/{}/{}", app_id, kebab_case(type_name));
    let prefix = permission_prefix(type_name);
    let permission = |suffix: &str| {
        if options.include_permissions {
            vec![format!("{}_{}", prefix, suffix)]
        } else {
            Vec::new()
        }
    };
    let (entity_type, transaction_type) = match target {
        TargetKind::Entity => (Some(type_name.to_string()), None),
        TargetKind::Transaction => (None, Some(type_name.to_string())),
    };
    let route = |path: String, kind, op, permissions, title: String| RouteDefinition {
        path,
        component: page_component(target, op).to_string(),
        kind,
        permissions,
        exact: false,
        entity_type: entity_type.clone(),
        transaction_type: transaction_type.clone(),
        title,
    };

    [
        route(
            base.clone(),
            RouteKind::List,
            Operation::List,
            permission("READ"),
            display_name.to_string(),
        ),
        route(
            format!("{}/new", base),
            RouteKind::Create,
            Operation::Create,
            permission("CREATE"),
            format!("New {}", display_name),
        ),
        route(
            format!("{}/:id", base),
            RouteKind::Detail,
            Operation::Read,
            permission("READ"),
            format!("{} Details", display_name),
        ),
    ]
}

fn fields_by_order(fields: &[FieldDefinition]) -> Vec<&FieldDefinition> {
    let mut ordered: Vec<&FieldDefinition> = fields.iter().collect();
    ordered.sort_by_key(|f| f.field_order);
    ordered
}

fn sections_for(fields: &[FieldDefinition]) -> Vec<UiSection> {
    let ordered = fields_by_order(fields);
    let split = ordered.len().min(BASIC_SECTION_FIELDS);
    let names = |slice: &[&FieldDefinition]| -> Vec<String> {
        slice.iter().map(|f| f.field_name.clone()).collect()
    };

    vec![
        UiSection {
            section_id: "basic_info".to_string(),
            title: "Basic Information".to_string(),
            fields: names(&ordered[..split]),
        },
        UiSection {
            section_id: "details".to_string(),
            title: "Details".to_string(),
            fields: names(&ordered[split..]),
        },
    ]
}

fn table_columns_for(fields: &[FieldDefinition]) -> Vec<String> {
    fields_by_order(fields)
        .into_iter()
        .take(TABLE_COLUMN_FIELDS)
        .map(|f| f.field_name.clone())
        .collect()
}

fn search_fields_for(fields: &[FieldDefinition]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| f.searchable)
        .map(|f| f.field_name.clone())
        .collect()
}

fn entity_runtime(app_id: &str, entity: &EntityDefinition) -> EntityRuntimeConfig {
    EntityRuntimeConfig {
        entity_type: entity.entity_type.clone(),
        display_name: entity.display_name.clone(),
        fields: entity.fields.clone(),
        sections: sections_for(&entity.fields),
        table_columns: table_columns_for(&entity.fields),
        search_fields: search_fields_for(&entity.fields),
        api: ApiDescriptor::for_type(app_id, &entity.entity_type),
    }
}

fn transaction_runtime(app_id: &str, transaction: &TransactionDefinition) -> TransactionRuntimeConfig {
    TransactionRuntimeConfig {
        transaction_type: transaction.transaction_type.clone(),
        display_name: transaction.display_name.clone(),
        header_fields: transaction.header_fields.clone(),
        line_fields: transaction.line_fields.clone(),
        sections: sections_for(&transaction.header_fields),
        table_columns: table_columns_for(&transaction.header_fields),
        search_fields: search_fields_for(&transaction.header_fields),
        api: ApiDescriptor::for_type(app_id, &transaction.transaction_type),
    }
}
