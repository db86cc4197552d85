//! Built-in component names and the operation → component mapping.

use super::context::{Operation, ResolutionContext};

pub const ENTITY_WIZARD: &str = "EntityWizard";
pub const ENTITY_DETAIL: &str = "EntityDetail";
pub const ENTITY_LIST: &str = "EntityList";
pub const TRANSACTION_WIZARD: &str = "TransactionWizard";
pub const TRANSACTION_DETAIL: &str = "TransactionDetail";
pub const TRANSACTION_LIST: &str = "TransactionList";
pub const DASHBOARD: &str = "Dashboard";
pub const APP_HOME: &str = "AppHome";
pub const SCREEN_FORM: &str = "ScreenForm";
pub const REPORT_VIEWER: &str = "ReportViewer";

/// Generic master-data component, the last resort of every resolution.
pub const MASTER_DATA: &str = "MasterDataManager";

/// Whether a type is an entity or a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Entity,
    Transaction,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Transaction => "transaction",
        }
    }
}

/// Page component for an operation on an entity or transaction.
pub fn page_component(target: TargetKind, operation: Operation) -> &'static str {
    match (target, operation) {
        (TargetKind::Entity, Operation::Create | Operation::Update) => ENTITY_WIZARD,
        (TargetKind::Entity, Operation::Read) => ENTITY_DETAIL,
        (TargetKind::Entity, Operation::List) => ENTITY_LIST,
        (TargetKind::Transaction, Operation::Create | Operation::Update) => TRANSACTION_WIZARD,
        (TargetKind::Transaction, Operation::Read) => TRANSACTION_DETAIL,
        (TargetKind::Transaction, Operation::List) => TRANSACTION_LIST,
    }
}

/// Target of a context: entity first, then transaction.
pub fn context_target(ctx: &ResolutionContext) -> Option<(TargetKind, &str)> {
    if let Some(entity) = ctx.entity_type.as_deref() {
        return Some((TargetKind::Entity, entity));
    }
    ctx.transaction_type
        .as_deref()
        .map(|t| (TargetKind::Transaction, t))
}

/// Fallback lookup table: `entity:{op}`, `transaction:{op}`, `screen:{type}`.
pub const FALLBACK_COMPONENTS: &[(&str, &str)] = &[
    ("entity:create", ENTITY_WIZARD),
    ("entity:update", ENTITY_WIZARD),
    ("entity:read", ENTITY_DETAIL),
    ("entity:list", ENTITY_LIST),
    ("transaction:create", TRANSACTION_WIZARD),
    ("transaction:update", TRANSACTION_WIZARD),
    ("transaction:read", TRANSACTION_DETAIL),
    ("transaction:list", TRANSACTION_LIST),
    ("screen:dashboard", DASHBOARD),
    ("screen:home", APP_HOME),
    ("screen:form", SCREEN_FORM),
    ("screen:report", REPORT_VIEWER),
];

/// Fallback table key for a context, or `None` when it names no type.
pub fn fallback_key(ctx: &ResolutionContext) -> Option<String> {
    if let Some((target, _)) = context_target(ctx) {
        return Some(format!("{}:{}", target.as_str(), ctx.operation));
    }
    ctx.screen_type
        .as_deref()
        .map(|screen| format!("screen:{}", screen.to_lowercase()))
}

/// Look up the fallback table.
pub fn fallback_component(key: &str) -> Option<&'static str> {
    FALLBACK_COMPONENTS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_component() {
        assert_eq!(page_component(TargetKind::Entity, Operation::Update), ENTITY_WIZARD);
        assert_eq!(page_component(TargetKind::Transaction, Operation::List), TRANSACTION_LIST);
    }

    #[test]
    fn test_fallback_key() {
        let ctx = ResolutionContext::new("retail", "acme", Operation::Create).with_entity("WIDGET");
        assert_eq!(fallback_key(&ctx).as_deref(), Some("entity:create"));

        let ctx = ResolutionContext::new("retail", "acme", Operation::Read).with_screen("Dashboard");
        assert_eq!(fallback_key(&ctx).as_deref(), Some("screen:dashboard"));

        let ctx = ResolutionContext::new("retail", "acme", Operation::Read);
        assert!(fallback_key(&ctx).is_none());
    }

    #[test]
    fn test_fallback_table_covers_all_operations() {
        for target in ["entity", "transaction"] {
            for op in Operation::ALL {
                assert!(fallback_component(&format!("{target}:{op}")).is_some());
            }
        }
    }
}
