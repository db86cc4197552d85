//! Resolution input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// CRUD operation being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    List,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Create,
        Operation::Read,
        Operation::Update,
        Operation::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::List => "list",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation '{0}' (expected create, read, update or list)")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

/// Everything the resolution chain needs to pick a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionContext {
    pub app_id: String,

    pub organization_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_type: Option<String>,

    pub operation: Operation,

    /// Permissions held by the caller (opaque strings)
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl ResolutionContext {
    pub fn new(app_id: impl Into<String>, organization_id: impl Into<String>, operation: Operation) -> Self {
        Self {
            app_id: app_id.into(),
            organization_id: organization_id.into(),
            entity_type: None,
            transaction_type: None,
            screen_type: None,
            operation,
            permissions: Vec::new(),
        }
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_transaction(mut self, transaction_type: impl Into<String>) -> Self {
        self.transaction_type = Some(transaction_type.into());
        self
    }

    pub fn with_screen(mut self, screen_type: impl Into<String>) -> Self {
        self.screen_type = Some(screen_type.into());
        self
    }

    pub fn with_permissions(mut self, permissions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.permissions.extend(permissions.into_iter().map(|p| p.into()));
        self
    }

    /// Entity type if set, else transaction type.
    pub fn target_type(&self) -> Option<&str> {
        self.entity_type
            .as_deref()
            .or(self.transaction_type.as_deref())
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
