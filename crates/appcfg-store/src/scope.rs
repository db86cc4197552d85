//! Document addressing: scopes and document kinds.

use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Reserved identifier of the platform scope.
pub const PLATFORM_SCOPE_ID: &str = "platform";

/// Where a document lives: the shared platform scope or one organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scope {
    Platform,
    Organization(String),
}

impl Scope {
    /// Scope for an optional organization id (`None` is the platform).
    pub fn for_organization(organization_id: Option<&str>) -> Self {
        match organization_id {
            Some(org) => Self::from(org.to_string()),
            None => Self::Platform,
        }
    }

    /// Storage identifier of this scope.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Platform => PLATFORM_SCOPE_ID,
            Self::Organization(id) => id,
        }
    }

    pub fn is_platform(&self) -> bool {
        matches!(self, Self::Platform)
    }

    /// Organization id, if this is an organization scope.
    pub fn organization_id(&self) -> Option<&str> {
        match self {
            Self::Platform => None,
            Self::Organization(id) => Some(id),
        }
    }
}

impl From<String> for Scope {
    fn from(value: String) -> Self {
        if value == PLATFORM_SCOPE_ID {
            Self::Platform
        } else {
            Self::Organization(value)
        }
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.as_str().to_string()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two persisted document shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    /// Platform app definition (`app_definition` field).
    AppConfig,
    /// Organization override (`app_override` field).
    AppConfigOverride,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 2] = [DocumentKind::AppConfig, DocumentKind::AppConfigOverride];

    /// Entity type name used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppConfig => "APP_CONFIG",
            Self::AppConfigOverride => "APP_CONFIG_OVERRIDE",
        }
    }

    /// Name of the JSON field carrying the document payload.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::AppConfig => "app_definition",
            Self::AppConfigOverride => "app_override",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("entity code pattern is valid")
    })
}

/// Check that an entity code (app id) or scope id is safe to use as a
/// storage key and path segment.
pub fn validate_entity_code(code: &str) -> StoreResult<()> {
    if code.len() > 128 {
        return Err(StoreError::InvalidCode {
            code: code.to_string(),
            reason: "longer than 128 characters".to_string(),
        });
    }
    if !code_pattern().is_match(code) || code.contains("..") {
        return Err(StoreError::InvalidCode {
            code: code.to_string(),
            reason: "must be alphanumeric with '_', '.', '-' separators".to_string(),
        });
    }
    Ok(())
}
