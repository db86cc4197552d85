//! appcfg - multi-tenant app configuration engine
//!
//! Turns a platform-level app definition plus an optional per-organization
//! override into the runtime structure a UI shell renders: routes, entity
//! and transaction metadata, and the component chosen for each operation.

pub mod cache;
pub mod clock;
pub mod components;
pub mod config;
pub mod error;
pub mod model;
pub mod runtime;
pub mod service;
pub mod subscriber;

pub use cache::{CacheKey, CacheStats, RuntimeCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use components::{
    ComponentMapping, ComponentRegistry, Operation, ResolutionContext, ResolutionStrategy,
    ResolvedComponent,
};
pub use config::{ConfigOrigin, MergedConfig, Settings};
pub use error::{ServiceError, ServiceResult};
pub use model::{AppConfig, ConfigOverride};
pub use runtime::GeneratedRuntime;
pub use service::{AppConfigService, LoadOptions, SaveOutcome};
pub use subscriber::Subscription;
