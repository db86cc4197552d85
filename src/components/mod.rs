//! Component registry and resolution
//!
//! Picks the concrete component that renders an operation on an app:
//! - `registry`: core, custom and lazy components by name
//! - `resolver`: the ordered strategy chain over the registry and the
//!   app's assembled runtime

mod context;
pub mod names;
mod registry;
mod resolver;

pub use context::{Operation, ResolutionContext, UnknownOperation};
pub use registry::{
    registry_key, Component, ComponentHandle, ComponentKind, ComponentLoader, ComponentMapping,
    ComponentRegistry, LazyComponent, RegistryError, StaticComponent,
};
pub use resolver::{
    ComponentResolver, ResolutionError, ResolutionReport, ResolutionStrategy, ResolvedComponent,
    RuntimeSource,
};
