//! # Tiered Injector - Call-Site Dependency Injection for Rust
//!
//! A thread-safe inversion-of-control engine. Services are registered against a
//! contract (a concrete type or a `dyn Trait`) with a lifetime, and resolved
//! with their whole dependency graph wired automatically.
//!
//! ## Features
//!
//! - **Three lifetimes** - `Singleton` per container, `Scoped` per scope, `Transient` per resolve
//! - **Trait-object contracts** - register and resolve `Arc<dyn Trait>`
//! - **Call-site plans** - each contract's graph is built once, cycles fail fast with the full path
//! - **Tiered execution** - contracts start interpreted and are compiled to closures once hot
//! - **Disposal** - opt-in `Dispose` tracking, released in reverse creation order
//! - **Scope validation** - optional captive-dependency and scoped-from-root checks
//! - **Observable** - optional `tracing` events and a `ResolutionObserver` hook
//!
//! ## Quick Start
//!
//! ```rust
//! use tiered_injector::ServiceCollection;
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, message: &str);
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, message: &str) {
//!         println!("{message}");
//!     }
//! }
//!
//! struct UserService {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! let mut services = ServiceCollection::new();
//! services.singleton(|()| -> Arc<dyn Logger> { Arc::new(ConsoleLogger) });
//! services.transient(|logger: Arc<dyn Logger>| Arc::new(UserService { logger }));
//!
//! let container = services.build().unwrap();
//! let users = container.resolve_required::<UserService>().unwrap();
//! users.logger.log("resolved");
//! ```
//!
//! ## Scopes
//!
//! ```rust
//! use tiered_injector::ServiceCollection;
//! use std::sync::Arc;
//!
//! struct RequestContext;
//!
//! let mut services = ServiceCollection::new();
//! services.scoped(|()| Arc::new(RequestContext));
//! let container = services.build().unwrap();
//!
//! let first = container.create_scope().unwrap();
//! let second = container.create_scope().unwrap();
//!
//! let a = first.resolve_required::<RequestContext>().unwrap();
//! assert!(Arc::ptr_eq(&a, &first.resolve_required::<RequestContext>().unwrap()));
//! assert!(!Arc::ptr_eq(&a, &second.resolve_required::<RequestContext>().unwrap()));
//! ```
//!
//! ## Collections
//!
//! Registering a contract twice overrides it for single resolution, while
//! [`ServiceScope::resolve_all`] returns every registration in order:
//!
//! ```rust
//! use tiered_injector::ServiceCollection;
//! use std::sync::Arc;
//!
//! let mut services = ServiceCollection::new();
//! services.instance(Arc::new(String::from("first")));
//! services.instance(Arc::new(String::from("second")));
//! let container = services.build().unwrap();
//!
//! assert_eq!(*container.resolve_required::<String>().unwrap(), "second");
//! assert_eq!(container.resolve_all::<String>().unwrap().len(), 2);
//! ```

mod activator;
mod builder;
mod call_site;
mod compiler;
mod container;
mod contract;
mod descriptor;
mod disposal;
mod error;
mod interpreter;
#[cfg(feature = "logging")]
pub mod logging;
mod registry;
mod resolution;
mod scheduler;
mod scope;
mod validation;

pub use activator::*;
pub use container::*;
pub use contract::*;
pub use descriptor::*;
pub use disposal::*;
pub use error::*;
pub use registry::*;
pub use resolution::*;
pub use scheduler::*;
pub use scope::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Container, ContainerOptions, DiError, Dispose, Injectable, Lifetime, Result, ServiceCollection,
        ServiceScope,
    };
    pub use std::sync::Arc;
}
