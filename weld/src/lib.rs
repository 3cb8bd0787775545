//! # weld
//!
//! A dependency injection container: bind types to recipes that build them,
//! validate the dependency graph once, then look components up by type and
//! qualifier.
//!
//! ## Core Concepts
//!
//! - **ContextConfig**: The binder collecting instances, component types and custom providers
//! - **Context**: The validated, immutable container serving lookups
//! - **ComponentKey**: A requested type plus an optional qualifier
//! - **Injectable**: A type describing its constructors, injectable fields and methods
//! - **Scope**: A decoration deciding how often a binding builds a new value
//! - **Lazy**: A deferred handle resolving a component on each invocation
//!
//! ## Basic Usage
//!
//! ```rust
//! use weld::{ContextConfig, Injectable};
//! use std::sync::Arc;
//!
//! #[derive(Injectable)]
//! struct Repository {
//!     table: String,
//! }
//!
//! #[derive(Injectable)]
//! struct Controller {
//!     repository: Arc<Repository>,
//! }
//!
//! fn main() -> Result<(), weld::Error> {
//!     let mut config = ContextConfig::new();
//!     config
//!         .bind_instance("users".to_string(), &[])?
//!         .bind_component::<Repository>(&[])?
//!         .bind_component::<Controller>(&[])?;
//!     let context = config.context()?;
//!
//!     let controller = context.get::<Arc<Controller>>()?.unwrap();
//!     assert_eq!(controller.repository.table, "users");
//!     Ok(())
//! }
//! ```
//!
//! ## Validation
//!
//! Missing and cyclic dependencies are reported when the context is created,
//! before anything is built:
//!
//! ```rust
//! use weld::{ContextConfig, Error, Injectable};
//!
//! #[derive(Injectable)]
//! struct Service {
//!     port: u16,
//! }
//!
//! let mut config = ContextConfig::new();
//! config.bind_component::<Service>(&[]).unwrap();
//! assert!(matches!(
//!     config.context(),
//!     Err(Error::DependencyNotFound { .. })
//! ));
//! ```
//!
//! ## Qualifiers, Scopes and Lazy Dependencies
//!
//! ```rust
//! use weld::{ContextConfig, Injectable, Lazy, Qualifier};
//! use std::sync::Arc;
//!
//! #[derive(Injectable)]
//! #[scope(singleton)]
//! struct Parent {
//!     #[named("parent")]
//!     name: String,
//!     child: Lazy<Arc<Child>>,
//! }
//!
//! #[derive(Injectable)]
//! struct Child {
//!     parent: Arc<Parent>,
//! }
//!
//! fn main() -> Result<(), weld::Error> {
//!     let mut config = ContextConfig::new();
//!     config
//!         .bind_instance("root".to_string(), &[Qualifier::named("parent").into()])?
//!         .bind_component::<Parent>(&[])?
//!         .bind_component::<Child>(&[])?;
//!     let context = config.context()?;
//!
//!     let parent = context.get::<Arc<Parent>>()?.unwrap();
//!     let child = parent.child.get()?;
//!     assert!(Arc::ptr_eq(&parent, &child.parent));
//!     assert_eq!(child.parent.name, "root");
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `macros` (default): Enables `#[derive(Injectable)]` and `#[injectable]`

mod config;
mod context;
mod error;
mod inject;
mod key;
mod provider;
mod scope;

pub use config::*;
pub use context::{Context, Lazy};
pub use error::*;
pub use inject::*;
pub use key::*;
pub use provider::*;
pub use scope::*;

#[cfg(feature = "macros")]
pub use weld_macros::*;
