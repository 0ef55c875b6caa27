//! Backend location subsystem.
//!
//! # Data Flow
//! ```text
//! Location string ("mem:scratch", "s3:host/bucket", "/srv/repo")
//!     → parse.rs (extract scheme, fall back to `local`, parse config)
//!     → registry.rs (scheme → Factory lookup)
//!     → Factory::create / Factory::open (Transport + Limiter → Box<dyn Backend>)
//! ```

pub mod parse;
pub mod registry;

use std::sync::Arc;

use crate::backend::mem;

pub use parse::{strip_password, Location, LocationError, LOCAL_SCHEME};
pub use registry::{BackendConfig, BackendFuture, Factory, GenericFactory, Registry};

/// Registry with every backend this crate ships.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(mem::SCHEME, Arc::new(mem::factory()));
    registry
}
