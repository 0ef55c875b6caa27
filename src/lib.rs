//! Backend plumbing for a deduplicating backup engine.
//!
//! - `location`: scheme → factory registry and location parsing
//! - `backend`: the storage contract and the in-memory backend
//! - `transport`: HTTP transport with a per-request progress watchdog
//! - `limiter`: bandwidth limiting for backends that do their own I/O

pub mod backend;
pub mod config;
pub mod limiter;
pub mod location;
pub mod observability;
pub mod transport;

pub use backend::{Backend, BackendError, FileInfo, FileType, Handle};
pub use config::BackendOptions;
pub use limiter::{Limiter, StaticLimiter, Unlimited};
pub use location::{default_registry, Factory, GenericFactory, Location, Registry};
pub use transport::{build_transport, Transport, WatchdogError, WatchdogLayer};
