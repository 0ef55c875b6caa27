//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BackendOptions (validated, immutable)
//!     → WatchdogLayer / StaticLimiter / build_transport
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_options, parse_options, ConfigError};
pub use schema::BackendOptions;
pub use schema::LimitConfig;
pub use schema::TransportConfig;
pub use schema::WatchdogConfig;
