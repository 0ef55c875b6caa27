//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, chunk size > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BackendOptions → Result<(), Vec<ValidationError>>

use std::fmt;

use crate::config::schema::BackendOptions;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `watchdog.chunk_size`.
    pub field: &'static str,
    pub message: &'static str,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration for values that deserialize fine but cannot work.
pub fn validate_config(config: &BackendOptions) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.watchdog.idle_timeout_secs == 0 {
        errors.push(ValidationError {
            field: "watchdog.idle_timeout_secs",
            message: "must be greater than zero",
        });
    }
    if config.watchdog.chunk_size == 0 {
        errors.push(ValidationError {
            field: "watchdog.chunk_size",
            message: "must be greater than zero",
        });
    }
    if config.transport.connect_timeout_secs == 0 {
        errors.push(ValidationError {
            field: "transport.connect_timeout_secs",
            message: "must be greater than zero",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
