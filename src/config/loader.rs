//! Configuration loading from disk.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::BackendOptions;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_options(content: &str) -> Result<BackendOptions, ConfigError> {
    let options: BackendOptions = toml::from_str(content)?;
    validate_config(&options).map_err(ConfigError::Validation)?;
    Ok(options)
}

/// Load and validate configuration from a TOML file.
pub fn load_options(path: &Path) -> Result<BackendOptions, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_options(&content)
}
