//! Location strings.
//!
//! A location is `<scheme>:<backend-specific rest>`, e.g. `mem:scratch` or
//! `s3:host/bucket`. Strings whose scheme is not registered are treated as
//! paths of the `local` backend when one is available.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::backend::Backend;
use crate::limiter::Limiter;
use crate::location::registry::{BackendConfig, Factory, Registry};
use crate::observability::metrics;
use crate::transport::{BoxError, Transport};

/// Scheme used for bare filesystem paths.
pub const LOCAL_SCHEME: &str = "local";

/// Errors resolving a location string.
#[derive(Debug, Error)]
pub enum LocationError {
    /// No factory is registered for the scheme and no local fallback exists.
    #[error("invalid backend: unsupported scheme {scheme:?}")]
    UnsupportedBackend { scheme: String },

    /// The factory rejected the location string.
    #[error("invalid {scheme} location: {source}")]
    InvalidConfig {
        scheme: String,
        #[source]
        source: BoxError,
    },
}

/// A parsed location bound to the factory that understands it.
pub struct Location {
    scheme: String,
    config: BackendConfig,
    factory: Arc<dyn Factory>,
}

impl Location {
    /// Resolve `s` against `registry` and parse it with the matching factory.
    pub fn parse(registry: &Registry, s: &str) -> Result<Self, LocationError> {
        let scheme = extract_scheme(s);
        if let Some(factory) = registry.lookup(scheme) {
            return Self::with_factory(scheme, factory, s);
        }

        match registry.lookup(LOCAL_SCHEME) {
            Some(factory) => {
                Self::with_factory(LOCAL_SCHEME, factory, &format!("{}:{}", LOCAL_SCHEME, s))
            }
            None => Err(LocationError::UnsupportedBackend {
                scheme: scheme.to_string(),
            }),
        }
    }

    fn with_factory(scheme: &str, factory: Arc<dyn Factory>, s: &str) -> Result<Self, LocationError> {
        let config = factory
            .parse_config(s)
            .map_err(|source| LocationError::InvalidConfig {
                scheme: scheme.to_string(),
                source,
            })?;
        Ok(Self {
            scheme: scheme.to_string(),
            config,
            factory,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn factory(&self) -> &Arc<dyn Factory> {
        &self.factory
    }

    /// Create a new backend at this location.
    pub async fn create(
        &self,
        transport: Transport,
        limiter: Arc<dyn Limiter>,
    ) -> Result<Box<dyn Backend>, BoxError> {
        let backend = self.factory.create(&self.config, transport, limiter).await?;
        self.record("create", backend.as_ref());
        Ok(backend)
    }

    /// Open the existing backend at this location.
    pub async fn open(
        &self,
        transport: Transport,
        limiter: Arc<dyn Limiter>,
    ) -> Result<Box<dyn Backend>, BoxError> {
        let backend = self.factory.open(&self.config, transport, limiter).await?;
        self.record("open", backend.as_ref());
        Ok(backend)
    }

    fn record(&self, op: &'static str, backend: &dyn Backend) {
        metrics::record_backend_opened(&self.scheme, op);
        tracing::debug!(
            scheme = %self.scheme,
            op,
            location = %backend.location(),
            "Backend ready"
        );
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("scheme", &self.scheme)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Redact credentials from a location string for display.
///
/// Strings with an unknown scheme are returned unchanged.
pub fn strip_password(registry: &Registry, s: &str) -> String {
    let scheme = extract_scheme(s);
    if scheme.is_empty() {
        return s.to_string();
    }
    match registry.lookup(scheme) {
        Some(factory) => factory.strip_password(s),
        None => s.to_string(),
    }
}

/// Text before the first `:`, or the whole string if there is none.
fn extract_scheme(s: &str) -> &str {
    s.split_once(':').map_or(s, |(scheme, _)| scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_scheme() {
        assert_eq!(extract_scheme("mem:scratch"), "mem");
        assert_eq!(extract_scheme("s3:host/bucket:with:colons"), "s3");
        assert_eq!(extract_scheme("/srv/repo"), "/srv/repo");
        assert_eq!(extract_scheme(""), "");
    }
}
