//! Backend registry and generic factory.
//!
//! # Responsibilities
//! - Map URL schemes to backend factories
//! - Erase per-backend config and constructor types behind [`Factory`]
//! - Adapt transport-based and limiter-based constructors to one contract
//!
//! # Design Decisions
//! - Registration happens once at start-up; a duplicate scheme is a bug and panics
//! - The only type-erasure point is [`BackendConfig`]; a factory downcasts
//!   only configs it produced itself, and a mismatch panics instead of
//!   silently misbehaving
//! - Backend errors cross the contract boxed but otherwise untouched

use futures_util::future::BoxFuture;
use futures_util::TryFutureExt;
use std::any::{self, Any};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::backend::Backend;
use crate::limiter::Limiter;
use crate::transport::{BoxError, Transport};

/// Future returned by [`Factory::create`] and [`Factory::open`].
pub type BackendFuture = BoxFuture<'static, Result<Box<dyn Backend>, BoxError>>;

/// Opaque, parsed backend configuration.
///
/// Produced by [`Factory::parse_config`] and only meaningful to the factory
/// that produced it.
pub struct BackendConfig {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl BackendConfig {
    pub fn new<C: Any + Send + Sync>(config: C) -> Self {
        Self {
            value: Box::new(config),
            type_name: any::type_name::<C>(),
        }
    }

    /// Name of the concrete config type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<C: Any>(&self) -> Option<&C> {
        self.value.downcast_ref::<C>()
    }

    /// Downcast to the factory's own config type.
    ///
    /// # Panics
    /// If the config was produced by a different factory.
    fn expect_ref<C: Any>(&self) -> &C {
        match self.value.downcast_ref::<C>() {
            Some(config) => config,
            None => panic!(
                "backend config type mismatch: expected {}, got {}",
                any::type_name::<C>(),
                self.type_name
            ),
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Uniform creation contract implemented by every backend plugin.
pub trait Factory: Send + Sync {
    /// Parse a location string into this backend's config.
    fn parse_config(&self, s: &str) -> Result<BackendConfig, BoxError>;

    /// Redact credentials from a location string for display.
    fn strip_password(&self, s: &str) -> String;

    /// Create a new backend. Fails if one already exists where that applies.
    fn create(
        &self,
        config: &BackendConfig,
        transport: Transport,
        limiter: Arc<dyn Limiter>,
    ) -> BackendFuture;

    /// Open an existing backend. Fails if it does not exist.
    fn open(
        &self,
        config: &BackendConfig,
        transport: Transport,
        limiter: Arc<dyn Limiter>,
    ) -> BackendFuture;
}

type ParseFn<C> = dyn Fn(&str) -> Result<C, BoxError> + Send + Sync;
type StripFn = dyn Fn(&str) -> String + Send + Sync;
type BuildFuture<B> = BoxFuture<'static, Result<B, BoxError>>;
type BuildFn<C, B> = dyn Fn(C, Transport, Arc<dyn Limiter>) -> BuildFuture<B> + Send + Sync;

/// Factory built from strongly typed backend functions.
///
/// Use [`GenericFactory::http`] for backends that talk through a
/// [`Transport`] and [`GenericFactory::limited`] for backends that do their
/// own I/O under a [`Limiter`].
pub struct GenericFactory<C, B> {
    parse: Box<ParseFn<C>>,
    strip: Option<Box<StripFn>>,
    create: Box<BuildFn<C, B>>,
    open: Box<BuildFn<C, B>>,
}

impl<C, B> GenericFactory<C, B>
where
    C: Clone + Send + Sync + 'static,
    B: Backend + 'static,
{
    /// Factory for backends constructed from a transport; the limiter is ignored.
    pub fn http<P, PE, Cr, CrF, Op, OpF, E>(parse: P, create: Cr, open: Op) -> Self
    where
        P: Fn(&str) -> Result<C, PE> + Send + Sync + 'static,
        PE: Into<BoxError>,
        Cr: Fn(C, Transport) -> CrF + Send + Sync + 'static,
        CrF: Future<Output = Result<B, E>> + Send + 'static,
        Op: Fn(C, Transport) -> OpF + Send + Sync + 'static,
        OpF: Future<Output = Result<B, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            parse: Box::new(move |s: &str| -> Result<C, BoxError> {
                parse(s).map_err(Into::into)
            }),
            strip: None,
            create: Box::new(
                move |config: C, transport: Transport, _: Arc<dyn Limiter>| -> BuildFuture<B> {
                    Box::pin(create(config, transport).map_err(Into::<BoxError>::into))
                },
            ),
            open: Box::new(
                move |config: C, transport: Transport, _: Arc<dyn Limiter>| -> BuildFuture<B> {
                    Box::pin(open(config, transport).map_err(Into::<BoxError>::into))
                },
            ),
        }
    }

    /// Factory for backends constructed from a limiter; the transport is ignored.
    pub fn limited<P, PE, Cr, CrF, Op, OpF, E>(parse: P, create: Cr, open: Op) -> Self
    where
        P: Fn(&str) -> Result<C, PE> + Send + Sync + 'static,
        PE: Into<BoxError>,
        Cr: Fn(C, Arc<dyn Limiter>) -> CrF + Send + Sync + 'static,
        CrF: Future<Output = Result<B, E>> + Send + 'static,
        Op: Fn(C, Arc<dyn Limiter>) -> OpF + Send + Sync + 'static,
        OpF: Future<Output = Result<B, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self {
            parse: Box::new(move |s: &str| -> Result<C, BoxError> {
                parse(s).map_err(Into::into)
            }),
            strip: None,
            create: Box::new(
                move |config: C, _: Transport, limiter: Arc<dyn Limiter>| -> BuildFuture<B> {
                    Box::pin(create(config, limiter).map_err(Into::<BoxError>::into))
                },
            ),
            open: Box::new(
                move |config: C, _: Transport, limiter: Arc<dyn Limiter>| -> BuildFuture<B> {
                    Box::pin(open(config, limiter).map_err(Into::<BoxError>::into))
                },
            ),
        }
    }

    /// Redact location strings with `strip` instead of returning them unchanged.
    pub fn with_strip_password<F>(mut self, strip: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.strip = Some(Box::new(strip));
        self
    }

    fn build(
        build: &BuildFn<C, B>,
        config: &BackendConfig,
        transport: Transport,
        limiter: Arc<dyn Limiter>,
    ) -> BackendFuture {
        let config = config.expect_ref::<C>().clone();
        let backend = build(config, transport, limiter);
        Box::pin(async move {
            let backend: Box<dyn Backend> = Box::new(backend.await?);
            Ok::<_, BoxError>(backend)
        })
    }
}

impl<C, B> Factory for GenericFactory<C, B>
where
    C: Clone + Send + Sync + 'static,
    B: Backend + 'static,
{
    fn parse_config(&self, s: &str) -> Result<BackendConfig, BoxError> {
        (self.parse)(s).map(BackendConfig::new)
    }

    fn strip_password(&self, s: &str) -> String {
        match &self.strip {
            Some(strip) => strip(s),
            None => s.to_string(),
        }
    }

    fn create(
        &self,
        config: &BackendConfig,
        transport: Transport,
        limiter: Arc<dyn Limiter>,
    ) -> BackendFuture {
        Self::build(&*self.create, config, transport, limiter)
    }

    fn open(
        &self,
        config: &BackendConfig,
        transport: Transport,
        limiter: Arc<dyn Limiter>,
    ) -> BackendFuture {
        Self::build(&*self.open, config, transport, limiter)
    }
}

impl<C, B> fmt::Debug for GenericFactory<C, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericFactory")
            .field("config", &any::type_name::<C>())
            .field("backend", &any::type_name::<B>())
            .field("strips_password", &self.strip.is_some())
            .finish()
    }
}

/// Scheme → factory map, filled once at start-up and read-only afterwards.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Arc<dyn Factory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `scheme`.
    ///
    /// # Panics
    /// If `scheme` is already registered.
    pub fn register(&mut self, scheme: &str, factory: Arc<dyn Factory>) {
        if self.factories.contains_key(scheme) {
            panic!("duplicate backend: {}", scheme);
        }
        tracing::debug!(scheme = %scheme, "Registered backend factory");
        self.factories.insert(scheme.to_string(), factory);
    }

    /// Factory for `scheme`, or `None` if the scheme is not supported.
    pub fn lookup(&self, scheme: &str) -> Option<Arc<dyn Factory>> {
        self.factories.get(scheme).cloned()
    }

    /// Registered schemes in sorted order.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
