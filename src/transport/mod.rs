//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! Backend issues request
//!     → Transport (type-erased tower service handed to factories)
//!     → watchdog.rs (arm per-request watchdog, race inner call vs. cancellation)
//!     → body.rs (request/response bodies kick the watchdog on progress)
//!     → tracker.rs (count live watcher tasks)
//!     → inner HTTP client (hyper-util legacy client, or any tower service)
//! ```
//!
//! # Design Decisions
//! - The watchdog is a tower layer; it can sit anywhere in a stack of
//!   retry/auth/logging decorators
//! - Cancellation is a `CancellationToken`; a token found in the request
//!   extensions acts as the parent context
//! - No retries here; a stalled exchange surfaces as an error to the caller

pub mod body;
pub mod error;
pub mod tracker;
pub mod watchdog;

use bytes::Bytes;
use http::{Request, Response};
use http_body::Body;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::BodyExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceBuilder};

use crate::config::TransportConfig;

pub use body::WatchdogBody;
pub use error::{TransportError, WatchdogError};
pub use tower::BoxError;
pub use tracker::{WatcherGuard, WatcherTracker};
pub use watchdog::{WatchdogLayer, WatchdogService};

/// Body type carried by a [`Transport`] in both directions.
pub type TransportBody = UnsyncBoxBody<Bytes, TransportError>;

/// Type-erased HTTP transport handed to backend factories.
pub type Transport = BoxCloneService<Request<TransportBody>, Response<TransportBody>, BoxError>;

/// Box an arbitrary tower HTTP service into a [`Transport`].
pub fn boxed_transport<S, B>(service: S) -> Transport
where
    S: Service<Request<TransportBody>, Response = Response<B>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let service = ServiceBuilder::new()
        .map_err(|err: S::Error| -> BoxError { err.into() })
        .map_response(|response: Response<B>| {
            response.map(|body| body.map_err(TransportError::new).boxed_unsync())
        })
        .service(service);
    BoxCloneService::new(service)
}

/// Build the default transport: a pooled hyper client behind the watchdog.
pub fn build_transport(config: &TransportConfig, watchdog: &WatchdogLayer) -> Transport {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
    connector.set_nodelay(true);

    let client: Client<HttpConnector, WatchdogBody<TransportBody>> =
        Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .build(connector);

    tracing::debug!(
        idle_timeout = ?watchdog.timeout(),
        chunk_size = watchdog.chunk_size(),
        connect_timeout_secs = config.connect_timeout_secs,
        "Built HTTP transport"
    );

    boxed_transport(watchdog.layer(client))
}
