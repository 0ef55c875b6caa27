//! Watchdog transport.
//!
//! Cancels an HTTP exchange when an upload or download stops making progress
//! for longer than the idle timeout. The gap between fully sending the request
//! and receiving the response headers is bounded by the same timeout, so a
//! request stuck anywhere in flight is eventually cancelled.
//!
//! # Per-request lifecycle
//! ```text
//! call(request)
//!     → arm watchdog (progress clock + cancellation token, child of any
//!       parent token found in the request extensions)
//!     → spawn watcher: sleep until deadline, re-check (kicks move it),
//!       cancel on a real expiry; exit as soon as the token is cancelled
//!     → request body wrapped (kick only)
//!     → inner call raced against the token
//!         Err   → returned as-is; watchdog dropped, watcher exits
//!         Ok    → response body wrapped (kick + close); the body now owns
//!                 the watchdog, stands the watcher down at end of stream
//!                 and cancels the token when dropped
//! ```
//!
//! The watchdog assumes transfers happen continuously. A caller must not
//! pause between polls of the response body for longer than the timeout.

use futures_util::future::BoxFuture;
use http::{Request, Response};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

use crate::config::WatchdogConfig;
use crate::observability::metrics;
use crate::transport::body::WatchdogBody;
use crate::transport::error::WatchdogError;
use crate::transport::tracker::{WatcherGuard, WatcherTracker};
use crate::transport::BoxError;

/// Progress clock shared by a watcher and the bodies it guards.
#[derive(Debug)]
struct Clock {
    origin: Instant,
    timeout: Duration,
    /// Nanoseconds since `origin` of the most recent kick.
    last_kick: AtomicU64,
    fired: AtomicBool,
}

impl Clock {
    fn new(timeout: Duration) -> Self {
        Self {
            origin: Instant::now(),
            timeout,
            last_kick: AtomicU64::new(0),
            fired: AtomicBool::new(false),
        }
    }
}

/// Handle used to report progress on one exchange.
#[derive(Debug, Clone)]
pub(crate) struct Progress {
    clock: Arc<Clock>,
    token: CancellationToken,
    /// Cancelled once the response body has been read to the end.
    done: CancellationToken,
}

impl Progress {
    /// Push the deadline to `timeout` from now.
    pub(crate) fn kick(&self) {
        let nanos = u64::try_from(self.clock.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        // Concurrent kicks from request and response bodies must never move
        // the deadline backwards.
        self.clock.last_kick.fetch_max(nanos, Ordering::AcqRel);
    }

    pub(crate) fn deadline(&self) -> Instant {
        let last_kick = Duration::from_nanos(self.clock.last_kick.load(Ordering::Acquire));
        self.clock.origin + last_kick + self.clock.timeout
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Stop the watcher without cancelling the exchange.
    pub(crate) fn finish(&self) {
        self.done.cancel();
    }

    /// The error an exchange cut short by this watchdog should report.
    pub(crate) fn error(&self) -> WatchdogError {
        if self.clock.fired.load(Ordering::SeqCst) {
            WatchdogError::Stalled {
                timeout: self.clock.timeout,
            }
        } else {
            WatchdogError::Cancelled
        }
    }
}

/// An armed watchdog. Dropping it cancels the exchange and stops the watcher.
#[derive(Debug)]
pub(crate) struct Watchdog {
    progress: Progress,
}

impl Watchdog {
    /// Arm a watchdog and spawn its watcher task.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn arm(
        timeout: Duration,
        parent: Option<&CancellationToken>,
        tracker: &WatcherTracker,
    ) -> Self {
        let token = match parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let progress = Progress {
            clock: Arc::new(Clock::new(timeout)),
            token,
            done: CancellationToken::new(),
        };

        let guard = tracker.track();
        tokio::spawn(watch(progress.clone(), guard));

        Self { progress }
    }

    pub(crate) fn progress(&self) -> &Progress {
        &self.progress
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.progress.token.cancel();
    }
}

/// Watcher task: two states (armed, done), two ways out.
async fn watch(progress: Progress, guard: WatcherGuard) {
    loop {
        let deadline = progress.deadline();
        tokio::select! {
            biased;
            _ = progress.token.cancelled() => return,
            _ = progress.done.cancelled() => return,
            _ = time::sleep_until(deadline) => {
                if progress.deadline() > Instant::now() {
                    // Kicked while asleep.
                    continue;
                }
                progress.clock.fired.store(true, Ordering::SeqCst);
                tracing::debug!(
                    watcher = guard.seq(),
                    timeout = ?progress.clock.timeout,
                    "No transfer progress within idle timeout, cancelling request"
                );
                metrics::record_stall();
                progress.token.cancel();
                return;
            }
        }
    }
}

/// Tower layer that applies [`WatchdogService`] to an HTTP transport.
#[derive(Debug, Clone)]
pub struct WatchdogLayer {
    timeout: Duration,
    chunk_size: usize,
    tracker: WatcherTracker,
}

impl WatchdogLayer {
    /// Create a layer cancelling exchanges idle for longer than `timeout`,
    /// reading at most `chunk_size` bytes per body poll.
    pub fn new(timeout: Duration, chunk_size: usize) -> Self {
        Self {
            timeout,
            chunk_size,
            tracker: WatcherTracker::new(),
        }
    }

    /// Create a layer from the `[watchdog]` configuration section.
    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::new(
            Duration::from_secs(config.idle_timeout_secs),
            config.chunk_size,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Live watcher bookkeeping shared by every service built from this layer.
    pub fn tracker(&self) -> &WatcherTracker {
        &self.tracker
    }
}

impl<S> Layer<S> for WatchdogLayer {
    type Service = WatchdogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WatchdogService {
            inner,
            timeout: self.timeout,
            chunk_size: self.chunk_size,
            tracker: self.tracker.clone(),
        }
    }
}

/// HTTP transport decorator enforcing an idle timeout on every exchange.
///
/// Stateless across requests: each call gets its own clock, token and
/// watcher, so one instance serves any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct WatchdogService<S> {
    inner: S,
    timeout: Duration,
    chunk_size: usize,
    tracker: WatcherTracker,
}

impl<S> WatchdogService<S> {
    pub fn new(inner: S, timeout: Duration, chunk_size: usize) -> Self {
        WatchdogLayer::new(timeout, chunk_size).layer(inner)
    }

    pub fn tracker(&self) -> &WatcherTracker {
        &self.tracker
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for WatchdogService<S>
where
    S: Service<Request<WatchdogBody<ReqBody>>, Response = Response<ResBody>>,
    S::Error: Into<BoxError> + 'static,
    S::Future: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<WatchdogBody<ResBody>>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let parent = request.extensions().get::<CancellationToken>().cloned();
        let watchdog = Watchdog::arm(self.timeout, parent.as_ref(), &self.tracker);
        let progress = watchdog.progress().clone();

        // Re-home the request on the derived token so inner layers can observe it.
        let (mut parts, body) = request.into_parts();
        parts.extensions.insert(progress.token().clone());
        let body = WatchdogBody::new(body, self.chunk_size, progress, None);

        let response = self.inner.call(Request::from_parts(parts, body));
        Box::pin(respond(response, watchdog, self.chunk_size))
    }
}

async fn respond<F, B, E>(
    response: F,
    watchdog: Watchdog,
    chunk_size: usize,
) -> Result<Response<WatchdogBody<B>>, BoxError>
where
    F: Future<Output = Result<Response<B>, E>>,
    E: Into<BoxError> + 'static,
{
    let progress = watchdog.progress().clone();
    let result = tokio::select! {
        biased;
        _ = progress.token().cancelled() => return Err(progress.error().into()),
        result = response => result,
    };

    let response = match result {
        Ok(response) => response,
        Err(err) => return Err(err.into()),
    };

    let (parts, body) = response.into_parts();
    let body = WatchdogBody::new(body, chunk_size, progress, Some(watchdog));
    Ok(Response::from_parts(parts, body))
}
