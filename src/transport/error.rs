//! Transport error definitions.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::transport::BoxError;

/// Errors raised by the watchdog itself.
///
/// Errors from the wrapped transport or body are passed through untouched;
/// only the two ways a watchdog can cut an exchange short live here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchdogError {
    /// No upload or download progress was observed within the idle timeout.
    #[error("request stalled: no progress within {timeout:?}")]
    Stalled { timeout: Duration },

    /// The request's parent cancellation token was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

impl WatchdogError {
    /// Returns true if the watchdog timer fired.
    pub fn is_stall(&self) -> bool {
        matches!(self, WatchdogError::Stalled { .. })
    }
}

/// Error yielded by transport bodies.
///
/// A concrete type rather than a bare [`BoxError`], so body types stay free of
/// trait-object lifetimes and can be held across `.await` in `Send` futures.
#[derive(Debug)]
pub struct TransportError {
    inner: BoxError,
}

impl TransportError {
    /// Wrap `error`; an error that already is a `TransportError` is not wrapped twice.
    pub fn new(error: impl Into<BoxError>) -> Self {
        let error: BoxError = error.into();
        match error.downcast::<TransportError>() {
            Ok(error) => *error,
            Err(inner) => Self { inner },
        }
    }

    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Returns true if the body was cut short by the watchdog timer.
    pub fn is_stall(&self) -> bool {
        self.downcast_ref::<WatchdogError>()
            .is_some_and(WatchdogError::is_stall)
    }

    pub fn into_inner(self) -> BoxError {
        self.inner
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.inner)
    }
}
