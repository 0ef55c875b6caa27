//! Progress-reporting body wrapper.
//!
//! # Responsibilities
//! - Kick the watchdog before every poll of the wrapped body and again once
//!   the poll completes
//! - Cap each yielded data frame at `chunk_size` bytes
//! - Fail the stream once the watchdog has cancelled the exchange
//! - Stand the watcher down once the response body is fully read
//! - Run the close action before the wrapped body is dropped
//!
//! # Design Decisions
//! - Closing a body is dropping it; the close action is a field declared
//!   ahead of `inner`, so it always drops first
//! - Oversized frames are split and the tail buffered; the caller still sees
//!   every byte, just in bounded pieces

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio_util::sync::WaitForCancellationFutureOwned;

use crate::transport::error::TransportError;
use crate::transport::watchdog::{Progress, Watchdog};
use crate::transport::BoxError;

pin_project! {
    /// Body that keeps a request's watchdog alive while data flows.
    ///
    /// Wraps both the outgoing request body (no close action; the transport
    /// owns its lifecycle) and the incoming response body (close action
    /// cancels the watchdog, stopping its watcher task).
    ///
    /// The watchdog assumes the body is polled continuously. A caller that
    /// stops polling for longer than the idle timeout will see the stream
    /// fail on its next poll.
    pub struct WatchdogBody<B> {
        close: Option<Watchdog>,
        #[pin]
        inner: B,
        progress: Progress,
        cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
        remainder: Bytes,
        chunk_size: usize,
        finished: bool,
    }
}

impl<B> WatchdogBody<B> {
    pub(crate) fn new(
        inner: B,
        chunk_size: usize,
        progress: Progress,
        close: Option<Watchdog>,
    ) -> Self {
        let cancelled = Box::pin(progress.token().clone().cancelled_owned());
        Self {
            close,
            inner,
            progress,
            cancelled,
            remainder: Bytes::new(),
            chunk_size: chunk_size.max(1),
            finished: false,
        }
    }

    /// Maximum number of bytes yielded per data frame.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns a reference to the wrapped body.
    pub fn get_ref(&self) -> &B {
        &self.inner
    }
}

impl<B> fmt::Debug for WatchdogBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchdogBody")
            .field("chunk_size", &self.chunk_size)
            .field("buffered", &self.remainder.len())
            .field("closes_watchdog", &self.close.is_some())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<B> Body for WatchdogBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = TransportError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        if *this.finished {
            return Poll::Ready(None);
        }

        if this.cancelled.as_mut().poll(cx).is_ready() {
            *this.finished = true;
            return Poll::Ready(Some(Err(TransportError::new(this.progress.error()))));
        }

        this.progress.kick();

        if !this.remainder.is_empty() {
            let chunk = if this.remainder.len() > *this.chunk_size {
                this.remainder.split_to(*this.chunk_size)
            } else {
                std::mem::take(this.remainder)
            };
            this.progress.kick();
            return Poll::Ready(Some(Ok(Frame::data(chunk))));
        }

        let polled = ready!(this.inner.poll_frame(cx));
        this.progress.kick();

        match polled {
            None => {
                *this.finished = true;
                // The exchange is over once the response is drained; the
                // request body ending says nothing about the response.
                if this.close.is_some() {
                    this.progress.finish();
                }
                Poll::Ready(None)
            }
            Some(Err(err)) => Poll::Ready(Some(Err(TransportError::new(err)))),
            Some(Ok(frame)) => match frame.into_data() {
                Ok(mut data) => {
                    if data.len() > *this.chunk_size {
                        *this.remainder = data.split_off(*this.chunk_size);
                    }
                    Poll::Ready(Some(Ok(Frame::data(data))))
                }
                // Trailers pass through as-is.
                Err(frame) => Poll::Ready(Some(Ok(frame))),
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished || (self.remainder.is_empty() && self.inner.is_end_stream())
    }

    fn size_hint(&self) -> SizeHint {
        let mut hint = self.inner.size_hint();
        let buffered = self.remainder.len() as u64;
        if buffered > 0 {
            if let Some(upper) = hint.upper() {
                hint.set_upper(upper + buffered);
            }
            hint.set_lower(hint.lower() + buffered);
        }
        hint
    }
}
