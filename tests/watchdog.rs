//! Watchdog transport behaviour under slow, stalled and cancelled exchanges.

use backhaul::transport::{
    boxed_transport, BoxError, TransportBody, TransportError, WatchdogBody, WatchdogError,
    WatchdogLayer,
};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::{service_fn, Layer, ServiceExt};

mod common;

const TIMEOUT: Duration = Duration::from_millis(50);

fn layer() -> WatchdogLayer {
    WatchdogLayer::new(TIMEOUT, 1024)
}

fn watchdog_error(err: &BoxError) -> &WatchdogError {
    err.downcast_ref::<WatchdogError>()
        .unwrap_or_else(|| panic!("expected a watchdog error, got {err}"))
}

fn body_watchdog_error(err: &TransportError) -> &WatchdogError {
    err.downcast_ref::<WatchdogError>()
        .unwrap_or_else(|| panic!("expected a watchdog error, got {err}"))
}

/// Let spawned watcher tasks observe cancellation and exit.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_trickling_download_completes() {
    let layer = layer();
    let seen = Arc::new(Mutex::new(None::<CancellationToken>));
    let captured = seen.clone();

    let inner = service_fn(move |req: Request<WatchdogBody<TransportBody>>| {
        let captured = captured.clone();
        async move {
            let token = req.extensions().get::<CancellationToken>().cloned();
            *captured.lock().unwrap() = token;
            Ok::<_, BoxError>(Response::new(common::trickle(
                5,
                100,
                Duration::from_millis(20),
            )))
        }
    });
    let transport = boxed_transport(layer.layer(inner));

    let response = transport.oneshot(Request::new(common::empty())).await.unwrap();
    let mut body = response.into_body();
    let mut received = 0;
    while let Some(frame) = body.frame().await {
        received += frame.unwrap().into_data().unwrap().len();
    }
    assert_eq!(received, 500);

    // A fully read body stands the watcher down even while it is still held.
    settle().await;
    assert_eq!(layer.tracker().active_count(), 0);
    tokio::time::sleep(TIMEOUT * 2).await;

    let token = seen.lock().unwrap().clone().unwrap();
    assert!(!token.is_cancelled(), "completed exchange must not be cancelled");

    drop(body);
    assert!(token.is_cancelled(), "closing the body releases the exchange");
}

#[tokio::test(start_paused = true)]
async fn test_stalled_download_is_cancelled() {
    let layer = layer();
    let transport = boxed_transport(layer.layer(service_fn(
        |_req: Request<WatchdogBody<TransportBody>>| async {
            Ok::<_, BoxError>(Response::new(common::stall_after(&[b'x'; 100])))
        },
    )));

    let start = Instant::now();
    let response = transport.oneshot(Request::new(common::empty())).await.unwrap();
    let mut body = response.into_body();

    let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
    assert_eq!(first.len(), 100);

    let err = body.frame().await.unwrap().unwrap_err();
    let elapsed = start.elapsed();
    assert_eq!(*body_watchdog_error(&err), WatchdogError::Stalled { timeout: TIMEOUT });
    assert!(elapsed >= TIMEOUT, "cancelled early after {elapsed:?}");
    assert!(elapsed < TIMEOUT + Duration::from_millis(10), "cancelled late after {elapsed:?}");

    // A failed body stays failed.
    assert!(body.frame().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_first_byte_is_cancelled() {
    let transport = layer().layer(service_fn(|_req: Request<WatchdogBody<TransportBody>>| async {
        Ok::<_, BoxError>(Response::new(common::trickle(
            1,
            10,
            Duration::from_millis(80),
        )))
    }));

    let response = transport.oneshot(Request::new(common::empty())).await.unwrap();
    let err = response.into_body().collect().await.unwrap_err();
    assert!(body_watchdog_error(&err).is_stall());
}

#[tokio::test(start_paused = true)]
async fn test_slow_response_headers_are_cancelled() {
    let layer = layer();
    let transport = boxed_transport(layer.layer(service_fn(
        |_req: Request<WatchdogBody<TransportBody>>| async {
            tokio::time::sleep(Duration::from_millis(80)).await;
            Ok::<_, BoxError>(Response::new(common::empty()))
        },
    )));

    let start = Instant::now();
    let err = transport
        .oneshot(Request::new(common::empty()))
        .await
        .unwrap_err();
    assert!(watchdog_error(&err).is_stall());
    assert!(start.elapsed() < Duration::from_millis(80));

    settle().await;
    assert_eq!(layer.tracker().active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_upload_is_kept_alive() {
    let inner = service_fn(|req: Request<WatchdogBody<TransportBody>>| async move {
        let uploaded = req.into_body().collect().await?.to_bytes();
        Ok::<_, BoxError>(Response::new(Full::new(Bytes::from(
            uploaded.len().to_string(),
        ))))
    });
    let transport = boxed_transport(layer().layer(inner));

    let request = Request::new(common::trickle(5, 100, Duration::from_millis(20)));
    let response = transport.oneshot(request).await.unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body, Bytes::from_static(b"500"));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_upload_is_cancelled() {
    let layer = layer();
    let inner = service_fn(|req: Request<WatchdogBody<TransportBody>>| async move {
        let uploaded = req.into_body().collect().await?.to_bytes();
        Ok::<_, BoxError>(Response::new(Full::new(uploaded)))
    });
    let transport = boxed_transport(layer.layer(inner));

    let start = Instant::now();
    let err = transport
        .oneshot(Request::new(common::stall_after(b"abc")))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(*watchdog_error(&err), WatchdogError::Stalled { timeout: TIMEOUT });
    assert!(elapsed >= TIMEOUT, "cancelled early after {elapsed:?}");
    assert!(elapsed < TIMEOUT + Duration::from_millis(10), "cancelled late after {elapsed:?}");

    settle().await;
    assert_eq!(layer.tracker().active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_response_early_stops_watcher() {
    let layer = layer();
    let transport = boxed_transport(layer.layer(service_fn(
        |_req: Request<WatchdogBody<TransportBody>>| async {
            Ok::<_, BoxError>(Response::new(common::stall_after(b"abc")))
        },
    )));

    let response = transport.oneshot(Request::new(common::empty())).await.unwrap();
    assert_eq!(layer.tracker().active_count(), 1);

    drop(response);
    settle().await;
    assert_eq!(layer.tracker().active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_inner_error_is_returned_unchanged() {
    let layer = layer();
    let transport = boxed_transport(layer.layer(service_fn(
        |_req: Request<WatchdogBody<TransportBody>>| async {
            Err::<Response<TransportBody>, _>(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ))
        },
    )));

    let err = transport
        .oneshot(Request::new(common::empty()))
        .await
        .unwrap_err();
    let io = err.downcast_ref::<std::io::Error>().unwrap();
    assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);

    settle().await;
    assert_eq!(layer.tracker().active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_propagates() {
    let transport = boxed_transport(layer().layer(service_fn(
        |_req: Request<WatchdogBody<TransportBody>>| async {
            std::future::pending::<()>().await;
            Ok::<_, BoxError>(Response::new(common::empty()))
        },
    )));

    let parent = CancellationToken::new();
    let canceller = parent.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel();
    });

    let mut request = Request::new(common::empty());
    request.extensions_mut().insert(parent);
    let err = transport.oneshot(request).await.unwrap_err();
    assert_eq!(*watchdog_error(&err), WatchdogError::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_large_frames_are_split() {
    let transport = boxed_transport(layer().layer(service_fn(
        |_req: Request<WatchdogBody<TransportBody>>| async {
            Ok::<_, BoxError>(Response::new(common::full(vec![7u8; 2500])))
        },
    )));

    let response = transport.oneshot(Request::new(common::empty())).await.unwrap();
    let sizes = common::frame_sizes(response.into_body()).await.unwrap();
    assert_eq!(sizes, [1024, 1024, 452]);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_are_independent() {
    let layer = layer();
    let svc = layer.layer(service_fn(|req: Request<WatchdogBody<TransportBody>>| async move {
        let stall = req.headers().contains_key("x-stall");
        let body = if stall {
            common::stall_after(b"x")
        } else {
            common::trickle(3, 10, Duration::from_millis(30))
        };
        Ok::<_, BoxError>(Response::new(body))
    }));
    let transport = boxed_transport(svc);

    let stalled = Request::builder()
        .header("x-stall", "1")
        .body(common::empty())
        .unwrap();
    let healthy = Request::new(common::empty());

    let (stalled, healthy) = tokio::join!(
        async {
            let response = transport.clone().oneshot(stalled).await.unwrap();
            response.into_body().collect().await.map(|_| ())
        },
        async {
            let response = transport.clone().oneshot(healthy).await?;
            Ok::<_, BoxError>(response.into_body().collect().await?.to_bytes())
        },
    );

    assert!(body_watchdog_error(&stalled.unwrap_err()).is_stall());
    assert_eq!(healthy.unwrap().len(), 30);
}
