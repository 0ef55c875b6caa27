//! Shared utilities for integration tests.

#![allow(dead_code)]

use backhaul::transport::{boxed_transport, BoxError, Transport, TransportBody, TransportError};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use http::{Request, Response};
use http_body::Frame;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::service_fn;

pub fn full(data: impl Into<Bytes>) -> TransportBody {
    Full::new(data.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

pub fn empty() -> TransportBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

/// Body yielding `count` chunks of `size` bytes, sleeping `interval` before each.
pub fn trickle(count: usize, size: usize, interval: Duration) -> TransportBody {
    let frames = stream::unfold(0, move |sent| async move {
        if sent == count {
            return None;
        }
        tokio::time::sleep(interval).await;
        let frame = Frame::data(Bytes::from(vec![b'x'; size]));
        Some((Ok::<_, TransportError>(frame), sent + 1))
    });
    StreamBody::new(frames).boxed_unsync()
}

/// Body yielding `data` once and then never making progress again.
pub fn stall_after(data: &'static [u8]) -> TransportBody {
    let first = stream::iter([Ok::<_, TransportError>(Frame::data(Bytes::from_static(data)))]);
    StreamBody::new(first.chain(stream::pending())).boxed_unsync()
}

/// Transport whose responses carry `make_body()` after waiting `delay`.
pub fn respond_with<F>(delay: Duration, make_body: F) -> Transport
where
    F: Fn() -> TransportBody + Clone + Send + Sync + 'static,
{
    boxed_transport(service_fn(move |_req: Request<TransportBody>| {
        let make_body = make_body.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok::<_, BoxError>(Response::new(make_body()))
        }
    }))
}

/// Transport for backends that never touch the network.
pub fn unused_transport() -> Transport {
    boxed_transport(service_fn(|_req: Request<TransportBody>| async {
        Err::<Response<TransportBody>, BoxError>("transport not expected in this test".into())
    }))
}

/// Collect a response body, keeping the size of every data frame.
pub async fn frame_sizes(mut body: TransportBody) -> Result<Vec<usize>, BoxError> {
    let mut sizes = Vec::new();
    while let Some(frame) = body.frame().await {
        if let Ok(data) = frame?.into_data() {
            sizes.push(data.len());
        }
    }
    Ok(sizes)
}

/// Start a mock HTTP server that answers every request with `response`.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock HTTP server that sends headers and part of the body, then hangs.
pub async fn start_stalling_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;
                        let _ = socket
                            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial")
                            .await;
                        // Keep the connection open without sending the rest.
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
