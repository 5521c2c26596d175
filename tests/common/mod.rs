//! Shared test infrastructure for integration tests.
//!
//! Provides throwaway HTTP backends, configuration and pipeline
//! builders, client constructors, and utility functions used across all
//! integration test modules.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use turnstile::{BoxBody, Gate, GateConfig, HttpClient, RequestLog, RequestPipeline};

/// A synthetic peer address used in all test invocations.
pub const TEST_PEER: &str = "192.168.1.100:54321";

/// Initializes a tracing subscriber for test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

pub fn test_peer() -> SocketAddr {
    TEST_PEER.parse().unwrap()
}

pub fn test_client() -> HttpClient {
    Client::builder(TokioExecutor::new())
        .build(hyper_util::client::legacy::connect::HttpConnector::new())
}

pub fn empty_body() -> Empty<Bytes> {
    Empty::<Bytes>::new()
}

/// Collects a [`BoxBody`] into [`Bytes`], mapping any body error to a
/// descriptive panic so test assertions remain concise.
pub async fn collect_body(body: BoxBody) -> Bytes {
    body.collect()
        .await
        .expect("failed to collect response body")
        .to_bytes()
}

/// Builds a `GateConfig` targeting the given local backend address.
///
/// The policy fields are defaults; tests compose the pipeline they want
/// explicitly, so only `upstream` and `request_timeout` matter here.
pub fn test_config(upstream: SocketAddr) -> Arc<GateConfig> {
    Arc::new(base_config(upstream))
}

/// Builds a `GateConfig` with a short upstream round-trip timeout.
pub fn test_config_with_timeout(upstream: SocketAddr, timeout: Duration) -> Arc<GateConfig> {
    let mut config = base_config(upstream);
    config.request_timeout = timeout;
    Arc::new(config)
}

fn base_config(upstream: SocketAddr) -> GateConfig {
    GateConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        upstream: format!("http://{upstream}").parse().unwrap(),
        open_hour: 0,
        close_hour: 23,
        rate_limit_requests: 5,
        rate_limit_window: Duration::from_secs(60),
        protected_prefixes: vec!["/".into()],
        allowed_roles: vec!["admin".into(), "moderator".into(), "staff".into()],
        request_log_file: std::env::temp_dir().join("turnstile-test-requests.log"),
        request_timeout: Duration::from_secs(30),
        max_concurrent_requests: 1000,
    }
}

/// A pipeline with no gates and no request log: every request delegates.
pub fn passthrough_pipeline() -> Arc<RequestPipeline> {
    pipeline_with(vec![])
}

/// A pipeline with the given gates and no request log.
pub fn pipeline_with(gates: Vec<Box<dyn Gate>>) -> Arc<RequestPipeline> {
    Arc::new(RequestPipeline::new(RequestLog::disabled(), gates))
}

/// Returns a unique path under the system temp directory.
pub fn temp_path(prefix: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join("turnstile-test");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(format!("{prefix}-{}.log", std::process::id()))
}

/// Starts a local HTTP server that responds to every request with the
/// given status, content-type, and body. Returns the server address and
/// a handle to shut it down.
pub async fn start_backend(
    status: StatusCode,
    content_type: &'static str,
    body: &'static str,
) -> (SocketAddr, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel::<()>();

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("failed to bind test backend");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut shutdown = std::pin::pin!(async {
            let _ = rx.await;
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result.expect("accept failed");
                    let service = service_fn(move |_req: Request<Incoming>| {
                        async move {
                            Ok::<_, std::convert::Infallible>(
                                Response::builder()
                                    .status(status)
                                    .header("content-type", content_type)
                                    .body(Full::new(Bytes::from(body)))
                                    .expect("test response must build"),
                            )
                        }
                    });
                    tokio::spawn(async move {
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
                () = &mut shutdown => break,
            }
        }
    });

    (addr, tx)
}

/// Starts a backend that counts the requests it receives, so tests can
/// assert whether the gateway actually delegated.
pub async fn start_counting_backend() -> (SocketAddr, Arc<AtomicUsize>, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel::<()>();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_inner = Arc::clone(&hits);

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("failed to bind test backend");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut shutdown = std::pin::pin!(async {
            let _ = rx.await;
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result.expect("accept failed");
                    let hits = Arc::clone(&hits_inner);
                    let service = service_fn(move |_req: Request<Incoming>| {
                        let hits = Arc::clone(&hits);
                        async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            Ok::<_, std::convert::Infallible>(
                                Response::builder()
                                    .status(StatusCode::OK)
                                    .header("content-type", "text/plain")
                                    .body(Full::new(Bytes::from("ok")))
                                    .expect("test response must build"),
                            )
                        }
                    });
                    tokio::spawn(async move {
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
                () = &mut shutdown => break,
            }
        }
    });

    (addr, hits, tx)
}

/// Starts a local backend that captures and echoes request headers as the
/// response body. Used to verify the gateway's header transformations.
pub async fn start_echo_headers_backend() -> (SocketAddr, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel::<()>();

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("failed to bind test backend");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut shutdown = std::pin::pin!(async {
            let _ = rx.await;
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result.expect("accept failed");
                    let service = service_fn(|req: Request<Incoming>| async move {
                        let mut lines = Vec::new();
                        for (name, value) in req.headers() {
                            if let Ok(v) = value.to_str() {
                                lines.push(format!("{}: {}", name.as_str(), v));
                            }
                        }
                        lines.sort();
                        let body = lines.join("\n");
                        Ok::<_, std::convert::Infallible>(
                            Response::builder()
                                .status(StatusCode::OK)
                                .header("content-type", "text/plain")
                                .body(Full::new(Bytes::from(body)))
                                .expect("test response must build"),
                        )
                    });
                    tokio::spawn(async move {
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
                () = &mut shutdown => break,
            }
        }
    });

    (addr, tx)
}

/// Starts a backend that sleeps for the given duration before responding.
pub async fn start_slow_backend(delay: Duration) -> (SocketAddr, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel::<()>();

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("failed to bind test backend");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut shutdown = std::pin::pin!(async {
            let _ = rx.await;
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = result.expect("accept failed");
                    let service = service_fn(move |_req: Request<Incoming>| async move {
                        tokio::time::sleep(delay).await;
                        Ok::<_, std::convert::Infallible>(
                            Response::builder()
                                .status(StatusCode::OK)
                                .header("content-type", "text/plain")
                                .body(Full::new(Bytes::from("slow")))
                                .expect("test response must build"),
                        )
                    });
                    tokio::spawn(async move {
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
                () = &mut shutdown => break,
            }
        }
    });

    (addr, tx)
}
