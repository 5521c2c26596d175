//! Server accept loop, background tasks, and graceful shutdown.
//!
//! Contains the runtime infrastructure between the TCP listener and the
//! per-request handler. This module is deliberately decoupled from
//! `main()` so the server logic remains testable and reusable without
//! pulling in process-level concerns like signal handling or
//! `std::process::exit`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Response;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::limiter::SlidingWindowLimiter;
use crate::pipeline::RequestPipeline;
use crate::proxy::{handle_request, BoxBody, HttpClient};
use crate::{GateConfig, GateError};

/// Runtime state shared across the accept loop.
pub struct ServerState {
    /// Validated gateway configuration shared by all handlers.
    pub config: Arc<GateConfig>,
    /// The policy pipeline every request runs through.
    pub pipeline: Arc<RequestPipeline>,
    /// Bounds the number of concurrent in-flight requests.
    pub semaphore: Arc<Semaphore>,
    /// Cached value of the semaphore capacity, used in error responses.
    pub concurrency_limit: usize,
}

/// Accepts connections on `listener` and dispatches them through the
/// policy pipeline and upstream client.
///
/// Runs until `shutdown` resolves, then stops accepting new connections
/// and returns. In-flight requests on already-spawned tasks continue to
/// completion independently.
pub async fn serve(
    listener: TcpListener,
    client: HttpClient,
    state: ServerState,
    shutdown: impl Future<Output = ()>,
) {
    let ServerState {
        config,
        pipeline,
        semaphore,
        concurrency_limit,
    } = state;

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(%e, "failed to accept connection");
                        continue;
                    }
                };

                let client = client.clone();
                let config = Arc::clone(&config);
                let pipeline = Arc::clone(&pipeline);
                let semaphore = Arc::clone(&semaphore);

                tokio::spawn(async move {
                    let svc = service_fn(move |req: hyper::Request<Incoming>| {
                        let client = client.clone();
                        let config = Arc::clone(&config);
                        let pipeline = Arc::clone(&pipeline);
                        let semaphore = Arc::clone(&semaphore);
                        async move {
                            let _permit = match semaphore.try_acquire() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!(
                                        limit = concurrency_limit,
                                        "concurrency limit reached, rejecting request"
                                    );
                                    let err = GateError::ServiceUnavailable {
                                        limit: concurrency_limit,
                                    };
                                    return Ok::<Response<BoxBody>, std::convert::Infallible>(
                                        err.into_response(),
                                    );
                                }
                            };

                            let resp = handle_request(req, client, config, pipeline, peer)
                                .await
                                .unwrap_or_else(GateError::into_response);
                            Ok::<Response<BoxBody>, std::convert::Infallible>(resp)
                        }
                    });

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await
                    {
                        warn!(%e, "connection error");
                    }
                });
            }
            () = &mut shutdown => {
                info!("shutting down, no longer accepting connections");
                break;
            }
        }
    }
}

/// Spawns a background task that periodically prunes idle client buckets
/// from the rate limiter, preventing unbounded memory growth under
/// high address cardinality.
pub fn spawn_limiter_cleanup(limiter: Arc<SlidingWindowLimiter>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let before = limiter.tracked_addr_count();
            limiter.prune(std::time::Instant::now());
            let after = limiter.tracked_addr_count();
            if before != after {
                info!(
                    before,
                    after,
                    pruned = before - after,
                    "rate limiter cleanup completed"
                );
            }
        }
    })
}

/// Awaits a shutdown signal (SIGINT or SIGTERM on Unix, Ctrl+C on all
/// platforms). Returns once the first signal is received.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, initiating graceful shutdown");
    }
}
