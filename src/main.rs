use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;
use turnstile::{
    build_client, serve, shutdown_signal, spawn_limiter_cleanup, GateConfig, RequestPipeline,
    ServerState, SlidingWindowLimiter,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnstile=info".into()),
        )
        .init();

    // Configuration faults abort startup; nothing is re-read per request.
    let config = GateConfig::from_env().unwrap_or_else(|e| {
        eprintln!("fatal: {e}");
        std::process::exit(1);
    });
    let config = Arc::new(config);

    let limiter = Arc::new(SlidingWindowLimiter::new(
        config.rate_limit_requests,
        config.rate_limit_window,
    ));
    let pipeline = Arc::new(RequestPipeline::from_config(&config, Arc::clone(&limiter)));

    let listener = TcpListener::bind(config.listen).await.unwrap_or_else(|e| {
        eprintln!("fatal: failed to bind {}: {e}", config.listen);
        std::process::exit(1);
    });

    info!(
        listen = %config.listen,
        upstream = %config.upstream,
        open_hour = config.open_hour,
        close_hour = config.close_hour,
        rate_limit = config.rate_limit_requests,
        rate_window_secs = config.rate_limit_window.as_secs(),
        "turnstile gateway starting"
    );

    spawn_limiter_cleanup(Arc::clone(&limiter));

    let state = ServerState {
        config: Arc::clone(&config),
        pipeline,
        semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
        concurrency_limit: config.max_concurrent_requests,
    };

    serve(listener, build_client(), state, shutdown_signal()).await;

    info!("shutdown complete");
}
