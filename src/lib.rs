//! A policy-enforcing HTTP gateway for chat-style backends.
//!
//! Every inbound request passes through a fixed four-stage pipeline before
//! it is forwarded to the upstream application:
//!
//! 1. **Request logging** — one line per request appended to a file sink
//!    (side effect only, never rejects).
//! 2. **Access window** — requests outside the configured open hours are
//!    denied.
//! 3. **Rate limiting** — POST requests are admitted through a per-client
//!    sliding-window counter.
//! 4. **Role enforcement** — mutating requests on protected paths require
//!    an authenticated principal with a permitted role.
//!
//! Each stage either passes the request through unchanged or short-circuits
//! the chain with a terminal `403 Forbidden` response. Admitted requests are
//! proxied to a single configured upstream with the usual forwarding headers
//! injected.

pub mod config;
pub mod error;
pub mod gate;
pub mod headers;
pub mod limiter;
pub mod pipeline;
pub mod principal;
pub mod proxy;
pub mod request_log;
pub mod server;

pub use config::GateConfig;
pub use error::GateError;
pub use gate::{AccessWindowGate, Gate, RateLimitGate, RequestContext, RolePermissionGate, Verdict};
pub use limiter::SlidingWindowLimiter;
pub use pipeline::RequestPipeline;
pub use principal::Principal;
pub use proxy::{build_client, handle_request, BoxBody, HttpClient};
pub use request_log::RequestLog;
pub use server::{serve, shutdown_signal, spawn_limiter_cleanup, ServerState};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GateError>;
