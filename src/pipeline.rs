//! Ordered gate invocation with short-circuit semantics.
//!
//! The pipeline runs the request-log side effect first (it never
//! rejects), then evaluates each gate in its fixed construction order.
//! The first rejection wins: later gates are not invoked, and the denial
//! becomes the terminal response. The stage order is decided at startup
//! and is not reconfigurable at runtime.

use std::sync::Arc;

use crate::config::GateConfig;
use crate::gate::{AccessWindowGate, Gate, RateLimitGate, RequestContext, RolePermissionGate, Verdict};
use crate::limiter::SlidingWindowLimiter;
use crate::request_log::RequestLog;
use crate::Result;

/// The per-request policy pipeline.
pub struct RequestPipeline {
    log: RequestLog,
    gates: Vec<Box<dyn Gate>>,
}

impl RequestPipeline {
    /// Creates a pipeline from an explicit gate list.
    ///
    /// Gates run in the order given. Most callers want
    /// [`RequestPipeline::from_config`]; this constructor exists so tests
    /// and embedders can compose their own stage list.
    pub fn new(log: RequestLog, gates: Vec<Box<dyn Gate>>) -> Self {
        Self { log, gates }
    }

    /// Builds the standard pipeline: request log, access window, rate
    /// limiter, role gate.
    ///
    /// The limiter is injected rather than constructed here so that the
    /// caller keeps a handle for background pruning.
    pub fn from_config(config: &GateConfig, limiter: Arc<SlidingWindowLimiter>) -> Self {
        let gates: Vec<Box<dyn Gate>> = vec![
            Box::new(AccessWindowGate::new(config.open_hour, config.close_hour)),
            Box::new(RateLimitGate::new(limiter)),
            Box::new(RolePermissionGate::new(
                config.protected_prefixes.clone(),
                config.allowed_roles.clone(),
            )),
        ];

        Self::new(RequestLog::open(&config.request_log_file), gates)
    }

    /// Runs the request through every stage in order.
    ///
    /// Returns `Ok(())` when the request may be delegated to the upstream,
    /// or the first gate's denial otherwise.
    pub fn evaluate(&self, ctx: &RequestContext) -> Result<()> {
        self.log.record(ctx);

        for gate in &self.gates {
            if let Verdict::Reject(denial) = gate.evaluate(ctx) {
                tracing::info!(
                    gate = gate.name(),
                    client = %ctx.client_addr,
                    method = %ctx.method,
                    path = %ctx.path,
                    "request rejected"
                );
                return Err(denial);
            }
        }
        Ok(())
    }
}
