//! The gate abstraction and the three policy gates.
//!
//! A gate inspects an immutable [`RequestContext`] and either lets the
//! request continue or rejects it with a terminal denial. Gates never
//! mutate the request and never perform I/O; all the state they need is
//! captured at construction or carried in the context. The pipeline
//! invokes them in a fixed order (see [`crate::pipeline`]) rather than
//! each gate wrapping the next.

use std::sync::Arc;
use std::time::Instant;

use hyper::Method;

use crate::error::GateError;
use crate::limiter::SlidingWindowLimiter;
use crate::principal::Principal;

/// Everything a gate may inspect about a request, captured once at
/// receipt.
#[derive(Debug)]
pub struct RequestContext {
    /// Request method.
    pub method: Method,
    /// Request path (no query string).
    pub path: String,
    /// Resolved originating client address (see
    /// [`crate::headers::resolve_client_addr`]).
    pub client_addr: String,
    /// Local hour of day (0–23) at receipt.
    pub hour: u32,
    /// Monotonic receipt time, used for rate-limit bookkeeping.
    pub received_at: Instant,
    /// The authenticated principal, if any.
    pub principal: Option<Principal>,
}

impl RequestContext {
    /// The username to attribute this request to in the request log.
    pub fn display_user(&self) -> &str {
        self.principal
            .as_ref()
            .filter(|p| p.authenticated)
            .map(|p| p.username.as_str())
            .unwrap_or("anonymous")
    }
}

/// Outcome of a single gate evaluation.
#[derive(Debug)]
pub enum Verdict {
    /// Pass the request to the next stage unchanged.
    Continue,
    /// Stop the pipeline and answer with this denial.
    Reject(GateError),
}

/// A pipeline stage that may terminate request processing with a denial.
pub trait Gate: Send + Sync {
    /// Short stable name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Checks the request against this gate's policy.
    fn evaluate(&self, ctx: &RequestContext) -> Verdict;
}

/// Denies every request outside the configured daily access window.
///
/// The window is half-open: a request is admitted while
/// `open_hour <= hour < close_hour`. Equal open and close hours yield an
/// empty window, i.e. always closed.
#[derive(Debug)]
pub struct AccessWindowGate {
    open_hour: u32,
    close_hour: u32,
}

impl AccessWindowGate {
    /// Creates a gate for the window `[open_hour, close_hour)`.
    pub fn new(open_hour: u32, close_hour: u32) -> Self {
        Self {
            open_hour,
            close_hour,
        }
    }
}

impl Gate for AccessWindowGate {
    fn name(&self) -> &'static str {
        "access-window"
    }

    fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if self.open_hour <= ctx.hour && ctx.hour < self.close_hour {
            Verdict::Continue
        } else {
            Verdict::Reject(GateError::Closed)
        }
    }
}

/// Admits POST requests through the sliding-window rate limiter.
///
/// All other methods bypass the limiter unconditionally.
pub struct RateLimitGate {
    limiter: Arc<SlidingWindowLimiter>,
}

impl RateLimitGate {
    /// Creates a gate backed by the given (shared) limiter instance.
    pub fn new(limiter: Arc<SlidingWindowLimiter>) -> Self {
        Self { limiter }
    }
}

impl Gate for RateLimitGate {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if ctx.method != Method::POST {
            return Verdict::Continue;
        }
        if self.limiter.admit(&ctx.client_addr, ctx.received_at) {
            Verdict::Continue
        } else {
            tracing::warn!(client = %ctx.client_addr, path = %ctx.path, "rate limit exceeded");
            Verdict::Reject(GateError::RateLimited)
        }
    }
}

/// Requires an elevated role for mutating requests on protected paths.
///
/// Applies only to POST/PUT/PATCH/DELETE requests whose path starts with
/// one of the protected prefixes; everything else passes through. The
/// decision order is: authentication, superuser bypass, staff flag (when
/// "staff" is an allowed role), then group membership.
#[derive(Debug)]
pub struct RolePermissionGate {
    protected_prefixes: Vec<String>,
    allowed_roles: Vec<String>,
}

impl RolePermissionGate {
    /// Creates a gate protecting the given prefixes with the given
    /// lower-cased role names.
    pub fn new(protected_prefixes: Vec<String>, allowed_roles: Vec<String>) -> Self {
        Self {
            protected_prefixes,
            allowed_roles,
        }
    }

    fn protects(&self, path: &str) -> bool {
        self.protected_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Returns `true` for methods that can modify server state.
fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

impl Gate for RolePermissionGate {
    fn name(&self) -> &'static str {
        "role-permission"
    }

    fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if !is_mutating(&ctx.method) || !self.protects(&ctx.path) {
            return Verdict::Continue;
        }

        let principal = match &ctx.principal {
            Some(p) if p.authenticated => p,
            _ => return Verdict::Reject(GateError::AuthRequired),
        };

        if principal.superuser {
            return Verdict::Continue;
        }
        if principal.staff && self.allowed_roles.iter().any(|r| r == "staff") {
            return Verdict::Continue;
        }
        if principal.in_any_role(&self.allowed_roles) {
            return Verdict::Continue;
        }

        tracing::warn!(
            user = %principal.username,
            path = %ctx.path,
            "mutating request denied for missing role"
        );
        Verdict::Reject(GateError::Forbidden)
    }
}
