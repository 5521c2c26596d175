//! Environment-sourced configuration with validation.
//!
//! The gateway reads its configuration from environment variables exactly
//! once at startup. Malformed values fail fast with a [`GateError::Config`]
//! before the listener is bound; nothing is re-read per request. The
//! variable lookup is injected so tests can exercise parsing and
//! validation without touching process-wide state.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::{GateError, Result};

/// Default socket address the gateway binds to.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8100";

/// Default upstream the gateway forwards admitted requests to.
pub const DEFAULT_UPSTREAM_ADDR: &str = "http://127.0.0.1:3000";

/// Default first hour (inclusive) of the daily access window.
pub const DEFAULT_OPEN_HOUR: u32 = 6;

/// Default end hour (exclusive) of the daily access window.
pub const DEFAULT_CLOSE_HOUR: u32 = 21;

/// Default maximum number of POSTs per client within the rate window.
pub const DEFAULT_RATE_LIMIT_REQUESTS: usize = 5;

/// Default trailing window for the POST rate limit.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Default path prefixes requiring an elevated role for mutations.
pub const DEFAULT_PROTECTED_PREFIXES: &str = "/";

/// Default roles permitted to perform mutations on protected paths.
pub const DEFAULT_ALLOWED_ROLES: &str = "admin,moderator,staff";

/// Default path of the append-only request log.
pub const DEFAULT_REQUEST_LOG_FILE: &str = "requests.log";

/// Default total timeout for the upstream round-trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of concurrent in-flight requests before the
/// gateway returns 503 Service Unavailable.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 1000;

/// Validated runtime configuration.
///
/// Created once at startup and shared across all request handlers via
/// `Arc`. Hours are half-open: a request is admitted while
/// `open_hour <= hour < close_hour`, so `open_hour == close_hour` means
/// the gateway is always closed.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Socket address the gateway listens on.
    pub listen: SocketAddr,
    /// Validated upstream URI admitted requests are forwarded to.
    pub upstream: hyper::Uri,
    /// First hour (0–23, inclusive) of the daily access window.
    pub open_hour: u32,
    /// End hour (0–23, exclusive) of the daily access window.
    pub close_hour: u32,
    /// Maximum POSTs admitted per client address within the window.
    pub rate_limit_requests: usize,
    /// Trailing window the POST rate limit is measured over.
    pub rate_limit_window: Duration,
    /// Non-empty path prefixes on which mutations require an elevated role.
    pub protected_prefixes: Vec<String>,
    /// Lower-cased role names permitted to mutate protected paths.
    pub allowed_roles: Vec<String>,
    /// Path of the append-only request log file.
    pub request_log_file: PathBuf,
    /// Total timeout for the upstream round-trip. Expiry yields 504.
    pub request_timeout: Duration,
    /// Maximum concurrent in-flight requests. Overflow yields 503.
    pub max_concurrent_requests: usize,
}

impl GateConfig {
    /// Loads and validates configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads and validates configuration from the given variable lookup.
    ///
    /// Recognized variables: `LISTEN_ADDR`, `UPSTREAM_ADDR`,
    /// `CHAT_OPEN_HOUR`, `CHAT_CLOSE_HOUR`, `RATE_LIMIT_REQUESTS`,
    /// `RATE_LIMIT_WINDOW_SEC`, `ROLE_PROTECTED_PATH_PREFIXES`,
    /// `ALLOWED_ROLES`, `REQUEST_LOG_FILE`, `REQUEST_TIMEOUT_SEC`,
    /// `MAX_CONCURRENT_REQUESTS`. Unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_str = lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into());
        let listen = listen_str.parse::<SocketAddr>().map_err(|e| {
            GateError::Config(format!("invalid LISTEN_ADDR \"{listen_str}\": {e}"))
        })?;

        let upstream_str =
            lookup("UPSTREAM_ADDR").unwrap_or_else(|| DEFAULT_UPSTREAM_ADDR.into());
        let upstream = validate_upstream(&upstream_str)?;

        let open_hour = parse_hour("CHAT_OPEN_HOUR", lookup("CHAT_OPEN_HOUR"), DEFAULT_OPEN_HOUR)?;
        let close_hour =
            parse_hour("CHAT_CLOSE_HOUR", lookup("CHAT_CLOSE_HOUR"), DEFAULT_CLOSE_HOUR)?;

        let rate_limit_requests = parse_positive(
            "RATE_LIMIT_REQUESTS",
            lookup("RATE_LIMIT_REQUESTS"),
            DEFAULT_RATE_LIMIT_REQUESTS as u64,
        )? as usize;

        let window_secs = parse_positive(
            "RATE_LIMIT_WINDOW_SEC",
            lookup("RATE_LIMIT_WINDOW_SEC"),
            DEFAULT_RATE_LIMIT_WINDOW.as_secs(),
        )?;

        let protected_prefixes = parse_prefixes(
            &lookup("ROLE_PROTECTED_PATH_PREFIXES")
                .unwrap_or_else(|| DEFAULT_PROTECTED_PREFIXES.into()),
        )?;

        let allowed_roles =
            parse_roles(&lookup("ALLOWED_ROLES").unwrap_or_else(|| DEFAULT_ALLOWED_ROLES.into()));

        let request_log_file = PathBuf::from(
            lookup("REQUEST_LOG_FILE").unwrap_or_else(|| DEFAULT_REQUEST_LOG_FILE.into()),
        );

        let timeout_secs = parse_positive(
            "REQUEST_TIMEOUT_SEC",
            lookup("REQUEST_TIMEOUT_SEC"),
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        )?;

        let max_concurrent_requests = parse_positive(
            "MAX_CONCURRENT_REQUESTS",
            lookup("MAX_CONCURRENT_REQUESTS"),
            DEFAULT_MAX_CONCURRENT_REQUESTS as u64,
        )? as usize;

        Ok(Self {
            listen,
            upstream,
            open_hour,
            close_hour,
            rate_limit_requests,
            rate_limit_window: Duration::from_secs(window_secs),
            protected_prefixes,
            allowed_roles,
            request_log_file,
            request_timeout: Duration::from_secs(timeout_secs),
            max_concurrent_requests,
        })
    }
}

/// Validates an upstream address string into a URI with scheme and
/// authority.
fn validate_upstream(address: &str) -> Result<hyper::Uri> {
    if address.is_empty() {
        return Err(GateError::InvalidUpstream(
            "upstream address must not be empty".into(),
        ));
    }

    let uri = address
        .parse::<hyper::Uri>()
        .map_err(|e| GateError::InvalidUpstream(format!("{e}")))?;

    uri.authority().ok_or_else(|| {
        GateError::InvalidUpstream(format!("upstream URI has no authority: {address}"))
    })?;
    uri.scheme().ok_or_else(|| {
        GateError::InvalidUpstream(format!("upstream URI has no scheme: {address}"))
    })?;

    Ok(uri)
}

/// Parses an hour-of-day variable, requiring a value in `0..=23`.
fn parse_hour(name: &str, raw: Option<String>, default: u32) -> Result<u32> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let hour = raw
        .trim()
        .parse::<u32>()
        .map_err(|e| GateError::Config(format!("invalid {name} \"{raw}\": {e}")))?;
    if hour > 23 {
        return Err(GateError::Config(format!(
            "invalid {name} \"{raw}\": hour must be in 0..=23"
        )));
    }
    Ok(hour)
}

/// Parses a positive integer variable.
fn parse_positive(name: &str, raw: Option<String>, default: u64) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| GateError::Config(format!("invalid {name} \"{raw}\": {e}")))?;
    if value == 0 {
        return Err(GateError::Config(format!("{name} must be positive")));
    }
    Ok(value)
}

/// Splits a comma-separated prefix list, trimming whitespace and dropping
/// empty entries. At least one prefix must remain.
fn parse_prefixes(raw: &str) -> Result<Vec<String>> {
    let prefixes: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect();

    if prefixes.is_empty() {
        return Err(GateError::Config(
            "ROLE_PROTECTED_PATH_PREFIXES must contain at least one prefix".into(),
        ));
    }
    Ok(prefixes)
}

/// Splits a comma-separated role list, lower-casing each entry for
/// case-insensitive comparison against principal group names.
fn parse_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|r| r.trim().to_ascii_lowercase())
        .filter(|r| !r.is_empty())
        .collect()
}
