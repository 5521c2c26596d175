//! Per-request handler: policy pipeline evaluation, then upstream
//! forwarding.
//!
//! Every inbound request is assigned a monotonically increasing request
//! ID and wrapped in a [`tracing::Span`] carrying structured fields. The
//! handler builds the immutable [`RequestContext`] once (client address,
//! local hour, principal), runs it through the [`RequestPipeline`], and
//! only on admission rewrites and forwards the request to the single
//! configured upstream, streaming the response body back unmodified.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Timelike;
use http_body_util::BodyExt;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tracing::{debug, info, warn, Instrument};

use crate::config::GateConfig;
use crate::gate::RequestContext;
use crate::headers;
use crate::pipeline::RequestPipeline;
use crate::principal::Principal;
use crate::{GateError, Result};

/// An alias to simplify the calls to `Box<dyn std::error::Error + Send + Sync>`.
type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased body used for both request forwarding and response
/// streaming.
///
/// Wraps any body implementation behind a single boxed trait object so
/// the handler can accept requests with arbitrary body types (e.g.
/// `Incoming`, `Full<Bytes>`, `Empty<Bytes>`) and return a uniform
/// response type regardless of origin.
pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, StdError>;

/// The HTTP client type for upstream connections.
pub type HttpClient = Client<HttpConnector, BoxBody>;

/// Global monotonic counter for assigning unique request IDs.
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Constructs a new [`HttpClient`] for upstream connections.
pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Processes a single inbound request.
///
/// The pipeline stages (request log, access window, rate limit, role
/// check) run first; any denial becomes the terminal response and the
/// upstream is never contacted. Admitted requests are forwarded with
/// hop-by-hop headers stripped, forwarding headers injected, and the
/// `Host` header and URI rewritten to the upstream, subject to the
/// configured round-trip timeout.
pub async fn handle_request<B>(
    req: Request<B>,
    client: HttpClient,
    config: Arc<GateConfig>,
    pipeline: Arc<RequestPipeline>,
    peer: SocketAddr,
) -> Result<Response<BoxBody>>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<StdError>,
{
    let request_id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    let method = req.method().clone();
    let uri = req.uri().clone();

    let span = tracing::info_span!(
        "request",
        id = request_id,
        method = %method,
        uri = %uri,
        peer = %peer,
    );

    async move {
        let ctx = RequestContext {
            method: method.clone(),
            path: uri.path().to_owned(),
            client_addr: headers::resolve_client_addr(req.headers(), Some(peer)),
            hour: chrono::Local::now().hour(),
            received_at: Instant::now(),
            principal: Principal::from_headers(req.headers()),
        };

        pipeline.evaluate(&ctx)?;

        let rewritten_uri = rewrite_uri(&uri, &config.upstream)?;
        let (mut parts, body) = req.into_parts();

        headers::strip_hop_by_hop(&mut parts.headers);
        headers::inject_forwarding_headers(&mut parts.headers, peer);
        headers::rewrite_host(
            &mut parts.headers,
            config
                .upstream
                .authority()
                .ok_or_else(|| GateError::InvalidUpstream("upstream has no authority".into()))?,
        );

        parts.uri = rewritten_uri;

        debug!(upstream_uri = %parts.uri, "forwarding admitted request");

        let start = Instant::now();
        let boxed_body = body.map_err(|e| e.into()).boxed();
        let upstream_req = Request::from_parts(parts, boxed_body);

        let upstream_result = timeout(config.request_timeout, client.request(upstream_req)).await;

        let upstream_resp = match upstream_result {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "upstream request failed"
                );
                return Err(GateError::Upstream(e));
            }
            Err(_elapsed) => {
                warn!(
                    timeout = ?config.request_timeout,
                    "upstream request timed out"
                );
                return Err(GateError::Timeout(config.request_timeout));
            }
        };

        info!(
            status = upstream_resp.status().as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "upstream responded"
        );

        let (mut resp_parts, resp_body) = upstream_resp.into_parts();
        headers::strip_hop_by_hop(&mut resp_parts.headers);

        Ok(Response::from_parts(
            resp_parts,
            resp_body.map_err(|e| -> StdError { Box::new(e) }).boxed(),
        ))
    }
    .instrument(span)
    .await
}

/// Rewrites the original request URI to target the configured upstream,
/// preserving the path and query string.
fn rewrite_uri(original: &Uri, upstream: &Uri) -> Result<Uri> {
    let authority = upstream
        .authority()
        .ok_or_else(|| GateError::InvalidUpstream("upstream has no authority".into()))?;

    let scheme = upstream
        .scheme()
        .ok_or_else(|| GateError::InvalidUpstream("upstream has no scheme".into()))?;

    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Uri::builder()
        .scheme(scheme.clone())
        .authority(authority.clone())
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| GateError::Internal(format!("failed to build upstream URI: {e}")))
}
