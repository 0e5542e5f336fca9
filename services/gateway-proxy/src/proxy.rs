//! HTTP proxy logic
//!
//! Only the Bee endpoints a public gateway should expose are forwarded:
//! content downloads (GET) and uploads (POST). Uploads get the managed
//! postage stamp injected; anything else is answered with 404 before it
//! reaches the node.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures_util::TryStreamExt;
use postage_stamps::StampsManager;
use tracing::{debug, error, instrument, warn};

use crate::error::Error;
use crate::metrics::record_upstream_error;
use crate::service::ServiceMetrics;

/// Header carrying the postage batch an upload is stamped with
pub const STAMP_HEADER: &str = "swarm-postage-batch-id";

/// Header asking the node to pin uploaded content
pub const PIN_HEADER: &str = "swarm-pin";

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Timeouts on downloads are retried this many times in total.
const DOWNLOAD_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// What a proxied endpoint does on the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Download,
    Upload,
}

impl Route {
    fn attempts(self) -> u32 {
        match self {
            Route::Download => DOWNLOAD_ATTEMPTS,
            Route::Upload => 1,
        }
    }
}

/// Classify a request against the proxied endpoint table.
///
/// Downloads: `/bzz/{ref}`, `/bzz/{ref}/{*path}`, `/bytes/{ref}`,
/// `/chunks/{ref}`, `/feeds/{owner}/{topic}`.
/// Uploads: `/bzz`, `/bytes`, `/chunks`, `/feeds/{owner}/{topic}`,
/// `/soc/{owner}/{id}`.
pub fn classify(method: &Method, path: &str) -> Option<Route> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    if *method == Method::GET {
        let download = match segments.as_slice() {
            ["bzz", reference, ..] => present(reference),
            ["bytes" | "chunks", reference] => present(reference),
            ["feeds", owner, topic] => present(owner) && present(topic),
            _ => false,
        };
        return download.then_some(Route::Download);
    }

    if *method == Method::POST {
        let upload = match segments.as_slice() {
            ["bzz" | "bytes" | "chunks"] => true,
            ["feeds", owner, topic] => present(owner) && present(topic),
            ["soc", owner, id] => present(owner) && present(id),
            _ => false,
        };
        return upload.then_some(Route::Upload);
    }

    None
}

fn present(segment: &str) -> bool {
    !segment.is_empty()
}

/// Shared state passed to the proxy handler
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    /// Bee public API base URL
    pub upstream_url: String,
    pub stamps: Arc<StampsManager>,
    pub remove_pin_header: bool,
    pub max_body_bytes: usize,
    pub timeout: Duration,
    pub metrics: ServiceMetrics,
}

/// JSON error response: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(err: &Error, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": err.kind(),
            "message": err.to_string(),
            "request_id": request_id,
        }
    });
    (
        err.status(),
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Proxy an inbound request to the Bee API.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<Body>,
    request_id: String,
) -> Response {
    let _in_flight = state.metrics.track();

    match forward(state, request).await {
        Ok(response) => response,
        Err(e) => {
            if e.is_gateway_failure() {
                state.metrics.record_error();
            }
            error_response(&e, &request_id)
        }
    }
}

async fn forward(
    state: &ProxyState,
    request: axum::http::Request<Body>,
) -> Result<Response, Error> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let route = classify(&method, uri.path()).ok_or(Error::NotFound)?;

    let upstream_url = match uri.path_and_query() {
        Some(pq) => format!("{}{}", state.upstream_url.trim_end_matches('/'), pq),
        None => state.upstream_url.clone(),
    };

    let mut headers = forwarded_headers(request.headers());
    if route == Route::Upload {
        prepare_upload(state, &mut headers)?;
    }

    if content_length(request.headers()).is_some_and(|length| length > state.max_body_bytes) {
        return Err(Error::BodyTooLarge {
            limit: state.max_body_bytes,
        });
    }
    let body_bytes = axum::body::to_bytes(request.into_body(), state.max_body_bytes)
        .await
        .map_err(|e| {
            error!(error = %e, "failed to read request body");
            Error::InvalidBody(e.to_string())
        })?;

    let attempts = route.attempts();
    for attempt in 0..attempts {
        if attempt > 0 {
            warn!(attempt, "retrying after upstream timeout");
            tokio::time::sleep(RETRY_DELAY).await;
        }

        let result = state
            .client
            .request(method.clone(), &upstream_url)
            .headers(headers.clone())
            .timeout(state.timeout)
            .body(body_bytes.clone())
            .send()
            .await;

        match result {
            Ok(upstream_response) => return relay(upstream_response),
            Err(e) if e.is_timeout() && attempt + 1 < attempts => continue,
            Err(e) if e.is_timeout() => {
                record_upstream_error("timeout");
                error!(error = %e, attempts, "upstream timeout after all retries");
                return Err(Error::UpstreamTimeout {
                    secs: state.timeout.as_secs(),
                    attempts,
                });
            }
            Err(e) => {
                record_upstream_error(if e.is_connect() {
                    "connection"
                } else {
                    "other"
                });
                error!(error = %e, "upstream request failed");
                return Err(Error::Upstream(e.to_string()));
            }
        }
    }

    Err(Error::Internal("unexpected retry exhaustion".into()))
}

/// Apply the stamp and pin policy to an upload's headers.
///
/// With stamp management enabled, the client's stamp is always replaced by
/// the managed one; if none is usable the upload is refused, never forwarded
/// without a stamp.
fn prepare_upload(state: &ProxyState, headers: &mut HeaderMap) -> Result<(), Error> {
    if state.remove_pin_header {
        headers.remove(PIN_HEADER);
    }

    if !state.stamps.mode().is_enabled() {
        return Ok(());
    }

    headers.remove(STAMP_HEADER);
    let stamp = state.stamps.current_stamp().map_err(|e| {
        error!(error = %e, "proxy failure");
        Error::NoStamp
    })?;
    let value = HeaderValue::from_str(stamp.as_str())
        .map_err(|e| Error::Internal(format!("invalid batch id {stamp}: {e}")))?;
    debug!(batch_id = %stamp, "stamping upload");
    headers.insert(STAMP_HEADER, value);
    Ok(())
}

/// Request headers minus hop-by-hop ones and those reqwest derives itself.
fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in inbound {
        if is_hop_by_hop(name.as_str()) || name == header::HOST || name == header::CONTENT_LENGTH
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Stream the upstream response back, minus hop-by-hop headers.
fn relay(upstream_response: reqwest::Response) -> Result<Response, Error> {
    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .map_err(|e| Error::Internal(e.to_string()))?;

    let mut response = Response::builder().status(status);
    for (name, value) in upstream_response.headers() {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }

    let stream = upstream_response.bytes_stream().inspect_err(|e| {
        record_upstream_error("body");
        warn!(error = %e, "upstream response body interrupted");
    });
    response
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Internal(e.to_string()))
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
