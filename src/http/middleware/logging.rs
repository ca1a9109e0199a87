//! Request logging.
//!
//! One structured line per request once the inner handler has produced its
//! response. Healthy outcomes (`[100, 500)`, `502`, `503`) log at info,
//! everything else at warn. An `api_key` query value is redacted unless it is
//! the allow-listed public key.

use std::borrow::Cow;

use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use tower::Layer;

use crate::http::context::RequestContext;
use crate::http::middleware::{into_handler, Handler, Middleware};
use crate::observability::tracing::JAEGER_DEBUG_ID;

/// `api_key` value that is logged as is.
pub const PUBLIC_API_KEY: &str = "grafana-labs";

const API_KEY_PARAM: &str = "api_key";

/// Logging middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logging;

impl Middleware for Logging {
    fn wrap(&self, next: Handler) -> Handler {
        into_handler(from_fn(log_requests).layer(next))
    }
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = request.headers().clone();
    let ctx = request.extensions().get::<RequestContext>().cloned();

    let response = next.run(request).await;

    log_request(&method, &uri, &headers, ctx.as_ref(), response.status());
    response
}

/// True for status codes that log at info.
pub fn is_healthy_status(status: StatusCode) -> bool {
    let code = status.as_u16();
    (100..500).contains(&code) || code == 502 || code == 503
}

/// Emit the request log line.
pub fn log_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    ctx: Option<&RequestContext>,
    status: StatusCode,
) {
    let uri = redact_api_key(uri);
    let elapsed = ctx.map(RequestContext::elapsed);
    let trace = ctx.and_then(RequestContext::trace_id);
    let trace_id = trace.map(|(id, _)| id);
    let sampled = trace.map(|(_, sampled)| sampled);
    // The debug id is only meaningful next to a trace id.
    let debug_id = trace_id
        .and_then(|_| headers.get(JAEGER_DEBUG_ID))
        .and_then(|v| v.to_str().ok());
    let org_id = ctx.and_then(RequestContext::org_id);
    let user_id = ctx.and_then(RequestContext::user_id);

    macro_rules! request_event {
        ($level:expr) => {
            tracing::event!(
                $level,
                method = %method,
                uri = %uri,
                status = status.as_u16(),
                elapsed = ?elapsed.unwrap_or_default(),
                trace_id,
                sampled,
                debug_id,
                org_id,
                user_id,
                "request"
            )
        };
    }

    if is_healthy_status(status) {
        request_event!(tracing::Level::INFO);
    } else {
        request_event!(tracing::Level::WARN);
    }
}

/// Request URI (path and query) with every non-public `api_key` value
/// replaced by `redacted`. Other parameters keep their order and encoding.
pub fn redact_api_key(uri: &Uri) -> Cow<'_, str> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let Some(query) = uri.query() else {
        return Cow::Borrowed(path_and_query);
    };

    let mut changed = false;
    let redacted: Vec<&str> = query
        .split('&')
        .map(|pair| {
            if is_secret_api_key(pair) {
                changed = true;
                "api_key=redacted"
            } else {
                pair
            }
        })
        .collect();

    if !changed {
        return Cow::Borrowed(path_and_query);
    }
    Cow::Owned(format!("{}?{}", uri.path(), redacted.join("&")))
}

/// Whether one raw `key=value` pair carries an `api_key` that must not be logged.
fn is_secret_api_key(pair: &str) -> bool {
    url::form_urlencoded::parse(pair.as_bytes())
        .next()
        .is_some_and(|(k, v)| k == API_KEY_PARAM && !v.is_empty() && v != PUBLIC_API_KEY)
}
