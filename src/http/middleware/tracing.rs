//! Request tracing.
//!
//! Opens the `http.request` span, continues or starts the distributed trace
//! and installs the [`RequestContext`] every later stage reads. The request
//! is cancelled when the span ends, including when the client goes away and
//! the request future is dropped.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use tower::Layer;
use tracing::Instrument as _;

use crate::http::context::RequestContext;
use crate::http::middleware::{into_handler, Handler, Middleware};
use crate::observability::Tracer;
use crate::routing::RouteTable;

/// Tracing middleware.
#[derive(Clone)]
pub struct Tracing {
    tracer: Arc<Tracer>,
    routes: Arc<RouteTable>,
}

impl Tracing {
    pub fn new(tracer: Arc<Tracer>, routes: Arc<RouteTable>) -> Self {
        Self { tracer, routes }
    }
}

impl Middleware for Tracing {
    fn wrap(&self, next: Handler) -> Handler {
        into_handler(from_fn_with_state(self.clone(), trace_request).layer(next))
    }
}

/// `HTTP <METHOD> - <route>`, or `HTTP <METHOD>` when no route matched.
pub fn operation_name(method: &str, route: &str) -> String {
    if route.is_empty() {
        format!("HTTP {method}")
    } else {
        format!("HTTP {method} - {route}")
    }
}

async fn trace_request(State(state): State<Tracing>, mut request: Request, next: Next) -> Response {
    let span_context = state.tracer.start(request.headers());
    let route = state
        .routes
        .route_name(request.method(), request.uri().path());

    let span = tracing::info_span!(
        "http.request",
        otel.name = %operation_name(request.method().as_str(), &route),
        http.method = %request.method(),
        http.url = %request.uri().path(),
        trace_id = %span_context.trace_id,
        span_id = %span_context.span_id,
        sampled = span_context.sampled,
        http.status_code = tracing::field::Empty,
        error = tracing::field::Empty,
    );

    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default()
        .with_trace(span_context)
        .with_route(route);
    let _cancel_on_exit = ctx.cancel_on_drop();
    request.extensions_mut().insert(ctx);

    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    span.record("http.status_code", status.as_u16());
    if status.is_server_error() {
        span.record("error", true);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteDescriptor;
    use axum::body::Body;
    use axum::http::Method;
    use axum::routing::get;
    use tower::ServiceExt;

    #[test]
    fn test_operation_name() {
        assert_eq!(operation_name("POST", "api_v1_series"), "HTTP POST - api_v1_series");
        assert_eq!(operation_name("GET", ""), "HTTP GET");
    }

    #[tokio::test]
    async fn test_installs_context_with_inbound_trace() {
        let mut table = RouteTable::new();
        table.push(RouteDescriptor::new("/ctx", &[Method::GET], Some("ctx")));

        let router = axum::Router::new().route(
            "/ctx",
            get(|ctx: RequestContext| async move {
                format!(
                    "{}|{}|{}",
                    ctx.trace_id().map(|(id, _)| id).unwrap_or(""),
                    ctx.trace_id().map(|(_, s)| s).unwrap_or(false),
                    ctx.route().unwrap_or("")
                )
            }),
        );

        let tracing = Tracing::new(Arc::new(Tracer::new(0.0)), Arc::new(table));
        let response = tracing
            .wrap(into_handler(router))
            .oneshot(
                Request::get("/ctx")
                    .header(
                        "traceparent",
                        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"4bf92f3577b34da6a3ce929d0e0e4736|true|ctx");
    }
}
