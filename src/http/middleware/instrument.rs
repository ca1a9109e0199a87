//! Request instrumentation.
//!
//! Records, per (method, route): the in-flight gauge, request and response
//! body sizes, and the request duration labelled with the final status. A
//! sampled trace id turns the duration observation into an exemplar.
//!
//! The response side is settled when the response body finishes or is
//! dropped, so a request that panics, fails or is abandoned still releases
//! its in-flight slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use metrics::Gauge;
use tokio::time::Instant;
use tower::Layer;

use crate::http::context::RequestContext;
use crate::http::middleware::body::{CountingBody, ObservedBody};
use crate::http::middleware::{into_handler, Handler, Middleware};
use crate::observability::Metrics;
use crate::routing::RouteTable;

/// Instrumentation middleware.
#[derive(Clone)]
pub struct Instrument {
    metrics: Arc<Metrics>,
    routes: Arc<RouteTable>,
}

impl Instrument {
    pub fn new(metrics: Arc<Metrics>, routes: Arc<RouteTable>) -> Self {
        Self { metrics, routes }
    }
}

impl Middleware for Instrument {
    fn wrap(&self, next: Handler) -> Handler {
        into_handler(from_fn_with_state(self.clone(), instrument).layer(next))
    }
}

/// Decrements the in-flight gauge when dropped.
struct InflightGuard(Gauge);

impl InflightGuard {
    fn enter(gauge: Gauge) -> Self {
        gauge.increment(1.0);
        Self(gauge)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.decrement(1.0);
    }
}

async fn instrument(State(state): State<Instrument>, request: Request, next: Next) -> Response {
    let begin = Instant::now();
    let method = request.method().to_string();
    let route = state
        .routes
        .route_label(request.method(), request.uri().path());
    let sampled_trace = request
        .extensions()
        .get::<RequestContext>()
        .and_then(RequestContext::trace_id)
        .filter(|(_, sampled)| *sampled)
        .map(|(trace_id, _)| trace_id.to_owned());

    let inflight = InflightGuard::enter(state.metrics.inflight(&method, &route));

    let read = Arc::new(AtomicU64::new(0));
    let (parts, body) = request.into_parts();
    let request = Request::from_parts(parts, Body::new(CountingBody::new(body, read.clone())));

    let response = next.run(request).await;

    state
        .metrics
        .observe_request_bytes(&method, &route, read.load(Ordering::Relaxed));

    let status = response.status().as_u16();
    let metrics = state.metrics.clone();
    let (parts, body) = response.into_parts();
    let body = ObservedBody::new(body, move |written| {
        metrics.observe_response_bytes(&method, &route, written);
        metrics.observe_duration(
            &method,
            &route,
            status,
            begin.elapsed().as_secs_f64(),
            sampled_trace.as_deref(),
        );
        drop(inflight);
    });

    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObservabilityConfig;
    use crate::routing::RouteDescriptor;
    use axum::http::{Method, StatusCode};
    use axum::routing::post;
    use tower::ServiceExt;

    async fn explode() -> &'static str {
        panic!("handler exploded")
    }

    fn setup() -> (Arc<Metrics>, Handler) {
        let metrics = Arc::new(Metrics::new(&ObservabilityConfig::default()).unwrap());
        let mut table = RouteTable::new();
        table.push(RouteDescriptor::new("/echo", &[Method::POST], None));
        table.push(RouteDescriptor::new("/panic", &[Method::POST], None));

        let router = axum::Router::new()
            .route("/echo", post(|body: String| async move { body }))
            .route("/panic", post(explode))
            .layer(tower_http::catch_panic::CatchPanicLayer::new());

        let instrument = Instrument::new(metrics.clone(), Arc::new(table));
        (metrics.clone(), instrument.wrap(into_handler(router)))
    }

    fn line<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
        text.lines().find(|l| l.starts_with(prefix))
    }

    #[tokio::test]
    async fn test_counts_request_and_response_bytes() {
        let (metrics, handler) = setup();
        let response = handler
            .oneshot(
                Request::post("/echo")
                    .body(Body::from("0123456789"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.len(), 10);

        let text = metrics.render();
        assert!(line(
            &text,
            r#"ingest_gateway_request_message_bytes_sum{method="POST",route="echo"} 10"#
        )
        .is_some());
        assert!(line(
            &text,
            r#"ingest_gateway_response_message_bytes_sum{method="POST",route="echo"} 10"#
        )
        .is_some());
        assert!(line(
            &text,
            r#"ingest_gateway_request_duration_seconds_count{method="POST",route="echo",status_code="200"} 1"#
        )
        .is_some());
    }

    #[tokio::test]
    async fn test_inflight_released_after_panic() {
        let (metrics, handler) = setup();
        let response = handler
            .oneshot(Request::post("/panic").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        drop(response);

        let text = metrics.render();
        assert!(line(
            &text,
            r#"ingest_gateway_inflight_requests{method="POST",route="panic"} 0"#
        )
        .is_some());
        assert!(text.contains(r#"route="panic",status_code="500""#));
    }

    #[tokio::test]
    async fn test_unmatched_route_uses_sentinel() {
        let (metrics, handler) = setup();
        let response = handler
            .oneshot(Request::get("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        drop(response);
        assert!(metrics.render().contains(r#"route="other""#));
    }
}
