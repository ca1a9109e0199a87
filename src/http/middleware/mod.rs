//! Request middleware pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → tracing.rs    (span, trace id, request context)
//!     → instrument.rs (in-flight, duration, body sizes)
//!     → auth.rs       (tenant id or 401)
//!     → logging.rs    (one line per request)
//!     → limits.rs     (optional body size limit)
//!     → router
//! ```
//!
//! # Design Decisions
//! - A middleware is a `Handler -> Handler` transform
//! - Composition folds the list so the first entry is the outermost wrapper
//! - Middlewares share only the metrics provider and the route table

pub mod auth;
pub mod body;
pub mod instrument;
pub mod limits;
pub mod logging;
pub mod tracing;

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use tower::util::BoxCloneSyncService;
use tower::Service;

pub use self::auth::{Auth, FakeAuth, ORG_ID_HEADER, USER_ID_HEADER};
pub use self::instrument::Instrument;
pub use self::limits::RequestLimits;
pub use self::logging::Logging;
pub use self::tracing::Tracing;

/// A type-erased request handler.
pub type Handler = BoxCloneSyncService<Request, Response, Infallible>;

/// Wraps a handler with one cross-cutting concern.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Handler) -> Handler;
}

impl<F> Middleware for F
where
    F: Fn(Handler) -> Handler + Send + Sync,
{
    fn wrap(&self, next: Handler) -> Handler {
        self(next)
    }
}

/// Erase a service into a [`Handler`].
pub fn into_handler<S>(service: S) -> Handler
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}

/// Compose middlewares around `handler`. `middlewares[0]` runs first.
pub fn merge(middlewares: &[Arc<dyn Middleware>], handler: Handler) -> Handler {
    middlewares
        .iter()
        .rev()
        .fold(handler, |next, middleware| middleware.wrap(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;
    use axum::routing::get;
    use std::sync::Mutex;
    use tower::ServiceExt;

    fn recorder(name: &'static str, seen: Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Middleware> {
        Arc::new(move |next: Handler| {
            let seen = seen.clone();
            into_handler(tower::service_fn(move |request: Request| {
                let seen = seen.clone();
                let next = next.clone();
                async move {
                    seen.lock().unwrap().push(name);
                    let mut response = next.oneshot(request).await?;
                    response
                        .headers_mut()
                        .append("x-order", HeaderValue::from_static(name));
                    Ok::<_, Infallible>(response)
                }
            }))
        })
    }

    #[tokio::test]
    async fn test_first_middleware_is_outermost() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let router = axum::Router::new().route("/", get(|| async { "ok" }));
        let handler = merge(
            &[
                recorder("a", seen.clone()),
                recorder("b", seen.clone()),
                recorder("c", seen.clone()),
            ],
            into_handler(router),
        );

        let response = handler
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        let order: Vec<_> = response
            .headers()
            .get_all("x-order")
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_the_handler() {
        let router = axum::Router::new().route("/", get(|| async { "ok" }));
        let handler = merge(&[], into_handler(router));
        let response = handler
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
