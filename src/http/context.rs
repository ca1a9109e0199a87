//! Per-request context.
//!
//! # Responsibilities
//! - Carry request metadata (trace, tenant, route, timing, baggage)
//! - Carry the request deadline and cancellation signal to sinks
//!
//! # Design Decisions
//! - Immutable: every `with_*` returns a derived copy, the parent is untouched
//! - Stored in request extensions; handlers extract it like any other value
//! - Cancellation is cooperative: sinks observe it, nothing is aborted for them

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower::BoxError;

use crate::http::error::{Canceled, DeadlineExceeded};
use crate::observability::SpanContext;

/// Immutable request-scoped record.
#[derive(Debug, Clone)]
pub struct RequestContext {
    trace: Option<SpanContext>,
    org_id: Option<String>,
    user_id: Option<String>,
    route: Option<String>,
    begin: Instant,
    baggage: Vec<(&'static str, String)>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            trace: None,
            org_id: None,
            user_id: None,
            route: None,
            begin: Instant::now(),
            baggage: Vec::new(),
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_trace(&self, trace: SpanContext) -> Self {
        let mut next = self.clone();
        next.trace = Some(trace);
        next
    }

    pub fn with_org_id(&self, org_id: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.org_id = Some(org_id.into());
        next
    }

    pub fn with_user_id(&self, user_id: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.user_id = Some(user_id.into());
        next
    }

    pub fn with_route(&self, route: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.route = Some(route.into());
        next
    }

    /// Append a key/value pair to the baggage. Later values for the same key
    /// shadow earlier ones when read through [`RequestContext::value`].
    pub fn with_value(&self, key: &'static str, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.baggage.push((key, value.into()));
        next
    }

    /// Derive a context that expires after `timeout`, never later than the
    /// parent's deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let mut next = self.clone();
        next.deadline = Some(match self.deadline {
            Some(parent) => parent.min(candidate),
            None => candidate,
        });
        next
    }

    pub fn trace(&self) -> Option<&SpanContext> {
        self.trace.as_ref()
    }

    /// Trace id and sampling decision, if the request is traced.
    pub fn trace_id(&self) -> Option<(&str, bool)> {
        self.trace
            .as_ref()
            .map(|t| (t.trace_id.as_str(), t.sampled))
    }

    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn elapsed(&self) -> Duration {
        self.begin.elapsed()
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.baggage
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn baggage(&self) -> &[(&'static str, String)] {
        &self.baggage
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the request is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Cancel the request when the returned guard is dropped.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.cancel.clone().drop_guard()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run `fut` until it completes, the request is cancelled or the deadline
    /// passes, whichever comes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, BoxError>
    where
        F: Future<Output = Result<T, BoxError>>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Canceled.into()),
            _ = deadline => Err(DeadlineExceeded.into()),
            result = fut => result,
        }
    }

    /// Displays the baggage as `key=value` pairs for log lines.
    pub fn display_baggage(&self) -> DisplayBaggage<'_> {
        DisplayBaggage(self)
    }
}

/// `trace_id=.. org_id=.. key=value ...`
pub struct DisplayBaggage<'a>(&'a RequestContext);

impl fmt::Display for DisplayBaggage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = self.0;
        let mut sep = "";
        if let Some((trace_id, _)) = ctx.trace_id() {
            write!(f, "trace_id={trace_id}")?;
            sep = " ";
        }
        if let Some(org_id) = ctx.org_id() {
            write!(f, "{sep}org_id={org_id}")?;
            sep = " ";
        }
        for (key, value) in &ctx.baggage {
            write!(f, "{sep}{key}={value}")?;
            sep = " ";
        }
        Ok(())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_leaves_parent_untouched() {
        let parent = RequestContext::new().with_value("method", "POST");
        let child = parent.with_org_id("42").with_value("hostname", "web-1");

        assert_eq!(parent.org_id(), None);
        assert_eq!(parent.value("hostname"), None);
        assert_eq!(child.org_id(), Some("42"));
        assert_eq!(child.value("method"), Some("POST"));
        assert_eq!(child.value("hostname"), Some("web-1"));
    }

    #[test]
    fn test_baggage_keeps_order() {
        let ctx = RequestContext::new()
            .with_org_id("7")
            .with_value("a", "1")
            .with_value("b", "2")
            .with_value("a", "3");
        assert_eq!(ctx.value("a"), Some("3"));
        assert_eq!(ctx.display_baggage().to_string(), "org_id=7 a=1 b=2 a=3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_never_extends_parent() {
        let parent = RequestContext::new().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let shorter = parent.with_timeout(Duration::from_millis(10));
        assert!(shorter.deadline() < parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_observes_deadline() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(50));
        let err = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, BoxError>(())
            })
            .await
            .unwrap_err();
        assert!(err.is::<DeadlineExceeded>());
    }

    #[tokio::test]
    async fn test_drop_guard_cancels_request() {
        let ctx = RequestContext::new();
        let derived = ctx.with_org_id("1");
        drop(ctx.cancel_on_drop());

        assert!(derived.is_cancelled());
        let err = derived
            .run(async { Ok::<_, BoxError>(1) })
            .await
            .unwrap_err();
        assert!(err.is::<Canceled>());
    }

    #[tokio::test]
    async fn test_run_returns_result() {
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(5));
        let value = ctx.run(async { Ok::<_, BoxError>(5) }).await.unwrap();
        assert_eq!(value, 5);
    }
}
