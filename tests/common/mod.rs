//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use ingest_gateway::config::GatewayConfig;
use ingest_gateway::http::RequestContext;
use ingest_gateway::ingest::{Ingester, Serie, ServiceCheck};
use ingest_gateway::lifecycle::startup::build_handler;
use ingest_gateway::observability::Metrics;
use tower::{BoxError, ServiceExt};

/// Error a fake ingester returns.
pub type ErrorFactory = Box<dyn Fn() -> BoxError + Send + Sync>;

/// Ingester that counts calls and optionally fails them.
#[derive(Default)]
pub struct FakeIngester {
    pub metrics_calls: AtomicUsize,
    pub host_tag_calls: AtomicUsize,
    pub check_run_calls: AtomicUsize,
    pub last_org_id: Mutex<Option<String>>,
    pub fail_with: Option<ErrorFactory>,
}

impl FakeIngester {
    pub fn failing(factory: impl Fn() -> BoxError + Send + Sync + 'static) -> Self {
        Self {
            fail_with: Some(Box::new(factory)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
            + self.host_tag_calls.load(Ordering::SeqCst)
            + self.check_run_calls.load(Ordering::SeqCst)
    }

    fn outcome(&self, ctx: &RequestContext) -> Result<(), BoxError> {
        *self.last_org_id.lock().unwrap() = ctx.org_id().map(str::to_owned);
        match &self.fail_with {
            Some(factory) => Err(factory()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Ingester for FakeIngester {
    async fn store_metrics(&self, ctx: &RequestContext, _series: Vec<Serie>) -> Result<(), BoxError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome(ctx)
    }

    async fn store_host_tags(
        &self,
        ctx: &RequestContext,
        _hostname: &str,
        _system_tags: Vec<String>,
    ) -> Result<(), BoxError> {
        self.host_tag_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome(ctx)
    }

    async fn store_check_run(&self, ctx: &RequestContext, _checks: Vec<ServiceCheck>) -> Result<(), BoxError> {
        self.check_run_calls.fetch_add(1, Ordering::SeqCst);
        self.outcome(ctx)
    }
}

/// A composed gateway handler backed by `ingester`.
pub struct Gateway {
    pub metrics: Arc<Metrics>,
    pub ingester: Arc<FakeIngester>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig, ingester: FakeIngester) -> Self {
        let metrics = Arc::new(Metrics::new(&config.observability).unwrap());
        Self {
            metrics,
            ingester: Arc::new(ingester),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(auth_disabled(), FakeIngester::default())
    }

    /// Send one request through a freshly composed handler and read the body.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let (handler, _) = build_handler(&self.config, self.metrics.clone(), self.ingester.clone());
        let response = handler.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }
}

pub fn auth_disabled() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.enabled = false;
    config
}

pub fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

/// First exposition line starting with `prefix`.
pub fn metric_line<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines().find(|l| l.starts_with(prefix))
}
