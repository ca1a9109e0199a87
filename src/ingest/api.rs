//! Agent-facing HTTP endpoints.
//!
//! # Endpoints
//! - `POST /api/v1/series`: store series
//! - `POST /api/v1/check_run`: store check results
//! - `POST /intake/`: store host tags (optional in the payload)
//! - `POST /api/v1/sketches`, `POST /api/beta/sketches`: always 404
//! - `GET /api/v1/validate`: always 200 with `{}`
//!
//! Every other path is answered 404 by the not-found handler, after the full
//! middleware chain has seen it.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tower::BoxError;
use tracing::Instrument as _;

use crate::config::ApiTimeouts;
use crate::http::{ApiError, RequestContext};
use crate::ingest::decode::read_json;
use crate::ingest::ingester::Ingester;
use crate::ingest::payload::{IntakePayload, SeriesPayload, ServiceChecks};
use crate::routing::Registerer;

pub const SERIES_PATH: &str = "/api/v1/series";
pub const CHECK_RUN_PATH: &str = "/api/v1/check_run";
pub const INTAKE_PATH: &str = "/intake/";
pub const SKETCHES_V1_PATH: &str = "/api/v1/sketches";
pub const SKETCHES_BETA_PATH: &str = "/api/beta/sketches";
pub const VALIDATE_PATH: &str = "/api/v1/validate";

/// The ingestion API.
pub struct IngestApi {
    ingester: Arc<dyn Ingester>,
    timeouts: ApiTimeouts,
    /// Cap on decompressed bodies; `0` disables it.
    max_body_size: u64,
}

/// Register `$method` on `$api` as a handler taking the request context and
/// the request.
macro_rules! route {
    ($registerer:expr, $api:expr, $path:expr, $verb:expr, $method:ident) => {{
        let api = $api.clone();
        $registerer.register_route($path, &[$verb], move |ctx: RequestContext, request: Request| {
            let api = api.clone();
            async move { api.$method(ctx, request).await }
        });
    }};
}

impl IngestApi {
    pub fn new(ingester: Arc<dyn Ingester>, timeouts: ApiTimeouts, max_body_size: u64) -> Arc<Self> {
        Arc::new(Self {
            ingester,
            timeouts,
            max_body_size,
        })
    }

    /// Register the write and validate endpoints plus the not-found handler.
    pub fn register_all(self: &Arc<Self>, registerer: &mut Registerer) {
        self.register_write_path(registerer);
        self.register_validate_path(registerer);
        registerer.register_not_found(handle_not_found);
    }

    pub fn register_write_path(self: &Arc<Self>, registerer: &mut Registerer) {
        route!(registerer, self, SERIES_PATH, Method::POST, handle_series);
        route!(registerer, self, CHECK_RUN_PATH, Method::POST, handle_check_run);
        route!(registerer, self, INTAKE_PATH, Method::POST, handle_intake);
        route!(registerer, self, SKETCHES_V1_PATH, Method::POST, handle_sketches);
        route!(registerer, self, SKETCHES_BETA_PATH, Method::POST, handle_sketches);
    }

    pub fn register_validate_path(self: &Arc<Self>, registerer: &mut Registerer) {
        registerer.register_route(VALIDATE_PATH, &[Method::GET], handle_validate);
    }

    async fn handle_series(&self, ctx: RequestContext, request: Request) -> Response {
        let (ctx, request) = with_request(ctx, request);
        let (parts, body) = request.into_parts();
        let payload: SeriesPayload = match read_json(&parts.headers, body, self.max_body_size).await {
            Ok(payload) => payload,
            Err(err) => return err.into_response(),
        };

        let ctx = ctx.with_timeout(self.timeouts.series());
        let span = tracing::debug_span!(
            "api.series",
            series_count = payload.series.len(),
            example_metric = payload.series.first().map(|s| s.name.as_str()).unwrap_or_default(),
        );
        let stored = self
            .ingester
            .store_metrics(&ctx, payload.series)
            .instrument(span)
            .await;

        respond(&ctx, stored, "successfully stored series")
    }

    async fn handle_check_run(&self, ctx: RequestContext, request: Request) -> Response {
        let (ctx, request) = with_request(ctx, request);
        let (parts, body) = request.into_parts();
        let checks: ServiceChecks = match read_json(&parts.headers, body, self.max_body_size).await {
            Ok(checks) => checks,
            Err(err) => return err.into_response(),
        };

        let ctx = ctx.with_timeout(self.timeouts.check_run());
        let stored = self.ingester.store_check_run(&ctx, checks).await;

        respond(&ctx, stored, "successfully stored check run")
    }

    async fn handle_intake(&self, ctx: RequestContext, request: Request) -> Response {
        let (ctx, request) = with_request(ctx, request);
        let (parts, body) = request.into_parts();
        let payload: IntakePayload = match read_json(&parts.headers, body, self.max_body_size).await {
            Ok(payload) => payload,
            Err(err) => return err.into_response(),
        };

        let ctx = ctx.with_timeout(self.timeouts.intake());
        let Some(host_tags) = payload.host_tags else {
            tracing::debug!(baggage = %ctx.display_baggage(), "successfully handled intake without host tags");
            return StatusCode::OK.into_response();
        };

        let ctx = ctx
            .with_value("hostname", payload.internal_hostname.as_str())
            .with_value("host_tags_count", host_tags.system.len().to_string());
        let stored = self
            .ingester
            .store_host_tags(&ctx, &payload.internal_hostname, host_tags.system)
            .await;

        respond(&ctx, stored, "successfully handled intake with host tags")
    }

    /// Sketches are not supported; answer quietly so agents stop retrying.
    async fn handle_sketches(&self, ctx: RequestContext, request: Request) -> Response {
        let (ctx, _) = with_request(ctx, request);
        let ctx = ctx.with_timeout(self.timeouts.sketches());
        tracing::info!(
            response_code = 404,
            baggage = %ctx.display_baggage(),
            "received sketches, responding not found"
        );
        (StatusCode::NOT_FOUND, "sketches are not implemented").into_response()
    }
}

/// Agents and datasources call this to check their credentials.
async fn handle_validate() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

async fn handle_not_found(ctx: RequestContext, request: Request) -> Response {
    let (ctx, _) = with_request(ctx, request);
    tracing::error!(response_code = 404, baggage = %ctx.display_baggage(), "not found");
    (StatusCode::NOT_FOUND, "not found").into_response()
}

/// Add the request line to the context baggage.
fn with_request(ctx: RequestContext, request: Request) -> (RequestContext, Request) {
    let ctx = ctx
        .with_value("request_uri", request.uri().to_string())
        .with_value("method", request.method().as_str());
    (ctx, request)
}

fn respond(ctx: &RequestContext, stored: Result<(), BoxError>, success: &str) -> Response {
    match stored {
        Ok(()) => {
            tracing::debug!(baggage = %ctx.display_baggage(), "{success}");
            StatusCode::OK.into_response()
        }
        Err(err) => ApiError(err).into_response(),
    }
}

impl std::fmt::Debug for IngestApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestApi")
            .field("timeouts", &self.timeouts)
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}
