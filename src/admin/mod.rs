//! Introspection listener: health, metrics and runtime profiling.
//!
//! Served on its own address without authentication, so probes and
//! scrapers keep working while the primary listener drains.

pub mod handlers;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower::BoxError;

use crate::config::AdminConfig;
use crate::http::middleware::into_handler;
use crate::http::server::{serve_http, ServerError};
use crate::lifecycle::{Actor, ReadinessProvider, Shutdown};
use crate::observability::Metrics;

use self::handlers::*;

/// Shared state of the introspection routes.
#[derive(Clone)]
pub struct AdminState {
    pub readiness: Arc<dyn ReadinessProvider>,
    pub metrics: Arc<Metrics>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(readiness: Arc<dyn ReadinessProvider>, metrics: Arc<Metrics>) -> Self {
        Self {
            readiness,
            metrics,
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(prometheus_metrics))
        .route("/debug/pprof/", get(pprof_index))
        .route("/debug/pprof/cmdline", get(pprof_cmdline))
        .route("/debug/pprof/runtime", get(pprof_runtime))
        .with_state(state)
}

/// Actor serving the introspection routes.
pub struct IntrospectionServer {
    listener: Mutex<Option<TcpListener>>,
    addr: SocketAddr,
    router: Router,
    graceful_shutdown: Duration,
    shutdown: Shutdown,
}

impl IntrospectionServer {
    pub async fn bind(config: &AdminConfig, state: AdminState) -> Result<Self, ServerError> {
        let listener = crate::net::bind(&config.bind_address).await?;
        let addr = listener.local_addr().map_err(ServerError::Http)?;
        Ok(Self {
            listener: Mutex::new(Some(listener)),
            addr,
            router: setup_admin_router(state),
            graceful_shutdown: config.graceful_shutdown(),
            shutdown: Shutdown::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Actor for IntrospectionServer {
    fn name(&self) -> &str {
        "introspection"
    }

    async fn run(&self) -> Result<(), BoxError> {
        let listener = self
            .listener
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(ServerError::AlreadyStarted("introspection"))?;

        serve_http(
            "introspection",
            listener,
            into_handler(self.router.clone()),
            self.shutdown.clone(),
            self.graceful_shutdown,
        )
        .await
        .map_err(|err| ServerError::Http(err).into())
    }

    fn interrupt(&self, _cause: Option<&BoxError>) {
        if !self.shutdown.is_triggered() {
            tracing::info!("Shutting down introspection server");
        }
        self.shutdown.trigger();
    }
}
