//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the metrics provider, tracer and route table
//! - Compose the middleware chain around the ingestion router
//! - Bind every listener and assemble the actor group
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners bind before any actor runs (traffic only when wired)

use std::net::SocketAddr;
use std::sync::Arc;

use tower::BoxError;
use tower_http::catch_panic::CatchPanicLayer;

use crate::admin::{AdminState, IntrospectionServer};
use crate::config::GatewayConfig;
use crate::http::middleware::{
    into_handler, merge, Auth, FakeAuth, Handler, Instrument, Logging, Middleware, RequestLimits,
    Tracing,
};
use crate::http::{PrimaryServer, ServerError};
use crate::ingest::{DisabledIngester, InMemoryHostTagStore, IngestApi, Ingester, LogWriter, TranslatingIngester};
use crate::lifecycle::{Group, SignalWatcher};
use crate::observability::{Metrics, MetricsError, Tracer};
use crate::routing::{Registerer, RouteTable};

/// Error type for startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Middleware list in execution order, outermost first.
pub fn middlewares(
    config: &GatewayConfig,
    metrics: Arc<Metrics>,
    tracer: Arc<Tracer>,
    routes: Arc<RouteTable>,
) -> Vec<Arc<dyn Middleware>> {
    let mut list: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(Tracing::new(tracer, routes.clone())),
        Arc::new(Instrument::new(metrics, routes)),
    ];
    if config.auth.enabled {
        list.push(Arc::new(Auth));
    } else {
        list.push(Arc::new(FakeAuth));
    }
    list.push(Arc::new(Logging));
    if config.server.max_request_body_size > 0 {
        list.push(Arc::new(RequestLimits::new(config.server.max_request_body_size)));
    }
    list
}

/// Default sink for the configuration.
pub fn ingester(config: &GatewayConfig, metrics: &Metrics) -> Arc<dyn Ingester> {
    if !config.ingester.enabled {
        tracing::warn!("Ingester disabled, writes will be answered with 501");
        return Arc::new(DisabledIngester);
    }
    Arc::new(TranslatingIngester::new(
        Arc::new(InMemoryHostTagStore::new()),
        Arc::new(LogWriter),
        metrics.metrics_parsed(),
    ))
}

/// Register the ingestion API and wrap it in the middleware chain.
pub fn build_handler(
    config: &GatewayConfig,
    metrics: Arc<Metrics>,
    ingester: Arc<dyn Ingester>,
) -> (Handler, Arc<RouteTable>) {
    let mut registerer = Registerer::new(&config.server.path_prefix);
    IngestApi::new(
        ingester,
        config.api.timeouts.clone(),
        config.server.max_request_body_size,
    )
    .register_all(&mut registerer);
    let (router, routes) = registerer.finish();
    let routes = Arc::new(routes);

    let tracer = Arc::new(Tracer::new(config.observability.trace_sampling_ratio));
    let router = router.layer(CatchPanicLayer::new());
    let handler = merge(
        &middlewares(config, metrics, tracer, routes.clone()),
        into_handler(router),
    );

    (handler, routes)
}

/// The wired process, ready to run.
pub struct App {
    metrics: Arc<Metrics>,
    server: Arc<PrimaryServer>,
    introspection: Arc<IntrospectionServer>,
    signals: Arc<SignalWatcher>,
}

impl App {
    pub async fn build(config: GatewayConfig) -> Result<Self, StartupError> {
        let metrics = Arc::new(Metrics::new(&config.observability)?);
        metrics.record_build_info(&config.observability.service_name);

        let ingester = ingester(&config, &metrics);
        let (handler, routes) = build_handler(&config, metrics.clone(), ingester);
        tracing::debug!(routes = routes.routes().len(), "Routes registered");

        let server = Arc::new(PrimaryServer::bind(&config.server, handler).await?);

        let signals = Arc::new(SignalWatcher::new(config.lifecycle.shutdown_delay()));
        let introspection = Arc::new(
            IntrospectionServer::bind(
                &config.admin,
                AdminState::new(signals.clone(), metrics.clone()),
            )
            .await?,
        );

        tracing::info!(
            http = %server.http_addr(),
            rpc = %server.rpc_addr(),
            introspection = %introspection.local_addr(),
            auth_enabled = config.auth.enabled,
            max_request_body_size = config.server.max_request_body_size,
            "Listeners bound"
        );

        Ok(Self {
            metrics,
            server,
            introspection,
            signals,
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.server.http_addr()
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.server.rpc_addr()
    }

    pub fn introspection_addr(&self) -> SocketAddr {
        self.introspection.local_addr()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Interrupting the watcher stops the whole group, as a signal would.
    pub fn signal_watcher(&self) -> Arc<SignalWatcher> {
        self.signals.clone()
    }

    /// Run every actor until the first one returns.
    pub async fn run(self) -> Result<(), BoxError> {
        let mut group = Group::new();
        group.add(self.server);
        group.add(self.introspection);
        group.add(self.signals);

        tracing::info!(actors = group.len(), "Starting");
        let result = group.run().await;
        tracing::info!("Shutdown complete");
        result
    }
}
