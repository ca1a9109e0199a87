//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const MB: u64 = 1024 * 1024;

/// Root configuration for the ingestion gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Primary listener configuration (HTTP + RPC).
    pub server: ServerConfig,

    /// Introspection listener configuration.
    pub admin: AdminConfig,

    /// Ingestion API settings.
    pub api: ApiConfig,

    /// Tenant authentication settings.
    pub auth: AuthConfig,

    /// Logging, metrics and tracing settings.
    pub observability: ObservabilityConfig,

    /// Process lifecycle settings.
    pub lifecycle: LifecycleConfig,

    /// Downstream ingester settings.
    pub ingester: IngesterConfig,
}

/// Primary server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP bind address (e.g., "0.0.0.0:8000").
    pub http_listen_address: String,

    /// RPC bind address (e.g., "0.0.0.0:9095").
    pub grpc_listen_address: String,

    /// Maximum concurrent HTTP connections, 0 means no limit.
    pub max_connections: usize,

    /// Time allowed for in-flight requests to finish on shutdown.
    pub graceful_shutdown_secs: u64,

    /// Maximum request body size in bytes, 0 disables the limit.
    pub max_request_body_size: u64,

    /// Base path every API route is served from (e.g. "/v1").
    pub path_prefix: String,
}

impl ServerConfig {
    pub fn graceful_shutdown(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_listen_address: "0.0.0.0:8000".to_string(),
            grpc_listen_address: "0.0.0.0:9095".to_string(),
            max_connections: 0,
            graceful_shutdown_secs: 5,
            max_request_body_size: 10 * MB,
            path_prefix: String::new(),
        }
    }
}

/// Introspection (health, metrics, profiling) listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address of the introspection listener.
    pub bind_address: String,

    /// Time allowed for in-flight requests to finish on shutdown.
    pub graceful_shutdown_secs: u64,
}

impl AdminConfig {
    pub fn graceful_shutdown(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_secs)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
            graceful_shutdown_secs: 5,
        }
    }
}

/// Ingestion API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ApiConfig {
    pub timeouts: ApiTimeouts,
}

/// Per-endpoint downstream deadlines, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiTimeouts {
    pub series_secs: u64,
    pub check_run_secs: u64,
    pub intake_secs: u64,
    pub sketches_secs: u64,
}

impl ApiTimeouts {
    pub fn series(&self) -> Duration {
        Duration::from_secs(self.series_secs)
    }

    pub fn check_run(&self) -> Duration {
        Duration::from_secs(self.check_run_secs)
    }

    pub fn intake(&self) -> Duration {
        Duration::from_secs(self.intake_secs)
    }

    pub fn sketches(&self) -> Duration {
        Duration::from_secs(self.sketches_secs)
    }
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self {
            series_secs: 5,
            check_run_secs: 5,
            intake_secs: 5,
            sketches_secs: 5,
        }
    }
}

/// Tenant authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Require the tenant header. When disabled a constant tenant is injected.
    pub enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Service name reported in traces and the build info metric.
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Namespace prepended to every exported metric.
    pub metric_prefix: String,

    /// Request duration histogram buckets, in seconds.
    pub instrument_buckets: Vec<f64>,

    /// Probability of sampling a trace that has no inbound sampling decision.
    pub trace_sampling_ratio: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "ingest-gateway".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metric_prefix: "ingest_gateway".to_string(),
            instrument_buckets: vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0,
            ],
            trace_sampling_ratio: 0.01,
        }
    }
}

/// Process lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Time to keep serving after SIGINT/SIGTERM while reporting not-ready.
    pub shutdown_delay_secs: u64,
}

impl LifecycleConfig {
    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_secs(self.shutdown_delay_secs)
    }
}

/// Downstream ingester configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngesterConfig {
    /// When disabled every write is answered with 501.
    pub enabled: bool,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
