//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Own the request metrics shared by the middleware pipeline
//! - Keep the latest trace exemplar per duration series
//! - Render Prometheus text exposition for the introspection listener
//!
//! # Metrics
//! - `<prefix>_request_duration_seconds` (histogram): latency by method, route, status
//! - `<prefix>_request_message_bytes` (histogram): request body bytes read
//! - `<prefix>_response_message_bytes` (histogram): response body bytes written
//! - `<prefix>_inflight_requests` (gauge): requests currently being served
//! - `<prefix>_ingester_metrics_parsed_total` (counter): series accepted by the ingester
//! - `<prefix>_build_info` (gauge): constant 1 labelled with service and version
//!
//! # Design Decisions
//! - No global recorder: one `Metrics` is built at startup and injected
//! - Handles are resolved per call; the recorder deduplicates by key
//! - Updates are atomic, no external locking on the request path

use std::time::SystemTime;

use dashmap::DashMap;
use metrics::{Counter, Gauge, Histogram, Key, Label, Level, Metadata, Recorder, Unit};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};

use crate::config::ObservabilityConfig;

const MB: f64 = 1024.0 * 1024.0;

/// Buckets for request and response body sizes.
pub const BODY_SIZE_BUCKETS: [f64; 8] = [
    1.0 * MB,
    2.5 * MB,
    5.0 * MB,
    10.0 * MB,
    25.0 * MB,
    50.0 * MB,
    100.0 * MB,
    250.0 * MB,
];

/// Error building the metrics provider.
#[derive(Debug, thiserror::Error)]
#[error("failed to build metrics recorder: {0}")]
pub struct MetricsError(#[from] BuildError);

/// A duration observation tied to a sampled trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Exemplar {
    pub trace_id: String,
    pub value: f64,
    pub recorded_at: SystemTime,
}

/// Injected metrics provider.
pub struct Metrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    request_duration: String,
    request_bytes: String,
    response_bytes: String,
    inflight: String,
    parsed: String,
    build_info: String,
    exemplars: DashMap<String, Exemplar>,
}

impl Metrics {
    /// Build a provider using the configured prefix and latency buckets.
    pub fn new(config: &ObservabilityConfig) -> Result<Self, MetricsError> {
        let prefix = &config.metric_prefix;
        let request_duration = format!("{prefix}_request_duration_seconds");
        let request_bytes = format!("{prefix}_request_message_bytes");
        let response_bytes = format!("{prefix}_response_message_bytes");

        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(request_duration.clone()),
                &config.instrument_buckets,
            )?
            .set_buckets_for_metric(Matcher::Full(request_bytes.clone()), &BODY_SIZE_BUCKETS)?
            .set_buckets_for_metric(Matcher::Full(response_bytes.clone()), &BODY_SIZE_BUCKETS)?
            .build_recorder();
        let handle = recorder.handle();

        let metrics = Self {
            recorder,
            handle,
            request_duration,
            request_bytes,
            response_bytes,
            inflight: format!("{prefix}_inflight_requests"),
            parsed: format!("{prefix}_ingester_metrics_parsed_total"),
            build_info: format!("{prefix}_build_info"),
            exemplars: DashMap::new(),
        };
        metrics.describe();

        Ok(metrics)
    }

    fn describe(&self) {
        self.recorder.describe_histogram(
            self.request_duration.clone().into(),
            Some(Unit::Seconds),
            "Time (in seconds) spent serving HTTP requests.".into(),
        );
        self.recorder.describe_histogram(
            self.request_bytes.clone().into(),
            Some(Unit::Bytes),
            "Size (in bytes) of messages received in the request.".into(),
        );
        self.recorder.describe_histogram(
            self.response_bytes.clone().into(),
            Some(Unit::Bytes),
            "Size (in bytes) of messages sent in response.".into(),
        );
        self.recorder.describe_gauge(
            self.inflight.clone().into(),
            None,
            "Current number of inflight requests.".into(),
        );
        self.recorder.describe_counter(
            self.parsed.clone().into(),
            None,
            "The total number of metrics that have been parsed.".into(),
        );
        self.recorder.describe_gauge(
            self.build_info.clone().into(),
            None,
            "Build information of the running service.".into(),
        );
    }

    fn metadata() -> Metadata<'static> {
        Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
    }

    fn key(name: &str, labels: &[(&'static str, &str)]) -> Key {
        let labels: Vec<Label> = labels
            .iter()
            .map(|(k, v)| Label::new(*k, (*v).to_owned()))
            .collect();
        Key::from_parts(name.to_owned(), labels)
    }

    fn histogram(&self, name: &str, labels: &[(&'static str, &str)]) -> Histogram {
        self.recorder
            .register_histogram(&Self::key(name, labels), &Self::metadata())
    }

    /// Record a request duration, keeping the observation as an exemplar when
    /// it belongs to a sampled trace.
    pub fn observe_duration(
        &self,
        method: &str,
        route: &str,
        status: u16,
        seconds: f64,
        trace_id: Option<&str>,
    ) {
        let status = status.to_string();
        let labels = [("method", method), ("route", route), ("status_code", &status)];
        self.histogram(&self.request_duration, &labels).record(seconds);

        if let Some(trace_id) = trace_id {
            self.exemplars.insert(
                exemplar_key(method, route, &status),
                Exemplar {
                    trace_id: trace_id.to_owned(),
                    value: seconds,
                    recorded_at: SystemTime::now(),
                },
            );
        }
    }

    /// Latest exemplar recorded for a duration series.
    pub fn exemplar(&self, method: &str, route: &str, status: u16) -> Option<Exemplar> {
        self.exemplars
            .get(&exemplar_key(method, route, &status.to_string()))
            .map(|e| e.value().clone())
    }

    pub fn observe_request_bytes(&self, method: &str, route: &str, bytes: u64) {
        self.histogram(&self.request_bytes, &[("method", method), ("route", route)])
            .record(bytes as f64);
    }

    pub fn observe_response_bytes(&self, method: &str, route: &str, bytes: u64) {
        self.histogram(&self.response_bytes, &[("method", method), ("route", route)])
            .record(bytes as f64);
    }

    /// In-flight gauge for one (method, route) pair.
    pub fn inflight(&self, method: &str, route: &str) -> Gauge {
        self.recorder.register_gauge(
            &Self::key(&self.inflight, &[("method", method), ("route", route)]),
            &Self::metadata(),
        )
    }

    /// Counter of series accepted by the ingester.
    pub fn metrics_parsed(&self) -> Counter {
        self.recorder
            .register_counter(&Self::key(&self.parsed, &[]), &Self::metadata())
    }

    /// Publish the build info gauge.
    pub fn record_build_info(&self, service_name: &str) {
        self.recorder
            .register_gauge(
                &Self::key(
                    &self.build_info,
                    &[
                        ("service_name", service_name),
                        ("version", env!("CARGO_PKG_VERSION")),
                    ],
                ),
                &Self::metadata(),
            )
            .set(1.0);
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("request_duration", &self.request_duration)
            .field("exemplars", &self.exemplars.len())
            .finish_non_exhaustive()
    }
}

fn exemplar_key(method: &str, route: &str, status: &str) -> String {
    format!("{method}|{route}|{status}")
}
