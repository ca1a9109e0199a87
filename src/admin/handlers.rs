use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::admin::AdminState;

/// Readiness probe.
pub async fn healthz(State(state): State<AdminState>) -> impl IntoResponse {
    if state.readiness.is_ready() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Not ready")
    }
}

/// Prometheus text exposition.
pub async fn prometheus_metrics(State(state): State<AdminState>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

const PROFILES: [(&str, &str); 2] = [
    ("cmdline", "The command line invocation of the current program"),
    ("runtime", "Statistics of the async runtime"),
];

/// Index of the available profiles.
pub async fn pprof_index() -> String {
    let mut index = String::from("Types of profiles available:\n");
    for (name, description) in PROFILES {
        index.push_str(&format!("/debug/pprof/{name}: {description}\n"));
    }
    index
}

/// Process arguments, NUL separated.
pub async fn pprof_cmdline() -> String {
    std::env::args().collect::<Vec<_>>().join("\0")
}

#[derive(Serialize)]
pub struct RuntimeStats {
    pub workers: usize,
    pub alive_tasks: usize,
    pub uptime_secs: f64,
}

pub async fn pprof_runtime(State(state): State<AdminState>) -> Json<RuntimeStats> {
    let metrics = tokio::runtime::Handle::current().metrics();
    Json(RuntimeStats {
        workers: metrics.num_workers(),
        alive_tasks: metrics.num_alive_tasks(),
        uptime_secs: state.started.elapsed().as_secs_f64(),
    })
}
