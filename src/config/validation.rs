//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, histogram buckets and ratios
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check the configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(
        &mut errors,
        "server.http_listen_address",
        &config.server.http_listen_address,
    );
    check_address(
        &mut errors,
        "server.grpc_listen_address",
        &config.server.grpc_listen_address,
    );
    check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);

    let prefix = &config.server.path_prefix;
    if !prefix.is_empty() && !prefix.starts_with('/') {
        errors.push(ValidationError::new(
            "server.path_prefix",
            "must start with '/'",
        ));
    }

    let observability = &config.observability;
    if observability.service_name.trim().is_empty() {
        errors.push(ValidationError::new(
            "observability.service_name",
            "service name can't be empty",
        ));
    }

    if observability.metric_prefix.is_empty()
        || !observability
            .metric_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        errors.push(ValidationError::new(
            "observability.metric_prefix",
            "must be a non-empty [a-zA-Z0-9_] string",
        ));
    }

    let buckets = &observability.instrument_buckets;
    if buckets.is_empty() {
        errors.push(ValidationError::new(
            "observability.instrument_buckets",
            "at least one bucket is required",
        ));
    } else if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0)
        || buckets.windows(2).any(|w| w[0] >= w[1])
    {
        errors.push(ValidationError::new(
            "observability.instrument_buckets",
            "buckets must be positive and strictly ascending",
        ));
    }

    if !(0.0..=1.0).contains(&observability.trace_sampling_ratio) {
        errors.push(ValidationError::new(
            "observability.trace_sampling_ratio",
            "must be within [0, 1]",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if let Err(e) = value.parse::<SocketAddr>() {
        errors.push(ValidationError::new(field, format!("invalid address {value:?}: {e}")));
    }
}
