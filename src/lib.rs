//! Metrics ingestion gateway library.

pub mod admin;
pub mod config;
pub mod http;
pub mod ingest;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::GatewayConfig;
pub use lifecycle::{App, Shutdown};
