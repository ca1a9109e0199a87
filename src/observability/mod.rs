//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (histograms, gauges, counters on the injected provider)
//!     → tracing.rs (trace ids extracted or minted per request)
//!
//! Consumers:
//!     → Log aggregation (stdout, text or JSON)
//!     → Introspection listener `/metrics` (Prometheus scrape)
//!     → Request logs and exemplars (trace id correlation)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Trace id flows through every request log line
//! - Metrics are cheap (atomic increments)
//! - The metrics provider is passed explicitly, never installed globally

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use self::logging::init_logging;
pub use self::metrics::{Exemplar, Metrics, MetricsError};
pub use self::tracing::{
    JaegerPropagator, SpanContext, SpanContextExtractor, Tracer, W3cTraceContext,
};
