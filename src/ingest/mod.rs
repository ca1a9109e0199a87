//! Metrics ingestion subsystem.
//!
//! # Data Flow
//! ```text
//! Agent request
//!     → api.rs        (route, per-endpoint deadline, baggage)
//!     → decode.rs     (optional zlib, JSON into payload.rs types)
//!     → ingester.rs   (Ingester sink)
//!     → translate.rs  (labels.rs naming, host_tags.rs lookups)
//!     → writer.rs     (RemoteWriter)
//! ```
//!
//! # Design Decisions
//! - Decode failures never reach the sink
//! - Sinks observe the request deadline; handlers never abort them
//! - Host tags are looked up once per host per request

pub mod api;
pub mod decode;
pub mod host_tags;
pub mod ingester;
pub mod labels;
pub mod payload;
pub mod translate;
pub mod writer;

pub use api::IngestApi;
pub use decode::DecodeError;
pub use host_tags::{HostTagStore, InMemoryHostTagStore};
pub use ingester::{DisabledIngester, Ingester, TranslatingIngester};
pub use payload::{IntakePayload, MetricType, Point, SeriesPayload, Serie, ServiceCheck, ServiceChecks};
pub use translate::{TimeSeries, WriteRequest};
pub use writer::{LogWriter, RemoteWriter};
