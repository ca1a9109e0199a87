//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Registerer.register_route(path, methods, handler)
//!     → axum::Router (dispatch)
//!     → RouteTable (labels for metrics and tracing)
//!
//! Per request:
//!     (method, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (template match, label derivation)
//!     → Return: route label, "notfound" or sentinel "other"
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable at runtime
//! - Labels are low-cardinality: unmatched paths collapse to a sentinel
//! - Deterministic: same input always yields the same label

pub mod matcher;
pub mod router;

pub use matcher::{make_label_value, PathTemplate};
pub use router::{
    Registerer, RouteDescriptor, RouteMatch, RouteTable, NOT_FOUND_ROUTE, OTHER_ROUTE,
};
