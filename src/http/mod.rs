//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum::serve on a bounded listener)
//!     → middleware/ (tracing, instrument, auth, logging, limits)
//!     → router (routing::Registerer output)
//!     → handler returns ApiError → error.rs maps it to a status
//! ```

pub mod context;
pub mod error;
pub mod middleware;
pub mod server;

pub use context::RequestContext;
pub use error::{ApiError, Canceled, ClassifiedError, DeadlineExceeded, ErrorClass};
pub use middleware::{into_handler, merge, Handler, Middleware};
pub use server::{serve_http, PrimaryServer, ServerError};
