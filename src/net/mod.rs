//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → Hand off to HTTP layer (axum::serve) or the RPC listener (tonic)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Listeners are bound during startup so bind errors are fatal early

pub mod listener;

pub use listener::{bind, LimitedListener, LimitedStream, ListenerError};
