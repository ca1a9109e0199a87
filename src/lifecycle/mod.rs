//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Metrics/Tracer → Routes → Middleware chain → Bind listeners → Group
//!
//! Group (actor.rs):
//!     Run every actor → first to return interrupts the rest → wait for all
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → readiness false → shutdown delay → group stops
//! ```
//!
//! # Design Decisions
//! - Listeners bind before any actor starts (bind errors are fatal early)
//! - Every actor stops through `interrupt`, never by task abort
//! - Shutdown has a deadline: servers give up draining after it

pub mod actor;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use actor::{Actor, Group};
pub use shutdown::Shutdown;
pub use signals::{AlwaysReady, ReadinessProvider, SignalWatcher};
pub use startup::{App, StartupError};
