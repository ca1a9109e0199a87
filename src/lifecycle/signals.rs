//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT/SIGTERM
//! - Flip readiness to false so load balancers drain the instance
//! - Keep serving for the configured delay, then stop the group
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Returning `Ok` on a signal makes the process exit cleanly
//! - Readiness is a lock-free flag shared with the introspection server

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tower::BoxError;

use crate::lifecycle::actor::Actor;
use crate::lifecycle::shutdown::Shutdown;

/// Reports whether the process should receive traffic.
pub trait ReadinessProvider: Send + Sync {
    fn is_ready(&self) -> bool;
}

/// Readiness for processes without a signal watcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl ReadinessProvider for AlwaysReady {
    fn is_ready(&self) -> bool {
        true
    }
}

/// Actor that stops the group on SIGINT or SIGTERM.
#[derive(Debug)]
pub struct SignalWatcher {
    ready: AtomicBool,
    shutdown_delay: Duration,
    quit: Shutdown,
}

impl SignalWatcher {
    pub fn new(shutdown_delay: Duration) -> Self {
        Self {
            ready: AtomicBool::new(true),
            shutdown_delay,
            quit: Shutdown::new(),
        }
    }

    /// Behave as if a stop signal was received: drop readiness, wait the
    /// shutdown delay, then return.
    async fn drain(&self) {
        self.ready.store(false, Ordering::SeqCst);
        if !self.shutdown_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.shutdown_delay) => {}
                _ = self.quit.wait() => {}
            }
        }
        tracing::info!("shutting down");
    }
}

impl ReadinessProvider for SignalWatcher {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[cfg(unix)]
async fn stop_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn stop_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

#[async_trait]
impl Actor for SignalWatcher {
    fn name(&self) -> &str {
        "signal-watcher"
    }

    async fn run(&self) -> Result<(), BoxError> {
        tracing::info!("Waiting for stop signal");
        tokio::select! {
            _ = self.quit.wait() => Ok(()),
            signal = stop_signal() => {
                let signal = signal?;
                tracing::info!(signal, delay = ?self.shutdown_delay, "Received stop signal");
                self.drain().await;
                Ok(())
            }
        }
    }

    fn interrupt(&self, _cause: Option<&BoxError>) {
        self.quit.trigger();
    }
}
