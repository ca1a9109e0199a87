//! Primary server: the HTTP handler chain plus the RPC listener.
//!
//! # Responsibilities
//! - Bind the HTTP and RPC listeners at startup
//! - Serve both concurrently; the first to exit stops the other
//! - Drain in-flight requests on interrupt, bounded by a graceful deadline
//!
//! # Design Decisions
//! - Listeners are bound in `bind` so address errors fail startup
//! - Exceeding the graceful deadline is logged, never fatal
//! - The RPC listener hosts no services; it exists for transport parity

use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::ServiceExt as _;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tower::BoxError;

use crate::config::ServerConfig;
use crate::http::middleware::Handler;
use crate::lifecycle::{Actor, Shutdown};
use crate::net::{LimitedListener, ListenerError};

/// Error type for the primary server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("http server error: {0}")]
    Http(#[source] std::io::Error),
    #[error("rpc server error: {0}")]
    Rpc(#[source] tonic::transport::Error),
    #[error("{0} server already started")]
    AlreadyStarted(&'static str),
}

/// Serve `handler` on `listener` until `shutdown` triggers, then give
/// in-flight requests `grace` to finish.
pub async fn serve_http<L>(
    name: &'static str,
    listener: L,
    handler: Handler,
    shutdown: Shutdown,
    grace: Duration,
) -> std::io::Result<()>
where
    L: axum::serve::Listener<Addr = SocketAddr>,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(server = name, address = %addr, "HTTP server starting");
    }

    let serve = axum::serve(listener, handler.into_make_service())
        .with_graceful_shutdown(shutdown.signal())
        .into_future();

    let result = with_grace_deadline(name, serve, &shutdown, grace).await;
    tracing::info!(server = name, "HTTP server stopped");
    result.unwrap_or(Ok(()))
}

/// Run `fut` to completion, or until `grace` has passed since shutdown was
/// triggered. Returns `None` when the deadline cut it short.
async fn with_grace_deadline<F: Future>(
    name: &'static str,
    fut: F,
    shutdown: &Shutdown,
    grace: Duration,
) -> Option<F::Output> {
    let deadline = async {
        shutdown.wait().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        output = fut => Some(output),
        _ = deadline => {
            tracing::warn!(server = name, grace = ?grace, "Graceful shutdown deadline exceeded, closing connections");
            None
        }
    }
}

/// The primary HTTP + RPC server actor.
pub struct PrimaryServer {
    http: Mutex<Option<LimitedListener>>,
    rpc: Mutex<Option<TcpListener>>,
    http_addr: SocketAddr,
    rpc_addr: SocketAddr,
    handler: Handler,
    graceful_shutdown: Duration,
    shutdown: Shutdown,
}

impl PrimaryServer {
    /// Bind both listeners.
    pub async fn bind(config: &ServerConfig, handler: Handler) -> Result<Self, ServerError> {
        let http = LimitedListener::bind(&config.http_listen_address, config.max_connections).await?;
        let rpc = crate::net::bind(&config.grpc_listen_address).await?;

        let http_addr = axum::serve::Listener::local_addr(&http).map_err(ServerError::Http)?;
        let rpc_addr = rpc.local_addr().map_err(ServerError::Http)?;

        Ok(Self {
            http: Mutex::new(Some(http)),
            rpc: Mutex::new(Some(rpc)),
            http_addr,
            rpc_addr,
            handler,
            graceful_shutdown: config.graceful_shutdown(),
            shutdown: Shutdown::new(),
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        self.rpc_addr
    }

    fn take<T>(slot: &Mutex<Option<T>>, name: &'static str) -> Result<T, ServerError> {
        slot.lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or(ServerError::AlreadyStarted(name))
    }

    async fn serve_rpc(&self, listener: TcpListener) -> Result<(), ServerError> {
        tracing::info!(address = %self.rpc_addr, "RPC server starting");

        let serve = tonic::transport::Server::builder()
            .add_routes(tonic::service::Routes::default())
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                self.shutdown.signal(),
            );

        let result = with_grace_deadline("rpc", serve, &self.shutdown, self.graceful_shutdown).await;
        tracing::info!("RPC server stopped");
        result.unwrap_or(Ok(())).map_err(ServerError::Rpc)
    }
}

#[async_trait]
impl Actor for PrimaryServer {
    fn name(&self) -> &str {
        "server"
    }

    async fn run(&self) -> Result<(), BoxError> {
        let http_listener = Self::take(&self.http, "http")?;
        let rpc_listener = Self::take(&self.rpc, "rpc")?;

        let http = async {
            serve_http(
                "http",
                http_listener,
                self.handler.clone(),
                self.shutdown.clone(),
                self.graceful_shutdown,
            )
            .await
            .map_err(ServerError::Http)
        };
        let rpc = self.serve_rpc(rpc_listener);
        tokio::pin!(http, rpc);

        // Whichever listener exits first decides the result; the other is
        // stopped and drained.
        let first = tokio::select! {
            result = &mut http => {
                self.shutdown.trigger();
                let _ = rpc.await;
                result
            }
            result = &mut rpc => {
                self.shutdown.trigger();
                let _ = http.await;
                result
            }
        };

        first.map_err(BoxError::from)
    }

    fn interrupt(&self, _cause: Option<&BoxError>) {
        self.shutdown.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::into_handler;
    use axum::routing::get;
    use std::sync::Arc;

    fn local_config() -> ServerConfig {
        ServerConfig {
            http_listen_address: "127.0.0.1:0".to_string(),
            grpc_listen_address: "127.0.0.1:0".to_string(),
            graceful_shutdown_secs: 1,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_serves_until_interrupted() {
        let handler = into_handler(axum::Router::new().route("/", get(|| async { "hello" })));
        let server = Arc::new(PrimaryServer::bind(&local_config(), handler).await.unwrap());
        let addr = server.http_addr();

        let running = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });

        let body = reqwest::get(format!("http://{addr}/"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "hello");

        server.interrupt(None);
        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_twice_fails() {
        let handler = into_handler(axum::Router::new());
        let server = PrimaryServer::bind(&local_config(), handler).await.unwrap();
        server.interrupt(None);
        assert!(server.run().await.is_ok());
        assert!(server.run().await.is_err());
    }

    #[tokio::test]
    async fn test_bind_error_is_reported() {
        let config = ServerConfig {
            http_listen_address: "nonsense".to_string(),
            ..local_config()
        };
        let handler = into_handler(axum::Router::new());
        assert!(matches!(
            PrimaryServer::bind(&config, handler).await,
            Err(ServerError::Listener(_))
        ));
    }
}
