//! Metrics ingestion gateway.
//!
//! Accepts agent writes (series, check runs, host tags) over HTTP, translates
//! them into label-set time series and hands them to a remote writer.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────┐
//!                    │                  INGEST GATEWAY                       │
//!                    │                                                       │
//!   Agent request    │  ┌─────────┐   ┌────────────┐   ┌─────────────────┐  │
//!   ─────────────────┼─▶│   net   │──▶│ middleware │──▶│  ingest api     │  │
//!                    │  │listener │   │  pipeline  │   │ decode + sink   │  │
//!                    │  └─────────┘   └────────────┘   └────────┬────────┘  │
//!                    │                                          ▼           │
//!                    │                                 ┌─────────────────┐  │
//!                    │                                 │ translate/write │──┼──▶ Downstream
//!                    │                                 └─────────────────┘  │
//!                    │                                                       │
//!   Probes/scrapes   │  ┌───────────────┐   ┌─────────────┐   ┌──────────┐  │
//!   ─────────────────┼─▶│ introspection │   │ RPC listener│   │ signals  │  │
//!                    │  └───────────────┘   └─────────────┘   └──────────┘  │
//!                    │           (all actors run in one lifecycle group)    │
//!                    └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ingest_gateway::config::{load_config, ConfigError, GatewayConfig};
use ingest_gateway::observability::init_logging;
use ingest_gateway::App;

#[derive(Parser, Debug)]
#[command(name = "ingest-gateway", version, about = "Metrics ingestion gateway")]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.http_listen_address`.
    #[arg(long)]
    http_listen_address: Option<String>,

    /// Override `admin.bind_address`.
    #[arg(long)]
    admin_listen_address: Option<String>,

    /// Override `auth.enabled`.
    #[arg(long)]
    auth_enabled: Option<bool>,
}

impl Cli {
    fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => GatewayConfig::default(),
        };
        if let Some(address) = self.http_listen_address {
            config.server.http_listen_address = address;
        }
        if let Some(address) = self.admin_listen_address {
            config.admin.bind_address = address;
        }
        if let Some(enabled) = self.auth_enabled {
            config.auth.enabled = enabled;
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = cli.into_config()?;
    init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ingest-gateway starting");

    let app = App::build(config).await?;
    app.run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error running application: {err}");
            ExitCode::FAILURE
        }
    }
}
