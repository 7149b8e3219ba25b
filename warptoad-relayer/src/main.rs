//! warptoad-relayer
//!
//! Relayer service that bridges wrapped funds between WarpToad deployments.
//!
//! Architecture:
//! 1. Deploy the configured chains behind a simulated cross-domain messenger
//! 2. Burn on the source chain of each route
//! 3. Store local roots, propagate them to the hub, aggregate and distribute
//!    the giga root
//! 4. Assemble proof inputs, prove and mint on the destination

mod config;
mod session;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::RelayerConfig;
use crate::session::SandboxSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = RelayerConfig::load()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warptoad_relayer=info,warptoad_bridge=info".into());
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting warptoad-relayer");
    info!("Hub chain: {}", config.hub_chain_id);
    info!("Routes: {:?}", config.routes());

    let session = SandboxSession::new(config)?;

    tokio::select! {
        result = session.run() => {
            match result {
                Ok(outcomes) => {
                    for outcome in &outcomes {
                        info!("{}", serde_json::to_string(outcome)?);
                    }
                }
                Err(e) => {
                    error!("Relayer session failed: {:#}", e);
                    return Err(e);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down relayer...");
        }
    }

    Ok(())
}
