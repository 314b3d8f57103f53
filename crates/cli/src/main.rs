//! `sipwire`: a UDP SIP registrar

mod config;
mod logging;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sipwire_registrar_core::{InMemoryRegistry, Registrar};
use sipwire_sip_transport::{Transport, bind_udp};
use sipwire_transaction_core::TransactionLayer;
use tracing::{error, info};

use crate::config::{Cli, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(&cli)?;
    logging::setup_logging(&config.logging)?;

    let (transport, events) = bind_udp(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    let transport = Arc::new(transport);
    let local = transport.local_addr()?;

    let registry = Arc::new(InMemoryRegistry::new(config.registrar.domain.clone()));
    let mut registrar = Registrar::new(config.registrar.clone(), registry.clone(), HashMap::new());
    if config.proxy {
        registrar = registrar.with_proxy(registry);
    }
    let registrar = Arc::new(registrar);
    let (layer, mut task) =
        TransactionLayer::start(config.layer_config(), transport.clone(), events, registrar)?;
    info!(%local, domain = %config.registrar.domain, proxy = config.proxy, "sipwire listening");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("shutting down");
            layer.shutdown()?;
            if let Err(e) = (&mut task).await {
                error!(error = %e, "transaction layer task failed");
            }
        }
        result = &mut task => {
            if let Err(e) = result {
                error!(error = %e, "transaction layer task failed");
            }
            info!("transaction layer stopped");
        }
    }

    transport.close().await?;
    Ok(())
}
