// Formbase API Server
// Parses configuration, picks a store and serves the HTTP API until shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use formbase::{
    create_memory_store, create_postgres_store, init_logging_with_level, into_shared_store,
    log_operation, observability::log_error_with_context, start_server, FormStore, Operation,
    OperationContext, ServerConfig,
};
use std::sync::Arc;
use tracing::{info, warn};

async fn open_store(config: &ServerConfig) -> Result<Arc<dyn FormStore>> {
    if config.in_memory {
        warn!("Running with the in-memory store; data is lost on shutdown");
        return Ok(into_shared_store(create_memory_store()));
    }

    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required unless --in-memory is set")?;
    let store = create_postgres_store(
        database_url,
        config.max_connections,
        config.connect_timeout(),
    )
    .await?;
    Ok(into_shared_store(store))
}

async fn run(config: ServerConfig, ctx: &OperationContext) -> Result<()> {
    config.validate()?;
    let base_url = config.frontend_base_url()?;
    let api_prefix = config.normalized_api_prefix()?;

    info!("Starting Formbase API server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Frontend URL: {}", base_url);
    info!("Port: {}", config.port);

    let store = open_store(&config).await?;
    log_operation(
        &ctx.child("server.start"),
        &Operation::Startup {
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        &Ok(()),
    );
    start_server(store, base_url, &api_prefix, config.port).await
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    init_logging_with_level(config.verbose, config.quiet)?;

    let ctx = OperationContext::new("server.run");
    if let Err(e) = run(config, &ctx).await {
        log_error_with_context(&e, &ctx);
        return Err(e);
    }

    info!("Formbase API server stopped");
    Ok(())
}
