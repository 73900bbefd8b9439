use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use embed_proxy::{AppConfig, Logger, ProxyApplicationServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards have to outlive the server so buffered logs get flushed on exit
    let _guards = Logger::init(config.cargo_env, config.sentry_dsn.clone());

    info!(
        "logger and env prepped ({})...",
        Logger::environment_name(config.cargo_env)
    );

    ProxyApplicationServer::serve(config)
        .await
        .context("embed proxy failed to start")?;

    Ok(())
}
