use std::sync::Arc;

use clap::Parser;
use dependency_injector::{Config, DependencyInjector, DependencyValidator, Result, WebhookServer};
use kube::Client;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::parse());
    let client = connect(&config).await?;

    WebhookServer::new(config.clone())
        .mutator(DependencyInjector::new((client, config)))
        .validator(DependencyValidator)
        .run(shutdown_signal())
        .await?;

    info!("cleaning up");
    Ok(())
}

/// Builds the cluster client and waits until the API server answers
async fn connect(config: &Config) -> Result<Client> {
    let mut kube_config = kube::Config::infer().await?;
    kube_config.connect_timeout = Some(config.connect_timeout());
    kube_config.read_timeout = Some(config.request_timeout());
    kube_config.write_timeout = Some(config.request_timeout());

    let client = Client::try_from(kube_config)?;

    loop {
        match client.apiserver_version().await {
            Ok(version) => {
                info!(version = %version.git_version, "connected to API server");
                return Ok(client);
            }
            Err(err) => {
                warn!(
                    error = %err,
                    backoff = ?config.errors_backoff(),
                    "API server unreachable, retrying"
                );
                tokio::time::sleep(config.errors_backoff()).await;
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
