//! Telemetry Agent - container resource sampler
//!
//! Samples CPU and memory usage for every container in one namespace on a
//! fixed interval and appends the samples to PostgreSQL.

use anyhow::{Context, Result};
use std::sync::Arc;
use telemetry_lib::{
    collector::{KubeCluster, SamplingLoopBuilder},
    health::{components, HealthRegistry},
    PgSampleStore,
};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting telemetry-agent");

    let config = config::AgentConfig::load()?;
    info!(
        namespace = %config.namespace,
        interval_secs = config.interval_secs,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::COLLECTOR).await;
    health_registry.register(components::STORE).await;

    let client = cluster_client(&config).await?;
    let cluster = Arc::new(KubeCluster::new(client));
    let store = Arc::new(PgSampleStore::connect(&config.store_config()).await?);

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let sampler = SamplingLoopBuilder::new()
        .cluster(cluster)
        .store(store)
        .health(health_registry)
        .namespace(config.namespace.clone())
        .interval(config.sampling_interval())
        .build()?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sampler_handle = tokio::spawn(sampler.run(shutdown_rx));

    // stop on SIGINT or when the API server dies
    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            info!("SIGINT received, shutting down");
            signal.context("Failed to listen for SIGINT")
        }
        served = &mut api_handle => {
            let err = match served {
                Ok(Ok(())) => anyhow::anyhow!("API server exited unexpectedly"),
                Ok(Err(e)) => e.context("API server failed"),
                Err(e) => anyhow::Error::new(e).context("API server task failed"),
            };
            error!(error = %format!("{:#}", err), "API server stopped, shutting down");
            Err(err)
        }
    };

    // the loop exits at its next wait, never mid-cycle
    let _ = shutdown_tx.send(());
    sampler_handle.await.context("Sampling loop panicked")?;
    api_handle.abort();

    outcome
}

/// Build the cluster client from explicit settings or the ambient kubeconfig
async fn cluster_client(config: &config::AgentConfig) -> Result<kube::Client> {
    let mut kube_config = match &config.cluster_url {
        Some(url) => kube::Config::new(
            url.parse::<http::Uri>()
                .with_context(|| format!("Invalid cluster_url '{}'", url))?,
        ),
        None => kube::Config::infer()
            .await
            .context("Failed to infer cluster configuration")?,
    };

    if let Some(token_file) = &config.cluster_token_file {
        kube_config.auth_info.token_file = Some(token_file.clone());
    }
    if config.cluster_accept_invalid_certs {
        kube_config.accept_invalid_certs = true;
    }

    kube::Client::try_from(kube_config).context("Failed to build cluster client")
}
