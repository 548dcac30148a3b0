//! tfc-operator: Kubernetes operator for HCP Terraform.
//!
//! Watches Workspace, Project, Module and AgentPool objects and converges
//! them onto the remote service.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tfc_operator::{Args, OperatorConfig, controller};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tfc_operator=info,tfc_client=info,kube=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = OperatorConfig::from(args);

    let instance = hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned());

    info!("Starting tfc-operator {}", env!("CARGO_PKG_VERSION"));
    info!("Remote service: {}", config.tfe_address);

    let client = kube::Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;

    controller::setup(client, config, instance).await;

    info!("tfc-operator stopped");
    Ok(())
}
