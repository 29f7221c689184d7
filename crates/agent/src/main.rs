//! Fabric Agent - adaptive routing control plane daemon
//!
//! Bootstraps a fabric topology, runs the control loop for the lifetime of
//! the process and serves probes and metrics over HTTP.

use anyhow::Result;
use fabric_agent::{api, config::AgentConfig};
use fabric_core::{probes::components, telemetry::SyntheticTelemetry, FabricControlPlane};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = AGENT_VERSION, "Starting fabric-agent");

    let config = AgentConfig::load()?;
    info!(
        fabric = %config.fabric_name,
        compute_nodes = config.compute_nodes,
        switches = config.switches,
        classes = %config.classes,
        "Agent configured"
    );

    let source = Arc::new(match config.seed {
        Some(seed) => SyntheticTelemetry::seeded(seed),
        None => SyntheticTelemetry::new(),
    });
    let plane = FabricControlPlane::new(config.control_config()?, source)?;

    // Bootstrap the default topology
    let params = config.build_params()?;
    let generation = plane
        .rebuild_topology(params.compute_nodes, params.switches, params.classes)
        .await?;
    let stats = plane.topology_stats();
    info!(
        generation,
        links = stats.links,
        jobs = stats.jobs,
        "Topology bootstrapped"
    );

    let app_state = Arc::new(api::AppState::new(
        plane.probes().clone(),
        plane.metrics().clone(),
    ));
    plane.probes().set_ready(true).await;
    plane.start_loop();

    // Start health and metrics server
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = shutdown_rx.recv().await;
    }));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    plane.probes().set_ready(false).await;
    plane
        .probes()
        .set_degraded(components::CONTROL_LOOP, "shutting down")
        .await;
    let status = plane.stop_loop().await;
    info!(status = status.message(), "Control loop halted");

    let _ = shutdown_tx.send(());
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task panicked"),
        Ok(Ok(())) => {}
    }

    info!("Shutting down");
    Ok(())
}
