//! # driftwatch
//!
//! Keeps Kubernetes deployments running the newest image published for
//! their tag.
//!
//! ## Initialization Sequence
//!
//! 1. **Tracing** - structured logs, `RUST_LOG` aware
//! 2. **Configuration** - applications file, validated up front
//! 3. **Clients** - GitHub registry and Kubernetes API, both bounded by the request timeout
//! 4. **Reconciliation Loop** - runs until Ctrl+C / SIGTERM
//!
//! Failures in steps 2 and 3 stop the process. Once the loop runs, a failing
//! application is logged and retried next cycle; nothing else stops it.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use driftwatch::cli::Cli;
use driftwatch_core::load_descriptors;
use driftwatch_reconciler::{
    GitHubRegistry, KubeCluster, LoopConfig, LoopStopper, ReconcilerBuilder, ReconciliationLoop,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    info!(
        conf = %cli.conf.display(),
        interval_seconds = cli.interval_seconds,
        request_timeout_seconds = cli.request_timeout().as_secs(),
        registry = %cli.registry_url,
        concurrency = cli.concurrency.get(),
        "driftwatch starting"
    );
    if cli.kubeconfig.is_none() {
        info!("--kubeconfig not set, inferring in-cluster configuration");
    }

    let apps = load_descriptors(&cli.conf)
        .with_context(|| format!("Failed to load applications from {}", cli.conf.display()))?;
    if apps.is_empty() {
        warn!("No applications configured; cycles will be empty");
    }
    info!(applications = apps.len(), "Configuration loaded");

    let registry = GitHubRegistry::new(cli.registry_url.clone(), cli.token.clone(), cli.request_timeout())
        .context("Failed to build registry client")?;
    let cluster = KubeCluster::connect(cli.kubeconfig.as_deref(), cli.request_timeout())
        .await
        .context("Failed to build Kubernetes client")?;

    let reconciler = ReconcilerBuilder::new()
        .with_registry(Arc::new(registry))
        .with_cluster(Arc::new(cluster))
        .max_concurrency(cli.concurrency.get())
        .build()
        .context("Failed to assemble reconciler")?;

    let mut runner = ReconciliationLoop::new(
        Arc::new(reconciler),
        apps,
        LoopConfig {
            interval: cli.interval(),
        },
    );

    if cli.once {
        let summary = runner.run_once().await;
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to render cycle summary")?
        );
        return Ok(());
    }

    tokio::spawn(stop_on_signal(runner.stopper()));
    let cycles = runner.run().await;

    info!(cycles, "driftwatch stopped gracefully");
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Stop the loop on Ctrl+C or SIGTERM.
async fn stop_on_signal(stopper: LoopStopper) {
    wait_for_shutdown().await;
    info!("Shutdown requested, finishing current cycle");
    stopper.stop();
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            error!("Failed to listen for SIGTERM: {}", err);
            return wait_for_ctrl_c().await;
        }
    };
    tokio::select! {
        () = wait_for_ctrl_c() => {}
        _ = terminate.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    on_ctrl_c(signal::ctrl_c()).await;
}

/// Resolve once `listener` reports Ctrl+C. A listener that fails never
/// resolves, so the loop keeps running.
async fn on_ctrl_c(listener: impl Future<Output = std::io::Result<()>>) {
    match listener.await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => {
            error!("Failed to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    }
}
