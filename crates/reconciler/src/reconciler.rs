//! Reconciler implementation.

use std::sync::Arc;

use driftwatch_core::ApplicationDescriptor;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::cluster::{ClusterStateReader, ConvergenceActuator};
use crate::error::{Error, Result};
use crate::evaluator::evaluate;
use crate::registry::RegistryResolver;
use crate::types::{AppOutcome, AppReport, CycleSummary, DriftVerdict, Stage};

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Applications processed concurrently within a cycle; 1 is sequential.
    pub max_concurrency: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { max_concurrency: 1 }
    }
}

/// Drift reconciler for tag-tracking deployments.
///
/// Holds no state between cycles: every call refetches the registry
/// listing and the running pods.
pub struct Reconciler {
    registry: Arc<dyn RegistryResolver>,
    reader: Arc<dyn ClusterStateReader>,
    actuator: Arc<dyn ConvergenceActuator>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(
        registry: Arc<dyn RegistryResolver>,
        reader: Arc<dyn ClusterStateReader>,
        actuator: Arc<dyn ConvergenceActuator>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            registry,
            reader,
            actuator,
            config,
        }
    }

    /// Run one cycle over `apps`.
    ///
    /// Applications are independent: a failure is recorded in that
    /// application's report and the others still run. Reports come back in
    /// configuration order whatever the concurrency.
    pub async fn run_cycle(&self, apps: &[ApplicationDescriptor]) -> CycleSummary {
        // Collected first so the cycle future stays `Send`.
        let pending: Vec<_> = apps.iter().map(|app| self.reconcile_app(app)).collect();
        let reports: Vec<AppReport> = stream::iter(pending)
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let summary = CycleSummary::from_reports(reports);
        info!(
            applications = summary.total(),
            restarted = summary.restarted,
            converged = summary.converged,
            indeterminate = summary.indeterminate,
            failed = summary.failed,
            "Reconciliation cycle complete"
        );
        summary
    }

    /// Resolve, read, evaluate and, on drift, restart one application.
    pub async fn reconcile_app(&self, app: &ApplicationDescriptor) -> AppReport {
        let outcome = self.converge(app).await;
        AppReport {
            app: app.full_name(),
            target: app.target(),
            outcome,
        }
    }

    async fn converge(&self, app: &ApplicationDescriptor) -> AppOutcome {
        let digest = match self.registry.resolve_digest(app).await {
            Ok(digest) => digest,
            Err(e) => return failed(app, Stage::Resolving, &e),
        };

        let observed = match self
            .reader
            .observed_digests(&app.namespace, &app.deployment)
            .await
        {
            Ok(observed) => observed,
            Err(e) => return failed(app, Stage::Reading, &e),
        };

        if observed.dropped > 0 && !observed.is_empty() {
            warn!(
                app = %app.full_name(),
                dropped = observed.dropped,
                "Evaluating with partial pod data"
            );
        }

        match evaluate(&digest, &observed) {
            DriftVerdict::Converged => {
                debug!(app = %app.full_name(), digest = %digest, "Deployment already up to date");
                AppOutcome::Converged { digest }
            }
            DriftVerdict::Indeterminate(reason) => {
                warn!(
                    app = %app.full_name(),
                    target = %app.target(),
                    reason = %reason,
                    "Cannot determine running digest, skipping"
                );
                AppOutcome::Indeterminate { digest, reason }
            }
            DriftVerdict::Drifted => {
                info!(
                    app = %app.full_name(),
                    target = %app.target(),
                    digest = %digest,
                    running = ?observed.digests,
                    "Deployment is running an old image, restarting"
                );
                match self.actuator.restart(&app.namespace, &app.deployment).await {
                    Ok(()) => AppOutcome::Restarted { digest },
                    Err(e) => failed(app, Stage::Restarting, &e),
                }
            }
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

fn failed(app: &ApplicationDescriptor, stage: Stage, error: &Error) -> AppOutcome {
    warn!(
        app = %app.full_name(),
        target = %app.target(),
        stage = %stage,
        kind = %error.kind(),
        error = %error,
        "Application reconciliation failed"
    );
    AppOutcome::Failed {
        stage,
        kind: error.kind(),
        reason: error.to_string(),
    }
}

/// Builder for Reconciler.
#[derive(Default)]
pub struct ReconcilerBuilder {
    registry: Option<Arc<dyn RegistryResolver>>,
    reader: Option<Arc<dyn ClusterStateReader>>,
    actuator: Option<Arc<dyn ConvergenceActuator>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the registry resolver.
    pub fn with_registry(mut self, registry: Arc<dyn RegistryResolver>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the cluster state reader.
    pub fn with_reader(mut self, reader: Arc<dyn ClusterStateReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Set the convergence actuator.
    pub fn with_actuator(mut self, actuator: Arc<dyn ConvergenceActuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    /// Use one object as both reader and actuator.
    pub fn with_cluster<C>(self, cluster: Arc<C>) -> Self
    where
        C: ClusterStateReader + ConvergenceActuator + 'static,
    {
        self.with_reader(cluster.clone()).with_actuator(cluster)
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how many applications run at once.
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.config.max_concurrency = max;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a collaborator is missing or
    /// `max_concurrency` is zero.
    pub fn build(self) -> Result<Reconciler> {
        let registry = self
            .registry
            .ok_or_else(|| Error::invalid_config("registry resolver is required"))?;
        let reader = self
            .reader
            .ok_or_else(|| Error::invalid_config("cluster state reader is required"))?;
        let actuator = self
            .actuator
            .ok_or_else(|| Error::invalid_config("convergence actuator is required"))?;
        if self.config.max_concurrency == 0 {
            return Err(Error::invalid_config("max_concurrency must be at least 1"));
        }

        Ok(Reconciler::new(registry, reader, actuator, self.config))
    }
}
