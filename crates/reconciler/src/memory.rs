//! In-memory registry and cluster for tests and dry runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use driftwatch_core::{ApplicationDescriptor, Digest};
use tokio::sync::RwLock;

use crate::cluster::{ClusterStateReader, ConvergenceActuator};
use crate::error::{Error, Result};
use crate::registry::{RegistryResolver, resolve_from_listing};
use crate::types::{ObservedDigests, RegistryVersionRecord};

type PackageKey = (String, String);
type DeploymentKey = (String, String);

fn deployment_key(namespace: &str, deployment: &str) -> DeploymentKey {
    (namespace.to_string(), deployment.to_string())
}

/// Registry serving fixed listings per `(account, image)`.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    listings: RwLock<HashMap<PackageKey, Vec<RegistryVersionRecord>>>,
    failing: RwLock<HashMap<PackageKey, u16>>,
}

impl InMemoryRegistry {
    /// Create an empty registry; every lookup is `VersionNotFound`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing of a package.
    pub async fn set_listing(
        &self,
        account: &str,
        image_name: &str,
        records: Vec<RegistryVersionRecord>,
    ) {
        self.listings
            .write()
            .await
            .insert((account.to_string(), image_name.to_string()), records);
    }

    /// Make lookups of a package answer with an HTTP `status`.
    pub async fn fail_with_status(&self, account: &str, image_name: &str, status: u16) {
        self.failing
            .write()
            .await
            .insert((account.to_string(), image_name.to_string()), status);
    }
}

#[async_trait]
impl RegistryResolver for InMemoryRegistry {
    async fn resolve_digest(&self, app: &ApplicationDescriptor) -> Result<Digest> {
        let key = (app.account.clone(), app.image_name.clone());
        if let Some(status) = self.failing.read().await.get(&key).copied() {
            return Err(Error::UnexpectedStatus {
                status,
                body: "injected failure".to_string(),
            });
        }
        let listings = self.listings.read().await;
        let records = listings.get(&key).map(Vec::as_slice).unwrap_or_default();
        resolve_from_listing(app, records)
    }
}

#[derive(Debug, Default)]
struct DeploymentRecord {
    /// Runtime image references, one inner vec per pod.
    pods: Vec<Vec<String>>,
    restarts: usize,
}

/// Cluster holding deployments as lists of pod image references.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    deployments: RwLock<HashMap<DeploymentKey, DeploymentRecord>>,
    failing_pod_lists: RwLock<HashSet<DeploymentKey>>,
    conflicting: RwLock<HashSet<DeploymentKey>>,
}

impl InMemoryCluster {
    /// Create a cluster without deployments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a deployment whose pods run the given image
    /// references (one inner vec of container references per pod).
    pub async fn set_pods(&self, namespace: &str, deployment: &str, pods: Vec<Vec<String>>) {
        let mut deployments = self.deployments.write().await;
        let record = deployments
            .entry(deployment_key(namespace, deployment))
            .or_default();
        record.pods = pods;
    }

    /// Create or replace a deployment with one single-container pod per reference.
    pub async fn set_running(&self, namespace: &str, deployment: &str, image_ids: &[&str]) {
        let pods = image_ids
            .iter()
            .map(|id| vec![(*id).to_string()])
            .collect();
        self.set_pods(namespace, deployment, pods).await;
    }

    /// Make pod listing for a deployment fail.
    pub async fn fail_pod_list(&self, namespace: &str, deployment: &str) {
        self.failing_pod_lists
            .write()
            .await
            .insert(deployment_key(namespace, deployment));
    }

    /// Make restarts of a deployment be rejected as concurrent modifications.
    pub async fn conflict_on_restart(&self, namespace: &str, deployment: &str) {
        self.conflicting
            .write()
            .await
            .insert(deployment_key(namespace, deployment));
    }

    /// Restarts issued against a deployment so far.
    pub async fn restart_count(&self, namespace: &str, deployment: &str) -> usize {
        self.deployments
            .read()
            .await
            .get(&deployment_key(namespace, deployment))
            .map_or(0, |record| record.restarts)
    }
}

#[async_trait]
impl ClusterStateReader for InMemoryCluster {
    async fn observed_digests(&self, namespace: &str, deployment: &str) -> Result<ObservedDigests> {
        let key = deployment_key(namespace, deployment);
        let deployments = self.deployments.read().await;
        let record = deployments
            .get(&key)
            .ok_or_else(|| Error::deployment_not_found(namespace, deployment))?;

        if self.failing_pod_lists.read().await.contains(&key) {
            return Err(Error::pod_list_failed(
                namespace,
                format!("app={deployment}"),
                "injected failure",
            ));
        }

        let mut observed = ObservedDigests::new();
        for pod in &record.pods {
            observed.record_pod();
            for image_id in pod {
                observed.record_image_id(image_id);
            }
        }
        Ok(observed)
    }
}

#[async_trait]
impl ConvergenceActuator for InMemoryCluster {
    async fn restart(&self, namespace: &str, deployment: &str) -> Result<()> {
        let key = deployment_key(namespace, deployment);
        if self.conflicting.read().await.contains(&key) {
            return Err(Error::conflict(namespace, deployment));
        }
        let mut deployments = self.deployments.write().await;
        let record = deployments
            .get_mut(&key)
            .ok_or_else(|| Error::deployment_not_found(namespace, deployment))?;
        record.restarts = record.restarts.saturating_add(1);
        Ok(())
    }
}
