//! Cluster-facing seams: reading running digests and issuing restarts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use driftwatch_core::Digest;
use itertools::Itertools;

use crate::error::Result;
use crate::types::ObservedDigests;

/// Pod template annotation whose change triggers a rolling restart.
///
/// Same key `kubectl rollout restart` writes.
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// Reads the digests currently running for a deployment.
#[async_trait]
pub trait ClusterStateReader: Send + Sync {
    /// Inspect the pods selected by `namespace/deployment`.
    ///
    /// Container references without a digest are dropped and counted in
    /// [`ObservedDigests::dropped`], they do not fail the read.
    async fn observed_digests(&self, namespace: &str, deployment: &str) -> Result<ObservedDigests>;
}

/// Forces a deployment's pods to be recreated.
#[async_trait]
pub trait ConvergenceActuator: Send + Sync {
    /// Issue a rolling restart. Every call performs a real update.
    async fn restart(&self, namespace: &str, deployment: &str) -> Result<()>;
}

/// Digest part of a runtime image reference such as
/// `ghcr.io/acme/api@sha256:abc...` (everything after the last `@`).
#[must_use]
pub fn extract_digest(image_id: &str) -> Option<Digest> {
    image_id
        .rsplit_once('@')
        .and_then(|(_, digest)| Digest::new(digest).ok())
}

/// Render `matchLabels` as an equality-based label selector, keys sorted.
///
/// Returns `None` for an empty map.
#[must_use]
pub fn label_selector(match_labels: &BTreeMap<String, String>) -> Option<String> {
    if match_labels.is_empty() {
        return None;
    }
    Some(
        match_labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .join(","),
    )
}
