//! Drift reconciliation for Kubernetes deployments that track a registry tag.
//!
//! Every cycle, for each configured application:
//!
//! 1. **Resolve**: ask the registry which digest the tag points at
//! 2. **Read**: collect the digests the deployment's pods are running
//! 3. **Evaluate**: `Converged`, `Drifted`, or `Indeterminate`
//! 4. **Converge**: on drift, stamp the pod template so the pods roll
//!
//! Applications are isolated from each other: a failure is reported for
//! that application and retried next cycle. Nothing is kept between cycles.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use driftwatch_reconciler::{
//!     GitHubRegistry, KubeCluster, LoopConfig, ReconcilerBuilder, ReconciliationLoop,
//! };
//!
//! let registry = Arc::new(GitHubRegistry::new(base_url, token, timeout)?);
//! let cluster = Arc::new(KubeCluster::connect(None, timeout).await?);
//! let reconciler = ReconcilerBuilder::new()
//!     .with_registry(registry)
//!     .with_cluster(cluster)
//!     .build()?;
//!
//! let mut runner = ReconciliationLoop::new(Arc::new(reconciler), apps, LoopConfig::default());
//! runner.run().await;
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod cluster;
pub mod error;
pub mod evaluator;
pub mod kube_cluster;
pub mod r#loop;
pub mod memory;
pub mod reconciler;
pub mod registry;
pub mod types;

// Re-export main types
pub use cluster::{ClusterStateReader, ConvergenceActuator, RESTARTED_AT_ANNOTATION, extract_digest};
pub use error::{Error, ErrorKind, Result};
pub use evaluator::evaluate;
pub use kube_cluster::KubeCluster;
pub use r#loop::{LoopConfig, LoopStopper, ReconciliationLoop};
pub use memory::{InMemoryCluster, InMemoryRegistry};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use registry::{GITHUB_API_URL, GitHubRegistry, RegistryResolver, select_digest};
pub use types::{
    AppOutcome, AppReport, CycleSummary, DriftVerdict, IndeterminateReason, ObservedDigests,
    RegistryVersionRecord, Stage,
};
