//! Core types for the reconciler.

use std::collections::BTreeSet;
use std::fmt;

use driftwatch_core::Digest;
use serde::Serialize;

use crate::cluster::extract_digest;
use crate::error::ErrorKind;

/// One version listed by the registry for an image.
///
/// Ephemeral: fetched fresh every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryVersionRecord {
    /// Opaque version identifier; for container packages this is the digest.
    pub version: String,
    /// Tags attached to this version, in registry order.
    pub tags: Vec<String>,
}

impl RegistryVersionRecord {
    /// Create a record.
    pub fn new<I, S>(version: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: version.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `tag` is attached to this version.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Digests observed on the running containers of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedDigests {
    /// Distinct digests reported by container statuses.
    pub digests: BTreeSet<Digest>,
    /// Container statuses whose image reference carried no digest.
    pub dropped: usize,
    /// Pods matched by the deployment selector.
    pub pods: usize,
    /// Container statuses inspected, parsable or not.
    pub containers: usize,
}

impl ObservedDigests {
    /// Create an empty observation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one matched pod.
    pub fn record_pod(&mut self) {
        self.pods = self.pods.saturating_add(1);
    }

    /// Record one container's runtime image reference.
    ///
    /// Returns `false` when the reference has no digest and was dropped.
    pub fn record_image_id(&mut self, image_id: &str) -> bool {
        self.containers = self.containers.saturating_add(1);
        match extract_digest(image_id) {
            Some(digest) => {
                self.digests.insert(digest);
                true
            }
            None => {
                self.dropped = self.dropped.saturating_add(1);
                false
            }
        }
    }

    /// Whether no usable digest was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

/// Why no verdict could be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IndeterminateReason {
    /// The selector matched no pods.
    NoPods,
    /// Pods exist but none reports a container status yet.
    NoRunningContainers,
    /// Every container image reference was unparsable.
    AllUnparsable { dropped: usize },
}

impl fmt::Display for IndeterminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPods => write!(f, "no pods match the deployment selector"),
            Self::NoRunningContainers => write!(f, "no container has reported an image yet"),
            Self::AllUnparsable { dropped } => {
                write!(f, "all {dropped} container image references lack a digest")
            }
        }
    }
}

/// Outcome of comparing the resolved digest with the running ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum DriftVerdict {
    /// Every observed digest equals the resolved digest.
    Converged,
    /// At least one observed digest differs.
    Drifted,
    /// Nothing usable was observed.
    Indeterminate(IndeterminateReason),
}

impl DriftVerdict {
    /// Whether a restart should be issued.
    #[must_use]
    pub const fn needs_restart(&self) -> bool {
        matches!(self, Self::Drifted)
    }
}

/// Step of the per-application state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolving,
    Reading,
    Evaluating,
    Restarting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Reading => "reading",
            Self::Evaluating => "evaluating",
            Self::Restarting => "restarting",
        };
        f.write_str(name)
    }
}

/// What happened to one application during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppOutcome {
    /// Already running the resolved digest.
    Converged { digest: Digest },
    /// Drift detected and a rolling restart was issued.
    Restarted { digest: Digest },
    /// No verdict; nothing was done.
    Indeterminate {
        digest: Digest,
        reason: IndeterminateReason,
    },
    /// A step failed; retried next cycle.
    Failed {
        stage: Stage,
        kind: ErrorKind,
        reason: String,
    },
}

/// Per-application result of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppReport {
    /// `account/image:tag` of the application.
    pub app: String,
    /// `namespace/deployment` of the application.
    pub target: String,
    /// What happened.
    pub outcome: AppOutcome,
}

/// Aggregate of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Applications restarted this cycle.
    pub restarted: usize,
    /// Applications already converged.
    pub converged: usize,
    /// Applications without a verdict.
    pub indeterminate: usize,
    /// Applications whose processing failed.
    pub failed: usize,
    /// Reports in configuration order.
    pub reports: Vec<AppReport>,
}

impl CycleSummary {
    /// Build the summary from reports in configuration order.
    #[must_use]
    pub fn from_reports(reports: Vec<AppReport>) -> Self {
        let mut summary = Self::default();
        for report in &reports {
            let counter = match report.outcome {
                AppOutcome::Converged { .. } => &mut summary.converged,
                AppOutcome::Restarted { .. } => &mut summary.restarted,
                AppOutcome::Indeterminate { .. } => &mut summary.indeterminate,
                AppOutcome::Failed { .. } => &mut summary.failed,
            };
            *counter = counter.saturating_add(1);
        }
        summary.reports = reports;
        summary
    }

    /// Number of applications processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// Whether every application was already converged.
    #[must_use]
    pub fn all_converged(&self) -> bool {
        self.converged == self.total()
    }

    /// Look up the report for an application by `account/image:tag`.
    #[must_use]
    pub fn report(&self, app: &str) -> Option<&AppReport> {
        self.reports.iter().find(|r| r.app == app)
    }
}
