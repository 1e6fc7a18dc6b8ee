//! Drift evaluation.

use driftwatch_core::Digest;

use crate::types::{DriftVerdict, IndeterminateReason, ObservedDigests};

/// Compare the registry digest with the digests running in the cluster.
///
/// - `Converged` iff at least one digest was observed and all equal `resolved`
/// - `Drifted` iff at least one observed digest differs
/// - `Indeterminate` iff nothing usable was observed
///
/// Dropped (unparsable) observations do not count either way as long as at
/// least one valid digest remains.
#[must_use]
pub fn evaluate(resolved: &Digest, observed: &ObservedDigests) -> DriftVerdict {
    if observed.digests.is_empty() {
        return DriftVerdict::Indeterminate(indeterminate_reason(observed));
    }
    if observed.digests.iter().all(|digest| digest == resolved) {
        DriftVerdict::Converged
    } else {
        DriftVerdict::Drifted
    }
}

fn indeterminate_reason(observed: &ObservedDigests) -> IndeterminateReason {
    if observed.dropped > 0 {
        IndeterminateReason::AllUnparsable {
            dropped: observed.dropped,
        }
    } else if observed.pods > 0 {
        IndeterminateReason::NoRunningContainers
    } else {
        IndeterminateReason::NoPods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = driftwatch_core::Result<()>;

    /// One single-container pod per digest.
    fn observed(digests: &[&str]) -> ObservedDigests {
        let mut observation = ObservedDigests::new();
        for digest in digests {
            observation.record_pod();
            observation.record_image_id(&format!("ghcr.io/acme/api@{digest}"));
        }
        observation
    }

    #[test]
    fn test_all_equal_is_converged() -> TestResult {
        let resolved = Digest::new("sha256:AAA")?;
        assert_eq!(evaluate(&resolved, &observed(&["sha256:AAA"])), DriftVerdict::Converged);
        Ok(())
    }

    #[test]
    fn test_single_difference_is_drifted() -> TestResult {
        let resolved = Digest::new("sha256:AAA")?;
        assert_eq!(evaluate(&resolved, &observed(&["sha256:BBB"])), DriftVerdict::Drifted);
        Ok(())
    }

    #[test]
    fn test_mid_rollout_is_drifted() -> TestResult {
        let resolved = Digest::new("sha256:AAA")?;
        let verdict = evaluate(&resolved, &observed(&["sha256:AAA", "sha256:BBB"]));
        assert_eq!(verdict, DriftVerdict::Drifted);
        Ok(())
    }

    #[test]
    fn test_no_pods_is_indeterminate() -> TestResult {
        let resolved = Digest::new("sha256:AAA")?;
        assert_eq!(
            evaluate(&resolved, &ObservedDigests::new()),
            DriftVerdict::Indeterminate(IndeterminateReason::NoPods)
        );
        Ok(())
    }

    #[test]
    fn test_only_unparsable_is_indeterminate() -> TestResult {
        let resolved = Digest::new("sha256:AAA")?;
        let mut observation = ObservedDigests::new();
        observation.record_pod();
        observation.record_image_id("ghcr.io/acme/api:prod");

        assert_eq!(
            evaluate(&resolved, &observation),
            DriftVerdict::Indeterminate(IndeterminateReason::AllUnparsable { dropped: 1 })
        );
        Ok(())
    }

    #[test]
    fn test_pods_without_statuses_is_indeterminate() -> TestResult {
        let resolved = Digest::new("sha256:AAA")?;
        let mut observation = ObservedDigests::new();
        observation.record_pod();

        assert_eq!(
            evaluate(&resolved, &observation),
            DriftVerdict::Indeterminate(IndeterminateReason::NoRunningContainers)
        );
        Ok(())
    }

    #[test]
    fn test_partial_data_uses_valid_observations() -> TestResult {
        let resolved = Digest::new("sha256:AAA")?;
        let mut observation = ObservedDigests::new();
        observation.record_pod();
        observation.record_image_id("ghcr.io/acme/api@sha256:AAA");
        observation.record_image_id("sidecar:latest");

        assert_eq!(evaluate(&resolved, &observation), DriftVerdict::Converged);
        Ok(())
    }

    #[test]
    fn test_evaluate_is_deterministic() -> TestResult {
        let resolved = Digest::new("sha256:AAA")?;
        let observation = observed(&["sha256:BBB", "sha256:AAA"]);
        assert_eq!(evaluate(&resolved, &observation), evaluate(&resolved, &observation));
        Ok(())
    }
}
