//! Pure reconciliation planning
//!
//! Each loop tick snapshots shared state under the lock and hands it to one of
//! these functions; the result says what (if anything) to report.

use std::collections::{BTreeMap, BTreeSet};
use tether_core::ServiceStatus;

/// Consistent view of desired state for one application tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationSnapshot {
    /// Desired release
    pub release: String,
    /// Services that must all run the desired release
    pub service_names: BTreeSet<String>,
    /// Observed statuses of (at least) the desired services
    pub statuses: BTreeMap<String, ServiceStatus>,
}

/// Release to report at application level, if the application has converged
/// on a release that has not been reported yet.
///
/// Convergence requires every desired service to have a status whose
/// `current_release_id` equals the desired release. An empty release is
/// never reported.
#[must_use]
pub fn plan_application_report(
    snapshot: &ApplicationSnapshot,
    reported_release: Option<&str>,
) -> Option<String> {
    if snapshot.release.is_empty() || reported_release == Some(snapshot.release.as_str()) {
        return None;
    }

    let converged = snapshot.service_names.iter().all(|name| {
        snapshot
            .statuses
            .get(name)
            .is_some_and(|status| status.current_release_id == snapshot.release)
    });

    converged.then(|| snapshot.release.clone())
}

/// Statuses that differ from what was last reported, ordered by service name.
///
/// Services never reported count as different.
#[must_use]
pub fn diff_service_statuses(
    current: &BTreeMap<String, ServiceStatus>,
    reported: &BTreeMap<String, ServiceStatus>,
) -> Vec<(String, ServiceStatus)> {
    current
        .iter()
        .filter(|&(name, status)| reported.get(name) != Some(status))
        .map(|(name, status)| (name.clone(), status.clone()))
        .collect()
}
