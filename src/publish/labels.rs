//! Label projection - pure mapping from PR record to label set

use crate::store::PullRequestRecord;
use crate::types::{Gate, GateStatus};
use std::collections::BTreeSet;

/// Prefix shared by every label the engine manages
pub const LABEL_PREFIX: &str = "gate:";

/// Sticky label marking that at least one gate was overridden
pub const OVERRIDE_LABEL: &str = "gate:override-applied";

/// Label for a gate/status pair, e.g. `gate:review-passed`
#[must_use]
pub fn gate_label(gate: Gate, status: GateStatus) -> String {
    format!("{LABEL_PREFIX}{gate}-{status}")
}

/// Desired engine-managed labels for a PR.
///
/// One label per gate the PR has reached (labels for the same gate are
/// mutually exclusive), plus the override label once any override exists.
#[must_use]
pub fn labels_for(record: &PullRequestRecord) -> BTreeSet<String> {
    let mut labels: BTreeSet<String> = record
        .statuses
        .iter()
        .map(|(gate, status)| gate_label(*gate, *status))
        .collect();
    if !record.overrides.is_empty() {
        labels.insert(OVERRIDE_LABEL.to_string());
    }
    labels
}

/// Set operations that move `current` labels to `desired`.
///
/// Labels outside the `gate:` namespace are left alone, and the override
/// label is never removed.
#[must_use]
pub fn label_diff(current: &[String], desired: &BTreeSet<String>) -> (Vec<String>, Vec<String>) {
    let current: BTreeSet<&str> = current.iter().map(String::as_str).collect();
    let to_add = desired
        .iter()
        .filter(|l| !current.contains(l.as_str()))
        .cloned()
        .collect();
    let to_remove = current
        .iter()
        .filter(|l| l.starts_with(LABEL_PREFIX) && **l != OVERRIDE_LABEL)
        .filter(|l| !desired.contains(**l))
        .map(|l| (*l).to_string())
        .collect();
    (to_add, to_remove)
}
