//! Gate evaluation - pure decision logic
//!
//! Every call is a snapshot decision: the same [`EvaluationSnapshot`] and
//! policy always produce the same [`GateDecision`]. No retries, no I/O.
//! Retrying is the poller's job.

use crate::config::GatePolicy;
use crate::error::Result;
use crate::score::{ConfidenceScore, aggregate};
use crate::types::{CheckInput, CheckKind, CheckOutcome, DimensionScore, Gate, GateStatus, HostSignals};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable reason behind a non-passing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "kebab-case")]
pub enum ReasonCode {
    /// A required check reported a failing outcome
    RequiredCheckFailed {
        /// Check name
        name: String,
        /// Reported (or stale-adjusted) outcome
        outcome: CheckOutcome,
        /// Whether the check is critical
        critical: bool,
    },
    /// A required check has no terminal success yet
    RequiredCheckIncomplete {
        /// Check name
        name: String,
        /// Reported outcome
        outcome: CheckOutcome,
    },
    /// PR description is empty
    DescriptionMissing,
    /// No review scores have been submitted
    ConfidenceMissing,
    /// Overall confidence is under the review threshold
    ConfidenceBelowThreshold {
        /// Weighted confidence
        overall: f64,
        /// Configured threshold
        threshold: f64,
    },
    /// A dimension scored under its floor
    DimensionBelowFloor {
        /// Dimension name
        dimension: String,
        /// Reported value
        value: f64,
        /// Configured floor
        floor: f64,
    },
    /// PR has merge conflicts
    MergeConflict,
    /// Hosting provider has not computed mergeability yet
    MergeabilityUnknown,
    /// Approval does not satisfy branch policy
    ApprovalInvalid,
    /// Substantive commits landed after approval
    ApprovalStale,
    /// PR has not been merged yet
    NotMerged,
    /// Main-branch CI failed after merge
    MainBranchFailed {
        /// Reported outcome
        outcome: CheckOutcome,
    },
    /// Main-branch CI has no terminal success yet
    MainBranchIncomplete {
        /// Reported outcome, if any
        outcome: Option<CheckOutcome>,
    },
    /// A regression was detected after merge
    Regression,
    /// Regression detection has not reported yet
    RegressionUnknown,
}

impl ReasonCode {
    /// Whether this reason fails the gate (as opposed to keeping it pending)
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        !matches!(
            self,
            Self::RequiredCheckIncomplete { .. }
                | Self::ConfidenceMissing
                | Self::MergeabilityUnknown
                | Self::NotMerged
                | Self::MainBranchIncomplete { .. }
                | Self::RegressionUnknown
        )
    }

    /// Stable kebab-case code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::RequiredCheckFailed { .. } => "required-check-failed",
            Self::RequiredCheckIncomplete { .. } => "required-check-incomplete",
            Self::DescriptionMissing => "description-missing",
            Self::ConfidenceMissing => "confidence-missing",
            Self::ConfidenceBelowThreshold { .. } => "confidence-below-threshold",
            Self::DimensionBelowFloor { .. } => "dimension-below-floor",
            Self::MergeConflict => "merge-conflict",
            Self::MergeabilityUnknown => "mergeability-unknown",
            Self::ApprovalInvalid => "approval-invalid",
            Self::ApprovalStale => "approval-stale",
            Self::NotMerged => "not-merged",
            Self::MainBranchFailed { .. } => "main-branch-failed",
            Self::MainBranchIncomplete { .. } => "main-branch-incomplete",
            Self::Regression => "regression",
            Self::RegressionUnknown => "regression-unknown",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequiredCheckFailed { name, outcome, .. }
            | Self::RequiredCheckIncomplete { name, outcome } => {
                write!(f, "{}: {name} ({outcome})", self.code())
            }
            Self::ConfidenceBelowThreshold { overall, threshold } => {
                write!(f, "{}: {overall:.2} < {threshold:.2}", self.code())
            }
            Self::DimensionBelowFloor {
                dimension,
                value,
                floor,
            } => write!(f, "{}: {dimension} {value:.2} < {floor:.2}", self.code()),
            Self::MainBranchFailed { outcome } => write!(f, "{}: {outcome}", self.code()),
            _ => f.write_str(self.code()),
        }
    }
}

/// Outcome of a single evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    /// All criteria met
    Pass,
    /// At least one blocking reason
    Fail,
    /// No blocking reason, but not everything has reported
    Pending,
}

/// Inputs a decision was computed from
///
/// Stored alongside each recorded decision so it can be reproduced exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSnapshot {
    /// Gate being evaluated
    pub gate: Gate,
    /// PR head at evaluation time
    pub head_sha: String,
    /// Checks recorded for the gate, sorted by name
    pub checks: Vec<CheckInput>,
    /// Hosting-provider signals
    pub signals: HostSignals,
    /// Review dimension scores, if submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<DimensionScore>>,
}

/// Decision for one gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    /// Gate evaluated
    pub gate: Gate,
    /// Pass / fail / pending
    pub verdict: Verdict,
    /// Ordered reasons (empty on pass)
    pub reasons: Vec<ReasonCode>,
    /// Names of advisory checks that did not succeed
    #[serde(default)]
    pub advisory_failures: Vec<String>,
    /// Confidence computed for the review gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceScore>,
}

impl GateDecision {
    fn from_reasons(gate: Gate, reasons: Vec<ReasonCode>) -> Self {
        let verdict = if reasons.iter().any(ReasonCode::is_blocking) {
            Verdict::Fail
        } else if reasons.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Pending
        };
        Self {
            gate,
            verdict,
            reasons,
            advisory_failures: Vec::new(),
            confidence: None,
        }
    }

    /// Gate status this decision maps to
    #[must_use]
    pub const fn status(&self) -> GateStatus {
        match self.verdict {
            Verdict::Pass => GateStatus::Passed,
            Verdict::Fail => GateStatus::Failed,
            Verdict::Pending => GateStatus::Pending,
        }
    }

    /// Reason codes as strings
    #[must_use]
    pub fn reason_codes(&self) -> Vec<String> {
        self.reasons.iter().map(ToString::to_string).collect()
    }
}

/// Evaluate a gate against a snapshot of its inputs.
///
/// # Errors
/// `Error::Config` if review scores are malformed (see [`aggregate`]).
pub fn evaluate(snapshot: &EvaluationSnapshot, policy: &GatePolicy) -> Result<GateDecision> {
    let mut decision = match snapshot.gate {
        Gate::PreReview => {
            let mut reasons = required_check_reasons(snapshot);
            if !snapshot.signals.description_present {
                reasons.push(ReasonCode::DescriptionMissing);
            }
            GateDecision::from_reasons(snapshot.gate, reasons)
        }
        Gate::Review => {
            let confidence = snapshot
                .scores
                .as_deref()
                .map(|scores| aggregate(scores, policy))
                .transpose()?;
            let reasons = review_reasons(confidence.as_ref(), policy.review_threshold);
            let mut decision = GateDecision::from_reasons(snapshot.gate, reasons);
            decision.confidence = confidence;
            decision
        }
        Gate::PreMerge => {
            let signals = &snapshot.signals;
            let mut reasons = required_check_reasons(snapshot);
            match signals.mergeable {
                Some(false) => reasons.push(ReasonCode::MergeConflict),
                None => reasons.push(ReasonCode::MergeabilityUnknown),
                Some(true) => {}
            }
            if !signals.approval_valid {
                reasons.push(ReasonCode::ApprovalInvalid);
            }
            // Staleness blocks on its own, even with green CI and a valid approval
            if signals.approval_stale {
                reasons.push(ReasonCode::ApprovalStale);
            }
            GateDecision::from_reasons(snapshot.gate, reasons)
        }
        // Post-merge inputs mean nothing until the merge has happened
        Gate::PostMerge if !snapshot.signals.merged => {
            GateDecision::from_reasons(snapshot.gate, vec![ReasonCode::NotMerged])
        }
        Gate::PostMerge => {
            let signals = &snapshot.signals;
            let mut reasons = required_check_reasons(snapshot);
            match signals.main_ci {
                Some(CheckOutcome::Success) => {}
                Some(outcome) if outcome.is_failure() => {
                    reasons.push(ReasonCode::MainBranchFailed { outcome });
                }
                outcome => reasons.push(ReasonCode::MainBranchIncomplete { outcome }),
            }
            match signals.regression_free {
                Some(true) => {}
                Some(false) => reasons.push(ReasonCode::Regression),
                None => reasons.push(ReasonCode::RegressionUnknown),
            }
            GateDecision::from_reasons(snapshot.gate, reasons)
        }
    };

    decision.advisory_failures = snapshot
        .checks
        .iter()
        .filter(|c| c.kind == CheckKind::Advisory)
        .filter(|c| effective_outcome(c, &snapshot.head_sha) != CheckOutcome::Success)
        .map(|c| c.name.clone())
        .collect();

    Ok(decision)
}

/// Outcome after stale detection: a check for an older head counts as stale.
fn effective_outcome(check: &CheckInput, head_sha: &str) -> CheckOutcome {
    if check.head_sha == head_sha {
        check.outcome
    } else {
        CheckOutcome::Stale
    }
}

fn required_check_reasons(snapshot: &EvaluationSnapshot) -> Vec<ReasonCode> {
    snapshot
        .checks
        .iter()
        .filter(|c| c.kind == CheckKind::Required)
        .filter_map(|c| match effective_outcome(c, &snapshot.head_sha) {
            CheckOutcome::Success => None,
            outcome if outcome.is_failure() => Some(ReasonCode::RequiredCheckFailed {
                name: c.name.clone(),
                outcome,
                critical: c.critical,
            }),
            // pending, cancelled, skipped and neutral wait for a re-run
            outcome => Some(ReasonCode::RequiredCheckIncomplete {
                name: c.name.clone(),
                outcome,
            }),
        })
        .collect()
}

fn review_reasons(confidence: Option<&ConfidenceScore>, threshold: f64) -> Vec<ReasonCode> {
    let Some(confidence) = confidence else {
        return vec![ReasonCode::ConfidenceMissing];
    };

    // Floor violations block on their own; a high overall score can't offset them
    let mut reasons: Vec<ReasonCode> = confidence
        .violations
        .iter()
        .map(|v| ReasonCode::DimensionBelowFloor {
            dimension: v.dimension.clone(),
            value: v.value,
            floor: v.floor,
        })
        .collect();

    if confidence.overall < threshold {
        reasons.push(ReasonCode::ConfidenceBelowThreshold {
            overall: confidence.overall,
            threshold,
        });
    }

    reasons
}
