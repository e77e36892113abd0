//! Override authorization
//!
//! Validates override requests against the non-overridable condition list
//! and the authority matrix. A granted override produces an immutable
//! [`OverrideRecord`] that stays in the PR's audit history for good.

use crate::config::{GatePolicy, SECURITY_DIMENSION};
use crate::error::{Error, Result};
use crate::evaluate::{GateDecision, ReasonCode};
use crate::types::{Gate, HostSignals, PrId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authority level of an override requester (1 = lowest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorityLevel(pub u8);

impl fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Class of violation, the column key of the authority matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationClass {
    /// A required check failed
    CheckFailure,
    /// A required check never finished
    ChecksIncomplete,
    /// PR description is empty
    MissingDescription,
    /// No review scores submitted
    ScoresMissing,
    /// Confidence under the review threshold
    ConfidenceBelowThreshold,
    /// A non-security dimension under its floor
    DimensionFloor,
    /// Merge conflicts
    MergeConflict,
    /// Mergeability not computed yet
    MergeabilityUnknown,
    /// Approval does not satisfy branch policy
    ApprovalInvalid,
    /// Commits landed after approval
    ApprovalStale,
    /// PR not merged yet
    NotMerged,
    /// Main-branch CI failing or incomplete after merge
    MainBranchFailure,
    /// Regression detected or not yet assessed
    Regression,
}

impl ViolationClass {
    /// Class of a decision reason
    #[must_use]
    pub const fn of(reason: &ReasonCode) -> Self {
        match reason {
            ReasonCode::RequiredCheckFailed { .. } => Self::CheckFailure,
            ReasonCode::RequiredCheckIncomplete { .. } => Self::ChecksIncomplete,
            ReasonCode::DescriptionMissing => Self::MissingDescription,
            ReasonCode::ConfidenceMissing => Self::ScoresMissing,
            ReasonCode::ConfidenceBelowThreshold { .. } => Self::ConfidenceBelowThreshold,
            ReasonCode::DimensionBelowFloor { .. } => Self::DimensionFloor,
            ReasonCode::MergeConflict => Self::MergeConflict,
            ReasonCode::MergeabilityUnknown => Self::MergeabilityUnknown,
            ReasonCode::ApprovalInvalid => Self::ApprovalInvalid,
            ReasonCode::ApprovalStale => Self::ApprovalStale,
            ReasonCode::NotMerged => Self::NotMerged,
            ReasonCode::MainBranchFailed { .. } | ReasonCode::MainBranchIncomplete { .. } => {
                Self::MainBranchFailure
            }
            ReasonCode::Regression | ReasonCode::RegressionUnknown => Self::Regression,
        }
    }
}

impl fmt::Display for ViolationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CheckFailure => "check-failure",
            Self::ChecksIncomplete => "checks-incomplete",
            Self::MissingDescription => "missing-description",
            Self::ScoresMissing => "scores-missing",
            Self::ConfidenceBelowThreshold => "confidence-below-threshold",
            Self::DimensionFloor => "dimension-floor",
            Self::MergeConflict => "merge-conflict",
            Self::MergeabilityUnknown => "mergeability-unknown",
            Self::ApprovalInvalid => "approval-invalid",
            Self::ApprovalStale => "approval-stale",
            Self::NotMerged => "not-merged",
            Self::MainBranchFailure => "main-branch-failure",
            Self::Regression => "regression",
        };
        f.write_str(s)
    }
}

/// A request to resolve a gate despite its criteria
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRequest {
    /// Target PR
    pub pr: PrId,
    /// Gate to override (must be the PR's current gate)
    pub gate: Gate,
    /// Who is asking
    pub requester: String,
    /// Requester's authority level
    pub authority_level: AuthorityLevel,
    /// Why the override is warranted
    pub justification: String,
}

/// Permanent audit record of a granted override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRecord {
    /// PR the override applies to
    pub pr: PrId,
    /// Gate resolved by the override
    pub gate: Gate,
    /// Who asked
    pub requester: String,
    /// Authority level used
    pub authority_level: AuthorityLevel,
    /// Stated justification
    pub justification: String,
    /// When the override was granted
    pub approved_at: DateTime<Utc>,
    /// Violation classes waived
    pub waived: Vec<ViolationClass>,
}

/// Condition no authority level can waive, if any applies.
fn non_overridable_condition(decision: &GateDecision, signals: &HostSignals) -> Option<String> {
    if signals.data_loss_risk {
        return Some("data-loss-risk".to_string());
    }
    decision.reasons.iter().find_map(|reason| match reason {
        ReasonCode::DimensionBelowFloor { dimension, .. } if dimension == SECURITY_DIMENSION => {
            Some("security-floor-violation".to_string())
        }
        ReasonCode::RequiredCheckFailed {
            name,
            critical: true,
            ..
        } => Some(format!("critical-check-failed: {name}")),
        _ => None,
    })
}

/// Authorize an override against the PR's latest decision.
///
/// Non-overridable conditions are checked first and reject the request no
/// matter the authority level. Otherwise the required level is the highest
/// matrix entry across the violation classes being waived.
///
/// # Errors
/// - `Error::InvalidRequest` for an empty requester/justification or a gate mismatch
/// - `Error::NonOverridable` for security floor, data-loss or critical-check conditions
/// - `Error::InsufficientAuthority` if the requester's level is too low
pub fn authorize(
    request: &OverrideRequest,
    decision: &GateDecision,
    signals: &HostSignals,
    policy: &GatePolicy,
    now: DateTime<Utc>,
) -> Result<OverrideRecord> {
    if request.requester.trim().is_empty() {
        return Err(Error::InvalidRequest("requester is required".to_string()));
    }
    if request.justification.trim().is_empty() {
        return Err(Error::InvalidRequest("justification is required".to_string()));
    }
    if request.gate != decision.gate {
        return Err(Error::InvalidRequest(format!(
            "override targets {} but the latest decision is for {}",
            request.gate, decision.gate
        )));
    }

    if let Some(condition) = non_overridable_condition(decision, signals) {
        return Err(Error::NonOverridable {
            gate: request.gate,
            condition,
        });
    }

    let mut waived: Vec<ViolationClass> = decision.reasons.iter().map(ViolationClass::of).collect();
    waived.sort();
    waived.dedup();

    let required = waived
        .iter()
        .map(|class| policy.required_authority(request.gate, *class))
        .max()
        .unwrap_or(policy.default_authority_level);

    if request.authority_level < required {
        return Err(Error::InsufficientAuthority {
            required: required.0,
            provided: request.authority_level.0,
        });
    }

    Ok(OverrideRecord {
        pr: request.pr,
        gate: request.gate,
        requester: request.requester.clone(),
        authority_level: request.authority_level,
        justification: request.justification.clone(),
        approved_at: now,
        waived,
    })
}
