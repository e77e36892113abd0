//! Core types for pr-gates

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pull request identifier (the hosting provider's PR number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrId(pub u64);

impl fmt::Display for PrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One of the four sequential checkpoints
///
/// Ordering follows the pipeline: `PreReview < Review < PreMerge < PostMerge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gate {
    /// Automated checks and description before human review
    PreReview,
    /// Weighted review-dimension scoring
    Review,
    /// CI, conflicts and approval validity right before merge
    PreMerge,
    /// Main-branch CI and regression watch after merge
    PostMerge,
}

impl Gate {
    /// All gates in pipeline order
    pub const ALL: [Self; 4] = [Self::PreReview, Self::Review, Self::PreMerge, Self::PostMerge];

    /// The gate that follows this one, or `None` after `PostMerge`
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::PreReview => Some(Self::Review),
            Self::Review => Some(Self::PreMerge),
            Self::PreMerge => Some(Self::PostMerge),
            Self::PostMerge => None,
        }
    }

    /// Kebab-case name used in labels and config files
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreReview => "pre-review",
            Self::Review => "review",
            Self::PreMerge => "pre-merge",
            Self::PostMerge => "post-merge",
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a PR at its current gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateStatus {
    /// No terminal decision yet
    Pending,
    /// Criteria met
    Passed,
    /// Criteria not met; gate does not advance
    Failed,
    /// Resolved by an authorized override
    Overridden,
}

impl GateStatus {
    /// Whether the gate is resolved and the PR may advance
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Passed | Self::Overridden)
    }

    /// Kebab-case name used in labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Overridden => "overridden",
        }
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a check blocks its gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Must succeed for the gate to pass
    Required,
    /// Recorded as metadata only
    Advisory,
}

/// Outcome reported for a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// Check succeeded
    Success,
    /// Check failed
    Failure,
    /// Check has not finished
    Pending,
    /// Check run was cancelled
    Cancelled,
    /// Check run exceeded its time limit
    TimedOut,
    /// Check was skipped
    Skipped,
    /// Result belongs to an older head commit
    Stale,
    /// Check finished without a verdict
    Neutral,
    /// Check needs a human action to continue
    ActionRequired,
}

impl CheckOutcome {
    /// Outcomes that fail a gate outright when reported by a required check
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Failure | Self::TimedOut | Self::Stale | Self::ActionRequired
        )
    }

    /// Snake-case name used in reason codes
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Pending => "pending",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::Skipped => "skipped",
            Self::Stale => "stale",
            Self::Neutral => "neutral",
            Self::ActionRequired => "action_required",
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named result contributed by an external analyzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInput {
    /// Check name; a later submission with the same name supersedes this one
    pub name: String,
    /// Required or advisory
    pub kind: CheckKind,
    /// Reported outcome
    pub outcome: CheckOutcome,
    /// Head commit the check ran against
    pub head_sha: String,
    /// Failure of a critical check cannot be overridden
    #[serde(default)]
    pub critical: bool,
}

impl CheckInput {
    /// Create a required check result
    pub fn required(name: impl Into<String>, outcome: CheckOutcome, head_sha: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CheckKind::Required,
            outcome,
            head_sha: head_sha.into(),
            critical: false,
        }
    }

    /// Create an advisory check result
    pub fn advisory(name: impl Into<String>, outcome: CheckOutcome, head_sha: impl Into<String>) -> Self {
        Self {
            kind: CheckKind::Advisory,
            ..Self::required(name, outcome, head_sha)
        }
    }

    /// Mark this check as critical
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// A single review-dimension score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// Dimension name (e.g. "security")
    pub dimension: String,
    /// Weight in [0, 1]; all weights of one submission sum to 1.0
    pub weight: f64,
    /// Score in [0, 100]
    pub value: f64,
}

impl DimensionScore {
    /// Create a dimension score
    pub fn new(dimension: impl Into<String>, weight: f64, value: f64) -> Self {
        Self {
            dimension: dimension.into(),
            weight,
            value,
        }
    }
}

/// Boolean signals delegated to the hosting provider
///
/// `None` means the provider has not computed the value yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct HostSignals {
    /// PR has a non-empty description
    pub description_present: bool,
    /// No merge conflicts (`Some(false)` = conflicts)
    pub mergeable: Option<bool>,
    /// Approval state satisfies branch policy
    pub approval_valid: bool,
    /// Substantive commits landed after the approval
    pub approval_stale: bool,
    /// An analyzer flagged a data-loss risk
    pub data_loss_risk: bool,
    /// PR has been merged into the main branch
    #[serde(default)]
    pub merged: bool,
    /// Main-branch CI after merge
    pub main_ci: Option<CheckOutcome>,
    /// No regression detected after merge
    pub regression_free: Option<bool>,
}

/// Why a PR record was archived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveReason {
    /// PR was closed without merging
    Closed,
    /// PR passed every gate
    Completed,
}

impl fmt::Display for ArchiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}
