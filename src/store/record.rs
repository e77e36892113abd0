//! Per-PR gate record

use crate::authorize::OverrideRecord;
use crate::escalation::EscalationState;
use crate::evaluate::{EvaluationSnapshot, GateDecision};
use crate::types::{ArchiveReason, CheckInput, DimensionScore, Gate, GateStatus, HostSignals, PrId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What caused a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionKind {
    /// PR entered a gate
    Entered,
    /// An evaluation produced a new status or new reasons
    Evaluated,
    /// An override resolved the gate
    Overridden,
    /// The record was archived
    Archived,
}

/// One entry of a PR's gate history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// When it happened
    pub at: DateTime<Utc>,
    /// Gate concerned
    pub gate: Gate,
    /// What caused it
    pub kind: TransitionKind,
    /// Status before, `None` on entry
    pub from: Option<GateStatus>,
    /// Status after
    pub to: GateStatus,
    /// Decision behind an evaluation or override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<GateDecision>,
    /// Inputs the decision was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<EvaluationSnapshot>,
}

/// Authoritative gate record for one PR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    /// PR identifier
    pub id: PrId,
    /// Current head commit
    pub head_sha: String,
    /// Gate the PR currently occupies
    pub gate: Gate,
    /// One current status per gate reached
    pub statuses: BTreeMap<Gate, GateStatus>,
    /// First observation
    pub created_at: DateTime<Utc>,
    /// Last status change or gate entry
    pub last_transition_at: DateTime<Utc>,
    /// Set once the PR is closed or has passed every gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<ArchiveReason>,
    /// Latest check per name, grouped by gate
    #[serde(default)]
    pub checks: BTreeMap<Gate, BTreeMap<String, CheckInput>>,
    /// Latest review scores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<DimensionScore>>,
    /// Latest hosting-provider signals
    #[serde(default)]
    pub signals: HostSignals,
    /// Armed escalation timer for the current gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationState>,
    /// Most recent decision at the current gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_decision: Option<GateDecision>,
    /// Ordered transition history
    #[serde(default)]
    pub history: Vec<Transition>,
    /// Append-only override log
    #[serde(default)]
    pub overrides: Vec<OverrideRecord>,
}

impl PullRequestRecord {
    /// New record at the first gate, pending
    pub fn new(id: PrId, head_sha: impl Into<String>, now: DateTime<Utc>) -> Self {
        let gate = Gate::PreReview;
        Self {
            id,
            head_sha: head_sha.into(),
            gate,
            statuses: BTreeMap::from([(gate, GateStatus::Pending)]),
            created_at: now,
            last_transition_at: now,
            archived: None,
            checks: BTreeMap::new(),
            scores: None,
            signals: HostSignals::default(),
            escalation: None,
            last_decision: None,
            history: vec![Transition {
                at: now,
                gate,
                kind: TransitionKind::Entered,
                from: None,
                to: GateStatus::Pending,
                decision: None,
                snapshot: None,
            }],
            overrides: Vec::new(),
        }
    }

    /// Status at the current gate
    #[must_use]
    pub fn status(&self) -> GateStatus {
        self.statuses
            .get(&self.gate)
            .copied()
            .unwrap_or(GateStatus::Pending)
    }

    /// Whether the record no longer accepts input
    #[must_use]
    pub const fn is_archived(&self) -> bool {
        self.archived.is_some()
    }

    /// Inputs for evaluating the current gate
    #[must_use]
    pub fn snapshot(&self) -> EvaluationSnapshot {
        EvaluationSnapshot {
            gate: self.gate,
            head_sha: self.head_sha.clone(),
            checks: self
                .checks
                .get(&self.gate)
                .map(|by_name| by_name.values().cloned().collect())
                .unwrap_or_default(),
            signals: self.signals.clone(),
            scores: (self.gate == Gate::Review)
                .then(|| self.scores.clone())
                .flatten(),
        }
    }

    /// Record a new status at the current gate.
    ///
    /// Replaces the gate's previous status; the old one survives only in history.
    pub fn set_status(
        &mut self,
        kind: TransitionKind,
        to: GateStatus,
        decision: Option<GateDecision>,
        snapshot: Option<EvaluationSnapshot>,
        now: DateTime<Utc>,
    ) {
        let from = self.statuses.insert(self.gate, to);
        if from != Some(to) {
            self.last_transition_at = now;
        }
        self.history.push(Transition {
            at: now,
            gate: self.gate,
            kind,
            from,
            to,
            decision,
            snapshot,
        });
    }

    /// Move to `gate`, pending. Callers guarantee `gate` follows the current one.
    pub fn enter_gate(&mut self, gate: Gate, now: DateTime<Utc>) {
        debug_assert!(gate > self.gate);
        self.gate = gate;
        self.last_decision = None;
        self.escalation = None;
        self.statuses.insert(gate, GateStatus::Pending);
        self.last_transition_at = now;
        self.history.push(Transition {
            at: now,
            gate,
            kind: TransitionKind::Entered,
            from: None,
            to: GateStatus::Pending,
            decision: None,
            snapshot: None,
        });
    }

    /// Archive the record and drop any timer
    pub fn archive(&mut self, reason: ArchiveReason, now: DateTime<Utc>) {
        self.archived = Some(reason);
        self.escalation = None;
        self.history.push(Transition {
            at: now,
            gate: self.gate,
            kind: TransitionKind::Archived,
            from: Some(self.status()),
            to: self.status(),
            decision: None,
            snapshot: None,
        });
    }
}
