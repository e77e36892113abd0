//! External collaborators
//!
//! The engine never talks to a hosting provider or a chat system directly.
//! It goes through these traits, so the same gate logic works against any
//! provider (and against in-memory mocks in tests).

use crate::error::Result;
use crate::publish::GateEvent;
use crate::types::{CheckInput, DimensionScore, Gate, HostSignals, PrId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the hosting provider and analyzers report for one PR
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    /// Current head commit
    pub head_sha: String,
    /// Mergeability, approval and description signals
    pub signals: HostSignals,
    /// Check results grouped by the gate they feed
    #[serde(default)]
    pub checks: BTreeMap<Gate, Vec<CheckInput>>,
    /// Review dimension scores, once an analyzer has produced them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<DimensionScore>>,
    /// PR was closed without being merged
    #[serde(default)]
    pub closed: bool,
}

/// Hosting provider operations the engine depends on
///
/// Implementations map provider failures to
/// [`Error::CollaboratorUnavailable`](crate::error::Error::CollaboratorUnavailable)
/// so the engine can defer rather than fail a gate.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// List open PRs that should be tracked
    async fn list_open_prs(&self) -> Result<Vec<PrId>>;

    /// Fetch the current head, signals, checks and scores for a PR
    async fn fetch_snapshot(&self, pr: PrId) -> Result<HostSnapshot>;

    /// List labels currently set on a PR
    async fn list_labels(&self, pr: PrId) -> Result<Vec<String>>;

    /// Add labels to a PR (adding an existing label is a no-op)
    async fn add_labels(&self, pr: PrId, labels: &[String]) -> Result<()>;

    /// Remove a label from a PR (removing a missing label is a no-op)
    async fn remove_label(&self, pr: PrId, label: &str) -> Result<()>;
}

/// Best-effort delivery of gate events to humans
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver one event
    async fn notify(&self, pr: PrId, event: &GateEvent) -> Result<()>;
}
