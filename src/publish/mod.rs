//! Status publishing - effectful side of gate transitions
//!
//! The store computes events and the desired label set under the PR's lock,
//! releases the lock, and only then hands both to [`StatusPublisher`]. Label
//! sync and notification failures are logged and dropped: they never block
//! or roll back a gate transition.

mod labels;

pub use labels::{LABEL_PREFIX, OVERRIDE_LABEL, gate_label, label_diff, labels_for};

use crate::escalation::EscalationFired;
use crate::platform::{HostingApi, NotificationChannel};
use crate::types::{ArchiveReason, Gate, GateStatus, PrId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Event emitted by the engine for external consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum GateEvent {
    /// A gate changed status, or was entered (`from: None`)
    GateTransitioned {
        /// PR
        pr: PrId,
        /// Gate
        gate: Gate,
        /// Previous status, `None` when the gate was just entered
        from: Option<GateStatus>,
        /// New status
        to: GateStatus,
        /// Reason codes behind the new status
        reasons: Vec<String>,
    },
    /// A stalled gate reached a new escalation level
    EscalationFired(EscalationFired),
    /// An override was granted
    OverrideApplied {
        /// PR
        pr: PrId,
        /// Gate overridden
        gate: Gate,
        /// Who requested it
        requester: String,
    },
    /// The PR record was archived
    Archived {
        /// PR
        pr: PrId,
        /// Why
        reason: ArchiveReason,
    },
}

impl fmt::Display for GateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GateTransitioned {
                pr, gate, from, to, ..
            } => match from {
                Some(from) => write!(f, "PR {pr}: {gate} {from} -> {to}"),
                None => write!(f, "PR {pr}: entered {gate} ({to})"),
            },
            Self::EscalationFired(fired) => write!(
                f,
                "PR {}: {} escalated to level {}",
                fired.pr, fired.gate, fired.level
            ),
            Self::OverrideApplied {
                pr,
                gate,
                requester,
            } => write!(f, "PR {pr}: {gate} overridden by {requester}"),
            Self::Archived { pr, reason } => write!(f, "PR {pr}: archived ({reason})"),
        }
    }
}

/// Translates engine events into label operations and notifications
pub struct StatusPublisher {
    hosting: Arc<dyn HostingApi>,
    notifier: Arc<dyn NotificationChannel>,
}

impl StatusPublisher {
    /// Create a publisher over the given collaborators
    pub fn new(hosting: Arc<dyn HostingApi>, notifier: Arc<dyn NotificationChannel>) -> Self {
        Self { hosting, notifier }
    }

    /// Sync labels to `desired` and deliver `events`.
    ///
    /// Best-effort: every failure is logged and skipped.
    pub async fn publish(&self, pr: PrId, desired: &BTreeSet<String>, events: &[GateEvent]) {
        self.sync_labels(pr, desired).await;

        for event in events {
            match self.notifier.notify(pr, event).await {
                Ok(()) => debug!(pr = %pr, %event, "Notification delivered"),
                Err(e) => warn!(pr = %pr, %event, error = %e, "Notification delivery failed"),
            }
        }
    }

    async fn sync_labels(&self, pr: PrId, desired: &BTreeSet<String>) {
        let current = match self.hosting.list_labels(pr).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!(pr = %pr, error = %e, "Could not read labels, skipping label sync");
                return;
            }
        };

        let (to_add, to_remove) = label_diff(&current, desired);

        if !to_add.is_empty() {
            if let Err(e) = self.hosting.add_labels(pr, &to_add).await {
                warn!(pr = %pr, labels = ?to_add, error = %e, "Failed to add labels");
            }
        }
        for label in &to_remove {
            if let Err(e) = self.hosting.remove_label(pr, label).await {
                warn!(pr = %pr, %label, error = %e, "Failed to remove label");
            }
        }
    }
}
