//! Escalation state for one (PR, gate) pair

use super::ladder::EscalationLadder;
use crate::types::{Gate, PrId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An escalation level was reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationFired {
    /// PR that is stalled
    pub pr: PrId,
    /// Gate it is stalled at
    pub gate: Gate,
    /// Level just reached
    pub level: u8,
    /// Scheduled fire time
    pub fired_at: DateTime<Utc>,
}

/// Armed escalation timer
///
/// Exists only while its gate is unresolved. Each level fires exactly once
/// per arming: firing advances `level` and moves `next_fire_at` forward, so a
/// second call at the same instant has nothing left to fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationState {
    /// PR the timer belongs to
    pub pr: PrId,
    /// Gate the timer belongs to
    pub gate: Gate,
    /// Current level
    pub level: u8,
    /// When the timer was armed
    pub armed_at: DateTime<Utc>,
    /// Next scheduled fire, `None` once the ladder is exhausted or manual
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_fire_at: Option<DateTime<Utc>>,
}

impl EscalationState {
    /// Arm a timer at the initial level
    #[must_use]
    pub fn arm(pr: PrId, gate: Gate, now: DateTime<Utc>, ladder: &EscalationLadder) -> Self {
        let level = EscalationLadder::INITIAL_LEVEL;
        Self {
            pr,
            gate,
            level,
            armed_at: now,
            next_fire_at: ladder.step(gate, level).and_then(|s| s.fire_at(now)),
        }
    }

    /// Whether a fire is due at `now`
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire_at.is_some_and(|t| now >= t)
    }

    /// Fire every level due at `now`, in order.
    ///
    /// The next fire time is computed from the previous scheduled time, not
    /// from `now`, so a late tick doesn't shift the rest of the ladder.
    pub fn fire_due(&mut self, now: DateTime<Utc>, ladder: &EscalationLadder) -> Vec<EscalationFired> {
        let mut fired = Vec::new();
        while let Some(at) = self.next_fire_at.filter(|t| now >= *t) {
            self.level = self.level.saturating_add(1);
            fired.push(EscalationFired {
                pr: self.pr,
                gate: self.gate,
                level: self.level,
                fired_at: at,
            });
            self.next_fire_at = ladder.step(self.gate, self.level).and_then(|s| s.fire_at(at));
        }
        fired
    }
}
