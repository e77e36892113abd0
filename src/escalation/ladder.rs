//! Escalation ladder table
//!
//! Data-driven table indexed by (gate, level). Step `n` of a gate's ladder
//! governs the move from level `n` to level `n + 1`.

use crate::error::{Error, Result};
use crate::types::Gate;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

/// One rung transition of the ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum LadderStep {
    /// Fire this many seconds after the previous level was reached
    After {
        /// Delay in seconds
        secs: u64,
    },
    /// Fire as soon as the previous level is reached
    Immediate,
    /// Never fires automatically; the timer rests at its current level
    Manual,
}

impl LadderStep {
    const fn after(secs: u64) -> Self {
        Self::After { secs }
    }

    /// When this step fires, given the time the previous level was reached
    #[must_use]
    pub fn fire_at(&self, reached_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::After { secs } => {
                let delay = Duration::try_seconds(i64::try_from(*secs).ok()?)?;
                reached_at.checked_add_signed(delay)
            }
            Self::Immediate => Some(reached_at),
            Self::Manual => None,
        }
    }
}

/// Per-gate escalation ladders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EscalationLadder {
    /// Pre-review ladder
    pub pre_review: Vec<LadderStep>,
    /// Review ladder
    pub review: Vec<LadderStep>,
    /// Pre-merge ladder
    pub pre_merge: Vec<LadderStep>,
    /// Post-merge ladder
    pub post_merge: Vec<LadderStep>,
}

impl Default for EscalationLadder {
    fn default() -> Self {
        Self {
            pre_review: vec![
                LadderStep::after(DAY),
                LadderStep::after(2 * DAY),
                LadderStep::after(WEEK),
            ],
            review: vec![
                LadderStep::after(2 * DAY),
                LadderStep::after(WEEK),
                LadderStep::after(2 * WEEK),
            ],
            pre_merge: vec![LadderStep::after(DAY), LadderStep::Manual],
            post_merge: vec![
                LadderStep::after(30 * MINUTE),
                LadderStep::Immediate,
                LadderStep::after(DAY),
            ],
        }
    }
}

impl EscalationLadder {
    /// Level a timer starts at when armed
    pub const INITIAL_LEVEL: u8 = 1;

    /// Steps configured for a gate
    #[must_use]
    pub fn steps(&self, gate: Gate) -> &[LadderStep] {
        match gate {
            Gate::PreReview => &self.pre_review,
            Gate::Review => &self.review,
            Gate::PreMerge => &self.pre_merge,
            Gate::PostMerge => &self.post_merge,
        }
    }

    /// Step that moves a timer off `level`, or `None` once the ladder is exhausted
    #[must_use]
    pub fn step(&self, gate: Gate, level: u8) -> Option<&LadderStep> {
        let index = usize::from(level.checked_sub(Self::INITIAL_LEVEL)?);
        self.steps(gate).get(index)
    }

    /// Highest level reachable at a gate
    #[must_use]
    pub fn top_level(&self, gate: Gate) -> u8 {
        let steps = u8::try_from(self.steps(gate).len()).unwrap_or(u8::MAX - 1);
        Self::INITIAL_LEVEL.saturating_add(steps)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for gate in Gate::ALL {
            if self.steps(gate).len() >= usize::from(u8::MAX) {
                return Err(Error::Config(format!(
                    "escalation ladder for {gate} is too long"
                )));
            }
            let out_of_range = self.steps(gate).iter().any(|s| match s {
                LadderStep::After { secs } => i64::try_from(*secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .is_none(),
                LadderStep::Immediate | LadderStep::Manual => false,
            });
            if out_of_range {
                return Err(Error::Config(format!(
                    "escalation delay for {gate} is out of range"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_table() {
        let ladder = EscalationLadder::default();
        assert_eq!(ladder.step(Gate::PreReview, 1), Some(&LadderStep::After { secs: DAY }));
        assert_eq!(ladder.step(Gate::Review, 3), Some(&LadderStep::After { secs: 2 * WEEK }));
        assert_eq!(ladder.step(Gate::PreMerge, 2), Some(&LadderStep::Manual));
        assert_eq!(ladder.step(Gate::PostMerge, 2), Some(&LadderStep::Immediate));
        assert_eq!(ladder.step(Gate::PreReview, 4), None);
        assert_eq!(ladder.step(Gate::PreReview, 0), None);
        assert_eq!(ladder.top_level(Gate::Review), 4);
        assert_eq!(ladder.top_level(Gate::PreMerge), 3);
    }

    #[test]
    fn test_fire_at() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(LadderStep::after(HOUR).fire_at(t), Some(t + Duration::hours(1)));
        assert_eq!(LadderStep::Immediate.fire_at(t), Some(t));
        assert_eq!(LadderStep::Manual.fire_at(t), None);
    }
}
