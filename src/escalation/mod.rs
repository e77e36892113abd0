//! Escalation timer service
//!
//! A stalled gate climbs a per-gate ladder of escalation levels:
//! - [`ladder`]: the data table of step delays, indexed by (gate, level)
//! - [`timer`]: armed timer state for one (PR, gate) pair
//! - [`scheduler`]: background task that fires due timers
//!
//! Timers live inside each PR's record and are only touched under that PR's
//! lock, so firing never races an evaluation.

pub mod ladder;
pub mod scheduler;
pub mod timer;

pub use ladder::{EscalationLadder, LadderStep};
pub use scheduler::EscalationScheduler;
pub use timer::{EscalationFired, EscalationState};
