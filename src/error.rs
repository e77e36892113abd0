//! Error types for pr-gates

use crate::types::{Gate, PrId};
use thiserror::Error;

/// Errors surfaced by the gate engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed weights, thresholds or policy tables (fatal at load)
    #[error("configuration error: {0}")]
    Config(String),

    /// Input names a head commit that is no longer the PR's head
    #[error("stale input for PR {pr}: expected head {expected}, got {got}")]
    StaleInput {
        /// PR the input was submitted for
        pr: PrId,
        /// Current head SHA on record
        expected: String,
        /// Head SHA carried by the input
        got: String,
    },

    /// Override requested against a condition no authority can waive
    #[error("override not permitted at {gate} gate: {condition}")]
    NonOverridable {
        /// Gate the override targeted
        gate: Gate,
        /// Machine-readable condition code
        condition: String,
    },

    /// Requester's authority level is below the matrix minimum
    #[error("insufficient authority: level {required} required, {provided} provided")]
    InsufficientAuthority {
        /// Minimum level from the authority matrix
        required: u8,
        /// Level carried by the request
        provided: u8,
    },

    /// Hosting API or notification channel could not be reached
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// No record exists for this PR
    #[error("unknown pull request: {0}")]
    UnknownPullRequest(PrId),

    /// Operation is not valid from the PR's current gate/status
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Malformed request (empty requester, missing justification)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Reading or writing persisted state failed
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Whether the caller should resubmit after refreshing its inputs.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StaleInput { .. } | Self::CollaboratorUnavailable(_)
        )
    }
}

/// Result type alias for pr-gates
pub type Result<T> = std::result::Result<T, Error>;
