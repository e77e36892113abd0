//! pr-gates - gate orchestration engine for pull requests
//!
//! Every PR moves through four ordered quality gates: pre-review, review,
//! pre-merge and post-merge. The engine evaluates each gate from check
//! results, review confidence scores and hosting-provider signals, escalates
//! gates that stall, authorizes audited overrides, and publishes gate status
//! as labels and notifications.
//!
//! The pure decision logic ([`score`], [`evaluate`], [`authorize`],
//! [`escalation::ladder`]) is separate from the stateful service
//! ([`store::GateStore`]) and the effectful edges ([`publish`], [`poll`],
//! [`escalation::scheduler`]).

pub mod authorize;
pub mod clock;
pub mod config;
pub mod error;
pub mod escalation;
pub mod evaluate;
pub mod platform;
pub mod poll;
pub mod publish;
pub mod score;
pub mod storage;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use store::GateStore;
