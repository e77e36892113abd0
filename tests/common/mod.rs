//! Shared test utilities

#![allow(dead_code)]

mod mock_hosting;

pub use mock_hosting::{AddLabelsCall, MockHostingService, MockNotificationChannel, RemoveLabelCall};

use chrono::{DateTime, TimeZone, Utc};
use pr_gates::clock::ManualClock;
use pr_gates::config::GatePolicy;
use pr_gates::platform::HostSnapshot;
use pr_gates::publish::StatusPublisher;
use pr_gates::store::GateStore;
use pr_gates::types::{CheckInput, CheckOutcome, DimensionScore, Gate, HostSignals};
use std::sync::Arc;

/// Fixed start time for every test clock
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

/// Everything a store-level test needs
pub struct Harness {
    pub store: Arc<GateStore>,
    pub clock: Arc<ManualClock>,
    pub hosting: Arc<MockHostingService>,
    pub notifier: Arc<MockNotificationChannel>,
}

/// In-memory store with mock collaborators and a manual clock
pub fn harness() -> Harness {
    harness_with_policy(GatePolicy::default())
}

/// Like [`harness`] with a custom policy
pub fn harness_with_policy(policy: GatePolicy) -> Harness {
    let clock = Arc::new(ManualClock::new(start_time()));
    let hosting = Arc::new(MockHostingService::new());
    let notifier = Arc::new(MockNotificationChannel::new());
    let publisher = Arc::new(StatusPublisher::new(hosting.clone(), notifier.clone()));
    let store = Arc::new(GateStore::new(policy, clock.clone()).with_publisher(publisher));
    Harness {
        store,
        clock,
        hosting,
        notifier,
    }
}

/// Signals of an open PR with a description and nothing else reported
pub fn described() -> HostSignals {
    HostSignals {
        description_present: true,
        ..HostSignals::default()
    }
}

/// Signals of a PR ready to merge
pub fn mergeable() -> HostSignals {
    HostSignals {
        description_present: true,
        mergeable: Some(true),
        approval_valid: true,
        ..HostSignals::default()
    }
}

/// Signals after a clean merge
pub fn merged_clean() -> HostSignals {
    HostSignals {
        merged: true,
        main_ci: Some(CheckOutcome::Success),
        regression_free: Some(true),
        ..mergeable()
    }
}

/// Eight default dimensions, all scored `value`
pub fn uniform_scores(value: f64) -> Vec<DimensionScore> {
    GatePolicy::default()
        .dimensions
        .iter()
        .map(|d| DimensionScore::new(d.name.clone(), d.weight, value))
        .collect()
}

/// Default dimensions with one dimension overridden
pub fn scores_with(dimension: &str, value: f64, others: f64) -> Vec<DimensionScore> {
    uniform_scores(others)
        .into_iter()
        .map(|mut s| {
            if s.dimension == dimension {
                s.value = value;
            }
            s
        })
        .collect()
}

/// Snapshot at `head` with the given signals and passing pre-review checks
pub fn snapshot(head: &str, signals: HostSignals) -> HostSnapshot {
    HostSnapshot {
        head_sha: head.to_string(),
        signals,
        checks: [(
            Gate::PreReview,
            vec![
                CheckInput::required("lint", CheckOutcome::Success, head),
                CheckInput::required("build", CheckOutcome::Success, head),
            ],
        )]
        .into_iter()
        .collect(),
        scores: None,
        closed: false,
    }
}
