//! Gate state store
//!
//! The single owner of mutable gate state. Every operation follows the same
//! shape:
//! 1. Lock the PR's record (the lock granularity is one PR)
//! 2. Mutate a working copy: record inputs, evaluate, transition, arm or
//!    cancel the escalation timer
//! 3. Persist the working copy and commit it, still under the lock
//! 4. Release the lock, then hand events and labels to the publisher
//!
//! Timer cancellation happens in step 2 of the resolving operation, so an
//! escalation fire can never land after the gate it belongs to resolved.

mod record;

pub use record::{PullRequestRecord, Transition, TransitionKind};

use crate::authorize::{OverrideRecord, OverrideRequest, authorize};
use crate::clock::Clock;
use crate::config::GatePolicy;
use crate::error::{Error, Result};
use crate::escalation::{EscalationFired, EscalationState};
use crate::evaluate::evaluate;
use crate::platform::HostSnapshot;
use crate::publish::{GateEvent, StatusPublisher, labels_for};
use crate::storage::StateDir;
use crate::types::{ArchiveReason, CheckInput, DimensionScore, Gate, GateStatus, HostSignals, PrId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

type Entry = Arc<Mutex<PullRequestRecord>>;

/// Side effects computed under a PR's lock, dispatched after release
struct Effects {
    pr: PrId,
    labels: BTreeSet<String>,
    events: Vec<GateEvent>,
}

/// Authoritative store of PR gate records
pub struct GateStore {
    records: RwLock<HashMap<PrId, Entry>>,
    policy: Arc<GatePolicy>,
    clock: Arc<dyn Clock>,
    publisher: Option<Arc<StatusPublisher>>,
    storage: Option<StateDir>,
    timer_armed: Notify,
}

impl GateStore {
    /// In-memory store with no publisher
    pub fn new(policy: GatePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            policy: Arc::new(policy),
            clock,
            publisher: None,
            storage: None,
            timer_armed: Notify::new(),
        }
    }

    /// Store backed by a state directory, reloading every persisted record
    pub fn open(policy: GatePolicy, clock: Arc<dyn Clock>, storage: StateDir) -> Result<Self> {
        let loaded = storage.load_all()?;
        info!(count = loaded.len(), dir = %storage.root().display(), "Restored gate records");

        let records = loaded
            .into_iter()
            .map(|r| (r.id, Arc::new(Mutex::new(r))))
            .collect();

        Ok(Self {
            records: RwLock::new(records),
            storage: Some(storage),
            ..Self::new(policy, clock)
        })
    }

    /// Attach a status publisher
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<StatusPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Policy in effect
    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Current time according to the store's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Signalled whenever a new escalation timer is armed
    pub(crate) const fn timer_armed(&self) -> &Notify {
        &self.timer_armed
    }

    /// Copy of a PR's record
    pub async fn get(&self, pr: PrId) -> Option<PullRequestRecord> {
        let entry = self.records.read().await.get(&pr).cloned()?;
        let record = entry.lock().await;
        Some(record.clone())
    }

    /// IDs of every tracked PR that is not archived
    pub async fn active(&self) -> Vec<PrId> {
        let mut active = Vec::new();
        for (id, entry) in self.entries().await {
            if !entry.lock().await.is_archived() {
                active.push(id);
            }
        }
        active
    }

    /// Start tracking a PR, or return the existing record unchanged
    pub async fn observe(&self, pr: PrId, head_sha: &str) -> Result<PullRequestRecord> {
        let entry = self.entry_or_create(pr, head_sha).await?;
        let record = entry.lock().await;
        Ok(record.clone())
    }

    /// Move a PR's head. Checks recorded for older heads become stale.
    pub async fn update_head(&self, pr: PrId, head_sha: &str) -> Result<GateStatus> {
        self.mutate(pr, |store, record, now, events| {
            if record.head_sha != head_sha {
                debug!(pr = %pr, from = %record.head_sha, to = %head_sha, "Head moved");
                record.head_sha = head_sha.to_string();
            }
            store.reevaluate(record, now, events)
        })
        .await
    }

    /// Record check results for `gate` and re-evaluate.
    ///
    /// A check supersedes an earlier one with the same name.
    ///
    /// # Errors
    /// - `Error::StaleInput` if `head_sha` (or any input's head) isn't the PR's head
    /// - `Error::InvalidTransition` if the PR has already left `gate`
    pub async fn submit_checks(
        &self,
        pr: PrId,
        gate: Gate,
        head_sha: &str,
        inputs: Vec<CheckInput>,
    ) -> Result<GateStatus> {
        self.mutate(pr, |store, record, now, events| {
            ensure_head(record, head_sha)?;
            if let Some(stale) = inputs.iter().find(|c| c.head_sha != record.head_sha) {
                return Err(Error::StaleInput {
                    pr,
                    expected: record.head_sha.clone(),
                    got: stale.head_sha.clone(),
                });
            }
            ensure_gate_open(record, gate)?;

            let by_name = record.checks.entry(gate).or_default();
            for input in inputs {
                by_name.insert(input.name.clone(), input);
            }
            store.reevaluate(record, now, events)
        })
        .await
    }

    /// Record review dimension scores and re-evaluate.
    ///
    /// # Errors
    /// - `Error::Config` if the scores are malformed (nothing is recorded)
    /// - `Error::StaleInput` if `head_sha` isn't the PR's head
    pub async fn submit_scores(
        &self,
        pr: PrId,
        head_sha: &str,
        scores: Vec<DimensionScore>,
    ) -> Result<GateStatus> {
        crate::score::aggregate(&scores, &self.policy)?;
        self.mutate(pr, |store, record, now, events| {
            ensure_head(record, head_sha)?;
            ensure_gate_open(record, Gate::Review)?;
            record.scores = Some(scores);
            store.reevaluate(record, now, events)
        })
        .await
    }

    /// Replace the hosting-provider signals and re-evaluate
    pub async fn update_signals(
        &self,
        pr: PrId,
        head_sha: &str,
        signals: HostSignals,
    ) -> Result<GateStatus> {
        self.mutate(pr, |store, record, now, events| {
            ensure_head(record, head_sha)?;
            record.signals = signals;
            store.reevaluate(record, now, events)
        })
        .await
    }

    /// Apply a full hosting snapshot as one evaluation.
    ///
    /// Creates the record on first sight. The snapshot's head becomes the
    /// PR's head; checks for other heads and for gates the PR has left are
    /// dropped.
    pub async fn ingest(&self, pr: PrId, snapshot: HostSnapshot) -> Result<GateStatus> {
        if let Some(scores) = &snapshot.scores {
            crate::score::aggregate(scores, &self.policy)?;
        }
        self.entry_or_create(pr, &snapshot.head_sha).await?;
        self.mutate(pr, |store, record, now, events| {
            if record.is_archived() {
                return Err(Error::InvalidTransition(format!("PR {pr} is archived")));
            }
            let HostSnapshot {
                head_sha,
                signals,
                checks,
                scores,
                ..
            } = snapshot;

            record.head_sha = head_sha;
            record.signals = signals;
            if scores.is_some() {
                record.scores = scores;
            }
            for (gate, inputs) in checks {
                if gate < record.gate {
                    continue;
                }
                let by_name = record.checks.entry(gate).or_default();
                for input in inputs {
                    if input.head_sha == record.head_sha {
                        by_name.insert(input.name.clone(), input);
                    } else {
                        debug!(pr = %pr, check = %input.name, "Dropping check for old head");
                    }
                }
            }
            store.reevaluate(record, now, events)
        })
        .await
    }

    /// Authorize and apply an override at the PR's current gate.
    ///
    /// On success the gate is marked `Overridden`, the PR advances exactly as
    /// on a pass, and the override record joins the permanent audit log.
    pub async fn request_override(&self, request: OverrideRequest) -> Result<OverrideRecord> {
        let pr = request.pr;
        let mut granted = None;
        self.mutate(pr, |store, record, now, events| {
            ensure_gate_open(record, request.gate)?;
            if record.gate != request.gate {
                return Err(Error::InvalidTransition(format!(
                    "PR {pr} is at {}, not {}",
                    record.gate, request.gate
                )));
            }
            if record.status().is_resolved() {
                return Err(Error::InvalidTransition(format!(
                    "{} gate of PR {pr} is already {}",
                    record.gate,
                    record.status()
                )));
            }

            let snapshot = record.snapshot();
            let decision = match &record.last_decision {
                Some(decision) => decision.clone(),
                None => evaluate(&snapshot, &store.policy)?,
            };
            let override_record =
                authorize(&request, &decision, &record.signals, &store.policy, now)?;

            info!(
                pr = %pr,
                gate = %record.gate,
                requester = %override_record.requester,
                level = %override_record.authority_level,
                "Override granted"
            );

            let from = record.status();
            record.overrides.push(override_record.clone());
            record.set_status(
                TransitionKind::Overridden,
                GateStatus::Overridden,
                Some(decision.clone()),
                Some(snapshot),
                now,
            );
            events.push(GateEvent::OverrideApplied {
                pr,
                gate: record.gate,
                requester: override_record.requester.clone(),
            });
            events.push(GateEvent::GateTransitioned {
                pr,
                gate: record.gate,
                from: Some(from),
                to: GateStatus::Overridden,
                reasons: decision.reason_codes(),
            });
            granted = Some(override_record);

            store.advance(record, now, events);
            if !record.is_archived() {
                store.reevaluate(record, now, events)?;
            }
            Ok(())
        })
        .await?;

        granted.ok_or_else(|| Error::InvalidTransition("override was not applied".to_string()))
    }

    /// Archive a PR. Further submissions are rejected.
    pub async fn archive(&self, pr: PrId, reason: ArchiveReason) -> Result<()> {
        self.mutate(pr, |_, record, now, events| {
            if record.is_archived() {
                return Ok(());
            }
            record.archive(reason, now);
            events.push(GateEvent::Archived { pr, reason });
            Ok(())
        })
        .await
        .map(|_| ())
    }

    /// Fire every escalation due at the clock's current time.
    ///
    /// Runs under each PR's lock, so a fire can't race an evaluation of the
    /// same PR.
    pub async fn fire_due_escalations(&self) -> Vec<EscalationFired> {
        let mut fired_all = Vec::new();
        for (pr, entry) in self.entries().await {
            let effects = {
                let mut guard = entry.lock().await;
                let now = self.clock.now();
                let due = guard.escalation.as_ref().is_some_and(|t| t.is_due(now));
                if !due || guard.is_archived() {
                    continue;
                }

                let mut working = guard.clone();
                let fired = working
                    .escalation
                    .as_mut()
                    .map(|timer| timer.fire_due(now, &self.policy.ladder))
                    .unwrap_or_default();
                if let Err(e) = self.persist(&working) {
                    warn!(pr = %pr, error = %e, "Failed to persist escalation, will retry");
                    continue;
                }
                *guard = working;

                for f in &fired {
                    info!(pr = %pr, gate = %f.gate, level = f.level, "Escalation fired");
                }
                fired_all.extend(fired.iter().cloned());
                Effects {
                    pr,
                    labels: labels_for(&guard),
                    events: fired.into_iter().map(GateEvent::EscalationFired).collect(),
                }
            };
            self.dispatch(effects).await;
        }
        fired_all
    }

    /// Earliest scheduled escalation across all PRs
    pub async fn next_fire_at(&self) -> Option<DateTime<Utc>> {
        let mut earliest: Option<DateTime<Utc>> = None;
        for (_, entry) in self.entries().await {
            let record = entry.lock().await;
            if record.is_archived() {
                continue;
            }
            if let Some(at) = record.escalation.as_ref().and_then(|t| t.next_fire_at) {
                earliest = Some(earliest.map_or(at, |e| e.min(at)));
            }
        }
        earliest
    }

    async fn entries(&self) -> Vec<(PrId, Entry)> {
        let mut entries: Vec<(PrId, Entry)> = self
            .records
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(entry)))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    async fn entry_or_create(&self, pr: PrId, head_sha: &str) -> Result<Entry> {
        if let Some(entry) = self.records.read().await.get(&pr) {
            return Ok(Arc::clone(entry));
        }

        let mut records = self.records.write().await;
        if let Some(entry) = records.get(&pr) {
            return Ok(Arc::clone(entry));
        }
        let record = PullRequestRecord::new(pr, head_sha, self.clock.now());
        self.persist(&record)?;
        info!(pr = %pr, head = %head_sha, "Tracking new pull request");
        let entry = Arc::new(Mutex::new(record));
        records.insert(pr, Arc::clone(&entry));
        Ok(entry)
    }

    /// Run `f` against a working copy of the PR's record under its lock.
    ///
    /// The copy replaces the record only if `f` succeeds and the result is
    /// persisted. Events are dispatched after the lock is released.
    async fn mutate<F>(&self, pr: PrId, f: F) -> Result<GateStatus>
    where
        F: FnOnce(&Self, &mut PullRequestRecord, DateTime<Utc>, &mut Vec<GateEvent>) -> Result<()>,
    {
        let entry = self
            .records
            .read()
            .await
            .get(&pr)
            .cloned()
            .ok_or(Error::UnknownPullRequest(pr))?;

        let (status, effects) = {
            let mut guard = entry.lock().await;
            let now = self.clock.now();
            let mut working = guard.clone();
            let mut events = Vec::new();

            f(self, &mut working, now, &mut events)?;

            self.persist(&working)?;
            *guard = working;
            let effects = Effects {
                pr,
                labels: labels_for(&guard),
                events,
            };
            (guard.status(), effects)
        };

        self.dispatch(effects).await;
        Ok(status)
    }

    /// Evaluate the current gate, cascading through gates that pass.
    fn reevaluate(
        &self,
        record: &mut PullRequestRecord,
        now: DateTime<Utc>,
        events: &mut Vec<GateEvent>,
    ) -> Result<()> {
        if record.is_archived() {
            return Err(Error::InvalidTransition(format!(
                "PR {} is archived",
                record.id
            )));
        }

        loop {
            let snapshot = record.snapshot();
            let decision = evaluate(&snapshot, &self.policy)?;
            let from = record.status();
            let to = decision.status();

            let changed = from != to
                || record
                    .last_decision
                    .as_ref()
                    .is_none_or(|d| d.reasons != decision.reasons);
            if changed {
                debug!(pr = %record.id, gate = %record.gate, %from, %to, "Gate evaluated");
                if from != to {
                    events.push(GateEvent::GateTransitioned {
                        pr: record.id,
                        gate: record.gate,
                        from: Some(from),
                        to,
                        reasons: decision.reason_codes(),
                    });
                }
                record.set_status(
                    TransitionKind::Evaluated,
                    to,
                    Some(decision.clone()),
                    Some(snapshot),
                    now,
                );
            }
            record.last_decision = Some(decision);

            if to.is_resolved() {
                self.advance(record, now, events);
                if record.is_archived() {
                    return Ok(());
                }
                continue;
            }

            if record.escalation.is_none() {
                record.escalation = Some(EscalationState::arm(
                    record.id,
                    record.gate,
                    now,
                    &self.policy.ladder,
                ));
                self.timer_armed.notify_one();
            }
            return Ok(());
        }
    }

    /// Leave a resolved gate: cancel its timer, then enter the next gate or
    /// archive the PR as complete.
    fn advance(&self, record: &mut PullRequestRecord, now: DateTime<Utc>, events: &mut Vec<GateEvent>) {
        record.escalation = None;
        match record.gate.next() {
            Some(next) => {
                info!(pr = %record.id, from = %record.gate, to = %next, "Advancing gate");
                record.enter_gate(next, now);
                events.push(GateEvent::GateTransitioned {
                    pr: record.id,
                    gate: next,
                    from: None,
                    to: GateStatus::Pending,
                    reasons: Vec::new(),
                });
            }
            None => {
                info!(pr = %record.id, "All gates resolved");
                record.archive(ArchiveReason::Completed, now);
                events.push(GateEvent::Archived {
                    pr: record.id,
                    reason: ArchiveReason::Completed,
                });
            }
        }
    }

    fn persist(&self, record: &PullRequestRecord) -> Result<()> {
        match &self.storage {
            Some(storage) => storage.save(record),
            None => Ok(()),
        }
    }

    async fn dispatch(&self, effects: Effects) {
        if let Some(publisher) = &self.publisher {
            publisher
                .publish(effects.pr, &effects.labels, &effects.events)
                .await;
        }
    }
}

fn ensure_head(record: &PullRequestRecord, head_sha: &str) -> Result<()> {
    if record.head_sha == head_sha {
        Ok(())
    } else {
        Err(Error::StaleInput {
            pr: record.id,
            expected: record.head_sha.clone(),
            got: head_sha.to_string(),
        })
    }
}

fn ensure_gate_open(record: &PullRequestRecord, gate: Gate) -> Result<()> {
    if record.is_archived() {
        return Err(Error::InvalidTransition(format!(
            "PR {} is archived",
            record.id
        )));
    }
    if gate < record.gate {
        return Err(Error::InvalidTransition(format!(
            "PR {} has already left the {gate} gate",
            record.id
        )));
    }
    Ok(())
}
