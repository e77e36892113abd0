//! Mock hosting provider and notification channel for testing

use async_trait::async_trait;
use pr_gates::error::{Error, Result};
use pr_gates::platform::{HostSnapshot, HostingApi, NotificationChannel};
use pr_gates::publish::GateEvent;
use pr_gates::types::PrId;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

/// Call record for `add_labels`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLabelsCall {
    pub pr: PrId,
    pub labels: Vec<String>,
}

/// Call record for `remove_label`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveLabelCall {
    pub pr: PrId,
    pub label: String,
}

/// In-memory hosting provider
///
/// Features:
/// - Label state per PR that add/remove operations really mutate
/// - Configurable open-PR list and snapshots
/// - Call tracking for verification
/// - Error injection for failure path testing
pub struct MockHostingService {
    open_prs: Mutex<Vec<PrId>>,
    snapshots: Mutex<HashMap<PrId, HostSnapshot>>,
    labels: Mutex<HashMap<PrId, BTreeSet<String>>>,
    // Call tracking
    fetch_calls: Mutex<Vec<PrId>>,
    add_labels_calls: Mutex<Vec<AddLabelsCall>>,
    remove_label_calls: Mutex<Vec<RemoveLabelCall>>,
    // Error injection
    error_on_list_prs: Mutex<Option<String>>,
    unavailable_prs: Mutex<HashSet<PrId>>,
    error_on_labels: Mutex<Option<String>>,
}

impl MockHostingService {
    pub fn new() -> Self {
        Self {
            open_prs: Mutex::new(Vec::new()),
            snapshots: Mutex::new(HashMap::new()),
            labels: Mutex::new(HashMap::new()),
            fetch_calls: Mutex::new(Vec::new()),
            add_labels_calls: Mutex::new(Vec::new()),
            remove_label_calls: Mutex::new(Vec::new()),
            error_on_list_prs: Mutex::new(None),
            unavailable_prs: Mutex::new(HashSet::new()),
            error_on_labels: Mutex::new(None),
        }
    }

    // === Error injection methods ===

    /// Make `list_open_prs` fail as unavailable
    pub fn fail_list_prs(&self, msg: &str) {
        *self.error_on_list_prs.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `fetch_snapshot` fail as unavailable for one PR
    pub fn make_unavailable(&self, pr: PrId) {
        self.unavailable_prs.lock().unwrap().insert(pr);
    }

    /// Undo [`Self::make_unavailable`]
    pub fn make_available(&self, pr: PrId) {
        self.unavailable_prs.lock().unwrap().remove(&pr);
    }

    /// Make every label operation fail
    pub fn fail_labels(&self, msg: &str) {
        *self.error_on_labels.lock().unwrap() = Some(msg.to_string());
    }

    // === Response setup ===

    /// Register an open PR and the snapshot `fetch_snapshot` returns for it
    pub fn set_open_pr(&self, pr: PrId, snapshot: HostSnapshot) {
        let mut open = self.open_prs.lock().unwrap();
        if !open.contains(&pr) {
            open.push(pr);
        }
        self.snapshots.lock().unwrap().insert(pr, snapshot);
    }

    /// Replace the snapshot for a PR without changing the open list
    pub fn set_snapshot(&self, pr: PrId, snapshot: HostSnapshot) {
        self.snapshots.lock().unwrap().insert(pr, snapshot);
    }

    /// Drop a PR from the open list (its snapshot stays fetchable)
    pub fn remove_open_pr(&self, pr: PrId) {
        self.open_prs.lock().unwrap().retain(|p| *p != pr);
    }

    /// Pre-set labels on a PR, e.g. labels added by humans
    pub fn set_labels(&self, pr: PrId, labels: &[&str]) {
        self.labels
            .lock()
            .unwrap()
            .insert(pr, labels.iter().map(|l| (*l).to_string()).collect());
    }

    // === Call verification methods ===

    /// Current labels on a PR
    pub fn labels(&self, pr: PrId) -> BTreeSet<String> {
        self.labels
            .lock()
            .unwrap()
            .get(&pr)
            .cloned()
            .unwrap_or_default()
    }

    /// Get all PRs `fetch_snapshot` was called with
    pub fn get_fetch_calls(&self) -> Vec<PrId> {
        self.fetch_calls.lock().unwrap().clone()
    }

    /// Get all `add_labels` calls
    pub fn get_add_labels_calls(&self) -> Vec<AddLabelsCall> {
        self.add_labels_calls.lock().unwrap().clone()
    }

    /// Get all `remove_label` calls
    pub fn get_remove_label_calls(&self) -> Vec<RemoveLabelCall> {
        self.remove_label_calls.lock().unwrap().clone()
    }

    /// Assert that a label is currently set
    pub fn assert_has_label(&self, pr: PrId, label: &str) {
        let labels = self.labels(pr);
        assert!(
            labels.contains(label),
            "Expected PR {pr} to have label {label} but got: {labels:?}"
        );
    }

    /// Assert that a label is not currently set
    pub fn assert_lacks_label(&self, pr: PrId, label: &str) {
        let labels = self.labels(pr);
        assert!(
            !labels.contains(label),
            "Expected PR {pr} NOT to have label {label} but got: {labels:?}"
        );
    }

    fn check_labels_error(&self) -> Result<()> {
        match self.error_on_labels.lock().unwrap().as_ref() {
            Some(msg) => Err(Error::CollaboratorUnavailable(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl HostingApi for MockHostingService {
    async fn list_open_prs(&self) -> Result<Vec<PrId>> {
        if let Some(msg) = self.error_on_list_prs.lock().unwrap().as_ref() {
            return Err(Error::CollaboratorUnavailable(msg.clone()));
        }
        Ok(self.open_prs.lock().unwrap().clone())
    }

    async fn fetch_snapshot(&self, pr: PrId) -> Result<HostSnapshot> {
        self.fetch_calls.lock().unwrap().push(pr);

        if self.unavailable_prs.lock().unwrap().contains(&pr) {
            return Err(Error::CollaboratorUnavailable(format!(
                "fetch_snapshot: provider unavailable for PR {pr}"
            )));
        }

        self.snapshots
            .lock()
            .unwrap()
            .get(&pr)
            .cloned()
            .ok_or(Error::UnknownPullRequest(pr))
    }

    async fn list_labels(&self, pr: PrId) -> Result<Vec<String>> {
        self.check_labels_error()?;
        Ok(self.labels(pr).into_iter().collect())
    }

    async fn add_labels(&self, pr: PrId, labels: &[String]) -> Result<()> {
        self.add_labels_calls.lock().unwrap().push(AddLabelsCall {
            pr,
            labels: labels.to_vec(),
        });
        self.check_labels_error()?;

        self.labels
            .lock()
            .unwrap()
            .entry(pr)
            .or_default()
            .extend(labels.iter().cloned());
        Ok(())
    }

    async fn remove_label(&self, pr: PrId, label: &str) -> Result<()> {
        self.remove_label_calls.lock().unwrap().push(RemoveLabelCall {
            pr,
            label: label.to_string(),
        });
        self.check_labels_error()?;

        if let Some(labels) = self.labels.lock().unwrap().get_mut(&pr) {
            labels.remove(label);
        }
        Ok(())
    }
}

/// Notification channel that records every delivered event
pub struct MockNotificationChannel {
    delivered: Mutex<Vec<(PrId, GateEvent)>>,
    error_on_notify: Mutex<Option<String>>,
}

impl MockNotificationChannel {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            error_on_notify: Mutex::new(None),
        }
    }

    /// Make every delivery fail
    pub fn fail_notify(&self, msg: &str) {
        *self.error_on_notify.lock().unwrap() = Some(msg.to_string());
    }

    /// All delivered events, in order
    pub fn events(&self) -> Vec<GateEvent> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Delivered escalation events
    pub fn escalations(&self) -> Vec<pr_gates::escalation::EscalationFired> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                GateEvent::EscalationFired(fired) => Some(fired),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for MockNotificationChannel {
    async fn notify(&self, pr: PrId, event: &GateEvent) -> Result<()> {
        if let Some(msg) = self.error_on_notify.lock().unwrap().as_ref() {
            return Err(Error::CollaboratorUnavailable(msg.clone()));
        }
        self.delivered.lock().unwrap().push((pr, event.clone()));
        Ok(())
    }
}
