//! Pull-feed poller
//!
//! Periodically asks the hosting provider for every open PR's state and feeds
//! it to the store. PRs the store is still tracking are polled too, even once
//! they've left the open list, so post-merge gates keep getting input.

use crate::error::{Error, Result};
use crate::platform::HostingApi;
use crate::store::GateStore;
use crate::types::{ArchiveReason, PrId};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of one polling pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// PRs whose snapshot was applied
    pub refreshed: Vec<PrId>,
    /// PRs skipped because a collaborator was unavailable
    pub deferred: Vec<PrId>,
    /// PRs archived because they were closed
    pub closed: Vec<PrId>,
    /// PRs whose snapshot the store rejected, with the error
    pub rejected: Vec<(PrId, String)>,
}

/// Run one polling pass.
///
/// Per-PR failures don't stop the pass. An unavailable collaborator defers
/// the PR, leaving its gate as it was.
///
/// # Errors
/// Returns the listing error if the open-PR list itself can't be fetched.
pub async fn poll_once(store: &GateStore, hosting: &dyn HostingApi) -> Result<PollSummary> {
    let mut prs: BTreeSet<PrId> = hosting.list_open_prs().await?.into_iter().collect();
    prs.extend(store.active().await);

    let mut summary = PollSummary::default();
    for pr in prs {
        let snapshot = match hosting.fetch_snapshot(pr).await {
            Ok(snapshot) => snapshot,
            Err(Error::CollaboratorUnavailable(msg)) => {
                warn!(pr = %pr, error = %msg, "Hosting provider unavailable, deferring");
                summary.deferred.push(pr);
                continue;
            }
            Err(e) => {
                warn!(pr = %pr, error = %e, "Failed to fetch snapshot");
                summary.rejected.push((pr, e.to_string()));
                continue;
            }
        };

        // A merged PR stays tracked until its post-merge gate resolves
        if snapshot.closed && !snapshot.signals.merged {
            if store.get(pr).await.is_some() {
                match store.archive(pr, ArchiveReason::Closed).await {
                    Ok(()) => summary.closed.push(pr),
                    Err(e) => {
                        warn!(pr = %pr, error = %e, "Failed to archive closed PR");
                        summary.rejected.push((pr, e.to_string()));
                    }
                }
            }
            continue;
        }

        match store.ingest(pr, snapshot).await {
            Ok(status) => {
                debug!(pr = %pr, %status, "Snapshot applied");
                summary.refreshed.push(pr);
            }
            Err(e) if e.is_retryable() => {
                debug!(pr = %pr, error = %e, "Snapshot deferred");
                summary.deferred.push(pr);
            }
            Err(e) => {
                warn!(pr = %pr, error = %e, "Snapshot rejected");
                summary.rejected.push((pr, e.to_string()));
            }
        }
    }

    Ok(summary)
}

/// Poll every `interval` until `shutdown` flips to `true` or its sender is dropped
pub fn spawn_poller(
    store: Arc<GateStore>,
    hosting: Arc<dyn HostingApi>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "Poller started");
        while !*shutdown.borrow() {
            match poll_once(&store, hosting.as_ref()).await {
                Ok(summary) => debug!(
                    refreshed = summary.refreshed.len(),
                    deferred = summary.deferred.len(),
                    closed = summary.closed.len(),
                    rejected = summary.rejected.len(),
                    "Poll complete"
                ),
                Err(e) => warn!(error = %e, "Poll failed, will retry"),
            }

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Poller stopped");
    })
}
