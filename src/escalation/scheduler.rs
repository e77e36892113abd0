//! Background escalation scheduler
//!
//! One task for every PR: it sleeps until the earliest armed `next_fire_at`
//! (never longer than `max_sleep`), fires everything due, and goes back to
//! sleep. Arming a new timer wakes it early, since the new timer may be the
//! earliest one.

use super::timer::EscalationFired;
use crate::store::GateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Lower bound on a sleep, so a timer that failed to persist isn't retried in a hot loop
const MIN_SLEEP: Duration = Duration::from_secs(1);

/// Fires due escalations for every PR in a store
pub struct EscalationScheduler {
    store: Arc<GateStore>,
    max_sleep: Duration,
}

impl EscalationScheduler {
    /// Create a scheduler over `store`
    pub fn new(store: Arc<GateStore>, max_sleep: Duration) -> Self {
        Self { store, max_sleep }
    }

    /// Fire everything due right now
    pub async fn tick(&self) -> Vec<EscalationFired> {
        self.store.fire_due_escalations().await
    }

    /// How long to sleep before the next tick
    async fn next_sleep(&self) -> Duration {
        let Some(at) = self.store.next_fire_at().await else {
            return self.max_sleep;
        };
        (at - self.store.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .clamp(MIN_SLEEP, self.max_sleep.max(MIN_SLEEP))
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(max_sleep = ?self.max_sleep, "Escalation scheduler started");

        while !*shutdown.borrow() {
            let fired = self.tick().await;
            if !fired.is_empty() {
                debug!(count = fired.len(), "Escalations fired");
            }

            let sleep = self.next_sleep().await;
            tokio::select! {
                () = tokio::time::sleep(sleep) => {}
                () = self.store.timer_armed().notified() => {
                    debug!("Timer armed, rescheduling");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Escalation scheduler stopped");
    }

    /// Run on a new tokio task
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::GatePolicy;
    use crate::types::{Gate, PrId};
    use chrono::{TimeZone, Utc};

    fn store() -> (Arc<GateStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
        ));
        (
            Arc::new(GateStore::new(GatePolicy::default(), clock.clone())),
            clock,
        )
    }

    #[tokio::test]
    async fn test_tick_fires_due_timer_once() {
        let (store, clock) = store();
        store.observe(PrId(7), "abc").await.unwrap();
        store.update_head(PrId(7), "abc").await.unwrap();

        let scheduler = EscalationScheduler::new(store.clone(), Duration::from_secs(60));
        assert!(scheduler.tick().await.is_empty());

        clock.advance(chrono::Duration::hours(24));
        let fired = scheduler.tick().await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].gate, Gate::PreReview);
        assert_eq!(fired[0].level, 2);

        assert!(scheduler.tick().await.is_empty());
    }

    #[tokio::test]
    async fn test_sleep_is_capped() {
        let (store, _) = store();
        store.observe(PrId(7), "abc").await.unwrap();
        store.update_head(PrId(7), "abc").await.unwrap();

        let scheduler = EscalationScheduler::new(store, Duration::from_secs(300));
        assert_eq!(scheduler.next_sleep().await, Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let (store, _) = store();
        let (tx, rx) = watch::channel(false);
        let handle = EscalationScheduler::new(store, Duration::from_secs(300)).spawn(rx);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
