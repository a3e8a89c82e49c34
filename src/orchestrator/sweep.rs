//! Liveness sweep and staleness reaper.
//!
//! The sweep is a fallback for event-driven signals: while at least one
//! task runs, it polls the host for context status on a fixed cadence and
//! applies the same idle/checklist completion logic. The reaper piggybacks
//! on the sweep, rate-limited to one pass per cooldown window.

use std::sync::atomic::Ordering;
use std::time::Instant;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::host::ContextActivity;
use crate::registry::TaskStatus;

use super::engine::TaskOrchestrator;

impl TaskOrchestrator {
    /// Start the sweep loop if it is not already running. Called on every
    /// launch and resume; the loop parks itself once nothing is running.
    pub(crate) fn ensure_sweeper(&self) {
        if self.inner.sweeper_active.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.sweep_loop().await;
        });
    }

    async fn sweep_loop(self) {
        let mut ticker = tokio::time::interval(self.inner.config.lifecycle.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Liveness sweep started");

        loop {
            ticker.tick().await;
            self.reap_stale();

            let running = self.inner.store.running_tasks();
            if running.is_empty() {
                self.inner.sweeper_active.store(false, Ordering::Release);
                // A launch may have slipped in between the snapshot and the
                // flag store; reclaim the loop instead of returning.
                if self.inner.store.running_count() > 0
                    && !self.inner.sweeper_active.swap(true, Ordering::AcqRel)
                {
                    continue;
                }
                debug!("Liveness sweep parked; no running tasks");
                return;
            }

            for task in running {
                match self.inner.host.context_status(&task.execution_handle).await {
                    Ok(ContextActivity::Idle) => self.try_complete(&task).await,
                    Ok(ContextActivity::Working) => {}
                    Err(e) => {
                        debug!(task_id = %task.id, error = %e, "Status poll failed");
                    }
                }
            }
        }
    }

    /// Remove every tracked task older than the TTL, regardless of status,
    /// and sweep the pending-notification index for entries that outlived
    /// their task. Rate-limited to one pass per cooldown window.
    pub(crate) fn reap_stale(&self) {
        {
            let mut last = self.inner.last_reap.lock();
            let cooldown = self.inner.config.lifecycle.reap_cooldown();
            if let Some(at) = *last
                && at.elapsed() < cooldown
            {
                return;
            }
            *last = Some(Instant::now());
        }

        let ttl = chrono::Duration::from_std(self.inner.config.lifecycle.task_ttl())
            .unwrap_or_else(|_| chrono::Duration::minutes(30));

        for task in self.inner.store.all_tasks() {
            if task.age() > ttl {
                warn!(
                    task_id = %task.id,
                    status = task.status.as_str(),
                    "Task exceeded time-to-live; reaping"
                );
                self.purge_task(&task.id, TaskStatus::Error, "task exceeded time-to-live");
            }
        }

        // Notifications can outlive their task when the record was removed
        // through another path; age them out independently.
        let removed = self.inner.store.prune_notifications(ttl);
        if removed > 0 {
            debug!(removed, "Stale pending notifications pruned");
        }
    }
}
