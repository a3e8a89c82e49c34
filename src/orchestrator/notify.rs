//! Completion notification protocol.
//!
//! On a terminal transition the admission slot is released *before* any
//! delivery attempt begins. Delivery can hang on a busy parent context, and
//! a queued admission waiter must be unblocked regardless of whether the
//! message ever lands.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::registry::{PendingNotification, TaskStatus, TrackedTask};

use super::engine::TaskOrchestrator;

impl TaskOrchestrator {
    /// The single terminal-transition path. Dispatch failures, completion
    /// signals, cancels, and sweep-detected completions all land here.
    /// Re-finalizing an already-terminal task is a no-op.
    pub(crate) fn finalize_task(&self, task_id: &str, status: TaskStatus, error: Option<String>) {
        let Some(task) = self.inner.store.finalize(task_id, status, error) else {
            return;
        };
        info!(task_id = %task.id, status = status.as_str(), "Task finalized");

        // Release before delivery: this ordering is load-bearing.
        self.release_admission(&task.id);

        let message = completion_message(&task);
        self.inner.store.queue_notification(PendingNotification {
            task_id: task.id.clone(),
            parent_handle: task.parent_handle.clone(),
            message: message.clone(),
            queued_at: Utc::now(),
        });

        let this = self.clone();
        tokio::spawn(async move {
            this.deliver_completion(task, message).await;
        });
    }

    pub(crate) fn release_admission(&self, task_id: &str) {
        let mut key = None;
        self.inner.store.update(task_id, |task| {
            key = task.admission_key.take();
        });
        if let Some(key) = key {
            self.inner.admission.release(&key);
        }
    }

    /// Best-effort delivery after a short grace delay. Failure is logged,
    /// never retried, and never resurrects the task. Afterwards the task
    /// and its queued notifications are purged.
    async fn deliver_completion(&self, task: TrackedTask, message: String) {
        tokio::time::sleep(self.inner.config.notification.delivery_grace()).await;

        // A resume during the grace window reopens the task; its stale
        // completion notice is dropped.
        let still_terminal = self
            .inner
            .store
            .get(&task.id)
            .map(|t| t.status.is_terminal())
            .unwrap_or(false);
        if !still_terminal {
            debug!(task_id = %task.id, "Task reopened before delivery; dropping notice");
            return;
        }

        if let Err(e) = self
            .inner
            .host
            .deliver_message(&task.parent_handle, &message)
            .await
        {
            warn!(
                task_id = %task.id,
                parent = %task.parent_handle,
                error = %e,
                "Completion delivery failed"
            );
        }

        // Purge only when the task is still terminal; a resume that raced
        // the delivery keeps its record.
        if self
            .inner
            .store
            .get(&task.id)
            .map(|t| t.status.is_terminal())
            .unwrap_or(false)
        {
            self.inner.store.remove(&task.id);
            self.inner.store.remove_notifications_for_task(&task.id);
            debug!(task_id = %task.id, "Task purged after delivery attempt");
        }
    }
}

pub(crate) fn completion_message(task: &TrackedTask) -> String {
    let outcome = match task.status {
        TaskStatus::Completed => "finished".to_string(),
        TaskStatus::Error => format!(
            "failed: {}",
            task.error.as_deref().unwrap_or("unknown error")
        ),
        TaskStatus::Cancelled => format!(
            "was cancelled: {}",
            task.error.as_deref().unwrap_or("no reason given")
        ),
        TaskStatus::Running => "is still running".to_string(),
    };
    format!(
        "Subagent task {} ({}) {}. {} tool calls observed.",
        task.id, task.description, outcome, task.progress.tool_calls
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::host::ContextHandle;
    use crate::registry::{LaunchSpec, TaskProgress};

    fn terminal_task(status: TaskStatus, error: Option<&str>) -> TrackedTask {
        let spec = LaunchSpec::new(
            "summarize findings",
            "go",
            "writer",
            ContextHandle::from("parent"),
        );
        let mut task = TrackedTask::new(&spec, ContextHandle::from("ctx"), spec.admission_key());
        task.status = status;
        task.completed_at = Some(Utc::now());
        task.error = error.map(str::to_string);
        task.progress = TaskProgress {
            tool_calls: 7,
            ..TaskProgress::default()
        };
        task
    }

    #[test]
    fn test_completion_message_references_id_and_outcome() {
        let task = terminal_task(TaskStatus::Completed, None);
        let message = completion_message(&task);
        assert!(message.contains(&task.id));
        assert!(message.contains("finished"));
        assert!(message.contains("7 tool calls"));
    }

    #[test]
    fn test_failure_message_carries_error() {
        let task = terminal_task(TaskStatus::Error, Some("dispatch refused"));
        let message = completion_message(&task);
        assert!(message.contains("failed: dispatch refused"));
    }
}
