//! In-memory task registry and pending-notification index.
//!
//! All registries live for the process lifetime only. Every method takes the
//! single lock for one atomic step; nothing is held across a suspension
//! point, so task mutations are linearized per task.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use crate::host::ContextHandle;

use super::task::{PendingNotification, TaskStatus, TrackedTask};

#[derive(Default)]
struct StoreInner {
    tasks: HashMap<String, TrackedTask>,
    /// execution handle -> task id
    by_handle: HashMap<String, String>,
    /// parent handle -> queued completion messages
    pending: HashMap<String, Vec<PendingNotification>>,
}

/// Owner of the canonical task records.
#[derive(Default)]
pub struct TaskStore {
    inner: RwLock<StoreInner>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: TrackedTask) {
        let mut inner = self.inner.write();
        inner
            .by_handle
            .insert(task.execution_handle.as_str().to_string(), task.id.clone());
        inner.tasks.insert(task.id.clone(), task);
    }

    pub fn get(&self, task_id: &str) -> Option<TrackedTask> {
        self.inner.read().tasks.get(task_id).cloned()
    }

    pub fn get_by_handle(&self, handle: &ContextHandle) -> Option<TrackedTask> {
        let inner = self.inner.read();
        let task_id = inner.by_handle.get(handle.as_str())?;
        inner.tasks.get(task_id).cloned()
    }

    /// Remove a task record and its handle index entry.
    pub fn remove(&self, task_id: &str) -> Option<TrackedTask> {
        let mut inner = self.inner.write();
        let task = inner.tasks.remove(task_id)?;
        inner.by_handle.remove(task.execution_handle.as_str());
        Some(task)
    }

    /// Apply `mutate` to a tracked task under the write lock. Returns the
    /// mutated copy, or `None` when the task is unknown.
    pub fn update<F>(&self, task_id: &str, mutate: F) -> Option<TrackedTask>
    where
        F: FnOnce(&mut TrackedTask),
    {
        let mut inner = self.inner.write();
        let task = inner.tasks.get_mut(task_id)?;
        mutate(task);
        Some(task.clone())
    }

    /// Transition a running task to a terminal state. Re-applying a terminal
    /// transition to an already-terminal task is a no-op returning `None`,
    /// which keeps duplicated lifecycle signals harmless.
    pub fn finalize(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
    ) -> Option<TrackedTask> {
        debug_assert!(status.is_terminal());
        let mut inner = self.inner.write();
        let task = inner.tasks.get_mut(task_id)?;
        if task.status.is_terminal() {
            return None;
        }
        task.status = status;
        task.completed_at = Some(Utc::now());
        task.error = error;
        Some(task.clone())
    }

    pub fn running_tasks(&self) -> Vec<TrackedTask> {
        self.inner
            .read()
            .tasks
            .values()
            .filter(|t| t.is_running())
            .cloned()
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.inner
            .read()
            .tasks
            .values()
            .filter(|t| t.is_running())
            .count()
    }

    pub fn all_tasks(&self) -> Vec<TrackedTask> {
        self.inner.read().tasks.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tasks.is_empty()
    }

    /// Tasks whose parent handle is exactly `handle`.
    pub fn children_of(&self, handle: &ContextHandle) -> Vec<TrackedTask> {
        self.inner
            .read()
            .tasks
            .values()
            .filter(|t| t.parent_handle == *handle)
            .cloned()
            .collect()
    }

    // === Pending notifications ===

    pub fn queue_notification(&self, notification: PendingNotification) {
        self.inner
            .write()
            .pending
            .entry(notification.parent_handle.as_str().to_string())
            .or_default()
            .push(notification);
    }

    pub fn pending_for(&self, parent: &ContextHandle) -> Vec<PendingNotification> {
        self.inner
            .read()
            .pending
            .get(parent.as_str())
            .cloned()
            .unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.read().pending.values().map(Vec::len).sum()
    }

    /// Drop every queued notification for one task.
    pub fn remove_notifications_for_task(&self, task_id: &str) {
        let mut inner = self.inner.write();
        inner.pending.retain(|_, queue| {
            queue.retain(|n| n.task_id != task_id);
            !queue.is_empty()
        });
    }

    /// Drop queued notifications older than `max_age`, plus any whose task
    /// record is already gone. Returns how many entries were removed.
    pub fn prune_notifications(&self, max_age: chrono::Duration) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.write();
        let mut removed = 0;
        let live: Vec<String> = inner.tasks.keys().cloned().collect();
        inner.pending.retain(|_, queue| {
            queue.retain(|n| {
                let keep = now.signed_duration_since(n.queued_at) <= max_age
                    && live.contains(&n.task_id);
                if !keep {
                    removed += 1;
                }
                keep
            });
            !queue.is_empty()
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::registry::task::LaunchSpec;

    fn sample_task(parent: &str) -> TrackedTask {
        let spec = LaunchSpec::new("desc", "prompt", "researcher", ContextHandle::from(parent));
        let handle = ContextHandle::new(format!("ctx-{}", Uuid::new_v4()));
        TrackedTask::new(&spec, handle, spec.admission_key())
    }

    #[test]
    fn test_insert_and_lookup_by_handle() {
        let store = TaskStore::new();
        let task = sample_task("parent");
        let handle = task.execution_handle.clone();
        store.insert(task.clone());

        assert_eq!(store.get(&task.id).unwrap().id, task.id);
        assert_eq!(store.get_by_handle(&handle).unwrap().id, task.id);
        assert!(store.get_by_handle(&ContextHandle::from("missing")).is_none());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let store = TaskStore::new();
        let task = sample_task("parent");
        let id = task.id.clone();
        store.insert(task);

        let first = store.finalize(&id, TaskStatus::Completed, None);
        assert!(first.is_some());

        // A duplicated completion signal must be a no-op.
        let second = store.finalize(&id, TaskStatus::Error, Some("late".to_string()));
        assert!(second.is_none());
        assert_eq!(store.get(&id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_remove_clears_handle_index() {
        let store = TaskStore::new();
        let task = sample_task("parent");
        let id = task.id.clone();
        let handle = task.execution_handle.clone();
        store.insert(task);

        store.remove(&id);
        assert!(store.get(&id).is_none());
        assert!(store.get_by_handle(&handle).is_none());
    }

    #[test]
    fn test_notification_pruning_drops_orphans() {
        let store = TaskStore::new();
        let task = sample_task("parent");
        store.insert(task.clone());

        store.queue_notification(PendingNotification {
            task_id: task.id.clone(),
            parent_handle: task.parent_handle.clone(),
            message: "done".to_string(),
            queued_at: Utc::now(),
        });
        store.queue_notification(PendingNotification {
            task_id: "gone-task".to_string(),
            parent_handle: ContextHandle::from("parent"),
            message: "orphan".to_string(),
            queued_at: Utc::now(),
        });

        let removed = store.prune_notifications(chrono::Duration::minutes(30));
        assert_eq!(removed, 1);
        assert_eq!(store.pending_count(), 1);
    }
}
