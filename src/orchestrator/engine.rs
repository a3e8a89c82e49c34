//! Orchestrator for delegated subagent tasks.
//!
//! Owns the task registry, the admission controller, the quality routing
//! engine, and the per-session artifact store; consumes lifecycle signals
//! from the execution host and drives every status transition through a
//! single finalize path.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::admission::AdmissionController;
use crate::config::TaskPilotConfig;
use crate::context_store::{ContextStore, parse_artifact_block};
use crate::error::{Result, TaskPilotError};
use crate::host::{ContextHandle, ExecutionHost};
use crate::quality::{RoutingDirective, RoutingEngine};
use crate::registry::{LaunchSpec, ResumeSpec, TaskStatus, TaskStore, TrackedTask};

pub(crate) struct OrchestratorInner {
    pub(crate) config: TaskPilotConfig,
    pub(crate) host: Arc<dyn ExecutionHost>,
    pub(crate) store: TaskStore,
    pub(crate) admission: AdmissionController,
    pub(crate) quality: RoutingEngine,
    pub(crate) context: ContextStore,
    pub(crate) sweeper_active: AtomicBool,
    pub(crate) last_reap: Mutex<Option<Instant>>,
}

/// Coordinates asynchronous subagent work items: admission, lifecycle,
/// completion notification, staleness reclamation, and quality routing.
///
/// Cheap to clone; all state lives behind one shared inner.
#[derive(Clone)]
pub struct TaskOrchestrator {
    pub(crate) inner: Arc<OrchestratorInner>,
}

impl TaskOrchestrator {
    pub fn new(config: TaskPilotConfig, host: Arc<dyn ExecutionHost>) -> Self {
        let admission = AdmissionController::new(config.admission.clone());
        let quality = RoutingEngine::new(config.quality.clone());
        Self {
            inner: Arc::new(OrchestratorInner {
                config,
                host,
                store: TaskStore::new(),
                admission,
                quality,
                context: ContextStore::new(),
                sweeper_active: AtomicBool::new(false),
                last_reap: Mutex::new(None),
            }),
        }
    }

    /// Launch a new delegated task.
    ///
    /// Admission is acquired before the execution context is created; a
    /// creation failure releases the slot and propagates. The prompt is
    /// dispatched without waiting for completion, and an asynchronous
    /// dispatch failure finalizes the task as `error` so the caller is
    /// informed either way.
    pub async fn launch(&self, spec: LaunchSpec) -> Result<TrackedTask> {
        if spec.agent_identity.trim().is_empty() {
            return Err(TaskPilotError::InvalidArgument(
                "agent identity must not be empty".to_string(),
            ));
        }

        let key = spec.admission_key();
        self.inner.admission.acquire(&key).await;

        let handle = match self
            .inner
            .host
            .create_context(&spec.agent_identity, &spec.description)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.admission.release(&key);
                return Err(e);
            }
        };

        let task = TrackedTask::new(&spec, handle.clone(), key);
        self.inner.store.insert(task.clone());
        info!(
            task_id = %task.id,
            agent = %task.agent_identity,
            handle = %handle,
            "Task launched"
        );

        self.spawn_dispatch(task.id.clone(), handle, spec.prompt);
        self.ensure_sweeper();
        Ok(task)
    }

    /// Reopen an existing execution context.
    ///
    /// A terminal task re-acquires admission before going back to
    /// `running`; identity fields and accumulated `progress.tool_calls`
    /// are preserved, parent linkage is overwritten.
    pub async fn resume(&self, spec: ResumeSpec) -> Result<TrackedTask> {
        let existing = self
            .inner
            .store
            .get_by_handle(&spec.execution_handle)
            .ok_or_else(|| TaskPilotError::ContextNotFound(spec.execution_handle.to_string()))?;

        let reacquired = if existing.status.is_terminal() {
            let key = admission_key_of(&existing);
            self.inner.admission.acquire(&key).await;
            Some(key)
        } else {
            None
        };

        let updated = self.inner.store.update(&existing.id, |task| {
            task.status = TaskStatus::Running;
            task.completed_at = None;
            task.error = None;
            task.parent_handle = spec.parent_handle.clone();
            task.parent_request_id = spec.parent_request_id.clone();
            task.prompt = spec.prompt.clone();
            if let Some(key) = &reacquired {
                task.admission_key = Some(key.clone());
            }
        });

        let Some(task) = updated else {
            // Reaped while we waited for admission.
            if let Some(key) = reacquired {
                self.inner.admission.release(&key);
            }
            return Err(TaskPilotError::ContextNotFound(
                spec.execution_handle.to_string(),
            ));
        };

        // A stale completion notice must not fire for the reopened task.
        self.inner.store.remove_notifications_for_task(&task.id);

        info!(task_id = %task.id, handle = %task.execution_handle, "Task resumed");
        self.spawn_dispatch(task.id.clone(), task.execution_handle.clone(), spec.prompt);
        self.ensure_sweeper();
        Ok(task)
    }

    /// Cancel one task. The remote abort is fire-and-forget; local
    /// bookkeeping never waits on remote acknowledgment.
    pub fn cancel(&self, task_id: &str) -> Result<TrackedTask> {
        let task = self
            .inner
            .store
            .get(task_id)
            .ok_or_else(|| TaskPilotError::TaskNotFound(task_id.to_string()))?;

        if task.status.is_terminal() {
            return Ok(task);
        }

        let host = Arc::clone(&self.inner.host);
        let handle = task.execution_handle.clone();
        tokio::spawn(async move {
            host.abort_context(&handle).await;
        });

        self.finalize_task(task_id, TaskStatus::Cancelled, Some("cancelled by caller".to_string()));
        Ok(self.inner.store.get(task_id).unwrap_or(task))
    }

    /// Cancel every running descendant of an ancestor context.
    pub fn cancel_for_ancestor(&self, ancestor: &ContextHandle) -> Vec<TrackedTask> {
        let mut aborts = Vec::new();
        let mut cancelled = Vec::new();

        for task in self.descendants(ancestor) {
            if !task.is_running() {
                continue;
            }
            let host = Arc::clone(&self.inner.host);
            let handle = task.execution_handle.clone();
            aborts.push(async move {
                host.abort_context(&handle).await;
            });
            self.finalize_task(
                &task.id,
                TaskStatus::Cancelled,
                Some("ancestor cancelled".to_string()),
            );
            if let Some(updated) = self.inner.store.get(&task.id) {
                cancelled.push(updated);
            }
        }

        if !aborts.is_empty() {
            tokio::spawn(futures::future::join_all(aborts));
        }
        cancelled
    }

    /// Every task whose parent chain reaches `ancestor`, via repeated
    /// direct-children lookups. The visited set guards against cycles and
    /// double counting.
    pub fn descendants(&self, ancestor: &ContextHandle) -> Vec<TrackedTask> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<ContextHandle> = VecDeque::from([ancestor.clone()]);
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            for child in self.inner.store.children_of(&current) {
                if seen.insert(child.id.clone()) {
                    queue.push_back(child.execution_handle.clone());
                    result.push(child);
                }
            }
        }
        result
    }

    /// Rendered status line while running; the full outcome once terminal.
    pub fn status(&self, task_id: &str) -> Result<String> {
        let task = self
            .inner
            .store
            .get(task_id)
            .ok_or_else(|| TaskPilotError::TaskNotFound(task_id.to_string()))?;
        Ok(render_status(&task))
    }

    pub fn task(&self, task_id: &str) -> Option<TrackedTask> {
        self.inner.store.get(task_id)
    }

    pub fn task_by_handle(&self, handle: &ContextHandle) -> Option<TrackedTask> {
        self.inner.store.get_by_handle(handle)
    }

    pub fn running_count(&self) -> usize {
        self.inner.store.running_count()
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.inner.admission
    }

    pub fn quality(&self) -> &RoutingEngine {
        &self.inner.quality
    }

    pub fn context_store(&self) -> &ContextStore {
        &self.inner.context
    }

    pub fn store(&self) -> &TaskStore {
        &self.inner.store
    }

    // === Lifecycle signals (idempotent) ===

    /// A sub-step was observed in the execution context.
    pub fn on_progress(&self, handle: &ContextHandle, tool: &str, text: Option<&str>) {
        let Some(task) = self.inner.store.get_by_handle(handle) else {
            return;
        };
        if !task.is_running() {
            return;
        }
        self.inner.store.update(&task.id, |t| {
            t.progress.tool_calls += 1;
            t.progress.last_tool = Some(tool.to_string());
            if let Some(text) = text {
                t.progress.last_text = Some(text.to_string());
            }
            t.progress.last_activity_at = Some(chrono::Utc::now());
        });
    }

    /// The execution context went idle: candidate completion, deferred
    /// while the checklist read-back still reports incomplete items.
    pub async fn on_idle(&self, handle: &ContextHandle) {
        let Some(task) = self.inner.store.get_by_handle(handle) else {
            return;
        };
        if !task.is_running() {
            return;
        }
        self.try_complete(&task).await;
    }

    /// The execution context was deleted out from under the task: force
    /// cancellation and remove immediately, skipping notification delivery.
    pub fn on_deleted(&self, handle: &ContextHandle) {
        let Some(task) = self.inner.store.get_by_handle(handle) else {
            return;
        };
        warn!(task_id = %task.id, handle = %handle, "Execution context deleted");
        self.purge_task(&task.id, TaskStatus::Cancelled, "execution context deleted");
    }

    pub(crate) async fn try_complete(&self, task: &TrackedTask) {
        match self.inner.host.incomplete_items(&task.execution_handle).await {
            Ok(0) => {
                info!(task_id = %task.id, "Task completed");
                self.finalize_task(&task.id, TaskStatus::Completed, None);
            }
            Ok(remaining) => {
                debug!(
                    task_id = %task.id,
                    remaining,
                    "Completion deferred; checklist incomplete"
                );
            }
            Err(e) => {
                debug!(task_id = %task.id, error = %e, "Checklist read-back failed; deferring");
            }
        }
    }

    // === Quality routing glue ===

    /// Feed a finished task's output through the artifact extractor and the
    /// routing engine. Returns `None` when the output carries no quality
    /// signals; proceeding without a directive is the normal case.
    pub fn route_output(
        &self,
        session_id: &str,
        agent_type: &str,
        task_description: &str,
        output: &str,
        resume_handle: Option<&ContextHandle>,
    ) -> Option<RoutingDirective> {
        if let Some(payload) = parse_artifact_block(output) {
            self.inner
                .context
                .add_artifact(session_id, agent_type, task_description, payload);
        }

        let assessment = self.inner.quality.assess(agent_type, output)?;
        let mut directive = self.inner.quality.route(session_id, &assessment, resume_handle);

        // Routed follow-ups build on prior results instead of re-deriving
        // them.
        if directive.next_stage.is_some()
            && let Some(summary) = self.inner.context.build_context_summary(session_id)
        {
            directive.message.push_str("\n\n");
            directive.message.push_str(&summary);
        }
        Some(directive)
    }

    /// Tear down per-session state: rewrite budgets and stored artifacts.
    pub fn end_session(&self, session_id: &str) {
        self.inner.quality.end_session(session_id);
        self.inner.context.end_session(session_id);
    }

    // === Internals ===

    fn spawn_dispatch(&self, task_id: String, handle: ContextHandle, prompt: String) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.inner.host.dispatch_prompt(&handle, &prompt).await {
                warn!(task_id = %task_id, error = %e, "Dispatch failed");
                this.finalize_task(&task_id, TaskStatus::Error, Some(e.to_string()));
            }
        });
    }

    /// Force-remove a task: best-effort terminal transition, admission
    /// release, record and notification purge. No delivery.
    pub(crate) fn purge_task(&self, task_id: &str, status: TaskStatus, reason: &str) {
        self.inner
            .store
            .finalize(task_id, status, Some(reason.to_string()));
        if let Some(task) = self.inner.store.remove(task_id)
            && let Some(key) = task.admission_key
        {
            self.inner.admission.release(&key);
        }
        self.inner.store.remove_notifications_for_task(task_id);
    }
}

pub(crate) fn admission_key_of(task: &TrackedTask) -> String {
    task.admission_key.clone().unwrap_or_else(|| {
        task.originating_model
            .clone()
            .unwrap_or_else(|| task.agent_identity.clone())
    })
}

fn render_status(task: &TrackedTask) -> String {
    match task.status {
        TaskStatus::Running => {
            let mut line = format!(
                "Task {} ({}): running, {} tool calls",
                task.id, task.agent_identity, task.progress.tool_calls
            );
            if let Some(tool) = &task.progress.last_tool {
                line.push_str(&format!(", last tool {}", tool));
            }
            if let Some(text) = &task.progress.last_text {
                line.push_str(&format!(" - {}", text));
            }
            line
        }
        status => {
            let duration = task
                .completed_at
                .map(|done| done.signed_duration_since(task.started_at).num_seconds())
                .unwrap_or(0);
            let mut line = format!(
                "Task {} ({}): {} after {}s, {} tool calls",
                task.id,
                task.agent_identity,
                status.as_str(),
                duration,
                task.progress.tool_calls
            );
            if let Some(error) = &task.error {
                line.push_str(&format!(" - {}", error));
            }
            line
        }
    }
}
