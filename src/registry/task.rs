//! Canonical records for delegated work items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::host::ContextHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states never revert without an explicit resume.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Observed execution progress, accumulated from lifecycle signals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskProgress {
    /// Count of observed sub-steps (tool invocations).
    pub tool_calls: u32,
    /// Name of the last observed sub-step.
    pub last_tool: Option<String>,
    /// Last observed free-text fragment from the context.
    pub last_text: Option<String>,
    /// When the last signal arrived.
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// A tracked unit of delegated work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedTask {
    pub id: String,
    pub execution_handle: ContextHandle,
    pub parent_handle: ContextHandle,
    pub parent_request_id: Option<String>,
    pub description: String,
    pub prompt: String,
    pub agent_identity: String,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Concurrency bucket currently held; absent once released.
    pub admission_key: Option<String>,
    pub progress: TaskProgress,
    pub originating_model: Option<String>,
    pub originating_agent: Option<String>,
}

impl TrackedTask {
    pub fn new(spec: &LaunchSpec, execution_handle: ContextHandle, admission_key: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_handle,
            parent_handle: spec.parent_handle.clone(),
            parent_request_id: spec.parent_request_id.clone(),
            description: spec.description.clone(),
            prompt: spec.prompt.clone(),
            agent_identity: spec.agent_identity.clone(),
            status: TaskStatus::Running,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            admission_key: Some(admission_key),
            progress: TaskProgress::default(),
            originating_model: spec.model.clone(),
            originating_agent: spec.originating_agent.clone(),
        }
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.started_at)
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }
}

/// Request to launch a new delegated task.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub description: String,
    pub prompt: String,
    pub agent_identity: String,
    pub parent_handle: ContextHandle,
    pub parent_request_id: Option<String>,
    pub model: Option<String>,
    pub originating_agent: Option<String>,
}

impl LaunchSpec {
    pub fn new(
        description: impl Into<String>,
        prompt: impl Into<String>,
        agent_identity: impl Into<String>,
        parent_handle: ContextHandle,
    ) -> Self {
        Self {
            description: description.into(),
            prompt: prompt.into(),
            agent_identity: agent_identity.into(),
            parent_handle,
            parent_request_id: None,
            model: None,
            originating_agent: None,
        }
    }

    pub fn with_parent_request(mut self, request_id: impl Into<String>) -> Self {
        self.parent_request_id = Some(request_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_originating_agent(mut self, agent: impl Into<String>) -> Self {
        self.originating_agent = Some(agent.into());
        self
    }

    /// Bucket this launch is admitted under: the named model when present,
    /// otherwise the agent identity.
    pub fn admission_key(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.agent_identity.clone())
    }
}

/// Request to reopen an existing execution context.
#[derive(Debug, Clone)]
pub struct ResumeSpec {
    pub execution_handle: ContextHandle,
    pub prompt: String,
    pub parent_handle: ContextHandle,
    pub parent_request_id: Option<String>,
}

impl ResumeSpec {
    pub fn new(
        execution_handle: ContextHandle,
        prompt: impl Into<String>,
        parent_handle: ContextHandle,
    ) -> Self {
        Self {
            execution_handle,
            prompt: prompt.into(),
            parent_handle,
            parent_request_id: None,
        }
    }

    pub fn with_parent_request(mut self, request_id: impl Into<String>) -> Self {
        self.parent_request_id = Some(request_id.into());
        self
    }
}

/// A queued "task finished" message awaiting delivery to a parent context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingNotification {
    pub task_id: String,
    pub parent_handle: ContextHandle,
    pub message: String,
    pub queued_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_admission_key_prefers_model() {
        let spec = LaunchSpec::new("d", "p", "researcher", ContextHandle::from("parent"))
            .with_model("anthropic/sonnet");
        assert_eq!(spec.admission_key(), "anthropic/sonnet");

        let spec = LaunchSpec::new("d", "p", "researcher", ContextHandle::from("parent"));
        assert_eq!(spec.admission_key(), "researcher");
    }

    #[test]
    fn test_new_task_starts_running_with_hold() {
        let spec = LaunchSpec::new("index docs", "go", "archivist", ContextHandle::from("parent"));
        let task = TrackedTask::new(&spec, ContextHandle::from("ctx-1"), spec.admission_key());

        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.admission_key.as_deref(), Some("archivist"));
        assert_eq!(task.progress.tool_calls, 0);
        assert!(task.completed_at.is_none());
    }
}
