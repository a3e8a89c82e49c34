//! Seam to the host that actually runs delegated work.
//!
//! Everything the orchestrator knows about remote execution goes through
//! [`ExecutionHost`]: context creation, prompt dispatch, status/checklist
//! read-back, abort, and message delivery. The host's wire protocol, session
//! transport, and agent personas live behind this trait.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque reference to a host-managed execution context (e.g. a remote
/// session id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextHandle(String);

impl ContextHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coarse activity state of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextActivity {
    Idle,
    Working,
}

/// External execution collaborator consumed by the orchestrator.
///
/// All operations are best-effort from the orchestrator's point of view:
/// dispatch and abort are fire-and-forget at the call site, and delivery
/// failures are logged rather than retried.
#[async_trait]
pub trait ExecutionHost: Send + Sync {
    /// Create a fresh execution context for the given specialist identity.
    async fn create_context(&self, agent_identity: &str, description: &str)
    -> Result<ContextHandle>;

    /// Send a prompt into a context. The host reports failure here even
    /// though execution itself continues asynchronously.
    async fn dispatch_prompt(&self, handle: &ContextHandle, prompt: &str) -> Result<()>;

    /// Read the context's current activity state.
    async fn context_status(&self, handle: &ContextHandle) -> Result<ContextActivity>;

    /// Number of incomplete checklist items the context still reports.
    /// Gates premature completion on idle signals.
    async fn incomplete_items(&self, handle: &ContextHandle) -> Result<usize>;

    /// Ask the host to abort a context. Callers do not wait for the abort
    /// to confirm.
    async fn abort_context(&self, handle: &ContextHandle);

    /// Deliver a message to a context (completion notices, routing
    /// follow-ups). May hang or fail if the target context is busy.
    async fn deliver_message(&self, handle: &ContextHandle, message: &str) -> Result<()>;
}
