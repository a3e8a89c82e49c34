//! Shared mock of the external execution host.
#![allow(dead_code)] // each test binary uses a different subset

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use task_pilot::{
    ContextActivity, ContextHandle, ExecutionHost, Result, TaskPilotConfig, TaskPilotError,
};

#[derive(Default)]
struct MockHostInner {
    next_ctx: usize,
    created: Vec<String>,
    dispatched: Vec<(String, String)>,
    delivered: Vec<(String, String)>,
    aborted: Vec<String>,
    statuses: HashMap<String, ContextActivity>,
    incomplete: HashMap<String, usize>,
}

/// Scriptable [`ExecutionHost`]: contexts are minted sequentially, every
/// call is recorded, and failure/hang behavior is toggled per test.
#[derive(Default)]
pub struct MockHost {
    inner: Mutex<MockHostInner>,
    fail_create: AtomicBool,
    fail_dispatch: AtomicBool,
    fail_deliver: AtomicBool,
    hang_deliver: AtomicBool,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_dispatch(&self) {
        self.fail_dispatch.store(true, Ordering::SeqCst);
    }

    pub fn fail_deliver(&self) {
        self.fail_deliver.store(true, Ordering::SeqCst);
    }

    /// Make every delivery attempt block forever.
    pub fn hang_deliver(&self) {
        self.hang_deliver.store(true, Ordering::SeqCst);
    }

    pub fn set_status(&self, handle: &ContextHandle, activity: ContextActivity) {
        self.inner
            .lock()
            .statuses
            .insert(handle.as_str().to_string(), activity);
    }

    pub fn set_incomplete(&self, handle: &ContextHandle, remaining: usize) {
        self.inner
            .lock()
            .incomplete
            .insert(handle.as_str().to_string(), remaining);
    }

    pub fn created(&self) -> Vec<String> {
        self.inner.lock().created.clone()
    }

    pub fn dispatched(&self) -> Vec<(String, String)> {
        self.inner.lock().dispatched.clone()
    }

    pub fn delivered(&self) -> Vec<(String, String)> {
        self.inner.lock().delivered.clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.inner.lock().aborted.clone()
    }
}

#[async_trait]
impl ExecutionHost for MockHost {
    async fn create_context(&self, _agent_identity: &str, _description: &str) -> Result<ContextHandle> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TaskPilotError::Dispatch("context creation refused".to_string()));
        }
        let mut inner = self.inner.lock();
        let id = format!("ctx-{}", inner.next_ctx);
        inner.next_ctx += 1;
        inner.created.push(id.clone());
        Ok(ContextHandle::new(id))
    }

    async fn dispatch_prompt(&self, handle: &ContextHandle, prompt: &str) -> Result<()> {
        if self.fail_dispatch.load(Ordering::SeqCst) {
            return Err(TaskPilotError::Dispatch("prompt rejected".to_string()));
        }
        self.inner
            .lock()
            .dispatched
            .push((handle.as_str().to_string(), prompt.to_string()));
        Ok(())
    }

    async fn context_status(&self, handle: &ContextHandle) -> Result<ContextActivity> {
        Ok(self
            .inner
            .lock()
            .statuses
            .get(handle.as_str())
            .copied()
            .unwrap_or(ContextActivity::Working))
    }

    async fn incomplete_items(&self, handle: &ContextHandle) -> Result<usize> {
        Ok(self
            .inner
            .lock()
            .incomplete
            .get(handle.as_str())
            .copied()
            .unwrap_or(0))
    }

    async fn abort_context(&self, handle: &ContextHandle) {
        self.inner.lock().aborted.push(handle.as_str().to_string());
    }

    async fn deliver_message(&self, handle: &ContextHandle, message: &str) -> Result<()> {
        if self.hang_deliver.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_deliver.load(Ordering::SeqCst) {
            return Err(TaskPilotError::Delivery("parent context busy".to_string()));
        }
        self.inner
            .lock()
            .delivered
            .push((handle.as_str().to_string(), message.to_string()));
        Ok(())
    }
}

/// Enable log output for a test run. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Config tuned for tests: fast sweep, fast delivery, generous admission.
pub fn test_config() -> TaskPilotConfig {
    let mut config = TaskPilotConfig::default();
    config.admission.default_limit = 8;
    config.lifecycle.sweep_interval_secs = 1;
    config.lifecycle.reap_cooldown_secs = 0;
    config.notification.delivery_grace_ms = 20;
    config
}
