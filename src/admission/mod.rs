//! Keyed concurrency admission with FIFO waiter handoff.
//!
//! Each admission key (an agent/model/provider identity) is an independent
//! bucket. `acquire` suspends until a slot frees; `release` hands the slot
//! directly to the longest-waiting caller so no slot goes idle between a
//! release and the next acquire.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::AdmissionConfig;

#[derive(Default)]
struct KeyState {
    active: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Counting semaphore over admission keys.
///
/// Exhausting one key never blocks another. Releasing a key with no
/// outstanding holds is a no-op: the count saturates at zero.
pub struct AdmissionController {
    config: AdmissionConfig,
    keys: Mutex<HashMap<String, KeyState>>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the capacity for a key: model-level limit, then
    /// provider-level limit (the prefix before `/`), then the default.
    pub fn limit_for(&self, key: &str) -> usize {
        if let Some(limit) = self.config.model_limits.get(key) {
            return *limit;
        }
        if let Some((provider, _)) = key.split_once('/')
            && let Some(limit) = self.config.provider_limits.get(provider)
        {
            return *limit;
        }
        self.config.default_limit
    }

    /// Wait for a slot under `key`. Resolves immediately when the bucket
    /// has spare capacity, otherwise suspends until a holder releases.
    pub async fn acquire(&self, key: &str) {
        let rx = {
            let mut keys = self.keys.lock();
            let limit = self.limit_for(key);
            let state = keys.entry(key.to_string()).or_default();
            if state.active < limit {
                state.active += 1;
                debug!(key, active = state.active, limit, "Admission granted");
                return;
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!(key, waiting = state.waiters.len(), limit, "Admission queued");
            rx
        };
        // The sender is only dropped when a handoff raced with this future
        // being cancelled elsewhere; treat closure as a grant so a shutdown
        // never wedges callers.
        let _ = rx.await;
    }

    /// Free one slot under `key`. With queued waiters the slot transfers
    /// directly to the oldest live one; otherwise the active count drops,
    /// saturating at zero.
    pub fn release(&self, key: &str) {
        let mut keys = self.keys.lock();
        let Some(state) = keys.get_mut(key) else {
            return;
        };

        // Waiters whose acquire future was dropped fail the send; skip them.
        while let Some(tx) = state.waiters.pop_front() {
            if tx.send(()).is_ok() {
                debug!(key, active = state.active, "Admission handed to waiter");
                return;
            }
        }

        state.active = state.active.saturating_sub(1);
        debug!(key, active = state.active, "Admission released");
        if state.active == 0 && state.waiters.is_empty() {
            keys.remove(key);
        }
    }

    /// Current holders under `key`.
    pub fn active(&self, key: &str) -> usize {
        self.keys.lock().get(key).map_or(0, |s| s.active)
    }

    /// Callers currently queued under `key`.
    pub fn waiting(&self, key: &str) -> usize {
        self.keys.lock().get(key).map_or(0, |s| s.waiters.len())
    }
}
