//! Run Manager: at-most-one live run per workflow name, cooperative
//! cancellation.
//!
//! A single mutex-protected map is the serialization point; each entry
//! pairs a `CancellationToken` (the cancel signal the executor selects on)
//! with a completion flag the owning run sets on every exit path.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

struct Slot {
    cancel: CancellationToken,
    done: bool,
}

/// Tracks the currently executing run per workflow name.
#[derive(Clone, Default)]
pub struct RunManager {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl RunManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new live run under `name`. Succeeds (returning the
    /// `CancellationToken` to pass into the executor) iff no live task is
    /// already registered under that name.
    pub async fn register(&self, name: &str) -> Option<CancellationToken> {
        let mut slots = self.slots.lock().await;
        if let Some(existing) = slots.get(name) {
            if !existing.done {
                return None;
            }
        }
        let cancel = CancellationToken::new();
        slots.insert(
            name.to_string(),
            Slot {
                cancel: cancel.clone(),
                done: false,
            },
        );
        Some(cancel)
    }

    /// Mark the run under `name` finished. Idempotent; call this in a
    /// scope that fires on every exit path (success, failure, cancel).
    pub async fn unregister(&self, name: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(name) {
            slot.done = true;
        }
    }

    pub async fn is_running(&self, name: &str) -> bool {
        let slots = self.slots.lock().await;
        slots.get(name).is_some_and(|s| !s.done)
    }

    /// Signal cancellation to the live task registered under `name`.
    /// Returns `true` iff a live task was found and signalled.
    pub async fn cancel(&self, name: &str) -> bool {
        let slots = self.slots.lock().await;
        match slots.get(name) {
            Some(slot) if !slot.done => {
                slot.cancel.cancel();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_rejects_when_already_running() {
        let manager = RunManager::new();
        assert!(manager.register("wf").await.is_some());
        assert!(manager.register("wf").await.is_none());
    }

    #[tokio::test]
    async fn register_succeeds_again_after_unregister() {
        let manager = RunManager::new();
        manager.register("wf").await.unwrap();
        manager.unregister("wf").await;
        assert!(manager.register("wf").await.is_some());
    }

    #[tokio::test]
    async fn is_running_reflects_state() {
        let manager = RunManager::new();
        assert!(!manager.is_running("wf").await);
        manager.register("wf").await.unwrap();
        assert!(manager.is_running("wf").await);
        manager.unregister("wf").await;
        assert!(!manager.is_running("wf").await);
    }

    #[tokio::test]
    async fn cancel_signals_token_and_reports_absent_when_not_running() {
        let manager = RunManager::new();
        assert!(!manager.cancel("wf").await);

        let token = manager.register("wf").await.unwrap();
        assert!(manager.cancel("wf").await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let manager = RunManager::new();
        manager.unregister("never-registered").await;
        manager.register("wf").await.unwrap();
        manager.unregister("wf").await;
        manager.unregister("wf").await;
        assert!(!manager.is_running("wf").await);
    }
}
