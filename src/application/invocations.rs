//! # Invocation Registry
//!
//! Tracks in-flight commands by invocation id (the chat event id of the command message) so the
//! chat transport can cancel one when its message is redacted, or all of them on shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Fires once when an invocation is cancelled. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves when cancellation is requested; pends forever otherwise.
    pub async fn cancelled(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

/// Standalone trigger for a `CancelSignal`, for callers outside the registry.
pub fn cancel_pair() -> (watch::Sender<bool>, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (tx, CancelSignal { rx: Some(rx) })
}

#[derive(Debug, Default)]
struct RegistryState {
    active: HashMap<String, watch::Sender<bool>>,
    shutting_down: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InvocationRegistry {
    state: Arc<Mutex<RegistryState>>,
}

/// Removes its invocation from the registry when dropped.
#[derive(Debug)]
pub struct InvocationGuard {
    id: String,
    registry: InvocationRegistry,
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        self.registry.lock().active.remove(&self.id);
    }
}

impl InvocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A panic while holding the lock cannot leave the map inconsistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `id`. During shutdown the returned signal has already fired.
    pub fn register(&self, id: &str) -> (CancelSignal, InvocationGuard) {
        let (tx, signal) = cancel_pair();
        {
            let mut state = self.lock();
            if state.shutting_down {
                let _ = tx.send(true);
            }
            state.active.insert(id.to_string(), tx);
        }
        let guard = InvocationGuard {
            id: id.to_string(),
            registry: self.clone(),
        };
        (signal, guard)
    }

    /// Returns whether `id` was in flight.
    pub fn cancel(&self, id: &str) -> bool {
        match self.lock().active.get(id) {
            Some(tx) => {
                let _ = tx.send(true);
                true
            }
            None => false,
        }
    }

    /// Cancels everything in flight and everything registered from now on.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.lock();
        state.shutting_down = true;
        for tx in state.active.values() {
            let _ = tx.send(true);
        }
        state.active.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_fires_signal() {
        let registry = InvocationRegistry::new();
        let (mut signal, _guard) = registry.register("$event1");
        assert!(!signal.is_cancelled());
        assert!(registry.cancel("$event1"));
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .unwrap();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_guard_unregisters() {
        let registry = InvocationRegistry::new();
        let (_signal, guard) = registry.register("$event1");
        assert_eq!(registry.in_flight(), 1);
        drop(guard);
        assert_eq!(registry.in_flight(), 0);
        assert!(!registry.cancel("$event1"));
    }

    #[test]
    fn test_shutdown_cancels_current_and_future() {
        let registry = InvocationRegistry::new();
        let (before, _g1) = registry.register("a");
        assert_eq!(registry.cancel_all(), 1);
        assert!(before.is_cancelled());

        let (after, _g2) = registry.register("b");
        assert!(after.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_signal_pends() {
        let mut signal = CancelSignal::never();
        let res = tokio::time::timeout(Duration::from_millis(10), signal.cancelled()).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_dropped_sender_never_fires() {
        let (tx, mut signal) = cancel_pair();
        drop(tx);
        let res = tokio::time::timeout(Duration::from_millis(10), signal.cancelled()).await;
        assert!(res.is_err());
    }
}
