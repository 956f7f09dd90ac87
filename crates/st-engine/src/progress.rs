//! Progress observers for engine commands.
//!
//! Listeners register through [`ProgressListeners::subscribe`] and receive a
//! token; dropping interest is an explicit [`ProgressListeners::unsubscribe`]
//! so separate runs (or tests) never share a mutable global callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

type Listener = Arc<dyn Fn(f64) + Send + Sync>;

/// Token returned by [`ProgressListeners::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A set of progress listeners.
#[derive(Default)]
pub struct ProgressListeners {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl ProgressListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: impl Fn(f64) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if the token was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Deliver a progress value to every listener, clamped into `[0, 1]`.
    /// Non-finite values are dropped.
    pub fn emit(&self, progress: f64) {
        if !progress.is_finite() {
            return;
        }
        let value = progress.clamp(0.0, 1.0);

        // Snapshot so listeners may (un)subscribe without deadlocking.
        let snapshot: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }
}

impl std::fmt::Debug for ProgressListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressListeners")
            .field("listeners", &self.len())
            .finish()
    }
}
