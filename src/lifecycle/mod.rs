//! Host application foreground/background lifecycle
//!
//! The session does not reach into any host API. It is handed a
//! [`LifecycleSource`] and attaches a listener for as long as it runs.
//! [`LifecycleBridge`] turns the raw signal stream into "returned to
//! foreground" edges.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Host-reported lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleSignal {
    Active,
    Inactive,
    Background,
}

impl LifecycleSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleSignal::Active => "active",
            LifecycleSignal::Inactive => "inactive",
            LifecycleSignal::Background => "background",
        }
    }
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown lifecycle signal: {0}")]
pub struct UnknownSignal(pub String);

impl FromStr for LifecycleSignal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LifecycleSignal::Active),
            "inactive" => Ok(LifecycleSignal::Inactive),
            "background" => Ok(LifecycleSignal::Background),
            other => Err(UnknownSignal(other.to_string())),
        }
    }
}

/// Callback invoked on every host transition
pub type LifecycleListener = Arc<dyn Fn(LifecycleSignal) + Send + Sync>;

/// Handle returned by [`LifecycleSource::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Source of host lifecycle transitions
pub trait LifecycleSource: Send + Sync + 'static {
    /// Most recently reported signal
    fn current(&self) -> LifecycleSignal;

    fn subscribe(&self, listener: LifecycleListener) -> ListenerId;

    /// Remove a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);
}

/// Attached listener; unsubscribes when dropped
pub struct LifecycleSubscription {
    source: Arc<dyn LifecycleSource>,
    id: Option<ListenerId>,
}

impl LifecycleSubscription {
    pub fn attach(source: Arc<dyn LifecycleSource>, listener: LifecycleListener) -> Self {
        let id = source.subscribe(listener);
        debug!(listener = id.0, "Attached lifecycle listener");
        Self {
            source,
            id: Some(id),
        }
    }

    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    /// Detach now instead of at drop
    pub fn detach(&mut self) {
        if let Some(id) = self.id.take() {
            self.source.unsubscribe(id);
            debug!(listener = id.0, "Detached lifecycle listener");
        }
    }
}

impl Drop for LifecycleSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for LifecycleSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

struct HostState {
    current: LifecycleSignal,
    listeners: HashMap<ListenerId, LifecycleListener>,
}

/// In-process lifecycle source driven by [`HostLifecycle::notify`]
pub struct HostLifecycle {
    state: Mutex<HostState>,
    next_id: AtomicU64,
}

impl HostLifecycle {
    pub fn new(initial: LifecycleSignal) -> Self {
        Self {
            state: Mutex::new(HostState {
                current: initial,
                listeners: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Record a transition and deliver it to every listener
    pub fn notify(&self, signal: LifecycleSignal) {
        // Listeners run outside the lock so they may unsubscribe themselves
        let listeners: Vec<LifecycleListener> = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.current = signal;
            state.listeners.values().cloned().collect()
        };

        debug!(%signal, listeners = listeners.len(), "Host lifecycle transition");
        for listener in listeners {
            listener(signal);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

impl Default for HostLifecycle {
    fn default() -> Self {
        Self::new(LifecycleSignal::Active)
    }
}

impl LifecycleSource for HostLifecycle {
    fn current(&self) -> LifecycleSignal {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
    }

    fn subscribe(&self, listener: LifecycleListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .insert(id, listener);
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .remove(&id);
    }
}

/// Detects inactive/background to active edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleBridge {
    previous: LifecycleSignal,
}

impl LifecycleBridge {
    pub fn new(initial: LifecycleSignal) -> Self {
        Self { previous: initial }
    }

    pub fn previous(&self) -> LifecycleSignal {
        self.previous
    }

    /// Record `next`. Returns true when the host has just returned to the foreground.
    pub fn on_signal(&mut self, next: LifecycleSignal) -> bool {
        let returned = matches!(
            self.previous,
            LifecycleSignal::Inactive | LifecycleSignal::Background
        ) && next == LifecycleSignal::Active;
        self.previous = next;
        returned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_signal_parsing() {
        assert_eq!("active".parse(), Ok(LifecycleSignal::Active));
        assert_eq!("inactive".parse(), Ok(LifecycleSignal::Inactive));
        assert_eq!("background".parse(), Ok(LifecycleSignal::Background));
        assert_eq!(
            "foreground".parse::<LifecycleSignal>(),
            Err(UnknownSignal("foreground".to_string()))
        );
        assert!("Active".parse::<LifecycleSignal>().is_err());
    }

    #[test]
    fn test_signal_serde_lowercase() {
        let json = serde_json::to_string(&LifecycleSignal::Background).unwrap();
        assert_eq!(json, "\"background\"");
    }

    #[test]
    fn test_bridge_background_then_active_fires_once() {
        let mut bridge = LifecycleBridge::new(LifecycleSignal::Active);

        assert!(!bridge.on_signal(LifecycleSignal::Background));
        assert!(bridge.on_signal(LifecycleSignal::Active));
        assert!(!bridge.on_signal(LifecycleSignal::Active));
    }

    #[test]
    fn test_bridge_active_active_never_fires() {
        let mut bridge = LifecycleBridge::new(LifecycleSignal::Active);
        assert!(!bridge.on_signal(LifecycleSignal::Active));
        assert!(!bridge.on_signal(LifecycleSignal::Active));
    }

    #[test]
    fn test_bridge_records_every_signal() {
        let mut bridge = LifecycleBridge::new(LifecycleSignal::Active);

        bridge.on_signal(LifecycleSignal::Inactive);
        assert_eq!(bridge.previous(), LifecycleSignal::Inactive);
        bridge.on_signal(LifecycleSignal::Background);
        assert_eq!(bridge.previous(), LifecycleSignal::Background);
        assert!(bridge.on_signal(LifecycleSignal::Active));
        assert_eq!(bridge.previous(), LifecycleSignal::Active);
    }

    #[test]
    fn test_host_lifecycle_delivers_and_records() {
        let host = HostLifecycle::default();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let id = host.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        host.notify(LifecycleSignal::Background);

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(host.current(), LifecycleSignal::Background);

        host.unsubscribe(id);
        host.notify(LifecycleSignal::Active);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_guard_detaches_on_drop() {
        let host = Arc::new(HostLifecycle::default());

        {
            let subscription = LifecycleSubscription::attach(host.clone(), Arc::new(|_| {}));
            assert!(subscription.id().is_some());
            assert_eq!(host.listener_count(), 1);
        }

        assert_eq!(host.listener_count(), 0);
    }

    #[test]
    fn test_explicit_detach_is_idempotent() {
        let host = Arc::new(HostLifecycle::default());
        let mut subscription = LifecycleSubscription::attach(host.clone(), Arc::new(|_| {}));

        subscription.detach();
        subscription.detach();

        assert_eq!(host.listener_count(), 0);
        assert!(subscription.id().is_none());
    }
}
