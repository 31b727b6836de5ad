//! Observable state store backed by a tokio `watch` channel
//!
//! Consumers hold a [`watch::Receiver`] and are notified on every change.
//! Once sealed the store drops all further updates.

use super::snapshot::{SessionSnapshot, SessionUpdate};
use super::state_machine::StateMachine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Observable snapshot store. Sealed once the session shuts down.
pub struct StateStore {
    tx: watch::Sender<SessionSnapshot>,
    sealed: Arc<AtomicBool>,
}

impl StateStore {
    pub fn new(initial: SessionSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            sealed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Current snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Apply an update and publish the result.
    ///
    /// Returns `false` when the store is sealed or the update changed nothing.
    pub fn apply(&self, update: SessionUpdate) -> bool {
        // Read-modify-write happens under the channel's write lock
        self.tx.send_if_modified(|current| {
            if self.is_sealed() {
                return false;
            }
            let next = current.apply(update);
            if next == *current {
                return false;
            }
            StateMachine::log_state_transition(current.connection_state, next.connection_state);
            *current = next;
            true
        })
    }

    /// Stop accepting updates. Irreversible.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }
}
