use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use ts_rs::TS;

use crate::draft::DraftStore;
use crate::preference::{LoadOutcome, PreferenceStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

/// Signal value. `generation` advances on every effective change, so an
/// observer that missed intermediate values can still tell that the session
/// was replaced even when the identity looks the same.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub identity: Option<Identity>,
}

/// Current authenticated identity, as reported by the auth collaborator.
#[derive(Clone)]
pub struct SessionSignal {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for SessionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().identity.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn sign_in(&self, identity: Identity) {
        self.tx.send_if_modified(|current| {
            if current.identity.as_ref() == Some(&identity) {
                return false;
            }
            current.generation += 1;
            current.identity = Some(identity);
            true
        });
    }

    pub fn sign_out(&self) {
        self.tx.send_if_modified(|current| {
            if current.identity.take().is_none() {
                return false;
            }
            current.generation += 1;
            true
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Acquired,
    Lost,
    /// A different user replaced the previous one without a sign-out between.
    Switched,
    /// Same observed identity, but the session was dropped and re-established
    /// in between.
    Restarted,
    Unchanged,
}

pub fn classify(previous: &SessionSnapshot, next: &SessionSnapshot) -> Transition {
    let replaced = previous.generation != next.generation;
    match (previous.identity.as_ref(), next.identity.as_ref()) {
        (None, Some(_)) => Transition::Acquired,
        (Some(_), None) => Transition::Lost,
        (Some(prev), Some(next)) if prev.user_id != next.user_id => Transition::Switched,
        (Some(_), Some(_)) if replaced => Transition::Restarted,
        // Signed in and out again between observations.
        (None, None) if replaced => Transition::Lost,
        _ => Transition::Unchanged,
    }
}

/// Routes identity transitions to the stores that depend on them.
#[derive(Clone)]
pub struct SessionCoordinator {
    preferences: PreferenceStore,
    draft: DraftStore,
}

impl SessionCoordinator {
    pub fn new(preferences: PreferenceStore, draft: DraftStore) -> Self {
        Self { preferences, draft }
    }

    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    pub fn draft(&self) -> &DraftStore {
        &self.draft
    }

    fn on_lost(&self) {
        self.preferences.identity_lost();
        self.draft.reset_form();
    }

    /// Applies the transition from `previous` to `next`. Returns the load
    /// task started for an acquired identity, if any.
    pub fn apply(
        &self,
        previous: &SessionSnapshot,
        next: &SessionSnapshot,
    ) -> Option<JoinHandle<LoadOutcome>> {
        let transition = classify(previous, next);
        debug!(
            target: "hearth",
            event = "session_transition",
            transition = ?transition,
            generation = next.generation
        );
        match transition {
            Transition::Acquired => Some(tokio::spawn(self.preferences.identity_acquired())),
            Transition::Lost => {
                self.on_lost();
                None
            }
            Transition::Switched | Transition::Restarted => {
                self.on_lost();
                Some(tokio::spawn(self.preferences.identity_acquired()))
            }
            Transition::Unchanged => None,
        }
    }

    /// Follows `signal` until every sender is gone. The identity present at
    /// spawn time is treated as freshly acquired.
    pub fn spawn(self, signal: &SessionSignal) -> JoinHandle<()> {
        let mut rx = signal.subscribe();
        tokio::spawn(async move {
            let mut previous = rx.borrow_and_update().clone();
            if previous.identity.is_some() {
                self.apply(&SessionSnapshot::default(), &previous);
            }
            while rx.changed().await.is_ok() {
                let next = rx.borrow_and_update().clone();
                self.apply(&previous, &next);
                previous = next;
            }
            info!(target: "hearth", event = "session_signal_closed");
        })
    }
}
