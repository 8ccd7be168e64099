//! Theme preference scoped to the signed-in identity.
//!
//! The in-memory mode is authoritative for the session. Durable storage is
//! consulted when an identity becomes active and written while one is
//! active; storage failures are logged and never reach the caller.
//!
//! Every identity transition advances an epoch. A load started under one
//! epoch is dropped if the epoch has moved on by the time it completes, and
//! also if the user picked a mode in the meantime.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::storage::{PreferenceStorage, StoreHandle};

/// Single device-wide key. Not namespaced by user: whoever signs in next on
/// this device inherits the stored value.
pub const THEME_STORAGE_KEY: &str = "@app_theme_mode";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
            ThemeMode::System => "system",
        }
    }

    /// Parses a persisted value; anything but the three exact names is rejected.
    pub fn from_stored(raw: &str) -> Option<Self> {
        match raw {
            "light" => Some(ThemeMode::Light),
            "dark" => Some(ThemeMode::Dark),
            "system" => Some(ThemeMode::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PreferenceState {
    pub mode: ThemeMode,
    pub resolved: ColorScheme,
    #[ts(optional)]
    pub platform: Option<ColorScheme>,
}

impl PreferenceState {
    fn resolve(mode: ThemeMode, platform: Option<ColorScheme>) -> ColorScheme {
        match mode {
            ThemeMode::Light => ColorScheme::Light,
            ThemeMode::Dark => ColorScheme::Dark,
            ThemeMode::System => platform.unwrap_or_default(),
        }
    }

    fn apply(&mut self, mode: ThemeMode, platform: Option<ColorScheme>) -> bool {
        let next = PreferenceState {
            mode,
            resolved: Self::resolve(mode, platform),
            platform,
        };
        if *self == next {
            return false;
        }
        *self = next;
        true
    }
}

/// What became of an identity-acquired load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied(ThemeMode),
    /// Nothing stored under the key.
    Missing,
    /// Stored value is not a recognised mode.
    Invalid,
    /// Storage read failed.
    Failed,
    /// The identity changed while the read was in flight.
    Stale,
    /// A mode was chosen while the read was in flight.
    Superseded,
}

#[derive(Default)]
struct Session {
    epoch: u64,
    active: bool,
    /// Bumped on every `set_mode`; loads compare against it.
    revision: u64,
    next_write_seq: u64,
}

struct Shared {
    state: watch::Sender<PreferenceState>,
    session: Mutex<Session>,
    /// Sequence number of the newest write handed to storage.
    write_gate: tokio::sync::Mutex<u64>,
    storage: StoreHandle,
}

#[derive(Clone)]
pub struct PreferenceStore {
    shared: Arc<Shared>,
}

fn lock_session(shared: &Shared) -> MutexGuard<'_, Session> {
    shared.session.lock().unwrap_or_else(|e| e.into_inner())
}

impl PreferenceStore {
    pub fn new(storage: StoreHandle) -> Self {
        let (state, _rx) = watch::channel(PreferenceState::default());
        Self {
            shared: Arc::new(Shared {
                state,
                session: Mutex::new(Session::default()),
                write_gate: tokio::sync::Mutex::new(0),
                storage,
            }),
        }
    }

    pub fn snapshot(&self) -> PreferenceState {
        *self.shared.state.borrow()
    }

    pub fn mode(&self) -> ThemeMode {
        self.snapshot().mode
    }

    pub fn resolved(&self) -> ColorScheme {
        self.snapshot().resolved
    }

    pub fn subscribe(&self) -> watch::Receiver<PreferenceState> {
        self.shared.state.subscribe()
    }

    pub fn is_identity_active(&self) -> bool {
        lock_session(&self.shared).active
    }

    pub fn epoch(&self) -> u64 {
        lock_session(&self.shared).epoch
    }

    fn publish_mode(&self, mode: ThemeMode) {
        self.shared.state.send_if_modified(|state| {
            let platform = state.platform;
            state.apply(mode, platform)
        });
    }

    /// Reported by the platform whenever its color scheme changes.
    pub fn set_platform_scheme(&self, platform: Option<ColorScheme>) {
        self.shared.state.send_if_modified(|state| {
            let mode = state.mode;
            state.apply(mode, platform)
        });
    }

    /// Applies `mode` immediately. The returned future persists it if an
    /// identity was active at call time; awaiting it is optional.
    pub fn set_mode(&self, mode: ThemeMode) -> impl Future<Output = ()> + Send + 'static {
        let write_seq = {
            let mut session = lock_session(&self.shared);
            session.revision += 1;
            self.publish_mode(mode);
            if session.active {
                session.next_write_seq += 1;
                Some(session.next_write_seq)
            } else {
                None
            }
        };
        debug!(
            target: "hearth",
            event = "preference_mode_set",
            mode = mode.as_str(),
            persisted = write_seq.is_some()
        );

        let shared = self.shared.clone();
        async move {
            let Some(seq) = write_seq else {
                return;
            };
            let mut newest = shared.write_gate.lock().await;
            if *newest >= seq {
                debug!(
                    target: "hearth",
                    event = "preference_write_superseded",
                    mode = mode.as_str()
                );
                return;
            }
            *newest = seq;
            if let Err(err) = shared.storage.set(THEME_STORAGE_KEY, mode.as_str()).await {
                warn!(
                    target: "hearth",
                    event = "preference_write_failed",
                    mode = mode.as_str(),
                    error = %err
                );
            }
        }
    }

    /// Marks an identity active and returns the load of its stored mode.
    /// The epoch advances before this returns, so a later `identity_lost`
    /// invalidates the load even if the future has not been polled yet.
    pub fn identity_acquired(&self) -> impl Future<Output = LoadOutcome> + Send + 'static {
        let (epoch, revision) = {
            let mut session = lock_session(&self.shared);
            session.epoch += 1;
            session.active = true;
            (session.epoch, session.revision)
        };
        info!(target: "hearth", event = "preference_identity_acquired", epoch);

        let shared = self.shared.clone();
        async move {
            let loaded = shared.storage.get(THEME_STORAGE_KEY).await;

            let session = lock_session(&shared);
            if session.epoch != epoch {
                info!(
                    target: "hearth",
                    event = "preference_load_discarded",
                    epoch,
                    current_epoch = session.epoch
                );
                return LoadOutcome::Stale;
            }
            if session.revision != revision {
                debug!(target: "hearth", event = "preference_load_superseded", epoch);
                return LoadOutcome::Superseded;
            }

            let raw = match loaded {
                Ok(Some(raw)) => raw,
                Ok(None) => return LoadOutcome::Missing,
                Err(err) => {
                    warn!(
                        target: "hearth",
                        event = "preference_load_failed",
                        epoch,
                        error = %err
                    );
                    return LoadOutcome::Failed;
                }
            };
            let Some(mode) = ThemeMode::from_stored(&raw) else {
                warn!(
                    target: "hearth",
                    event = "preference_load_invalid",
                    epoch,
                    value = %raw
                );
                return LoadOutcome::Invalid;
            };

            shared.state.send_if_modified(|state| {
                let platform = state.platform;
                state.apply(mode, platform)
            });
            info!(
                target: "hearth",
                event = "preference_load_applied",
                epoch,
                mode = mode.as_str()
            );
            LoadOutcome::Applied(mode)
        }
    }

    /// Drops back to `System` in memory. Storage is left as it is.
    pub fn identity_lost(&self) {
        let epoch = {
            let mut session = lock_session(&self.shared);
            session.epoch += 1;
            session.active = false;
            self.publish_mode(ThemeMode::System);
            session.epoch
        };
        info!(target: "hearth", event = "preference_identity_lost", epoch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_system_mode_resolving_to_light() {
        let store = PreferenceStore::new(StoreHandle::in_memory());
        assert_eq!(store.mode(), ThemeMode::System);
        assert_eq!(store.resolved(), ColorScheme::Light);
        assert!(!store.is_identity_active());
    }

    #[test]
    fn system_mode_follows_platform_scheme() {
        let store = PreferenceStore::new(StoreHandle::in_memory());
        store.set_platform_scheme(Some(ColorScheme::Dark));
        assert_eq!(store.resolved(), ColorScheme::Dark);

        let _ = store.set_mode(ThemeMode::Light);
        assert_eq!(store.resolved(), ColorScheme::Light);

        let _ = store.set_mode(ThemeMode::System);
        assert_eq!(store.resolved(), ColorScheme::Dark);
        store.set_platform_scheme(None);
        assert_eq!(store.resolved(), ColorScheme::Light);
    }

    #[test]
    fn set_mode_is_visible_before_the_write_runs() {
        let store = PreferenceStore::new(StoreHandle::in_memory());
        let pending = store.set_mode(ThemeMode::Dark);
        assert_eq!(store.mode(), ThemeMode::Dark);
        drop(pending);
        assert_eq!(store.mode(), ThemeMode::Dark);
    }

    #[tokio::test]
    async fn writes_only_while_identity_active() {
        let storage = StoreHandle::in_memory();
        let store = PreferenceStore::new(storage.clone());

        store.set_mode(ThemeMode::Dark).await;
        assert_eq!(storage.get(THEME_STORAGE_KEY).await.unwrap(), None);

        store.identity_acquired().await;
        store.set_mode(ThemeMode::Light).await;
        assert_eq!(
            storage.get(THEME_STORAGE_KEY).await.unwrap().as_deref(),
            Some("light")
        );
    }

    #[tokio::test]
    async fn identity_lost_resets_memory_but_not_storage() {
        let storage = StoreHandle::in_memory();
        let store = PreferenceStore::new(storage.clone());
        store.identity_acquired().await;
        store.set_mode(ThemeMode::Dark).await;

        store.identity_lost();
        assert_eq!(store.mode(), ThemeMode::System);
        assert!(!store.is_identity_active());
        assert_eq!(
            storage.get(THEME_STORAGE_KEY).await.unwrap().as_deref(),
            Some("dark")
        );
    }

    #[tokio::test]
    async fn invalid_stored_value_keeps_current_mode() {
        let storage = StoreHandle::in_memory();
        storage.set(THEME_STORAGE_KEY, "sepia").await.unwrap();
        let store = PreferenceStore::new(storage);

        assert_eq!(store.identity_acquired().await, LoadOutcome::Invalid);
        assert_eq!(store.mode(), ThemeMode::System);
    }

    #[tokio::test]
    async fn missing_value_keeps_current_mode() {
        let store = PreferenceStore::new(StoreHandle::in_memory());
        assert_eq!(store.identity_acquired().await, LoadOutcome::Missing);
        assert_eq!(store.mode(), ThemeMode::System);
    }

    #[tokio::test]
    async fn each_transition_advances_epoch() {
        let store = PreferenceStore::new(StoreHandle::in_memory());
        assert_eq!(store.epoch(), 0);
        let load = store.identity_acquired();
        assert_eq!(store.epoch(), 1);
        store.identity_lost();
        assert_eq!(store.epoch(), 2);
        assert_eq!(load.await, LoadOutcome::Stale);
    }

    #[test]
    fn stored_names_round_trip() {
        for mode in [ThemeMode::Light, ThemeMode::Dark, ThemeMode::System] {
            assert_eq!(ThemeMode::from_stored(mode.as_str()), Some(mode));
        }
        assert_eq!(ThemeMode::from_stored("Dark"), None);
    }
}
