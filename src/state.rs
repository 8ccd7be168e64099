use tokio::task::JoinHandle;

use crate::config::Config;
use crate::draft::DraftStore;
use crate::preference::PreferenceStore;
use crate::session::{SessionCoordinator, SessionSignal};
use crate::storage::StoreHandle;
use crate::wizard::HouseholdWizard;

/// Everything the screens share for one app run. Cloning is cheap; clones
/// refer to the same stores.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub signal: SessionSignal,
    pub preferences: PreferenceStore,
    pub wizard: HouseholdWizard,
}

impl AppState {
    pub fn new(config: Config, storage: StoreHandle) -> Self {
        Self {
            config,
            signal: SessionSignal::new(),
            preferences: PreferenceStore::new(storage),
            wizard: HouseholdWizard::new(DraftStore::new()),
        }
    }

    /// Preferences persisted to the file under `config.data_dir`.
    pub fn open(config: Config) -> Self {
        let storage = StoreHandle::file(config.preferences_path());
        Self::new(config, storage)
    }

    pub fn draft(&self) -> &DraftStore {
        self.wizard.draft()
    }

    /// Starts reacting to sign-in and sign-out. Must be called from within a
    /// tokio runtime.
    pub fn start_session_tracking(&self) -> JoinHandle<()> {
        SessionCoordinator::new(self.preferences.clone(), self.draft().clone()).spawn(&self.signal)
    }
}
