//! In-progress household shared by every screen of the create/edit wizard.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;
use ts_rs::TS;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DraftHousehold {
    #[ts(optional)]
    pub household_id: Option<String>,
    pub name: String,
    pub member_emails: Vec<String>,
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Shared handle to the wizard's draft. Clones observe and mutate the same
/// state; mutations are applied in call order and published to subscribers.
///
/// The store performs no validation and no I/O. Callers gate input before it
/// arrives here and decide when a reset is due.
#[derive(Clone)]
pub struct DraftStore {
    tx: Arc<watch::Sender<DraftHousehold>>,
}

impl Default for DraftStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DraftStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(DraftHousehold::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> DraftHousehold {
        self.tx.borrow().clone()
    }

    /// Receives a notification for every mutation that changed the draft.
    pub fn subscribe(&self) -> watch::Receiver<DraftHousehold> {
        self.tx.subscribe()
    }

    pub fn set_household_id(&self, household_id: Option<String>) {
        self.tx.send_if_modified(|draft| {
            if draft.household_id == household_id {
                return false;
            }
            draft.household_id = household_id;
            true
        });
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.tx.send_if_modified(|draft| {
            if draft.name == name {
                return false;
            }
            draft.name = name;
            true
        });
    }

    pub fn set_member_emails(&self, member_emails: Vec<String>) {
        self.tx.send_if_modified(|draft| {
            if draft.member_emails == member_emails {
                return false;
            }
            draft.member_emails = member_emails;
            true
        });
    }

    /// Appends the normalized address unless an equal entry (ignoring case)
    /// is already pending. Returns whether the list changed.
    pub fn add_member_email(&self, raw: &str) -> bool {
        let normalized = normalize_email(raw);
        if normalized.is_empty() {
            return false;
        }
        self.tx.send_if_modified(|draft| {
            let exists = draft
                .member_emails
                .iter()
                .any(|existing| existing.to_lowercase() == normalized);
            if exists {
                return false;
            }
            draft.member_emails.push(normalized);
            true
        })
    }

    /// Removes the first exact match. Returns whether the list changed.
    pub fn remove_member_email(&self, email: &str) -> bool {
        self.tx.send_if_modified(|draft| {
            match draft.member_emails.iter().position(|e| e == email) {
                Some(index) => {
                    draft.member_emails.remove(index);
                    true
                }
                None => false,
            }
        })
    }

    pub fn reset_form(&self) {
        let changed = self.tx.send_if_modified(|draft| {
            if *draft == DraftHousehold::default() {
                return false;
            }
            *draft = DraftHousehold::default();
            true
        });
        debug!(target: "hearth", event = "draft_reset", changed);
    }
}
