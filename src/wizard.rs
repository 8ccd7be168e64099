//! Household create/edit wizard: the editor screen and the member-management
//! sub-screen share one [`DraftStore`] for as long as the wizard is open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;

use crate::draft::DraftStore;
use crate::logging::LogScope;
use crate::remote::{HouseholdRemote, NewMembership, Role};
use crate::session::Identity;
use crate::validation::{validate_email, validate_household_name, ValidationError};
use crate::{AppError, AppResult};

pub const SAVE_IN_PROGRESS: &str = "HOUSEHOLD/SAVE_IN_PROGRESS";

/// How the navigation layer brought the user into the wizard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardEntry {
    /// "New household" from the home screen: start from an empty draft.
    Create,
    /// Editing an existing household: keep what is pending, pin the id.
    Edit { household_id: String },
    /// Back from the member-management screen: keep everything.
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Created { household_id: String },
    Updated { household_id: String },
}

struct SavingGuard {
    flag: Arc<AtomicBool>,
}

impl SavingGuard {
    fn begin(flag: Arc<AtomicBool>) -> AppResult<Self> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::new(
                SAVE_IN_PROGRESS,
                "The household is already being saved.",
            ));
        }
        Ok(Self { flag })
    }
}

impl Drop for SavingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct HouseholdWizard {
    draft: DraftStore,
    saving: Arc<AtomicBool>,
}

impl HouseholdWizard {
    pub fn new(draft: DraftStore) -> Self {
        Self {
            draft,
            saving: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn draft(&self) -> &DraftStore {
        &self.draft
    }

    pub fn on_wizard_entered(&self, entry: WizardEntry) {
        match entry {
            WizardEntry::Create => self.draft.reset_form(),
            WizardEntry::Edit { household_id } => self.draft.set_household_id(Some(household_id)),
            WizardEntry::Resumed => {}
        }
    }

    pub fn is_edit(&self) -> bool {
        self.draft.snapshot().household_id.is_some()
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::SeqCst)
    }

    /// The creator counts as the first member.
    pub fn member_count(&self) -> usize {
        1 + self.draft.snapshot().member_emails.len()
    }

    /// Member-screen input. Blank input is ignored (`Ok(false)`); malformed
    /// input is rejected without touching the draft.
    pub fn submit_member_email(&self, raw: &str) -> Result<bool, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(false);
        }
        validate_email(trimmed)?;
        Ok(self.draft.add_member_email(trimmed))
    }

    /// Commits the draft. Creating inserts the household and an `admin`
    /// membership for `identity`, then clears the draft; editing renames the
    /// household and keeps the draft. On any failure the draft is untouched.
    pub async fn save(
        &self,
        identity: &Identity,
        remote: &dyn HouseholdRemote,
    ) -> AppResult<SaveOutcome> {
        let draft = self.draft.snapshot();
        let scope = LogScope::new(
            "household_save",
            draft.household_id.clone(),
            Some(identity.user_id.clone()),
        );
        let result = self.commit(identity, remote, &draft.name, draft.household_id).await;
        match &result {
            Ok(SaveOutcome::Created { household_id }) => scope.success(
                Some(household_id.as_str()),
                json!({ "outcome": "created", "pending_members": draft.member_emails.len() }),
            ),
            Ok(SaveOutcome::Updated { household_id }) => {
                scope.success(Some(household_id.as_str()), json!({ "outcome": "updated" }))
            }
            Err(err) => scope.fail(err),
        }
        result
    }

    async fn commit(
        &self,
        identity: &Identity,
        remote: &dyn HouseholdRemote,
        name: &str,
        household_id: Option<String>,
    ) -> AppResult<SaveOutcome> {
        let name = name.trim();
        validate_household_name(name)?;
        let _saving = SavingGuard::begin(self.saving.clone())?;

        match household_id {
            Some(household_id) => {
                remote.update_household_name(&household_id, name).await?;
                Ok(SaveOutcome::Updated { household_id })
            }
            None => {
                let household_id = remote.insert_household(name).await?;
                remote
                    .insert_membership(&NewMembership {
                        household_id: household_id.clone(),
                        user_id: identity.user_id.clone(),
                        role: Role::Admin,
                    })
                    .await?;
                self.draft.reset_form();
                Ok(SaveOutcome::Created { household_id })
            }
        }
    }
}
