use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use crate::session::{Identity, SessionSignal};
use crate::validation::{validate_sign_in, validate_sign_up_with};
use crate::{AppError, AppResult};

pub const SIGN_UP_FAILED: &str = "AUTH/SIGN_UP_FAILED";
pub const SIGN_IN_FAILED: &str = "AUTH/SIGN_IN_FAILED";
pub const SIGN_OUT_FAILED: &str = "AUTH/SIGN_OUT_FAILED";

/// Hosted authentication service. Error messages are shown to the user
/// verbatim.
pub trait AuthBackend: Send + Sync {
    fn sign_up<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, AppResult<()>>;
    fn sign_in<'a>(&'a self, email: &'a str, password: &'a str)
        -> BoxFuture<'a, AppResult<Identity>>;
    fn sign_out(&self) -> BoxFuture<'_, AppResult<()>>;
}

fn backend_failure(code: &'static str, err: AppError) -> AppError {
    AppError::new(code, err.message().to_string()).with_cause(err)
}

/// Sign-up checks email shape and password length locally; sign-in only
/// checks presence and lets the backend judge the credentials.
#[derive(Clone)]
pub struct AuthFlow {
    backend: Arc<dyn AuthBackend>,
    signal: SessionSignal,
    min_password_length: usize,
}

impl AuthFlow {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        signal: SessionSignal,
        min_password_length: usize,
    ) -> Self {
        Self {
            backend,
            signal,
            min_password_length,
        }
    }

    pub fn signal(&self) -> &SessionSignal {
        &self.signal
    }

    /// Does not sign the user in; the caller routes to sign-in afterwards.
    pub async fn submit_sign_up(&self, email: &str, password: &str) -> AppResult<()> {
        validate_sign_up_with(email, password, self.min_password_length)?;
        self.backend
            .sign_up(email.trim(), password)
            .await
            .map_err(|err| backend_failure(SIGN_UP_FAILED, err))?;
        info!(target: "hearth", event = "auth_sign_up_completed");
        Ok(())
    }

    pub async fn submit_sign_in(&self, email: &str, password: &str) -> AppResult<Identity> {
        validate_sign_in(email, password)?;
        let identity = self
            .backend
            .sign_in(email.trim(), password)
            .await
            .map_err(|err| backend_failure(SIGN_IN_FAILED, err))?;
        info!(target: "hearth", event = "auth_signed_in", user_id = %identity.user_id);
        self.signal.sign_in(identity.clone());
        Ok(identity)
    }

    /// The local session is cleared even when the backend call fails.
    pub async fn sign_out(&self) -> AppResult<()> {
        let result = self.backend.sign_out().await;
        self.signal.sign_out();
        match result {
            Ok(()) => {
                info!(target: "hearth", event = "auth_signed_out");
                Ok(())
            }
            Err(err) => {
                warn!(target: "hearth", event = "auth_sign_out_failed", error = %err);
                Err(backend_failure(SIGN_OUT_FAILED, err))
            }
        }
    }
}
