use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::time::timeout;

use hearth_lib::auth::{AuthBackend, AuthFlow, SIGN_IN_FAILED, SIGN_OUT_FAILED, SIGN_UP_FAILED};
use hearth_lib::config::Config;
use hearth_lib::preference::{ThemeMode, THEME_STORAGE_KEY};
use hearth_lib::session::Identity;
use hearth_lib::storage::{PreferenceStorage, StoreHandle};
use hearth_lib::{AppError, AppResult, AppState};

const WAIT: Duration = Duration::from_secs(5);

fn identity(user_id: &str) -> Identity {
    Identity {
        user_id: user_id.into(),
        email: format!("{user_id}@example.com"),
    }
}

async fn state_with_stored_mode(mode: &str) -> Result<AppState> {
    let storage = StoreHandle::in_memory();
    storage.set(THEME_STORAGE_KEY, mode).await?;
    Ok(AppState::new(Config::default(), storage))
}

async fn wait_for_mode(state: &AppState, mode: ThemeMode) -> Result<()> {
    let mut rx = state.preferences.subscribe();
    timeout(WAIT, rx.wait_for(|snapshot| snapshot.mode == mode)).await??;
    Ok(())
}

#[tokio::test]
async fn sign_in_loads_and_sign_out_resets() -> Result<()> {
    let state = state_with_stored_mode("dark").await?;
    let _tracking = state.start_session_tracking();

    state.signal.sign_in(identity("alice"));
    wait_for_mode(&state, ThemeMode::Dark).await?;
    assert!(state.preferences.is_identity_active());

    state.wizard.draft().set_name("Smith Family");
    state.wizard.draft().add_member_email("bob@example.com");

    state.signal.sign_out();
    wait_for_mode(&state, ThemeMode::System).await?;
    let mut draft_rx = state.draft().subscribe();
    timeout(WAIT, draft_rx.wait_for(|draft| draft.name.is_empty())).await??;
    assert!(state.draft().snapshot().member_emails.is_empty());
    assert!(!state.preferences.is_identity_active());
    Ok(())
}

#[tokio::test]
async fn identity_present_at_start_is_loaded() -> Result<()> {
    let state = state_with_stored_mode("light").await?;
    state.signal.sign_in(identity("alice"));

    let _tracking = state.start_session_tracking();
    wait_for_mode(&state, ThemeMode::Light).await?;
    Ok(())
}

#[tokio::test]
async fn switching_users_resets_draft_and_reloads() -> Result<()> {
    let state = state_with_stored_mode("dark").await?;
    let _tracking = state.start_session_tracking();

    state.signal.sign_in(identity("alice"));
    wait_for_mode(&state, ThemeMode::Dark).await?;
    let epoch_before = state.preferences.epoch();
    state.draft().set_name("Alice's draft");

    state.signal.sign_in(identity("bob"));
    let mut draft_rx = state.draft().subscribe();
    timeout(WAIT, draft_rx.wait_for(|draft| draft.name.is_empty())).await??;
    wait_for_mode(&state, ThemeMode::Dark).await?;
    // Lost then acquired.
    assert!(state.preferences.epoch() >= epoch_before + 2);
    Ok(())
}

#[tokio::test]
async fn mode_chosen_while_signed_in_survives_next_session() -> Result<()> {
    let state = AppState::new(Config::default(), StoreHandle::in_memory());
    let _tracking = state.start_session_tracking();

    state.signal.sign_in(identity("alice"));
    while !state.preferences.is_identity_active() {
        tokio::task::yield_now().await;
    }
    state.preferences.set_mode(ThemeMode::Dark).await;

    state.signal.sign_out();
    wait_for_mode(&state, ThemeMode::System).await?;

    state.signal.sign_in(identity("alice"));
    wait_for_mode(&state, ThemeMode::Dark).await?;
    Ok(())
}

#[derive(Default)]
struct FakeAuth {
    calls: Mutex<Vec<String>>,
    reject_with: Option<&'static str>,
    fail_sign_out: bool,
}

impl FakeAuth {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl AuthBackend for FakeAuth {
    fn sign_up<'a>(&'a self, email: &'a str, _password: &'a str) -> BoxFuture<'a, AppResult<()>> {
        async move {
            self.record(format!("sign_up:{email}"));
            match self.reject_with {
                Some(message) => Err(AppError::new("BACKEND", message)),
                None => Ok(()),
            }
        }
        .boxed()
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        _password: &'a str,
    ) -> BoxFuture<'a, AppResult<Identity>> {
        async move {
            self.record(format!("sign_in:{email}"));
            match self.reject_with {
                Some(message) => Err(AppError::new("BACKEND", message)),
                None => Ok(Identity {
                    user_id: "user-42".into(),
                    email: email.to_string(),
                }),
            }
        }
        .boxed()
    }

    fn sign_out(&self) -> BoxFuture<'_, AppResult<()>> {
        async move {
            self.record("sign_out".into());
            if self.fail_sign_out {
                return Err(AppError::new("BACKEND", "network unreachable"));
            }
            Ok(())
        }
        .boxed()
    }
}

fn flow(backend: Arc<FakeAuth>, state: &AppState) -> AuthFlow {
    AuthFlow::new(backend, state.signal.clone(), 6)
}

#[tokio::test]
async fn sign_up_validates_locally_before_backend() {
    let backend = Arc::new(FakeAuth::default());
    let state = AppState::new(Config::default(), StoreHandle::in_memory());
    let auth = flow(backend.clone(), &state);

    let err = auth.submit_sign_up("a@b", "abcdef").await.unwrap_err();
    assert_eq!(
        err.context().get("reason").map(String::as_str),
        Some("auth.validation.emailInvalid")
    );
    let err = auth.submit_sign_up("a@b.co", "abc").await.unwrap_err();
    assert_eq!(
        err.context().get("reason").map(String::as_str),
        Some("auth.validation.passwordMinLength")
    );
    assert!(backend.calls().is_empty());

    auth.submit_sign_up("  new@example.com ", "abcdef")
        .await
        .unwrap();
    assert_eq!(backend.calls(), vec!["sign_up:new@example.com"]);
    assert_eq!(state.signal.current(), None);
}

#[tokio::test]
async fn sign_in_only_checks_presence() -> Result<()> {
    let backend = Arc::new(FakeAuth::default());
    let state = AppState::new(Config::default(), StoreHandle::in_memory());
    let auth = flow(backend.clone(), &state);

    let err = auth.submit_sign_in("", "abcdef").await.unwrap_err();
    assert_eq!(
        err.context().get("reason").map(String::as_str),
        Some("auth.validation.allFieldsRequired")
    );
    assert!(backend.calls().is_empty());

    // Shape and length are the backend's call.
    let signed_in = auth.submit_sign_in("not-an-email", "x").await?;
    assert_eq!(backend.calls(), vec!["sign_in:not-an-email"]);
    assert_eq!(state.signal.current(), Some(signed_in));
    Ok(())
}

#[tokio::test]
async fn backend_messages_pass_through_verbatim() {
    let backend = Arc::new(FakeAuth {
        reject_with: Some("Invalid login credentials"),
        ..FakeAuth::default()
    });
    let state = AppState::new(Config::default(), StoreHandle::in_memory());
    let auth = flow(backend, &state);

    let err = auth.submit_sign_in("a@b.co", "abcdef").await.unwrap_err();
    assert_eq!(err.code(), SIGN_IN_FAILED);
    assert_eq!(err.message(), "Invalid login credentials");
    assert_eq!(state.signal.current(), None);

    let err = auth.submit_sign_up("a@b.co", "abcdef").await.unwrap_err();
    assert_eq!(err.code(), SIGN_UP_FAILED);
    assert_eq!(err.message(), "Invalid login credentials");
}

#[tokio::test]
async fn sign_out_clears_session_even_when_backend_fails() -> Result<()> {
    let backend = Arc::new(FakeAuth {
        fail_sign_out: true,
        ..FakeAuth::default()
    });
    let state = AppState::new(Config::default(), StoreHandle::in_memory());
    let auth = flow(backend, &state);

    auth.submit_sign_in("a@b.co", "abcdef").await?;
    assert!(state.signal.current().is_some());

    let err = auth.sign_out().await.unwrap_err();
    assert_eq!(err.code(), SIGN_OUT_FAILED);
    assert_eq!(err.message(), "network unreachable");
    assert_eq!(state.signal.current(), None);
    Ok(())
}

#[tokio::test]
async fn sign_in_through_auth_flow_drives_preferences() -> Result<()> {
    let state = state_with_stored_mode("dark").await?;
    let _tracking = state.start_session_tracking();
    let auth = flow(Arc::new(FakeAuth::default()), &state);

    auth.submit_sign_in("a@b.co", "abcdef").await?;
    wait_for_mode(&state, ThemeMode::Dark).await?;

    auth.sign_out().await?;
    wait_for_mode(&state, ThemeMode::System).await?;
    Ok(())
}

async fn wait_until_active(state: &AppState) {
    while !state.preferences.is_identity_active() {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn back_to_back_sign_out_and_sign_in_still_resets() -> Result<()> {
    let state = AppState::new(Config::default(), StoreHandle::in_memory());
    let _tracking = state.start_session_tracking();

    state.signal.sign_in(identity("alice"));
    wait_until_active(&state).await;
    let epoch_before = state.preferences.epoch();

    state.draft().set_name("Leftover");
    state.draft().add_member_email("old@example.com");
    // Applied in memory only; the write is never driven.
    drop(state.preferences.set_mode(ThemeMode::Dark));
    assert_eq!(state.preferences.mode(), ThemeMode::Dark);

    state.signal.sign_out();
    state.signal.sign_in(identity("alice"));

    let mut draft_rx = state.draft().subscribe();
    timeout(WAIT, draft_rx.wait_for(|draft| draft.name.is_empty())).await??;
    assert!(state.draft().snapshot().member_emails.is_empty());
    assert_eq!(state.preferences.epoch(), epoch_before + 2);
    assert!(state.preferences.is_identity_active());

    // Nothing was stored, so the reload leaves the reset value in place.
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(state.preferences.mode(), ThemeMode::System);
    Ok(())
}

#[tokio::test]
async fn back_to_back_relogin_reloads_stored_mode() -> Result<()> {
    let state = state_with_stored_mode("dark").await?;
    let _tracking = state.start_session_tracking();

    state.signal.sign_in(identity("alice"));
    wait_for_mode(&state, ThemeMode::Dark).await?;
    drop(state.preferences.set_mode(ThemeMode::Light));

    state.signal.sign_out();
    state.signal.sign_in(identity("alice"));
    wait_for_mode(&state, ThemeMode::Dark).await?;
    Ok(())
}

#[tokio::test]
async fn auth_flow_relogin_without_yield_resets_draft() -> Result<()> {
    let state = AppState::new(Config::default(), StoreHandle::in_memory());
    let _tracking = state.start_session_tracking();
    let auth = flow(Arc::new(FakeAuth::default()), &state);

    auth.submit_sign_in("a@b.co", "abcdef").await?;
    wait_until_active(&state).await;
    let epoch_before = state.preferences.epoch();
    state.draft().set_name("Leftover");

    auth.sign_out().await?;
    auth.submit_sign_in("a@b.co", "abcdef").await?;

    let mut draft_rx = state.draft().subscribe();
    timeout(WAIT, draft_rx.wait_for(|draft| draft.name.is_empty())).await??;
    assert_eq!(state.preferences.epoch(), epoch_before + 2);
    Ok(())
}
