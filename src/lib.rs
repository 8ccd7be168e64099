//! Session-scoped state for the household client: the create/edit wizard's
//! shared draft, the identity-scoped theme preference, and the validation
//! rules that gate both.

pub mod auth;
pub mod config;
pub mod db;
pub mod draft;
mod error;
pub mod logging;
pub mod migrate;
pub mod preference;
pub mod remote;
pub mod session;
pub mod state;
pub mod storage;
pub mod validation;
pub mod wizard;

pub use error::{AppError, AppResult};
pub use logging::init_logging;
pub use state::AppState;
