use std::path::Path;
use std::time::Instant;

use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::AppError;

pub const LOG_ENV: &str = "HEARTH_LOG";
const DEFAULT_FILTER: &str = "hearth=info,sqlx=warn";
const LOG_FILE_PREFIX: &str = "hearth.log";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the JSON stdout subscriber, plus a daily-rotated file sink under
/// `log_dir` when one is given. Safe to call more than once; later calls are
/// no-ops.
pub fn init_logging(log_dir: Option<&Path>) {
    let _ = tracing_log::LogTracer::init();

    let stdout_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr);

    let file_layer = log_dir.and_then(|dir| {
        if let Err(err) = std::fs::create_dir_all(dir) {
            eprintln!("hearth: cannot create log directory {}: {err}", dir.display());
            return None;
        }
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        Some(
            fmt::layer()
                .json()
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(false)
                .with_writer(writer),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
}

fn wrap_details(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        json!({ "value": value })
    }
}

/// Enter/success/fail logging around one household operation.
pub struct LogScope {
    cmd: &'static str,
    household_id: Option<String>,
    user_id: Option<String>,
    start: Instant,
}

impl LogScope {
    pub fn new(cmd: &'static str, household_id: Option<String>, user_id: Option<String>) -> Self {
        let scope = Self {
            cmd,
            household_id,
            user_id,
            start: Instant::now(),
        };
        debug!(
            target: "hearth",
            area = "household",
            cmd = scope.cmd,
            household_id = scope.household_id.as_deref(),
            user_id = scope.user_id.as_deref(),
            details = %json!({ "stage": "enter" })
        );
        scope
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn success(&self, household_id: Option<&str>, details: Value) {
        info!(
            target: "hearth",
            area = "household",
            cmd = self.cmd,
            household_id = household_id.or(self.household_id.as_deref()),
            user_id = self.user_id.as_deref(),
            duration_ms = self.elapsed_ms(),
            details = %wrap_details(details)
        );
    }

    /// Validation failures are expected user input and log at `warn`;
    /// everything else is an `error`.
    pub fn fail(&self, err: &AppError) {
        let details = json!({ "code": err.code(), "message": err.message() });
        if err.is_validation() {
            warn!(
                target: "hearth",
                area = "household",
                cmd = self.cmd,
                household_id = self.household_id.as_deref(),
                user_id = self.user_id.as_deref(),
                duration_ms = self.elapsed_ms(),
                details = %details
            );
            return;
        }
        error!(
            target: "hearth",
            area = "household",
            cmd = self.cmd,
            household_id = self.household_id.as_deref(),
            user_id = self.user_id.as_deref(),
            duration_ms = self.elapsed_ms(),
            details = %details
        );
    }
}
