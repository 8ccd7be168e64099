use std::path::PathBuf;

use anyhow::Context;

use crate::validation::DEFAULT_MIN_PASSWORD_LENGTH;

/// Overrides the data directory; tests point it at a temp dir.
pub const DATA_DIR_ENV: &str = "HEARTH_FAKE_APPDATA";
pub const LOG_DIR_ENV: &str = "HEARTH_LOG_DIR";
pub const MIN_PASSWORD_LENGTH_ENV: &str = "HEARTH_MIN_PASSWORD_LENGTH";

const APP_DIR_NAME: &str = "hearth";
const PREFERENCES_FILE: &str = "preferences.json";
const DATABASE_FILE: &str = "hearth.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub min_password_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: None,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_DIR_NAME))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let data_dir = var(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let log_dir = var(LOG_DIR_ENV).map(PathBuf::from);
        let min_password_length = match var(MIN_PASSWORD_LENGTH_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("parse {MIN_PASSWORD_LENGTH_ENV}={raw}"))?,
            None => DEFAULT_MIN_PASSWORD_LENGTH,
        };

        Ok(Self {
            data_dir,
            log_dir,
            min_password_length,
        })
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_FILE)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}
