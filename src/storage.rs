use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::warn;

/// Durable key-value storage for user preferences.
///
/// Futures are `'static` so callers can move them onto their own tasks.
pub trait PreferenceStorage: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'static, anyhow::Result<Option<String>>>;
    fn set(&self, key: &str, value: &str) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// JSON object on disk, one string value per key. Writes go through a
/// temp file in the same directory and are renamed into place.
struct FileStore {
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

fn read_map(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("read preferences {}", path.display()))
        }
    };
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("parse preferences {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("preferences file {} is not a JSON object", path.display()),
    }
}

fn write_map(path: &Path, map: &Map<String, Value>) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("create preferences directory {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent).context("create preferences temp file")?;
    serde_json::to_writer_pretty(&mut tmp, map).context("serialize preferences")?;
    tmp.flush().context("flush preferences temp file")?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("replace preferences {}", path.display()))?;
    Ok(())
}

impl PreferenceStorage for FileStore {
    fn get(&self, key: &str) -> BoxFuture<'static, anyhow::Result<Option<String>>> {
        let path = self.path.clone();
        let key = key.to_string();
        async move {
            tokio::task::spawn_blocking(move || {
                let map = read_map(&path)?;
                Ok(map.get(&key).and_then(Value::as_str).map(str::to_owned))
            })
            .await
            .context("join preference read")?
        }
        .boxed()
    }

    fn set(&self, key: &str, value: &str) -> BoxFuture<'static, anyhow::Result<()>> {
        let path = self.path.clone();
        let lock = self.write_lock.clone();
        let key = key.to_string();
        let value = value.to_string();
        async move {
            tokio::task::spawn_blocking(move || {
                let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                let mut map = match read_map(&path) {
                    Ok(map) => map,
                    Err(err) => {
                        warn!(
                            target: "hearth",
                            event = "preference_file_reset",
                            error = %err
                        );
                        Map::new()
                    }
                };
                map.insert(key, Value::String(value));
                write_map(&path, &map)
            })
            .await
            .context("join preference write")?
        }
        .boxed()
    }
}

#[derive(Default)]
struct MemoryStore {
    data: Arc<Mutex<HashMap<String, String>>>,
}

impl PreferenceStorage for MemoryStore {
    fn get(&self, key: &str) -> BoxFuture<'static, anyhow::Result<Option<String>>> {
        let value = self
            .data
            .lock()
            .map(|guard| guard.get(key).cloned())
            .unwrap_or_default();
        future::ready(Ok(value)).boxed()
    }

    fn set(&self, key: &str, value: &str) -> BoxFuture<'static, anyhow::Result<()>> {
        if let Ok(mut guard) = self.data.lock() {
            guard.insert(key.to_string(), value.to_string());
        }
        future::ready(Ok(())).boxed()
    }
}

#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<dyn PreferenceStorage>,
}

impl StoreHandle {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(FileStore {
                path: Arc::new(path.into()),
                write_lock: Arc::new(Mutex::new(())),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(MemoryStore::default()),
        }
    }

    pub fn from_backend(backend: Arc<dyn PreferenceStorage>) -> Self {
        Self { inner: backend }
    }
}

impl PreferenceStorage for StoreHandle {
    fn get(&self, key: &str) -> BoxFuture<'static, anyhow::Result<Option<String>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> BoxFuture<'static, anyhow::Result<()>> {
        self.inner.set(key, value)
    }
}
