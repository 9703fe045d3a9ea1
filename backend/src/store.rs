use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::warn;

/// Failures of the backing document file. Anything here is unexpected and
/// surfaces as a 500 at the handler boundary; validation outcomes never go
/// through this type.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "db file I/O error: {}", e),
            StoreError::Serialize(e) => write!(f, "db document serialization error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialize(e)
    }
}

/// Single-document JSON store keyed by top-level collection name, the shape
/// json-server gives a `db.json`. All mutation goes through [`update`],
/// which stages the change, flushes to disk, and only then commits to
/// memory — a failed flush leaves the in-memory document untouched.
///
/// [`update`]: JsonStore::update
pub struct JsonStore {
    path: PathBuf,
    data: RwLock<Map<String, Value>>,
}

impl JsonStore {
    /// Opens the document at `path`, starting empty when the file does not
    /// exist yet. A file whose root is not a JSON object is treated as
    /// empty rather than rejected.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(bytes) => {
                let value: Value = serde_json::from_slice(&bytes)?;
                match value {
                    Value::Object(map) => map,
                    _ => {
                        warn!("db file {:?} root is not an object, starting empty", path);
                        Map::new()
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Snapshot of one collection. `None` when the collection is absent or
    /// explicitly null.
    pub async fn get(&self, collection: &str) -> Option<Value> {
        let data = self.data.read().await;
        data.get(collection).filter(|v| !v.is_null()).cloned()
    }

    /// Read-modify-write of one collection. The closure runs under the
    /// write lock and its result is committed together with the disk
    /// flush, so concurrent callers observe either all of a change or
    /// none of it.
    pub async fn update<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Value) -> T,
    ) -> Result<T, StoreError> {
        let mut data = self.data.write().await;
        let mut staged = data.get(collection).cloned().unwrap_or(Value::Null);
        let out = f(&mut staged);

        let mut next = data.clone();
        next.insert(collection.to_string(), staged);
        let bytes = serde_json::to_vec_pretty(&next)?;
        tokio::fs::write(&self.path, bytes).await?;
        *data = next;
        Ok(out)
    }

    /// Whole-collection replacement.
    pub async fn set(&self, collection: &str, value: Value) -> Result<(), StoreError> {
        self.update(collection, |slot| *slot = value).await
    }

    /// Top-level field merge, json-server's `{ ...existing, ...patch }`.
    /// A non-object existing value is replaced. Returns the merged
    /// document so handlers can echo it back.
    pub async fn merge(&self, collection: &str, patch: Value) -> Result<Value, StoreError> {
        self.update(collection, |slot| {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let (Some(target), Value::Object(fields)) = (slot.as_object_mut(), patch) {
                for (key, value) in fields {
                    target.insert(key, value);
                }
            }
            slot.clone()
        })
        .await
    }
}
