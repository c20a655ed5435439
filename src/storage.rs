//! Project persistence
//!
//! The planner treats persistence as an opaque key-value store keyed by
//! project id. Documents are RON (human-readable, diff-friendly); only
//! the editable collections are serialized - cargo exists solely during
//! run mode and is never written. Saves are fire-and-forget: the app
//! triggers one after every edit-mode mutation and only logs failures.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::sim::scene::{SceneDocument, SceneStore};

/// Persistence error type
#[derive(Debug)]
pub enum StoreError {
    IoError(std::io::Error),
    ParseError(ron::error::SpannedError),
    SerializeError(ron::Error),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::IoError(e)
    }
}

impl From<ron::error::SpannedError> for StoreError {
    fn from(e: ron::error::SpannedError) -> Self {
        StoreError::ParseError(e)
    }
}

impl From<ron::Error> for StoreError {
    fn from(e: ron::Error) -> Self {
        StoreError::SerializeError(e)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::IoError(e) => write!(f, "IO error: {}", e),
            StoreError::ParseError(e) => write!(f, "Parse error: {}", e),
            StoreError::SerializeError(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Opaque key-value store the scene documents live behind.
pub trait KvStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory store (tests, WASM fallback)
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Directory-backed store: one `<key>.ron` file per key.
#[derive(Debug, Clone)]
pub struct DirStore {
    base_dir: PathBuf,
}

impl DirStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.ron", key))
    }
}

impl KvStore for DirStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.resolve(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::write(self.resolve(key), value)?;
        Ok(())
    }
}

/// Serialize the editable scene under the project's key.
pub fn save_project(
    store: &mut dyn KvStore,
    project_id: &str,
    scene: &SceneStore,
) -> Result<(), StoreError> {
    let doc = scene.to_document();
    let pretty = ron::ser::PrettyConfig::default();
    let serialized = ron::ser::to_string_pretty(&doc, pretty)?;
    store.write(project_id, &serialized)
}

/// Load a project's scene; `None` when the key has never been written.
pub fn load_project(
    store: &dyn KvStore,
    project_id: &str,
) -> Result<Option<SceneStore>, StoreError> {
    let Some(serialized) = store.read(project_id)? else {
        return Ok(None);
    };
    let doc: SceneDocument = ron::from_str(&serialized)?;
    Ok(Some(SceneStore::from_document(doc)))
}
