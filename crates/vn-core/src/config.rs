//! Persisted settings.
//!
//! Components read feature disable masks and log levels through the
//! [`ConfigStore`] trait and never touch storage directly.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value as JsonValue};

/// Key holding an object of `prefix -> level name`.
pub const LOG_LEVELS_KEY: &str = "log.levels";

/// Key holding the disable bitmask of a feature group.
pub fn feature_key(group: &str) -> String {
    format!("feature.{group}.disabled")
}

/// Error type for settings access.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Settings root must be a JSON object")]
    NotAnObject,
}

/// Simple get/set accessors over persisted settings.
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<JsonValue>;
    fn set(&self, key: &str, value: JsonValue) -> Result<(), ConfigError>;
}

pub fn get_u32(store: &dyn ConfigStore, key: &str) -> Option<u32> {
    store
        .get(key)
        .and_then(|value| value.as_u64())
        .and_then(|value| u32::try_from(value).ok())
}

pub fn get_string(store: &dyn ConfigStore, key: &str) -> Option<String> {
    store.get(key).and_then(|value| value.as_str().map(str::to_string))
}

// =============================================================================
// In-memory Store
// =============================================================================

/// Volatile store for tests and contexts without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<BTreeMap<String, JsonValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<JsonValue> {
        self.values.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: JsonValue) -> Result<(), ConfigError> {
        self.values.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

// =============================================================================
// JSON File Store
// =============================================================================

/// One JSON object on disk, rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: RefCell<Map<String, JsonValue>>,
}

impl JsonFileStore {
    /// Open `path`; a missing file starts empty and is created on first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Map::new(),
            Ok(text) => match serde_json::from_str::<JsonValue>(&text)? {
                JsonValue::Object(map) => map,
                _ => return Err(ConfigError::NotAnObject),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        Ok(Self {
            path,
            values: RefCell::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &Map<String, JsonValue>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(values)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        fs::write(&self.path, text).map_err(|source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        })
    }
}

impl ConfigStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<JsonValue> {
        self.values.borrow().get(key).cloned()
    }

    /// Writes the updated map out first; memory only changes once the file has.
    fn set(&self, key: &str, value: JsonValue) -> Result<(), ConfigError> {
        let mut values = self.values.borrow().clone();
        values.insert(key.to_string(), value);
        self.persist(&values)?;
        *self.values.borrow_mut() = values;
        Ok(())
    }
}
