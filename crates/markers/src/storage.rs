//! Persisted marker records and the key-value seam they live behind.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OverlayConfig;
use crate::error::{MarkerError, Result};
use crate::format::{FormatterRegistry, JSON};
use crate::marker::Marker;

/// String key-value storage in the style of a browser's local storage.
pub trait KeyValueStore: Debug + Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local store used by tests and headless runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by one pretty-printed JSON object on disk.
///
/// Every `set` rewrites the whole file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|source| MarkerError::Io {
                context: "failed to read marker store",
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&json)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value.to_string());

        // Memory only changes once the file has it too.
        let json = serde_json::to_string_pretty(&updated)?;
        fs::write(&self.path, json).map_err(|source| MarkerError::Io {
            context: "failed to write marker store",
            path: self.path.clone(),
            source,
        })?;
        *entries = updated;
        Ok(())
    }
}

/// Stored form of one video's markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub formatter: String,
    pub content: String,
}

impl Default for PersistedRecord {
    fn default() -> Self {
        Self {
            formatter: JSON.to_string(),
            content: String::from("[]"),
        }
    }
}

/// Reads and writes marker records under `<prefix><video-id>` keys.
#[derive(Debug, Clone)]
pub struct MarkerStorage {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
    preference_key: String,
    default_formatter: String,
}

impl MarkerStorage {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: &OverlayConfig) -> Self {
        Self {
            kv,
            prefix: config.storage_prefix.clone(),
            preference_key: config.formatter_preference_key.clone(),
            default_formatter: config.default_formatter.clone(),
        }
    }

    pub fn key_for(&self, video_id: &str) -> String {
        format!("{}{video_id}", self.prefix)
    }

    /// Loads the record for `video_id`, or an empty JSON record when none exists.
    pub fn load(&self, video_id: &str) -> Result<PersistedRecord> {
        match self.kv.get(&self.key_for(video_id))? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(PersistedRecord::default()),
        }
    }

    /// Loads and decodes the markers stored for `video_id`.
    ///
    /// Fails with `UnknownFormatter` when the record names a formatter the
    /// registry does not have; callers must not fall back to another one.
    pub fn load_markers(&self, video_id: &str, registry: &FormatterRegistry) -> Result<Vec<Marker>> {
        let record = self.load(video_id)?;
        let formatter = registry.get(&record.formatter)?;
        formatter.deserialize_all(&record.content)
    }

    pub fn save(&self, video_id: &str, record: &PersistedRecord) -> Result<()> {
        let raw = serde_json::to_string(record)?;
        self.kv.set(&self.key_for(video_id), &raw)
    }

    /// Writes `markers` with the formatter the existing record already uses.
    pub fn save_markers(
        &self,
        video_id: &str,
        registry: &FormatterRegistry,
        markers: &[Marker],
    ) -> Result<()> {
        let current = self.load(video_id)?;
        let formatter = registry.get(&current.formatter)?;
        let record = PersistedRecord {
            formatter: current.formatter,
            content: formatter.serialize_all(markers)?,
        };
        debug!(video_id, formatter = %record.formatter, count = markers.len(), "markers saved");
        self.save(video_id, &record)
    }

    /// Name of the formatter used for editing and export.
    pub fn preferred_formatter(&self) -> Result<String> {
        Ok(self
            .kv
            .get(&self.preference_key)?
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.default_formatter.clone()))
    }

    pub fn set_preferred_formatter(&self, name: &str) -> Result<()> {
        self.kv.set(&self.preference_key, name)
    }
}
