//! Durable per-surface cursor storage.
//!
//! The cursor file holds one map, surface id to `MM-DD` key, and nothing
//! else. Writes go through a temp file and an atomic rename so a crash
//! mid-write leaves either the old map or the new one, never a torn file.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::core::date_key::MonthDay;
use crate::core::errors::{DteError, Result};

/// Host-assigned identifier of one display surface (widget instance).
pub type SurfaceId = i32;

/// Per-surface cursor persistence.
pub trait CursorStore: Send + Sync {
    /// Stored cursor for `surface`, if any.
    fn get(&self, surface: SurfaceId) -> Option<MonthDay>;

    /// Persist `key` as the cursor for `surface`.
    fn set(&self, surface: SurfaceId, key: MonthDay) -> Result<()>;

    /// Drop the cursor for `surface`. Unknown surfaces are a no-op.
    fn remove(&self, surface: SurfaceId) -> Result<()>;

    /// All surfaces with a stored cursor, in ascending id order.
    fn surface_ids(&self) -> Vec<SurfaceId>;
}

/// File-backed store, the production implementation.
#[derive(Debug)]
pub struct FileCursorStore {
    path: PathBuf,
    cursors: Mutex<HashMap<SurfaceId, MonthDay>>,
}

impl FileCursorStore {
    /// Open the store at `path`, loading any existing map.
    ///
    /// A missing file starts empty; a corrupt file is treated as empty
    /// rather than blocking every surface behind a parse error.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cursors = Self::load(&path).unwrap_or_default();
        Self {
            path,
            cursors: Mutex::new(cursors),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Option<HashMap<SurfaceId, MonthDay>> {
        let raw = fs::read_to_string(path).ok()?;
        // Keys are serialized as strings because JSON maps require it.
        let parsed: HashMap<String, MonthDay> = serde_json::from_str(&raw).ok()?;
        let mut cursors = HashMap::with_capacity(parsed.len());
        for (id, key) in parsed {
            cursors.insert(id.parse::<SurfaceId>().ok()?, key);
        }
        Some(cursors)
    }

    fn persist(&self, cursors: &HashMap<SurfaceId, MonthDay>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| DteError::Persistence {
                path: self.path.clone(),
                details: format!("cannot create parent directory: {err}"),
            })?;
        }

        let serializable: HashMap<String, MonthDay> = cursors
            .iter()
            .map(|(id, key)| (id.to_string(), *key))
            .collect();
        let json = serde_json::to_string_pretty(&serializable)?;

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, json).map_err(|err| DteError::Persistence {
            path: tmp_path.clone(),
            details: err.to_string(),
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|err| DteError::Persistence {
            path: self.path.clone(),
            details: format!("atomic rename failed: {err}"),
        })
    }
}

impl CursorStore for FileCursorStore {
    fn get(&self, surface: SurfaceId) -> Option<MonthDay> {
        self.cursors.lock().get(&surface).copied()
    }

    fn set(&self, surface: SurfaceId, key: MonthDay) -> Result<()> {
        let mut cursors = self.cursors.lock();
        cursors.insert(surface, key);
        self.persist(&cursors)
    }

    fn remove(&self, surface: SurfaceId) -> Result<()> {
        let mut cursors = self.cursors.lock();
        if cursors.remove(&surface).is_none() {
            return Ok(());
        }
        self.persist(&cursors)
    }

    fn surface_ids(&self) -> Vec<SurfaceId> {
        let mut ids: Vec<SurfaceId> = self.cursors.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<SurfaceId, MonthDay>>,
}

impl MemoryCursorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn get(&self, surface: SurfaceId) -> Option<MonthDay> {
        self.cursors.lock().get(&surface).copied()
    }

    fn set(&self, surface: SurfaceId, key: MonthDay) -> Result<()> {
        self.cursors.lock().insert(surface, key);
        Ok(())
    }

    fn remove(&self, surface: SurfaceId) -> Result<()> {
        self.cursors.lock().remove(&surface);
        Ok(())
    }

    fn surface_ids(&self) -> Vec<SurfaceId> {
        let mut ids: Vec<SurfaceId> = self.cursors.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
