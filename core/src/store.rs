//! Local item store: an id-keyed collection of todo items plus the persisted
//! sync bookkeeping (revision and dirty flag).
//!
//! # Design
//! `ItemStore` is the contract the coordinator relies on. `MemoryItemStore`
//! keeps everything in a `Vec`; `FileItemStore` wraps one and flushes every
//! mutation to `items.json` before reporting success. A mutation that cannot
//! be flushed is not applied in memory either, so memory and disk never
//! disagree.
//!
//! `load` distinguishes three outcomes: nothing cached (`Ok(false)`), cache
//! loaded (`Ok(true)`), and cache unreadable (`Err`). A corrupt file is
//! never treated as an empty store.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{Result, SyncError};
use crate::types::TodoItem;

pub const ITEMS_FILE: &str = "items.json";
pub const SYNC_STATE_FILE: &str = "sync_state.json";

/// Revision and dirty flag as they survive a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSyncState {
    pub revision: i64,
    pub dirty: bool,
}

pub trait ItemStore: Send {
    /// Insert a new item. Fails with `DuplicateId` if the id is taken.
    fn add(&mut self, item: TodoItem) -> Result<()>;

    /// Swap an existing item, returning the previous version. Fails with
    /// `NotFound` if the id is unknown.
    fn replace(&mut self, item: TodoItem) -> Result<TodoItem>;

    /// Remove by id, returning the removed item. Fails with `NotFound` if
    /// the id is unknown.
    fn remove(&mut self, id: &str) -> Result<TodoItem>;

    /// Overwrite the whole store. Fails with `DuplicateId` if `items` holds
    /// the same id twice.
    fn replace_all(&mut self, items: Vec<TodoItem>) -> Result<()>;

    fn get(&self, id: &str) -> Option<TodoItem>;

    /// Snapshot of every item, in insertion order.
    fn list(&self) -> Vec<TodoItem>;

    /// Read cached items from durable storage into the store.
    fn load(&mut self) -> Result<bool>;

    fn load_sync_state(&self) -> Result<PersistedSyncState>;

    fn save_sync_state(&mut self, state: PersistedSyncState) -> Result<()>;
}

/// Volatile store. Optionally seeded with a "cache" that `load` picks up,
/// standing in for a file written by a previous run.
#[derive(Debug, Clone, Default)]
pub struct MemoryItemStore {
    items: Vec<TodoItem>,
    cache: Option<Vec<TodoItem>>,
    sync_state: PersistedSyncState,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(items: Vec<TodoItem>) -> Self {
        Self {
            cache: Some(items),
            ..Self::default()
        }
    }

    pub fn with_sync_state(mut self, state: PersistedSyncState) -> Self {
        self.sync_state = state;
        self
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id == id)
    }
}

fn check_unique(items: &[TodoItem]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for item in items {
        if !seen.insert(item.id.as_str()) {
            return Err(SyncError::DuplicateId(item.id.clone()));
        }
    }
    Ok(())
}

impl ItemStore for MemoryItemStore {
    fn add(&mut self, item: TodoItem) -> Result<()> {
        if self.position(&item.id).is_some() {
            return Err(SyncError::DuplicateId(item.id));
        }
        self.items.push(item);
        Ok(())
    }

    fn replace(&mut self, item: TodoItem) -> Result<TodoItem> {
        let index = self
            .position(&item.id)
            .ok_or_else(|| SyncError::NotFound(item.id.clone()))?;
        Ok(std::mem::replace(&mut self.items[index], item))
    }

    fn remove(&mut self, id: &str) -> Result<TodoItem> {
        let index = self.position(id).ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        Ok(self.items.remove(index))
    }

    fn replace_all(&mut self, items: Vec<TodoItem>) -> Result<()> {
        check_unique(&items)?;
        self.items = items;
        Ok(())
    }

    fn get(&self, id: &str) -> Option<TodoItem> {
        self.items.iter().find(|i| i.id == id).cloned()
    }

    fn list(&self) -> Vec<TodoItem> {
        self.items.clone()
    }

    fn load(&mut self) -> Result<bool> {
        match self.cache.take() {
            Some(items) => {
                self.replace_all(items)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn load_sync_state(&self) -> Result<PersistedSyncState> {
        Ok(self.sync_state)
    }

    fn save_sync_state(&mut self, state: PersistedSyncState) -> Result<()> {
        self.sync_state = state;
        Ok(())
    }
}

/// JSON-file store rooted in a data directory.
#[derive(Debug)]
pub struct FileItemStore {
    dir: PathBuf,
    inner: MemoryItemStore,
}

impl FileItemStore {
    /// Bind to `dir`, creating it if needed. Nothing is read until `load`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            inner: MemoryItemStore::new(),
        })
    }

    pub fn items_path(&self) -> PathBuf {
        self.dir.join(ITEMS_FILE)
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.dir.join(SYNC_STATE_FILE)
    }

    /// Apply `op` to a copy of the in-memory list, flush the copy, then
    /// commit it.
    fn mutate<R>(&mut self, op: impl FnOnce(&mut MemoryItemStore) -> Result<R>) -> Result<R> {
        let mut next = self.inner.clone();
        let result = op(&mut next)?;
        write_json(&self.items_path(), &next.items)?;
        self.inner = next;
        Ok(result)
    }
}

impl ItemStore for FileItemStore {
    fn add(&mut self, item: TodoItem) -> Result<()> {
        self.mutate(|s| s.add(item))
    }

    fn replace(&mut self, item: TodoItem) -> Result<TodoItem> {
        self.mutate(|s| s.replace(item))
    }

    fn remove(&mut self, id: &str) -> Result<TodoItem> {
        self.mutate(|s| s.remove(id))
    }

    fn replace_all(&mut self, items: Vec<TodoItem>) -> Result<()> {
        self.mutate(|s| s.replace_all(items))
    }

    fn get(&self, id: &str) -> Option<TodoItem> {
        self.inner.get(id)
    }

    fn list(&self) -> Vec<TodoItem> {
        self.inner.list()
    }

    fn load(&mut self) -> Result<bool> {
        let path = self.items_path();
        let Some(items) = read_json::<Vec<TodoItem>>(&path)? else {
            debug!(path = %path.display(), "no local cache");
            return Ok(false);
        };
        if let Some(bad) = items.iter().find_map(|i| i.validate().err()) {
            error!(path = %path.display(), error = %bad, "local cache holds an invalid item");
            return Err(bad);
        }
        self.inner.replace_all(items)?;
        debug!(path = %path.display(), count = self.inner.items.len(), "local cache loaded");
        Ok(true)
    }

    fn load_sync_state(&self) -> Result<PersistedSyncState> {
        Ok(read_json(&self.sync_state_path())?.unwrap_or_default())
    }

    fn save_sync_state(&mut self, state: PersistedSyncState) -> Result<()> {
        write_json(&self.sync_state_path(), &state)?;
        self.inner.sync_state = state;
        Ok(())
    }
}

/// Read and parse a JSON file. `Ok(None)` when the file does not exist.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            error!(path = %path.display(), error = %e, "corrupt JSON file");
            Err(SyncError::InvalidFormat(format!("{}: {e}", path.display())))
        }
    }
}

/// Write JSON through a sibling temp file so a crash never leaves a
/// half-written file behind. Returns only once the data and the rename are
/// on disk.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    sync_dir(path)
}

/// Persist a rename by syncing the containing directory.
#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<()> {
    Ok(())
}
