//! Client configuration: where the backend is, who we are, where the cache
//! lives.
//!
//! Layers, later wins: built-in defaults, a JSON file in the platform config
//! directory, then `TODO_SYNC_*` environment variables. A device id left
//! unset by every layer is generated once and kept in `data_dir/device_id`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::client::TodoClient;
use crate::error::{Result, SyncError};
use crate::remote::RemoteClient;
use crate::store::FileItemStore;
use crate::sync::SyncCoordinator;
use crate::transport::UreqTransport;

pub const CONFIG_FILE: &str = "config.json";
pub const DEVICE_ID_FILE: &str = "device_id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub base_url: String,
    pub token: String,
    /// Sent as `last_updated_by`. Empty means "use the persisted one".
    pub device_id: String,
    pub data_dir: PathBuf,
    pub timeout_secs: u64,
    /// Percentage of requests the backend should fail on purpose.
    pub generate_fails: Option<u8>,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "todo-sync")
}

impl Default for SyncConfig {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".todo-sync"));
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            token: String::new(),
            device_id: String::new(),
            data_dir,
            timeout_secs: 10,
            generate_fails: None,
        }
    }
}

impl SyncConfig {
    /// Default location of the config file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|d| d.config_dir().join(CONFIG_FILE))
    }

    /// Load defaults, then `path` (or the default path) if it exists, then
    /// the environment, then fill in the persisted device id.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) => Self::from_file(&path)?.unwrap_or_default(),
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.ensure_device_id()?;
        Ok(config)
    }

    /// Reuse the id stored in `data_dir`, or generate and store one. A
    /// configured id is left alone.
    pub fn ensure_device_id(&mut self) -> Result<()> {
        if !self.device_id.trim().is_empty() {
            return Ok(());
        }
        let path = self.data_dir.join(DEVICE_ID_FILE);
        match fs::read_to_string(&path) {
            Ok(stored) if !stored.trim().is_empty() => {
                self.device_id = stored.trim().to_string();
                return Ok(());
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let id = Uuid::new_v4().to_string();
        fs::create_dir_all(&self.data_dir)?;
        fs::write(&path, &id)?;
        info!(device_id = %id, path = %path.display(), "generated device id");
        self.device_id = id;
        Ok(())
    }

    /// `Ok(None)` when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| SyncError::InvalidFormat(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `TODO_SYNC_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("TODO_SYNC_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("TODO_SYNC_TOKEN") {
            self.token = v;
        }
        if let Some(v) = lookup("TODO_SYNC_DEVICE_ID") {
            self.device_id = v;
        }
        if let Some(v) = lookup("TODO_SYNC_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TODO_SYNC_TIMEOUT_SECS") {
            self.timeout_secs = v
                .parse()
                .map_err(|_| SyncError::InvalidFormat(format!("TODO_SYNC_TIMEOUT_SECS={v:?}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SyncError::InvalidFormat("base_url is empty".to_string()));
        }
        if self.token.trim().is_empty() {
            return Err(SyncError::InvalidFormat("token is empty".to_string()));
        }
        if matches!(self.generate_fails, Some(p) if p > 100) {
            return Err(SyncError::InvalidFormat("generate_fails must be 0..=100".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn client(&self) -> TodoClient {
        TodoClient::new(&self.base_url, &self.token, &self.device_id)
            .with_generate_fails(self.generate_fails)
    }

    /// Wire up a file-backed coordinator over HTTP.
    pub fn coordinator(&self) -> Result<SyncCoordinator<FileItemStore, UreqTransport>> {
        self.validate()?;
        let mut config = self.clone();
        config.ensure_device_id()?;
        let store = FileItemStore::open(&config.data_dir)?;
        let remote = RemoteClient::new(config.client(), UreqTransport::new(config.timeout()));
        SyncCoordinator::new(store, remote)
    }
}
