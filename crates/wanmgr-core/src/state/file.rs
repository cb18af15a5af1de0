// # File Status Store
//
// StatusStore whose persistent keys live in a JSON file.
//
// ## Purpose
//
// Keeps persistent keys (last eRouter mode, health-check settings, active
// link per interface) across daemon restarts. Volatile keys and events are
// kept in memory only, like any other process-local event bus.
//
// ## Crash Recovery
//
// - Atomic writes: `commit()` writes a temporary file, then renames it
// - Automatic backup: the previous file is kept as `.backup`
// - Recovery: a corrupted file is replaced from the backup on load
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "keys": {
//     "last_erouter_mode": {
//       "value": "2",
//       "updated": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::state::PersistentEntry;
use crate::traits::status_store::StatusStore;

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-backed status store
///
/// Persistent keys become durable on [`StatusStore::commit`]; nothing is
/// written before that.
///
/// # Example
///
/// ```rust,no_run
/// use wanmgr_core::state::FileStatusStore;
/// use wanmgr_core::traits::StatusStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStatusStore::new("/var/lib/wanmgr/status.json").await?;
///
///     store.set_persistent("last_erouter_mode", "2").await?;
///     store.commit().await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStatusStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug, Default)]
struct FileState {
    volatile: HashMap<String, String>,
    persistent: HashMap<String, PersistentEntry>,
    dirty: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    keys: HashMap<String, PersistentEntry>,
}

impl FileStatusStore {
    /// Create or load a file status store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing file, falling back to its backup when corrupted
    /// 3. Start empty if neither can be read
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create status store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let persistent = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                persistent,
                ..Default::default()
            })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, PersistentEntry>, Error> {
        let err = match Self::load(path).await {
            Ok(keys) => {
                tracing::debug!("Loaded status store: {} persistent keys", keys.len());
                return Ok(keys);
            }
            Err(e) => e,
        };

        if !matches!(err, Error::Json(_)) {
            return Err(err);
        }

        tracing::warn!(
            "Status store file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty persistent keys.");
            return Ok(HashMap::new());
        }

        match Self::load(&backup_path).await {
            Ok(keys) => {
                tracing::info!("Recovered status store from backup: {} keys", keys.len());
                if let Err(restore_err) = fs::copy(&backup_path, path).await {
                    tracing::error!(
                        "Failed to restore status store from backup: {}",
                        restore_err
                    );
                }
                Ok(keys)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty persistent keys.",
                    backup_err
                );
                Ok(HashMap::new())
            }
        }
    }

    async fn load(path: &Path) -> Result<HashMap<String, PersistentEntry>, Error> {
        if !path.exists() {
            tracing::debug!("Status store file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::status_store(format!(
                "Failed to read status store {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Status store version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.keys)
    }

    async fn write(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;

        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            keys: state.persistent.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::status_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            out.write_all(json.as_bytes()).await?;
            out.flush().await?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::status_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state.dirty = false;
        tracing::trace!("Status store written: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// When a persistent key was last written
    pub async fn last_updated(&self, key: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        self.state
            .read()
            .await
            .persistent
            .get(key)
            .map(|entry| entry.updated)
    }
}

#[async_trait]
impl StatusStore for FileStatusStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.state.read().await.volatile.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut state = self.state.write().await;
        state.volatile.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn notify(&self, event: &str) -> Result<(), Error> {
        tracing::debug!("Event raised: {}", event);
        Ok(())
    }

    async fn get_persistent(&self, key: &str) -> Result<Option<String>, Error> {
        let state = self.state.read().await;
        Ok(state.persistent.get(key).map(|entry| entry.value.clone()))
    }

    async fn set_persistent(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut state = self.state.write().await;
        let unchanged = state
            .persistent
            .get(key)
            .is_some_and(|entry| entry.value == value);
        if !unchanged {
            state
                .persistent
                .insert(key.to_string(), PersistentEntry::new(value));
            state.dirty = true;
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), Error> {
        if self.state.read().await.dirty {
            self.write().await
        } else {
            Ok(())
        }
    }
}
