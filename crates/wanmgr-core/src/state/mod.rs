// # Status Store Implementations
//
// This module provides implementations of the StatusStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileStatusStore;
pub use memory::MemoryStatusStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::StatusStoreConfig;
use crate::traits::StatusStore;

/// A persistent key's value and when it was last written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentEntry {
    pub value: String,
    pub updated: DateTime<Utc>,
}

impl PersistentEntry {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            updated: Utc::now(),
        }
    }
}

/// Build the status store selected by the configuration
pub async fn from_config(config: &StatusStoreConfig) -> crate::Result<Arc<dyn StatusStore>> {
    match config {
        StatusStoreConfig::File { path } => Ok(Arc::new(FileStatusStore::new(path).await?)),
        StatusStoreConfig::Memory => Ok(Arc::new(MemoryStatusStore::new())),
    }
}
