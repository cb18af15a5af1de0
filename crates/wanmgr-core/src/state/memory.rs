// # Memory Status Store
//
// In-memory implementation of StatusStore.
//
// ## Purpose
//
// Provides a simple, fast status store that doesn't persist across
// restarts. Used for tests and for gateways where persistent keys are
// owned by another component.
//
// ## Crash Behavior
//
// - All keys are lost on restart/crash
// - `commit()` is a no-op
//
// Raised events are counted so callers can observe how often, for
// example, the firewall was asked to restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::state::PersistentEntry;
use crate::traits::status_store::StatusStore;

#[derive(Debug, Default)]
struct MemoryInner {
    volatile: HashMap<String, String>,
    persistent: HashMap<String, PersistentEntry>,
    notifications: HashMap<String, usize>,
}

/// In-memory status store implementation
///
/// # Example
///
/// ```rust,no_run
/// use wanmgr_core::state::MemoryStatusStore;
/// use wanmgr_core::traits::StatusStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStatusStore::new();
///
///     store.set("ipv4_connection_state", "up").await?;
///     assert_eq!(store.get("ipv4_connection_state").await?, Some("up".to_string()));
///
///     store.notify("firewall-restart").await?;
///     assert_eq!(store.notification_count("firewall-restart").await, 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStatusStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStatusStore {
    /// Create a new empty memory status store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryInner::default())),
        }
    }

    /// Number of times `event` was raised
    pub async fn notification_count(&self, event: &str) -> usize {
        self.inner
            .read()
            .await
            .notifications
            .get(event)
            .copied()
            .unwrap_or(0)
    }

    /// Number of volatile keys
    pub async fn len(&self) -> usize {
        self.inner.read().await.volatile.len()
    }

    /// Check if no volatile or persistent key is set
    pub async fn is_empty(&self) -> bool {
        let guard = self.inner.read().await;
        guard.volatile.is_empty() && guard.persistent.is_empty()
    }

    /// Clear all keys and counters
    pub async fn clear(&self) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        *guard = MemoryInner::default();
        Ok(())
    }
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.inner.read().await.volatile.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.volatile.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn notify(&self, event: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        *guard.notifications.entry(event.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn get_persistent(&self, key: &str) -> Result<Option<String>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.persistent.get(key).map(|entry| entry.value.clone()))
    }

    async fn set_persistent(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard
            .persistent
            .insert(key.to_string(), PersistentEntry::new(value));
        Ok(())
    }

    async fn commit(&self) -> Result<(), Error> {
        // No-op for memory store
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStatusStore::new();
        assert!(store.is_empty().await);

        store.set("wan-status", "started").await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get("wan-status").await.unwrap(),
            Some("started".to_string())
        );
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.get_or_empty("missing").await, "");
    }

    #[tokio::test]
    async fn test_namespaces_are_separate() {
        let store = MemoryStatusStore::new();

        store.set_persistent("last_erouter_mode", "2").await.unwrap();
        assert_eq!(store.get("last_erouter_mode").await.unwrap(), None);
        assert_eq!(
            store.get_persistent("last_erouter_mode").await.unwrap(),
            Some("2".to_string())
        );
    }

    #[tokio::test]
    async fn test_notifications_counted() {
        let store = MemoryStatusStore::new();

        store.notify("firewall-restart").await.unwrap();
        store.notify("firewall-restart").await.unwrap();

        assert_eq!(store.notification_count("firewall-restart").await, 2);
        assert_eq!(store.notification_count("radvd_restart").await, 0);

        store.clear().await.unwrap();
        assert_eq!(store.notification_count("firewall-restart").await, 0);
    }
}
