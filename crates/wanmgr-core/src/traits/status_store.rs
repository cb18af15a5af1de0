// # Status Store Trait
//
// Defines the key/value surface shared with the rest of the gateway.
//
// ## Purpose
//
// Two namespaces live behind one trait:
// - Volatile keys: the gateway's event bus (connection states, current
//   addresses, "firewall-restart" style triggers). Lost on reboot.
// - Persistent keys: configuration that must survive a reboot (last
//   eRouter mode, health-check settings, active link per interface).
//   Only durable after `commit()`.
//
// ## Implementations
//
// - In-memory: `state::MemoryStatusStore`
// - JSON file for persistent keys: `state::FileStatusStore`
//
// ## Usage
//
// ```rust,ignore
// use wanmgr_core::StatusStore;
// use wanmgr_core::keys;
//
// async fn mark_up(store: &dyn StatusStore) -> wanmgr_core::Result<()> {
//     store.set(keys::IPV4_CONNECTION_STATE, keys::VALUE_UP).await?;
//     store.notify(keys::FIREWALL_RESTART).await
// }
// ```

use async_trait::async_trait;

/// Trait for status store implementations
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Get a volatile key
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: The current value
    /// - `Ok(None)`: Key never set
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Set a volatile key
    async fn set(&self, key: &str, value: &str) -> Result<(), crate::Error>;

    /// Raise a value-less event (e.g. "firewall-restart")
    async fn notify(&self, event: &str) -> Result<(), crate::Error>;

    /// Get a persistent key
    async fn get_persistent(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Set a persistent key
    ///
    /// The value is durable only after [`StatusStore::commit`].
    async fn set_persistent(&self, key: &str, value: &str) -> Result<(), crate::Error>;

    /// Persist any pending persistent-key changes
    async fn commit(&self) -> Result<(), crate::Error>;

    /// Get a volatile key, treating absence and errors as the empty string
    async fn get_or_empty(&self, key: &str) -> String {
        match self.get(key).await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Failed to read status key {}: {}", key, e);
                String::new()
            }
        }
    }

    /// Get a persistent key, treating absence and errors as the empty string
    async fn get_persistent_or_empty(&self, key: &str) -> String {
        match self.get_persistent(key).await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Failed to read persistent key {}: {}", key, e);
                String::new()
            }
        }
    }

    /// Set a volatile key, logging instead of failing
    async fn set_logged(&self, key: &str, value: &str) {
        if let Err(e) = self.set(key, value).await {
            tracing::warn!("Failed to set status key {}={}: {}", key, value, e);
        }
    }

    /// Raise an event, logging instead of failing
    async fn notify_logged(&self, event: &str) {
        if let Err(e) = self.notify(event).await {
            tracing::warn!("Failed to raise {}: {}", event, e);
        }
    }
}
