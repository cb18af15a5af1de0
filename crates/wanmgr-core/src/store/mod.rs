//! Shared WAN store
//!
//! Process-wide table of interface records plus the global [`WanConfig`],
//! each behind its own lock. Constructed explicitly and shared through an
//! `Arc` by the policy loop, the interface tasks and the IPC bridge.
//!
//! ## Locking rules
//!
//! - Every accessor waits at most `lock_timeout`; a lock that cannot be
//!   taken in time is reported as `None` ("not found").
//! - Release is tied to the guard's lifetime, so every exit path releases.
//! - No API hands out two interface guards at once. Cross-interface scans
//!   lock and release one record at a time.
//! - An interface guard may be held while taking the config lock, never the
//!   reverse.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::timeout;

use crate::model::{WanConfig, WanInterface};
use crate::traits::StatusStore;

/// Exclusive access to one interface record
pub struct IfaceGuard {
    inner: OwnedMutexGuard<WanInterface>,
}

impl IfaceGuard {
    /// Release the record
    pub fn release(self) {}
}

impl Deref for IfaceGuard {
    type Target = WanInterface;

    fn deref(&self) -> &WanInterface {
        &self.inner
    }
}

impl DerefMut for IfaceGuard {
    fn deref_mut(&mut self) -> &mut WanInterface {
        &mut self.inner
    }
}

/// Exclusive access to the global configuration
pub struct ConfigGuard {
    inner: OwnedMutexGuard<WanConfig>,
}

impl ConfigGuard {
    /// Release the configuration
    pub fn release(self) {}
}

impl Deref for ConfigGuard {
    type Target = WanConfig;

    fn deref(&self) -> &WanConfig {
        &self.inner
    }
}

impl DerefMut for ConfigGuard {
    fn deref_mut(&mut self) -> &mut WanConfig {
        &mut self.inner
    }
}

/// Shared table of WAN interface records and global configuration
pub struct SharedWanStore {
    config: Arc<Mutex<WanConfig>>,
    interfaces: RwLock<Vec<Arc<Mutex<WanInterface>>>>,
    lock_timeout: Duration,
}

impl SharedWanStore {
    /// Create a store with the default configuration and no interfaces
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            config: Arc::new(Mutex::new(WanConfig::new())),
            interfaces: RwLock::new(Vec::new()),
            lock_timeout,
        }
    }

    /// Create a store with the given initial configuration
    pub fn with_config(config: WanConfig, lock_timeout: Duration) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            interfaces: RwLock::new(Vec::new()),
            lock_timeout,
        }
    }

    /// Create a store holding `interfaces`, each indexed by its position
    pub fn with_interfaces(
        config: WanConfig,
        interfaces: Vec<WanInterface>,
        lock_timeout: Duration,
    ) -> Self {
        let records = interfaces
            .into_iter()
            .enumerate()
            .map(|(index, mut iface)| {
                iface.index = index;
                Arc::new(Mutex::new(iface))
            })
            .collect();
        Self {
            config: Arc::new(Mutex::new(config)),
            interfaces: RwLock::new(records),
            lock_timeout,
        }
    }

    /// Lock the global configuration
    ///
    /// # Returns
    ///
    /// - `Some(guard)`: The configuration, released when the guard drops
    /// - `None`: The lock could not be taken within the lock timeout
    pub async fn lock_config(&self) -> Option<ConfigGuard> {
        match timeout(self.lock_timeout, self.config.clone().lock_owned()).await {
            Ok(inner) => Some(ConfigGuard { inner }),
            Err(_) => {
                tracing::warn!("Timed out waiting for the WAN config lock");
                None
            }
        }
    }

    /// Lock the interface record at `index`
    ///
    /// # Returns
    ///
    /// - `Some(guard)`: The record, released when the guard drops
    /// - `None`: Unknown index, or the lock could not be taken in time
    pub async fn lock_iface(&self, index: usize) -> Option<IfaceGuard> {
        let record = self.interfaces.read().await.get(index).cloned()?;
        match timeout(self.lock_timeout, record.lock_owned()).await {
            Ok(inner) => Some(IfaceGuard { inner }),
            Err(_) => {
                tracing::warn!("Timed out waiting for interface {} lock", index);
                None
            }
        }
    }

    /// Lock the interface record whose layer-3 name is `name`
    ///
    /// Visits at most [`total_ifaces`](Self::total_ifaces) records, holding
    /// one lock at a time.
    pub async fn lock_iface_by_name(&self, name: &str) -> Option<IfaceGuard> {
        if name.is_empty() {
            return None;
        }
        let total = self.total_ifaces().await;
        for index in 0..total {
            let Some(guard) = self.lock_iface(index).await else {
                continue;
            };
            if guard.wan.name == name {
                return Some(guard);
            }
            guard.release();
        }
        tracing::debug!("No WAN interface named {}", name);
        None
    }

    /// Number of interface records
    pub async fn total_ifaces(&self) -> usize {
        self.interfaces.read().await.len()
    }

    /// Add an interface record, returning its index
    ///
    /// The record's `index` field is overwritten with its slot.
    pub async fn add_interface(&self, mut iface: WanInterface) -> usize {
        let mut interfaces = self.interfaces.write().await;
        let index = interfaces.len();
        iface.index = index;
        interfaces.push(Arc::new(Mutex::new(iface)));
        index
    }

    /// Clone of the record at `index`, taken under its lock
    pub async fn snapshot(&self, index: usize) -> Option<WanInterface> {
        let guard = self.lock_iface(index).await?;
        Some(guard.clone())
    }

    /// Clone of the global configuration, taken under its lock
    pub async fn config_snapshot(&self) -> Option<WanConfig> {
        let guard = self.lock_config().await?;
        Some(guard.clone())
    }

    /// Number of DHCP client entries exposed to the data model
    ///
    /// Always 1: the data model assumes a single WAN-side DHCP client
    /// regardless of how many interfaces run one.
    pub fn dhcp_client_entry_count(&self) -> usize {
        1
    }

    /// Clear `active_link` on every record and persist it
    ///
    /// Records are visited one lock at a time.
    pub async fn reset_active_link_on_all(&self, status: &dyn StatusStore) -> crate::Result<()> {
        let total = self.total_ifaces().await;
        for index in 0..total {
            let Some(mut guard) = self.lock_iface(index).await else {
                tracing::warn!("Skipping active-link reset for interface {}", index);
                continue;
            };
            guard.wan.active_link = false;
            let instance = guard.index;
            guard.release();

            status
                .set_persistent(&crate::keys::active_link(instance), "false")
                .await?;
        }
        status.commit().await
    }

    /// Drop every record
    ///
    /// Each record's lock is taken before it is dropped so that no holder
    /// is left with a dangling view.
    pub async fn clear(&self) {
        let mut interfaces = self.interfaces.write().await;
        for record in interfaces.iter() {
            let _drain = record.lock().await;
        }
        interfaces.clear();
    }
}
