//! Configuration types for the WAN manager
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::model::status::{InterfaceKind, Policy};

/// Main WAN manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Initial global WAN enable
    #[serde(default = "default_enabled")]
    pub enable: bool,

    /// Initial selection policy
    #[serde(default)]
    pub policy: Policy,

    /// WAN interfaces to manage
    pub interfaces: Vec<InterfaceConfig>,

    /// IPC endpoints
    #[serde(default)]
    pub ipc: IpcConfig,

    /// Status store backing sysevent/syscfg style keys
    #[serde(default)]
    pub status_store: StatusStoreConfig,

    /// Interface task tick (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Policy loop tick (milliseconds)
    #[serde(default = "default_policy_interval_ms")]
    pub policy_interval_ms: u64,

    /// Upper bound on waiting for a store lock (milliseconds)
    ///
    /// A lock that cannot be taken in time is reported as "not found"
    /// rather than blocking the caller.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Capacity of the event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// DHCPv6 restart polling during a MAP-T feature refresh
    #[serde(default)]
    pub mapt_refresh: MaptRefreshConfig,

    /// Pause between disabling and re-enabling the health check on restart
    #[serde(default = "default_one_second_ms")]
    pub ihc_restart_delay_ms: u64,

    /// Pause between stopping and restarting DHCPv6 on a forced renew
    #[serde(default = "default_one_second_ms")]
    pub dhcpv6_renew_delay_ms: u64,
}

impl ManagerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            enable: default_enabled(),
            policy: Policy::default(),
            interfaces: Vec::new(),
            ipc: IpcConfig::default(),
            status_store: StatusStoreConfig::default(),
            tick_interval_ms: default_tick_interval_ms(),
            policy_interval_ms: default_policy_interval_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            mapt_refresh: MaptRefreshConfig::default(),
            ihc_restart_delay_ms: default_one_second_ms(),
            dhcpv6_renew_delay_ms: default_one_second_ms(),
        }
    }

    /// Add an interface
    pub fn with_interface(mut self, interface: InterfaceConfig) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Set the initial policy
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interfaces.is_empty() {
            return Err(crate::Error::config("No WAN interfaces configured"));
        }
        if self.interfaces.len() > 64 {
            return Err(crate::Error::config(
                "At most 64 WAN interfaces can be managed",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for iface in &self.interfaces {
            iface.validate()?;
            if !seen.insert(iface.name.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate WAN interface name: {}",
                    iface.name
                )));
            }
        }

        if self.tick_interval_ms == 0 {
            return Err(crate::Error::config("Tick interval must be > 0"));
        }
        if self.policy_interval_ms == 0 {
            return Err(crate::Error::config("Policy interval must be > 0"));
        }
        if self.lock_timeout_ms == 0 {
            return Err(crate::Error::config("Lock timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }

        self.ipc.validate()?;
        self.status_store.validate()?;

        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn policy_interval(&self) -> Duration {
        Duration::from_millis(self.policy_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A managed WAN interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Layer-3 interface name (e.g., "erouter0")
    pub name: String,

    /// Underlying device the WAN runs on (e.g., "eth3")
    #[serde(default)]
    pub base_interface: String,

    #[serde(default)]
    pub kind: InterfaceKind,

    /// Data-model path of the physical link
    #[serde(default)]
    pub phy_path: String,

    #[serde(default = "default_enabled")]
    pub enable: bool,

    #[serde(default = "default_enabled")]
    pub enable_dhcp: bool,

    #[serde(default)]
    pub enable_ppp: bool,

    #[serde(default)]
    pub enable_mapt: bool,

    #[serde(default)]
    pub enable_dslite: bool,

    #[serde(default)]
    pub enable_ipoe: bool,

    /// Run the 464XLAT client while IPv6 is up
    #[serde(default)]
    pub enable_xlat: bool,

    /// Interface carries traffic under the fixed-mode policy
    #[serde(default)]
    pub active_link: bool,
}

impl InterfaceConfig {
    /// Create a new DHCP interface configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_interface: String::new(),
            kind: InterfaceKind::Local,
            phy_path: String::new(),
            enable: true,
            enable_dhcp: true,
            enable_ppp: false,
            enable_mapt: false,
            enable_dslite: false,
            enable_ipoe: false,
            enable_xlat: false,
            active_link: false,
        }
    }

    /// Set the interface kind
    pub fn with_kind(mut self, kind: InterfaceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the base interface
    pub fn with_base_interface(mut self, base: impl Into<String>) -> Self {
        self.base_interface = base.into();
        self
    }

    /// Set the physical link path
    pub fn with_phy_path(mut self, path: impl Into<String>) -> Self {
        self.phy_path = path.into();
        self
    }

    /// Use PPP instead of DHCP
    pub fn with_ppp(mut self, enable: bool) -> Self {
        self.enable_ppp = enable;
        if enable {
            self.enable_dhcp = false;
        }
        self
    }

    /// Enable or disable DHCP clients
    pub fn with_dhcp(mut self, enable: bool) -> Self {
        self.enable_dhcp = enable;
        self
    }

    /// Enable or disable MAP-T
    pub fn with_mapt(mut self, enable: bool) -> Self {
        self.enable_mapt = enable;
        self
    }

    /// Enable or disable the IPoE health check
    pub fn with_ipoe(mut self, enable: bool) -> Self {
        self.enable_ipoe = enable;
        self
    }

    /// Enable or disable 464XLAT
    pub fn with_xlat(mut self, enable: bool) -> Self {
        self.enable_xlat = enable;
        self
    }

    /// Mark as the active link for the fixed-mode policy
    pub fn with_active_link(mut self, active: bool) -> Self {
        self.active_link = active;
        self
    }

    /// Validate the interface configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.is_empty() {
            return Err(crate::Error::config("WAN interface name cannot be empty"));
        }
        if self.enable_ppp && self.enable_dhcp {
            return Err(crate::Error::config(format!(
                "WAN interface {} cannot enable both PPP and DHCP",
                self.name
            )));
        }
        Ok(())
    }
}

/// IPC endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Unix datagram socket receiving lease and health-check events
    #[serde(default = "default_listen_path")]
    pub listen_path: String,

    /// Unix datagram socket of the health-check process
    #[serde(default = "default_ihc_path")]
    pub ihc_path: String,

    /// Attempts to stage a lease payload while a previous one is pending
    #[serde(default = "default_max_tries")]
    pub max_tries: usize,

    /// Wait between staging attempts (milliseconds)
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,
}

impl IpcConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.listen_path.is_empty() {
            return Err(crate::Error::config("IPC listen path cannot be empty"));
        }
        if self.max_tries == 0 {
            return Err(crate::Error::config("IPC max tries must be > 0"));
        }
        Ok(())
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            listen_path: default_listen_path(),
            ihc_path: default_ihc_path(),
            max_tries: default_max_tries(),
            retry_wait_ms: default_retry_wait_ms(),
        }
    }
}

/// DHCPv6 restart polling used by the MAP-T feature refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaptRefreshConfig {
    #[serde(default = "default_mapt_max_polls")]
    pub max_polls: usize,

    #[serde(default = "default_one_second_ms")]
    pub poll_interval_ms: u64,
}

impl Default for MaptRefreshConfig {
    fn default() -> Self {
        Self {
            max_polls: default_mapt_max_polls(),
            poll_interval_ms: default_one_second_ms(),
        }
    }
}

/// Status store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusStoreConfig {
    /// Persistent keys written to a JSON file
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl StatusStoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StatusStoreConfig::File { path } if path.is_empty() => Err(crate::Error::config(
                "Status store path cannot be empty",
            )),
            _ => Ok(()),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_policy_interval_ms() -> u64 {
    500
}

fn default_lock_timeout_ms() -> u64 {
    1000
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_listen_path() -> String {
    "/tmp/wanmgr.sock".to_string()
}

fn default_ihc_path() -> String {
    "/tmp/ipoe_hc.sock".to_string()
}

fn default_max_tries() -> usize {
    5
}

fn default_retry_wait_ms() -> u64 {
    30
}

fn default_mapt_max_polls() -> usize {
    10
}

fn default_one_second_ms() -> u64 {
    1000
}
