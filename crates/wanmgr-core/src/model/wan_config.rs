//! Global WAN configuration singleton held by the shared store.

use crate::model::status::{DeviceNetworkingMode, Policy};

/// Global WAN configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WanConfig {
    pub enable: bool,
    pub policy: Policy,
    /// Set by the data-model layer, consumed by the policy loop
    pub policy_changed: bool,
    /// A policy body currently owns one or more interface tasks
    pub interface_sm_running: bool,
    /// One bit per interface index with a running task
    pub ism_running_mask: u64,
    pub device_nw_mode: DeviceNetworkingMode,
    /// Consumed by the first interface task that reads it
    pub device_nw_mode_changed: bool,
    pub mapt_feature_enabled: bool,
    pub mapt_feature_changed: bool,
}

impl WanConfig {
    /// Create the default configuration: enabled, fixed-mode policy
    pub fn new() -> Self {
        Self {
            enable: true,
            policy: Policy::FixedMode,
            policy_changed: false,
            interface_sm_running: false,
            ism_running_mask: 0,
            device_nw_mode: DeviceNetworkingMode::Gateway,
            device_nw_mode_changed: false,
            mapt_feature_enabled: false,
            mapt_feature_changed: false,
        }
    }

    pub fn set_ism_running(&mut self, index: usize, running: bool) {
        if index >= 64 {
            return;
        }
        if running {
            self.ism_running_mask |= 1 << index;
        } else {
            self.ism_running_mask &= !(1 << index);
        }
    }

    pub fn is_ism_running(&self, index: usize) -> bool {
        index < 64 && self.ism_running_mask & (1 << index) != 0
    }
}

impl Default for WanConfig {
    fn default() -> Self {
        Self::new()
    }
}
