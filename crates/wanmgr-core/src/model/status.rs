//! Status enumerations shared by the interface record, the state machine
//! and the policy loop.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the WAN interface physically lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    /// Link owned by this gateway (DSL, Ethernet WAN, DOCSIS)
    #[default]
    Local,
    /// Link terminated on a remote device; upstream is not ours to toggle
    Remote,
    /// Cellular modem; addressing is pulled from the cellular manager
    Cellular,
}

/// Physical layer status reported by the link manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhyStatus {
    #[default]
    Down,
    Initializing,
    Up,
}

/// Data link status of the WAN interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    #[default]
    Down,
    Configuring,
    Up,
}

/// Published WAN status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WanStatus {
    #[default]
    Disabled,
    Initialising,
    Validating,
    Up,
    Standby,
}

impl WanStatus {
    /// Name used on the status surface
    pub fn as_str(&self) -> &'static str {
        match self {
            WanStatus::Disabled => "Disabled",
            WanStatus::Initialising => "Initialising",
            WanStatus::Validating => "Validating",
            WanStatus::Up => "Up",
            WanStatus::Standby => "Standby",
        }
    }
}

impl fmt::Display for WanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy-assigned role of an interface
///
/// Written only by the policy controller; the state machine reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    #[default]
    NotSelected,
    Standby,
    Active,
}

/// Up/down status of one IP family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyStatus {
    #[default]
    Down,
    Up,
}

impl FamilyStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, FamilyStatus::Up)
    }
}

/// MAP-T status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaptStatus {
    #[default]
    Down,
    Up,
}

/// DS-Lite status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsliteStatus {
    #[default]
    Down,
    Up,
}

/// PPP control protocol status (IPCP / IPV6CP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpcpStatus {
    #[default]
    Down,
    Up,
}

/// PPP encapsulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PppLinkType {
    #[default]
    Pppoe,
    Pppoa,
}

/// Per-family IPoE health-check notification state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IhcState {
    #[default]
    Stopped,
    Started,
}

/// Gateway (routing) or modem (bridged) operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceNetworkingMode {
    #[default]
    Gateway,
    Modem,
}

/// WAN selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    #[default]
    FixedMode,
    FixedModeOnBootup,
    PrimaryPriority,
    PrimaryPriorityOnBootup,
    MultiWan,
    AutoWan,
    ParallelScan,
}

impl Policy {
    /// Policies that drive the upstream hardware configuration themselves
    pub fn manages_upstream(&self) -> bool {
        matches!(self, Policy::AutoWan | Policy::ParallelScan)
    }
}

impl std::str::FromStr for Policy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed_mode" | "fixedmode" => Ok(Policy::FixedMode),
            "fixed_mode_on_bootup" => Ok(Policy::FixedModeOnBootup),
            "primary_priority" => Ok(Policy::PrimaryPriority),
            "primary_priority_on_bootup" => Ok(Policy::PrimaryPriorityOnBootup),
            "multi_wan" | "multiwan" => Ok(Policy::MultiWan),
            "auto_wan" | "autowan" => Ok(Policy::AutoWan),
            "parallel_scan" => Ok(Policy::ParallelScan),
            other => Err(crate::Error::invalid_input(format!("unknown policy '{}'", other))),
        }
    }
}

/// Connection status update applied to an interface record
///
/// These are the synthetic events produced by lease handling and the
/// IPC health-check handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceStatusUpdate {
    ConnectionUp,
    ConnectionDown,
    Ipv6Up,
    Ipv6Down,
    MaptStart,
    MaptStop,
}
