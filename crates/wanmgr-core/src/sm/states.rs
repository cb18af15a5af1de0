//! Interface state machine states

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one WAN interface state machine
///
/// `Exit` doubles as the "not running" value stored on a record whose
/// task has not started yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WanState {
    ConfiguringWan,
    ValidatingWan,
    ObtainingIpAddresses,
    Ipv4Leased,
    Ipv6Leased,
    DualStackActive,
    MaptActive,
    RefreshingWan,
    Standby,
    DeconfiguringWan,
    #[default]
    Exit,
}

impl WanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WanState::ConfiguringWan => "CONFIGURING_WAN",
            WanState::ValidatingWan => "VALIDATING_WAN",
            WanState::ObtainingIpAddresses => "OBTAINING_IP_ADDRESSES",
            WanState::Ipv4Leased => "IPV4_LEASED",
            WanState::Ipv6Leased => "IPV6_LEASED",
            WanState::DualStackActive => "DUAL_STACK_ACTIVE",
            WanState::MaptActive => "MAPT_ACTIVE",
            WanState::RefreshingWan => "REFRESHING_WAN",
            WanState::Standby => "STANDBY",
            WanState::DeconfiguringWan => "DECONFIGURING_WAN",
            WanState::Exit => "EXIT",
        }
    }

    /// States subject to the enable/selection/physical-link guard
    pub fn is_guarded(&self) -> bool {
        !matches!(self, WanState::DeconfiguringWan | WanState::Exit)
    }

    /// States in which at least one family is configured on the system
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            WanState::Ipv4Leased
                | WanState::Ipv6Leased
                | WanState::DualStackActive
                | WanState::MaptActive
        )
    }
}

impl fmt::Display for WanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
