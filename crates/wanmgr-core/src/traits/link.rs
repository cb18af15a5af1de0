// # Link Layer Manager Trait
//
// The data-model link owners (Ethernet, DSL, cellular managers) that sit
// below the WAN layer. The state machine toggles their upstream flag, asks
// them to refresh the link and publishes the WAN status back to them.

use async_trait::async_trait;

use crate::model::status::WanStatus;

/// IP details owned by the cellular manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellularIpInfo {
    pub ip: String,
    pub mask: String,
    pub gateway: String,
    pub dns_server: String,
    pub dns_server1: String,
    pub mtu: u32,
}

impl CellularIpInfo {
    /// All addressing fields are present
    pub fn is_complete(&self) -> bool {
        !self.ip.is_empty()
            && !self.mask.is_empty()
            && !self.gateway.is_empty()
            && !self.dns_server.is_empty()
            && !self.dns_server1.is_empty()
    }
}

/// Trait for the link layer owners
#[async_trait]
pub trait LinkLayerManager: Send + Sync {
    /// Set the upstream flag of the physical link at `phy_path`
    async fn set_upstream(&self, phy_path: &str, enable: bool) -> Result<(), crate::Error>;

    /// Read the upstream flag of the physical link at `phy_path`
    async fn get_upstream(&self, phy_path: &str) -> Result<bool, crate::Error>;

    /// Ask the link owner to (re)publish the link status for `ifname`
    async fn restart_link_status(&self, ifname: &str) -> Result<(), crate::Error>;

    /// Ask the link owner to refresh the link (VLAN re-creation etc.)
    async fn request_refresh(&self, ifname: &str) -> Result<(), crate::Error>;

    /// Delete the VLAN link carrying `ifname`
    async fn delete_vlan_link(&self, ifname: &str) -> Result<(), crate::Error>;

    /// Fetch IP details from the cellular manager owning `phy_path`
    async fn fetch_cellular_ip(&self, phy_path: &str) -> Result<CellularIpInfo, crate::Error>;

    /// Publish the WAN status of `ifname`
    async fn publish_wan_status(&self, ifname: &str, status: WanStatus)
    -> Result<(), crate::Error>;

    /// Set the upstream flag of every Ethernet port
    async fn set_ethernet_upstream(&self, enable: bool) -> Result<(), crate::Error>;
}
