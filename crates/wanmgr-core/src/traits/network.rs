// # System Network Configurator Trait
//
// Address, route, resolver and MAP-T/464XLAT configuration requests issued
// by the interface state machine.
//
// ## Contract
//
// Every call is an idempotent "apply this state" request: removing an
// address that is not present, or adding a route that already exists, is
// not an error. Implementations must not hold any interface state of
// their own.
//
// ## Implementations
//
// - `ip(8)` based: `wanmgr-sys-linux` crate

use async_trait::async_trait;

use crate::model::lease::{Ipv4Data, MaptParams};
use crate::model::status::DeviceNetworkingMode;

/// Trait for system network configuration
#[async_trait]
pub trait SystemNetworkConfigurator: Send + Sync {
    /// Assign the leased IPv4 address, mask, broadcast and MTU to `ifname`
    async fn configure_ipv4(
        &self,
        ifname: &str,
        data: &Ipv4Data,
        broadcast: &str,
    ) -> Result<(), crate::Error>;

    /// Remove any IPv4 address from `ifname`
    async fn unconfigure_ipv4(&self, ifname: &str) -> Result<(), crate::Error>;

    /// Host route to the PPP peer
    async fn add_gateway_route(&self, data: &Ipv4Data) -> Result<(), crate::Error>;

    /// Install the IPv4 default route for the networking mode
    async fn add_default_route(
        &self,
        mode: DeviceNetworkingMode,
        data: &Ipv4Data,
    ) -> Result<(), crate::Error>;

    /// Remove the IPv4 default route
    async fn delete_default_route(
        &self,
        mode: DeviceNetworkingMode,
        mode_changed: bool,
        data: &Ipv4Data,
    ) -> Result<(), crate::Error>;

    /// Replace the IPv4 default route with one via `dev` (MAP-T translation)
    async fn replace_default_route(&self, dev: &str, mtu: u32) -> Result<(), crate::Error>;

    /// Remove the global IPv6 address from the LAN bridge
    async fn remove_lan_ipv6_address(&self) -> Result<(), crate::Error>;

    /// Rewrite the resolver configuration with the given nameservers
    async fn write_resolver(&self, nameservers: &[String]) -> Result<(), crate::Error>;

    /// Remove the resolver configuration (modem mode)
    async fn remove_resolver(&self) -> Result<(), crate::Error>;

    /// True once the LAN side has a usable global IPv6 address/default route
    async fn is_lan_ipv6_ready(&self) -> Result<bool, crate::Error>;

    /// Bounce IPv6 on the LAN so clients pick up the new prefix
    async fn toggle_ipv6(&self) -> Result<(), crate::Error>;

    /// Configure the MAP-T translator for `ifname` from the rule parameters
    async fn configure_mapt(
        &self,
        ifname: &str,
        base_interface: &str,
        params: &MaptParams,
    ) -> Result<(), crate::Error>;

    /// Remove the MAP-T translator configuration
    async fn reset_mapt(&self, ifname: &str, base_interface: &str) -> Result<(), crate::Error>;

    /// Start the 464XLAT client on `ifname`
    async fn start_xlat(&self, ifname: &str) -> Result<(), crate::Error>;

    /// Stop the 464XLAT client
    async fn stop_xlat(&self) -> Result<(), crate::Error>;

    /// True if the 464XLAT client is configured
    async fn is_xlat_running(&self) -> bool;

    /// System uptime in seconds, used for start-time keys
    async fn uptime_secs(&self) -> u64;
}
