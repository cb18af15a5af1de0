//! Network setup and teardown per address family
//!
//! Each step that fails is logged and the sequence continues, so a partial
//! failure leaves as much configuration in place as possible. The first
//! hard failure is returned to the caller, which logs it again with the
//! state it happened in.

use std::net::Ipv4Addr;

use tracing::{error, info, warn};

use crate::dns::update_dns;
use crate::keys;
use crate::model::lease::{DEFAULT_MTU, Ipv4Data, Ipv4LeaseEvent};
use crate::model::{DeviceNetworkingMode, WanInterface};
use crate::traits::StatusStore;

use super::InterfaceStateMachine;

/// Broadcast address of `ip` within `mask`
pub fn broadcast_address(ip: &str, mask: &str) -> crate::Result<String> {
    let ip: Ipv4Addr = ip
        .parse()
        .map_err(|_| crate::Error::invalid_input(format!("invalid IPv4 address '{}'", ip)))?;
    let mask: Ipv4Addr = mask
        .parse()
        .map_err(|_| crate::Error::invalid_input(format!("invalid IPv4 mask '{}'", mask)))?;
    let broadcast = u32::from(ip) | !u32::from(mask);
    Ok(Ipv4Addr::from(broadcast).to_string())
}

/// Publish the address keys for a leased IPv4 configuration
///
/// In modem mode the management bridge owns the address, so the
/// per-interface address key is written for it instead.
pub(crate) async fn set_ipv4_keys(
    status: &dyn StatusStore,
    mode: DeviceNetworkingMode,
    ifname: &str,
    data: &Ipv4Data,
) {
    let addr_ifname = match mode {
        DeviceNetworkingMode::Gateway => {
            status.set_logged(keys::CURRENT_WAN_IFNAME, ifname).await;
            ifname
        }
        DeviceNetworkingMode::Modem => {
            status
                .set_logged(keys::CURRENT_WAN_IFNAME, keys::MESH_IFNAME)
                .await;
            keys::MESH_IFNAME
        }
    };

    status
        .set_logged(&keys::ipv4_address(addr_ifname), &data.ip)
        .await;
    status.set_logged(keys::IPV4_WAN_ADDRESS, &data.ip).await;
    status.set_logged(&keys::ipv4_subnet(ifname), &data.mask).await;
    status.set_logged(keys::IPV4_WAN_SUBNET, &data.mask).await;
    status.set_logged(&keys::ipv4_gw_number(ifname), "1").await;
    status
        .set_logged(&keys::ipv4_gw_address(ifname), &data.gateway)
        .await;
    status
        .set_logged(keys::IPV4_DEFAULT_ROUTER, &data.gateway)
        .await;
    status
        .set_logged(&keys::ipv4_mtu(ifname), &data.mtu_size.to_string())
        .await;
}

/// Publish lease bookkeeping that changes with every new lease
pub(crate) async fn ipv4_info_set(status: &dyn StatusStore, ifname: &str, event: &Ipv4LeaseEvent) {
    status
        .set_logged(&keys::ipv4_ds_rate(ifname), &event.downstream_rate.to_string())
        .await;
    status
        .set_logged(&keys::ipv4_us_rate(ifname), &event.upstream_rate.to_string())
        .await;

    if event.time_offset_assigned {
        status
            .set_logged(keys::IPV4_TIME_OFFSET, &format!("@{}", event.time_offset))
            .await;
        status.set_logged(keys::DHCPV4_TIME_OFFSET, "set").await;
    }

    status
        .set_logged(keys::IPV4_TIME_ZONE, &event.time_zone)
        .await;
    status
        .set_logged(&keys::ipv4_dhcp_server(ifname), &event.dhcp_server_id)
        .await;
    status
        .set_logged(&keys::ipv4_dhcp_state(ifname), &event.dhcp_state)
        .await;
    status
        .set_logged(&keys::ipv4_lease_time(ifname), &event.lease_time.to_string())
        .await;
}

/// Reset every IPv4 key to its unconfigured value
pub(crate) async fn ipv4_info_init(
    status: &dyn StatusStore,
    ifname: &str,
    mode: DeviceNetworkingMode,
) {
    status
        .set_logged(keys::CURRENT_WAN_IPADDR, "0.0.0.0")
        .await;
    status
        .set_logged(&keys::ipv4_start_time(ifname), "0")
        .await;

    ipv4_info_set(status, ifname, &Ipv4LeaseEvent::default()).await;

    let unset = Ipv4Data {
        ifname: ifname.to_string(),
        ip: "0.0.0.0".to_string(),
        mask: "0.0.0.0".to_string(),
        gateway: "0.0.0.0".to_string(),
        mtu_size: DEFAULT_MTU,
        ..Default::default()
    };
    set_ipv4_keys(status, mode, ifname, &unset).await;
}

/// Reset the IPv6 keys to their unconfigured values
pub(crate) async fn ipv6_info_init(status: &dyn StatusStore) {
    status.set_logged(keys::IPV6_DOMAIN, "").await;
    status
        .set_logged(keys::IPV6_CONNECTION_STATE, keys::VALUE_DOWN)
        .await;
    if let Err(e) = status.set_persistent(keys::IPV6_PREFIX_ADDRESS, "").await {
        warn!("Failed to clear {}: {}", keys::IPV6_PREFIX_ADDRESS, e);
    }
}

impl InterfaceStateMachine {
    /// Configure the leased IPv4 address, routes and resolver
    pub(super) async fn setup_ipv4(
        &self,
        mode: DeviceNetworkingMode,
        iface: &WanInterface,
    ) -> crate::Result<()> {
        let status = self.platform.status.as_ref();
        let network = self.platform.network.as_ref();
        let ifname = iface.wan.name.as_str();
        let data = &iface.ip.ipv4;

        set_ipv4_keys(status, mode, ifname, data).await;

        let broadcast = broadcast_address(&data.ip, &data.mask)?;
        network.configure_ipv4(ifname, data, &broadcast).await?;

        if iface.is_ppp() {
            if let Err(e) = network.add_gateway_route(data).await {
                error!("Failed to add gateway route for {}: {}", ifname, e);
            }
        }

        if let Err(e) = update_dns(
            network,
            status,
            mode,
            iface,
            true,
            iface.ip.ipv6_status.is_up(),
        )
        .await
        {
            error!("Failed to update DNS for {}: {}", ifname, e);
        }

        if let Err(e) = network.add_default_route(mode, data).await {
            error!("Failed to add default route for {}: {}", ifname, e);
        }

        status
            .set_logged(keys::IPV4_CONNECTION_STATE, keys::VALUE_UP)
            .await;
        status
            .set_logged(keys::CURRENT_IPV4_LINK_STATE, keys::VALUE_UP)
            .await;
        status
            .set_logged(keys::CURRENT_WAN_STATE, keys::VALUE_UP)
            .await;
        status.set_logged(keys::CURRENT_WAN_IPADDR, &data.ip).await;
        status.set_logged(keys::CURRENT_WAN_SUBNET, &data.mask).await;
        let uptime = network.uptime_secs().await;
        status
            .set_logged(keys::WAN_START_TIME, &uptime.to_string())
            .await;

        if iface.is_ethernet() {
            status.set_logged(keys::ETHWAN_INITIALIZED, "1").await;
        }

        if status.get_or_empty(keys::WAN_STATUS).await != keys::VALUE_STARTED {
            info!("Starting WAN services on {}", ifname);
            status.notify_logged(keys::WAN_START).await;
            status
                .set_logged(keys::WAN_STATUS, keys::VALUE_STARTED)
                .await;
            if !data.ifname.is_empty() {
                self.persist_wan_ifname(&data.ifname).await;
            }
            status.notify_logged(keys::SERVICES_RESTART).await;
        }

        status.notify_logged(keys::FIREWALL_RESTART).await;
        info!("IPv4 configured on {} with {}/{}", ifname, data.ip, data.mask);
        Ok(())
    }

    /// Remove the IPv4 configuration
    ///
    /// Runs every step even when an earlier one fails.
    pub(super) async fn teardown_ipv4(
        &self,
        mode: DeviceNetworkingMode,
        mode_changed: bool,
        iface: &WanInterface,
    ) -> crate::Result<()> {
        let status = self.platform.status.as_ref();
        let network = self.platform.network.as_ref();
        let ifname = iface.wan.name.as_str();
        let v6_up = iface.ip.ipv6_status.is_up();

        if let Err(e) = update_dns(network, status, mode, iface, false, v6_up).await {
            error!("Failed to update DNS for {}: {}", ifname, e);
        }

        let result = network.unconfigure_ipv4(ifname).await;
        if let Err(e) = &result {
            error!("Failed to remove IPv4 address from {}: {}", ifname, e);
        }

        if let Err(e) = network
            .delete_default_route(mode, mode_changed, &iface.ip.ipv4)
            .await
        {
            error!("Failed to delete default route for {}: {}", ifname, e);
        }

        status
            .set_logged(keys::IPV4_CONNECTION_STATE, keys::VALUE_DOWN)
            .await;
        status
            .set_logged(keys::CURRENT_IPV4_LINK_STATE, keys::VALUE_DOWN)
            .await;
        status
            .set_logged(keys::CURRENT_WAN_STATE, keys::VALUE_DOWN)
            .await;
        status.set_logged(keys::WAN_START_TIME, "0").await;
        status
            .set_logged(keys::CURRENT_WAN_IPADDR, "0.0.0.0")
            .await;
        status
            .set_logged(keys::CURRENT_WAN_SUBNET, "255.255.255.0")
            .await;
        status.notify_logged(keys::FIREWALL_RESTART).await;

        if iface.is_ethernet() {
            status.set_logged(keys::ETHWAN_INITIALIZED, "0").await;
        }

        if status.get_or_empty(keys::WAN_STATUS).await != keys::VALUE_STOPPED && !v6_up {
            status
                .set_logged(keys::WAN_STATUS, keys::VALUE_STOPPED)
                .await;
            info!("WAN services stopped on {}", ifname);
        }

        result
    }

    /// Apply the IPv6 resolver and raise the LAN-side restarts
    pub(super) async fn setup_ipv6(
        &self,
        mode: DeviceNetworkingMode,
        iface: &WanInterface,
    ) -> crate::Result<()> {
        let status = self.platform.status.as_ref();
        let network = self.platform.network.as_ref();
        let ifname = iface.wan.name.as_str();

        if let Err(e) = update_dns(
            network,
            status,
            mode,
            iface,
            iface.ip.ipv4_status.is_up(),
            true,
        )
        .await
        {
            error!("Failed to update DNS for {}: {}", ifname, e);
        }

        status
            .set_logged(keys::IPV6_CONNECTION_STATE, keys::VALUE_UP)
            .await;
        status.notify_logged(keys::RADVD_RESTART).await;
        status.notify_logged(keys::DHCP_SERVER_RESTART).await;
        status.notify_logged(keys::FIREWALL_RESTART).await;

        if status.get_or_empty(keys::WAN_STATUS).await != keys::VALUE_STARTED {
            info!("Starting WAN services on {}", ifname);
            status.notify_logged(keys::WAN_START).await;
            status
                .set_logged(keys::WAN_STATUS, keys::VALUE_STARTED)
                .await;
            status
                .set_logged(keys::CURRENT_WAN_IFNAME, &iface.ip.ipv6.ifname)
                .await;
            self.persist_wan_ifname(&iface.ip.ipv6.ifname).await;
            status.notify_logged(keys::SERVICES_RESTART).await;
        }

        Ok(())
    }

    /// Remove the IPv6 configuration and retire the current prefix
    pub(super) async fn teardown_ipv6(
        &self,
        mode: DeviceNetworkingMode,
        iface: &WanInterface,
    ) -> crate::Result<()> {
        let status = self.platform.status.as_ref();
        let network = self.platform.network.as_ref();
        let ifname = iface.wan.name.as_str();
        let v4_up = iface.ip.ipv4_status.is_up();

        if let Err(e) = update_dns(network, status, mode, iface, v4_up, false).await {
            error!("Failed to update DNS for {}: {}", ifname, e);
        }

        let result = network.remove_lan_ipv6_address().await;
        if let Err(e) = &result {
            error!("Failed to remove LAN IPv6 address: {}", e);
        }

        let prefix = status.get_or_empty(keys::IPV6_PREFIX).await;
        if !prefix.is_empty() {
            let vltime = status.get_or_empty(keys::IPV6_PREFIX_VLTIME).await;
            let pltime = status.get_or_empty(keys::IPV6_PREFIX_PLTIME).await;
            status.set_logged(keys::PREVIOUS_IPV6_PREFIX, &prefix).await;
            status
                .set_logged(keys::PREVIOUS_IPV6_PREFIX_VLTIME, &vltime)
                .await;
            status
                .set_logged(keys::PREVIOUS_IPV6_PREFIX_PLTIME, &pltime)
                .await;
        }
        status.set_logged(keys::IPV6_PREFIX, "").await;
        status
            .set_logged(&keys::dhcpv6_client_prefix(ifname), "")
            .await;
        status
            .set_logged(keys::IPV6_CONNECTION_STATE, keys::VALUE_DOWN)
            .await;
        status.set_logged(keys::GLOBAL_IPV6_PREFIX_SET, "").await;
        status.notify_logged(keys::FIREWALL_RESTART).await;

        if status.get_or_empty(keys::WAN_STATUS).await != keys::VALUE_STOPPED && !v4_up {
            status
                .set_logged(keys::WAN_STATUS, keys::VALUE_STOPPED)
                .await;
            info!("WAN services stopped on {}", ifname);
        }

        result
    }

    /// Publish the delegated prefix for the LAN side
    ///
    /// The LAN side picks it up and reports back through
    /// `lan_prefix_set`, which [`Self::bridge_mode_ready`] waits for.
    pub(super) async fn setup_lan_prefix_ipv6(&self, iface: &WanInterface) -> crate::Result<()> {
        let status = self.platform.status.as_ref();
        let v6 = &iface.ip.ipv6;

        if v6.site_prefix.is_empty() {
            return Err(crate::Error::invalid_input(format!(
                "No delegated prefix known for {}",
                iface.wan.name
            )));
        }

        status.set(keys::IPV6_PREFIX, &v6.site_prefix).await?;
        status
            .set(keys::IPV6_PREFIX_VLTIME, &v6.prefix_vltime.to_string())
            .await?;
        status
            .set(keys::IPV6_PREFIX_PLTIME, &v6.prefix_pltime.to_string())
            .await?;
        status
            .set(&keys::dhcpv6_client_prefix(&iface.wan.name), &v6.site_prefix)
            .await?;
        status
            .set_persistent(keys::IPV6_PREFIX_ADDRESS, &v6.pd_if_address)
            .await?;
        status.commit().await?;

        info!("Delegated prefix {} published for LAN", v6.site_prefix);
        Ok(())
    }

    /// The LAN bridge has taken the prefix and has a usable IPv6 address
    pub(super) async fn bridge_mode_ready(&self) -> bool {
        let prefix_set = self
            .platform
            .status
            .get_or_empty(keys::GLOBAL_IPV6_PREFIX_SET)
            .await;
        if prefix_set.is_empty() {
            return false;
        }
        match self.platform.network.is_lan_ipv6_ready().await {
            Ok(ready) => ready,
            Err(e) => {
                warn!("LAN IPv6 readiness check failed: {}", e);
                false
            }
        }
    }

    async fn persist_wan_ifname(&self, ifname: &str) {
        let status = self.platform.status.as_ref();
        if let Err(e) = status.set_persistent(keys::WAN_INTERFACE_NAME, ifname).await {
            warn!("Failed to persist {}: {}", keys::WAN_INTERFACE_NAME, e);
            return;
        }
        if let Err(e) = status.commit().await {
            warn!("Failed to commit persistent keys: {}", e);
        }
    }
}
