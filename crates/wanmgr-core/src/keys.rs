//! Status-store key names
//!
//! Volatile keys are the event bus shared with the rest of the gateway
//! (firewall, DHCP server, router advertisement daemon). Persistent keys
//! survive a reboot.

// Global volatile keys
pub const CURRENT_WAN_IFNAME: &str = "current_wan_ifname";
pub const CURRENT_WAN_IPADDR: &str = "current_wan_ipaddr";
pub const CURRENT_WAN_SUBNET: &str = "current_wan_subnet";
pub const CURRENT_WAN_STATE: &str = "current_wan_state";
pub const CURRENT_IPV4_LINK_STATE: &str = "current_ipv4_link_state";
pub const WAN_START_TIME: &str = "wan_start_time";
pub const IPV4_CONNECTION_STATE: &str = "ipv4_connection_state";
pub const IPV6_CONNECTION_STATE: &str = "ipv6_connection_state";
pub const IPV4_WAN_ADDRESS: &str = "ipv4_wan_ipaddr";
pub const IPV4_WAN_SUBNET: &str = "ipv4_wan_subnet";
pub const IPV4_DEFAULT_ROUTER: &str = "default_router";
pub const IPV4_TIME_OFFSET: &str = "ipv4-timeoffset";
pub const DHCPV4_TIME_OFFSET: &str = "dhcpv4-timeoffset";
pub const IPV4_TIME_ZONE: &str = "ipv4_timezone";
pub const IPV4_DNS_PRIMARY: &str = "ipv4_dns_0";
pub const IPV4_DNS_SECONDARY: &str = "ipv4_dns_1";
pub const IPV6_DNS_PRIMARY: &str = "ipv6_dns_0";
pub const IPV6_DNS_SECONDARY: &str = "ipv6_dns_1";
pub const IPV6_DOMAIN: &str = "ipv6_domain";
pub const IPV6_PREFIX: &str = "ipv6_prefix";
pub const IPV6_PREFIX_VLTIME: &str = "ipv6_prefix_vldtime";
pub const IPV6_PREFIX_PLTIME: &str = "ipv6_prefix_prdtime";
pub const PREVIOUS_IPV6_PREFIX: &str = "previous_ipv6_prefix";
pub const PREVIOUS_IPV6_PREFIX_VLTIME: &str = "previous_ipv6_prefix_vldtime";
pub const PREVIOUS_IPV6_PREFIX_PLTIME: &str = "previous_ipv6_prefix_prdtime";
pub const GLOBAL_IPV6_PREFIX_SET: &str = "lan_prefix_set";
pub const GLOBAL_IPV6_PREFIX_CLEAR: &str = "lan_prefix_clear";
pub const WAN_SERVICE_STATUS: &str = "wan_service-status";
pub const WAN_STATUS: &str = "wan-status";
pub const ETHWAN_INITIALIZED: &str = "ethwan-initialized";
pub const MAPT_CONFIG_FLAG: &str = "mapt_config_flag";
pub const IPV6_TOGGLE: &str = "ipv6Toggle";
pub const IHC_IPV4_STATUS: &str = "ipoe_health_check_ipv4_status";
pub const IHC_IPV6_STATUS: &str = "ipoe_health_check_ipv6_status";

// Events (value-less triggers)
pub const WAN_START: &str = "wan-start";
pub const WAN_STOP: &str = "wan-stop";
pub const FIREWALL_RESTART: &str = "firewall-restart";
pub const DHCP_SERVER_RESTART: &str = "dhcp_server-restart";
pub const RADVD_RESTART: &str = "radvd_restart";
pub const SERVICES_RESTART: &str = "wan-services-restart";

// Values
pub const VALUE_UP: &str = "up";
pub const VALUE_DOWN: &str = "down";
pub const VALUE_STARTED: &str = "started";
pub const VALUE_STOPPED: &str = "stopped";
pub const VALUE_FAILED: &str = "failed";

// Persistent keys
pub const WAN_INTERFACE_NAME: &str = "wan_physical_ifname";
pub const IPV6_ADDRESS: &str = "wan_ipv6addr";
pub const IPV6_PREFIX_ADDRESS: &str = "ipv6_prefix_address";
pub const LAST_EROUTER_MODE: &str = "last_erouter_mode";
pub const IHC_ENABLE: &str = "IPoE_enable";
pub const IHC_REGULAR_INTERVAL: &str = "IPoE_regular_interval";
pub const IHC_RETRY_LIMIT: &str = "IPoE_retry_limit";
pub const IHC_RETRY_INTERVAL: &str = "IPoE_retry_interval";
pub const IHC_ACTIONS: &str = "IPOE_number_of_actions";

/// Interface used in modem mode for the management address
pub const MESH_IFNAME: &str = "br-home";

pub fn ipv4_address(ifname: &str) -> String {
    format!("ipv4_{}_ipaddr", ifname)
}

pub fn ipv4_subnet(ifname: &str) -> String {
    format!("ipv4_{}_subnet", ifname)
}

pub fn ipv4_gw_number(ifname: &str) -> String {
    format!("ipv4_{}_gw_number", ifname)
}

pub fn ipv4_gw_address(ifname: &str) -> String {
    format!("ipv4_{}_gw_0", ifname)
}

pub fn ipv4_mtu(ifname: &str) -> String {
    format!("ipv4_{}_mtu", ifname)
}

pub fn ipv4_start_time(ifname: &str) -> String {
    format!("ipv4_{}_start_time", ifname)
}

pub fn ipv4_lease_time(ifname: &str) -> String {
    format!("ipv4_{}_lease_time", ifname)
}

pub fn ipv4_dhcp_server(ifname: &str) -> String {
    format!("ipv4_{}_dhcp_server", ifname)
}

pub fn ipv4_dhcp_state(ifname: &str) -> String {
    format!("ipv4_{}_dhcp_state", ifname)
}

pub fn ipv4_ds_rate(ifname: &str) -> String {
    format!("ipv4_{}_ds_current_rate", ifname)
}

pub fn ipv4_us_rate(ifname: &str) -> String {
    format!("ipv4_{}_us_current_rate", ifname)
}

pub fn ipv4_dns_number(ifname: &str) -> String {
    format!("ipv4_{}_dns_number", ifname)
}

pub fn ipv4_dns(ifname: &str, index: usize) -> String {
    format!("ipv4_{}_dns_{}", ifname, index)
}

/// Persistent active-link flag of the interface at `index`
pub fn active_link(index: usize) -> String {
    format!("wan_active_link_{}", index)
}

pub fn dhcpv6_client_prefix(ifname: &str) -> String {
    format!("tr_{}_dhcpv6_client_v6pref", ifname)
}
