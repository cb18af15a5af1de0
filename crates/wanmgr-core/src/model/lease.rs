//! Lease payloads delivered over IPC and the applied per-family data kept
//! on the interface record.

use serde::{Deserialize, Serialize};

/// MTU applied when the DHCPv4 server does not assign one
pub const DEFAULT_MTU: u32 = 1500;

/// DHCPv4 lease change reported by the DHCP client helper
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ipv4LeaseEvent {
    /// Interface the client runs on (resolves the target record)
    pub interface: String,
    pub address_assigned: bool,
    pub is_expired: bool,
    pub ip: String,
    pub mask: String,
    pub gateway: String,
    pub dns_server: String,
    pub dns_server1: String,
    pub mtu_assigned: bool,
    pub mtu_size: u32,
    pub lease_time: u32,
    pub rebinding_time: u32,
    pub renewal_time: u32,
    pub time_offset_assigned: bool,
    pub time_offset: i32,
    pub time_zone: String,
    pub dhcp_server_id: String,
    pub dhcp_state: String,
    pub upstream_rate: u32,
    pub downstream_rate: u32,
}

/// MAP-T rule parameters delivered with a DHCPv6 lease
///
/// Address calculation is left to the system configurator; the state
/// machine only moves these around.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaptParams {
    pub rule_ipv6_prefix: String,
    pub rule_ipv4_prefix: String,
    pub br_ipv6_prefix: String,
    pub pd_ipv6_prefix: String,
    pub ea_len: u16,
    pub psid_offset: u16,
    pub psid_len: u16,
    pub psid: u16,
    pub is_fmr: bool,
}

/// DHCPv6 lease change reported by the DHCPv6 client helper
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ipv6LeaseEvent {
    pub ifname: String,
    pub address_assigned: bool,
    pub prefix_assigned: bool,
    pub domain_name_assigned: bool,
    pub is_expired: bool,
    pub address: String,
    pub pd_if_address: String,
    pub site_prefix: String,
    pub prefix_pltime: u32,
    pub prefix_vltime: u32,
    pub nameserver: String,
    pub nameserver1: String,
    pub domain_name: String,
    pub mapt: Option<MaptParams>,
}

/// Applied IPv4 data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv4Data {
    pub ifname: String,
    pub ip: String,
    pub mask: String,
    pub gateway: String,
    pub dns_server: String,
    pub dns_server1: String,
    pub mtu_size: u32,
    pub lease_time: u32,
    pub rebinding_time: u32,
    pub renewal_time: u32,
    pub time_offset: i32,
    pub time_zone: String,
}

impl Ipv4Data {
    /// True if any field the network configuration depends on differs
    pub fn differs_from(&self, event: &Ipv4LeaseEvent) -> bool {
        self.ip != event.ip
            || self.mask != event.mask
            || self.gateway != event.gateway
            || self.dns_server != event.dns_server
            || self.dns_server1 != event.dns_server1
    }
}

impl From<&Ipv4LeaseEvent> for Ipv4Data {
    fn from(event: &Ipv4LeaseEvent) -> Self {
        Self {
            ifname: event.interface.clone(),
            ip: event.ip.clone(),
            mask: event.mask.clone(),
            gateway: event.gateway.clone(),
            dns_server: event.dns_server.clone(),
            dns_server1: event.dns_server1.clone(),
            mtu_size: if event.mtu_assigned && event.mtu_size != 0 {
                event.mtu_size
            } else {
                DEFAULT_MTU
            },
            lease_time: event.lease_time,
            rebinding_time: event.rebinding_time,
            renewal_time: event.renewal_time,
            time_offset: event.time_offset,
            time_zone: event.time_zone.clone(),
        }
    }
}

/// Applied IPv6 data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ipv6Data {
    pub ifname: String,
    pub address: String,
    pub pd_if_address: String,
    pub site_prefix: String,
    pub prefix_pltime: u32,
    pub prefix_vltime: u32,
    pub nameserver: String,
    pub nameserver1: String,
    pub domain_name: String,
}

impl Ipv6Data {
    /// True if address, delegated prefix or nameservers differ
    pub fn differs_from(&self, event: &Ipv6LeaseEvent) -> bool {
        self.address != event.address
            || self.site_prefix != event.site_prefix
            || self.pd_if_address != event.pd_if_address
            || self.nameserver != event.nameserver
            || self.nameserver1 != event.nameserver1
    }
}

impl From<&Ipv6LeaseEvent> for Ipv6Data {
    fn from(event: &Ipv6LeaseEvent) -> Self {
        Self {
            ifname: event.ifname.clone(),
            address: event.address.clone(),
            pd_if_address: event.pd_if_address.clone(),
            site_prefix: event.site_prefix.clone(),
            prefix_pltime: event.prefix_pltime,
            prefix_vltime: event.prefix_vltime,
            nameserver: event.nameserver.clone(),
            nameserver1: event.nameserver1.clone(),
            domain_name: event.domain_name.clone(),
        }
    }
}
