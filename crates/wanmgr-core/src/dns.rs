//! DNS server validation and resolver update
//!
//! Nameservers learnt from DHCP are validated per address family before
//! they reach the resolver or the status keys. The DHCP server is only
//! restarted when the nameserver set actually changed.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::keys;
use crate::model::{DeviceNetworkingMode, WanInterface};
use crate::traits::{StatusStore, SystemNetworkConfigurator};

/// Nameserver written when no valid server is known
pub const LOOPBACK_NAMESERVER: &str = "127.0.0.1";

/// Address family of a nameserver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

/// Check a nameserver address
///
/// IPv4 rejects the zero, broadcast, link-local and loopback ranges; IPv6
/// rejects the unspecified address. Unparseable input is invalid.
pub fn is_valid_dns_server(family: AddressFamily, server: &str) -> bool {
    if server.is_empty() {
        return false;
    }
    let valid = match family {
        AddressFamily::V4 => server.parse::<Ipv4Addr>().is_ok_and(|addr| {
            !addr.is_unspecified()
                && !addr.is_broadcast()
                && !addr.is_link_local()
                && !addr.is_loopback()
        }),
        AddressFamily::V6 => server
            .parse::<Ipv6Addr>()
            .is_ok_and(|addr| !addr.is_unspecified()),
    };
    if !valid {
        tracing::debug!("Rejecting nameserver {:?} ({:?})", server, family);
    }
    valid
}

/// Publish the interface's nameservers and rewrite the resolver
///
/// In gateway mode the resolver is rewritten with every valid server (or
/// the loopback address when none is valid); in modem mode it is removed.
/// `dhcp_server-restart` is raised only when the servers differ from the
/// previously published ones.
pub async fn update_dns(
    network: &dyn SystemNetworkConfigurator,
    status: &dyn StatusStore,
    mode: DeviceNetworkingMode,
    iface: &WanInterface,
    add_ipv4: bool,
    add_ipv6: bool,
) -> crate::Result<()> {
    let ifname = iface.wan.name.as_str();
    let v4 = &iface.ip.ipv4;
    let v6 = &iface.ip.ipv6;

    let previous = [
        status.get_or_empty(keys::IPV4_DNS_PRIMARY).await,
        status.get_or_empty(keys::IPV4_DNS_SECONDARY).await,
        status.get_or_empty(keys::IPV6_DNS_PRIMARY).await,
        status.get_or_empty(keys::IPV6_DNS_SECONDARY).await,
    ];

    let mut nameservers = Vec::new();

    if add_ipv4 {
        let servers = [
            (&v4.dns_server, keys::IPV4_DNS_PRIMARY),
            (&v4.dns_server1, keys::IPV4_DNS_SECONDARY),
        ];
        for (idx, (server, global_key)) in servers.into_iter().enumerate() {
            let value = if is_valid_dns_server(AddressFamily::V4, server) {
                tracing::info!("New v4 DNS server for {}: {}", ifname, server);
                nameservers.push(server.clone());
                server.as_str()
            } else {
                ""
            };
            status.set(&keys::ipv4_dns(ifname, idx), value).await?;
            status.set(global_key, value).await?;
        }
        if nameservers.len() == 2 {
            status.set(&keys::ipv4_dns_number(ifname), "2").await?;
        }
    }

    if add_ipv6 {
        let servers = [
            (&v6.nameserver, keys::IPV6_DNS_PRIMARY),
            (&v6.nameserver1, keys::IPV6_DNS_SECONDARY),
        ];
        for (server, global_key) in servers {
            if is_valid_dns_server(AddressFamily::V6, server) {
                tracing::info!("New v6 DNS server for {}: {}", ifname, server);
                nameservers.push(server.clone());
                status.set(global_key, server).await?;
            } else {
                status.set(global_key, "").await?;
            }
        }
    }

    let current = [
        v4.dns_server.as_str(),
        v4.dns_server1.as_str(),
        v6.nameserver.as_str(),
        v6.nameserver1.as_str(),
    ];
    if current.iter().zip(previous.iter()).any(|(new, old)| new != old) {
        tracing::info!("Nameservers changed, raising {}", keys::DHCP_SERVER_RESTART);
        status.notify(keys::DHCP_SERVER_RESTART).await?;
    } else {
        tracing::debug!("Nameservers unchanged");
    }

    if nameservers.is_empty() {
        tracing::error!("No valid nameserver is available, using loopback");
        nameservers.push(LOOPBACK_NAMESERVER.to_string());
    }

    match mode {
        DeviceNetworkingMode::Gateway => network.write_resolver(&nameservers).await,
        DeviceNetworkingMode::Modem => network.remove_resolver().await,
    }
}
