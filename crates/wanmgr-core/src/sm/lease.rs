//! Lease application
//!
//! Staged DHCP payloads are applied to the interface record at the start of
//! a tick, before the state handler runs. Applying a payload only updates
//! the record and the lease bookkeeping keys; network configuration is
//! left to the state handlers, which react to the dirty flags set here.

use tracing::{debug, info, warn};

use crate::keys;
use crate::model::{
    InterfaceStatusUpdate, Ipv4Data, Ipv4LeaseEvent, Ipv6Data, Ipv6LeaseEvent, MaptStatus,
    WanInterface,
};
use crate::traits::{Platform, StatusStore};

use super::setup::{ipv4_info_set, ipv6_info_init};

/// Apply a DHCPv4 payload
///
/// A new address (or mask, gateway, nameservers) sets `ipv4_changed`; the
/// same lease again sets `ipv4_renewed`. An expired lease takes IPv4 down.
pub async fn apply_ipv4_lease(platform: &Platform, iface: &mut WanInterface, event: &Ipv4LeaseEvent) {
    let status = platform.status.as_ref();
    let ifname = iface.wan.name.clone();
    let changed = iface.ip.ipv4.differs_from(event);

    let uptime = platform.network.uptime_secs().await;
    status
        .set_logged(&keys::ipv4_start_time(&ifname), &uptime.to_string())
        .await;

    if event.address_assigned {
        if changed {
            info!("New IPv4 lease on {}: {}/{}", ifname, event.ip, event.mask);
            ipv4_info_set(status, &ifname, event).await;
            iface.ip.ipv4_changed = true;
        } else {
            debug!("IPv4 lease renewed on {}", ifname);
            status
                .set_logged(&keys::ipv4_lease_time(&ifname), &event.lease_time.to_string())
                .await;
            status
                .set_logged(&keys::ipv4_dhcp_state(&ifname), &event.dhcp_state)
                .await;
            iface.ip.ipv4_renewed = true;
        }
        iface.ip.ipv4 = Ipv4Data::from(event);
        iface.update_status(InterfaceStatusUpdate::ConnectionUp);
    } else if event.is_expired {
        info!("IPv4 lease expired on {}", ifname);
        iface.ip.ipv4 = Ipv4Data::from(event);
        iface.update_status(InterfaceStatusUpdate::ConnectionDown);
    } else {
        debug!("Ignoring DHCPv4 payload for {} without address", ifname);
    }
}

/// Apply a DHCPv6 payload
///
/// Only a delegated prefix brings IPv6 up; anything else takes it down.
/// MAP-T parameters ride along and start, update or stop MAP-T.
pub async fn apply_ipv6_lease(platform: &Platform, iface: &mut WanInterface, event: &Ipv6LeaseEvent) {
    let status = platform.status.as_ref();
    let ifname = iface.wan.name.clone();

    if !event.prefix_assigned || event.is_expired {
        info!("IPv6 lease lost on {}", ifname);
        apply_status_update(status, iface, InterfaceStatusUpdate::Ipv6Down).await;
        return;
    }

    let changed = iface.ip.ipv6.differs_from(event);

    if let Err(e) = status.set_persistent(keys::IPV6_ADDRESS, &event.address).await {
        warn!("Failed to persist {}: {}", keys::IPV6_ADDRESS, e);
    }
    if event.domain_name_assigned {
        status
            .set_logged(keys::IPV6_DOMAIN, &event.domain_name)
            .await;
    }

    if changed {
        info!("New IPv6 prefix on {}: {}", ifname, event.site_prefix);
        iface.ip.ipv6_changed = true;
    } else {
        debug!("IPv6 lease renewed on {}", ifname);
        iface.ip.ipv6_renewed = true;
    }
    iface.ip.ipv6 = Ipv6Data::from(event);

    match &event.mapt {
        Some(params) if iface.wan.enable_mapt => {
            if iface.mapt.status == MaptStatus::Up && iface.mapt.params.as_ref() != Some(params) {
                info!("MAP-T rule changed on {}", ifname);
                iface.mapt.changed = true;
            }
            iface.mapt.params = Some(params.clone());
            if iface.mapt.status == MaptStatus::Down {
                iface.update_status(InterfaceStatusUpdate::MaptStart);
            }
        }
        _ => {
            if iface.mapt.status == MaptStatus::Up {
                info!("MAP-T rule withdrawn on {}", ifname);
                iface.update_status(InterfaceStatusUpdate::MaptStop);
            }
            iface.mapt.params = None;
        }
    }

    iface.update_status(InterfaceStatusUpdate::Ipv6Up);
}

/// Apply a connection status update along with its status-store effects
pub async fn apply_status_update(
    status: &dyn StatusStore,
    iface: &mut WanInterface,
    update: InterfaceStatusUpdate,
) {
    iface.update_status(update);
    if update == InterfaceStatusUpdate::Ipv6Down {
        ipv6_info_init(status).await;
    }
}
