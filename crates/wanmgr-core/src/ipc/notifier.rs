//! Connection notifications pushed to the IPoE health-check process

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ipc::IhcTransport;
use crate::keys;
use crate::traits::StatusStore;

/// Notification sent to the health-check process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IhcNotification {
    WanUp { ifname: String, address: String },
    WanDown { ifname: String },
    WanIpv6Up { ifname: String, address: String },
    WanIpv6Down { ifname: String },
}

/// Sends connection transitions to the health-check process
///
/// Up notifications carry the current address read from the status store.
/// A missing address fails that notification only.
#[derive(Clone)]
pub struct IhcNotifier {
    transport: Arc<dyn IhcTransport>,
    status: Arc<dyn StatusStore>,
}

impl IhcNotifier {
    pub fn new(transport: Arc<dyn IhcTransport>, status: Arc<dyn StatusStore>) -> Self {
        Self { transport, status }
    }

    /// IPv4 connection came up
    pub async fn wan_up(&self, ifname: &str) -> crate::Result<()> {
        let address = self.status.get_or_empty(&keys::ipv4_address(ifname)).await;
        let address = require_address(address, "IPv4", ifname)?;
        tracing::info!("Sending WAN up for {} with address {}", ifname, address);
        self.transport
            .send(&IhcNotification::WanUp {
                ifname: ifname.to_string(),
                address,
            })
            .await
    }

    /// IPv4 connection went down
    pub async fn wan_down(&self, ifname: &str) -> crate::Result<()> {
        self.transport
            .send(&IhcNotification::WanDown {
                ifname: ifname.to_string(),
            })
            .await
    }

    /// IPv6 connection came up
    pub async fn wan_ipv6_up(&self, ifname: &str) -> crate::Result<()> {
        let address = self.status.get_persistent_or_empty(keys::IPV6_ADDRESS).await;
        let address = require_address(address, "IPv6", ifname)?;
        tracing::info!("Sending WAN IPv6 up for {} with address {}", ifname, address);
        self.transport
            .send(&IhcNotification::WanIpv6Up {
                ifname: ifname.to_string(),
                address,
            })
            .await
    }

    /// IPv6 connection went down
    pub async fn wan_ipv6_down(&self, ifname: &str) -> crate::Result<()> {
        self.transport
            .send(&IhcNotification::WanIpv6Down {
                ifname: ifname.to_string(),
            })
            .await
    }
}

fn require_address(address: String, family: &str, ifname: &str) -> crate::Result<String> {
    if address.is_empty() || address.starts_with("(null)") {
        return Err(crate::Error::not_found(format!(
            "No {} address known for {}",
            family, ifname
        )));
    }
    Ok(address)
}
