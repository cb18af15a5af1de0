// # IPC
//
// Message boundary between the WAN manager and its helper processes.
//
// ## Inbound
//
// DHCP clients and the IPoE health check send JSON datagrams to a single
// pull endpoint:
//
// ```json
// {"type": "dhcpv4", "interface": "erouter0", "address_assigned": true, "ip": "10.0.0.2", ...}
// {"type": "dhcpv6", "ifname": "erouter0", "prefix_assigned": true, "site_prefix": "2001:db8::/56", ...}
// {"type": "ihc", "ifname": "erouter0", "event": "echo_fail_ipv4"}
// ```
//
// An [`IpcSource`] turns the endpoint into a stream of [`IpcMessage`]s,
// which the [`IpcBridge`] stages or dispatches.
//
// ## Outbound
//
// The state machine pushes connection transitions to the health-check
// process through an [`IhcTransport`], wrapped by [`IhcNotifier`].

pub mod bridge;
pub mod listener;
pub mod notifier;

pub use bridge::IpcBridge;
pub use listener::{UnixDatagramSource, UnixDatagramTransport};
pub use notifier::{IhcNotification, IhcNotifier};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

use crate::model::lease::{Ipv4LeaseEvent, Ipv6LeaseEvent};

/// Health-check event reported by the IPoE health-check process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IhcEventKind {
    /// Force a DHCPv4 renew
    EchoRenewIpv4,
    /// Force a DHCPv6 renew (client restart)
    EchoRenewIpv6,
    /// Force a renew on the management VLAN
    EchoRenewMgmt,
    /// Force a renew on the voice VLAN
    EchoRenewVoip,
    /// Duplicate binding detected, restart the health check
    RestartDuoBindingError,
    /// IPv4 echo succeeded
    EchoIpv4Up,
    /// IPv6 echo succeeded
    EchoIpv6Up,
    /// IPv4 echo failed beyond the retry limit
    EchoFailIpv4,
    /// IPv6 echo failed beyond the retry limit
    EchoFailIpv6,
}

/// Health-check event with its target interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IhcMessage {
    pub ifname: String,
    pub event: IhcEventKind,
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcMessage {
    Dhcpv4(Ipv4LeaseEvent),
    Dhcpv6(Ipv6LeaseEvent),
    Ihc(IhcMessage),
}

impl IpcMessage {
    /// Decode one datagram
    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| crate::Error::ipc(format!("Malformed IPC message: {}", e)))
    }
}

/// Source of inbound IPC messages
///
/// Implementations own the receiving endpoint. Malformed input is logged
/// and skipped, never yielded.
pub trait IpcSource: Send + Sync {
    /// Stream of decoded messages
    ///
    /// The stream ends only when the endpoint is closed.
    fn incoming(&self) -> Pin<Box<dyn Stream<Item = IpcMessage> + Send + 'static>>;
}

/// Push endpoint of the health-check process
#[async_trait]
pub trait IhcTransport: Send + Sync {
    /// Deliver one notification
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The notification was handed to the endpoint
    /// - `Err(Error)`: The endpoint is unreachable
    async fn send(&self, notification: &IhcNotification) -> Result<(), crate::Error>;
}
