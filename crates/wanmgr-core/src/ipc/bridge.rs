//! IPC bridge
//!
//! Moves inbound messages into the shared store. DHCP payloads are staged
//! on the target interface record for its task to consume on the next
//! tick; health-check events act directly on the helper processes and the
//! record's connection status.
//!
//! ## Staging
//!
//! A record holds at most one pending payload per family. When the slot is
//! still occupied the bridge waits `retry_wait` and tries again, up to
//! `max_tries` times, then drops the payload.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::IpcConfig;
use crate::error::{Error, Result};
use crate::events::{EventSink, WanEvent};
use crate::ihc::{self, MAX_FORCED_RENEWS};
use crate::ipc::{IhcEventKind, IhcMessage, IpcMessage, IpcSource};
use crate::keys;
use crate::model::{InterfaceStatusUpdate, Ipv4LeaseEvent, Ipv6LeaseEvent};
use crate::sm::apply_status_update;
use crate::store::SharedWanStore;
use crate::traits::Platform;

/// Management VLAN served by its own DHCPv4 client
const MGMT_IFNAME: &str = "mg0";
/// Voice VLAN served by its own DHCPv4 client
const VOIP_IFNAME: &str = "voip0";

/// Bridge between the IPC endpoint and the shared store
pub struct IpcBridge {
    store: Arc<SharedWanStore>,
    platform: Platform,
    events: EventSink,
    config: IpcConfig,
    ihc_restart_delay: Duration,
    dhcpv6_renew_delay: Duration,
}

impl IpcBridge {
    /// Create a bridge with one-second helper restart delays
    pub fn new(
        store: Arc<SharedWanStore>,
        platform: Platform,
        events: EventSink,
        config: IpcConfig,
    ) -> Self {
        Self {
            store,
            platform,
            events,
            config,
            ihc_restart_delay: Duration::from_secs(1),
            dhcpv6_renew_delay: Duration::from_secs(1),
        }
    }

    /// Override the pauses used when restarting the health check and DHCPv6
    pub fn with_delays(mut self, ihc_restart: Duration, dhcpv6_renew: Duration) -> Self {
        self.ihc_restart_delay = ihc_restart;
        self.dhcpv6_renew_delay = dhcpv6_renew;
        self
    }

    /// Consume messages from `source` until its stream ends
    pub async fn run(&self, source: &dyn IpcSource) {
        let mut incoming = source.incoming();
        while let Some(msg) = incoming.next().await {
            if let Err(e) = self.handle(msg).await {
                error!("Failed to handle IPC message: {}", e);
            }
        }
        info!("IPC stream closed");
    }

    /// Handle one message
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The payload was staged or the event acted upon
    /// - `Err(Error)`: No matching interface, the payload was dropped, or
    ///   the health-check action failed
    pub async fn handle(&self, msg: IpcMessage) -> Result<()> {
        match msg {
            IpcMessage::Dhcpv4(event) => self.stage_ipv4(event).await,
            IpcMessage::Dhcpv6(event) => self.stage_ipv6(event).await,
            IpcMessage::Ihc(event) => self.handle_ihc(event).await,
        }
    }

    async fn stage_ipv4(&self, event: Ipv4LeaseEvent) -> Result<()> {
        let ifname = event.interface.clone();
        let mut event = Some(event);

        for attempt in 0..self.config.max_tries {
            let Some(mut iface) = self.store.lock_iface_by_name(&ifname).await else {
                return Err(Error::not_found(format!("No WAN interface named {}", ifname)));
            };
            if iface.ip.pending_v4.is_none() {
                iface.ip.pending_v4 = event.take();
                debug!("Staged DHCPv4 payload for {}", ifname);
                return Ok(());
            }
            iface.release();

            debug!("DHCPv4 payload for {} still pending (attempt {})", ifname, attempt + 1);
            tokio::time::sleep(self.config.retry_wait()).await;
        }

        self.dropped(&ifname, "ipv4")
    }

    async fn stage_ipv6(&self, event: Ipv6LeaseEvent) -> Result<()> {
        let ifname = event.ifname.clone();
        let mut event = Some(event);

        for attempt in 0..self.config.max_tries {
            let Some(mut iface) = self.store.lock_iface_by_name(&ifname).await else {
                return Err(Error::not_found(format!("No WAN interface named {}", ifname)));
            };
            if iface.ip.pending_v6.is_none() {
                iface.ip.pending_v6 = event.take();
                debug!("Staged DHCPv6 payload for {}", ifname);
                return Ok(());
            }
            iface.release();

            debug!("DHCPv6 payload for {} still pending (attempt {})", ifname, attempt + 1);
            tokio::time::sleep(self.config.retry_wait()).await;
        }

        self.dropped(&ifname, "ipv6")
    }

    fn dropped(&self, ifname: &str, family: &str) -> Result<()> {
        warn!(
            "Dropping {} payload for {} after {} tries",
            family, ifname, self.config.max_tries
        );
        self.events.emit(WanEvent::PayloadDropped {
            interface: ifname.to_string(),
            family: family.to_string(),
        });
        Err(Error::ipc(format!(
            "{} payload for {} dropped, previous payload never consumed",
            family, ifname
        )))
    }

    async fn handle_ihc(&self, msg: IhcMessage) -> Result<()> {
        info!("Health check event {:?} for {}", msg.event, msg.ifname);
        match msg.event {
            IhcEventKind::EchoRenewIpv4 => self.force_renew_ipv4(&msg.ifname).await,
            IhcEventKind::EchoRenewIpv6 => self.force_renew_ipv6(&msg.ifname).await,
            IhcEventKind::EchoRenewMgmt | IhcEventKind::EchoRenewVoip => {
                self.force_renew_vlan(&msg.ifname).await
            }
            IhcEventKind::RestartDuoBindingError => self.restart_health_check().await,
            IhcEventKind::EchoIpv4Up => {
                self.mark_connection_up(keys::IPV4_CONNECTION_STATE).await;
                Ok(())
            }
            IhcEventKind::EchoIpv6Up => {
                self.mark_connection_up(keys::IPV6_CONNECTION_STATE).await;
                Ok(())
            }
            IhcEventKind::EchoFailIpv4 => {
                if let Err(e) = self.platform.dhcp.stop_v4(&msg.ifname, true).await {
                    warn!("Failed to stop DHCPv4 client on {}: {}", msg.ifname, e);
                }
                self.set_connection_status(&msg.ifname, InterfaceStatusUpdate::ConnectionDown)
                    .await
            }
            IhcEventKind::EchoFailIpv6 => {
                if let Err(e) = self.platform.dhcp.stop_v6(&msg.ifname).await {
                    warn!("Failed to stop DHCPv6 client on {}: {}", msg.ifname, e);
                }
                self.set_connection_status(&msg.ifname, InterfaceStatusUpdate::Ipv6Down)
                    .await
            }
        }
    }

    async fn set_connection_status(&self, ifname: &str, update: InterfaceStatusUpdate) -> Result<()> {
        let Some(mut iface) = self.store.lock_iface_by_name(ifname).await else {
            return Err(Error::not_found(format!("No WAN interface named {}", ifname)));
        };
        apply_status_update(self.platform.status.as_ref(), &mut iface, update).await;
        Ok(())
    }

    async fn force_renew_ipv4(&self, ifname: &str) -> Result<()> {
        let pid = match self.store.lock_iface_by_name(ifname).await {
            Some(iface) => iface.ip.dhcp4c_pid,
            None => None,
        };
        if let Some(pid) = pid {
            if self.platform.dhcp.is_running(pid).await {
                info!("Asking DHCPv4 client (pid {}) to renew", pid);
                if let Err(e) = self.platform.dhcp.signal_renew(pid).await {
                    warn!("Failed to signal DHCPv4 client {}: {}", pid, e);
                }
            }
        }
        self.set_connection_status(ifname, InterfaceStatusUpdate::ConnectionDown)
            .await
    }

    async fn force_renew_ipv6(&self, ifname: &str) -> Result<()> {
        if let Err(e) = self.platform.dhcp.stop_v6(ifname).await {
            warn!("Failed to stop DHCPv6 client on {}: {}", ifname, e);
        }
        self.set_connection_status(ifname, InterfaceStatusUpdate::Ipv6Down)
            .await?;

        tokio::time::sleep(self.dhcpv6_renew_delay).await;

        let pid = self.platform.dhcp.start_v6(ifname).await?;
        info!("DHCPv6 client restarted on {} (pid {})", ifname, pid);
        if let Some(mut iface) = self.store.lock_iface_by_name(ifname).await {
            iface.ip.dhcp6c_pid = Some(pid);
        }
        Ok(())
    }

    async fn force_renew_vlan(&self, ifname: &str) -> Result<()> {
        let status = self.platform.status.as_ref();
        let count = ihc::action_count(status).await;
        if count > MAX_FORCED_RENEWS {
            warn!(
                "Refusing forced renew on {}: {} renews already performed",
                ifname, count
            );
            return Err(Error::process(format!(
                "Too many forced renews requested for {}",
                ifname
            )));
        }

        let vlan = if ifname == MGMT_IFNAME {
            MGMT_IFNAME
        } else {
            VOIP_IFNAME
        };
        match self.platform.dhcp.vlan_client_pid(vlan).await {
            Some(pid) => {
                info!("Asking DHCPv4 client on {} (pid {}) to renew", vlan, pid);
                self.platform.dhcp.signal_renew(pid).await?;
                ihc::record_action(status).await?;
            }
            None => error!("No DHCPv4 client running on {}", vlan),
        }
        Ok(())
    }

    async fn restart_health_check(&self) -> Result<()> {
        let status = self.platform.status.as_ref();
        ihc::set_enable(status, false).await?;
        tokio::time::sleep(self.ihc_restart_delay).await;
        ihc::set_enable(status, true).await
    }

    async fn mark_connection_up(&self, key: &str) {
        let status = self.platform.status.as_ref();
        if status.get_or_empty(key).await == keys::VALUE_DOWN {
            info!("Health check reports {} up", key);
            status.set_logged(key, keys::VALUE_UP).await;
        }
    }
}
