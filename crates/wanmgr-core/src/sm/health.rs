//! IPoE health-check lifecycle and LAN IPv6 toggling

use tracing::{error, info, warn};

use crate::keys;
use crate::model::{IhcState, WanInterface};

use super::{InterfaceStateMachine, WanController};

impl InterfaceStateMachine {
    /// Keep the health check in line with the interface configuration
    ///
    /// An IPoE interface gets a running health check that knows about every
    /// family in `v4`/`v6` that is up. Anything else gets none.
    pub(super) async fn maintain_health_check(
        &self,
        ctrl: &mut WanController,
        iface: &WanInterface,
        v4: bool,
        v6: bool,
    ) {
        if !(iface.wan.enable_ipoe && !iface.is_ppp()) {
            if ctrl.ihc_pid.is_some() {
                self.stop_ihc(ctrl).await;
            }
            return;
        }

        if ctrl.ihc_pid.is_none() {
            match self.platform.health_check.start(&iface.wan.name).await {
                Ok(pid) => {
                    info!("Health check started on {} (pid {})", iface.wan.name, pid);
                    ctrl.ihc_pid = Some(pid);
                }
                Err(e) => {
                    error!("Failed to start health check on {}: {}", iface.wan.name, e);
                    return;
                }
            }
        }

        if v4 && ctrl.ihc_v4 == IhcState::Stopped {
            self.ihc_notify_v4_up(ctrl, &iface.wan.name).await;
        }
        if v6 && ctrl.ihc_v6 == IhcState::Stopped {
            self.ihc_notify_v6_up(ctrl, &iface.wan.name).await;
        }
    }

    /// Stop the health check and forget its notification state
    pub(super) async fn stop_ihc(&self, ctrl: &mut WanController) {
        if let Some(pid) = ctrl.ihc_pid.take() {
            if let Err(e) = self.platform.health_check.stop(pid).await {
                warn!("Failed to stop health check (pid {}): {}", pid, e);
            }
        }
        ctrl.ihc_v4 = IhcState::Stopped;
        ctrl.ihc_v6 = IhcState::Stopped;
    }

    pub(super) async fn ihc_notify_v4_up(&self, ctrl: &mut WanController, ifname: &str) {
        match self.notifier.wan_up(ifname).await {
            Ok(()) => ctrl.ihc_v4 = IhcState::Started,
            Err(e) => warn!("Health check IPv4 up notification failed: {}", e),
        }
    }

    pub(super) async fn ihc_notify_v6_up(&self, ctrl: &mut WanController, ifname: &str) {
        match self.notifier.wan_ipv6_up(ifname).await {
            Ok(()) => ctrl.ihc_v6 = IhcState::Started,
            Err(e) => warn!("Health check IPv6 up notification failed: {}", e),
        }
    }

    /// Health-check notifications apply to IPoE interfaces with a running check
    pub(super) fn ihc_applies(&self, ctrl: &WanController, iface: &WanInterface) -> bool {
        !iface.is_ppp() && iface.wan.enable_ipoe && ctrl.ihc_pid.is_some()
    }

    /// Bounce LAN IPv6 once per prefix so clients pick it up
    pub(super) async fn ipv6_toggle(&self) {
        let status = self.platform.status.as_ref();
        let toggle = status.get_or_empty(keys::IPV6_TOGGLE).await;
        if toggle.is_empty() || toggle == "TRUE" {
            status.set_logged(keys::IPV6_TOGGLE, "FALSE").await;
            if let Err(e) = self.platform.network.toggle_ipv6().await {
                warn!("LAN IPv6 toggle failed: {}", e);
            }
        }
    }
}
