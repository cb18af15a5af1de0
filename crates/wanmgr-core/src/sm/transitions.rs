//! State machine transitions
//!
//! A transition performs the side effects of moving between two states and
//! returns the state to enter. Collaborator failures are logged; the only
//! transition that refuses to proceed is `start`, when the upstream link
//! cannot be claimed.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::keys;
use crate::model::lease::{DEFAULT_MTU, Ipv4Data};
use crate::model::{
    DsliteStatus, FamilyStatus, IhcState, InterfaceStatusUpdate, IpcpStatus, Ipv4LeaseEvent,
    LinkStatus, MaptStatus, PhyStatus, SelectionStatus, WanInterface, WanStatus,
};

use super::lease::apply_status_update;
use super::setup::ipv4_info_init;
use super::{InterfaceStateMachine, WanController, WanState, guard_tripped};

/// Translator device the IPv4 default route moves to while MAP-T is active
pub const MAPT_INTERFACE: &str = "map0";

/// Persisted eRouter mode: IPv4 only
const EROUTER_MODE_IPV4: u32 = 1;
/// Persisted eRouter mode: IPv6 only
const EROUTER_MODE_IPV6: u32 = 2;

impl InterfaceStateMachine {
    pub(super) async fn publish_status(&self, iface: &WanInterface) {
        if let Err(e) = self
            .platform
            .link
            .publish_wan_status(&iface.name, iface.wan.status)
            .await
        {
            warn!("Failed to publish WAN status of {}: {}", iface.name, e);
        }
    }

    async fn erouter_mode(&self) -> u32 {
        self.platform
            .status
            .get_persistent_or_empty(keys::LAST_EROUTER_MODE)
            .await
            .trim()
            .parse()
            .unwrap_or(0)
    }

    /// Start the DHCP clients allowed by the eRouter mode
    pub(super) async fn start_dhcp_clients(&self, iface: &mut WanInterface) {
        let mode = self.erouter_mode().await;
        let ifname = iface.wan.name.clone();

        if mode != EROUTER_MODE_IPV6 {
            match self.platform.dhcp.start_v4(&ifname).await {
                Ok(pid) => iface.ip.dhcp4c_pid = Some(pid),
                Err(e) => error!("Failed to start DHCPv4 client on {}: {}", ifname, e),
            }
        }
        if mode != EROUTER_MODE_IPV4 {
            match self.platform.dhcp.start_v6(&ifname).await {
                Ok(pid) => iface.ip.dhcp6c_pid = Some(pid),
                Err(e) => error!("Failed to start DHCPv6 client on {}: {}", ifname, e),
            }
        }
    }

    /// Stop the DHCP clients allowed by the eRouter mode
    pub(super) async fn stop_dhcp_clients(&self, iface: &mut WanInterface, release: bool) {
        let mode = self.erouter_mode().await;
        let ifname = iface.wan.name.clone();

        if mode != EROUTER_MODE_IPV6 {
            if let Err(e) = self.platform.dhcp.stop_v4(&ifname, release).await {
                warn!("Failed to stop DHCPv4 client on {}: {}", ifname, e);
            }
            iface.ip.dhcp4c_pid = None;
        }
        if mode != EROUTER_MODE_IPV4 {
            if let Err(e) = self.platform.dhcp.stop_v6(&ifname).await {
                warn!("Failed to stop DHCPv6 client on {}: {}", ifname, e);
            }
            iface.ip.dhcp6c_pid = None;
        }
    }

    async fn create_ppp_session(&self, iface: &WanInterface) {
        if let Err(e) = self
            .platform
            .ppp
            .create_session(&iface.wan.name, &iface.ppp.path)
            .await
        {
            error!("Failed to create PPP session on {}: {}", iface.wan.name, e);
        }
    }

    async fn delete_ppp_session(&self, iface: &WanInterface) {
        if let Err(e) = self
            .platform
            .ppp
            .delete_session(&iface.wan.name, &iface.ppp.path)
            .await
        {
            error!("Failed to delete PPP session on {}: {}", iface.wan.name, e);
        }
    }

    /// The family's client must be stopped rather than restarted
    fn client_disabled(&self, ctrl: &WanController, iface: &WanInterface) -> bool {
        guard_tripped(ctrl, iface)
            || iface.wan.link_status == LinkStatus::Down
            || (iface.wan.refresh_dhcp && !iface.wan.enable_dhcp)
    }

    async fn client_alive(&self, pid: Option<u32>) -> bool {
        match pid {
            Some(pid) => self.platform.dhcp.is_running(pid).await,
            None => false,
        }
    }

    /// Record the wan-service status and raise the firewall when it changes
    async fn mark_wan_service_started(&self) {
        let status = self.platform.status.as_ref();
        if status.get_or_empty(keys::WAN_SERVICE_STATUS).await != keys::VALUE_STARTED {
            status
                .set_logged(keys::WAN_SERVICE_STATUS, keys::VALUE_STARTED)
                .await;
            status.notify_logged(keys::FIREWALL_RESTART).await;
        }
    }

    async fn connection_state_up(&self, key: &str) -> bool {
        self.platform.status.get_or_empty(key).await == keys::VALUE_UP
    }

    pub(super) async fn transition_start(
        &self,
        _ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        iface.ip.ipv4_status = FamilyStatus::Down;
        iface.ip.ipv6_status = FamilyStatus::Down;
        iface.mapt.status = MaptStatus::Down;
        iface.dslite_status = DsliteStatus::Down;

        iface.wan.status = WanStatus::Initialising;
        self.publish_status(iface).await;

        if !iface.is_remote() {
            if iface.wan.link_status == LinkStatus::Down {
                iface.wan.link_status = LinkStatus::Configuring;
            }

            if let Err(e) = self.platform.link.set_upstream(&iface.phy.path, true).await {
                error!(
                    "Interface '{}': failed to set upstream on {}: {}",
                    iface.name, iface.phy.path, e
                );
                return WanState::Exit;
            }

            if let Err(e) = self
                .platform
                .link
                .restart_link_status(&iface.wan.name)
                .await
            {
                warn!("Failed to restart link status of {}: {}", iface.wan.name, e);
            }
        }

        info!("Interface '{}': state machine started", iface.name);
        WanState::ConfiguringWan
    }

    pub(super) async fn transition_physical_interface_down(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        info!("Interface '{}': deconfiguring", iface.name);

        if iface.mapt.status == MaptStatus::Up {
            self.transition_mapt_down(ctrl, iface).await;
        }
        if iface.ip.ipv6_status.is_up() {
            self.transition_ipv6_down(ctrl, iface).await;
        }
        if iface.ip.ipv4_status.is_up() {
            self.transition_ipv4_down(ctrl, iface).await;
        }

        let ifname = iface.wan.name.clone();
        if iface.is_ppp() {
            if let Err(e) = self.platform.dhcp.stop_v6(&ifname).await {
                warn!("Failed to stop DHCPv6 client on {}: {}", ifname, e);
            }
            iface.ip.dhcp6c_pid = None;
            self.delete_ppp_session(iface).await;
        } else if iface.wan.enable_dhcp {
            if iface.ip.dhcp4c_pid.take().is_some() {
                if let Err(e) = self.platform.dhcp.stop_v4(&ifname, true).await {
                    warn!("Failed to stop DHCPv4 client on {}: {}", ifname, e);
                }
            }
            if iface.ip.dhcp6c_pid.take().is_some() {
                if let Err(e) = self.platform.dhcp.stop_v6(&ifname).await {
                    warn!("Failed to stop DHCPv6 client on {}: {}", ifname, e);
                }
            }
        }
        self.stop_ihc(ctrl).await;

        if !iface.is_remote() {
            match self.platform.link.get_upstream(&iface.phy.path).await {
                Ok(false) => {
                    if !iface.is_ppp() && !iface.is_cellular() {
                        if let Err(e) = self.platform.link.delete_vlan_link(&ifname).await {
                            warn!("Failed to delete VLAN link {}: {}", ifname, e);
                        }
                    }
                    iface.wan.link_status = LinkStatus::Down;
                }
                _ => {
                    if let Err(e) = self.platform.link.set_upstream(&iface.phy.path, false).await {
                        error!("Failed to clear upstream on {}: {}", iface.phy.path, e);
                    }
                }
            }
        }

        if iface.wan.link_status == LinkStatus::Configuring {
            iface.wan.link_status = LinkStatus::Down;
        }

        WanState::DeconfiguringWan
    }

    pub(super) async fn transition_wan_up(
        &self,
        _ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        iface.wan.status = WanStatus::Validating;
        self.publish_status(iface).await;
        WanState::ValidatingWan
    }

    pub(super) async fn transition_wan_validated(
        &self,
        _ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        iface.clear_dhcp_data();

        if iface.is_ppp() {
            match self
                .platform
                .ppp
                .restart_update_info(&iface.wan.name, &iface.ppp.path)
                .await
            {
                Ok(true) => info!("Interface '{}': reusing running PPP session", iface.name),
                Ok(false) => self.create_ppp_session(iface).await,
                Err(e) => {
                    warn!("PPP session lookup on {} failed: {}", iface.wan.name, e);
                    self.create_ppp_session(iface).await;
                }
            }
        } else if iface.wan.enable_dhcp {
            self.stop_dhcp_clients(iface, true).await;
            self.start_dhcp_clients(iface).await;
        } else if iface.is_cellular() {
            self.stage_cellular_lease(iface).await;
        }

        WanState::ObtainingIpAddresses
    }

    /// Cellular links are addressed by the cellular manager, not DHCP
    async fn stage_cellular_lease(&self, iface: &mut WanInterface) {
        let info = match self.platform.link.fetch_cellular_ip(&iface.phy.path).await {
            Ok(info) => info,
            Err(e) => {
                error!("Failed to fetch cellular IP for {}: {}", iface.name, e);
                return;
            }
        };
        if !info.is_complete() {
            debug!("Cellular IP for {} incomplete", iface.name);
            return;
        }
        if iface.ip.pending_v4.is_some() {
            warn!("Cellular lease for {} dropped, payload pending", iface.name);
            return;
        }
        iface.ip.pending_v4 = Some(Ipv4LeaseEvent {
            interface: iface.wan.name.clone(),
            address_assigned: true,
            ip: info.ip,
            mask: info.mask,
            gateway: info.gateway,
            dns_server: info.dns_server,
            dns_server1: info.dns_server1,
            mtu_assigned: info.mtu != 0,
            mtu_size: info.mtu,
            ..Default::default()
        });
    }

    pub(super) async fn transition_refreshing_wan(
        &self,
        _ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        let ifname = iface.wan.name.clone();

        if iface.is_ppp() {
            if !(iface.ppp.ipcp_status == IpcpStatus::Up
                && iface.ppp.ipv6cp_status == IpcpStatus::Up)
            {
                return WanState::RefreshingWan;
            }
            if let Err(e) = self.platform.dhcp.stop_v6(&ifname).await {
                warn!("Failed to stop DHCPv6 client on {}: {}", ifname, e);
            }
            iface.ip.dhcp6c_pid = None;
            self.delete_ppp_session(iface).await;
        } else if iface.wan.enable_dhcp {
            if let Err(e) = self.platform.dhcp.stop_v4(&ifname, false).await {
                warn!("Failed to stop DHCPv4 client on {}: {}", ifname, e);
            }
            iface.ip.dhcp4c_pid = None;
            if let Err(e) = self.platform.dhcp.stop_v6(&ifname).await {
                warn!("Failed to stop DHCPv6 client on {}: {}", ifname, e);
            }
            iface.ip.dhcp6c_pid = None;

            if let Err(e) = self.platform.link.request_refresh(&ifname).await {
                error!("Interface '{}': refresh request failed: {}", iface.name, e);
            }
            if !iface.is_remote() {
                iface.wan.link_status = LinkStatus::Configuring;
            }
        }

        iface.wan.refresh = false;
        WanState::RefreshingWan
    }

    pub(super) async fn transition_wan_refreshed(
        &self,
        _ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        iface.clear_dhcp_data();
        if iface.is_ppp() {
            self.create_ppp_session(iface).await;
        } else if iface.wan.enable_dhcp {
            self.start_dhcp_clients(iface).await;
        }
        WanState::ObtainingIpAddresses
    }

    pub(super) async fn transition_ipv4_up(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        iface.wan.status = WanStatus::Up;
        self.publish_status(iface).await;

        if let Err(e) = self.setup_ipv4(ctrl.device_nw_mode, iface).await {
            error!("Interface '{}': failed to set up IPv4: {}", iface.name, e);
        }

        if self.ihc_applies(ctrl, iface) && ctrl.ihc_v4 == IhcState::Stopped {
            self.ihc_notify_v4_up(ctrl, &iface.wan.name).await;
        }

        iface.ip.ipv4_changed = false;
        iface.ip.ipv4_renewed = false;

        self.mark_wan_service_started().await;

        if iface.ip.ipv6_status.is_up()
            && self.connection_state_up(keys::IPV6_CONNECTION_STATE).await
        {
            WanState::DualStackActive
        } else {
            WanState::Ipv4Leased
        }
    }

    pub(super) async fn transition_ipv4_down(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        let ifname = iface.wan.name.clone();

        if self.client_disabled(ctrl, iface) {
            if let Err(e) = self.platform.dhcp.stop_v4(&ifname, true).await {
                warn!("Failed to stop DHCPv4 client on {}: {}", ifname, e);
            }
            iface.ip.dhcp4c_pid = None;
        } else {
            self.platform.dhcp.collect_zombies().await;
            let mapt_owns_v4 = iface.wan.enable_mapt
                && iface.selection_status == SelectionStatus::Active
                && iface.mapt.status == MaptStatus::Up;
            if !self.client_alive(iface.ip.dhcp4c_pid).await && !iface.is_ppp() && !mapt_owns_v4 {
                match self.platform.dhcp.start_v4(&ifname).await {
                    Ok(pid) => {
                        info!("Restarted DHCPv4 client on {} (pid {})", ifname, pid);
                        iface.ip.dhcp4c_pid = Some(pid);
                    }
                    Err(e) => error!("Failed to restart DHCPv4 client on {}: {}", ifname, e),
                }
            }
        }

        iface.update_status(InterfaceStatusUpdate::ConnectionDown);

        if let Err(e) = self
            .teardown_ipv4(ctrl.device_nw_mode, ctrl.device_nw_mode_changed, iface)
            .await
        {
            error!("Interface '{}': failed to tear down IPv4: {}", iface.name, e);
        }

        if self.ihc_applies(ctrl, iface) {
            if let Err(e) = self.notifier.wan_down(&ifname).await {
                warn!("Health check IPv4 down notification failed: {}", e);
            }
            ctrl.ihc_v4 = IhcState::Stopped;
        }

        ipv4_info_init(self.platform.status.as_ref(), &ifname, ctrl.device_nw_mode).await;

        if iface.ip.ipv6_status.is_up()
            && self.connection_state_up(keys::IPV6_CONNECTION_STATE).await
        {
            return WanState::Ipv6Leased;
        }
        if ctrl.current_state == WanState::DualStackActive && iface.ip.ipv6_status.is_up() {
            return WanState::Ipv6Leased;
        }

        iface.wan.status = WanStatus::Validating;
        self.publish_status(iface).await;
        WanState::ObtainingIpAddresses
    }

    pub(super) async fn transition_ipv6_up(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        iface.wan.status = WanStatus::Up;
        self.publish_status(iface).await;

        if let Err(e) = self.setup_ipv6(ctrl.device_nw_mode, iface).await {
            error!("Interface '{}': failed to set up IPv6: {}", iface.name, e);
        }

        if self.ihc_applies(ctrl, iface) && ctrl.ihc_v6 == IhcState::Stopped {
            self.ihc_notify_v6_up(ctrl, &iface.wan.name).await;
        }

        self.mark_wan_service_started().await;

        if iface.wan.enable_xlat {
            let network = self.platform.network.as_ref();
            if network.is_xlat_running().await {
                if let Err(e) = network.stop_xlat().await {
                    warn!("Failed to stop 464XLAT: {}", e);
                }
            }
            match network.start_xlat(&iface.wan.name).await {
                Ok(()) => info!("464XLAT started on {}", iface.wan.name),
                Err(e) => error!("Failed to start 464XLAT on {}: {}", iface.wan.name, e),
            }
        }

        if iface.ip.ipv4_status.is_up()
            && self.connection_state_up(keys::IPV4_CONNECTION_STATE).await
        {
            WanState::DualStackActive
        } else {
            WanState::Ipv6Leased
        }
    }

    pub(super) async fn transition_ipv6_down(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        let ifname = iface.wan.name.clone();

        if self.client_disabled(ctrl, iface) {
            if let Err(e) = self.platform.dhcp.stop_v6(&ifname).await {
                warn!("Failed to stop DHCPv6 client on {}: {}", ifname, e);
            }
            iface.ip.dhcp6c_pid = None;
        } else {
            self.platform.dhcp.collect_zombies().await;
            if !self.client_alive(iface.ip.dhcp6c_pid).await && !iface.is_ppp() {
                match self.platform.dhcp.start_v6(&ifname).await {
                    Ok(pid) => {
                        info!("Restarted DHCPv6 client on {} (pid {})", ifname, pid);
                        iface.ip.dhcp6c_pid = Some(pid);
                    }
                    Err(e) => error!("Failed to restart DHCPv6 client on {}: {}", ifname, e),
                }
            }
        }

        apply_status_update(
            self.platform.status.as_ref(),
            iface,
            InterfaceStatusUpdate::Ipv6Down,
        )
        .await;

        if let Err(e) = self.teardown_ipv6(ctrl.device_nw_mode, iface).await {
            error!("Interface '{}': failed to tear down IPv6: {}", iface.name, e);
        }

        if iface.wan.enable_xlat && self.platform.network.is_xlat_running().await {
            if let Err(e) = self.platform.network.stop_xlat().await {
                warn!("Failed to stop 464XLAT: {}", e);
            }
        }

        if self.ihc_applies(ctrl, iface) {
            if let Err(e) = self.notifier.wan_ipv6_down(&ifname).await {
                warn!("Health check IPv6 down notification failed: {}", e);
            }
            ctrl.ihc_v6 = IhcState::Stopped;
        }

        if iface.ip.ipv4_status.is_up()
            && self.connection_state_up(keys::IPV4_CONNECTION_STATE).await
        {
            return WanState::Ipv4Leased;
        }
        if ctrl.current_state == WanState::DualStackActive && iface.ip.ipv4_status.is_up() {
            return WanState::Ipv4Leased;
        }

        iface.wan.status = WanStatus::Validating;
        self.publish_status(iface).await;
        WanState::ObtainingIpAddresses
    }

    pub(super) async fn transition_dual_stack_down(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        iface.wan.status = WanStatus::Validating;
        self.publish_status(iface).await;

        self.transition_ipv4_down(ctrl, iface).await;
        self.transition_ipv6_down(ctrl, iface).await;

        WanState::ObtainingIpAddresses
    }

    /// Restart DHCPv6 so the MAP-T option request follows the feature flag
    pub(super) async fn transition_mapt_feature_refresh(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        info!(
            "Interface '{}': MAP-T feature {}, restarting IPv6",
            iface.name,
            if ctrl.mapt_feature_enabled { "enabled" } else { "disabled" }
        );

        self.transition_ipv6_down(ctrl, iface).await;
        iface.clear_ipv6();

        let ifname = iface.wan.name.clone();
        if iface.is_ppp() {
            self.delete_ppp_session(iface).await;
            self.create_ppp_session(iface).await;
        } else {
            let dhcp = self.platform.dhcp.as_ref();
            if let Err(e) = dhcp.mark_v6_release(&ifname).await {
                warn!("Failed to request DHCPv6 release on {}: {}", ifname, e);
            }
            if let Err(e) = dhcp.stop_v6(&ifname).await {
                warn!("Failed to stop DHCPv6 client on {}: {}", ifname, e);
            }

            let mut restarted = false;
            for _ in 0..self.mapt_refresh.max_polls {
                if !dhcp.is_v6_running(&ifname).await {
                    match dhcp.start_v6(&ifname).await {
                        Ok(pid) => iface.ip.dhcp6c_pid = Some(pid),
                        Err(e) => error!("Failed to start DHCPv6 client on {}: {}", ifname, e),
                    }
                    restarted = true;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(self.mapt_refresh.poll_interval_ms)).await;
            }
            if !restarted {
                warn!("DHCPv6 client on {} did not exit, not restarted", ifname);
            }
        }

        WanState::ObtainingIpAddresses
    }

    pub(super) async fn transition_mapt_up(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        let network = self.platform.network.clone();
        let ifname = iface.wan.name.clone();

        let Some(params) = iface.mapt.params.clone() else {
            error!("Interface '{}': MAP-T up without rule parameters", iface.name);
            iface.mapt.status = MaptStatus::Down;
            return WanState::MaptActive;
        };
        if let Err(e) = network
            .configure_mapt(&ifname, &iface.base_interface, &params)
            .await
        {
            error!("Interface '{}': MAP-T configuration failed: {}", iface.name, e);
            iface.mapt.status = MaptStatus::Down;
            return WanState::MaptActive;
        }
        iface.mapt.changed = false;

        if iface.ip.ipv4_changed && iface.ip.ipv4_status.is_up() {
            self.transition_ipv4_up(ctrl, iface).await;
        }

        if self.client_alive(iface.ip.dhcp4c_pid).await {
            if let Err(e) = self.platform.dhcp.stop_v4(&ifname, true).await {
                warn!("Failed to stop DHCPv4 client on {}: {}", ifname, e);
            }
            iface.ip.dhcp4c_pid = None;
        }

        if iface.ip.ipv4_status.is_up() {
            self.transition_ipv4_down(ctrl, iface).await;
            if let Err(e) = network.replace_default_route(MAPT_INTERFACE, DEFAULT_MTU).await {
                error!("Failed to move default route to {}: {}", MAPT_INTERFACE, e);
            }
        }

        if iface.is_ppp() {
            self.delete_ppp_session(iface).await;
        }

        self.platform
            .status
            .notify_logged(keys::FIREWALL_RESTART)
            .await;
        info!("Interface '{}': MAP-T configured", iface.name);
        WanState::MaptActive
    }

    pub(super) async fn transition_mapt_down(
        &self,
        _ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        let ifname = iface.wan.name.clone();

        iface.update_status(InterfaceStatusUpdate::MaptStop);
        if let Err(e) = self
            .platform
            .network
            .reset_mapt(&ifname, &iface.base_interface)
            .await
        {
            error!("Interface '{}': MAP-T reset failed: {}", iface.name, e);
        }

        iface.update_status(InterfaceStatusUpdate::ConnectionDown);
        iface.ip.ipv4 = Ipv4Data::default();
        iface.ip.dhcp4c_pid = None;
        iface.ip.pending_v4 = None;

        if iface.phy.status == PhyStatus::Up {
            if iface.is_ppp() {
                self.create_ppp_session(iface).await;
            } else {
                match self.platform.dhcp.start_v4(&ifname).await {
                    Ok(pid) => iface.ip.dhcp4c_pid = Some(pid),
                    Err(e) => error!("Failed to start DHCPv4 client on {}: {}", ifname, e),
                }
            }
        }

        self.platform
            .status
            .notify_logged(keys::FIREWALL_RESTART)
            .await;
        WanState::Ipv6Leased
    }

    pub(super) async fn transition_exit(
        &self,
        _ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        iface.wan.status = WanStatus::Disabled;
        iface.wan.refresh = false;
        self.publish_status(iface).await;
        info!("Interface '{}': state machine exiting", iface.name);
        WanState::Exit
    }

    pub(super) async fn transition_standby(
        &self,
        _ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        if iface.ip.ipv4_status.is_up() {
            iface.wan.status = WanStatus::Standby;
            iface.ip.ipv4_changed = false;
        }
        if iface.ip.ipv6_status.is_up() {
            iface.wan.status = WanStatus::Standby;
            iface.ip.ipv6_changed = false;
        }
        self.publish_status(iface).await;
        WanState::Standby
    }

    /// Remove the IP configuration but keep the leases for a fast return
    pub(super) async fn transition_standby_deconfig(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        let status = self.platform.status.as_ref();

        if iface.mapt.status == MaptStatus::Up {
            if let Err(e) = self
                .platform
                .network
                .reset_mapt(&iface.wan.name, &iface.base_interface)
                .await
            {
                error!("Interface '{}': MAP-T reset failed: {}", iface.name, e);
            }
        }
        if iface.ip.ipv4_status.is_up() {
            if let Err(e) = self
                .teardown_ipv4(ctrl.device_nw_mode, ctrl.device_nw_mode_changed, iface)
                .await
            {
                error!("Interface '{}': failed to tear down IPv4: {}", iface.name, e);
            }
        }
        if iface.ip.ipv6_status.is_up() {
            if let Err(e) = self.teardown_ipv6(ctrl.device_nw_mode, iface).await {
                error!("Interface '{}': failed to tear down IPv6: {}", iface.name, e);
            }
        }

        iface.wan.status = WanStatus::Standby;
        self.publish_status(iface).await;

        iface.wan.active_link = false;
        let key = keys::active_link(iface.index);
        match status.set_persistent(&key, "false").await {
            Ok(()) => {
                if let Err(e) = status.commit().await {
                    warn!("Failed to commit {}: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to persist {}: {}", key, e),
        }

        WanState::Standby
    }
}
