//! Per-state handlers
//!
//! Each handler inspects the interface record and either stays in its
//! state or runs a transition. Conditions are evaluated in a fixed order;
//! the first that matches decides the tick. The global guard has already
//! been checked by the caller.

use tracing::{debug, error, info};

use crate::keys;
use crate::model::{IhcState, LinkStatus, MaptStatus, WanInterface, WanStatus};

use super::{InterfaceStateMachine, WanController, WanState};

impl InterfaceStateMachine {
    pub(super) async fn state_configuring_wan(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        if iface.wan.link_status == LinkStatus::Up {
            return self.transition_wan_up(ctrl, iface).await;
        }
        WanState::ConfiguringWan
    }

    pub(super) async fn state_validating_wan(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        if iface.wan.link_status == LinkStatus::Configuring {
            return WanState::ConfiguringWan;
        }
        if iface.wan.name.is_empty() {
            debug!("Interface '{}': waiting for layer-3 name", iface.name);
            return WanState::ValidatingWan;
        }
        self.transition_wan_validated(ctrl, iface).await
    }

    pub(super) async fn state_obtaining_ip_addresses(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        if iface.wan.link_status == LinkStatus::Down {
            if !iface.is_remote() {
                iface.wan.link_status = LinkStatus::Configuring;
            }
            return WanState::ConfiguringWan;
        }

        if iface.wan.link_status == LinkStatus::Configuring || iface.wan.refresh {
            return self.state_refreshing_wan(ctrl, iface).await;
        }

        if !iface.is_ppp() && iface.wan.refresh_dhcp {
            self.apply_dhcp_toggle(iface).await;
            return WanState::ObtainingIpAddresses;
        }

        if iface.ip.ipv4_status.is_up() {
            if iface.is_active() {
                return self.transition_ipv4_up(ctrl, iface).await;
            }
            return self.transition_standby(ctrl, iface).await;
        }

        if iface.ip.ipv6_status.is_up() {
            if !iface.is_active() {
                return self.transition_standby(ctrl, iface).await;
            }
            if iface.ip.ipv6_changed {
                if let Err(e) = self.setup_lan_prefix_ipv6(iface).await {
                    error!("Interface '{}': LAN prefix setup failed: {}", iface.name, e);
                }
                iface.ip.ipv6_changed = false;
                return WanState::ObtainingIpAddresses;
            }
            if self.bridge_mode_ready().await {
                return self.transition_ipv6_up(ctrl, iface).await;
            }
            self.ipv6_toggle().await;
            return WanState::ObtainingIpAddresses;
        }

        if let Some(next) = self.mapt_feature_refresh_due(ctrl, iface).await {
            return next;
        }

        WanState::ObtainingIpAddresses
    }

    /// EnableDHCP was toggled while obtaining addresses
    async fn apply_dhcp_toggle(&self, iface: &mut WanInterface) {
        let ifname = iface.wan.name.clone();
        let dhcp = self.platform.dhcp.as_ref();

        if iface.wan.enable_dhcp {
            info!("Interface '{}': DHCP enabled, starting clients", iface.name);
            if iface.ip.dhcp4c_pid.is_none() {
                match dhcp.start_v4(&ifname).await {
                    Ok(pid) => iface.ip.dhcp4c_pid = Some(pid),
                    Err(e) => error!("Failed to start DHCPv4 client on {}: {}", ifname, e),
                }
            }
            if iface.ip.dhcp6c_pid.is_none() {
                match dhcp.start_v6(&ifname).await {
                    Ok(pid) => iface.ip.dhcp6c_pid = Some(pid),
                    Err(e) => error!("Failed to start DHCPv6 client on {}: {}", ifname, e),
                }
            }
        } else {
            info!("Interface '{}': DHCP disabled, stopping clients", iface.name);
            if iface.ip.dhcp4c_pid.take().is_some() {
                if let Err(e) = dhcp.stop_v4(&ifname, true).await {
                    error!("Failed to stop DHCPv4 client on {}: {}", ifname, e);
                }
            }
            if iface.ip.dhcp6c_pid.take().is_some() {
                if let Err(e) = dhcp.stop_v6(&ifname).await {
                    error!("Failed to stop DHCPv6 client on {}: {}", ifname, e);
                }
            }
        }

        if iface.ip.dhcp4c_pid.is_none() && iface.ip.dhcp6c_pid.is_none() {
            iface.wan.status = WanStatus::Validating;
            self.publish_status(iface).await;
        }
        iface.wan.refresh_dhcp = false;
    }

    /// A latched MAP-T feature change restarts DHCPv6 once the feature is on
    async fn mapt_feature_refresh_due(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> Option<WanState> {
        if iface.wan.enable_mapt
            && iface.is_active()
            && ctrl.mapt_feature_changed
            && iface.mapt.status == MaptStatus::Down
            && ctrl.mapt_feature_enabled
        {
            ctrl.mapt_feature_changed = false;
            return Some(self.transition_mapt_feature_refresh(ctrl, iface).await);
        }
        None
    }

    fn dhcp_disabled_at_runtime(iface: &WanInterface) -> bool {
        iface.wan.refresh_dhcp && !iface.wan.enable_dhcp
    }

    fn leaves_for_standby(ctrl: &WanController, iface: &WanInterface) -> bool {
        !iface.is_active() || ctrl.device_nw_mode_changed
    }

    /// Re-announce IPv4 to the health check after it reported a failure
    async fn ipv4_renewed(&self, ctrl: &mut WanController, iface: &mut WanInterface) {
        let ihc_status = self
            .platform
            .status
            .get_or_empty(keys::IHC_IPV4_STATUS)
            .await;
        if ihc_status == keys::VALUE_FAILED
            && self.ihc_applies(ctrl, iface)
            && ctrl.ihc_v4 == IhcState::Started
        {
            if let Err(e) = self.notifier.wan_up(&iface.wan.name).await {
                error!("Health check IPv4 up notification failed: {}", e);
            }
        }
        iface.ip.ipv4_renewed = false;
    }

    /// Re-announce IPv6 to the health check after it reported a failure
    async fn ipv6_renewed(&self, ctrl: &mut WanController, iface: &mut WanInterface) {
        let status = self.platform.status.as_ref();
        let ihc_status = status.get_or_empty(keys::IHC_IPV6_STATUS).await;
        if ihc_status == keys::VALUE_FAILED
            && self.ihc_applies(ctrl, iface)
            && ctrl.ihc_v6 == IhcState::Started
        {
            status.notify_logged(keys::FIREWALL_RESTART).await;
            if let Err(e) = self.platform.network.toggle_ipv6().await {
                error!("LAN IPv6 toggle failed: {}", e);
            }
            if let Err(e) = self.notifier.wan_ipv6_up(&iface.wan.name).await {
                error!("Health check IPv6 up notification failed: {}", e);
            }
        }
        iface.ip.ipv6_renewed = false;
    }

    async fn reconfigure_ipv4(&self, ctrl: &mut WanController, iface: &mut WanInterface) {
        let mode = ctrl.device_nw_mode;
        let result = match self
            .teardown_ipv4(mode, ctrl.device_nw_mode_changed, iface)
            .await
        {
            Ok(()) => self.setup_ipv4(mode, iface).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                info!("Interface '{}': IPv4 reconfigured", iface.name);
                if self.ihc_applies(ctrl, iface) && ctrl.ihc_v4 == IhcState::Started {
                    if let Err(e) = self.notifier.wan_up(&iface.wan.name).await {
                        error!("Health check IPv4 up notification failed: {}", e);
                    }
                }
            }
            Err(e) => error!("Interface '{}': IPv4 reconfiguration failed: {}", iface.name, e),
        }
        iface.ip.ipv4_changed = false;
    }

    /// Returns true if the new prefix was applied
    async fn reconfigure_ipv6(&self, ctrl: &mut WanController, iface: &mut WanInterface) -> bool {
        let mode = ctrl.device_nw_mode;
        let result = match self.teardown_ipv6(mode, iface).await {
            Ok(()) => match self.setup_lan_prefix_ipv6(iface).await {
                Ok(()) => self.setup_ipv6(mode, iface).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        iface.ip.ipv6_changed = false;
        match result {
            Ok(()) => {
                info!("Interface '{}': IPv6 reconfigured", iface.name);
                if self.ihc_applies(ctrl, iface) && ctrl.ihc_v6 == IhcState::Started {
                    if let Err(e) = self.notifier.wan_ipv6_up(&iface.wan.name).await {
                        error!("Health check IPv6 up notification failed: {}", e);
                    }
                }
                true
            }
            Err(e) => {
                error!("Interface '{}': IPv6 reconfiguration failed: {}", iface.name, e);
                false
            }
        }
    }

    pub(super) async fn state_standby(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        if iface.wan.link_status == LinkStatus::Down
            || (!iface.ip.ipv4_status.is_up() && !iface.ip.ipv6_status.is_up())
            || Self::dhcp_disabled_at_runtime(iface)
        {
            ctrl.bridge_wait = false;
            return WanState::ObtainingIpAddresses;
        }

        if iface.is_active() {
            let mut next = None;

            if iface.ip.ipv6_status.is_up() {
                if !ctrl.bridge_wait {
                    match self.setup_lan_prefix_ipv6(iface).await {
                        Ok(()) => ctrl.bridge_wait = true,
                        Err(e) => error!("Interface '{}': LAN prefix setup failed: {}", iface.name, e),
                    }
                }
                if self.bridge_mode_ready().await {
                    ctrl.bridge_wait = false;
                    next = Some(self.transition_ipv6_up(ctrl, iface).await);
                    iface.ip.ipv6_changed = false;
                } else {
                    self.ipv6_toggle().await;
                }
            }

            if !iface.ip.ipv6_status.is_up() || !ctrl.bridge_wait {
                if iface.ip.ipv4_status.is_up() {
                    next = Some(self.transition_ipv4_up(ctrl, iface).await);
                }
                return next.unwrap_or(WanState::Standby);
            }
        } else {
            ctrl.bridge_wait = false;
            if iface.ip.ipv4_status.is_up() {
                iface.ip.ipv4_changed = false;
            }
            if iface.ip.ipv6_status.is_up() {
                iface.ip.ipv6_changed = false;
            }
        }

        WanState::Standby
    }

    pub(super) async fn state_ipv4_leased(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        self.maintain_health_check(ctrl, iface, true, false).await;

        if !iface.ip.ipv4_status.is_up()
            || iface.wan.link_status == LinkStatus::Down
            || Self::dhcp_disabled_at_runtime(iface)
        {
            return self.transition_ipv4_down(ctrl, iface).await;
        }
        if Self::leaves_for_standby(ctrl, iface) {
            return self.transition_standby_deconfig(ctrl, iface).await;
        }
        if iface.ip.ipv4_changed {
            self.reconfigure_ipv4(ctrl, iface).await;
            return WanState::Ipv4Leased;
        }
        if iface.wan.refresh {
            return self.state_refreshing_wan(ctrl, iface).await;
        }
        if iface.ip.ipv6_status.is_up() {
            if iface.ip.ipv6_changed {
                if let Err(e) = self.setup_lan_prefix_ipv6(iface).await {
                    error!("Interface '{}': LAN prefix setup failed: {}", iface.name, e);
                }
                iface.ip.ipv6_changed = false;
                return WanState::Ipv4Leased;
            }
            if self.bridge_mode_ready().await {
                return self.transition_ipv6_up(ctrl, iface).await;
            }
            self.ipv6_toggle().await;
            return WanState::Ipv4Leased;
        }
        if iface.ip.ipv4_renewed {
            self.ipv4_renewed(ctrl, iface).await;
            return WanState::Ipv4Leased;
        }
        if let Some(next) = self.mapt_feature_refresh_due(ctrl, iface).await {
            return next;
        }

        WanState::Ipv4Leased
    }

    pub(super) async fn state_ipv6_leased(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        self.maintain_health_check(ctrl, iface, false, true).await;

        if !iface.ip.ipv6_status.is_up()
            || iface.wan.link_status == LinkStatus::Down
            || Self::dhcp_disabled_at_runtime(iface)
        {
            return self.transition_ipv6_down(ctrl, iface).await;
        }
        if Self::leaves_for_standby(ctrl, iface) {
            return self.transition_standby_deconfig(ctrl, iface).await;
        }

        if iface.ip.ipv6_changed {
            self.reconfigure_ipv6(ctrl, iface).await;
        } else if iface.wan.refresh {
            return self.state_refreshing_wan(ctrl, iface).await;
        } else if iface.ip.ipv4_status.is_up() {
            return self.transition_ipv4_up(ctrl, iface).await;
        } else if iface.wan.enable_mapt
            && iface.is_active()
            && iface.mapt.status == MaptStatus::Up
        {
            if self.bridge_mode_ready().await {
                return self.transition_mapt_up(ctrl, iface).await;
            }
        } else if let Some(next) = self.mapt_feature_refresh_due(ctrl, iface).await {
            return next;
        } else if iface.ip.ipv6_renewed {
            self.ipv6_renewed(ctrl, iface).await;
        }

        self.ipv6_toggle().await;
        WanState::Ipv6Leased
    }

    pub(super) async fn state_dual_stack_active(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        self.maintain_health_check(ctrl, iface, true, true).await;

        if iface.wan.link_status == LinkStatus::Down || Self::dhcp_disabled_at_runtime(iface) {
            return self.transition_dual_stack_down(ctrl, iface).await;
        }
        if iface.wan.refresh {
            return self.state_refreshing_wan(ctrl, iface).await;
        }
        if !iface.ip.ipv4_status.is_up() && !iface.ip.ipv6_status.is_up() {
            return self.transition_dual_stack_down(ctrl, iface).await;
        }
        if !iface.ip.ipv4_status.is_up() {
            return self.transition_ipv4_down(ctrl, iface).await;
        }
        if Self::leaves_for_standby(ctrl, iface) {
            return self.transition_standby_deconfig(ctrl, iface).await;
        }

        if iface.ip.ipv4_changed {
            self.reconfigure_ipv4(ctrl, iface).await;
        } else if !iface.ip.ipv6_status.is_up() {
            return self.transition_ipv6_down(ctrl, iface).await;
        } else if iface.ip.ipv6_changed {
            self.reconfigure_ipv6(ctrl, iface).await;
        } else if iface.wan.enable_mapt
            && iface.is_active()
            && iface.mapt.status == MaptStatus::Up
        {
            if self.bridge_mode_ready().await {
                return self.transition_mapt_up(ctrl, iface).await;
            }
        } else if let Some(next) = self.mapt_feature_refresh_due(ctrl, iface).await {
            return next;
        } else if iface.ip.ipv4_renewed {
            self.ipv4_renewed(ctrl, iface).await;
        } else if iface.ip.ipv6_renewed {
            self.ipv6_renewed(ctrl, iface).await;
        }

        self.ipv6_toggle().await;
        WanState::DualStackActive
    }

    pub(super) async fn state_mapt_active(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        self.maintain_health_check(ctrl, iface, false, true).await;

        if Self::leaves_for_standby(ctrl, iface) {
            return self.transition_standby_deconfig(ctrl, iface).await;
        }
        if !iface.wan.enable_mapt
            || !iface.ip.ipv6_status.is_up()
            || iface.mapt.status == MaptStatus::Down
            || iface.wan.link_status == LinkStatus::Down
            || iface.wan.refresh
        {
            return self.transition_mapt_down(ctrl, iface).await;
        }

        if ctrl.mapt_feature_changed {
            ctrl.mapt_feature_changed = false;
            if !ctrl.mapt_feature_enabled {
                self.transition_mapt_down(ctrl, iface).await;
                return self.transition_mapt_feature_refresh(ctrl, iface).await;
            }
        }

        if iface.ip.ipv6_changed {
            if self.reconfigure_ipv6(ctrl, iface).await && iface.mapt.status == MaptStatus::Up {
                iface.mapt.changed = true;
            }
        } else if iface.mapt.changed {
            self.reapply_mapt(iface).await;
        } else if iface.ip.ipv6_renewed {
            self.ipv6_renewed(ctrl, iface).await;
        }

        self.ipv6_toggle().await;
        WanState::MaptActive
    }

    /// Swap in new MAP-T rule parameters
    async fn reapply_mapt(&self, iface: &mut WanInterface) {
        let network = self.platform.network.as_ref();
        let ifname = iface.wan.name.as_str();

        if let Err(e) = network.reset_mapt(ifname, &iface.base_interface).await {
            error!("Interface '{}': MAP-T reset failed: {}", iface.name, e);
        }
        match &iface.mapt.params {
            Some(params) => {
                match network
                    .configure_mapt(ifname, &iface.base_interface, params)
                    .await
                {
                    Ok(()) => info!("Interface '{}': MAP-T reconfigured", iface.name),
                    Err(e) => error!("Interface '{}': MAP-T reconfiguration failed: {}", iface.name, e),
                }
            }
            None => error!("Interface '{}': MAP-T rule parameters missing", iface.name),
        }
        iface.mapt.changed = false;
    }

    pub(super) async fn state_refreshing_wan(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        if iface.wan.link_status == LinkStatus::Up {
            if iface.wan.refresh {
                return self.transition_refreshing_wan(ctrl, iface).await;
            }
            return self.transition_wan_refreshed(ctrl, iface).await;
        }
        WanState::RefreshingWan
    }

    pub(super) async fn state_deconfiguring_wan(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        if iface.wan.link_status == LinkStatus::Down {
            return self.transition_exit(ctrl, iface).await;
        }
        WanState::DeconfiguringWan
    }

    pub(super) async fn state_exit(
        &self,
        _ctrl: &mut WanController,
        iface: &mut WanInterface,
    ) -> WanState {
        iface.wan.name.clear();
        iface.clear_dhcp_data();
        WanState::Exit
    }
}
