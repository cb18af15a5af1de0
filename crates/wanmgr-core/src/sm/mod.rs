//! WAN interface state machine
//!
//! One [`InterfaceStateMachine`] is shared by every interface task; the
//! per-interface state lives in a [`WanController`] owned by the task and in
//! the [`WanInterface`] record borrowed for the duration of one tick.
//!
//! ## States
//!
//! ```text
//!   start ──► ConfiguringWan ──► ValidatingWan ──► ObtainingIpAddresses ◄──┐
//!                   ▲                                 │        ▲           │
//!                   └────────── link down ────────────┤        │           │
//!                                                     ▼        │           │
//!        ┌──────────────┬─────────────────┬──────────────┐     │     RefreshingWan
//!        │  Ipv4Leased  │   Ipv6Leased    │   Standby    │─────┘           ▲
//!        └──────┬───────┴────────┬────────┴──────────────┘                 │
//!               └──► DualStackActive ◄──┘      (refresh from any of these)─┘
//!                          │
//!                          ▼
//!                     MaptActive
//!
//!   guard tripped (any state) ──► DeconfiguringWan ──► Exit
//! ```
//!
//! ## Tick Flow
//!
//! 1. The runner refreshes the controller's config snapshot
//! 2. Pending lease payloads are applied to the record
//! 3. The global guard is checked once; if it trips the interface is
//!    deconfigured regardless of state
//! 4. Otherwise the handler for the current state runs and returns the next
//!    state
//!
//! Side effects go through the [`Platform`] collaborators. Failures there
//! are logged and the state is re-entered on the next tick; only a failure
//! to claim the upstream link on start ends the state machine.

mod handlers;
mod health;
pub mod lease;
mod setup;
mod states;
mod transitions;

pub use lease::{apply_ipv4_lease, apply_ipv6_lease, apply_status_update};
pub use setup::broadcast_address;
pub use states::WanState;

use tracing::info;

use crate::config::MaptRefreshConfig;
use crate::events::{EventSink, WanEvent};
use crate::ipc::IhcNotifier;
use crate::model::{
    DeviceNetworkingMode, IhcState, PhyStatus, SelectionStatus, WanConfig, WanInterface,
};
use crate::traits::Platform;

/// Per-task controller state
///
/// Never shared: the interface task owns it for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WanController {
    pub index: usize,

    // Config snapshot, refreshed every tick
    pub wan_enable: bool,
    pub device_nw_mode: DeviceNetworkingMode,
    /// Valid for the single tick in which it was read
    pub device_nw_mode_changed: bool,
    pub mapt_feature_enabled: bool,
    /// Latched until a state consumes it
    pub mapt_feature_changed: bool,

    pub current_state: WanState,
    pub previous_state: WanState,

    pub ihc_pid: Option<u32>,
    pub ihc_v4: IhcState,
    pub ihc_v6: IhcState,

    /// Standby has published the LAN prefix and waits for the bridge
    pub bridge_wait: bool,
}

impl WanController {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            wan_enable: false,
            device_nw_mode: DeviceNetworkingMode::Gateway,
            device_nw_mode_changed: false,
            mapt_feature_enabled: false,
            mapt_feature_changed: false,
            current_state: WanState::Exit,
            previous_state: WanState::Exit,
            ihc_pid: None,
            ihc_v4: IhcState::Stopped,
            ihc_v6: IhcState::Stopped,
            bridge_wait: false,
        }
    }

    /// Copy the global configuration into the controller
    ///
    /// The caller is responsible for clearing the transient flags on the
    /// shared configuration once they have been read.
    pub fn refresh(&mut self, config: &WanConfig) {
        self.wan_enable = config.enable;
        self.device_nw_mode = config.device_nw_mode;
        self.device_nw_mode_changed = config.device_nw_mode_changed;
        self.mapt_feature_enabled = config.mapt_feature_enabled;
        self.mapt_feature_changed |= config.mapt_feature_changed;
    }
}

/// True if the interface must be deconfigured whatever its state
///
/// WAN disabled, interface disabled, not selected by the policy, or the
/// physical link is not up.
pub fn guard_tripped(ctrl: &WanController, iface: &WanInterface) -> bool {
    !ctrl.wan_enable
        || !iface.wan.enable
        || iface.selection_status == SelectionStatus::NotSelected
        || iface.phy.status != PhyStatus::Up
}

/// The WAN interface state machine
pub struct InterfaceStateMachine {
    platform: Platform,
    notifier: IhcNotifier,
    events: EventSink,
    mapt_refresh: MaptRefreshConfig,
}

impl InterfaceStateMachine {
    /// Create a state machine driving the given collaborators
    pub fn new(platform: Platform, events: EventSink, mapt_refresh: MaptRefreshConfig) -> Self {
        let notifier = IhcNotifier::new(platform.ihc_transport.clone(), platform.status.clone());
        Self {
            platform,
            notifier,
            events,
            mapt_refresh,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Run the start transition
    ///
    /// # Returns
    ///
    /// - `ConfiguringWan`: The state machine is running
    /// - `Exit`: The upstream link could not be claimed
    pub async fn start(&self, ctrl: &mut WanController, iface: &mut WanInterface) -> WanState {
        let next = self.transition_start(ctrl, iface).await;
        self.record_transition(ctrl, iface, WanState::Exit, next);
        next
    }

    /// Advance the state machine by one tick
    ///
    /// The guard is evaluated once, before dispatch. The state that was
    /// current when the tick began stays in `ctrl.current_state` until the
    /// handler returns, so transitions can see where they came from.
    pub async fn tick(&self, ctrl: &mut WanController, iface: &mut WanInterface) -> WanState {
        let from = ctrl.current_state;
        iface.current_state = from;

        let next = if from.is_guarded() && guard_tripped(ctrl, iface) {
            self.transition_physical_interface_down(ctrl, iface).await
        } else {
            match from {
                WanState::ConfiguringWan => self.state_configuring_wan(ctrl, iface).await,
                WanState::ValidatingWan => self.state_validating_wan(ctrl, iface).await,
                WanState::ObtainingIpAddresses => {
                    self.state_obtaining_ip_addresses(ctrl, iface).await
                }
                WanState::Ipv4Leased => self.state_ipv4_leased(ctrl, iface).await,
                WanState::Ipv6Leased => self.state_ipv6_leased(ctrl, iface).await,
                WanState::DualStackActive => self.state_dual_stack_active(ctrl, iface).await,
                WanState::MaptActive => self.state_mapt_active(ctrl, iface).await,
                WanState::RefreshingWan => self.state_refreshing_wan(ctrl, iface).await,
                WanState::Standby => self.state_standby(ctrl, iface).await,
                WanState::DeconfiguringWan => self.state_deconfiguring_wan(ctrl, iface).await,
                WanState::Exit => self.state_exit(ctrl, iface).await,
            }
        };

        self.record_transition(ctrl, iface, from, next);
        next
    }

    fn record_transition(
        &self,
        ctrl: &mut WanController,
        iface: &mut WanInterface,
        from: WanState,
        to: WanState,
    ) {
        ctrl.previous_state = from;
        ctrl.current_state = to;
        iface.current_state = to;

        if from != to {
            info!("Interface '{}': {} -> {}", iface.name, from, to);
            self.events.emit(WanEvent::StateChanged {
                interface: iface.name.clone(),
                from,
                to,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceConfig;

    fn eligible() -> (WanController, WanInterface) {
        let mut ctrl = WanController::new(0);
        ctrl.wan_enable = true;
        let mut iface = WanInterface::from_config(0, &InterfaceConfig::new("erouter0"));
        iface.selection_status = SelectionStatus::Active;
        iface.phy.status = PhyStatus::Up;
        (ctrl, iface)
    }

    #[test]
    fn test_guard_conditions() {
        let (ctrl, iface) = eligible();
        assert!(!guard_tripped(&ctrl, &iface));

        let mut disabled = ctrl.clone();
        disabled.wan_enable = false;
        assert!(guard_tripped(&disabled, &iface));

        let mut not_selected = iface.clone();
        not_selected.selection_status = SelectionStatus::NotSelected;
        assert!(guard_tripped(&ctrl, &not_selected));

        let mut standby = iface.clone();
        standby.selection_status = SelectionStatus::Standby;
        assert!(!guard_tripped(&ctrl, &standby));

        let mut phy_down = iface;
        phy_down.phy.status = PhyStatus::Initializing;
        assert!(guard_tripped(&ctrl, &phy_down));
    }

    #[test]
    fn test_refresh_latches_mapt_change() {
        let mut ctrl = WanController::new(0);
        let mut config = WanConfig::new();
        config.mapt_feature_changed = true;
        config.device_nw_mode_changed = true;
        ctrl.refresh(&config);

        config.mapt_feature_changed = false;
        config.device_nw_mode_changed = false;
        ctrl.refresh(&config);

        assert!(ctrl.mapt_feature_changed);
        assert!(!ctrl.device_nw_mode_changed);
        assert!(ctrl.wan_enable);
    }
}
