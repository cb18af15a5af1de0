//! Architectural Contract Test: Lease Lifecycle
//!
//! This test drives one interface through its whole life with the mock
//! collaborators: link bring-up, both leases, standby and back, lease
//! changes and MAP-T.
//!
//! Constraints verified:
//! - Bring-up passes ConfiguringWan, ValidatingWan and ObtainingIpAddresses
//!   in that order and claims the upstream link once
//! - Validation holds until the link layer has named the layer-3 interface
//! - Dual stack is entered only once both connection states are up and the
//!   LAN side has taken the delegated prefix
//! - A changed lease is reconfigured in place, a renewed one is not
//! - A changed IPv6 prefix is reconfigured in every state that holds one
//! - Losing one family of a dual-stack connection keeps the other; losing
//!   both returns to ObtainingIpAddresses
//! - Standby removes the configuration but keeps the leases
//! - Tearing a family down a second time changes nothing
//! - MAP-T takes IPv4 over from DHCPv4 and hands it back when withdrawn
//!
//! If this test fails, someone has:
//! - Reordered the conditions inside a state handler
//! - Skipped the LAN prefix hand-off before announcing IPv6
//! - Made dual stack fall back to ObtainingIpAddresses on a single loss
//! - Kept a single-family state alive after both families went down

mod common;

use common::*;
use tokio_test::assert_ok;
use wanmgr_core::StatusStore;
use wanmgr_core::keys;
use wanmgr_core::model::{
    FamilyStatus, Ipv4LeaseEvent, Ipv6LeaseEvent, LinkStatus, MaptParams, MaptStatus,
    SelectionStatus, WanInterface, WanStatus,
};
use wanmgr_core::sm::{
    InterfaceStateMachine, WanController, WanState, apply_ipv4_lease, apply_ipv6_lease,
};

const PREFIX: &str = "2001:db8:1::/64";
const NEW_PREFIX: &str = "2001:db8:2::/64";

/// The LAN side reports that it has taken the prefix
async fn lan_takes_prefix(mocks: &Mocks) {
    assert_ok!(mocks.status.set(keys::GLOBAL_IPV6_PREFIX_SET, PREFIX).await);
}

fn mapt_rule() -> MaptParams {
    MaptParams {
        rule_ipv6_prefix: "2001:db8:f::/48".to_string(),
        rule_ipv4_prefix: "192.0.2.0/24".to_string(),
        br_ipv6_prefix: "2001:db8:ffff::/64".to_string(),
        pd_ipv6_prefix: PREFIX.to_string(),
        ea_len: 16,
        psid_offset: 6,
        psid_len: 8,
        psid: 0x34,
        is_fmr: true,
    }
}

fn v6_lease_with_rule(prefix: &str) -> Ipv6LeaseEvent {
    Ipv6LeaseEvent {
        mapt: Some(mapt_rule()),
        ..v6_lease("erouter0", prefix)
    }
}

fn ipv4_expired() -> Ipv4LeaseEvent {
    Ipv4LeaseEvent {
        interface: "erouter0".to_string(),
        is_expired: true,
        ..Default::default()
    }
}

fn ipv6_lost() -> Ipv6LeaseEvent {
    Ipv6LeaseEvent {
        ifname: "erouter0".to_string(),
        ..Default::default()
    }
}

/// The old prefix was retired and the new one published for the LAN
async fn assert_prefix_replaced(mocks: &Mocks, iface: &WanInterface) {
    assert!(!iface.ip.ipv6_changed);
    assert_eq!(mocks.network.remove_lan_ipv6_count(), 1);
    assert_eq!(
        mocks.status.get_or_empty(keys::PREVIOUS_IPV6_PREFIX).await,
        PREFIX
    );
    assert_eq!(mocks.status.get_or_empty(keys::IPV6_PREFIX).await, NEW_PREFIX);
    assert_eq!(
        mocks.status.get_or_empty(keys::IPV6_CONNECTION_STATE).await,
        keys::VALUE_UP
    );
}

async fn ipv4_leased(
    mocks: &Mocks,
    machine: &InterfaceStateMachine,
    iface: WanInterface,
) -> (WanController, WanInterface) {
    let mut ctrl = enabled_controller();
    let mut iface = iface;
    ctrl.current_state = WanState::ObtainingIpAddresses;
    iface.ip.dhcp4c_pid = Some(42);
    iface.ip.dhcp6c_pid = Some(43);

    apply_ipv4_lease(&mocks.platform(), &mut iface, &v4_lease("erouter0", "10.0.0.2")).await;
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv4Leased);
    (ctrl, iface)
}

async fn ipv6_leased(
    mocks: &Mocks,
    machine: &InterfaceStateMachine,
) -> (WanController, WanInterface) {
    let mut ctrl = enabled_controller();
    let mut iface = active_record("erouter0");
    ctrl.current_state = WanState::ObtainingIpAddresses;
    iface.ip.dhcp6c_pid = Some(43);

    apply_ipv6_lease(&mocks.platform(), &mut iface, &v6_lease("erouter0", PREFIX)).await;
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::ObtainingIpAddresses
    );

    lan_takes_prefix(mocks).await;
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv6Leased);
    (ctrl, iface)
}

async fn dual_stack(
    mocks: &Mocks,
    machine: &InterfaceStateMachine,
    iface: WanInterface,
) -> (WanController, WanInterface) {
    let (mut ctrl, mut iface) = ipv4_leased(mocks, machine, iface).await;

    apply_ipv6_lease(&mocks.platform(), &mut iface, &v6_lease("erouter0", PREFIX)).await;
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv4Leased);

    lan_takes_prefix(mocks).await;
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::DualStackActive
    );
    (ctrl, iface)
}

async fn mapt_active(
    mocks: &Mocks,
    machine: &InterfaceStateMachine,
) -> (WanController, WanInterface) {
    let mut record = active_record("erouter0");
    record.wan.enable_mapt = true;
    let (mut ctrl, mut iface) = dual_stack(mocks, machine, record).await;

    apply_ipv6_lease(&mocks.platform(), &mut iface, &v6_lease_with_rule(PREFIX)).await;
    assert_eq!(iface.mapt.status, MaptStatus::Up);
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::MaptActive);
    (ctrl, iface)
}

#[tokio::test]
async fn bring_up_to_dual_stack_and_standby_round_trip() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);

    let mut ctrl = enabled_controller();
    let mut iface = active_record("erouter0");
    iface.wan.link_status = LinkStatus::Down;

    assert_eq!(
        machine.start(&mut ctrl, &mut iface).await,
        WanState::ConfiguringWan
    );
    assert!(mocks.link.upstream());
    assert_eq!(iface.wan.link_status, LinkStatus::Configuring);
    assert_eq!(mocks.link.published(), vec![WanStatus::Initialising]);

    // Nothing happens until the link layer reports the data link
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::ConfiguringWan
    );

    iface.wan.link_status = LinkStatus::Up;
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::ValidatingWan
    );
    assert_eq!(iface.wan.status, WanStatus::Validating);

    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::ObtainingIpAddresses
    );
    assert_eq!(mocks.dhcp.start_v4_count(), 1);
    assert_eq!(mocks.dhcp.start_v6_count(), 1);
    assert!(iface.ip.dhcp4c_pid.is_some());
    assert!(iface.ip.dhcp6c_pid.is_some());

    // Without a lease the state holds
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::ObtainingIpAddresses
    );

    apply_ipv4_lease(&mocks.platform(), &mut iface, &v4_lease("erouter0", "10.0.0.2")).await;
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv4Leased);
    assert_eq!(mocks.network.configure_ipv4_count(), 1);
    assert_eq!(mocks.network.add_default_route_count(), 1);
    assert_eq!(iface.wan.status, WanStatus::Up);
    assert_eq!(
        mocks.status.get_or_empty(keys::IPV4_CONNECTION_STATE).await,
        keys::VALUE_UP
    );

    apply_ipv6_lease(&mocks.platform(), &mut iface, &v6_lease("erouter0", PREFIX)).await;
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv4Leased);
    assert_eq!(mocks.status.get_or_empty(keys::IPV6_PREFIX).await, PREFIX);

    // The prefix is published but the LAN side has not taken it yet
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv4Leased);

    lan_takes_prefix(&mocks).await;
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::DualStackActive
    );
    assert_eq!(
        mocks.status.get_or_empty(keys::IPV6_CONNECTION_STATE).await,
        keys::VALUE_UP
    );

    iface.selection_status = SelectionStatus::Standby;
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Standby);
    assert_eq!(iface.wan.status, WanStatus::Standby);
    assert!(!iface.wan.active_link);
    assert_eq!(
        mocks
            .status
            .get_persistent_or_empty(&keys::active_link(0))
            .await,
        "false"
    );
    assert_eq!(mocks.network.unconfigure_ipv4_count(), 1);
    assert_eq!(iface.ip.ipv4_status, FamilyStatus::Up);
    assert_eq!(iface.ip.ipv6_status, FamilyStatus::Up);

    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Standby);

    iface.selection_status = SelectionStatus::Active;
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::Standby,
        "waits for the LAN side to take the prefix again"
    );
    assert!(ctrl.bridge_wait);

    lan_takes_prefix(&mocks).await;
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::DualStackActive
    );
    assert!(!ctrl.bridge_wait);
    assert_eq!(mocks.network.configure_ipv4_count(), 2);
}

#[tokio::test]
async fn changed_lease_is_reconfigured_in_place() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = ipv4_leased(&mocks, &machine, active_record("erouter0")).await;
    assert_eq!(mocks.network.configure_ipv4_count(), 1);

    apply_ipv4_lease(&mocks.platform(), &mut iface, &v4_lease("erouter0", "10.0.0.3")).await;
    assert!(iface.ip.ipv4_changed);

    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv4Leased);
    assert!(!iface.ip.ipv4_changed);
    assert_eq!(mocks.network.unconfigure_ipv4_count(), 1);
    assert_eq!(mocks.network.configure_ipv4_count(), 2);
    assert_eq!(
        mocks.status.get_or_empty(keys::CURRENT_WAN_IPADDR).await,
        "10.0.0.3"
    );
}

#[tokio::test]
async fn renewed_lease_is_not_reconfigured() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = ipv4_leased(&mocks, &machine, active_record("erouter0")).await;

    apply_ipv4_lease(&mocks.platform(), &mut iface, &v4_lease("erouter0", "10.0.0.2")).await;
    assert!(iface.ip.ipv4_renewed);
    assert!(!iface.ip.ipv4_changed);

    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv4Leased);
    assert!(!iface.ip.ipv4_renewed);
    assert_eq!(mocks.network.unconfigure_ipv4_count(), 0);
    assert_eq!(mocks.network.configure_ipv4_count(), 1);
}

#[tokio::test]
async fn expired_lease_restarts_a_dead_client() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = ipv4_leased(&mocks, &machine, active_record("erouter0")).await;
    mocks.dhcp.set_clients_alive(false);

    apply_ipv4_lease(&mocks.platform(), &mut iface, &ipv4_expired()).await;
    assert_eq!(iface.ip.ipv4_status, FamilyStatus::Down);

    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::ObtainingIpAddresses
    );
    assert_eq!(mocks.dhcp.start_v4_count(), 1);
    assert!(iface.ip.dhcp4c_pid.is_some());
    assert_eq!(mocks.network.unconfigure_ipv4_count(), 1);
    assert_eq!(iface.wan.status, WanStatus::Validating);
    assert_eq!(
        mocks.status.get_or_empty(keys::IPV4_CONNECTION_STATE).await,
        keys::VALUE_DOWN
    );
}

#[tokio::test]
async fn dual_stack_losing_ipv6_keeps_ipv4() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = dual_stack(&mocks, &machine, active_record("erouter0")).await;

    apply_ipv6_lease(&mocks.platform(), &mut iface, &ipv6_lost()).await;

    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv4Leased);
    assert_eq!(iface.ip.ipv4_status, FamilyStatus::Up);
    assert!(
        mocks
            .status
            .get_or_empty(keys::GLOBAL_IPV6_PREFIX_SET)
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn dual_stack_losing_ipv4_keeps_ipv6() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = dual_stack(&mocks, &machine, active_record("erouter0")).await;

    apply_ipv4_lease(&mocks.platform(), &mut iface, &ipv4_expired()).await;

    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv6Leased);
    assert_eq!(iface.ip.ipv6_status, FamilyStatus::Up);
    assert_eq!(mocks.network.unconfigure_ipv4_count(), 1);
}

#[tokio::test]
async fn mapt_takes_over_ipv4_and_hands_it_back() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = mapt_active(&mocks, &machine).await;
    assert_eq!(mocks.network.configure_mapt_count(), 1);
    assert_eq!(mocks.network.replace_default_route_count(), 1);
    assert_eq!(iface.ip.ipv4_status, FamilyStatus::Down);
    assert!(iface.ip.dhcp4c_pid.is_none(), "DHCPv4 yields to MAP-T");
    let starts_before = mocks.dhcp.start_v4_count();

    // Same rule again is a renewal, not a reconfiguration
    apply_ipv6_lease(&mocks.platform(), &mut iface, &v6_lease_with_rule(PREFIX)).await;
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::MaptActive);
    assert_eq!(mocks.network.configure_mapt_count(), 1);

    apply_ipv6_lease(&mocks.platform(), &mut iface, &v6_lease("erouter0", PREFIX)).await;
    assert_eq!(iface.mapt.status, MaptStatus::Down);

    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv6Leased);
    assert_eq!(mocks.network.reset_mapt_count(), 1);
    assert_eq!(mocks.dhcp.start_v4_count(), starts_before + 1);
    assert!(iface.ip.dhcp4c_pid.is_some());
}

#[tokio::test]
async fn validation_waits_for_layer3_name() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);

    let mut ctrl = enabled_controller();
    let mut iface = active_record("erouter0");
    iface.wan.name.clear();
    ctrl.current_state = WanState::ValidatingWan;

    for _ in 0..3 {
        assert_eq!(
            machine.tick(&mut ctrl, &mut iface).await,
            WanState::ValidatingWan
        );
    }
    assert_eq!(mocks.dhcp.start_v4_count(), 0);
    assert_eq!(mocks.dhcp.start_v6_count(), 0);

    iface.wan.name = "erouter0".to_string();
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::ObtainingIpAddresses
    );
    assert_eq!(mocks.dhcp.start_v4_count(), 1);
    assert_eq!(mocks.dhcp.start_v6_count(), 1);
    assert!(iface.ip.dhcp4c_pid.is_some());
    assert!(iface.ip.dhcp6c_pid.is_some());
}

#[tokio::test]
async fn dual_stack_losing_both_families_obtains_again() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = dual_stack(&mocks, &machine, active_record("erouter0")).await;

    apply_ipv4_lease(&mocks.platform(), &mut iface, &ipv4_expired()).await;
    apply_ipv6_lease(&mocks.platform(), &mut iface, &ipv6_lost()).await;
    assert_eq!(iface.ip.ipv4_status, FamilyStatus::Down);
    assert_eq!(iface.ip.ipv6_status, FamilyStatus::Down);

    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::ObtainingIpAddresses
    );
    assert_eq!(iface.wan.status, WanStatus::Validating);
    assert_eq!(mocks.network.unconfigure_ipv4_count(), 1);
    assert_eq!(mocks.network.remove_lan_ipv6_count(), 1);
    assert_eq!(
        mocks.status.get_or_empty(keys::IPV4_CONNECTION_STATE).await,
        keys::VALUE_DOWN
    );
    assert_eq!(
        mocks.status.get_or_empty(keys::IPV6_CONNECTION_STATE).await,
        keys::VALUE_DOWN
    );
    assert_eq!(
        mocks.status.get_or_empty(keys::WAN_STATUS).await,
        keys::VALUE_STOPPED
    );

    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::ObtainingIpAddresses
    );
}

#[tokio::test]
async fn changed_prefix_is_reconfigured_in_ipv6_leased() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = ipv6_leased(&mocks, &machine).await;

    apply_ipv6_lease(&mocks.platform(), &mut iface, &v6_lease("erouter0", NEW_PREFIX)).await;
    assert!(iface.ip.ipv6_changed);

    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Ipv6Leased);
    assert_prefix_replaced(&mocks, &iface).await;
}

#[tokio::test]
async fn changed_prefix_is_reconfigured_in_dual_stack() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = dual_stack(&mocks, &machine, active_record("erouter0")).await;

    apply_ipv6_lease(&mocks.platform(), &mut iface, &v6_lease("erouter0", NEW_PREFIX)).await;
    assert!(iface.ip.ipv6_changed);

    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::DualStackActive
    );
    assert_prefix_replaced(&mocks, &iface).await;
    assert_eq!(iface.ip.ipv4_status, FamilyStatus::Up);
    assert_eq!(mocks.network.unconfigure_ipv4_count(), 0);
}

#[tokio::test]
async fn changed_prefix_under_mapt_reapplies_the_rule() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = mapt_active(&mocks, &machine).await;

    apply_ipv6_lease(&mocks.platform(), &mut iface, &v6_lease_with_rule(NEW_PREFIX)).await;
    assert!(iface.ip.ipv6_changed);
    assert!(!iface.mapt.changed, "the rule itself did not change");

    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::MaptActive);
    assert_prefix_replaced(&mocks, &iface).await;
    assert!(iface.mapt.changed);
    assert_eq!(mocks.network.configure_mapt_count(), 1);

    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::MaptActive);
    assert!(!iface.mapt.changed);
    assert_eq!(mocks.network.reset_mapt_count(), 1);
    assert_eq!(mocks.network.configure_mapt_count(), 2);
}

#[tokio::test]
async fn second_teardown_changes_nothing() {
    let mocks = Mocks::new();
    let machine = machine(&mocks);
    let (mut ctrl, mut iface) = dual_stack(&mocks, &machine, active_record("erouter0")).await;

    iface.selection_status = SelectionStatus::Standby;
    assert_eq!(machine.tick(&mut ctrl, &mut iface).await, WanState::Standby);
    assert_eq!(mocks.network.unconfigure_ipv4_count(), 1);
    assert_eq!(mocks.network.remove_lan_ipv6_count(), 1);
    assert_eq!(
        mocks.status.get_or_empty(keys::PREVIOUS_IPV6_PREFIX).await,
        PREFIX
    );

    // Deconfiguring from standby tears both families down again
    iface.selection_status = SelectionStatus::NotSelected;
    assert_eq!(
        machine.tick(&mut ctrl, &mut iface).await,
        WanState::DeconfiguringWan
    );
    assert_eq!(mocks.network.unconfigure_ipv4_count(), 2);
    assert_eq!(mocks.network.remove_lan_ipv6_count(), 2);

    assert_eq!(
        mocks.status.get_or_empty(keys::PREVIOUS_IPV6_PREFIX).await,
        PREFIX,
        "an empty prefix never replaces the retired one"
    );
    assert!(mocks.status.get_or_empty(keys::IPV6_PREFIX).await.is_empty());
    assert_eq!(
        mocks.status.get_or_empty(keys::IPV4_CONNECTION_STATE).await,
        keys::VALUE_DOWN
    );
    assert_eq!(
        mocks.status.get_or_empty(keys::IPV6_CONNECTION_STATE).await,
        keys::VALUE_DOWN
    );
    assert_eq!(
        mocks.status.get_or_empty(keys::CURRENT_WAN_IPADDR).await,
        "0.0.0.0"
    );
    assert_eq!(
        mocks.status.get_or_empty(keys::WAN_STATUS).await,
        keys::VALUE_STOPPED
    );
}
