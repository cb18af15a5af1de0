//! Architectural Contract Test: Payload Staging
//!
//! This test verifies how the IPC bridge hands lease payloads to the
//! interface tasks.
//!
//! Constraints verified:
//! - A record holds at most one pending payload per family
//! - A payload that cannot be staged is dropped after max_tries, reported
//!   as an event and returned as an error
//! - Payloads for unknown interfaces are rejected, never staged elsewhere
//! - Health-check events act on the record and the status store directly
//!
//! If this test fails, someone has:
//! - Replaced the single staging slot with a queue
//! - Made the bridge overwrite a payload the interface task never saw
//! - Let the bridge bypass the store lock

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use wanmgr_core::events::{EventSink, WanEvent};
use wanmgr_core::ipc::{IhcEventKind, IhcMessage, IpcBridge, IpcMessage};
use wanmgr_core::keys;
use wanmgr_core::model::{FamilyStatus, WanConfig, WanInterface};
use wanmgr_core::{Error, SharedWanStore, StatusStore};

fn bridge_with(
    mocks: &Mocks,
    records: Vec<WanInterface>,
) -> (IpcBridge, Arc<SharedWanStore>, tokio::sync::mpsc::Receiver<WanEvent>) {
    let config = minimal_config();
    let store = Arc::new(SharedWanStore::with_interfaces(
        WanConfig::new(),
        records,
        config.lock_timeout(),
    ));
    let (events, rx) = EventSink::channel(16);
    let bridge = IpcBridge::new(store.clone(), mocks.platform(), events, config.ipc)
        .with_delays(Duration::from_millis(1), Duration::from_millis(1));
    (bridge, store, rx)
}

#[tokio::test]
async fn second_payload_is_dropped_while_first_is_pending() {
    let mocks = Mocks::new();
    let (bridge, store, mut rx) = bridge_with(&mocks, vec![active_record("erouter0")]);

    let first = v4_lease("erouter0", "10.0.0.2");
    bridge
        .handle(IpcMessage::Dhcpv4(first.clone()))
        .await
        .expect("first payload is staged");

    let second = v4_lease("erouter0", "10.0.0.3");
    let result = bridge.handle(IpcMessage::Dhcpv4(second)).await;
    assert!(
        matches!(result, Err(Error::Ipc(_))),
        "second payload must be rejected, got {:?}",
        result
    );

    let record = store.snapshot(0).await.unwrap();
    assert_eq!(
        record.ip.pending_v4,
        Some(first),
        "the pending payload must be the first one, untouched"
    );

    assert_eq!(
        rx.try_recv().ok(),
        Some(WanEvent::PayloadDropped {
            interface: "erouter0".to_string(),
            family: "ipv4".to_string(),
        })
    );
}

#[tokio::test]
async fn consumed_slot_accepts_next_payload() {
    let mocks = Mocks::new();
    let (bridge, store, _rx) = bridge_with(&mocks, vec![active_record("erouter0")]);

    bridge
        .handle(IpcMessage::Dhcpv6(v6_lease("erouter0", "2001:db8:1::/64")))
        .await
        .unwrap();

    // The interface task takes the payload on its next tick
    let taken = {
        let mut iface = store.lock_iface(0).await.unwrap();
        iface.ip.pending_v6.take()
    };
    assert!(taken.is_some());

    bridge
        .handle(IpcMessage::Dhcpv6(v6_lease("erouter0", "2001:db8:2::/64")))
        .await
        .expect("slot is free again");

    let record = store.snapshot(0).await.unwrap();
    assert_eq!(
        record.ip.pending_v6.map(|p| p.site_prefix),
        Some("2001:db8:2::/64".to_string())
    );
}

#[tokio::test]
async fn unknown_interface_is_rejected() {
    let mocks = Mocks::new();
    let (bridge, store, _rx) = bridge_with(&mocks, vec![active_record("erouter0")]);

    let result = bridge
        .handle(IpcMessage::Dhcpv4(v4_lease("wwan0", "10.0.0.2")))
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    let record = store.snapshot(0).await.unwrap();
    assert!(record.ip.pending_v4.is_none());
}

#[tokio::test]
async fn echo_up_marks_connection_state() {
    let mocks = Mocks::new();
    let (bridge, _store, _rx) = bridge_with(&mocks, vec![active_record("erouter0")]);

    mocks
        .status
        .set(keys::IPV4_CONNECTION_STATE, keys::VALUE_DOWN)
        .await
        .unwrap();

    bridge
        .handle(IpcMessage::Ihc(IhcMessage {
            ifname: "erouter0".to_string(),
            event: IhcEventKind::EchoIpv4Up,
        }))
        .await
        .unwrap();

    assert_eq!(
        mocks.status.get_or_empty(keys::IPV4_CONNECTION_STATE).await,
        keys::VALUE_UP
    );
}

#[tokio::test]
async fn echo_failure_stops_client_and_marks_family_down() {
    let mocks = Mocks::new();
    let mut record = active_record("erouter0");
    record.ip.ipv4_status = FamilyStatus::Up;
    let (bridge, store, _rx) = bridge_with(&mocks, vec![record]);

    bridge
        .handle(IpcMessage::Ihc(IhcMessage {
            ifname: "erouter0".to_string(),
            event: IhcEventKind::EchoFailIpv4,
        }))
        .await
        .unwrap();

    assert_eq!(mocks.dhcp.stop_v4_count(), 1);
    let record = store.snapshot(0).await.unwrap();
    assert_eq!(record.ip.ipv4_status, FamilyStatus::Down);
}

#[tokio::test]
async fn forced_vlan_renews_are_capped() {
    let mocks = Mocks::new();
    let (bridge, _store, _rx) = bridge_with(&mocks, vec![active_record("erouter0")]);
    mocks.dhcp.set_vlan_pid(Some(321));

    let renew = || {
        IpcMessage::Ihc(IhcMessage {
            ifname: "mg0".to_string(),
            event: IhcEventKind::EchoRenewMgmt,
        })
    };

    mocks
        .status
        .set_persistent(keys::IHC_ACTIONS, "5")
        .await
        .unwrap();
    bridge.handle(renew()).await.expect("renew under the cap");
    assert_eq!(mocks.dhcp.renew_count(), 1);
    assert_eq!(
        mocks.status.get_persistent_or_empty(keys::IHC_ACTIONS).await,
        "6"
    );

    let refused = bridge.handle(renew()).await;
    assert!(refused.is_err(), "renew over the cap must be refused");
    assert_eq!(mocks.dhcp.renew_count(), 1, "no signal once the cap is exceeded");
}
