//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides recording test doubles for every collaborator the
//! state machine drives. They implement no real functionality; they count
//! calls and hand back configurable answers.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::Stream;

use wanmgr_core::config::{InterfaceConfig, ManagerConfig, MaptRefreshConfig};
use wanmgr_core::events::{EventSink, WanEvent};
use wanmgr_core::ipc::{IhcNotification, IhcTransport, IpcMessage, IpcSource};
use wanmgr_core::model::{
    DeviceNetworkingMode, Ipv4Data, Ipv4LeaseEvent, Ipv6LeaseEvent, LinkStatus, MaptParams,
    PhyStatus, SelectionStatus, WanInterface, WanStatus,
};
use wanmgr_core::sm::{InterfaceStateMachine, WanController};
use wanmgr_core::traits::{
    CellularIpInfo, DhcpClientControl, HealthCheckService, LinkLayerManager, Platform, PppControl,
    SystemNetworkConfigurator,
};
use wanmgr_core::{Error, MemoryStatusStore, Result};

fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// A network configurator that records every request
pub struct MockNetwork {
    configure_ipv4_count: Arc<AtomicUsize>,
    unconfigure_ipv4_count: Arc<AtomicUsize>,
    add_default_route_count: Arc<AtomicUsize>,
    delete_default_route_count: Arc<AtomicUsize>,
    configure_mapt_count: Arc<AtomicUsize>,
    reset_mapt_count: Arc<AtomicUsize>,
    replace_default_route_count: Arc<AtomicUsize>,
    remove_lan_ipv6_count: Arc<AtomicUsize>,
    resolver_writes: Arc<Mutex<Vec<Vec<String>>>>,
    lan_ipv6_ready: Arc<AtomicBool>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            configure_ipv4_count: Arc::new(AtomicUsize::new(0)),
            unconfigure_ipv4_count: Arc::new(AtomicUsize::new(0)),
            add_default_route_count: Arc::new(AtomicUsize::new(0)),
            delete_default_route_count: Arc::new(AtomicUsize::new(0)),
            configure_mapt_count: Arc::new(AtomicUsize::new(0)),
            reset_mapt_count: Arc::new(AtomicUsize::new(0)),
            replace_default_route_count: Arc::new(AtomicUsize::new(0)),
            remove_lan_ipv6_count: Arc::new(AtomicUsize::new(0)),
            resolver_writes: Arc::new(Mutex::new(Vec::new())),
            lan_ipv6_ready: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a new MockNetwork that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            configure_ipv4_count: Arc::clone(&other.configure_ipv4_count),
            unconfigure_ipv4_count: Arc::clone(&other.unconfigure_ipv4_count),
            add_default_route_count: Arc::clone(&other.add_default_route_count),
            delete_default_route_count: Arc::clone(&other.delete_default_route_count),
            configure_mapt_count: Arc::clone(&other.configure_mapt_count),
            reset_mapt_count: Arc::clone(&other.reset_mapt_count),
            replace_default_route_count: Arc::clone(&other.replace_default_route_count),
            remove_lan_ipv6_count: Arc::clone(&other.remove_lan_ipv6_count),
            resolver_writes: Arc::clone(&other.resolver_writes),
            lan_ipv6_ready: Arc::clone(&other.lan_ipv6_ready),
        }
    }

    pub fn configure_ipv4_count(&self) -> usize {
        count(&self.configure_ipv4_count)
    }

    pub fn unconfigure_ipv4_count(&self) -> usize {
        count(&self.unconfigure_ipv4_count)
    }

    pub fn add_default_route_count(&self) -> usize {
        count(&self.add_default_route_count)
    }

    pub fn delete_default_route_count(&self) -> usize {
        count(&self.delete_default_route_count)
    }

    pub fn configure_mapt_count(&self) -> usize {
        count(&self.configure_mapt_count)
    }

    pub fn reset_mapt_count(&self) -> usize {
        count(&self.reset_mapt_count)
    }

    pub fn replace_default_route_count(&self) -> usize {
        count(&self.replace_default_route_count)
    }

    pub fn remove_lan_ipv6_count(&self) -> usize {
        count(&self.remove_lan_ipv6_count)
    }

    pub fn resolver_writes(&self) -> Vec<Vec<String>> {
        self.resolver_writes.lock().unwrap().clone()
    }

    pub fn set_lan_ipv6_ready(&self, ready: bool) {
        self.lan_ipv6_ready.store(ready, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl SystemNetworkConfigurator for MockNetwork {
    async fn configure_ipv4(&self, _ifname: &str, _data: &Ipv4Data, _broadcast: &str) -> Result<()> {
        bump(&self.configure_ipv4_count);
        Ok(())
    }

    async fn unconfigure_ipv4(&self, _ifname: &str) -> Result<()> {
        bump(&self.unconfigure_ipv4_count);
        Ok(())
    }

    async fn add_gateway_route(&self, _data: &Ipv4Data) -> Result<()> {
        Ok(())
    }

    async fn add_default_route(&self, _mode: DeviceNetworkingMode, _data: &Ipv4Data) -> Result<()> {
        bump(&self.add_default_route_count);
        Ok(())
    }

    async fn delete_default_route(
        &self,
        _mode: DeviceNetworkingMode,
        _mode_changed: bool,
        _data: &Ipv4Data,
    ) -> Result<()> {
        bump(&self.delete_default_route_count);
        Ok(())
    }

    async fn replace_default_route(&self, _dev: &str, _mtu: u32) -> Result<()> {
        bump(&self.replace_default_route_count);
        Ok(())
    }

    async fn remove_lan_ipv6_address(&self) -> Result<()> {
        bump(&self.remove_lan_ipv6_count);
        Ok(())
    }

    async fn write_resolver(&self, nameservers: &[String]) -> Result<()> {
        self.resolver_writes.lock().unwrap().push(nameservers.to_vec());
        Ok(())
    }

    async fn remove_resolver(&self) -> Result<()> {
        Ok(())
    }

    async fn is_lan_ipv6_ready(&self) -> Result<bool> {
        Ok(self.lan_ipv6_ready.load(Ordering::SeqCst))
    }

    async fn toggle_ipv6(&self) -> Result<()> {
        Ok(())
    }

    async fn configure_mapt(&self, _ifname: &str, _base: &str, _params: &MaptParams) -> Result<()> {
        bump(&self.configure_mapt_count);
        Ok(())
    }

    async fn reset_mapt(&self, _ifname: &str, _base: &str) -> Result<()> {
        bump(&self.reset_mapt_count);
        Ok(())
    }

    async fn start_xlat(&self, _ifname: &str) -> Result<()> {
        Ok(())
    }

    async fn stop_xlat(&self) -> Result<()> {
        Ok(())
    }

    async fn is_xlat_running(&self) -> bool {
        false
    }

    async fn uptime_secs(&self) -> u64 {
        100
    }
}

/// A DHCP client control that hands out increasing pids
pub struct MockDhcp {
    start_v4_count: Arc<AtomicUsize>,
    stop_v4_count: Arc<AtomicUsize>,
    start_v6_count: Arc<AtomicUsize>,
    stop_v6_count: Arc<AtomicUsize>,
    renew_count: Arc<AtomicUsize>,
    next_pid: Arc<AtomicU32>,
    clients_alive: Arc<AtomicBool>,
    v6_running: Arc<AtomicBool>,
    v6_poll_count: Arc<AtomicUsize>,
    vlan_pid: Arc<Mutex<Option<u32>>>,
}

impl MockDhcp {
    pub fn new() -> Self {
        Self {
            start_v4_count: Arc::new(AtomicUsize::new(0)),
            stop_v4_count: Arc::new(AtomicUsize::new(0)),
            start_v6_count: Arc::new(AtomicUsize::new(0)),
            stop_v6_count: Arc::new(AtomicUsize::new(0)),
            renew_count: Arc::new(AtomicUsize::new(0)),
            next_pid: Arc::new(AtomicU32::new(100)),
            clients_alive: Arc::new(AtomicBool::new(true)),
            v6_running: Arc::new(AtomicBool::new(false)),
            v6_poll_count: Arc::new(AtomicUsize::new(0)),
            vlan_pid: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a new MockDhcp that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            start_v4_count: Arc::clone(&other.start_v4_count),
            stop_v4_count: Arc::clone(&other.stop_v4_count),
            start_v6_count: Arc::clone(&other.start_v6_count),
            stop_v6_count: Arc::clone(&other.stop_v6_count),
            renew_count: Arc::clone(&other.renew_count),
            next_pid: Arc::clone(&other.next_pid),
            clients_alive: Arc::clone(&other.clients_alive),
            v6_running: Arc::clone(&other.v6_running),
            v6_poll_count: Arc::clone(&other.v6_poll_count),
            vlan_pid: Arc::clone(&other.vlan_pid),
        }
    }

    pub fn start_v4_count(&self) -> usize {
        count(&self.start_v4_count)
    }

    pub fn stop_v4_count(&self) -> usize {
        count(&self.stop_v4_count)
    }

    pub fn start_v6_count(&self) -> usize {
        count(&self.start_v6_count)
    }

    pub fn stop_v6_count(&self) -> usize {
        count(&self.stop_v6_count)
    }

    pub fn renew_count(&self) -> usize {
        count(&self.renew_count)
    }

    /// Make every pid look dead (or alive again)
    pub fn set_clients_alive(&self, alive: bool) {
        self.clients_alive.store(alive, Ordering::SeqCst);
    }

    /// Keep the DHCPv6 process around after it was told to stop
    pub fn set_v6_running(&self, running: bool) {
        self.v6_running.store(running, Ordering::SeqCst);
    }

    pub fn v6_poll_count(&self) -> usize {
        count(&self.v6_poll_count)
    }

    pub fn set_vlan_pid(&self, pid: Option<u32>) {
        *self.vlan_pid.lock().unwrap() = pid;
    }

    fn pid(&self) -> u32 {
        self.next_pid.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DhcpClientControl for MockDhcp {
    async fn start_v4(&self, _ifname: &str) -> Result<u32> {
        bump(&self.start_v4_count);
        Ok(self.pid())
    }

    async fn stop_v4(&self, _ifname: &str, _release: bool) -> Result<()> {
        bump(&self.stop_v4_count);
        Ok(())
    }

    async fn start_v6(&self, _ifname: &str) -> Result<u32> {
        bump(&self.start_v6_count);
        Ok(self.pid())
    }

    async fn stop_v6(&self, _ifname: &str) -> Result<()> {
        bump(&self.stop_v6_count);
        Ok(())
    }

    async fn mark_v6_release(&self, _ifname: &str) -> Result<()> {
        Ok(())
    }

    async fn is_running(&self, _pid: u32) -> bool {
        self.clients_alive.load(Ordering::SeqCst)
    }

    async fn is_v6_running(&self, _ifname: &str) -> bool {
        bump(&self.v6_poll_count);
        self.v6_running.load(Ordering::SeqCst)
    }

    async fn collect_zombies(&self) {}

    async fn signal_renew(&self, _pid: u32) -> Result<()> {
        bump(&self.renew_count);
        Ok(())
    }

    async fn vlan_client_pid(&self, _ifname: &str) -> Option<u32> {
        *self.vlan_pid.lock().unwrap()
    }
}

/// PPP control that never finds a surviving session
pub struct MockPpp {
    create_count: Arc<AtomicUsize>,
    delete_count: Arc<AtomicUsize>,
}

impl MockPpp {
    pub fn new() -> Self {
        Self {
            create_count: Arc::new(AtomicUsize::new(0)),
            delete_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a new MockPpp that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            create_count: Arc::clone(&other.create_count),
            delete_count: Arc::clone(&other.delete_count),
        }
    }

    pub fn create_count(&self) -> usize {
        count(&self.create_count)
    }

    pub fn delete_count(&self) -> usize {
        count(&self.delete_count)
    }
}

#[async_trait::async_trait]
impl PppControl for MockPpp {
    async fn create_session(&self, _ifname: &str, _ppp_path: &str) -> Result<()> {
        bump(&self.create_count);
        Ok(())
    }

    async fn delete_session(&self, _ifname: &str, _ppp_path: &str) -> Result<()> {
        bump(&self.delete_count);
        Ok(())
    }

    async fn restart_update_info(&self, _ifname: &str, _ppp_path: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Health-check control with a fixed pid
pub struct MockHealthCheck {
    start_count: Arc<AtomicUsize>,
    stop_count: Arc<AtomicUsize>,
}

impl MockHealthCheck {
    pub fn new() -> Self {
        Self {
            start_count: Arc::new(AtomicUsize::new(0)),
            stop_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a new MockHealthCheck that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            start_count: Arc::clone(&other.start_count),
            stop_count: Arc::clone(&other.stop_count),
        }
    }

    pub fn start_count(&self) -> usize {
        count(&self.start_count)
    }

    pub fn stop_count(&self) -> usize {
        count(&self.stop_count)
    }
}

#[async_trait::async_trait]
impl HealthCheckService for MockHealthCheck {
    async fn start(&self, _ifname: &str) -> Result<u32> {
        bump(&self.start_count);
        Ok(900)
    }

    async fn stop(&self, _pid: u32) -> Result<()> {
        bump(&self.stop_count);
        Ok(())
    }
}

/// Link layer owner that remembers the upstream flag
pub struct MockLink {
    upstream: Arc<AtomicBool>,
    fail_set_upstream: Arc<AtomicBool>,
    set_upstream_count: Arc<AtomicUsize>,
    ethernet_upstream_count: Arc<AtomicUsize>,
    refresh_count: Arc<AtomicUsize>,
    published: Arc<Mutex<Vec<WanStatus>>>,
    cellular: Arc<Mutex<CellularIpInfo>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            upstream: Arc::new(AtomicBool::new(false)),
            fail_set_upstream: Arc::new(AtomicBool::new(false)),
            set_upstream_count: Arc::new(AtomicUsize::new(0)),
            ethernet_upstream_count: Arc::new(AtomicUsize::new(0)),
            refresh_count: Arc::new(AtomicUsize::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
            cellular: Arc::new(Mutex::new(CellularIpInfo::default())),
        }
    }

    /// Create a new MockLink that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            upstream: Arc::clone(&other.upstream),
            fail_set_upstream: Arc::clone(&other.fail_set_upstream),
            set_upstream_count: Arc::clone(&other.set_upstream_count),
            ethernet_upstream_count: Arc::clone(&other.ethernet_upstream_count),
            refresh_count: Arc::clone(&other.refresh_count),
            published: Arc::clone(&other.published),
            cellular: Arc::clone(&other.cellular),
        }
    }

    pub fn upstream(&self) -> bool {
        self.upstream.load(Ordering::SeqCst)
    }

    pub fn set_upstream_count(&self) -> usize {
        count(&self.set_upstream_count)
    }

    pub fn ethernet_upstream_count(&self) -> usize {
        count(&self.ethernet_upstream_count)
    }

    pub fn refresh_count(&self) -> usize {
        count(&self.refresh_count)
    }

    pub fn fail_set_upstream(&self, fail: bool) {
        self.fail_set_upstream.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<WanStatus> {
        self.published.lock().unwrap().clone()
    }

    pub fn set_cellular(&self, info: CellularIpInfo) {
        *self.cellular.lock().unwrap() = info;
    }
}

#[async_trait::async_trait]
impl LinkLayerManager for MockLink {
    async fn set_upstream(&self, _phy_path: &str, enable: bool) -> Result<()> {
        bump(&self.set_upstream_count);
        if self.fail_set_upstream.load(Ordering::SeqCst) {
            return Err(Error::system("upstream unavailable"));
        }
        self.upstream.store(enable, Ordering::SeqCst);
        Ok(())
    }

    async fn get_upstream(&self, _phy_path: &str) -> Result<bool> {
        Ok(self.upstream.load(Ordering::SeqCst))
    }

    async fn restart_link_status(&self, _ifname: &str) -> Result<()> {
        Ok(())
    }

    async fn request_refresh(&self, _ifname: &str) -> Result<()> {
        bump(&self.refresh_count);
        Ok(())
    }

    async fn delete_vlan_link(&self, _ifname: &str) -> Result<()> {
        Ok(())
    }

    async fn fetch_cellular_ip(&self, _phy_path: &str) -> Result<CellularIpInfo> {
        Ok(self.cellular.lock().unwrap().clone())
    }

    async fn publish_wan_status(&self, _ifname: &str, status: WanStatus) -> Result<()> {
        self.published.lock().unwrap().push(status);
        Ok(())
    }

    async fn set_ethernet_upstream(&self, _enable: bool) -> Result<()> {
        bump(&self.ethernet_upstream_count);
        Ok(())
    }
}

/// IHC endpoint that records every notification
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<IhcNotification>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent(&self) -> Vec<IhcNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IhcTransport for RecordingTransport {
    async fn send(&self, notification: &IhcNotification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// A controlled IpcSource that can emit messages on demand
pub struct ControlledIpcSource {
    engine_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<IpcMessage>>>>,
}

impl ControlledIpcSource {
    pub fn new() -> (Self, mpsc::UnboundedSender<IpcMessage>) {
        let (test_tx, engine_rx) = mpsc::unbounded_channel();
        let source = Self {
            engine_rx: Arc::new(Mutex::new(Some(engine_rx))),
        };
        (source, test_tx)
    }
}

impl IpcSource for ControlledIpcSource {
    fn incoming(&self) -> Pin<Box<dyn Stream<Item = IpcMessage> + Send + 'static>> {
        let rx = self
            .engine_rx
            .lock()
            .unwrap()
            .take()
            .expect("incoming() can only be called once");
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

/// An IPC source that never yields anything
pub struct IdleIpcSource;

impl IpcSource for IdleIpcSource {
    fn incoming(&self) -> Pin<Box<dyn Stream<Item = IpcMessage> + Send + 'static>> {
        Box::pin(tokio_stream::pending())
    }
}

/// Every mock behind one handle
pub struct Mocks {
    pub network: Arc<MockNetwork>,
    pub dhcp: Arc<MockDhcp>,
    pub ppp: Arc<MockPpp>,
    pub health_check: Arc<MockHealthCheck>,
    pub link: Arc<MockLink>,
    pub status: Arc<MemoryStatusStore>,
    pub transport: Arc<RecordingTransport>,
}

impl Mocks {
    pub fn new() -> Self {
        Self {
            network: Arc::new(MockNetwork::new()),
            dhcp: Arc::new(MockDhcp::new()),
            ppp: Arc::new(MockPpp::new()),
            health_check: Arc::new(MockHealthCheck::new()),
            link: Arc::new(MockLink::new()),
            status: Arc::new(MemoryStatusStore::new()),
            transport: Arc::new(RecordingTransport::new()),
        }
    }

    /// The platform bundle the state machine runs against
    pub fn platform(&self) -> Platform {
        Platform {
            network: self.network.clone(),
            dhcp: self.dhcp.clone(),
            ppp: self.ppp.clone(),
            health_check: self.health_check.clone(),
            link: self.link.clone(),
            status: self.status.clone(),
            ihc_transport: self.transport.clone(),
        }
    }
}

/// A state machine over `mocks` that emits no events
pub fn machine(mocks: &Mocks) -> InterfaceStateMachine {
    InterfaceStateMachine::new(
        mocks.platform(),
        EventSink::disabled(),
        minimal_config().mapt_refresh,
    )
}

/// Helper to create a minimal ManagerConfig for testing
pub fn minimal_config() -> ManagerConfig {
    let mut config = ManagerConfig::new().with_interface(InterfaceConfig::new("erouter0"));
    config.tick_interval_ms = 10;
    config.policy_interval_ms = 20;
    config.lock_timeout_ms = 200;
    config.event_channel_capacity = 100;
    config.ipc.max_tries = 3;
    config.ipc.retry_wait_ms = 5;
    config.mapt_refresh = MaptRefreshConfig {
        max_polls: 2,
        poll_interval_ms: 1,
    };
    config.ihc_restart_delay_ms = 1;
    config.dhcpv6_renew_delay_ms = 1;
    config
}

/// A record that passes the guard: selected, physical and data link up
pub fn active_record(name: &str) -> WanInterface {
    active_record_from(&InterfaceConfig::new(name))
}

/// Like [`active_record`], for a non-default interface configuration
pub fn active_record_from(config: &InterfaceConfig) -> WanInterface {
    let mut iface = WanInterface::from_config(0, config);
    iface.selection_status = SelectionStatus::Active;
    iface.phy.status = PhyStatus::Up;
    iface.wan.link_status = LinkStatus::Up;
    iface
}

/// A controller for an enabled WAN
pub fn enabled_controller() -> WanController {
    let mut ctrl = WanController::new(0);
    ctrl.wan_enable = true;
    ctrl
}

pub fn v4_lease(ifname: &str, ip: &str) -> Ipv4LeaseEvent {
    Ipv4LeaseEvent {
        interface: ifname.to_string(),
        address_assigned: true,
        ip: ip.to_string(),
        mask: "255.255.255.0".to_string(),
        gateway: "10.0.0.1".to_string(),
        dns_server: "8.8.8.8".to_string(),
        dns_server1: "8.8.4.4".to_string(),
        lease_time: 3600,
        ..Default::default()
    }
}

pub fn v6_lease(ifname: &str, prefix: &str) -> Ipv6LeaseEvent {
    Ipv6LeaseEvent {
        ifname: ifname.to_string(),
        address_assigned: true,
        prefix_assigned: true,
        address: "2001:db8::2".to_string(),
        site_prefix: prefix.to_string(),
        prefix_pltime: 3600,
        prefix_vltime: 7200,
        nameserver: "2001:4860:4860::8888".to_string(),
        ..Default::default()
    }
}

/// Wait for the first event matching `pred`
pub async fn wait_for_event<F>(
    rx: &mut mpsc::Receiver<WanEvent>,
    timeout: Duration,
    pred: F,
) -> Option<WanEvent>
where
    F: Fn(&WanEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        while let Some(event) = rx.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}
