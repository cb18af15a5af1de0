// # Link Layer
//
// Stands in for the link owners (Ethernet, DSL, cellular managers) on a
// host where no such daemons run.
//
// - `StaticLinkLayer`: keeps upstream flags and published WAN status in
//   memory and deletes VLAN devices with `ip link`
// - `LinkMonitor`: polls sysfs `operstate` into the phy status and derives
//   the data link status from carrier and upstream flag
//
// The monitor is the only writer of `phy.status`; it writes `link_status`
// only to complete a transition the state machine requested through the
// upstream flag.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use wanmgr_core::model::{LinkStatus, PhyStatus, WanStatus};
use wanmgr_core::traits::CellularIpInfo;
use wanmgr_core::{Error, LinkLayerManager, SharedWanStore};

use crate::command;

#[derive(Debug, Default)]
struct LinkState {
    upstream: HashMap<String, bool>,
    published: HashMap<String, WanStatus>,
    ethernet_upstream: bool,
}

/// In-memory link layer
#[derive(Debug, Default)]
pub struct StaticLinkLayer {
    state: RwLock<LinkState>,
}

impl StaticLinkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upstream flag of the link at `phy_path`
    pub async fn upstream(&self, phy_path: &str) -> bool {
        self.state
            .read()
            .await
            .upstream
            .get(phy_path)
            .copied()
            .unwrap_or(false)
    }

    /// Last WAN status published for `ifname`
    pub async fn published_status(&self, ifname: &str) -> Option<WanStatus> {
        self.state.read().await.published.get(ifname).copied()
    }

    pub async fn ethernet_upstream(&self) -> bool {
        self.state.read().await.ethernet_upstream
    }
}

#[async_trait]
impl LinkLayerManager for StaticLinkLayer {
    async fn set_upstream(&self, phy_path: &str, enable: bool) -> Result<(), Error> {
        debug!("Upstream on {} -> {}", phy_path, enable);
        self.state
            .write()
            .await
            .upstream
            .insert(phy_path.to_string(), enable);
        Ok(())
    }

    async fn get_upstream(&self, phy_path: &str) -> Result<bool, Error> {
        Ok(self.upstream(phy_path).await)
    }

    async fn restart_link_status(&self, ifname: &str) -> Result<(), Error> {
        // Link status is re-derived on every monitor poll
        debug!("Link status restart requested for {}", ifname);
        Ok(())
    }

    async fn request_refresh(&self, ifname: &str) -> Result<(), Error> {
        debug!("Link refresh requested for {}", ifname);
        Ok(())
    }

    async fn delete_vlan_link(&self, ifname: &str) -> Result<(), Error> {
        // Only tagged devices ("eth3.101") are ours to remove
        if !ifname.contains('.') {
            debug!("{} is not a VLAN device, keeping it", ifname);
            return Ok(());
        }
        command::apply("ip", &["link", "delete", ifname]).await?;
        info!("Deleted VLAN device {}", ifname);
        Ok(())
    }

    async fn fetch_cellular_ip(&self, phy_path: &str) -> Result<CellularIpInfo, Error> {
        Err(Error::not_found(format!(
            "no cellular manager owns {}",
            phy_path
        )))
    }

    async fn publish_wan_status(&self, ifname: &str, status: WanStatus) -> Result<(), Error> {
        info!("WAN status of {}: {}", ifname, status);
        self.state
            .write()
            .await
            .published
            .insert(ifname.to_string(), status);
        Ok(())
    }

    async fn set_ethernet_upstream(&self, enable: bool) -> Result<(), Error> {
        self.state.write().await.ethernet_upstream = enable;
        Ok(())
    }
}

/// Map a sysfs `operstate` value to the phy status
///
/// Devices without carrier detection (tunnels, some modems) report
/// "unknown" while usable.
pub fn phy_status_from_operstate(operstate: &str) -> PhyStatus {
    match operstate.trim() {
        "up" | "unknown" => PhyStatus::Up,
        "lowerlayerdown" | "dormant" | "testing" => PhyStatus::Initializing,
        _ => PhyStatus::Down,
    }
}

/// Polls carrier state into the shared store
pub struct LinkMonitor {
    store: Arc<SharedWanStore>,
    link: Arc<StaticLinkLayer>,
    sysfs_root: PathBuf,
    interval: Duration,
}

impl LinkMonitor {
    pub fn new(store: Arc<SharedWanStore>, link: Arc<StaticLinkLayer>) -> Self {
        Self {
            store,
            link,
            sysfs_root: PathBuf::from("/sys/class/net"),
            interval: Duration::from_secs(1),
        }
    }

    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Poll until the task is dropped
    pub async fn run(&self) {
        info!(
            "Link monitor polling {} every {:?}",
            self.sysfs_root.display(),
            self.interval
        );
        loop {
            self.poll_once().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One pass over every interface record
    pub async fn poll_once(&self) {
        let total = self.store.total_ifaces().await;
        for index in 0..total {
            let Some(record) = self.store.snapshot(index).await else {
                warn!("Link monitor: record {} busy, skipped", index);
                continue;
            };
            if record.is_remote() {
                continue;
            }

            let device = if record.base_interface.is_empty() {
                record.name.as_str()
            } else {
                record.base_interface.as_str()
            };
            let operstate_path = self.sysfs_root.join(device).join("operstate");
            let phy = match tokio::fs::read_to_string(&operstate_path).await {
                Ok(state) => phy_status_from_operstate(&state),
                Err(_) => PhyStatus::Down,
            };
            let upstream = self.link.upstream(&record.phy.path).await;

            let Some(mut iface) = self.store.lock_iface(index).await else {
                continue;
            };
            if iface.phy.status != phy {
                info!("{}: phy {:?} -> {:?}", iface.name, iface.phy.status, phy);
                iface.phy.status = phy;
            }

            let link = match (upstream, phy) {
                (true, PhyStatus::Up) => LinkStatus::Up,
                (true, _) => iface.wan.link_status,
                (false, _) => LinkStatus::Down,
            };
            if iface.wan.link_status != link {
                info!(
                    "{}: link {:?} -> {:?}",
                    iface.name, iface.wan.link_status, link
                );
                iface.wan.link_status = link;
            }
        }
    }
}
