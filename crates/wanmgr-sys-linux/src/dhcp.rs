//! DHCP client process control
//!
//! `udhcpc` serves DHCPv4 and `dibbler-client` DHCPv6. Clients started
//! here are tracked as child processes keyed by interface; clients started
//! by other components (the VLAN side interfaces) are found through their
//! pid files and signalled directly.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wanmgr_core::{DhcpClientControl, Error};

use crate::command;
use crate::signal::{self, Signal};

/// Client commands and pid-file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DhcpSettings {
    /// DHCPv4 client command, `{ifname}` is substituted
    pub v4_command: Vec<String>,
    /// DHCPv6 client command, `{ifname}` is substituted
    pub v6_command: Vec<String>,
    /// Directory holding `udhcpc.<ifname>.pid` for externally started clients
    pub pid_dir: PathBuf,
}

impl Default for DhcpSettings {
    fn default() -> Self {
        Self {
            v4_command: ["udhcpc", "-f", "-i", "{ifname}", "-s", "/etc/udhcpc.script"]
                .into_iter()
                .map(String::from)
                .collect(),
            v6_command: ["dibbler-client", "run"]
                .into_iter()
                .map(String::from)
                .collect(),
            pid_dir: PathBuf::from("/tmp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    V4,
    V6,
}

#[derive(Default)]
struct Clients {
    running: HashMap<(Family, String), Child>,
    /// Interfaces whose DHCPv6 client should release on stop
    v6_release: HashSet<String>,
}

impl Clients {
    /// Pid of the live client for `key`, dropping it if it has exited
    fn live_pid(&mut self, key: &(Family, String)) -> Option<u32> {
        let child = self.running.get_mut(key)?;
        match child.try_wait() {
            Ok(None) => child.id(),
            _ => {
                self.running.remove(key);
                None
            }
        }
    }
}

/// DhcpClientControl spawning udhcpc and dibbler-client
pub struct UdhcpcControl {
    settings: DhcpSettings,
    clients: Mutex<Clients>,
}

impl UdhcpcControl {
    pub fn new(settings: DhcpSettings) -> Self {
        Self {
            settings,
            clients: Mutex::new(Clients::default()),
        }
    }

    async fn start(&self, family: Family, ifname: &str) -> Result<u32, Error> {
        let key = (family, ifname.to_string());
        let mut clients = self.clients.lock().await;
        if let Some(pid) = clients.live_pid(&key) {
            debug!("{:?} client already running on {} (pid {})", family, ifname, pid);
            return Ok(pid);
        }

        let template = match family {
            Family::V4 => &self.settings.v4_command,
            Family::V6 => &self.settings.v6_command,
        };
        let argv = command::expand(template, ifname);
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::config(format!("{:?} client command is empty", family)));
        };

        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|e| Error::process(format!("Failed to start {}: {}", program, e)))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::process(format!("{} exited immediately", program)))?;

        info!("Started {} on {} (pid {})", program, ifname, pid);
        clients.running.insert(key, child);
        Ok(pid)
    }

    async fn stop(&self, family: Family, ifname: &str, release: bool) -> Result<(), Error> {
        let key = (family, ifname.to_string());
        let mut clients = self.clients.lock().await;
        let Some(mut child) = clients.running.remove(&key) else {
            debug!("No {:?} client to stop on {}", family, ifname);
            return Ok(());
        };

        let Some(pid) = child.id() else {
            // Already exited; reap it
            let _ = child.try_wait();
            return Ok(());
        };

        if release {
            if let Err(e) = signal::send(pid, Signal::Release) {
                warn!("Failed to request release from pid {}: {}", pid, e);
            }
        }

        match signal::send(pid, Signal::Terminate) {
            Ok(()) => {
                if let Err(e) = child.wait().await {
                    warn!("Failed to reap pid {}: {}", pid, e);
                }
            }
            Err(e) => {
                warn!("SIGTERM to pid {} failed ({}), killing", pid, e);
                child
                    .kill()
                    .await
                    .map_err(|e| Error::process(format!("Failed to kill pid {}: {}", pid, e)))?;
            }
        }

        info!("Stopped {:?} client on {} (pid {})", family, ifname, pid);
        Ok(())
    }
}

impl Default for UdhcpcControl {
    fn default() -> Self {
        Self::new(DhcpSettings::default())
    }
}

#[async_trait]
impl DhcpClientControl for UdhcpcControl {
    async fn start_v4(&self, ifname: &str) -> Result<u32, Error> {
        self.start(Family::V4, ifname).await
    }

    async fn stop_v4(&self, ifname: &str, release: bool) -> Result<(), Error> {
        self.stop(Family::V4, ifname, release).await
    }

    async fn start_v6(&self, ifname: &str) -> Result<u32, Error> {
        self.start(Family::V6, ifname).await
    }

    async fn stop_v6(&self, ifname: &str) -> Result<(), Error> {
        // dibbler releases on a graceful stop only
        let release = self.clients.lock().await.v6_release.remove(ifname);
        if release {
            return self.stop(Family::V6, ifname, false).await;
        }

        let key = (Family::V6, ifname.to_string());
        let child = self.clients.lock().await.running.remove(&key);
        if let Some(mut child) = child {
            child
                .kill()
                .await
                .map_err(|e| Error::process(format!("Failed to kill DHCPv6 client: {}", e)))?;
            info!("Stopped DHCPv6 client on {} without release", ifname);
        }
        Ok(())
    }

    async fn mark_v6_release(&self, ifname: &str) -> Result<(), Error> {
        self.clients
            .lock()
            .await
            .v6_release
            .insert(ifname.to_string());
        Ok(())
    }

    async fn is_running(&self, pid: u32) -> bool {
        let mut clients = self.clients.lock().await;
        let tracked = clients
            .running
            .iter_mut()
            .find(|(_, child)| child.id() == Some(pid));
        match tracked {
            Some((_, child)) => matches!(child.try_wait(), Ok(None)),
            None => signal::pid_alive(pid),
        }
    }

    async fn is_v6_running(&self, ifname: &str) -> bool {
        let key = (Family::V6, ifname.to_string());
        self.clients.lock().await.live_pid(&key).is_some()
    }

    async fn collect_zombies(&self) {
        let mut clients = self.clients.lock().await;
        clients.running.retain(|(family, ifname), child| match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!("{:?} client on {} exited: {}", family, ifname, status);
                false
            }
            Err(e) => {
                warn!("Failed to poll {:?} client on {}: {}", family, ifname, e);
                true
            }
        });
    }

    async fn signal_renew(&self, pid: u32) -> Result<(), Error> {
        signal::send(pid, Signal::Renew)
    }

    async fn vlan_client_pid(&self, ifname: &str) -> Option<u32> {
        let path = self.settings.pid_dir.join(format!("udhcpc.{}.pid", ifname));
        let contents = tokio::fs::read_to_string(&path).await.ok()?;
        let pid: u32 = contents.trim().parse().ok()?;
        signal::pid_alive(pid).then_some(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn control(dir: &TempDir, v4: &[&str]) -> UdhcpcControl {
        UdhcpcControl::new(DhcpSettings {
            v4_command: v4.iter().map(|s| s.to_string()).collect(),
            v6_command: vec!["sleep".to_string(), "30".to_string()],
            pid_dir: dir.path().to_path_buf(),
        })
    }

    #[tokio::test]
    async fn test_missing_client_binary_fails_to_start() {
        let dir = TempDir::new().unwrap();
        let dhcp = control(&dir, &["wanmgr-no-such-udhcpc", "-i", "{ifname}"]);
        let result = dhcp.start_v4("erouter0").await;
        assert!(matches!(result, Err(Error::Process(_))));
    }

    #[tokio::test]
    async fn test_empty_command_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let dhcp = control(&dir, &[]);
        assert!(matches!(
            dhcp.start_v4("erouter0").await,
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_start_is_idempotent_and_stop_terminates() {
        let dir = TempDir::new().unwrap();
        let dhcp = control(&dir, &["sleep", "30"]);

        let pid = dhcp.start_v4("erouter0").await.unwrap();
        assert_eq!(dhcp.start_v4("erouter0").await.unwrap(), pid);
        assert!(dhcp.is_running(pid).await);

        dhcp.stop_v4("erouter0", false).await.unwrap();
        assert!(!dhcp.is_running(pid).await);

        // Stopping again is a no-op
        dhcp.stop_v4("erouter0", false).await.unwrap();
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_v6_stop_with_and_without_release() {
        let dir = TempDir::new().unwrap();
        let dhcp = control(&dir, &["sleep", "30"]);

        dhcp.start_v6("erouter0").await.unwrap();
        assert!(dhcp.is_v6_running("erouter0").await);
        dhcp.mark_v6_release("erouter0").await.unwrap();
        dhcp.stop_v6("erouter0").await.unwrap();
        assert!(!dhcp.is_v6_running("erouter0").await);

        dhcp.start_v6("erouter0").await.unwrap();
        dhcp.stop_v6("erouter0").await.unwrap();
        assert!(!dhcp.is_v6_running("erouter0").await);
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn test_exited_clients_are_collected() {
        let dir = TempDir::new().unwrap();
        let dhcp = control(&dir, &["true"]);

        let pid = dhcp.start_v4("erouter0").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        dhcp.collect_zombies().await;

        assert!(dhcp.clients.lock().await.running.is_empty());
        assert!(!dhcp.is_running(pid).await);
    }

    #[tokio::test]
    async fn test_vlan_client_pid_from_pid_file() {
        let dir = TempDir::new().unwrap();
        let dhcp = control(&dir, &["udhcpc"]);

        assert_eq!(dhcp.vlan_client_pid("mg0").await, None);

        std::fs::write(dir.path().join("udhcpc.mg0.pid"), "not-a-pid\n").unwrap();
        assert_eq!(dhcp.vlan_client_pid("mg0").await, None);

        let own = std::process::id();
        std::fs::write(dir.path().join("udhcpc.mg0.pid"), format!("{}\n", own)).unwrap();
        assert_eq!(dhcp.vlan_client_pid("mg0").await, Some(own));
    }
}
