// # Helper Process Traits
//
// Control surfaces for the external helper processes the state machine
// starts and stops: DHCP clients, the PPP manager and the IPoE health
// check. The processes report back through the IPC bridge, never through
// these traits.

use async_trait::async_trait;

/// DHCPv4/DHCPv6 client control
#[async_trait]
pub trait DhcpClientControl: Send + Sync {
    /// Start the DHCPv4 client on `ifname`, returning its pid
    async fn start_v4(&self, ifname: &str) -> Result<u32, crate::Error>;

    /// Stop the DHCPv4 client, optionally sending a release first
    async fn stop_v4(&self, ifname: &str, release: bool) -> Result<(), crate::Error>;

    /// Start the DHCPv6 client on `ifname`, returning its pid
    async fn start_v6(&self, ifname: &str) -> Result<u32, crate::Error>;

    /// Stop the DHCPv6 client
    async fn stop_v6(&self, ifname: &str) -> Result<(), crate::Error>;

    /// Ask the DHCPv6 client to send a release when it is next stopped
    async fn mark_v6_release(&self, ifname: &str) -> Result<(), crate::Error>;

    /// True if a process with this pid is alive
    async fn is_running(&self, pid: u32) -> bool;

    /// True if a DHCPv6 client process for `ifname` is alive
    async fn is_v6_running(&self, ifname: &str) -> bool;

    /// Reap exited client processes
    async fn collect_zombies(&self);

    /// Signal a DHCP client to renew its lease
    async fn signal_renew(&self, pid: u32) -> Result<(), crate::Error>;

    /// Pid of the DHCPv4 client serving a VLAN side interface (mg0, voip0)
    async fn vlan_client_pid(&self, ifname: &str) -> Option<u32>;
}

/// PPP session control
#[async_trait]
pub trait PppControl: Send + Sync {
    /// Create (and enable) the PPP session bound to `ifname`
    async fn create_session(&self, ifname: &str, ppp_path: &str) -> Result<(), crate::Error>;

    /// Delete the PPP session bound to `ifname`
    async fn delete_session(&self, ifname: &str, ppp_path: &str) -> Result<(), crate::Error>;

    /// Pick up a session that survived a manager restart
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: A session was already running and its parameters were re-read
    /// - `Ok(false)`: No session exists for `ifname`
    async fn restart_update_info(&self, ifname: &str, ppp_path: &str) -> Result<bool, crate::Error>;
}

/// IPoE health-check process control
#[async_trait]
pub trait HealthCheckService: Send + Sync {
    /// Start the health check for `ifname`, returning its pid
    async fn start(&self, ifname: &str) -> Result<u32, crate::Error>;

    /// Stop the health check process
    async fn stop(&self, pid: u32) -> Result<(), crate::Error>;
}
