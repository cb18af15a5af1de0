// # wanmgr-sys-linux
//
// Linux implementations of the WAN manager collaborator traits.
//
// ## Components
//
// - `IpCommandConfigurator`: addresses, routes and resolver through `ip(8)`,
//   MAP-T through the nat46 control file
// - `UdhcpcControl`: `udhcpc` / `dibbler-client` children, signals by pid
// - `ProcessHealthCheck`: IPoE health-check helper process
// - `NullPpp`: PPP control for hosts without a PPP manager
// - `StaticLinkLayer` + `LinkMonitor`: link ownership backed by sysfs
//
// ## Platform Support
//
// Signal delivery uses `libc::kill` and is only available on Linux; the
// rest builds anywhere tokio does.

pub mod command;
pub mod dhcp;
pub mod link;
pub mod network;
pub mod process;
pub mod signal;

pub use dhcp::{DhcpSettings, UdhcpcControl};
pub use link::{LinkMonitor, StaticLinkLayer};
pub use network::{IpCommandConfigurator, NetworkSettings};
pub use process::{NullPpp, ProcessHealthCheck};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wanmgr_core::{IhcTransport, Platform, StatusStore};

/// Host settings for every Linux collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinuxSettings {
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub dhcp: DhcpSettings,
    /// IPoE health-check helper, `{ifname}` is substituted
    #[serde(default = "default_health_check_command")]
    pub health_check_command: Vec<String>,
}

impl Default for LinuxSettings {
    fn default() -> Self {
        Self {
            network: NetworkSettings::default(),
            dhcp: DhcpSettings::default(),
            health_check_command: default_health_check_command(),
        }
    }
}

pub(crate) fn default_health_check_command() -> Vec<String> {
    vec![
        "ipoe_health_check".to_string(),
        "-i".to_string(),
        "{ifname}".to_string(),
    ]
}

/// Build a [`Platform`] of Linux collaborators
///
/// The link layer is returned separately so the caller can drive a
/// [`LinkMonitor`] against the same instance.
pub fn linux_platform(
    settings: LinuxSettings,
    status: Arc<dyn StatusStore>,
    ihc_transport: Arc<dyn IhcTransport>,
) -> (Platform, Arc<StaticLinkLayer>) {
    let link = Arc::new(StaticLinkLayer::new());
    let platform = Platform {
        network: Arc::new(IpCommandConfigurator::new(settings.network)),
        dhcp: Arc::new(UdhcpcControl::new(settings.dhcp)),
        ppp: Arc::new(NullPpp),
        health_check: Arc::new(ProcessHealthCheck::new(settings.health_check_command)),
        link: link.clone(),
        status,
        ihc_transport,
    };
    (platform, link)
}
