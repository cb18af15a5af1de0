//! `ip(8)` based system network configuration
//!
//! Addresses and routes are applied with `ip`, MAP-T goes through the nat46
//! control file, and the resolver is rewritten in place. The configurator
//! holds no interface state; only the 464XLAT child is tracked.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wanmgr_core::model::lease::{Ipv4Data, MaptParams};
use wanmgr_core::model::status::DeviceNetworkingMode;
use wanmgr_core::{Error, SystemNetworkConfigurator};

use crate::command;

/// Host layout the configurator works against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Root of procfs
    pub proc_root: PathBuf,
    pub resolver_path: PathBuf,
    /// LAN bridge carrying the delegated prefix
    pub lan_bridge: String,
    /// Bridge whose traffic uses the modem routing table
    pub wan_bridge: String,
    pub modem_table: String,
    /// nat46 translator device created for MAP-T
    pub map_interface: String,
    /// 464XLAT client command, `{ifname}` is substituted
    pub xlat_command: Vec<String>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            resolver_path: PathBuf::from("/etc/resolv.conf"),
            lan_bridge: "brlan0".to_string(),
            wan_bridge: "brWan".to_string(),
            modem_table: "MODEM".to_string(),
            map_interface: "map0".to_string(),
            xlat_command: vec!["clatd".to_string(), "-i".to_string(), "{ifname}".to_string()],
        }
    }
}

impl NetworkSettings {
    fn nat46_control(&self) -> PathBuf {
        self.proc_root.join("net/nat46/control")
    }

    fn sysctl(&self, family: &str, ifname: &str, key: &str) -> PathBuf {
        self.proc_root
            .join("sys/net")
            .join(family)
            .join("conf")
            .join(ifname)
            .join(key)
    }
}

/// Convert a dotted netmask to its prefix length
pub fn mask_to_prefix(mask: &str) -> Result<u32, Error> {
    let addr: Ipv4Addr = mask
        .parse()
        .map_err(|_| Error::invalid_input(format!("invalid netmask '{}'", mask)))?;
    let bits = u32::from(addr);
    // Contiguous masks only
    if bits.leading_ones() != bits.count_ones() {
        return Err(Error::invalid_input(format!(
            "non-contiguous netmask '{}'",
            mask
        )));
    }
    Ok(bits.count_ones())
}

/// Parse the first field of `/proc/uptime`
pub fn parse_uptime(contents: &str) -> Option<u64> {
    let secs: f64 = contents.split_whitespace().next()?.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(secs as u64)
    } else {
        None
    }
}

/// Render resolver contents for `nameservers`
pub fn render_resolver(nameservers: &[String]) -> String {
    nameservers
        .iter()
        .filter(|ns| !ns.is_empty())
        .map(|ns| format!("nameserver {}\n", ns))
        .collect()
}

fn lan_ipv6_ready(output: &str) -> bool {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("inet6"))
        .any(|line| !line.contains("tentative") && !line.contains("dadfailed"))
}

async fn write_file(path: &Path, contents: &str) -> Result<(), Error> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| Error::system(format!("Failed to write {}: {}", path.display(), e)))
}

/// SystemNetworkConfigurator backed by `ip(8)` and procfs
pub struct IpCommandConfigurator {
    settings: NetworkSettings,
    xlat: Mutex<Option<Child>>,
}

impl IpCommandConfigurator {
    pub fn new(settings: NetworkSettings) -> Self {
        Self {
            settings,
            xlat: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    /// Write one command to the nat46 control file
    async fn nat46(&self, line: &str) -> Result<(), Error> {
        let path = self.settings.nat46_control();
        debug!("nat46: {}", line);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| Error::system(format!("Failed to open {}: {}", path.display(), e)))?;
        file.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| Error::system(format!("nat46 '{}' rejected: {}", line, e)))?;
        Ok(())
    }

    async fn remove_modem_routing(&self) {
        let table = self.settings.modem_table.as_str();
        let bridge = self.settings.wan_bridge.as_str();
        let steps: [&[&str]; 3] = [
            &["rule", "del", "iif", bridge, "table", table],
            &["route", "flush", "table", table],
            &["route", "flush", "cache"],
        ];
        for args in steps {
            if let Err(e) = command::apply("ip", args).await {
                warn!("Failed to remove modem routing: {}", e);
            }
        }
    }
}

impl Default for IpCommandConfigurator {
    fn default() -> Self {
        Self::new(NetworkSettings::default())
    }
}

#[async_trait]
impl SystemNetworkConfigurator for IpCommandConfigurator {
    async fn configure_ipv4(
        &self,
        ifname: &str,
        data: &Ipv4Data,
        broadcast: &str,
    ) -> Result<(), Error> {
        let prefix = mask_to_prefix(&data.mask)?;
        let cidr = format!("{}/{}", data.ip, prefix);

        let mut args = vec!["addr", "add", cidr.as_str()];
        if !broadcast.is_empty() {
            args.extend(["broadcast", broadcast]);
        }
        args.extend(["dev", ifname]);
        command::apply("ip", &args).await?;

        let mtu = data.mtu_size.to_string();
        command::apply("ip", &["link", "set", "dev", ifname, "mtu", &mtu]).await?;

        info!("Configured {} on {} (mtu {})", cidr, ifname, mtu);
        Ok(())
    }

    async fn unconfigure_ipv4(&self, ifname: &str) -> Result<(), Error> {
        command::apply("ip", &["-4", "addr", "flush", "dev", ifname]).await
    }

    async fn add_gateway_route(&self, data: &Ipv4Data) -> Result<(), Error> {
        command::apply(
            "ip",
            &["route", "replace", &data.gateway, "dev", &data.ifname],
        )
        .await
    }

    async fn add_default_route(
        &self,
        mode: DeviceNetworkingMode,
        data: &Ipv4Data,
    ) -> Result<(), Error> {
        match mode {
            DeviceNetworkingMode::Gateway => {
                let valid = data
                    .gateway
                    .parse::<Ipv4Addr>()
                    .is_ok_and(|gw| !gw.is_unspecified());
                if !valid {
                    warn!(
                        "Skipping default route on {}: gateway '{}' unusable",
                        data.ifname, data.gateway
                    );
                    return Ok(());
                }
                command::apply(
                    "ip",
                    &["route", "replace", "default", "via", &data.gateway, "dev", &data.ifname],
                )
                .await
            }
            DeviceNetworkingMode::Modem => {
                let table = self.settings.modem_table.as_str();
                command::apply(
                    "ip",
                    &["rule", "add", "iif", &self.settings.wan_bridge, "table", table],
                )
                .await?;
                command::apply(
                    "ip",
                    &[
                        "route", "replace", "default", "via", &data.gateway, "dev",
                        &data.ifname, "table", table,
                    ],
                )
                .await?;
                command::apply("ip", &["route", "flush", "cache"]).await
            }
        }
    }

    async fn delete_default_route(
        &self,
        mode: DeviceNetworkingMode,
        mode_changed: bool,
        _data: &Ipv4Data,
    ) -> Result<(), Error> {
        // After a mode change the routes of the previous mode are the stale ones
        let stale = match (mode, mode_changed) {
            (DeviceNetworkingMode::Gateway, true) => DeviceNetworkingMode::Modem,
            (DeviceNetworkingMode::Modem, true) => DeviceNetworkingMode::Gateway,
            (mode, false) => mode,
        };
        match stale {
            DeviceNetworkingMode::Gateway => {
                command::apply("ip", &["route", "del", "default"]).await
            }
            DeviceNetworkingMode::Modem => {
                self.remove_modem_routing().await;
                Ok(())
            }
        }
    }

    async fn replace_default_route(&self, dev: &str, mtu: u32) -> Result<(), Error> {
        let mtu = mtu.to_string();
        command::apply(
            "ip",
            &["route", "replace", "default", "dev", dev, "mtu", &mtu],
        )
        .await
    }

    async fn remove_lan_ipv6_address(&self) -> Result<(), Error> {
        command::apply(
            "ip",
            &["-6", "addr", "flush", "dev", &self.settings.lan_bridge, "scope", "global"],
        )
        .await
    }

    async fn write_resolver(&self, nameservers: &[String]) -> Result<(), Error> {
        let path = &self.settings.resolver_path;
        let tmp = path.with_extension("tmp");
        write_file(&tmp, &render_resolver(nameservers)).await?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            Error::system(format!("Failed to replace {}: {}", path.display(), e))
        })?;
        debug!("Resolver rewritten with {} nameserver(s)", nameservers.len());
        Ok(())
    }

    async fn remove_resolver(&self) -> Result<(), Error> {
        match tokio::fs::remove_file(&self.settings.resolver_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::system(format!(
                "Failed to remove {}: {}",
                self.settings.resolver_path.display(),
                e
            ))),
        }
    }

    async fn is_lan_ipv6_ready(&self) -> Result<bool, Error> {
        let output = command::run(
            "ip",
            &["-6", "addr", "show", "dev", &self.settings.lan_bridge, "scope", "global"],
        )
        .await?;
        Ok(lan_ipv6_ready(&output))
    }

    async fn toggle_ipv6(&self) -> Result<(), Error> {
        let path = self
            .settings
            .sysctl("ipv6", &self.settings.lan_bridge, "disable_ipv6");
        write_file(&path, "1").await?;
        write_file(&path, "0").await
    }

    async fn configure_mapt(
        &self,
        ifname: &str,
        base_interface: &str,
        params: &MaptParams,
    ) -> Result<(), Error> {
        let vlan = if base_interface.is_empty() {
            ifname
        } else {
            base_interface
        };
        let rp_filter = self.settings.sysctl("ipv4", vlan, "rp_filter");
        if let Err(e) = write_file(&rp_filter, "0").await {
            warn!("Failed to disable reverse path filtering on {}: {}", vlan, e);
        }

        let map = self.settings.map_interface.as_str();
        self.nat46(&format!("add {}", map)).await?;
        self.nat46(&format!(
            "config {} local.style MAP local.v4 {} local.v6 {} local.ea-len {} \
             local.psid-offset {} remote.v4 0.0.0.0/0 remote.v6 {} remote.style RFC6052 \
             remote.ea-len 0 remote.psid-offset 0",
            map,
            params.rule_ipv4_prefix,
            params.rule_ipv6_prefix,
            params.ea_len,
            params.psid_offset,
            params.br_ipv6_prefix
        ))
        .await?;
        command::apply("ip", &["link", "set", map, "up"]).await?;

        info!("MAP-T translator {} configured for {}", map, ifname);
        Ok(())
    }

    async fn reset_mapt(&self, ifname: &str, _base_interface: &str) -> Result<(), Error> {
        let map = self.settings.map_interface.as_str();
        self.nat46(&format!("del {}", map)).await?;
        info!("MAP-T translator {} removed for {}", map, ifname);
        Ok(())
    }

    async fn start_xlat(&self, ifname: &str) -> Result<(), Error> {
        let mut slot = self.xlat.lock().await;
        if let Some(child) = slot.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                return Ok(());
            }
        }

        let argv = command::expand(&self.settings.xlat_command, ifname);
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::config("464XLAT command is empty"));
        };
        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|e| Error::process(format!("Failed to start {}: {}", program, e)))?;
        info!("464XLAT started on {} (pid {:?})", ifname, child.id());
        *slot = Some(child);
        Ok(())
    }

    async fn stop_xlat(&self) -> Result<(), Error> {
        let Some(mut child) = self.xlat.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = child.kill().await {
            warn!("Failed to stop 464XLAT client: {}", e);
        }
        Ok(())
    }

    async fn is_xlat_running(&self) -> bool {
        match self.xlat.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn uptime_secs(&self) -> u64 {
        let path = self.settings.proc_root.join("uptime");
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => parse_uptime(&contents).unwrap_or(0),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn configurator(dir: &TempDir) -> IpCommandConfigurator {
        IpCommandConfigurator::new(NetworkSettings {
            proc_root: dir.path().join("proc"),
            resolver_path: dir.path().join("resolv.conf"),
            ..NetworkSettings::default()
        })
    }

    #[test]
    fn test_mask_to_prefix() {
        assert_eq!(mask_to_prefix("255.255.255.0").unwrap(), 24);
        assert_eq!(mask_to_prefix("255.255.255.252").unwrap(), 30);
        assert_eq!(mask_to_prefix("0.0.0.0").unwrap(), 0);
        assert!(mask_to_prefix("255.0.255.0").is_err());
        assert!(mask_to_prefix("not-a-mask").is_err());
    }

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime("12345.67 54321.00\n"), Some(12345));
        assert_eq!(parse_uptime(""), None);
        assert_eq!(parse_uptime("garbage"), None);
    }

    #[test]
    fn test_lan_ipv6_readiness() {
        let ready = "3: brlan0: <UP>\n    inet6 2001:db8:1::1/64 scope global\n";
        let tentative = "3: brlan0: <UP>\n    inet6 2001:db8:1::1/64 scope global tentative\n";
        assert!(lan_ipv6_ready(ready));
        assert!(!lan_ipv6_ready(tentative));
        assert!(!lan_ipv6_ready(""));
    }

    #[tokio::test]
    async fn test_resolver_rewrite_and_removal() {
        let dir = TempDir::new().unwrap();
        let net = configurator(&dir);

        net.write_resolver(&["8.8.8.8".to_string(), String::new(), "2001:4860::8888".to_string()])
            .await
            .unwrap();
        let contents = std::fs::read_to_string(dir.path().join("resolv.conf")).unwrap();
        assert_eq!(contents, "nameserver 8.8.8.8\nnameserver 2001:4860::8888\n");
        assert!(!dir.path().join("resolv.tmp").exists());

        net.remove_resolver().await.unwrap();
        assert!(!dir.path().join("resolv.conf").exists());
        // Removing twice is fine
        net.remove_resolver().await.unwrap();
    }

    #[tokio::test]
    async fn test_uptime_from_proc() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("proc")).unwrap();
        std::fs::write(dir.path().join("proc/uptime"), "4242.10 100.00\n").unwrap();

        let net = configurator(&dir);
        assert_eq!(net.uptime_secs().await, 4242);
    }

    #[tokio::test]
    async fn test_toggle_ipv6_leaves_ipv6_enabled() {
        let dir = TempDir::new().unwrap();
        let conf = dir.path().join("proc/sys/net/ipv6/conf/brlan0");
        std::fs::create_dir_all(&conf).unwrap();

        let net = configurator(&dir);
        net.toggle_ipv6().await.unwrap();
        assert_eq!(std::fs::read_to_string(conf.join("disable_ipv6")).unwrap(), "0");
    }

    #[tokio::test]
    async fn test_mapt_reset_writes_nat46_control() {
        let dir = TempDir::new().unwrap();
        let nat46 = dir.path().join("proc/net/nat46");
        std::fs::create_dir_all(&nat46).unwrap();
        std::fs::write(nat46.join("control"), "").unwrap();

        let net = configurator(&dir);
        net.reset_mapt("erouter0", "").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(nat46.join("control")).unwrap(),
            "del map0\n"
        );
    }

    #[tokio::test]
    async fn test_mapt_without_nat46_module_fails() {
        let dir = TempDir::new().unwrap();
        let net = configurator(&dir);
        let result = net
            .configure_mapt("erouter0", "", &MaptParams::default())
            .await;
        assert!(matches!(result, Err(Error::System(_))));
    }

    #[tokio::test]
    async fn test_xlat_not_running_initially() {
        let dir = TempDir::new().unwrap();
        let net = configurator(&dir);
        assert!(!net.is_xlat_running().await);
        net.stop_xlat().await.unwrap();
    }
}
