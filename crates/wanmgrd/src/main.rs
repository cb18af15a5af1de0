// # wanmgrd - WAN Manager Daemon
//
// Thin integration layer: all WAN logic lives in wanmgr-core, all system
// access in wanmgr-sys-linux. Configuration is via environment variables
// only.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the Linux collaborators and the status store
// 4. Running the WAN manager until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Interfaces
// - `WANMGR_INTERFACES`: Comma-separated `name:kind[:base]` entries, kind is
//   `local`, `remote` or `cellular` (e.g. `erouter0:local:eth3,wwan0:cellular`)
// - `WANMGR_ACTIVE_LINK`: Interface preferred by the fixed-mode policy
//
// ### Manager
// - `WANMGR_ENABLE`: Global WAN enable (default true)
// - `WANMGR_POLICY`: Selection policy (default fixed_mode)
// - `WANMGR_TICK_MS`: Interface state machine tick (default 50)
//
// ### IPC
// - `WANMGR_IPC_PATH`: Socket receiving lease and health-check events
// - `WANMGR_IHC_PATH`: Socket of the IPoE health-check process
//
// ### Status Store
// - `WANMGR_STATUS_STORE_TYPE`: Type of status store (file, memory)
// - `WANMGR_STATUS_STORE_PATH`: Path to the persistent key file (for file store)
//
// ### Platform
// - `WANMGR_PLATFORM_CONFIG`: JSON file overriding Linux host settings
// - `WANMGR_LINK_POLL_MS`: Carrier polling interval (default 1000)
// - `WANMGR_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export WANMGR_INTERFACES=erouter0:local:eth3
// export WANMGR_STATUS_STORE_TYPE=file
// export WANMGR_STATUS_STORE_PATH=/nvram/wanmgr/status.json
//
// wanmgrd
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;
use wanmgr_core::config::{InterfaceConfig, IpcConfig, ManagerConfig, StatusStoreConfig};
use wanmgr_core::model::{InterfaceKind, Policy};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum WanmgrExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<WanmgrExitCode> for ExitCode {
    fn from(code: WanmgrExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    interfaces: Vec<String>,
    active_link: Option<String>,
    enable: bool,
    policy: String,
    tick_ms: Option<u64>,
    ipc_path: Option<String>,
    ihc_path: Option<String>,
    status_store_type: String,
    status_store_path: Option<String>,
    platform_config: Option<String>,
    link_poll_ms: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            interfaces: env::var("WANMGR_INTERFACES")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            active_link: env::var("WANMGR_ACTIVE_LINK").ok(),
            enable: env::var("WANMGR_ENABLE")
                .map(|s| !matches!(s.to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
            policy: env::var("WANMGR_POLICY").unwrap_or_else(|_| "fixed_mode".to_string()),
            tick_ms: env::var("WANMGR_TICK_MS")
                .ok()
                .map(|s| s.parse())
                .transpose()
                .map_err(|e| anyhow::anyhow!("WANMGR_TICK_MS is not a number: {}", e))?,
            ipc_path: env::var("WANMGR_IPC_PATH").ok(),
            ihc_path: env::var("WANMGR_IHC_PATH").ok(),
            status_store_type: env::var("WANMGR_STATUS_STORE_TYPE")
                .unwrap_or_else(|_| "memory".to_string()),
            status_store_path: env::var("WANMGR_STATUS_STORE_PATH").ok(),
            platform_config: env::var("WANMGR_PLATFORM_CONFIG").ok(),
            link_poll_ms: env::var("WANMGR_LINK_POLL_MS")
                .ok()
                .map(|s| s.parse().unwrap_or(1000))
                .unwrap_or(1000),
            log_level: env::var("WANMGR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks presence of the interface list, enumerations, numeric ranges
    /// and the status store path.
    fn validate(&self) -> Result<()> {
        if self.interfaces.is_empty() {
            anyhow::bail!(
                "WANMGR_INTERFACES must contain at least one interface. \
                Set it via: export WANMGR_INTERFACES=erouter0:local:eth3"
            );
        }
        for entry in &self.interfaces {
            parse_interface(entry)?;
        }

        if let Some(active) = &self.active_link {
            let known = self
                .interfaces
                .iter()
                .any(|entry| entry.split(':').next() == Some(active.as_str()));
            if !known {
                anyhow::bail!(
                    "WANMGR_ACTIVE_LINK '{}' is not listed in WANMGR_INTERFACES",
                    active
                );
            }
        }

        self.policy
            .parse::<Policy>()
            .map_err(|e| anyhow::anyhow!("WANMGR_POLICY: {}", e))?;

        match self.status_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "WANMGR_STATUS_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.status_store_type
            ),
        }

        if self.status_store_type == "file" {
            let Some(path) = self.status_store_path.as_deref() else {
                anyhow::bail!(
                    "WANMGR_STATUS_STORE_PATH is required when WANMGR_STATUS_STORE_TYPE=file. \
                    Set it via: export WANMGR_STATUS_STORE_PATH=/nvram/wanmgr/status.json"
                );
            };
            if path.is_empty() {
                anyhow::bail!(
                    "WANMGR_STATUS_STORE_PATH cannot be empty when WANMGR_STATUS_STORE_TYPE=file"
                );
            }
            let parent = std::path::Path::new(path)
                .parent()
                .filter(|p| !p.as_os_str().is_empty());
            if let Some(parent) = parent {
                if !parent.exists() {
                    anyhow::bail!(
                        "WANMGR_STATUS_STORE_PATH parent directory does not exist: {}. \
                        Create it first: mkdir -p {}",
                        parent.display(),
                        parent.display()
                    );
                }
            }
        }

        if let Some(tick) = self.tick_ms {
            if !(10..=1000).contains(&tick) {
                anyhow::bail!(
                    "WANMGR_TICK_MS must be between 10 and 1000 milliseconds. Got: {}",
                    tick
                );
            }
        }

        if !(100..=60_000).contains(&self.link_poll_ms) {
            anyhow::bail!(
                "WANMGR_LINK_POLL_MS must be between 100 and 60000 milliseconds. Got: {}",
                self.link_poll_ms
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "WANMGR_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the manager configuration
    fn manager_config(&self) -> Result<ManagerConfig> {
        let mut config = ManagerConfig::new().with_policy(self.policy.parse::<Policy>()?);
        config.enable = self.enable;

        for entry in &self.interfaces {
            let mut iface = parse_interface(entry)?;
            if self.active_link.as_deref() == Some(iface.name.as_str()) {
                iface = iface.with_active_link(true);
            }
            config = config.with_interface(iface);
        }

        let defaults = IpcConfig::default();
        config.ipc = IpcConfig {
            listen_path: self.ipc_path.clone().unwrap_or(defaults.listen_path),
            ihc_path: self.ihc_path.clone().unwrap_or(defaults.ihc_path),
            ..defaults
        };

        config.status_store = match (&*self.status_store_type, &self.status_store_path) {
            ("file", Some(path)) => StatusStoreConfig::File { path: path.clone() },
            _ => StatusStoreConfig::Memory,
        };

        if let Some(tick) = self.tick_ms {
            config.tick_interval_ms = tick;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse one `name:kind[:base]` interface entry
fn parse_interface(entry: &str) -> Result<InterfaceConfig> {
    let mut parts = entry.split(':');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        anyhow::bail!("Interface entry '{}' has no name", entry);
    }

    let kind = match parts.next().map(str::trim).unwrap_or("local") {
        "local" => InterfaceKind::Local,
        "remote" => InterfaceKind::Remote,
        "cellular" => InterfaceKind::Cellular,
        other => anyhow::bail!(
            "Interface '{}' has unknown kind '{}'. Valid kinds: local, remote, cellular",
            name,
            other
        ),
    };
    let base = parts.next().map(str::trim).unwrap_or_default();
    if parts.next().is_some() {
        anyhow::bail!("Interface entry '{}' has too many fields", entry);
    }

    // Link owners are addressed by data-model path
    let device = if base.is_empty() { name } else { base };
    let phy_path = match kind {
        InterfaceKind::Local => format!("Device.Ethernet.Interface.{}", device),
        InterfaceKind::Remote => format!("Device.Remote.Interface.{}", device),
        InterfaceKind::Cellular => format!("Device.Cellular.Interface.{}", device),
    };

    Ok(InterfaceConfig::new(name)
        .with_kind(kind)
        .with_base_interface(base)
        .with_phy_path(phy_path))
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return WanmgrExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return WanmgrExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return WanmgrExitCode::ConfigError.into();
    }

    info!("Starting wanmgrd daemon");
    info!(
        "Configuration loaded: {} interface(s)",
        config.interfaces.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return WanmgrExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            WanmgrExitCode::RuntimeError
        } else {
            WanmgrExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    use wanmgr_core::ipc::{UnixDatagramSource, UnixDatagramTransport};
    use wanmgr_core::{FileStatusStore, MemoryStatusStore, StatusStore, WanManager};

    let manager_config = config.manager_config()?;

    let status: Arc<dyn StatusStore> = match &manager_config.status_store {
        StatusStoreConfig::File { path } => {
            info!("Status store: file at {}", path);
            Arc::new(FileStatusStore::new(path).await?)
        }
        StatusStoreConfig::Memory => {
            info!("Status store: memory (persistent keys are lost on restart)");
            Arc::new(MemoryStatusStore::new())
        }
    };

    let ihc_transport = Arc::new(UnixDatagramTransport::new(&manager_config.ipc.ihc_path));
    let source = UnixDatagramSource::bind(&manager_config.ipc.listen_path)?;

    let (platform, monitor) = build_platform(&config, status, ihc_transport).await?;

    let (manager, mut events) = WanManager::new(platform, Box::new(source), manager_config)?;

    let monitor = monitor.into_monitor(manager.store(), config.link_poll_ms);
    tokio::spawn(async move { monitor.run().await });

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("Event: {:?}", event);
        }
    });

    info!("WAN manager running, waiting for SIGTERM/SIGINT");
    manager.run().await?;

    info!("Shutting down daemon");
    Ok(())
}

/// Link layer handle kept until the store exists
#[cfg(feature = "linux")]
struct PendingMonitor {
    link: Arc<wanmgr_sys_linux::StaticLinkLayer>,
}

#[cfg(feature = "linux")]
impl PendingMonitor {
    fn into_monitor(
        self,
        store: Arc<wanmgr_core::SharedWanStore>,
        poll_ms: u64,
    ) -> wanmgr_sys_linux::LinkMonitor {
        wanmgr_sys_linux::LinkMonitor::new(store, self.link)
            .with_interval(Duration::from_millis(poll_ms))
    }
}

#[cfg(feature = "linux")]
async fn build_platform(
    config: &Config,
    status: Arc<dyn wanmgr_core::StatusStore>,
    ihc_transport: Arc<dyn wanmgr_core::IhcTransport>,
) -> Result<(wanmgr_core::Platform, PendingMonitor)> {
    let settings = match &config.platform_config {
        Some(path) => {
            info!("Loading platform settings from {}", path);
            let contents = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?;
            serde_json::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("Invalid platform settings in {}: {}", path, e))?
        }
        None => wanmgr_sys_linux::LinuxSettings::default(),
    };

    let (platform, link) = wanmgr_sys_linux::linux_platform(settings, status, ihc_transport);
    Ok((platform, PendingMonitor { link }))
}

#[cfg(not(feature = "linux"))]
struct PendingMonitor;

#[cfg(not(feature = "linux"))]
impl PendingMonitor {
    fn into_monitor(self, _store: Arc<wanmgr_core::SharedWanStore>, _poll_ms: u64) -> Self {
        self
    }

    async fn run(&self) {}
}

#[cfg(not(feature = "linux"))]
async fn build_platform(
    _config: &Config,
    _status: Arc<dyn wanmgr_core::StatusStore>,
    _ihc_transport: Arc<dyn wanmgr_core::IhcTransport>,
) -> Result<(wanmgr_core::Platform, PendingMonitor)> {
    anyhow::bail!("wanmgrd was built without a platform; enable the `linux` feature")
}
