//! WAN manager engine
//!
//! The WanManager is responsible for:
//! - Building the shared store from the configured interfaces
//! - Feeding inbound IPC messages to the store through the bridge
//! - Running the policy loop, which starts and stops interface tasks
//! - Flushing persistent status on shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐                        ┌──────────────────┐
//! │  IpcSource  │── IpcMessage ──┐       │ PolicyDispatch   │
//! └─────────────┘                │       │ Loop             │
//!                                ▼       └──────────────────┘
//!                        ┌──────────────┐         │ spawns
//!                        │  IpcBridge   │         ▼
//!                        └──────────────┘  ┌──────────────────┐
//!                                │         │ InterfaceRunner  │ (one per iface)
//!                                ▼         └──────────────────┘
//!                        ┌──────────────┐         │
//!                        │SharedWanStore│◄────────┘
//!                        └──────────────┘
//!                                │
//!         ┌──────────────────────┼──────────────────────┐
//!         ▼                      ▼                      ▼
//! ┌─────────────┐        ┌──────────────┐       ┌─────────────┐
//! │  Platform   │        │ StatusStore  │       │   Events    │
//! │ (side eff.) │        │ (keys)       │       │  (notify)   │
//! └─────────────┘        └──────────────┘       └─────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. A DHCP client reports a lease over IPC
//! 2. The bridge stages the payload on the matching interface record
//! 3. The interface task applies it on its next tick
//! 4. The state machine configures the system and publishes status keys
//! 5. State changes are emitted as [`WanEvent`]s

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ManagerConfig;
use crate::controller::{FixedModePolicy, PolicyContext, PolicyDispatchLoop, PolicyRunner};
use crate::error::Result;
use crate::events::{EventSink, WanEvent};
use crate::ipc::{IpcBridge, IpcSource};
use crate::model::{WanConfig, WanInterface};
use crate::sm::InterfaceStateMachine;
use crate::store::SharedWanStore;
use crate::traits::Platform;

/// Core WAN manager
///
/// ## Lifecycle
///
/// 1. Create with [`WanManager::new()`]
/// 2. Optionally register more policy bodies with [`WanManager::with_policy()`]
/// 3. Start with [`WanManager::run()`]
/// 4. The manager runs until a shutdown signal is received
///
/// ## Threading
///
/// The IPC bridge and the policy loop share one task; every interface
/// runner is a task of its own. All of them meet in the [`SharedWanStore`].
pub struct WanManager {
    /// Interface records and global configuration
    store: Arc<SharedWanStore>,

    /// Collaborators (kept for the shutdown flush)
    platform: Platform,

    /// Inbound IPC endpoint
    ipc_source: Box<dyn IpcSource>,

    /// Stages payloads and handles health-check events
    bridge: IpcBridge,

    /// Starts and stops interface tasks
    policy_loop: PolicyDispatchLoop,

    /// Event sender for external monitoring
    events: EventSink,
}

impl WanManager {
    /// Create a new WAN manager
    ///
    /// The fixed-mode policy body is registered by default.
    ///
    /// # Parameters
    ///
    /// - `platform`: Collaborators the state machine drives
    /// - `ipc_source`: Inbound IPC endpoint
    /// - `config`: Manager configuration
    ///
    /// # Returns
    ///
    /// A tuple of (manager, event_receiver) where event_receiver yields manager events
    pub fn new(
        platform: Platform,
        ipc_source: Box<dyn IpcSource>,
        config: ManagerConfig,
    ) -> Result<(Self, mpsc::Receiver<WanEvent>)> {
        config.validate()?;

        let (events, rx) = EventSink::channel(config.event_channel_capacity);

        let mut wan_config = WanConfig::new();
        wan_config.enable = config.enable;
        wan_config.policy = config.policy;

        let interfaces = config
            .interfaces
            .iter()
            .enumerate()
            .map(|(index, iface)| WanInterface::from_config(index, iface))
            .collect();
        let store = Arc::new(SharedWanStore::with_interfaces(
            wan_config,
            interfaces,
            config.lock_timeout(),
        ));

        let machine = Arc::new(InterfaceStateMachine::new(
            platform.clone(),
            events.clone(),
            config.mapt_refresh.clone(),
        ));

        let bridge = IpcBridge::new(
            store.clone(),
            platform.clone(),
            events.clone(),
            config.ipc.clone(),
        )
        .with_delays(
            std::time::Duration::from_millis(config.ihc_restart_delay_ms),
            std::time::Duration::from_millis(config.dhcpv6_renew_delay_ms),
        );

        let ctx = PolicyContext {
            store: store.clone(),
            machine,
            events: events.clone(),
            tick_interval: config.tick_interval(),
            policy_interval: config.policy_interval(),
        };
        let policy_loop =
            PolicyDispatchLoop::new(ctx).with_runner(Arc::new(FixedModePolicy::new()));

        let manager = Self {
            store,
            platform,
            ipc_source,
            bridge,
            policy_loop,
            events,
        };

        Ok((manager, rx))
    }

    /// Register an additional policy body
    pub fn with_policy(mut self, runner: Arc<dyn PolicyRunner>) -> Self {
        self.policy_loop.register(runner);
        self
    }

    /// The shared store
    ///
    /// Exposed for the data-model layer, which owns link status, selection
    /// inputs and the global configuration flags.
    pub fn store(&self) -> Arc<SharedWanStore> {
        self.store.clone()
    }

    /// Run the manager
    ///
    /// Runs the IPC bridge and the policy loop until a shutdown signal is
    /// received.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal error
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Internal run implementation that accepts an optional shutdown signal
    ///
    /// # Parameters
    ///
    /// - `shutdown_rx`: Optional oneshot receiver to trigger shutdown (for testing)
    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        let interfaces_count = self.store.total_ifaces().await;
        info!("WAN manager started with {} interfaces", interfaces_count);
        self.events.emit(WanEvent::Started { interfaces_count });

        // A closed IPC endpoint must not stop the policy loop
        let ipc = async {
            self.bridge.run(self.ipc_source.as_ref()).await;
            warn!("IPC endpoint closed, lease updates will no longer be received");
            std::future::pending::<()>().await
        };
        tokio::pin!(ipc);

        let policy = self.policy_loop.run();
        tokio::pin!(policy);

        if let Some(mut rx) = shutdown_rx {
            // Test mode: wait for provided shutdown signal
            tokio::select! {
                _ = &mut ipc => {}
                _ = &mut policy => {}
                _ = &mut rx => {
                    info!("Shutdown signal received");
                }
            }
        } else {
            // Production mode: wait for SIGINT/SIGTERM
            tokio::select! {
                _ = &mut ipc => {}
                _ = &mut policy => {}
                signal = shutdown_signal() => {
                    info!("Shutdown signal received: {}", signal);
                }
            }
        }

        self.events.emit(WanEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        // Flush persistent keys before exiting
        self.platform.status.commit().await?;
        info!("Status flushed, WAN manager stopped");

        Ok(())
    }

    /// Test-only helper to run the manager with a controlled shutdown signal
    ///
    /// # Visibility
    ///
    /// This is `pub` for testing purposes only.
    ///
    /// **TESTING ONLY**: Architecture contract tests require controlled shutdown.
    /// Production daemon code should use `run()` instead, which manages shutdown
    /// via OS signals (SIGTERM/SIGINT) rather than programmatic channels.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }
}

/// Wait for SIGTERM or SIGINT, returning the signal name
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers, falling back to ctrl-c: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return "SIGINT";
            }
        };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
