//! Interface runner
//!
//! One task per WAN interface. Each tick it refreshes the controller from
//! the global configuration, locks the interface record, applies staged
//! lease payloads and advances the state machine. The task ends on its own
//! after the state machine has reached `Exit`; nothing joins or cancels it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{EventSink, WanEvent};
use crate::sm::{InterfaceStateMachine, WanController, WanState, apply_ipv4_lease, apply_ipv6_lease};
use crate::store::SharedWanStore;

/// Drives one interface's state machine until it exits
pub struct InterfaceRunner {
    index: usize,
    store: Arc<SharedWanStore>,
    machine: Arc<InterfaceStateMachine>,
    events: EventSink,
    tick_interval: Duration,
}

impl InterfaceRunner {
    pub fn new(
        index: usize,
        store: Arc<SharedWanStore>,
        machine: Arc<InterfaceStateMachine>,
        events: EventSink,
        tick_interval: Duration,
    ) -> Self {
        Self {
            index,
            store,
            machine,
            events,
            tick_interval,
        }
    }

    /// Spawn the runner as a detached task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the state machine to completion
    ///
    /// Sets the interface's running bit on entry and clears it on exit.
    pub async fn run(self) {
        let mut ctrl = WanController::new(self.index);

        let (name, state) = match self.start(&mut ctrl).await {
            Some(started) => started,
            None => {
                warn!("Interface {}: could not start state machine", self.index);
                self.set_running(false).await;
                return;
            }
        };

        // A failed start still runs the exit tick before the task ends
        if state != WanState::Exit {
            self.events.emit(WanEvent::InterfaceStarted {
                interface: name.clone(),
                index: self.index,
            });
        }

        loop {
            tokio::time::sleep(self.tick_interval).await;

            if let Some(mut config) = self.store.lock_config().await {
                ctrl.refresh(&config);
                config.device_nw_mode_changed = false;
                config.mapt_feature_changed = false;
            }

            let Some(mut iface) = self.store.lock_iface(self.index).await else {
                debug!("Interface {}: record busy, skipping tick", self.index);
                continue;
            };

            if let Some(event) = iface.ip.pending_v4.take() {
                apply_ipv4_lease(self.machine.platform(), &mut iface, &event).await;
            }
            if let Some(event) = iface.ip.pending_v6.take() {
                apply_ipv6_lease(self.machine.platform(), &mut iface, &event).await;
            }

            let from = ctrl.current_state;
            self.machine.tick(&mut ctrl, &mut iface).await;
            iface.release();

            if from == WanState::Exit {
                break;
            }
        }

        self.set_running(false).await;
        info!("Interface '{}': runner finished", name);
        self.events.emit(WanEvent::InterfaceExited {
            interface: name,
            index: self.index,
        });
    }

    async fn start(&self, ctrl: &mut WanController) -> Option<(String, WanState)> {
        if let Some(mut config) = self.store.lock_config().await {
            config.set_ism_running(self.index, true);
            ctrl.refresh(&config);
            config.device_nw_mode_changed = false;
            config.mapt_feature_changed = false;
        }

        let mut iface = self.store.lock_iface(self.index).await?;
        let state = self.machine.start(ctrl, &mut iface).await;
        Some((iface.name.clone(), state))
    }

    async fn set_running(&self, running: bool) {
        match self.store.lock_config().await {
            Some(mut config) => config.set_ism_running(self.index, running),
            None => warn!("Interface {}: could not update running flag", self.index),
        }
    }
}
