//! Policy dispatch
//!
//! A single loop polls the global configuration every `policy_interval` and
//! hands control to the policy body matching [`WanConfig::policy`]. Policy
//! bodies select interfaces and own their [`InterfaceRunner`]s; the loop
//! only handles policy changes and the fallback for policies nobody
//! implements.
//!
//! [`WanConfig::policy`]: crate::model::WanConfig

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::events::{EventSink, WanEvent};
use crate::keys;
use crate::model::{PhyStatus, Policy, SelectionStatus};
use crate::runner::InterfaceRunner;
use crate::sm::InterfaceStateMachine;
use crate::store::SharedWanStore;

/// Everything a policy body needs to drive interfaces
#[derive(Clone)]
pub struct PolicyContext {
    pub store: Arc<SharedWanStore>,
    pub machine: Arc<InterfaceStateMachine>,
    pub events: EventSink,
    pub tick_interval: Duration,
    pub policy_interval: Duration,
}

impl PolicyContext {
    /// Build a runner for the interface at `index`
    pub fn runner(&self, index: usize) -> InterfaceRunner {
        InterfaceRunner::new(
            index,
            self.store.clone(),
            self.machine.clone(),
            self.events.clone(),
            self.tick_interval,
        )
    }
}

/// A selection policy body
///
/// `run` is called from the dispatch loop whenever no interface task is
/// running. It may block for as long as it owns interface tasks, and must
/// return once the policy changes.
#[async_trait]
pub trait PolicyRunner: Send + Sync {
    /// True if this body implements `policy`
    fn supports(&self, policy: Policy) -> bool;

    /// Run one pass of the policy
    async fn run(&self, policy: Policy, ctx: &PolicyContext) -> Result<()>;
}

/// The controller loop
pub struct PolicyDispatchLoop {
    ctx: PolicyContext,
    runners: Vec<Arc<dyn PolicyRunner>>,
}

impl PolicyDispatchLoop {
    /// Create a loop with no policy bodies registered
    pub fn new(ctx: PolicyContext) -> Self {
        Self {
            ctx,
            runners: Vec::new(),
        }
    }

    /// Register a policy body
    ///
    /// Bodies are tried in registration order; the first one that
    /// supports the current policy runs it.
    pub fn with_runner(mut self, runner: Arc<dyn PolicyRunner>) -> Self {
        self.register(runner);
        self
    }

    pub fn register(&mut self, runner: Arc<dyn PolicyRunner>) {
        self.runners.push(runner);
    }

    /// Loop forever, one [`step`](Self::step) per policy interval
    pub async fn run(&self) {
        info!("Policy loop started ({} policy bodies)", self.runners.len());
        loop {
            tokio::time::sleep(self.ctx.policy_interval).await;
            if let Err(e) = self.step().await {
                error!("Policy pass failed: {}", e);
            }
        }
    }

    /// Run a single pass of the loop
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Nothing to do (WAN disabled, tasks running) or the
    ///   policy body returned cleanly
    /// - `Err(Error)`: Persisting the active-link reset or the policy
    ///   body failed
    pub async fn step(&self) -> Result<()> {
        let (policy, changed) = {
            let Some(mut config) = self.ctx.store.lock_config().await else {
                return Ok(());
            };
            if !config.enable || config.interface_sm_running {
                return Ok(());
            }
            let changed = config.policy_changed;
            config.policy_changed = false;
            (config.policy, changed)
        };

        if changed {
            self.apply_policy_change(policy).await?;
        }

        self.dispatch(policy).await
    }

    async fn apply_policy_change(&self, policy: Policy) -> Result<()> {
        info!("Selection policy changed to {:?}", policy);
        let platform = self.ctx.machine.platform();

        self.ctx
            .store
            .reset_active_link_on_all(platform.status.as_ref())
            .await?;

        if !policy.manages_upstream() {
            if let Err(e) = platform.link.set_ethernet_upstream(true).await {
                warn!("Failed to re-enable Ethernet upstream: {}", e);
            }
        }

        self.ctx.events.emit(WanEvent::PolicyChanged { policy });
        Ok(())
    }

    async fn dispatch(&self, policy: Policy) -> Result<()> {
        if policy == Policy::MultiWan {
            debug!("MultiWan policy has no body, nothing to do");
            return Ok(());
        }

        if let Some(runner) = self.runner_for(policy) {
            return runner.run(policy, &self.ctx).await;
        }

        if policy == Policy::AutoWan {
            debug!("No policy body registered for AutoWan");
            return Ok(());
        }

        warn!("Policy {:?} is not supported, falling back to AutoWan", policy);
        if let Some(mut config) = self.ctx.store.lock_config().await {
            config.policy = Policy::AutoWan;
        }
        self.ctx
            .events
            .emit(WanEvent::PolicyFallback { requested: policy });
        Ok(())
    }

    fn runner_for(&self, policy: Policy) -> Option<&Arc<dyn PolicyRunner>> {
        self.runners.iter().find(|r| r.supports(policy))
    }
}

/// Fixed-mode policy body
///
/// Selects the interface marked `active_link` (or the first enabled one),
/// marks it `Active` and runs its state machine until it exits or the
/// policy changes. The interface is started only once its physical layer
/// is up.
pub struct FixedModePolicy;

impl FixedModePolicy {
    pub fn new() -> Self {
        Self
    }

    async fn select(&self, store: &SharedWanStore) -> Option<usize> {
        let mut fallback = None;
        let total = store.total_ifaces().await;
        for index in 0..total {
            let Some(iface) = store.lock_iface(index).await else {
                continue;
            };
            if iface.wan.active_link {
                return Some(index);
            }
            if fallback.is_none() && iface.wan.enable {
                fallback = Some(index);
            }
        }
        fallback
    }

    async fn set_sm_running(&self, store: &SharedWanStore, running: bool) {
        match store.lock_config().await {
            Some(mut config) => config.interface_sm_running = running,
            None => warn!("Could not update the interface task flag"),
        }
    }

    async fn should_release(&self, store: &SharedWanStore) -> bool {
        match store.lock_config().await {
            Some(config) => config.policy_changed || !config.enable,
            None => false,
        }
    }
}

impl Default for FixedModePolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyRunner for FixedModePolicy {
    fn supports(&self, policy: Policy) -> bool {
        matches!(policy, Policy::FixedMode | Policy::FixedModeOnBootup)
    }

    async fn run(&self, policy: Policy, ctx: &PolicyContext) -> Result<()> {
        let Some(index) = self.select(&ctx.store).await else {
            debug!("{:?}: no eligible WAN interface", policy);
            return Ok(());
        };

        let instance = {
            let Some(mut iface) = ctx.store.lock_iface(index).await else {
                return Ok(());
            };
            if !iface.wan.enable || iface.phy.status != PhyStatus::Up {
                debug!("{:?}: waiting for {} to come up", policy, iface.name);
                return Ok(());
            }
            if iface.wan.name.is_empty() {
                iface.wan.name = iface.name.clone();
            }
            iface.selection_status = SelectionStatus::Active;
            iface.wan.active_link = true;
            info!("{:?}: selected {} as the active WAN", policy, iface.name);
            iface.index
        };

        let status = ctx.machine.platform().status.clone();
        status
            .set_persistent(&keys::active_link(instance), "true")
            .await?;
        status.commit().await?;

        self.set_sm_running(&ctx.store, true).await;
        let mut handle = ctx.runner(index).spawn();

        let mut deselected = false;
        loop {
            tokio::select! {
                joined = &mut handle => {
                    if let Err(e) = joined {
                        error!("Interface {} task failed: {}", index, e);
                    }
                    break;
                }
                _ = tokio::time::sleep(ctx.policy_interval), if !deselected => {
                    if self.should_release(&ctx.store).await {
                        info!("{:?}: releasing interface {}", policy, index);
                        if let Some(mut iface) = ctx.store.lock_iface(index).await {
                            iface.selection_status = SelectionStatus::NotSelected;
                        }
                        deselected = true;
                    }
                }
            }
        }

        self.set_sm_running(&ctx.store, false).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_mode_supports() {
        let policy = FixedModePolicy::new();
        assert!(policy.supports(Policy::FixedMode));
        assert!(policy.supports(Policy::FixedModeOnBootup));
        assert!(!policy.supports(Policy::AutoWan));
        assert!(!policy.supports(Policy::MultiWan));
    }
}
