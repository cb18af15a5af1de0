//! Manager events
//!
//! Observable milestones of the WAN manager, delivered on a bounded channel
//! returned by [`WanManager::new`](crate::WanManager::new). Delivery is best
//! effort: when the channel is full the event is dropped with a warning.

use tokio::sync::mpsc;
use tracing::warn;

use crate::model::Policy;
use crate::sm::WanState;

/// Events emitted by the WAN manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WanEvent {
    /// Manager started
    Started { interfaces_count: usize },

    /// Manager stopped
    Stopped { reason: String },

    /// An interface task was spawned
    InterfaceStarted { interface: String, index: usize },

    /// An interface state machine changed state
    StateChanged {
        interface: String,
        from: WanState,
        to: WanState,
    },

    /// An interface task reached `Exit`
    InterfaceExited { interface: String, index: usize },

    /// A lease payload was rejected because the previous one was never consumed
    PayloadDropped { interface: String, family: String },

    /// The selection policy changed
    PolicyChanged { policy: Policy },

    /// An unsupported policy was replaced by AutoWan
    PolicyFallback { requested: Policy },
}

/// Cloneable best-effort sender for [`WanEvent`]s
///
/// A sink without a channel discards everything, which keeps components
/// usable on their own.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<WanEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<WanEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create a sink and the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WanEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Emit an event
    pub fn emit(&self, event: WanEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(mpsc::error::TrySendError::Full(event)) = tx.try_send(event) {
            warn!(
                "Event channel full, dropping {:?}. Consider increasing event_channel_capacity.",
                event
            );
        }
    }
}
