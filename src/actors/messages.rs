//! Message types for talking to the monitor actor
//!
//! Commands travel over an mpsc channel and are answered through oneshot
//! channels. Stopping does not go through this channel: a cycle in progress
//! does not read commands, so the stop request is a separate watch flag.

use tokio::sync::oneshot;

use crate::monitors::registry::Endpoint;

/// Commands that can be sent to the MonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Run a cycle right away instead of waiting for the interval
    ///
    /// The regular schedule is not shifted.
    CycleNow {
        respond_to: oneshot::Sender<CycleReport>,
    },

    /// Current state of one endpoint
    GetEndpoint {
        address: String,
        respond_to: oneshot::Sender<Option<Endpoint>>,
    },

    /// Current state of every endpoint ever seen
    ListEndpoints {
        respond_to: oneshot::Sender<Vec<Endpoint>>,
    },
}

/// Outcome of one monitoring cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Endpoints probed in this cycle
    pub probed: usize,
    pub unreachable: usize,
    pub transitions: usize,
    pub alerts_sent: usize,
    /// Held back by quiet hours or the cooldown
    pub alerts_suppressed: usize,
    pub alerts_failed: usize,
    /// Set when the inventory could not be loaded and nothing was probed
    pub inventory_error: Option<String>,
    /// The cycle stopped early because a stop was requested
    pub interrupted: bool,
}
