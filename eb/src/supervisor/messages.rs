//! Message types for the supervisor lane

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::domain::StreamKey;
use crate::engine::{DiagnosticEngine, OperationParams};
use crate::error::BridgeError;

/// What the caller asked to observe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub stream: StreamKey,
    pub ecu_index: usize,
    pub params: OperationParams,
}

impl SubscribeRequest {
    pub fn new(stream: StreamKey, ecu_index: usize) -> Self {
        Self {
            stream,
            ecu_index,
            params: OperationParams::None,
        }
    }

    pub fn with_params(mut self, params: OperationParams) -> Self {
        self.params = params;
        self
    }
}

/// Result of an unsubscribe call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnsubscribeOutcome {
    /// Nothing was attached to the stream
    NotSubscribed,
    /// The observer was detached; the engine operation was left alone
    Detached,
    /// The observer was detached and the engine operation stopped
    Cancelled,
}

/// Requests processed on the supervisor lane
#[derive(Debug)]
pub enum LaneRequest {
    /// Attach an observer to a stream, replacing any existing one
    Subscribe {
        request: SubscribeRequest,
        reply: oneshot::Sender<Result<(), BridgeError>>,
    },

    /// Detach a stream's observer
    Unsubscribe {
        stream: StreamKey,
        cancel_underlying: bool,
        reply: oneshot::Sender<UnsubscribeOutcome>,
    },

    /// Stop every watchdog without detaching observers
    StopAllTimers { reply: oneshot::Sender<usize> },

    /// Watchdog expiry notification (internal)
    WatchdogFired {
        stream: StreamKey,
        subscription: u64,
        generation: u64,
    },

    /// Install a new engine, releasing the previous one first
    AttachEngine {
        engine: Arc<dyn DiagnosticEngine>,
        reply: oneshot::Sender<()>,
    },

    /// Detach everything and shut the engine down
    ReleaseEngine { reply: oneshot::Sender<bool> },

    /// Get current metrics
    GetMetrics {
        reply: oneshot::Sender<SupervisorMetrics>,
    },

    /// Shutdown the supervisor
    Shutdown,
}

/// Supervisor metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorMetrics {
    pub active_subscriptions: usize,
    pub armed_watchdogs: usize,
    pub samples_received: u64,
    pub samples_forwarded: u64,
    pub samples_dropped: u64,
    pub samples_coalesced: u64,
    pub timeouts: u64,
    pub cancellations: u64,
    pub terminal_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request_builder() {
        let request = SubscribeRequest::new(StreamKey::UpdateWriteVin, 2)
            .with_params(OperationParams::Vin("MD2B35300MCD04553".to_string()));
        assert_eq!(request.ecu_index, 2);
        assert_eq!(request.params, OperationParams::Vin("MD2B35300MCD04553".to_string()));
    }

    #[test]
    fn test_unsubscribe_outcome_serialization() {
        let json = serde_json::to_string(&UnsubscribeOutcome::NotSubscribed).unwrap();
        assert_eq!(json, "\"not-subscribed\"");
    }
}
