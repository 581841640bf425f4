//! Single authority over ending an operation
//!
//! Streams that drive one physical operation share a lifecycle, keyed by
//! their [`CancelScope`]. The first cancellation of a lifecycle stops the
//! engine and detaches every stream of the lifecycle. A timeout emits the one
//! terminal event on the expired stream. An explicit cancel stays silent
//! towards the caller's stream but ends each detached sibling with a
//! cancelled event, so no observer is dropped mid-operation. Any later
//! cancellation finds the lifecycle gone and does nothing.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::subscriptions::SubscriptionManager;
use crate::domain::{CancelScope, EcuRecord, StreamKey};
use crate::engine::DiagnosticEngine;
use crate::events::UiBridge;

/// Why an operation is being cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The stream's watchdog expired
    Timeout,
    /// The engine reported failure; its sample was already forwarded
    EngineAbort,
    /// The caller unsubscribed and asked for the operation to stop
    Explicit,
}

impl CancelCause {
    /// An engine that aborted on its own is not stopped again
    pub fn stops_engine(&self) -> bool {
        !matches!(self, CancelCause::EngineAbort)
    }

    /// Only timeouts produce a synthetic terminal event on the cancelled stream
    pub fn emits_terminal(&self) -> bool {
        matches!(self, CancelCause::Timeout)
    }

    /// Siblings detached by an explicit cancel get a cancelled event
    pub fn notifies_siblings(&self) -> bool {
        matches!(self, CancelCause::Explicit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled { detached: Vec<StreamKey>, emitted: usize },
    AlreadyCancelled,
}

#[derive(Debug, Clone)]
struct Lifecycle {
    id: Uuid,
    record: EcuRecord,
}

#[derive(Debug, Default)]
pub struct CancellationCoordinator {
    lifecycles: HashMap<CancelScope, Lifecycle>,
}

impl CancellationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the open lifecycle of `scope`, or open a new one
    ///
    /// The latest record joined becomes the scope's active record.
    pub fn join(&mut self, scope: CancelScope, record: &EcuRecord) -> Uuid {
        let lifecycle = self.lifecycles.entry(scope).or_insert_with(|| {
            let id = Uuid::now_v7();
            debug!(?scope, %id, "CancellationCoordinator::join: new lifecycle");
            Lifecycle {
                id,
                record: record.clone(),
            }
        });
        lifecycle.record = record.clone();
        lifecycle.id
    }

    /// Record the engine operation currently active in `scope`
    pub fn active_record(&self, scope: CancelScope) -> Option<&EcuRecord> {
        self.lifecycles.get(&scope).map(|lifecycle| &lifecycle.record)
    }

    pub fn is_open(&self, scope: CancelScope) -> bool {
        self.lifecycles.contains_key(&scope)
    }

    /// End the lifecycle `stream` belongs to
    pub fn cancel(
        &mut self,
        stream: StreamKey,
        cause: CancelCause,
        subscriptions: &mut SubscriptionManager,
        engine: Option<&Arc<dyn DiagnosticEngine>>,
        bridge: &dyn UiBridge,
    ) -> CancelOutcome {
        debug!(%stream, ?cause, "CancellationCoordinator::cancel: called");
        let scope = stream.cancel_scope();
        let member_of = subscriptions.get(stream).map(|context| context.lifecycle);
        let open = self.lifecycles.get(&scope).map(|lifecycle| lifecycle.id);
        if member_of.is_none() || member_of != open {
            return CancelOutcome::AlreadyCancelled;
        }
        let Some(Lifecycle { id, record }) = self.lifecycles.remove(&scope) else {
            return CancelOutcome::AlreadyCancelled;
        };

        if cause.stops_engine() {
            if let Some(engine) = engine {
                engine.stop(&record);
            }
        }

        let detached: Vec<StreamKey> = scope
            .streams()
            .into_iter()
            .filter(|key| subscriptions.get(*key).is_some_and(|context| context.lifecycle == id))
            .collect();
        for key in &detached {
            subscriptions.detach(*key);
        }

        let mut emitted = 0;
        if cause.emits_terminal() {
            bridge.emit(stream.as_str(), &stream.timeout_event());
            emitted += 1;
        }
        if cause.notifies_siblings() {
            for sibling in detached.iter().filter(|key| **key != stream) {
                bridge.emit(sibling.as_str(), &sibling.cancelled_event());
                emitted += 1;
            }
        }

        info!(%stream, ?cause, ecu = %record.name, ?detached, emitted, "Operation cancelled");
        CancelOutcome::Cancelled { detached, emitted }
    }

    /// Close `lifecycle` quietly once none of its streams is attached
    pub fn release(&mut self, scope: CancelScope, lifecycle: Uuid, subscriptions: &SubscriptionManager) -> bool {
        let current = self.lifecycles.get(&scope).map(|open| open.id);
        if current != Some(lifecycle) || subscriptions.has_lifecycle(lifecycle) {
            return false;
        }
        debug!(?scope, %lifecycle, "CancellationCoordinator::release: lifecycle concluded");
        self.lifecycles.remove(&scope);
        true
    }

    /// Drop every open lifecycle without side effects
    pub fn conclude_all(&mut self) {
        debug!(open = self.lifecycles.len(), "CancellationCoordinator::conclude_all: called");
        self.lifecycles.clear();
    }
}
