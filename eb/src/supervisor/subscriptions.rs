//! Per-stream observer registry
//!
//! One [`StreamContext`] per attached stream holds everything the old
//! per-operation globals used to: the relay's throttle state, the watchdog,
//! the resolved timing and the pump task reading the engine stream.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::marshaller::{Envelope, EventMarshaller};
use super::messages::{LaneRequest, SubscribeRequest};
use super::relay::ThrottledProgressRelay;
use super::watchdog::WatchdogTimer;
use crate::domain::{EcuRecord, OperationConfig, StreamKey};
use crate::engine::{DiagnosticEngine, OperationParams, OperationRequest, ProgressStream};
use crate::error::BridgeError;

/// An operation the engine agreed to run, not yet observed
pub struct PreparedStream {
    pub record: EcuRecord,
    pub companion: Option<EcuRecord>,
    pub config: OperationConfig,
    progress: ProgressStream,
}

/// State of one attached stream
pub struct StreamContext {
    pub stream: StreamKey,
    pub subscription: u64,
    /// Operation lifecycle shared with the other streams of the cancel scope
    pub lifecycle: Uuid,
    pub record: EcuRecord,
    pub config: OperationConfig,
    pub relay: ThrottledProgressRelay,
    pub watchdog: WatchdogTimer,
    pump: JoinHandle<()>,
}

impl Drop for StreamContext {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

pub struct SubscriptionManager {
    streams: HashMap<StreamKey, StreamContext>,
    next_subscription: u64,
    defaults: OperationConfig,
    frame_bonus: Duration,
    lane: mpsc::Sender<LaneRequest>,
    marshaller: EventMarshaller,
}

impl SubscriptionManager {
    pub fn new(
        defaults: OperationConfig,
        frame_bonus: Duration,
        lane: mpsc::Sender<LaneRequest>,
        marshaller: EventMarshaller,
    ) -> Self {
        Self {
            streams: HashMap::new(),
            next_subscription: 0,
            defaults,
            frame_bonus,
            lane,
            marshaller,
        }
    }

    /// Resolve records and timing, then ask the engine for the stream
    ///
    /// Nothing is attached here, so a failure leaves no state behind.
    pub fn prepare(
        &self,
        request: &SubscribeRequest,
        engine: &dyn DiagnosticEngine,
    ) -> Result<PreparedStream, BridgeError> {
        debug!(stream = %request.stream, ecu_index = request.ecu_index, "SubscriptionManager::prepare: called");
        let record = lookup_record(engine, request.ecu_index)?;
        let companion = match request.params {
            OperationParams::Companion(index) => Some(lookup_record(engine, index)?),
            _ => None,
        };
        let config = OperationConfig::resolve(request.stream, &record, &self.defaults)?;

        let operation = OperationRequest {
            stream: request.stream,
            record,
            companion,
            params: request.params.clone(),
        };
        let progress = engine
            .start_operation(&operation)
            .ok_or(BridgeError::StreamUnavailable(request.stream))?;

        Ok(PreparedStream {
            record: operation.record,
            companion: operation.companion,
            config,
            progress,
        })
    }

    /// Start observing a prepared stream and arm its watchdog
    pub fn attach(&mut self, stream: StreamKey, prepared: PreparedStream, lifecycle: Uuid) -> u64 {
        self.detach(stream);

        self.next_subscription += 1;
        let subscription = self.next_subscription;
        let PreparedStream {
            record,
            config,
            mut progress,
            ..
        } = prepared;

        let mut watchdog = WatchdogTimer::new(stream, subscription, self.lane.clone());
        watchdog.start(config.wait_timeout());

        let marshaller = self.marshaller.clone();
        let pump = tokio::spawn(async move {
            while let Some(sample) = progress.next().await {
                marshaller.post(Envelope {
                    stream,
                    subscription,
                    sample,
                });
            }
            debug!(%stream, subscription, "Engine stream closed");
        });

        info!(
            %stream,
            subscription,
            ecu = %record.name,
            wait_timeout_ms = config.wait_timeout_ms,
            frame_interval_ms = config.frame_interval_ms,
            "Stream attached"
        );
        self.streams.insert(
            stream,
            StreamContext {
                stream,
                subscription,
                lifecycle,
                record,
                config,
                relay: ThrottledProgressRelay::new(&config, self.frame_bonus),
                watchdog,
                pump,
            },
        );
        subscription
    }

    /// Remove a stream's observer and stop its watchdog
    pub fn detach(&mut self, stream: StreamKey) -> Option<StreamContext> {
        let mut context = self.streams.remove(&stream)?;
        debug!(%stream, subscription = context.subscription, "SubscriptionManager::detach: called");
        context.watchdog.stop();
        Some(context)
    }

    /// Detach every stream, returning the keys that were attached
    pub fn detach_all(&mut self) -> Vec<StreamKey> {
        let mut streams: Vec<StreamKey> = self.streams.keys().copied().collect();
        streams.sort();
        for stream in &streams {
            self.detach(*stream);
        }
        streams
    }

    /// Stop every watchdog and keep the observers attached
    pub fn stop_all_timers(&mut self) -> usize {
        let mut stopped = 0;
        for context in self.streams.values_mut() {
            if context.watchdog.is_armed() {
                context.watchdog.stop();
                stopped += 1;
            }
        }
        stopped
    }

    pub fn get(&self, stream: StreamKey) -> Option<&StreamContext> {
        self.streams.get(&stream)
    }

    pub fn get_mut(&mut self, stream: StreamKey) -> Option<&mut StreamContext> {
        self.streams.get_mut(&stream)
    }

    pub fn contains(&self, stream: StreamKey) -> bool {
        self.streams.contains_key(&stream)
    }

    /// Whether any attached stream belongs to `lifecycle`
    pub fn has_lifecycle(&self, lifecycle: Uuid) -> bool {
        self.streams.values().any(|context| context.lifecycle == lifecycle)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn armed_watchdogs(&self) -> usize {
        self.streams.values().filter(|context| context.watchdog.is_armed()).count()
    }
}

fn lookup_record(engine: &dyn DiagnosticEngine, index: usize) -> Result<EcuRecord, BridgeError> {
    engine
        .ecu_record(index)
        .ok_or_else(|| BridgeError::Configuration(format!("No ECU record at index {}", index)))
}
