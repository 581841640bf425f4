//! Supervisor lane task

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::SupervisorConfig;
use super::coordinator::{CancelCause, CancelOutcome, CancellationCoordinator};
use super::handle::SupervisorHandle;
use super::marshaller::{Envelope, EventMarshaller};
use super::messages::{LaneRequest, SubscribeRequest, SupervisorMetrics, UnsubscribeOutcome};
use super::relay::RelayDecision;
use super::subscriptions::SubscriptionManager;
use crate::domain::StreamKey;
use crate::engine::EngineSlot;
use crate::error::BridgeError;
use crate::events::UiBridge;

/// Owns every piece of subscription, relay and watchdog state
///
/// All of it is touched only from [`Supervisor::run`]; engine workers reach
/// the lane through the marshaller and callers through [`SupervisorHandle`].
pub struct Supervisor {
    config: SupervisorConfig,
    tx: mpsc::Sender<LaneRequest>,
    rx: mpsc::Receiver<LaneRequest>,
    marshaller: EventMarshaller,
    bridge: Arc<dyn UiBridge>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, bridge: Arc<dyn UiBridge>) -> Self {
        debug!(?config, "Supervisor::new: called");
        let (tx, rx) = mpsc::channel(config.lane_buffer.max(1));
        let marshaller = EventMarshaller::new(config.sample_queue_capacity);
        Self {
            config,
            tx,
            rx,
            marshaller,
            bridge,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle::new(self.tx.clone())
    }

    /// Get a raw sender onto the lane
    pub fn sender(&self) -> mpsc::Sender<LaneRequest> {
        self.tx.clone()
    }

    /// Run the lane until shutdown is requested
    pub async fn run(self) {
        let Supervisor {
            config,
            tx,
            mut rx,
            marshaller,
            bridge,
        } = self;
        let mut lane = Lane::new(&config, tx, marshaller.clone(), bridge);

        info!("Supervisor started");

        loop {
            tokio::select! {
                biased;

                request = rx.recv() => match request {
                    Some(LaneRequest::Shutdown) | None => {
                        info!("Supervisor shutting down");
                        break;
                    }
                    Some(request) => lane.handle(request),
                },

                _ = marshaller.ready() => {
                    for envelope in marshaller.drain() {
                        lane.handle_sample(envelope);
                    }
                }
            }
        }

        lane.shutdown();
        info!(
            forwarded = lane.metrics.samples_forwarded,
            dropped = lane.metrics.samples_dropped,
            timeouts = lane.metrics.timeouts,
            "Supervisor stopped"
        );
    }
}

struct Lane {
    engine: EngineSlot,
    subscriptions: SubscriptionManager,
    coordinator: CancellationCoordinator,
    marshaller: EventMarshaller,
    bridge: Arc<dyn UiBridge>,
    metrics: SupervisorMetrics,
}

impl Lane {
    fn new(
        config: &SupervisorConfig,
        tx: mpsc::Sender<LaneRequest>,
        marshaller: EventMarshaller,
        bridge: Arc<dyn UiBridge>,
    ) -> Self {
        Self {
            engine: EngineSlot::new(),
            subscriptions: SubscriptionManager::new(
                config.default_operation(),
                config.frame_bonus(),
                tx,
                marshaller.clone(),
            ),
            coordinator: CancellationCoordinator::new(),
            marshaller,
            bridge,
            metrics: SupervisorMetrics::default(),
        }
    }

    fn handle(&mut self, request: LaneRequest) {
        match request {
            LaneRequest::Subscribe { request, reply } => {
                let _ = reply.send(self.subscribe(request));
            }

            LaneRequest::Unsubscribe {
                stream,
                cancel_underlying,
                reply,
            } => {
                let _ = reply.send(self.unsubscribe(stream, cancel_underlying));
            }

            LaneRequest::StopAllTimers { reply } => {
                let stopped = self.subscriptions.stop_all_timers();
                info!(stopped, "All watchdogs stopped");
                let _ = reply.send(stopped);
            }

            LaneRequest::WatchdogFired {
                stream,
                subscription,
                generation,
            } => self.watchdog_fired(stream, subscription, generation),

            LaneRequest::AttachEngine { engine, reply } => {
                self.detach_everything();
                self.engine.install(engine);
                let _ = reply.send(());
            }

            LaneRequest::ReleaseEngine { reply } => {
                self.detach_everything();
                let _ = reply.send(self.engine.release());
            }

            LaneRequest::GetMetrics { reply } => {
                let _ = reply.send(self.snapshot());
            }

            // handled by the run loop
            LaneRequest::Shutdown => {}
        }
    }

    fn subscribe(&mut self, request: SubscribeRequest) -> Result<(), BridgeError> {
        let stream = request.stream;
        debug!(%stream, ecu_index = request.ecu_index, "Lane::subscribe: called");

        if self.detach_and_release(stream) {
            debug!(%stream, "Replacing existing subscription");
        }

        let engine = self.engine.current().cloned().ok_or(BridgeError::EngineUnavailable)?;
        let prepared = match self.subscriptions.prepare(&request, engine.as_ref()) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(%stream, error = %e, "Subscription aborted");
                return Err(e);
            }
        };

        let lifecycle = self.coordinator.join(stream.cancel_scope(), &prepared.record);
        self.subscriptions.attach(stream, prepared, lifecycle);
        Ok(())
    }

    fn unsubscribe(&mut self, stream: StreamKey, cancel_underlying: bool) -> UnsubscribeOutcome {
        debug!(%stream, cancel_underlying, "Lane::unsubscribe: called");
        if !self.subscriptions.contains(stream) {
            return UnsubscribeOutcome::NotSubscribed;
        }
        if cancel_underlying && self.cancel(stream, CancelCause::Explicit) {
            return UnsubscribeOutcome::Cancelled;
        }
        self.detach_and_release(stream);
        UnsubscribeOutcome::Detached
    }

    fn handle_sample(&mut self, envelope: Envelope) {
        let Envelope {
            stream,
            subscription,
            sample,
        } = envelope;

        let Some(context) = self.subscriptions.get_mut(stream) else {
            debug!(%stream, subscription, "Sample for detached stream ignored");
            return;
        };
        if context.subscription != subscription {
            debug!(%stream, subscription, "Sample for replaced subscription ignored");
            return;
        }
        self.metrics.samples_received += 1;

        if context.relay.offer(&sample, Instant::now()) == RelayDecision::Drop {
            self.metrics.samples_dropped += 1;
            return;
        }
        self.metrics.samples_forwarded += 1;

        if !sample.ends_operation() {
            context.watchdog.reset(context.config.wait_timeout());
        }
        self.bridge.emit(stream.as_str(), &sample);

        if sample.is_failure() {
            info!(%stream, %sample, "Engine reported failure");
            self.metrics.terminal_events += 1;
            self.cancel(stream, CancelCause::EngineAbort);
        } else if sample.is_complete() {
            info!(%stream, "Operation complete");
            self.metrics.terminal_events += 1;
            self.detach_and_release(stream);
        }
    }

    fn watchdog_fired(&mut self, stream: StreamKey, subscription: u64, generation: u64) {
        let Some(context) = self.subscriptions.get_mut(stream) else {
            return;
        };
        if context.subscription != subscription || !context.watchdog.on_fire(generation) {
            return;
        }
        warn!(%stream, subscription, "No progress within {}ms", context.config.wait_timeout_ms);
        self.metrics.timeouts += 1;
        self.cancel(stream, CancelCause::Timeout);
    }

    fn cancel(&mut self, stream: StreamKey, cause: CancelCause) -> bool {
        let engine = self.engine.current().cloned();
        match self.coordinator.cancel(
            stream,
            cause,
            &mut self.subscriptions,
            engine.as_ref(),
            self.bridge.as_ref(),
        ) {
            CancelOutcome::Cancelled { emitted, .. } => {
                self.metrics.cancellations += 1;
                self.metrics.terminal_events += emitted as u64;
                true
            }
            CancelOutcome::AlreadyCancelled => {
                debug!(%stream, ?cause, "Operation already cancelled");
                false
            }
        }
    }

    /// Detach one stream without stopping the engine or emitting anything
    fn detach_and_release(&mut self, stream: StreamKey) -> bool {
        let Some(context) = self.subscriptions.detach(stream) else {
            return false;
        };
        self.coordinator
            .release(stream.cancel_scope(), context.lifecycle, &self.subscriptions);
        true
    }

    fn detach_everything(&mut self) {
        let detached = self.subscriptions.detach_all();
        if !detached.is_empty() {
            info!(?detached, "Detached all streams");
        }
        self.coordinator.conclude_all();
    }

    fn snapshot(&self) -> SupervisorMetrics {
        SupervisorMetrics {
            active_subscriptions: self.subscriptions.len(),
            armed_watchdogs: self.subscriptions.armed_watchdogs(),
            samples_coalesced: self.marshaller.coalesced(),
            ..self.metrics.clone()
        }
    }

    fn shutdown(&mut self) {
        self.detach_everything();
        self.engine.release();
    }
}
