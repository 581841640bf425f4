//! SupervisorHandle - command surface for the UI layer
//!
//! One method per bridge command. Every call is a request on the lane with a
//! oneshot reply, so calls made from one task observe each other in order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{LaneRequest, SubscribeRequest, SupervisorMetrics, UnsubscribeOutcome};
use crate::domain::StreamKey;
use crate::engine::{DiagnosticEngine, EngineFactory, OperationParams, Transport};
use crate::error::BridgeError;

/// Cloneable client of the supervisor lane
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<LaneRequest>,
}

impl SupervisorHandle {
    pub(crate) fn new(tx: mpsc::Sender<LaneRequest>) -> Self {
        Self { tx }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> LaneRequest) -> Result<T, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| BridgeError::LaneClosed)?;
        rx.await.map_err(|_| BridgeError::LaneClosed)
    }

    /// Attach an observer, replacing any observer already on the stream
    pub async fn subscribe(&self, request: SubscribeRequest) -> Result<(), BridgeError> {
        debug!(stream = %request.stream, ecu_index = request.ecu_index, "SupervisorHandle::subscribe: called");
        self.request(|reply| LaneRequest::Subscribe { request, reply }).await?
    }

    /// Detach a stream's observer; with `cancel_underlying` the engine operation is stopped too
    pub async fn unsubscribe(&self, stream: StreamKey, cancel_underlying: bool) -> Result<UnsubscribeOutcome, BridgeError> {
        debug!(%stream, cancel_underlying, "SupervisorHandle::unsubscribe: called");
        self.request(|reply| LaneRequest::Unsubscribe {
            stream,
            cancel_underlying,
            reply,
        })
        .await
    }

    pub async fn subscribe_to_flashing_update(&self, ecu_index: usize) -> Result<(), BridgeError> {
        self.subscribe(SubscribeRequest::new(StreamKey::UpdateFlash, ecu_index)).await
    }

    pub async fn unsubscribe_to_flashing_update(&self) -> Result<UnsubscribeOutcome, BridgeError> {
        self.unsubscribe(StreamKey::UpdateFlash, false).await
    }

    pub async fn subscribe_to_boot_flashing_update(&self, ecu_index: usize) -> Result<(), BridgeError> {
        self.subscribe(SubscribeRequest::new(StreamKey::UpdateBoot, ecu_index)).await
    }

    pub async fn unsubscribe_to_boot_flashing_update(&self) -> Result<UnsubscribeOutcome, BridgeError> {
        self.unsubscribe(StreamKey::UpdateBoot, false).await
    }

    pub async fn subscribe_to_dump(&self, ecu_index: usize) -> Result<(), BridgeError> {
        self.subscribe(SubscribeRequest::new(StreamKey::EeDump, ecu_index)).await
    }

    /// Stopping a dump also halts the engine's read loop
    pub async fn unsubscribe_to_dump(&self) -> Result<UnsubscribeOutcome, BridgeError> {
        self.unsubscribe(StreamKey::EeDump, true).await
    }

    pub async fn subscribe_to_write_vin_update(&self, ecu_index: usize, vin: &str) -> Result<(), BridgeError> {
        let request = SubscribeRequest::new(StreamKey::UpdateWriteVin, ecu_index)
            .with_params(OperationParams::Vin(vin.to_string()));
        self.subscribe(request).await
    }

    pub async fn unsubscribe_to_write_vin_update(&self) -> Result<UnsubscribeOutcome, BridgeError> {
        self.unsubscribe(StreamKey::UpdateWriteVin, false).await
    }

    pub async fn subscribe_to_write_pc_update(&self, ecu_index: usize) -> Result<(), BridgeError> {
        self.subscribe(SubscribeRequest::new(StreamKey::UpdateWritePc, ecu_index)).await
    }

    pub async fn unsubscribe_to_write_pc_update(&self) -> Result<UnsubscribeOutcome, BridgeError> {
        self.unsubscribe(StreamKey::UpdateWritePc, false).await
    }

    pub async fn subscribe_to_write_bin_update(&self, ecu_index: usize, bin: &str) -> Result<(), BridgeError> {
        let request = SubscribeRequest::new(StreamKey::UpdateWriteBin, ecu_index)
            .with_params(OperationParams::Bin(bin.to_string()));
        self.subscribe(request).await
    }

    pub async fn unsubscribe_to_write_bin_update(&self) -> Result<UnsubscribeOutcome, BridgeError> {
        self.unsubscribe(StreamKey::UpdateWriteBin, false).await
    }

    /// Read BIN data from a BMS with the VCU as companion
    pub async fn subscribe_to_read_bin_data(&self, bms_index: usize, vcu_index: usize) -> Result<(), BridgeError> {
        let request = SubscribeRequest::new(StreamKey::ReadBinData, bms_index)
            .with_params(OperationParams::Companion(vcu_index));
        self.subscribe(request).await
    }

    pub async fn unsubscribe_to_read_bin_data(&self) -> Result<UnsubscribeOutcome, BridgeError> {
        self.unsubscribe(StreamKey::ReadBinData, false).await
    }

    pub async fn subscribe_to_actuator(&self, ecu_index: usize, routine_index: usize) -> Result<(), BridgeError> {
        let request =
            SubscribeRequest::new(StreamKey::Actuator, ecu_index).with_params(OperationParams::Routine(routine_index));
        self.subscribe(request).await
    }

    pub async fn unsubscribe_to_actuator(&self) -> Result<UnsubscribeOutcome, BridgeError> {
        self.unsubscribe(StreamKey::Actuator, false).await
    }

    pub async fn subscribe_to_read_parameters(&self, ecu_index: usize, group: &str) -> Result<(), BridgeError> {
        let request = SubscribeRequest::new(StreamKey::ReadParameters, ecu_index)
            .with_params(OperationParams::ParameterGroup(group.to_string()));
        self.subscribe(request).await
    }

    pub async fn unsubscribe_to_read_parameters(&self) -> Result<UnsubscribeOutcome, BridgeError> {
        self.unsubscribe(StreamKey::ReadParameters, false).await
    }

    /// Stop every watchdog; returns how many were armed
    pub async fn stop_all_timers(&self) -> Result<usize, BridgeError> {
        debug!("SupervisorHandle::stop_all_timers: called");
        self.request(|reply| LaneRequest::StopAllTimers { reply }).await
    }

    /// Install an engine; the previous one is shut down first
    pub async fn attach_engine(&self, engine: Arc<dyn DiagnosticEngine>) -> Result<(), BridgeError> {
        debug!("SupervisorHandle::attach_engine: called");
        self.request(|reply| LaneRequest::AttachEngine { engine, reply }).await
    }

    /// Detach every stream and shut the engine down
    pub async fn release_engine(&self) -> Result<bool, BridgeError> {
        debug!("SupervisorHandle::release_engine: called");
        self.request(|reply| LaneRequest::ReleaseEngine { reply }).await
    }

    /// Move the engine onto another transport
    ///
    /// The old engine is released before the factory is asked for a new one,
    /// so the device is never driven by two engines.
    pub async fn switch_transport(&self, factory: &dyn EngineFactory, transport: &Transport) -> Result<(), BridgeError> {
        debug!(%transport, "SupervisorHandle::switch_transport: called");
        self.release_engine().await?;
        let engine = factory.connect(transport).await?;
        self.attach_engine(engine).await
    }

    pub async fn metrics(&self) -> Result<SupervisorMetrics, BridgeError> {
        self.request(|reply| LaneRequest::GetMetrics { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        debug!("SupervisorHandle::shutdown: called");
        self.tx.send(LaneRequest::Shutdown).await.map_err(|_| BridgeError::LaneClosed)
    }
}
