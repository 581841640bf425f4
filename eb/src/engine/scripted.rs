//! Scripted engine used by `eb simulate` and the test suites
//!
//! Each stream gets a script of `(delay, sample)` steps played back with tokio
//! timers. A script either closes after its last step or stalls forever, which
//! is how a hung dongle looks from the supervisor's side.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use super::{DiagnosticEngine, EngineFactory, OperationRequest, ProgressStream, Transport};
use crate::domain::{EcuRecord, ProgressEvent, StreamKey};
use crate::error::BridgeError;

/// Playback script for one stream
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<(Duration, ProgressEvent)>,
    stall: bool,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `event` after waiting `delay` from the previous step
    pub fn then(mut self, delay: Duration, event: ProgressEvent) -> Self {
        self.steps.push((delay, event));
        self
    }

    /// Emit `count` samples spaced `period` apart
    pub fn periodic(mut self, period: Duration, count: usize, sample: impl Fn(usize) -> ProgressEvent) -> Self {
        for i in 0..count {
            self.steps.push((period, sample(i)));
        }
        self
    }

    /// Never close the stream after the last step
    pub fn stall(mut self) -> Self {
        self.stall = true;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn into_stream(self) -> ProgressStream {
        let steps = futures::stream::iter(self.steps).then(|(delay, event)| async move {
            tokio::time::sleep(delay).await;
            event
        });
        if self.stall {
            steps.chain(futures::stream::pending()).boxed()
        } else {
            steps.boxed()
        }
    }
}

/// Calls observed by a [`ScriptedEngine`]
#[derive(Debug, Clone, Default)]
pub struct EngineCalls {
    pub started: Vec<OperationRequest>,
    /// ECU names passed to `stop`
    pub stopped: Vec<String>,
    pub shutdowns: usize,
}

/// Engine that plays back scripts instead of talking to a dongle
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    records: Vec<EcuRecord>,
    scripts: HashMap<StreamKey, Script>,
    unavailable: HashSet<StreamKey>,
    calls: Mutex<EngineCalls>,
}

impl ScriptedEngine {
    pub fn new(records: Vec<EcuRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    pub fn with_script(mut self, stream: StreamKey, script: Script) -> Self {
        self.scripts.insert(stream, script);
        self
    }

    /// Make `start_operation` return no stream for `stream`
    pub fn with_unavailable(mut self, stream: StreamKey) -> Self {
        self.unavailable.insert(stream);
        self
    }

    /// Snapshot of the calls made so far
    pub fn calls(&self) -> EngineCalls {
        self.lock_calls().clone()
    }

    fn lock_calls(&self) -> MutexGuard<'_, EngineCalls> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticEngine for ScriptedEngine {
    fn ecu_record(&self, index: usize) -> Option<EcuRecord> {
        self.records.get(index).cloned()
    }

    fn start_operation(&self, request: &OperationRequest) -> Option<ProgressStream> {
        debug!(stream = %request.stream, ecu = %request.record.name, "ScriptedEngine::start_operation: called");
        self.lock_calls().started.push(request.clone());
        if self.unavailable.contains(&request.stream) {
            return None;
        }
        self.scripts.get(&request.stream).cloned().map(Script::into_stream)
    }

    fn stop(&self, record: &EcuRecord) {
        debug!(ecu = %record.name, "ScriptedEngine::stop: called");
        self.lock_calls().stopped.push(record.name.clone());
    }

    fn shutdown(&self) {
        debug!("ScriptedEngine::shutdown: called");
        self.lock_calls().shutdowns += 1;
    }
}

/// Factory handing out one scripted engine for any non-empty transport
pub struct ScriptedFactory {
    engine: Arc<ScriptedEngine>,
}

impl ScriptedFactory {
    pub fn new(engine: Arc<ScriptedEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EngineFactory for ScriptedFactory {
    async fn connect(&self, transport: &Transport) -> Result<Arc<dyn DiagnosticEngine>, BridgeError> {
        debug!(%transport, "ScriptedFactory::connect: called");
        let endpoint = match transport {
            Transport::Bluetooth { address } => address,
            Transport::UsbSerial { device } => device,
        };
        if endpoint.is_empty() {
            return Err(BridgeError::Transport(format!("No endpoint given for {}", transport)));
        }
        Ok(self.engine.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OperationParams;
    use tokio::time::Instant;

    fn request(stream: StreamKey) -> OperationRequest {
        OperationRequest {
            stream,
            record: EcuRecord::new("VCU"),
            companion: None,
            params: OperationParams::None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_plays_back_with_delays() {
        let script = Script::new()
            .then(Duration::from_millis(100), ProgressEvent::new(10, 0, "a"))
            .then(Duration::from_millis(250), ProgressEvent::new(20, 0, "b"));
        let engine = ScriptedEngine::new(vec![]).with_script(StreamKey::EeDump, script);

        let start = Instant::now();
        let mut stream = engine.start_operation(&request(StreamKey::EeDump)).unwrap();

        let first = stream.next().await.unwrap();
        assert_eq!(first.main_progress, 10);
        assert!(start.elapsed() >= Duration::from_millis(100) && start.elapsed() < Duration::from_millis(110));

        let second = stream.next().await.unwrap();
        assert_eq!(second.main_progress, 20);
        assert!(start.elapsed() >= Duration::from_millis(350) && start.elapsed() < Duration::from_millis(360));

        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_script_never_closes() {
        let script = Script::new()
            .then(Duration::from_millis(10), ProgressEvent::new(40, 10, "x"))
            .stall();
        let engine = ScriptedEngine::new(vec![]).with_script(StreamKey::UpdateFlash, script);
        let mut stream = engine.start_operation(&request(StreamKey::UpdateFlash)).unwrap();

        assert!(stream.next().await.is_some());
        let next = tokio::time::timeout(Duration::from_secs(60), stream.next()).await;
        assert!(next.is_err());
    }

    #[test]
    fn test_unavailable_and_unscripted_streams() {
        let engine = ScriptedEngine::new(vec![])
            .with_script(StreamKey::Actuator, Script::new())
            .with_unavailable(StreamKey::Actuator);
        assert!(engine.start_operation(&request(StreamKey::Actuator)).is_none());
        assert!(engine.start_operation(&request(StreamKey::EeDump)).is_none());
        assert_eq!(engine.calls().started.len(), 2);
    }

    #[test]
    fn test_records_stop_calls() {
        let engine = ScriptedEngine::new(vec![EcuRecord::new("VCU")]);
        engine.stop(&EcuRecord::new("VCU"));
        engine.stop(&EcuRecord::new("VCU"));
        assert_eq!(engine.calls().stopped, vec!["VCU".to_string(), "VCU".to_string()]);
    }

    #[tokio::test]
    async fn test_factory_rejects_empty_endpoint() {
        let factory = ScriptedFactory::new(Arc::new(ScriptedEngine::new(vec![])));
        let result = factory
            .connect(&Transport::Bluetooth {
                address: String::new(),
            })
            .await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));

        let result = factory
            .connect(&Transport::UsbSerial {
                device: "ftdi0".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }
}
