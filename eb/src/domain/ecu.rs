//! ECU records and per-operation timing

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stream::{ConfigSource, StreamKey};
use crate::error::BridgeError;

/// Descriptor of a target control unit as provided by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcuRecord {
    #[serde(rename = "cuName")]
    pub name: String,

    /// Watchdog timeout for flashing, in milliseconds
    #[serde(rename = "timerToWaitForFlashing")]
    pub timer_to_wait_for_flashing_ms: i64,

    /// Minimum spacing of forwarded frames, in milliseconds
    #[serde(rename = "updateFrameTime")]
    pub update_frame_time_ms: i32,

    #[serde(rename = "isUpdatePerFrame", default)]
    pub update_per_frame: bool,
}

impl EcuRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timer_to_wait_for_flashing_ms: 6000,
            update_frame_time_ms: 720,
            update_per_frame: false,
        }
    }

    pub fn with_timing(mut self, wait_timeout_ms: i64, frame_interval_ms: i32, per_frame_bonus: bool) -> Self {
        self.timer_to_wait_for_flashing_ms = wait_timeout_ms;
        self.update_frame_time_ms = frame_interval_ms;
        self.update_per_frame = per_frame_bonus;
        self
    }
}

/// Timing parameters of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationConfig {
    #[serde(rename = "wait-timeout-ms")]
    pub wait_timeout_ms: u64,

    #[serde(rename = "frame-interval-ms")]
    pub frame_interval_ms: u32,

    #[serde(rename = "per-frame-bonus")]
    pub per_frame_bonus: bool,
}

impl OperationConfig {
    pub fn new(wait_timeout_ms: u64, frame_interval_ms: u32, per_frame_bonus: bool) -> Self {
        Self {
            wait_timeout_ms,
            frame_interval_ms,
            per_frame_bonus,
        }
    }

    /// Resolve the timing for `stream` from the active ECU record
    ///
    /// Streams that do not read their timing from the record fall back to
    /// `defaults`.
    pub fn resolve(stream: StreamKey, record: &EcuRecord, defaults: &OperationConfig) -> Result<Self, BridgeError> {
        debug!(%stream, ecu = %record.name, "OperationConfig::resolve: called");
        match stream.config_source() {
            ConfigSource::Defaults => Ok(*defaults),
            ConfigSource::EcuRecord => {
                let wait_timeout_ms = u64::try_from(record.timer_to_wait_for_flashing_ms)
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| {
                        BridgeError::Configuration(format!(
                            "ECU {} has invalid flashing timeout {}ms",
                            record.name, record.timer_to_wait_for_flashing_ms
                        ))
                    })?;
                let frame_interval_ms = u32::try_from(record.update_frame_time_ms)
                    .ok()
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| {
                        BridgeError::Configuration(format!(
                            "ECU {} has invalid frame interval {}ms",
                            record.name, record.update_frame_time_ms
                        ))
                    })?;
                Ok(Self::new(wait_timeout_ms, frame_interval_ms, record.update_per_frame))
            }
        }
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.frame_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> OperationConfig {
        OperationConfig::new(6000, 720, false)
    }

    #[test]
    fn test_flash_reads_record_timing() {
        let record = EcuRecord::new("VCU").with_timing(45_000, 300, true);
        let config = OperationConfig::resolve(StreamKey::UpdateFlash, &record, &defaults()).unwrap();
        assert_eq!(config, OperationConfig::new(45_000, 300, true));
        assert_eq!(config.wait_timeout(), Duration::from_secs(45));
        assert_eq!(config.frame_interval(), Duration::from_millis(300));
    }

    #[test]
    fn test_other_streams_use_defaults() {
        let record = EcuRecord::new("BMS").with_timing(45_000, 300, true);
        let config = OperationConfig::resolve(StreamKey::EeDump, &record, &defaults()).unwrap();
        assert_eq!(config, defaults());
    }

    #[test]
    fn test_invalid_record_timing_is_configuration_error() {
        let record = EcuRecord::new("MCU").with_timing(0, 720, false);
        let err = OperationConfig::resolve(StreamKey::UpdateBoot, &record, &defaults()).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));

        let record = EcuRecord::new("MCU").with_timing(6000, -5, false);
        let err = OperationConfig::resolve(StreamKey::UpdateFlash, &record, &defaults()).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_record_deserializes_engine_json() {
        let json = r#"{"cuName":"VCU","timerToWaitForFlashing":9000,"updateFrameTime":500,"isUpdatePerFrame":true}"#;
        let record: EcuRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record, EcuRecord::new("VCU").with_timing(9000, 500, true));
    }
}
