//! Supervisor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::domain::OperationConfig;

/// Supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Watchdog timeout for streams that do not take it from the ECU record
    #[serde(rename = "default-wait-timeout-ms", default = "default_wait_timeout_ms")]
    pub default_wait_timeout_ms: u64,

    /// Frame interval for streams that do not take it from the ECU record
    #[serde(rename = "default-frame-interval-ms", default = "default_frame_interval_ms")]
    pub default_frame_interval_ms: u32,

    /// Credit added to the elapsed time when the progress pair changed
    #[serde(rename = "frame-bonus-ms", default = "default_frame_bonus_ms")]
    pub frame_bonus_ms: u64,

    /// Channel buffer size for lane requests
    #[serde(rename = "lane-buffer", default = "default_lane_buffer")]
    pub lane_buffer: usize,

    /// Samples held by the marshaller before coalescing starts
    #[serde(rename = "sample-queue-capacity", default = "default_sample_queue_capacity")]
    pub sample_queue_capacity: usize,

    /// Broadcast capacity of the event bus
    #[serde(rename = "event-capacity", default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_wait_timeout_ms() -> u64 {
    debug!("default_wait_timeout_ms: called");
    6000
}

fn default_frame_interval_ms() -> u32 {
    debug!("default_frame_interval_ms: called");
    720
}

fn default_frame_bonus_ms() -> u64 {
    debug!("default_frame_bonus_ms: called");
    60
}

fn default_lane_buffer() -> usize {
    debug!("default_lane_buffer: called");
    256
}

fn default_sample_queue_capacity() -> usize {
    debug!("default_sample_queue_capacity: called");
    1024
}

fn default_event_capacity() -> usize {
    debug!("default_event_capacity: called");
    10_000
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        debug!("SupervisorConfig::default: called");
        Self {
            default_wait_timeout_ms: 6000,
            default_frame_interval_ms: 720,
            frame_bonus_ms: 60,
            lane_buffer: 256,
            sample_queue_capacity: 1024,
            event_capacity: 10_000,
        }
    }
}

impl SupervisorConfig {
    /// Timing applied to streams without ECU-provided timing
    pub fn default_operation(&self) -> OperationConfig {
        OperationConfig::new(self.default_wait_timeout_ms, self.default_frame_interval_ms, false)
    }

    pub fn frame_bonus(&self) -> Duration {
        Duration::from_millis(self.frame_bonus_ms)
    }
}
