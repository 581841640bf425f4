//! ecubridge - progress supervisor for ECU diagnostic and flashing dongles
//!
//! A diagnostic engine drives long-running operations on the dongle (ECU
//! flashing, EEPROM dump, parameter read and write, actuator routines) and
//! reports progress at whatever rate the device produces. The supervisor sits
//! between that engine and the UI layer and guarantees three things per
//! stream: updates are throttled to the stream's frame interval, a stalled
//! operation is cancelled by its watchdog, and every operation ends exactly
//! once.
//!
//! # Modules
//!
//! - [`domain`] - stream catalog, progress samples, ECU records
//! - [`engine`] - diagnostic engine seam and the scripted engine
//! - [`events`] - UI bridge and broadcast event bus
//! - [`supervisor`] - lane actor, relay, watchdog, cancellation
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod supervisor;

// Re-export commonly used types
pub use config::{Config, SimulationConfig};
pub use domain::{CancelScope, EcuRecord, Group, OperationConfig, ProgressEvent, StreamKey};
pub use engine::{DiagnosticEngine, EngineFactory, OperationParams, OperationRequest, Transport};
pub use error::BridgeError;
pub use events::{BridgeEvent, EventBus, UiBridge};
pub use supervisor::{
    SubscribeRequest, Supervisor, SupervisorConfig, SupervisorHandle, SupervisorMetrics, UnsubscribeOutcome,
};
