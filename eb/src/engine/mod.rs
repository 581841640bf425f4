//! Diagnostic engine seam
//!
//! The protocol engine that talks to the dongle is a black box. The supervisor
//! only needs four things from it: look up an ECU record, start an operation
//! that yields progress samples, stop an operation, and release the device.
//! The byte transport (Bluetooth socket or USB serial) is handed to the engine
//! when it is constructed and never inspected here.

mod scripted;
mod slot;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::domain::{EcuRecord, ProgressEvent, StreamKey};
use crate::error::BridgeError;

pub use scripted::{EngineCalls, Script, ScriptedEngine, ScriptedFactory};
pub use slot::EngineSlot;

/// Samples of one running operation, in emission order
pub type ProgressStream = BoxStream<'static, ProgressEvent>;

/// Operation-specific arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OperationParams {
    #[default]
    None,
    /// VIN to write
    Vin(String),
    /// BIN string to write
    Bin(String),
    /// Index of the actuator routine
    Routine(usize),
    /// Parameter group to read
    ParameterGroup(String),
    /// Index of a second ECU taking part in the operation
    Companion(usize),
}

/// A fully resolved request to start an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub stream: StreamKey,
    pub record: EcuRecord,
    /// Second record for two-ECU operations
    pub companion: Option<EcuRecord>,
    pub params: OperationParams,
}

/// Byte transport the engine is constructed over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Transport {
    Bluetooth { address: String },
    UsbSerial { device: String },
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Bluetooth { address } => write!(f, "bluetooth:{}", address),
            Transport::UsbSerial { device } => write!(f, "usb:{}", device),
        }
    }
}

/// The external diagnostic/flashing engine
pub trait DiagnosticEngine: Send + Sync + fmt::Debug {
    /// ECU record at `index` in the engine's record list
    fn ecu_record(&self, index: usize) -> Option<EcuRecord>;

    /// Start an operation; `None` when the engine has no stream for it
    fn start_operation(&self, request: &OperationRequest) -> Option<ProgressStream>;

    /// Best-effort stop of the operation running against `record`
    ///
    /// Must be a no-op when nothing is running.
    fn stop(&self, record: &EcuRecord);

    /// Release the transport; the engine is not used afterwards
    fn shutdown(&self);
}

/// Builds an engine over a transport
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn connect(&self, transport: &Transport) -> Result<Arc<dyn DiagnosticEngine>, BridgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display() {
        let bt = Transport::Bluetooth {
            address: "00:11:22:33:44:55".to_string(),
        };
        assert_eq!(bt.to_string(), "bluetooth:00:11:22:33:44:55");

        let usb = Transport::UsbSerial {
            device: "/dev/bus/usb/001/004".to_string(),
        };
        assert_eq!(usb.to_string(), "usb:/dev/bus/usb/001/004");
    }

    #[test]
    fn test_transport_serialization() {
        let usb = Transport::UsbSerial {
            device: "ftdi0".to_string(),
        };
        let json = serde_json::to_value(&usb).unwrap();
        assert_eq!(json["kind"], "usb-serial");
        assert_eq!(json["device"], "ftdi0");
    }
}
