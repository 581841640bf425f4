//! Domain types shared by the supervisor, the engine seam and the UI bridge

mod ecu;
mod progress;
mod stream;

pub use ecu::{EcuRecord, OperationConfig};
pub use progress::{PROGRESS_ABORT, PROGRESS_SUCCESS, ProgressEvent};
pub use stream::{ACTUATOR_TIMEOUT_STATUS, CANCELLED_STATUS, CancelScope, ConfigSource, Group, StreamKey, TIMEOUT_STATUS};
