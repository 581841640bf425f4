//! UI bridge and event bus
//!
//! The supervisor never talks to the UI layer directly. It calls
//! [`UiBridge::emit`] exactly once per forwarded or terminal sample; the
//! default bridge is the broadcast [`EventBus`].
//!
//! ```text
//!  Supervisor lane ──emit(name, progress)──▶ EventBus ──▶ UI bridge
//!                                               ├──────▶ logger
//!                                               └──────▶ tests
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, create_event_bus};
pub use types::BridgeEvent;

use crate::domain::ProgressEvent;

/// Fire-and-forget notification sink for the UI layer
pub trait UiBridge: Send + Sync {
    fn emit(&self, event_name: &str, payload: &ProgressEvent);
}
