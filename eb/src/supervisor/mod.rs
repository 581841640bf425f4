//! Progress supervisor
//!
//! Sits between the diagnostic engine and the UI bridge:
//! - **Marshaller:** carries raw samples from engine workers onto the lane
//! - **Relay:** throttles each stream to its frame interval
//! - **Watchdog:** cancels an operation that stops reporting
//! - **Coordinator:** ends each operation exactly once
//!
//! ```text
//!  engine ──sample──▶ marshaller ──▶ relay ──forward──▶ emit + rearm watchdog
//!                                      └──drop
//!  watchdog expiry ──▶ coordinator ──▶ stop engine, detach group, emit timeout
//! ```

mod config;
mod coordinator;
mod core;
mod handle;
mod marshaller;
mod messages;
mod relay;
mod subscriptions;
mod watchdog;

pub use config::SupervisorConfig;
pub use coordinator::{CancelCause, CancelOutcome, CancellationCoordinator};
pub use core::Supervisor;
pub use handle::SupervisorHandle;
pub use marshaller::{Envelope, EventMarshaller, PostOutcome};
pub use messages::{LaneRequest, SubscribeRequest, SupervisorMetrics, UnsubscribeOutcome};
pub use relay::{RelayDecision, SubscriptionState, ThrottledProgressRelay};
pub use subscriptions::{PreparedStream, StreamContext, SubscriptionManager};
pub use watchdog::{WatchdogPhase, WatchdogTimer};
