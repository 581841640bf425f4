//! Event types delivered to the UI layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ProgressEvent;

/// One notification for the UI, keyed by the stream's event name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub name: String,

    #[serde(flatten)]
    pub progress: ProgressEvent,

    pub timestamp: DateTime<Utc>,
}

impl BridgeEvent {
    pub fn new(name: impl Into<String>, progress: ProgressEvent) -> Self {
        Self {
            name: name.into(),
            progress,
            timestamp: Utc::now(),
        }
    }

    /// Whether this notification ends the stream's operation
    pub fn ends_operation(&self) -> bool {
        self.progress.ends_operation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape_matches_ui_payload() {
        let event = BridgeEvent::new("updateBoot", ProgressEvent::new(12, 80, "Writing"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "updateBoot");
        assert_eq!(json["mainProgress"], 12);
        assert_eq!(json["subProgress"], 80);
        assert_eq!(json["status"], "Writing");
        assert!(json["timestamp"].is_string());

        let back: BridgeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
