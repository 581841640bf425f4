//! Stream catalog
//!
//! Every long-running dongle operation reports through one named stream. The
//! catalog below is fixed for the process: it maps each stream to the group
//! that owns its cancellation, the place its timing comes from and the payload
//! the UI receives when the operation times out.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::progress::ProgressEvent;

/// Status text of the synthetic timeout event for progress-style streams
pub const TIMEOUT_STATUS: &str = "Operation Time Out, Please try again";

/// Status text sent to a stream whose operation a sibling cancelled
pub const CANCELLED_STATUS: &str = "Operation cancelled";

/// Status text of the synthetic timeout event for actuator routines
pub const ACTUATOR_TIMEOUT_STATUS: &str =
    r#"{"status":false,"message":"Time out","processStatus":"Done","RoutinePosOnUI":0,"StepNo":0}"#;

/// Logical stream identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StreamKey {
    #[serde(rename = "updateFlash")]
    UpdateFlash,
    #[serde(rename = "updateBoot")]
    UpdateBoot,
    #[serde(rename = "updateWriteVin")]
    UpdateWriteVin,
    #[serde(rename = "updateWritePC")]
    UpdateWritePc,
    #[serde(rename = "updateWriteBin")]
    UpdateWriteBin,
    #[serde(rename = "eeDump")]
    EeDump,
    #[serde(rename = "readBinData")]
    ReadBinData,
    #[serde(rename = "actuator")]
    Actuator,
    #[serde(rename = "readparameters")]
    ReadParameters,
}

/// Cancellation authority shared by streams driving one physical operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Flashing,
    Actuator,
    Generic,
}

/// Where a stream takes its watchdog and frame timing from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Fields of the selected ECU record
    EcuRecord,
    /// Supervisor defaults
    Defaults,
}

/// Unit a cancellation applies to
///
/// Flashing streams share one operation and are cancelled together; every
/// other stream is its own unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelScope {
    Group(Group),
    Stream(StreamKey),
}

impl StreamKey {
    /// All streams in catalog order
    pub const ALL: [StreamKey; 9] = [
        StreamKey::UpdateFlash,
        StreamKey::UpdateBoot,
        StreamKey::UpdateWriteVin,
        StreamKey::UpdateWritePc,
        StreamKey::UpdateWriteBin,
        StreamKey::EeDump,
        StreamKey::ReadBinData,
        StreamKey::Actuator,
        StreamKey::ReadParameters,
    ];

    /// Event name the UI listens on
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKey::UpdateFlash => "updateFlash",
            StreamKey::UpdateBoot => "updateBoot",
            StreamKey::UpdateWriteVin => "updateWriteVin",
            StreamKey::UpdateWritePc => "updateWritePC",
            StreamKey::UpdateWriteBin => "updateWriteBin",
            StreamKey::EeDump => "eeDump",
            StreamKey::ReadBinData => "readBinData",
            StreamKey::Actuator => "actuator",
            StreamKey::ReadParameters => "readparameters",
        }
    }

    pub fn group(&self) -> Group {
        match self {
            StreamKey::UpdateFlash
            | StreamKey::UpdateBoot
            | StreamKey::UpdateWriteVin
            | StreamKey::UpdateWritePc
            | StreamKey::UpdateWriteBin
            | StreamKey::EeDump
            | StreamKey::ReadBinData => Group::Flashing,
            StreamKey::Actuator => Group::Actuator,
            StreamKey::ReadParameters => Group::Generic,
        }
    }

    /// Engine operation the stream reports on
    pub fn operation(&self) -> &'static str {
        match self {
            StreamKey::UpdateFlash => "Flash",
            StreamKey::UpdateBoot => "BootFlash",
            StreamKey::UpdateWriteVin => "WriteVin",
            StreamKey::UpdateWritePc => "WriteProgConst",
            StreamKey::UpdateWriteBin => "WriteBin",
            StreamKey::EeDump => "EeDump",
            StreamKey::ReadBinData => "ReadBinData",
            StreamKey::Actuator => "Actuator",
            StreamKey::ReadParameters => "ReadParameters",
        }
    }

    pub fn config_source(&self) -> ConfigSource {
        match self {
            StreamKey::UpdateFlash | StreamKey::UpdateBoot => ConfigSource::EcuRecord,
            _ => ConfigSource::Defaults,
        }
    }

    pub fn cancel_scope(&self) -> CancelScope {
        match self.group() {
            Group::Flashing => CancelScope::Group(Group::Flashing),
            _ => CancelScope::Stream(*self),
        }
    }

    /// Synthetic terminal event emitted when this stream's watchdog expires
    pub fn timeout_event(&self) -> ProgressEvent {
        match self.group() {
            Group::Actuator => ProgressEvent::failure(ACTUATOR_TIMEOUT_STATUS),
            Group::Flashing | Group::Generic => ProgressEvent::failure(TIMEOUT_STATUS),
        }
    }

    /// Synthetic terminal event for a stream detached by another stream's cancel
    pub fn cancelled_event(&self) -> ProgressEvent {
        ProgressEvent::failure(CANCELLED_STATUS)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamKey::ALL
            .iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("Unknown stream: {}", s))
    }
}

impl Group {
    pub fn as_str(&self) -> &'static str {
        match self {
            Group::Flashing => "flashing",
            Group::Actuator => "actuator",
            Group::Generic => "generic",
        }
    }

    /// Streams belonging to this group
    pub fn members(&self) -> impl Iterator<Item = StreamKey> + '_ {
        StreamKey::ALL.into_iter().filter(move |key| key.group() == *self)
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CancelScope {
    /// Streams a cancellation in this scope applies to
    pub fn streams(&self) -> Vec<StreamKey> {
        match self {
            CancelScope::Group(group) => group.members().collect(),
            CancelScope::Stream(key) => vec![*key],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flashing_group_membership() {
        let members: Vec<_> = Group::Flashing.members().collect();
        assert_eq!(
            members,
            vec![
                StreamKey::UpdateFlash,
                StreamKey::UpdateBoot,
                StreamKey::UpdateWriteVin,
                StreamKey::UpdateWritePc,
                StreamKey::UpdateWriteBin,
                StreamKey::EeDump,
                StreamKey::ReadBinData,
            ]
        );
        assert_eq!(Group::Actuator.members().collect::<Vec<_>>(), vec![StreamKey::Actuator]);
    }

    #[test]
    fn test_parse_round_trips_event_names() {
        for key in StreamKey::ALL {
            assert_eq!(key.as_str().parse::<StreamKey>().unwrap(), key);
        }
        assert_eq!("UPDATEFLASH".parse::<StreamKey>().unwrap(), StreamKey::UpdateFlash);
        assert!("dtcScan".parse::<StreamKey>().is_err());
    }

    #[test]
    fn test_serde_uses_event_names() {
        let json = serde_json::to_string(&StreamKey::UpdateWritePc).unwrap();
        assert_eq!(json, "\"updateWritePC\"");
    }

    #[test]
    fn test_cancel_scope() {
        assert_eq!(StreamKey::EeDump.cancel_scope(), CancelScope::Group(Group::Flashing));
        assert_eq!(StreamKey::Actuator.cancel_scope(), CancelScope::Stream(StreamKey::Actuator));
        assert_eq!(
            CancelScope::Stream(StreamKey::ReadParameters).streams(),
            vec![StreamKey::ReadParameters]
        );
        assert_eq!(CancelScope::Group(Group::Flashing).streams().len(), 7);
    }

    #[test]
    fn test_timeout_payloads() {
        let flash = StreamKey::UpdateFlash.timeout_event();
        assert_eq!((flash.main_progress, flash.sub_progress), (-1, -1));
        assert_eq!(flash.status, TIMEOUT_STATUS);

        let actuator = StreamKey::Actuator.timeout_event();
        assert!(actuator.is_failure());
        let parsed: serde_json::Value = serde_json::from_str(&actuator.status).unwrap();
        assert_eq!(parsed["message"], "Time out");
        assert_eq!(parsed["status"], false);
    }

    #[test]
    fn test_cancelled_payload() {
        let cancelled = StreamKey::UpdateFlash.cancelled_event();
        assert_eq!((cancelled.main_progress, cancelled.sub_progress), (-1, -1));
        assert_eq!(cancelled.status, CANCELLED_STATUS);
        assert!(cancelled.ends_operation());
    }

    #[test]
    fn test_only_flash_and_boot_read_ecu_timing() {
        let from_record: Vec<_> = StreamKey::ALL
            .into_iter()
            .filter(|key| key.config_source() == ConfigSource::EcuRecord)
            .collect();
        assert_eq!(from_record, vec![StreamKey::UpdateFlash, StreamKey::UpdateBoot]);
    }
}
