//! Progress samples reported by the diagnostic engine

use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress value that ends an operation successfully
pub const PROGRESS_SUCCESS: i32 = 100;

/// Progress value that ends an operation with a failure or abort
pub const PROGRESS_ABORT: i32 = -1;

/// One progress sample
///
/// Values run 0-100; `-1` in either field is the failure sentinel and `100`
/// the success sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "mainProgress")]
    pub main_progress: i32,

    #[serde(rename = "subProgress")]
    pub sub_progress: i32,

    pub status: String,
}

impl ProgressEvent {
    pub fn new(main_progress: i32, sub_progress: i32, status: impl Into<String>) -> Self {
        Self {
            main_progress,
            sub_progress,
            status: status.into(),
        }
    }

    /// Failure event carrying the given status text
    pub fn failure(status: impl Into<String>) -> Self {
        Self::new(PROGRESS_ABORT, PROGRESS_ABORT, status)
    }

    /// Any sentinel present: the sample bypasses the frame throttle
    pub fn is_terminal(&self) -> bool {
        is_sentinel(self.main_progress) || is_sentinel(self.sub_progress)
    }

    /// Main or sub progress reports an abort
    pub fn is_failure(&self) -> bool {
        self.main_progress == PROGRESS_ABORT || self.sub_progress == PROGRESS_ABORT
    }

    /// Main progress reached 100 without an abort
    ///
    /// A sub progress of 100 only closes a block, not the operation.
    pub fn is_complete(&self) -> bool {
        self.main_progress == PROGRESS_SUCCESS && !self.is_failure()
    }

    /// Whether the operation ends with this sample
    pub fn ends_operation(&self) -> bool {
        self.is_failure() || self.is_complete()
    }

    /// Compare the progress pair, ignoring status text
    pub fn same_progress(&self, other: &ProgressEvent) -> bool {
        self.main_progress == other.main_progress && self.sub_progress == other.sub_progress
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{},{:?}}}", self.main_progress, self.sub_progress, self.status)
    }
}

fn is_sentinel(value: i32) -> bool {
    value == PROGRESS_SUCCESS || value == PROGRESS_ABORT
}
