//! Reception controller types
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceptionMode {
    #[default]
    Lines,
    JsonObject,
}

impl ReceptionMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Lines => "lines",
            Self::JsonObject => "json_object",
        }
    }
}

/// Collection state machine. The last four are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceptionState {
    Waiting,
    Accumulating,
    StoppedByCondition,
    TimedOut,
    Complete,
    TransportFailed,
}

impl ReceptionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::StoppedByCondition | Self::TimedOut | Self::Complete | Self::TransportFailed
        )
    }
}

/// Per-run collection parameters derived from the expectation document
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub mode: ReceptionMode,
    pub timeout: Duration,
    pub stop_condition_line: Option<String>,
    /// Hand the stop line itself to the matcher as the last line
    pub retain_stop_line: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReceivedData {
    Lines(Vec<String>),
    /// `None` when no complete object arrived
    Json(Option<Value>),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceptionMetrics {
    pub polls: u64,
    pub bytes_read: u64,
    pub lines_read: u64,
    pub utf8_decode_errors: u64,
    pub partial_buffer_trims: u64,
    pub discarded_json_candidates: u64,
}

/// Everything the controller gathered for one test case
#[derive(Debug, Clone)]
pub struct Collection {
    pub data: ReceivedData,
    pub state: ReceptionState,
    pub elapsed: Duration,
    pub stop_condition_line: Option<String>,
    pub transport_error: Option<String>,
    /// Undelivered bytes at the end of collection, for diagnostics
    pub raw_tail: String,
    pub metrics: ReceptionMetrics,
}

impl Collection {
    pub fn lines(&self) -> &[String] {
        match &self.data {
            ReceivedData::Lines(lines) => lines,
            ReceivedData::Json(_) => &[],
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.data {
            ReceivedData::Json(value) => value.as_ref(),
            ReceivedData::Lines(_) => None,
        }
    }
}
