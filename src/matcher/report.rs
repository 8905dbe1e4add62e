use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::lines::LineOutcome;
use super::schema::FieldFailure;
use crate::reception::{Collection, ReceptionMetrics, ReceptionMode, ReceptionState};

/// How collection went, independent of the verdict
#[derive(Debug, Clone, Serialize)]
pub struct ReceptionSummary {
    pub state: ReceptionState,
    pub elapsed_ms: u64,
    pub lines_received: usize,
    pub stop_condition_line: Option<String>,
    pub transport_error: Option<String>,
    pub raw_tail: String,
    pub metrics: ReceptionMetrics,
}

impl From<&Collection> for ReceptionSummary {
    fn from(collection: &Collection) -> Self {
        Self {
            state: collection.state,
            elapsed_ms: collection.elapsed.as_millis() as u64,
            lines_received: collection.lines().len(),
            stop_condition_line: collection.stop_condition_line.clone(),
            transport_error: collection.transport_error.clone(),
            raw_tail: collection.raw_tail.clone(),
            metrics: collection.metrics.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Findings {
    Lines {
        received: Vec<String>,
        outcomes: Vec<LineOutcome>,
    },
    JsonObject {
        received: Option<Value>,
        failures: Vec<FieldFailure>,
    },
}

/// Verdict for one test case plus everything needed to explain it.
#[derive(Debug, Clone, Serialize)]
pub struct MatchReport {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub mode: ReceptionMode,
    pub passed: bool,
    pub reception: ReceptionSummary,
    pub findings: Findings,
}

impl MatchReport {
    pub(crate) fn new(mode: ReceptionMode, reception: ReceptionSummary, findings: Findings) -> Self {
        let checks_passed = match &findings {
            Findings::Lines { outcomes, .. } => outcomes.iter().all(|o| o.passed),
            Findings::JsonObject { received, failures } => received.is_some() && failures.is_empty(),
        };
        let passed = checks_passed && reception.transport_error.is_none();

        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            mode,
            passed,
            reception,
            findings,
        }
    }

    /// Overall verdict
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Failed line rules or failing schema paths
    pub fn failure_count(&self) -> usize {
        match &self.findings {
            Findings::Lines { outcomes, .. } => outcomes.iter().filter(|o| !o.passed).count(),
            Findings::JsonObject { failures, .. } => failures.len(),
        }
    }

    /// Per-rule outcomes, empty in json_object mode
    pub fn line_outcomes(&self) -> &[LineOutcome] {
        match &self.findings {
            Findings::Lines { outcomes, .. } => outcomes,
            Findings::JsonObject { .. } => &[],
        }
    }

    /// Failing schema paths, empty in lines mode
    pub fn field_failures(&self) -> &[FieldFailure] {
        match &self.findings {
            Findings::JsonObject { failures, .. } => failures,
            Findings::Lines { .. } => &[],
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for MatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} [{}] {} after {} ms ({:?})",
            if self.passed { "PASS" } else { "FAIL" },
            self.mode.name(),
            self.run_id,
            self.reception.elapsed_ms,
            self.reception.state
        )?;
        if let Some(err) = &self.reception.transport_error {
            writeln!(f, "  transport error: {}", err)?;
        }

        match &self.findings {
            Findings::Lines { outcomes, .. } => {
                for outcome in outcomes {
                    match (&outcome.reason, outcome.matched_index) {
                        (None, Some(index)) => writeln!(
                            f,
                            "  ok   {}: {} matched line {}",
                            outcome.response_id, outcome.rule, index
                        )?,
                        (None, None) => writeln!(f, "  ok   {}: {}", outcome.response_id, outcome.rule)?,
                        (Some(reason), _) => writeln!(
                            f,
                            "  FAIL {}: {}: {}",
                            outcome.response_id, outcome.rule, reason
                        )?,
                    }
                }
            }
            Findings::JsonObject { failures, .. } => {
                for failure in failures {
                    writeln!(
                        f,
                        "  FAIL {}: expected {}, got {}: {}",
                        failure.path, failure.expected, failure.actual, failure.reason
                    )?;
                }
            }
        }
        Ok(())
    }
}
