//! Turns a [`Collection`] and an [`ExpectationDocument`] into a verdict.
//!
//! Matching is pure and deterministic: the same inputs always give the same
//! outcomes, whatever the serial timing was.
pub mod lines;
pub mod predicate;
pub mod report;
pub mod schema;

pub use lines::{CollectionEnd, LineMatcher, LineOutcome};
pub use report::{Findings, MatchReport, ReceptionSummary};
pub use schema::{match_value, FieldFailure};

use crate::expect::{ExpectationDocument, ExpectedResponses, SchemaNode};
use crate::reception::{Collection, ReceptionState};

/// Evaluate everything collected for one test case.
pub fn evaluate(document: &ExpectationDocument, collection: &Collection) -> MatchReport {
    let summary = ReceptionSummary::from(collection);

    let findings = match &document.expected {
        ExpectedResponses::Lines(rules) => {
            let end = CollectionEnd {
                state: collection.state,
                stop_condition_line: collection.stop_condition_line.as_deref(),
            };
            let received = collection.lines().to_vec();
            let outcomes = LineMatcher::new(rules).evaluate(&received, end);
            Findings::Lines { received, outcomes }
        }
        ExpectedResponses::Json(schema) => match collection.json() {
            Some(value) => Findings::JsonObject {
                received: Some(value.clone()),
                failures: match_value(schema, value),
            },
            None => Findings::JsonObject {
                received: None,
                failures: vec![no_object_failure(schema, collection)],
            },
        },
    };

    let report = MatchReport::new(document.reception_mode, summary, findings);
    log::info!(
        "Test case {} {} with {} failure(s)",
        report.run_id,
        if report.passed { "passed" } else { "failed" },
        report.failure_count()
    );
    report
}

fn no_object_failure(schema: &SchemaNode, collection: &Collection) -> FieldFailure {
    let before = match collection.state {
        ReceptionState::TransportFailed => "transport failure",
        _ => "timeout",
    };
    let discarded = collection.metrics.discarded_json_candidates;
    let reason = if discarded > 0 {
        format!(
            "invalid JSON received ({} malformed candidate(s) discarded); no complete JSON object received before {}",
            discarded, before
        )
    } else {
        format!("no complete JSON object received before {}", before)
    };
    FieldFailure {
        path: "root".to_string(),
        expected: schema.to_string(),
        actual: collection.raw_tail.clone(),
        reason,
    }
}
