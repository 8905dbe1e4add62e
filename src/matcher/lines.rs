use serde::Serialize;

use crate::expect::{LineCheck, LineRule};
use crate::reception::ReceptionState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineOutcome {
    pub response_id: String,
    pub rule: String,
    pub passed: bool,
    /// Index into the received lines of the matched line
    pub matched_index: Option<usize>,
    pub matched_line: Option<String>,
    /// Lines passed over before the match (or ignored on purpose)
    pub skipped: Vec<String>,
    pub reason: Option<String>,
}

/// How collection ended, used to explain why an expected line is missing
#[derive(Debug, Clone, Copy)]
pub struct CollectionEnd<'a> {
    pub state: ReceptionState,
    pub stop_condition_line: Option<&'a str>,
}

impl CollectionEnd<'_> {
    fn missing_reason(&self) -> String {
        match (self.state, self.stop_condition_line) {
            (ReceptionState::TimedOut, _) => "not received before timeout".to_string(),
            (ReceptionState::StoppedByCondition, Some(stop)) => {
                format!("not received before stop condition '{}'", stop)
            }
            (ReceptionState::TransportFailed, _) => "not received before transport failure".to_string(),
            _ => "not found in received lines".to_string(),
        }
    }
}

/// Ordered, skip-tolerant matching of line rules against received lines.
#[derive(Debug, Clone, Copy)]
pub struct LineMatcher<'a> {
    rules: &'a [LineRule],
}

impl<'a> LineMatcher<'a> {
    pub fn new(rules: &'a [LineRule]) -> Self {
        Self { rules }
    }

    /// One outcome per rule, in rule order. The cursor only moves forward,
    /// so a rule can never match a line at or before an earlier match. A
    /// failed rule leaves the cursor where it was.
    pub fn evaluate(&self, lines: &[String], end: CollectionEnd<'_>) -> Vec<LineOutcome> {
        let mut cursor = 0usize;
        let mut outcomes = Vec::with_capacity(self.rules.len());

        for rule in self.rules {
            let outcome = match &rule.check {
                LineCheck::IgnoreLineCount(count) => {
                    let remaining = lines.len() - cursor;
                    if *count <= remaining {
                        let skipped = lines[cursor..cursor + count].to_vec();
                        cursor += count;
                        self.outcome(rule, true, None, skipped, None)
                    } else {
                        let skipped = lines[cursor..].to_vec();
                        cursor = lines.len();
                        let reason = format!(
                            "expected to ignore {} line(s) but only {} remained ({})",
                            count,
                            remaining,
                            end.missing_reason()
                        );
                        self.outcome(rule, false, None, skipped, Some(reason))
                    }
                }
                check => match lines[cursor..].iter().position(|line| check.matches(line)) {
                    Some(offset) => {
                        let index = cursor + offset;
                        let skipped = lines[cursor..index].to_vec();
                        cursor = index + 1;
                        self.outcome(rule, true, Some((index, &lines[index])), skipped, None)
                    }
                    None => {
                        let reason = format!(
                            "{} (searched {} line(s) from index {})",
                            end.missing_reason(),
                            lines.len() - cursor,
                            cursor
                        );
                        self.outcome(rule, false, None, Vec::new(), Some(reason))
                    }
                },
            };

            if outcome.passed {
                log::debug!("Line rule '{}' passed", rule.response_id);
            } else {
                log::info!(
                    "Line rule '{}' failed: {}",
                    rule.response_id,
                    outcome.reason.as_deref().unwrap_or_default()
                );
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    fn outcome(
        &self,
        rule: &LineRule,
        passed: bool,
        matched: Option<(usize, &String)>,
        skipped: Vec<String>,
        reason: Option<String>,
    ) -> LineOutcome {
        LineOutcome {
            response_id: rule.response_id.clone(),
            rule: rule.check.to_string(),
            passed,
            matched_index: matched.map(|(i, _)| i),
            matched_line: matched.map(|(_, line)| line.clone()),
            skipped,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(value: serde_json::Value) -> Vec<LineRule> {
        value
            .as_array()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, v)| LineRule::from_value(v, i).unwrap())
            .collect()
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    const ENDED: CollectionEnd<'static> = CollectionEnd {
        state: ReceptionState::Complete,
        stop_condition_line: None,
    };

    #[test]
    fn skips_noise_between_matches() {
        let rules = rules(json!([
            {"response_id": "boot", "type": "exact_line", "value": "BOOT"},
            {"response_id": "temp", "type": "regex_match", "pattern": "^T=\\d+$"}
        ]));
        let received = lines(&["noise", "BOOT", "dbg: x", "T=21"]);

        let outcomes = LineMatcher::new(&rules).evaluate(&received, ENDED);

        assert!(outcomes.iter().all(|o| o.passed));
        assert_eq!(outcomes[0].skipped, ["noise"]);
        assert_eq!(outcomes[1].matched_index, Some(3));
        assert_eq!(outcomes[1].skipped, ["dbg: x"]);
    }

    #[test]
    fn no_backtracking_to_earlier_lines() {
        let rules = rules(json!([
            {"response_id": "b", "type": "exact_line", "value": "B"},
            {"response_id": "a", "type": "exact_line", "value": "A"}
        ]));
        let outcomes = LineMatcher::new(&rules).evaluate(&lines(&["A", "B"]), ENDED);

        assert!(outcomes[0].passed);
        assert!(!outcomes[1].passed);
    }

    #[test]
    fn ignore_zero_is_a_no_op() {
        let rules = rules(json!([
            {"response_id": "skip", "type": "ignore_line_count", "count": 0},
            {"response_id": "a", "type": "exact_line", "value": "A"}
        ]));
        let outcomes = LineMatcher::new(&rules).evaluate(&lines(&["A"]), ENDED);

        assert!(outcomes[0].passed);
        assert!(outcomes[0].skipped.is_empty());
        assert_eq!(outcomes[1].matched_index, Some(0));
    }

    #[test]
    fn ignore_is_unconditional_even_over_matching_lines() {
        let rules = rules(json!([
            {"response_id": "skip", "type": "ignore_line_count", "count": 1},
            {"response_id": "a", "type": "contains_string", "value": "A"}
        ]));
        let outcomes = LineMatcher::new(&rules).evaluate(&lines(&["A1", "A2"]), ENDED);

        assert_eq!(outcomes[1].matched_line.as_deref(), Some("A2"));
    }

    #[test]
    fn ignore_overshoot_reports_shortfall() {
        let rules = rules(json!([
            {"response_id": "skip", "type": "ignore_line_count", "count": 5},
            {"response_id": "a", "type": "exact_line", "value": "A"}
        ]));
        let outcomes = LineMatcher::new(&rules).evaluate(&lines(&["x", "A"]), ENDED);

        assert!(!outcomes[0].passed);
        assert!(outcomes[0].reason.as_deref().unwrap().contains("only 2 remained"));
        assert!(!outcomes[1].passed);
    }

    #[test]
    fn failed_rule_keeps_cursor_for_later_rules() {
        let rules = rules(json!([
            {"response_id": "missing", "type": "exact_line", "value": "NOPE"},
            {"response_id": "b", "type": "exact_line", "value": "B"}
        ]));
        let outcomes = LineMatcher::new(&rules).evaluate(&lines(&["A", "B"]), ENDED);

        assert!(!outcomes[0].passed);
        assert!(outcomes[1].passed);
    }

    #[test]
    fn reason_names_how_collection_ended() {
        let rules = rules(json!([{"response_id": "x", "type": "exact_line", "value": "X"}]));
        let matcher = LineMatcher::new(&rules);

        let timed_out = CollectionEnd { state: ReceptionState::TimedOut, stop_condition_line: None };
        let reason = matcher.evaluate(&[], timed_out)[0].reason.clone().unwrap();
        assert!(reason.starts_with("not received before timeout"), "{reason}");

        let stopped = CollectionEnd { state: ReceptionState::StoppedByCondition, stop_condition_line: Some("DONE") };
        let reason = matcher.evaluate(&[], stopped)[0].reason.clone().unwrap();
        assert!(reason.starts_with("not received before stop condition 'DONE'"), "{reason}");
    }

    #[test]
    fn evaluation_is_deterministic() {
        let rules = rules(json!([
            {"response_id": "a", "type": "contains_string", "value": "a"},
            {"response_id": "skip", "type": "ignore_line_count", "count": 1},
            {"response_id": "c", "type": "regex_match", "pattern": "c$"}
        ]));
        let received = lines(&["xa", "ya", "b", "abc", "zzc"]);
        let matcher = LineMatcher::new(&rules);

        assert_eq!(matcher.evaluate(&received, ENDED), matcher.evaluate(&received, ENDED));
    }
}
