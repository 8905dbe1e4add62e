use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::{ConfigError, LineCheck, LineRule, Result, SchemaNode};
use crate::reception::{CollectionSpec, ReceptionMode};

pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub enum ExpectedResponses {
    Lines(Vec<LineRule>),
    Json(SchemaNode),
}

/// Root of an expected-values file.
#[derive(Debug, Clone)]
pub struct ExpectationDocument {
    pub reception_mode: ReceptionMode,
    pub response_timeout: Duration,
    pub stop_condition_line: Option<String>,
    pub expected: ExpectedResponses,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    reception_mode: ReceptionMode,
    #[serde(default = "default_timeout_ms")]
    response_timeout_ms: u64,
    #[serde(default)]
    stop_condition_line: Option<String>,
    #[serde(default)]
    expected_responses: Option<Value>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_MS
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
        Value::String(_) => "a string",
        Value::Number(_) => "a number",
        Value::Bool(_) => "a boolean",
        Value::Null => "null",
    }
}

impl ExpectationDocument {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let raw: RawDocument = serde_json::from_value(value.clone())?;
        let mode = raw.reception_mode;

        let expected = match (mode, raw.expected_responses) {
            (ReceptionMode::Lines, None) => ExpectedResponses::Lines(Vec::new()),
            (ReceptionMode::Lines, Some(Value::Array(items))) => ExpectedResponses::Lines(parse_line_rules(&items)?),
            (ReceptionMode::JsonObject, None) => ExpectedResponses::Json(SchemaNode::Object {
                fields: Vec::new(),
                optional: false,
            }),
            (ReceptionMode::JsonObject, Some(node @ Value::Object(_))) => match SchemaNode::parse(&node)? {
                // Collection only ever yields an object
                SchemaNode::ArrayContainsAll(_) | SchemaNode::ArrayEachOrdered(_) => {
                    return Err(ConfigError::ModeShapeMismatch {
                        mode: mode.name(),
                        required: "an object schema",
                        found: "an array directive",
                    })
                }
                root => ExpectedResponses::Json(root),
            },
            (mode, Some(other)) => {
                return Err(ConfigError::ModeShapeMismatch {
                    mode: mode.name(),
                    required: match mode {
                        ReceptionMode::Lines => "an array of line rules",
                        ReceptionMode::JsonObject => "an object schema",
                    },
                    found: shape_name(&other),
                })
            }
        };

        if mode == ReceptionMode::JsonObject && raw.stop_condition_line.is_some() {
            log::warn!("stop_condition_line is ignored in json_object mode");
        }

        Ok(Self {
            reception_mode: mode,
            response_timeout: Duration::from_millis(raw.response_timeout_ms),
            stop_condition_line: raw.stop_condition_line,
            expected,
        })
    }

    /// A stop line is handed to the matcher only when a rule asks for it by
    /// exact value.
    pub fn expects_stop_line(&self) -> bool {
        match (&self.expected, &self.stop_condition_line) {
            (ExpectedResponses::Lines(rules), Some(stop)) => rules
                .iter()
                .any(|rule| matches!(&rule.check, LineCheck::ExactLine(value) if value == stop)),
            _ => false,
        }
    }

    /// How the reception controller should collect for this document
    pub fn collection_spec(&self) -> CollectionSpec {
        let stop_condition_line = match self.reception_mode {
            ReceptionMode::Lines => self.stop_condition_line.clone(),
            ReceptionMode::JsonObject => None,
        };
        CollectionSpec {
            mode: self.reception_mode,
            timeout: self.response_timeout,
            stop_condition_line,
            retain_stop_line: self.expects_stop_line(),
        }
    }
}

fn parse_line_rules(items: &[Value]) -> Result<Vec<LineRule>> {
    // id -> (rule index, whether the id was generated)
    let mut seen: HashMap<String, (usize, bool)> = HashMap::new();
    let mut rules = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let rule = LineRule::from_value(item, index)?;
        let generated = item.get("response_id").map_or(true, Value::is_null);
        if let Some(&(first, first_generated)) = seen.get(&rule.response_id) {
            return Err(match (first_generated, generated) {
                (false, false) => ConfigError::DuplicateResponseId(rule.response_id),
                (true, _) => generated_clash(rule.response_id, first),
                (false, true) => generated_clash(rule.response_id, index),
            });
        }
        seen.insert(rule.response_id.clone(), (index, generated));
        rules.push(rule);
    }
    Ok(rules)
}

fn generated_clash(response_id: String, index: usize) -> ConfigError {
    ConfigError::InvalidLineRule {
        message: format!(
            "rule {} has no response_id and its default id '{}' is also used explicitly; give it its own response_id",
            index, response_id
        ),
        response_id,
    }
}
