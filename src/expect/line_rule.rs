use std::fmt;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{ConfigError, Result};

/// What a single expected line has to look like.
#[derive(Debug, Clone)]
pub enum LineCheck {
    ExactLine(String),
    ContainsString(String),
    RegexMatch(Regex),
    IgnoreLineCount(usize),
}

impl LineCheck {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExactLine(_) => "exact_line",
            Self::ContainsString(_) => "contains_string",
            Self::RegexMatch(_) => "regex_match",
            Self::IgnoreLineCount(_) => "ignore_line_count",
        }
    }

    /// Whether `line` satisfies this check. `ignore_line_count` never
    /// matches a line, it only moves the cursor.
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Self::ExactLine(value) => line == value,
            Self::ContainsString(value) => line.contains(value.as_str()),
            Self::RegexMatch(re) => re.is_match(line),
            Self::IgnoreLineCount(_) => false,
        }
    }
}

impl fmt::Display for LineCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactLine(value) => write!(f, "exact_line '{}'", value),
            Self::ContainsString(value) => write!(f, "contains_string '{}'", value),
            Self::RegexMatch(re) => write!(f, "regex_match /{}/", re.as_str()),
            Self::IgnoreLineCount(count) => write!(f, "ignore_line_count {}", count),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineRule {
    pub response_id: String,
    pub check: LineCheck,
}

#[derive(Debug, Deserialize)]
struct RawLineRule {
    response_id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<Value>,
    pattern: Option<String>,
    count: Option<Value>,
}

impl LineRule {
    /// Build rule number `index` from its JSON form
    pub fn from_value(value: &Value, index: usize) -> Result<Self> {
        let raw: RawLineRule = serde_json::from_value(value.clone())?;
        let response_id = raw.response_id.clone().unwrap_or_else(|| format!("exp_line_{}", index));
        let fail = |message: String| ConfigError::InvalidLineRule {
            response_id: response_id.clone(),
            message,
        };

        let kind = raw.kind.as_deref().ok_or_else(|| fail("missing 'type'".into()))?;
        let check = match kind {
            "exact_line" | "contains_string" => {
                let text = match raw.value {
                    Some(Value::String(s)) => s,
                    Some(_) => return Err(fail("'value' must be a string".into())),
                    None => return Err(fail(format!("{} needs a 'value'", kind))),
                };
                if kind == "exact_line" {
                    LineCheck::ExactLine(text)
                } else {
                    LineCheck::ContainsString(text)
                }
            }
            "regex_match" => {
                let pattern = raw.pattern.ok_or_else(|| fail("regex_match needs a 'pattern'".into()))?;
                let re = Regex::new(&pattern).map_err(|source| ConfigError::InvalidRegex {
                    path: response_id.clone(),
                    source,
                })?;
                LineCheck::RegexMatch(re)
            }
            "ignore_line_count" => {
                let count = raw
                    .count
                    .as_ref()
                    .and_then(Value::as_u64)
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| fail("ignore_line_count needs a non-negative integer 'count'".into()))?;
                LineCheck::IgnoreLineCount(count)
            }
            other => return Err(fail(format!("unknown rule type '{}'", other))),
        };

        Ok(Self { response_id, check })
    }
}
