use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::{ConfigError, Result};

/// Heads that look like an operator (`NAME:`). Strings with such a head must
/// name a known operator, anything else is a plain literal.
static OPERATOR_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z_]*$").expect("operator head pattern is valid"));

const TAG_CONTAINS_ALL: &str = "array_contains_all";
const TAG_EACH_ORDERED: &str = "array_each_matches_ordered";
const TAG_ALL_OF: &str = "all_of";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
            Value::Null => Self::Null,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn from_head(head: &str) -> Option<Self> {
        match head {
            "VALUE_GT" => Some(Self::Gt),
            "VALUE_GTE" => Some(Self::Gte),
            "VALUE_LT" => Some(Self::Lt),
            "VALUE_LTE" => Some(Self::Lte),
            _ => None,
        }
    }

    pub fn head(self) -> &'static str {
        match self {
            Self::Gt => "VALUE_GT",
            Self::Gte => "VALUE_GTE",
            Self::Lt => "VALUE_LT",
            Self::Lte => "VALUE_LTE",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    pub fn holds(self, value: f64, bound: f64) -> bool {
        match self {
            Self::Gt => value > bound,
            Self::Gte => value >= bound,
            Self::Lt => value < bound,
            Self::Lte => value <= bound,
        }
    }
}

/// One node of an expectation tree, parsed from its JSON form.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    /// Exact deep equality
    Literal(Value),
    Any,
    AnyOrMissing,
    TypeIs(JsonKind),
    Regex(Regex),
    Compare { op: CompareOp, bound: f64 },
    Contains(String),
    Not(Value),
    LengthEquals(usize),
    Choice(Vec<Value>),
    /// Plain array: same length, element-wise in order
    ArrayExact(Vec<SchemaNode>),
    /// Several constraints on the same value, all must hold
    AllOf(Vec<SchemaNode>),
    ArrayContainsAll(Vec<Value>),
    ArrayEachOrdered(Vec<SchemaNode>),
    /// Required-subset mapping. `optional` lets the whole key be absent.
    Object { fields: Vec<(String, SchemaNode)>, optional: bool },
}

impl SchemaNode {
    /// Parse a schema rooted at `root`
    pub fn parse(value: &Value) -> Result<Self> {
        Self::parse_at(value, "root")
    }

    pub fn parse_at(value: &Value, path: &str) -> Result<Self> {
        match value {
            Value::String(text) => parse_predicate(text, path),
            Value::Array(items) => Ok(Self::ArrayExact(parse_items(items, path)?)),
            Value::Object(map) => parse_object(map, path),
            other => Ok(Self::Literal(other.clone())),
        }
    }

    /// True for nodes that only make sense against a present value
    pub fn allows_missing(&self) -> bool {
        matches!(self, Self::AnyOrMissing | Self::Object { optional: true, .. })
    }
}

fn parse_items(items: &[Value], path: &str) -> Result<Vec<SchemaNode>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| SchemaNode::parse_at(item, &format!("{}[{}]", path, i)))
        .collect()
}

fn parse_object(map: &Map<String, Value>, path: &str) -> Result<SchemaNode> {
    if map.len() == 1 {
        if let Some(literal) = map.get("$literal") {
            return Ok(SchemaNode::Literal(literal.clone()));
        }
    }

    if let Some(Value::String(tag)) = map.get("type") {
        match tag.as_str() {
            TAG_CONTAINS_ALL if map.contains_key("values") => {
                let values = directive_array(map, "values", path)?;
                return Ok(SchemaNode::ArrayContainsAll(values.to_vec()));
            }
            TAG_EACH_ORDERED if map.contains_key("schemas") => {
                let schemas = directive_array(map, "schemas", path)?;
                return Ok(SchemaNode::ArrayEachOrdered(parse_items(schemas, path)?));
            }
            TAG_ALL_OF if map.contains_key("schemas") => {
                let schemas = directive_array(map, "schemas", path)?;
                if schemas.is_empty() {
                    return Err(invalid(path, "all_of needs at least one schema"));
                }
                return Ok(SchemaNode::AllOf(parse_items(schemas, path)?));
            }
            // An ordinary "type" field of the expected object
            _ => {}
        }
    }

    let optional = match map.get("$optional") {
        None => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(invalid(path, "$optional must be a boolean")),
    };

    let mut fields = Vec::with_capacity(map.len());
    for (key, value) in map {
        if key == "$optional" || key == "$comment" {
            continue;
        }
        let child = SchemaNode::parse_at(value, &format!("{}.{}", path, key))?;
        fields.push((key.clone(), child));
    }
    Ok(SchemaNode::Object { fields, optional })
}

fn directive_array<'a>(map: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a Vec<Value>> {
    match map.get(key) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(invalid(path, &format!("'{}' must be an array", key))),
    }
}

fn parse_predicate(text: &str, path: &str) -> Result<SchemaNode> {
    match text {
        "ANY" => return Ok(SchemaNode::Any),
        "ANY_OR_MISSING" => return Ok(SchemaNode::AnyOrMissing),
        _ => {}
    }

    let Some((head, arg)) = text.split_once(':') else {
        return Ok(SchemaNode::Literal(Value::String(text.to_string())));
    };
    if !OPERATOR_HEAD.is_match(head) {
        return Ok(SchemaNode::Literal(Value::String(text.to_string())));
    }

    if let Some(op) = CompareOp::from_head(head) {
        let bound: f64 = arg
            .trim()
            .parse()
            .map_err(|_| invalid(path, &format!("{} needs a number, got '{}'", head, arg)))?;
        if !bound.is_finite() {
            return Err(invalid(path, &format!("{} bound must be finite", head)));
        }
        return Ok(SchemaNode::Compare { op, bound });
    }

    match head {
        "TYPE" => JsonKind::from_name(arg.trim())
            .map(SchemaNode::TypeIs)
            .ok_or_else(|| invalid(path, &format!("unknown type '{}'", arg))),
        "REGEX" => Regex::new(arg)
            .map(SchemaNode::Regex)
            .map_err(|source| ConfigError::InvalidRegex { path: path.to_string(), source }),
        "CONTAINS" => Ok(SchemaNode::Contains(arg.to_string())),
        "NOT" => Ok(SchemaNode::Not(parse_literal(arg))),
        "LENGTH" => arg
            .trim()
            .parse()
            .map(SchemaNode::LengthEquals)
            .map_err(|_| invalid(path, &format!("LENGTH needs a non-negative integer, got '{}'", arg))),
        "CHOICE" => parse_choice(arg, path).map(SchemaNode::Choice),
        _ => Err(ConfigError::UnknownPredicate {
            path: path.to_string(),
            prefix: head.to_string(),
        }),
    }
}

/// Operator arguments use the same textual form as a literal leaf: JSON
/// when it parses, otherwise a bare string.
fn parse_literal(text: &str) -> Value {
    serde_json::from_str(text.trim()).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn parse_choice(arg: &str, path: &str) -> Result<Vec<Value>> {
    let trimmed = arg.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| invalid(path, "CHOICE needs a bracketed list, e.g. CHOICE:[1,2]"))?;

    let choices = match serde_json::from_str::<Vec<Value>>(trimmed) {
        Ok(values) => values,
        // Lenient form seen in hand-written documents: ['C','F']
        Err(_) => inner
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| match unquote(item) {
                Some(s) => Value::String(s.to_string()),
                None => parse_literal(item),
            })
            .collect(),
    };

    if choices.is_empty() {
        return Err(invalid(path, "CHOICE list is empty"));
    }
    Ok(choices)
}

fn unquote(item: &str) -> Option<&str> {
    ['\'', '"'].iter().find_map(|q| item.strip_prefix(*q).and_then(|s| s.strip_suffix(*q)))
}

fn invalid(path: &str, message: &str) -> ConfigError {
    ConfigError::InvalidPredicate {
        path: path.to_string(),
        message: message.to_string(),
    }
}

impl fmt::Display for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{}", value),
            Self::Any => write!(f, "ANY"),
            Self::AnyOrMissing => write!(f, "ANY_OR_MISSING"),
            Self::TypeIs(kind) => write!(f, "TYPE:{}", kind.name()),
            Self::Regex(re) => write!(f, "REGEX:{}", re.as_str()),
            Self::Compare { op, bound } => write!(f, "{}:{}", op.head(), bound),
            Self::Contains(needle) => write!(f, "CONTAINS:{}", needle),
            Self::Not(value) => write!(f, "NOT:{}", value),
            Self::LengthEquals(n) => write!(f, "LENGTH:{}", n),
            Self::Choice(values) => write!(f, "CHOICE:{}", Value::Array(values.clone())),
            Self::ArrayExact(items) => write!(f, "array of {} element(s)", items.len()),
            Self::AllOf(nodes) => {
                let parts: Vec<String> = nodes.iter().map(ToString::to_string).collect();
                write!(f, "all of [{}]", parts.join(", "))
            }
            Self::ArrayContainsAll(values) => {
                write!(f, "array containing all of {}", Value::Array(values.clone()))
            }
            Self::ArrayEachOrdered(schemas) => {
                write!(f, "array of {} element(s) matching in order", schemas.len())
            }
            Self::Object { fields, .. } => write!(f, "object with {} required key(s)", fields.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> SchemaNode {
        SchemaNode::parse(&value).unwrap()
    }

    #[test]
    fn operators_are_parsed_once() {
        assert!(matches!(parse(json!("ANY")), SchemaNode::Any));
        assert!(matches!(parse(json!("TYPE:number")), SchemaNode::TypeIs(JsonKind::Number)));
        assert!(matches!(
            parse(json!("VALUE_GTE:-2.5")),
            SchemaNode::Compare { op: CompareOp::Gte, bound } if bound == -2.5
        ));
        assert!(matches!(parse(json!("LENGTH:3")), SchemaNode::LengthEquals(3)));
        assert!(matches!(parse(json!("CONTAINS:ok")), SchemaNode::Contains(s) if s == "ok"));
    }

    #[test]
    fn lowercase_or_spaced_heads_are_literals() {
        assert!(matches!(parse(json!("Temp: 25")), SchemaNode::Literal(_)));
        assert!(matches!(parse(json!("url:http")), SchemaNode::Literal(_)));
        assert!(matches!(parse(json!("plain")), SchemaNode::Literal(_)));
    }

    #[test]
    fn unknown_operator_is_a_config_error() {
        let err = SchemaNode::parse(&json!({"a": {"b": "STARTS_WITH:x"}})).unwrap_err();
        match err {
            ConfigError::UnknownPredicate { path, prefix } => {
                assert_eq!(path, "root.a.b");
                assert_eq!(prefix, "STARTS_WITH");
            }
            other => panic!("wrong error: {other}"),
        }
    }

    #[test]
    fn bad_arguments_are_rejected() {
        assert!(SchemaNode::parse(&json!("VALUE_GT:abc")).is_err());
        assert!(SchemaNode::parse(&json!("LENGTH:-1")).is_err());
        assert!(SchemaNode::parse(&json!("TYPE:integer")).is_err());
        assert!(matches!(
            SchemaNode::parse(&json!("REGEX:(unclosed")),
            Err(ConfigError::InvalidRegex { .. })
        ));
        assert!(SchemaNode::parse(&json!("CHOICE:1,2")).is_err());
    }

    #[test]
    fn not_argument_uses_literal_form() {
        assert!(matches!(parse(json!("NOT:0")), SchemaNode::Not(v) if v == json!(0)));
        assert!(matches!(parse(json!("NOT:error")), SchemaNode::Not(v) if v == json!("error")));
        assert!(matches!(parse(json!("NOT:\"0\"")), SchemaNode::Not(v) if v == json!("0")));
    }

    #[test]
    fn choice_accepts_json_and_quoted_lists() {
        assert!(matches!(parse(json!("CHOICE:[1, 2, 3]")), SchemaNode::Choice(v) if v == vec![json!(1), json!(2), json!(3)]));
        assert!(matches!(parse(json!("CHOICE:['C','F']")), SchemaNode::Choice(v) if v == vec![json!("C"), json!("F")]));
        assert!(matches!(parse(json!("CHOICE:[\"on\", off]")), SchemaNode::Choice(v) if v == vec![json!("on"), json!("off")]));
    }

    #[test]
    fn tagged_directives_and_plain_type_fields() {
        assert!(matches!(
            parse(json!({"type": "array_contains_all", "values": ["A", "B"]})),
            SchemaNode::ArrayContainsAll(v) if v.len() == 2
        ));
        assert!(matches!(
            parse(json!({"type": "array_each_matches_ordered", "schemas": ["TYPE:number"]})),
            SchemaNode::ArrayEachOrdered(v) if v.len() == 1
        ));
        assert!(matches!(
            parse(json!({"type": "all_of", "schemas": ["TYPE:array", "LENGTH:2"]})),
            SchemaNode::AllOf(v) if v.len() == 2
        ));
        // "type" that is just a field of the reported object
        assert!(matches!(
            parse(json!({"type": "sensor", "id": 3})),
            SchemaNode::Object { fields, optional: false } if fields.len() == 2
        ));
    }

    #[test]
    fn optional_marker_and_literal_escape() {
        assert!(matches!(
            parse(json!({"$optional": true, "$comment": "fw >= 1.2", "rev": "ANY"})),
            SchemaNode::Object { fields, optional: true } if fields.len() == 1
        ));
        assert!(matches!(
            parse(json!({"$literal": "STATUS:OK"})),
            SchemaNode::Literal(v) if v == json!("STATUS:OK")
        ));
    }

    #[test]
    fn display_round_trips_operator_text() {
        assert_eq!(parse(json!("VALUE_LT:10")).to_string(), "VALUE_LT:10");
        assert_eq!(parse(json!("REGEX:^v\\d+")).to_string(), "REGEX:^v\\d+");
        assert_eq!(parse(json!(true)).to_string(), "true");
    }
}
