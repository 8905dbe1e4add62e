//! Leaf evaluation: one expected node against one received value.
use serde_json::Value;

use crate::expect::{JsonKind, SchemaNode};

/// Structural equality with numbers compared by value, so `1` equals `1.0`.
/// No coercion between types: `"1"` never equals `1`, `true` never equals `1`.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(i), Some(j)) => i == j,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(key, x)| ym.get(key).is_some_and(|y| deep_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Evaluate a leaf node or value-level directive. `Err` carries the reason.
///
/// Structural nodes (mappings, arrays walked element-wise, `all_of`) are
/// walked by the schema matcher and never reach this function.
pub fn evaluate(node: &SchemaNode, received: &Value) -> Result<(), String> {
    match node {
        SchemaNode::Literal(expected) => {
            if deep_equal(expected, received) {
                Ok(())
            } else {
                Err("value mismatch".into())
            }
        }
        SchemaNode::Any | SchemaNode::AnyOrMissing => Ok(()),
        SchemaNode::TypeIs(kind) => {
            let actual = JsonKind::of(received);
            if actual == *kind {
                Ok(())
            } else {
                Err(format!("type mismatch: expected {}, got {}", kind.name(), actual.name()))
            }
        }
        SchemaNode::Regex(re) => match received {
            Value::String(text) if re.is_match(text) => Ok(()),
            Value::String(_) => Err(format!("does not match /{}/", re.as_str())),
            other => Err(not_a("string", other)),
        },
        SchemaNode::Compare { op, bound } => match received {
            Value::Number(n) => {
                let value = n.as_f64().unwrap_or(f64::NAN);
                if op.holds(value, *bound) {
                    Ok(())
                } else {
                    Err(format!("{} is not {} {}", n, op.symbol(), bound))
                }
            }
            other => Err(not_a("number", other)),
        },
        SchemaNode::Contains(needle) => match received {
            Value::String(text) if text.contains(needle.as_str()) => Ok(()),
            Value::String(_) => Err(format!("does not contain '{}'", needle)),
            other => Err(not_a("string", other)),
        },
        SchemaNode::Not(forbidden) => {
            if deep_equal(forbidden, received) {
                Err(format!("must not equal {}", forbidden))
            } else {
                Ok(())
            }
        }
        SchemaNode::LengthEquals(expected) => {
            let actual = match received {
                Value::String(text) => text.chars().count(),
                Value::Array(items) => items.len(),
                other => return Err(format!("expected a string or array, got {}", JsonKind::of(other).name())),
            };
            if actual == *expected {
                Ok(())
            } else {
                Err(format!("length {} != {}", actual, expected))
            }
        }
        SchemaNode::Choice(choices) => {
            if choices.iter().any(|choice| deep_equal(choice, received)) {
                Ok(())
            } else {
                Err("not one of the allowed choices".into())
            }
        }
        SchemaNode::ArrayContainsAll(required) => match received {
            Value::Array(items) => contains_all(required, items),
            other => Err(not_a("array", other)),
        },
        SchemaNode::ArrayExact(_)
        | SchemaNode::ArrayEachOrdered(_)
        | SchemaNode::AllOf(_)
        | SchemaNode::Object { .. } => Err(format!("structural node '{}' cannot be evaluated as a leaf", node)),
    }
}

/// Every required value needs its own received element; one element never
/// satisfies two required values. Extra received elements are fine.
fn contains_all(required: &[Value], items: &[Value]) -> Result<(), String> {
    let mut used = vec![false; items.len()];
    let mut missing = Vec::new();

    for want in required {
        let slot = items
            .iter()
            .enumerate()
            .position(|(i, item)| !used[i] && deep_equal(want, item));
        match slot {
            Some(i) => used[i] = true,
            None => missing.push(want.to_string()),
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing required element(s): {}", missing.join(", ")))
    }
}

fn not_a(expected: &str, received: &Value) -> String {
    format!("expected a {}, got {}", expected, JsonKind::of(received).name())
}
