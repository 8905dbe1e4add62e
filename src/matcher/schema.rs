use serde::Serialize;
use serde_json::Value;

use super::predicate;
use crate::expect::SchemaNode;

/// Longest rendering of a received value kept in a failure
const MAX_ACTUAL_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldFailure {
    /// Dot/bracket path from `root`, e.g. `root.sensors[1].id`
    pub path: String,
    pub expected: String,
    pub actual: String,
    pub reason: String,
}

/// Compare `received` against `schema` and return every failing path.
/// An empty result means the value satisfies the schema.
pub fn match_value(schema: &SchemaNode, received: &Value) -> Vec<FieldFailure> {
    let mut walker = SchemaWalker::default();
    walker.walk(schema, Some(received), "root");
    walker.failures
}

#[derive(Default)]
struct SchemaWalker {
    failures: Vec<FieldFailure>,
}

impl SchemaWalker {
    fn walk(&mut self, node: &SchemaNode, received: Option<&Value>, path: &str) {
        let Some(value) = received else {
            if !node.allows_missing() {
                self.fail(path, node, "<missing>".into(), "missing key".into());
            }
            return;
        };

        match node {
            SchemaNode::Object { fields, .. } => match value {
                Value::Object(map) => {
                    for (key, child) in fields {
                        self.walk(child, map.get(key), &format!("{}.{}", path, key));
                    }
                }
                other => self.fail_type(path, node, other, "object"),
            },
            SchemaNode::ArrayExact(items) | SchemaNode::ArrayEachOrdered(items) => match value {
                Value::Array(received_items) => self.walk_ordered(node, items, received_items, path),
                other => self.fail_type(path, node, other, "array"),
            },
            SchemaNode::AllOf(constraints) => {
                for constraint in constraints {
                    self.walk(constraint, Some(value), path);
                }
            }
            leaf => {
                if let Err(reason) = predicate::evaluate(leaf, value) {
                    self.fail(path, leaf, render(value), reason);
                }
            }
        }
    }

    fn walk_ordered(&mut self, node: &SchemaNode, schemas: &[SchemaNode], items: &[Value], path: &str) {
        if schemas.len() != items.len() {
            self.fail(
                path,
                node,
                render(&Value::Array(items.to_vec())),
                format!("array length mismatch: expected {}, got {}", schemas.len(), items.len()),
            );
            return;
        }
        for (i, (schema, item)) in schemas.iter().zip(items).enumerate() {
            self.walk(schema, Some(item), &format!("{}[{}]", path, i));
        }
    }

    fn fail_type(&mut self, path: &str, node: &SchemaNode, value: &Value, wanted: &str) {
        let reason = format!(
            "type mismatch: expected {}, got {}",
            wanted,
            crate::expect::JsonKind::of(value).name()
        );
        self.fail(path, node, render(value), reason);
    }

    fn fail(&mut self, path: &str, node: &SchemaNode, actual: String, reason: String) {
        log::debug!("Mismatch at {}: {}", path, reason);
        self.failures.push(FieldFailure {
            path: path.to_string(),
            expected: node.to_string(),
            actual,
            reason,
        });
    }
}

fn render(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= MAX_ACTUAL_CHARS {
        return text;
    }
    let cut: String = text.chars().take(MAX_ACTUAL_CHARS).collect();
    format!("{}...", cut)
}
