//! Compiled query predicates.

use crate::model::{NodeId, Value};
use crate::scene::Scene;

/// Comparison operator in a property predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    fn check(&self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CmpOp::Eq => ord == Equal,
            CmpOp::Ne => ord != Equal,
            CmpOp::Lt => ord == Less,
            CmpOp::Le => ord != Greater,
            CmpOp::Gt => ord == Greater,
            CmpOp::Ge => ord != Less,
        }
    }
}

/// One compiled traversal predicate. No mutable state after construction;
/// re-evaluable against any node.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpression {
    /// `*` — always matches.
    Wildcard,
    /// Bare identifier — matches the node's persistent id.
    Name(String),
    /// `(@name op value)` — property comparison. The operand stays in
    /// string form and is coerced at evaluation time.
    Compare {
        name: String,
        op: CmpOp,
        operand: String,
    },
}

/// One step of a compiled path: a predicate plus whether it is matched
/// among immediate children only or recursively at any depth.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub expr: QueryExpression,
    pub recursive: bool,
}

impl QueryExpression {
    /// Evaluate against a single node.
    pub fn matches(&self, scene: &Scene, node: NodeId) -> bool {
        match self {
            QueryExpression::Wildcard => true,
            QueryExpression::Name(name) => {
                scene.persistent_id(node).is_some_and(|id| id == name)
            }
            QueryExpression::Compare { name, op, operand } => {
                match name.as_str() {
                    // `id` and `type` bypass the property store.
                    "id" => scene
                        .persistent_id(node)
                        .is_some_and(|id| string_compare(*op, id, operand)),
                    "type" => scene
                        .type_name(node)
                        .is_some_and(|ty| string_compare(*op, ty, operand)),
                    _ => {
                        // Only own properties participate; a value merely
                        // mirrored from an ancestor never matches.
                        let Some(value) = scene.own_property(node, name) else {
                            return false;
                        };
                        value_compare(*op, value, operand)
                    }
                }
            }
        }
    }
}

/// String comparison: only `==`/`!=` are meaningful.
fn string_compare(op: CmpOp, lhs: &str, rhs: &str) -> bool {
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        _ => false,
    }
}

/// Operand coercion precedence: boolean literal, then integer parse, then
/// raw string compare. Ordering operators only work on the integer path.
fn value_compare(op: CmpOp, value: &Value, operand: &str) -> bool {
    if operand == "true" || operand == "false" {
        let rhs = operand == "true";
        return match value.as_bool() {
            Some(lhs) => match op {
                CmpOp::Eq => lhs == rhs,
                CmpOp::Ne => lhs != rhs,
                _ => false,
            },
            None => false,
        };
    }

    if let Ok(rhs) = operand.parse::<i64>() {
        return match value.as_int() {
            Some(lhs) => op.check(lhs.cmp(&rhs)),
            None => false,
        };
    }

    match value.as_str() {
        Some(lhs) => string_compare(op, lhs, operand),
        None => false,
    }
}
