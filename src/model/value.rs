//! Typed property values — the closed type system of the scene graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a property cell.
///
/// The set is closed: authoring data may only carry these six shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropType {
    Int,
    Float,
    Bool,
    Str,
    Vec3,
    Color,
}

impl PropType {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropType::Int => "INT",
            PropType::Float => "FLOAT",
            PropType::Bool => "BOOL",
            PropType::Str => "STRING",
            PropType::Vec3 => "VEC3",
            PropType::Color => "COLOR",
        }
    }
}

/// A property value.
///
/// Scalars are `i64`/`f32`/`bool`/`String`; the spatial shapes are plain
/// float arrays (`[x, y, z]` and `[r, g, b, a]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Int(i64),
    Float(f32),
    Bool(bool),
    Str(String),
    Vec3([f32; 3]),
    Color([f32; 4]),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn prop_type(&self) -> PropType {
        match self {
            Value::Int(_) => PropType::Int,
            Value::Float(_) => PropType::Float,
            Value::Bool(_) => PropType::Bool,
            Value::Str(_) => PropType::Str,
            Value::Vec3(_) => PropType::Vec3,
            Value::Color(_) => PropType::Color,
        }
    }

    /// The zero value for a declared type. Returned wherever a read cannot
    /// resolve to a real cell (missing parent, mismatched type).
    pub fn zero(ty: PropType) -> Value {
        match ty {
            PropType::Int => Value::Int(0),
            PropType::Float => Value::Float(0.0),
            PropType::Bool => Value::Bool(false),
            PropType::Str => Value::Str(String::new()),
            PropType::Vec3 => Value::Vec3([0.0; 3]),
            PropType::Color => Value::Color([0.0; 4]),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<f32> for Value { fn from(v: f32) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::Str(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::Str(v.to_owned()) } }
impl From<[f32; 3]> for Value { fn from(v: [f32; 3]) -> Self { Value::Vec3(v) } }
impl From<[f32; 4]> for Value { fn from(v: [f32; 4]) -> Self { Value::Color(v) } }

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Value::Vec3([x, y, z]) => write!(f, "({x}, {y}, {z})"),
            Value::Color([r, g, b, a]) => write!(f, "rgba({r}, {g}, {b}, {a})"),
        }
    }
}
