//! # Scene Graph Model
//!
//! Clean DTOs that cross every boundary: construction input, typed values,
//! and the opaque identifiers handed out by the arena.
//!
//! Design rule: this module is pure data — no tree state, no events.

pub mod data;
pub mod value;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use data::NodeData;
pub use value::{PropType, Value};

/// Opaque node identifier. Process-unique, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque schema identifier. Process-unique, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaId(pub u64);

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
