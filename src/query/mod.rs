//! # Path Query Language
//!
//! Compiles traversal path strings into predicate step sequences.
//! Pure functions — no tree state, no I/O.

pub mod expr;
pub mod parse;

pub use expr::{CmpOp, QueryExpression, Step};
pub use parse::compile;
