//! # scenegraph-rs — Retained Element Scene Graph
//!
//! A retained-mode element tree with an observable, composable property
//! system. Nodes form a strict tree; every node carries a property schema
//! whose cells can *live-link* to the parent's same-named cells, so a value
//! set on an ancestor flows down the tree until a node overrides it
//! locally.
//!
//! ## Design Principles
//!
//! 1. **One arena**: [`Scene`] owns every node and schema; everything else
//!    holds plain ids
//! 2. **Two composition modes**: `wrap` is reactive (live link), `inherit`
//!    is a one-time snapshot
//! 3. **Writes win**: a local write always severs the live link, even when
//!    the value is unchanged
//! 4. **Queries own nothing**: path → [`Step`] list is a pure function
//!
//! ## Quick Start
//!
//! ```rust
//! use scenegraph_rs::{
//!     ElementRegistry, ElementTag, ElementType, NodeData, PropType, Scene,
//! };
//!
//! const GROUP: ElementTag = ElementTag(1);
//!
//! # fn demo() -> scenegraph_rs::Result<()> {
//! let mut registry = ElementRegistry::new();
//! registry.register(
//!     GROUP,
//!     ElementType::new("Group").with_default("opacity", 1.0f32),
//! );
//! let mut scene = Scene::new(registry);
//!
//! let root = scene.create_node(GROUP)?;
//! let leaf = scene.create_node(GROUP)?;
//! scene.load(root, &NodeData::new().with_id("root"), vec![])?;
//! scene.load(leaf, &NodeData::new().with_id("leaf"), vec![])?;
//! scene.attach_child(root, leaf)?;
//!
//! // The leaf mirrors its ancestor until it overrides locally.
//! scene.set_prop(root, "color", "red")?;
//! assert_eq!(scene.get_prop(leaf, "color", PropType::Str)?, "red".into());
//!
//! // Path queries walk the tree.
//! assert_eq!(scene.find(root, "..leaf"), vec![leaf]);
//! # Ok(())
//! # }
//! # demo().unwrap();
//! ```
//!
//! ## Query Paths
//!
//! | Path | Meaning |
//! |------|---------|
//! | `a.b` | child `b` of child `a` |
//! | `a.*` | all children of `a` |
//! | `..name` | every descendant named `name` |
//! | `..(@kind == disc)` | every descendant whose own `kind` equals `disc` |

// ============================================================================
// Modules
// ============================================================================

pub mod export;
pub mod model;
pub mod query;
pub mod registry;
pub mod scene;
pub mod schema;
pub mod traverse;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{NodeData, NodeId, PropType, SchemaId, Value};

// ============================================================================
// Re-exports: Scene and events
// ============================================================================

pub use scene::Scene;
pub use scene::events::{
    NodeEvent, NodeHandler, PropertyChange, PropertyHandler, SchemaHandler, SubId,
};
pub use schema::PropertySchema;

// ============================================================================
// Re-exports: Registry
// ============================================================================

pub use registry::{ElementRegistry, ElementTag, ElementType, NodeHook};

// ============================================================================
// Re-exports: Queries
// ============================================================================

pub use query::{CmpOp, QueryExpression, Step, compile};
pub use traverse::{MAX_DEPTH, find, find_fast, find_one};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("schema cycle: wrapping '{schema}' around '{parent}'")]
    CyclicSchema { schema: String, parent: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("query syntax error at position {position}: {message}")]
    QuerySyntax { position: usize, message: String },

    #[error("unknown element type: {0}")]
    UnknownElementType(ElementTag),

    #[error("node no longer exists: {0}")]
    NodeGone(NodeId),

    #[error("schema no longer exists: {0}")]
    SchemaGone(SchemaId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
