//! Structural and property change events.
//!
//! Observers are explicit per-node / per-cell lists. Subscribing returns an
//! opaque [`SubId`] token; unsubscribing requires it. Dispatch is synchronous
//! and re-entrant: handler lists are cloned out of the arena before any
//! handler runs, so a handler may freely mutate the [`Scene`] it receives —
//! including attaching, detaching or destroying nodes — without corrupting
//! the dispatching cell or node.

use std::rc::Rc;

use crate::model::{NodeId, SchemaId, Value};
use super::Scene;

/// Opaque subscription token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubId(pub(crate) u64);

/// Structural event on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    /// A node became an immediate child of the observed node.
    ChildAttached { child: NodeId },
    /// A node stopped being an immediate child of the observed node.
    ChildDetached { child: NodeId },
    /// A node was attached somewhere below the observed node, at any depth.
    DescendantAttached { node: NodeId },
    /// A node was detached somewhere below the observed node, at any depth.
    DescendantDetached { node: NodeId },
    /// The observed node itself was detached from its parent.
    Detached { parent: NodeId },
    /// A node was destroyed — the observed node itself, or a descendant.
    Destroyed { node: NodeId },
}

/// A property cell changed value.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub schema: SchemaId,
    pub name: String,
    pub old: Value,
    pub new: Value,
}

/// Handler for structural events. `NodeId` is the node the subscription
/// was registered on.
pub type NodeHandler = Rc<dyn Fn(&mut Scene, NodeId, &NodeEvent)>;

/// Handler for property change events.
pub type PropertyHandler = Rc<dyn Fn(&mut Scene, &PropertyChange)>;

/// Handler for "a local independent cell appeared on this schema".
///
/// Fired for `set`- and `get_own`-created cells; collaborators use it to
/// re-run default inheritance when a property is first authored.
pub type SchemaHandler = Rc<dyn Fn(&mut Scene, SchemaId, &str)>;
