//! # PropertySchema
//!
//! The composable property store carried by every node: an ordered list of
//! [`PropertyCell`]s plus an optional parent schema used exclusively for the
//! *live-link* relationship (never ownership).
//!
//! Two composition operations with different semantics:
//!
//! - **wrap** — reactive: local cells re-link to the parent's same-named
//!   cells and mirror their future changes until locally overridden.
//! - **inherit** — snapshot: missing cells are stamped once as independent
//!   copies; later changes to the source never propagate.
//!
//! All operations that cross schema boundaries (set, get, wrap, inherit,
//! change propagation) live on [`Scene`](crate::scene::Scene) — a schema on
//! its own is just the data half.

pub(crate) mod cell;

use crate::model::{NodeId, SchemaId, Value};
use crate::scene::events::{SchemaHandler, SubId};
use cell::PropertyCell;

/// An ordered collection of property cells with one optional live-link
/// parent. Insertion order is irrelevant to semantics but stable for
/// enumeration.
pub struct PropertySchema {
    pub(crate) id: SchemaId,
    /// Debug label, surfaced in logs and cycle errors.
    pub(crate) label: String,
    pub(crate) cells: Vec<PropertyCell>,
    /// Live-link parent. Non-owning; must be acyclic.
    pub(crate) parent: Option<SchemaId>,
    /// Node whose graph state this schema backs, if any. Drives
    /// persistent-id sync for writes to the `"id"` cell.
    pub(crate) owner: Option<NodeId>,
    /// "local property added" observers.
    pub(crate) added_subscribers: Vec<(SubId, SchemaHandler)>,
}

impl PropertySchema {
    pub(crate) fn new(id: SchemaId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            cells: Vec::new(),
            parent: None,
            owner: None,
            added_subscribers: Vec::new(),
        }
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn parent(&self) -> Option<SchemaId> {
        self.parent
    }

    pub(crate) fn cell(&self, name: &str) -> Option<&PropertyCell> {
        self.cells.iter().find(|c| c.name == name)
    }

    pub(crate) fn cell_mut(&mut self, name: &str) -> Option<&mut PropertyCell> {
        self.cells.iter_mut().find(|c| c.name == name)
    }

    /// Local independent cells only — the property set actually authored on
    /// this schema, not the effective resolved set. Still-linked cells are
    /// hidden: they mirror an ancestor and carry no local authority.
    pub fn own_properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.cells
            .iter()
            .filter(|c| c.independent)
            .map(|c| (c.name.as_str(), &c.value))
    }

    /// True only if a local cell exists and is independent.
    pub fn has_own(&self, name: &str) -> bool {
        self.cell(name).is_some_and(|c| c.independent)
    }
}

impl std::fmt::Debug for PropertySchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySchema")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("parent", &self.parent)
            .field("owner", &self.owner)
            .field("cells", &self.cells)
            .finish()
    }
}
