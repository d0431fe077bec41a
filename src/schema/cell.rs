//! PropertyCell — one named, typed, observable value.
//!
//! A cell is either *independent* (its value is local authority) or
//! *linked*: it mirrors the same-named cell of a parent schema, tracking
//! its changes until the link is severed by a local write. Independence is
//! one-way — once severed, a cell never re-links for the rest of its life.

use smallvec::SmallVec;

use crate::model::{PropType, SchemaId, Value};
use crate::scene::events::{PropertyHandler, SubId};

pub(crate) struct PropertyCell {
    pub(crate) name: String,
    pub(crate) ty: PropType,
    /// Cached value. Kept current even while linked, so severing a link
    /// freezes the cell at its last-resolved value.
    pub(crate) value: Value,
    /// True once the live link is severed, or when the cell was created
    /// without one. Never reverts to false.
    pub(crate) independent: bool,
    /// Schema whose same-named cell this one mirrors.
    pub(crate) link: Option<SchemaId>,
    /// Schemas whose same-named cells mirror this one.
    pub(crate) dependents: SmallVec<[SchemaId; 2]>,
    pub(crate) subscribers: Vec<(SubId, PropertyHandler)>,
}

impl PropertyCell {
    /// A fresh independent cell.
    pub(crate) fn independent(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            ty: value.prop_type(),
            value,
            independent: true,
            link: None,
            dependents: SmallVec::new(),
            subscribers: Vec::new(),
        }
    }

    /// A fresh cell mirroring `source`'s same-named cell, seeded with its
    /// current value.
    pub(crate) fn linked(name: impl Into<String>, value: Value, source: SchemaId) -> Self {
        Self {
            name: name.into(),
            ty: value.prop_type(),
            value,
            independent: false,
            link: Some(source),
            dependents: SmallVec::new(),
            subscribers: Vec::new(),
        }
    }

    /// Independent duplicate: same name, type and value; no link, no
    /// subscribers. Used by snapshot inheritance.
    pub(crate) fn copy(&self) -> Self {
        Self::independent(self.name.clone(), self.value.clone())
    }
}

impl std::fmt::Debug for PropertyCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyCell")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("value", &self.value)
            .field("independent", &self.independent)
            .field("link", &self.link)
            .field("dependents", &self.dependents)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
