//! Element type registry.
//!
//! Maps a small closed "element type" tag to a runtime type name, a
//! baseline property bag and an optional after-load hook. Built once at
//! startup by the embedding layer and handed to [`Scene::new`]; replaces
//! reflection-driven subclass scanning with an explicit registration table.
//!
//! [`Scene::new`]: crate::scene::Scene::new

use std::rc::Rc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::{NodeId, Value};
use crate::scene::Scene;

/// Closed element type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementTag(pub u16);

impl std::fmt::Display for ElementTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hook invoked after a node of this type finishes loading, or right
/// before its storage is torn down during destroy.
pub type NodeHook = Rc<dyn Fn(&mut Scene, NodeId)>;

/// One registered element type.
#[derive(Clone)]
pub struct ElementType {
    /// Runtime type name; what `(@type==Name)` queries compare against.
    pub name: String,
    /// Baseline properties every node of this type starts from. Stamped
    /// onto fresh nodes via snapshot inheritance, so instances never share
    /// a mutable default object.
    pub defaults: Vec<(String, Value)>,
    pub after_load: Option<NodeHook>,
    pub on_destroy: Option<NodeHook>,
}

impl ElementType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: Vec::new(),
            after_load: None,
            on_destroy: None,
        }
    }

    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((name.into(), value.into()));
        self
    }

    pub fn with_after_load(mut self, hook: NodeHook) -> Self {
        self.after_load = Some(hook);
        self
    }

    pub fn with_on_destroy(mut self, hook: NodeHook) -> Self {
        self.on_destroy = Some(hook);
        self
    }
}

/// Tag → element type table.
#[derive(Default, Clone)]
pub struct ElementRegistry {
    entries: HashMap<ElementTag, ElementType>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type under a tag. Last registration wins.
    pub fn register(&mut self, tag: ElementTag, ty: ElementType) {
        self.entries.insert(tag, ty);
    }

    pub fn get(&self, tag: ElementTag) -> Option<&ElementType> {
        self.entries.get(&tag)
    }

    pub fn type_name(&self, tag: ElementTag) -> Option<&str> {
        self.entries.get(&tag).map(|t| t.name.as_str())
    }
}

impl std::fmt::Debug for ElementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.entries.values().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("ElementRegistry").field("types", &names).finish()
    }
}
