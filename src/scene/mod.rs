//! # Scene — the retained element tree and its schema store.
//!
//! `Scene` is the arena that owns every node and every property schema.
//! Nodes, schemas and cells refer to one another exclusively through opaque
//! ids (`NodeId`, `SchemaId`); no owning pointers ever point upward, so the
//! only ownership flow is Scene → node → (children, schema).
//!
//! All mutation is synchronous and single-threaded: every operation is a
//! bounded computation over the tree, and cell updates are fully resolved
//! before any subscriber callback runs. Callbacks receive `&mut Scene` and
//! may re-enter it freely.

pub mod events;

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::model::{NodeData, NodeId, PropType, SchemaId, Value};
use crate::registry::{ElementRegistry, ElementTag};
use crate::schema::PropertySchema;
use crate::schema::cell::PropertyCell;
use crate::{Error, Result};
use events::{
    NodeEvent, NodeHandler, PropertyChange, PropertyHandler, SchemaHandler, SubId,
};

// ============================================================================
// Node state
// ============================================================================

struct NodeState {
    tag: ElementTag,
    /// Identifier stable across loads; empty while unloaded.
    persistent_id: String,
    /// Process-unique id, regenerated on every load.
    ephemeral: u64,
    schema: SchemaId,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    subscribers: Vec<(SubId, NodeHandler)>,
    loaded: bool,
}

// ============================================================================
// Scene
// ============================================================================

/// The element tree arena. The primary entry point of the crate.
pub struct Scene {
    registry: ElementRegistry,
    nodes: HashMap<NodeId, NodeState>,
    schemas: HashMap<SchemaId, PropertySchema>,
    /// Per-type baseline schemas, materialized lazily.
    default_schemas: HashMap<ElementTag, SchemaId>,
    next_node: u64,
    next_schema: u64,
    next_sub: u64,
    next_ephemeral: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(ElementRegistry::new())
    }
}

impl Scene {
    pub fn new(registry: ElementRegistry) -> Self {
        Self {
            registry,
            nodes: HashMap::new(),
            schemas: HashMap::new(),
            default_schemas: HashMap::new(),
            next_node: 1,
            next_schema: 1,
            next_sub: 1,
            next_ephemeral: 0,
        }
    }

    pub fn registry(&self) -> &ElementRegistry {
        &self.registry
    }

    fn next_sub_id(&mut self) -> SubId {
        let id = SubId(self.next_sub);
        self.next_sub += 1;
        id
    }

    // ========================================================================
    // Schema lifecycle
    // ========================================================================

    /// Create a free-standing schema (not backing any node).
    pub fn create_schema(&mut self, label: impl Into<String>) -> SchemaId {
        let id = SchemaId(self.next_schema);
        self.next_schema += 1;
        self.schemas.insert(id, PropertySchema::new(id, label));
        id
    }

    pub fn schema(&self, id: SchemaId) -> Option<&PropertySchema> {
        self.schemas.get(&id)
    }

    /// Remove a schema, severing every link into and out of it. Schemas
    /// wrapped around it are unwrapped in place: their parent link clears
    /// and their cells freeze at their last value, same as `wrap(None)`.
    /// Inert if the schema is already gone.
    pub fn drop_schema(&mut self, id: SchemaId) {
        let Some(schema) = self.schemas.remove(&id) else { return };
        for cell in &schema.cells {
            if let Some(src) = cell.link {
                self.remove_dependent(src, &cell.name, id);
            }
            for dep in &cell.dependents {
                if let Some(ds) = self.schemas.get_mut(dep) {
                    if let Some(dc) = ds.cell_mut(&cell.name) {
                        if dc.link == Some(id) {
                            dc.link = None;
                            dc.independent = true;
                        }
                    }
                }
            }
        }

        // The cell loop only covers materialized mirrors; every schema
        // still parented here must stop chaining into the dead id too,
        // or later lazy resolution would walk into a missing schema.
        let orphans: Vec<SchemaId> = self
            .schemas
            .iter()
            .filter(|(_, s)| s.parent == Some(id))
            .map(|(cid, _)| *cid)
            .collect();
        for cid in orphans {
            if let Some(cs) = self.schemas.get_mut(&cid) {
                cs.parent = None;
                for cell in &mut cs.cells {
                    if !cell.independent {
                        cell.link = None;
                        cell.independent = true;
                    }
                }
            }
        }
    }

    fn remove_dependent(&mut self, source: SchemaId, name: &str, dependent: SchemaId) {
        if let Some(s) = self.schemas.get_mut(&source) {
            if let Some(c) = s.cell_mut(name) {
                c.dependents.retain(|d| *d != dependent);
            }
        }
    }

    // ========================================================================
    // Property read/write
    // ========================================================================

    /// Write a property. Creates an independent cell on first definition;
    /// overwrites an existing cell only when the declared type matches
    /// (mismatched writes are ignored — loosely-typed authoring data must
    /// not crash the graph). A write always severs the live link first,
    /// even when the value is unchanged; notification fires only when the
    /// stored value actually changed.
    pub fn set(&mut self, schema: SchemaId, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();

        enum Outcome {
            Created,
            Ignored,
            Unchanged(Option<SchemaId>),
            Changed(Option<SchemaId>, Value),
        }

        let outcome = {
            let s = self.schemas.get_mut(&schema).ok_or(Error::SchemaGone(schema))?;
            match s.cell_mut(name) {
                None => {
                    s.cells.push(PropertyCell::independent(name, value.clone()));
                    Outcome::Created
                }
                Some(cell) if cell.ty != value.prop_type() => {
                    trace!(
                        schema = %schema, name,
                        declared = cell.ty.type_name(),
                        got = value.prop_type().type_name(),
                        "type-mismatched write ignored"
                    );
                    Outcome::Ignored
                }
                Some(cell) => {
                    // Sever before storing, unconditionally.
                    let severed = cell.link.take();
                    cell.independent = true;
                    if cell.value == value {
                        Outcome::Unchanged(severed)
                    } else {
                        let old = std::mem::replace(&mut cell.value, value.clone());
                        Outcome::Changed(severed, old)
                    }
                }
            }
        };

        match outcome {
            Outcome::Created => {
                self.fire_local_added(schema, name);
                self.sync_owner_id(schema, name);
            }
            Outcome::Ignored => {}
            Outcome::Unchanged(severed) => {
                if let Some(src) = severed {
                    self.remove_dependent(src, name, schema);
                }
            }
            Outcome::Changed(severed, old) => {
                if let Some(src) = severed {
                    self.remove_dependent(src, name, schema);
                }
                self.notify_cell(schema, name, old, value);
            }
        }
        Ok(())
    }

    /// Read a property under a declared type.
    ///
    /// A missing cell resolves through the live-link parent chain: the
    /// nearest declaration is materialized downward as linked cells, so the
    /// value keeps tracking the ancestor until locally overridden. Without
    /// a parent chain, an independent zero-valued cell is created. A cell
    /// of a different declared type yields the type's zero value and leaves
    /// the store untouched.
    pub fn get(&mut self, schema: SchemaId, name: &str, ty: PropType) -> Result<Value> {
        let parent = {
            let s = self.schemas.get(&schema).ok_or(Error::SchemaGone(schema))?;
            if let Some(cell) = s.cell(name) {
                if cell.ty == ty {
                    return Ok(cell.value.clone());
                }
                trace!(
                    schema = %schema, name,
                    declared = cell.ty.type_name(),
                    requested = ty.type_name(),
                    "type-mismatched read degrades to zero value"
                );
                return Ok(Value::zero(ty));
            }
            s.parent
        };

        let Some(parent) = parent else {
            let zero = Value::zero(ty);
            let s = self.schemas.get_mut(&schema).ok_or(Error::SchemaGone(schema))?;
            s.cells.push(PropertyCell::independent(name, zero.clone()));
            return Ok(zero);
        };

        // Materialize the ancestor chain, then mirror the parent's cell if
        // it resolved to the requested type.
        let value = self.get(parent, name, ty)?;
        let parent_matches = self
            .schemas
            .get(&parent)
            .and_then(|p| p.cell(name))
            .is_some_and(|c| c.ty == ty);
        if !parent_matches {
            return Ok(Value::zero(ty));
        }

        {
            let s = self.schemas.get_mut(&schema).ok_or(Error::SchemaGone(schema))?;
            s.cells.push(PropertyCell::linked(name, value.clone(), parent));
        }
        if let Some(p) = self.schemas.get_mut(&parent) {
            if let Some(pc) = p.cell_mut(name) {
                if !pc.dependents.contains(&schema) {
                    pc.dependents.push(schema);
                }
            }
        }
        Ok(value)
    }

    /// Like [`get`](Scene::get), but an absent property is created as an
    /// **independent** local cell seeded with `default` instead of linking
    /// upward. For per-node configuration that must never silently inherit.
    pub fn get_own(&mut self, schema: SchemaId, name: &str, default: impl Into<Value>) -> Result<Value> {
        let default = default.into();
        let ty = default.prop_type();
        {
            let s = self.schemas.get_mut(&schema).ok_or(Error::SchemaGone(schema))?;
            if let Some(cell) = s.cell(name) {
                return Ok(if cell.ty == ty {
                    cell.value.clone()
                } else {
                    Value::zero(ty)
                });
            }
            s.cells.push(PropertyCell::independent(name, default.clone()));
        }
        self.fire_local_added(schema, name);
        self.sync_owner_id(schema, name);
        Ok(default)
    }

    /// True only if a local independent cell exists — a still-linked cell
    /// mirrors an ancestor and carries no local authority.
    pub fn has_own(&self, schema: SchemaId, name: &str) -> bool {
        self.schemas.get(&schema).is_some_and(|s| s.has_own(name))
    }

    /// [`has_own`](Scene::has_own) here or on any ancestor.
    pub fn has(&self, schema: SchemaId, name: &str) -> bool {
        let mut cur = Some(schema);
        while let Some(id) = cur {
            let Some(s) = self.schemas.get(&id) else { break };
            if s.has_own(name) {
                return true;
            }
            cur = s.parent;
        }
        false
    }

    // ========================================================================
    // Schema composition: wrap (live) and inherit (snapshot)
    // ========================================================================

    /// Live-link composition. With `Some(parent)`, sets the parent link and
    /// re-links every not-yet-independent local cell to the parent chain's
    /// same-named, same-typed cell (silently resyncing its value); cells
    /// the chain does not declare are zeroed but stay linkable. With
    /// `None`, clears the link: cells become independent, frozen at their
    /// last value. Idempotent — safe to call on every structural re-parent.
    pub fn wrap(&mut self, schema: SchemaId, parent: Option<SchemaId>) -> Result<()> {
        if !self.schemas.contains_key(&schema) {
            return Err(Error::SchemaGone(schema));
        }

        let Some(p) = parent else {
            let severed: Vec<(SchemaId, String)> = {
                let s = self.schemas.get_mut(&schema).ok_or(Error::SchemaGone(schema))?;
                s.parent = None;
                let mut severed = Vec::new();
                for cell in &mut s.cells {
                    if !cell.independent {
                        if let Some(src) = cell.link.take() {
                            severed.push((src, cell.name.clone()));
                        }
                        cell.independent = true;
                    }
                }
                severed
            };
            for (src, name) in severed {
                self.remove_dependent(src, &name, schema);
            }
            return Ok(());
        };

        if !self.schemas.contains_key(&p) {
            return Err(Error::SchemaGone(p));
        }

        // Cycle check before any mutation: walking up from the prospective
        // parent must never reach the schema being wrapped.
        let mut cur = Some(p);
        while let Some(id) = cur {
            if id == schema {
                return Err(Error::CyclicSchema {
                    schema: self.schemas[&schema].label.clone(),
                    parent: self.schemas[&p].label.clone(),
                });
            }
            cur = self.schemas.get(&id).and_then(|s| s.parent);
        }

        if let Some(s) = self.schemas.get_mut(&schema) {
            s.parent = Some(p);
        }

        let candidates: Vec<(String, PropType, Option<SchemaId>)> = self.schemas[&schema]
            .cells
            .iter()
            .filter(|c| !c.independent)
            .map(|c| (c.name.clone(), c.ty, c.link))
            .collect();

        for (name, ty, old_link) in candidates {
            if let Some(src) = old_link {
                if src != p {
                    self.remove_dependent(src, &name, schema);
                }
            }
            if self.chain_declares(p, &name) == Some(ty) {
                let value = self.get(p, &name, ty)?;
                if let Some(s) = self.schemas.get_mut(&schema) {
                    if let Some(cell) = s.cell_mut(&name) {
                        cell.link = Some(p);
                        cell.value = value; // silent resync, no notification
                    }
                }
                if let Some(ps) = self.schemas.get_mut(&p) {
                    if let Some(pc) = ps.cell_mut(&name) {
                        if !pc.dependents.contains(&schema) {
                            pc.dependents.push(schema);
                        }
                    }
                }
            } else if let Some(s) = self.schemas.get_mut(&schema) {
                // The chain does not declare this property (or declares it
                // under another type): the cell keeps waiting for a future
                // wrap, holding the type's zero value.
                if let Some(cell) = s.cell_mut(&name) {
                    cell.link = None;
                    cell.value = Value::zero(ty);
                }
            }
        }
        Ok(())
    }

    /// Declared type of `name` at its nearest declaration on the chain
    /// starting at `from`, if any.
    fn chain_declares(&self, from: SchemaId, name: &str) -> Option<PropType> {
        let mut cur = Some(from);
        while let Some(id) = cur {
            let s = self.schemas.get(&id)?;
            if let Some(c) = s.cell(name) {
                return Some(c.ty);
            }
            cur = s.parent;
        }
        None
    }

    /// Snapshot composition. Walks the source's full chain breadth-outward
    /// and stamps an independent copy of every cell the receiver does not
    /// already have (by name). A one-time copy: later changes to the source
    /// never propagate, and existing local cells are never overwritten.
    pub fn inherit(&mut self, schema: SchemaId, source: SchemaId) -> Result<()> {
        if !self.schemas.contains_key(&schema) {
            return Err(Error::SchemaGone(schema));
        }
        if !self.schemas.contains_key(&source) {
            return Err(Error::SchemaGone(source));
        }

        let mut copies: Vec<PropertyCell> = Vec::new();
        let mut cur = Some(source);
        while let Some(id) = cur {
            let Some(s) = self.schemas.get(&id) else { break };
            for cell in &s.cells {
                let present = self.schemas[&schema].cell(&cell.name).is_some()
                    || copies.iter().any(|c| c.name == cell.name);
                if !present {
                    copies.push(cell.copy());
                }
            }
            cur = s.parent;
        }

        if !copies.is_empty() {
            if let Some(s) = self.schemas.get_mut(&schema) {
                s.cells.extend(copies);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Property / schema observers
    // ========================================================================

    /// Observe value changes of one cell. The cell must exist (define it
    /// via `set`, `get` or `get_own` first).
    pub fn subscribe_property(
        &mut self,
        schema: SchemaId,
        name: &str,
        handler: PropertyHandler,
    ) -> Result<SubId> {
        let id = self.next_sub_id();
        let s = self.schemas.get_mut(&schema).ok_or(Error::SchemaGone(schema))?;
        let cell = s.cell_mut(name).ok_or_else(|| {
            Error::InvalidArgument(format!("no property cell '{name}' on schema {schema}"))
        })?;
        cell.subscribers.push((id, handler));
        Ok(id)
    }

    pub fn unsubscribe_property(&mut self, schema: SchemaId, name: &str, sub: SubId) {
        if let Some(s) = self.schemas.get_mut(&schema) {
            if let Some(cell) = s.cell_mut(name) {
                cell.subscribers.retain(|(s, _)| *s != sub);
            }
        }
    }

    /// Observe first-definition of local properties on a schema.
    pub fn subscribe_schema(&mut self, schema: SchemaId, handler: SchemaHandler) -> Result<SubId> {
        let id = self.next_sub_id();
        let s = self.schemas.get_mut(&schema).ok_or(Error::SchemaGone(schema))?;
        s.added_subscribers.push((id, handler));
        Ok(id)
    }

    pub fn unsubscribe_schema(&mut self, schema: SchemaId, sub: SubId) {
        if let Some(s) = self.schemas.get_mut(&schema) {
            s.added_subscribers.retain(|(s, _)| *s != sub);
        }
    }

    /// Deliver a cell change: local subscribers first, then the cascade
    /// into every cell still mirroring this one. Handler lists are cloned
    /// out before dispatch so handlers may re-enter the scene.
    fn notify_cell(&mut self, schema: SchemaId, name: &str, old: Value, new: Value) {
        self.sync_owner_id(schema, name);

        let handlers: Vec<PropertyHandler> = self
            .schemas
            .get(&schema)
            .and_then(|s| s.cell(name))
            .map(|c| c.subscribers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        if !handlers.is_empty() {
            let change = PropertyChange {
                schema,
                name: name.to_owned(),
                old,
                new: new.clone(),
            };
            for h in handlers {
                h(self, &change);
            }
        }

        let dependents: SmallVec<[SchemaId; 2]> = self
            .schemas
            .get(&schema)
            .and_then(|s| s.cell(name))
            .map(|c| c.dependents.clone())
            .unwrap_or_default();
        for dep in dependents {
            let updated = {
                let Some(ds) = self.schemas.get_mut(&dep) else { continue };
                let Some(cell) = ds.cell_mut(name) else { continue };
                // A handler above may have severed the mirror in the
                // meantime; re-check before touching the cached value.
                if cell.independent || cell.link != Some(schema) || cell.ty != new.prop_type() {
                    continue;
                }
                if cell.value == new {
                    continue;
                }
                std::mem::replace(&mut cell.value, new.clone())
            };
            self.notify_cell(dep, name, updated, new.clone());
        }
    }

    fn fire_local_added(&mut self, schema: SchemaId, name: &str) {
        let handlers: Vec<SchemaHandler> = self
            .schemas
            .get(&schema)
            .map(|s| s.added_subscribers.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        let name = name.to_owned();
        for h in handlers {
            h(self, schema, &name);
        }
    }

    /// While a node is loaded, writes to its schema's `"id"` string cell
    /// keep the persistent identifier in sync.
    fn sync_owner_id(&mut self, schema: SchemaId, name: &str) {
        if name != "id" {
            return;
        }
        let Some(s) = self.schemas.get(&schema) else { return };
        let Some(owner) = s.owner else { return };
        let new_id = match s.cell("id").map(|c| &c.value) {
            Some(Value::Str(v)) => v.clone(),
            _ => return,
        };
        if let Some(n) = self.nodes.get_mut(&owner) {
            if n.loaded {
                n.persistent_id = new_id;
            }
        }
    }

    // ========================================================================
    // Node lifecycle
    // ========================================================================

    /// Construct an empty, unloaded node of the given element type.
    pub fn create_node(&mut self, tag: ElementTag) -> Result<NodeId> {
        if self.registry.get(tag).is_none() {
            return Err(Error::UnknownElementType(tag));
        }
        let id = NodeId(self.next_node);
        self.next_node += 1;
        let schema = self.create_schema(format!("node-{id}"));
        if let Some(s) = self.schemas.get_mut(&schema) {
            s.owner = Some(id);
        }
        self.nodes.insert(
            id,
            NodeState {
                tag,
                persistent_id: String::new(),
                ephemeral: 0,
                schema,
                parent: None,
                children: SmallVec::new(),
                subscribers: Vec::new(),
                loaded: false,
            },
        );
        debug!(node = %id, tag = %tag, "node created");
        Ok(id)
    }

    /// Populate a node from construction data: assigns identifiers, writes
    /// the declared properties, stamps the type's baseline via snapshot
    /// inheritance, attaches the supplied children (wrapping each child's
    /// schema around this node's) and runs the type's after-load hook.
    ///
    /// The persistent identifier comes from the data's own id field; a
    /// declared `"id"` property is stored like any other and only starts
    /// renaming the node on writes after loading completes.
    ///
    /// Must be called at most once between construction/`unload` and the
    /// next `unload`.
    pub fn load(&mut self, node: NodeId, data: &NodeData, children: Vec<NodeId>) -> Result<()> {
        let (tag, schema, loaded) = {
            let n = self.nodes.get(&node).ok_or(Error::NodeGone(node))?;
            (n.tag, n.schema, n.loaded)
        };
        if loaded {
            return Err(Error::InvalidArgument(format!(
                "node {node} is already loaded"
            )));
        }

        self.next_ephemeral += 1;
        let ephemeral = self.next_ephemeral;
        let pid = data
            .persistent_id
            .clone()
            .unwrap_or_else(|| format!("#{ephemeral}"));
        if let Some(n) = self.nodes.get_mut(&node) {
            n.ephemeral = ephemeral;
            n.persistent_id = pid.clone();
        }
        if let Some(s) = self.schemas.get_mut(&schema) {
            s.label = pid.clone();
        }

        let declared: Vec<(String, Value)> = data
            .declared()
            .map(|(n, v)| (n.to_owned(), v.clone()))
            .collect();
        for (name, value) in declared {
            self.set(schema, &name, value)?;
        }

        // Id sync arms only now, so a declared "id" property cannot
        // override the identifier taken from the data itself.
        if let Some(n) = self.nodes.get_mut(&node) {
            n.loaded = true;
        }

        let defaults = self.default_schema(tag)?;
        self.inherit(schema, defaults)?;

        for child in children {
            self.attach_child(node, child)?;
        }

        let hook = self.registry.get(tag).and_then(|t| t.after_load.clone());
        if let Some(hook) = hook {
            hook(self, node);
        }
        debug!(node = %node, id = %pid, "node loaded");
        Ok(())
    }

    fn default_schema(&mut self, tag: ElementTag) -> Result<SchemaId> {
        if let Some(id) = self.default_schemas.get(&tag) {
            return Ok(*id);
        }
        let ty = self.registry.get(tag).ok_or(Error::UnknownElementType(tag))?;
        let name = ty.name.clone();
        let defaults = ty.defaults.clone();
        let id = self.create_schema(format!("defaults:{name}"));
        for (n, v) in defaults {
            self.set(id, &n, v)?;
        }
        self.default_schemas.insert(tag, id);
        Ok(id)
    }

    /// Return a node to its pooled, unloaded state: detaches and unloads
    /// all children bottom-up, disconnects identifier sync, replaces the
    /// schema with a fresh detached one and clears the persistent id.
    /// Idempotent — safe on an unloaded or already-gone node.
    pub fn unload(&mut self, node: NodeId) -> Result<()> {
        let Some(n) = self.nodes.get(&node) else { return Ok(()) };
        if !n.loaded {
            return Ok(());
        }
        let kids: Vec<NodeId> = n.children.iter().copied().collect();
        for k in kids {
            self.detach_child(node, k)?;
            self.unload(k)?;
        }

        let old = self.nodes[&node].schema;
        self.drop_schema(old);
        let fresh = self.create_schema(format!("node-{node}"));
        if let Some(s) = self.schemas.get_mut(&fresh) {
            s.owner = Some(node);
        }

        if let Some(n) = self.nodes.get_mut(&node) {
            n.schema = fresh;
            n.persistent_id.clear();
            n.loaded = false;
        }
        debug!(node = %node, "node unloaded");
        Ok(())
    }

    /// Permanently destroy a node and its subtree, top-down: fires
    /// `Destroyed` once on the node (and to its ancestors), then recurses
    /// into children (each notifying only its own observers), then runs
    /// the type's teardown hook and frees storage. Repeated calls are
    /// inert.
    pub fn destroy(&mut self, node: NodeId) {
        if !self.nodes.contains_key(&node) {
            return;
        }
        let ancestors = self.ancestors(node);
        if let Some(p) = self.nodes[&node].parent {
            if let Some(pn) = self.nodes.get_mut(&p) {
                pn.children.retain(|c| *c != node);
            }
            if let Some(n) = self.nodes.get_mut(&node) {
                n.parent = None;
            }
        }
        debug!(node = %node, "node destroyed");

        self.emit_node(node, NodeEvent::Destroyed { node });
        for a in ancestors {
            self.emit_node(a, NodeEvent::Destroyed { node });
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.subscribers.clear();
        }
        self.destroy_children(node);
        self.teardown(node);
    }

    fn destroy_children(&mut self, node: NodeId) {
        let kids: Vec<NodeId> = self
            .nodes
            .get(&node)
            .map(|n| n.children.iter().copied().collect())
            .unwrap_or_default();
        for k in kids {
            // A destroy handler may already have taken this child out.
            if !self.nodes.contains_key(&k) {
                continue;
            }
            // The parent is unsubscribed before the recursion, so the
            // child's event stays with its own observers.
            self.emit_node(k, NodeEvent::Destroyed { node: k });
            if let Some(n) = self.nodes.get_mut(&k) {
                n.subscribers.clear();
            }
            self.destroy_children(k);
            self.teardown(k);
        }
    }

    fn teardown(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get(&node) else { return };
        let (tag, schema) = (n.tag, n.schema);
        let hook = self.registry.get(tag).and_then(|t| t.on_destroy.clone());
        if let Some(hook) = hook {
            hook(self, node);
        }
        self.drop_schema(schema);
        self.nodes.remove(&node);
    }

    // ========================================================================
    // Structural mutation
    // ========================================================================

    /// Make `child` an immediate child of `parent`. No-op if it already
    /// is; a node attached elsewhere is detached there first, so a node is
    /// never a child of two parents. Wraps the child's schema around the
    /// parent's and notifies `parent` and its ancestors.
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if !self.nodes.contains_key(&parent) {
            return Err(Error::NodeGone(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(Error::NodeGone(child));
        }
        if parent == child || self.is_descendant_of(parent, child) {
            return Err(Error::InvalidArgument(format!(
                "attaching {child} under {parent} would create a cycle"
            )));
        }
        if self.nodes[&child].parent == Some(parent) {
            return Ok(());
        }
        if let Some(old) = self.nodes[&child].parent {
            self.detach_child(old, child)?;
        }

        let parent_schema = self.nodes[&parent].schema;
        let child_schema = self.nodes[&child].schema;
        self.wrap(child_schema, Some(parent_schema))?;

        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        debug!(parent = %parent, child = %child, "child attached");

        let ancestors = self.ancestors(parent);
        self.emit_node(parent, NodeEvent::ChildAttached { child });
        self.emit_node(parent, NodeEvent::DescendantAttached { node: child });
        for a in ancestors {
            self.emit_node(a, NodeEvent::DescendantAttached { node: child });
        }
        Ok(())
    }

    /// Remove `child` from `parent`'s children. The child's schema is
    /// unwrapped — its properties become independent, frozen at their
    /// last-resolved values. Returns whether a removal occurred.
    pub fn detach_child(&mut self, parent: NodeId, child: NodeId) -> Result<bool> {
        if !self.nodes.contains_key(&parent) {
            return Err(Error::NodeGone(parent));
        }
        if !self.nodes.contains_key(&child) {
            return Err(Error::NodeGone(child));
        }
        if self.nodes[&child].parent != Some(parent) {
            return Ok(false);
        }

        let child_schema = self.nodes[&child].schema;
        self.wrap(child_schema, None)?;

        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = None;
        }
        debug!(parent = %parent, child = %child, "child detached");

        let ancestors = self.ancestors(parent);
        self.emit_node(child, NodeEvent::Detached { parent });
        self.emit_node(parent, NodeEvent::ChildDetached { child });
        self.emit_node(parent, NodeEvent::DescendantDetached { node: child });
        for a in ancestors {
            self.emit_node(a, NodeEvent::DescendantDetached { node: child });
        }
        Ok(true)
    }

    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut cur = self.nodes.get(&node).and_then(|n| n.parent);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.nodes.get(&p).and_then(|n| n.parent);
        }
        false
    }

    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes.get(&node).and_then(|n| n.parent);
        while let Some(p) = cur {
            out.push(p);
            cur = self.nodes.get(&p).and_then(|n| n.parent);
        }
        out
    }

    // ========================================================================
    // Node observers
    // ========================================================================

    pub fn subscribe_node(&mut self, node: NodeId, handler: NodeHandler) -> Result<SubId> {
        let id = self.next_sub_id();
        self.nodes
            .get_mut(&node)
            .ok_or(Error::NodeGone(node))?
            .subscribers
            .push((id, handler));
        Ok(id)
    }

    pub fn unsubscribe_node(&mut self, node: NodeId, sub: SubId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.subscribers.retain(|(s, _)| *s != sub);
        }
    }

    fn emit_node(&mut self, target: NodeId, event: NodeEvent) {
        let handlers: Vec<NodeHandler> = match self.nodes.get(&target) {
            Some(n) => n.subscribers.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        for h in handlers {
            h(self, target, &event);
        }
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(&node).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn persistent_id(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).map(|n| n.persistent_id.as_str())
    }

    pub fn ephemeral_id(&self, node: NodeId) -> Option<u64> {
        self.nodes.get(&node).map(|n| n.ephemeral)
    }

    pub fn is_loaded(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|n| n.loaded)
    }

    pub fn tag(&self, node: NodeId) -> Option<ElementTag> {
        self.nodes.get(&node).map(|n| n.tag)
    }

    /// Runtime type name, from the registry.
    pub fn type_name(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).and_then(|n| self.registry.type_name(n.tag))
    }

    pub fn node_schema(&self, node: NodeId) -> Option<SchemaId> {
        self.nodes.get(&node).map(|n| n.schema)
    }

    /// The value of an own (locally authored) property, if any. Values
    /// merely mirrored from an ancestor are invisible here.
    pub fn own_property(&self, node: NodeId, name: &str) -> Option<&Value> {
        let n = self.nodes.get(&node)?;
        let s = self.schemas.get(&n.schema)?;
        s.cells
            .iter()
            .find(|c| c.name == name && c.independent)
            .map(|c| &c.value)
    }

    /// Write a property on a node's schema.
    pub fn set_prop(&mut self, node: NodeId, name: &str, value: impl Into<Value>) -> Result<()> {
        let s = self.node_schema(node).ok_or(Error::NodeGone(node))?;
        self.set(s, name, value)
    }

    /// Read a property through a node's schema chain.
    pub fn get_prop(&mut self, node: NodeId, name: &str, ty: PropType) -> Result<Value> {
        let s = self.node_schema(node).ok_or(Error::NodeGone(node))?;
        self.get(s, name, ty)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Run a path query from `root`. Malformed paths and empty
    /// intermediate steps both yield an empty result.
    pub fn find(&self, root: NodeId, path: &str) -> Vec<NodeId> {
        crate::traverse::find(self, root, path)
    }

    /// Like [`find`](Scene::find), narrowed to the first result of the
    /// given element type.
    pub fn find_one(&self, root: NodeId, path: &str, tag: ElementTag) -> Option<NodeId> {
        crate::traverse::find_one(self, root, path, tag)
    }

    /// Allocation-free depth-first search by exact persistent id.
    pub fn find_fast(&self, root: NodeId, id: &str) -> Option<NodeId> {
        crate::traverse::find_fast(self, root, id)
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Compact outline instead of dumping the arenas.
        let mut roots: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        roots.sort_by_key(|id| id.0);
        let mut out = Vec::new();
        for root in &roots {
            let _ = crate::export::dump_tree(self, *root, &mut out);
        }
        write!(
            f,
            "Scene({} nodes, {} schemas)\n{}",
            self.nodes.len(),
            self.schemas.len(),
            String::from_utf8_lossy(&out)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::registry::ElementType;

    fn scene() -> Scene {
        let mut reg = ElementRegistry::new();
        reg.register(ElementTag(1), ElementType::new("Element"));
        Scene::new(reg)
    }

    #[test]
    fn test_set_creates_then_overwrites() {
        let mut sc = scene();
        let a = sc.create_schema("a");

        sc.set(a, "count", 1i64).unwrap();
        assert_eq!(sc.get(a, "count", PropType::Int).unwrap(), Value::Int(1));

        sc.set(a, "count", 2i64).unwrap();
        assert_eq!(sc.get(a, "count", PropType::Int).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_type_mismatched_write_is_ignored() {
        let mut sc = scene();
        let a = sc.create_schema("a");

        sc.set(a, "count", 1i64).unwrap();
        sc.set(a, "count", "nope").unwrap();
        assert_eq!(sc.get(a, "count", PropType::Int).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_type_mismatched_read_degrades_to_zero() {
        let mut sc = scene();
        let a = sc.create_schema("a");

        sc.set(a, "count", 7i64).unwrap();
        assert_eq!(
            sc.get(a, "count", PropType::Str).unwrap(),
            Value::Str(String::new())
        );
        // The real cell is untouched.
        assert_eq!(sc.get(a, "count", PropType::Int).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_live_link_tracks_parent_until_severed() {
        let mut sc = scene();
        let parent = sc.create_schema("parent");
        let child = sc.create_schema("child");

        sc.set(parent, "color", "red").unwrap();
        sc.wrap(child, Some(parent)).unwrap();
        assert_eq!(sc.get(child, "color", PropType::Str).unwrap(), "red".into());
        assert!(!sc.has_own(child, "color"));

        sc.set(parent, "color", "blue").unwrap();
        assert_eq!(sc.get(child, "color", PropType::Str).unwrap(), "blue".into());

        sc.set(child, "color", "green").unwrap();
        assert!(sc.has_own(child, "color"));
        sc.set(parent, "color", "yellow").unwrap();
        assert_eq!(sc.get(child, "color", PropType::Str).unwrap(), "green".into());
    }

    #[test]
    fn test_equal_value_write_still_severs() {
        let mut sc = scene();
        let parent = sc.create_schema("parent");
        let child = sc.create_schema("child");

        sc.set(parent, "n", 5i64).unwrap();
        sc.wrap(child, Some(parent)).unwrap();
        assert_eq!(sc.get(child, "n", PropType::Int).unwrap(), Value::Int(5));

        // Write the value the cell already holds: no notification, but the
        // link must be gone.
        sc.set(child, "n", 5i64).unwrap();
        sc.set(parent, "n", 9i64).unwrap();
        assert_eq!(sc.get(child, "n", PropType::Int).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_wrap_cycle_rejected() {
        let mut sc = scene();
        let a = sc.create_schema("a");
        let b = sc.create_schema("b");
        let c = sc.create_schema("c");

        sc.wrap(b, Some(a)).unwrap();
        sc.wrap(c, Some(b)).unwrap();

        assert!(matches!(sc.wrap(a, Some(a)), Err(Error::CyclicSchema { .. })));
        assert!(matches!(sc.wrap(a, Some(c)), Err(Error::CyclicSchema { .. })));
        // The failed wraps left the graph unchanged.
        assert_eq!(sc.schema(a).unwrap().parent(), None);
        assert_eq!(sc.schema(c).unwrap().parent(), Some(b));
    }

    #[test]
    fn test_wrap_none_freezes_at_last_value() {
        let mut sc = scene();
        let parent = sc.create_schema("parent");
        let child = sc.create_schema("child");

        sc.set(parent, "color", "red").unwrap();
        sc.wrap(child, Some(parent)).unwrap();
        sc.get(child, "color", PropType::Str).unwrap();

        sc.wrap(child, None).unwrap();
        assert!(sc.has_own(child, "color"));
        sc.set(parent, "color", "blue").unwrap();
        assert_eq!(sc.get(child, "color", PropType::Str).unwrap(), "red".into());
    }

    #[test]
    fn test_inherit_is_one_time_copy() {
        let mut sc = scene();
        let src = sc.create_schema("src");
        let dst = sc.create_schema("dst");

        sc.set(src, "q", 1i64).unwrap();
        sc.set(dst, "kept", "local").unwrap();
        sc.inherit(dst, src).unwrap();

        assert_eq!(sc.get(dst, "q", PropType::Int).unwrap(), Value::Int(1));
        assert!(sc.has_own(dst, "q"));

        sc.set(src, "q", 2i64).unwrap();
        assert_eq!(sc.get(dst, "q", PropType::Int).unwrap(), Value::Int(1));
        assert_eq!(sc.get(dst, "kept", PropType::Str).unwrap(), "local".into());
    }

    #[test]
    fn test_inherit_walks_full_chain_nearest_wins() {
        let mut sc = scene();
        let grand = sc.create_schema("grand");
        let mid = sc.create_schema("mid");
        let dst = sc.create_schema("dst");

        sc.set(grand, "a", 1i64).unwrap();
        sc.set(grand, "b", 10i64).unwrap();
        sc.set(mid, "a", 2i64).unwrap();
        sc.wrap(mid, Some(grand)).unwrap();

        sc.inherit(dst, mid).unwrap();
        assert_eq!(sc.get(dst, "a", PropType::Int).unwrap(), Value::Int(2));
        assert_eq!(sc.get(dst, "b", PropType::Int).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_property_change_notification() {
        let mut sc = scene();
        let a = sc.create_schema("a");
        sc.set(a, "n", 1i64).unwrap();

        let seen: Rc<RefCell<Vec<(Value, Value)>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        sc.subscribe_property(
            a,
            "n",
            Rc::new(move |_, change| {
                sink.borrow_mut().push((change.old.clone(), change.new.clone()));
            }),
        )
        .unwrap();

        sc.set(a, "n", 2i64).unwrap();
        sc.set(a, "n", 2i64).unwrap(); // equal value: suppressed
        sc.set(a, "n", 3i64).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (Value::Int(1), Value::Int(2)),
                (Value::Int(2), Value::Int(3)),
            ]
        );
    }

    #[test]
    fn test_linked_cell_notifies_on_parent_change() {
        let mut sc = scene();
        let parent = sc.create_schema("parent");
        let child = sc.create_schema("child");

        sc.set(parent, "n", 1i64).unwrap();
        sc.wrap(child, Some(parent)).unwrap();
        sc.get(child, "n", PropType::Int).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        sc.subscribe_property(
            child,
            "n",
            Rc::new(move |_, change| sink.borrow_mut().push(change.new.clone())),
        )
        .unwrap();

        sc.set(parent, "n", 2i64).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::Int(2)]);
    }

    #[test]
    fn test_local_added_fires_on_first_definition_only() {
        let mut sc = scene();
        let a = sc.create_schema("a");

        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        sc.subscribe_schema(
            a,
            Rc::new(move |_, _, name| sink.borrow_mut().push(name.to_owned())),
        )
        .unwrap();

        sc.set(a, "x", 1i64).unwrap();
        sc.set(a, "x", 2i64).unwrap();
        sc.get_own(a, "y", "seed").unwrap();

        assert_eq!(*seen.borrow(), vec!["x".to_owned(), "y".to_owned()]);
    }

    #[test]
    fn test_no_duplicate_parentage() {
        let mut sc = scene();
        let a = sc.create_node(ElementTag(1)).unwrap();
        let b = sc.create_node(ElementTag(1)).unwrap();
        let x = sc.create_node(ElementTag(1)).unwrap();

        sc.attach_child(a, x).unwrap();
        sc.attach_child(b, x).unwrap();

        assert_eq!(sc.parent(x), Some(b));
        assert!(!sc.children(a).contains(&x));
        assert_eq!(sc.children(b), &[x]);
    }

    #[test]
    fn test_attach_cycle_rejected() {
        let mut sc = scene();
        let a = sc.create_node(ElementTag(1)).unwrap();
        let b = sc.create_node(ElementTag(1)).unwrap();
        sc.attach_child(a, b).unwrap();

        assert!(matches!(sc.attach_child(b, a), Err(Error::InvalidArgument(_))));
        assert!(matches!(sc.attach_child(a, a), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_destroy_is_inert_when_repeated() {
        let mut sc = scene();
        let a = sc.create_node(ElementTag(1)).unwrap();
        let b = sc.create_node(ElementTag(1)).unwrap();
        sc.attach_child(a, b).unwrap();

        sc.destroy(a);
        assert!(!sc.contains(a));
        assert!(!sc.contains(b));
        sc.destroy(a); // second call: nothing to do, no panic
    }

    #[test]
    fn test_unload_is_idempotent_and_resets_schema() {
        let mut sc = scene();
        let a = sc.create_node(ElementTag(1)).unwrap();
        sc.load(a, &NodeData::new().with_id("a").with_property("x", 1i64), vec![])
            .unwrap();
        assert!(sc.is_loaded(a));

        let old_schema = sc.node_schema(a).unwrap();
        sc.unload(a).unwrap();
        sc.unload(a).unwrap();

        assert!(!sc.is_loaded(a));
        assert_eq!(sc.persistent_id(a), Some(""));
        assert!(sc.schema(old_schema).is_none());
        assert!(!sc.has_own(sc.node_schema(a).unwrap(), "x"));
    }

    #[test]
    fn test_persistent_id_syncs_from_schema() {
        let mut sc = scene();
        let a = sc.create_node(ElementTag(1)).unwrap();
        sc.load(a, &NodeData::new().with_id("before"), vec![]).unwrap();

        let schema = sc.node_schema(a).unwrap();
        sc.set(schema, "id", "after").unwrap();
        assert_eq!(sc.persistent_id(a), Some("after"));

        sc.unload(a).unwrap();
        assert_eq!(sc.persistent_id(a), Some(""));
    }

    #[test]
    fn test_generated_persistent_id_when_absent() {
        let mut sc = scene();
        let a = sc.create_node(ElementTag(1)).unwrap();
        sc.load(a, &NodeData::new(), vec![]).unwrap();
        assert!(!sc.persistent_id(a).unwrap().is_empty());
    }

    #[test]
    fn test_reentrant_set_from_property_handler() {
        let mut sc = scene();
        let a = sc.create_schema("a");
        let b = sc.create_schema("b");
        sc.set(a, "n", 1i64).unwrap();
        sc.set(b, "mirror", 0i64).unwrap();

        sc.subscribe_property(
            a,
            "n",
            Rc::new(move |scene, change| {
                scene.set(b, "mirror", change.new.clone()).unwrap();
            }),
        )
        .unwrap();

        sc.set(a, "n", 42i64).unwrap();
        assert_eq!(sc.get(b, "mirror", PropType::Int).unwrap(), Value::Int(42));
    }
}
