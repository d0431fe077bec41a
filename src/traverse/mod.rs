//! # Tree traversal and path queries.
//!
//! Three entry points over a [`Scene`](crate::scene::Scene) tree:
//!
//! - [`find`] — run a compiled path query, returning every match in
//!   discovery order.
//! - [`find_one`] — same, narrowed to the first match of a given element
//!   type.
//! - [`find_fast`] — allocation-free depth-first search by exact
//!   persistent id, for hot paths that would otherwise pay for query
//!   compilation.
//!
//! Malformed query paths never panic or error out of a traversal: they
//! resolve to an empty result, logged at trace level.

use tracing::trace;

use crate::model::NodeId;
use crate::query::{Step, compile};
use crate::registry::ElementTag;
use crate::scene::Scene;

/// Maximum tree depth [`find_fast`] will descend to.
pub const MAX_DEPTH: usize = 128;

// ============================================================================
// Path queries
// ============================================================================

/// Evaluate `path` against the subtree rooted at `root`.
///
/// Each step narrows a working set: a plain step matches immediate
/// children, a `..`-prefixed step matches all descendants. Results are in
/// discovery order, deduplicated. An unparsable path yields no matches.
pub fn find(scene: &Scene, root: NodeId, path: &str) -> Vec<NodeId> {
    let steps = match compile(path) {
        Ok(steps) => steps,
        Err(err) => {
            trace!(path, %err, "query rejected");
            return Vec::new();
        }
    };
    run(scene, root, &steps)
}

/// [`find`] narrowed to the first match of element type `tag`.
pub fn find_one(scene: &Scene, root: NodeId, path: &str, tag: ElementTag) -> Option<NodeId> {
    find(scene, root, path)
        .into_iter()
        .find(|n| scene.tag(*n) == Some(tag))
}

fn run(scene: &Scene, root: NodeId, steps: &[Step]) -> Vec<NodeId> {
    if !scene.contains(root) {
        return Vec::new();
    }
    let mut current = vec![root];
    for step in steps {
        let mut next: Vec<NodeId> = Vec::new();
        for node in &current {
            if step.recursive {
                for candidate in descendants(scene, *node) {
                    if step.expr.matches(scene, candidate) && !next.contains(&candidate) {
                        next.push(candidate);
                    }
                }
            } else {
                for child in scene.children(*node) {
                    if step.expr.matches(scene, *child) && !next.contains(child) {
                        next.push(*child);
                    }
                }
            }
        }
        if next.is_empty() {
            return next;
        }
        current = next;
    }
    current
}

/// All strict descendants of `node` in preorder.
fn descendants(scene: &Scene, node: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack: Vec<NodeId> = scene.children(node).iter().rev().copied().collect();
    while let Some(n) = stack.pop() {
        out.push(n);
        stack.extend(scene.children(n).iter().rev().copied());
    }
    out
}

// ============================================================================
// find_fast
// ============================================================================

/// Depth-first search for the node whose persistent id equals `id`.
///
/// Runs without heap allocation: a fixed cursor array tracks the child
/// index at each level, so the walk needs no visit stack and no recursion.
/// Subtrees deeper than [`MAX_DEPTH`] are not descended into.
pub fn find_fast(scene: &Scene, root: NodeId, id: &str) -> Option<NodeId> {
    if !scene.contains(root) {
        return None;
    }
    if scene.persistent_id(root) == Some(id) {
        return Some(root);
    }

    let mut cursor = [0usize; MAX_DEPTH];
    let mut depth = 0usize;
    let mut current = root;

    loop {
        let kids = scene.children(current);
        if cursor[depth] < kids.len() && depth + 1 < MAX_DEPTH {
            // Descend into the next unvisited child at this level.
            current = kids[cursor[depth]];
            depth += 1;
            cursor[depth] = 0;
            if scene.persistent_id(current) == Some(id) {
                return Some(current);
            }
        } else {
            // Level exhausted (or depth capped): climb and advance.
            if depth == 0 {
                return None;
            }
            depth -= 1;
            cursor[depth] += 1;
            current = scene.parent(current)?;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
