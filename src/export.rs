//! # Tree export.
//!
//! Debug-oriented outline dump of a subtree: one line per node with its
//! persistent id, element type name and locally authored properties.

use std::io::Write;

use crate::Result;
use crate::model::NodeId;
use crate::scene::Scene;

/// Write an indented outline of the subtree rooted at `root`.
///
/// Only own properties appear, sorted by name; values mirrored from an
/// ancestor are part of the ancestor's line, not the node's. Unknown
/// nodes produce no output.
pub fn dump_tree(scene: &Scene, root: NodeId, out: &mut dyn Write) -> Result<()> {
    dump_node(scene, root, 0, out)
}

fn dump_node(scene: &Scene, node: NodeId, indent: usize, out: &mut dyn Write) -> Result<()> {
    if !scene.contains(node) {
        return Ok(());
    }
    let pid = scene.persistent_id(node).unwrap_or("");
    let ty = scene.type_name(node).unwrap_or("?");

    let mut props: Vec<(String, String)> = scene
        .node_schema(node)
        .and_then(|s| scene.schema(s))
        .map(|s| {
            s.own_properties()
                .map(|(n, v)| (n.to_owned(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();
    props.sort();

    let pad = "  ".repeat(indent);
    write!(out, "{pad}{pid} [{ty}]")?;
    for (name, value) in &props {
        write!(out, " {name}={value}")?;
    }
    writeln!(out)?;

    for child in scene.children(node) {
        dump_node(scene, *child, indent + 1, out)?;
    }
    Ok(())
}
