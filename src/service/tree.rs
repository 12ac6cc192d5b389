//! Tree derivation over Figma documents
//!
//! Depth-limited cloning and ID lookup. Both walk the tree with an explicit
//! work stack, so a pathologically deep document cannot overflow the call
//! stack.

use std::collections::{HashMap, HashSet};

use crate::figma::{FileDocument, Node};

/// Copy of a node without its children
fn shallow_clone(node: &Node) -> Node {
    Node {
        id: node.id.clone(),
        node_type: node.node_type.clone(),
        children: None,
        properties: node.properties.clone(),
    }
}

/// Clone a subtree, keeping at most `depth` levels below `node`
///
/// `None` keeps the whole subtree, `Some(0)` keeps only the node itself.
/// Nodes without children (or with an empty list) come back as leaves with
/// no `children` field.
pub fn clone_with_depth(node: &Node, depth: Option<u32>) -> Node {
    let mut root = shallow_clone(node);
    let mut work: Vec<(&mut Node, &Node, Option<u32>)> = vec![(&mut root, node, depth)];

    while let Some((target, source, depth)) = work.pop() {
        if !source.has_children() || depth == Some(0) {
            continue;
        }
        let child_depth = depth.map(|d| d - 1);
        let children = target
            .children
            .insert(source.child_nodes().iter().map(shallow_clone).collect());
        for (clone, child) in children.iter_mut().zip(source.child_nodes()) {
            work.push((clone, child, child_depth));
        }
    }

    root
}

/// Apply a depth limit to a whole file
pub fn truncate_file(file: FileDocument, depth: Option<u32>) -> FileDocument {
    match depth {
        None => file,
        Some(_) => FileDocument {
            document: clone_with_depth(&file.document, depth),
            ..file
        },
    }
}

/// Find nodes by ID
///
/// Stops as soon as every requested ID has been seen. IDs that do not exist
/// are simply missing from the result.
pub fn find_by_ids<'a>(root: &'a Node, ids: &HashSet<&str>) -> HashMap<&'a str, &'a Node> {
    let mut found = HashMap::with_capacity(ids.len());
    let mut stack = vec![root];

    while found.len() < ids.len() {
        let Some(node) = stack.pop() else {
            break;
        };
        if ids.contains(node.id.as_str()) {
            found.entry(node.id.as_str()).or_insert(node);
        }
        stack.extend(node.child_nodes().iter().rev());
    }

    found
}
