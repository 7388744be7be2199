//! Key Extractor - Find every keyed element under a set of nodes.
//!
//! Traversal uses an explicit stack so arbitrarily deep trees cannot
//! overflow the call stack. Results are in document order per candidate,
//! candidates in the order given. A keyed element's keyed descendants are
//! collected too.

use crate::tree::Node;
use crate::types::KeyedEntry;

/// Every element in `nodes` (and their descendants) carrying `key`.
///
/// Non-element nodes never match, but their children are still walked.
pub fn collect_keyed(nodes: &[Node], key: &str) -> Vec<Node> {
    let mut found = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    for candidate in nodes {
        stack.push(candidate.clone());
        while let Some(node) = stack.pop() {
            if node.is_element() && node.has_attribute(key) {
                found.push(node.clone());
            }
            // Reversed so the first child is popped first.
            stack.extend(node.children().into_iter().rev());
        }
    }
    found
}

/// Every keyed descendant of `root`, excluding `root` itself, in document order.
pub fn collect_keyed_descendants(root: &Node, key: &str) -> Vec<Node> {
    collect_keyed(&root.children(), key)
}

/// Pair each node with its current key value.
///
/// Nodes that lost the key attribute since collection are skipped.
pub fn keyed_entries(nodes: Vec<Node>, key: &str) -> Vec<KeyedEntry> {
    nodes
        .into_iter()
        .filter_map(|node| {
            let value = node.get_attribute(key)?;
            Some(KeyedEntry { node, key: value })
        })
        .collect()
}
