//! Node - Handles into the observed tree.
//!
//! A [`Node`] is a cheap, clonable handle (`Rc`) to one node of a mutable
//! tree. Parents own their children; children point back to their parent
//! weakly. Equality is identity: two handles are equal when they refer to the
//! same node.
//!
//! Every structural or attribute mutation made through a handle queues a
//! [`MutationRecord`](super::MutationRecord) for each interested
//! [`MutationObserver`](super::MutationObserver). Records are delivered later,
//! from [`deliver_mutations`](super::deliver_mutations).
//!
//! # Example
//!
//! ```ignore
//! use keyed_sync::tree::Node;
//!
//! let root = Node::element("div");
//! let item = Node::element("li").with_attribute("data-id", "1");
//! root.append_child(&item)?;
//!
//! assert_eq!(item.parent(), Some(root.clone()));
//! assert_eq!(item.get_attribute("data-id").as_deref(), Some("1"));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use tracing::warn;

use super::markup;
use super::observer::{queue_mutation, MutationKind, Registration};
use crate::error::{Result, TreeError};

// =============================================================================
// Node Data
// =============================================================================

/// Node type discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Element with a tag name, attributes and children.
    Element,
    /// Character data. Never has children or attributes.
    Text,
    /// Detached container whose children move as a group on insertion.
    Fragment,
}

enum NodeKind {
    Element { tag: String },
    Text { data: String },
    Fragment,
}

pub(crate) struct NodeData {
    kind: NodeKind,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
    parent: Weak<RefCell<NodeData>>,
    pub(super) registrations: Vec<Registration>,
}

impl Drop for NodeData {
    // Unlink descendants with an explicit stack so dropping a deep tree
    // cannot exhaust the call stack.
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(node) = stack.pop() {
            if let Ok(cell) = Rc::try_unwrap(node.0) {
                let mut data = cell.into_inner();
                stack.append(&mut data.children);
            }
        }
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Strong handle to a tree node.
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

/// Weak handle to a tree node. Does not keep the node alive.
#[derive(Clone, Default)]
pub struct WeakNode(Weak<RefCell<NodeData>>);

impl WeakNode {
    /// Upgrade to a strong handle if the node is still alive.
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({node:?})"),
            None => f.write_str("WeakNode(<dropped>)"),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        match &data.kind {
            NodeKind::Element { tag } => {
                write!(f, "<{tag}")?;
                for (name, value) in &data.attributes {
                    write!(f, " {name}=\"{value}\"")?;
                }
                write!(f, "> ({} children)", data.children.len())
            }
            NodeKind::Text { data } => write!(f, "#text {data:?}"),
            NodeKind::Fragment => write!(f, "#fragment ({} children)", data.children.len()),
        }
    }
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self(Rc::new(RefCell::new(NodeData {
            kind,
            attributes: Vec::new(),
            children: Vec::new(),
            parent: Weak::new(),
            registrations: Vec::new(),
        })))
    }

    /// Create a detached element. Tag names are ASCII-lowercased.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::new(NodeKind::Element {
            tag: tag.into().to_ascii_lowercase(),
        })
    }

    /// Create a detached text node.
    pub fn text(data: impl Into<String>) -> Self {
        Self::new(NodeKind::Text { data: data.into() })
    }

    /// Create an empty fragment.
    pub fn fragment() -> Self {
        Self::new(NodeKind::Fragment)
    }

    /// Builder: set an attribute. No-op on non-element nodes.
    pub fn with_attribute(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Err(err) = self.set_attribute(name, value) {
            warn!(node = ?self, error = %err, "with_attribute ignored");
        }
        self
    }

    /// Builder: append a child. No-op (logged) if the append is illegal.
    pub fn with_child(self, child: Node) -> Self {
        if let Err(err) = self.append_child(&child) {
            warn!(node = ?self, error = %err, "with_child ignored");
        }
        self
    }

    /// Get a weak handle.
    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    pub(super) fn data(&self) -> &RefCell<NodeData> {
        &self.0
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn node_type(&self) -> NodeType {
        match self.0.borrow().kind {
            NodeKind::Element { .. } => NodeType::Element,
            NodeKind::Text { .. } => NodeType::Text,
            NodeKind::Fragment => NodeType::Fragment,
        }
    }

    pub fn is_element(&self) -> bool {
        self.node_type() == NodeType::Element
    }

    /// Tag name for elements.
    pub fn tag_name(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element { tag } => Some(tag.clone()),
            _ => None,
        }
    }

    /// Character data for text nodes.
    pub fn text_data(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Text { data } => Some(data.clone()),
            _ => None,
        }
    }

    /// Concatenated character data of all descendant text nodes, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let data = node.0.borrow();
            if let NodeKind::Text { data } = &data.kind {
                out.push_str(data);
            }
            stack.extend(data.children.iter().rev().cloned());
        }
        out
    }

    pub fn get_attribute(&self, name: &str) -> Option<String> {
        self.0
            .borrow()
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.borrow().attributes.iter().any(|(n, _)| n == name)
    }

    /// All attributes in insertion order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.0.borrow().attributes.clone()
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.upgrade().map(Node)
    }

    /// Identity comparison.
    pub fn same_node(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// True if `other` is this node or one of its descendants.
    pub fn contains(&self, other: &Node) -> bool {
        let mut current = Some(other.clone());
        while let Some(node) = current {
            if node.same_node(self) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    fn index_of(&self, child: &Node) -> Option<usize> {
        self.0
            .borrow()
            .children
            .iter()
            .position(|c| c.same_node(child))
    }

    fn can_have_children(&self) -> bool {
        !matches!(self.0.borrow().kind, NodeKind::Text { .. })
    }

    // =========================================================================
    // Attribute Mutations
    // =========================================================================

    /// Set an attribute, queueing an attribute record with the previous value.
    pub fn set_attribute(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> std::result::Result<(), TreeError> {
        let name = name.into();
        let value = value.into();
        let old_value = {
            let mut data = self.0.borrow_mut();
            if !matches!(data.kind, NodeKind::Element { .. }) {
                return Err(TreeError::NotAnElement);
            }
            match data.attributes.iter_mut().find(|(n, _)| *n == name) {
                Some((_, v)) => Some(std::mem::replace(v, value)),
                None => {
                    data.attributes.push((name.clone(), value));
                    None
                }
            }
        };
        queue_mutation(self, MutationKind::Attributes { name, old_value });
        Ok(())
    }

    /// Remove an attribute. Returns whether it existed; records only when it did.
    pub fn remove_attribute(&self, name: &str) -> std::result::Result<bool, TreeError> {
        let old_value = {
            let mut data = self.0.borrow_mut();
            if !matches!(data.kind, NodeKind::Element { .. }) {
                return Err(TreeError::NotAnElement);
            }
            match data.attributes.iter().position(|(n, _)| n == name) {
                Some(index) => data.attributes.remove(index).1,
                None => return Ok(false),
            }
        };
        queue_mutation(
            self,
            MutationKind::Attributes {
                name: name.to_string(),
                old_value: Some(old_value),
            },
        );
        Ok(true)
    }

    // =========================================================================
    // Structural Mutations
    // =========================================================================

    /// Append `child` as the last child. See [`Node::insert_before`].
    pub fn append_child(&self, child: &Node) -> std::result::Result<(), TreeError> {
        self.insert_before(child, None)
    }

    /// Insert `child` before `reference` (or at the end when `None`).
    ///
    /// - Fragments are emptied into this node; one record lists all their children.
    /// - An attached child is first removed from its current parent, which
    ///   records that removal on the old parent.
    pub fn insert_before(
        &self,
        child: &Node,
        reference: Option<&Node>,
    ) -> std::result::Result<(), TreeError> {
        if !self.can_have_children() {
            return Err(TreeError::HierarchyRequest("text nodes cannot have children"));
        }
        if child.contains(self) {
            return Err(TreeError::HierarchyRequest(
                "a node cannot be inserted into itself or its descendants",
            ));
        }
        if let Some(reference) = reference {
            if self.index_of(reference).is_none() {
                return Err(TreeError::NotFound);
            }
        }

        // Inserting a node before itself means inserting before its next sibling.
        let reference = match reference {
            Some(r) if r.same_node(child) => {
                let siblings = self.children();
                let index = self.index_of(r).unwrap_or(siblings.len());
                siblings.get(index + 1).cloned()
            }
            other => other.cloned(),
        };

        let nodes = if child.node_type() == NodeType::Fragment {
            child.take_children_unobserved()
        } else {
            if let Some(old_parent) = child.parent() {
                old_parent.remove_child(child)?;
            }
            vec![child.clone()]
        };
        if nodes.is_empty() {
            return Ok(());
        }

        {
            let weak_self = Rc::downgrade(&self.0);
            for node in &nodes {
                node.0.borrow_mut().parent = weak_self.clone();
            }
            let index = reference
                .as_ref()
                .and_then(|r| self.index_of(r))
                .unwrap_or_else(|| self.child_count());
            let mut data = self.0.borrow_mut();
            let tail = data.children.split_off(index);
            data.children.extend(nodes.iter().cloned());
            data.children.extend(tail);
        }

        queue_mutation(
            self,
            MutationKind::ChildList {
                added: nodes,
                removed: Vec::new(),
            },
        );
        Ok(())
    }

    /// Remove `child` from this node and return it.
    pub fn remove_child(&self, child: &Node) -> std::result::Result<Node, TreeError> {
        let index = self.index_of(child).ok_or(TreeError::NotFound)?;
        let removed = self.0.borrow_mut().children.remove(index);
        removed.0.borrow_mut().parent = Weak::new();

        queue_mutation(
            self,
            MutationKind::ChildList {
                added: Vec::new(),
                removed: vec![removed.clone()],
            },
        );
        Ok(removed)
    }

    /// Detach this node from its parent, if any.
    pub fn remove(&self) {
        if let Some(parent) = self.parent() {
            if let Err(err) = parent.remove_child(self) {
                warn!(node = ?self, error = %err, "remove failed");
            }
        }
    }

    /// Replace all children at once, queueing a single record that lists every
    /// removed and every added node. This is the shape of a bulk markup swap.
    pub fn replace_children<I>(&self, nodes: I) -> std::result::Result<(), TreeError>
    where
        I: IntoIterator<Item = Node>,
    {
        if !self.can_have_children() {
            return Err(TreeError::HierarchyRequest("text nodes cannot have children"));
        }
        let requested: Vec<Node> = nodes.into_iter().collect();
        if requested.iter().any(|n| n.contains(self)) {
            return Err(TreeError::HierarchyRequest(
                "a node cannot be inserted into itself or its descendants",
            ));
        }

        let mut added: Vec<Node> = Vec::with_capacity(requested.len());
        for node in requested {
            if node.node_type() == NodeType::Fragment {
                added.extend(node.take_children_unobserved());
                continue;
            }
            if added.iter().any(|n| n.same_node(&node)) {
                continue;
            }
            match node.parent() {
                Some(parent) if !parent.same_node(self) => {
                    parent.remove_child(&node)?;
                }
                _ => {}
            }
            added.push(node);
        }

        let removed = {
            let weak_self = Rc::downgrade(&self.0);
            let mut data = self.0.borrow_mut();
            let removed = std::mem::take(&mut data.children);
            for node in &removed {
                node.0.borrow_mut().parent = Weak::new();
            }
            for node in &added {
                node.0.borrow_mut().parent = weak_self.clone();
            }
            data.children = added.clone();
            removed
        };

        if !added.is_empty() || !removed.is_empty() {
            queue_mutation(self, MutationKind::ChildList { added, removed });
        }
        Ok(())
    }

    /// Parse `markup` and replace all children with the result.
    pub fn set_inner_markup(&self, markup: &str) -> Result<()> {
        let nodes = markup::parse_fragment(markup)?;
        self.replace_children(nodes)?;
        Ok(())
    }

    // =========================================================================
    // Unobserved Linkage
    // =========================================================================

    /// Append a freshly created, parentless node without queueing a record.
    pub(super) fn adopt(&self, child: Node) {
        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(child);
    }

    /// Set an attribute on a freshly created node without queueing a record.
    pub(super) fn adopt_attribute(&self, name: String, value: String) {
        self.0.borrow_mut().attributes.push((name, value));
    }

    fn take_children_unobserved(&self) -> Vec<Node> {
        let children = std::mem::take(&mut self.0.borrow_mut().children);
        for child in &children {
            child.0.borrow_mut().parent = Weak::new();
        }
        children
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(key: &str) -> Node {
        Node::element("div").with_attribute("data-id", key)
    }

    #[test]
    fn test_append_and_parent() {
        let root = Node::element("DIV");
        let child = keyed("1");
        root.append_child(&child).unwrap();

        assert_eq!(root.tag_name().as_deref(), Some("div"));
        assert_eq!(root.child_count(), 1);
        assert_eq!(child.parent(), Some(root.clone()));
        assert!(root.contains(&child));
        assert!(!child.contains(&root));
    }

    #[test]
    fn test_insert_before_order() {
        let root = Node::element("ul");
        let a = keyed("a");
        let c = keyed("c");
        root.append_child(&a).unwrap();
        root.append_child(&c).unwrap();

        let b = keyed("b");
        root.insert_before(&b, Some(&c)).unwrap();

        let keys: Vec<_> = root
            .children()
            .iter()
            .filter_map(|n| n.get_attribute("data-id"))
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_before_unknown_reference() {
        let root = Node::element("ul");
        let stranger = keyed("x");
        let result = root.insert_before(&keyed("a"), Some(&stranger));
        assert_eq!(result, Err(TreeError::NotFound));
    }

    #[test]
    fn test_move_between_parents() {
        let left = Node::element("div");
        let right = Node::element("div");
        let item = keyed("1");
        left.append_child(&item).unwrap();
        right.append_child(&item).unwrap();

        assert_eq!(left.child_count(), 0);
        assert_eq!(right.child_count(), 1);
        assert_eq!(item.parent(), Some(right));
    }

    #[test]
    fn test_fragment_moves_children() {
        let root = Node::element("div");
        let frag = Node::fragment().with_child(keyed("a")).with_child(keyed("b"));
        root.append_child(&frag).unwrap();

        assert_eq!(frag.child_count(), 0);
        assert_eq!(root.child_count(), 2);
        assert!(root.children().iter().all(|c| c.parent() == Some(root.clone())));
    }

    #[test]
    fn test_hierarchy_errors() {
        let parent = Node::element("div");
        let child = Node::element("span");
        parent.append_child(&child).unwrap();

        assert!(matches!(
            child.append_child(&parent),
            Err(TreeError::HierarchyRequest(_))
        ));
        assert!(matches!(
            parent.append_child(&parent),
            Err(TreeError::HierarchyRequest(_))
        ));

        let text = Node::text("hi");
        assert!(matches!(
            text.append_child(&Node::element("b")),
            Err(TreeError::HierarchyRequest(_))
        ));
        assert_eq!(text.set_attribute("a", "b"), Err(TreeError::NotAnElement));
    }

    #[test]
    fn test_remove_child_not_found() {
        let root = Node::element("div");
        assert_eq!(root.remove_child(&keyed("1")), Err(TreeError::NotFound));
    }

    #[test]
    fn test_remove_detaches_once() {
        let root = Node::element("div");
        let child = keyed("1");
        root.append_child(&child).unwrap();

        child.remove();
        assert_eq!(child.parent(), None);
        assert!(root.children().is_empty());

        // Already detached.
        child.remove();
        assert_eq!(child.parent(), None);
    }

    #[test]
    fn test_attributes() {
        let node = Node::element("div");
        node.set_attribute("data-id", "1").unwrap();
        node.set_attribute("data-v", "a").unwrap();
        node.set_attribute("data-v", "b").unwrap();

        assert_eq!(node.get_attribute("data-v").as_deref(), Some("b"));
        assert_eq!(
            node.attributes(),
            vec![
                ("data-id".to_string(), "1".to_string()),
                ("data-v".to_string(), "b".to_string()),
            ]
        );

        assert_eq!(node.remove_attribute("data-v"), Ok(true));
        assert_eq!(node.remove_attribute("data-v"), Ok(false));
        assert!(!node.has_attribute("data-v"));
    }

    #[test]
    fn test_replace_children() {
        let root = Node::element("div");
        let old = keyed("old");
        root.append_child(&old).unwrap();

        let new_a = keyed("a");
        let new_b = keyed("b");
        root.replace_children([new_a.clone(), new_b.clone()]).unwrap();

        assert_eq!(root.children(), vec![new_a, new_b]);
        assert_eq!(old.parent(), None);
    }

    #[test]
    fn test_replace_children_keeps_reinserted_child() {
        let root = Node::element("div");
        let keep = keyed("keep");
        let drop_me = keyed("drop");
        root.append_child(&keep).unwrap();
        root.append_child(&drop_me).unwrap();

        root.replace_children([keep.clone()]).unwrap();

        assert_eq!(root.children(), vec![keep.clone()]);
        assert_eq!(keep.parent(), Some(root));
        assert_eq!(drop_me.parent(), None);
    }

    #[test]
    fn test_text_content() {
        let root = Node::element("p")
            .with_child(Node::text("hello "))
            .with_child(Node::element("b").with_child(Node::text("world")));
        assert_eq!(root.text_content(), "hello world");
    }

    #[test]
    fn test_deep_tree_drop() {
        let mut node = Node::element("div");
        for _ in 0..100_000 {
            node = Node::element("div").with_child(node);
        }
        drop(node);
    }
}
