use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostNodeId(u64);

impl fmt::Display for HostNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostNodeKind {
    Element {
        tag: String,
        attrs: FxHashMap<String, String>,
    },
    Text(String),
    /// Transparent grouping node produced by fragments.
    Container,
    /// Zero-size node produced by null content.
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct HostNode {
    pub id: HostNodeId,
    pub kind: HostNodeKind,
    pub parent: Option<HostNodeId>,
    pub children: Vec<HostNodeId>,
    pub committed: bool,
}

/// Arena of host nodes. Detached nodes stay in the arena with their
/// subtree intact so they can be reattached without re-rendering;
/// `remove` is the destructive counterpart.
pub struct HostTree {
    nodes: FxHashMap<HostNodeId, HostNode>,
    next_id: u64,
}

impl HostTree {
    pub fn new() -> Self {
        Self { nodes: FxHashMap::default(), next_id: 0 }
    }

    fn insert(&mut self, kind: HostNodeKind) -> HostNodeId {
        self.next_id += 1;
        let id = HostNodeId(self.next_id);
        self.nodes.insert(
            id,
            HostNode { id, kind, parent: None, children: Vec::new(), committed: false },
        );
        id
    }

    pub fn create_element(&mut self, tag: &str, attrs: FxHashMap<String, String>) -> HostNodeId {
        self.insert(HostNodeKind::Element { tag: tag.to_string(), attrs })
    }

    pub fn create_text(&mut self, content: &str) -> HostNodeId {
        self.insert(HostNodeKind::Text(content.to_string()))
    }

    pub fn create_container(&mut self) -> HostNodeId {
        self.insert(HostNodeKind::Container)
    }

    pub fn create_placeholder(&mut self) -> HostNodeId {
        self.insert(HostNodeKind::Placeholder)
    }

    pub fn node(&self, id: HostNodeId) -> Option<&HostNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: HostNodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn child_index(&self, id: HostNodeId) -> Option<usize> {
        let parent = self.nodes.get(&id)?.parent?;
        self.nodes.get(&parent)?.children.iter().position(|c| *c == id)
    }

    /// Appends `child` to `parent`'s children.
    pub fn attach(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), RenderError> {
        let index = self
            .nodes
            .get(&parent)
            .ok_or_else(|| RenderError::missing_host_node(parent.to_string()))?
            .children
            .len();
        self.attach_at(parent, child, index)
    }

    /// Inserts `child` among `parent`'s children at `index`, clamped to
    /// the current child count.
    pub fn attach_at(
        &mut self,
        parent: HostNodeId,
        child: HostNodeId,
        index: usize,
    ) -> Result<(), RenderError> {
        if !self.nodes.contains_key(&parent) {
            return Err(RenderError::missing_host_node(parent.to_string()));
        }
        let child_node = self
            .nodes
            .get_mut(&child)
            .ok_or_else(|| RenderError::missing_host_node(child.to_string()))?;
        if let Some(existing) = child_node.parent {
            return Err(RenderError::internal(format!(
                "{child} is already attached to {existing}"
            )));
        }
        child_node.parent = Some(parent);

        let parent_node = self.nodes.get_mut(&parent).ok_or_else(|| {
            RenderError::missing_host_node(parent.to_string())
        })?;
        let index = index.min(parent_node.children.len());
        parent_node.children.insert(index, child);
        Ok(())
    }

    /// Removes `id` from its parent without destroying it. Returns the
    /// child index the node occupied so it can be reattached at its
    /// prior position.
    pub fn detach(&mut self, id: HostNodeId) -> Result<usize, RenderError> {
        let parent = self
            .nodes
            .get(&id)
            .ok_or_else(|| RenderError::missing_host_node(id.to_string()))?
            .parent
            .ok_or_else(|| RenderError::not_mounted(id.to_string()))?;

        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or_else(|| RenderError::missing_host_node(parent.to_string()))?;
        let index = parent_node
            .children
            .iter()
            .position(|c| *c == id)
            .ok_or_else(|| RenderError::not_mounted(id.to_string()))?;
        parent_node.children.remove(index);

        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = None;
        }
        Ok(index)
    }

    /// Detaches `id` if attached and destroys it together with its
    /// entire subtree.
    pub fn remove(&mut self, id: HostNodeId) -> Result<(), RenderError> {
        if !self.nodes.contains_key(&id) {
            return Err(RenderError::missing_host_node(id.to_string()));
        }
        if self.nodes.get(&id).and_then(|n| n.parent).is_some() {
            self.detach(id)?;
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    /// Marks a rendered subtree as committed to the live tree.
    pub fn mark_committed(&mut self, id: HostNodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&current) {
                node.committed = true;
                stack.extend(node.children.iter().copied());
            }
        }
    }

    pub fn is_committed(&self, id: HostNodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.committed)
    }

    /// HTML-like snapshot of a subtree, used by diagnostics and tests.
    /// Attributes are emitted in sorted order so output is stable.
    pub fn markup(&self, id: HostNodeId) -> String {
        let mut out = String::new();
        self.write_markup(id, &mut out);
        out
    }

    fn write_markup(&self, id: HostNodeId, out: &mut String) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        match &node.kind {
            HostNodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                let mut keys: Vec<&String> = attrs.keys().collect();
                keys.sort();
                for key in keys {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&attrs[key]);
                    out.push('"');
                }
                out.push('>');
                for child in &node.children {
                    self.write_markup(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
            HostNodeKind::Text(content) => out.push_str(content),
            HostNodeKind::Container => {
                for child in &node.children {
                    self.write_markup(*child, out);
                }
            }
            HostNodeKind::Placeholder => {}
        }
    }
}

impl Default for HostTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tree: &mut HostTree, tag: &str) -> HostNodeId {
        tree.create_element(tag, FxHashMap::default())
    }

    #[test]
    fn test_attach_and_markup() {
        let mut tree = HostTree::new();
        let root = element(&mut tree, "div");
        let child = element(&mut tree, "span");
        let text = tree.create_text("hi");

        tree.attach(root, child).expect("attach child");
        tree.attach(child, text).expect("attach text");

        assert_eq!(tree.markup(root), "<div><span>hi</span></div>");
    }

    #[test]
    fn test_detach_retains_subtree() {
        let mut tree = HostTree::new();
        let root = element(&mut tree, "div");
        let first = tree.create_text("a");
        let second = tree.create_text("b");
        tree.attach(root, first).expect("attach a");
        tree.attach(root, second).expect("attach b");

        let index = tree.detach(first).expect("detach a");
        assert_eq!(index, 0);
        assert!(tree.contains(first));
        assert_eq!(tree.markup(root), "<div>b</div>");

        tree.attach_at(root, first, index).expect("reattach a");
        assert_eq!(tree.markup(root), "<div>ab</div>");
    }

    #[test]
    fn test_attach_twice_is_an_error() {
        let mut tree = HostTree::new();
        let root = element(&mut tree, "div");
        let child = tree.create_text("x");
        tree.attach(root, child).expect("attach");

        let error = tree.attach(root, child).expect_err("double attach");
        assert!(matches!(error, RenderError::Internal(_)));
    }

    #[test]
    fn test_remove_destroys_subtree() {
        let mut tree = HostTree::new();
        let root = element(&mut tree, "div");
        let child = element(&mut tree, "span");
        let text = tree.create_text("gone");
        tree.attach(root, child).expect("attach child");
        tree.attach(child, text).expect("attach text");

        tree.remove(child).expect("remove");
        assert!(!tree.contains(child));
        assert!(!tree.contains(text));
        assert_eq!(tree.markup(root), "<div></div>");
    }

    #[test]
    fn test_container_is_transparent_in_markup() {
        let mut tree = HostTree::new();
        let root = element(&mut tree, "div");
        let group = tree.create_container();
        let text = tree.create_text("inner");
        tree.attach(root, group).expect("attach group");
        tree.attach(group, text).expect("attach text");

        assert_eq!(tree.markup(root), "<div>inner</div>");
    }

    #[test]
    fn test_mark_committed_is_recursive() {
        let mut tree = HostTree::new();
        let root = element(&mut tree, "div");
        let child = tree.create_text("x");
        tree.attach(root, child).expect("attach");

        assert!(!tree.is_committed(child));
        tree.mark_committed(root);
        assert!(tree.is_committed(root));
        assert!(tree.is_committed(child));
    }

    #[test]
    fn test_detach_unattached_is_an_error() {
        let mut tree = HostTree::new();
        let lone = tree.create_text("x");
        let error = tree.detach(lone).expect_err("not attached");
        assert!(matches!(error, RenderError::NotMounted(_)));
    }
}
