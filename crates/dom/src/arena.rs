//! Arena-based DOM tree storage
//!
//! "Bad programmers worry about the code. Good programmers worry about
//! data structures and their relationships."
//!
//! One arena holds the top document and every iframe content document
//! reachable from it. Nodes link by index:
//! - `children_ids` / `parent_id` for the light tree
//! - `shadow_root_ids` for attached shadow roots
//! - `content_document_id` from an `<iframe>` to its inner `#document`
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<DomNode>
//!        [Node0][Node1][Node2]...
//!         ↑ 4-byte index, not 8-byte pointer
//! ```

use crate::error::{DomError, Result};
use crate::types::{BackendNodeId, DomNode, NodeId, NodeType, Viewport};
use ahash::AHashMap;

/// Arena allocator for DOM nodes
///
/// Design:
/// - Single Vec<DomNode> for sequential allocation
/// - HashMap for backend_node_id → NodeId lookup (CDP uses backend IDs)
/// - No Rc/Arc: use indices everywhere
#[derive(Debug, Clone)]
pub struct DomArena {
    /// All nodes stored sequentially (cache-friendly)
    nodes: Vec<DomNode>,

    /// Backend node ID → NodeId lookup (for CDP integration)
    backend_id_map: AHashMap<BackendNodeId, NodeId>,

    /// Viewport per document node
    viewports: AHashMap<NodeId, Viewport>,

    /// Root node ID (if set)
    root_id: Option<NodeId>,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self::with_capacity(1024) // Pre-allocate for typical page
    }

    /// Create arena with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            backend_id_map: AHashMap::with_capacity(capacity),
            viewports: AHashMap::new(),
            root_id: None,
        }
    }

    /// Add a detached node to the arena, returns its ID
    pub fn add_node(&mut self, mut node: DomNode) -> NodeId {
        let node_id = self.nodes.len() as NodeId;
        node.id = node_id;
        if let Some(backend_id) = node.backend_node_id {
            self.backend_id_map.insert(backend_id, node_id);
        }
        self.nodes.push(node);
        node_id
    }

    /// Add a node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, node: DomNode) -> Result<NodeId> {
        self.get(parent)?;
        let child = self.add_node(node);
        self.attach(parent, child)?;
        Ok(child)
    }

    /// Link an existing node as the last child of `parent`
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.get_mut(child)?.parent_id = Some(parent);
        self.get_mut(parent)?.children_ids.push(child);
        Ok(())
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable)
    pub fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by backend node ID (from CDP)
    pub fn get_by_backend_id(&self, backend_id: BackendNodeId) -> Result<&DomNode> {
        let node_id = self
            .backend_id_map
            .get(&backend_id)
            .ok_or(DomError::NodeNotFound(backend_id))?;
        self.get(*node_id)
    }

    /// Get node ID by backend node ID
    pub fn get_node_id_by_backend(&self, backend_id: BackendNodeId) -> Option<NodeId> {
        self.backend_id_map.get(&backend_id).copied()
    }

    /// Set root node
    pub fn set_root(&mut self, node_id: NodeId) -> Result<()> {
        // Verify node exists
        self.get(node_id)?;
        self.root_id = Some(node_id);
        Ok(())
    }

    /// Get root node ID
    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    /// Get root node
    pub fn root(&self) -> Result<&DomNode> {
        let root_id = self.root_id.ok_or(DomError::MissingRoot)?;
        self.get(root_id)
    }

    /// Total number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterator over all nodes
    pub fn iter(&self) -> impl Iterator<Item = &DomNode> {
        self.nodes.iter()
    }

    /// Get children of a node
    pub fn children(&self, node_id: NodeId) -> Result<Vec<&DomNode>> {
        let node = self.get(node_id)?;
        node.children_ids
            .iter()
            .map(|&child_id| self.get(child_id))
            .collect()
    }

    /// Get parent of a node
    pub fn parent(&self, node_id: NodeId) -> Result<Option<&DomNode>> {
        let node = self.get(node_id)?;
        match node.parent_id {
            Some(parent_id) => Ok(Some(self.get(parent_id)?)),
            None => Ok(None),
        }
    }

    /// Ancestor IDs, nearest first, stopping at the owning document
    ///
    /// Shadow roots are parented to their host, so the walk crosses
    /// shadow boundaries but never an iframe boundary.
    pub fn ancestors(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(node_id as usize).and_then(|n| n.parent_id);
        while let Some(id) = current {
            let Some(node) = self.nodes.get(id as usize) else {
                break;
            };
            out.push(id);
            if node.is_document() {
                break;
            }
            current = node.parent_id;
        }
        out
    }

    /// The `#document` node that owns `node_id`
    pub fn owner_document(&self, node_id: NodeId) -> Option<NodeId> {
        if self.nodes.get(node_id as usize)?.is_document() {
            return Some(node_id);
        }
        self.ancestors(node_id)
            .into_iter()
            .find(|&id| self.nodes[id as usize].is_document())
    }

    /// First element child of `parent` with the given tag
    pub fn child_element(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        let node = self.nodes.get(parent as usize)?;
        node.children_ids
            .iter()
            .copied()
            .find(|&id| self.nodes[id as usize].is_tag(tag))
    }

    /// `<html>` element of a document
    pub fn document_element(&self, document: NodeId) -> Option<NodeId> {
        self.child_element(document, "html")
    }

    /// `<body>` element of a document
    pub fn body(&self, document: NodeId) -> Option<NodeId> {
        self.document_element(document)
            .and_then(|html| self.child_element(html, "body"))
    }

    /// `<head>` element of a document
    pub fn head(&self, document: NodeId) -> Option<NodeId> {
        self.document_element(document)
            .and_then(|html| self.child_element(html, "head"))
    }

    /// Record the viewport of a document node
    pub fn set_viewport(&mut self, document: NodeId, viewport: Viewport) {
        self.viewports.insert(document, viewport);
    }

    /// Viewport of a document node, if known
    pub fn viewport(&self, document: NodeId) -> Option<&Viewport> {
        self.viewports.get(&document)
    }

    /// Set an attribute, returns the previous value
    pub fn set_attribute(&mut self, node_id: NodeId, name: &str, value: String) -> Result<Option<String>> {
        Ok(self.get_mut(node_id)?.attributes.insert(name.to_string(), value))
    }

    /// Remove an attribute keeping the order of the others
    pub fn remove_attribute(&mut self, node_id: NodeId, name: &str) -> Result<Option<String>> {
        Ok(self.get_mut(node_id)?.attributes.shift_remove(name))
    }

    /// Detach a node from its parent (the node stays in the arena)
    pub fn detach(&mut self, node_id: NodeId) -> Result<()> {
        if let Some(parent) = self.get(node_id)?.parent_id {
            self.get_mut(parent)?.children_ids.retain(|c| *c != node_id);
        }
        self.get_mut(node_id)?.parent_id = None;
        Ok(())
    }

    /// Replace `target` in its parent's child list with `replacements`
    pub fn replace_with(&mut self, target: NodeId, replacements: &[NodeId]) -> Result<()> {
        let parent = self.get(target)?.parent_id.ok_or(DomError::NodeNotFound(target))?;
        for &id in replacements {
            self.get_mut(id)?.parent_id = Some(parent);
        }

        let parent_node = self.get_mut(parent)?;
        let position = parent_node
            .children_ids
            .iter()
            .position(|c| *c == target)
            .ok_or(DomError::NodeNotFound(target))?;
        parent_node.children_ids.remove(position);
        for (offset, &id) in replacements.iter().enumerate() {
            parent_node.children_ids.insert(position + offset, id);
        }

        self.get_mut(target)?.parent_id = None;
        Ok(())
    }

    /// Deep-copy the light-tree subtree `source_id` of another arena
    ///
    /// The copy is detached; CDP identities and cross-document links are
    /// dropped since they only mean something in the source arena.
    pub fn graft(&mut self, source: &DomArena, source_id: NodeId) -> Result<NodeId> {
        let copy_of = |node: &DomNode| {
            let mut copy = node.clone();
            copy.backend_node_id = None;
            copy.cdp_node_id = None;
            copy.parent_id = None;
            copy.children_ids.clear();
            copy.content_document_id = None;
            copy.shadow_root_ids = None;
            copy
        };

        let root = self.add_node(copy_of(source.get(source_id)?));
        let mut stack = vec![(source_id, root)];
        while let Some((from, to)) = stack.pop() {
            for &child in source.get(from)?.children_ids.iter() {
                let copied = self.add_node(copy_of(source.get(child)?));
                self.attach(to, copied)?;
                stack.push((child, copied));
            }
        }
        Ok(root)
    }

    /// Traverse tree depth-first (iterative, no recursion)
    ///
    /// This is the "good taste" version - no special cases for leaf nodes
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// Find nodes matching predicate
    pub fn find<F>(&self, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&DomNode) -> bool,
    {
        self.nodes
            .iter()
            .filter(|node| predicate(node))
            .map(|node| node.id)
            .collect()
    }

    /// Find first node matching predicate
    pub fn find_one<F>(&self, predicate: F) -> Option<NodeId>
    where
        F: Fn(&DomNode) -> bool,
    {
        self.nodes.iter().find(|node| predicate(node)).map(|node| node.id)
    }

    /// Find all elements by tag name
    pub fn find_by_tag(&self, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        self.find(|node| node.is_tag(&tag))
    }

    /// Find element by ID attribute
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.find_one(|node| node.node_type == NodeType::Element && node.attr("id") == Some(id))
    }

    /// Clear arena (reuse allocation)
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.backend_id_map.clear();
        self.viewports.clear();
        self.root_id = None;
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}
