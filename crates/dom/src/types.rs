//! Core type definitions for the arena DOM model
//!
//! Key design principles:
//! 1. Use u32 for indices (4 bytes vs 8 bytes pointer)
//! 2. Use SmallVec for small arrays (avoid heap allocation)
//! 3. Use Option<Box<T>> for large optional fields (reduce struct size)
//! 4. Attributes keep document order, so rendering is deterministic

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

/// Node identifier (index into arena)
/// u32 allows 4 billion nodes, enough for any webpage
pub type NodeId = u32;

/// Backend node identifier from CDP, stable for the lifetime of a document
pub type BackendNodeId = u32;

/// Frame identifier from CDP
pub type FrameId = String;

/// Attribute carrying the scan-assigned interactive id
pub const INTERACTIVE_ID_ATTR: &str = "data-interactive-id";

/// Attribute carrying the scan-assigned iframe id
pub const IFRAME_ID_ATTR: &str = "data-iframe-id";

/// DOM id of the overlay container drawn by the highlighter
pub const HIGHLIGHT_CONTAINER_ID: &str = "__jsonfy_highlight_container";

/// Attributes that survive into records and the structure tree, in output order
pub const ATTRIBUTE_WHITELIST: &[&str] = &[
    "value",
    "placeholder",
    "selected",
    "checked",
    "multiple",
    "href",
    "title",
    "type",
    "disabled",
    "readonly",
    "required",
];

/// Subtrees that never carry user-facing meaning
pub const EXCLUDED_TAGS: &[&str] = &["script", "style", "noscript"];

/// Empty elements that are kept in the structure tree
pub const KEPT_EMPTY_TAGS: &[&str] = &[
    "img", "br", "hr", "input", "link", "meta", "source", "track", "wbr",
];

/// Node type matching DOM specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Attribute = 2,
    Text = 3,
    CdataSection = 4,
    EntityReference = 5,
    Entity = 6,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
    Notation = 12,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NodeType::Element),
            2 => Some(NodeType::Attribute),
            3 => Some(NodeType::Text),
            4 => Some(NodeType::CdataSection),
            5 => Some(NodeType::EntityReference),
            6 => Some(NodeType::Entity),
            7 => Some(NodeType::ProcessingInstruction),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            10 => Some(NodeType::DocumentType),
            11 => Some(NodeType::DocumentFragment),
            12 => Some(NodeType::Notation),
            _ => None,
        }
    }
}

/// Shadow root type from CDP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowRootType {
    UserAgent,
    Open,
    Closed,
}

impl ShadowRootType {
    pub fn from_cdp(value: &str) -> Option<Self> {
        match value {
            "user-agent" => Some(ShadowRootType::UserAgent),
            "open" => Some(ShadowRootType::Open),
            "closed" => Some(ShadowRootType::Closed),
            _ => None,
        }
    }
}

/// Rectangle with coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DomRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Positive width and height
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Check if rectangle intersects with another
    pub fn intersects(&self, other: &DomRect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    /// Apply offset (for iframe coordinate transformation)
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Convert device pixels to CSS pixels
    pub fn scale(&self, factor: f64) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

/// Scroll state and size of one document's viewport, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub content_width: f64,
    pub content_height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scroll_x: 0.0,
            scroll_y: 0.0,
            content_width: width,
            content_height: height,
        }
    }

    /// The currently visible part of the document
    pub fn visible_rect(&self) -> DomRect {
        DomRect::new(self.scroll_x, self.scroll_y, self.width, self.height)
    }

    /// Everything reachable by scrolling
    pub fn content_rect(&self) -> DomRect {
        DomRect::new(
            0.0,
            0.0,
            self.content_width.max(self.width),
            self.content_height.max(self.height),
        )
    }
}

/// Layout and live form state from DOMSnapshot.captureSnapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Responds to mouse clicks (listeners attached from script included)
    pub is_clickable: Option<bool>,
    /// Document coordinates (top-left of the owning document, ignores scroll)
    pub bounds: Option<DomRect>,
    /// Computed CSS styles
    pub computed_styles: Option<HashMap<String, String>>,
    /// Live value of input/textarea controls
    pub input_value: Option<String>,
    pub input_checked: bool,
    pub option_selected: bool,
}

impl SnapshotNode {
    pub fn style(&self, name: &str) -> Option<&str> {
        self.computed_styles
            .as_ref()
            .and_then(|styles| styles.get(name))
            .map(|s| s.as_str())
    }
}

/// The main DOM tree node structure
///
/// Design philosophy:
/// - Small fixed-size fields first (better packing)
/// - Use indices instead of pointers
/// - Use Option<Box<T>> for large optional data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    // IDs
    pub id: NodeId,
    pub backend_node_id: Option<BackendNodeId>,
    /// Frontend node id from DOM.getDocument (valid until the document changes)
    pub cdp_node_id: Option<u32>,
    pub node_type: NodeType,

    // Navigation indices
    pub parent_id: Option<NodeId>,
    pub children_ids: SmallVec<[NodeId; 4]>, // Most nodes have <4 children

    /// Lowercase tag for elements, `#text`/`#comment`/`#document` otherwise
    pub node_name: String,
    pub node_value: String,
    pub attributes: IndexMap<String, String>,

    // Frame info (document nodes only)
    pub frame_id: Option<FrameId>,
    pub document_url: Option<String>,

    // Special DOM structures
    pub content_document_id: Option<NodeId>,
    pub shadow_root_type: Option<ShadowRootType>,
    pub shadow_root_ids: Option<SmallVec<[NodeId; 2]>>,

    // Enhanced data (boxed to reduce struct size)
    pub snapshot_node: Option<Box<SnapshotNode>>,
}

impl DomNode {
    /// Create a new node; the arena assigns `id` on insertion
    pub fn new(node_type: NodeType, node_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            backend_node_id: None,
            cdp_node_id: None,
            node_type,
            parent_id: None,
            children_ids: SmallVec::new(),
            node_name: node_name.into(),
            node_value: String::new(),
            attributes: IndexMap::new(),
            frame_id: None,
            document_url: None,
            content_document_id: None,
            shadow_root_type: None,
            shadow_root_ids: None,
            snapshot_node: None,
        }
    }

    pub fn element(tag: &str) -> Self {
        Self::new(NodeType::Element, tag.to_ascii_lowercase())
    }

    pub fn text(value: impl Into<String>) -> Self {
        let mut node = Self::new(NodeType::Text, "#text");
        node.node_value = value.into();
        node
    }

    pub fn comment(value: impl Into<String>) -> Self {
        let mut node = Self::new(NodeType::Comment, "#comment");
        node.node_value = value.into();
        node
    }

    pub fn document() -> Self {
        Self::new(NodeType::Document, "#document")
    }

    /// Get tag name for element nodes
    pub fn tag_name(&self) -> Option<&str> {
        if self.node_type == NodeType::Element {
            Some(&self.node_name)
        } else {
            None
        }
    }

    /// Check if node is an element
    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }

    /// Check if node is an element with the given (lowercase) tag
    pub fn is_tag(&self, tag: &str) -> bool {
        self.is_element() && self.node_name == tag
    }

    /// Check if node is text
    pub fn is_text(&self) -> bool {
        matches!(self.node_type, NodeType::Text | NodeType::CdataSection)
    }

    pub fn is_document(&self) -> bool {
        self.node_type == NodeType::Document
    }

    /// Get attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Check if element is clickable
    pub fn is_clickable(&self) -> bool {
        self.snapshot_node
            .as_ref()
            .and_then(|s| s.is_clickable)
            .unwrap_or(false)
    }

    pub fn bounds(&self) -> Option<DomRect> {
        self.snapshot_node.as_ref().and_then(|s| s.bounds)
    }

    /// `<input type=hidden>`, never part of any output
    pub fn is_hidden_input(&self) -> bool {
        self.is_tag("input")
            && self
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("hidden"))
    }

    /// The highlighter's own overlay, skipped by every pass
    pub fn is_highlight_overlay(&self) -> bool {
        self.is_element() && self.attr("id") == Some(HIGHLIGHT_CONTAINER_ID)
    }
}
