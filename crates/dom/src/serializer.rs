//! DOM Structure Serializer
//!
//! Converts the rendered body subtree into a compact, hierarchical JSON
//! tree:
//! - comments, `script`/`style`/`noscript` subtrees and hidden inputs are dropped
//! - text is trimmed, empty text dropped
//! - only whitelisted attributes (plus the interactive id) survive
//! - empty elements are pruned unless they are meaningful void tags
//!
//! Output order is document order. The same DOM always yields the same tree.

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::metadata;
use crate::types::*;
use crate::utils;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Serializer configuration
#[derive(Debug, Clone)]
pub struct SerializerConfig {
    pub attribute_whitelist: Vec<String>,
    pub kept_empty_tags: Vec<String>,
    /// Cap on `innerText` length (characters), none by default
    pub max_text_length: Option<usize>,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            attribute_whitelist: ATTRIBUTE_WHITELIST.iter().map(|s| s.to_string()).collect(),
            kept_empty_tags: KEPT_EMPTY_TAGS.iter().map(|s| s.to_string()).collect(),
            max_text_length: None,
        }
    }
}

/// Node of the structure tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StructureNode {
    Text(TextLeaf),
    Element(ElementNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafKind {
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLeaf {
    #[serde(rename = "type")]
    pub kind: LeafKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    pub tag: String,
    pub children: Vec<StructureNode>,
    #[serde(rename = "data-interactive-id", skip_serializing_if = "Option::is_none")]
    pub interactive_id: Option<String>,
    #[serde(flatten)]
    pub attributes: IndexMap<String, String>,
    #[serde(rename = "innerText", skip_serializing_if = "Option::is_none")]
    pub inner_text: Option<String>,
}

impl StructureNode {
    pub fn text(content: impl Into<String>) -> Self {
        StructureNode::Text(TextLeaf {
            kind: LeafKind::Text,
            content: content.into(),
        })
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            StructureNode::Element(element) => Some(element),
            StructureNode::Text(_) => None,
        }
    }

    /// Pre-order walk over this node and its descendants
    pub fn walk(&self) -> Vec<&StructureNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            if let StructureNode::Element(element) = node {
                stack.extend(element.children.iter().rev());
            }
        }
        out
    }
}

/// `html_structure.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlStructure {
    pub document: DocumentStructure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStructure {
    pub title: Option<String>,
    pub url: Option<String>,
    pub body: Option<StructureNode>,
}

/// DOM Tree Serializer
pub struct DomSerializer {
    config: SerializerConfig,
}

impl DomSerializer {
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self { config }
    }

    /// Serialize one subtree; `None` when everything in it was pruned
    pub fn serialize(&self, arena: &DomArena, node_id: NodeId) -> Option<StructureNode> {
        self.serialize_node(arena, node_id).map(|(node, _)| node)
    }

    /// Serialize the `<body>` of a document
    pub fn serialize_body(&self, arena: &DomArena, document: NodeId) -> Result<Option<StructureNode>> {
        let body = arena.body(document).ok_or(DomError::SerializationGap)?;
        Ok(self.serialize(arena, body))
    }

    /// The full `{document: {title, url, body}}` structure
    pub fn html_structure(&self, arena: &DomArena, document: NodeId, url: Option<&str>) -> Result<HtmlStructure> {
        let body = self.serialize_body(arena, document)?;
        let url = url
            .map(String::from)
            .or_else(|| arena.get(document).ok().and_then(|d| d.document_url.clone()));
        Ok(HtmlStructure {
            document: DocumentStructure {
                title: metadata::document_title(arena, document),
                url,
                body,
            },
        })
    }

    /// Returns the node plus the trimmed text pieces found under it
    fn serialize_node(&self, arena: &DomArena, node_id: NodeId) -> Option<(StructureNode, Vec<String>)> {
        let node = arena.get(node_id).ok()?;

        if node.is_text() {
            let text = node.node_value.trim();
            if text.is_empty() {
                return None;
            }
            return Some((StructureNode::text(text), vec![text.to_string()]));
        }

        if !node.is_element() || is_excluded(node) {
            return None;
        }

        let mut children = Vec::new();
        let mut texts = Vec::new();
        for &child_id in node.children_ids.iter() {
            // Pruned children carry no text, excluded subtrees are skipped
            if let Some((child, child_texts)) = self.serialize_node(arena, child_id) {
                children.push(child);
                texts.extend(child_texts);
            }
        }

        let inner_text = (!texts.is_empty()).then(|| {
            let joined = texts.join(" ");
            match self.config.max_text_length {
                Some(max) => utils::cap_text_length(&joined, max),
                None => joined,
            }
        });

        if children.is_empty() && inner_text.is_none() && !self.config.kept_empty_tags.contains(&node.node_name) {
            return None;
        }

        let attributes = self
            .config
            .attribute_whitelist
            .iter()
            .filter_map(|name| node.attr(name).map(|value| (name.clone(), value.to_string())))
            .collect();

        let element = ElementNode {
            tag: node.node_name.clone(),
            children,
            interactive_id: node.attr(INTERACTIVE_ID_ATTR).map(String::from),
            attributes,
            inner_text,
        };
        Some((StructureNode::Element(element), texts))
    }
}

impl Default for DomSerializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Subtrees with no user-facing meaning
fn is_excluded(node: &DomNode) -> bool {
    EXCLUDED_TAGS.contains(&node.node_name.as_str())
        || node.is_tag("template")
        || node.is_hidden_input()
        || node.is_highlight_overlay()
}

/// Serialize with the default configuration
pub fn serialize(arena: &DomArena, node_id: NodeId) -> Option<StructureNode> {
    DomSerializer::new().serialize(arena, node_id)
}

pub fn serialize_body(arena: &DomArena, document: NodeId) -> Result<Option<StructureNode>> {
    DomSerializer::new().serialize_body(arena, document)
}

pub fn html_structure(arena: &DomArena, document: NodeId, url: Option<&str>) -> Result<HtmlStructure> {
    DomSerializer::new().html_structure(arena, document, url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_document;
    use serde_json::json;

    fn body_json(markup: &str) -> serde_json::Value {
        let arena = parse_document(markup, None);
        let doc = arena.root_id().unwrap();
        serde_json::to_value(serialize_body(&arena, doc).unwrap()).unwrap()
    }

    #[test]
    fn test_empty_div_pruned() {
        let arena = parse_document("<body><div></div><div id=x></div></body>", None);
        let div = arena.find_by_id("x").unwrap();
        assert_eq!(serialize(&arena, div), None);
        assert_eq!(body_json("<body><div></div></body>"), serde_json::Value::Null);
    }

    #[test]
    fn test_void_child_kept() {
        let value = body_json(r#"<body><div><img src="a.png"></div></body>"#);
        assert_eq!(
            value,
            json!({
                "tag": "body",
                "children": [{
                    "tag": "div",
                    "children": [{ "tag": "img", "children": [] }]
                }]
            })
        );
    }

    #[test]
    fn test_whitelist_enforced() {
        let value = body_json(
            r#"<body><a href="/x" onclick="evil()" class="c" title="T" data-interactive-id="4">Go</a></body>"#,
        );
        let link = &value["children"][0];
        assert_eq!(link["href"], "/x");
        assert_eq!(link["title"], "T");
        assert_eq!(link["data-interactive-id"], "4");
        assert_eq!(link["innerText"], "Go");
        assert!(link.get("onclick").is_none());
        assert!(link.get("class").is_none());
        assert!(!value.to_string().contains("evil"));
    }

    #[test]
    fn test_hidden_input_and_noise_excluded() {
        let value = body_json(
            r#"<body><form><input type="hidden" value="secret"><input type="text" value="v"></form>
               <script>var x = 1;</script><style>p{}</style><noscript>js</noscript><!-- c --></body>"#,
        );
        let text = value.to_string();
        assert!(!text.contains("secret"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("noscript"));
        assert_eq!(value["children"][0]["tag"], "form");
        assert_eq!(value["children"][0]["children"][0]["value"], "v");
        assert_eq!(value["children"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_text_leaves_and_inner_text() {
        let value = body_json("<body><p>  Hello <b>big</b> world  </p></body>");
        let p = &value["children"][0];
        assert_eq!(p["innerText"], "Hello big world");
        assert_eq!(p["children"][0], json!({ "type": "text", "content": "Hello" }));
        assert_eq!(p["children"][1]["tag"], "b");
        assert_eq!(p["children"][2]["content"], "world");
    }

    #[test]
    fn test_inner_text_ignores_pruned_and_excluded_children() {
        let value = body_json("<body><div><span></span><script>var x = 1;</script><style>.a{}</style> hi </div></body>");
        let div = &value["children"][0];
        assert_eq!(div["innerText"], "hi");
        assert_eq!(div["children"], json!([{ "type": "text", "content": "hi" }]));
    }

    #[test]
    fn test_attribute_order_follows_whitelist() {
        let arena = parse_document(r#"<body><input required type="email" placeholder="p" value="v"></body>"#, None);
        let input = arena.find_by_tag("input")[0];
        let text = serde_json::to_string(&serialize(&arena, input).unwrap()).unwrap();
        assert_eq!(
            text,
            r#"{"tag":"input","children":[],"value":"v","placeholder":"p","type":"email","required":""}"#
        );
    }

    #[test]
    fn test_deterministic() {
        let markup = r##"<body><ul><li>a</li><li><a href="#">b</a></li></ul><p>c</p></body>"##;
        assert_eq!(body_json(markup), body_json(markup));
    }

    #[test]
    fn test_html_structure_document() {
        let arena = parse_document(
            "<html><head><title> Page </title></head><body><h1>Hi</h1></body></html>",
            Some("https://example.com/"),
        );
        let doc = arena.root_id().unwrap();
        let structure = html_structure(&arena, doc, None).unwrap();
        assert_eq!(structure.document.title.as_deref(), Some("Page"));
        assert_eq!(structure.document.url.as_deref(), Some("https://example.com/"));
        assert!(structure.document.body.is_some());
    }

    #[test]
    fn test_missing_body_is_serialization_gap() {
        let arena = parse_document(r#"<html><frameset><frame src="a"></frameset></html>"#, None);
        let doc = arena.root_id().unwrap();
        assert!(matches!(serialize_body(&arena, doc), Err(DomError::SerializationGap)));
    }
}
