//! HTML ↔ arena conversion
//!
//! Parsing goes through `scraper` (html5ever), so malformed markup is
//! repaired the same way a browser would repair it. Rendering walks the
//! arena and produces markup equivalent to `outerHTML`.

use crate::arena::DomArena;
use crate::types::{DomNode, NodeId, NodeType};
use scraper::node::Node;
use scraper::{ElementRef, Html};

/// Elements that never have a closing tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is emitted verbatim
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "xmp", "iframe", "noembed", "noframes", "plaintext"];

/// Parse a full HTML document into a fresh arena
///
/// The returned arena's root is the `#document` node.
pub fn parse_document(markup: &str, url: Option<&str>) -> DomArena {
    let html = Html::parse_document(markup);
    let mut arena = DomArena::with_capacity(markup.len() / 16 + 16);

    let mut document = DomNode::document();
    document.document_url = url.map(String::from);
    let doc = arena.add_node(document);
    // `set_root` only fails for unknown ids
    let _ = arena.set_root(doc);

    for child in html.tree.root().children() {
        match child.value() {
            Node::Doctype(doctype) => {
                let mut node = DomNode::new(NodeType::DocumentType, doctype.name().to_string());
                node.node_value = String::new();
                link(&mut arena, doc, node);
            }
            Node::Comment(comment) => {
                link(&mut arena, doc, DomNode::comment(comment.comment.to_string()));
            }
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    import_element(&mut arena, doc, element);
                }
            }
            _ => {}
        }
    }

    arena
}

/// Parse markup and graft the resulting nodes into `arena`
///
/// Full documents contribute their body content (plus any top-level
/// comments); fragments contribute everything they contain. The returned
/// nodes are detached and in document order.
pub fn parse_into(arena: &mut DomArena, markup: &str) -> Vec<NodeId> {
    let parsed = parse_document(markup, None);
    let Some(doc) = parsed.root_id() else {
        return Vec::new();
    };

    let mut sources = Vec::new();
    let top_level = parsed.get(doc).map(|n| n.children_ids.to_vec()).unwrap_or_default();
    for id in top_level {
        let Ok(node) = parsed.get(id) else { continue };
        if node.node_type == NodeType::Comment {
            sources.push(id);
        } else if node.is_tag("html") {
            for &section in node.children_ids.iter() {
                let Ok(section_node) = parsed.get(section) else { continue };
                if section_node.is_tag("body") {
                    sources.extend(section_node.children_ids.iter().copied());
                } else if section_node.node_type == NodeType::Comment {
                    sources.push(section);
                }
            }
        }
    }

    sources
        .into_iter()
        .filter_map(|id| arena.graft(&parsed, id).ok())
        .collect()
}

fn link(arena: &mut DomArena, parent: NodeId, node: DomNode) -> NodeId {
    let id = arena.add_node(node);
    // Both ids were just produced by this arena
    let _ = arena.attach(parent, id);
    id
}

fn import_element(arena: &mut DomArena, parent: NodeId, element: ElementRef) {
    let value = element.value();
    let mut node = DomNode::element(value.name());
    for (name, attr) in value.attrs() {
        node.attributes.insert(name.to_string(), attr.to_string());
    }
    let id = link(arena, parent, node);

    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                link(arena, id, DomNode::text(text.text.to_string()));
            }
            Node::Comment(comment) => {
                link(arena, id, DomNode::comment(comment.comment.to_string()));
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    import_element(arena, id, child_element);
                }
            }
            _ => {}
        }
    }
}

/// Rendering switches
#[derive(Debug, Clone, Default)]
pub struct RenderOptions<'a> {
    /// Skip the highlighter's overlay container
    pub skip_overlay: bool,
    /// Attributes left out of the output
    pub omit_attributes: &'a [&'a str],
}

/// `outerHTML` of a node (documents render with their doctype)
pub fn render(arena: &DomArena, node_id: NodeId) -> String {
    render_with(arena, node_id, &RenderOptions::default())
}

/// Render a node as page content, leaving out the highlight overlay
pub fn render_page(arena: &DomArena, node_id: NodeId) -> String {
    render_with(
        arena,
        node_id,
        &RenderOptions {
            skip_overlay: true,
            ..RenderOptions::default()
        },
    )
}

pub fn render_with(arena: &DomArena, node_id: NodeId, options: &RenderOptions) -> String {
    let mut out = String::new();
    write_node(arena, node_id, options, false, &mut out);
    out
}

/// Render only the children of a node
pub fn inner_html(arena: &DomArena, node_id: NodeId) -> String {
    let mut out = String::new();
    if let Ok(node) = arena.get(node_id) {
        let raw = node.is_element() && RAW_TEXT_ELEMENTS.contains(&node.node_name.as_str());
        for &child in node.children_ids.iter() {
            write_node(arena, child, &RenderOptions::default(), raw, &mut out);
        }
    }
    out
}

fn write_node(arena: &DomArena, node_id: NodeId, options: &RenderOptions, raw_text: bool, out: &mut String) {
    let Ok(node) = arena.get(node_id) else {
        return;
    };

    match node.node_type {
        NodeType::Document | NodeType::DocumentFragment => {
            for &child in node.children_ids.iter() {
                write_node(arena, child, options, false, out);
            }
        }
        NodeType::DocumentType => {
            out.push_str("<!DOCTYPE ");
            out.push_str(if node.node_name.is_empty() { "html" } else { &node.node_name });
            out.push('>');
        }
        NodeType::Text | NodeType::CdataSection => {
            if raw_text {
                out.push_str(&node.node_value);
            } else {
                out.push_str(&html_escape::encode_text(&node.node_value));
            }
        }
        NodeType::Comment => {
            out.push_str("<!--");
            out.push_str(&node.node_value);
            out.push_str("-->");
        }
        NodeType::Element => {
            if options.skip_overlay && node.is_highlight_overlay() {
                return;
            }
            let tag = node.node_name.as_str();
            out.push('<');
            out.push_str(tag);
            for (name, value) in node.attributes.iter() {
                if options.omit_attributes.contains(&name.as_str()) {
                    continue;
                }
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(value));
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&tag) {
                return;
            }

            let raw = RAW_TEXT_ELEMENTS.contains(&tag);
            for &child in node.children_ids.iter() {
                write_node(arena, child, options, raw, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        _ => {}
    }
}
