//! Iframe content extraction
//!
//! Extraction is two-step: [`PendingIframe::capture`] records the frame's
//! markup and source before the scanner annotates the parent document,
//! then [`PendingIframe::finish`] renders the (already scanned) inner
//! document, or [`PendingIframe::unavailable`] degrades to a placeholder.

use crate::arena::DomArena;
use crate::html::{self, RenderOptions};
use crate::record::IframeInfo;
use crate::serializer::DomSerializer;
use crate::types::{NodeId, IFRAME_ID_ATTR, INTERACTIVE_ID_ATTR};
use crate::utils;

/// Reserved attributes left out of outer markup comparisons
pub const RESERVED_ATTRIBUTES: &[&str] = &[INTERACTIVE_ID_ATTR, IFRAME_ID_ATTR];

/// Placeholder content for frames whose document cannot be read
pub fn placeholder(reason: &str) -> String {
    format!("<!-- iframe content unavailable: {} -->", utils::comment_safe(reason))
}

/// Identity of an iframe, captured before any annotation
#[derive(Debug, Clone)]
pub struct PendingIframe {
    pub id: String,
    pub node_id: NodeId,
    pub src: String,
    pub outer_html: String,
    pub parent_iframe_id: Option<String>,
}

impl PendingIframe {
    pub fn capture(arena: &DomArena, node_id: NodeId, id: String, parent_iframe_id: Option<String>) -> Self {
        Self {
            id,
            node_id,
            src: resolve_src(arena, node_id),
            outer_html: html::render_with(
                arena,
                node_id,
                &RenderOptions {
                    omit_attributes: RESERVED_ATTRIBUTES,
                    ..RenderOptions::default()
                },
            ),
            parent_iframe_id,
        }
    }

    /// Render the inner document and serialize its body
    pub fn finish(self, arena: &DomArena, serializer: &DomSerializer) -> IframeInfo {
        let Some(document) = arena.get(self.node_id).ok().and_then(|n| n.content_document_id) else {
            return self.unavailable("cross-origin or out-of-process frame");
        };
        // A frameset document has no body; its markup is still useful
        let structure = serializer.serialize_body(arena, document).ok().flatten();
        let content = html::render_page(arena, document);

        IframeInfo {
            id: self.id,
            src: self.src,
            outer_html: self.outer_html,
            content,
            accessible: true,
            error: None,
            structure,
            parent_iframe_id: self.parent_iframe_id,
        }
    }

    pub fn unavailable(self, reason: &str) -> IframeInfo {
        IframeInfo {
            id: self.id,
            src: self.src,
            outer_html: self.outer_html,
            content: placeholder(reason),
            accessible: false,
            error: Some(reason.to_string()),
            structure: None,
            parent_iframe_id: self.parent_iframe_id,
        }
    }
}

/// `src` resolved against the owning document; empty for inline frames
pub fn resolve_src(arena: &DomArena, node_id: NodeId) -> String {
    let Ok(node) = arena.get(node_id) else {
        return String::new();
    };
    if node.has_attr("srcdoc") {
        return String::new();
    }
    let src = node.attr("src").map(str::trim).unwrap_or_default();
    if src.is_empty() || src.eq_ignore_ascii_case("about:blank") {
        return String::new();
    }
    let base = arena
        .owner_document(node_id)
        .and_then(|doc| arena.get(doc).ok())
        .and_then(|doc| doc.document_url.as_deref());
    utils::resolve_url(base, src)
}

/// Extract one iframe in a single step (no scanning of its content)
pub fn extract_iframe(arena: &DomArena, node_id: NodeId, id: String) -> IframeInfo {
    PendingIframe::capture(arena, node_id, id, None).finish(arena, &DomSerializer::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_document;
    use crate::types::DomNode;

    #[test]
    fn test_cross_origin_frame_degrades() {
        let arena = parse_document(
            r#"<body><iframe id="f1" src="https://ads.example.net/x"></iframe></body>"#,
            Some("https://example.com/"),
        );
        let frame = arena.find_by_id("f1").unwrap();
        let info = extract_iframe(&arena, frame, "iframe-0".into());

        assert!(!info.accessible);
        assert!(info.content.starts_with("<!-- iframe content unavailable"));
        assert_eq!(info.src, "https://ads.example.net/x");
        assert_eq!(info.outer_html, r#"<iframe id="f1" src="https://ads.example.net/x"></iframe>"#);
    }

    #[test]
    fn test_same_origin_frame_content() {
        let mut arena = parse_document(
            r#"<body><iframe src="inner.html" data-iframe-id="iframe-9"></iframe></body>"#,
            Some("https://example.com/dir/"),
        );
        let frame = arena.find_by_tag("iframe")[0];
        let inner = arena.add_node(DomNode::document());
        arena.get_mut(inner).unwrap().parent_id = Some(frame);
        arena.get_mut(frame).unwrap().content_document_id = Some(inner);
        let html_el = arena.append_child(inner, DomNode::element("html")).unwrap();
        let body = arena.append_child(html_el, DomNode::element("body")).unwrap();
        let p = arena.append_child(body, DomNode::element("p")).unwrap();
        arena.append_child(p, DomNode::text("hi")).unwrap();

        let info = extract_iframe(&arena, frame, "iframe-0".into());
        assert!(info.accessible);
        assert_eq!(info.src, "https://example.com/dir/inner.html");
        assert_eq!(info.content, "<html><body><p>hi</p></body></html>");
        // Stale reserved attributes never leak into the match key
        assert_eq!(info.outer_html, r#"<iframe src="inner.html"></iframe>"#);
        assert!(info.structure.is_some());
    }

    #[test]
    fn test_inline_frames_have_empty_src() {
        let arena = parse_document(
            r#"<iframe id=a srcdoc="<p>x</p>"></iframe><iframe id=b src="about:blank"></iframe><iframe id=c></iframe>"#,
            Some("https://example.com/"),
        );
        for id in ["a", "b", "c"] {
            assert_eq!(resolve_src(&arena, arena.find_by_id(id).unwrap()), "");
        }
    }

    #[test]
    fn test_placeholder_never_closes_comment_early() {
        assert_eq!(placeholder("a -- b"), "<!-- iframe content unavailable: a - - b -->");
    }
}
