//! Utility functions for DOM processing

use crate::arena::DomArena;
use crate::types::{DomRect, NodeId, EXCLUDED_TAGS};
use url::Url;

/// Cap text length (in characters) to avoid token explosion
pub fn cap_text_length(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}...", &text[..cut]),
    }
}

/// Trimmed descendant text joined by single spaces
///
/// Skips `script`/`style`/`noscript`/`template` content and comments.
pub fn text_content(arena: &DomArena, node_id: NodeId) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut stack = vec![node_id];
    while let Some(id) = stack.pop() {
        let Ok(node) = arena.get(id) else { continue };
        if node.is_text() {
            let text = node.node_value.trim();
            if !text.is_empty() {
                parts.push(text);
            }
        } else if node.is_element()
            && (EXCLUDED_TAGS.contains(&node.node_name.as_str()) || node.is_tag("template"))
        {
            continue;
        } else {
            stack.extend(node.children_ids.iter().rev());
        }
    }
    parts.join(" ")
}

/// Resolve `href` against `base`; unparseable input is returned as-is
pub fn resolve_url(base: Option<&str>, href: &str) -> String {
    let href = href.trim();
    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }
    base.and_then(|b| Url::parse(b).ok())
        .and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

/// Bounds in top-document coordinates
///
/// Snapshot bounds are relative to the owning document; each enclosing
/// iframe adds its own position minus the inner document's scroll.
pub fn page_bounds(arena: &DomArena, node_id: NodeId) -> Option<DomRect> {
    let mut rect = arena.get(node_id).ok()?.bounds()?;
    let mut document = arena.owner_document(node_id)?;

    while let Some(frame) = arena.get(document).ok().and_then(|d| d.parent_id) {
        let frame_bounds = arena.get(frame).ok()?.bounds()?;
        let (scroll_x, scroll_y) = arena
            .viewport(document)
            .map(|v| (v.scroll_x, v.scroll_y))
            .unwrap_or((0.0, 0.0));
        rect = rect.offset(frame_bounds.x - scroll_x, frame_bounds.y - scroll_y);
        document = arena.owner_document(frame)?;
    }

    Some(rect)
}

/// Text that can sit inside `<!-- ... -->` without ending it
pub fn comment_safe(text: &str) -> String {
    let mut safe = text.to_string();
    while safe.contains("--") {
        safe = safe.replace("--", "- -");
    }
    safe
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_document;
    use crate::types::{DomNode, SnapshotNode, Viewport};

    #[test]
    fn test_cap_text_length() {
        assert_eq!(cap_text_length("hello", 10), "hello");
        assert_eq!(cap_text_length("hello world", 5), "hello...");
        // Multi-byte characters are never split
        assert_eq!(cap_text_length("héllo wörld", 7), "héllo w...");
    }

    #[test]
    fn test_text_content_joins_and_skips_noise() {
        let arena = parse_document(
            "<div id=d> Hello <b>there</b><script>x()</script><!-- c --> friend </div>",
            None,
        );
        let div = arena.find_by_id("d").unwrap();
        assert_eq!(text_content(&arena, div), "Hello there friend");
    }

    #[test]
    fn test_comment_safe() {
        assert_eq!(comment_safe("https://x/?a=1"), "https://x/?a=1");
        assert_eq!(comment_safe("a-->b"), "a- ->b");
        assert_eq!(comment_safe("---"), "- - -");
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url(Some("https://example.com/a/b.html"), "c.html"),
            "https://example.com/a/c.html"
        );
        assert_eq!(resolve_url(None, "https://x.org/"), "https://x.org/");
        assert_eq!(resolve_url(None, "relative.html"), "relative.html");
    }

    #[test]
    fn test_page_bounds_through_iframe() {
        let mut arena = parse_document("<iframe id=f></iframe>", None);
        let top = arena.root_id().unwrap();
        let frame = arena.find_by_id("f").unwrap();
        arena.set_viewport(top, Viewport::new(800.0, 600.0));
        arena.get_mut(frame).unwrap().snapshot_node = Some(Box::new(SnapshotNode {
            bounds: Some(DomRect::new(100.0, 200.0, 300.0, 300.0)),
            ..SnapshotNode::default()
        }));

        // Inner document hanging off the iframe element
        let inner = arena.add_node(DomNode::document());
        arena.get_mut(inner).unwrap().parent_id = Some(frame);
        arena.get_mut(frame).unwrap().content_document_id = Some(inner);
        let mut inner_viewport = Viewport::new(300.0, 300.0);
        inner_viewport.scroll_y = 50.0;
        arena.set_viewport(inner, inner_viewport);

        let button = arena.append_child(inner, DomNode::element("button")).unwrap();
        arena.get_mut(button).unwrap().snapshot_node = Some(Box::new(SnapshotNode {
            bounds: Some(DomRect::new(10.0, 60.0, 40.0, 20.0)),
            ..SnapshotNode::default()
        }));

        assert_eq!(page_bounds(&arena, button), Some(DomRect::new(110.0, 210.0, 40.0, 20.0)));
        assert_eq!(page_bounds(&arena, frame), Some(DomRect::new(100.0, 200.0, 300.0, 300.0)));
    }
}
