//! Iframe compositor
//!
//! Merges extracted iframe content into the main document. The main
//! document is handled as a tree: each `<iframe>` is located by the
//! `data-iframe-id` the scanner wrote (falling back to its outer markup),
//! replaced by the parsed iframe content between marker comments, and the
//! tree is rendered once. An iframe that cannot be located is reported in
//! [`Composite::unmatched`] instead of disappearing silently.

use crate::arena::DomArena;
use crate::html::{self, RenderOptions};
use crate::iframe::RESERVED_ATTRIBUTES;
use crate::record::IframeInfo;
use crate::types::{DomNode, NodeId, IFRAME_ID_ATTR};
use crate::utils;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Consolidated document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composite {
    pub html: String,
    /// Ids of iframes whose element was not found in the main document
    pub unmatched: Vec<String>,
}

impl Composite {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Parse `main_html` and splice every iframe's content into it
pub fn composite(main_html: &str, iframes: &[IframeInfo]) -> Composite {
    let mut arena = html::parse_document(main_html, None);
    let Some(document) = arena.root_id() else {
        return Composite {
            html: main_html.to_string(),
            unmatched: iframes.iter().map(|i| i.id.clone()).collect(),
        };
    };
    splice_all(&mut arena, document, iframes)
}

/// Same as [`composite`] on an already captured arena
///
/// Only the tree reachable from `document` is considered; the arena's own
/// iframe documents are left untouched.
pub fn composite_arena(arena: &DomArena, document: NodeId, iframes: &[IframeInfo]) -> Composite {
    let mut working = arena.clone();
    splice_all(&mut working, document, iframes)
}

fn splice_all(arena: &mut DomArena, document: NodeId, iframes: &[IframeInfo]) -> Composite {
    let mut unmatched = Vec::new();

    // Parents precede their nested frames, so nested iframe elements are
    // already grafted in by the time they are looked up.
    for info in iframes {
        let Some(target) = locate(arena, document, info) else {
            warn!("Iframe {} not found in main document; content omitted", info.id);
            unmatched.push(info.id.clone());
            continue;
        };

        let mut replacement = Vec::new();
        replacement.push(arena.add_node(DomNode::comment(format!(
            " IFRAME START: {} (src: {}) ",
            info.id,
            utils::comment_safe(&info.src)
        ))));
        replacement.extend(html::parse_into(arena, &info.content));
        replacement.push(arena.add_node(DomNode::comment(format!(" IFRAME END: {} ", info.id))));

        if let Err(e) = arena.replace_with(target, &replacement) {
            warn!("Failed to splice iframe {}: {}", info.id, e);
            unmatched.push(info.id.clone());
            continue;
        }
        debug!("Spliced iframe {} ({} nodes)", info.id, replacement.len());
    }

    Composite {
        html: html::render_page(arena, document),
        unmatched,
    }
}

/// Frame elements reachable from `document`, in document order
fn frame_elements(arena: &DomArena, document: NodeId) -> Vec<NodeId> {
    let mut frames = Vec::new();
    let _ = arena.traverse_df(document, |node| {
        if node.is_tag("iframe") || node.is_tag("frame") {
            frames.push(node.id);
        }
        Ok(())
    });
    frames
}

fn locate(arena: &DomArena, document: NodeId, info: &IframeInfo) -> Option<NodeId> {
    let frames = frame_elements(arena, document);

    let by_id = frames.iter().copied().find(|&id| {
        arena
            .get(id)
            .is_ok_and(|node| node.attr(IFRAME_ID_ATTR) == Some(info.id.as_str()))
    });
    if by_id.is_some() {
        return by_id;
    }

    let options = RenderOptions {
        omit_attributes: RESERVED_ATTRIBUTES,
        ..RenderOptions::default()
    };
    let expected = normalize_markup(&info.outer_html);
    frames
        .into_iter()
        .find(|&id| html::render_with(arena, id, &options) == expected)
}

/// Bring captured markup into the renderer's canonical form
fn normalize_markup(markup: &str) -> String {
    let parsed = html::parse_document(markup, None);
    let options = RenderOptions {
        omit_attributes: RESERVED_ATTRIBUTES,
        ..RenderOptions::default()
    };
    match frame_elements(&parsed, parsed.root_id().unwrap_or_default()).first() {
        Some(&frame) => html::render_with(&parsed, frame, &options),
        None => markup.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;

    fn info(id: &str, src: &str, outer_html: &str, content: &str) -> IframeInfo {
        IframeInfo {
            id: id.into(),
            src: src.into(),
            outer_html: outer_html.into(),
            content: content.into(),
            accessible: true,
            error: None,
            structure: None,
            parent_iframe_id: None,
        }
    }

    #[test]
    fn test_iframe_substitution() {
        let main = r#"<html><body><h1>Top</h1><iframe id="f1" src="a.html"></iframe><p>after</p></body></html>"#;
        let frames = [info("f1", "a.html", r#"<iframe id="f1" src="a.html"></iframe>"#, "<p>hi</p>")];

        let result = composite(main, &frames);
        assert!(result.is_complete());
        assert_eq!(
            result.html,
            "<html><head></head><body><h1>Top</h1>\
             <!-- IFRAME START: f1 (src: a.html) --><p>hi</p><!-- IFRAME END: f1 -->\
             <p>after</p></body></html>"
        );
    }

    #[test]
    fn test_marker_survives_dashes_in_src() {
        let main = r#"<body><iframe data-iframe-id="iframe-0" src="x"></iframe><p>after</p></body>"#;
        let frames = [info("iframe-0", "https://x/a--b.html?c=-->", r#"<iframe src="x"></iframe>"#, "<b>x</b>")];

        let result = composite(main, &frames);
        assert!(result.is_complete());
        assert!(result
            .html
            .contains("<!-- IFRAME START: iframe-0 (src: https://x/a- -b.html?c=- ->) --><b>x</b><!-- IFRAME END: iframe-0 -->"));
        assert!(result.html.ends_with("<p>after</p></body></html>"));
    }

    #[test]
    fn test_matches_by_iframe_id_despite_changed_markup() {
        let main = r#"<body><iframe data-iframe-id="iframe-0" src="a.html" class="late-added"></iframe></body>"#;
        let frames = [info("iframe-0", "https://x/a.html", r#"<iframe src="a.html"></iframe>"#, "<b>x</b>")];

        let result = composite(main, &frames);
        assert!(result.unmatched.is_empty());
        assert!(result.html.contains("<!-- IFRAME START: iframe-0 (src: https://x/a.html) --><b>x</b>"));
        assert!(!result.html.contains("<iframe"));
    }

    #[test]
    fn test_equivalent_markup_matches() {
        // Attribute quoting differs from the renderer's canonical form
        let main = "<body><iframe src='a.html' id=f1></iframe></body>";
        let frames = [info("f1", "a.html", "<iframe src=\"a.html\" id=\"f1\"></iframe>", "<p>hi</p>")];
        assert!(composite(main, &frames).is_complete());
    }

    #[test]
    fn test_unmatched_reported_not_dropped_silently() {
        let main = "<body><p>no frames</p></body>";
        let frames = [info("iframe-3", "", "<iframe src=\"gone.html\"></iframe>", "<p>x</p>")];

        let result = composite(main, &frames);
        assert_eq!(result.unmatched, vec!["iframe-3".to_string()]);
        assert!(result.html.contains("no frames"));
    }

    #[test]
    fn test_placeholder_content_spliced() {
        let main = r#"<body><iframe data-iframe-id="iframe-0" src="https://ads/"></iframe></body>"#;
        let frames = [info(
            "iframe-0",
            "https://ads/",
            "",
            "<!-- iframe content unavailable: cross-origin or out-of-process frame -->",
        )];
        let result = composite(main, &frames);
        assert!(result.html.contains(
            "<!-- IFRAME START: iframe-0 (src: https://ads/) -->\
             <!-- iframe content unavailable: cross-origin or out-of-process frame -->\
             <!-- IFRAME END: iframe-0 -->"
        ));
    }

    #[test]
    fn test_composite_arena_after_scan() {
        let mut arena = html::parse_document(
            r#"<body><button>x</button><iframe src="https://ads.example.net/"></iframe></body>"#,
            Some("https://example.com/"),
        );
        let outcome = Scanner::new().scan(&mut arena).unwrap();
        let root = arena.root_id().unwrap();

        let result = composite_arena(&arena, root, &outcome.iframes);
        assert!(result.is_complete());
        assert!(result.html.contains("IFRAME START: iframe-0 (src: https://ads.example.net/)"));
        // The captured arena itself is untouched
        assert_eq!(arena.find_by_tag("iframe").len(), 1);
    }
}
