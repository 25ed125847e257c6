//! Page metadata: title, URL, meta tags, Open Graph, JSON-LD, dimensions

use crate::arena::DomArena;
use crate::types::NodeId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// RFC 3339, filled in by the driver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub open_graph: IndexMap<String, String>,
    pub meta_tags: IndexMap<String, String>,
    pub json_ld: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_time_ms: Option<f64>,
}

/// Text of the first `<title>` in the document, trimmed
pub fn document_title(arena: &DomArena, document: NodeId) -> Option<String> {
    let mut found = None;
    let _ = arena.traverse_df(document, |node| {
        if found.is_none() && node.is_tag("title") {
            let text: String = node
                .children_ids
                .iter()
                .filter_map(|&c| arena.get(c).ok())
                .filter(|c| c.is_text())
                .map(|c| c.node_value.as_str())
                .collect();
            found = Some(text.trim().to_string());
        }
        Ok(())
    });
    found
}

/// Everything derivable from the captured DOM of one document
pub fn extract_metadata(arena: &DomArena, document: NodeId) -> PageMetadata {
    let mut metadata = PageMetadata {
        title: document_title(arena, document),
        url: arena.get(document).ok().and_then(|d| d.document_url.clone()),
        ..PageMetadata::default()
    };

    let _ = arena.traverse_df(document, |node| {
        if node.is_tag("meta") {
            let content = node.attr("content").unwrap_or_default().to_string();
            if let Some(property) = node.attr("property") {
                if let Some(key) = property.strip_prefix("og:") {
                    metadata.open_graph.insert(key.to_string(), content.clone());
                }
            }
            if let Some(name) = node.attr("name").or_else(|| node.attr("http-equiv")) {
                let name = name.to_ascii_lowercase();
                if name == "description" && metadata.description.is_none() {
                    metadata.description = Some(content.clone());
                }
                metadata.meta_tags.insert(name, content);
            }
        } else if node.is_tag("script")
            && node
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
        {
            let raw: String = node
                .children_ids
                .iter()
                .filter_map(|&c| arena.get(c).ok())
                .map(|c| c.node_value.as_str())
                .collect();
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => metadata.json_ld.push(value),
                Err(e) => debug!("Skipping malformed JSON-LD block: {}", e),
            }
        }
        Ok(())
    });

    if let Some(viewport) = arena.viewport(document) {
        metadata.viewport = Some(Dimensions {
            width: viewport.width,
            height: viewport.height,
        });
        metadata.document = Some(Dimensions {
            width: viewport.content_width,
            height: viewport.content_height,
        });
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::parse_document;
    use crate::types::Viewport;

    const PAGE: &str = r#"<html><head>
        <title>Shop</title>
        <meta name="Description" content="Things for sale">
        <meta property="og:title" content="The Shop">
        <meta property="og:image" content="https://example.com/i.png">
        <script type="application/ld+json">{"@type": "Organization", "name": "Shop"}</script>
        <script type="application/ld+json">{broken</script>
        </head><body><p>x</p></body></html>"#;

    #[test]
    fn test_extract_metadata() {
        let arena = parse_document(PAGE, Some("https://example.com/"));
        let doc = arena.root_id().unwrap();
        let metadata = extract_metadata(&arena, doc);

        assert_eq!(metadata.title.as_deref(), Some("Shop"));
        assert_eq!(metadata.url.as_deref(), Some("https://example.com/"));
        assert_eq!(metadata.description.as_deref(), Some("Things for sale"));
        assert_eq!(metadata.open_graph.get("title").map(String::as_str), Some("The Shop"));
        assert_eq!(metadata.open_graph.len(), 2);
        assert_eq!(metadata.json_ld.len(), 1);
        assert_eq!(metadata.json_ld[0]["name"], "Shop");
        assert!(metadata.viewport.is_none());
    }

    #[test]
    fn test_dimensions_from_viewport() {
        let mut arena = parse_document(PAGE, None);
        let doc = arena.root_id().unwrap();
        let mut viewport = Viewport::new(1280.0, 720.0);
        viewport.content_height = 4000.0;
        arena.set_viewport(doc, viewport);

        let metadata = extract_metadata(&arena, doc);
        assert_eq!(metadata.viewport.unwrap().width, 1280.0);
        assert_eq!(metadata.document.unwrap().height, 4000.0);

        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json.get("openGraph").is_some());
        assert!(json.get("jsonLd").is_some());
    }

    #[test]
    fn test_untitled_document() {
        let arena = parse_document("<p>no title</p>", None);
        assert_eq!(document_title(&arena, arena.root_id().unwrap()), None);
    }
}
