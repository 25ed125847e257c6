//! Visibility & reachability filter
//!
//! Two modes, picked per document:
//! - layout mode when the owning document has a viewport (live capture):
//!   computed style, effective opacity, bounds and viewport intersection
//! - static mode otherwise (offline HTML): `hidden` attribute and inline
//!   `style` declarations on the node and its ancestors

use crate::arena::DomArena;
use crate::types::{DomNode, NodeId};
use thiserror::Error;

/// Opacity at or below this counts as invisible
pub const OPACITY_THRESHOLD: f64 = 0.01;

/// A per-node failure; the caller skips the node and carries on
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Malformed {property} value {value:?} on node {node}")]
    MalformedStyle {
        node: NodeId,
        property: &'static str,
        value: String,
    },
}

/// Decide whether a node is visible and reachable
pub fn is_visible(arena: &DomArena, node_id: NodeId) -> Result<bool, FilterError> {
    let node = arena.get(node_id).map_err(|_| FilterError::NodeNotFound(node_id))?;
    let layout = arena
        .owner_document(node_id)
        .and_then(|doc| arena.viewport(doc).map(|viewport| (doc, *viewport)));

    match layout {
        Some((_, viewport)) => {
            let Some(snapshot) = node.snapshot_node.as_deref() else {
                // No layout object: display:none or detached from rendering
                return Ok(false);
            };
            if snapshot.style("display").is_some_and(|d| d.trim() == "none") {
                return Ok(false);
            }
            if snapshot
                .style("visibility")
                .is_some_and(|v| matches!(v.trim(), "hidden" | "collapse"))
            {
                return Ok(false);
            }
            if effective_opacity(arena, node)? <= OPACITY_THRESHOLD {
                return Ok(false);
            }
            let Some(bounds) = snapshot.bounds.filter(|b| b.has_area()) else {
                return Ok(false);
            };
            Ok(bounds.intersects(&viewport.visible_rect()) || bounds.intersects(&viewport.content_rect()))
        }
        None => statically_visible(arena, node),
    }
}

/// Product of computed opacities from the node up to its document
fn effective_opacity(arena: &DomArena, node: &DomNode) -> Result<f64, FilterError> {
    let mut opacity = snapshot_opacity(node)?;
    for ancestor in arena.ancestors(node.id) {
        if let Ok(ancestor) = arena.get(ancestor) {
            opacity *= snapshot_opacity(ancestor)?;
        }
    }
    Ok(opacity)
}

fn snapshot_opacity(node: &DomNode) -> Result<f64, FilterError> {
    match node.snapshot_node.as_deref().and_then(|s| s.style("opacity")) {
        Some(value) => parse_opacity(node.id, value),
        None => Ok(1.0),
    }
}

/// `0.5` or `50%`
fn parse_opacity(node: NodeId, value: &str) -> Result<f64, FilterError> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_suffix('%') {
        Some(percent) => percent.trim().parse::<f64>().map(|p| p / 100.0),
        None => trimmed.parse::<f64>(),
    };
    parsed
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FilterError::MalformedStyle {
            node,
            property: "opacity",
            value: value.to_string(),
        })
}

fn statically_visible(arena: &DomArena, node: &DomNode) -> Result<bool, FilterError> {
    let mut opacity = 1.0;
    let chain = std::iter::once(node.id).chain(arena.ancestors(node.id));
    for id in chain {
        let Ok(current) = arena.get(id) else { continue };
        if !current.is_element() {
            continue;
        }
        if current.has_attr("hidden") {
            return Ok(false);
        }
        let Some(style) = current.attr("style") else {
            continue;
        };
        for (property, value) in inline_declarations(style) {
            match property.as_str() {
                "display" if value == "none" => return Ok(false),
                "visibility" if value == "hidden" || value == "collapse" => return Ok(false),
                "opacity" => opacity *= parse_opacity(id, &value)?,
                _ => {}
            }
        }
    }
    Ok(opacity > OPACITY_THRESHOLD)
}

/// `a: b; c: d !important` → [("a", "b"), ("c", "d")], names and values lowercased
fn inline_declarations(style: &str) -> impl Iterator<Item = (String, String)> + '_ {
    style.split(';').filter_map(|declaration| {
        let (property, value) = declaration.split_once(':')?;
        let value = value.trim().trim_end_matches("!important").trim();
        Some((property.trim().to_ascii_lowercase(), value.to_ascii_lowercase()))
    })
}
