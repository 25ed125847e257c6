//! DOM Service - builds the arena from CDP captures
//!
//! This handles:
//! - DOM tree construction from `DOM.getDocument` JSON
//! - Snapshot data merging from `DOMSnapshot.captureSnapshot`
//! - Viewport/scroll state from `Page.getLayoutMetrics`

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::html;
use crate::types::*;
use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Computed styles requested from DOMSnapshot, in request order
pub const SNAPSHOT_COMPUTED_STYLES: &[&str] = &["display", "visibility", "opacity"];

/// Configuration for DOM service
#[derive(Debug, Clone)]
pub struct DomServiceConfig {
    /// Must match the `computedStyles` list sent with captureSnapshot
    pub computed_styles: Vec<String>,
}

impl Default for DomServiceConfig {
    fn default() -> Self {
        Self {
            computed_styles: SNAPSHOT_COMPUTED_STYLES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Main DOM service
pub struct DomService {
    config: DomServiceConfig,
    arena: DomArena,
}

impl DomService {
    /// Create new DOM service with default config
    pub fn new() -> Self {
        Self::with_config(DomServiceConfig::default())
    }

    /// Create DOM service with custom config
    pub fn with_config(config: DomServiceConfig) -> Self {
        Self {
            config,
            arena: DomArena::new(),
        }
    }

    pub fn config(&self) -> &DomServiceConfig {
        &self.config
    }

    /// Get reference to internal arena
    pub fn arena(&self) -> &DomArena {
        &self.arena
    }

    /// Get mutable reference to internal arena
    pub fn arena_mut(&mut self) -> &mut DomArena {
        &mut self.arena
    }

    /// Hand the built arena to the caller
    pub fn into_arena(self) -> DomArena {
        self.arena
    }

    /// Parse offline HTML into the arena (no layout data)
    pub fn parse_html(&mut self, markup: &str, url: Option<&str>) -> Result<NodeId> {
        self.arena = html::parse_document(markup, url);
        self.arena.root_id().ok_or(DomError::MissingRoot)
    }

    /// Parse CDP DOM tree response and build arena
    ///
    /// Input format matches CDP's DOM.getDocument response:
    /// ```json
    /// {
    ///   "root": {
    ///     "nodeId": 1,
    ///     "backendNodeId": 1,
    ///     "nodeType": 9,
    ///     "nodeName": "#document",
    ///     "children": [...]
    ///   }
    /// }
    /// ```
    pub fn parse_cdp_dom_tree(&mut self, cdp_response: &Value) -> Result<NodeId> {
        let root = cdp_response
            .get("root")
            .ok_or_else(|| DomError::MalformedCapture("Missing 'root' in CDP response".to_string()))?;

        self.arena.clear();
        let root_id = self.parse_node(root, None)?;
        self.arena.set_root(root_id)?;

        Ok(root_id)
    }

    /// Recursively parse a CDP node
    fn parse_node(&mut self, cdp_node: &Value, parent_id: Option<NodeId>) -> Result<NodeId> {
        let node_type_val = cdp_node["nodeType"]
            .as_u64()
            .ok_or_else(|| DomError::MalformedCapture("Missing nodeType".to_string()))?
            as u8;

        let node_type =
            NodeType::from_u8(node_type_val).ok_or_else(|| DomError::InvalidNodeType {
                expected: "valid NodeType".to_string(),
                actual: format!("{}", node_type_val),
            })?;

        let raw_name = cdp_node["nodeName"].as_str().unwrap_or("");
        let node_name = if node_type == NodeType::Element {
            raw_name.to_ascii_lowercase()
        } else {
            raw_name.to_string()
        };

        let mut node = DomNode::new(node_type, node_name);
        node.cdp_node_id = cdp_node["nodeId"].as_u64().map(|v| v as u32);
        node.backend_node_id = Some(
            cdp_node["backendNodeId"]
                .as_u64()
                .ok_or_else(|| DomError::MalformedCapture("Missing backendNodeId".to_string()))?
                as u32,
        );
        node.node_value = cdp_node["nodeValue"].as_str().unwrap_or("").to_string();
        node.parent_id = parent_id;
        node.frame_id = cdp_node["frameId"].as_str().map(String::from);
        node.document_url = cdp_node["documentURL"].as_str().map(String::from);
        node.shadow_root_type = cdp_node
            .get("shadowRootType")
            .and_then(|v| v.as_str())
            .and_then(ShadowRootType::from_cdp);

        // Attributes come as a flat [name, value, name, value, ...] array
        if let Some(attrs) = cdp_node["attributes"].as_array() {
            let mut attributes = IndexMap::with_capacity(attrs.len() / 2);
            for pair in attrs.chunks_exact(2) {
                if let (Some(key), Some(value)) = (pair[0].as_str(), pair[1].as_str()) {
                    attributes.insert(key.to_string(), value.to_string());
                }
            }
            node.attributes = attributes;
        }

        // Add node to arena
        let current_node_id = self.arena.add_node(node);

        // Parse children
        if let Some(children) = cdp_node["children"].as_array() {
            let mut child_ids = SmallVec::new();
            for child in children {
                child_ids.push(self.parse_node(child, Some(current_node_id))?);
            }
            self.arena.get_mut(current_node_id)?.children_ids = child_ids;
        }

        // Content document (same-process iframe only; absent when cross-origin)
        if let Some(content_doc) = cdp_node.get("contentDocument") {
            let doc_id = self.parse_node(content_doc, Some(current_node_id))?;
            self.arena.get_mut(current_node_id)?.content_document_id = Some(doc_id);
        }

        // Parse shadow roots
        if let Some(shadow_roots) = cdp_node["shadowRoots"].as_array() {
            let mut shadow_ids = SmallVec::new();
            for shadow in shadow_roots {
                shadow_ids.push(self.parse_node(shadow, Some(current_node_id))?);
            }
            self.arena.get_mut(current_node_id)?.shadow_root_ids = Some(shadow_ids);
        }

        Ok(current_node_id)
    }

    /// Merge snapshot data from DOMSnapshot.captureSnapshot
    ///
    /// Nodes are matched by backend node id. Bounds, scroll offsets and
    /// content sizes are reported in device pixels and converted to CSS
    /// pixels here. Iframe documents get a viewport sized to their frame
    /// element.
    pub fn merge_snapshot(&mut self, snapshot: &Value, device_pixel_ratio: f64) -> Result<()> {
        let strings: Vec<&str> = snapshot["strings"]
            .as_array()
            .ok_or_else(|| DomError::MalformedCapture("Missing 'strings' in snapshot".to_string()))?
            .iter()
            .map(|s| s.as_str().unwrap_or(""))
            .collect();
        let documents = snapshot["documents"]
            .as_array()
            .ok_or_else(|| DomError::MalformedCapture("Missing 'documents' in snapshot".to_string()))?;

        let scale = if device_pixel_ratio > 0.0 {
            1.0 / device_pixel_ratio
        } else {
            1.0
        };

        for document in documents {
            self.merge_document_snapshot(document, &strings, scale)?;
        }

        // Frame documents are sized by their iframe element's box
        let frames: Vec<(NodeId, NodeId)> = self
            .arena
            .iter()
            .filter_map(|node| node.content_document_id.map(|doc| (node.id, doc)))
            .collect();
        for (frame, doc) in frames {
            let Some(bounds) = self.arena.get(frame)?.bounds() else {
                continue;
            };
            let mut viewport = self
                .arena
                .viewport(doc)
                .copied()
                .unwrap_or_else(|| Viewport::new(bounds.width, bounds.height));
            viewport.width = bounds.width;
            viewport.height = bounds.height;
            self.arena.set_viewport(doc, viewport);
        }

        Ok(())
    }

    fn merge_document_snapshot(&mut self, document: &Value, strings: &[&str], scale: f64) -> Result<()> {
        let nodes = &document["nodes"];
        let backend_ids = nodes["backendNodeId"]
            .as_array()
            .ok_or_else(|| DomError::MalformedCapture("Missing backendNodeId in snapshot".to_string()))?;

        let string_at = |value: &Value| -> Option<String> {
            value
                .as_i64()
                .filter(|&i| i >= 0)
                .and_then(|i| strings.get(i as usize))
                .map(|s| s.to_string())
        };

        let input_values = rare_strings(&nodes["inputValue"], strings);
        let input_checked = rare_booleans(&nodes["inputChecked"]);
        let option_selected = rare_booleans(&nodes["optionSelected"]);
        let clickable = rare_booleans(&nodes["isClickable"]);

        // layout index → snapshot node index
        let layout = &document["layout"];
        let mut layout_of: AHashMap<usize, usize> = AHashMap::new();
        if let Some(indices) = layout["nodeIndex"].as_array() {
            for (layout_idx, node_idx) in indices.iter().enumerate() {
                if let Some(node_idx) = node_idx.as_u64() {
                    layout_of.entry(node_idx as usize).or_insert(layout_idx);
                }
            }
        }
        let bounds = layout["bounds"].as_array();
        let styles = layout["styles"].as_array();

        for (snapshot_idx, backend_id) in backend_ids.iter().enumerate() {
            let Some(backend_id) = backend_id.as_u64() else {
                continue;
            };
            let Some(node_id) = self.arena.get_node_id_by_backend(backend_id as u32) else {
                continue;
            };

            let mut snap = SnapshotNode {
                is_clickable: clickable.contains(&snapshot_idx).then_some(true),
                input_value: input_values.get(&snapshot_idx).cloned(),
                input_checked: input_checked.contains(&snapshot_idx),
                option_selected: option_selected.contains(&snapshot_idx),
                ..SnapshotNode::default()
            };

            if let Some(&layout_idx) = layout_of.get(&snapshot_idx) {
                snap.bounds = bounds
                    .and_then(|b| b.get(layout_idx))
                    .and_then(parse_rect)
                    .map(|rect| rect.scale(scale));

                if let Some(style_indices) = styles.and_then(|s| s.get(layout_idx)).and_then(|s| s.as_array()) {
                    let computed: HashMap<String, String> = self
                        .config
                        .computed_styles
                        .iter()
                        .zip(style_indices)
                        .filter_map(|(name, idx)| string_at(idx).map(|v| (name.clone(), v)))
                        .collect();
                    snap.computed_styles = Some(computed);
                }
            }

            let is_document = self.arena.get(node_id)?.is_document();
            if is_document {
                let dim = |key: &str| document[key].as_f64().unwrap_or(0.0) * scale;
                let mut viewport = self
                    .arena
                    .viewport(node_id)
                    .copied()
                    .unwrap_or_else(|| Viewport::new(dim("contentWidth"), dim("contentHeight")));
                viewport.scroll_x = dim("scrollOffsetX");
                viewport.scroll_y = dim("scrollOffsetY");
                viewport.content_width = dim("contentWidth");
                viewport.content_height = dim("contentHeight");
                self.arena.set_viewport(node_id, viewport);
            }

            self.arena.get_mut(node_id)?.snapshot_node = Some(Box::new(snap));
        }

        Ok(())
    }

    /// Apply Page.getLayoutMetrics to the top-level document's viewport
    pub fn apply_layout_metrics(&mut self, metrics: &Value) -> Result<()> {
        let root = self.arena.root_id().ok_or(DomError::MissingRoot)?;
        let layout = &metrics["cssLayoutViewport"];
        let content = &metrics["cssContentSize"];

        let mut viewport = self
            .arena
            .viewport(root)
            .copied()
            .unwrap_or_else(|| Viewport::new(0.0, 0.0));
        viewport.width = layout["clientWidth"].as_f64().unwrap_or(viewport.width);
        viewport.height = layout["clientHeight"].as_f64().unwrap_or(viewport.height);
        viewport.scroll_x = layout["pageX"].as_f64().unwrap_or(viewport.scroll_x);
        viewport.scroll_y = layout["pageY"].as_f64().unwrap_or(viewport.scroll_y);
        viewport.content_width = content["width"].as_f64().unwrap_or(viewport.content_width);
        viewport.content_height = content["height"].as_f64().unwrap_or(viewport.content_height);
        self.arena.set_viewport(root, viewport);
        Ok(())
    }
}

impl Default for DomService {
    fn default() -> Self {
        Self::new()
    }
}

/// Device pixel ratio derived from Page.getLayoutMetrics
pub fn device_pixel_ratio(metrics: &Value) -> f64 {
    let device = metrics["visualViewport"]["clientWidth"].as_f64();
    let css = metrics["cssVisualViewport"]["clientWidth"].as_f64();
    match (device, css) {
        (Some(device), Some(css)) if css > 0.0 && device > 0.0 => device / css,
        _ => 1.0,
    }
}

fn rare_strings(data: &Value, strings: &[&str]) -> AHashMap<usize, String> {
    let (Some(index), Some(value)) = (data["index"].as_array(), data["value"].as_array()) else {
        return AHashMap::new();
    };
    index
        .iter()
        .zip(value)
        .filter_map(|(i, v)| {
            let node = i.as_u64()? as usize;
            let text = strings.get(v.as_u64()? as usize)?;
            Some((node, text.to_string()))
        })
        .collect()
}

fn rare_booleans(data: &Value) -> AHashSet<usize> {
    data["index"]
        .as_array()
        .map(|index| index.iter().filter_map(|i| i.as_u64()).map(|i| i as usize).collect())
        .unwrap_or_default()
}

fn parse_rect(value: &Value) -> Option<DomRect> {
    let v = value.as_array()?;
    if v.len() < 4 {
        return None;
    }
    Some(DomRect::new(
        v[0].as_f64()?,
        v[1].as_f64()?,
        v[2].as_f64()?,
        v[3].as_f64()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> Value {
        json!({
            "root": {
                "nodeId": 1,
                "backendNodeId": 1,
                "nodeType": 9,
                "nodeName": "#document",
                "documentURL": "https://example.com/",
                "children": [{
                    "nodeId": 2,
                    "backendNodeId": 2,
                    "nodeType": 1,
                    "nodeName": "HTML",
                    "attributes": [],
                    "children": [{
                        "nodeId": 3,
                        "backendNodeId": 3,
                        "nodeType": 1,
                        "nodeName": "BODY",
                        "attributes": [],
                        "children": [{
                            "nodeId": 4,
                            "backendNodeId": 4,
                            "nodeType": 1,
                            "nodeName": "BUTTON",
                            "attributes": ["id", "go", "class", "primary"]
                        }, {
                            "nodeId": 5,
                            "backendNodeId": 5,
                            "nodeType": 1,
                            "nodeName": "IFRAME",
                            "attributes": ["src", "/inner.html"],
                            "contentDocument": {
                                "nodeId": 6,
                                "backendNodeId": 6,
                                "nodeType": 9,
                                "nodeName": "#document",
                                "documentURL": "https://example.com/inner.html"
                            }
                        }]
                    }]
                }]
            }
        })
    }

    #[test]
    fn test_parse_simple_dom() {
        let mut service = DomService::new();
        let root_id = service.parse_cdp_dom_tree(&sample_tree()).unwrap();

        assert_eq!(root_id, 0);
        assert_eq!(service.arena().len(), 6);

        let arena = service.arena();
        let button = arena.get_by_backend_id(4).unwrap();
        assert_eq!(button.node_name, "button");
        let keys: Vec<_> = button.attributes.keys().cloned().collect();
        assert_eq!(keys, vec!["id", "class"]);

        let iframe = arena.get_by_backend_id(5).unwrap();
        let inner = iframe.content_document_id.unwrap();
        assert_eq!(
            arena.get(inner).unwrap().document_url.as_deref(),
            Some("https://example.com/inner.html")
        );
        assert_eq!(arena.owner_document(inner), Some(inner));
    }

    #[test]
    fn test_missing_root_is_error() {
        let mut service = DomService::new();
        assert!(service.parse_cdp_dom_tree(&json!({})).is_err());
    }

    #[test]
    fn test_merge_snapshot() {
        let mut service = DomService::new();
        service.parse_cdp_dom_tree(&sample_tree()).unwrap();

        let snapshot = json!({
            "strings": ["block", "visible", "1", "none"],
            "documents": [{
                "scrollOffsetX": 0,
                "scrollOffsetY": 200,
                "contentWidth": 1600,
                "contentHeight": 4000,
                "nodes": {
                    "backendNodeId": [1, 2, 3, 4, 5],
                    "isClickable": { "index": [3] }
                },
                "layout": {
                    "nodeIndex": [3, 4],
                    "bounds": [[20, 40, 200, 60], [0, 400, 600, 300]],
                    "styles": [[0, 1, 2], [3, 1, 2]]
                }
            }]
        });

        service.merge_snapshot(&snapshot, 2.0).unwrap();
        service
            .apply_layout_metrics(&json!({
                "cssLayoutViewport": { "clientWidth": 800, "clientHeight": 600, "pageX": 0, "pageY": 100 },
                "cssContentSize": { "width": 800, "height": 2000 }
            }))
            .unwrap();

        let arena = service.arena();
        let button = arena.get_by_backend_id(4).unwrap();
        assert!(button.is_clickable());
        assert_eq!(button.bounds(), Some(DomRect::new(10.0, 20.0, 100.0, 30.0)));

        let iframe = arena.get_by_backend_id(5).unwrap();
        let snap = iframe.snapshot_node.as_ref().unwrap();
        assert_eq!(snap.style("display"), Some("none"));
        let inner_viewport = arena.viewport(iframe.content_document_id.unwrap()).unwrap();
        assert_eq!(inner_viewport.width, 300.0);

        let top = arena.viewport(0).unwrap();
        assert_eq!(top.width, 800.0);
        assert_eq!(top.scroll_y, 100.0);
        assert_eq!(top.content_height, 2000.0);
    }

    #[test]
    fn test_device_pixel_ratio() {
        let metrics = json!({
            "visualViewport": { "clientWidth": 1600 },
            "cssVisualViewport": { "clientWidth": 800 }
        });
        assert_eq!(device_pixel_ratio(&metrics), 2.0);
        assert_eq!(device_pixel_ratio(&json!({})), 1.0);
    }
}
