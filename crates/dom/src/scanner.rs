//! Interactive element scanner
//!
//! Walks the top document, then every iframe document reachable from it,
//! classifying and filtering each element. Accepted elements get the next
//! id from a single counter and are annotated with `data-interactive-id`.
//!
//! Every scan starts from scratch: the counter restarts at 0 and ids left
//! by a previous scan are removed first, so scanning an unchanged DOM twice
//! gives identical results.

use crate::arena::DomArena;
use crate::classifier::{self, ClassifierConfig};
use crate::error::{DomError, Result};
use crate::html;
use crate::iframe::PendingIframe;
use crate::metadata;
use crate::record::{selector_for, ElementContent, ElementRecord, ElementType, IframeInfo, ScanResult};
use crate::serializer::{DomSerializer, SerializerConfig};
use crate::types::*;
use crate::utils;
use crate::visibility;
use ahash::AHashMap;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

/// Scanner configuration
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub classifier: ClassifierConfig,
    pub serializer: SerializerConfig,
    pub max_iframes: usize,
    pub max_iframe_depth: usize,
    /// Cap on record text (characters)
    pub max_text_length: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            serializer: SerializerConfig::default(),
            max_iframes: 100,
            max_iframe_depth: 5,
            max_text_length: 500,
        }
    }
}

/// One attribute write (or removal, when `value` is `None`) for the live DOM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub node_id: NodeId,
    pub backend_node_id: Option<BackendNodeId>,
    pub attribute: &'static str,
    pub value: Option<String>,
}

/// Raw scan output
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Sorted by id
    pub records: Vec<ElementRecord>,
    pub iframes: Vec<IframeInfo>,
    pub annotations: Vec<Annotation>,
}

impl ScanOutcome {
    pub fn record(&self, id: u32) -> Option<&ElementRecord> {
        // ids are dense and start at 0
        self.records.get(id as usize).filter(|r| r.id == id)
    }

    /// Bundle with the rendered main document and its metadata
    pub fn into_result(self, arena: &DomArena) -> Result<ScanResult> {
        let root = arena.root_id().ok_or(DomError::MissingRoot)?;
        Ok(ScanResult {
            main_content: html::render_page(arena, root),
            interactive_elements: self.records,
            iframe_infos: self.iframes,
            metadata: Some(metadata::extract_metadata(arena, root)),
        })
    }
}

#[derive(Default)]
struct ScanState {
    records: Vec<ElementRecord>,
    /// Slots are reserved before nested frames are scanned
    iframes: Vec<Option<IframeInfo>>,
    annotations: Vec<Annotation>,
    next_id: u32,
    /// form node → document-order index within the scan
    form_index: AHashMap<NodeId, usize>,
}

/// Per-document lookups
#[derive(Default)]
struct DocumentIndex {
    labels_for: AHashMap<String, NodeId>,
    forms_by_id: AHashMap<String, NodeId>,
}

/// Interactive element scanner
pub struct Scanner {
    config: ScannerConfig,
    serializer: DomSerializer,
}

impl Scanner {
    pub fn new() -> Self {
        Self::with_config(ScannerConfig::default())
    }

    pub fn with_config(config: ScannerConfig) -> Self {
        let serializer = DomSerializer::with_config(config.serializer.clone());
        Self { config, serializer }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scan the arena's root document and every reachable iframe
    pub fn scan(&self, arena: &mut DomArena) -> Result<ScanOutcome> {
        let root = arena.root_id().ok_or(DomError::MissingRoot)?;
        let stale = clear_reserved_attributes(arena);

        let mut state = ScanState::default();
        self.scan_document(arena, root, None, 0, &mut state)?;

        for (node_id, attribute) in stale {
            let node = arena.get(node_id)?;
            if !node.has_attr(attribute) {
                state.annotations.push(Annotation {
                    node_id,
                    backend_node_id: node.backend_node_id,
                    attribute,
                    value: None,
                });
            }
        }

        let iframes: Vec<IframeInfo> = state.iframes.into_iter().flatten().collect();
        info!(
            "Scan found {} interactive elements and {} iframes",
            state.records.len(),
            iframes.len()
        );

        Ok(ScanOutcome {
            records: state.records,
            iframes,
            annotations: state.annotations,
        })
    }

    /// Scan and bundle into a [`ScanResult`]
    pub fn scan_page(&self, arena: &mut DomArena) -> Result<ScanResult> {
        self.scan(arena)?.into_result(arena)
    }

    fn scan_document(
        &self,
        arena: &mut DomArena,
        document: NodeId,
        frame: Option<&str>,
        depth: usize,
        state: &mut ScanState,
    ) -> Result<()> {
        let elements = collect_elements(arena, document);
        debug!("Scanning document {} ({} elements, depth {})", document, elements.len(), depth);

        let mut index = DocumentIndex::default();
        for &id in &elements {
            let node = arena.get(id)?;
            if node.is_tag("form") {
                let next = state.form_index.len();
                state.form_index.insert(id, next);
                if let Some(html_id) = node.attr("id").filter(|v| !v.is_empty()) {
                    index.forms_by_id.entry(html_id.to_string()).or_insert(id);
                }
            } else if node.is_tag("label") {
                if let Some(target) = node.attr("for").filter(|v| !v.is_empty()) {
                    index.labels_for.entry(target.to_string()).or_insert(id);
                }
            }
        }

        for &id in &elements {
            let Some(element_type) = classifier::classify_with(arena.get(id)?, &self.config.classifier) else {
                continue;
            };
            match visibility::is_visible(arena, id) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("Skipping element during scan: {}", e);
                    continue;
                }
            }

            let record = self.build_record(arena, id, element_type, frame, &index, state)?;
            let value = record.id.to_string();
            arena.set_attribute(id, INTERACTIVE_ID_ATTR, value.clone())?;
            state.annotations.push(Annotation {
                node_id: id,
                backend_node_id: record.backend_node_id,
                attribute: INTERACTIVE_ID_ATTR,
                value: Some(value),
            });
            state.records.push(record);
        }

        for &id in &elements {
            if arena.get(id)?.is_tag("iframe") || arena.get(id)?.is_tag("frame") {
                self.scan_iframe(arena, id, frame, depth, state)?;
            }
        }

        Ok(())
    }

    fn scan_iframe(
        &self,
        arena: &mut DomArena,
        node_id: NodeId,
        parent: Option<&str>,
        depth: usize,
        state: &mut ScanState,
    ) -> Result<()> {
        let slot = state.iframes.len();
        state.iframes.push(None);
        let iframe_id = format!("iframe-{}", slot);

        let pending = PendingIframe::capture(arena, node_id, iframe_id.clone(), parent.map(String::from));
        arena.set_attribute(node_id, IFRAME_ID_ATTR, iframe_id.clone())?;
        state.annotations.push(Annotation {
            node_id,
            backend_node_id: arena.get(node_id)?.backend_node_id,
            attribute: IFRAME_ID_ATTR,
            value: Some(iframe_id.clone()),
        });

        let content_document = arena.get(node_id)?.content_document_id;
        let info = if slot >= self.config.max_iframes {
            warn!("Iframe {} skipped: limit of {} iframes reached", iframe_id, self.config.max_iframes);
            pending.unavailable(&format!("iframe limit of {} reached", self.config.max_iframes))
        } else if depth + 1 > self.config.max_iframe_depth {
            warn!("Iframe {} skipped: nested deeper than {}", iframe_id, self.config.max_iframe_depth);
            pending.unavailable(&format!("iframe nesting deeper than {}", self.config.max_iframe_depth))
        } else if let Some(document) = content_document {
            self.scan_document(arena, document, Some(&iframe_id), depth + 1, state)?;
            pending.finish(arena, &self.serializer)
        } else {
            debug!("Iframe {} ({}) has no accessible document", iframe_id, pending.src);
            pending.unavailable("cross-origin or out-of-process frame")
        };

        state.iframes[slot] = Some(info);
        Ok(())
    }

    fn build_record(
        &self,
        arena: &DomArena,
        node_id: NodeId,
        element_type: ElementType,
        frame: Option<&str>,
        index: &DocumentIndex,
        state: &mut ScanState,
    ) -> Result<ElementRecord> {
        let node = arena.get(node_id)?;
        let id = state.next_id;
        state.next_id += 1;

        let mut attributes = IndexMap::new();
        for &name in ATTRIBUTE_WHITELIST {
            if let Some(value) = node.attr(name) {
                attributes.insert(name.to_string(), value.to_string());
            } else if name == "disabled" && classifier::is_disabled(node) {
                attributes.insert(name.to_string(), "true".to_string());
            }
        }

        let content = if element_type.is_control() {
            ElementContent::Control {
                value: control_value(arena, node_id),
                placeholder: node.attr("placeholder").map(String::from),
                label: self.label_text(arena, node_id, index),
            }
        } else {
            ElementContent::Text {
                text: utils::cap_text_length(&element_text(arena, node_id), self.config.max_text_length),
            }
        };

        let form_id = if element_type.is_control() || element_type == ElementType::Button {
            owning_form(arena, node_id, index).map(|form| form_label(arena, form, state))
        } else {
            None
        };

        Ok(ElementRecord {
            id,
            element_type,
            tag_name: node.node_name.clone(),
            content,
            attributes,
            html_id: node.attr("id").filter(|v| !v.is_empty()).map(String::from),
            form_id,
            iframe_id: frame.map(String::from),
            bounding_box: utils::page_bounds(arena, node_id),
            selector: selector_for(id),
            node_id,
            backend_node_id: node.backend_node_id,
        })
    }

    fn label_text(&self, arena: &DomArena, node_id: NodeId, index: &DocumentIndex) -> Option<String> {
        let node = arena.get(node_id).ok()?;
        let label = node
            .attr("id")
            .and_then(|id| index.labels_for.get(id).copied())
            .or_else(|| {
                arena
                    .ancestors(node_id)
                    .into_iter()
                    .find(|&a| arena.get(a).is_ok_and(|n| n.is_tag("label")))
            });

        label
            .map(|l| utils::text_content(arena, l))
            .filter(|t| !t.is_empty())
            .or_else(|| node.attr("aria-label").map(str::trim).filter(|t| !t.is_empty()).map(String::from))
            .map(|t| utils::cap_text_length(&t, self.config.max_text_length))
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan with the default configuration
pub fn scan(arena: &mut DomArena) -> Result<ScanResult> {
    Scanner::new().scan_page(arena)
}

/// Strip ids left by a previous scan, returns what was removed
fn clear_reserved_attributes(arena: &mut DomArena) -> Vec<(NodeId, &'static str)> {
    let marked: Vec<(NodeId, &'static str)> = arena
        .iter()
        .filter(|n| n.is_element())
        .flat_map(|n| {
            [INTERACTIVE_ID_ATTR, IFRAME_ID_ATTR]
                .into_iter()
                .filter(move |attr| n.has_attr(attr))
                .map(move |attr| (n.id, attr))
        })
        .collect();

    for &(node_id, attribute) in &marked {
        let _ = arena.remove_attribute(node_id, attribute);
    }
    if !marked.is_empty() {
        debug!("Cleared {} stale scan attributes", marked.len());
    }
    marked
}

/// Elements of one document in pre-order, entering non-UA shadow roots
fn collect_elements(arena: &DomArena, document: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let Ok(doc) = arena.get(document) else {
        return out;
    };
    let mut stack: Vec<NodeId> = doc.children_ids.iter().rev().copied().collect();

    while let Some(id) = stack.pop() {
        let Ok(node) = arena.get(id) else { continue };
        match node.node_type {
            NodeType::Element => {
                if EXCLUDED_TAGS.contains(&node.node_name.as_str())
                    || node.is_tag("template")
                    || node.is_highlight_overlay()
                {
                    continue;
                }
                out.push(id);
                stack.extend(node.children_ids.iter().rev());
                // Shadow content comes before light children
                if let Some(shadow_roots) = &node.shadow_root_ids {
                    stack.extend(shadow_roots.iter().rev());
                }
            }
            NodeType::DocumentFragment => {
                if node.shadow_root_type != Some(ShadowRootType::UserAgent) {
                    stack.extend(node.children_ids.iter().rev());
                }
            }
            _ => {}
        }
    }

    out
}

/// `form` attribute first, then the nearest ancestor form
fn owning_form(arena: &DomArena, node_id: NodeId, index: &DocumentIndex) -> Option<NodeId> {
    let node = arena.get(node_id).ok()?;
    if let Some(form) = node.attr("form").and_then(|id| index.forms_by_id.get(id.trim())) {
        return Some(*form);
    }
    arena
        .ancestors(node_id)
        .into_iter()
        .find(|&a| arena.get(a).is_ok_and(|n| n.is_tag("form")))
}

/// The form's own id, or a synthetic `form-N`
fn form_label(arena: &DomArena, form: NodeId, state: &ScanState) -> String {
    match arena.get(form).ok().and_then(|f| f.attr("id")).filter(|v| !v.is_empty()) {
        Some(id) => id.to_string(),
        None => format!("form-{}", state.form_index.get(&form).copied().unwrap_or_default()),
    }
}

/// Live value for inputs/textareas, selected option text for selects
fn control_value(arena: &DomArena, node_id: NodeId) -> Option<String> {
    let node = arena.get(node_id).ok()?;
    let live = node.snapshot_node.as_ref().and_then(|s| s.input_value.clone());

    if node.is_tag("select") {
        let mut options = Vec::new();
        let _ = arena.traverse_df(node_id, |n| {
            if n.is_tag("option") {
                options.push(n.id);
            }
            Ok(())
        });
        let selected = options
            .iter()
            .copied()
            .find(|&o| {
                arena.get(o).is_ok_and(|n| {
                    n.snapshot_node.as_ref().is_some_and(|s| s.option_selected)
                })
            })
            .or_else(|| {
                options
                    .iter()
                    .copied()
                    .find(|&o| arena.get(o).is_ok_and(|n| n.has_attr("selected")))
            })
            .or_else(|| options.first().copied())?;
        let text = utils::text_content(arena, selected);
        return if text.is_empty() {
            arena.get(selected).ok()?.attr("value").map(String::from)
        } else {
            Some(text)
        };
    }

    if node.is_tag("textarea") {
        return live.or_else(|| Some(utils::text_content(arena, node_id)).filter(|t| !t.is_empty()));
    }

    live.or_else(|| node.attr("value").map(String::from))
}

/// Visible text, falling back to accessible names
fn element_text(arena: &DomArena, node_id: NodeId) -> String {
    let text = utils::text_content(arena, node_id);
    if !text.is_empty() {
        return text;
    }
    let Ok(node) = arena.get(node_id) else {
        return text;
    };
    ["aria-label", "title", "value", "alt"]
        .iter()
        .find_map(|attr| node.attr(attr).map(str::trim).filter(|v| !v.is_empty()))
        .map(String::from)
        .unwrap_or_default()
}
