//! Page extraction
//!
//! Runs the extraction core against a live tab:
//!
//! ```text
//! Capture ─ DOM.getDocument + DOMSnapshot.captureSnapshot + Page.getLayoutMetrics
//! Scan ──── Scanner over the captured arena
//! Annotate  write data-interactive-id / data-iframe-id back into the page
//! Highlight optional overlay via Runtime.evaluate
//! Metadata  arena metadata + user agent, load time and timestamp from the page
//! Serialize structure tree of the annotated document
//! ```
//!
//! The document generation is read before Capture and checked again after
//! Annotate. A navigation in between fails the extraction with
//! `DetachedDocument` instead of returning ids for a page that is gone.

use futures_util::future::try_join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, error, info};

use jsonfy_dom::highlight::{clear_highlight_script, highlight_script};
use jsonfy_dom::metadata::extract_metadata;
use jsonfy_dom::service::{device_pixel_ratio, SNAPSHOT_COMPUTED_STYLES};
use jsonfy_dom::{
    composite_arena, Annotation, BackendNodeId, Composite, DomArena, DomSerializer, DomService, ElementRecord,
    HtmlStructure, NodeId, PageMetadata, ScanResult, Scanner, ScannerConfig,
};

use crate::cdp::client::CDPError;
use crate::cdp::CDPSession;
use crate::error::{ExtractError, ScanPhase};
use crate::watchdogs::DocumentGeneration;

type Result<T> = std::result::Result<T, ExtractError>;

/// Page-side facts the captured DOM does not carry
const PAGE_FACTS_SCRIPT: &str = r#"(() => {
  const nav = performance.getEntriesByType('navigation')[0];
  return {
    userAgent: navigator.userAgent,
    loadTime: nav && nav.loadEventEnd > 0 ? nav.loadEventEnd - nav.startTime : null,
  };
})()"#;

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub scanner: ScannerConfig,
    /// Draw the numbered overlay after annotating
    pub highlight: bool,
}

/// Everything one extraction produced
#[derive(Debug, Clone, Serialize)]
pub struct PageState {
    #[serde(flatten)]
    pub scan: ScanResult,
    pub structure: HtmlStructure,
    /// Document generation the ids belong to
    #[serde(skip)]
    pub generation: u64,
    #[serde(skip)]
    arena: DomArena,
    #[serde(skip)]
    document: NodeId,
}

impl PageState {
    pub fn url(&self) -> Option<&str> {
        self.structure.document.url.as_deref()
    }

    pub fn element(&self, id: u32) -> Option<&ElementRecord> {
        self.scan.interactive_elements.iter().find(|r| r.id == id)
    }

    /// Interactive id → backend node, for acting on elements later
    pub fn backend_ids(&self) -> HashMap<u32, BackendNodeId> {
        self.scan
            .interactive_elements
            .iter()
            .filter_map(|r| Some((r.id, r.backend_node_id?)))
            .collect()
    }

    /// Main document with every iframe's content spliced in
    pub fn composite(&self) -> Composite {
        debug!(phase = %ScanPhase::Composite, "Compositing {} iframes", self.scan.iframe_infos.len());
        composite_arena(&self.arena, self.document, &self.scan.iframe_infos)
    }
}

pub struct PageExtractor<'a> {
    session: &'a CDPSession,
    generation: &'a DocumentGeneration,
    options: &'a ExtractOptions,
}

impl<'a> PageExtractor<'a> {
    pub fn new(session: &'a CDPSession, generation: &'a DocumentGeneration, options: &'a ExtractOptions) -> Self {
        Self {
            session,
            generation,
            options,
        }
    }

    pub async fn extract(&self) -> Result<PageState> {
        let started = self.current_generation();

        debug!(phase = %ScanPhase::Capture, "Capturing {}", self.session.target_id);
        let mut arena = self.capture(true).await?;
        self.ensure_attached(started, ScanPhase::Capture)?;

        debug!(phase = %ScanPhase::Scan, "Scanning {} nodes", arena.len());
        let scanner = Scanner::with_config(self.options.scanner.clone());
        let outcome = scanner
            .scan(&mut arena)
            .map_err(ExtractError::dom(ScanPhase::Scan))?;

        debug!(phase = %ScanPhase::Annotate, "Applying {} annotations", outcome.annotations.len());
        if let Err(e) = self.annotate(&arena, &outcome.annotations).await {
            self.ensure_attached(started, ScanPhase::Annotate)?;
            error!("Annotation failed: {}", e);
            return Err(e);
        }
        self.ensure_attached(started, ScanPhase::Annotate)?;

        if self.options.highlight {
            debug!(phase = %ScanPhase::Highlight, "Highlighting {} elements", outcome.records.len());
            self.run_script(&highlight_script(&outcome.records), ScanPhase::Highlight)
                .await?;
        }

        debug!(phase = %ScanPhase::Metadata, "Collecting metadata");
        let metadata = self.page_metadata(&arena).await?;

        debug!(phase = %ScanPhase::Serialize, "Serializing structure");
        let serializer = DomSerializer::with_config(self.options.scanner.serializer.clone());
        let (document, structure) = serialize_structure(&serializer, &arena, metadata.url.as_deref())?;

        let mut scan = outcome
            .into_result(&arena)
            .map_err(ExtractError::dom(ScanPhase::Serialize))?;
        scan.metadata = Some(metadata);

        info!(
            "Extracted {} interactive elements and {} iframes from {}",
            scan.interactive_elements.len(),
            scan.iframe_infos.len(),
            structure.document.url.as_deref().unwrap_or("<unknown>")
        );

        Ok(PageState {
            scan,
            structure,
            generation: started,
            arena,
            document,
        })
    }

    /// Metadata only; the page is not annotated
    pub async fn metadata(&self) -> Result<PageMetadata> {
        let arena = self.capture(false).await?;
        self.page_metadata(&arena).await
    }

    /// Remove the highlight overlay
    pub async fn clear_highlight(&self) -> Result<()> {
        self.run_script(&clear_highlight_script(), ScanPhase::Highlight).await?;
        Ok(())
    }

    fn current_generation(&self) -> u64 {
        self.generation.current(&self.session.session_id)
    }

    fn ensure_attached(&self, started: u64, phase: ScanPhase) -> Result<()> {
        check_generation(started, self.current_generation(), phase)
    }

    async fn capture(&self, with_layout: bool) -> Result<DomArena> {
        let phase = ScanPhase::Capture;
        let cdp = ExtractError::cdp;

        let dom = self
            .session
            .send("DOM.getDocument", Some(json!({ "depth": -1, "pierce": true })))
            .await
            .map_err(cdp(phase))?;
        let metrics = self
            .session
            .send("Page.getLayoutMetrics", None)
            .await
            .map_err(cdp(phase))?;

        let mut service = DomService::new();
        service
            .parse_cdp_dom_tree(&dom)
            .map_err(ExtractError::dom(phase))?;

        if with_layout {
            let snapshot = self
                .session
                .send(
                    "DOMSnapshot.captureSnapshot",
                    Some(json!({ "computedStyles": SNAPSHOT_COMPUTED_STYLES })),
                )
                .await
                .map_err(cdp(phase))?;
            service
                .merge_snapshot(&snapshot, device_pixel_ratio(&metrics))
                .map_err(ExtractError::dom(phase))?;
        }
        service
            .apply_layout_metrics(&metrics)
            .map_err(ExtractError::dom(phase))?;

        Ok(service.into_arena())
    }

    async fn annotate(&self, arena: &DomArena, annotations: &[Annotation]) -> Result<()> {
        let phase = ScanPhase::Annotate;

        let writes = annotations.iter().map(|annotation| async move {
            let Some(node_id) = self.frontend_node_id(arena, annotation).await? else {
                debug!("Node {} has no live counterpart; skipped", annotation.node_id);
                return Ok(());
            };
            let written = match &annotation.value {
                Some(value) => {
                    self.session
                        .send(
                            "DOM.setAttributeValue",
                            Some(json!({ "nodeId": node_id, "name": annotation.attribute, "value": value })),
                        )
                        .await
                }
                None => {
                    self.session
                        .send(
                            "DOM.removeAttribute",
                            Some(json!({ "nodeId": node_id, "name": annotation.attribute })),
                        )
                        .await
                }
            };
            written.map(|_| ()).map_err(ExtractError::cdp(phase))
        });

        try_join_all(writes).await?;
        Ok(())
    }

    /// Frontend node id for an annotated node, pushing it by backend id if needed
    async fn frontend_node_id(&self, arena: &DomArena, annotation: &Annotation) -> Result<Option<u64>> {
        let node = arena
            .get(annotation.node_id)
            .map_err(ExtractError::dom(ScanPhase::Annotate))?;
        if let Some(id) = node.cdp_node_id {
            return Ok(Some(u64::from(id)));
        }
        let Some(backend) = annotation.backend_node_id else {
            return Ok(None);
        };

        let pushed = self
            .session
            .send(
                "DOM.pushNodesByBackendIdsToFrontend",
                Some(json!({ "backendNodeIds": [backend] })),
            )
            .await
            .map_err(ExtractError::cdp(ScanPhase::Annotate))?;
        Ok(pushed["nodeIds"][0].as_u64().filter(|&id| id != 0))
    }

    async fn page_metadata(&self, arena: &DomArena) -> Result<PageMetadata> {
        let document = arena
            .root_id()
            .ok_or_else(|| ExtractError::dom(ScanPhase::Metadata)(jsonfy_dom::DomError::MissingRoot))?;
        let mut metadata = extract_metadata(arena, document);

        let facts = self.run_script(PAGE_FACTS_SCRIPT, ScanPhase::Metadata).await?;
        metadata.user_agent = facts["userAgent"].as_str().map(str::to_string);
        metadata.load_time_ms = facts["loadTime"].as_f64();
        metadata.timestamp = Some(chrono::Utc::now().to_rfc3339());
        if metadata.url.is_none() {
            metadata.url = Some(self.session.url.clone());
        }
        Ok(metadata)
    }

    async fn run_script(&self, script: &str, phase: ScanPhase) -> Result<Value> {
        self.session
            .evaluate(script)
            .await
            .map_err(|e| script_error(phase, e))
    }
}

fn check_generation(started: u64, current: u64, phase: ScanPhase) -> Result<()> {
    if current != started {
        error!("Document navigated away during {}", phase);
        return Err(ExtractError::DetachedDocument { phase });
    }
    Ok(())
}

/// A body that serializes to nothing gives `body: None`; only a document
/// without `<body>` is a `SerializationGap`
fn serialize_structure(
    serializer: &DomSerializer,
    arena: &DomArena,
    url: Option<&str>,
) -> Result<(NodeId, HtmlStructure)> {
    let phase = ScanPhase::Serialize;
    let document = arena
        .root_id()
        .ok_or_else(|| ExtractError::dom(phase)(jsonfy_dom::DomError::MissingRoot))?;
    let structure = serializer
        .html_structure(arena, document, url)
        .map_err(ExtractError::dom(phase))?;
    Ok((document, structure))
}

/// Script failures are `ScriptUnavailable`; transport failures stay `Cdp`
fn script_error(phase: ScanPhase, source: CDPError) -> ExtractError {
    match source {
        CDPError::Protocol { message, .. } => {
            error!("Injected script failed during {}: {}", phase, message);
            ExtractError::ScriptUnavailable { phase, reason: message }
        }
        source => ExtractError::Cdp { phase, source },
    }
}
