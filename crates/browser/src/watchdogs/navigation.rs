//! Navigation Watchdog - tracks which document each tab is showing
//!
//! Every main-frame navigation or document replacement bumps the tab's
//! generation. An extraction records the generation before capturing and
//! compares it after writing ids back: a change means the ids landed on (or
//! were meant for) a document that no longer exists.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cdp::protocol::SessionId;
use crate::cdp::{CDPClient, CDPEvent};
use crate::error::Result;
use crate::events::BrowserEvent;
use crate::watchdog::Watchdog;

/// Per-session document counters, shared between the watchdog and extractors
#[derive(Clone, Default)]
pub struct DocumentGeneration {
    counters: Arc<DashMap<SessionId, u64>>,
}

impl DocumentGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, session_id: &str) -> u64 {
        self.counters.get(session_id).map(|c| *c).unwrap_or(0)
    }

    pub fn bump(&self, session_id: &str) -> u64 {
        let mut counter = self.counters.entry(session_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn forget(&self, session_id: &str) {
        self.counters.remove(session_id);
    }
}

pub struct NavigationWatchdog {
    generation: DocumentGeneration,
    active: Arc<AtomicBool>,
}

impl NavigationWatchdog {
    pub fn new(generation: DocumentGeneration) -> Self {
        Self {
            generation,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> &DocumentGeneration {
        &self.generation
    }

    /// Bump the owning session's generation if `event` replaced its document
    fn observe(generation: &DocumentGeneration, event: &CDPEvent) -> bool {
        let replaces_document = match event.method.as_str() {
            "DOM.documentUpdated" => true,
            "Page.frameNavigated" => event
                .params
                .as_ref()
                .is_some_and(|p| p["frame"].get("parentId").is_none()),
            _ => false,
        };
        if replaces_document {
            let session = event.session_id.as_deref().unwrap_or_default();
            let current = generation.bump(session);
            tracing::debug!("[NavigationWatchdog] {} → generation {} ({})", session, current, event.method);
        }
        replaces_document
    }
}

#[async_trait]
impl Watchdog for NavigationWatchdog {
    fn name(&self) -> &str {
        "NavigationWatchdog"
    }

    async fn on_event(&self, event: &BrowserEvent) {
        if let BrowserEvent::NavigationStarted { url } = event {
            tracing::debug!("[NavigationWatchdog] Navigation to {}", url);
        }
    }

    async fn on_attach(&self, cdp_client: Arc<CDPClient>) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);

        for method in ["DOM.documentUpdated", "Page.frameNavigated"] {
            let generation = self.generation.clone();
            let active = self.active.clone();
            cdp_client.subscribe(
                method,
                Arc::new(move |event| {
                    if active.load(Ordering::SeqCst) {
                        Self::observe(&generation, &event);
                    }
                }),
            );
        }
        Ok(())
    }

    async fn on_detach(&self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(method: &str, params: serde_json::Value, session: &str) -> CDPEvent {
        CDPEvent {
            method: method.to_string(),
            params: Some(params),
            session_id: Some(session.to_string()),
        }
    }

    #[test]
    fn test_main_frame_navigation_bumps() {
        let generation = DocumentGeneration::new();
        let navigated = event("Page.frameNavigated", json!({ "frame": { "id": "F", "url": "https://a/" } }), "S1");

        assert!(NavigationWatchdog::observe(&generation, &navigated));
        assert_eq!(generation.current("S1"), 1);
        assert_eq!(generation.current("S2"), 0);
    }

    #[test]
    fn test_subframe_navigation_ignored() {
        let generation = DocumentGeneration::new();
        let navigated = event(
            "Page.frameNavigated",
            json!({ "frame": { "id": "C", "parentId": "F", "url": "https://ads/" } }),
            "S1",
        );

        assert!(!NavigationWatchdog::observe(&generation, &navigated));
        assert_eq!(generation.current("S1"), 0);
    }

    #[test]
    fn test_document_updated_bumps() {
        let generation = DocumentGeneration::new();
        NavigationWatchdog::observe(&generation, &event("DOM.documentUpdated", json!({}), "S1"));
        NavigationWatchdog::observe(&generation, &event("DOM.documentUpdated", json!({}), "S1"));
        assert_eq!(generation.current("S1"), 2);

        generation.forget("S1");
        assert_eq!(generation.current("S1"), 0);
    }
}
