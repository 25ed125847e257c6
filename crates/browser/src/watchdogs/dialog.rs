//! Dialog Watchdog - dismisses every JavaScript dialog
//!
//! `alert`, `confirm`, `prompt` and `beforeunload` block the renderer until
//! answered, which would stall navigation and extraction alike.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cdp::protocol::DialogOpening;
use crate::cdp::CDPClient;
use crate::error::Result;
use crate::events::BrowserEvent;
use crate::watchdog::Watchdog;

pub struct DialogWatchdog {
    dismissed: Arc<AtomicUsize>,
    active: Arc<AtomicBool>,
}

impl DialogWatchdog {
    pub fn new() -> Self {
        Self {
            dismissed: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of dialogs dismissed so far
    pub fn dismissed(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}

impl Default for DialogWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Watchdog for DialogWatchdog {
    fn name(&self) -> &str {
        "DialogWatchdog"
    }

    async fn on_event(&self, event: &BrowserEvent) {
        if let BrowserEvent::Stopped = event {
            tracing::debug!("[DialogWatchdog] Dismissed {} dialogs", self.dismissed());
        }
    }

    async fn on_attach(&self, cdp_client: Arc<CDPClient>) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);

        let client = Arc::downgrade(&cdp_client);
        let dismissed = self.dismissed.clone();
        let active = self.active.clone();

        cdp_client.subscribe(
            "Page.javascriptDialogOpening",
            Arc::new(move |event| {
                if !active.load(Ordering::SeqCst) {
                    return;
                }
                let Some(client) = client.upgrade() else {
                    return;
                };
                let dialog: Option<DialogOpening> = event
                    .params
                    .and_then(|p| serde_json::from_value(p).ok());
                if let Some(dialog) = &dialog {
                    tracing::info!("[DialogWatchdog] Dismissing {} dialog: {}", dialog.dialog_type, dialog.message);
                }

                let dismissed = dismissed.clone();
                let session_id = event.session_id;
                tokio::spawn(async move {
                    match client
                        .send_request(
                            "Page.handleJavaScriptDialog",
                            Some(json!({ "accept": false })),
                            session_id,
                        )
                        .await
                    {
                        Ok(_) => {
                            dismissed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => tracing::warn!("[DialogWatchdog] Failed to dismiss dialog: {}", e),
                    }
                });
            }),
        );
        Ok(())
    }

    async fn on_detach(&self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}
