//! Watchdog System - Browser Monitoring
//!
//! Background concerns (navigation tracking, dialog handling) each live in
//! their own watchdog. The session owns a single `WatchdogManager` and feeds
//! it every `BrowserEvent`; watchdogs that need raw CDP traffic subscribe on
//! the client when attached.

use async_trait::async_trait;
use std::sync::Arc;

use crate::cdp::CDPClient;
use crate::error::Result;
use crate::events::BrowserEvent;

/// Monitors browser state and reacts to events
#[async_trait]
pub trait Watchdog: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Handle browser event
    ///
    /// Called for every event; the watchdog picks what it cares about.
    async fn on_event(&self, event: &BrowserEvent);

    /// Called once the session is connected
    ///
    /// CDP subscriptions outlive the watchdog's interest in them, so
    /// callbacks should hold a `Weak` client and check [`Watchdog::on_detach`]
    /// state before acting.
    ///
    /// # Example
    /// ```ignore
    /// async fn on_attach(&self, cdp_client: Arc<CDPClient>) -> Result<()> {
    ///     let client = Arc::downgrade(&cdp_client);
    ///     cdp_client.subscribe("Page.javascriptDialogOpening", Arc::new(move |event| {
    ///         if let Some(client) = client.upgrade() {
    ///             tokio::spawn(async move { /* answer the dialog */ });
    ///         }
    ///     }));
    ///     Ok(())
    /// }
    /// ```
    async fn on_attach(&self, cdp_client: Arc<CDPClient>) -> Result<()> {
        let _ = cdp_client;
        Ok(())
    }

    /// Called when the session stops
    async fn on_detach(&self) -> Result<()> {
        Ok(())
    }
}

/// Dispatches events to all watchdogs
pub struct WatchdogManager {
    watchdogs: Vec<Box<dyn Watchdog>>,
}

impl WatchdogManager {
    pub fn new() -> Self {
        Self {
            watchdogs: Vec::new(),
        }
    }

    /// Add a watchdog
    pub fn register(&mut self, watchdog: Box<dyn Watchdog>) {
        tracing::debug!("Registered watchdog: {}", watchdog.name());
        self.watchdogs.push(watchdog);
    }

    pub fn len(&self) -> usize {
        self.watchdogs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchdogs.is_empty()
    }

    /// Attach all watchdogs
    pub async fn attach_all(&self, cdp_client: Arc<CDPClient>) -> Result<()> {
        for watchdog in &self.watchdogs {
            watchdog.on_attach(cdp_client.clone()).await?;
            tracing::debug!("Attached watchdog: {}", watchdog.name());
        }
        Ok(())
    }

    /// Detach all watchdogs
    pub async fn detach_all(&self) -> Result<()> {
        for watchdog in &self.watchdogs {
            watchdog.on_detach().await?;
        }
        Ok(())
    }

    /// Dispatch event to all watchdogs concurrently
    pub async fn dispatch(&self, event: Arc<BrowserEvent>) {
        use futures_util::future::join_all;

        let tasks: Vec<_> = self
            .watchdogs
            .iter()
            .map(|w| {
                let event = event.clone();
                async move {
                    w.on_event(&event).await;
                }
            })
            .collect();

        join_all(tasks).await;
    }
}

impl Default for WatchdogManager {
    fn default() -> Self {
        Self::new()
    }
}
