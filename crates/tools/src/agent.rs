//! Agent tool surface
//!
//! Every tool that changes the page waits for it to settle and returns a
//! fresh extraction, so the caller never acts on stale interactive ids.

use jsonfy_browser::{BrowserSession, PageState};
use jsonfy_dom::PageMetadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, ToolError};
use crate::persistence::write_file;

pub struct AgentTools {
    session: Arc<BrowserSession>,
    screenshot_path: PathBuf,
}

impl AgentTools {
    pub fn new(session: Arc<BrowserSession>, screenshot_path: impl Into<PathBuf>) -> Self {
        Self {
            session,
            screenshot_path: screenshot_path.into(),
        }
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        &self.session
    }

    pub async fn navigate(&self, url: &str) -> Result<PageState> {
        let url = normalize_url(url);
        info!("navigate({})", url);
        self.session.navigate(url).await?;
        self.extract().await
    }

    pub async fn click(&self, selector: &str) -> Result<PageState> {
        let selector = check_selector(selector)?;
        info!("click({})", selector);
        let before = self.generation().await;
        self.session.click(selector).await?;
        self.session.settle(before).await?;
        self.extract().await
    }

    pub async fn fill(&self, selector: &str, value: &str) -> Result<PageState> {
        let selector = check_selector(selector)?;
        info!("fill({}, {} chars)", selector, value.chars().count());
        let before = self.generation().await;
        self.session.fill(selector, value).await?;
        self.session.settle(before).await?;
        self.extract().await
    }

    pub async fn press_enter(&self, selector: &str) -> Result<PageState> {
        let selector = check_selector(selector)?;
        info!("press_enter({})", selector);
        let before = self.generation().await;
        self.session.press_enter(selector).await?;
        self.session.settle(before).await?;
        self.extract().await
    }

    pub async fn get_metadata(&self) -> Result<PageMetadata> {
        Ok(self.session.metadata().await?)
    }

    /// Write a PNG to `path` (or the configured default) and return where it went
    pub async fn screenshot(&self, path: Option<&Path>, full_page: bool) -> Result<PathBuf> {
        let path = path.unwrap_or(self.screenshot_path.as_path()).to_path_buf();
        let png = self.session.screenshot(full_page).await?;
        write_file(&path, &png)?;
        info!("Screenshot ({}) saved to {}", if full_page { "full page" } else { "viewport" }, path.display());
        Ok(path)
    }

    /// Extract, retrying once when the document changed underneath
    pub async fn extract(&self) -> Result<PageState> {
        match self.session.extract().await {
            Err(jsonfy_browser::BrowserError::Extract(e)) if e.is_retryable() => {
                warn!("Extraction interrupted ({}); retrying after the page settles", e);
                let before = self.generation().await;
                self.session.settle(before).await?;
                Ok(self.session.extract().await?)
            }
            result => Ok(result?),
        }
    }

    async fn generation(&self) -> u64 {
        match self.session.current_session().await {
            Some(tab) => self.session.generation().current(&tab.session_id),
            None => 0,
        }
    }
}

fn check_selector(selector: &str) -> Result<&str> {
    let selector = selector.trim();
    if selector.is_empty() {
        return Err(ToolError::EmptySelector);
    }
    Ok(selector)
}

/// Add a scheme to bare hosts; anything with a scheme passes through
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.contains("://")
        || ["about:", "data:", "file:", "javascript:"]
            .iter()
            .any(|scheme| trimmed.starts_with(scheme))
    {
        return trimmed.to_string();
    }
    if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
        return format!("http://{}", trimmed);
    }
    format!("https://{}", trimmed)
}
