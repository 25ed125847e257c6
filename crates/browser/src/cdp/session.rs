//! CDP Session - Represents a connection to a specific browser target
//!
//! Design: Lightweight wrapper around CDPClient with target-specific context.
//! All sessions share the same WebSocket - no per-session connection overhead.

use super::client::{CDPClient, CDPError, Result};
use super::protocol::{AttachToTargetResult, CDPEvent, NavigateResult, SessionId, TargetId, TargetInfo};
use serde_json::{json, Value};
use std::sync::Arc;

/// Domains every extraction session needs
pub const DEFAULT_DOMAINS: &[&str] = &["Page", "DOM", "DOMSnapshot", "Runtime", "Inspector"];

/// CDP Session bound to a specific target
#[derive(Clone)]
pub struct CDPSession {
    /// Shared CDP client
    client: Arc<CDPClient>,

    /// Target this session is attached to
    pub target_id: TargetId,

    /// Session ID assigned by Chrome
    pub session_id: SessionId,

    /// Cached target info
    pub title: String,
    pub url: String,
}

impl CDPSession {
    /// Attach to a target and create session
    pub async fn attach(
        client: Arc<CDPClient>,
        target_id: TargetId,
        domains: Option<Vec<&str>>,
    ) -> Result<Self> {
        // Attach to target
        let result = client
            .send_request(
                "Target.attachToTarget",
                Some(json!({
                    "targetId": target_id,
                    "flatten": true,
                })),
                None,
            )
            .await?;

        let attach_result: AttachToTargetResult = serde_json::from_value(result)?;
        let session_id = attach_result.session_id;

        let domains = domains.unwrap_or_else(|| DEFAULT_DOMAINS.to_vec());

        // Enable all domains in parallel
        let enable_futures: Vec<_> = domains
            .into_iter()
            .map(|domain| {
                let client = client.clone();
                let session_id = session_id.clone();
                async move {
                    client
                        .send_request(format!("{}.enable", domain), None, Some(session_id))
                        .await
                }
            })
            .collect();

        // Wait for all enables (ignore individual failures)
        let results = futures_util::future::join_all(enable_futures).await;
        let failures: Vec<_> = results.iter().filter(|r| r.is_err()).collect();
        if !failures.is_empty() {
            tracing::warn!(
                "Some domain enables failed: {}/{}",
                failures.len(),
                results.len()
            );
        }

        // Page CSP must not block the injected highlight and fill scripts
        if let Err(e) = client
            .send_request(
                "Page.setBypassCSP",
                Some(json!({ "enabled": true })),
                Some(session_id.clone()),
            )
            .await
        {
            tracing::warn!("Failed to bypass CSP: {}", e);
        }

        // Navigation waits are driven by lifecycle events
        client
            .send_request(
                "Page.setLifecycleEventsEnabled",
                Some(json!({ "enabled": true })),
                Some(session_id.clone()),
            )
            .await?;

        // Get target info
        let info_result = client
            .send_request(
                "Target.getTargetInfo",
                Some(json!({ "targetId": &target_id })),
                None,
            )
            .await?;

        let target_info: TargetInfo = serde_json::from_value(info_result["targetInfo"].clone())?;

        Ok(Self {
            client,
            target_id,
            session_id,
            title: target_info.title,
            url: target_info.url,
        })
    }

    pub fn client(&self) -> &Arc<CDPClient> {
        &self.client
    }

    /// Send command within this session's context
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        self.client
            .send_request(method, params, Some(self.session_id.clone()))
            .await
    }

    /// Whether an event was emitted by this session's target
    pub fn owns(&self, event: &CDPEvent) -> bool {
        event.session_id.as_deref() == Some(self.session_id.as_str())
    }

    /// Get current target info
    pub async fn get_target_info(&self) -> Result<TargetInfo> {
        let result = self
            .client
            .send_request(
                "Target.getTargetInfo",
                Some(json!({ "targetId": &self.target_id })),
                None,
            )
            .await?;

        Ok(serde_json::from_value(result["targetInfo"].clone())?)
    }

    /// Start a navigation; does not wait for it to load
    pub async fn navigate(&self, url: impl Into<String>) -> Result<NavigateResult> {
        let result = self
            .send("Page.navigate", Some(json!({ "url": url.into() })))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Evaluate JavaScript and return the by-value result
    ///
    /// A thrown exception becomes a protocol error carrying its description.
    pub async fn evaluate(&self, expression: impl Into<String>) -> Result<Value> {
        let result = self
            .send(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression.into(),
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("script threw")
                .to_string();
            return Err(CDPError::Protocol { code: -1, message });
        }

        Ok(result["result"]["value"].clone())
    }
}
