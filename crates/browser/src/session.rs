//! Browser Session Management
//!
//! The high-level driver API: one explicitly owned session per browser,
//! holding the CDP connection, the tabs attached to it and the id map of
//! the last extraction so agents can act on interactive ids.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use jsonfy_dom::record::parse_selector;
use jsonfy_dom::{BackendNodeId, PageMetadata};

use crate::cdp::client::{CDPError, DEFAULT_REQUEST_TIMEOUT};
use crate::cdp::protocol::{LifecycleEvent, SessionId, TargetId};
use crate::cdp::{CDPClient, CDPEvent, CDPSession};
use crate::error::{BrowserError, Result};
use crate::events::{BrowserEvent, EventBus};
use crate::extraction::{ExtractOptions, PageExtractor, PageState};
use crate::launcher::{ChromeLauncher, ChromeProcess, LaunchOptions};
use crate::watchdog::WatchdogManager;
use crate::watchdogs::{DialogWatchdog, DocumentGeneration, NavigationWatchdog};

/// Permissions denied for every origin
pub const DENIED_PERMISSIONS: &[&str] = &[
    "geolocation",
    "microphone",
    "camera",
    "notifications",
    "midi",
    "midi-sysex",
    "background-sync",
    "ambient-light-sensor",
    "accelerometer",
    "gyroscope",
    "magnetometer",
    "clipboard-read",
    "clipboard-write",
    "payment-handler",
];

/// Fills inputs, textareas, selects and contenteditable elements the way a
/// user edit would, so frameworks listening for `input` see the change.
const FILL_FUNCTION: &str = r#"function (value) {
  const view = this.ownerDocument.defaultView;
  this.scrollIntoView({ block: 'center', inline: 'center' });
  this.focus();
  if (this.isContentEditable) {
    this.textContent = value;
  } else if ('value' in this) {
    const proto = this instanceof view.HTMLTextAreaElement ? view.HTMLTextAreaElement.prototype
      : this instanceof view.HTMLSelectElement ? view.HTMLSelectElement.prototype
      : view.HTMLInputElement.prototype;
    const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
    if (descriptor && descriptor.set) descriptor.set.call(this, value); else this.value = value;
  } else {
    throw new Error('element is not editable');
  }
  this.dispatchEvent(new Event('input', { bubbles: true }));
  this.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
}"#;

/// Navigation milestone to wait for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    #[default]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "networkidle")]
    NetworkIdle,
    /// Return as soon as the navigation is committed
    Commit,
}

impl WaitUntil {
    /// `Page.lifecycleEvent` name that completes the wait
    pub fn lifecycle_name(self) -> Option<&'static str> {
        match self {
            WaitUntil::Load => Some("load"),
            WaitUntil::DomContentLoaded => Some("DOMContentLoaded"),
            WaitUntil::NetworkIdle => Some("networkIdle"),
            WaitUntil::Commit => None,
        }
    }
}

impl fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
            WaitUntil::Commit => "commit",
        };
        f.write_str(name)
    }
}

impl FromStr for WaitUntil {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "load" => Ok(WaitUntil::Load),
            "domcontentloaded" => Ok(WaitUntil::DomContentLoaded),
            "networkidle" | "networkidle0" => Ok(WaitUntil::NetworkIdle),
            "commit" => Ok(WaitUntil::Commit),
            other => Err(format!("unknown wait condition: {}", other)),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub id: String,
    /// Existing browser endpoint; a browser is launched when unset
    pub cdp_url: Option<String>,
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_data_dir: Option<String>,
    pub wait_until: WaitUntil,
    pub navigation_timeout: Duration,
    /// Extra wait after navigation and after each page action
    pub settle_delay: Duration,
    pub request_timeout: Duration,
    pub deny_permissions: bool,
    #[serde(skip)]
    pub extract: ExtractOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            cdp_url: None,
            headless: false,
            chrome_path: None,
            user_data_dir: None,
            wait_until: WaitUntil::Load,
            navigation_timeout: Duration::from_millis(60_000),
            settle_delay: Duration::from_secs(3),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            deny_permissions: true,
            extract: ExtractOptions {
                highlight: true,
                ..ExtractOptions::default()
            },
        }
    }
}

/// Interactive ids of the last extraction
#[derive(Debug, Clone)]
struct ElementIndex {
    target_id: TargetId,
    generation: u64,
    backend_ids: HashMap<u32, BackendNodeId>,
}

impl ElementIndex {
    /// Ids from a document that has since been replaced never resolve
    fn lookup(&self, id: u32, generation: u64, selector: &str) -> Result<BackendNodeId> {
        if self.generation != generation {
            tracing::warn!("Interactive id {} belongs to a previous document", id);
            return Err(BrowserError::ElementNotFound(format!("{} (page changed since extraction)", selector)));
        }
        self.backend_ids
            .get(&id)
            .copied()
            .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()))
    }
}

/// Browser Session - manages connection to Chrome and tabs
pub struct BrowserSession {
    pub config: SessionConfig,
    pub event_bus: EventBus,

    // CDP infrastructure
    cdp_client: Arc<RwLock<Option<Arc<CDPClient>>>>,
    sessions: Arc<RwLock<HashMap<TargetId, CDPSession>>>,
    chrome: Mutex<Option<ChromeProcess>>,

    // Current focus
    current_target: Arc<RwLock<Option<TargetId>>>,

    watchdog_manager: Arc<RwLock<WatchdogManager>>,
    generation: DocumentGeneration,
    elements: Arc<RwLock<Option<ElementIndex>>>,
}

impl BrowserSession {
    pub fn new(config: SessionConfig) -> Self {
        let generation = DocumentGeneration::new();

        let mut watchdog_manager = WatchdogManager::new();
        watchdog_manager.register(Box::new(NavigationWatchdog::new(generation.clone())));
        watchdog_manager.register(Box::new(DialogWatchdog::new()));

        Self {
            config,
            event_bus: EventBus::new(),
            cdp_client: Arc::new(RwLock::new(None)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            chrome: Mutex::new(None),
            current_target: Arc::new(RwLock::new(None)),
            watchdog_manager: Arc::new(RwLock::new(watchdog_manager)),
            generation,
            elements: Arc::new(RwLock::new(None)),
        }
    }

    /// Connect (launching Chrome if needed) and attach to a page
    pub async fn start(&self) -> Result<()> {
        if self.cdp_client.read().await.is_some() {
            return Ok(());
        }

        let ws_url = match &self.config.cdp_url {
            Some(url) => url.clone(),
            None => {
                let launcher = ChromeLauncher::new(LaunchOptions {
                    executable: self.config.chrome_path.as_ref().map(Into::into),
                    headless: self.config.headless,
                    user_data_dir: self.config.user_data_dir.as_ref().map(Into::into),
                    ..LaunchOptions::default()
                });
                let process = launcher.launch().await?;
                let url = process.ws_url().to_string();
                *self.chrome.lock().await = Some(process);
                url
            }
        };

        let client = CDPClient::connect_with_timeout(&ws_url, self.config.request_timeout).await?;
        *self.cdp_client.write().await = Some(client.clone());
        tracing::info!("Session {} connected to {}", self.config.id, ws_url);

        self.watchdog_manager
            .read()
            .await
            .attach_all(client.clone())
            .await?;

        if self.config.deny_permissions {
            deny_permissions(&client).await;
        }

        // Reuse an existing page before opening a new one
        let targets = client.send_request("Target.getTargets", None, None).await?;
        let existing = targets["targetInfos"]
            .as_array()
            .and_then(|infos| infos.iter().find(|t| t["type"] == "page"))
            .and_then(|t| t["targetId"].as_str())
            .map(str::to_string);
        match existing {
            Some(target_id) => self.attach(client, target_id).await?,
            None => {
                self.new_tab(None).await?;
            }
        }

        self.publish(BrowserEvent::Started).await;
        Ok(())
    }

    /// Stop the browser session
    pub async fn stop(&self) -> Result<()> {
        self.watchdog_manager.read().await.detach_all().await?;

        for session_id in self.sessions.write().await.drain().map(|(_, s)| s.session_id) {
            self.generation.forget(&session_id);
        }
        *self.current_target.write().await = None;
        *self.elements.write().await = None;

        if let Some(client) = self.cdp_client.write().await.take() {
            if let Err(e) = client.close().await {
                tracing::debug!("Error closing CDP connection: {}", e);
            }
        }
        if let Some(process) = self.chrome.lock().await.take() {
            process.kill().await?;
        }

        self.publish(BrowserEvent::Stopped).await;
        Ok(())
    }

    /// Keep the browser open until `token` is cancelled, then stop
    pub async fn run_until_cancelled(&self, token: CancellationToken) -> Result<()> {
        tracing::info!("Session {} waiting for shutdown", self.config.id);
        token.cancelled().await;
        self.stop().await
    }

    /// Create new tab
    pub async fn new_tab(&self, url: Option<String>) -> Result<TargetId> {
        let client = self.client().await?;
        let url = url.unwrap_or_else(|| "about:blank".to_string());

        let result = client
            .send_request("Target.createTarget", Some(json!({ "url": url })), None)
            .await?;

        let target_id: TargetId = result["targetId"]
            .as_str()
            .ok_or(BrowserError::Cdp(CDPError::InvalidResponse(0)))?
            .to_string();

        self.attach(client, target_id.clone()).await?;
        self.publish(BrowserEvent::TabCreated {
            target_id: target_id.clone(),
        })
        .await;

        Ok(target_id)
    }

    async fn attach(&self, client: Arc<CDPClient>, target_id: TargetId) -> Result<()> {
        let session = CDPSession::attach(client, target_id.clone(), None).await?;
        self.sessions.write().await.insert(target_id.clone(), session);
        *self.current_target.write().await = Some(target_id);
        Ok(())
    }

    /// Switch to tab
    pub async fn switch_tab(&self, target_id: TargetId) -> Result<()> {
        if !self.sessions.read().await.contains_key(&target_id) {
            return Err(BrowserError::TargetNotFound(target_id));
        }

        if let Ok(client) = self.client().await {
            let _ = client
                .send_request("Target.activateTarget", Some(json!({ "targetId": &target_id })), None)
                .await;
        }
        *self.current_target.write().await = Some(target_id.clone());

        self.publish(BrowserEvent::TabSwitched { target_id }).await;
        Ok(())
    }

    /// Get current session
    pub async fn current_session(&self) -> Option<CDPSession> {
        let target_id = self.current_target.read().await.clone()?;
        self.sessions.read().await.get(&target_id).cloned()
    }

    pub fn generation(&self) -> &DocumentGeneration {
        &self.generation
    }

    /// Navigate current tab and wait for the configured milestone plus the settle delay
    pub async fn navigate(&self, url: impl Into<String>) -> Result<()> {
        let url = url.into();
        let session = self.active().await?;
        let wait_until = self.config.wait_until;
        tracing::info!("Navigating to {} (wait_until: {})", url, wait_until);

        self.publish(BrowserEvent::NavigationStarted { url: url.clone() })
            .await;

        // Subscribe before navigating so no lifecycle event is missed
        let mut events = session.client().events();
        let navigation = session.navigate(&url).await?;
        if let Some(reason) = navigation.error_text.filter(|e| !e.is_empty()) {
            return Err(BrowserError::Navigation { url, reason });
        }

        if let (Some(name), Some(loader_id)) = (wait_until.lifecycle_name(), navigation.loader_id.as_deref()) {
            tokio::time::timeout(
                self.config.navigation_timeout,
                wait_for_lifecycle(&mut events, &session.session_id, &navigation.frame_id, loader_id, name),
            )
            .await
            .map_err(|_| BrowserError::NavigationTimeout {
                url: url.clone(),
                wait_until: wait_until.to_string(),
                timeout_ms: self.config.navigation_timeout.as_millis() as u64,
            })??;
        }

        tokio::time::sleep(self.config.settle_delay).await;

        self.publish(BrowserEvent::NavigationComplete { url }).await;
        Ok(())
    }

    /// Extract the current tab and remember its interactive ids
    pub async fn extract(&self) -> Result<PageState> {
        let session = self.active().await?;
        let state = PageExtractor::new(&session, &self.generation, &self.config.extract)
            .extract()
            .await?;

        *self.elements.write().await = Some(ElementIndex {
            target_id: session.target_id.clone(),
            generation: state.generation,
            backend_ids: state.backend_ids(),
        });

        self.publish(BrowserEvent::ScanCompleted {
            url: state.url().map(str::to_string),
            elements: state.scan.interactive_elements.len(),
            iframes: state.scan.iframe_infos.len(),
        })
        .await;
        Ok(state)
    }

    pub async fn metadata(&self) -> Result<PageMetadata> {
        let session = self.active().await?;
        Ok(PageExtractor::new(&session, &self.generation, &self.config.extract)
            .metadata()
            .await?)
    }

    /// Click the centre of the element's first content quad
    pub async fn click(&self, selector: &str) -> Result<()> {
        let session = self.active().await?;
        let backend = self.resolve(&session, selector).await?;

        session
            .send("DOM.scrollIntoViewIfNeeded", Some(json!({ "backendNodeId": backend })))
            .await?;
        let quads = session
            .send("DOM.getContentQuads", Some(json!({ "backendNodeId": backend })))
            .await?;
        let (x, y) = quad_center(&quads["quads"]).ok_or_else(|| BrowserError::NotInteractable {
            selector: selector.to_string(),
            reason: "element has no visible box".to_string(),
        })?;

        for event in ["mouseMoved", "mousePressed", "mouseReleased"] {
            session
                .send(
                    "Input.dispatchMouseEvent",
                    Some(json!({ "type": event, "x": x, "y": y, "button": "left", "clickCount": 1 })),
                )
                .await?;
        }
        tracing::debug!("Clicked {} at ({:.1}, {:.1})", selector, x, y);
        Ok(())
    }

    /// Replace the element's value
    pub async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let session = self.active().await?;
        let backend = self.resolve(&session, selector).await?;

        let resolved = session
            .send("DOM.resolveNode", Some(json!({ "backendNodeId": backend })))
            .await?;
        let object_id = resolved["object"]["objectId"]
            .as_str()
            .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()))?
            .to_string();

        let result = session
            .send(
                "Runtime.callFunctionOn",
                Some(json!({
                    "objectId": object_id,
                    "functionDeclaration": FILL_FUNCTION,
                    "arguments": [{ "value": value }],
                    "returnByValue": true,
                })),
            )
            .await;
        let _ = session
            .send("Runtime.releaseObject", Some(json!({ "objectId": object_id })))
            .await;

        let result = result?;
        if let Some(details) = result.get("exceptionDetails") {
            return Err(BrowserError::NotInteractable {
                selector: selector.to_string(),
                reason: details["exception"]["description"]
                    .as_str()
                    .unwrap_or("fill failed")
                    .to_string(),
            });
        }
        tracing::debug!("Filled {}", selector);
        Ok(())
    }

    /// Focus the element and press Enter
    pub async fn press_enter(&self, selector: &str) -> Result<()> {
        let session = self.active().await?;
        let backend = self.resolve(&session, selector).await?;

        session
            .send("DOM.focus", Some(json!({ "backendNodeId": backend })))
            .await?;
        session
            .send(
                "Input.dispatchKeyEvent",
                Some(json!({
                    "type": "keyDown",
                    "key": "Enter",
                    "code": "Enter",
                    "windowsVirtualKeyCode": 13,
                    "nativeVirtualKeyCode": 13,
                    "text": "\r",
                })),
            )
            .await?;
        session
            .send(
                "Input.dispatchKeyEvent",
                Some(json!({
                    "type": "keyUp",
                    "key": "Enter",
                    "code": "Enter",
                    "windowsVirtualKeyCode": 13,
                    "nativeVirtualKeyCode": 13,
                })),
            )
            .await?;
        tracing::debug!("Pressed Enter on {}", selector);
        Ok(())
    }

    /// Wait for the page to settle after an action
    ///
    /// When the action started a navigation, also waits (bounded by the
    /// navigation timeout) for the new document to finish loading.
    pub async fn settle(&self, generation_before: u64) -> Result<()> {
        tokio::time::sleep(self.config.settle_delay).await;

        let session = self.active().await?;
        if self.generation.current(&session.session_id) == generation_before {
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + self.config.navigation_timeout;
        while tokio::time::Instant::now() < deadline {
            if let Ok(Value::Bool(true)) = session.evaluate("document.readyState === 'complete'").await {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tracing::warn!("Page did not finish loading within {:?}", self.config.navigation_timeout);
        Ok(())
    }

    /// PNG of the viewport, or of the whole page when `full_page` is set
    pub async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let session = self.active().await?;

        let mut params = json!({ "format": "png", "captureBeyondViewport": full_page });
        if full_page {
            let metrics = session.send("Page.getLayoutMetrics", None).await?;
            let size = &metrics["cssContentSize"];
            if let (Some(width), Some(height)) = (size["width"].as_f64(), size["height"].as_f64()) {
                params["clip"] = json!({ "x": 0, "y": 0, "width": width, "height": height, "scale": 1 });
            }
        }

        let result = session.send("Page.captureScreenshot", Some(params)).await?;
        let data = result["data"].as_str().unwrap_or_default();
        Ok(base64::engine::general_purpose::STANDARD.decode(data)?)
    }

    async fn client(&self) -> Result<Arc<CDPClient>> {
        self.cdp_client
            .read()
            .await
            .clone()
            .ok_or(BrowserError::NotConnected)
    }

    async fn active(&self) -> Result<CDPSession> {
        self.current_session().await.ok_or(BrowserError::NoActiveTab)
    }

    /// Backend node for an interactive id or a CSS selector
    async fn resolve(&self, session: &CDPSession, selector: &str) -> Result<BackendNodeId> {
        if let Some(id) = parse_selector(selector) {
            let elements = self.elements.read().await;
            let index = elements
                .as_ref()
                .filter(|index| index.target_id == session.target_id)
                .ok_or_else(|| BrowserError::ElementNotFound(format!("{} (no extraction for this tab)", selector)))?;
            return index.lookup(id, self.generation.current(&session.session_id), selector);
        }

        let document = session.send("DOM.getDocument", Some(json!({ "depth": 0 }))).await?;
        let found = session
            .send(
                "DOM.querySelector",
                Some(json!({ "nodeId": document["root"]["nodeId"], "selector": selector })),
            )
            .await?;
        let node_id = found["nodeId"].as_u64().filter(|&id| id != 0);
        let Some(node_id) = node_id else {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        };
        let described = session
            .send("DOM.describeNode", Some(json!({ "nodeId": node_id })))
            .await?;
        described["node"]["backendNodeId"]
            .as_u64()
            .map(|id| id as BackendNodeId)
            .ok_or_else(|| BrowserError::ElementNotFound(selector.to_string()))
    }

    async fn publish(&self, event: BrowserEvent) {
        let event = Arc::new(event);
        self.event_bus.publish((*event).clone());
        self.watchdog_manager.read().await.dispatch(event).await;
    }
}

/// Deny each permission for all origins; unsupported ones are skipped
async fn deny_permissions(client: &CDPClient) {
    for permission in DENIED_PERMISSIONS {
        let descriptor = match *permission {
            "midi-sysex" => json!({ "name": "midi", "sysex": true }),
            name => json!({ "name": name }),
        };
        if let Err(e) = client
            .send_request(
                "Browser.setPermission",
                Some(json!({ "permission": descriptor, "setting": "denied" })),
                None,
            )
            .await
        {
            tracing::debug!("Permission {} not denied: {}", permission, e);
        }
    }
}

/// Wait for `name` on the given frame and loader
pub async fn wait_for_lifecycle(
    events: &mut broadcast::Receiver<CDPEvent>,
    session_id: &SessionId,
    frame_id: &str,
    loader_id: &str,
    name: &str,
) -> std::result::Result<(), CDPError> {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Skipped {} events while waiting for {}", skipped, name);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return Err(CDPError::Closed),
        };
        if event.method != "Page.lifecycleEvent" || event.session_id.as_ref() != Some(session_id) {
            continue;
        }
        let Some(lifecycle) = event
            .params
            .and_then(|p| serde_json::from_value::<LifecycleEvent>(p).ok())
        else {
            continue;
        };
        if lifecycle.frame_id == frame_id && lifecycle.loader_id == loader_id && lifecycle.name == name {
            return Ok(());
        }
    }
}

/// Centre of the first quad in a `DOM.getContentQuads` result
fn quad_center(quads: &Value) -> Option<(f64, f64)> {
    let quad: Vec<f64> = quads
        .as_array()?
        .first()?
        .as_array()?
        .iter()
        .filter_map(Value::as_f64)
        .collect();
    if quad.len() != 8 {
        return None;
    }
    let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
    let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;
    Some((x, y))
}
