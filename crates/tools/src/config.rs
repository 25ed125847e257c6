//! Environment configuration
//!
//! Settings come from the process environment after a `.env` file (if any)
//! is loaded. Command-line flags override individual fields afterwards.

use jsonfy_browser::{ExtractOptions, SessionConfig, WaitUntil};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ToolError};

#[derive(Debug, Clone, PartialEq)]
pub struct JsonfyConfig {
    /// `TIMEOUT`, milliseconds
    pub timeout_ms: u64,
    /// `WAIT_UNTIL`
    pub wait_until: WaitUntil,
    /// `INITIAL_WAIT`, seconds to let the page settle after navigating
    pub initial_wait_secs: u64,
    /// `HEADLESS`
    pub headless: bool,
    /// `CDP_URL`
    pub cdp_url: Option<String>,
    /// `CHROME_PATH`
    pub chrome_path: Option<String>,
    /// `HIGHLIGHT`
    pub highlight: bool,
    pub output_json_path: PathBuf,
    pub structure_json_path: PathBuf,
    pub screenshot_path: PathBuf,
    pub consolidated_html_path: PathBuf,
    pub markdown_path: PathBuf,
    /// `LOG_LEVEL`, used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for JsonfyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            wait_until: WaitUntil::Load,
            initial_wait_secs: 3,
            headless: false,
            cdp_url: None,
            chrome_path: None,
            highlight: true,
            output_json_path: PathBuf::from("interactive_elements.json"),
            structure_json_path: PathBuf::from("html_structure.json"),
            screenshot_path: PathBuf::from("screenshots/screenshot.png"),
            consolidated_html_path: PathBuf::from("consolidated.html"),
            markdown_path: PathBuf::from("consolidated.md"),
            log_level: "info".to_string(),
        }
    }
}

impl JsonfyConfig {
    /// Load `.env` if present, then read the environment
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!("Ignoring malformed .env file: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(value) = get("TIMEOUT") {
            config.timeout_ms = parse_number("TIMEOUT", &value)?;
        }
        if let Some(value) = get("WAIT_UNTIL") {
            config.wait_until = value.parse().map_err(|reason| ToolError::Config {
                key: "WAIT_UNTIL",
                value: value.clone(),
                reason,
            })?;
        }
        if let Some(value) = get("INITIAL_WAIT") {
            config.initial_wait_secs = parse_number("INITIAL_WAIT", &value)?;
        }
        if let Some(value) = get("HEADLESS") {
            config.headless = parse_flag("HEADLESS", &value)?;
        }
        if let Some(value) = get("HIGHLIGHT") {
            config.highlight = parse_flag("HIGHLIGHT", &value)?;
        }
        config.cdp_url = get("CDP_URL");
        config.chrome_path = get("CHROME_PATH");

        let paths = [
            ("OUTPUT_JSON_PATH", &mut config.output_json_path),
            ("STRUCTURE_JSON_PATH", &mut config.structure_json_path),
            ("SCREENSHOT_PATH", &mut config.screenshot_path),
            ("CONSOLIDATED_HTML_PATH", &mut config.consolidated_html_path),
            ("MARKDOWN_PATH", &mut config.markdown_path),
        ];
        for (key, slot) in paths {
            if let Some(value) = get(key) {
                *slot = PathBuf::from(value);
            }
        }
        if let Some(value) = get("LOG_LEVEL") {
            config.log_level = value.to_ascii_lowercase();
        }

        Ok(config)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            cdp_url: self.cdp_url.clone(),
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            wait_until: self.wait_until,
            navigation_timeout: Duration::from_millis(self.timeout_ms),
            settle_delay: Duration::from_secs(self.initial_wait_secs),
            extract: ExtractOptions {
                highlight: self.highlight,
                ..ExtractOptions::default()
            },
            ..SessionConfig::default()
        }
    }
}

fn parse_number(key: &'static str, value: &str) -> Result<u64> {
    value.parse().map_err(|e: std::num::ParseIntError| ToolError::Config {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ToolError::Config {
            key,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
