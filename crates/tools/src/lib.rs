//! Agent-facing surface of the extractor
//!
//! [`AgentTools`] wraps a [`jsonfy_browser::BrowserSession`] with the
//! operations an LLM agent drives (navigate, click, fill, press Enter,
//! metadata, screenshot), [`Persistence`] writes the extraction files, and
//! [`JsonfyConfig`] reads settings from the environment and `.env`.

pub mod agent;
pub mod config;
pub mod error;
pub mod persistence;

pub use agent::{normalize_url, AgentTools};
pub use config::JsonfyConfig;
pub use error::{Result, ToolError};
pub use persistence::{Persistence, SavedFiles};
