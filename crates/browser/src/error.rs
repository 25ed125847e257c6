//! Driver errors
//!
//! `ExtractError` is the extraction taxonomy: every fatal variant names the
//! phase it came from so callers can decide between retrying, keeping partial
//! state and giving up. `BrowserError` covers everything else the session does.

use crate::cdp::client::CDPError;
use jsonfy_dom::DomError;
use std::fmt;
use thiserror::Error;

/// Step of a page extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Capture,
    Scan,
    Annotate,
    Highlight,
    Metadata,
    Serialize,
    Composite,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Capture => "capture",
            ScanPhase::Scan => "scan",
            ScanPhase::Annotate => "annotate",
            ScanPhase::Highlight => "highlight",
            ScanPhase::Metadata => "metadata",
            ScanPhase::Serialize => "serialize",
            ScanPhase::Composite => "composite",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    /// A script injected into the page failed to run
    #[error("script unavailable during {phase}: {reason}")]
    ScriptUnavailable { phase: ScanPhase, reason: String },

    /// The document navigated away while it was being extracted
    #[error("document detached during {phase}")]
    DetachedDocument { phase: ScanPhase },

    #[error("document has no body element")]
    SerializationGap,

    #[error("CDP failure during {phase}: {source}")]
    Cdp {
        phase: ScanPhase,
        #[source]
        source: CDPError,
    },

    #[error("DOM failure during {phase}: {source}")]
    Dom {
        phase: ScanPhase,
        #[source]
        source: DomError,
    },
}

impl ExtractError {
    pub fn phase(&self) -> Option<ScanPhase> {
        match self {
            ExtractError::ScriptUnavailable { phase, .. }
            | ExtractError::DetachedDocument { phase }
            | ExtractError::Cdp { phase, .. }
            | ExtractError::Dom { phase, .. } => Some(*phase),
            ExtractError::SerializationGap => Some(ScanPhase::Serialize),
        }
    }

    /// Whether re-running the extraction after the page settles may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractError::DetachedDocument { .. } | ExtractError::Cdp { source: CDPError::Timeout(_), .. }
        )
    }

    pub(crate) fn cdp(phase: ScanPhase) -> impl FnOnce(CDPError) -> Self {
        move |source| ExtractError::Cdp { phase, source }
    }

    pub(crate) fn dom(phase: ScanPhase) -> impl FnOnce(DomError) -> Self {
        move |source| match source {
            DomError::SerializationGap => ExtractError::SerializationGap,
            source => ExtractError::Dom { phase, source },
        }
    }
}

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error(transparent)]
    Cdp(#[from] CDPError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Dom(#[from] DomError),

    #[error("Not connected")]
    NotConnected,

    #[error("No active tab")]
    NoActiveTab,

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Navigation to {url} did not reach {wait_until} within {timeout_ms}ms")]
    NavigationTimeout {
        url: String,
        wait_until: String,
        timeout_ms: u64,
    },

    #[error("No element matches {0}")]
    ElementNotFound(String),

    #[error("Element {selector} cannot be interacted with: {reason}")]
    NotInteractable { selector: String, reason: String },

    #[error("Invalid screenshot data: {0}")]
    Screenshot(#[from] base64::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_in_message() {
        let err = ExtractError::ScriptUnavailable {
            phase: ScanPhase::Highlight,
            reason: "EvalError".into(),
        };
        assert_eq!(err.to_string(), "script unavailable during highlight: EvalError");
        assert_eq!(err.phase(), Some(ScanPhase::Highlight));
    }

    #[test]
    fn test_serialization_gap_not_wrapped() {
        let err = ExtractError::dom(ScanPhase::Serialize)(DomError::SerializationGap);
        assert!(matches!(err, ExtractError::SerializationGap));

        let err = ExtractError::dom(ScanPhase::Scan)(DomError::MissingRoot);
        assert!(matches!(err, ExtractError::Dom { phase: ScanPhase::Scan, .. }));
    }

    #[test]
    fn test_retryable() {
        assert!(ExtractError::DetachedDocument { phase: ScanPhase::Annotate }.is_retryable());
        assert!(!ExtractError::SerializationGap.is_retryable());
        assert!(ExtractError::cdp(ScanPhase::Capture)(CDPError::Timeout("DOM.getDocument".into())).is_retryable());
    }
}
