//! Chrome driver for page-state extraction
//!
//! Owns the browser side of extraction: a CDP connection, the tabs attached
//! to it, and the glue that captures a live document, runs the
//! `jsonfy-dom` core over it and writes the resulting interactive ids back
//! into the page.
//!
//! # Layout
//!
//! 1. **cdp**: one WebSocket, request/response matching, flattened target sessions
//! 2. **session**: `BrowserSession`, explicitly owned, one per browser
//! 3. **extraction**: `PageExtractor`, the Capture → Serialize phase pipeline
//! 4. **watchdogs**: navigation generation tracking and dialog dismissal

pub mod cdp;
pub mod error;
pub mod events;
pub mod extraction;
pub mod launcher;
pub mod session;
pub mod watchdog;
pub mod watchdogs;

pub use cdp::{CDPClient, CDPSession};
pub use error::{BrowserError, ExtractError, Result, ScanPhase};
pub use events::{BrowserEvent, EventBus};
pub use extraction::{ExtractOptions, PageExtractor, PageState};
pub use launcher::{ChromeLauncher, LaunchOptions};
pub use session::{BrowserSession, SessionConfig, WaitUntil};
pub use watchdog::{Watchdog, WatchdogManager};
pub use watchdogs::{DialogWatchdog, DocumentGeneration, NavigationWatchdog};
