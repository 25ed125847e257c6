//! Chrome DevTools Protocol transport
//!
//! One WebSocket per browser. Targets are attached with `flatten: true`, so
//! every tab's traffic shares that socket and is told apart by session id.

pub mod client;
pub mod protocol;
pub mod session;

pub use client::{CDPClient, CDPError};
pub use protocol::{CDPEvent, CDPRequest, CDPResponse, SessionId, TargetId};
pub use session::CDPSession;
