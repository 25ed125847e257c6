//! Page-state extraction core
//!
//! Turns a captured DOM into what an agent can reason about and act on:
//! a flat, ordered list of interactive elements (with ids written back into
//! the DOM), per-iframe content, and a compact JSON structure tree.
//!
//! Everything here is synchronous and free of I/O. The browser driver feeds
//! CDP captures in through [`DomService`]; tests and offline tools feed
//! plain HTML through [`html::parse_document`].
//!
//! ```text
//! CDP JSON / HTML → DomArena → Scanner ──→ ElementRecord[] + IframeInfo[]
//!                                │  └──→ annotations for the live DOM
//!                                └─────→ DomSerializer → StructureNode
//! ```

pub mod arena;
pub mod classifier;
pub mod compositor;
pub mod error;
pub mod highlight;
pub mod html;
pub mod iframe;
pub mod metadata;
pub mod record;
pub mod scanner;
pub mod serializer;
pub mod service;
pub mod types;
pub mod utils;
pub mod visibility;

pub use arena::DomArena;
pub use classifier::{classify, ClassifierConfig};
pub use compositor::{composite, composite_arena, Composite};
pub use error::{DomError, Result};
pub use metadata::PageMetadata;
pub use record::{ElementContent, ElementRecord, ElementType, IframeInfo, ScanResult};
pub use scanner::{Annotation, ScanOutcome, Scanner, ScannerConfig};
pub use serializer::{DomSerializer, HtmlStructure, SerializerConfig, StructureNode};
pub use service::DomService;
pub use types::*;
pub use visibility::{is_visible, FilterError};
