//! Concrete Watchdog Implementations
//!
//! Each watchdog is a separate module for clarity.

pub mod dialog;
pub mod navigation;

pub use dialog::DialogWatchdog;
pub use navigation::{DocumentGeneration, NavigationWatchdog};
