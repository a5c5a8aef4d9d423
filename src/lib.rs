//! Starlapse - reader overlay for web pages
//!
//! Library half of the crate: the page agent, background service and popup
//! controller, wired together over an in-process message bus.

pub mod config;
pub mod core;
pub mod extractor;
pub mod messaging;
pub mod overlay;
pub mod popup;
#[cfg(feature = "sound")]
pub mod sound;
pub mod storage;
pub mod theme;
