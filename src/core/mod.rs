//! Core extension logic
//!
//! Message vocabulary, activation state, the per-page agent and the
//! background service. Nothing in here renders; overlay changes go out
//! through a `Presenter`.

pub mod agent;
pub mod background;
pub mod messages;
pub mod session;
pub mod state;

pub use agent::{AgentHandle, HostPage, PageAgent, PageEvent};
pub use background::BackgroundService;
pub use messages::{Message, Response};
pub use state::{ActivationState, OverlayMode};
