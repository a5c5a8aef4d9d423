//! Presentation boundary
//!
//! The page agent never touches styling directly. It describes what should
//! happen on screen as `OverlayEvent`s and hands them to a `Presenter`.

use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::state::OverlayMode;
use crate::theme::{CosmicEvent, GalaxyTheme};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectPhase {
    Started,
    Finished,
}

/// Short-lived visual effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Entry animation of the dark mode filter
    SuckIn,
    Cosmic(CosmicEvent),
    /// Fired once per scroll milestone
    Milestone(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    /// Overlay tree attached; `content` is the sanitized reading markup
    Attached {
        mode: OverlayMode,
        theme: GalaxyTheme,
        content: Option<String>,
    },
    Detached,
    /// Host page scrolling locked (true) or restored (false)
    ScrollLocked(bool),
    ThemeChanged(GalaxyTheme),
    Effect {
        effect: Effect,
        phase: EffectPhase,
    },
    /// Reading progress, 0-100
    Progress(u8),
    ReadingTime(Duration),
    Twinkle,
    ShootingStar,
}

pub trait Presenter: Send + Sync {
    fn present(&self, event: OverlayEvent);
}

/// Forwards events to a channel consumed by whatever renders them
#[derive(Clone)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<OverlayEvent>,
}

impl ChannelPresenter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OverlayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Presenter for ChannelPresenter {
    fn present(&self, event: OverlayEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Overlay event dropped, renderer gone");
        }
    }
}

/// Drains everything currently queued on a presenter channel
pub fn drain(rx: &mut mpsc::UnboundedReceiver<OverlayEvent>) -> Vec<OverlayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
