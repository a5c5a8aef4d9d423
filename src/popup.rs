//! Popup controller: the two-button control panel
//!
//! Talks to the page agent of the focused tab. Every send can fail (page
//! not injected, tab gone, extension reloaded); failures revert the view to
//! the ready state with a short status message instead of propagating.

use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PopupConfig;
use crate::core::messages::{Message, Response};
use crate::core::state::OverlayMode;
use crate::messaging::{MessageBus, MessagingError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupView {
    pub active: bool,
    pub status: String,
    pub activate_visible: bool,
    pub deactivate_visible: bool,
}

impl PopupView {
    fn ready(mode: OverlayMode) -> Self {
        Self {
            active: false,
            status: StatusText::for_mode(mode).ready.to_string(),
            activate_visible: true,
            deactivate_visible: false,
        }
    }
}

/// Status lines shown by the popup for one mode
struct StatusText {
    ready: &'static str,
    stages: [&'static str; 3],
    activated: &'static str,
    activate_failed: &'static str,
    deactivating: &'static str,
    deactivated: &'static str,
    deactivate_failed: &'static str,
}

impl StatusText {
    fn for_mode(mode: OverlayMode) -> &'static StatusText {
        match mode {
            OverlayMode::Dark => &DARK_STATUS,
            OverlayMode::Galactic => &GALACTIC_STATUS,
        }
    }
}

const UNREACHABLE_STATUS: &str = "Could not reach this page. Try reloading the tab.";

static DARK_STATUS: StatusText = StatusText {
    ready: "Ready to consume reality",
    stages: [
        "Initializing gravitational field...",
        "Sucking in photons...",
        "Applying dark matter transformation...",
    ],
    activated: "Reality successfully consumed!",
    activate_failed: "Error: Black hole collapsed! Please reload the tab...",
    deactivating: "Reversing spacetime...",
    deactivated: "Reality restored!",
    deactivate_failed: "Error restoring reality!",
};

static GALACTIC_STATUS: StatusText = StatusText {
    ready: "Ready for launch",
    stages: [
        "Charting the star map...",
        "Gathering stardust from the page...",
        "Opening the galactic portal...",
    ],
    activated: "Welcome to the galaxy!",
    activate_failed: "Error: Portal failed to open! Please reload the tab...",
    deactivating: "Returning to Earth...",
    deactivated: "Back on solid ground!",
    deactivate_failed: "Error closing the portal!",
};

pub struct PopupController {
    bus: MessageBus,
    mode: OverlayMode,
    stage_delay: Duration,
    view: PopupView,
    /// Every status line shown, oldest first
    history: Vec<String>,
}

impl PopupController {
    pub fn new(bus: MessageBus, mode: OverlayMode, config: &PopupConfig) -> Self {
        let view = PopupView::ready(mode);
        Self {
            bus,
            mode,
            stage_delay: Duration::from_millis(config.stage_delay_ms),
            history: vec![view.status.clone()],
            view,
        }
    }

    pub fn view(&self) -> &PopupView {
        &self.view
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn text(&self) -> &'static StatusText {
        StatusText::for_mode(self.mode)
    }

    fn set_status(&mut self, status: &str) {
        self.view.status = status.to_string();
        self.history.push(status.to_string());
    }

    fn show_active(&mut self) {
        self.view.active = true;
        self.view.activate_visible = false;
        self.view.deactivate_visible = true;
    }

    fn show_inactive(&mut self) {
        self.view.active = false;
        self.view.activate_visible = true;
        self.view.deactivate_visible = false;
    }

    async fn pause(&self) {
        if !self.stage_delay.is_zero() {
            tokio::time::sleep(self.stage_delay).await;
        }
    }

    async fn send(&self, message: Message) -> Result<Response, MessagingError> {
        self.bus.send_to_active_tab(&message).await
    }

    /// Sync the view with the page agent when the popup opens
    pub async fn open(&mut self) {
        match self.send(Message::CheckState).await {
            Ok(response) if response.is_active() == Some(true) => self.show_active(),
            Ok(_) => self.show_inactive(),
            Err(e) => {
                debug!("Could not check state: {}", e);
                self.show_inactive();
                self.set_status(UNREACHABLE_STATUS);
            }
        }
    }

    pub async fn activate(&mut self) -> bool {
        let text = self.text();
        for (i, stage) in text.stages.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            self.set_status(stage);
        }

        match self.send(Message::activate(self.mode)).await {
            Ok(_) => {
                self.pause().await;
                self.show_active();
                self.set_status(text.activated);
                true
            }
            Err(e) => {
                warn!("Activation failed: {}", e);
                self.show_inactive();
                self.set_status(text.activate_failed);
                false
            }
        }
    }

    pub async fn deactivate(&mut self) -> bool {
        let text = self.text();
        self.set_status(text.deactivating);

        match self.send(Message::deactivate(self.mode)).await {
            Ok(_) => {
                self.pause().await;
                self.show_inactive();
                self.set_status(text.deactivated);
                true
            }
            Err(e) => {
                warn!("Deactivation failed: {}", e);
                self.show_inactive();
                self.set_status(text.deactivate_failed);
                false
            }
        }
    }

    pub async fn change_theme(&mut self, theme_id: &str) -> bool {
        match self.send(Message::ChangeGalaxy(theme_id.to_string())).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Theme change failed: {}", e);
                false
            }
        }
    }

    pub async fn trigger_event(&mut self, name: &str) -> bool {
        match self.send(Message::TriggerCosmicEvent(name.to_string())).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Cosmic event failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::agent::{HostPage, PageAgent};
    use crate::extractor::ContentExtractor;
    use crate::overlay::ChannelPresenter;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    fn instant_popup(bus: &MessageBus) -> PopupController {
        PopupController::new(
            bus.clone(),
            OverlayMode::Galactic,
            &PopupConfig { stage_delay_ms: 0 },
        )
    }

    fn spawn_agent(bus: &MessageBus) -> crate::core::agent::AgentHandle {
        let config = Config::default();
        let (presenter, _rx) = ChannelPresenter::new();
        let extractor = Arc::new(ContentExtractor::new(config.extractor.clone()).unwrap());
        let page = HostPage::new("https://example.com/", "<p>hello</p>").unwrap();
        let agent = PageAgent::new(
            page,
            &config,
            Arc::new(MemoryStore::new()),
            Arc::new(presenter),
            extractor,
        );
        agent.spawn(bus, bus.open_tab())
    }

    #[tokio::test]
    async fn test_open_without_agent_stays_ready() {
        let bus = MessageBus::new();
        bus.open_tab();
        let mut popup = instant_popup(&bus);

        popup.open().await;
        let view = popup.view();
        assert!(!view.active);
        assert!(view.activate_visible);
        assert!(!view.deactivate_visible);
        assert_eq!(view.status, UNREACHABLE_STATUS);
    }

    #[tokio::test]
    async fn test_deactivate_after_page_unload_falls_back_to_ready() {
        let bus = MessageBus::new();
        let agent = spawn_agent(&bus);
        let mut popup = instant_popup(&bus);

        assert!(popup.activate().await);
        assert!(popup.view().active);

        agent.unload().await;
        assert!(!popup.deactivate().await);
        let view = popup.view();
        assert!(!view.active);
        assert!(view.activate_visible);
        assert!(!view.deactivate_visible);
        assert_eq!(view.status, GALACTIC_STATUS.deactivate_failed);

        // Reopening against the dead page keeps the ready view
        popup.open().await;
        assert!(!popup.view().active);
        assert_eq!(popup.view().status, UNREACHABLE_STATUS);
    }

    #[tokio::test]
    async fn test_activate_failure_reverts_to_ready() {
        let bus = MessageBus::new();
        let mut popup = instant_popup(&bus);

        assert!(!popup.activate().await);
        let view = popup.view();
        assert!(!view.active);
        assert!(view.activate_visible);
        assert!(!view.deactivate_visible);
        assert_eq!(view.status, GALACTIC_STATUS.activate_failed);
    }

    #[tokio::test]
    async fn test_full_toggle_cycle() {
        let bus = MessageBus::new();
        let agent = spawn_agent(&bus);
        let mut popup = instant_popup(&bus);

        popup.open().await;
        assert!(!popup.view().active);

        assert!(popup.activate().await);
        assert!(popup.view().active);
        assert!(popup.view().deactivate_visible);
        assert_eq!(
            &popup.history()[1..],
            &[
                GALACTIC_STATUS.stages[0],
                GALACTIC_STATUS.stages[1],
                GALACTIC_STATUS.stages[2],
                GALACTIC_STATUS.activated,
            ]
        );

        // A freshly opened popup picks up the agent's state
        let mut reopened = instant_popup(&bus);
        reopened.open().await;
        assert!(reopened.view().active);

        assert!(popup.change_theme("aurora").await);
        assert!(popup.trigger_event("pulsar").await);

        assert!(popup.deactivate().await);
        assert!(!popup.view().active);
        assert_eq!(popup.view().status, GALACTIC_STATUS.deactivated);

        agent.unload().await;
        assert!(!popup.deactivate().await);
        assert_eq!(popup.view().status, GALACTIC_STATUS.deactivate_failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_delay_paces_status_updates() {
        let bus = MessageBus::new();
        let agent = spawn_agent(&bus);
        let mut popup = PopupController::new(
            bus.clone(),
            OverlayMode::Galactic,
            &PopupConfig { stage_delay_ms: 1000 },
        );

        let started = tokio::time::Instant::now();
        assert!(popup.activate().await);
        // Two pauses between stages, one before showing success
        assert!(started.elapsed() >= Duration::from_millis(3000));
        agent.unload().await;
    }
}
