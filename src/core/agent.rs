//! Page agent: the logic attached to one loaded document
//!
//! Owns the activation state, the active session and the overlay for a
//! single page. Created once per page load, driven by messages from the
//! popup and by events from the host page, dropped when the page unloads.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Config, EffectsConfig};
use crate::core::messages::{Message, Response};
use crate::core::session::{scroll_percent, ActiveSession};
use crate::core::state::{now_epoch_ms, ActivationState, OverlayMode};
use crate::extractor::ContentExtractor;
use crate::messaging::{dispatch, Inbox, MessageBus, MessageHandler, TabId, Target};
use crate::overlay::{Effect, OverlayEvent, Presenter};
use crate::storage::{site_key, KeyValueStore};
use crate::theme::{CosmicEvent, GalaxyTheme};

/// The document an agent is attached to
#[derive(Debug, Clone)]
pub struct HostPage {
    pub url: String,
    pub host: String,
    pub html: String,
}

impl HostPage {
    pub fn new(url: &str, html: impl Into<String>) -> Result<Self> {
        let parsed = url::Url::parse(url).context(format!("Invalid page URL: {}", url))?;
        let host = parsed
            .host_str()
            .context(format!("Page URL has no host: {}", url))?
            .to_string();
        Ok(Self {
            url: url.to_string(),
            host,
            html: html.into(),
        })
    }
}

/// Events raised by the host page itself
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageEvent {
    /// Overlay content pane scrolled
    Scroll {
        scroll_top: f64,
        scroll_height: f64,
        client_height: f64,
    },
    /// Page navigated away or closed
    Unload,
}

pub struct PageAgent {
    mode: OverlayMode,
    page: HostPage,
    site_key: String,
    state: ActivationState,
    theme: GalaxyTheme,
    session: Option<ActiveSession>,
    /// Set at load when the site flag was found; cleared once handled
    restore_pending: bool,
    restore_delay: Duration,
    effects: EffectsConfig,
    store: Arc<dyn KeyValueStore>,
    presenter: Arc<dyn Presenter>,
    extractor: Arc<ContentExtractor>,
}

impl PageAgent {
    pub fn new(
        page: HostPage,
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        presenter: Arc<dyn Presenter>,
        extractor: Arc<ContentExtractor>,
    ) -> Self {
        let mode = config.agent.mode;
        let site_key = site_key(mode, &page.host);

        let restore_pending = match store.get(&[site_key.as_str()]) {
            Ok(items) => items
                .get(&site_key)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Err(e) => {
                warn!(host = %page.host, "Could not read site flag: {}", e);
                false
            }
        };
        if restore_pending {
            debug!(host = %page.host, "Site flag set, overlay will be restored");
        }

        Self {
            mode,
            page,
            site_key,
            state: ActivationState::new(),
            theme: config.agent.default_theme,
            session: None,
            restore_pending,
            restore_delay: config.agent.restore_delay(),
            effects: config.effects.clone(),
            store,
            presenter,
            extractor,
        }
    }

    pub fn mode(&self) -> OverlayMode {
        self.mode
    }

    pub fn state(&self) -> &ActivationState {
        &self.state
    }

    pub fn theme(&self) -> GalaxyTheme {
        self.theme
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    pub fn restore_pending(&self) -> bool {
        self.restore_pending
    }

    /// Bring the overlay up. Returns false if it already was.
    pub fn activate(&mut self) -> bool {
        if !self.state.activate(now_epoch_ms()) {
            debug!(host = %self.page.host, "Already active");
            return false;
        }

        let content = match self.mode {
            OverlayMode::Galactic => Some(self.extractor.extract(&self.page.html).html),
            OverlayMode::Dark => None,
        };
        self.presenter.present(OverlayEvent::Attached {
            mode: self.mode,
            theme: self.theme,
            content,
        });
        if self.mode == OverlayMode::Galactic {
            self.presenter.present(OverlayEvent::ScrollLocked(true));
        }

        self.write_site_flag();
        self.session = Some(ActiveSession::start(
            self.mode,
            &self.effects,
            Arc::clone(&self.presenter),
        ));

        info!(host = %self.page.host, mode = %self.mode, theme = %self.theme, "Overlay activated");
        true
    }

    /// Tear the overlay down. Returns false if it was not up.
    pub fn deactivate(&mut self) -> bool {
        if !self.state.deactivate() {
            debug!(host = %self.page.host, "Already inactive");
            return false;
        }

        // Dropping the session cancels its timers and audio
        if let Some(session) = self.session.take() {
            info!(
                host = %self.page.host,
                reading_secs = session.reading_time().as_secs(),
                "Overlay deactivated"
            );
        }

        self.presenter.present(OverlayEvent::Detached);
        if self.mode == OverlayMode::Galactic {
            self.presenter.present(OverlayEvent::ScrollLocked(false));
        }
        self.erase_site_flag();
        true
    }

    /// Delayed load-time activation from the site flag
    pub fn restore(&mut self) {
        if !self.restore_pending {
            return;
        }
        self.restore_pending = false;
        info!(host = %self.page.host, "Restoring overlay from previous visit");
        self.activate();
    }

    pub fn change_galaxy(&mut self, theme_id: &str) {
        self.theme = GalaxyTheme::resolve(theme_id);
        if self.state.is_active {
            self.presenter.present(OverlayEvent::ThemeChanged(self.theme));
        }
        debug!(theme = %self.theme, "Galaxy theme set");
    }

    pub fn trigger_cosmic_event(&mut self, name: &str) {
        let Some(event) = CosmicEvent::from_id(name) else {
            debug!("Ignoring unknown cosmic event '{}'", name);
            return;
        };
        match self.session.as_mut() {
            Some(session) => session.fire_cosmic_event(Effect::Cosmic(event)),
            None => debug!("Ignoring cosmic event '{}' while inactive", event),
        }
    }

    pub fn on_scroll(&mut self, scroll_top: f64, scroll_height: f64, client_height: f64) {
        if self.mode != OverlayMode::Galactic {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.scrolled(scroll_percent(scroll_top, scroll_height, client_height));
        }
    }

    fn toggle(&mut self, mode: OverlayMode, on: bool) -> Option<Response> {
        if mode != self.mode {
            debug!(requested = %mode, running = %self.mode, "Toggle for another mode ignored");
            return None;
        }
        // An explicit choice overrides the pending restore
        let cancelled_restore = std::mem::take(&mut self.restore_pending);
        if on {
            self.activate();
        } else if !self.deactivate() && cancelled_restore {
            // Never came up, but the site should not come back next visit
            self.erase_site_flag();
        }
        Some(Response::ok())
    }

    fn write_site_flag(&self) {
        let items = HashMap::from([(self.site_key.clone(), Value::Bool(true))]);
        if let Err(e) = self.store.set(items) {
            warn!(key = %self.site_key, "Could not persist site flag: {}", e);
        }
    }

    fn erase_site_flag(&self) {
        if let Err(e) = self.store.remove(&self.site_key) {
            warn!(key = %self.site_key, "Could not erase site flag: {}", e);
        }
    }

    /// Drive the agent until the page unloads or the bus drops its listener
    pub async fn run(mut self, mut inbox: Inbox, mut events: mpsc::UnboundedReceiver<PageEvent>) {
        let restore = tokio::time::sleep(self.restore_delay);
        tokio::pin!(restore);

        loop {
            tokio::select! {
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => dispatch(&mut self, envelope),
                    None => break,
                },
                event = events.recv() => match event {
                    Some(PageEvent::Scroll { scroll_top, scroll_height, client_height }) => {
                        self.on_scroll(scroll_top, scroll_height, client_height);
                    }
                    Some(PageEvent::Unload) | None => break,
                },
                () = &mut restore, if self.restore_pending => self.restore(),
            }
        }

        info!(host = %self.page.host, "Page unloaded");
        // Session (timers, audio) goes with the agent; the site flag stays
        self.session = None;
    }

    /// Bind to a tab on the bus and run in the background
    pub fn spawn(self, bus: &MessageBus, tab: TabId) -> AgentHandle {
        let inbox = bus.listen(Target::Tab(tab));
        let (events, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(inbox, events_rx));
        AgentHandle { tab, events, task }
    }
}

impl MessageHandler for PageAgent {
    fn handle(&mut self, message: Message) -> Option<Response> {
        match message {
            Message::CheckState => Some(Response::state(self.state.is_active)),
            Message::ActivateDarkMode => self.toggle(OverlayMode::Dark, true),
            Message::DeactivateDarkMode => self.toggle(OverlayMode::Dark, false),
            Message::ActivateGalacticMode => self.toggle(OverlayMode::Galactic, true),
            Message::DeactivateGalacticMode => self.toggle(OverlayMode::Galactic, false),
            Message::ChangeGalaxy(theme_id) => {
                self.change_galaxy(&theme_id);
                Some(Response::ok())
            }
            Message::TriggerCosmicEvent(name) => {
                self.trigger_cosmic_event(&name);
                Some(Response::ok())
            }
            // Background's business
            Message::CosmicTelemetry(_) => None,
        }
    }
}

/// Host-page side of a running agent
pub struct AgentHandle {
    tab: TabId,
    events: mpsc::UnboundedSender<PageEvent>,
    task: JoinHandle<()>,
}

impl AgentHandle {
    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn scroll(&self, scroll_top: f64, scroll_height: f64, client_height: f64) {
        let _ = self.events.send(PageEvent::Scroll {
            scroll_top,
            scroll_height,
            client_height,
        });
    }

    /// Unload the page and wait for the agent to finish
    pub async fn unload(self) {
        let _ = self.events.send(PageEvent::Unload);
        if let Err(e) = self.task.await {
            warn!("Page agent for {} ended abnormally: {}", self.tab, e);
        }
    }
}
