//! Background service: usage counters and runtime messages
//!
//! Lives for the whole browser session, independent of any page. Keeps a
//! few counters in the shared store and answers `cosmicTelemetry`.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::messages::{Message, Response};
use crate::messaging::{MessageHandler, TabId};
use crate::storage::KeyValueStore;

pub const FIRST_LAUNCH_KEY: &str = "firstLaunch";
pub const TOTAL_ACTIVATIONS_KEY: &str = "totalActivations";
pub const TOTAL_LAUNCHES_KEY: &str = "totalLaunches";

pub struct BackgroundService {
    store: Arc<dyn KeyValueStore>,
}

impl BackgroundService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// First install: reset the counters
    pub fn on_installed(&self) {
        info!("Starlapse installed");
        let items = HashMap::from([
            (FIRST_LAUNCH_KEY.to_string(), Value::Bool(true)),
            (TOTAL_ACTIVATIONS_KEY.to_string(), Value::from(0u64)),
        ]);
        if let Err(e) = self.store.set(items) {
            warn!("Could not initialize counters: {}", e);
        }
    }

    /// Browser started with the extension loaded. Returns the launch number.
    pub fn on_startup(&self) -> Option<u64> {
        let launches = self.increment(TOTAL_LAUNCHES_KEY)?;
        info!("Cosmic journey continues, launch #{}", launches);
        Some(launches)
    }

    /// Toolbar button clicked on a page
    pub fn on_action_clicked(&self, url: &str) -> Option<u64> {
        debug!("Galactic portal accessed from {}", url);
        self.increment(TOTAL_ACTIVATIONS_KEY)
    }

    pub fn on_tab_updated(&self, tab: TabId, complete: bool, url: Option<&str>) {
        if let (true, Some(url)) = (complete, url) {
            debug!("{} finished loading {}", tab, url);
        }
    }

    fn increment(&self, key: &str) -> Option<u64> {
        let current = match self.store.get(&[key]) {
            Ok(items) => items.get(key).and_then(Value::as_u64).unwrap_or(0),
            Err(e) => {
                warn!("Could not read counter '{}': {}", key, e);
                return None;
            }
        };
        let next = current + 1;
        if let Err(e) = self.store.set(HashMap::from([(key.to_string(), Value::from(next))])) {
            warn!("Could not update counter '{}': {}", key, e);
            return None;
        }
        Some(next)
    }
}

impl MessageHandler for BackgroundService {
    fn handle(&mut self, message: Message) -> Option<Response> {
        match message {
            Message::CosmicTelemetry(data) => {
                info!(telemetry = %data, "Cosmic telemetry received");
                Some(Response::ok())
            }
            // Page agent vocabulary; not answered here
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{serve, MessageBus, MessagingError, Target};
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_install_resets_counters() {
        let store = Arc::new(MemoryStore::new());
        let background = BackgroundService::new(store.clone());
        background.on_action_clicked("https://example.com");
        background.on_installed();

        let items = store.get(&[FIRST_LAUNCH_KEY, TOTAL_ACTIVATIONS_KEY]).unwrap();
        assert_eq!(items[FIRST_LAUNCH_KEY], json!(true));
        assert_eq!(items[TOTAL_ACTIVATIONS_KEY], json!(0));
    }

    #[test]
    fn test_counters_increment() {
        let store = Arc::new(MemoryStore::new());
        let background = BackgroundService::new(store);

        assert_eq!(background.on_startup(), Some(1));
        assert_eq!(background.on_startup(), Some(2));
        assert_eq!(background.on_action_clicked("https://a.example"), Some(1));
        assert_eq!(background.on_action_clicked("https://b.example"), Some(2));
    }

    #[test]
    fn test_counters_survive_store_outage() {
        let store = Arc::new(MemoryStore::new());
        let background = BackgroundService::new(store.clone());
        background.on_startup();

        store.set_offline(true);
        assert_eq!(background.on_startup(), None);
        background.on_installed();

        store.set_offline(false);
        assert_eq!(background.on_startup(), Some(2));
    }

    #[tokio::test]
    async fn test_telemetry_over_runtime_channel() {
        let bus = MessageBus::new();
        let inbox = bus.listen(Target::Runtime);
        let mut background = BackgroundService::new(Arc::new(MemoryStore::new()));
        let task = tokio::spawn(async move { serve(inbox, &mut background).await });

        let response = bus
            .send(
                Target::Runtime,
                &Message::CosmicTelemetry(json!({"theme": "nebula"})),
            )
            .await
            .unwrap();
        assert_eq!(response, Response::ok());

        // Reports sent under `data`, or with nothing attached, are answered too
        let raw = bus
            .send_raw(
                Target::Runtime,
                json!({"action": "cosmicTelemetry", "data": {"milestone": 50}}),
            )
            .await
            .unwrap();
        assert_eq!(raw, json!({"success": true}));
        let raw = bus
            .send_raw(Target::Runtime, json!({"action": "cosmicTelemetry"}))
            .await
            .unwrap();
        assert_eq!(raw, json!({"success": true}));

        let err = bus
            .send(Target::Runtime, &Message::CheckState)
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::NoResponse));

        drop(bus);
        task.await.unwrap();
    }
}
