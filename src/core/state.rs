//! Activation state of one page agent
//!
//! Tracks whether the overlay is up on the current document and when it
//! went up. Owned by exactly one `PageAgent`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which overlay an agent drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    /// Inverted "black hole" page filter
    Dark,
    /// Reader overlay with galaxy backgrounds
    Galactic,
}

impl OverlayMode {
    /// Prefix for the persisted per-site flag
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::Dark => "blackhole_",
            Self::Galactic => "galactic_",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Dark => "Black Hole Dark Mode",
            Self::Galactic => "Galactic Reader",
        }
    }
}

impl fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActivationState {
    pub is_active: bool,

    /// Unix time in milliseconds of the last activation
    pub activated_at_epoch_ms: Option<i64>,
}

impl ActivationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `Active`. Returns false if already active.
    pub fn activate(&mut self, now_epoch_ms: i64) -> bool {
        if self.is_active {
            return false;
        }
        self.is_active = true;
        self.activated_at_epoch_ms = Some(now_epoch_ms);
        true
    }

    /// Enter `Inactive`. Returns false if already inactive.
    pub fn deactivate(&mut self) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.activated_at_epoch_ms = None;
        true
    }
}

pub fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activate_is_idempotent() {
        let mut state = ActivationState::new();
        assert!(state.activate(1_000));
        let once = state.clone();
        assert!(!state.activate(2_000));
        assert_eq!(state, once);
        assert_eq!(state.activated_at_epoch_ms, Some(1_000));
    }

    #[test]
    fn test_deactivate_is_idempotent() {
        let mut state = ActivationState::new();
        assert!(!state.deactivate());
        state.activate(5);
        assert!(state.deactivate());
        assert!(!state.deactivate());
        assert_eq!(state, ActivationState::default());
    }

    #[test]
    fn test_key_prefixes_differ() {
        assert_ne!(OverlayMode::Dark.key_prefix(), OverlayMode::Galactic.key_prefix());
    }
}
