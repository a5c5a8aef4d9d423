//! Galaxy themes and one-shot cosmic events.
//!
//! Both are closed sets. The ids are what travels in message payloads and
//! config files; anything outside the set falls back to the default (themes)
//! or is ignored (events).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Visual theme of the galactic reader overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GalaxyTheme {
    #[default]
    MilkyWay,
    Andromeda,
    Nebula,
    BlackHole,
    Aurora,
}

impl GalaxyTheme {
    pub const ALL: [GalaxyTheme; 5] = [
        GalaxyTheme::MilkyWay,
        GalaxyTheme::Andromeda,
        GalaxyTheme::Nebula,
        GalaxyTheme::BlackHole,
        GalaxyTheme::Aurora,
    ];

    /// Wire id, as used in `changeGalaxy` payloads
    pub fn id(&self) -> &'static str {
        match self {
            Self::MilkyWay => "milkyWay",
            Self::Andromeda => "andromeda",
            Self::Nebula => "nebula",
            Self::BlackHole => "blackHole",
            Self::Aurora => "aurora",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|theme| theme.id() == id)
    }

    /// Resolve a theme id, falling back to the default for unknown ids
    pub fn resolve(id: &str) -> Self {
        match Self::from_id(id) {
            Some(theme) => theme,
            None => {
                tracing::debug!("Unknown galaxy theme '{}', using {}", id, Self::default());
                Self::default()
            }
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MilkyWay => "Milky Way",
            Self::Andromeda => "Andromeda",
            Self::Nebula => "Orion Nebula",
            Self::BlackHole => "Black Hole",
            Self::Aurora => "Aurora Borealis",
        }
    }
}

impl fmt::Display for GalaxyTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Self-cleaning visual effect fired by `triggerCosmicEvent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CosmicEvent {
    Supernova,
    MeteorShower,
    Wormhole,
    Pulsar,
}

impl CosmicEvent {
    pub const ALL: [CosmicEvent; 4] = [
        CosmicEvent::Supernova,
        CosmicEvent::MeteorShower,
        CosmicEvent::Wormhole,
        CosmicEvent::Pulsar,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::Supernova => "supernova",
            Self::MeteorShower => "meteorShower",
            Self::Wormhole => "wormhole",
            Self::Pulsar => "pulsar",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.id() == id)
    }
}

impl fmt::Display for CosmicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
