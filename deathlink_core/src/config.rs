//! Coordinator configuration.

use crate::error::DeathLinkError;
use crate::mode::SyncMode;
use serde::Deserialize;

/// Configuration for a death-link coordinator.
///
/// `death_link` is kept raw: it is whatever number the session's slot data
/// carried, and `DeathLinkCoordinator::activate` is what validates it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeathLinkConfig {
    /// Player identifier sent with every death link
    pub slot_name: String,

    /// Requested mode (0 = Off, 1 = Default, 2 = AllDeaths)
    pub death_link: i64,

    /// Seed for flavor text selection (None = OS entropy)
    pub flavor_seed: Option<u64>,

    /// Lines kept on the gameplay console (default: 6)
    pub console_lines: usize,
}

impl Default for DeathLinkConfig {
    fn default() -> Self {
        Self {
            slot_name: "Hearthian".to_string(),
            death_link: SyncMode::Off.as_raw(),
            flavor_seed: None,
            console_lines: 6,
        }
    }
}

impl DeathLinkConfig {
    /// Creates a config for `slot_name` requesting `mode`.
    pub fn new(slot_name: impl Into<String>, mode: SyncMode) -> Self {
        Self {
            slot_name: slot_name.into(),
            death_link: mode.as_raw(),
            ..Self::default()
        }
    }

    /// Sets the flavor seed.
    pub fn with_flavor_seed(mut self, seed: u64) -> Self {
        self.flavor_seed = Some(seed);
        self
    }

    /// Parses a JSON config; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, DeathLinkError> {
        serde_json::from_str(json).map_err(|e| DeathLinkError::Config(e.to_string()))
    }
}
