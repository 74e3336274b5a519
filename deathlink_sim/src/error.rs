//! Error types for the simulation harness.

use deathlink_core::DeathLinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("No player {index} in a group of {count}")]
    UnknownPlayer { index: usize, count: usize },

    #[error("Player {player}: {source}")]
    Activation {
        player: String,
        #[source]
        source: DeathLinkError,
    },

    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
