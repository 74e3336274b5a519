//! Error taxonomy for the death-link coordinator.
//!
//! None of these escape to the host as panics: every path that produces one
//! has already logged it and left the coordinator in a consistent state.

use deathlink_env::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeathLinkError {
    /// An unrecognised mode value was supplied to `activate`
    #[error("{0} is not a valid death link setting")]
    InvalidConfiguration(String),

    /// A broadcast was attempted with no transport connection
    #[error("Unable to send {category} death: death link service is not connected")]
    TransportUnavailable { category: String },

    /// The transport refused or failed the operation
    #[error("Transport error: {0}")]
    Transport(#[from] EnvError),

    /// The flavor-text table cannot serve every category
    #[error("Invalid flavor table: {0}")]
    InvalidFlavorTable(String),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(String),
}
