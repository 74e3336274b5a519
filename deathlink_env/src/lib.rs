//! DeathLink Environment Abstraction Layer
//!
//! This crate holds the contracts between the death-link coordinator and the
//! world around it, so the same coordinator runs against a real game and
//! session server, a Tokio hub, or the deterministic simulator.
//!
//! # Collaborators
//!
//! - Transport (`DeathLinkTransport`, `TransportConnector`): fire-and-forget
//!   broadcast to the remote group plus a receive callback
//! - Host (`GameHost`): pause oracle and the apply-death primitive
//! - Status (`StatusSink`): human-readable status lines
//!
//! # Example
//!
//! ```ignore
//! use deathlink_env::{TokioHub, TransportConnector, DeathLinkTransport, DeathLink};
//!
//! let hub = TokioHub::shared(64);
//! let connection = hub.connector().connect()?;
//! connection.enable()?;
//! connection.send(DeathLink::new("Hearthian", "Hearthian made an oopsie.", 0))?;
//! ```

mod error;
mod host;
mod sink;
mod tokio_impl;
mod transport;
mod types;

pub use error::EnvError;
pub use host::GameHost;
pub use sink::{StatusSink, TracingSink};
pub use tokio_impl::{TokioConnector, TokioHub, TokioTransport};
pub use transport::{
    DeathLinkHandler, DeathLinkTransport, GroupController, HandlerStatus, TransportConnector,
};
pub use types::{ConnectionId, DeathCategory, DeathLink, DeathOrigin, LinkEnvelope, LocalDeath};
