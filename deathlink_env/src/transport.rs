//! Transport abstraction for the remote DeathLink group.

use crate::error::EnvError;
use crate::types::{ConnectionId, DeathLink};
use std::sync::Arc;

/// Returned by a [`DeathLinkHandler`] after each link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    /// Keep delivering links
    Listening,
    /// The receiver is gone; the transport should stop delivering
    Finished,
}

/// Callback invoked for every death link received from another player.
///
/// Transports may call it from a background receive task, so it must be
/// `Send + Sync`. Once it returns `Finished` it is never called again.
pub type DeathLinkHandler = Arc<dyn Fn(DeathLink) -> HandlerStatus + Send + Sync>;

/// A live connection to the remote group.
///
/// # Implementations
///
/// - **Production**: `TokioTransport` - broadcast hub with a receive task
/// - **Simulation**: `SimTransport` - queued delivery with fault injection
///
/// # Packet Flow
///
/// ```text
/// Player A                   Group                    Player B
///   |                          |                         |
///   |-- send(link) ----------->|                         |
///   |                          |-- [loss/isolation] ---->|
///   |                          |                         |-- handler(link)
/// ```
///
/// Sends are fire-and-forget: `Ok(())` means the link was handed to the
/// group, not that anyone received it.
pub trait DeathLinkTransport: Send + Sync + 'static {
    /// Turns on death-link traffic for this connection.
    fn enable(&self) -> Result<(), EnvError>;

    /// Returns whether `enable` has been called.
    fn is_enabled(&self) -> bool;

    /// Publishes a death link to every other member of the group.
    ///
    /// Must not block the caller.
    fn send(&self, link: DeathLink) -> Result<(), EnvError>;

    /// Registers the receive callback.
    fn on_received(&self, handler: DeathLinkHandler);

    /// Returns this connection's identity.
    fn connection_id(&self) -> ConnectionId;
}

/// Creates transport connections on demand.
///
/// The coordinator calls `connect` lazily, on the first activation with a
/// non-Off mode, and keeps the result for the rest of its life.
pub trait TransportConnector: Send + Sync + 'static {
    type Transport: DeathLinkTransport;

    /// Opens a new connection to the group.
    fn connect(&self) -> Result<Arc<Self::Transport>, EnvError>;
}

/// Fault injection for simulated groups.
pub trait GroupController: Send + Sync {
    /// Cuts a connection off from the group in both directions.
    fn isolate(&self, connection: ConnectionId);

    /// Reconnects every isolated connection.
    fn heal_all(&self);

    /// Sets the probability (0.0 - 1.0) that a delivery is lost.
    fn set_loss_rate(&self, loss_rate: f64);
}
