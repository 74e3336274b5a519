//! Production transport backed by a Tokio broadcast hub.

use crate::error::EnvError;
use crate::transport::{DeathLinkHandler, DeathLinkTransport, HandlerStatus, TransportConnector};
use crate::types::{ConnectionId, DeathLink, LinkEnvelope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// A group room: every envelope published on it reaches every subscriber.
///
/// Stands in for the session server of a real multiworld deployment.
pub struct TokioHub {
    tx: broadcast::Sender<LinkEnvelope>,
}

impl TokioHub {
    /// Creates a hub that buffers up to `capacity` envelopes per lagging
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Creates an Arc-wrapped hub for sharing across players.
    pub fn shared(capacity: usize) -> Arc<Self> {
        Arc::new(Self::new(capacity))
    }

    /// Returns a connector that opens connections on this hub.
    pub fn connector(self: &Arc<Self>) -> TokioConnector {
        TokioConnector {
            hub: Arc::clone(self),
        }
    }

    /// Number of registered receive tasks.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Opens [`TokioTransport`] connections on a [`TokioHub`].
///
/// Must be used from inside a Tokio runtime: the receive task of each
/// connection is spawned on the runtime current at `connect` time.
#[derive(Clone)]
pub struct TokioConnector {
    hub: Arc<TokioHub>,
}

impl TransportConnector for TokioConnector {
    type Transport = TokioTransport;

    fn connect(&self) -> Result<Arc<TokioTransport>, EnvError> {
        let runtime = Handle::try_current().map_err(|e| EnvError::ContextError(e.to_string()))?;
        let transport = TokioTransport {
            id: ConnectionId::new(),
            tx: self.hub.tx.clone(),
            enabled: Arc::new(AtomicBool::new(false)),
            runtime,
        };
        debug!(connection = %transport.id, "TokioConnector::connect");
        Ok(Arc::new(transport))
    }
}

/// One player's connection to a [`TokioHub`].
pub struct TokioTransport {
    id: ConnectionId,
    tx: broadcast::Sender<LinkEnvelope>,
    enabled: Arc<AtomicBool>,
    runtime: Handle,
}

impl DeathLinkTransport for TokioTransport {
    fn enable(&self) -> Result<(), EnvError> {
        self.enabled.store(true, Ordering::Release);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn send(&self, link: DeathLink) -> Result<(), EnvError> {
        if !self.is_enabled() {
            return Err(EnvError::NotEnabled(self.id.to_string()));
        }

        let envelope = LinkEnvelope::seal(self.id, &link)?;
        match self.tx.send(envelope) {
            Ok(listeners) => debug!(connection = %self.id, listeners, "death link published"),
            // Nobody is listening; the link is simply lost
            Err(_) => debug!(connection = %self.id, "death link published to an empty hub"),
        }
        Ok(())
    }

    fn on_received(&self, handler: DeathLinkHandler) {
        let mut rx = self.tx.subscribe();
        let id = self.id;
        let enabled = Arc::clone(&self.enabled);

        self.runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if envelope.origin == id {
                            continue;
                        }
                        if !enabled.load(Ordering::Acquire) {
                            debug!(connection = %id, "dropping death link, connection not enabled");
                            continue;
                        }
                        match DeathLink::decode(&envelope.payload) {
                            Ok(link) => {
                                if handler(link) == HandlerStatus::Finished {
                                    debug!(connection = %id, "receiver finished, stopping receive task");
                                    break;
                                }
                            }
                            Err(e) => warn!(connection = %id, "undecodable death link: {}", e),
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connection = %id, skipped, "receive task lagged, death links lost");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    fn connection_id(&self) -> ConnectionId {
        self.id
    }
}
