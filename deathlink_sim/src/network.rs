//! Simulated group transport with fault injection.
//!
//! Sends are queued on the group and only reach other members when the
//! world calls [`SimGroup::deliver`], which keeps every run reproducible.

use deathlink_env::{
    ConnectionId, DeathLink, DeathLinkHandler, DeathLinkTransport, EnvError, GroupController,
    HandlerStatus, LinkEnvelope, TransportConnector,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Upper bound on deliveries per `deliver` call; a coordinator that leaks
/// echoes would otherwise ping-pong forever.
const MAX_DELIVERIES: usize = 10_000;

/// Traffic counters for a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    /// Links accepted from senders
    pub sent: u64,

    /// Handler invocations
    pub delivered: u64,

    /// Deliveries dropped by the loss roll
    pub lost: u64,

    /// Deliveries skipped because sender or receiver was isolated
    pub unreachable: u64,
}

struct Member {
    id: ConnectionId,
    enabled: bool,
    handler: Option<DeathLinkHandler>,
    received: u64,
}

struct GroupState {
    members: Vec<Member>,
    queue: VecDeque<LinkEnvelope>,
    isolated: HashSet<ConnectionId>,
    loss_rate: f64,
    rng: ChaCha8Rng,
    next_member: u64,
    seed: u64,
    stats: GroupStats,
}

/// An in-memory group room shared by every simulated player.
pub struct SimGroup {
    state: Mutex<GroupState>,
}

impl SimGroup {
    /// Creates a group whose loss rolls and connection ids derive from `seed`.
    pub fn new(seed: u64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GroupState {
                members: Vec::new(),
                queue: VecDeque::new(),
                isolated: HashSet::new(),
                loss_rate: 0.0,
                rng: ChaCha8Rng::seed_from_u64(seed),
                next_member: 0,
                seed,
                stats: GroupStats::default(),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, GroupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a connector that joins this group.
    pub fn connector(self: &Arc<Self>) -> SimConnector {
        SimConnector {
            group: Arc::clone(self),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn join(&self) -> ConnectionId {
        let mut state = self.state();
        let id = ConnectionId::from_seed(
            state
                .seed
                .wrapping_mul(0x9e3779b97f4a7c15)
                .wrapping_add(state.next_member),
        );
        state.next_member += 1;
        state.members.push(Member {
            id,
            enabled: false,
            handler: None,
            received: 0,
        });
        id
    }

    fn with_member<T>(&self, id: ConnectionId, f: impl FnOnce(&mut Member) -> T) -> Option<T> {
        let mut state = self.state();
        state.members.iter_mut().find(|m| m.id == id).map(f)
    }

    fn publish(&self, origin: ConnectionId, link: &DeathLink) -> Result<(), EnvError> {
        let envelope = LinkEnvelope::seal(origin, link)?;
        let mut state = self.state();

        if state.isolated.contains(&origin) {
            return Err(EnvError::unreachable(origin));
        }
        let enabled = state.members.iter().any(|m| m.id == origin && m.enabled);
        if !enabled {
            return Err(EnvError::NotEnabled(origin.to_string()));
        }

        state.queue.push_back(envelope);
        state.stats.sent += 1;
        Ok(())
    }

    /// Delivers every queued link to every other enabled member.
    ///
    /// Handlers run without the group lock held, so they may send. Returns
    /// the number of handler invocations.
    pub fn deliver(&self) -> usize {
        let mut delivered = 0;

        while delivered < MAX_DELIVERIES {
            let batch = {
                let mut state = self.state();
                let Some(envelope) = state.queue.pop_front() else {
                    break;
                };

                let link = match DeathLink::decode(&envelope.payload) {
                    Ok(link) => link,
                    Err(e) => {
                        warn!("dropping undecodable envelope from {}: {}", envelope.origin, e);
                        continue;
                    }
                };

                let GroupState {
                    members,
                    isolated,
                    loss_rate,
                    rng,
                    stats,
                    ..
                } = &mut *state;

                let mut targets = Vec::new();
                for member in members.iter_mut() {
                    if member.id == envelope.origin || !member.enabled {
                        continue;
                    }
                    let Some(handler) = member.handler.clone() else {
                        continue;
                    };
                    if isolated.contains(&member.id) || isolated.contains(&envelope.origin) {
                        stats.unreachable += 1;
                        continue;
                    }
                    if *loss_rate > 0.0 && rng.gen_bool(*loss_rate) {
                        debug!("link from {} to {} lost", envelope.origin, member.id);
                        stats.lost += 1;
                        continue;
                    }
                    member.received += 1;
                    stats.delivered += 1;
                    targets.push((member.id, handler));
                }
                (link, targets)
            };

            let (link, targets) = batch;
            for (id, handler) in targets {
                if handler(link.clone()) == HandlerStatus::Finished {
                    debug!("member {} finished listening", id);
                    self.with_member(id, |m| m.handler = None);
                }
                delivered += 1;
            }
        }

        if delivered >= MAX_DELIVERIES {
            warn!("delivery cap reached, {} links still queued", self.queued());
        }
        delivered
    }

    /// Links waiting for `deliver`.
    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    /// Links handed to `id`'s handler so far.
    pub fn received_by(&self, id: ConnectionId) -> u64 {
        self.with_member(id, |m| m.received).unwrap_or(0)
    }

    pub fn member_count(&self) -> usize {
        self.state().members.len()
    }

    pub fn stats(&self) -> GroupStats {
        self.state().stats
    }
}

impl GroupController for SimGroup {
    fn isolate(&self, connection: ConnectionId) {
        self.state().isolated.insert(connection);
    }

    fn heal_all(&self) {
        self.state().isolated.clear();
    }

    fn set_loss_rate(&self, loss_rate: f64) {
        self.state().loss_rate = loss_rate.clamp(0.0, 1.0);
    }
}

/// Joins a [`SimGroup`].
#[derive(Clone)]
pub struct SimConnector {
    group: Arc<SimGroup>,
    connects: Arc<AtomicUsize>,
}

impl SimConnector {
    /// Connections opened through this connector (and its clones).
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl TransportConnector for SimConnector {
    type Transport = SimTransport;

    fn connect(&self) -> Result<Arc<SimTransport>, EnvError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let id = self.group.join();
        Ok(Arc::new(SimTransport {
            id,
            group: Arc::clone(&self.group),
        }))
    }
}

/// One player's membership in a [`SimGroup`].
pub struct SimTransport {
    id: ConnectionId,
    group: Arc<SimGroup>,
}

impl DeathLinkTransport for SimTransport {
    fn enable(&self) -> Result<(), EnvError> {
        self.group
            .with_member(self.id, |m| m.enabled = true)
            .ok_or_else(|| EnvError::unreachable(self.id))
    }

    fn is_enabled(&self) -> bool {
        self.group.with_member(self.id, |m| m.enabled).unwrap_or(false)
    }

    fn send(&self, link: DeathLink) -> Result<(), EnvError> {
        self.group.publish(self.id, &link)
    }

    fn on_received(&self, handler: DeathLinkHandler) {
        self.group.with_member(self.id, |m| m.handler = Some(handler));
    }

    fn connection_id(&self) -> ConnectionId {
        self.id
    }
}
