//! DeathLinkCoordinator - decides which deaths cross the wire, and when.
//!
//! # Flow
//!
//! ```text
//!   host death ──► echo guard ──► dead/dying ──► mode/filter ──► transport.send
//!
//!   transport ──► status line ──► paused? ──yes──► pending (one slot)
//!                                    │                  │ host resumed
//!                                    no                 ▼
//!                                    └──────────► apply: guard up,
//!                                                 host.kill_player(Remote),
//!                                                 guard down
//! ```
//!
//! The kill issued by `apply` makes the host raise its local-death signal
//! again. That echo is recognised twice over: the apply guard is up while the
//! host runs, and the host reports the death with `DeathOrigin::Remote`.
//!
//! # Threading
//!
//! Entry points take `&self` and may be called from the host thread and from
//! a transport receive task. Local-death processing holds the state lock
//! from the filter check through the send, so two local deaths never
//! interleave. No lock is held while the host applies a death.

use crate::config::DeathLinkConfig;
use crate::error::DeathLinkError;
use crate::flavor::FlavorTable;
use crate::mode::SyncMode;

use deathlink_env::{
    ConnectionId, DeathCategory, DeathLink, DeathLinkHandler, DeathLinkTransport, DeathOrigin,
    GameHost, HandlerStatus, LocalDeath, StatusSink, TransportConnector,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::UNIX_EPOCH;
use tracing::{debug, error, info};

/// Why a local death was not broadcast. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The death was applied by us on behalf of another player
    Echo,
    AlreadyDead,
    AlreadyDying,
    /// Mode is Off
    Off,
    /// Mode is Standard and the category is a soft reset
    Filtered,
}

/// Result of handling a local death.
#[derive(Debug)]
pub enum LocalOutcome {
    Sent,
    Suppressed(SuppressReason),
    /// The broadcast was attempted and lost; already logged
    Dropped(DeathLinkError),
}

impl LocalOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, LocalOutcome::Sent)
    }
}

/// Result of handling a remote death.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Applied to the local player immediately
    Applied,
    /// Host was paused; applied on the next resume
    Buffered,
}

/// Counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    pub sent: u64,
    pub suppressed_echoes: u64,
    pub suppressed_already_dead: u64,
    pub suppressed_off: u64,
    pub filtered: u64,
    pub dropped: u64,
    pub received: u64,
    pub buffered: u64,
    pub applied: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    suppressed_echoes: AtomicU64,
    suppressed_already_dead: AtomicU64,
    suppressed_off: AtomicU64,
    filtered: AtomicU64,
    dropped: AtomicU64,
    received: AtomicU64,
    buffered: AtomicU64,
    applied: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct CoordinatorState<T> {
    mode: SyncMode,
    connection: Option<Arc<T>>,
    /// Receive handler registered on `connection`
    listening: bool,
    pending: Option<DeathLink>,
    rng: StdRng,
}

/// Raised for the duration of one remote-death application.
///
/// A depth counter rather than a flag, so two overlapping applications
/// (receive task and resume hook) cannot lower each other's guard.
struct ApplyGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> ApplyGuard<'a> {
    fn engage(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self { depth }
    }
}

impl Drop for ApplyGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The death-link coordinator for one local player.
///
/// Generic over the host and the transport connector, so the same coordinator
/// runs inside a game, against a Tokio hub, or in the simulator. Construct one
/// per session and hand the `Arc` to every call site.
pub struct DeathLinkCoordinator<H, C>
where
    H: GameHost,
    C: TransportConnector,
{
    /// Player identifier (slot name)
    player: String,

    host: Arc<H>,
    connector: C,
    sink: Arc<dyn StatusSink>,
    flavor: FlavorTable,

    state: Mutex<CoordinatorState<C::Transport>>,

    /// Depth of in-flight remote applications
    applying_remote: AtomicUsize,

    counters: Counters,
}

impl<H, C> DeathLinkCoordinator<H, C>
where
    H: GameHost,
    C: TransportConnector,
{
    /// Creates an inactive coordinator with the stock flavor table.
    ///
    /// The mode starts Off; pass `config.death_link` to [`Self::activate`].
    pub fn new(
        config: &DeathLinkConfig,
        host: Arc<H>,
        connector: C,
        sink: Arc<dyn StatusSink>,
    ) -> Arc<Self> {
        Self::with_flavor(config, host, connector, sink, FlavorTable::standard())
    }

    /// Creates an inactive coordinator with a custom flavor table.
    pub fn with_flavor(
        config: &DeathLinkConfig,
        host: Arc<H>,
        connector: C,
        sink: Arc<dyn StatusSink>,
        flavor: FlavorTable,
    ) -> Arc<Self> {
        let rng = match config.flavor_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Arc::new(Self {
            player: config.slot_name.clone(),
            host,
            connector,
            sink,
            flavor,
            state: Mutex::new(CoordinatorState {
                mode: SyncMode::Off,
                connection: None,
                listening: false,
                pending: None,
                rng,
            }),
            applying_remote: AtomicUsize::new(0),
            counters: Counters::default(),
        })
    }

    fn state(&self) -> MutexGuard<'_, CoordinatorState<C::Transport>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a raw mode value from configuration.
    ///
    /// An unrecognised value is logged, returned as `InvalidConfiguration`,
    /// and leaves the current mode and connection untouched.
    pub fn activate(self: &Arc<Self>, raw: i64) -> Result<(), DeathLinkError> {
        match SyncMode::try_from(raw) {
            Ok(mode) => self.set_mode(mode),
            Err(e) => {
                error!(player = %self.player, "{}", e);
                Err(e)
            }
        }
    }

    /// Sets the mode, connecting to the group on the first non-Off mode.
    ///
    /// The connection is never torn down; switching back to Off only stops
    /// outbound broadcasts. A failed connect or enable is logged and returned,
    /// the mode still changes, and the next non-Off activation retries the
    /// step that failed. A connection that was created is kept either way.
    pub fn set_mode(self: &Arc<Self>, mode: SyncMode) -> Result<(), DeathLinkError> {
        let connection = {
            let mut state = self.state();
            let previous = state.mode;
            state.mode = mode;
            info!(player = %self.player, %previous, %mode, "death link mode set");

            if !mode.is_active() || state.listening {
                return Ok(());
            }

            let connection = match &state.connection {
                Some(connection) => Arc::clone(connection),
                None => {
                    let connection = self.connector.connect().map_err(|e| {
                        error!(player = %self.player, "unable to create death link service: {}", e);
                        DeathLinkError::from(e)
                    })?;
                    state.connection = Some(Arc::clone(&connection));
                    connection
                }
            };

            if !connection.is_enabled() {
                connection.enable().map_err(|e| {
                    error!(player = %self.player, "unable to enable death link service: {}", e);
                    DeathLinkError::from(e)
                })?;
            }

            state.listening = true;
            connection
        };

        // Registered outside the lock: a transport may deliver synchronously
        let weak = Arc::downgrade(self);
        let handler: DeathLinkHandler = Arc::new(move |link| match weak.upgrade() {
            Some(coordinator) => {
                coordinator.on_remote_fatal_event(link);
                HandlerStatus::Listening
            }
            None => HandlerStatus::Finished,
        });
        connection.on_received(handler);

        info!(
            player = %self.player,
            connection = %connection.connection_id(),
            "death link service connected"
        );
        Ok(())
    }

    /// Handles the host's local-death signal.
    pub fn on_local_fatal_event(&self, death: LocalDeath) -> LocalOutcome {
        let category = death.category;

        // Must come first: anything else would be evaluated against the
        // death we are in the middle of applying
        if self.is_applying_remote() || death.origin == DeathOrigin::Remote {
            info!(
                player = %self.player,
                "ignoring {} death because this is a death we received from another player",
                category
            );
            bump(&self.counters.suppressed_echoes);
            return LocalOutcome::Suppressed(SuppressReason::Echo);
        }
        if death.already_dead {
            debug!(player = %self.player, "ignoring {} death, player is already dead", category);
            bump(&self.counters.suppressed_already_dead);
            return LocalOutcome::Suppressed(SuppressReason::AlreadyDead);
        }
        if death.already_dying {
            debug!(player = %self.player, "ignoring {} death, player is already dying", category);
            bump(&self.counters.suppressed_already_dead);
            return LocalOutcome::Suppressed(SuppressReason::AlreadyDying);
        }

        let mut state = self.state();
        let mode = state.mode;

        if !mode.is_active() {
            debug!(player = %self.player, "ignoring {} death since death link is off", category);
            bump(&self.counters.suppressed_off);
            return LocalOutcome::Suppressed(SuppressReason::Off);
        }

        let Some(connection) = state.connection.clone() else {
            let err = DeathLinkError::TransportUnavailable {
                category: category.to_string(),
            };
            error!(player = %self.player, "{}", err);
            bump(&self.counters.dropped);
            return LocalOutcome::Dropped(err);
        };

        if !mode.broadcasts(category) {
            info!(
                player = %self.player,
                "ignoring {} death since death link is only set to {}",
                category,
                mode
            );
            bump(&self.counters.filtered);
            return LocalOutcome::Suppressed(SuppressReason::Filtered);
        }

        let message = self.flavor.compose(&self.player, category, &mut state.rng);
        info!(player = %self.player, "detected a {} death, sending to the group", category);
        self.sink.append(&format!(
            "Because death link is set to {}, sending this {} death to other players with the message: \"{}\"",
            mode, category, message
        ));

        let link = DeathLink::new(self.player.clone(), message, self.timestamp_ms());
        match connection.send(link) {
            Ok(()) => {
                bump(&self.counters.sent);
                LocalOutcome::Sent
            }
            Err(e) => {
                error!(player = %self.player, "death link for {} death lost: {}", category, e);
                bump(&self.counters.dropped);
                LocalOutcome::Dropped(e.into())
            }
        }
    }

    /// Handles a death link from another player.
    pub fn on_remote_fatal_event(&self, link: DeathLink) -> RemoteOutcome {
        bump(&self.counters.received);
        info!(
            player = %self.player,
            timestamp = link.timestamp_ms,
            source = %link.source,
            cause = ?link.cause,
            "death link received"
        );
        self.sink.append(&link.display_text());

        {
            // Pause is sampled under the lock so a concurrent resume either
            // sees the pending death or happened before the sample
            let mut state = self.state();
            if self.host.is_paused() {
                info!(player = %self.player, "buffering death because the host is currently paused");
                if let Some(replaced) = state.pending.replace(link) {
                    debug!(player = %self.player, replaced = %replaced.source, "pending death replaced");
                }
                bump(&self.counters.buffered);
                return RemoteOutcome::Buffered;
            }
        }

        self.apply_remote_death(&link);
        RemoteOutcome::Applied
    }

    /// Handles the host's pause-to-unpause transition. Returns whether a
    /// buffered death was applied.
    pub fn on_host_resumed(&self) -> bool {
        let pending = self.state().pending.take();
        match pending {
            Some(link) => {
                info!(
                    player = %self.player,
                    source = %link.source,
                    "applying buffered death now that the host has unpaused"
                );
                self.apply_remote_death(&link);
                true
            }
            None => false,
        }
    }

    fn apply_remote_death(&self, link: &DeathLink) {
        let _guard = ApplyGuard::engage(&self.applying_remote);
        debug!(player = %self.player, source = %link.source, "killing local player");
        self.host.kill_player(DeathCategory::Default, DeathOrigin::Remote);
        bump(&self.counters.applied);
    }

    fn timestamp_ms(&self) -> u64 {
        self.host
            .system_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Returns the player identifier.
    pub fn player(&self) -> &str {
        &self.player
    }

    /// Returns the current mode.
    pub fn mode(&self) -> SyncMode {
        self.state().mode
    }

    /// Returns the connection's identity, if one was ever created.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.state().connection.as_ref().map(|c| c.connection_id())
    }

    /// True strictly while a remote death is being applied.
    pub fn is_applying_remote(&self) -> bool {
        self.applying_remote.load(Ordering::SeqCst) > 0
    }

    /// Returns whether a remote death is waiting for the host to resume.
    pub fn has_pending(&self) -> bool {
        self.state().pending.is_some()
    }

    /// Source of the pending remote death, if any.
    pub fn pending_source(&self) -> Option<String> {
        self.state().pending.as_ref().map(|link| link.source.clone())
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> CoordinatorStats {
        let c = &self.counters;
        CoordinatorStats {
            sent: c.sent.load(Ordering::Relaxed),
            suppressed_echoes: c.suppressed_echoes.load(Ordering::Relaxed),
            suppressed_already_dead: c.suppressed_already_dead.load(Ordering::Relaxed),
            suppressed_off: c.suppressed_off.load(Ordering::Relaxed),
            filtered: c.filtered.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            received: c.received.load(Ordering::Relaxed),
            buffered: c.buffered.load(Ordering::Relaxed),
            applied: c.applied.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::StatusConsole;
    use deathlink_env::EnvError;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::{OnceLock, Weak};
    use std::time::SystemTime;

    type LocalHook = Box<dyn Fn(LocalDeath) + Send + Sync>;

    /// Host double. `kill_player` raises the local-death hook synchronously,
    /// like a game engine would.
    #[derive(Default)]
    struct TestHost {
        paused: AtomicBool,
        /// Report every death as Local, like an engine hook that cannot
        /// tell who asked for the kill
        forget_origin: AtomicBool,
        kills: Mutex<Vec<(DeathCategory, DeathOrigin)>>,
        hook: OnceLock<LocalHook>,
    }

    impl TestHost {
        fn kill_count(&self) -> usize {
            self.kills.lock().unwrap().len()
        }
    }

    impl GameHost for TestHost {
        fn is_paused(&self) -> bool {
            self.paused.load(Ordering::SeqCst)
        }

        fn kill_player(&self, category: DeathCategory, origin: DeathOrigin) {
            self.kills.lock().unwrap().push((category, origin));
            let reported = if self.forget_origin.load(Ordering::SeqCst) {
                DeathOrigin::Local
            } else {
                origin
            };
            if let Some(hook) = self.hook.get() {
                hook(LocalDeath::new(category).with_origin(reported));
            }
        }

        fn system_time(&self) -> SystemTime {
            UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000)
        }
    }

    #[derive(Default)]
    struct TestTransport {
        id: ConnectionId,
        enabled: AtomicBool,
        failed_enables_left: AtomicUsize,
        fail_sends: AtomicBool,
        sent: Mutex<Vec<DeathLink>>,
        handlers: Mutex<Vec<DeathLinkHandler>>,
    }

    impl TestTransport {
        fn sent(&self) -> Vec<DeathLink> {
            self.sent.lock().unwrap().clone()
        }

        fn deliver(&self, link: DeathLink) {
            let handlers = self.handlers.lock().unwrap().clone();
            for handler in handlers {
                let _ = handler(link.clone());
            }
        }
    }

    impl DeathLinkTransport for TestTransport {
        fn enable(&self) -> Result<(), EnvError> {
            let failing = self
                .failed_enables_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(EnvError::network("slot data not received yet"));
            }
            self.enabled.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            self.enabled.load(Ordering::SeqCst)
        }

        fn send(&self, link: DeathLink) -> Result<(), EnvError> {
            if !self.is_enabled() {
                return Err(EnvError::NotEnabled(self.id.to_string()));
            }
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(EnvError::network("Channel closed"));
            }
            self.sent.lock().unwrap().push(link);
            Ok(())
        }

        fn on_received(&self, handler: DeathLinkHandler) {
            self.handlers.lock().unwrap().push(handler);
        }

        fn connection_id(&self) -> ConnectionId {
            self.id
        }
    }

    #[derive(Clone, Default)]
    struct TestConnector {
        connects: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
        /// Enable failures handed to the next transport
        enable_failures: Arc<AtomicUsize>,
        last: Arc<Mutex<Option<Arc<TestTransport>>>>,
    }

    impl TestConnector {
        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn transport(&self) -> Arc<TestTransport> {
            self.last.lock().unwrap().clone().expect("no connection created")
        }
    }

    impl TransportConnector for TestConnector {
        type Transport = TestTransport;

        fn connect(&self) -> Result<Arc<TestTransport>, EnvError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EnvError::network("session not connected"));
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            let transport = Arc::new(TestTransport::default());
            transport
                .failed_enables_left
                .store(self.enable_failures.swap(0, Ordering::SeqCst), Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(Arc::clone(&transport));
            Ok(transport)
        }
    }

    type TestCoordinator = DeathLinkCoordinator<TestHost, TestConnector>;

    struct Fixture {
        host: Arc<TestHost>,
        connector: TestConnector,
        console: Arc<StatusConsole>,
        coordinator: Arc<TestCoordinator>,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(TestHost::default());
        let connector = TestConnector::default();
        let console = Arc::new(StatusConsole::default());
        let config = DeathLinkConfig::new("Slot", SyncMode::Off).with_flavor_seed(7);
        let coordinator = TestCoordinator::new(&config, Arc::clone(&host), connector.clone(), console.clone());

        // Route the host's death signal back into the coordinator
        let weak: Weak<TestCoordinator> = Arc::downgrade(&coordinator);
        let _ = host.hook.set(Box::new(move |death| {
            if let Some(coordinator) = weak.upgrade() {
                coordinator.on_local_fatal_event(death);
            }
        }));

        Fixture {
            host,
            connector,
            console,
            coordinator,
        }
    }

    fn impact() -> LocalDeath {
        LocalDeath::new(DeathCategory::Impact)
    }

    #[test]
    fn test_off_sends_nothing_and_applies_nothing() {
        let f = fixture();
        let outcome = f.coordinator.on_local_fatal_event(impact());

        assert!(matches!(outcome, LocalOutcome::Suppressed(SuppressReason::Off)));
        assert_eq!(f.connector.connects(), 0);
        assert_eq!(f.host.kill_count(), 0);
    }

    #[test]
    fn test_connection_created_once() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();
        let first = f.coordinator.connection_id();
        assert!(first.is_some());

        f.coordinator.activate(2).unwrap();
        assert_eq!(f.coordinator.mode(), SyncMode::All);
        f.coordinator.activate(1).unwrap();

        assert_eq!(f.connector.connects(), 1);
        assert_eq!(f.coordinator.connection_id(), first);
        assert!(f.connector.transport().is_enabled());
        assert_eq!(f.connector.transport().handlers.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_mode_keeps_previous() {
        let f = fixture();
        f.coordinator.activate(2).unwrap();

        let err = f.coordinator.activate(9).unwrap_err();
        assert!(matches!(err, DeathLinkError::InvalidConfiguration(_)));
        assert_eq!(f.coordinator.mode(), SyncMode::All);
        assert_eq!(f.connector.connects(), 1);
    }

    #[test]
    fn test_standard_filters_soft_resets() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();

        for category in SyncMode::STANDARD_EXCLUDED {
            let outcome = f.coordinator.on_local_fatal_event(LocalDeath::new(category));
            assert!(matches!(outcome, LocalOutcome::Suppressed(SuppressReason::Filtered)));
        }
        assert!(f.connector.transport().sent().is_empty());

        assert!(f.coordinator.on_local_fatal_event(impact()).is_sent());
        assert_eq!(f.connector.transport().sent().len(), 1);
    }

    #[test]
    fn test_all_sends_every_category() {
        let f = fixture();
        f.coordinator.activate(2).unwrap();

        for category in DeathCategory::ALL {
            assert!(f.coordinator.on_local_fatal_event(LocalDeath::new(category)).is_sent());
        }
        assert_eq!(f.connector.transport().sent().len(), DeathCategory::ALL.len());
    }

    #[test]
    fn test_send_then_receive_round() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();

        let outcome = f.coordinator.on_local_fatal_event(LocalDeath::new(DeathCategory::Crushed));
        assert!(outcome.is_sent());
        let sent = f.connector.transport().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].source, "Slot");
        assert_eq!(sent[0].cause.as_deref(), Some("Slot became a pancake."));
        assert_eq!(sent[0].timestamp_ms, 1_700_000_000_000);
        assert!(f.console.contains("sending this Crushed death"));

        f.connector.transport().deliver(DeathLink::new("X", "m", 0));

        assert_eq!(f.host.kill_count(), 1);
        assert_eq!(f.console.gameplay_lines().last().map(String::as_str), Some("m"));
        assert!(!f.coordinator.is_applying_remote());
        // The applied death came back through the hook and was not re-sent
        assert_eq!(f.connector.transport().sent().len(), 1);
        assert_eq!(f.coordinator.stats().suppressed_echoes, 1);
    }

    #[test]
    fn test_guard_alone_suppresses_echo() {
        let f = fixture();
        f.host.forget_origin.store(true, Ordering::SeqCst);
        f.coordinator.activate(2).unwrap();

        let outcome = f.coordinator.on_remote_fatal_event(DeathLink::new("Riebeck", "Riebeck didn't bounce.", 0));

        assert_eq!(outcome, RemoteOutcome::Applied);
        assert_eq!(f.host.kills.lock().unwrap()[0], (DeathCategory::Default, DeathOrigin::Remote));
        assert!(f.connector.transport().sent().is_empty());
        assert_eq!(f.coordinator.stats().suppressed_echoes, 1);
    }

    #[test]
    fn test_guard_blocks_concurrent_local_events() {
        let host = Arc::new(TestHost::default());
        host.forget_origin.store(true, Ordering::SeqCst);
        let connector = TestConnector::default();
        let config = DeathLinkConfig::new("Slot", SyncMode::All).with_flavor_seed(1);
        let coordinator = TestCoordinator::new(&config, Arc::clone(&host), connector.clone(), Arc::new(StatusConsole::default()));
        coordinator.activate(config.death_link).unwrap();

        let outcomes: Arc<Mutex<Vec<LocalOutcome>>> = Arc::default();
        let weak = Arc::downgrade(&coordinator);
        let sink = Arc::clone(&outcomes);
        let _ = host.hook.set(Box::new(move |death| {
            let Some(coordinator) = weak.upgrade() else { return };
            std::thread::scope(|scope| {
                for _ in 0..8 {
                    let coordinator = &coordinator;
                    let sink = &sink;
                    scope.spawn(move || {
                        let outcome = coordinator.on_local_fatal_event(death);
                        sink.lock().unwrap().push(outcome);
                    });
                }
            });
        }));

        coordinator.on_remote_fatal_event(DeathLink::anonymous("Gabbro", 0));

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 8);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, LocalOutcome::Suppressed(SuppressReason::Echo))));
        assert!(connector.transport().sent().is_empty());
    }

    #[test]
    fn test_guard_restored_after_repeated_applies() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();

        for _ in 0..5 {
            f.connector.transport().deliver(DeathLink::anonymous("Chert", 0));
            assert!(!f.coordinator.is_applying_remote());
        }
        assert_eq!(f.host.kill_count(), 5);

        // Guard is down, so a genuine local death goes out again
        assert!(f.coordinator.on_local_fatal_event(impact()).is_sent());
    }

    #[test]
    fn test_paused_remote_buffers_until_resume() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();
        f.host.paused.store(true, Ordering::SeqCst);

        let outcome = f.coordinator.on_remote_fatal_event(DeathLink::new("Esker", "Esker took a long nap.", 0));
        assert_eq!(outcome, RemoteOutcome::Buffered);
        assert!(f.coordinator.has_pending());
        assert_eq!(f.host.kill_count(), 0);
        // The line is shown even while paused
        assert!(f.console.contains("Esker took a long nap."));

        f.host.paused.store(false, Ordering::SeqCst);
        assert!(f.coordinator.on_host_resumed());
        assert_eq!(f.host.kill_count(), 1);
        assert!(!f.coordinator.has_pending());

        assert!(!f.coordinator.on_host_resumed());
        assert_eq!(f.host.kill_count(), 1);
    }

    #[test]
    fn test_unpaused_remote_applies_immediately() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();

        let outcome = f.coordinator.on_remote_fatal_event(DeathLink::anonymous("Hal", 0));
        assert_eq!(outcome, RemoteOutcome::Applied);
        assert_eq!(f.host.kill_count(), 1);
        assert!(!f.coordinator.has_pending());
        assert!(f.console.contains("Hal died."));
    }

    #[test]
    fn test_second_buffered_death_replaces_first() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();
        f.host.paused.store(true, Ordering::SeqCst);

        f.coordinator.on_remote_fatal_event(DeathLink::anonymous("Feldspar", 0));
        f.coordinator.on_remote_fatal_event(DeathLink::anonymous("Hornfels", 1));
        assert_eq!(f.coordinator.pending_source().as_deref(), Some("Hornfels"));

        f.host.paused.store(false, Ordering::SeqCst);
        assert!(f.coordinator.on_host_resumed());
        assert_eq!(f.host.kill_count(), 1);
        assert_eq!(f.coordinator.stats().buffered, 2);
    }

    #[test]
    fn test_already_dead_or_dying_is_ignored() {
        let f = fixture();
        f.coordinator.activate(2).unwrap();

        let dead = impact().with_host_state(true, false);
        let dying = impact().with_host_state(false, true);
        assert!(matches!(
            f.coordinator.on_local_fatal_event(dead),
            LocalOutcome::Suppressed(SuppressReason::AlreadyDead)
        ));
        assert!(matches!(
            f.coordinator.on_local_fatal_event(dying),
            LocalOutcome::Suppressed(SuppressReason::AlreadyDying)
        ));
        assert!(f.connector.transport().sent().is_empty());
    }

    #[test]
    fn test_failed_connect_is_transport_unavailable_then_retried() {
        let f = fixture();
        f.connector.fail.store(true, Ordering::SeqCst);

        let err = f.coordinator.activate(1).unwrap_err();
        assert!(matches!(err, DeathLinkError::Transport(_)));
        assert_eq!(f.coordinator.mode(), SyncMode::Standard);
        assert_eq!(f.coordinator.connection_id(), None);

        let outcome = f.coordinator.on_local_fatal_event(impact());
        assert!(matches!(
            outcome,
            LocalOutcome::Dropped(DeathLinkError::TransportUnavailable { .. })
        ));

        f.connector.fail.store(false, Ordering::SeqCst);
        f.coordinator.activate(1).unwrap();
        assert!(f.coordinator.connection_id().is_some());
        assert!(f.coordinator.on_local_fatal_event(impact()).is_sent());
    }

    #[test]
    fn test_failed_enable_keeps_connection_and_retries_enable() {
        let f = fixture();
        f.connector.enable_failures.store(1, Ordering::SeqCst);

        let err = f.coordinator.activate(1).unwrap_err();
        assert!(matches!(err, DeathLinkError::Transport(EnvError::NetworkError(_))));
        let id = f.coordinator.connection_id();
        assert!(id.is_some());
        assert!(!f.connector.transport().is_enabled());
        assert!(f.connector.transport().handlers.lock().unwrap().is_empty());
        assert!(matches!(
            f.coordinator.on_local_fatal_event(impact()),
            LocalOutcome::Dropped(DeathLinkError::Transport(EnvError::NotEnabled(_)))
        ));

        f.coordinator.activate(2).unwrap();
        assert_eq!(f.connector.connects(), 1);
        assert_eq!(f.coordinator.connection_id(), id);
        assert!(f.connector.transport().is_enabled());
        assert_eq!(f.connector.transport().handlers.lock().unwrap().len(), 1);
        assert!(f.coordinator.on_local_fatal_event(impact()).is_sent());

        f.coordinator.activate(1).unwrap();
        assert_eq!(f.connector.transport().handlers.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_handler_finishes_once_coordinator_is_gone() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();
        let handler = f.connector.transport().handlers.lock().unwrap()[0].clone();

        assert_eq!(handler(DeathLink::anonymous("Tektite", 0)), HandlerStatus::Listening);
        assert_eq!(f.host.kill_count(), 1);

        let host = Arc::clone(&f.host);
        drop(f);
        assert_eq!(handler(DeathLink::anonymous("Tektite", 1)), HandlerStatus::Finished);
        assert_eq!(host.kill_count(), 1);
    }

    #[test]
    fn test_failed_send_is_dropped() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();
        f.connector.transport().fail_sends.store(true, Ordering::SeqCst);

        let outcome = f.coordinator.on_local_fatal_event(impact());
        assert!(matches!(outcome, LocalOutcome::Dropped(DeathLinkError::Transport(_))));
        assert_eq!(f.coordinator.stats().dropped, 1);
    }

    #[test]
    fn test_off_after_active_keeps_connection() {
        let f = fixture();
        f.coordinator.activate(1).unwrap();
        let id = f.coordinator.connection_id();

        f.coordinator.set_mode(SyncMode::Off).unwrap();
        assert_eq!(f.coordinator.connection_id(), id);
        assert!(matches!(
            f.coordinator.on_local_fatal_event(impact()),
            LocalOutcome::Suppressed(SuppressReason::Off)
        ));

        // Inbound links still arrive on the live connection
        f.connector.transport().deliver(DeathLink::anonymous("Slate", 0));
        assert_eq!(f.host.kill_count(), 1);
    }

    proptest! {
        #[test]
        fn prop_invalid_modes_never_connect(raw in any::<i64>().prop_filter("invalid", |v| !(0..=2).contains(v))) {
            let f = fixture();
            prop_assert!(f.coordinator.activate(raw).is_err());
            prop_assert_eq!(f.coordinator.mode(), SyncMode::Off);
            prop_assert_eq!(f.connector.connects(), 0);
        }

        #[test]
        fn prop_at_most_one_connection(raws in proptest::collection::vec(-2i64..5, 1..20)) {
            let f = fixture();
            let mut expected = SyncMode::Off;
            for raw in &raws {
                let _ = f.coordinator.activate(*raw);
                if let Ok(mode) = SyncMode::try_from(*raw) {
                    expected = mode;
                }
            }

            let activated = raws.iter().any(|raw| *raw == 1 || *raw == 2);
            prop_assert_eq!(f.coordinator.mode(), expected);
            prop_assert_eq!(f.connector.connects(), usize::from(activated));
        }

        #[test]
        fn prop_guard_down_after_any_apply_sequence(paused in proptest::collection::vec(any::<bool>(), 1..12)) {
            let f = fixture();
            f.coordinator.activate(1).unwrap();
            for p in paused {
                let was_paused = f.host.paused.swap(p, Ordering::SeqCst);
                if was_paused && !p {
                    // The host signals every pause -> unpause transition
                    f.coordinator.on_host_resumed();
                }
                f.coordinator.on_remote_fatal_event(DeathLink::anonymous("Porphy", 0));
                if !p {
                    prop_assert!(!f.coordinator.has_pending());
                }
                prop_assert!(!f.coordinator.is_applying_remote());
            }
            f.host.paused.store(false, Ordering::SeqCst);
            f.coordinator.on_host_resumed();
            prop_assert!(!f.coordinator.is_applying_remote());
            prop_assert!(!f.coordinator.has_pending());
            prop_assert!(f.connector.transport().sent().is_empty());
        }
    }
}
