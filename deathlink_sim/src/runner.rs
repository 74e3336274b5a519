//! Scenario runner - executes death-link scenarios end to end.

use crate::error::SimError;
use crate::host::RecordedKill;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

use deathlink_core::{CoordinatorStats, SyncMode};
use deathlink_env::{DeathCategory, GroupController};
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::time::Duration;
use tracing::{info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Final state of every player
    pub players: Vec<PlayerSummary>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScenarioMetrics {
    /// Links accepted by the group
    pub links_sent: u64,

    /// Handler invocations
    pub links_delivered: u64,

    /// Deliveries lost to the loss roll
    pub links_lost: u64,

    /// Deliveries blocked by isolation
    pub links_unreachable: u64,

    /// Broadcasts issued by coordinators
    pub broadcasts: u64,

    /// Remote deaths applied to local players
    pub applied: u64,

    /// Applied deaths that came back through the host hook
    pub echoes_suppressed: u64,

    /// Local deaths kept local by the Standard filter
    pub filtered: u64,

    /// Remote deaths that waited for a resume
    pub buffered: u64,

    /// Broadcasts lost before reaching the group
    pub dropped: u64,
}

/// End-of-run snapshot of one player.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSummary {
    pub name: String,
    pub mode: SyncMode,
    pub connection: Option<String>,
    pub stats: CoordinatorStats,
    pub kills: Vec<RecordedKill>,
    pub console: Vec<String>,
}

/// Collected assertion failures.
#[derive(Debug, Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn expect(&mut self, ok: bool, what: impl Display) {
        if !ok {
            self.failures.push(what.to_string());
        }
    }

    fn expect_eq<T: PartialEq + Debug>(&mut self, what: impl Display, actual: T, expected: T) {
        if actual != expected {
            self.failures
                .push(format!("{}: got {:?}, expected {:?}", what, actual, expected));
        }
    }
}

/// Runs death-link scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Number of players (at least 2)
    num_players: usize,

    /// Death rounds for round-based scenarios
    rounds: usize,

    /// Loss rate for `lossy_link`
    loss_rate: f64,

    /// Mirror player status lines to the log
    log_status: bool,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64, num_players: usize) -> Self {
        Self {
            seed,
            num_players: num_players.max(2),
            rounds: 8,
            loss_rate: 0.3,
            log_status: false,
        }
    }

    /// Sets the number of rounds.
    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    /// Sets the loss rate used by `lossy_link`.
    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate.clamp(0.0, 1.0);
        self
    }

    /// Logs every player's status lines under `deathlink::status`.
    pub fn with_status_log(mut self, log_status: bool) -> Self {
        self.log_status = log_status;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut checks = Checks::default();
        let loss_rate = match scenario {
            ScenarioId::LossyLink => self.loss_rate,
            _ => 0.0,
        };
        let mut world = self.world(loss_rate);

        let outcome = match scenario {
            ScenarioId::EchoStorm => self.run_echo_storm(&mut world, &mut checks),
            ScenarioId::PausedBuffer => self.run_paused_buffer(&mut world, &mut checks),
            ScenarioId::StandardFilter => self.run_standard_filter(&mut world, &mut checks),
            ScenarioId::AllDeaths => self.run_all_deaths(&mut world, &mut checks),
            ScenarioId::ModeSwitch => self.run_mode_switch(&mut world, &mut checks),
            ScenarioId::LossyLink => self.run_lossy_link(&mut world, &mut checks),
            ScenarioId::DoubleBuffer => self.run_double_buffer(&mut world, &mut checks),
        };
        if let Err(e) = outcome {
            checks.expect(false, e);
        }

        self.finish(scenario, &world, checks)
    }

    fn world(&self, loss_rate: f64) -> SimWorld {
        SimWorld::new(SimConfig {
            seed: self.seed,
            num_players: self.num_players,
            loss_rate,
            log_status: self.log_status,
            ..SimConfig::default()
        })
    }

    fn activate_all(&self, world: &SimWorld, mode: SyncMode, checks: &mut Checks) {
        if let Err(e) = world.activate_all(mode.as_raw()) {
            checks.expect(false, e);
        }
    }

    fn activate_one(&self, world: &SimWorld, index: usize, mode: SyncMode, checks: &mut Checks) {
        if let Err(e) = world.activate(index, mode.as_raw()) {
            checks.expect(false, e);
        }
    }

    /// Every coordinator applied exactly `expected[i]` remote deaths and
    /// swallowed each one's echo.
    fn expect_applied(&self, world: &SimWorld, expected: &[u64], checks: &mut Checks) {
        for (player, expected) in world.players().iter().zip(expected) {
            let stats = player.coordinator.stats();
            checks.expect_eq(format!("{} applied", player.name), stats.applied, *expected);
            checks.expect_eq(format!("{} echoes", player.name), stats.suppressed_echoes, *expected);
            checks.expect(
                !player.coordinator.is_applying_remote(),
                format!("{} left the apply guard up", player.name),
            );
        }
    }

    fn run_echo_storm(&self, world: &mut SimWorld, checks: &mut Checks) -> Result<(), SimError> {
        self.activate_all(world, SyncMode::Standard, checks);

        let n = world.players().len();
        let mut expected = vec![0u64; n];

        for round in 0..self.rounds {
            let dier = world.random_player();
            let category = world.random_category(SyncMode::Standard);
            world.player(dier)?.host.die(category);
            world.deliver();

            for (i, count) in expected.iter_mut().enumerate() {
                if i != dier {
                    *count += 1;
                }
            }
            checks.expect_eq(format!("round {} broadcasts", round), world.total_sent(), round as u64 + 1);

            world.advance_time(Duration::from_secs(30));
            world.respawn_all();
        }

        self.expect_applied(world, &expected, checks);
        let local_kills: usize = world.players().iter().map(|p| p.host.local_kills()).sum();
        checks.expect_eq("local deaths", local_kills, self.rounds);
        checks.expect_eq("links left queued", world.group().queued(), 0);
        Ok(())
    }

    fn run_paused_buffer(&self, world: &mut SimWorld, checks: &mut Checks) -> Result<(), SimError> {
        self.activate_all(world, SyncMode::Standard, checks);

        let n = world.players().len();
        let dier = n - 1;
        let paused: Vec<usize> = (0..(n / 2).max(1)).collect();

        for &i in &paused {
            world.player(i)?.host.pause();
        }
        world.player(dier)?.host.die(DeathCategory::Impact);
        world.deliver();

        for player in &world.players()[..dier] {
            let is_paused = paused.contains(&player.index);
            checks.expect_eq(
                format!("{} pending before resume", player.name),
                player.coordinator.has_pending(),
                is_paused,
            );
            checks.expect_eq(
                format!("{} kills before resume", player.name),
                player.host.remote_kills(),
                usize::from(!is_paused),
            );
        }

        for &i in &paused {
            let player = world.player(i)?;
            checks.expect(player.host.resume(), format!("{} was not paused", player.name));
            checks.expect_eq(format!("{} kills after resume", player.name), player.host.remote_kills(), 1);
            checks.expect(!player.coordinator.has_pending(), format!("{} still pending", player.name));
        }

        // Nothing left to apply on a second resume
        for &i in &paused {
            let player = world.player(i)?;
            checks.expect(
                !player.coordinator.on_host_resumed(),
                format!("{} applied twice", player.name),
            );
            checks.expect_eq(format!("{} kills after second resume", player.name), player.host.remote_kills(), 1);
        }

        checks.expect_eq("broadcasts", world.total_sent(), 1);
        Ok(())
    }

    fn run_standard_filter(&self, world: &mut SimWorld, checks: &mut Checks) -> Result<(), SimError> {
        self.activate_all(world, SyncMode::Standard, checks);

        let subject = world.player(0)?;
        for category in SyncMode::STANDARD_EXCLUDED {
            subject.host.die(category);
            world.deliver();
            world.respawn_all();
        }

        checks.expect_eq("broadcasts after soft resets", world.total_sent(), 0);
        checks.expect_eq("filtered", subject.coordinator.stats().filtered, 4);
        for player in &world.players()[1..] {
            checks.expect_eq(format!("{} kills after soft resets", player.name), player.host.remote_kills(), 0);
        }

        subject.host.die(DeathCategory::Impact);
        world.deliver();

        checks.expect_eq("broadcasts after impact", world.total_sent(), 1);
        for player in &world.players()[1..] {
            checks.expect_eq(format!("{} kills after impact", player.name), player.host.remote_kills(), 1);
        }
        Ok(())
    }

    fn run_all_deaths(&self, world: &mut SimWorld, checks: &mut Checks) -> Result<(), SimError> {
        self.activate_all(world, SyncMode::All, checks);

        for category in DeathCategory::ALL {
            world.player(0)?.host.die(category);
            world.deliver();
            world.respawn_all();
        }

        let total = DeathCategory::ALL.len() as u64;
        checks.expect_eq("broadcasts", world.total_sent(), total);

        let mut expected = vec![total; world.players().len()];
        expected[0] = 0;
        self.expect_applied(world, &expected, checks);
        Ok(())
    }

    fn run_mode_switch(&self, world: &mut SimWorld, checks: &mut Checks) -> Result<(), SimError> {
        for i in 1..world.players().len() {
            self.activate_one(world, i, SyncMode::Standard, checks);
        }

        let subject = world.player(0)?;
        subject.host.die(DeathCategory::Impact);
        world.deliver();
        world.respawn_all();
        checks.expect(subject.coordinator.connection_id().is_none(), "connected while Off");
        checks.expect_eq("connects while Off", subject.connector.connects(), 0);

        self.activate_one(world, 0, SyncMode::Standard, checks);
        let connection = subject.coordinator.connection_id();
        checks.expect(connection.is_some(), "no connection after activation");

        self.activate_one(world, 0, SyncMode::All, checks);
        checks.expect_eq("connection after Standard -> All", subject.coordinator.connection_id(), connection);
        checks.expect_eq("mode after Standard -> All", subject.coordinator.mode(), SyncMode::All);

        checks.expect(world.activate(0, 7).is_err(), "mode 7 accepted");
        checks.expect_eq("mode after invalid value", subject.coordinator.mode(), SyncMode::All);

        // Supernova only goes out in All mode
        subject.host.die(DeathCategory::Supernova);
        world.deliver();
        world.respawn_all();
        checks.expect_eq("subject broadcasts in All", subject.coordinator.stats().sent, 1);
        for player in &world.players()[1..] {
            checks.expect_eq(format!("{} kills from supernova", player.name), player.host.remote_kills(), 1);
        }

        self.activate_one(world, 0, SyncMode::Off, checks);
        subject.host.die(DeathCategory::Impact);
        world.deliver();
        world.respawn_all();
        checks.expect_eq("subject broadcasts after Off", subject.coordinator.stats().sent, 1);
        checks.expect_eq("connection after Off", subject.coordinator.connection_id(), connection);
        checks.expect_eq("connects", subject.connector.connects(), 1);

        // The connection stays live while Off, so peers' deaths still land
        world.player(1)?.host.die(DeathCategory::Impact);
        world.deliver();
        checks.expect_eq("subject kills while Off", subject.host.remote_kills(), 1);
        Ok(())
    }

    fn run_lossy_link(&self, world: &mut SimWorld, checks: &mut Checks) -> Result<(), SimError> {
        self.activate_all(world, SyncMode::Standard, checks);

        let n = world.players().len();
        let isolated = n - 1;
        let heal_round = self.rounds / 2;
        let isolated_id = world.player(isolated)?.coordinator.connection_id();
        if let Some(id) = isolated_id {
            world.group().isolate(id);
        }

        for round in 0..self.rounds {
            if round == heal_round {
                if let Some(id) = isolated_id {
                    checks.expect_eq("received while isolated", world.group().received_by(id), 0);
                }
                world.group().heal_all();
            }

            let candidates: Vec<usize> = (0..n).filter(|i| round >= heal_round || *i != isolated).collect();
            let dier = world.random_player_from(&candidates).unwrap_or(0);
            let category = world.random_category(SyncMode::Standard);
            world.player(dier)?.host.die(category);
            world.deliver();
            world.respawn_all();
        }

        checks.expect_eq("broadcasts", world.total_sent(), self.rounds as u64);
        checks.expect_eq("group sent", world.group().stats().sent, self.rounds as u64);
        for player in world.players() {
            let stats = player.coordinator.stats();
            let received = player
                .coordinator
                .connection_id()
                .map(|id| world.group().received_by(id))
                .unwrap_or(0);
            checks.expect_eq(format!("{} received", player.name), stats.received, received);
            checks.expect_eq(format!("{} applied", player.name), stats.applied, received);
            checks.expect_eq(format!("{} echoes", player.name), stats.suppressed_echoes, received);
        }
        Ok(())
    }

    fn run_double_buffer(&self, world: &mut SimWorld, checks: &mut Checks) -> Result<(), SimError> {
        self.activate_all(world, SyncMode::Standard, checks);

        let n = world.players().len();
        let receiver = world.player(1)?;
        let diers = if n >= 3 { [0, 2] } else { [0, 0] };

        receiver.host.pause();
        for dier in diers {
            world.player(dier)?.host.die(DeathCategory::Impact);
            world.deliver();
            world.respawn_all();
        }

        let latest = world.player(diers[1])?.name.clone();
        checks.expect_eq("pending source", receiver.coordinator.pending_source(), Some(latest));
        checks.expect_eq("kills while paused", receiver.host.remote_kills(), 0);
        checks.expect_eq("received while paused", receiver.coordinator.stats().received, 2);
        checks.expect_eq("buffered", receiver.coordinator.stats().buffered, 2);

        checks.expect(receiver.host.resume(), "receiver was not paused");
        checks.expect_eq("kills after resume", receiver.host.remote_kills(), 1);
        checks.expect(!receiver.coordinator.has_pending(), "still pending after resume");
        Ok(())
    }

    fn finish(&self, scenario: ScenarioId, world: &SimWorld, checks: Checks) -> ScenarioResult {
        let group = world.group().stats();
        let mut metrics = ScenarioMetrics {
            links_sent: group.sent,
            links_delivered: group.delivered,
            links_lost: group.lost,
            links_unreachable: group.unreachable,
            ..ScenarioMetrics::default()
        };

        let players: Vec<PlayerSummary> = world
            .players()
            .iter()
            .map(|player| {
                let stats = player.coordinator.stats();
                metrics.broadcasts += stats.sent;
                metrics.applied += stats.applied;
                metrics.echoes_suppressed += stats.suppressed_echoes;
                metrics.filtered += stats.filtered;
                metrics.buffered += stats.buffered;
                metrics.dropped += stats.dropped;

                PlayerSummary {
                    name: player.name.clone(),
                    mode: player.coordinator.mode(),
                    connection: player.coordinator.connection_id().map(|id| id.to_string()),
                    stats,
                    kills: player.host.kills(),
                    console: player.console.pause_text().lines().map(String::from).collect(),
                }
            })
            .collect();

        let passed = checks.failures.is_empty();
        if passed {
            info!(
                "  {}: {} broadcasts, {} applied, {} echoes suppressed",
                scenario.name(),
                metrics.broadcasts,
                metrics.applied,
                metrics.echoes_suppressed
            );
        } else {
            for failure in &checks.failures {
                warn!("  {}: {}", scenario.name(), failure);
            }
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            failure_reason: if passed {
                None
            } else {
                Some(checks.failures.join("; "))
            },
            metrics,
            players,
        }
    }
}
