//! SimWorld - a group of simulated players sharing one room.

use crate::error::SimError;
use crate::host::{HostHooks, SimHost};
use crate::network::{SimConnector, SimGroup};

use deathlink_core::{DeathLinkConfig, DeathLinkCoordinator, StatusConsole, SyncMode};
use deathlink_env::{DeathCategory, GroupController, TracingSink};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Coordinator type used by every simulated player.
pub type SimCoordinator = DeathLinkCoordinator<SimHost, SimConnector>;

const PLAYER_NAMES: [&str; 16] = [
    "Hatchling", "Slate", "Hornfels", "Gossan", "Esker", "Chert", "Riebeck", "Feldspar",
    "Gabbro", "Tektite", "Hal", "Mica", "Porphy", "Rutile", "Marl", "Tephra",
];

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of players in the group
    pub num_players: usize,

    /// Probability that a single delivery is lost
    pub loss_rate: f64,

    /// Gameplay console capacity per player
    pub console_lines: usize,

    /// Mirror every player's status lines to the log
    pub log_status: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_players: 4,
            loss_rate: 0.0,
            console_lines: 6,
            log_status: false,
        }
    }
}

/// One simulated player: game, console and coordinator.
pub struct SimPlayer {
    pub index: usize,
    pub name: String,
    pub host: Arc<SimHost>,
    pub console: Arc<StatusConsole>,
    pub coordinator: Arc<SimCoordinator>,
    pub connector: SimConnector,
}

/// The SimWorld - container for the entire simulation.
pub struct SimWorld {
    pub config: SimConfig,
    group: Arc<SimGroup>,
    players: Vec<SimPlayer>,
    rng: ChaCha8Rng,
}

impl SimWorld {
    /// Creates the world. Every coordinator starts Off.
    pub fn new(config: SimConfig) -> Self {
        // Separate streams so group loss rolls don't depend on scenario choices
        let group = SimGroup::new(config.seed.wrapping_mul(0x3c6ef372fe94f82b));
        group.set_loss_rate(config.loss_rate);

        let players = (0..config.num_players)
            .map(|index| Self::spawn_player(&config, &group, index))
            .collect();

        Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            group,
            players,
        }
    }

    fn spawn_player(config: &SimConfig, group: &Arc<SimGroup>, index: usize) -> SimPlayer {
        let name = match PLAYER_NAMES.get(index) {
            Some(name) => name.to_string(),
            None => format!("Hearthian{}", index),
        };

        let host = Arc::new(SimHost::new());
        let mut console = StatusConsole::new(config.console_lines);
        if config.log_status {
            console = console.with_mirror(Arc::new(TracingSink::new(name.clone())));
        }
        let console = Arc::new(console);
        let connector = group.connector();

        let mut death_config = DeathLinkConfig::new(name.clone(), SyncMode::Off)
            .with_flavor_seed(config.seed ^ (index as u64).wrapping_mul(0x517cc1b727220a95));
        death_config.console_lines = config.console_lines;

        let coordinator = SimCoordinator::new(
            &death_config,
            Arc::clone(&host),
            connector.clone(),
            console.clone(),
        );

        let on_death = Arc::downgrade(&coordinator);
        let on_resume = Arc::downgrade(&coordinator);
        host.install_hooks(HostHooks {
            on_death: Box::new(move |death| {
                if let Some(coordinator) = on_death.upgrade() {
                    coordinator.on_local_fatal_event(death);
                }
            }),
            on_resume: Box::new(move || {
                if let Some(coordinator) = on_resume.upgrade() {
                    coordinator.on_host_resumed();
                }
            }),
        });

        console.greet_loop(host.loop_count());

        SimPlayer {
            index,
            name,
            host,
            console,
            coordinator,
            connector,
        }
    }

    /// Activates every player with the same raw mode value.
    pub fn activate_all(&self, raw: i64) -> Result<(), SimError> {
        for index in 0..self.players.len() {
            self.activate(index, raw)?;
        }
        Ok(())
    }

    /// Activates one player.
    pub fn activate(&self, index: usize, raw: i64) -> Result<(), SimError> {
        let player = self.player(index)?;
        player
            .coordinator
            .activate(raw)
            .map_err(|source| SimError::Activation {
                player: player.name.clone(),
                source,
            })
    }

    pub fn player(&self, index: usize) -> Result<&SimPlayer, SimError> {
        self.players.get(index).ok_or(SimError::UnknownPlayer {
            index,
            count: self.players.len(),
        })
    }

    pub fn players(&self) -> &[SimPlayer] {
        &self.players
    }

    pub fn group(&self) -> &Arc<SimGroup> {
        &self.group
    }

    /// Delivers everything queued on the group.
    pub fn deliver(&self) -> usize {
        let delivered = self.group.deliver();
        debug!("delivered {} links", delivered);
        delivered
    }

    /// Starts a new loop for every player.
    pub fn respawn_all(&self) {
        for player in &self.players {
            player.host.respawn();
            player.console.reload();
            player.console.greet_loop(player.host.loop_count());
        }
    }

    /// Advances every player's clock.
    pub fn advance_time(&self, duration: Duration) {
        for player in &self.players {
            player.host.advance_time(duration);
        }
    }

    /// Picks a random player index among `candidates`.
    pub fn random_player_from(&mut self, candidates: &[usize]) -> Option<usize> {
        candidates.choose(&mut self.rng).copied()
    }

    /// Picks a random player index.
    pub fn random_player(&mut self) -> usize {
        self.rng.gen_range(0..self.players.len())
    }

    /// Picks a random category that `mode` broadcasts.
    pub fn random_category(&mut self, mode: SyncMode) -> DeathCategory {
        let candidates: Vec<DeathCategory> = DeathCategory::ALL
            .iter()
            .copied()
            .filter(|c| mode.broadcasts(*c))
            .collect();
        candidates
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(DeathCategory::Default)
    }

    /// Sum of outbound broadcasts over every coordinator.
    pub fn total_sent(&self) -> u64 {
        self.players.iter().map(|p| p.coordinator.stats().sent).sum()
    }
}
