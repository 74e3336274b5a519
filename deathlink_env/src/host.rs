//! Host game abstraction.

use crate::types::{DeathCategory, DeathOrigin};
use std::time::SystemTime;

/// What the coordinator needs from the game it runs inside.
///
/// # Implementations
///
/// - **Simulation**: `SimHost` - virtual clock, recorded kills
/// - **Game mods**: a thin adapter over the engine's pause state and
///   death manager
///
/// # Re-entrancy
///
/// `kill_player` usually causes the host to raise its local-death signal
/// synchronously, which lands back in the coordinator. Implementations must
/// report that signal with the `origin` they were given.
pub trait GameHost: Send + Sync + 'static {
    /// Returns whether the simulation is currently suspended
    /// (pause menu, frozen time, ...).
    fn is_paused(&self) -> bool;

    /// Kills the local player.
    fn kill_player(&self, category: DeathCategory, origin: DeathOrigin);

    /// Returns the wall-clock time used to timestamp outgoing links.
    fn system_time(&self) -> SystemTime;
}
