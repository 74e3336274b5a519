//! Simulated host game.

use deathlink_env::{DeathCategory, DeathOrigin, GameHost, LocalDeath};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Signals the host raises towards the coordinator.
pub struct HostHooks {
    /// Local-death signal, raised before the death takes effect
    pub on_death: Box<dyn Fn(LocalDeath) + Send + Sync>,

    /// Raised once per paused -> unpaused transition
    pub on_resume: Box<dyn Fn() + Send + Sync>,
}

/// One `kill_player` call as the host saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordedKill {
    pub category: DeathCategory,
    pub origin: DeathOrigin,

    /// False when the player was already dead or dying
    pub took_effect: bool,

    /// Virtual time of the kill
    pub at_ms: u64,
}

/// A game instance with a pause menu, a death manager and a time loop.
///
/// Mirrors the host contract: `kill_player` raises the death hook
/// synchronously with the dead/dying flags as they were before the kill,
/// then marks the player dead.
pub struct SimHost {
    paused: AtomicBool,
    dead: AtomicBool,
    dying: AtomicBool,
    loop_count: AtomicU32,

    /// Current virtual time in milliseconds
    virtual_time_ms: AtomicU64,

    /// Virtual time 0 maps to this wall-clock time
    epoch: SystemTime,

    kills: Mutex<Vec<RecordedKill>>,
    hooks: OnceLock<HostHooks>,
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            dead: AtomicBool::new(false),
            dying: AtomicBool::new(false),
            loop_count: AtomicU32::new(1),
            virtual_time_ms: AtomicU64::new(0),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
            kills: Mutex::new(Vec::new()),
            hooks: OnceLock::new(),
        }
    }

    /// Installs the coordinator's hooks. Returns false if already installed.
    pub fn install_hooks(&self, hooks: HostHooks) -> bool {
        self.hooks.set(hooks).is_ok()
    }

    /// The player dies on their own.
    pub fn die(&self, category: DeathCategory) {
        self.kill_player(category, DeathOrigin::Local);
    }

    /// Starts the death sequence without completing it.
    pub fn set_dying(&self) {
        self.dying.store(true, Ordering::SeqCst);
    }

    /// Opens the pause menu.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Closes the pause menu, raising the resume hook if it was open.
    pub fn resume(&self) -> bool {
        let was_paused = self.paused.swap(false, Ordering::SeqCst);
        if was_paused {
            if let Some(hooks) = self.hooks.get() {
                (hooks.on_resume)();
            }
        }
        was_paused
    }

    /// Starts a new loop: the player is alive again.
    pub fn respawn(&self) {
        self.dead.store(false, Ordering::SeqCst);
        self.dying.store(false, Ordering::SeqCst);
        self.loop_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Advances virtual time.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count.load(Ordering::SeqCst)
    }

    pub fn now_ms(&self) -> u64 {
        self.virtual_time_ms.load(Ordering::SeqCst)
    }

    /// Every kill so far.
    pub fn kills(&self) -> Vec<RecordedKill> {
        self.kills.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of kills requested by the coordinator for remote deaths.
    pub fn remote_kills(&self) -> usize {
        self.kills()
            .iter()
            .filter(|k| k.origin == DeathOrigin::Remote)
            .count()
    }

    /// Number of deaths the player caused themselves.
    pub fn local_kills(&self) -> usize {
        self.kills()
            .iter()
            .filter(|k| k.origin == DeathOrigin::Local)
            .count()
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl GameHost for SimHost {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn kill_player(&self, category: DeathCategory, origin: DeathOrigin) {
        let already_dead = self.dead.load(Ordering::SeqCst);
        let already_dying = self.dying.load(Ordering::SeqCst);

        if let Some(hooks) = self.hooks.get() {
            let death = LocalDeath::new(category)
                .with_origin(origin)
                .with_host_state(already_dead, already_dying);
            (hooks.on_death)(death);
        }

        let took_effect = !already_dead && !already_dying;
        if took_effect {
            self.dead.store(true, Ordering::SeqCst);
        }

        self.kills
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedKill {
                category,
                origin,
                took_effect,
                at_ms: self.now_ms(),
            });
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + Duration::from_millis(self.now_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_hook_sees_state_before_kill() {
        let host = Arc::new(SimHost::new());
        let seen: Arc<Mutex<Vec<LocalDeath>>> = Arc::default();
        let sink = Arc::clone(&seen);
        host.install_hooks(HostHooks {
            on_death: Box::new(move |death| sink.lock().unwrap().push(death)),
            on_resume: Box::new(|| {}),
        });

        host.die(DeathCategory::Impact);
        host.die(DeathCategory::Lava);

        let seen = seen.lock().unwrap();
        assert!(!seen[0].already_dead);
        assert!(seen[1].already_dead);

        let kills = host.kills();
        assert!(kills[0].took_effect);
        assert!(!kills[1].took_effect);
    }

    #[test]
    fn test_resume_hook_fires_only_on_transition() {
        let host = SimHost::new();
        let resumes = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&resumes);
        host.install_hooks(HostHooks {
            on_death: Box::new(|_| {}),
            on_resume: Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        });

        assert!(!host.resume());
        host.pause();
        assert!(host.resume());
        assert!(!host.resume());
        assert_eq!(resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_respawn_starts_new_loop() {
        let host = SimHost::new();
        host.die(DeathCategory::Supernova);
        assert!(host.is_dead());

        host.respawn();
        assert!(!host.is_dead());
        assert_eq!(host.loop_count(), 2);
    }

    #[test]
    fn test_virtual_clock() {
        let host = SimHost::new();
        let start = host.system_time();
        host.advance_time(Duration::from_millis(1500));
        assert_eq!(host.system_time().duration_since(start).unwrap(), Duration::from_millis(1500));
    }
}
