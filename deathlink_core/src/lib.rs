//! DeathLink Core - cross-player death synchronization
//!
//! When the local player dies, tell the group; when someone in the group
//! dies, kill the local player. The coordinator in this crate sits between
//! the host game and the group transport and takes care of three things:
//! 1. **Echo suppression**: a death we applied on behalf of a peer never goes
//!    back out as a new death
//! 2. **Pause buffering**: a death that arrives while the host is paused is
//!    held (one slot) until the host resumes
//! 3. **Mode filtering**: `Standard` keeps voluntary resets to itself, `All`
//!    shares everything, `Off` shares nothing

pub mod config;
pub mod console;
pub mod coordinator;
pub mod error;
pub mod flavor;
pub mod mode;

// Re-export key types for convenience
pub use config::DeathLinkConfig;
pub use console::StatusConsole;
pub use coordinator::{CoordinatorStats, DeathLinkCoordinator, LocalOutcome, RemoteOutcome, SuppressReason};
pub use error::DeathLinkError;
pub use flavor::FlavorTable;
pub use mode::SyncMode;
