//! DeathLink Deterministic Simulation Harness
//!
//! Runs a group of simulated players, each with its own game host, status
//! console and `DeathLinkCoordinator`, against an in-memory group transport.
//! Scenarios drive deaths, pauses and mode switches and then assert on what
//! every player's game saw.
//!
//! # Determinism
//!
//! - **Time**: each host has a virtual clock that only moves when told to
//! - **Network**: links queue on the group and are delivered explicitly
//! - **Randomness**: player choice, categories, flavor text and loss rolls
//!   all derive from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimWorld                          │
//! │  ┌─────────────┐   ┌─────────────┐                       │
//! │  │ SimHost     │   │ SimHost     │   ...                 │
//! │  │ Coordinator │   │ Coordinator │                       │
//! │  │ Console     │   │ Console     │                       │
//! │  └──────┬──────┘   └──────┬──────┘                       │
//! │         │ SimTransport    │                              │
//! │  ┌──────▼─────────────────▼──────┐                       │
//! │  │ SimGroup (queue, loss, isolation)                     │
//! │  └───────────────────────────────┘                       │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use deathlink_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 4).run(ScenarioId::EchoStorm);
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod host;
mod network;
mod runner;
mod world;
pub mod scenarios;

pub use error::SimError;
pub use exporter::SimExport;
pub use host::{HostHooks, RecordedKill, SimHost};
pub use network::{GroupStats, SimConnector, SimGroup, SimTransport};
pub use runner::{PlayerSummary, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimCoordinator, SimPlayer, SimWorld};
