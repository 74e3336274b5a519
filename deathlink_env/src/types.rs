//! Common types shared by the coordinator and its collaborators.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one transport connection.
///
/// A coordinator creates at most one connection for its lifetime, so this
/// value staying stable across mode changes is observable proof of reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Creates a new random ConnectionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic ConnectionId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Cause of a player death, as classified by the host game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeathCategory {
    Default,
    Impact,
    Asphyxiation,
    Energy,
    Supernova,
    Digestion,
    BigBang,
    Crushed,
    Meditation,
    TimeLoop,
    Lava,
    BlackHole,
    Dream,
    DreamExplosion,
    CrushedByElevator,
}

impl DeathCategory {
    /// Every category, in declaration order.
    pub const ALL: [DeathCategory; 15] = [
        DeathCategory::Default,
        DeathCategory::Impact,
        DeathCategory::Asphyxiation,
        DeathCategory::Energy,
        DeathCategory::Supernova,
        DeathCategory::Digestion,
        DeathCategory::BigBang,
        DeathCategory::Crushed,
        DeathCategory::Meditation,
        DeathCategory::TimeLoop,
        DeathCategory::Lava,
        DeathCategory::BlackHole,
        DeathCategory::Dream,
        DeathCategory::DreamExplosion,
        DeathCategory::CrushedByElevator,
    ];

    /// Returns the category name as the host spells it.
    pub fn name(&self) -> &'static str {
        match self {
            DeathCategory::Default => "Default",
            DeathCategory::Impact => "Impact",
            DeathCategory::Asphyxiation => "Asphyxiation",
            DeathCategory::Energy => "Energy",
            DeathCategory::Supernova => "Supernova",
            DeathCategory::Digestion => "Digestion",
            DeathCategory::BigBang => "BigBang",
            DeathCategory::Crushed => "Crushed",
            DeathCategory::Meditation => "Meditation",
            DeathCategory::TimeLoop => "TimeLoop",
            DeathCategory::Lava => "Lava",
            DeathCategory::BlackHole => "BlackHole",
            DeathCategory::Dream => "Dream",
            DeathCategory::DreamExplosion => "DreamExplosion",
            DeathCategory::CrushedByElevator => "CrushedByElevator",
        }
    }
}

impl std::fmt::Display for DeathCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DeathCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.chars().filter(|c| *c != '_' && *c != '-').collect();
        DeathCategory::ALL
            .iter()
            .copied()
            .find(|category| category.name().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("Unknown death category: {}", s))
    }
}

/// Who asked the host to kill the player.
///
/// The host echoes this token back in the [`LocalDeath`] it reports, which
/// lets the coordinator recognise deaths it caused itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeathOrigin {
    /// The player died in the game on their own.
    Local,
    /// The coordinator applied a death received from another player.
    Remote,
}

/// Local-death signal raised by the host, with its idempotency flags
/// sampled at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalDeath {
    pub category: DeathCategory,
    pub origin: DeathOrigin,

    /// The host already considers the player dead
    pub already_dead: bool,

    /// The host is already playing the death sequence
    pub already_dying: bool,
}

impl LocalDeath {
    /// A fresh, locally caused death.
    pub fn new(category: DeathCategory) -> Self {
        Self {
            category,
            origin: DeathOrigin::Local,
            already_dead: false,
            already_dying: false,
        }
    }

    /// Sets the origin token.
    pub fn with_origin(mut self, origin: DeathOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Sets the host-reported dead/dying flags.
    pub fn with_host_state(mut self, already_dead: bool, already_dying: bool) -> Self {
        self.already_dead = already_dead;
        self.already_dying = already_dying;
        self
    }
}

/// A death notification exchanged between players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathLink {
    /// Player identifier (slot name) of the player who died
    pub source: String,

    /// Human-readable cause, usually `<source><flavor text>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,

    /// Sender's wall clock, milliseconds since the UNIX epoch
    pub timestamp_ms: u64,
}

impl DeathLink {
    /// Creates a death link with a cause.
    pub fn new(source: impl Into<String>, cause: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            source: source.into(),
            cause: Some(cause.into()),
            timestamp_ms,
        }
    }

    /// Creates a death link without a cause.
    pub fn anonymous(source: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            source: source.into(),
            cause: None,
            timestamp_ms,
        }
    }

    /// Text to show a player when this death arrives.
    pub fn display_text(&self) -> String {
        match &self.cause {
            Some(cause) if !cause.is_empty() => cause.clone(),
            _ => format!("{} died.", self.source),
        }
    }

    /// Encodes this link as JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EnvError> {
        serde_json::to_vec(self).map_err(|e| EnvError::SerializationError(e.to_string()))
    }

    /// Decodes a link from JSON bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvError> {
        serde_json::from_slice(bytes).map_err(|e| EnvError::SerializationError(e.to_string()))
    }
}

/// Envelope for encoded death links moved by byte-oriented transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEnvelope {
    /// Connection that published the link
    pub origin: ConnectionId,

    /// JSON-encoded [`DeathLink`]
    pub payload: Vec<u8>,
}

impl LinkEnvelope {
    /// Wraps a link published by `origin`.
    pub fn seal(origin: ConnectionId, link: &DeathLink) -> Result<Self, EnvError> {
        Ok(Self {
            origin,
            payload: link.encode()?,
        })
    }
}
