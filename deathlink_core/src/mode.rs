//! Synchronization mode.

use crate::error::DeathLinkError;
use deathlink_env::DeathCategory;
use serde::Serialize;

/// Which local deaths get broadcast to the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum SyncMode {
    /// Feature disabled
    #[default]
    Off,
    /// Broadcast everything except voluntary resets
    Standard,
    /// Broadcast every death
    All,
}

impl SyncMode {
    /// Categories that `Standard` keeps to itself: soft resets the player
    /// chose or the loop forced, not "real" deaths.
    pub const STANDARD_EXCLUDED: [DeathCategory; 4] = [
        DeathCategory::Meditation,
        DeathCategory::Supernova,
        DeathCategory::TimeLoop,
        DeathCategory::BigBang,
    ];

    /// Returns the numeric value used by session slot data.
    pub fn as_raw(&self) -> i64 {
        match self {
            SyncMode::Off => 0,
            SyncMode::Standard => 1,
            SyncMode::All => 2,
        }
    }

    pub fn is_active(&self) -> bool {
        *self != SyncMode::Off
    }

    /// Returns whether a local death of `category` should be broadcast.
    pub fn broadcasts(&self, category: DeathCategory) -> bool {
        match self {
            SyncMode::Off => false,
            SyncMode::Standard => !Self::STANDARD_EXCLUDED.contains(&category),
            SyncMode::All => true,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SyncMode::Off => "Off",
            SyncMode::Standard => "Default",
            SyncMode::All => "AllDeaths",
        }
    }
}

impl TryFrom<i64> for SyncMode {
    type Error = DeathLinkError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SyncMode::Off),
            1 => Ok(SyncMode::Standard),
            2 => Ok(SyncMode::All),
            other => Err(DeathLinkError::InvalidConfiguration(other.to_string())),
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SyncMode {
    type Err = DeathLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "0" => Ok(SyncMode::Off),
            "standard" | "default" | "1" => Ok(SyncMode::Standard),
            "all" | "all_deaths" | "alldeaths" | "2" => Ok(SyncMode::All),
            _ => Err(DeathLinkError::InvalidConfiguration(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_values() {
        for mode in [SyncMode::Off, SyncMode::Standard, SyncMode::All] {
            assert_eq!(SyncMode::try_from(mode.as_raw()).unwrap(), mode);
        }
        assert!(matches!(
            SyncMode::try_from(3),
            Err(DeathLinkError::InvalidConfiguration(_))
        ));
        assert!(SyncMode::try_from(-1).is_err());
    }

    #[test]
    fn test_standard_excludes_soft_resets() {
        for category in SyncMode::STANDARD_EXCLUDED {
            assert!(!SyncMode::Standard.broadcasts(category));
            assert!(SyncMode::All.broadcasts(category));
        }
        assert!(SyncMode::Standard.broadcasts(DeathCategory::Impact));
        assert!(SyncMode::Standard.broadcasts(DeathCategory::Crushed));
    }

    #[test]
    fn test_off_broadcasts_nothing() {
        for category in DeathCategory::ALL {
            assert!(!SyncMode::Off.broadcasts(category));
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("default".parse::<SyncMode>().unwrap(), SyncMode::Standard);
        assert_eq!("All_Deaths".parse::<SyncMode>().unwrap(), SyncMode::All);
        assert_eq!(" off ".parse::<SyncMode>().unwrap(), SyncMode::Off);
        assert!("sometimes".parse::<SyncMode>().is_err());
    }
}
