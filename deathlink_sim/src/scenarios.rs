//! Death-link scenarios for the simulator.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// DL-001: Everyone dies in turn; no death is ever echoed back
    EchoStorm,

    /// DL-002: Paused players buffer the death and apply it on resume
    PausedBuffer,

    /// DL-003: Standard mode keeps soft resets local
    StandardFilter,

    /// DL-004: All mode shares every category
    AllDeaths,

    /// DL-005: Lazy connect, stable connection, invalid values ignored
    ModeSwitch,

    /// DL-006: Lossy and partitioned group, still no echoes
    LossyLink,

    /// DL-007: Two deaths while paused collapse into one
    DoubleBuffer,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::EchoStorm,
            ScenarioId::PausedBuffer,
            ScenarioId::StandardFilter,
            ScenarioId::AllDeaths,
            ScenarioId::ModeSwitch,
            ScenarioId::LossyLink,
            ScenarioId::DoubleBuffer,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::EchoStorm => "echo_storm",
            ScenarioId::PausedBuffer => "paused_buffer",
            ScenarioId::StandardFilter => "standard_filter",
            ScenarioId::AllDeaths => "all_deaths",
            ScenarioId::ModeSwitch => "mode_switch",
            ScenarioId::LossyLink => "lossy_link",
            ScenarioId::DoubleBuffer => "double_buffer",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::EchoStorm => "Random players die each round; every peer applies once, nobody re-sends",
            ScenarioId::PausedBuffer => "Half the group is paused; their deaths wait for resume and apply once",
            ScenarioId::StandardFilter => "Meditation, Supernova, TimeLoop and BigBang stay local in Standard mode",
            ScenarioId::AllDeaths => "Every category is shared in All mode",
            ScenarioId::ModeSwitch => "Off -> Standard -> All -> invalid -> Off on one player, one connection",
            ScenarioId::LossyLink => "Lossy deliveries plus an isolated player; applies match deliveries",
            ScenarioId::DoubleBuffer => "Two deaths arrive while paused; exactly one is applied, the latest kept",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "echo_storm" | "echostorm" | "dl-001" => Ok(ScenarioId::EchoStorm),
            "paused_buffer" | "pausedbuffer" | "dl-002" => Ok(ScenarioId::PausedBuffer),
            "standard_filter" | "standardfilter" | "dl-003" => Ok(ScenarioId::StandardFilter),
            "all_deaths" | "alldeaths" | "dl-004" => Ok(ScenarioId::AllDeaths),
            "mode_switch" | "modeswitch" | "dl-005" => Ok(ScenarioId::ModeSwitch),
            "lossy_link" | "lossylink" | "dl-006" => Ok(ScenarioId::LossyLink),
            "double_buffer" | "doublebuffer" | "dl-007" => Ok(ScenarioId::DoubleBuffer),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
