//! JSON exporter for scenario runs.
//!
//! Writes the final metrics and a per-player snapshot (kills, console,
//! counters) so a failing seed can be inspected after the fact.

use crate::error::SimError;
use crate::runner::{PlayerSummary, ScenarioMetrics, ScenarioResult};
use serde::Serialize;
use std::fs::File;
use std::io::Write;

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,

    pub players: Vec<PlayerSummary>,
}

impl SimExport {
    /// Builds the export from a finished run.
    pub fn from_result(result: &ScenarioResult) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            passed: result.passed,
            failure_reason: result.failure_reason.clone(),
            metrics: result.metrics.clone(),
            players: result.players.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> Result<(), SimError> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ScenarioRunner;
    use crate::scenarios::ScenarioId;

    #[test]
    fn test_export_shape() {
        let result = ScenarioRunner::new(42, 3).run(ScenarioId::PausedBuffer);
        let export = SimExport::from_result(&result);
        let value: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();

        assert_eq!(value["scenario"], "paused_buffer");
        assert_eq!(value["seed"], 42);
        assert_eq!(value["passed"], true);
        assert!(value.get("failure_reason").is_none());
        assert_eq!(value["players"].as_array().unwrap().len(), 3);
        assert_eq!(value["metrics"]["broadcasts"], 1);
        assert_eq!(value["players"][0]["mode"], "Standard");
    }

    #[test]
    fn test_write_to_file() {
        let result = ScenarioRunner::new(1, 2).run(ScenarioId::StandardFilter);
        let export = SimExport::from_result(&result);
        let path = std::env::temp_dir().join(format!("deathlink-export-{}.json", std::process::id()));
        let path = path.to_string_lossy().into_owned();

        export.write_to_file(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(written.contains("standard_filter"));
    }

    #[test]
    fn test_write_to_missing_dir_fails() {
        let result = ScenarioRunner::new(1, 2).run(ScenarioId::StandardFilter);
        let err = SimExport::from_result(&result)
            .write_to_file("/nonexistent-dir/deathlink/export.json")
            .unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }
}
