//! JSON exporter for offline inspection of a simulation run.
//!
//! One frame per counter tick: the runtime snapshot next to what the
//! oracle had emitted by then.

use crate::oracle::OracleTotals;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use threatglobe_core::RuntimeSnapshot;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// What the engine showed
    pub snapshot: RuntimeSnapshot,

    /// What the feed had sent
    pub oracle: OracleTotals,

    /// Scenario events (bursts, filter changes, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_extend_duration() {
        let mut export = SimExport::new("steady", 42);
        for t in 1..=3 {
            export.add_frame(SimFrame {
                time_sec: t as f64,
                snapshot: RuntimeSnapshot::default(),
                oracle: OracleTotals::default(),
                events: vec![],
            });
        }
        export.finalize(true, None);

        assert_eq!(export.duration_sec, 3.0);
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["frames"].as_array().map(Vec::len), Some(3));
        assert!(json.get("failure_reason").is_none());
        assert!(json["frames"][0].get("events").is_none());
    }
}
