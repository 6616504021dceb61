//! Feed scenarios for deterministic globe simulation.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: Steady explosion feed around a few hotspots
    Steady,

    /// SIM-002: Quiet feed with a 10x burst in the middle
    Burst,

    /// SIM-003: Every record type, with image downloads failing at random
    Mixed,

    /// SIM-004: A third of the records malformed or without a location
    Malformed,

    /// SIM-005: Analysis mode on, hex bins must follow the samples
    Analysis,

    /// SIM-006: Filter set mid-run, counters must restart
    FilterReset,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Steady,
            ScenarioId::Burst,
            ScenarioId::Mixed,
            ScenarioId::Malformed,
            ScenarioId::Analysis,
            ScenarioId::FilterReset,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "steady",
            ScenarioId::Burst => "burst",
            ScenarioId::Mixed => "mixed",
            ScenarioId::Malformed => "malformed",
            ScenarioId::Analysis => "analysis",
            ScenarioId::FilterReset => "filter_reset",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Steady => "20 explosions/s around four hotspots, counters must match the feed",
            ScenarioId::Burst => "5/s feed jumping to 50/s for 5s, entity counts must drain after",
            ScenarioId::Mixed => "All six record types, 20% image download failures",
            ScenarioId::Malformed => "20% malformed + 15% location-less records, only valid ones counted",
            ScenarioId::Analysis => "Analysis mode on, every live sample must land in a hex bin",
            ScenarioId::FilterReset => "Source filter set halfway, counters restart and only matches count",
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
            "steady" | "sim-001" => Ok(ScenarioId::Steady),
            "burst" | "sim-002" => Ok(ScenarioId::Burst),
            "mixed" | "sim-003" => Ok(ScenarioId::Mixed),
            "malformed" | "sim-004" => Ok(ScenarioId::Malformed),
            "analysis" | "sim-005" => Ok(ScenarioId::Analysis),
            "filter_reset" | "filterreset" | "sim-006" => Ok(ScenarioId::FilterReset),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert_eq!(id.to_string(), id.name());
        }
        assert_eq!("SIM-006".parse::<ScenarioId>(), Ok(ScenarioId::FilterReset));
        assert!("chaos".parse::<ScenarioId>().is_err());
    }
}
