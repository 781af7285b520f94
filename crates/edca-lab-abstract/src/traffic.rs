use serde::{Deserialize, Serialize};
use std::fmt;

/// EDCA access categories, in the order the engine writes their columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrafficClass {
    /// AC_BE
    BestEffort,
    /// AC_BK
    Background,
    /// AC_VI, interactive video
    Video,
    /// AC_VO
    Voice,
}

impl TrafficClass {
    pub const ALL: [TrafficClass; 4] = [
        TrafficClass::BestEffort,
        TrafficClass::Background,
        TrafficClass::Video,
        TrafficClass::Voice,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            TrafficClass::BestEffort => "BE",
            TrafficClass::Background => "BK",
            TrafficClass::Video => "VI",
            TrafficClass::Voice => "VO",
        }
    }

    /// Position of this class inside a five-column metric group.
    pub fn offset(self) -> usize {
        match self {
            TrafficClass::BestEffort => 0,
            TrafficClass::Background => 1,
            TrafficClass::Video => 2,
            TrafficClass::Voice => 3,
        }
    }

    pub fn from_short_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|class| class.short_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Number of stations per access category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPopulation {
    #[serde(default)]
    pub be: u32,
    #[serde(default)]
    pub bk: u32,
    #[serde(default)]
    pub vi: u32,
    #[serde(default)]
    pub vo: u32,
}

impl ClassPopulation {
    pub fn new(be: u32, bk: u32, vi: u32, vo: u32) -> Self {
        Self { be, bk, vi, vo }
    }

    pub fn count(&self, class: TrafficClass) -> u32 {
        match class {
            TrafficClass::BestEffort => self.be,
            TrafficClass::Background => self.bk,
            TrafficClass::Video => self.vi,
            TrafficClass::Voice => self.vo,
        }
    }

    /// Station count across all classes; wide enough that no mix overflows.
    pub fn total(&self) -> u64 {
        TrafficClass::ALL
            .iter()
            .map(|class| u64::from(self.count(*class)))
            .sum()
    }

    /// Label of the form `2_BE_2_BK_2_VI_2_VO`.
    pub fn label(&self) -> String {
        TrafficClass::ALL
            .iter()
            .map(|class| format!("{}_{}", self.count(*class), class.short_name()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Packet generation process used by every station in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficMode {
    Deterministic,
    Bernoulli,
}

impl TrafficMode {
    /// Value passed to the engine's `trafficType` parameter.
    pub fn selector(self) -> u8 {
        match self {
            TrafficMode::Deterministic => 0,
            TrafficMode::Bernoulli => 1,
        }
    }
}

/// A named traffic mix. The label keys chart legends and artifact file names,
/// so it must be unique within one experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub label: String,
    pub population: ClassPopulation,
    pub mode: Option<TrafficMode>,
}

impl Configuration {
    pub fn new(population: ClassPopulation) -> Self {
        Self {
            label: population.label(),
            population,
            mode: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_mode(mut self, mode: TrafficMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn total_stations(&self) -> u64 {
        self.population.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_label_follows_column_order() {
        let population = ClassPopulation::new(8, 0, 0, 0);
        assert_eq!(population.label(), "8_BE_0_BK_0_VI_0_VO");
        assert_eq!(population.total(), 8);
    }

    #[test]
    fn total_of_saturated_counts_does_not_overflow() {
        let population = ClassPopulation::new(u32::MAX, u32::MAX, 1, 0);
        assert_eq!(population.total(), 2 * u64::from(u32::MAX) + 1);
    }

    #[test]
    fn configuration_defaults_label_from_population() {
        let cfg = Configuration::new(ClassPopulation::new(2, 2, 2, 2)).with_mode(TrafficMode::Bernoulli);
        assert_eq!(cfg.label, "2_BE_2_BK_2_VI_2_VO");
        assert_eq!(cfg.total_stations(), 8);
        assert_eq!(cfg.mode.map(TrafficMode::selector), Some(1));
    }

    #[test]
    fn short_names_round_trip_case_insensitively() {
        assert_eq!(TrafficClass::from_short_name("vi"), Some(TrafficClass::Video));
        assert_eq!(TrafficClass::from_short_name("XX"), None);
    }
}
