use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Parameters shared by every invocation of one experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentParams {
    pub seed: u64,
    /// Application payload size in bytes.
    pub payload_size: u32,
}

impl Default for ExperimentParams {
    fn default() -> Self {
        Self {
            seed: 1,
            payload_size: 1500,
        }
    }
}

/// Offered-load axis expressed as base-10 exponents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepBounds {
    pub min_exponent: f64,
    pub max_exponent: f64,
    pub step: f64,
}

impl Default for SweepBounds {
    fn default() -> Self {
        Self {
            min_exponent: -5.0,
            max_exponent: -2.0,
            step: 0.5,
        }
    }
}

/// How to launch the external simulation engine and where it leaves its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSpec {
    pub program: PathBuf,
    /// Arguments placed before the scenario line (e.g. `run` for the ns-3 wrapper).
    pub launcher_args: Vec<String>,
    pub scenario: String,
    /// Directory the engine runs in; the shared artifact appears here.
    pub working_dir: PathBuf,
    /// File name the engine appends its result line to.
    pub artifact: String,
    /// Additional `--key=value` parameters appended after the fixed set.
    pub extra: BTreeMap<String, String>,
}

impl Default for EngineSpec {
    fn default() -> Self {
        Self {
            program: PathBuf::from("./ns3"),
            launcher_args: vec!["run".to_string()],
            scenario: "single-bss-sld-edca".to_string(),
            working_dir: PathBuf::from("."),
            artifact: "wifi-edca.dat".to_string(),
            extra: BTreeMap::new(),
        }
    }
}
