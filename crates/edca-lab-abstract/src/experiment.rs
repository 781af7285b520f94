use crate::config::{EngineSpec, ExperimentParams, SweepBounds};
use crate::metric::{Metric, MetricKind};
use crate::traffic::{ClassPopulation, Configuration, TrafficClass, TrafficMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Experiment description as loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ExperimentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub engine: EngineSpec,
    #[serde(default)]
    pub params: ExperimentParams,
    #[serde(default)]
    pub sweep: SweepBounds,
    pub configurations: Vec<ConfigurationSpec>,
    /// Column positions that differ from the default result schema.
    #[serde(default)]
    pub columns: BTreeMap<Metric, usize>,
    /// Charts to render; empty means the default set.
    #[serde(default)]
    pub charts: Vec<ChartRequest>,
}

impl Default for ExperimentSpec {
    /// Single 2/2/2/2 mix swept over lambda = 10^-5 ..= 10^-2.
    fn default() -> Self {
        Self {
            name: "wifi-edca".to_string(),
            description: "Per-class EDCA throughput and delay versus offered load".to_string(),
            engine: EngineSpec::default(),
            params: ExperimentParams::default(),
            sweep: SweepBounds::default(),
            configurations: vec![ConfigurationSpec {
                label: None,
                be: 2,
                bk: 2,
                vi: 2,
                vo: 2,
                mode: None,
            }],
            columns: BTreeMap::new(),
            charts: Vec::new(),
        }
    }
}

impl ExperimentSpec {
    pub fn configurations(&self) -> Vec<Configuration> {
        self.configurations
            .iter()
            .map(ConfigurationSpec::to_configuration)
            .collect()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConfigurationSpec {
    /// Defaults to the population label, e.g. `8_BE_0_BK_0_VI_0_VO`.
    pub label: Option<String>,
    #[serde(default)]
    pub be: u32,
    #[serde(default)]
    pub bk: u32,
    #[serde(default)]
    pub vi: u32,
    #[serde(default)]
    pub vo: u32,
    pub mode: Option<TrafficMode>,
}

impl ConfigurationSpec {
    pub fn to_configuration(&self) -> Configuration {
        let mut cfg = Configuration::new(ClassPopulation::new(self.be, self.bk, self.vi, self.vo));
        if let Some(label) = &self.label {
            cfg = cfg.with_label(label.clone());
        }
        if let Some(mode) = self.mode {
            cfg = cfg.with_mode(mode);
        }
        cfg
    }
}

/// Command-line patches applied on top of a loaded experiment.
#[derive(Debug, Clone, Default)]
pub struct ExperimentOverride {
    pub seed: Option<u64>,
    pub payload_size: Option<u32>,
    pub min_exponent: Option<f64>,
    pub max_exponent: Option<f64>,
    pub step: Option<f64>,
    pub program: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl ExperimentOverride {
    pub fn apply_to(&self, spec: &mut ExperimentSpec) {
        if let Some(v) = self.seed {
            spec.params.seed = v;
        }
        if let Some(v) = self.payload_size {
            spec.params.payload_size = v;
        }
        if let Some(v) = self.min_exponent {
            spec.sweep.min_exponent = v;
        }
        if let Some(v) = self.max_exponent {
            spec.sweep.max_exponent = v;
        }
        if let Some(v) = self.step {
            spec.sweep.step = v;
        }
        if let Some(v) = &self.program {
            spec.engine.program = v.clone();
        }
        if let Some(v) = &self.working_dir {
            spec.engine.working_dir = v.clone();
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartRequest {
    /// Every access category of one configuration for a single metric kind.
    PerClass {
        kind: MetricKind,
        /// Defaults to the first configuration.
        configuration: Option<String>,
        #[serde(default)]
        include_total: bool,
        file_name: Option<String>,
    },
    /// One metric across all configurations.
    Comparison {
        metric: Metric,
        file_name: Option<String>,
    },
}

impl ChartRequest {
    /// Columns this chart reads, in legend order.
    pub fn metrics(&self) -> Vec<Metric> {
        match self {
            ChartRequest::PerClass {
                kind, include_total, ..
            } => {
                let mut metrics: Vec<Metric> = TrafficClass::ALL
                    .iter()
                    .map(|class| Metric::class(*kind, *class))
                    .collect();
                if *include_total {
                    metrics.push(Metric::total(*kind));
                }
                metrics
            }
            ChartRequest::Comparison { metric, .. } => vec![*metric],
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self {
            ChartRequest::PerClass { file_name, .. } | ChartRequest::Comparison { file_name, .. } => {
                file_name.as_deref()
            }
        }
    }
}
