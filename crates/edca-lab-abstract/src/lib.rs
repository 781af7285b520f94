pub mod config;
pub mod experiment;
pub mod metric;
pub mod traffic;

pub use config::{EngineSpec, ExperimentParams, SweepBounds};
pub use experiment::{ChartRequest, ConfigurationSpec, ExperimentOverride, ExperimentSpec};
pub use metric::{Metric, MetricKind, ParseMetricError, Scope};
pub use traffic::{ClassPopulation, Configuration, TrafficClass, TrafficMode};
