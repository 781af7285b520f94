//! Sweep harness for the `single-bss-sld-edca` simulation.
//!
//! The engine is run once per (configuration, sweep point), its shared-name
//! output is moved aside after every run, and the collected lines are decoded
//! into per-metric series and charted against the offered load.

pub mod bundle;
pub mod cancel;
pub mod chart;
pub mod collector;
pub mod confirm;
pub mod engine;
pub mod error;
pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod series;
pub mod sweep;

pub use bundle::{Provenance, ResultsBundle};
pub use cancel::CancelToken;
pub use chart::{ChartEmitter, ChartFormat, JsonChartEmitter, TextChartEmitter};
pub use collector::{ArtifactHandle, EngineSession, ResultCollector};
pub use confirm::{AssumeYes, Confirm, StdinConfirm};
pub use engine::{Invocation, ProcessEngine, ProcessEngineBuilder, SimulationEngine};
pub use error::{DecodeFailure, ErrorKind, HarnessError, Result};
pub use parser::{ParsedArtifact, Record, RecordParser};
pub use pipeline::{Pipeline, RunReport, Stage, rerender};
pub use schema::ColumnMap;
pub use series::{ChartDataset, MetricSeries, MetricSeriesBuilder};
pub use sweep::{Sweep, SweepPoint};
