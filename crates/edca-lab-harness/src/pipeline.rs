use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Local;
use edca_lab_abstract::{ChartRequest, Configuration, ExperimentSpec};
use tracing::{info, warn};

use crate::bundle::{self, Provenance, ResultsBundle};
use crate::cancel::CancelToken;
use crate::chart::{ChartEmitter, ChartFormat};
use crate::collector::EngineSession;
use crate::confirm::{self, Confirm};
use crate::engine::SimulationEngine;
use crate::error::{HarnessError, Result};
use crate::parser::RecordParser;
use crate::schema::ColumnMap;
use crate::series::{self, ChartDataset, MetricSeriesBuilder, default_chart_requests};
use crate::sweep::Sweep;

/// Progress of one execution. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Configured,
    Sweeping,
    Collecting,
    Parsed,
    Rendered,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configured => "configured",
            Stage::Sweeping => "sweeping",
            Stage::Collecting => "collecting",
            Stage::Parsed => "parsed",
            Stage::Rendered => "rendered",
        };
        f.write_str(name)
    }
}

/// What a finished execution produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub results_dir: PathBuf,
    pub bundle: ResultsBundle,
    pub datasets: Vec<ChartDataset>,
    pub charts: Vec<PathBuf>,
    /// Engine runs issued; zero when re-rendering a bundle.
    pub invocations: usize,
}

/// Drives sweep, collection, parsing and rendering for one experiment.
///
/// Every precondition is checked before the first invocation, and every chart
/// dataset is built before the first chart is written, so a failure never
/// leaves a partial set of charts behind.
pub struct Pipeline {
    experiment: ExperimentSpec,
    results_root: PathBuf,
    provenance_dir: PathBuf,
    cancel: CancelToken,
    emitters: Vec<Box<dyn ChartEmitter>>,
    stage: Stage,
}

impl Pipeline {
    pub fn new(experiment: ExperimentSpec) -> Self {
        let provenance_dir = experiment.engine.working_dir.clone();
        Self {
            experiment,
            results_root: PathBuf::from("results"),
            provenance_dir,
            cancel: CancelToken::new(),
            emitters: ChartFormat::default().emitters(),
            stage: Stage::Configured,
        }
    }

    pub fn results_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.results_root = root.into();
        self
    }

    /// Directory whose git state is recorded as provenance.
    pub fn provenance_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.provenance_dir = dir.into();
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn emitters(mut self, emitters: Vec<Box<dyn ChartEmitter>>) -> Self {
        self.emitters = emitters;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn experiment(&self) -> &ExperimentSpec {
        &self.experiment
    }

    pub fn run<E>(&mut self, engine: &mut E, prompt: &mut dyn Confirm) -> Result<RunReport>
    where
        E: SimulationEngine + ?Sized,
    {
        let configurations = self.experiment.configurations();
        validate_name(&self.experiment.name)?;
        validate_labels(&configurations)?;
        let sweep = Sweep::generate(self.experiment.sweep)?;
        let parser = parser_for(&self.experiment);
        let requests = chart_requests(&self.experiment, &configurations, &parser)?;
        engine.check_available()?;
        confirm::clear_stale_artifact(&engine.artifact_path(), prompt)?;

        let started = Local::now();
        let results_dir = bundle::create_fresh_dir(&self.results_root, &self.experiment.name, started)?;
        info!(
            "Experiment '{}': {} configuration(s) x {} point(s) into {}",
            self.experiment.name,
            configurations.len(),
            sweep.len(),
            results_dir.display()
        );

        self.advance(Stage::Sweeping);
        let mut session = EngineSession::new(
            engine,
            &results_dir,
            self.experiment.name.clone(),
            self.experiment.params.clone(),
            self.experiment.engine.extra.clone(),
        );
        for configuration in &configurations {
            for point in sweep.iter() {
                if self.cancel.is_cancelled() {
                    warn!(
                        "Interrupted before '{}' point {}; remaining sweep abandoned",
                        configuration.label, point.index
                    );
                    return Err(HarnessError::Interrupted);
                }
                // The terminal delivers the interrupt to the engine too, so a
                // failed point after cancellation is reported as the interrupt.
                session.run(point, configuration).map_err(|err| {
                    if self.cancel.is_cancelled() {
                        HarnessError::Interrupted
                    } else {
                        err
                    }
                })?;
            }
        }
        let invocations = session.invocations();
        let artifacts = session.into_artifacts();
        self.check_cancelled()?;

        self.advance(Stage::Collecting);
        let bundle = ResultsBundle::new(
            self.experiment.clone(),
            started,
            &results_dir,
            sweep,
            configurations,
            artifacts,
            Provenance::capture(&self.provenance_dir),
        );
        bundle.write(&bundle::commit_snapshot(&self.provenance_dir))?;

        let datasets = self.parse(&bundle, &parser, &requests)?;
        self.check_cancelled()?;
        let charts = self.render(&datasets, &results_dir)?;

        Ok(RunReport {
            results_dir,
            bundle,
            datasets,
            charts,
            invocations,
        })
    }

    fn parse(
        &mut self,
        bundle: &ResultsBundle,
        parser: &RecordParser,
        requests: &[ChartRequest],
    ) -> Result<Vec<ChartDataset>> {
        let builder = MetricSeriesBuilder::new(&bundle.sweep, parser);
        let datasets = requests
            .iter()
            .map(|request| builder.chart(request, &bundle.artifacts, &bundle.experiment.name))
            .collect::<Result<Vec<_>>>()?;
        self.advance(Stage::Parsed);
        Ok(datasets)
    }

    fn render(&mut self, datasets: &[ChartDataset], dir: &Path) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for dataset in datasets {
            for emitter in &self.emitters {
                written.push(emitter.emit(dataset, dir)?);
            }
        }
        self.advance(Stage::Rendered);
        Ok(written)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(HarnessError::Interrupted);
        }
        Ok(())
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "stage {next} re-entered after {}", self.stage);
        info!("Stage: {} -> {next}", self.stage);
        self.stage = next;
    }
}

/// Re-parse a saved bundle and render its charts again without running the engine.
pub fn rerender(dir: &Path, emitters: Vec<Box<dyn ChartEmitter>>) -> Result<RunReport> {
    let bundle = ResultsBundle::load(dir)?;
    info!(
        "Re-rendering '{}' from {} (created {})",
        bundle.experiment.name,
        dir.display(),
        bundle.created_at
    );
    let parser = parser_for(&bundle.experiment);
    let requests = chart_requests(&bundle.experiment, &bundle.configurations, &parser)?;

    let mut pipeline = Pipeline::new(bundle.experiment.clone()).emitters(emitters);
    pipeline.advance(Stage::Collecting);
    let datasets = pipeline.parse(&bundle, &parser, &requests)?;
    let charts = pipeline.render(&datasets, dir)?;
    Ok(RunReport {
        results_dir: dir.to_path_buf(),
        bundle,
        datasets,
        charts,
        invocations: 0,
    })
}

fn parser_for(experiment: &ExperimentSpec) -> RecordParser {
    RecordParser::new(ColumnMap::default().with_overrides(&experiment.columns))
}

/// The experiment name prefixes the results directory and every artifact.
fn validate_name(name: &str) -> Result<()> {
    if !is_file_safe(name) {
        return Err(HarnessError::InvalidExperiment(format!(
            "experiment name {name:?} cannot be used in a file name"
        )));
    }
    Ok(())
}

/// Labels name files and legend entries, so they must be unique and usable as
/// a file name component.
fn validate_labels(configurations: &[Configuration]) -> Result<()> {
    if configurations.is_empty() {
        return Err(HarnessError::InvalidExperiment(
            "at least one configuration is required".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for configuration in configurations {
        let label = configuration.label.as_str();
        if !is_file_safe(label) {
            return Err(HarnessError::InvalidExperiment(format!(
                "configuration label {label:?} cannot be used in a file name"
            )));
        }
        if !seen.insert(label) {
            return Err(HarnessError::InvalidExperiment(format!(
                "configuration label '{label}' is used more than once"
            )));
        }
        if configuration.total_stations() == 0 {
            return Err(HarnessError::InvalidExperiment(format!(
                "configuration '{label}' has no stations"
            )));
        }
    }
    Ok(())
}

fn is_file_safe(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.chars().any(|c| matches!(c, '/' | '\\') || c.is_control())
}

/// The experiment's charts, or the default set, checked against the
/// configurations and the column map.
fn chart_requests(
    experiment: &ExperimentSpec,
    configurations: &[Configuration],
    parser: &RecordParser,
) -> Result<Vec<ChartRequest>> {
    let requests = if experiment.charts.is_empty() {
        default_chart_requests(configurations.len())
    } else {
        experiment.charts.clone()
    };
    let mut names: BTreeSet<String> = [bundle::MANIFEST_FILE, bundle::PROVENANCE_FILE]
        .iter()
        .filter_map(|file| Path::new(file).file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .collect();
    for request in &requests {
        let name = series::chart_file_name(request, &experiment.name);
        if !names.insert(name.clone()) {
            return Err(HarnessError::InvalidExperiment(format!(
                "chart file name '{name}' is already taken in the results directory"
            )));
        }
        if let ChartRequest::PerClass {
            configuration: Some(label),
            ..
        } = request
        {
            if !configurations.iter().any(|c| &c.label == label) {
                return Err(HarnessError::UnknownConfiguration(label.clone()));
            }
        }
        if let Some(metric) = request
            .metrics()
            .into_iter()
            .find(|m| parser.columns().column(*m).is_none())
        {
            return Err(HarnessError::InvalidExperiment(format!(
                "no column mapped for metric {metric}"
            )));
        }
        if let Some(name) = request.file_name().filter(|name| !is_file_safe(name)) {
            return Err(HarnessError::InvalidExperiment(format!(
                "chart file name {name:?} is not a plain file name"
            )));
        }
    }
    Ok(requests)
}


#[cfg(test)]
mod tests {
    use super::*;
    use edca_lab_abstract::{ClassPopulation, MetricKind};

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Configured < Stage::Sweeping);
        assert!(Stage::Parsed < Stage::Rendered);
        assert_eq!(Stage::Collecting.to_string(), "collecting");
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let configs = vec![
            Configuration::new(ClassPopulation::new(2, 2, 2, 2)),
            Configuration::new(ClassPopulation::new(2, 2, 2, 2)),
        ];
        let err = validate_labels(&configs).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidExperiment(m) if m.contains("more than once")));
    }

    #[test]
    fn labels_must_be_file_safe() {
        let bad = Configuration::new(ClassPopulation::new(1, 0, 0, 0)).with_label("a/b");
        assert!(validate_labels(&[bad]).is_err());
        assert!(validate_labels(&[]).is_err());
        let empty_mix = Configuration::new(ClassPopulation::default());
        assert!(validate_labels(&[empty_mix]).is_err());
    }

    #[test]
    fn experiment_name_must_be_file_safe() {
        assert!(validate_name("wifi-edca").is_ok());
        for bad in ["acs/run", "", "..", "a\\b"] {
            let err = validate_name(bad).unwrap_err();
            assert!(matches!(err, HarnessError::InvalidExperiment(m) if m.contains("experiment name")));
        }
    }

    #[test]
    fn charts_resolving_to_one_file_are_rejected() {
        let mut experiment = ExperimentSpec::default();
        let comparison = ChartRequest::Comparison {
            metric: "throughput.total".parse().unwrap(),
            file_name: None,
        };
        experiment.charts = vec![comparison.clone(), comparison];
        let configs = experiment.configurations();
        let err = chart_requests(&experiment, &configs, &RecordParser::default()).unwrap_err();
        assert!(
            matches!(&err, HarnessError::InvalidExperiment(m) if m.contains("'wifi-edca-thrp-total-comparison'"))
        );

        experiment.charts = vec![
            ChartRequest::Comparison {
                metric: "throughput.total".parse().unwrap(),
                file_name: Some("same".to_string()),
            },
            ChartRequest::Comparison {
                metric: "e2e_delay.total".parse().unwrap(),
                file_name: Some("same".to_string()),
            },
        ];
        assert!(chart_requests(&experiment, &configs, &RecordParser::default()).is_err());

        experiment.charts = vec![ChartRequest::Comparison {
            metric: "throughput.total".parse().unwrap(),
            file_name: Some("bundle".to_string()),
        }];
        assert!(chart_requests(&experiment, &configs, &RecordParser::default()).is_err());
    }

    #[test]
    fn implicit_and_explicit_per_class_charts_get_distinct_names() {
        let mut experiment = ExperimentSpec::default();
        let per_class = |configuration: Option<&str>| ChartRequest::PerClass {
            kind: MetricKind::Throughput,
            configuration: configuration.map(str::to_string),
            include_total: true,
            file_name: None,
        };
        experiment.charts = vec![per_class(None), per_class(Some("2_BE_2_BK_2_VI_2_VO"))];
        let configs = experiment.configurations();
        let requests = chart_requests(&experiment, &configs, &RecordParser::default()).unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[test]
    fn chart_for_unknown_configuration_fails_early() {
        let mut experiment = ExperimentSpec::default();
        experiment.charts = vec![ChartRequest::PerClass {
            kind: MetricKind::Throughput,
            configuration: Some("missing".to_string()),
            include_total: false,
            file_name: None,
        }];
        let configs = experiment.configurations();
        let err = chart_requests(&experiment, &configs, &RecordParser::default()).unwrap_err();
        assert!(matches!(err, HarnessError::UnknownConfiguration(l) if l == "missing"));
    }

    #[test]
    fn explicit_charts_replace_defaults() {
        let mut experiment = ExperimentSpec::default();
        let configs = experiment.configurations();
        assert_eq!(
            chart_requests(&experiment, &configs, &RecordParser::default())
                .unwrap()
                .len(),
            4
        );
        experiment.charts = vec![ChartRequest::Comparison {
            metric: "success.total".parse().unwrap(),
            file_name: Some("succ".to_string()),
        }];
        let requests = chart_requests(&experiment, &configs, &RecordParser::default()).unwrap();
        assert_eq!(requests, experiment.charts);
    }
}
