use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use edca_lab_abstract::{Configuration, ExperimentParams};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{Invocation, SimulationEngine};
use crate::error::{HarnessError, Result};
use crate::sweep::SweepPoint;

/// A configuration's relocated result file inside the results directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub configuration: String,
    pub path: PathBuf,
    /// Lines moved into `path` so far, one per completed sweep point.
    pub records: usize,
}

/// Moves the engine's shared-name output into per-configuration files.
///
/// Called after every invocation, so the shared file never holds more than one
/// run's output and the next invocation always starts from a clean name.
#[derive(Debug)]
pub struct ResultCollector {
    shared: PathBuf,
    results_dir: PathBuf,
    prefix: String,
    artifacts: Vec<ArtifactHandle>,
}

impl ResultCollector {
    pub fn new(
        shared: impl Into<PathBuf>,
        results_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            shared: shared.into(),
            results_dir: results_dir.into(),
            prefix: prefix.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn shared_path(&self) -> &Path {
        &self.shared
    }

    /// `<results>/<prefix>-<label>.dat`
    pub fn destination_for(&self, configuration: &str) -> PathBuf {
        self.results_dir
            .join(format!("{}-{}.dat", self.prefix, configuration))
    }

    /// Append the shared artifact's lines to the configuration's file and remove it.
    pub fn collect(&mut self, configuration: &str, point: &SweepPoint) -> Result<&ArtifactHandle> {
        if !self.shared.is_file() {
            return Err(HarnessError::ArtifactMissing {
                configuration: configuration.to_string(),
                point: point.index,
                path: self.shared.clone(),
            });
        }

        let content = fs::read_to_string(&self.shared)
            .map_err(|e| HarnessError::io(format!("reading {}", self.shared.display()), e))?;
        let lines = content.lines().filter(|l| !l.trim().is_empty()).count();
        if lines == 0 {
            return Err(HarnessError::EmptyArtifact {
                configuration: configuration.to_string(),
                point: point.index,
                path: self.shared.clone(),
            });
        }
        if lines > 1 {
            warn!(
                "{} held {lines} lines after point {} of '{configuration}'",
                self.shared.display(),
                point.index
            );
        }

        let destination = self.destination_for(configuration);
        // A configuration's first point always starts a new file.
        let first = !self.artifacts.iter().any(|a| a.configuration == configuration);
        let mut options = OpenOptions::new();
        if first {
            options.write(true).create_new(true);
        } else {
            options.append(true);
        }
        let mut file = options
            .open(&destination)
            .map_err(|e| HarnessError::io(format!("opening {}", destination.display()), e))?;
        let mut data = content;
        if !data.ends_with('\n') {
            data.push('\n');
        }
        file.write_all(data.as_bytes())
            .map_err(|e| HarnessError::io(format!("writing {}", destination.display()), e))?;
        fs::remove_file(&self.shared)
            .map_err(|e| HarnessError::io(format!("removing {}", self.shared.display()), e))?;

        info!(
            "Moved result of '{configuration}' point {} to {}",
            point.index,
            destination.display()
        );

        let idx = match self
            .artifacts
            .iter()
            .position(|a| a.configuration == configuration)
        {
            Some(idx) => idx,
            None => {
                self.artifacts.push(ArtifactHandle {
                    configuration: configuration.to_string(),
                    path: destination,
                    records: 0,
                });
                self.artifacts.len() - 1
            }
        };
        self.artifacts[idx].records += lines;
        Ok(&self.artifacts[idx])
    }

    /// Handles in the order configurations were first collected.
    pub fn artifacts(&self) -> &[ArtifactHandle] {
        &self.artifacts
    }

    pub fn into_artifacts(self) -> Vec<ArtifactHandle> {
        self.artifacts
    }
}

/// Engine plus collector behind a single `run(point, configuration)` call.
pub struct EngineSession<'e, E: SimulationEngine + ?Sized> {
    engine: &'e mut E,
    collector: ResultCollector,
    params: ExperimentParams,
    extra: BTreeMap<String, String>,
    invocations: usize,
}

impl<'e, E: SimulationEngine + ?Sized> EngineSession<'e, E> {
    pub fn new(
        engine: &'e mut E,
        results_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        params: ExperimentParams,
        extra: BTreeMap<String, String>,
    ) -> Self {
        let collector = ResultCollector::new(engine.artifact_path(), results_dir, prefix);
        Self {
            engine,
            collector,
            params,
            extra,
            invocations: 0,
        }
    }

    /// Invoke the engine for one point and relocate its output before returning.
    pub fn run(&mut self, point: &SweepPoint, configuration: &Configuration) -> Result<ArtifactHandle> {
        let invocation = Invocation::new(*point, configuration, &self.params, &self.extra);
        self.engine.invoke(&invocation)?;
        self.invocations += 1;
        self.collector
            .collect(&configuration.label, point)
            .cloned()
    }

    pub fn invocations(&self) -> usize {
        self.invocations
    }

    pub fn into_artifacts(self) -> Vec<ArtifactHandle> {
        self.collector.into_artifacts()
    }
}
