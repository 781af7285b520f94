use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;

use edca_lab_abstract::{Configuration, EngineSpec, ExperimentParams, TrafficClass};
use tracing::{debug, info, warn};

use crate::error::{HarnessError, Result};
use crate::sweep::SweepPoint;

/// Parameters for one engine run: a single sweep point of a single configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub configuration: String,
    pub point: SweepPoint,
    parameters: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(
        point: SweepPoint,
        configuration: &Configuration,
        params: &ExperimentParams,
        extra: &BTreeMap<String, String>,
    ) -> Self {
        let population = &configuration.population;
        let mut parameters = vec![
            ("rngRun".to_string(), params.seed.to_string()),
            ("payloadSize".to_string(), params.payload_size.to_string()),
            ("perSldLambda".to_string(), point.intensity.to_string()),
            ("nSld".to_string(), configuration.total_stations().to_string()),
        ];
        for class in TrafficClass::ALL {
            parameters.push((format!("n{}", class.short_name()), population.count(class).to_string()));
        }
        if let Some(mode) = configuration.mode {
            parameters.push(("trafficType".to_string(), mode.selector().to_string()));
        }
        for (key, value) in extra {
            parameters.push((key.clone(), value.clone()));
        }

        Self {
            configuration: configuration.label.clone(),
            point,
            parameters,
        }
    }

    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `<scenario> --key=value ...`, passed to the launcher as one argument.
    pub fn scenario_line(&self, scenario: &str) -> String {
        let mut line = scenario.to_string();
        for (key, value) in &self.parameters {
            line.push_str(&format!(" --{key}={value}"));
        }
        line
    }
}

/// A black-box simulator that appends one result line to a shared file per run.
pub trait SimulationEngine {
    /// Path of the shared-name artifact the engine writes.
    fn artifact_path(&self) -> PathBuf;

    /// Fail fast if the engine cannot be launched at all.
    fn check_available(&self) -> Result<()> {
        Ok(())
    }

    /// Run one point to completion. Success is judged by the artifact, not the exit status.
    fn invoke(&mut self, invocation: &Invocation) -> Result<()>;
}

/// Runs the engine as a child process and blocks until it exits.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    spec: EngineSpec,
}

impl ProcessEngine {
    pub fn new(spec: EngineSpec) -> Self {
        Self { spec }
    }

    pub fn builder() -> ProcessEngineBuilder {
        ProcessEngineBuilder::new()
    }

    pub fn spec(&self) -> &EngineSpec {
        &self.spec
    }

    /// Relative paths with a directory part are taken from the engine's working
    /// directory; bare names are left for `PATH` lookup.
    fn resolved_program(&self) -> PathBuf {
        let program = &self.spec.program;
        if program.is_relative() && program.components().count() > 1 {
            self.spec.working_dir.join(program)
        } else {
            program.clone()
        }
    }
}

impl SimulationEngine for ProcessEngine {
    fn artifact_path(&self) -> PathBuf {
        self.spec.working_dir.join(&self.spec.artifact)
    }

    fn check_available(&self) -> Result<()> {
        if !self.spec.working_dir.is_dir() {
            return Err(HarnessError::EngineNotFound(self.spec.working_dir.clone()));
        }
        let program = self.resolved_program();
        if program.components().count() > 1 && !program.exists() {
            return Err(HarnessError::EngineNotFound(program));
        }
        Ok(())
    }

    fn invoke(&mut self, invocation: &Invocation) -> Result<()> {
        let program = self.resolved_program();
        let line = invocation.scenario_line(&self.spec.scenario);
        info!(
            "Running '{}' point {} (lambda={})",
            invocation.configuration, invocation.point.index, invocation.point.intensity
        );
        debug!("{} {} '{}'", program.display(), self.spec.launcher_args.join(" "), line);

        let status = Command::new(&program)
            .args(&self.spec.launcher_args)
            .arg(&line)
            .current_dir(&self.spec.working_dir)
            .status()
            .map_err(|source| HarnessError::EngineLaunch {
                program: program.clone(),
                source,
            })?;

        if !status.success() {
            warn!(
                "Engine exited with {status} for '{}' point {}",
                invocation.configuration, invocation.point.index
            );
        }
        Ok(())
    }
}

/// Builder for [`ProcessEngine`], starting from the default ns-3 layout.
pub struct ProcessEngineBuilder {
    spec: EngineSpec,
}

impl Default for ProcessEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEngineBuilder {
    pub fn new() -> Self {
        Self {
            spec: EngineSpec::default(),
        }
    }

    pub fn spec(mut self, spec: EngineSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.spec.program = program.into();
        self
    }

    pub fn launcher_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.launcher_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn scenario(mut self, scenario: impl Into<String>) -> Self {
        self.spec.scenario = scenario.into();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.working_dir = dir.into();
        self
    }

    pub fn artifact(mut self, name: impl Into<String>) -> Self {
        self.spec.artifact = name.into();
        self
    }

    /// Build and verify the engine is reachable.
    pub fn build(self) -> Result<ProcessEngine> {
        let engine = ProcessEngine::new(self.spec);
        engine.check_available()?;
        Ok(engine)
    }
}
