use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Local};
use edca_lab_abstract::{Configuration, ExperimentSpec};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collector::ArtifactHandle;
use crate::error::{HarnessError, Result};
use crate::sweep::Sweep;

pub const MANIFEST_FILE: &str = "bundle.json";
pub const PROVENANCE_FILE: &str = "git-commit.txt";

const UNKNOWN: &str = "unknown";
const MAX_DIR_ATTEMPTS: usize = 100;

/// `<root>/<name>-YYYYmmdd-HHMMSS`
pub fn timestamped_dir(root: &Path, name: &str, at: DateTime<Local>) -> PathBuf {
    root.join(format!("{name}-{}", at.format("%Y%m%d-%H%M%S")))
}

/// Create a results directory no earlier run owns.
///
/// Runs started within the same second get `-2`, `-3`, ... appended to the
/// timestamped name.
pub fn create_fresh_dir(root: &Path, name: &str, at: DateTime<Local>) -> Result<PathBuf> {
    fs::create_dir_all(root)
        .map_err(|e| HarnessError::io(format!("creating {}", root.display()), e))?;
    let base = timestamped_dir(root, name, at);
    let mut candidate = base.clone();
    for attempt in 2..=MAX_DIR_ATTEMPTS {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let mut next = base.clone().into_os_string();
                next.push(format!("-{attempt}"));
                candidate = PathBuf::from(next);
            }
            Err(e) => {
                return Err(HarnessError::io(format!("creating {}", candidate.display()), e));
            }
        }
    }
    Err(HarnessError::io(
        format!("creating {}", base.display()),
        io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{MAX_DIR_ATTEMPTS} results directories already exist for this second"),
        ),
    ))
}

/// Source-control state of the simulator tree at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub revision: String,
    /// Uncommitted changes were present.
    pub dirty: bool,
}

impl Provenance {
    /// Query git in `dir`. Never fails; anything git cannot answer is `unknown`.
    pub fn capture(dir: &Path) -> Self {
        let revision = git_stdout(dir, &["rev-parse", "HEAD"])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let dirty = git_stdout(dir, &["status", "--porcelain"])
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        Self { revision, dirty }
    }

    pub fn unknown() -> Self {
        Self {
            revision: UNKNOWN.to_string(),
            dirty: false,
        }
    }

    pub fn is_known(&self) -> bool {
        self.revision != UNKNOWN
    }
}

/// Last commit summary with the files it touched, as `git show --name-only` prints it.
pub fn commit_snapshot(dir: &Path) -> String {
    git_stdout(dir, &["show", "--name-only"]).unwrap_or_else(|| format!("{UNKNOWN}\n"))
}

fn git_stdout(dir: &Path, args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout).ok()
            } else {
                None
            }
        })
}

/// Everything one harness execution produced, written once after the sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsBundle {
    pub experiment: ExperimentSpec,
    /// RFC 3339 local time the run started.
    pub created_at: String,
    #[serde(skip)]
    pub results_dir: PathBuf,
    pub sweep: Sweep,
    pub configurations: Vec<Configuration>,
    /// One per configuration, in configuration order. Paths are stored relative
    /// to the results directory.
    pub artifacts: Vec<ArtifactHandle>,
    pub provenance: Provenance,
}

impl ResultsBundle {
    pub fn new(
        experiment: ExperimentSpec,
        created_at: DateTime<Local>,
        results_dir: impl Into<PathBuf>,
        sweep: Sweep,
        configurations: Vec<Configuration>,
        artifacts: Vec<ArtifactHandle>,
        provenance: Provenance,
    ) -> Self {
        Self {
            experiment,
            created_at: created_at.to_rfc3339(),
            results_dir: results_dir.into(),
            sweep,
            configurations,
            artifacts,
            provenance,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.results_dir.join(MANIFEST_FILE)
    }

    pub fn artifact(&self, configuration: &str) -> Option<&ArtifactHandle> {
        self.artifacts.iter().find(|a| a.configuration == configuration)
    }

    /// Write `bundle.json` and the provenance snapshot.
    pub fn write(&self, snapshot: &str) -> Result<()> {
        let mut manifest = self.clone();
        for artifact in &mut manifest.artifacts {
            if let Ok(relative) = artifact.path.strip_prefix(&self.results_dir) {
                artifact.path = relative.to_path_buf();
            }
        }

        let path = self.manifest_path();
        let file = File::create(&path)
            .map_err(|e| HarnessError::io(format!("creating {}", path.display()), e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &manifest).map_err(|source| {
            HarnessError::Json {
                context: path.display().to_string(),
                source,
            }
        })?;

        let provenance = self.results_dir.join(PROVENANCE_FILE);
        fs::write(&provenance, snapshot)
            .map_err(|e| HarnessError::io(format!("writing {}", provenance.display()), e))?;
        if !self.provenance.is_known() {
            warn!("No source revision available; recorded as '{UNKNOWN}'");
        }
        info!("Wrote {}", path.display());
        Ok(())
    }

    /// Load a bundle written by [`ResultsBundle::write`]. Artifact paths are
    /// resolved against `dir`, so a moved results directory still loads.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path)
            .map_err(|e| HarnessError::io(format!("reading {}", path.display()), e))?;
        let mut bundle: ResultsBundle = serde_json::from_str(&content).map_err(|source| {
            HarnessError::Json {
                context: path.display().to_string(),
                source,
            }
        })?;
        bundle.results_dir = dir.to_path_buf();
        for artifact in &mut bundle.artifacts {
            if artifact.path.is_relative() {
                artifact.path = dir.join(&artifact.path);
            }
        }
        Ok(bundle)
    }
}
