use std::io;
use std::path::PathBuf;

use edca_lab_abstract::Metric;
use thiserror::Error;

/// Broad failure classes used to pick the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    ArtifactMissing,
    Decode,
    UserAbort,
    Io,
}

/// Why a single result line could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeFailure {
    TooFewFields { needed: usize, found: usize },
    NotNumeric { column: usize, field: String },
}

impl std::fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeFailure::TooFewFields { needed, found } => {
                write!(f, "expected at least {needed} fields, found {found}")
            }
            DecodeFailure::NotNumeric { column, field } => {
                write!(f, "column {column} is not numeric: {field:?}")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid sweep bounds: {0}")]
    InvalidSweep(String),

    #[error("invalid experiment: {0}")]
    InvalidExperiment(String),

    #[error("simulation engine not found at {}", .0.display())]
    EngineNotFound(PathBuf),

    #[error("failed to launch engine {}: {source}", .program.display())]
    EngineLaunch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "engine produced no {} for configuration '{configuration}' at sweep point {point}",
        .path.display()
    )]
    ArtifactMissing {
        configuration: String,
        point: usize,
        path: PathBuf,
    },

    #[error(
        "engine left an empty {} for configuration '{configuration}' at sweep point {point}",
        .path.display()
    )]
    EmptyArtifact {
        configuration: String,
        point: usize,
        path: PathBuf,
    },

    #[error("{}:{line}: {failure}", .path.display())]
    Decode {
        path: PathBuf,
        line: usize,
        failure: DecodeFailure,
    },

    #[error(
        "series '{metric}' for configuration '{configuration}' has {actual} points, sweep has {expected}"
    )]
    LengthMismatch {
        configuration: String,
        metric: Metric,
        expected: usize,
        actual: usize,
    },

    #[error("no configuration labelled '{0}' in this experiment")]
    UnknownConfiguration(String),

    #[error("removal of stale artifact {} declined", .0.display())]
    Declined(PathBuf),

    #[error("interrupted")]
    Interrupted,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON error in {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl HarnessError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        HarnessError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HarnessError::InvalidSweep(_)
            | HarnessError::InvalidExperiment(_)
            | HarnessError::EngineNotFound(_)
            | HarnessError::EngineLaunch { .. }
            | HarnessError::UnknownConfiguration(_) => ErrorKind::Precondition,
            HarnessError::ArtifactMissing { .. } | HarnessError::EmptyArtifact { .. } => {
                ErrorKind::ArtifactMissing
            }
            HarnessError::Decode { .. } | HarnessError::LengthMismatch { .. } => ErrorKind::Decode,
            HarnessError::Declined(_) | HarnessError::Interrupted => ErrorKind::UserAbort,
            HarnessError::Io { .. } | HarnessError::Json { .. } => ErrorKind::Io,
        }
    }

    /// Process exit status for this failure; never zero.
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::Interrupted => 130,
            HarnessError::Declined(_) => 1,
            _ => match self.kind() {
                ErrorKind::Precondition => 2,
                ErrorKind::ArtifactMissing => 3,
                ErrorKind::Decode => 4,
                ErrorKind::Io => 5,
                ErrorKind::UserAbort => 1,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
