use std::fs;
use std::path::{Path, PathBuf};

use edca_lab_abstract::Metric;
use tracing::debug;

use crate::error::{DecodeFailure, HarnessError, Result};
use crate::schema::ColumnMap;

const FIELD_DELIMITER: char = ',';

/// One decoded result line. `values[i]` belongs to the i-th requested metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 1-based line number in the artifact.
    pub line: usize,
    pub values: Vec<f64>,
}

/// The requested columns of every line of one artifact, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArtifact {
    pub path: PathBuf,
    metrics: Vec<Metric>,
    records: Vec<Record>,
}

impl ParsedArtifact {
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All values of one metric in line order, or `None` if it was not requested.
    pub fn column(&self, metric: Metric) -> Option<Vec<f64>> {
        let idx = self.metrics.iter().position(|m| *m == metric)?;
        Some(self.records.iter().map(|r| r.values[idx]).collect())
    }
}

/// Decodes engine result files using a [`ColumnMap`].
///
/// Line order is the sweep order: the n-th line is the n-th invocation. There is
/// no index field to check this against, so any line that fails to decode
/// rejects the whole artifact instead of being skipped.
#[derive(Debug, Clone)]
pub struct RecordParser {
    columns: ColumnMap,
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new(ColumnMap::default())
    }
}

impl RecordParser {
    pub fn new(columns: ColumnMap) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn parse_file(&self, path: &Path, metrics: &[Metric]) -> Result<ParsedArtifact> {
        let content = fs::read_to_string(path)
            .map_err(|e| HarnessError::io(format!("reading {}", path.display()), e))?;
        self.parse_str(path, &content, metrics)
    }

    /// Decode `content`; `path` is only used for error messages and the result.
    pub fn parse_str(&self, path: &Path, content: &str, metrics: &[Metric]) -> Result<ParsedArtifact> {
        let positions = metrics
            .iter()
            .map(|m| {
                self.columns.column(*m).ok_or_else(|| {
                    HarnessError::InvalidExperiment(format!("no column mapped for metric {m}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let needed = positions.iter().map(|c| c + 1).max().unwrap_or(0);

        let mut records = Vec::new();
        for (idx, raw) in content.trim_end().lines().enumerate() {
            let line = idx + 1;
            let decode_err = |failure| HarnessError::Decode {
                path: path.to_path_buf(),
                line,
                failure,
            };

            let fields: Vec<&str> = if raw.trim().is_empty() {
                Vec::new()
            } else {
                raw.split(FIELD_DELIMITER).collect()
            };
            if fields.len() < needed {
                return Err(decode_err(DecodeFailure::TooFewFields {
                    needed,
                    found: fields.len(),
                }));
            }

            let values = positions
                .iter()
                .map(|&column| {
                    let field = fields[column].trim();
                    field.parse::<f64>().map_err(|_| {
                        decode_err(DecodeFailure::NotNumeric {
                            column,
                            field: field.to_string(),
                        })
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            records.push(Record { line, values });
        }

        debug!("Decoded {} records from {}", records.len(), path.display());
        Ok(ParsedArtifact {
            path: path.to_path_buf(),
            metrics: metrics.to_vec(),
            records,
        })
    }
}
