use edca_lab_abstract::{ChartRequest, Metric, MetricKind};
use serde::{Deserialize, Serialize};

use crate::collector::ArtifactHandle;
use crate::error::{HarnessError, Result};
use crate::parser::RecordParser;
use crate::sweep::Sweep;

/// Values of one metric for one configuration, one per sweep point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub configuration: String,
    pub metric: Metric,
    /// Legend entry.
    pub label: String,
    pub values: Vec<f64>,
}

/// Everything a renderer needs for one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataset {
    /// File stem for emitted artifacts.
    pub name: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub log_x: bool,
    pub x: Vec<f64>,
    pub series: Vec<MetricSeries>,
}

/// Charts rendered when the experiment does not list any.
///
/// A single configuration gets per-class charts; several get comparisons of the
/// aggregate columns.
pub fn default_chart_requests(configurations: usize) -> Vec<ChartRequest> {
    const KINDS: [MetricKind; 4] = [
        MetricKind::Throughput,
        MetricKind::EndToEndDelay,
        MetricKind::AccessDelay,
        MetricKind::QueueDelay,
    ];
    if configurations <= 1 {
        KINDS
            .into_iter()
            .map(|kind| ChartRequest::PerClass {
                kind,
                configuration: None,
                include_total: kind == MetricKind::Throughput,
                file_name: None,
            })
            .collect()
    } else {
        KINDS
            .into_iter()
            .map(|kind| ChartRequest::Comparison {
                metric: Metric::total(kind),
                file_name: None,
            })
            .collect()
    }
}

fn file_stem(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::SuccessProbability => "succ-pr",
        MetricKind::Throughput => "thrp",
        MetricKind::QueueDelay => "queue-delay",
        MetricKind::AccessDelay => "acc-delay",
        MetricKind::EndToEndDelay => "delay",
    }
}

/// File stem a chart request is written under: its `file_name`, or one
/// derived from the prefix, the metric and (for an explicit configuration) the label.
pub fn chart_file_name(request: &ChartRequest, prefix: &str) -> String {
    if let Some(name) = request.file_name() {
        return name.to_string();
    }
    match request {
        ChartRequest::PerClass {
            kind,
            configuration: Some(label),
            ..
        } => format!("{prefix}-{label}-{}", file_stem(*kind)),
        ChartRequest::PerClass { kind, .. } => format!("{prefix}-{}", file_stem(*kind)),
        ChartRequest::Comparison { metric, .. } => {
            format!("{prefix}-{}-{}-comparison", file_stem(metric.kind), metric.scope.name())
        }
    }
}

/// Aligns decoded artifact columns with the sweep axis.
///
/// Every series it returns has exactly `sweep.len()` values; a short or long
/// artifact is an error naming the configuration, never padded or truncated.
pub struct MetricSeriesBuilder<'a> {
    sweep: &'a Sweep,
    parser: &'a RecordParser,
}

impl<'a> MetricSeriesBuilder<'a> {
    pub fn new(sweep: &'a Sweep, parser: &'a RecordParser) -> Self {
        Self { sweep, parser }
    }

    /// Several metrics of a single configuration (e.g. the four class throughputs plus total).
    pub fn per_metric(&self, artifact: &ArtifactHandle, metrics: &[Metric]) -> Result<Vec<MetricSeries>> {
        let parsed = self.parser.parse_file(&artifact.path, metrics)?;
        metrics
            .iter()
            .map(|metric| {
                let values = parsed.column(*metric).unwrap_or_default();
                self.aligned(&artifact.configuration, *metric, metric.legend(), values)
            })
            .collect()
    }

    /// One metric for each configuration, in the order given.
    pub fn across_configurations(
        &self,
        artifacts: &[ArtifactHandle],
        metric: Metric,
    ) -> Result<Vec<MetricSeries>> {
        artifacts
            .iter()
            .map(|artifact| {
                let parsed = self.parser.parse_file(&artifact.path, &[metric])?;
                let values = parsed.column(metric).unwrap_or_default();
                self.aligned(&artifact.configuration, metric, artifact.configuration.clone(), values)
            })
            .collect()
    }

    /// Resolve a chart request against the collected artifacts.
    pub fn chart(&self, request: &ChartRequest, artifacts: &[ArtifactHandle], prefix: &str) -> Result<ChartDataset> {
        match request {
            ChartRequest::PerClass {
                kind, configuration, ..
            } => {
                let artifact = match configuration {
                    Some(label) => artifacts
                        .iter()
                        .find(|a| &a.configuration == label)
                        .ok_or_else(|| HarnessError::UnknownConfiguration(label.clone()))?,
                    None => artifacts.first().ok_or_else(|| {
                        HarnessError::InvalidExperiment("no artifacts to chart".to_string())
                    })?,
                };
                let series = self.per_metric(artifact, &request.metrics())?;
                let name = chart_file_name(request, prefix);
                Ok(self.dataset(name, format!("{} vs. Offered Load", kind.title()), *kind, series))
            }
            ChartRequest::Comparison { metric, .. } => {
                let series = self.across_configurations(artifacts, *metric)?;
                let name = chart_file_name(request, prefix);
                let title = format!("{} {} Comparison", metric.legend(), metric.kind.title());
                Ok(self.dataset(name, title, metric.kind, series))
            }
        }
    }

    fn dataset(&self, name: String, title: String, kind: MetricKind, series: Vec<MetricSeries>) -> ChartDataset {
        ChartDataset {
            name,
            title,
            x_label: "Lambda".to_string(),
            y_label: kind.axis_label(),
            log_x: true,
            x: self.sweep.intensities(),
            series,
        }
    }

    fn aligned(&self, configuration: &str, metric: Metric, label: String, values: Vec<f64>) -> Result<MetricSeries> {
        if values.len() != self.sweep.len() {
            return Err(HarnessError::LengthMismatch {
                configuration: configuration.to_string(),
                metric,
                expected: self.sweep.len(),
                actual: values.len(),
            });
        }
        Ok(MetricSeries {
            configuration: configuration.to_string(),
            metric,
            label,
            values,
        })
    }
}
