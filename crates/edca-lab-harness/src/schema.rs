use std::collections::BTreeMap;

use edca_lab_abstract::{Metric, MetricKind, Scope};

/// Metric name to 0-based field position in an engine result line.
///
/// This is the only place that knows the engine's output layout. When the
/// engine's summary line changes, change [`ColumnMap::edca`] (or override the
/// affected entries from the experiment file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    columns: BTreeMap<Metric, usize>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self::edca()
    }
}

impl ColumnMap {
    /// Layout of the `single-bss-sld-edca` summary line: five groups of
    /// `BE, BK, VI, VO, total`.
    ///
    /// | kind         | columns |
    /// |--------------|---------|
    /// | success      | 0–4     |
    /// | throughput   | 5–9     |
    /// | queue_delay  | 10–14   |
    /// | access_delay | 15–19   |
    /// | e2e_delay    | 20–24   |
    pub fn edca() -> Self {
        let columns = Metric::all()
            .map(|metric| (metric, group_base(metric.kind) + scope_offset(metric.scope)))
            .collect();
        Self { columns }
    }

    pub fn empty() -> Self {
        Self {
            columns: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, metric: Metric, column: usize) -> Self {
        self.columns.insert(metric, column);
        self
    }

    /// Replace the positions of the given metrics, keeping the rest.
    pub fn with_overrides<'a>(mut self, overrides: impl IntoIterator<Item = (&'a Metric, &'a usize)>) -> Self {
        for (metric, column) in overrides {
            self.columns.insert(*metric, *column);
        }
        self
    }

    pub fn column(&self, metric: Metric) -> Option<usize> {
        self.columns.get(&metric).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, usize)> + '_ {
        self.columns.iter().map(|(m, c)| (*m, *c))
    }
}

fn group_base(kind: MetricKind) -> usize {
    match kind {
        MetricKind::SuccessProbability => 0,
        MetricKind::Throughput => 5,
        MetricKind::QueueDelay => 10,
        MetricKind::AccessDelay => 15,
        MetricKind::EndToEndDelay => 20,
    }
}

fn scope_offset(scope: Scope) -> usize {
    match scope {
        Scope::Class(class) => class.offset(),
        Scope::Total => 4,
    }
}
