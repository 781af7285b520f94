use crate::traffic::TrafficClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five per-run statistics the engine reports for each access category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "success")]
    SuccessProbability,
    #[serde(rename = "throughput")]
    Throughput,
    #[serde(rename = "queue_delay")]
    QueueDelay,
    #[serde(rename = "access_delay")]
    AccessDelay,
    #[serde(rename = "e2e_delay")]
    EndToEndDelay,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::SuccessProbability,
        MetricKind::Throughput,
        MetricKind::QueueDelay,
        MetricKind::AccessDelay,
        MetricKind::EndToEndDelay,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            MetricKind::SuccessProbability => "success",
            MetricKind::Throughput => "throughput",
            MetricKind::QueueDelay => "queue_delay",
            MetricKind::AccessDelay => "access_delay",
            MetricKind::EndToEndDelay => "e2e_delay",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            MetricKind::SuccessProbability => "Success Probability",
            MetricKind::Throughput => "Throughput",
            MetricKind::QueueDelay => "Queue Delay",
            MetricKind::AccessDelay => "Access Delay",
            MetricKind::EndToEndDelay => "End-to-End Delay",
        }
    }

    /// Axis label including the unit the engine reports in.
    pub fn axis_label(self) -> String {
        match self {
            MetricKind::SuccessProbability => self.title().to_string(),
            MetricKind::Throughput => format!("{} (Mbps)", self.title()),
            _ => format!("{} (ms)", self.title()),
        }
    }

    fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }
}

/// Either one access category or the aggregate over all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Class(TrafficClass),
    Total,
}

impl Scope {
    pub const ALL: [Scope; 5] = [
        Scope::Class(TrafficClass::BestEffort),
        Scope::Class(TrafficClass::Background),
        Scope::Class(TrafficClass::Video),
        Scope::Class(TrafficClass::Voice),
        Scope::Total,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scope::Class(class) => class.short_name(),
            Scope::Total => "total",
        }
    }
}

/// A named result column, written as `<kind>.<scope>` (e.g. `throughput.total`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Metric {
    pub kind: MetricKind,
    pub scope: Scope,
}

impl Metric {
    pub fn new(kind: MetricKind, scope: Scope) -> Self {
        Self { kind, scope }
    }

    pub fn class(kind: MetricKind, class: TrafficClass) -> Self {
        Self::new(kind, Scope::Class(class))
    }

    pub fn total(kind: MetricKind) -> Self {
        Self::new(kind, Scope::Total)
    }

    /// Every metric the engine reports, kind-major.
    pub fn all() -> impl Iterator<Item = Metric> {
        MetricKind::ALL
            .into_iter()
            .flat_map(|kind| Scope::ALL.into_iter().map(move |scope| Metric::new(kind, scope)))
    }

    /// Short legend label: the class name, or `Total`.
    pub fn legend(&self) -> String {
        match self.scope {
            Scope::Class(class) => class.short_name().to_string(),
            Scope::Total => "Total".to_string(),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.slug(), self.scope.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMetricError(String);

impl fmt::Display for ParseMetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown metric '{}'; expected <kind>.<scope> with kind in \
             success|throughput|queue_delay|access_delay|e2e_delay and scope in BE|BK|VI|VO|total",
            self.0
        )
    }
}

impl std::error::Error for ParseMetricError {}

impl FromStr for Metric {
    type Err = ParseMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMetricError(s.to_string());
        let (kind, scope) = s.split_once('.').ok_or_else(err)?;
        let kind = MetricKind::from_slug(kind).ok_or_else(err)?;
        let scope = if scope.eq_ignore_ascii_case("total") {
            Scope::Total
        } else {
            Scope::Class(TrafficClass::from_short_name(scope).ok_or_else(err)?)
        };
        Ok(Metric::new(kind, scope))
    }
}

impl TryFrom<String> for Metric {
    type Error = ParseMetricError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Metric> for String {
    fn from(metric: Metric) -> Self {
        metric.to_string()
    }
}
