use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Style},
    symbols,
    text::Span,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Widget},
};
use tracing::info;

use crate::error::{HarnessError, Result};
use crate::series::ChartDataset;

/// Renders a chart dataset and persists it under a directory.
pub trait ChartEmitter {
    /// Returns the path written.
    fn emit(&self, dataset: &ChartDataset, dir: &Path) -> Result<PathBuf>;
}

/// Which emitters a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartFormat {
    #[default]
    Text,
    Json,
    Both,
}

impl ChartFormat {
    pub fn emitters(self) -> Vec<Box<dyn ChartEmitter>> {
        let mut emitters: Vec<Box<dyn ChartEmitter>> = Vec::new();
        if matches!(self, ChartFormat::Text | ChartFormat::Both) {
            emitters.push(Box::new(TextChartEmitter::default()));
        }
        if matches!(self, ChartFormat::Json | ChartFormat::Both) {
            emitters.push(Box::new(JsonChartEmitter));
        }
        emitters
    }
}

/// Writes the rendering-ready dataset as `<name>.json` for an external plotter.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonChartEmitter;

impl ChartEmitter for JsonChartEmitter {
    fn emit(&self, dataset: &ChartDataset, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("{}.json", dataset.name));
        let file = File::create(&path)
            .map_err(|e| HarnessError::io(format!("creating {}", path.display()), e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), dataset).map_err(|source| {
            HarnessError::Json {
                context: path.display().to_string(),
                source,
            }
        })?;
        info!("Chart written to {}", path.display());
        Ok(path)
    }
}

const PALETTE: [Color; 6] = [
    Color::Cyan,
    Color::Yellow,
    Color::Green,
    Color::Magenta,
    Color::Red,
    Color::Blue,
];

/// Draws the chart off-screen with ratatui and saves the cell grid, followed
/// by the plotted values as a table, to `<name>.txt`.
#[derive(Debug, Clone, Copy)]
pub struct TextChartEmitter {
    pub width: u16,
    pub height: u16,
}

impl Default for TextChartEmitter {
    fn default() -> Self {
        Self {
            width: 100,
            height: 30,
        }
    }
}

impl TextChartEmitter {
    pub fn render(&self, dataset: &ChartDataset) -> String {
        let area = Rect::new(0, 0, self.width, self.height);
        let mut buf = Buffer::empty(area);
        let points = plot_points(dataset);
        chart_widget(dataset, &points).render(area, &mut buf);

        let mut out = String::new();
        for y in 0..area.height {
            let row: String = (0..area.width)
                .filter_map(|x| buf.cell((x, y)).map(|cell| cell.symbol()))
                .collect();
            out.push_str(row.trim_end());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&value_table(dataset));
        out
    }
}

impl ChartEmitter for TextChartEmitter {
    fn emit(&self, dataset: &ChartDataset, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("{}.txt", dataset.name));
        fs::write(&path, self.render(dataset))
            .map_err(|e| HarnessError::io(format!("writing {}", path.display()), e))?;
        info!("Chart written to {}", path.display());
        Ok(path)
    }
}

fn x_position(dataset: &ChartDataset, x: f64) -> f64 {
    if dataset.log_x { x.log10() } else { x }
}

/// `1e-3.5` style tick label for a log10 axis position.
fn exponent_label(position: f64) -> String {
    format!("1e{}", (position * 100.0).round() / 100.0)
}

/// Finite points per series, x already mapped onto the axis scale.
fn plot_points(dataset: &ChartDataset) -> Vec<Vec<(f64, f64)>> {
    dataset
        .series
        .iter()
        .map(|series| {
            dataset
                .x
                .iter()
                .zip(&series.values)
                .map(|(x, y)| (x_position(dataset, *x), *y))
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .collect()
        })
        .collect()
}

fn chart_widget<'a>(dataset: &'a ChartDataset, points: &'a [Vec<(f64, f64)>]) -> Chart<'a> {
    let (x_min, x_max) = bounds(points.iter().flatten().map(|p| p.0));
    let (y_min, y_max) = bounds(points.iter().flatten().map(|p| p.1));
    let y_min = y_min.min(0.0);

    let x_label = |v: f64| {
        if dataset.log_x {
            exponent_label(v)
        } else {
            format!("{v:.2}")
        }
    };
    let x_labels = vec![
        Span::raw(x_label(x_min)),
        Span::raw(x_label((x_min + x_max) / 2.0)),
        Span::raw(x_label(x_max)),
    ];
    let y_labels = vec![
        Span::raw(format!("{y_min:.2}")),
        Span::raw(format!("{:.2}", (y_min + y_max) / 2.0)),
        Span::raw(format!("{y_max:.2}")),
    ];

    let datasets: Vec<Dataset<'a>> = dataset
        .series
        .iter()
        .zip(points)
        .enumerate()
        .map(|(i, (series, pts))| {
            Dataset::default()
                .name(series.label.clone())
                .marker(symbols::Marker::Braille)
                .style(Style::default().fg(PALETTE[i % PALETTE.len()]))
                .graph_type(GraphType::Line)
                .data(pts)
        })
        .collect();

    Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(dataset.title.clone()))
        .hidden_legend_constraints((Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)))
        .x_axis(
            Axis::default()
                .title(dataset.x_label.clone())
                .bounds([x_min, x_max])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .title(dataset.y_label.clone())
                .bounds([y_min, y_max])
                .labels(y_labels),
        )
}

/// Min and max of `values`, widened so the axis never collapses.
fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        (0.0, 1.0)
    } else if (hi - lo).abs() < f64::EPSILON {
        (lo, lo + 1.0)
    } else {
        (lo, hi)
    }
}

fn value_table(dataset: &ChartDataset) -> String {
    let header: String = std::iter::once(format!("{:>12}", dataset.x_label))
        .chain(dataset.series.iter().map(|s| format!(" {:>14}", s.label)))
        .collect();
    let rows = dataset.x.iter().enumerate().map(|(i, x)| {
        let position = x_position(dataset, *x);
        let label = if dataset.log_x {
            exponent_label(position)
        } else {
            format!("{position:.4}")
        };
        std::iter::once(format!("{label:>12}"))
            .chain(dataset.series.iter().map(|s| {
                format!(" {:>14.4}", s.values.get(i).copied().unwrap_or(f64::NAN))
            }))
            .collect::<String>()
    });
    let mut out = std::iter::once(header).chain(rows).collect::<Vec<_>>().join("\n");
    out.push('\n');
    out
}
