//! Multi-panel bar/point charts with error bars via plotters.

use std::path::Path;

use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AnalysisConfig;
use crate::data::DataTable;
use crate::error::{PhytostatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotKind {
    Bar,
    Point,
}

/// Encoding specification: column names only, no data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotSpec {
    pub kind: PlotKind,
    pub title: String,
    /// Categorical x-axis column
    pub x: String,
    /// Numeric y column (the point estimate)
    pub y: String,
    /// Optional lower/upper interval columns for error bars
    pub error: Option<(String, String)>,
    /// Optional letter column drawn above each bar/point
    pub letters: Option<String>,
    /// Optional color column; levels map to palette entries, consistently
    /// across facets
    pub color: Option<String>,
    /// Optional facet column; one panel per level
    pub facet: Option<String>,
    pub y_label: String,
}

impl PlotSpec {
    pub fn bar(title: &str, x: &str, y: &str, y_label: &str) -> Self {
        Self {
            kind: PlotKind::Bar,
            title: title.to_string(),
            x: x.to_string(),
            y: y.to_string(),
            error: None,
            letters: None,
            color: None,
            facet: None,
            y_label: y_label.to_string(),
        }
    }

    pub fn with_error(mut self, lower: &str, upper: &str) -> Self {
        self.error = Some((lower.to_string(), upper.to_string()));
        self
    }

    pub fn with_letters(mut self, column: &str) -> Self {
        self.letters = Some(column.to_string());
        self
    }

    pub fn with_color(mut self, column: &str) -> Self {
        self.color = Some(column.to_string());
        self
    }

    pub fn with_facet(mut self, column: &str) -> Self {
        self.facet = Some(column.to_string());
        self
    }
}

struct PanelRow {
    label: String,
    value: f64,
    lower: f64,
    upper: f64,
    letters: String,
    color_idx: usize,
}

/// `color_levels` comes from the unfaceted table so a level keeps its
/// palette entry in every panel.
fn panel_rows(
    table: &DataTable,
    spec: &PlotSpec,
    color_levels: Option<&[String]>,
) -> Result<Vec<PanelRow>> {
    let labels = table.categorical(&spec.x)?;
    let values = table.numeric(&spec.y)?;
    let interval = match &spec.error {
        Some((lo, hi)) => Some((table.numeric(lo)?, table.numeric(hi)?)),
        None => None,
    };
    let letters = match &spec.letters {
        Some(col) => Some(table.categorical(col)?),
        None => None,
    };
    let color = match (&spec.color, color_levels) {
        (Some(col), Some(levels)) => Some((table.categorical(col)?, levels)),
        _ => None,
    };

    Ok((0..table.n_rows())
        .map(|i| PanelRow {
            label: labels[i].clone(),
            value: values[i],
            lower: interval.map(|(lo, _)| lo[i]).unwrap_or(values[i]),
            upper: interval.map(|(_, hi)| hi[i]).unwrap_or(values[i]),
            letters: letters.map(|l| l[i].clone()).unwrap_or_default(),
            color_idx: color
                .as_ref()
                .and_then(|(vals, levels)| levels.iter().position(|l| *l == vals[i]))
                .unwrap_or(i),
        })
        .collect())
}

fn draw_panel(
    area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    title: &str,
    rows: &[PanelRow],
    spec: &PlotSpec,
) -> Result<()> {
    let y_max = rows.iter().map(|r| r.upper).fold(0.0_f64, f64::max) * 1.15;
    let y_min = rows
        .iter()
        .map(|r| r.lower)
        .fold(0.0_f64, f64::min)
        .min(0.0);
    let n = rows.len();

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..n as f64, y_min..y_max)
        .map_err(|e| PhytostatError::Config(format!("chart layout: {}", e)))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc(spec.y_label.clone())
        .x_labels(n)
        .x_label_formatter(&|x| {
            let idx = x.floor() as usize;
            rows.get(idx).map(|r| r.label.clone()).unwrap_or_default()
        })
        .draw()
        .map_err(|e| PhytostatError::Config(format!("mesh: {}", e)))?;

    for (i, row) in rows.iter().enumerate() {
        let x0 = i as f64 + 0.2;
        let x1 = i as f64 + 0.8;
        let xc = i as f64 + 0.5;
        let color = Palette99::pick(row.color_idx).mix(0.8);

        match spec.kind {
            PlotKind::Bar => {
                chart
                    .draw_series(std::iter::once(Rectangle::new(
                        [(x0, 0.0), (x1, row.value)],
                        color.filled(),
                    )))
                    .map_err(|e| PhytostatError::Config(format!("bar: {}", e)))?;
            }
            PlotKind::Point => {
                chart
                    .draw_series(std::iter::once(Circle::new(
                        (xc, row.value),
                        5,
                        color.filled(),
                    )))
                    .map_err(|e| PhytostatError::Config(format!("point: {}", e)))?;
            }
        }

        if spec.error.is_some() {
            // vertical whisker plus caps
            chart
                .draw_series(std::iter::once(PathElement::new(
                    vec![(xc, row.lower), (xc, row.upper)],
                    BLACK.stroke_width(2),
                )))
                .map_err(|e| PhytostatError::Config(format!("whisker: {}", e)))?;
            for bound in [row.lower, row.upper] {
                chart
                    .draw_series(std::iter::once(PathElement::new(
                        vec![(xc - 0.1, bound), (xc + 0.1, bound)],
                        BLACK.stroke_width(2),
                    )))
                    .map_err(|e| PhytostatError::Config(format!("cap: {}", e)))?;
            }
        }

        if !row.letters.is_empty() {
            chart
                .draw_series(std::iter::once(Text::new(
                    row.letters.clone(),
                    (xc, row.upper + (y_max - y_min) * 0.03),
                    ("sans-serif", 16),
                )))
                .map_err(|e| PhytostatError::Config(format!("letters: {}", e)))?;
        }
    }

    Ok(())
}

/// Render the table under the given encoding into a composite figure at
/// `path`. With a facet column the figure holds one panel per facet level.
pub fn render(
    table: &DataTable,
    spec: &PlotSpec,
    path: &Path,
    config: &AnalysisConfig,
) -> Result<()> {
    let (width, height) = config.figure_size;
    let root = BitMapBackend::new(path, (width, height)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| PhytostatError::Config(format!("figure background: {}", e)))?;

    let color_levels = match &spec.color {
        Some(col) => Some(table.levels(col)?),
        None => None,
    };

    match &spec.facet {
        None => {
            let rows = panel_rows(table, spec, color_levels.as_deref())?;
            draw_panel(&root, &spec.title, &rows, spec)?;
        }
        Some(facet_col) => {
            let levels = table.levels(facet_col)?;
            let facet_values = table.categorical(facet_col)?.to_vec();
            let panels = root.split_evenly((1, levels.len()));
            for (panel, level) in panels.iter().zip(&levels) {
                let rows_idx: Vec<usize> = facet_values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| *v == level)
                    .map(|(i, _)| i)
                    .collect();
                let subset = table.select_rows(&rows_idx);
                let rows = panel_rows(&subset, spec, color_levels.as_deref())?;
                let title = format!("{} ({})", spec.title, level);
                draw_panel(panel, &title, &rows, spec)?;
            }
        }
    }

    root.present()
        .map_err(|e| PhytostatError::Config(format!("writing figure: {}", e)))?;
    info!("Wrote figure {}", path.display());
    Ok(())
}
