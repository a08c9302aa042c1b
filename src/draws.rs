//! Module for visualizing backtest results.
//!
//! The chart compares the portfolio value with a buy-and-hold position on the same bars, both
//! normalized to 1.0 at the first bar.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use plotters::backend::{BitMapBackend, DrawingBackend, SVGBackend};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::WHITE;

use crate::engine::BacktestReport;
use crate::errors::{Error, Result};

/// Aspect ratio for the generated charts.
const ASPECT_RATIO: f64 = 0.5625;
/// Width of the generated charts.
const WIDTH: u32 = 1280;
/// Size of the X-axis labels.
const X_LABEL_SIZE: i32 = 20;
/// Size of the Y-axis labels.
const Y_LABEL_SIZE: i32 = 20;

/// Output formats for the generated charts with output filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawOutput {
    /// Save to the output SVG file.
    Svg(PathBuf),
    /// Save to the output PNG file.
    Png(PathBuf),
}

impl DrawOutput {
    /// Picks the format from the file extension; anything but `.svg` is drawn as PNG.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => Self::Svg(path),
            _ => Self::Png(path),
        }
    }
}

/// Configuration options for chart generation.
#[derive(Debug, Clone)]
pub struct DrawOptions {
    /// Chart title.
    title: Option<String>,
    /// Output format and path.
    output: DrawOutput,
    /// Largest number of points drawn per line.
    max_points: usize,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            title: None,
            output: DrawOutput::Png(PathBuf::from("portfolio.png")),
            max_points: 5_000,
        }
    }
}

impl DrawOptions {
    /// Sets the chart title.
    pub fn title(mut self, title: impl ToString) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Sets the output format and path.
    pub fn draw_output(mut self, output: DrawOutput) -> Self {
        self.output = output;
        self
    }

    /// Sets the largest number of points drawn per line. Longer series are downsampled.
    pub fn max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points.max(2);
        self
    }
}

/// Indices kept when downsampling `len` points to at most about `max_points`, always keeping
/// the first and the last one.
fn downsample(len: usize, max_points: usize) -> Vec<usize> {
    let step = len.div_ceil(max_points.max(1)).max(1);
    let mut indices = (0..len).step_by(step).collect::<Vec<_>>();
    if len > 0 && indices.last() != Some(&(len - 1)) {
        indices.push(len - 1);
    }
    indices
}

type Line = Vec<(DateTime<Utc>, f64)>;

/// Chart drawing utility for backtest visualization.
pub struct Draw<'d> {
    /// Reference to the finished run.
    report: &'d BacktestReport,
    /// Drawing options.
    options: DrawOptions,
}

impl<'d> Draw<'d> {
    /// Creates a new `Draw` instance with the given report.
    pub fn with_report(report: &'d BacktestReport) -> Self {
        Self {
            report,
            options: DrawOptions::default(),
        }
    }

    /// Sets the drawing options.
    pub fn with_options(mut self, options: DrawOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the normalized portfolio and buy-and-hold lines.
    fn lines(&self) -> Result<(Line, Line)> {
        let rows = self.report.rows().collect::<Vec<_>>();
        if rows.len() < 2 {
            return Err(Error::Msg("At least two bars are needed to draw a chart".to_string()));
        }

        let first_equity = rows[0].equity;
        let first_price = rows[0].bar.price();
        Ok(downsample(rows.len(), self.options.max_points)
            .into_iter()
            .map(|i| {
                let row = &rows[i];
                let time = row.bar.timestamp();
                ((time, row.equity / first_equity), (time, row.bar.price() / first_price))
            })
            .unzip())
    }

    /// Generates and saves the chart based on the configured options.
    pub fn plot(&self) -> Result<()> {
        let (portfolio, hold) = self.lines()?;
        let title = self.options.title.as_deref().unwrap_or("Portfolio vs Buy & Hold");
        let height = (WIDTH as f64 * ASPECT_RATIO) as u32;

        match &self.options.output {
            DrawOutput::Svg(path) => self.plot_svg(path, &portfolio, &hold, height, title),
            DrawOutput::Png(path) => self.plot_png(path, &portfolio, &hold, height, title),
        }
    }

    /// Saves the chart as an SVG file.
    fn plot_svg(&self, path: &Path, portfolio: &Line, hold: &Line, height: u32, title: &str) -> Result<()> {
        let root = SVGBackend::new(path, (WIDTH, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| Error::Plotters(e.to_string()))?;
        self.draw_chart(&root, portfolio, hold, title)
    }

    /// Saves the chart as a PNG file.
    fn plot_png(&self, path: &Path, portfolio: &Line, hold: &Line, height: u32, title: &str) -> Result<()> {
        let root = BitMapBackend::new(path, (WIDTH, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| Error::Plotters(e.to_string()))?;
        self.draw_chart(&root, portfolio, hold, title)
    }

    /// Draws both lines with a legend.
    fn draw_chart<DB: DrawingBackend>(
        &self,
        drawing_area: &DrawingArea<DB, Shift>,
        portfolio: &Line,
        hold: &Line,
        title: &str,
    ) -> Result<()> {
        let values = portfolio.iter().chain(hold.iter()).map(|(_, v)| *v);
        let min_value = values.clone().fold(f64::INFINITY, f64::min);
        let max_value = values.fold(f64::NEG_INFINITY, f64::max);
        let padding = ((max_value - min_value) * 0.1).max(0.01);
        let first_time = portfolio.first().ok_or(Error::Msg("Empty line".to_string()))?.0;
        let last_time = portfolio.last().ok_or(Error::Msg("Empty line".to_string()))?.0;

        let area = drawing_area.margin(10, 10, 70, 70);
        let mut chart = ChartBuilder::on(&area)
            .caption(title, ("sans-serif", 30).into_font())
            .x_label_area_size(X_LABEL_SIZE)
            .y_label_area_size(Y_LABEL_SIZE)
            .build_cartesian_2d(first_time..last_time, min_value - padding..max_value + padding)
            .map_err(|e| Error::Plotters(e.to_string()))?;

        chart
            .configure_mesh()
            .x_desc("Time")
            .y_desc("Value (normalized)")
            .x_label_style(("sans-serif", X_LABEL_SIZE))
            .y_label_style(("sans-serif", Y_LABEL_SIZE))
            .x_labels(8)
            .y_labels(5)
            .draw()
            .map_err(|e| Error::Plotters(e.to_string()))?;

        chart
            .draw_series(LineSeries::new(portfolio.iter().copied(), BLUE.stroke_width(2)))
            .map_err(|e| Error::Plotters(e.to_string()))?
            .label("Portfolio")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

        chart
            .draw_series(LineSeries::new(hold.iter().copied(), RED.mix(0.7)))
            .map_err(|e| Error::Plotters(e.to_string()))?
            .label("Buy & Hold")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| Error::Plotters(e.to_string()))?;

        drawing_area.present().map_err(|e| Error::Plotters(e.to_string()))
    }
}

#[cfg(test)]
#[test]
fn downsample_keeps_ends() {
    assert_eq!(downsample(5, 10), vec![0, 1, 2, 3, 4]);
    assert_eq!(downsample(10, 4), vec![0, 3, 6, 9]);
    assert_eq!(downsample(11, 4), vec![0, 3, 6, 9, 10]);
    assert!(downsample(0, 4).is_empty());
    assert!(downsample(20_000, 5_000).len() <= 5_001);
}

#[cfg(test)]
#[test]
fn output_from_extension() {
    assert_eq!(DrawOutput::from_path("a.SVG"), DrawOutput::Svg(PathBuf::from("a.SVG")));
    assert_eq!(DrawOutput::from_path("a.png"), DrawOutput::Png(PathBuf::from("a.png")));
    assert_eq!(DrawOutput::from_path("chart"), DrawOutput::Png(PathBuf::from("chart")));
}

#[cfg(test)]
#[test]
fn normalized_lines() {
    use std::sync::Arc;

    use crate::engine::*;

    let bars = [(100.0, 0), (110.0, 0), (90.0, 0)]
        .into_iter()
        .map(|(price, signal)| Bar::try_from((DateTime::default(), price, signal)).unwrap())
        .collect::<Arc<[Bar]>>();
    let report = run_backtest(bars.clone(), BacktestConfig::default()).unwrap();
    let (portfolio, hold) = Draw::with_report(&report).lines().unwrap();

    assert_eq!(portfolio.iter().map(|p| p.1).collect::<Vec<_>>(), vec![1.0, 1.0, 1.0]);
    assert_eq!(hold.iter().map(|p| p.1).collect::<Vec<_>>(), vec![1.0, 1.1, 0.9]);

    let report = run_backtest(Arc::from(&bars[..1]), BacktestConfig::default()).unwrap();
    assert!(Draw::with_report(&report).plot().is_err());
}
