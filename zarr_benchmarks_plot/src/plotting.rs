//! Scatter, error-bar and bar plots of a [`BenchmarkTable`].
//!
//! Plots are described by a [`Plot`] and saved under a [`PlotOutput`] as
//! `<plots_dir>/<sub_dir>[/v<zarr_spec>]/<name>_<YYYY-MM-DD>_<machine>.<ext>`.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use thiserror::Error;

use crate::table::{BenchmarkRow, BenchmarkTable, Cell, Column, TableError};

const FONT: &str = "sans-serif";
const TITLE_FONT_SIZE: u32 = 22;
const CAPTION_FONT_SIZE: u32 = 16;
const LABEL_FONT_SIZE: u32 = 13;
const TITLE_HEIGHT: u32 = 40;
const FACET_SIZE: (u32, u32) = (480, 360);
const BAR_PLOT_SIZE: (u32, u32) = (640, 420);

const MIN_RADIUS: f64 = 3.0;
const MAX_RADIUS: f64 = 9.0;
const DEFAULT_RADIUS: f64 = 5.0;

const REFERENCE_LINE_COLOR: RGBColor = RGBColor(128, 128, 128);

/// Colour palette of hue values.
const COLORS: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

/// The category order of blosc shuffle modes on bar plots.
pub const SHUFFLE_ORDER: [&str; 3] = ["noshuffle", "bitshuffle", "shuffle"];

/// A plotting error.
#[derive(Debug, Error)]
pub enum PlotError {
    /// A results or plot directory could not be accessed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// The path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// Drawing failed.
    #[error("failed to draw plot: {0}")]
    Drawing(String),
    /// The plotted rows span zero or several benchmark groups.
    #[error("expected one benchmark group in a plot, found {0:?}")]
    MultipleGroups(Vec<String>),
    /// There are no rows to plot.
    #[error("no rows to plot")]
    EmptyTable,
    /// No row has values in both plotted columns.
    #[error("no rows with values of `{x}` and `{y}`")]
    MissingData {
        /// The x column.
        x: String,
        /// The y column.
        y: String,
    },
    /// The results directory does not hold exactly one machine sub-directory.
    #[error("expected one sub-directory in {path}, found {found}")]
    ResultsSubDir {
        /// The results directory.
        path: PathBuf,
        /// The number of sub-directories.
        found: usize,
    },
    /// A package has no results file.
    #[error("no results of {package} in {path}")]
    NoResults {
        /// The results directory.
        path: PathBuf,
        /// The package.
        package: &'static str,
    },
    /// A results file does not exist.
    #[error("results file {0} does not exist")]
    MissingResults(PathBuf),
    /// A table error.
    #[error(transparent)]
    Table(#[from] TableError),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for PlotError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        Self::Drawing(err.to_string())
    }
}

/// The image format of saved plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlotFormat {
    /// Portable network graphics.
    #[default]
    Png,
    /// Scalable vector graphics.
    Svg,
}

impl PlotFormat {
    /// The file extension.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

impl fmt::Display for PlotFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An unknown plot format.
#[derive(Debug, Clone, Error)]
#[error("unknown plot format {0}, expected svg or png")]
pub struct PlotFormatError(String);

impl FromStr for PlotFormat {
    type Err = PlotFormatError;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            _ => Err(PlotFormatError(format.to_string())),
        }
    }
}

/// Where plots are saved.
#[derive(Debug, Clone)]
pub struct PlotOutput {
    plots_dir: PathBuf,
    format: PlotFormat,
    date: NaiveDate,
    zarr_spec_dir: Option<String>,
}

impl PlotOutput {
    /// Save plots of `format` under `plots_dir`, dated today.
    #[must_use]
    pub fn new(plots_dir: impl Into<PathBuf>, format: PlotFormat) -> Self {
        Self {
            plots_dir: plots_dir.into(),
            format,
            date: chrono::Local::now().date_naive(),
            zarr_spec_dir: None,
        }
    }

    /// Save plots of Zarr version `zarr_spec` in a `v<zarr_spec>` directory below each plot sub-directory.
    ///
    /// Plots of rows without a Zarr version stay in the plot sub-directory.
    #[must_use]
    pub fn with_zarr_spec(mut self, zarr_spec: Option<i64>) -> Self {
        self.zarr_spec_dir = zarr_spec.map(|version| format!("v{version}"));
        self
    }

    /// Set the date in plot file names.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// The plot directory.
    #[must_use]
    pub fn plots_dir(&self) -> &Path {
        &self.plots_dir
    }

    /// The image format.
    #[must_use]
    pub const fn format(&self) -> PlotFormat {
        self.format
    }

    /// The path of plot `plot_name` in `sub_dir` of benchmarks run on `machine`.
    #[must_use]
    pub fn path(&self, sub_dir: &str, plot_name: &str, machine: &str) -> PathBuf {
        let mut dir = self.plots_dir.join(sub_dir);
        if let Some(zarr_spec_dir) = &self.zarr_spec_dir {
            dir.push(zarr_spec_dir);
        }
        dir.join(format!(
            "{plot_name}_{}_{machine}.{}",
            self.date.format("%Y-%m-%d"),
            self.format.extension()
        ))
    }
}

/// The columns and file name of a plot.
#[derive(Debug, Clone, PartialEq)]
pub struct Plot {
    /// The x axis column.
    pub x: Column,
    /// The y axis column.
    pub y: Column,
    /// The column mapped to colour.
    pub hue: Option<Column>,
    /// The column mapped to marker size.
    pub size: Option<Column>,
    /// The column split into facets.
    pub col: Option<Column>,
    /// The figure title.
    pub title: Option<String>,
    /// The sub-directory of the plot directory.
    pub sub_dir: String,
    /// The start of the file name.
    pub name: String,
}

impl Plot {
    /// Plot `y` against `x`, saved as `name` in `sub_dir`.
    #[must_use]
    pub fn new(x: Column, y: Column, sub_dir: &str, name: impl Into<String>) -> Self {
        Self {
            x,
            y,
            hue: None,
            size: None,
            col: None,
            title: None,
            sub_dir: sub_dir.to_string(),
            name: name.into(),
        }
    }

    /// Colour markers or bars by `hue`.
    #[must_use]
    pub fn with_hue(mut self, hue: Column) -> Self {
        self.hue = Some(hue);
        self
    }

    /// Size markers by `size`.
    #[must_use]
    pub fn with_size(mut self, size: Column) -> Self {
        self.size = Some(size);
        self
    }

    /// Split into one facet per value of `col`.
    #[must_use]
    pub fn with_col(mut self, col: Column) -> Self {
        self.col = Some(col);
        self
    }

    /// Set the figure title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    fn file_name(&self) -> String {
        if self.col.is_some() {
            format!("{}_subplots", self.name)
        } else {
            self.name.clone()
        }
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect()
    })
}

/// The axis label of `column` in a plot of benchmark `group`.
///
/// Timing statistics read e.g. `Mean write time (s)`, other columns e.g. `Compression ratio`.
#[must_use]
pub fn axis_label(column: &Column, group: &str) -> String {
    if let Column::Stat(stat) = column {
        format!("{} {group} time (s)", capitalize(stat))
    } else {
        capitalize(&column.name()).replace('_', " ")
    }
}

/// The x and y axis labels of a plot of `table`.
///
/// # Errors
/// Returns [`PlotError::MultipleGroups`] unless every row is of one benchmark group.
pub fn axis_labels(
    table: &BenchmarkTable,
    x: &Column,
    y: &Column,
) -> Result<(String, String), PlotError> {
    let groups = table.unique(&Column::Group);
    match groups.as_slice() {
        [group] => {
            let group = group.to_string();
            Ok((axis_label(x, &group), axis_label(y, &group)))
        }
        _ => Err(PlotError::MultipleGroups(
            groups.iter().map(ToString::to_string).collect(),
        )),
    }
}

/// The number of facet columns before wrapping for `facets` facets.
#[must_use]
pub const fn facet_wrap(facets: usize) -> usize {
    if facets < 3 { 2 } else { 3 }
}

/// Return true if `min..max` spans more than an order of magnitude.
#[must_use]
pub fn use_log_scale(min: f64, max: f64) -> bool {
    min > 0.0 && max / min > 10.0
}

/// Equalize the x limits of facets with data ranges `ranges`.
///
/// Each facet spans the widest facet range around its own midpoint, padded on both sides by a
/// tenth of that range, so error bars of different facets have comparable lengths.
#[must_use]
pub fn facet_x_limits(ranges: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let max_range = ranges
        .iter()
        .map(|(min, max)| max - min)
        .fold(0.0, f64::max);
    let half = max_range / 2.0 + max_range / 10.0;
    ranges
        .iter()
        .map(|(min, max)| {
            let center = (min + max) / 2.0;
            (center - half, center + half)
        })
        .collect()
}

/// The bar categories of `column`, shuffle modes in [`SHUFFLE_ORDER`], other values sorted.
#[must_use]
pub fn category_order(table: &BenchmarkTable, column: &Column) -> Vec<Cell> {
    let mut categories: Vec<Cell> = table
        .unique(column)
        .into_iter()
        .filter(|category| !category.is_missing())
        .collect();
    if *column == Column::BloscShuffle {
        categories.sort_by_key(|category| {
            category
                .as_str()
                .and_then(|name| SHUFFLE_ORDER.iter().position(|shuffle| *shuffle == name))
                .unwrap_or(SHUFFLE_ORDER.len())
        });
    }
    categories
}

fn bounds(values: impl IntoIterator<Item = f64>) -> Option<(f64, f64)> {
    values.into_iter().fold(None, |bounds, value| match bounds {
        Some((min, max)) => Some((f64::min(min, value), f64::max(max, value))),
        None => Some((value, value)),
    })
}

fn padded((min, max): (f64, f64)) -> Range<f64> {
    let pad = if max > min {
        (max - min) * 0.05
    } else if min.abs() < f64::EPSILON {
        0.5
    } else {
        min.abs() * 0.1
    };
    (min - pad)..(max + pad)
}

fn format_tick(value: f64) -> String {
    if !value.is_normal() {
        return format!("{value}");
    }
    let mut decimals: usize = 0;
    let mut scaled = value.abs();
    while scaled < 100.0 && decimals < 6 {
        scaled *= 10.0;
        decimals += 1;
    }
    format!("{value:.decimals$}")
}

fn color(index: usize) -> RGBColor {
    COLORS[index % COLORS.len()]
}

/// The colours of hue values, in sorted order.
fn hue_colors(rows: &[&BenchmarkRow], hue: Option<&Column>) -> Vec<(Cell, RGBColor)> {
    let Some(hue) = hue else {
        return Vec::new();
    };
    let table: BenchmarkTable = rows.iter().map(|row| (*row).clone()).collect();
    table
        .unique(hue)
        .into_iter()
        .enumerate()
        .map(|(index, value)| (value, color(index)))
        .collect()
}

fn row_color(row: &BenchmarkRow, hue: Option<&Column>, colors: &[(Cell, RGBColor)]) -> RGBColor {
    hue.and_then(|hue| {
        let value = row.get(hue);
        colors
            .iter()
            .find(|(hue_value, _)| *hue_value == value)
            .map(|(_, color)| *color)
    })
    .unwrap_or(COLORS[0])
}

fn legend_entries(column: Option<&Column>, colors: &[(Cell, RGBColor)]) -> Vec<(String, RGBColor)> {
    column.map_or_else(Vec::new, |column| {
        colors
            .iter()
            .map(|(value, color)| (format!("{column} = {value}"), *color))
            .collect()
    })
}

/// Something that draws itself on a drawing area of any backend.
trait Figure {
    fn size(&self) -> (u32, u32);

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<(), PlotError>;
}

fn save_figure(figure: &impl Figure, path: &Path, format: PlotFormat) -> Result<(), PlotError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PlotError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    match format {
        PlotFormat::Png => {
            let root = BitMapBackend::new(path, figure.size()).into_drawing_area();
            figure.draw(&root)?;
            root.present()?;
        }
        PlotFormat::Svg => {
            let root = SVGBackend::new(path, figure.size()).into_drawing_area();
            figure.draw(&root)?;
            root.present()?;
        }
    }
    log::info!("saved plot {}", path.display());
    Ok(())
}

fn titled<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    title: Option<&str>,
) -> Result<DrawingArea<DB, Shift>, PlotError> {
    root.fill(&WHITE)?;
    Ok(match title {
        Some(title) => root.titled(title, (FONT, TITLE_FONT_SIZE))?,
        None => root.clone(),
    })
}

struct Marker {
    x: f64,
    y: f64,
    x_span: Option<(f64, f64)>,
    color: RGBColor,
    radius: f64,
}

struct Facet {
    caption: Option<String>,
    markers: Vec<Marker>,
    x_range: Range<f64>,
}

struct ScatterFigure {
    title: Option<String>,
    facets: Vec<Facet>,
    columns: usize,
    y_range: Range<f64>,
    log_x: bool,
    x_label: String,
    y_label: String,
    reference_line: bool,
    legend: Vec<(String, RGBColor)>,
}

impl ScatterFigure {
    fn rows(&self) -> usize {
        self.facets.len().div_ceil(self.columns).max(1)
    }

    fn draw_facet<DB: DrawingBackend>(
        &self,
        panel: &DrawingArea<DB, Shift>,
        facet: &Facet,
        legend: bool,
    ) -> Result<(), PlotError> {
        let mut builder = ChartBuilder::on(panel);
        builder
            .margin(10)
            .x_label_area_size(45)
            .y_label_area_size(65);
        if let Some(caption) = &facet.caption {
            builder.caption(caption, (FONT, CAPTION_FONT_SIZE));
        }
        let mut chart = builder.build_cartesian_2d(facet.x_range.clone(), self.y_range.clone())?;
        let log_x = self.log_x;
        chart
            .configure_mesh()
            .x_desc(self.x_label.as_str())
            .y_desc(self.y_label.as_str())
            .x_label_formatter(&|x| format_tick(if log_x { 10_f64.powf(*x) } else { *x }))
            .y_label_formatter(&|y| format_tick(*y))
            .label_style((FONT, LABEL_FONT_SIZE))
            .axis_desc_style((FONT, LABEL_FONT_SIZE))
            .draw()?;

        if self.reference_line {
            let Range { start, end } = facet.x_range.clone();
            let dash = (end - start) / 60.0;
            chart.draw_series((0..30_u32).map(|index| {
                let x = start + 2.0 * f64::from(index) * dash;
                PathElement::new(
                    vec![(x, 1.0), (x + dash, 1.0)],
                    REFERENCE_LINE_COLOR.stroke_width(1),
                )
            }))?;
        }

        chart.draw_series(facet.markers.iter().filter_map(|marker| {
            let (low, high) = marker.x_span?;
            Some(PathElement::new(
                vec![(low, marker.y), (high, marker.y)],
                marker.color.stroke_width(1),
            ))
        }))?;
        chart.draw_series(
            facet
                .markers
                .iter()
                .map(|marker| Circle::new((marker.x, marker.y), marker.radius, marker.color.filled())),
        )?;

        if legend && !self.legend.is_empty() {
            for (label, color) in &self.legend {
                let color = *color;
                chart
                    .draw_series(std::iter::once(Circle::new(
                        (facet.x_range.start, self.y_range.start),
                        0,
                        color.filled(),
                    )))?
                    .label(label.as_str())
                    .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
            }
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .label_font((FONT, LABEL_FONT_SIZE))
                .draw()?;
        }
        Ok(())
    }
}

impl Figure for ScatterFigure {
    fn size(&self) -> (u32, u32) {
        let columns = u32::try_from(self.columns).unwrap_or(1);
        let rows = u32::try_from(self.rows()).unwrap_or(1);
        let title = if self.title.is_some() { TITLE_HEIGHT } else { 0 };
        (FACET_SIZE.0 * columns, FACET_SIZE.1 * rows + title)
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<(), PlotError> {
        let area = titled(root, self.title.as_deref())?;
        let panels = area.split_evenly((self.rows(), self.columns));
        for (index, (facet, panel)) in self.facets.iter().zip(&panels).enumerate() {
            self.draw_facet(panel, facet, index == 0)?;
        }
        Ok(())
    }
}

/// Rows with numbers in both `x` and `y`.
fn plotted_rows<'a>(table: &'a BenchmarkTable, plot: &Plot) -> Result<Vec<&'a BenchmarkRow>, PlotError> {
    if table.is_empty() {
        return Err(PlotError::EmptyTable);
    }
    let rows: Vec<&BenchmarkRow> = table
        .rows()
        .iter()
        .filter(|row| row.number(&plot.x).is_some() && row.number(&plot.y).is_some())
        .collect();
    if rows.is_empty() {
        return Err(PlotError::MissingData {
            x: plot.x.name(),
            y: plot.y.name(),
        });
    }
    Ok(rows)
}

fn radius_scale(rows: &[&BenchmarkRow], size: Option<&Column>) -> impl Fn(&BenchmarkRow) -> f64 {
    let size = size.cloned();
    let range = size
        .as_ref()
        .and_then(|size| bounds(rows.iter().filter_map(|row| row.number(size))));
    move |row: &BenchmarkRow| match (&size, range) {
        (Some(size), Some((min, max))) if max > min => row.number(size).map_or(DEFAULT_RADIUS, |value| {
            MIN_RADIUS + (MAX_RADIUS - MIN_RADIUS) * (value - min) / (max - min)
        }),
        _ => DEFAULT_RADIUS,
    }
}

/// Split `rows` by the values of `col`, or keep them as one facet.
fn facet_rows<'a>(
    rows: &[&'a BenchmarkRow],
    col: Option<&Column>,
) -> Vec<(Option<String>, Vec<&'a BenchmarkRow>)> {
    let Some(col) = col else {
        return vec![(None, rows.to_vec())];
    };
    let table: BenchmarkTable = rows.iter().map(|row| (*row).clone()).collect();
    table
        .unique(col)
        .into_iter()
        .map(|value| {
            let facet = rows
                .iter()
                .copied()
                .filter(|row| row.get(col) == value)
                .collect();
            (Some(format!("{col} = {value}")), facet)
        })
        .collect()
}

fn scatter_figure(
    table: &BenchmarkTable,
    plot: &Plot,
    errorbars: bool,
) -> Result<ScatterFigure, PlotError> {
    if table.is_empty() {
        return Err(PlotError::EmptyTable);
    }
    let (x_label, y_label) = axis_labels(table, &plot.x, &plot.y)?;
    let rows = plotted_rows(table, plot)?;
    let x_of = |row: &BenchmarkRow| row.number(&plot.x).unwrap_or_default();
    let y_of = |row: &BenchmarkRow| row.number(&plot.y).unwrap_or_default();
    let x_bounds = bounds(rows.iter().map(|row| x_of(row))).ok_or(PlotError::EmptyTable)?;
    let log_x = !errorbars && use_log_scale(x_bounds.0, x_bounds.1);
    let transform = |x: f64| if log_x { x.log10() } else { x };

    let stddev = Column::stat("stddev");
    let x_span = |row: &BenchmarkRow| {
        let x = x_of(row);
        let error = 2.0 * row.number(&stddev).unwrap_or_default();
        (x - error, x + error)
    };

    let colors = hue_colors(&rows, plot.hue.as_ref());
    let radius = radius_scale(&rows, plot.size.as_ref());
    let facet_groups = facet_rows(&rows, plot.col.as_ref());

    let x_ranges: Vec<Range<f64>> = if errorbars {
        let spans: Vec<(f64, f64)> = facet_groups
            .iter()
            .map(|(_, facet)| {
                bounds(facet.iter().flat_map(|row| {
                    let (low, high) = x_span(row);
                    [low, high]
                }))
                .unwrap_or((0.0, 0.0))
            })
            .collect();
        if plot.col.is_some() {
            facet_x_limits(&spans)
                .into_iter()
                .map(|(min, max)| min..max)
                .collect()
        } else {
            spans.into_iter().map(padded).collect()
        }
    } else {
        let shared = padded((transform(x_bounds.0), transform(x_bounds.1)));
        vec![shared; facet_groups.len()]
    };

    let reference_line = plot.x == Column::mean() && plot.y == Column::CompressionRatio;
    let y_values = rows.iter().map(|row| y_of(row));
    let y_bounds = if reference_line {
        bounds(y_values.chain(std::iter::once(1.0)))
    } else {
        bounds(y_values)
    }
    .ok_or(PlotError::EmptyTable)?;

    let facets = facet_groups
        .into_iter()
        .zip(x_ranges)
        .map(|((caption, facet), x_range)| Facet {
            caption,
            markers: facet
                .into_iter()
                .map(|row| Marker {
                    x: transform(x_of(row)),
                    y: y_of(row),
                    x_span: errorbars.then(|| x_span(row)),
                    color: row_color(row, plot.hue.as_ref(), &colors),
                    radius: radius(row),
                })
                .collect(),
            x_range,
        })
        .collect::<Vec<_>>();

    let x_label = if log_x {
        format!("{x_label} (log scale)")
    } else {
        x_label
    };
    let columns = if plot.col.is_some() {
        facet_wrap(facets.len()).min(facets.len()).max(1)
    } else {
        1
    };
    let title = if errorbars {
        Some(plot.title.as_ref().map_or_else(
            || "2 standard deviations errorbars".to_string(),
            |title| format!("{title} - 2 standard deviations errorbars"),
        ))
    } else {
        plot.title.clone()
    };
    Ok(ScatterFigure {
        title,
        facets,
        columns,
        y_range: padded(y_bounds),
        log_x,
        x_label,
        y_label,
        reference_line,
        legend: legend_entries(plot.hue.as_ref(), &colors),
    })
}

fn save_plot(
    table: &BenchmarkTable,
    plot: &Plot,
    output: &PlotOutput,
    figure: &impl Figure,
) -> Result<PathBuf, PlotError> {
    let machine = table.machine().ok_or(PlotError::EmptyTable)?;
    let path = output.path(&plot.sub_dir, &plot.file_name(), machine);
    save_figure(figure, &path, output.format())?;
    Ok(path)
}

/// Scatter `plot.y` against `plot.x`, coloured by `hue`, sized by `size` and split by `col`.
///
/// Facets share their axes, the x axis is logarithmic when it spans more than an order of
/// magnitude and a dashed line marks a compression ratio of 1 on time against ratio plots.
/// Returns the path of the saved plot.
///
/// # Errors
/// Returns a [`PlotError`] if `table` is empty, spans several benchmark groups or the plot cannot be saved.
pub fn plot_relplot(
    table: &BenchmarkTable,
    plot: &Plot,
    output: &PlotOutput,
) -> Result<PathBuf, PlotError> {
    let figure = scatter_figure(table, plot, false)?;
    save_plot(table, plot, output, &figure)
}

/// Scatter `plot.y` against `plot.x` with horizontal error bars of 2 standard deviations.
///
/// When split by `col`, every facet spans the same x range around its own data (see [`facet_x_limits`]).
/// Returns the path of the saved plot.
///
/// # Errors
/// Returns a [`PlotError`] if `table` is empty, spans several benchmark groups or the plot cannot be saved.
pub fn plot_errorbars(
    table: &BenchmarkTable,
    plot: &Plot,
    output: &PlotOutput,
) -> Result<PathBuf, PlotError> {
    let figure = scatter_figure(table, plot, true)?;
    save_plot(table, plot, output, &figure)
}

struct Bar {
    category: usize,
    hue: usize,
    value: f64,
}

struct BarFigure {
    title: Option<String>,
    categories: Vec<String>,
    hues: usize,
    bars: Vec<Bar>,
    y_range: Range<f64>,
    x_label: String,
    y_label: String,
    legend: Vec<(String, RGBColor)>,
}

impl BarFigure {
    fn category_at(&self, x: f64) -> Option<&str> {
        self.categories
            .iter()
            .zip(0_u32..)
            .find(|(_, index)| (x - f64::from(*index)).abs() < 0.3)
            .map(|(category, _)| category.as_str())
    }
}

impl Figure for BarFigure {
    fn size(&self) -> (u32, u32) {
        let title = if self.title.is_some() { TITLE_HEIGHT } else { 0 };
        (BAR_PLOT_SIZE.0, BAR_PLOT_SIZE.1 + title)
    }

    fn draw<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>) -> Result<(), PlotError> {
        let area = titled(root, self.title.as_deref())?;
        let categories = self.categories.len() as f64;
        let mut chart = ChartBuilder::on(&area)
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(65)
            .build_cartesian_2d(-0.5..(categories - 0.5), self.y_range.clone())?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(self.categories.len())
            .x_label_formatter(&|x| self.category_at(*x).unwrap_or_default().to_string())
            .y_label_formatter(&|y| format_tick(*y))
            .x_desc(self.x_label.as_str())
            .y_desc(self.y_label.as_str())
            .label_style((FONT, LABEL_FONT_SIZE))
            .axis_desc_style((FONT, LABEL_FONT_SIZE))
            .draw()?;

        let hues = self.hues.max(1) as f64;
        let bar_width = 0.8 / hues;
        chart.draw_series(self.bars.iter().map(|bar| {
            let offset = (bar.hue as f64 - (hues - 1.0) / 2.0) * bar_width;
            let center = bar.category as f64 + offset;
            Rectangle::new(
                [
                    (center - bar_width / 2.0 + 0.01, self.y_range.start),
                    (center + bar_width / 2.0 - 0.01, bar.value),
                ],
                color(bar.hue).filled(),
            )
        }))?;

        if !self.legend.is_empty() {
            for (label, color) in &self.legend {
                let color = *color;
                chart
                    .draw_series(std::iter::once(Circle::new(
                        (0.0, self.y_range.start),
                        0,
                        color.filled(),
                    )))?
                    .label(label.as_str())
                    .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.filled()));
            }
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .label_font((FONT, LABEL_FONT_SIZE))
                .draw()?;
        }
        Ok(())
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Bar plot of the mean `plot.y` per category of `plot.x`, grouped by `hue`.
///
/// Shuffle modes are ordered as in [`SHUFFLE_ORDER`] and compression ratio bars start at 1.
/// Returns the path of the saved plot.
///
/// # Errors
/// Returns a [`PlotError`] if `table` is empty, spans several benchmark groups or the plot cannot be saved.
pub fn plot_catplot(
    table: &BenchmarkTable,
    plot: &Plot,
    output: &PlotOutput,
) -> Result<PathBuf, PlotError> {
    if table.is_empty() {
        return Err(PlotError::EmptyTable);
    }
    let (x_label, y_label) = axis_labels(table, &plot.x, &plot.y)?;
    let categories = category_order(table, &plot.x);
    let hues = plot
        .hue
        .as_ref()
        .map_or_else(|| vec![Cell::Missing], |hue| table.unique(hue));

    let mut values: HashMap<(usize, usize), Vec<f64>> = HashMap::new();
    for row in table.rows() {
        let Some(value) = row.number(&plot.y) else {
            continue;
        };
        let x = row.get(&plot.x);
        let hue = plot.hue.as_ref().map_or(Cell::Missing, |hue| row.get(hue));
        let category = categories.iter().position(|category| *category == x);
        let hue = hues.iter().position(|value| *value == hue);
        if let (Some(category), Some(hue)) = (category, hue) {
            values.entry((category, hue)).or_default().push(value);
        }
    }
    let mut bars: Vec<Bar> = values
        .into_iter()
        .map(|((category, hue), values)| Bar {
            category,
            hue,
            value: mean(&values),
        })
        .collect();
    bars.sort_by_key(|bar| (bar.category, bar.hue));
    if bars.is_empty() {
        return Err(PlotError::MissingData {
            x: plot.x.name(),
            y: plot.y.name(),
        });
    }

    let bottom = if plot.y == Column::CompressionRatio { 1.0 } else { 0.0 };
    let top = bars.iter().map(|bar| bar.value).fold(bottom, f64::max);
    let top = if top > bottom { top * 1.1 } else { bottom + 1.0 };
    let colors: Vec<(Cell, RGBColor)> = hues
        .iter()
        .enumerate()
        .map(|(index, hue)| (hue.clone(), color(index)))
        .collect();
    let figure = BarFigure {
        title: plot.title.clone(),
        categories: categories.iter().map(ToString::to_string).collect(),
        hues: hues.len(),
        bars,
        y_range: bottom..top,
        x_label,
        y_label,
        legend: legend_entries(plot.hue.as_ref(), &colors),
    };
    save_plot(table, plot, output, &figure)
}
