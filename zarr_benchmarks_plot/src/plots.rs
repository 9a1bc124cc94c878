//! The plot suites of a benchmark run.
//!
//! [`create_all_plots`] reads the results of every storage backend package and renders
//! - error-bar plots of time against compression ratio per package,
//! - scatter plots comparing all packages,
//! - chunk size plots and blosc shuffle plots.
//!
//! Results of Zarr V2 and V3 arrays are plotted separately, in `v2` and `v3` directories below each plot
//! sub-directory.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use zarr_benchmarks::backend::BackendKind;
use zarr_benchmarks::results::DEFAULT_RESULTS_DIR;

use crate::plotting::{
    Plot, PlotError, PlotFormat, PlotOutput, plot_catplot, plot_errorbars, plot_relplot,
};
use crate::table::{BenchmarkRow, BenchmarkTable, Column};

/// The default directory plots are saved to.
pub const DEFAULT_PLOTS_DIR: &str = "data/plots";

/// The directory of bundled example results.
#[must_use]
pub fn example_results_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("example_results")
}

/// Which results to plot and where to save plots.
#[derive(Debug, Clone)]
pub struct PlotOptions {
    /// The results directory, holding one `<system>-<machine>` sub-directory.
    pub results_dir: PathBuf,
    /// The result ids of the `zarr_v2`, `zarrs` and `json_spec` files, else the latest file of each package.
    pub json_ids: Option<[u32; 3]>,
    /// Plot the bundled example results instead of `results_dir`.
    pub example_results: bool,
    /// The plot directory.
    pub plots_dir: PathBuf,
    /// The image format.
    pub format: PlotFormat,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            json_ids: None,
            example_results: false,
            plots_dir: PathBuf::from(DEFAULT_PLOTS_DIR),
            format: PlotFormat::default(),
        }
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> PlotError + '_ {
    move |source| PlotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The only sub-directory of `results_dir`.
fn results_sub_dir(results_dir: &Path) -> Result<PathBuf, PlotError> {
    let mut sub_dirs = Vec::new();
    for entry in std::fs::read_dir(results_dir).map_err(io_err(results_dir))? {
        let path = entry.map_err(io_err(results_dir))?.path();
        if path.is_dir() {
            sub_dirs.push(path);
        }
    }
    match <[PathBuf; 1]>::try_from(sub_dirs) {
        Ok([sub_dir]) => Ok(sub_dir),
        Err(sub_dirs) => Err(PlotError::ResultsSubDir {
            path: results_dir.to_path_buf(),
            found: sub_dirs.len(),
        }),
    }
}

/// The id of `file_name` if it is a `<id>_<package>.json` results file.
fn package_file_id(file_name: &str, package: &str) -> Option<u32> {
    let id = file_name.strip_suffix(".json")?.strip_suffix(package)?.strip_suffix('_')?;
    if id.is_empty() || !id.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

/// The results file of `package` in `dir` with the highest id.
fn latest_result_file(dir: &Path, package: &'static str) -> Result<PathBuf, PlotError> {
    let mut latest: Option<(u32, PathBuf)> = None;
    for entry in std::fs::read_dir(dir).map_err(io_err(dir))? {
        let path = entry.map_err(io_err(dir))?.path();
        let Some(id) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| package_file_id(name, package))
        else {
            continue;
        };
        if path.is_file() && latest.as_ref().is_none_or(|(latest_id, _)| id > *latest_id) {
            latest = Some((id, path));
        }
    }
    latest.map(|(_, path)| path).ok_or_else(|| PlotError::NoResults {
        path: dir.to_path_buf(),
        package,
    })
}

/// Resolve the results file of each package.
///
/// Results are read from the bundled examples with `example_results`, else from the single
/// machine sub-directory of `results_dir`. Files are `<id>_<package>.json`: with `json_ids`, the
/// ids of `zarr_v2`, `zarrs` and `json_spec` in order, else the highest id of each package.
///
/// # Errors
/// Returns a [`PlotError`] if the directory layout is unexpected or a results file does not exist.
pub fn result_files(options: &PlotOptions) -> Result<Vec<(&'static str, PathBuf)>, PlotError> {
    let dir = if options.example_results {
        example_results_dir()
    } else {
        results_sub_dir(&options.results_dir)?
    };
    BackendKind::ALL
        .iter()
        .enumerate()
        .map(|(index, kind)| {
            let package = kind.package();
            let path = match options.json_ids {
                Some(ids) => dir.join(format!("{:04}_{package}.json", ids[index])),
                None => latest_result_file(&dir, package)?,
            };
            if path.is_file() {
                Ok((package, path))
            } else {
                Err(PlotError::MissingResults(path))
            }
        })
        .collect()
}

/// The plots saved and skipped by a [`PlotSuite`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlotSummary {
    /// The paths of saved plots.
    pub saved: Vec<PathBuf>,
    /// The number of plots without data.
    pub skipped: usize,
}

enum PlotKind {
    Relplot,
    Errorbars,
    Catplot,
}

/// Renders plots of selections of a table, skipping selections without data.
#[derive(Debug)]
pub struct PlotSuite<'a> {
    output: &'a PlotOutput,
    summary: PlotSummary,
}

impl<'a> PlotSuite<'a> {
    /// Create a suite saving plots to `output`.
    #[must_use]
    pub fn new(output: &'a PlotOutput) -> Self {
        Self {
            output,
            summary: PlotSummary::default(),
        }
    }

    /// The saved and skipped plots.
    #[must_use]
    pub fn finish(self) -> PlotSummary {
        self.summary
    }

    fn render(
        &mut self,
        table: &BenchmarkTable,
        plot: &Plot,
        kind: &PlotKind,
    ) -> Result<(), PlotError> {
        let result = match kind {
            PlotKind::Relplot => plot_relplot(table, plot, self.output),
            PlotKind::Errorbars => plot_errorbars(table, plot, self.output),
            PlotKind::Catplot => plot_catplot(table, plot, self.output),
        };
        match result {
            Ok(path) => {
                self.summary.saved.push(path);
                Ok(())
            }
            Err(err @ (PlotError::EmptyTable | PlotError::MissingData { .. })) => {
                log::warn!("skipping plot {}/{}: {err}", plot.sub_dir, plot.name);
                self.summary.skipped += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Scatter plot, see [`plot_relplot`].
    ///
    /// # Errors
    /// Returns a [`PlotError`] if a plot with data fails.
    pub fn relplot(&mut self, table: &BenchmarkTable, plot: &Plot) -> Result<(), PlotError> {
        self.render(table, plot, &PlotKind::Relplot)
    }

    /// Error-bar plot, see [`plot_errorbars`].
    ///
    /// # Errors
    /// Returns a [`PlotError`] if a plot with data fails.
    pub fn errorbars(&mut self, table: &BenchmarkTable, plot: &Plot) -> Result<(), PlotError> {
        self.render(table, plot, &PlotKind::Errorbars)
    }

    /// Bar plot, see [`plot_catplot`].
    ///
    /// # Errors
    /// Returns a [`PlotError`] if a plot with data fails.
    pub fn catplot(&mut self, table: &BenchmarkTable, plot: &Plot) -> Result<(), PlotError> {
        self.render(table, plot, &PlotKind::Catplot)
    }
}

fn group(table: &BenchmarkTable, group: &str) -> BenchmarkTable {
    table.filter(|row| row.group == group)
}

fn is_blosc_zstd_level3(row: &BenchmarkRow) -> bool {
    row.compressor() == "blosc-zstd" && row.compression_level() == Some(3)
}

fn time_against_ratio(sub_dir: &str, name: String) -> Plot {
    Plot::new(Column::mean(), Column::CompressionRatio, sub_dir, name)
}

/// Error-bar plots of write and read time against compression ratio of one package.
///
/// # Errors
/// Returns a [`PlotError`] if a plot with data fails.
pub fn read_write_plots_for_package(
    suite: &mut PlotSuite<'_>,
    table: &BenchmarkTable,
    package: &str,
) -> Result<(), PlotError> {
    let package_rows = table.filter(|row| row.package == package);
    for sub_dir in ["write", "read"] {
        let rows = group(&package_rows, sub_dir);
        let all_name = format!("{package}_chunk_size_all");
        suite.errorbars(
            &rows,
            &time_against_ratio(sub_dir, all_name.clone())
                .with_hue(Column::Compressor)
                .with_size(Column::CompressionLevel)
                .with_col(Column::ChunkSize)
                .with_title(all_name),
        )?;

        let chunks_128 = rows.filter(|row| row.chunk_size == Some(128));
        let name_128 = format!("{package}_chunk_size128");
        suite.errorbars(
            &chunks_128,
            &time_against_ratio(sub_dir, name_128.clone())
                .with_hue(Column::Compressor)
                .with_size(Column::CompressionLevel)
                .with_title(name_128.clone()),
        )?;
        suite.errorbars(
            &chunks_128,
            &time_against_ratio(sub_dir, name_128).with_col(Column::Compressor),
        )?;
    }
    Ok(())
}

/// Read and write plots of chunk sizes 64 and 128, leaving out blosc without byte shuffle.
///
/// Per package error-bar plots, then scatter plots of every package at chunk size 128.
///
/// # Errors
/// Returns a [`PlotError`] if a plot with data fails.
pub fn read_write_plots(suite: &mut PlotSuite<'_>, table: &BenchmarkTable) -> Result<(), PlotError> {
    let read_write = table.filter(|row| {
        matches!(row.chunk_size, Some(64 | 128))
            && !matches!(row.blosc_shuffle.as_deref(), Some("noshuffle" | "bitshuffle"))
    });
    for kind in BackendKind::ALL {
        read_write_plots_for_package(suite, &read_write, kind.package())?;
    }
    for sub_dir in ["read", "write"] {
        let chunks_128 = group(&read_write, sub_dir).filter(|row| row.chunk_size == Some(128));
        suite.relplot(
            &chunks_128,
            &time_against_ratio(sub_dir, "all_packages".to_string())
                .with_col(Column::Package)
                .with_hue(Column::Compressor)
                .with_size(Column::CompressionLevel),
        )?;
    }
    Ok(())
}

/// Compression ratio and time against chunk size of blosc-zstd level 3 with byte shuffle.
///
/// # Errors
/// Returns a [`PlotError`] if a plot with data fails.
pub fn chunk_size_plots(suite: &mut PlotSuite<'_>, table: &BenchmarkTable) -> Result<(), PlotError> {
    const SUB_DIR: &str = "chunk_size";
    let chunk_size = table.filter(|row| {
        is_blosc_zstd_level3(row) && row.blosc_shuffle.as_deref() == Some("shuffle")
    });
    let write = group(&chunk_size, "write");
    let read = group(&chunk_size, "read");

    suite.relplot(
        &read,
        &Plot::new(Column::ChunkSize, Column::CompressionRatio, SUB_DIR, "compression_ratio")
            .with_col(Column::Package),
    )?;
    for (rows, name) in [(&write, "write"), (&read, "read")] {
        suite.relplot(
            rows,
            &Plot::new(Column::ChunkSize, Column::mean(), SUB_DIR, name).with_col(Column::Package),
        )?;
        suite.relplot(
            rows,
            &Plot::new(Column::ChunkSize, Column::mean(), SUB_DIR, name)
                .with_hue(Column::Package)
                .with_title(format!("chunk_size_{name}_all")),
        )?;
    }
    Ok(())
}

/// Compression ratio and time per blosc shuffle mode of blosc-zstd level 3 at chunk size 128.
///
/// # Errors
/// Returns a [`PlotError`] if a plot with data fails.
pub fn shuffle_plots(suite: &mut PlotSuite<'_>, table: &BenchmarkTable) -> Result<(), PlotError> {
    const SUB_DIR: &str = "shuffle";
    let shuffle = table.filter(|row| is_blosc_zstd_level3(row) && row.chunk_size == Some(128));
    let write = group(&shuffle, "write");
    let read = group(&shuffle, "read");

    let by_shuffle = |y: Column, name: &str| {
        Plot::new(Column::BloscShuffle, y, SUB_DIR, name).with_hue(Column::Package)
    };
    suite.catplot(&read, &by_shuffle(Column::CompressionRatio, "compression_ratio"))?;
    suite.catplot(&write, &by_shuffle(Column::mean(), "write"))?;
    suite.catplot(&read, &by_shuffle(Column::mean(), "read"))?;
    Ok(())
}

/// Create every plot of the results selected by `options`.
///
/// # Errors
/// Returns a [`PlotError`] if the results cannot be read or a plot with data fails.
pub fn create_all_plots(options: &PlotOptions) -> Result<PlotSummary, PlotError> {
    let files = result_files(options)?;
    for (package, path) in &files {
        log::info!("plotting {package} results from {}", path.display());
    }
    let table = BenchmarkTable::from_packages(&files)?;
    let output = PlotOutput::new(&options.plots_dir, options.format);

    let mut summary = PlotSummary::default();
    let zarr_specs = table.rows().iter().map(|row| row.zarr_spec).sorted().dedup();
    for zarr_spec in zarr_specs {
        let spec_table = table.filter(|row| row.zarr_spec == zarr_spec);
        let spec_output = output.clone().with_zarr_spec(zarr_spec);
        let mut suite = PlotSuite::new(&spec_output);
        read_write_plots(&mut suite, &spec_table)?;
        chunk_size_plots(&mut suite, &spec_table)?;
        shuffle_plots(&mut suite, &spec_table)?;
        let spec_summary = suite.finish();
        summary.saved.extend(spec_summary.saved);
        summary.skipped += spec_summary.skipped;
    }
    log::info!(
        "saved {} plots to {}, skipped {} without data",
        summary.saved.len(),
        output.plots_dir().display(),
        summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_file_per_package() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        for name in [
            "0001_zarr_v2.json",
            "0002_zarrs.json",
            "0003_json_spec.json",
            "0004_zarrs.json",
            "0005_zarrs.json",
            "0006_json_spec.json",
            "0010_v2.json",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), "{}")?;
        }
        assert_eq!(
            latest_result_file(dir.path(), "zarr_v2")?,
            dir.path().join("0001_zarr_v2.json")
        );
        assert_eq!(latest_result_file(dir.path(), "zarrs")?, dir.path().join("0005_zarrs.json"));
        assert_eq!(
            latest_result_file(dir.path(), "json_spec")?,
            dir.path().join("0006_json_spec.json")
        );

        let only_zarrs = tempfile::TempDir::new()?;
        std::fs::write(only_zarrs.path().join("0001_zarrs.json"), "{}")?;
        assert!(matches!(
            latest_result_file(only_zarrs.path(), "zarr_v2"),
            Err(PlotError::NoResults { package: "zarr_v2", .. })
        ));
        Ok(())
    }

    #[test]
    fn package_file_ids() {
        assert_eq!(package_file_id("0003_zarrs.json", "zarrs"), Some(3));
        assert_eq!(package_file_id("0012_zarr_v2.json", "zarr_v2"), Some(12));
        assert_eq!(package_file_id("0012_zarr_v2.json", "v2"), None);
        assert_eq!(package_file_id("0003_zarrs.json", "json_spec"), None);
        assert_eq!(package_file_id("_zarrs.json", "zarrs"), None);
    }

    #[test]
    fn result_files_latest_per_package() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let machine = dir.path().join("Linux-x86_64");
        std::fs::create_dir(&machine)?;
        // zarrs was run twice after the others
        for name in [
            "0001_zarr_v2.json",
            "0002_json_spec.json",
            "0003_zarrs.json",
            "0004_zarrs.json",
        ] {
            std::fs::write(machine.join(name), "{}")?;
        }
        let options = PlotOptions {
            results_dir: dir.path().to_path_buf(),
            ..PlotOptions::default()
        };
        assert_eq!(
            result_files(&options)?,
            [
                ("zarr_v2", machine.join("0001_zarr_v2.json")),
                ("zarrs", machine.join("0004_zarrs.json")),
                ("json_spec", machine.join("0002_json_spec.json")),
            ]
        );
        Ok(())
    }

    #[test]
    fn results_need_one_sub_dir() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        assert!(matches!(
            results_sub_dir(dir.path()),
            Err(PlotError::ResultsSubDir { found: 0, .. })
        ));
        std::fs::create_dir(dir.path().join("Linux-x86_64"))?;
        assert_eq!(results_sub_dir(dir.path())?, dir.path().join("Linux-x86_64"));
        std::fs::create_dir(dir.path().join("Darwin-arm64"))?;
        assert!(matches!(
            results_sub_dir(dir.path()),
            Err(PlotError::ResultsSubDir { found: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn result_files_by_id() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let machine = dir.path().join("Linux-x86_64");
        std::fs::create_dir(&machine)?;
        for name in ["0007_zarr_v2.json", "0002_zarrs.json", "0003_json_spec.json"] {
            std::fs::write(machine.join(name), "{}")?;
        }
        let options = PlotOptions {
            results_dir: dir.path().to_path_buf(),
            json_ids: Some([7, 2, 3]),
            ..PlotOptions::default()
        };
        let files = result_files(&options)?;
        assert_eq!(files[0], ("zarr_v2", machine.join("0007_zarr_v2.json")));
        assert_eq!(files[2].0, "json_spec");

        let missing = PlotOptions {
            json_ids: Some([1, 2, 3]),
            ..options
        };
        assert!(matches!(
            result_files(&missing),
            Err(PlotError::MissingResults(path)) if path.ends_with("0001_zarr_v2.json")
        ));
        Ok(())
    }
}
