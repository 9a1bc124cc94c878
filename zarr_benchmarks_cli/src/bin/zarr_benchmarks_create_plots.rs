//! Create plots from saved benchmark results.

use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::Parser;
use zarr_benchmarks::results::DEFAULT_RESULTS_DIR;
use zarr_benchmarks_plot::plots::{DEFAULT_PLOTS_DIR, PlotOptions, create_all_plots};
use zarr_benchmarks_plot::plotting::PlotFormat;

/// Command-line arguments of the plotter.
#[derive(Parser, Debug)]
#[command(name = "zarr_benchmarks_create_plots")]
#[command(about = "Plot the benchmark results of each storage backend")]
struct Args {
    /// Result ids of the zarr_v2, zarrs and json_spec result files, in that order.
    /// Defaults to the latest result of each package.
    #[arg(long = "json_ids", num_args = 3, value_name = "JSON_ID")]
    json_ids: Option<Vec<u32>>,

    /// Plot the bundled example results
    #[arg(long = "example_results")]
    example_results: bool,

    /// Directory results were saved under
    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    results_dir: PathBuf,

    /// Directory plots are saved to
    #[arg(long, default_value = DEFAULT_PLOTS_DIR)]
    plots_dir: PathBuf,

    /// Image format of the plots: png or svg
    #[arg(long, default_value = "png")]
    format: PlotFormat,
}

type Result<T> = std::result::Result<T, anyhow::Error>;

impl Args {
    fn plot_options(&self) -> Result<PlotOptions> {
        let json_ids = self
            .json_ids
            .as_deref()
            .map(|ids| {
                <[u32; 3]>::try_from(ids)
                    .map_err(|_| anyhow!("expected 3 result ids, got {}", ids.len()))
            })
            .transpose()?;
        Ok(PlotOptions {
            results_dir: self.results_dir.clone(),
            json_ids,
            example_results: self.example_results,
            plots_dir: self.plots_dir.clone(),
            format: self.format,
        })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let options = args.plot_options()?;
    let summary = create_all_plots(&options)
        .with_context(|| format!("creating plots in {}", options.plots_dir.display()))?;
    if summary.saved.is_empty() {
        log::warn!("no plots saved, the results hold no matching benchmarks");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn args() -> std::result::Result<(), Box<dyn std::error::Error>> {
        Args::command().debug_assert();
        let options = Args::try_parse_from(["zarr_benchmarks_create_plots"])?.plot_options()?;
        assert_eq!(options.json_ids, None);
        assert!(!options.example_results);
        assert_eq!(options.format, PlotFormat::Png);
        assert_eq!(options.results_dir, PathBuf::from(DEFAULT_RESULTS_DIR));

        let options = Args::try_parse_from([
            "zarr_benchmarks_create_plots",
            "--json_ids",
            "4",
            "5",
            "6",
            "--format",
            "svg",
        ])?
        .plot_options()?;
        assert_eq!(options.json_ids, Some([4, 5, 6]));
        assert_eq!(options.format, PlotFormat::Svg);

        let options =
            Args::try_parse_from(["zarr_benchmarks_create_plots", "--example_results"])?
                .plot_options()?;
        assert!(options.example_results);

        assert!(
            Args::try_parse_from(["zarr_benchmarks_create_plots", "--json_ids", "1", "2"])
                .is_err()
        );
        Ok(())
    }
}
