//! Run the Zarr storage backend benchmarks and save their results.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use zarr_benchmarks::backend::{BackendKind, create_backend};
use zarr_benchmarks::config::{ConfigSelection, DEFAULT_CONFIGS_DIR, DEV_CONFIG, load_configs};
use zarr_benchmarks::image::{ImageKind, cache_dir, load_image};
use zarr_benchmarks::results::{BenchmarkResults, DEFAULT_RESULTS_DIR, save_results};
use zarr_benchmarks::runner::{
    DEFAULT_ROUNDS, DEFAULT_STORE_PATH, DEFAULT_WARMUP_ROUNDS, RunOptions, Runner,
};
use zarr_benchmarks::utils::remove_output_dir;

/// Command-line arguments of the benchmark runner.
#[derive(Parser, Debug)]
#[command(name = "zarr_benchmarks_run")]
#[command(about = "Benchmark Zarr array writes and reads of each storage backend")]
struct Args {
    /// Configuration name in the configs directory, or `all` for every configuration except dev
    #[arg(long, default_value = DEV_CONFIG)]
    config: ConfigSelection,

    /// Directory of benchmark configurations
    #[arg(long, default_value = DEFAULT_CONFIGS_DIR)]
    configs_dir: PathBuf,

    /// Image to benchmark: dev, heart or dense
    #[arg(long, default_value = "dev", value_parser = parse_image)]
    image: ImageKind,

    /// Benchmark the generated dev image, whatever `--image` says
    #[arg(long)]
    dev_image: bool,

    /// Number of timed rounds
    #[arg(long, default_value_t = DEFAULT_ROUNDS)]
    rounds: usize,

    /// Number of untimed warm-up rounds
    #[arg(long, default_value_t = DEFAULT_WARMUP_ROUNDS)]
    warmup_rounds: usize,

    /// Storage backend to benchmark, repeat for several
    #[arg(long = "backend", default_values_t = BackendKind::ALL)]
    backends: Vec<BackendKind>,

    /// Path arrays are written to during benchmarks
    #[arg(long, default_value = DEFAULT_STORE_PATH)]
    store_path: PathBuf,

    /// Directory results are saved under
    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    results_dir: PathBuf,

    /// Seed of the dev image
    #[arg(long)]
    seed: Option<u64>,
}

fn parse_image(image: &str) -> std::result::Result<ImageKind, String> {
    image.parse().map_err(|err: zarr_benchmarks::image::ImageError| err.to_string())
}

type Result<T> = std::result::Result<T, anyhow::Error>;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let configs = load_configs(&args.configs_dir, &args.config)
        .with_context(|| format!("loading configurations from {}", args.configs_dir.display()))?;
    let image_kind = if args.dev_image {
        ImageKind::Dev
    } else {
        args.image
    };
    let image = load_image(image_kind, cache_dir().as_deref(), args.seed)?;
    log::info!(
        "benchmarking {image_kind} image of shape {:?} ({} bytes)",
        image.shape(),
        image.nbytes()
    );

    let options = RunOptions {
        rounds: args.rounds,
        warmup_rounds: args.warmup_rounds,
        store_path: args.store_path.clone(),
    };
    let mut backends: Vec<BackendKind> = Vec::new();
    for kind in &args.backends {
        if !backends.contains(kind) {
            backends.push(*kind);
        }
    }
    for kind in backends {
        let backend = create_backend(kind);
        let outcome = Runner::new(backend.as_ref(), &image, options.clone())
            .run(&configs)
            .with_context(|| format!("benchmarking {kind}"))?;
        log::info!(
            "{kind}: {} benchmarks, {} skipped",
            outcome.records.len(),
            outcome.skipped
        );
        let results = BenchmarkResults::new(outcome.records);
        save_results(&args.results_dir, backend.package(), &results)?;
    }

    remove_output_dir(&args.store_path)
        .with_context(|| format!("removing {}", args.store_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn args() -> std::result::Result<(), clap::Error> {
        Args::command().debug_assert();
        let args = Args::try_parse_from(["zarr_benchmarks_run"])?;
        assert_eq!(args.config, ConfigSelection::Named(DEV_CONFIG.to_string()));
        assert_eq!(args.backends, BackendKind::ALL);
        assert_eq!(args.rounds, DEFAULT_ROUNDS);

        let args = Args::try_parse_from([
            "zarr_benchmarks_run",
            "--config",
            "all",
            "--backend",
            "zarrs",
            "--backend",
            "zarr-v2",
            "--image",
            "heart",
            "--warmup-rounds",
            "0",
        ])?;
        assert_eq!(args.config, ConfigSelection::All);
        assert_eq!(args.backends, [BackendKind::Zarrs, BackendKind::ZarrV2]);
        assert_eq!(args.image, ImageKind::Heart);
        assert_eq!(args.warmup_rounds, 0);
        assert!(Args::try_parse_from(["zarr_benchmarks_run", "--image", "lung"]).is_err());
        Ok(())
    }
}
