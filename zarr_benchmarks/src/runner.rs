//! Benchmark execution.
//!
//! Every [`BenchmarkFunction`] is parametrized over the loaded configurations and timed against one
//! [`StorageBackend`] in pedantic mode: a setup step runs before each round and only the target is timed.

use std::hint::black_box;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::backend::{BackendError, StorageBackend, WriteOptions};
use crate::compressor::{Compressor, CompressorError, CompressorFamily};
use crate::config::{BenchmarkConfig, ParamValue, ParameterCombination, parametrize};
use crate::image::Image;
use crate::results::{BenchmarkGroup, BenchmarkOptions, BenchmarkRecord};
use crate::stats::Statistics;
use crate::utils::remove_output_dir;
use crate::{ZarrSpec, ZarrSpecError};

/// The default number of timed rounds.
pub const DEFAULT_ROUNDS: usize = 3;

/// The default number of untimed warm-up rounds.
pub const DEFAULT_WARMUP_ROUNDS: usize = 1;

/// The default path benchmark arrays are written to.
pub const DEFAULT_STORE_PATH: &str = "data/output/temp-benchmarks.zarr";

/// A benchmark runner error.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A benchmark failed.
    #[error("benchmark {name} failed: {source}")]
    Benchmark {
        /// The benchmark name.
        name: String,
        /// The underlying error.
        source: BackendError,
    },
    /// A parameter combination does not describe a valid compressor.
    #[error(transparent)]
    Compressor(#[from] CompressorError),
    /// A parameter combination has an invalid Zarr version.
    #[error(transparent)]
    ZarrSpec(#[from] ZarrSpecError),
    /// A chunk size is not positive.
    #[error("invalid chunk size {0}")]
    InvalidChunkSize(i64),
    /// No timed rounds were requested.
    #[error("at least one timed round is required")]
    NoRounds,
}

/// A parametrized benchmark function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkFunction {
    /// The function name.
    pub name: &'static str,
    /// Whether the function times writes or reads.
    pub group: BenchmarkGroup,
    /// The compressor family.
    pub family: CompressorFamily,
    /// The parameters the function declares.
    pub params: &'static [&'static str],
}

impl BenchmarkFunction {
    /// The declared parameters, other than `zarr_spec`, that `config` does not define.
    ///
    /// Only configurations defining all of them are parametrized for this function.
    #[must_use]
    pub fn missing_params(&self, config: &BenchmarkConfig) -> Vec<&'static str> {
        self.params
            .iter()
            .copied()
            .filter(|&name| name != "zarr_spec" && config.values(name).is_none())
            .collect()
    }
}

const BLOSC_PARAMS: &[&str] = &[
    "chunk_size",
    "blosc_clevel",
    "blosc_shuffle",
    "blosc_cname",
    "zarr_spec",
];
const GZIP_PARAMS: &[&str] = &["chunk_size", "gzip_level", "zarr_spec"];
const ZSTD_PARAMS: &[&str] = &["chunk_size", "zstd_level", "zarr_spec"];
const NO_COMPRESSOR_PARAMS: &[&str] = &["chunk_size", "no_compressor", "zarr_spec"];

macro_rules! benchmark_function {
    ($name:literal, $group:ident, $family:ident, $params:ident) => {
        BenchmarkFunction {
            name: $name,
            group: BenchmarkGroup::$group,
            family: CompressorFamily::$family,
            params: $params,
        }
    };
}

/// Every benchmark function, writes then reads for each compressor family.
pub const BENCHMARK_FUNCTIONS: [BenchmarkFunction; 8] = [
    benchmark_function!("test_write_blosc", Write, Blosc, BLOSC_PARAMS),
    benchmark_function!("test_write_gzip", Write, Gzip, GZIP_PARAMS),
    benchmark_function!("test_write_zstd", Write, Zstd, ZSTD_PARAMS),
    benchmark_function!("test_write_no_compressor", Write, None, NO_COMPRESSOR_PARAMS),
    benchmark_function!("test_read_blosc", Read, Blosc, BLOSC_PARAMS),
    benchmark_function!("test_read_gzip", Read, Gzip, GZIP_PARAMS),
    benchmark_function!("test_read_zstd", Read, Zstd, ZSTD_PARAMS),
    benchmark_function!("test_read_no_compressor", Read, None, NO_COMPRESSOR_PARAMS),
];

/// Timing options of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// The number of timed rounds.
    pub rounds: usize,
    /// The number of untimed warm-up rounds.
    pub warmup_rounds: usize,
    /// The path arrays are written to.
    pub store_path: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            warmup_rounds: DEFAULT_WARMUP_ROUNDS,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

/// Times a target over warm-up and timed rounds.
#[derive(Debug, Clone, Copy)]
pub struct Benchmark {
    rounds: usize,
    warmup_rounds: usize,
}

impl Benchmark {
    /// Create a benchmark with `rounds` timed rounds after `warmup_rounds` untimed rounds.
    #[must_use]
    pub const fn new(rounds: usize, warmup_rounds: usize) -> Self {
        Self {
            rounds,
            warmup_rounds,
        }
    }

    /// Run `setup` then `target` for every round, returning the durations of the timed `target` calls.
    ///
    /// # Errors
    /// Returns the first error of `setup` or `target`.
    pub fn pedantic<E>(
        &self,
        mut setup: impl FnMut() -> Result<(), E>,
        mut target: impl FnMut() -> Result<(), E>,
    ) -> Result<Vec<Duration>, E> {
        for _ in 0..self.warmup_rounds {
            setup()?;
            target()?;
        }
        let mut durations = Vec::with_capacity(self.rounds);
        for _ in 0..self.rounds {
            setup()?;
            let start = Instant::now();
            target()?;
            durations.push(start.elapsed());
        }
        Ok(durations)
    }
}

/// The records of a run and the number of skipped combinations.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// The benchmark records, in execution order.
    pub records: Vec<BenchmarkRecord>,
    /// The number of skipped combinations and functions.
    pub skipped: usize,
}

fn param_json(value: &ParamValue) -> Value {
    match value {
        ParamValue::Bool(value) => Value::Bool(*value),
        ParamValue::Int(value) => Value::from(*value),
        ParamValue::Str(value) => Value::from(value.as_str()),
    }
}

/// Runs benchmark functions against one backend and image.
pub struct Runner<'a> {
    backend: &'a dyn StorageBackend,
    image: &'a Image,
    options: RunOptions,
}

impl<'a> Runner<'a> {
    /// Create a runner.
    #[must_use]
    pub fn new(backend: &'a dyn StorageBackend, image: &'a Image, options: RunOptions) -> Self {
        Self {
            backend,
            image,
            options,
        }
    }

    /// Run every benchmark function over the parameter combinations of `configs`.
    ///
    /// # Errors
    /// Returns a [`RunnerError`] if a combination is invalid or a benchmark fails.
    pub fn run(&self, configs: &[BenchmarkConfig]) -> Result<RunOutcome, RunnerError> {
        if self.options.rounds == 0 {
            return Err(RunnerError::NoRounds);
        }
        let mut outcome = RunOutcome::default();
        for function in &BENCHMARK_FUNCTIONS {
            let configured: Vec<BenchmarkConfig> = configs
                .iter()
                .filter(|config| function.missing_params(config).is_empty())
                .cloned()
                .collect();
            if configured.is_empty() {
                let missing = configs
                    .first()
                    .map(|config| function.missing_params(config))
                    .unwrap_or_default();
                log::info!(
                    "skipping {}: {} not configured",
                    function.name,
                    missing.join(", ")
                );
                outcome.skipped += 1;
                continue;
            }
            let Some(combinations) = parametrize(function.params, &configured) else {
                log::info!("skipping {}: no configured parameters", function.name);
                outcome.skipped += 1;
                continue;
            };
            for combination in &combinations {
                match self.run_combination(function, combination)? {
                    Some(record) => outcome.records.push(record),
                    None => outcome.skipped += 1,
                }
            }
        }
        Ok(outcome)
    }

    fn run_combination(
        &self,
        function: &BenchmarkFunction,
        combination: &ParameterCombination,
    ) -> Result<Option<BenchmarkRecord>, RunnerError> {
        let name = format!("{}[{}]", function.name, combination.id());
        let spec = match combination.get_int("zarr_spec") {
            Some(version) => ZarrSpec::from_version(version)?,
            None => self.backend.default_spec(),
        };
        if !self.backend.supports(spec) {
            log::info!("skipping {name}: {} does not support zarr {spec}", self.backend.package());
            return Ok(None);
        }
        if function.family == CompressorFamily::None
            && combination.get_bool("no_compressor") == Some(false)
        {
            log::info!("skipping {name}: no_compressor is false");
            return Ok(None);
        }

        let chunk_size = combination
            .get_int("chunk_size")
            .ok_or(CompressorError::MissingParameter("chunk_size"))?;
        let chunk_edge = u64::try_from(chunk_size)
            .ok()
            .filter(|&edge| edge > 0)
            .ok_or(RunnerError::InvalidChunkSize(chunk_size))?;
        let compressor = Compressor::from_combination(function.family, combination)?;
        let write_options = WriteOptions::new(
            vec![chunk_edge; self.image.shape().len()],
            compressor,
            spec,
        );

        log::info!("running {name} with {}", self.backend.package());
        let mut extra_info = Map::new();
        let durations = match function.group {
            BenchmarkGroup::Write => self.time_write(&write_options),
            BenchmarkGroup::Read => self.time_read(&write_options, &mut extra_info),
        }
        .map_err(|source| RunnerError::Benchmark {
            name: name.clone(),
            source,
        })?;
        let stats = Statistics::from_durations(&durations).ok_or(RunnerError::NoRounds)?;
        log::debug!("{name}: mean {:.6} s, stddev {:.6} s", stats.mean, stats.stddev);

        Ok(Some(BenchmarkRecord {
            group: function.group,
            fullname: format!("{}::{name}", self.backend.package()),
            name,
            params: combination
                .iter()
                .map(|(key, value)| (key.to_string(), param_json(value)))
                .collect(),
            param: combination.id(),
            extra_info,
            options: BenchmarkOptions {
                timer: "std::time::Instant".to_string(),
                warmup: self.options.warmup_rounds,
                rounds: self.options.rounds,
                pedantic: true,
            },
            stats,
        }))
    }

    fn benchmark(&self) -> Benchmark {
        Benchmark::new(self.options.rounds, self.options.warmup_rounds)
    }

    fn time_write(&self, options: &WriteOptions) -> Result<Vec<Duration>, BackendError> {
        let path = &self.options.store_path;
        let options = options.clone().with_overwrite(false);
        self.benchmark().pedantic(
            || Ok(remove_output_dir(path)?),
            || self.backend.write_array(self.image, path, &options),
        )
    }

    fn time_read(
        &self,
        options: &WriteOptions,
        extra_info: &mut Map<String, Value>,
    ) -> Result<Vec<Duration>, BackendError> {
        let path = &self.options.store_path;
        self.backend
            .write_array(self.image, path, &options.clone().with_overwrite(true))?;
        let ratio = self.backend.compression_ratio(path, options.zarr_spec)?;
        extra_info.insert("compression_ratio".to_string(), Value::from(ratio));
        self.benchmark().pedantic(
            || Ok(()),
            || {
                black_box(self.backend.read_array(path, options.zarr_spec)?);
                Ok(())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pedantic_rounds() {
        let mut setups = 0;
        let mut targets = 0;
        let durations = Benchmark::new(3, 2)
            .pedantic::<()>(
                || {
                    setups += 1;
                    Ok(())
                },
                || {
                    targets += 1;
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(durations.len(), 3);
        assert_eq!(setups, 5);
        assert_eq!(targets, 5);
    }

    #[test]
    fn pedantic_error() {
        let mut calls = 0;
        let result = Benchmark::new(3, 0).pedantic(
            || Ok(()),
            || {
                calls += 1;
                if calls == 2 { Err("failed") } else { Ok(()) }
            },
        );
        assert_eq!(result, Err("failed"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn missing_params() -> Result<(), Box<dyn std::error::Error>> {
        let config = BenchmarkConfig::from_json_str(r#"{"chunk_size": [64], "gzip_level": 1}"#)?;
        let [write_blosc, write_gzip, ..] = BENCHMARK_FUNCTIONS;
        assert_eq!(
            write_blosc.missing_params(&config),
            ["blosc_clevel", "blosc_shuffle", "blosc_cname"]
        );
        assert!(write_gzip.missing_params(&config).is_empty());
        Ok(())
    }

    #[test]
    fn benchmark_functions_declare_chunk_size() {
        assert_eq!(BENCHMARK_FUNCTIONS.len(), 8);
        for function in BENCHMARK_FUNCTIONS {
            assert_eq!(function.params.first(), Some(&"chunk_size"));
            assert_eq!(function.params.last(), Some(&"zarr_spec"));
        }
    }
}
