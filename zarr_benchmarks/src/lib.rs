//! Read/write and compression benchmarks of Zarr storage backends.
//!
//! The crate turns declarative benchmark configurations into parameter combinations, runs each
//! combination against a [`StorageBackend`](backend::StorageBackend) and saves the timings as
//! `pytest-benchmark` compatible JSON.
//!
//! ## Pipeline
//! 1. [`config`]: load JSON configurations, expand `{"min": a, "max": b}` ranges and
//!    [`parametrize`](config::parametrize) a benchmark function over the Cartesian product of its parameters.
//! 2. [`backend`]: the storage backends. Each translates a backend-agnostic [`Compressor`](compressor::Compressor)
//!    into its native codec description and writes/reads a whole [`Image`](image::Image).
//! 3. [`runner`]: time writes and reads over a number of rounds after untimed warm-up rounds.
//! 4. [`results`]: persist [`BenchmarkResults`](results::BenchmarkResults) under `data/results`.
//!
//! ## Example
//! ```no_run
//! # use zarr_benchmarks::{backend::{BackendKind, create_backend}, config::{ConfigSelection, load_configs}};
//! # use zarr_benchmarks::{image::Image, runner::{RunOptions, Runner}};
//! let configs = load_configs("zarr_benchmarks/configs".as_ref(), &ConfigSelection::Named("dev".into()))?;
//! let backend = create_backend(BackendKind::Zarrs);
//! let image = Image::dev(Some(0));
//! let runner = Runner::new(backend.as_ref(), &image, RunOptions::default());
//! let outcome = runner.run(&configs)?;
//! println!("{} benchmarks, {} skipped", outcome.records.len(), outcome.skipped);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Logging
//! Progress, skipped combinations and result paths are reported through the [`log`] crate.

#![warn(clippy::wildcard_enum_match_arm)]

pub mod backend;
pub mod compressor;
pub mod config;
pub mod image;
pub mod results;
pub mod runner;
pub mod stats;
pub mod utils;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The Zarr format version an array is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ZarrSpec {
    /// Zarr V2.
    V2,
    /// Zarr V3.
    V3,
}

/// An unsupported Zarr format version.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported zarr format version {0}, expected 2 or 3")]
pub struct ZarrSpecError(String);

impl ZarrSpec {
    /// Every supported Zarr format version.
    pub const ALL: [Self; 2] = [Self::V2, Self::V3];

    /// Return the Zarr format version as an integer.
    #[must_use]
    pub const fn version(self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }

    /// Create from an integer Zarr format version.
    ///
    /// # Errors
    /// Returns [`ZarrSpecError`] if `version` is not 2 or 3.
    pub fn from_version(version: i64) -> Result<Self, ZarrSpecError> {
        match version {
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            _ => Err(ZarrSpecError(version.to_string())),
        }
    }
}

impl TryFrom<u8> for ZarrSpec {
    type Error = ZarrSpecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_version(i64::from(value))
    }
}

impl From<ZarrSpec> for u8 {
    fn from(value: ZarrSpec) -> Self {
        value.version()
    }
}

impl FromStr for ZarrSpec {
    type Err = ZarrSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches(['v', 'V'])
            .parse::<i64>()
            .map_err(|_| ZarrSpecError(s.to_string()))
            .and_then(Self::from_version)
    }
}

impl fmt::Display for ZarrSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.version())
    }
}
