//! Benchmark configurations and their expansion into parameter combinations.
//!
//! A configuration is a JSON document naming the values to benchmark for each parameter:
//! ```json
//! {
//!     "chunk_size": [64, 128],
//!     "blosc_clevel": {"min": 1, "max": 9},
//!     "blosc_shuffle": ["shuffle"],
//!     "blosc_cname": ["zstd", "lz4"],
//!     "gzip_level": [1, 5, 9],
//!     "zstd_level": 3,
//!     "no_compressor": true,
//!     "zarr_spec": [2, 3]
//! }
//! ```
//! Integer parameters accept an array, a single integer or an inclusive `{"min", "max"}` range.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The parameter names a configuration may define, in the order they are parametrized.
pub const PARAMETER_NAMES: [&str; 8] = [
    "chunk_size",
    "blosc_clevel",
    "blosc_shuffle",
    "blosc_cname",
    "gzip_level",
    "zstd_level",
    "no_compressor",
    "zarr_spec",
];

/// The configuration loaded by default, excluded from [`ConfigSelection::All`].
pub const DEV_CONFIG: &str = "dev";

/// The directory of the bundled configurations.
pub const DEFAULT_CONFIGS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/configs");

/// A configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An IO error reading a configuration.
    #[error("failed to read configuration {path}: {source}")]
    Io {
        /// The configuration path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The configuration is not valid JSON or does not match the configuration format.
    #[error("invalid configuration {path}: {source}")]
    Json {
        /// The configuration path.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
    /// A range descriptor is missing a bound.
    #[error("range for {key} is missing its {bound} bound")]
    MissingBound {
        /// The parameter name.
        key: &'static str,
        /// `min` or `max`.
        bound: &'static str,
    },
    /// A range descriptor has `min > max`.
    #[error("range for {key} has min {min} greater than max {max}")]
    InvalidRange {
        /// The parameter name.
        key: &'static str,
        /// The lower bound.
        min: i64,
        /// The upper bound.
        max: i64,
    },
    /// No configuration files were found.
    #[error("no configuration files found in {0}")]
    NoConfigs(PathBuf),
}

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// A boolean flag, e.g. `no_compressor`.
    Bool(bool),
    /// An integer, e.g. `chunk_size` or a compression level.
    Int(i64),
    /// A name, e.g. `blosc_cname`.
    Str(String),
}

impl ParamValue {
    /// Return the value as an integer, if it is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        if let Self::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Return the value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        if let Self::Str(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Return the value as a boolean, if it is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        if let Self::Bool(value) = self {
            Some(*value)
        } else {
            None
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", if *value { "True" } else { "False" }),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntegerValues {
    Range(IntegerRange),
    Values(Vec<i64>),
    Single(i64),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct IntegerRange {
    min: Option<i64>,
    max: Option<i64>,
}

impl IntegerValues {
    fn expand(self, key: &'static str) -> Result<Vec<ParamValue>, ConfigError> {
        match self {
            Self::Range(IntegerRange { min, max }) => {
                let min = min.ok_or(ConfigError::MissingBound { key, bound: "min" })?;
                let max = max.ok_or(ConfigError::MissingBound { key, bound: "max" })?;
                if min > max {
                    return Err(ConfigError::InvalidRange { key, min, max });
                }
                Ok((min..=max).map(ParamValue::Int).collect())
            }
            Self::Values(values) => Ok(values.into_iter().map(ParamValue::Int).collect()),
            Self::Single(value) => Ok(vec![ParamValue::Int(value)]),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BenchmarkConfigDocument {
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,
    chunk_size: Option<IntegerValues>,
    blosc_clevel: Option<IntegerValues>,
    blosc_shuffle: Option<Vec<String>>,
    blosc_cname: Option<Vec<String>>,
    gzip_level: Option<IntegerValues>,
    zstd_level: Option<IntegerValues>,
    no_compressor: Option<bool>,
    zarr_spec: Option<IntegerValues>,
}

/// An expanded benchmark configuration.
///
/// Every defined parameter maps to an ordered sequence of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    parameters: Vec<(&'static str, Vec<ParamValue>)>,
}

impl BenchmarkConfig {
    /// Parse and expand a configuration from a JSON string.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the document is malformed or a range is invalid.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Self::from_json_str_at(json, Path::new("<string>"))
    }

    /// Read, parse and expand a configuration file.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read, is malformed or a range is invalid.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str_at(&json, path)
    }

    fn from_json_str_at(json: &str, path: &Path) -> Result<Self, ConfigError> {
        let document: BenchmarkConfigDocument =
            serde_json::from_str(json).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_document(document)
    }

    fn from_document(document: BenchmarkConfigDocument) -> Result<Self, ConfigError> {
        let strings = |values: Vec<String>| values.into_iter().map(ParamValue::Str).collect();

        let mut parameters = Vec::with_capacity(PARAMETER_NAMES.len());
        if let Some(values) = document.chunk_size {
            parameters.push(("chunk_size", values.expand("chunk_size")?));
        }
        if let Some(values) = document.blosc_clevel {
            parameters.push(("blosc_clevel", values.expand("blosc_clevel")?));
        }
        if let Some(values) = document.blosc_shuffle {
            parameters.push(("blosc_shuffle", strings(values)));
        }
        if let Some(values) = document.blosc_cname {
            parameters.push(("blosc_cname", strings(values)));
        }
        if let Some(values) = document.gzip_level {
            parameters.push(("gzip_level", values.expand("gzip_level")?));
        }
        if let Some(values) = document.zstd_level {
            parameters.push(("zstd_level", values.expand("zstd_level")?));
        }
        if let Some(no_compressor) = document.no_compressor {
            // normalized to a one-element sequence
            parameters.push(("no_compressor", vec![ParamValue::Bool(no_compressor)]));
        }
        if let Some(values) = document.zarr_spec {
            parameters.push(("zarr_spec", values.expand("zarr_spec")?));
        }
        Ok(Self { parameters })
    }

    /// Return the values of parameter `name`, if it is defined.
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[ParamValue]> {
        self.parameters
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Return the names of the defined parameters.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.parameters.iter().map(|(key, _)| *key)
    }
}

/// Which configuration files to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSelection {
    /// A single configuration `<name>.json`.
    Named(String),
    /// Every configuration except [`DEV_CONFIG`].
    All,
}

impl std::str::FromStr for ConfigSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "all" {
            Self::All
        } else {
            Self::Named(s.to_string())
        })
    }
}

/// Load the configurations selected by `selection` from `configs_dir`.
///
/// # Errors
/// Returns a [`ConfigError`] if the directory or a selected file cannot be read, a configuration is invalid, or
/// [`ConfigSelection::All`] finds no configurations.
pub fn load_configs(
    configs_dir: &Path,
    selection: &ConfigSelection,
) -> Result<Vec<BenchmarkConfig>, ConfigError> {
    match selection {
        ConfigSelection::Named(name) => {
            let path = configs_dir.join(format!("{name}.json"));
            log::debug!("loading configuration {}", path.display());
            Ok(vec![BenchmarkConfig::from_path(&path)?])
        }
        ConfigSelection::All => {
            let io_err = |source| ConfigError::Io {
                path: configs_dir.to_path_buf(),
                source,
            };
            let mut paths = Vec::new();
            for entry in std::fs::read_dir(configs_dir).map_err(io_err)? {
                let path = entry.map_err(io_err)?.path();
                let is_json = path.extension().is_some_and(|ext| ext == "json");
                let is_dev = path.file_stem().is_some_and(|stem| stem == DEV_CONFIG);
                if path.is_file() && is_json && !is_dev {
                    paths.push(path);
                }
            }
            paths.sort();
            if paths.is_empty() {
                return Err(ConfigError::NoConfigs(configs_dir.to_path_buf()));
            }
            paths
                .iter()
                .inspect(|path| log::debug!("loading configuration {}", path.display()))
                .map(|path| BenchmarkConfig::from_path(path))
                .collect()
        }
    }
}

/// One parameter combination of a benchmark function.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParameterCombination {
    names: Vec<&'static str>,
    values: Vec<ParamValue>,
}

impl ParameterCombination {
    /// Create a new parameter combination.
    ///
    /// # Panics
    /// Panics if `names` and `values` differ in length.
    #[must_use]
    pub fn new(names: Vec<&'static str>, values: Vec<ParamValue>) -> Self {
        assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    /// Return the value of parameter `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.names
            .iter()
            .position(|key| *key == name)
            .map(|index| &self.values[index])
    }

    /// Return the integer value of parameter `name`.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_int)
    }

    /// Return the string value of parameter `name`.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// Return the boolean value of parameter `name`.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParamValue::as_bool)
    }

    /// Iterate over the parameter names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> {
        self.names.iter().copied().zip(self.values.iter())
    }

    /// The parameter values.
    #[must_use]
    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    /// The parameter id, the values joined with `-`, e.g. `64-1-shuffle`.
    #[must_use]
    pub fn id(&self) -> String {
        self.values.iter().join("-")
    }
}

/// Parametrize a benchmark function declaring `param_names` over `configs`.
///
/// The parameters used are the declared names that any configuration defines, in [`PARAMETER_NAMES`] order.
/// Returns [`None`] if no configuration defines any of them.
/// A configuration lacking one of the used parameters contributes no combinations. Otherwise the Cartesian product
/// of its used parameter values is collected into a set, so combinations repeated across configurations appear
/// once, and returned sorted.
#[must_use]
pub fn parametrize(
    param_names: &[&str],
    configs: &[BenchmarkConfig],
) -> Option<Vec<ParameterCombination>> {
    let used: Vec<&'static str> = PARAMETER_NAMES
        .into_iter()
        .filter(|name| param_names.contains(name))
        .filter(|name| configs.iter().any(|config| config.values(name).is_some()))
        .collect();
    if used.is_empty() {
        return None;
    }

    let mut combinations = BTreeSet::new();
    for config in configs {
        let Some(values) = used
            .iter()
            .map(|name| config.values(name))
            .collect::<Option<Vec<&[ParamValue]>>>()
        else {
            continue;
        };
        for product in values
            .into_iter()
            .map(|values| values.iter().cloned())
            .multi_cartesian_product()
        {
            combinations.insert(ParameterCombination::new(used.clone(), product));
        }
    }

    Some(combinations.into_iter().collect())
}
