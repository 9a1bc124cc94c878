//! Flattening of results documents into a table of benchmark rows.
//!
//! A results document holds one record per benchmark with nested `params`, `stats` and
//! `extra_info` objects. [`flatten_json`] expands those into dotted columns such as `params.chunk_size`
//! and `stats.mean`, and [`prepare_benchmarks_table`] derives the columns the plots use:
//! - `compression_ratio`, shared by the write and read rows of one parameter combination,
//! - `compressor` and `compression_level`, both carried by a [`Codec`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use itertools::Itertools;
use serde_json::{Map, Value};
use thiserror::Error;
use zarr_benchmarks::utils::{UtilsError, read_json_file};

/// The compression level given to rows without a compressor, so they still have a position on
/// size-encoded plots.
pub const NO_COMPRESSOR_LEVEL: i64 = 10;

/// A table error.
#[derive(Debug, Error)]
pub enum TableError {
    /// A results file could not be read.
    #[error("failed to read results {path}: {source}")]
    Read {
        /// The path.
        path: PathBuf,
        /// The underlying error.
        source: UtilsError,
    },
    /// A results document is missing a required field.
    #[error("results document is missing `{0}`")]
    MissingField(&'static str),
    /// An unknown column name.
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
}

/// Flatten nested objects into dotted column names.
///
/// `{"stats": {"mean": 1.0}}` becomes `{"stats.mean": 1.0}`.
/// Arrays and scalars are leaves, empty objects produce no columns and a non-object `value` flattens to an empty map.
#[must_use]
pub fn flatten_json(value: &Value) -> Map<String, Value> {
    let mut flat = Map::new();
    if let Value::Object(object) = value {
        flatten_into(&mut flat, None, object);
    }
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: Option<&str>, object: &Map<String, Value>) {
    for (key, value) in object {
        let path = prefix.map_or_else(|| key.clone(), |prefix| format!("{prefix}.{key}"));
        if let Value::Object(nested) = value {
            flatten_into(flat, Some(&path), nested);
        } else {
            flat.insert(path, value.clone());
        }
    }
}

fn non_null<'a>(row: &'a Map<String, Value>, column: &str) -> Option<&'a Value> {
    row.get(column).filter(|value| !value.is_null())
}

fn int_column(row: &Map<String, Value>, column: &str) -> Option<i64> {
    non_null(row, column).and_then(Value::as_i64)
}

fn str_column(row: &Map<String, Value>, column: &str) -> Option<String> {
    non_null(row, column).and_then(Value::as_str).map(str::to_string)
}

/// The codec family of a benchmark row and its compression level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Blosc with an inner compressor.
    Blosc {
        /// The blosc compressor name, e.g. `zstd`.
        cname: Option<String>,
        /// The compression level.
        clevel: i64,
    },
    /// Gzip.
    Gzip {
        /// The compression level.
        level: i64,
    },
    /// Zstandard.
    Zstd {
        /// The compression level.
        level: i64,
    },
    /// No compressor.
    None,
    /// A row without codec parameters.
    Unknown,
}

impl Codec {
    /// Derive the codec of a flattened benchmark record from its `params.*` columns.
    ///
    /// The codec parameter families are mutually exclusive and checked in the order
    /// blosc, gzip, zstd, no compressor.
    #[must_use]
    pub fn from_flat(row: &Map<String, Value>) -> Self {
        if let Some(clevel) = int_column(row, "params.blosc_clevel") {
            Self::Blosc {
                cname: str_column(row, "params.blosc_cname"),
                clevel,
            }
        } else if let Some(level) = int_column(row, "params.gzip_level") {
            Self::Gzip { level }
        } else if let Some(level) = int_column(row, "params.zstd_level") {
            Self::Zstd { level }
        } else if non_null(row, "params.no_compressor").and_then(Value::as_bool) == Some(true) {
            Self::None
        } else {
            Self::Unknown
        }
    }

    /// The compressor label, e.g. `blosc-zstd`, `gzip` or `none`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Blosc {
                cname: Some(cname), ..
            } => format!("blosc-{cname}"),
            Self::Blosc { cname: None, .. } => "blosc".to_string(),
            Self::Gzip { .. } => "gzip".to_string(),
            Self::Zstd { .. } => "zstd".to_string(),
            Self::None => "none".to_string(),
            Self::Unknown => "unknown".to_string(),
        }
    }

    /// The compression level, [`NO_COMPRESSOR_LEVEL`] without a compressor.
    #[must_use]
    pub const fn level(&self) -> Option<i64> {
        match self {
            Self::Blosc { clevel: level, .. } | Self::Gzip { level } | Self::Zstd { level } => {
                Some(*level)
            }
            Self::None => Some(NO_COMPRESSOR_LEVEL),
            Self::Unknown => None,
        }
    }
}

/// A column of a [`BenchmarkTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Column {
    /// The storage backend package, e.g. `zarrs`.
    Package,
    /// The operating system of the benchmark machine.
    Machine,
    /// The benchmark group, `write` or `read`.
    Group,
    /// The compressor label.
    Compressor,
    /// The compression level.
    CompressionLevel,
    /// The compression ratio.
    CompressionRatio,
    /// The chunk edge length.
    ChunkSize,
    /// The blosc shuffle mode.
    BloscShuffle,
    /// The Zarr format version.
    ZarrSpec,
    /// A timing statistic, e.g. `mean` for `stats.mean`.
    Stat(String),
}

impl Column {
    /// A timing statistic column.
    #[must_use]
    pub fn stat(name: &str) -> Self {
        Self::Stat(name.to_string())
    }

    /// The `stats.mean` column.
    #[must_use]
    pub fn mean() -> Self {
        Self::stat("mean")
    }

    /// The column name, e.g. `chunk_size` or `stats.mean`.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Package => "package".to_string(),
            Self::Machine => "machine".to_string(),
            Self::Group => "group".to_string(),
            Self::Compressor => "compressor".to_string(),
            Self::CompressionLevel => "compression_level".to_string(),
            Self::CompressionRatio => "compression_ratio".to_string(),
            Self::ChunkSize => "chunk_size".to_string(),
            Self::BloscShuffle => "blosc_shuffle".to_string(),
            Self::ZarrSpec => "zarr_spec".to_string(),
            Self::Stat(stat) => format!("stats.{stat}"),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Column {
    type Err = TableError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "package" => Ok(Self::Package),
            "machine" => Ok(Self::Machine),
            "group" => Ok(Self::Group),
            "compressor" => Ok(Self::Compressor),
            "compression_level" => Ok(Self::CompressionLevel),
            "compression_ratio" => Ok(Self::CompressionRatio),
            "chunk_size" => Ok(Self::ChunkSize),
            "blosc_shuffle" => Ok(Self::BloscShuffle),
            "zarr_spec" => Ok(Self::ZarrSpec),
            _ => match name.strip_prefix("stats.") {
                Some(stat) if !stat.is_empty() => Ok(Self::stat(stat)),
                _ => Err(TableError::UnknownColumn(name.to_string())),
            },
        }
    }
}

/// A table cell.
///
/// Cells are totally ordered: missing first, then numbers, then text.
#[derive(Debug, Clone)]
pub enum Cell {
    /// A missing value.
    Missing,
    /// A number.
    Number(f64),
    /// Text.
    Text(String),
}

impl Cell {
    /// The number, if the cell holds one.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        if let Self::Number(number) = self {
            Some(*number)
        } else {
            None
        }
    }

    /// The text, if the cell holds text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        if let Self::Text(text) = self {
            Some(text)
        } else {
            None
        }
    }

    /// Return true if the cell is missing.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Missing => 0,
            Self::Number(_) => 1,
            Self::Text(_) => 2,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cell {}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<i64> for Cell {
    fn from(number: i64) -> Self {
        Self::Number(number as f64)
    }
}

impl From<f64> for Cell {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}

impl<T: Into<Self>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Missing, Into::into)
    }
}

/// One benchmark record of one package.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRow {
    /// The storage backend package.
    pub package: String,
    /// The operating system of the benchmark machine.
    pub machine: String,
    /// The benchmark group.
    pub group: String,
    /// The codec.
    pub codec: Codec,
    /// The compression ratio measured for this parameter combination.
    pub compression_ratio: Option<f64>,
    /// The chunk edge length.
    pub chunk_size: Option<i64>,
    /// The blosc shuffle mode.
    pub blosc_shuffle: Option<String>,
    /// The Zarr format version.
    pub zarr_spec: Option<i64>,
    /// The numeric timing statistics by name, e.g. `mean`.
    pub stats: BTreeMap<String, f64>,
}

impl BenchmarkRow {
    /// The compressor label.
    #[must_use]
    pub fn compressor(&self) -> String {
        self.codec.label()
    }

    /// The compression level.
    #[must_use]
    pub const fn compression_level(&self) -> Option<i64> {
        self.codec.level()
    }

    /// The cell of `column`.
    #[must_use]
    pub fn get(&self, column: &Column) -> Cell {
        match column {
            Column::Package => Cell::from(self.package.as_str()),
            Column::Machine => Cell::from(self.machine.as_str()),
            Column::Group => Cell::from(self.group.as_str()),
            Column::Compressor => Cell::Text(self.compressor()),
            Column::CompressionLevel => self.compression_level().into(),
            Column::CompressionRatio => self.compression_ratio.into(),
            Column::ChunkSize => self.chunk_size.into(),
            Column::BloscShuffle => self.blosc_shuffle.as_deref().into(),
            Column::ZarrSpec => self.zarr_spec.into(),
            Column::Stat(stat) => self.stats.get(stat).copied().into(),
        }
    }

    /// The number in `column`, if present.
    #[must_use]
    pub fn number(&self, column: &Column) -> Option<f64> {
        self.get(column).as_f64()
    }
}

fn parameter_key(row: &Map<String, Value>, param_columns: &BTreeSet<&str>) -> String {
    param_columns
        .iter()
        .map(|column| row.get(*column).unwrap_or(&Value::Null).to_string())
        .join("\u{1f}")
}

/// Flatten the benchmarks of a results document of `package` into rows.
///
/// Every row inherits the largest `extra_info.compression_ratio` among the rows sharing all its
/// `params.*` values, a missing parameter matching only another missing parameter. Write rows
/// thereby get the ratio measured by the read benchmark of the same combination.
///
/// # Errors
/// Returns [`TableError::MissingField`] if `results` has no `benchmarks` array or no `machine_info.system`.
pub fn prepare_benchmarks_table(
    results: &Value,
    package: &str,
) -> Result<Vec<BenchmarkRow>, TableError> {
    let benchmarks = results
        .get("benchmarks")
        .and_then(Value::as_array)
        .ok_or(TableError::MissingField("benchmarks"))?;
    let machine = results
        .pointer("/machine_info/system")
        .and_then(Value::as_str)
        .ok_or(TableError::MissingField("machine_info.system"))?;

    let flat: Vec<Map<String, Value>> = benchmarks.iter().map(flatten_json).collect();
    let param_columns: BTreeSet<&str> = flat
        .iter()
        .flat_map(Map::keys)
        .map(String::as_str)
        .filter(|column| column.starts_with("params."))
        .collect();

    let mut ratios: HashMap<String, f64> = HashMap::new();
    for row in &flat {
        if let Some(ratio) = non_null(row, "extra_info.compression_ratio").and_then(Value::as_f64)
        {
            ratios
                .entry(parameter_key(row, &param_columns))
                .and_modify(|max| *max = max.max(ratio))
                .or_insert(ratio);
        }
    }

    Ok(flat
        .iter()
        .map(|row| BenchmarkRow {
            package: package.to_string(),
            machine: machine.to_string(),
            group: str_column(row, "group").unwrap_or_default(),
            codec: Codec::from_flat(row),
            compression_ratio: ratios.get(&parameter_key(row, &param_columns)).copied(),
            chunk_size: int_column(row, "params.chunk_size"),
            blosc_shuffle: str_column(row, "params.blosc_shuffle"),
            zarr_spec: int_column(row, "params.zarr_spec"),
            stats: row
                .iter()
                .filter_map(|(column, value)| {
                    Some((column.strip_prefix("stats.")?.to_string(), value.as_f64()?))
                })
                .collect(),
        })
        .collect())
}

/// The combined benchmark rows of every package.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkTable {
    rows: Vec<BenchmarkRow>,
}

impl BenchmarkTable {
    /// Create a table from rows.
    #[must_use]
    pub const fn new(rows: Vec<BenchmarkRow>) -> Self {
        Self { rows }
    }

    /// Read the results file of each `(package, path)` and concatenate their rows.
    ///
    /// # Errors
    /// Returns a [`TableError`] if a file cannot be read or is not a results document.
    pub fn from_packages<P: AsRef<Path>>(packages: &[(&str, P)]) -> Result<Self, TableError> {
        let mut rows = Vec::new();
        for (package, path) in packages {
            let path = path.as_ref();
            let results: Value = read_json_file(path).map_err(|source| TableError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let package_rows = prepare_benchmarks_table(&results, package)?;
            log::debug!("read {} {package} rows from {}", package_rows.len(), path.display());
            rows.extend(package_rows);
        }
        Ok(Self { rows })
    }

    /// The rows.
    #[must_use]
    pub fn rows(&self) -> &[BenchmarkRow] {
        &self.rows
    }

    /// The number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Return true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The rows matching `predicate`.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&BenchmarkRow) -> bool) -> Self {
        self.rows.iter().filter(|row| predicate(row)).cloned().collect()
    }

    /// The rows whose `column` equals `value`.
    #[must_use]
    pub fn filter_eq(&self, column: &Column, value: impl Into<Cell>) -> Self {
        let value = value.into();
        self.filter(|row| row.get(column) == value)
    }

    /// The sorted distinct values of `column`.
    #[must_use]
    pub fn unique(&self, column: &Column) -> Vec<Cell> {
        self.rows
            .iter()
            .map(|row| row.get(column))
            .sorted()
            .dedup()
            .collect()
    }

    /// The machine of the first row.
    #[must_use]
    pub fn machine(&self) -> Option<&str> {
        self.rows.first().map(|row| row.machine.as_str())
    }
}

impl FromIterator<BenchmarkRow> for BenchmarkTable {
    fn from_iter<I: IntoIterator<Item = BenchmarkRow>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(group: &str, params: &Value, extra_info: &Value, mean: f64) -> Value {
        json!({
            "group": group,
            "name": "test",
            "params": params,
            "extra_info": extra_info,
            "stats": {"mean": mean, "stddev": 0.1, "outliers": "0;0"},
        })
    }

    fn document(benchmarks: Vec<Value>) -> Value {
        json!({
            "machine_info": {"system": "Linux", "machine": "x86_64"},
            "benchmarks": benchmarks,
        })
    }

    #[test]
    fn flatten_json_dotted() {
        let flat = flatten_json(&json!({
            "group": "read",
            "params": {"chunk_size": 64, "nested": {"deep": true}},
            "extra_info": {},
            "shape": [1, 2],
        }));
        assert_eq!(
            flat.keys().collect::<Vec<_>>(),
            ["group", "params.chunk_size", "params.nested.deep", "shape"]
        );
        assert_eq!(flat["params.nested.deep"], true);
        assert_eq!(flat["shape"], json!([1, 2]));
        assert!(flatten_json(&json!(1)).is_empty());
    }

    #[test]
    fn compression_ratio_shared_across_groups() -> Result<(), Box<dyn std::error::Error>> {
        let params = json!({"chunk_size": 64, "gzip_level": 1});
        let other = json!({"chunk_size": 128, "gzip_level": 1});
        let results = document(vec![
            record("write", &params, &json!({}), 1.0),
            record("read", &params, &json!({"compression_ratio": 2.5}), 0.5),
            record("write", &other, &json!({}), 1.0),
        ]);
        let rows = prepare_benchmarks_table(&results, "zarrs")?;
        assert_eq!(rows[0].compression_ratio, Some(2.5));
        assert_eq!(rows[1].compression_ratio, Some(2.5));
        assert_eq!(rows[2].compression_ratio, None);
        assert_eq!(rows[0].machine, "Linux");
        assert_eq!(rows[0].stats.get("mean"), Some(&1.0));
        assert!(!rows[0].stats.contains_key("outliers"));
        Ok(())
    }

    #[test]
    fn missing_params_group_together() -> Result<(), Box<dyn std::error::Error>> {
        let results = document(vec![
            record("write", &json!({"chunk_size": 64, "zstd_level": 1}), &json!({}), 1.0),
            record(
                "read",
                &json!({"chunk_size": 64, "gzip_level": 1}),
                &json!({"compression_ratio": 3.0}),
                1.0,
            ),
        ]);
        let rows = prepare_benchmarks_table(&results, "zarrs")?;
        assert_eq!(rows[0].compression_ratio, None);
        assert_eq!(rows[1].compression_ratio, Some(3.0));
        Ok(())
    }

    #[test]
    fn codec_labels() {
        let codec = |params: Value| Codec::from_flat(&flatten_json(&json!({ "params": params })));
        let blosc = codec(json!({"blosc_clevel": 5, "blosc_cname": "lz4"}));
        assert_eq!(blosc.label(), "blosc-lz4");
        assert_eq!(blosc.level(), Some(5));
        assert_eq!(codec(json!({"gzip_level": 3})).label(), "gzip");
        assert_eq!(codec(json!({"zstd_level": 9})).level(), Some(9));
        let none = codec(json!({"no_compressor": true}));
        assert_eq!(none.label(), "none");
        assert_eq!(none.level(), Some(NO_COMPRESSOR_LEVEL));
        assert_eq!(codec(json!({"no_compressor": false})), Codec::Unknown);
        assert_eq!(codec(json!({"chunk_size": 64})).level(), None);
    }

    #[test]
    fn missing_fields() {
        assert!(matches!(
            prepare_benchmarks_table(&json!({"benchmarks": []}), "zarrs"),
            Err(TableError::MissingField("machine_info.system"))
        ));
        assert!(matches!(
            prepare_benchmarks_table(&json!({}), "zarrs"),
            Err(TableError::MissingField("benchmarks"))
        ));
    }

    #[test]
    fn columns_parse() -> Result<(), TableError> {
        assert_eq!("stats.mean".parse::<Column>()?, Column::mean());
        assert_eq!("chunk_size".parse::<Column>()?, Column::ChunkSize);
        assert_eq!(Column::stat("max").to_string(), "stats.max");
        assert!("stats.".parse::<Column>().is_err());
        assert!("params.chunk_size".parse::<Column>().is_err());
        Ok(())
    }

    #[test]
    fn unique_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let results = document(vec![
            record("write", &json!({"chunk_size": 128, "gzip_level": 1}), &json!({}), 1.0),
            record("write", &json!({"chunk_size": 64, "gzip_level": 1}), &json!({}), 1.0),
            record("write", &json!({"chunk_size": 128, "zstd_level": 1}), &json!({}), 1.0),
            record("write", &json!({"no_compressor": true}), &json!({}), 1.0),
        ]);
        let table = BenchmarkTable::new(prepare_benchmarks_table(&results, "zarrs")?);
        assert_eq!(
            table.unique(&Column::ChunkSize),
            [Cell::Missing, Cell::from(64_i64), Cell::from(128_i64)]
        );
        assert_eq!(
            table.unique(&Column::Compressor),
            [Cell::from("gzip"), Cell::from("none"), Cell::from("zstd")]
        );
        assert_eq!(table.filter_eq(&Column::ChunkSize, 128_i64).len(), 2);
        Ok(())
    }
}
