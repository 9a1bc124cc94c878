//! Benchmark result documents.
//!
//! Results are stored in the `pytest-benchmark` JSON layout, one file per storage backend and run:
//! `<results_dir>/<system>-<machine>/<NNNN>_<package>.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::stats::Statistics;
use crate::utils::{UtilsError, read_json_file};

/// The default directory results are saved under.
pub const DEFAULT_RESULTS_DIR: &str = "data/results";

/// A results error.
#[derive(Debug, Error)]
pub enum ResultsError {
    /// An IO error.
    #[error("failed to access results at {path}: {source}")]
    Io {
        /// The path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// A serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Reading a results file failed.
    #[error(transparent)]
    Utils(#[from] UtilsError),
}

/// Whether a benchmark times writes or reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkGroup {
    /// Array writes.
    Write,
    /// Array reads.
    Read,
}

impl BenchmarkGroup {
    /// The group name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
        }
    }
}

impl std::fmt::Display for BenchmarkGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The result of one benchmark function for one parameter combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    /// The benchmark group.
    pub group: BenchmarkGroup,
    /// The benchmark name with its parameter id, e.g. `test_write_gzip[64-1-3]`.
    pub name: String,
    /// The fully qualified benchmark name.
    pub fullname: String,
    /// The parameter values by name.
    pub params: Map<String, Value>,
    /// The parameter id.
    pub param: String,
    /// Extra measurements, `compression_ratio` for read benchmarks.
    pub extra_info: Map<String, Value>,
    /// The timing options.
    pub options: BenchmarkOptions,
    /// The timing statistics.
    pub stats: Statistics,
}

/// The timing options of a benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkOptions {
    /// The timer.
    pub timer: String,
    /// The number of untimed warm-up rounds.
    pub warmup: usize,
    /// The number of timed rounds.
    pub rounds: usize,
    /// Whether the benchmark ran in pedantic mode.
    pub pedantic: bool,
}

/// The CPU of the benchmark machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuInfo {
    /// The number of logical CPUs.
    pub count: usize,
    /// The architecture.
    pub arch: String,
}

/// The machine benchmarks ran on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    /// The host name.
    pub node: String,
    /// The architecture, e.g. `x86_64`.
    pub machine: String,
    /// The operating system, e.g. `Linux`.
    pub system: String,
    /// The kernel release, if known.
    pub release: String,
    /// The CPU.
    pub cpu: CpuInfo,
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|contents| contents.trim().to_string())
        .filter(|contents| !contents.is_empty())
}

impl MachineInfo {
    /// Describe the current machine.
    #[must_use]
    pub fn current() -> Self {
        let system = match std::env::consts::OS {
            "linux" => "Linux".to_string(),
            "macos" => "Darwin".to_string(),
            "windows" => "Windows".to_string(),
            os => os.to_string(),
        };
        let node = std::env::var("HOSTNAME")
            .ok()
            .filter(|node| !node.is_empty())
            .or_else(|| read_trimmed(Path::new("/etc/hostname")))
            .unwrap_or_default();
        let release = read_trimmed(Path::new("/proc/sys/kernel/osrelease")).unwrap_or_default();
        let count = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self {
            node,
            machine: std::env::consts::ARCH.to_string(),
            system,
            release,
            cpu: CpuInfo {
                count,
                arch: std::env::consts::ARCH.to_string(),
            },
        }
    }

    /// The directory name results of this machine are saved under, `<system>-<machine>`.
    #[must_use]
    pub fn results_dir_name(&self) -> String {
        format!("{}-{}", self.system, self.machine)
    }
}

/// The source revision benchmarks ran at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// The commit hash.
    pub id: Option<String>,
    /// The checked out branch, [`None`] for a detached head.
    pub branch: Option<String>,
}

impl CommitInfo {
    /// Read the checked out commit of the git repository containing `dir`.
    ///
    /// Fields are [`None`] if there is no repository or the reference cannot be resolved.
    #[must_use]
    pub fn from_repository(dir: &Path) -> Self {
        let Some(git_dir) = dir.ancestors().map(|dir| dir.join(".git")).find(|git| git.is_dir())
        else {
            return Self::default();
        };
        let Some(head) = read_trimmed(&git_dir.join("HEAD")) else {
            return Self::default();
        };
        match head.strip_prefix("ref: ") {
            Some(reference) => Self {
                id: read_trimmed(&git_dir.join(reference))
                    .or_else(|| packed_ref(&git_dir, reference)),
                branch: reference.strip_prefix("refs/heads/").map(str::to_string),
            },
            None => Self {
                id: Some(head),
                branch: None,
            },
        }
    }
}

fn packed_ref(git_dir: &Path, reference: &str) -> Option<String> {
    let packed = std::fs::read_to_string(git_dir.join("packed-refs")).ok()?;
    packed.lines().find_map(|line| {
        let (id, name) = line.split_once(' ')?;
        (name == reference).then(|| id.to_string())
    })
}

/// A results document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResults {
    /// The machine benchmarks ran on.
    pub machine_info: MachineInfo,
    /// The source revision.
    pub commit_info: CommitInfo,
    /// The benchmark records.
    pub benchmarks: Vec<BenchmarkRecord>,
    /// When the run finished, RFC 3339.
    pub datetime: String,
    /// The version of the harness.
    pub version: String,
}

impl BenchmarkResults {
    /// Create a results document for `benchmarks` run on the current machine now.
    #[must_use]
    pub fn new(benchmarks: Vec<BenchmarkRecord>) -> Self {
        let commit_info = std::env::current_dir()
            .map(|dir| CommitInfo::from_repository(&dir))
            .unwrap_or_default();
        Self {
            machine_info: MachineInfo::current(),
            commit_info,
            benchmarks,
            datetime: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parse the numeric id prefix of a results file name, e.g. `0003` in `0003_zarrs.json`.
#[must_use]
pub fn result_file_id(file_name: &str) -> Option<u32> {
    let (id, _) = file_name.split_once('_')?;
    if id.is_empty() || !id.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

/// Save `results` of `package` into `<results_dir>/<system>-<machine>/<NNNN>_<package>.json`.
///
/// `NNNN` is one more than the highest id already in the directory, starting at `0001`.
/// Returns the path of the new file.
///
/// # Errors
/// Returns a [`ResultsError`] if the directory cannot be created or listed or the file cannot be written.
pub fn save_results(
    results_dir: &Path,
    package: &str,
    results: &BenchmarkResults,
) -> Result<PathBuf, ResultsError> {
    let dir = results_dir.join(results.machine_info.results_dir_name());
    let io_err = |source| ResultsError::Io {
        path: dir.clone(),
        source,
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let mut last_id = 0;
    for entry in std::fs::read_dir(&dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if let Some(id) = entry.file_name().to_str().and_then(result_file_id) {
            last_id = last_id.max(id);
        }
    }

    let path = dir.join(format!("{:04}_{package}.json", last_id + 1));
    let contents = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, contents).map_err(|source| ResultsError::Io {
        path: path.clone(),
        source,
    })?;
    log::info!("saved {} benchmark results to {}", results.benchmarks.len(), path.display());
    Ok(path)
}

/// Load a results document.
///
/// # Errors
/// Returns a [`ResultsError`] if the file cannot be read or is not a results document.
pub fn load_results(path: &Path) -> Result<BenchmarkResults, ResultsError> {
    Ok(read_json_file(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_file_ids() {
        assert_eq!(result_file_id("0003_zarrs.json"), Some(3));
        assert_eq!(result_file_id("0012_json_spec.json"), Some(12));
        assert_eq!(result_file_id("zarrs.json"), None);
        assert_eq!(result_file_id("_zarrs.json"), None);
        assert_eq!(result_file_id("v1_zarrs.json"), None);
    }

    #[test]
    fn commit_info_from_repository() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        assert_eq!(CommitInfo::from_repository(dir.path()), CommitInfo::default());

        let git = dir.path().join(".git");
        std::fs::create_dir_all(git.join("refs/heads"))?;
        std::fs::write(git.join("HEAD"), "ref: refs/heads/main\n")?;
        std::fs::write(git.join("refs/heads/main"), "abc123\n")?;
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested)?;
        let info = CommitInfo::from_repository(&nested);
        assert_eq!(info.id.as_deref(), Some("abc123"));
        assert_eq!(info.branch.as_deref(), Some("main"));

        std::fs::remove_file(git.join("refs/heads/main"))?;
        std::fs::write(git.join("packed-refs"), "# pack-refs\ndef456 refs/heads/main\n")?;
        assert_eq!(CommitInfo::from_repository(dir.path()).id.as_deref(), Some("def456"));
        Ok(())
    }

    #[test]
    fn machine_info_current() {
        let info = MachineInfo::current();
        assert_eq!(info.machine, std::env::consts::ARCH);
        assert!(info.cpu.count >= 1);
        assert!(info.results_dir_name().ends_with(std::env::consts::ARCH));
    }
}
