//! Filesystem utilities.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use walkdir::WalkDir;

/// A filesystem utility error.
#[derive(Debug, Error)]
pub enum UtilsError {
    /// An IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A directory walk error.
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    /// A JSON error.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        /// The file path.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
    /// The path is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
}

/// Remove the directory at `path` and everything under it, if it exists.
///
/// # Errors
/// Returns an [`std::io::Error`] if the directory exists but cannot be removed.
pub fn remove_output_dir(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Return the total size in bytes of all files under the directory `path`.
///
/// # Errors
/// Returns [`UtilsError::NotADirectory`] if `path` is not a directory, or an error if the directory cannot be walked.
pub fn directory_size(path: &Path) -> Result<u64, UtilsError> {
    if !path.is_dir() {
        return Err(UtilsError::NotADirectory(path.to_path_buf()));
    }

    let mut size = 0;
    for entry in WalkDir::new(path) {
        let entry = entry?;
        if entry.file_type().is_file() {
            size += entry.metadata()?.len();
        }
    }
    Ok(size)
}

/// Read and deserialize the JSON file at `path`.
///
/// # Errors
/// Returns a [`UtilsError`] if the file cannot be read or deserialized.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, UtilsError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|source| UtilsError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_size_sums_nested_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        std::fs::write(dir.path().join("a"), [0u8; 10])?;
        std::fs::create_dir_all(dir.path().join("b/c"))?;
        std::fs::write(dir.path().join("b/c/d"), [0u8; 32])?;
        assert_eq!(directory_size(dir.path())?, 42);

        assert!(matches!(
            directory_size(&dir.path().join("a")),
            Err(UtilsError::NotADirectory(_))
        ));
        Ok(())
    }

    #[test]
    fn remove_output_dir_missing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("array.zarr");
        remove_output_dir(&path)?;
        std::fs::create_dir_all(path.join("c/0"))?;
        remove_output_dir(&path)?;
        assert!(!path.exists());
        Ok(())
    }
}
