//! Storage backends.
//!
//! Each backend writes and reads a whole [`Image`] as a Zarr array on the filesystem, but describes compression and
//! array metadata in its own way:
//!
//! | Backend                 | Zarr versions | Compressor descriptor                          | Stored size               |
//! |-------------------------|---------------|------------------------------------------------|---------------------------|
//! | [`ZarrV2Backend`]       | V2            | typed `numcodecs` struct, integer shuffle      | store listing             |
//! | [`NativeBackend`]       | V2, V3        | [`zarrs`] codec objects (V3), `numcodecs` (V2) | store listing             |
//! | [`JsonSpecBackend`]     | V2, V3        | JSON dictionaries, string shuffle (V3)         | directory walk            |
//!
//! Use [`create_backend`] to select a backend once at start up.

mod json_spec;
mod native;
mod zarr_v2;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zarrs::array::{
    Array, ArrayCreateError, ArrayError, ArrayMetadata, ArraySubset, BytesToBytesCodecTraits,
    CodecOptions,
};
use zarrs::filesystem::{FilesystemStore, FilesystemStoreCreateError};
use zarrs::storage::{ListableStorageTraits, StorageError};

pub use json_spec::JsonSpecBackend;
pub use native::NativeBackend;
pub use zarr_v2::{NumcodecsCompressor, ZarrV2Backend};

use crate::ZarrSpec;
use crate::compressor::{Compressor, CompressorError};
use crate::image::{Image, ImageDataType};
use crate::utils::{UtilsError, remove_output_dir};

/// The Zarr V2 array metadata key.
pub const ZARRAY_KEY: &str = ".zarray";

/// The Zarr V3 metadata key.
pub const ZARR_JSON_KEY: &str = "zarr.json";

/// A storage backend error.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend does not support the Zarr version.
    #[error("backend {backend} does not support zarr {spec}")]
    UnsupportedZarrSpec {
        /// The backend package.
        backend: &'static str,
        /// The Zarr version.
        spec: ZarrSpec,
    },
    /// An invalid compressor description.
    #[error(transparent)]
    Compressor(#[from] CompressorError),
    /// A codec could not be created.
    #[error("failed to create codec: {0}")]
    Codec(String),
    /// A backend cannot write a compressor in this form.
    #[error("unexpected {0} compressor descriptor")]
    UnexpectedDescriptor(&'static str),
    /// The stored array has an unsupported data type.
    #[error("unsupported data type {0}")]
    UnsupportedDataType(String),
    /// An array already exists at the path and overwriting is disabled.
    #[error("an array already exists at {0}")]
    ArrayExists(PathBuf),
    /// The array metadata is missing or invalid.
    #[error("invalid array metadata at {path}: {reason}")]
    InvalidMetadata {
        /// The array path.
        path: PathBuf,
        /// What is wrong.
        reason: String,
    },
    /// A filesystem store error.
    #[error(transparent)]
    StoreCreate(#[from] FilesystemStoreCreateError),
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An array creation error.
    #[error(transparent)]
    ArrayCreate(#[from] ArrayCreateError),
    /// An array error.
    #[error(transparent)]
    Array(#[from] ArrayError),
    /// An array shape error.
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    /// A JSON error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// An IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A filesystem utility error.
    #[error(transparent)]
    Utils(#[from] UtilsError),
}

/// The available storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// [`ZarrV2Backend`].
    ZarrV2,
    /// [`NativeBackend`].
    Zarrs,
    /// [`JsonSpecBackend`].
    JsonSpec,
}

/// An unrecognised backend name.
#[derive(Debug, Clone, Error)]
#[error("invalid backend {0}, expected one of zarr-v2, zarrs, json-spec")]
pub struct BackendKindError(String);

impl BackendKind {
    /// Every backend.
    pub const ALL: [Self; 3] = [Self::ZarrV2, Self::Zarrs, Self::JsonSpec];

    /// The backend name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ZarrV2 => "zarr-v2",
            Self::Zarrs => "zarrs",
            Self::JsonSpec => "json-spec",
        }
    }

    /// The package label used in result file names and tables.
    #[must_use]
    pub const fn package(self) -> &'static str {
        match self {
            Self::ZarrV2 => "zarr_v2",
            Self::Zarrs => "zarrs",
            Self::JsonSpec => "json_spec",
        }
    }
}

impl FromStr for BackendKind {
    type Err = BackendKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s || kind.package() == s)
            .ok_or_else(|| BackendKindError(s.to_string()))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Create the backend of `kind`.
#[must_use]
pub fn create_backend(kind: BackendKind) -> Box<dyn StorageBackend> {
    match kind {
        BackendKind::ZarrV2 => Box::new(ZarrV2Backend),
        BackendKind::Zarrs => Box::new(NativeBackend),
        BackendKind::JsonSpec => Box::new(JsonSpecBackend),
    }
}

/// Options for [`StorageBackend::write_array`].
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOptions {
    /// Remove any existing data at the path before writing.
    pub overwrite: bool,
    /// The chunk shape.
    pub chunk_shape: Vec<u64>,
    /// The compressor.
    pub compressor: Compressor,
    /// Store chunks that are entirely the fill value.
    pub write_empty_chunks: bool,
    /// The Zarr version.
    pub zarr_spec: ZarrSpec,
}

impl WriteOptions {
    /// Create write options with a chunk shape, compressor and Zarr version.
    ///
    /// `overwrite` is disabled and `write_empty_chunks` is enabled.
    #[must_use]
    pub fn new(chunk_shape: Vec<u64>, compressor: Compressor, zarr_spec: ZarrSpec) -> Self {
        Self {
            overwrite: false,
            chunk_shape,
            compressor,
            write_empty_chunks: true,
            zarr_spec,
        }
    }

    /// Set whether to remove existing data before writing.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set whether chunks that are entirely the fill value are stored.
    #[must_use]
    pub fn with_write_empty_chunks(mut self, write_empty_chunks: bool) -> Self {
        self.write_empty_chunks = write_empty_chunks;
        self
    }
}

/// A compressor in the native form of a backend.
#[derive(Debug, Clone)]
pub enum CompressorDescriptor {
    /// A `numcodecs` compressor for the `compressor` field of Zarr V2 metadata, [`None`] for no compression.
    Numcodecs(Option<NumcodecsCompressor>),
    /// [`zarrs`] bytes-to-bytes codecs.
    Codecs(Vec<Arc<dyn BytesToBytesCodecTraits>>),
    /// A JSON compressor (Zarr V2) or codec chain (Zarr V3).
    Json(serde_json::Value),
}

impl CompressorDescriptor {
    /// The name of the descriptor form.
    #[must_use]
    pub const fn form(&self) -> &'static str {
        match self {
            Self::Numcodecs(_) => "numcodecs",
            Self::Codecs(_) => "codecs",
            Self::Json(_) => "JSON",
        }
    }
}

/// A storage backend.
pub trait StorageBackend {
    /// The backend kind.
    fn kind(&self) -> BackendKind;

    /// The package label of the backend.
    fn package(&self) -> &'static str {
        self.kind().package()
    }

    /// Returns true if the backend can write and read arrays of Zarr version `spec`.
    fn supports(&self, spec: ZarrSpec) -> bool;

    /// The Zarr version used when a benchmark does not request one.
    fn default_spec(&self) -> ZarrSpec;

    /// Translate `compressor` into the native descriptor of the backend for an array of `data_type`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the backend does not support `spec` or the codec cannot be created.
    fn compressor_descriptor(
        &self,
        compressor: &Compressor,
        spec: ZarrSpec,
        data_type: ImageDataType,
    ) -> Result<CompressorDescriptor, BackendError>;

    /// Write `image` as an array at `path`.
    ///
    /// With [`WriteOptions::overwrite`], any existing data at `path` is removed first.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the Zarr version is unsupported, an array exists and overwriting is disabled,
    /// or writing fails.
    fn write_array(
        &self,
        image: &Image,
        path: &Path,
        options: &WriteOptions,
    ) -> Result<(), BackendError>;

    /// Read the whole array at `path`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the array cannot be opened or read.
    fn read_array(&self, path: &Path, spec: ZarrSpec) -> Result<Image, BackendError>;

    /// The ratio of the uncompressed size of the array at `path` to the size of all files under `path`.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the array metadata cannot be read or the stored size cannot be determined.
    fn compression_ratio(&self, path: &Path, spec: ZarrSpec) -> Result<f64, BackendError>;
}

fn check_spec(backend: &dyn StorageBackend, spec: ZarrSpec) -> Result<(), BackendError> {
    if backend.supports(spec) {
        Ok(())
    } else {
        Err(BackendError::UnsupportedZarrSpec {
            backend: backend.package(),
            spec,
        })
    }
}

/// Prepare `path` for writing a new array.
fn prepare_output(path: &Path, overwrite: bool) -> Result<(), BackendError> {
    if overwrite {
        remove_output_dir(path)?;
    } else if path.join(ZARRAY_KEY).exists() || path.join(ZARR_JSON_KEY).exists() {
        return Err(BackendError::ArrayExists(path.to_path_buf()));
    }
    Ok(())
}

fn filesystem_store(path: &Path) -> Result<Arc<FilesystemStore>, BackendError> {
    Ok(Arc::new(FilesystemStore::new(path)?))
}

fn codec_options(write_empty_chunks: bool) -> CodecOptions {
    CodecOptions::default().with_store_empty_chunks(write_empty_chunks)
}

/// Create an array at `path` from `metadata` and write `image` into it.
fn write_with_metadata(
    image: &Image,
    path: &Path,
    options: &WriteOptions,
    metadata: ArrayMetadata,
) -> Result<(), BackendError> {
    prepare_output(path, options.overwrite)?;
    let array = Array::new_with_metadata(filesystem_store(path)?, "/", metadata)?
        .with_codec_options(codec_options(options.write_empty_chunks));
    array.store_metadata()?;
    store_image(&array, image)
}

/// Open the array at `path` and read all of it.
fn open_and_retrieve(path: &Path, spec: ZarrSpec) -> Result<Image, BackendError> {
    let data_type = stored_data_type(path, spec)?;
    let array = Array::open(filesystem_store(path)?, "/")?;
    retrieve_image(&array, data_type)
}

/// Store all of `image` into `array`.
fn store_image(array: &Array<FilesystemStore>, image: &Image) -> Result<(), BackendError> {
    let subset = ArraySubset::new_with_shape(image.shape_u64());
    crate::image_apply!(image, data => match data.as_slice() {
        Some(elements) => array.store_array_subset(&subset, elements)?,
        None => array.store_array_subset(&subset, data.iter().copied().collect::<Vec<_>>())?,
    });
    Ok(())
}

/// Retrieve all of `array` as an image of `data_type`.
fn retrieve_image(
    array: &Array<FilesystemStore>,
    data_type: ImageDataType,
) -> Result<Image, BackendError> {
    let shape = array
        .shape()
        .iter()
        .map(|&dim| usize::try_from(dim))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| BackendError::Codec(err.to_string()))?;
    crate::image_data_type_apply!(data_type, T => {
        let elements = array.retrieve_array_subset::<Vec<T>>(&array.subset_all())?;
        Ok(Image::from(ArrayD::from_shape_vec(IxDyn(&shape), elements)?))
    })
}

/// The data type recorded in the array metadata at `path`.
fn stored_data_type(path: &Path, spec: ZarrSpec) -> Result<ImageDataType, BackendError> {
    let (key, field) = match spec {
        ZarrSpec::V2 => (ZARRAY_KEY, "dtype"),
        ZarrSpec::V3 => (ZARR_JSON_KEY, "data_type"),
    };
    let metadata: serde_json::Value = crate::utils::read_json_file(&path.join(key))?;
    let name = metadata
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| BackendError::InvalidMetadata {
            path: path.to_path_buf(),
            reason: format!("{key} has no string {field}"),
        })?;
    let data_type = match spec {
        ZarrSpec::V2 => ImageDataType::from_v2_dtype(name),
        ZarrSpec::V3 => ImageDataType::from_v3_name(name),
    };
    data_type.ok_or_else(|| BackendError::UnsupportedDataType(name.to_string()))
}

/// The number of elements of the array at `path`, from its metadata.
fn stored_num_elements(path: &Path, spec: ZarrSpec) -> Result<u64, BackendError> {
    let key = match spec {
        ZarrSpec::V2 => ZARRAY_KEY,
        ZarrSpec::V3 => ZARR_JSON_KEY,
    };
    let metadata: serde_json::Value = crate::utils::read_json_file(&path.join(key))?;
    metadata
        .get("shape")
        .and_then(serde_json::Value::as_array)
        .and_then(|shape| shape.iter().map(serde_json::Value::as_u64).product())
        .ok_or_else(|| BackendError::InvalidMetadata {
            path: path.to_path_buf(),
            reason: format!("{key} has no valid shape"),
        })
}

fn ratio(uncompressed: u64, stored: u64) -> f64 {
    uncompressed as f64 / stored as f64
}

/// The uncompressed size of the array at `path` divided by the size reported by its store.
fn store_compression_ratio(path: &Path, spec: ZarrSpec) -> Result<f64, BackendError> {
    let data_type = stored_data_type(path, spec)?;
    let nbytes = stored_num_elements(path, spec)? * data_type.size() as u64;
    let stored = filesystem_store(path)?.size()?;
    Ok(ratio(nbytes, stored))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_names() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.name().parse::<BackendKind>().unwrap(), kind);
            assert_eq!(kind.package().parse::<BackendKind>().unwrap(), kind);
            assert_eq!(create_backend(kind).kind(), kind);
        }
        assert!("tensorstore".parse::<BackendKind>().is_err());
    }

    #[test]
    fn backend_spec_support() {
        assert!(!create_backend(BackendKind::ZarrV2).supports(ZarrSpec::V3));
        for kind in BackendKind::ALL {
            let backend = create_backend(kind);
            assert!(backend.supports(ZarrSpec::V2));
            assert!(backend.supports(backend.default_spec()));
        }
    }

    #[test]
    fn prepare_output_existing_array() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("array.zarr");
        prepare_output(&path, false)?;
        std::fs::create_dir_all(&path)?;
        std::fs::write(path.join(ZARR_JSON_KEY), "{}")?;
        assert!(matches!(
            prepare_output(&path, false),
            Err(BackendError::ArrayExists(_))
        ));
        prepare_output(&path, true)?;
        assert!(!path.exists());
        Ok(())
    }
}
