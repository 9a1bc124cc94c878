//! In-memory benchmark images.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::ZarrSpec;
use crate::backend::{BackendError, StorageBackend, ZarrV2Backend};

/// The edge length of the [`ImageKind::Dev`] image.
pub const DEV_IMAGE_SIZE: usize = 128;

/// The environment variable overriding the dataset cache directory.
pub const CACHE_DIR_ENV: &str = "ZARR_BENCHMARKS_CACHE";

/// The element type of an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageDataType {
    /// `uint8`
    UInt8,
    /// `uint16`
    UInt16,
    /// `uint32`
    UInt32,
    /// `uint64`
    UInt64,
    /// `int8`
    Int8,
    /// `int16`
    Int16,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `float32`
    Float32,
    /// `float64`
    Float64,
}

impl ImageDataType {
    /// Every supported data type.
    pub const ALL: [Self; 10] = [
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Float32,
        Self::Float64,
    ];

    /// The size of one element in bytes.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::UInt64 | Self::Int64 | Self::Float64 => 8,
        }
    }

    /// The Zarr V3 data type name, e.g. `float64`.
    #[must_use]
    pub const fn v3_name(self) -> &'static str {
        match self {
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// The little-endian Zarr V2 (`NumPy`) dtype string, e.g. `<f8`.
    #[must_use]
    pub const fn v2_dtype(self) -> &'static str {
        match self {
            Self::UInt8 => "|u1",
            Self::UInt16 => "<u2",
            Self::UInt32 => "<u4",
            Self::UInt64 => "<u8",
            Self::Int8 => "|i1",
            Self::Int16 => "<i2",
            Self::Int32 => "<i4",
            Self::Int64 => "<i8",
            Self::Float32 => "<f4",
            Self::Float64 => "<f8",
        }
    }

    /// Match a Zarr V3 data type name.
    #[must_use]
    pub fn from_v3_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|data_type| data_type.v3_name() == name)
    }

    /// Match a Zarr V2 dtype string. Single byte types accept any byte order character.
    #[must_use]
    pub fn from_v2_dtype(dtype: &str) -> Option<Self> {
        let (order, kind) = dtype.split_at_checked(1)?;
        Self::ALL.into_iter().find(|data_type| {
            let (expected_order, expected_kind) = data_type.v2_dtype().split_at(1);
            expected_kind == kind
                && (expected_order == order || (data_type.size() == 1 && matches!(order, "<" | ">")))
        })
    }

    /// The matching [`zarrs`] data type.
    #[must_use]
    pub fn zarrs_data_type(self) -> zarrs::array::DataType {
        use zarrs::array::data_type;
        match self {
            Self::UInt8 => data_type::uint8(),
            Self::UInt16 => data_type::uint16(),
            Self::UInt32 => data_type::uint32(),
            Self::UInt64 => data_type::uint64(),
            Self::Int8 => data_type::int8(),
            Self::Int16 => data_type::int16(),
            Self::Int32 => data_type::int32(),
            Self::Int64 => data_type::int64(),
            Self::Float32 => data_type::float32(),
            Self::Float64 => data_type::float64(),
        }
    }

    /// The fill value as JSON metadata.
    #[must_use]
    pub fn fill_value_json(self) -> serde_json::Value {
        match self {
            Self::Float32 | Self::Float64 => serde_json::json!(0.0),
            Self::UInt8
            | Self::UInt16
            | Self::UInt32
            | Self::UInt64
            | Self::Int8
            | Self::Int16
            | Self::Int32
            | Self::Int64 => serde_json::json!(0),
        }
    }
}

impl fmt::Display for ImageDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.v3_name())
    }
}

/// A dense n-dimensional image held in memory.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Image {
    UInt8(ArrayD<u8>),
    UInt16(ArrayD<u16>),
    UInt32(ArrayD<u32>),
    UInt64(ArrayD<u64>),
    Int8(ArrayD<i8>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Int64(ArrayD<i64>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

/// Evaluate `$body` with `$array` bound to the typed array of an [`Image`].
#[macro_export]
macro_rules! image_apply {
    ($image:expr, $array:ident => $body:expr) => {
        match $image {
            $crate::image::Image::UInt8($array) => $body,
            $crate::image::Image::UInt16($array) => $body,
            $crate::image::Image::UInt32($array) => $body,
            $crate::image::Image::UInt64($array) => $body,
            $crate::image::Image::Int8($array) => $body,
            $crate::image::Image::Int16($array) => $body,
            $crate::image::Image::Int32($array) => $body,
            $crate::image::Image::Int64($array) => $body,
            $crate::image::Image::Float32($array) => $body,
            $crate::image::Image::Float64($array) => $body,
        }
    };
}

/// Evaluate `$body` with `$T` bound to the element type of an [`ImageDataType`].
#[macro_export]
macro_rules! image_data_type_apply {
    ($data_type:expr, $T:ident => $body:expr) => {
        match $data_type {
            $crate::image::ImageDataType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::image::ImageDataType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::image::ImageDataType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::image::ImageDataType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::image::ImageDataType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::image::ImageDataType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::image::ImageDataType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::image::ImageDataType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::image::ImageDataType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::image::ImageDataType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}

macro_rules! impl_image_from {
    ($($variant:ident $T:ty),*) => {
        $(
            impl From<ArrayD<$T>> for Image {
                fn from(array: ArrayD<$T>) -> Self {
                    Self::$variant(array)
                }
            }
        )*
    };
}

impl_image_from!(
    UInt8 u8, UInt16 u16, UInt32 u32, UInt64 u64,
    Int8 i8, Int16 i16, Int32 i32, Int64 i64,
    Float32 f32, Float64 f64
);

impl Image {
    /// A [`DEV_IMAGE_SIZE`]³ `float64` image of uniform random values in `[0, 1)`.
    ///
    /// The values are reproducible if a `seed` is supplied.
    #[must_use]
    pub fn dev(seed: Option<u64>) -> Self {
        let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let shape = IxDyn(&[DEV_IMAGE_SIZE; 3]);
        Self::Float64(ArrayD::from_shape_fn(shape, |_| rng.r#gen::<f64>()))
    }

    /// An image of `shape` filled with zeros.
    #[must_use]
    pub fn zeros(data_type: ImageDataType, shape: &[usize]) -> Self {
        image_data_type_apply!(data_type, T => Self::from(ArrayD::<T>::zeros(IxDyn(shape))))
    }

    /// The element type.
    #[must_use]
    pub const fn data_type(&self) -> ImageDataType {
        match self {
            Self::UInt8(_) => ImageDataType::UInt8,
            Self::UInt16(_) => ImageDataType::UInt16,
            Self::UInt32(_) => ImageDataType::UInt32,
            Self::UInt64(_) => ImageDataType::UInt64,
            Self::Int8(_) => ImageDataType::Int8,
            Self::Int16(_) => ImageDataType::Int16,
            Self::Int32(_) => ImageDataType::Int32,
            Self::Int64(_) => ImageDataType::Int64,
            Self::Float32(_) => ImageDataType::Float32,
            Self::Float64(_) => ImageDataType::Float64,
        }
    }

    /// The image shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        image_apply!(self, array => array.shape())
    }

    /// The image shape as `u64`, as used by [`zarrs`].
    #[must_use]
    pub fn shape_u64(&self) -> Vec<u64> {
        self.shape().iter().map(|&dim| dim as u64).collect()
    }

    /// The number of elements.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        image_apply!(self, array => array.len())
    }

    /// The uncompressed size in bytes.
    #[must_use]
    pub fn nbytes(&self) -> u64 {
        (self.num_elements() * self.data_type().size()) as u64
    }
}

/// An image loading error.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The dataset has not been fetched into the cache.
    #[error("dataset {name} not found at {path}, fetch it into the cache first")]
    NotCached {
        /// The dataset name.
        name: &'static str,
        /// The expected path.
        path: PathBuf,
    },
    /// No cache directory could be determined.
    #[error("unable to determine the dataset cache directory, set {CACHE_DIR_ENV}")]
    NoCacheDir,
    /// Reading the dataset failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// An unrecognised image name.
    #[error("invalid image {0}, expected one of dev, heart, dense")]
    InvalidImage(String),
}

/// The image benchmarks are run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    /// A small random image for development runs.
    Dev,
    /// An image of a heart from the Human Organ Atlas.
    Heart,
    /// A dense segmentation, a small subset of the H01 C3 segmentation.
    Dense,
}

impl ImageKind {
    /// The dataset name in the cache, [`None`] for generated images.
    #[must_use]
    pub const fn dataset_name(self) -> Option<&'static str> {
        match self {
            Self::Dev => None,
            Self::Heart => Some("200.64um_LADAF-2021-17_heart_complete-organ_pag.zarr"),
            Self::Dense => Some("H01-c3-subset.zarr"),
        }
    }
}

impl FromStr for ImageKind {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Self::Dev),
            "heart" => Ok(Self::Heart),
            "dense" => Ok(Self::Dense),
            _ => Err(ImageError::InvalidImage(s.to_string())),
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dev => "dev",
            Self::Heart => "heart",
            Self::Dense => "dense",
        })
    }
}

/// Return the dataset cache directory.
///
/// This is `$ZARR_BENCHMARKS_CACHE` if set, otherwise `zarr-benchmarks` under `$XDG_CACHE_HOME` or `$HOME/.cache`.
#[must_use]
pub fn cache_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CACHE_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| Path::new(&home).join(".cache")))
        .map(|cache| cache.join("zarr-benchmarks"))
}

/// Return the path of a cached dataset, `<cache_dir>/<name>.zip.unzip/<name>`.
#[must_use]
pub fn dataset_path(cache_dir: &Path, name: &str) -> PathBuf {
    cache_dir.join(format!("{name}.zip.unzip")).join(name)
}

/// Load the image of `kind`.
///
/// Datasets are read as Zarr V2 arrays from `cache_dir`.
///
/// # Errors
/// Returns an [`ImageError`] if a dataset is not cached or cannot be read.
pub fn load_image(
    kind: ImageKind,
    cache_dir: Option<&Path>,
    seed: Option<u64>,
) -> Result<Image, ImageError> {
    let Some(name) = kind.dataset_name() else {
        return Ok(Image::dev(seed));
    };
    let cache_dir = cache_dir.ok_or(ImageError::NoCacheDir)?;
    let path = dataset_path(cache_dir, name);
    if !path.is_dir() {
        return Err(ImageError::NotCached { name, path });
    }
    log::info!("reading {kind} image from {}", path.display());
    Ok(ZarrV2Backend.read_array(&path, ZarrSpec::V2)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_image() {
        let image = Image::dev(Some(42));
        assert_eq!(image.shape(), [DEV_IMAGE_SIZE; 3]);
        assert_eq!(image.data_type(), ImageDataType::Float64);
        assert_eq!(image.nbytes(), 8 * 128 * 128 * 128);
        assert_eq!(image, Image::dev(Some(42)));
        let Image::Float64(array) = image else {
            panic!("expected float64")
        };
        assert!(array.iter().all(|value| (0.0..1.0).contains(value)));
    }

    #[test]
    fn data_type_names() {
        for data_type in ImageDataType::ALL {
            assert_eq!(ImageDataType::from_v3_name(data_type.v3_name()), Some(data_type));
            assert_eq!(ImageDataType::from_v2_dtype(data_type.v2_dtype()), Some(data_type));
        }
        assert_eq!(ImageDataType::from_v2_dtype("<u1"), Some(ImageDataType::UInt8));
        assert_eq!(ImageDataType::from_v2_dtype(">f8"), None);
        assert_eq!(ImageDataType::from_v3_name("complex64"), None);
    }

    #[test]
    fn dataset_not_cached() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_image(ImageKind::Heart, Some(dir.path()), None).unwrap_err();
        assert!(matches!(err, ImageError::NotCached { .. }));
        assert!(matches!(
            load_image(ImageKind::Dense, None, None),
            Err(ImageError::NoCacheDir)
        ));
        assert!(matches!(load_image(ImageKind::Dev, None, Some(0)), Ok(Image::Float64(_))));
    }
}
