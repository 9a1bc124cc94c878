use std::path::Path;

use serde::{Deserialize, Serialize};
use zarrs::array::{ArrayMetadata, ArrayMetadataV2};

use super::{
    BackendError, BackendKind, CompressorDescriptor, StorageBackend, WriteOptions, check_spec,
    open_and_retrieve, store_compression_ratio, write_with_metadata,
};
use crate::ZarrSpec;
use crate::compressor::{BloscCname, Compressor};
use crate::image::{Image, ImageDataType};

/// A `numcodecs` compressor, as stored in the `compressor` field of Zarr V2 array metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "lowercase")]
pub enum NumcodecsCompressor {
    /// `numcodecs.Blosc`
    Blosc {
        /// The internal compressor.
        cname: BloscCname,
        /// The compression level.
        clevel: u8,
        /// The shuffle filter: 0 (none), 1 (byte) or 2 (bit).
        shuffle: u8,
        /// The block size, 0 for automatic.
        blocksize: usize,
    },
    /// `numcodecs.GZip`
    Gzip {
        /// The compression level.
        level: u32,
    },
    /// `numcodecs.Zstd`
    Zstd {
        /// The compression level.
        level: i32,
    },
}

impl NumcodecsCompressor {
    /// The `numcodecs` compressor for `compressor`, [`None`] for no compression.
    #[must_use]
    pub fn from_compressor(compressor: &Compressor) -> Option<Self> {
        match *compressor {
            Compressor::Blosc {
                cname,
                clevel,
                shuffle,
            } => Some(Self::Blosc {
                cname,
                clevel,
                shuffle: shuffle.numcodecs_id(),
                blocksize: 0,
            }),
            Compressor::Gzip { level } => Some(Self::Gzip { level }),
            Compressor::Zstd { level } => Some(Self::Zstd { level }),
            Compressor::None => None,
        }
    }
}

/// Zarr V2 `.zarray` metadata.
#[derive(Debug, Serialize)]
struct Zarray<'a> {
    zarr_format: u8,
    shape: &'a [u64],
    chunks: &'a [u64],
    dtype: &'static str,
    compressor: Option<NumcodecsCompressor>,
    fill_value: serde_json::Value,
    order: &'static str,
    filters: Option<()>,
    dimension_separator: &'static str,
}

/// Build Zarr V2 array metadata with a `numcodecs` compressor.
pub(super) fn numcodecs_metadata(
    image: &Image,
    chunk_shape: &[u64],
    compressor: Option<NumcodecsCompressor>,
) -> Result<ArrayMetadata, BackendError> {
    let data_type = image.data_type();
    let zarray = Zarray {
        zarr_format: 2,
        shape: &image.shape_u64(),
        chunks: chunk_shape,
        dtype: data_type.v2_dtype(),
        compressor,
        fill_value: data_type.fill_value_json(),
        order: "C",
        filters: None,
        dimension_separator: ".",
    };
    let metadata: ArrayMetadataV2 = serde_json::from_value(serde_json::to_value(&zarray)?)?;
    Ok(ArrayMetadata::V2(metadata))
}

/// A Zarr V2 only backend.
///
/// Compressors are `numcodecs` style structures with an integer blosc shuffle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZarrV2Backend;

impl StorageBackend for ZarrV2Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::ZarrV2
    }

    fn supports(&self, spec: ZarrSpec) -> bool {
        spec == ZarrSpec::V2
    }

    fn default_spec(&self) -> ZarrSpec {
        ZarrSpec::V2
    }

    fn compressor_descriptor(
        &self,
        compressor: &Compressor,
        spec: ZarrSpec,
        _data_type: ImageDataType,
    ) -> Result<CompressorDescriptor, BackendError> {
        check_spec(self, spec)?;
        Ok(CompressorDescriptor::Numcodecs(
            NumcodecsCompressor::from_compressor(compressor),
        ))
    }

    fn write_array(
        &self,
        image: &Image,
        path: &Path,
        options: &WriteOptions,
    ) -> Result<(), BackendError> {
        let descriptor =
            self.compressor_descriptor(&options.compressor, options.zarr_spec, image.data_type())?;
        let compressor = match descriptor {
            CompressorDescriptor::Numcodecs(compressor) => compressor,
            descriptor => return Err(BackendError::UnexpectedDescriptor(descriptor.form())),
        };
        let metadata = numcodecs_metadata(image, &options.chunk_shape, compressor)?;
        write_with_metadata(image, path, options, metadata)
    }

    fn read_array(&self, path: &Path, spec: ZarrSpec) -> Result<Image, BackendError> {
        check_spec(self, spec)?;
        open_and_retrieve(path, spec)
    }

    fn compression_ratio(&self, path: &Path, spec: ZarrSpec) -> Result<f64, BackendError> {
        check_spec(self, spec)?;
        store_compression_ratio(path, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::BloscShuffle;

    #[test]
    fn numcodecs_blosc_json() -> Result<(), Box<dyn std::error::Error>> {
        let compressor = Compressor::Blosc {
            cname: BloscCname::Zstd,
            clevel: 3,
            shuffle: BloscShuffle::BitShuffle,
        };
        let numcodecs = NumcodecsCompressor::from_compressor(&compressor);
        assert_eq!(
            serde_json::to_value(&numcodecs)?,
            serde_json::json!({"id": "blosc", "cname": "zstd", "clevel": 3, "shuffle": 2, "blocksize": 0})
        );
        assert_eq!(NumcodecsCompressor::from_compressor(&Compressor::None), None);
        Ok(())
    }

    #[test]
    fn zarr_v2_rejects_v3() {
        let descriptor = ZarrV2Backend.compressor_descriptor(
            &Compressor::None,
            ZarrSpec::V3,
            ImageDataType::Float64,
        );
        assert!(matches!(
            descriptor,
            Err(BackendError::UnsupportedZarrSpec { .. })
        ));
    }

    #[test]
    fn zarr_v2_writes_its_descriptor() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("array.zarr");
        let image = Image::zeros(ImageDataType::Int32, &[4, 4]);
        let compressor = Compressor::Zstd { level: 7 };
        let options = WriteOptions::new(vec![2, 2], compressor.clone(), ZarrSpec::V2);
        ZarrV2Backend.write_array(&image, &path, &options)?;

        let CompressorDescriptor::Numcodecs(expected) =
            ZarrV2Backend.compressor_descriptor(&compressor, ZarrSpec::V2, image.data_type())?
        else {
            panic!("zarr_v2 descriptors are numcodecs compressors");
        };
        let zarray: serde_json::Value = crate::utils::read_json_file(&path.join(".zarray"))?;
        assert_eq!(zarray["compressor"], serde_json::to_value(expected)?);
        Ok(())
    }
}
