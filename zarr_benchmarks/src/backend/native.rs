use std::path::Path;
use std::sync::Arc;

use zarrs::array::codec::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode, GzipCodec, ZstdCodec,
};
use zarrs::array::{ArrayBuilder, BytesToBytesCodecTraits};

use super::{
    BackendError, BackendKind, CompressorDescriptor, NumcodecsCompressor, StorageBackend,
    WriteOptions, check_spec, codec_options, filesystem_store, open_and_retrieve, prepare_output,
    store_compression_ratio, store_image, write_with_metadata, zarr_v2::numcodecs_metadata,
};
use crate::ZarrSpec;
use crate::compressor::Compressor;
use crate::image::{Image, ImageDataType};

fn codec_error(err: impl std::fmt::Display) -> BackendError {
    BackendError::Codec(err.to_string())
}

/// Create the [`zarrs`] bytes-to-bytes codecs for `compressor`.
///
/// The blosc `typesize` is the element size of `data_type`.
fn bytes_to_bytes_codecs(
    compressor: &Compressor,
    data_type: ImageDataType,
) -> Result<Vec<Arc<dyn BytesToBytesCodecTraits>>, BackendError> {
    let codec: Arc<dyn BytesToBytesCodecTraits> = match *compressor {
        Compressor::Blosc {
            cname,
            clevel,
            shuffle,
        } => {
            let cname: BloscCompressor = serde_json::from_value(cname.name().into())?;
            let shuffle_mode: BloscShuffleMode = serde_json::from_value(shuffle.name().into())?;
            let clevel = BloscCompressionLevel::try_from(clevel).map_err(codec_error)?;
            Arc::new(
                BloscCodec::new(
                    cname,
                    clevel,
                    None,
                    shuffle_mode,
                    Some(data_type.size()),
                )
                .map_err(codec_error)?,
            )
        }
        Compressor::Gzip { level } => Arc::new(GzipCodec::new(level).map_err(codec_error)?),
        Compressor::Zstd { level } => Arc::new(ZstdCodec::new(level, false)),
        Compressor::None => return Ok(Vec::new()),
    };
    Ok(vec![codec])
}

/// A backend built on the [`zarrs`] array API.
///
/// Zarr V3 arrays are created with [`ArrayBuilder`] and typed codec objects.
/// Zarr V2 arrays use `numcodecs` compressor metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl StorageBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Zarrs
    }

    fn supports(&self, _spec: ZarrSpec) -> bool {
        true
    }

    fn default_spec(&self) -> ZarrSpec {
        ZarrSpec::V3
    }

    fn compressor_descriptor(
        &self,
        compressor: &Compressor,
        spec: ZarrSpec,
        data_type: ImageDataType,
    ) -> Result<CompressorDescriptor, BackendError> {
        match spec {
            ZarrSpec::V2 => Ok(CompressorDescriptor::Numcodecs(
                NumcodecsCompressor::from_compressor(compressor),
            )),
            ZarrSpec::V3 => Ok(CompressorDescriptor::Codecs(bytes_to_bytes_codecs(
                compressor, data_type,
            )?)),
        }
    }

    fn write_array(
        &self,
        image: &Image,
        path: &Path,
        options: &WriteOptions,
    ) -> Result<(), BackendError> {
        check_spec(self, options.zarr_spec)?;
        let data_type = image.data_type();
        match self.compressor_descriptor(&options.compressor, options.zarr_spec, data_type)? {
            CompressorDescriptor::Codecs(codecs) => {
                prepare_output(path, options.overwrite)?;
                let mut builder = crate::image_data_type_apply!(data_type, T => ArrayBuilder::new(
                    image.shape_u64(),
                    options.chunk_shape.clone(),
                    data_type.zarrs_data_type(),
                    T::default(),
                ));
                builder.bytes_to_bytes_codecs(codecs);
                let array = builder
                    .build(filesystem_store(path)?, "/")?
                    .with_codec_options(codec_options(options.write_empty_chunks));
                array.store_metadata()?;
                store_image(&array, image)
            }
            CompressorDescriptor::Numcodecs(compressor) => {
                let metadata = numcodecs_metadata(image, &options.chunk_shape, compressor)?;
                write_with_metadata(image, path, options, metadata)
            }
            descriptor @ CompressorDescriptor::Json(_) => {
                Err(BackendError::UnexpectedDescriptor(descriptor.form()))
            }
        }
    }

    fn read_array(&self, path: &Path, spec: ZarrSpec) -> Result<Image, BackendError> {
        open_and_retrieve(path, spec)
    }

    fn compression_ratio(&self, path: &Path, spec: ZarrSpec) -> Result<f64, BackendError> {
        store_compression_ratio(path, spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{BloscCname, BloscShuffle};

    #[test]
    fn native_codecs() -> Result<(), Box<dyn std::error::Error>> {
        let blosc = Compressor::Blosc {
            cname: BloscCname::Lz4,
            clevel: 5,
            shuffle: BloscShuffle::Shuffle,
        };
        for compressor in [blosc, Compressor::Gzip { level: 1 }, Compressor::Zstd { level: 3 }] {
            let codecs = bytes_to_bytes_codecs(&compressor, ImageDataType::Float64)?;
            assert_eq!(codecs.len(), 1);
        }
        assert!(bytes_to_bytes_codecs(&Compressor::None, ImageDataType::UInt8)?.is_empty());
        Ok(())
    }

    #[test]
    fn native_descriptor_per_spec() -> Result<(), Box<dyn std::error::Error>> {
        let compressor = Compressor::Gzip { level: 5 };
        assert!(matches!(
            NativeBackend.compressor_descriptor(&compressor, ZarrSpec::V2, ImageDataType::Int16)?,
            CompressorDescriptor::Numcodecs(Some(NumcodecsCompressor::Gzip { level: 5 }))
        ));
        assert!(matches!(
            NativeBackend.compressor_descriptor(&compressor, ZarrSpec::V3, ImageDataType::Int16)?,
            CompressorDescriptor::Codecs(codecs) if codecs.len() == 1
        ));
        Ok(())
    }
}
