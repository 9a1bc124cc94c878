use std::path::Path;

use serde_json::{Value, json};
use zarrs::array::{ArrayMetadata, ArrayMetadataV2, ArrayMetadataV3};

use super::{
    BackendError, BackendKind, CompressorDescriptor, StorageBackend, WriteOptions, open_and_retrieve,
    ratio, stored_data_type, stored_num_elements, write_with_metadata,
};
use crate::ZarrSpec;
use crate::compressor::Compressor;
use crate::image::{Image, ImageDataType};
use crate::utils::directory_size;

/// The Zarr V2 `compressor` dictionary for `compressor`.
fn v2_compressor(compressor: &Compressor) -> Value {
    match compressor {
        Compressor::Blosc {
            cname,
            clevel,
            shuffle,
        } => json!({
            "id": "blosc",
            "cname": cname.name(),
            "clevel": clevel,
            "shuffle": shuffle.numcodecs_id(),
            "blocksize": 0,
        }),
        Compressor::Gzip { level } => json!({"id": "gzip", "level": level}),
        Compressor::Zstd { level } => json!({"id": "zstd", "level": level}),
        Compressor::None => Value::Null,
    }
}

/// The Zarr V3 codec chain for `compressor`, starting with the `bytes` codec.
fn v3_codecs(compressor: &Compressor, data_type: ImageDataType) -> Value {
    let bytes = if data_type.size() == 1 {
        json!({"name": "bytes"})
    } else {
        json!({"name": "bytes", "configuration": {"endian": "little"}})
    };
    let compression = match compressor {
        Compressor::Blosc {
            cname,
            clevel,
            shuffle,
        } => json!({
            "name": "blosc",
            "configuration": {
                "cname": cname.name(),
                "clevel": clevel,
                "shuffle": shuffle.name(),
                "typesize": data_type.size(),
                "blocksize": 0,
            }
        }),
        Compressor::Gzip { level } => json!({"name": "gzip", "configuration": {"level": level}}),
        Compressor::Zstd { level } => {
            json!({"name": "zstd", "configuration": {"level": level, "checksum": false}})
        }
        Compressor::None => return json!([bytes]),
    };
    json!([bytes, compression])
}

/// A backend that describes arrays as JSON documents.
///
/// Array metadata, including the compressor, is assembled as plain JSON and validated by deserializing it into
/// Zarr metadata. The stored size is measured by walking the array directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSpecBackend;

impl JsonSpecBackend {
    /// The JSON array metadata for writing `image` with `options`.
    ///
    /// The `compressor` (Zarr V2) or `codecs` (Zarr V3) entry is the [`CompressorDescriptor::Json`] of the backend.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the compressor cannot be described.
    pub fn metadata_json(&self, image: &Image, options: &WriteOptions) -> Result<Value, BackendError> {
        let data_type = image.data_type();
        let descriptor =
            self.compressor_descriptor(&options.compressor, options.zarr_spec, data_type)?;
        let compression = match descriptor {
            CompressorDescriptor::Json(compression) => compression,
            descriptor => return Err(BackendError::UnexpectedDescriptor(descriptor.form())),
        };
        let shape = image.shape_u64();
        Ok(match options.zarr_spec {
            ZarrSpec::V2 => json!({
                "zarr_format": 2,
                "shape": shape,
                "chunks": options.chunk_shape,
                "dtype": data_type.v2_dtype(),
                "compressor": compression,
                "fill_value": data_type.fill_value_json(),
                "order": "C",
                "filters": null,
                "dimension_separator": ".",
            }),
            ZarrSpec::V3 => json!({
                "zarr_format": 3,
                "node_type": "array",
                "shape": shape,
                "data_type": data_type.v3_name(),
                "chunk_grid": {
                    "name": "regular",
                    "configuration": {"chunk_shape": options.chunk_shape},
                },
                "chunk_key_encoding": {
                    "name": "default",
                    "configuration": {"separator": "/"},
                },
                "fill_value": data_type.fill_value_json(),
                "codecs": compression,
                "attributes": {},
            }),
        })
    }
}

impl StorageBackend for JsonSpecBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::JsonSpec
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
        Ok(CompressorDescriptor::Json(match spec {
            ZarrSpec::V2 => v2_compressor(compressor),
            ZarrSpec::V3 => v3_codecs(compressor, data_type),
        }))
    }

    fn write_array(
        &self,
        image: &Image,
        path: &Path,
        options: &WriteOptions,
    ) -> Result<(), BackendError> {
        let document = self.metadata_json(image, options)?;
        let metadata = match options.zarr_spec {
            ZarrSpec::V2 => ArrayMetadata::V2(serde_json::from_value::<ArrayMetadataV2>(document)?),
            ZarrSpec::V3 => ArrayMetadata::V3(serde_json::from_value::<ArrayMetadataV3>(document)?),
        };
        write_with_metadata(image, path, options, metadata)
    }

    fn read_array(&self, path: &Path, spec: ZarrSpec) -> Result<Image, BackendError> {
        open_and_retrieve(path, spec)
    }

    fn compression_ratio(&self, path: &Path, spec: ZarrSpec) -> Result<f64, BackendError> {
        let nbytes = stored_num_elements(path, spec)? * stored_data_type(path, spec)?.size() as u64;
        Ok(ratio(nbytes, directory_size(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::{BloscCname, BloscShuffle};

    #[test]
    fn json_spec_v3_blosc_codecs() {
        let compressor = Compressor::Blosc {
            cname: BloscCname::Zstd,
            clevel: 3,
            shuffle: BloscShuffle::Shuffle,
        };
        let codecs = v3_codecs(&compressor, ImageDataType::Float64);
        assert_eq!(codecs[0]["name"], "bytes");
        assert_eq!(codecs[1]["configuration"]["shuffle"], "shuffle");
        assert_eq!(codecs[1]["configuration"]["typesize"], 8);
        assert_eq!(v3_codecs(&Compressor::None, ImageDataType::UInt8), json!([{"name": "bytes"}]));
    }

    #[test]
    fn json_spec_metadata_is_valid() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::zeros(ImageDataType::UInt16, &[4, 4]);
        for spec in ZarrSpec::ALL {
            let options = WriteOptions::new(vec![2, 2], Compressor::Zstd { level: 1 }, spec);
            let document = JsonSpecBackend.metadata_json(&image, &options)?;
            match spec {
                ZarrSpec::V2 => {
                    assert_eq!(document["compressor"], json!({"id": "zstd", "level": 1}));
                    serde_json::from_value::<ArrayMetadataV2>(document)?;
                }
                ZarrSpec::V3 => {
                    assert_eq!(document["chunk_grid"]["configuration"]["chunk_shape"], json!([2, 2]));
                    assert_eq!(document["codecs"][1], json!({"name": "zstd", "configuration": {"level": 1, "checksum": false}}));
                    serde_json::from_value::<ArrayMetadataV3>(document)?;
                }
            }
        }
        Ok(())
    }
}
