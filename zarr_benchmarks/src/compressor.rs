//! Backend-agnostic compressor descriptions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ParameterCombination;

/// A compressor description error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompressorError {
    /// An unrecognised blosc shuffle mode.
    #[error("invalid shuffle value for blosc {0}")]
    InvalidShuffle(String),
    /// An unrecognised blosc compressor name.
    #[error("invalid blosc compressor name {0}")]
    InvalidCname(String),
    /// A compression level outside the range supported by the codec.
    #[error("invalid {codec} compression level {level}")]
    InvalidLevel {
        /// The codec name.
        codec: &'static str,
        /// The level.
        level: i64,
    },
    /// A parameter combination is missing a required parameter.
    #[error("parameter combination is missing {0}")]
    MissingParameter(&'static str),
}

/// The blosc shuffle filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloscShuffle {
    /// No shuffling.
    NoShuffle,
    /// Byte shuffling.
    Shuffle,
    /// Bit shuffling.
    BitShuffle,
}

impl BloscShuffle {
    /// The name of the shuffle mode, as used in configurations and Zarr V3 metadata.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoShuffle => "noshuffle",
            Self::Shuffle => "shuffle",
            Self::BitShuffle => "bitshuffle",
        }
    }

    /// The integer encoding of the shuffle mode used by `numcodecs` (Zarr V2).
    #[must_use]
    pub const fn numcodecs_id(self) -> u8 {
        match self {
            Self::NoShuffle => 0,
            Self::Shuffle => 1,
            Self::BitShuffle => 2,
        }
    }
}

impl FromStr for BloscShuffle {
    type Err = CompressorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noshuffle" => Ok(Self::NoShuffle),
            "shuffle" => Ok(Self::Shuffle),
            "bitshuffle" => Ok(Self::BitShuffle),
            _ => Err(CompressorError::InvalidShuffle(s.to_string())),
        }
    }
}

impl fmt::Display for BloscShuffle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The blosc internal compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloscCname {
    /// `blosclz`
    BloscLz,
    /// `lz4`
    Lz4,
    /// `lz4hc`
    Lz4Hc,
    /// `snappy`
    Snappy,
    /// `zlib`
    Zlib,
    /// `zstd`
    Zstd,
}

impl BloscCname {
    /// The compressor name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BloscLz => "blosclz",
            Self::Lz4 => "lz4",
            Self::Lz4Hc => "lz4hc",
            Self::Snappy => "snappy",
            Self::Zlib => "zlib",
            Self::Zstd => "zstd",
        }
    }
}

impl FromStr for BloscCname {
    type Err = CompressorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blosclz" => Ok(Self::BloscLz),
            "lz4" => Ok(Self::Lz4),
            "lz4hc" => Ok(Self::Lz4Hc),
            "snappy" => Ok(Self::Snappy),
            "zlib" => Ok(Self::Zlib),
            "zstd" => Ok(Self::Zstd),
            _ => Err(CompressorError::InvalidCname(s.to_string())),
        }
    }
}

impl fmt::Display for BloscCname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The codec family of a benchmark function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressorFamily {
    /// blosc
    Blosc,
    /// gzip
    Gzip,
    /// zstd
    Zstd,
    /// No compression.
    None,
}

impl CompressorFamily {
    /// The family name used in benchmark function names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blosc => "blosc",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::None => "no_compressor",
        }
    }
}

/// A backend-agnostic compressor description.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Compressor {
    /// blosc with an internal compressor, level and shuffle filter.
    Blosc {
        /// The internal compressor.
        cname: BloscCname,
        /// The compression level (0-9).
        clevel: u8,
        /// The shuffle filter.
        shuffle: BloscShuffle,
    },
    /// gzip with a compression level (0-9).
    Gzip {
        /// The compression level.
        level: u32,
    },
    /// zstd with a compression level.
    Zstd {
        /// The compression level.
        level: i32,
    },
    /// No compression.
    None,
}

impl Compressor {
    /// Create a blosc compressor from configuration values.
    ///
    /// # Errors
    /// Returns a [`CompressorError`] if `cname` or `shuffle` is not recognised or `clevel` is not in `0..=9`.
    pub fn blosc(cname: &str, clevel: i64, shuffle: &str) -> Result<Self, CompressorError> {
        let level_err = CompressorError::InvalidLevel {
            codec: "blosc",
            level: clevel,
        };
        let clevel = u8::try_from(clevel).map_err(|_| level_err.clone())?;
        if clevel > 9 {
            return Err(level_err);
        }
        Ok(Self::Blosc {
            cname: cname.parse()?,
            clevel,
            shuffle: shuffle.parse()?,
        })
    }

    /// Create a gzip compressor from a configuration value.
    ///
    /// # Errors
    /// Returns [`CompressorError::InvalidLevel`] if `level` is not in `0..=9`.
    pub fn gzip(level: i64) -> Result<Self, CompressorError> {
        match u32::try_from(level) {
            Ok(level @ 0..=9) => Ok(Self::Gzip { level }),
            _ => Err(CompressorError::InvalidLevel {
                codec: "gzip",
                level,
            }),
        }
    }

    /// Create a zstd compressor from a configuration value.
    ///
    /// # Errors
    /// Returns [`CompressorError::InvalidLevel`] if `level` is not in `-131072..=22`.
    pub fn zstd(level: i64) -> Result<Self, CompressorError> {
        match i32::try_from(level) {
            Ok(level @ -131_072..=22) => Ok(Self::Zstd { level }),
            _ => Err(CompressorError::InvalidLevel {
                codec: "zstd",
                level,
            }),
        }
    }

    /// Create the compressor of `family` from the values of a parameter combination.
    ///
    /// # Errors
    /// Returns a [`CompressorError`] if a required parameter is missing or invalid.
    pub fn from_combination(
        family: CompressorFamily,
        combination: &ParameterCombination,
    ) -> Result<Self, CompressorError> {
        let int = |name: &'static str| {
            combination
                .get_int(name)
                .ok_or(CompressorError::MissingParameter(name))
        };
        let string = |name: &'static str| {
            combination
                .get_str(name)
                .ok_or(CompressorError::MissingParameter(name))
        };
        match family {
            CompressorFamily::Blosc => Self::blosc(
                string("blosc_cname")?,
                int("blosc_clevel")?,
                string("blosc_shuffle")?,
            ),
            CompressorFamily::Gzip => Self::gzip(int("gzip_level")?),
            CompressorFamily::Zstd => Self::zstd(int("zstd_level")?),
            CompressorFamily::None => Ok(Self::None),
        }
    }

    /// The codec family.
    #[must_use]
    pub const fn family(&self) -> CompressorFamily {
        match self {
            Self::Blosc { .. } => CompressorFamily::Blosc,
            Self::Gzip { .. } => CompressorFamily::Gzip,
            Self::Zstd { .. } => CompressorFamily::Zstd,
            Self::None => CompressorFamily::None,
        }
    }
}

impl fmt::Display for Compressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blosc {
                cname,
                clevel,
                shuffle,
            } => write!(f, "blosc-{cname} (level {clevel}, {shuffle})"),
            Self::Gzip { level } => write!(f, "gzip (level {level})"),
            Self::Zstd { level } => write!(f, "zstd (level {level})"),
            Self::None => f.write_str("none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParamValue;

    #[test]
    fn blosc_shuffle_names() {
        assert_eq!("noshuffle".parse(), Ok(BloscShuffle::NoShuffle));
        assert_eq!("shuffle".parse(), Ok(BloscShuffle::Shuffle));
        assert_eq!("bitshuffle".parse(), Ok(BloscShuffle::BitShuffle));
        assert_eq!(BloscShuffle::BitShuffle.numcodecs_id(), 2);
        let err = "byteshuffle".parse::<BloscShuffle>().unwrap_err();
        assert_eq!(err, CompressorError::InvalidShuffle("byteshuffle".to_string()));
        assert_eq!(err.to_string(), "invalid shuffle value for blosc byteshuffle");
    }

    #[test]
    fn compressor_levels() {
        assert!(Compressor::gzip(9).is_ok());
        assert!(Compressor::gzip(10).is_err());
        assert!(Compressor::zstd(19).is_ok());
        assert!(Compressor::zstd(23).is_err());
        assert!(Compressor::blosc("zstd", 10, "shuffle").is_err());
        assert!(Compressor::blosc("lzma", 1, "shuffle").is_err());
    }

    #[test]
    fn compressor_from_combination() {
        let combination = ParameterCombination::new(
            vec!["chunk_size", "blosc_clevel", "blosc_shuffle", "blosc_cname"],
            vec![
                ParamValue::Int(64),
                ParamValue::Int(5),
                ParamValue::from("bitshuffle"),
                ParamValue::from("lz4hc"),
            ],
        );
        assert_eq!(
            Compressor::from_combination(CompressorFamily::Blosc, &combination),
            Ok(Compressor::Blosc {
                cname: BloscCname::Lz4Hc,
                clevel: 5,
                shuffle: BloscShuffle::BitShuffle
            })
        );
        assert_eq!(
            Compressor::from_combination(CompressorFamily::Gzip, &combination),
            Err(CompressorError::MissingParameter("gzip_level"))
        );
        assert_eq!(
            Compressor::from_combination(CompressorFamily::None, &combination),
            Ok(Compressor::None)
        );
    }
}
