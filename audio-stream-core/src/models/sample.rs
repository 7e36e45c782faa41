use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric encoding of a single audio sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    UInt8,
    Int16,
    /// Packed 24-bit, little-endian, three bytes per sample.
    Int24,
    Int32,
    Float32,
    Float64,
}

/// Storage attributes of a [`SampleType`].
///
/// `size` is the byte width of one sample. `count` is the number of storage
/// elements one sample occupies in a typed buffer: packed 24-bit samples are
/// kept as three bytes, everything else as a single element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleAttributes {
    pub size: usize,
    pub count: usize,
    pub is_float: bool,
    pub is_signed: bool,
}

impl SampleType {
    pub const ALL: [SampleType; 6] = [
        SampleType::UInt8,
        SampleType::Int16,
        SampleType::Int24,
        SampleType::Int32,
        SampleType::Float32,
        SampleType::Float64,
    ];

    pub const fn attributes(self) -> SampleAttributes {
        match self {
            Self::UInt8 => SampleAttributes { size: 1, count: 1, is_float: false, is_signed: false },
            Self::Int16 => SampleAttributes { size: 2, count: 1, is_float: false, is_signed: true },
            Self::Int24 => SampleAttributes { size: 3, count: 3, is_float: false, is_signed: true },
            Self::Int32 => SampleAttributes { size: 4, count: 1, is_float: false, is_signed: true },
            Self::Float32 => SampleAttributes { size: 4, count: 1, is_float: true, is_signed: true },
            Self::Float64 => SampleAttributes { size: 8, count: 1, is_float: true, is_signed: true },
        }
    }

    /// Byte width of one sample.
    pub const fn size(self) -> usize {
        self.attributes().size
    }

    /// Byte that, repeated over a whole sample, encodes silence. Unsigned
    /// samples are centred on 0x80; every other type is silent at all-zero.
    pub const fn silence_byte(self) -> u8 {
        match self {
            Self::UInt8 => 0x80,
            _ => 0,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::Int24 => "int24",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        };
        f.write_str(name)
    }
}
