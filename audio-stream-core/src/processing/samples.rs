//! Typed sample storage and per-type conversion.
//!
//! Driver memory is untyped bytes; these types give application code a
//! typed view of it. Normalized values are `f64` in `[-1.0, 1.0]`.

use crate::models::sample::SampleType;

const INT24_MAX: f64 = 8_388_607.0;

fn u8_to_norm(v: u8) -> f64 {
    (v as f64 - 128.0) / 128.0
}

fn norm_to_u8(v: f64) -> u8 {
    (v.clamp(-1.0, 1.0) * 127.0 + 128.0).round() as u8
}

fn i16_to_norm(v: i16) -> f64 {
    v as f64 / 32_768.0
}

fn norm_to_i16(v: f64) -> i16 {
    (v.clamp(-1.0, 1.0) * i16::MAX as f64).round() as i16
}

fn i24_to_norm(b: &[u8]) -> f64 {
    let v = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
    v as f64 / 8_388_608.0
}

fn norm_to_i24(v: f64, out: &mut [u8]) {
    let v = (v.clamp(-1.0, 1.0) * INT24_MAX).round() as i32;
    out[..3].copy_from_slice(&v.to_le_bytes()[..3]);
}

fn i32_to_norm(v: i32) -> f64 {
    v as f64 / 2_147_483_648.0
}

fn norm_to_i32(v: f64) -> i32 {
    (v.clamp(-1.0, 1.0) * i32::MAX as f64).round() as i32
}

/// Decode one sample of `sample` from driver bytes into a normalized value.
pub fn decode(sample: SampleType, bytes: &[u8]) -> f64 {
    match sample {
        SampleType::UInt8 => u8_to_norm(bytes[0]),
        SampleType::Int16 => i16_to_norm(i16::from_ne_bytes([bytes[0], bytes[1]])),
        SampleType::Int24 => i24_to_norm(bytes),
        SampleType::Int32 => i32_to_norm(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        SampleType::Float32 => f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
        SampleType::Float64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[..8]);
            f64::from_ne_bytes(raw)
        }
    }
}

/// Encode a normalized value as one sample of `sample` into driver bytes.
pub fn encode(sample: SampleType, value: f64, out: &mut [u8]) {
    match sample {
        SampleType::UInt8 => out[0] = norm_to_u8(value),
        SampleType::Int16 => out[..2].copy_from_slice(&norm_to_i16(value).to_ne_bytes()),
        SampleType::Int24 => norm_to_i24(value, out),
        SampleType::Int32 => out[..4].copy_from_slice(&norm_to_i32(value).to_ne_bytes()),
        SampleType::Float32 => out[..4].copy_from_slice(&(value as f32).to_ne_bytes()),
        SampleType::Float64 => out[..8].copy_from_slice(&value.to_ne_bytes()),
    }
}

/// Owned, typed sample storage. Packed 24-bit samples are kept as three
/// bytes each.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    Int24(Vec<u8>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl SampleBuffer {
    /// Silent storage for `samples` samples.
    pub fn new(sample: SampleType, samples: usize) -> Self {
        let elements = samples * sample.attributes().count;
        match sample {
            SampleType::UInt8 => Self::UInt8(vec![sample.silence_byte(); elements]),
            SampleType::Int16 => Self::Int16(vec![0; elements]),
            SampleType::Int24 => Self::Int24(vec![0; elements]),
            SampleType::Int32 => Self::Int32(vec![0; elements]),
            SampleType::Float32 => Self::Float32(vec![0.0; elements]),
            SampleType::Float64 => Self::Float64(vec![0.0; elements]),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Self::UInt8(_) => SampleType::UInt8,
            Self::Int16(_) => SampleType::Int16,
            Self::Int24(_) => SampleType::Int24,
            Self::Int32(_) => SampleType::Int32,
            Self::Float32(_) => SampleType::Float32,
            Self::Float64(_) => SampleType::Float64,
        }
    }

    /// Capacity in samples.
    pub fn len(&self) -> usize {
        self.samples(usize::MAX).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset every sample to silence.
    pub fn clear(&mut self) {
        match self {
            Self::UInt8(v) => v.fill(SampleType::UInt8.silence_byte()),
            Self::Int24(v) => v.fill(0),
            Self::Int16(v) => v.fill(0),
            Self::Int32(v) => v.fill(0),
            Self::Float32(v) => v.fill(0.0),
            Self::Float64(v) => v.fill(0.0),
        }
    }

    /// Set sample `index` from its native byte representation.
    pub fn load(&mut self, index: usize, bytes: &[u8]) {
        match self {
            Self::UInt8(v) => v[index] = bytes[0],
            Self::Int16(v) => v[index] = i16::from_ne_bytes([bytes[0], bytes[1]]),
            Self::Int24(v) => v[index * 3..index * 3 + 3].copy_from_slice(&bytes[..3]),
            Self::Int32(v) => v[index] = i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::Float32(v) => v[index] = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::Float64(v) => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                v[index] = f64::from_ne_bytes(raw);
            }
        }
    }

    /// Write sample `index` in its native byte representation.
    pub fn store(&self, index: usize, out: &mut [u8]) {
        match self {
            Self::UInt8(v) => out[0] = v[index],
            Self::Int16(v) => out[..2].copy_from_slice(&v[index].to_ne_bytes()),
            Self::Int24(v) => out[..3].copy_from_slice(&v[index * 3..index * 3 + 3]),
            Self::Int32(v) => out[..4].copy_from_slice(&v[index].to_ne_bytes()),
            Self::Float32(v) => out[..4].copy_from_slice(&v[index].to_ne_bytes()),
            Self::Float64(v) => out[..8].copy_from_slice(&v[index].to_ne_bytes()),
        }
    }

    /// View of the first `count` samples (clamped to capacity).
    pub fn samples(&self, count: usize) -> Samples<'_> {
        match self {
            Self::UInt8(v) => Samples::UInt8(&v[..count.min(v.len())]),
            Self::Int16(v) => Samples::Int16(&v[..count.min(v.len())]),
            Self::Int24(v) => Samples::Int24(&v[..count.saturating_mul(3).min(v.len())]),
            Self::Int32(v) => Samples::Int32(&v[..count.min(v.len())]),
            Self::Float32(v) => Samples::Float32(&v[..count.min(v.len())]),
            Self::Float64(v) => Samples::Float64(&v[..count.min(v.len())]),
        }
    }

    pub fn samples_mut(&mut self, count: usize) -> SamplesMut<'_> {
        match self {
            Self::UInt8(v) => {
                let n = count.min(v.len());
                SamplesMut::UInt8(&mut v[..n])
            }
            Self::Int16(v) => {
                let n = count.min(v.len());
                SamplesMut::Int16(&mut v[..n])
            }
            Self::Int24(v) => {
                let n = count.saturating_mul(3).min(v.len());
                SamplesMut::Int24(&mut v[..n])
            }
            Self::Int32(v) => {
                let n = count.min(v.len());
                SamplesMut::Int32(&mut v[..n])
            }
            Self::Float32(v) => {
                let n = count.min(v.len());
                SamplesMut::Float32(&mut v[..n])
            }
            Self::Float64(v) => {
                let n = count.min(v.len());
                SamplesMut::Float64(&mut v[..n])
            }
        }
    }
}

/// Borrowed, typed samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Samples<'a> {
    UInt8(&'a [u8]),
    Int16(&'a [i16]),
    /// Three little-endian bytes per sample.
    Int24(&'a [u8]),
    Int32(&'a [i32]),
    Float32(&'a [f32]),
    Float64(&'a [f64]),
}

impl Samples<'_> {
    pub fn sample_type(&self) -> SampleType {
        match self {
            Self::UInt8(_) => SampleType::UInt8,
            Self::Int16(_) => SampleType::Int16,
            Self::Int24(_) => SampleType::Int24,
            Self::Int32(_) => SampleType::Int32,
            Self::Float32(_) => SampleType::Float32,
            Self::Float64(_) => SampleType::Float64,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Self::UInt8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int24(v) => v.len() / 3,
            Self::Int32(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalized value of sample `index`.
    pub fn get(&self, index: usize) -> f64 {
        match self {
            Self::UInt8(v) => u8_to_norm(v[index]),
            Self::Int16(v) => i16_to_norm(v[index]),
            Self::Int24(v) => i24_to_norm(&v[index * 3..]),
            Self::Int32(v) => i32_to_norm(v[index]),
            Self::Float32(v) => v[index] as f64,
            Self::Float64(v) => v[index],
        }
    }

    /// Append the native byte representation of every sample to `out`.
    pub fn extend_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Self::UInt8(v) | Self::Int24(v) => out.extend_from_slice(v),
            Self::Int16(v) => v.iter().for_each(|s| out.extend_from_slice(&s.to_ne_bytes())),
            Self::Int32(v) => v.iter().for_each(|s| out.extend_from_slice(&s.to_ne_bytes())),
            Self::Float32(v) => v.iter().for_each(|s| out.extend_from_slice(&s.to_ne_bytes())),
            Self::Float64(v) => v.iter().for_each(|s| out.extend_from_slice(&s.to_ne_bytes())),
        }
    }
}

/// Mutably borrowed, typed samples.
#[derive(Debug, PartialEq)]
pub enum SamplesMut<'a> {
    UInt8(&'a mut [u8]),
    Int16(&'a mut [i16]),
    Int24(&'a mut [u8]),
    Int32(&'a mut [i32]),
    Float32(&'a mut [f32]),
    Float64(&'a mut [f64]),
}

impl SamplesMut<'_> {
    pub fn sample_type(&self) -> SampleType {
        self.as_samples().sample_type()
    }

    pub fn len(&self) -> usize {
        self.as_samples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> f64 {
        self.as_samples().get(index)
    }

    /// Store a normalized value at sample `index`, clamped to `[-1, 1]`.
    pub fn set(&mut self, index: usize, value: f64) {
        match self {
            Self::UInt8(v) => v[index] = norm_to_u8(value),
            Self::Int16(v) => v[index] = norm_to_i16(value),
            Self::Int24(v) => norm_to_i24(value, &mut v[index * 3..]),
            Self::Int32(v) => v[index] = norm_to_i32(value),
            Self::Float32(v) => v[index] = value as f32,
            Self::Float64(v) => v[index] = value,
        }
    }

    pub fn as_samples(&self) -> Samples<'_> {
        match self {
            Self::UInt8(v) => Samples::UInt8(v),
            Self::Int16(v) => Samples::Int16(v),
            Self::Int24(v) => Samples::Int24(v),
            Self::Int32(v) => Samples::Int32(v),
            Self::Float32(v) => Samples::Float32(v),
            Self::Float64(v) => Samples::Float64(v),
        }
    }
}
