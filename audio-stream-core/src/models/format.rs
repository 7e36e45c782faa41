use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::AudioError;
use super::sample::SampleType;

/// Data direction relative to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// Sample rate plus sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mix {
    pub rate: u32,
    pub sample: SampleType,
}

impl Mix {
    pub const fn new(rate: u32, sample: SampleType) -> Self {
        Self { rate, sample }
    }
}

impl fmt::Display for Mix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz {}", self.rate, self.sample)
    }
}

/// How the set bits of a channel mask map onto logical channels.
///
/// With `Ascending`, logical channel `i` is the `i`-th lowest set bit. Drivers
/// that number their channels the other way round use `Descending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskOrder {
    #[default]
    Ascending,
    Descending,
}

/// Channel configuration of a stream.
///
/// A zero mask selects the first `count` hardware channels in natural order.
/// A non-zero mask must have exactly `count` bits set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channels {
    pub inputs: usize,
    #[serde(default)]
    pub in_mask: u64,
    pub outputs: usize,
    #[serde(default)]
    pub out_mask: u64,
}

impl Channels {
    pub const fn new(inputs: usize, in_mask: u64, outputs: usize, out_mask: u64) -> Self {
        Self { inputs, in_mask, outputs, out_mask }
    }

    pub const fn count(&self, direction: Direction) -> usize {
        match direction {
            Direction::Input => self.inputs,
            Direction::Output => self.outputs,
        }
    }

    pub const fn mask(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Input => self.in_mask,
            Direction::Output => self.out_mask,
        }
    }

    pub fn validate(&self) -> Result<(), AudioError> {
        for direction in [Direction::Input, Direction::Output] {
            let count = self.count(direction);
            let mask = self.mask(direction);
            if mask != 0 && mask.count_ones() as usize != count {
                return Err(AudioError::UnsupportedFormat(format!(
                    "{direction} mask {mask:#x} selects {} channels but {count} were requested",
                    mask.count_ones()
                )));
            }
        }
        Ok(())
    }

    /// Hardware channel index for every logical channel of `direction`.
    pub fn hardware_channels(&self, direction: Direction, order: MaskOrder) -> Vec<usize> {
        let count = self.count(direction);
        let mask = self.mask(direction);
        if mask == 0 {
            return (0..count).collect();
        }
        let set = |bit: &usize| mask & (1u64 << *bit) != 0;
        match order {
            MaskOrder::Ascending => (0..64).filter(set).take(count).collect(),
            MaskOrder::Descending => (0..64).rev().filter(set).take(count).collect(),
        }
    }

    /// Highest hardware channel index touched in `direction`, if any.
    pub fn highest_hardware_channel(&self, direction: Direction) -> Option<usize> {
        let mask = self.mask(direction);
        match (self.count(direction), mask) {
            (0, _) => None,
            (count, 0) => Some(count - 1),
            (_, mask) => Some(63 - mask.leading_zeros() as usize),
        }
    }
}

/// A mix plus a channel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Format {
    pub mix: Mix,
    pub channels: Channels,
}

impl Format {
    pub const fn new(mix: Mix, channels: Channels) -> Self {
        Self { mix, channels }
    }

    pub fn validate(&self) -> Result<(), AudioError> {
        if self.mix.rate == 0 {
            return Err(AudioError::UnsupportedFormat("sample rate must be positive".into()));
        }
        if self.channels.inputs == 0 && self.channels.outputs == 0 {
            return Err(AudioError::UnsupportedFormat(
                "at least one input or output channel is required".into(),
            ));
        }
        self.channels.validate()
    }

    pub fn sample_size(&self) -> usize {
        self.mix.sample.size()
    }

    /// Bytes occupied by one frame in `direction`.
    pub fn frame_bytes(&self, direction: Direction) -> usize {
        self.sample_size() * self.channels.count(direction)
    }

    /// `sample size × frames × channels` for `direction`.
    pub fn buffer_bytes(&self, direction: Direction, frames: usize) -> usize {
        self.frame_bytes(direction) * frames
    }

    /// Number of frames covering `duration` at this rate, rounded to nearest.
    pub fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * self.mix.rate as f64).round() as usize
    }

    pub fn duration_for(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.mix.rate as f64)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in:{}({:#x}) out:{}({:#x})",
            self.mix, self.channels.inputs, self.channels.in_mask, self.channels.outputs, self.channels.out_mask
        )
    }
}

/// Legal buffer durations for a (device, format) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferSizeRange {
    pub min: Duration,
    pub max: Duration,
    pub current: Duration,
}

impl BufferSizeRange {
    pub fn is_valid(&self) -> bool {
        self.min <= self.current && self.current <= self.max
    }

    pub fn clamp(&self, duration: Duration) -> Duration {
        duration.clamp(self.min, self.max)
    }
}

/// Reported stream latency per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Latency {
    pub input: Option<Duration>,
    pub output: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_in() -> Format {
        Format::new(Mix::new(44100, SampleType::Int24), Channels::new(2, 0, 0, 0))
    }

    #[test]
    fn buffer_bytes_is_size_times_frames_times_channels() {
        let format = stereo_in();
        assert_eq!(format.buffer_bytes(Direction::Input, 512), 512 * 2 * 3);
        assert_eq!(format.buffer_bytes(Direction::Output, 512), 0);
    }

    #[test]
    fn zero_mask_uses_natural_order() {
        let channels = Channels::new(3, 0, 0, 0);
        assert_eq!(channels.hardware_channels(Direction::Input, MaskOrder::Ascending), vec![0, 1, 2]);
        assert_eq!(channels.hardware_channels(Direction::Input, MaskOrder::Descending), vec![0, 1, 2]);
    }

    #[test]
    fn mask_maps_logical_to_set_bits() {
        let channels = Channels::new(0, 0, 2, 0b1010);
        assert_eq!(channels.hardware_channels(Direction::Output, MaskOrder::Ascending), vec![1, 3]);
        assert_eq!(channels.hardware_channels(Direction::Output, MaskOrder::Descending), vec![3, 1]);
    }

    #[test]
    fn single_output_on_bit_one() {
        let channels = Channels::new(0, 0, 1, 1 << 1);
        assert!(channels.validate().is_ok());
        assert_eq!(channels.hardware_channels(Direction::Output, MaskOrder::Ascending), vec![1]);
        assert_eq!(channels.highest_hardware_channel(Direction::Output), Some(1));
    }

    #[test]
    fn mask_popcount_must_match_count() {
        let channels = Channels::new(2, 0b1, 0, 0);
        assert!(matches!(channels.validate(), Err(AudioError::UnsupportedFormat(_))));
    }

    #[test]
    fn format_requires_rate_and_channels() {
        let mut format = stereo_in();
        assert!(format.validate().is_ok());
        format.mix.rate = 0;
        assert!(format.validate().is_err());
        let silent = Format::new(Mix::new(48000, SampleType::Float32), Channels::default());
        assert!(silent.validate().is_err());
    }

    #[test]
    fn frames_for_rounds_to_nearest() {
        let format = stereo_in();
        assert_eq!(format.frames_for(Duration::from_secs(2)), 88200);
        assert_eq!(format.frames_for(Duration::from_secs_f64(512.0 / 44100.0)), 512);
    }

    #[test]
    fn buffer_range_clamps() {
        let range = BufferSizeRange {
            min: Duration::from_millis(2),
            max: Duration::from_millis(100),
            current: Duration::from_millis(10),
        };
        assert!(range.is_valid());
        assert_eq!(range.clamp(Duration::from_millis(1)), Duration::from_millis(2));
        assert_eq!(range.clamp(Duration::from_secs(1)), Duration::from_millis(100));
    }
}
