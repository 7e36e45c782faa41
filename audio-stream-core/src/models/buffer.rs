use crate::models::sample::SampleType;

/// Driver-owned input samples for one callback invocation.
///
/// Interleaved data is one region `[f0c0, f0c1, .., f1c0, ..]`; non-interleaved
/// data is one region per channel. Sample bytes are native-endian except for
/// packed 24-bit samples, which are little-endian.
#[derive(Debug)]
pub enum InputData<'a> {
    Interleaved(&'a [u8]),
    NonInterleaved(&'a [&'a [u8]]),
}

/// Driver-owned output samples for one callback invocation.
#[derive(Debug)]
pub enum OutputData<'a> {
    Interleaved(&'a mut [u8]),
    NonInterleaved(&'a mut [&'a mut [u8]]),
}

impl InputData<'_> {
    pub fn is_interleaved(&self) -> bool {
        matches!(self, Self::Interleaved(_))
    }

    /// Total number of bytes across all channels.
    pub fn len(&self) -> usize {
        match self {
            Self::Interleaved(data) => data.len(),
            Self::NonInterleaved(channels) => channels.iter().map(|c| c.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutputData<'_> {
    pub fn is_interleaved(&self) -> bool {
        matches!(self, Self::Interleaved(_))
    }

    /// Overwrite the first `bytes` bytes of every region with silence of
    /// type `sample`.
    ///
    /// For interleaved data `bytes` covers all channels; for non-interleaved
    /// data it is per channel.
    pub fn silence(&mut self, sample: SampleType, bytes: usize) {
        let silent = sample.silence_byte();
        match self {
            Self::Interleaved(data) => {
                let end = bytes.min(data.len());
                data[..end].fill(silent);
            }
            Self::NonInterleaved(channels) => {
                for channel in channels.iter_mut() {
                    let end = bytes.min(channel.len());
                    channel[..end].fill(silent);
                }
            }
        }
    }
}

/// One hardware buffer, as handed to the stream callback.
///
/// The borrowed regions are only valid for the duration of the invocation
/// that received this descriptor.
#[derive(Debug)]
pub struct Buffer<'a> {
    pub frames: usize,
    pub input: Option<InputData<'a>>,
    pub output: Option<OutputData<'a>>,
    /// Stream time in seconds, meaningful only when `time_valid` is set.
    pub time: f64,
    /// Frames delivered on this stream before this buffer.
    pub position: u64,
    pub time_valid: bool,
    /// Set when the driver detected a dropped or skipped buffer before this one.
    pub xrun: bool,
}

impl<'a> Buffer<'a> {
    pub fn new(frames: usize, input: Option<InputData<'a>>, output: Option<OutputData<'a>>) -> Self {
        Self {
            frames,
            input,
            output,
            time: 0.0,
            position: 0,
            time_valid: false,
            xrun: false,
        }
    }

    /// Silence the output regions: `interleaved_bytes` of an interleaved
    /// region, or `channel_bytes` of every non-interleaved channel.
    pub(crate) fn silence_output(&mut self, sample: SampleType, interleaved_bytes: usize, channel_bytes: usize) {
        if let Some(output) = self.output.as_mut() {
            let bytes = if output.is_interleaved() { interleaved_bytes } else { channel_bytes };
            output.silence(sample, bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_interleaved() {
        let mut data = vec![7u8; 8];
        let mut buffer = Buffer::new(2, None, Some(OutputData::Interleaved(&mut data)));
        buffer.silence_output(SampleType::Int16, 8, 4);
        drop(buffer);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn unsigned_silence_is_midpoint() {
        let mut data = vec![0u8; 4];
        let mut buffer = Buffer::new(2, None, Some(OutputData::Interleaved(&mut data)));
        buffer.silence_output(SampleType::UInt8, 4, 2);
        drop(buffer);
        assert_eq!(data, [0x80; 4]);
    }

    #[test]
    fn silence_non_interleaved_per_channel() {
        let mut left = vec![1u8; 4];
        let mut right = vec![2u8; 4];
        {
            let mut channels: Vec<&mut [u8]> = vec![left.as_mut_slice(), right.as_mut_slice()];
            let mut buffer = Buffer::new(2, None, Some(OutputData::NonInterleaved(&mut channels)));
            buffer.silence_output(SampleType::Float32, 8, 4);
        }
        assert!(left.iter().chain(right.iter()).all(|&b| b == 0));
    }

    #[test]
    fn input_len_sums_channels() {
        let a = [0u8; 6];
        let b = [0u8; 6];
        let channels: [&[u8]; 2] = [&a, &b];
        let input = InputData::NonInterleaved(&channels);
        assert_eq!(input.len(), 12);
        assert!(!input.is_interleaved());
    }
}
