use crate::processing::samples::{SampleBuffer, Samples, SamplesMut};

/// Locked input contents of a safe buffer, shaped by the layout chosen at
/// registration.
#[derive(Debug, Clone, Copy)]
pub enum SafeData<'a> {
    /// `frames × channels` samples, frame-major.
    Interleaved(Samples<'a>),
    NonInterleaved(ChannelSlices<'a>),
}

/// Writable output contents of a locked safe buffer.
#[derive(Debug)]
pub enum SafeDataMut<'a> {
    Interleaved(SamplesMut<'a>),
    NonInterleaved(ChannelSlicesMut<'a>),
}

/// Per-channel sample regions, each `frames` long.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSlices<'a> {
    channels: &'a [SampleBuffer],
    frames: usize,
}

#[derive(Debug)]
pub struct ChannelSlicesMut<'a> {
    channels: &'a mut [SampleBuffer],
    frames: usize,
}

impl<'a> ChannelSlices<'a> {
    pub(crate) fn new(channels: &'a [SampleBuffer], frames: usize) -> Self {
        Self { channels, frames }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel(&self, index: usize) -> Samples<'a> {
        self.channels[index].samples(self.frames)
    }

    pub fn iter(&self) -> impl Iterator<Item = Samples<'a>> + 'a {
        let (channels, frames) = (self.channels, self.frames);
        channels.iter().map(move |c| c.samples(frames))
    }
}

impl<'a> ChannelSlicesMut<'a> {
    pub(crate) fn new(channels: &'a mut [SampleBuffer], frames: usize) -> Self {
        Self { channels, frames }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channel(&self, index: usize) -> Samples<'_> {
        self.channels[index].samples(self.frames)
    }

    pub fn channel_mut(&mut self, index: usize) -> SamplesMut<'_> {
        self.channels[index].samples_mut(self.frames)
    }
}

impl SafeData<'_> {
    pub fn is_interleaved(&self) -> bool {
        matches!(self, Self::Interleaved(_))
    }

    /// Normalized sample at (`frame`, `channel`), addressed the same way
    /// for either layout. `channels` is the logical channel count.
    pub fn get(&self, frame: usize, channel: usize, channels: usize) -> f64 {
        match self {
            Self::Interleaved(samples) => samples.get(frame * channels + channel),
            Self::NonInterleaved(slices) => slices.channel(channel).get(frame),
        }
    }

    /// Append every sample's native bytes in the view's own layout: frames
    /// for interleaved data, one block per channel otherwise.
    pub fn extend_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Self::Interleaved(samples) => samples.extend_bytes(out),
            Self::NonInterleaved(slices) => slices.iter().for_each(|c| c.extend_bytes(out)),
        }
    }
}

impl SafeDataMut<'_> {
    pub fn is_interleaved(&self) -> bool {
        matches!(self, Self::Interleaved(_))
    }

    /// Store a normalized sample at (`frame`, `channel`).
    pub fn set(&mut self, frame: usize, channel: usize, channels: usize, value: f64) {
        match self {
            Self::Interleaved(samples) => samples.set(frame * channels + channel, value),
            Self::NonInterleaved(slices) => slices.channel_mut(channel).set(frame, value),
        }
    }

    pub fn get(&self, frame: usize, channel: usize, channels: usize) -> f64 {
        match self {
            Self::Interleaved(samples) => samples.get(frame * channels + channel),
            Self::NonInterleaved(slices) => slices.channel(channel).get(frame),
        }
    }
}
