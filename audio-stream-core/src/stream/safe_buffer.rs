use std::sync::Arc;

use parking_lot::Mutex;

use super::views::{ChannelSlices, ChannelSlicesMut, SafeData, SafeDataMut};
use super::Stream;
use crate::models::buffer::{Buffer, InputData, OutputData};
use crate::models::error::{AudioError, ProtocolViolation};
use crate::models::format::{Direction, Format};
use crate::processing::interleave::interleaved_offset;
use crate::processing::samples::SampleBuffer;

/// Scratch storage for one direction, in the registered layout.
#[derive(Debug)]
enum Scratch {
    Empty,
    Interleaved(SampleBuffer),
    NonInterleaved(Vec<SampleBuffer>),
}

impl Scratch {
    fn new(format: &Format, direction: Direction, frames: usize, interleaved: bool) -> Self {
        let channels = format.channels.count(direction);
        let sample = format.mix.sample;
        match (channels, interleaved) {
            (0, _) => Self::Empty,
            (_, true) => Self::Interleaved(SampleBuffer::new(sample, frames * channels)),
            (_, false) => Self::NonInterleaved((0..channels).map(|_| SampleBuffer::new(sample, frames)).collect()),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Empty => {}
            Self::Interleaved(buf) => buf.clear(),
            Self::NonInterleaved(bufs) => bufs.iter_mut().for_each(SampleBuffer::clear),
        }
    }

    fn load(&mut self, frame: usize, channel: usize, channels: usize, bytes: &[u8]) {
        match self {
            Self::Empty => {}
            Self::Interleaved(buf) => buf.load(frame * channels + channel, bytes),
            Self::NonInterleaved(bufs) => bufs[channel].load(frame, bytes),
        }
    }

    fn store(&self, frame: usize, channel: usize, channels: usize, out: &mut [u8]) {
        match self {
            Self::Empty => {}
            Self::Interleaved(buf) => buf.store(frame * channels + channel, out),
            Self::NonInterleaved(bufs) => bufs[channel].store(frame, out),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LockScope {
    frames: usize,
    position: u64,
}

/// Lock-scoped, typed view over driver-owned buffers.
///
/// Registered against a stream before it starts. Inside the data callback,
/// `lock` copies the driver's input into scratch storage, `input`/`output`
/// expose that storage in the layout chosen at registration (which may
/// differ from the stream's native layout), and `unlock` writes the output
/// back into driver memory. Every `lock` must be matched by one `unlock`
/// before the callback returns.
#[derive(Debug)]
pub struct SafeBuffer {
    format: Format,
    capacity: usize,
    interleaved: bool,
    input: Scratch,
    output: Scratch,
    scope: Option<LockScope>,
    locks: u64,
    unlocks: u64,
}

impl SafeBuffer {
    /// Register a safe buffer on `stream`. See [`Stream::register_safe_buffer`].
    pub fn register(stream: &Stream, interleaved: bool) -> Result<SafeBufferRegistration, AudioError> {
        stream.register_safe_buffer(interleaved)
    }

    pub(crate) fn new(format: Format, capacity: usize, interleaved: bool) -> Self {
        Self {
            input: Scratch::new(&format, Direction::Input, capacity, interleaved),
            output: Scratch::new(&format, Direction::Output, capacity, interleaved),
            format,
            capacity,
            interleaved,
            scope: None,
            locks: 0,
            unlocks: 0,
        }
    }

    /// Layout of the views returned by `input` and `output`.
    pub fn is_interleaved(&self) -> bool {
        self.interleaved
    }

    /// Maximum number of frames a locked buffer may carry.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn is_locked(&self) -> bool {
        self.scope.is_some()
    }

    pub fn lock_count(&self) -> u64 {
        self.locks
    }

    pub fn unlock_count(&self) -> u64 {
        self.unlocks
    }

    /// Frames in the current lock scope, 0 when unlocked.
    pub fn frames(&self) -> usize {
        self.scope.map_or(0, |s| s.frames)
    }

    /// Begin a lock scope over `buffer`: input is copied in, output scratch
    /// is reset to silence.
    pub fn lock(&mut self, buffer: &Buffer<'_>) -> Result<(), AudioError> {
        if self.scope.is_some() {
            return Err(ProtocolViolation::DoubleLock.into());
        }
        if buffer.frames > self.capacity {
            return Err(ProtocolViolation::FrameOverflow.into());
        }

        let size = self.format.sample_size();
        let channels = self.format.channels.inputs;
        match &buffer.input {
            Some(InputData::Interleaved(data)) => {
                for f in 0..buffer.frames {
                    for c in 0..channels {
                        let at = interleaved_offset(f, c, channels, size);
                        self.input.load(f, c, channels, &data[at..at + size]);
                    }
                }
            }
            Some(InputData::NonInterleaved(regions)) => {
                for (c, region) in regions.iter().enumerate().take(channels) {
                    for f in 0..buffer.frames {
                        self.input.load(f, c, channels, &region[f * size..(f + 1) * size]);
                    }
                }
            }
            None => self.input.clear(),
        }
        self.output.clear();

        self.scope = Some(LockScope {
            frames: buffer.frames,
            position: buffer.position,
        });
        self.locks += 1;
        Ok(())
    }

    /// End the lock scope, flushing output scratch into `buffer`. `buffer`
    /// must be the one passed to `lock`.
    pub fn unlock(&mut self, buffer: &mut Buffer<'_>) -> Result<(), AudioError> {
        let scope = self.scope.ok_or(ProtocolViolation::UnlockWithoutLock)?;
        if scope.frames != buffer.frames || scope.position != buffer.position {
            return Err(ProtocolViolation::MismatchedUnlock.into());
        }

        let size = self.format.sample_size();
        let channels = self.format.channels.outputs;
        match buffer.output.as_mut() {
            Some(OutputData::Interleaved(data)) => {
                for f in 0..scope.frames {
                    for c in 0..channels {
                        let at = interleaved_offset(f, c, channels, size);
                        self.output.store(f, c, channels, &mut data[at..at + size]);
                    }
                }
            }
            Some(OutputData::NonInterleaved(regions)) => {
                for (c, region) in regions.iter_mut().enumerate().take(channels) {
                    for f in 0..scope.frames {
                        self.output.store(f, c, channels, &mut region[f * size..(f + 1) * size]);
                    }
                }
            }
            None => {}
        }

        self.scope = None;
        self.unlocks += 1;
        Ok(())
    }

    /// Input samples of the current lock scope; `None` for an output-only
    /// stream.
    pub fn input(&self) -> Result<Option<SafeData<'_>>, AudioError> {
        let scope = self.scope.ok_or(ProtocolViolation::AccessWhileUnlocked)?;
        let channels = self.format.channels.inputs;
        Ok(match &self.input {
            Scratch::Empty => None,
            Scratch::Interleaved(buf) => Some(SafeData::Interleaved(buf.samples(scope.frames * channels))),
            Scratch::NonInterleaved(bufs) => Some(SafeData::NonInterleaved(ChannelSlices::new(bufs, scope.frames))),
        })
    }

    /// Output target of the current lock scope; `None` for an input-only
    /// stream.
    pub fn output(&mut self) -> Result<Option<SafeDataMut<'_>>, AudioError> {
        let scope = self.scope.ok_or(ProtocolViolation::AccessWhileUnlocked)?;
        let channels = self.format.channels.outputs;
        Ok(match &mut self.output {
            Scratch::Empty => None,
            Scratch::Interleaved(buf) => Some(SafeDataMut::Interleaved(buf.samples_mut(scope.frames * channels))),
            Scratch::NonInterleaved(bufs) => {
                Some(SafeDataMut::NonInterleaved(ChannelSlicesMut::new(bufs, scope.frames)))
            }
        })
    }

    /// Drop an unfinished lock scope without flushing.
    pub(crate) fn abandon(&mut self) {
        self.scope = None;
        self.output.clear();
    }
}

pub(crate) type SafeSlot = Arc<Mutex<Option<SafeBuffer>>>;

/// Keeps a [`SafeBuffer`] attached to its stream. Dropping it detaches the
/// buffer; this must happen before the stream is closed.
#[derive(Debug)]
pub struct SafeBufferRegistration {
    slot: SafeSlot,
}

impl SafeBufferRegistration {
    pub(crate) fn new(slot: SafeSlot) -> Self {
        Self { slot }
    }

    pub fn lock_count(&self) -> u64 {
        self.slot.lock().as_ref().map_or(0, SafeBuffer::lock_count)
    }

    pub fn unlock_count(&self) -> u64 {
        self.slot.lock().as_ref().map_or(0, SafeBuffer::unlock_count)
    }

    pub fn release(self) {}
}

impl Drop for SafeBufferRegistration {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}
