use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::host::device::Device;
use crate::models::buffer::{Buffer, InputData};
use crate::models::config::CaptureConfiguration;
use crate::models::diagnostics::StreamDiagnostics;
use crate::models::enums::BufferAccess;
use crate::models::error::AudioError;
use crate::models::format::Direction;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::CaptureState;
use crate::processing::ring_buffer::{byte_ring, RingConsumer, RingProducer};
use crate::storage::metadata;
use crate::storage::raw_writer::RawPcmWriter;
use crate::stream::safe_buffer::SafeBufferRegistration;
use crate::stream::{Stream, StreamContext};
use crate::traits::callbacks::{DeviceStreamParams, StreamParams};

/// Seconds of audio the ring buffer between callback and writer can hold.
const RING_SECONDS: usize = 5;
const PROCESSING_INTERVAL: Duration = Duration::from_millis(100);

/// Shared between the stream callbacks and the session.
struct CaptureContext {
    access: BufferAccess,
    /// Only the callback locks this, with `try_lock`.
    producer: Mutex<CaptureProducer>,
    /// Consumer side; never touched by the callback.
    drain: Mutex<Drain>,
    /// Bytes of buffers that did not fit in the ring.
    dropped: AtomicU64,
    buffers: AtomicU64,
    xruns: AtomicU64,
}

impl CaptureContext {
    fn new(access: BufferAccess, ring_bytes: usize) -> Self {
        let (producer, consumer) = byte_ring(ring_bytes);
        Self {
            access,
            producer: Mutex::new(CaptureProducer {
                ring: producer,
                scratch: Vec::new(),
            }),
            drain: Mutex::new(Drain {
                ring: consumer,
                chunk: Vec::with_capacity(ring_bytes),
            }),
            dropped: AtomicU64::new(0),
            buffers: AtomicU64::new(0),
            xruns: AtomicU64::new(0),
        }
    }
}

struct CaptureProducer {
    ring: RingProducer,
    scratch: Vec<u8>,
}

struct Drain {
    ring: RingConsumer,
    chunk: Vec<u8>,
}

/// Internal mutable session state, protected by `parking_lot::Mutex`.
struct SessionState {
    state: CaptureState,
    capture_start: Option<Instant>,
    dropped: u64,
    write_error: Option<AudioError>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            state: CaptureState::Idle,
            capture_start: None,
            dropped: 0,
            write_error: None,
        }
    }
}

/// Records the input side of a stream to a headerless PCM file.
///
/// ```text
/// [Stream callback] → [SPSC byte ring] → audio-processing thread → [RawPcmWriter]
///                                                              + metadata sidecar
/// ```
///
/// Interleaved buffers are stored as delivered; non-interleaved buffers as
/// one contiguous block per channel. With [`BufferAccess::Safe`] the bytes
/// come out of a registered safe buffer in the configured layout, whatever
/// the device's native layout.
pub struct CaptureSession {
    config: CaptureConfiguration,
    session_state: Arc<Mutex<SessionState>>,
    context: Option<Arc<CaptureContext>>,
    stream: Option<Stream>,
    registration: Option<SafeBufferRegistration>,

    // File writer (accessed from processing thread)
    writer: Arc<Mutex<Option<RawPcmWriter>>>,

    // Processing thread control
    processing_running: Arc<AtomicBool>,
    processing_handle: Option<thread::JoinHandle<()>>,

    file_path: Option<PathBuf>,
}

impl CaptureSession {
    pub fn new(config: CaptureConfiguration) -> Result<Self, AudioError> {
        config.validate()?;
        Ok(Self {
            config,
            session_state: Arc::new(Mutex::new(SessionState::new())),
            context: None,
            stream: None,
            registration: None,
            writer: Arc::new(Mutex::new(None)),
            processing_running: Arc::new(AtomicBool::new(false)),
            processing_handle: None,
            file_path: None,
        })
    }

    pub fn state(&self) -> CaptureState {
        self.session_state.lock().state.clone()
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    /// Diagnostics of the underlying stream while it is open.
    pub fn stream_diagnostics(&self) -> Option<StreamDiagnostics> {
        self.stream.as_ref().map(Stream::diagnostics)
    }

    /// Buffers received by the callback so far.
    pub fn buffers_received(&self) -> u64 {
        self.context.as_ref().map_or(0, |c| c.buffers.load(Ordering::Relaxed))
    }

    /// Input bytes lost because the ring was full when they arrived.
    pub fn dropped_bytes(&self) -> u64 {
        self.context.as_ref().map_or(0, |c| c.dropped.load(Ordering::Relaxed))
    }

    /// Seconds since `start`, or 0 when not capturing.
    pub fn elapsed_secs(&self) -> f64 {
        self.session_state
            .lock()
            .capture_start
            .map_or(0.0, |start| start.elapsed().as_secs_f64())
    }

    /// Open the capture stream on `device`. Transitions: idle → ready.
    pub fn open(&mut self, device: &Device) -> Result<(), AudioError> {
        if !self.session_state.lock().state.is_idle() {
            return Err(AudioError::ConfigurationFailed("can only open from idle state".into()));
        }

        let format = self.config.format;
        let interleaved = self.native_layout(device)?;
        let buffer_size = match self.config.buffer_size() {
            Some(size) => size,
            None => device.buffer_size_range(&format)?.current,
        };

        let ring_bytes = format.mix.rate as usize * RING_SECONDS * format.frame_bytes(Direction::Input);
        let context = Arc::new(CaptureContext::new(self.config.access, ring_bytes));

        let params = StreamParams::new(interleaved, capture_buffer)
            .with_xrun(|index, context: &Arc<CaptureContext>| {
                context.xruns.fetch_add(1, Ordering::Relaxed);
                log::warn!("xrun on capture stream (index {})", index);
            })
            .with_running(|running, error, _context: &Arc<CaptureContext>| match error {
                Some(e) => log::error!("capture stream silenced: {}", e),
                None => log::debug!("capture stream running: {}", running),
            });
        let stream = device.open_stream(
            DeviceStreamParams::new(params, format, buffer_size),
            Arc::clone(&context),
        )?;

        let frames = stream.frames();
        context.producer.lock().scratch.reserve(format.buffer_bytes(Direction::Input, frames));
        if self.config.access == BufferAccess::Safe {
            self.registration = Some(stream.register_safe_buffer(self.config.interleaved)?);
        }

        log::debug!(
            "capture stream opened on {}: {} frames, native {}",
            device.id(),
            frames,
            if interleaved { "interleaved" } else { "non-interleaved" }
        );
        self.context = Some(context);
        self.stream = Some(stream);
        self.set_state(CaptureState::Ready);
        Ok(())
    }

    /// Start recording. Transitions: ready → capturing.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if !matches!(self.session_state.lock().state, CaptureState::Ready) {
            return Err(AudioError::ConfigurationFailed("can only start from ready state".into()));
        }
        let (Some(frames), Some(context)) = (self.stream.as_ref().map(Stream::frames), self.context.clone()) else {
            return Err(AudioError::ConfigurationFailed("no capture stream is open".into()));
        };

        let file_name = format!("{}_{}.pcm", self.config.file_prefix, uuid::Uuid::new_v4());
        let file_path = self.config.output_directory.join(file_name);
        let mut writer = RawPcmWriter::new(file_path.clone());
        writer.open()?;
        *self.writer.lock() = Some(writer);
        self.file_path = Some(file_path);

        let limit = self.byte_limit(frames);
        self.start_processing_loop(context, limit)?;

        if let Err(e) = self.stream.as_ref().map_or(Ok(()), Stream::start) {
            self.stop_processing_loop();
            self.set_state(CaptureState::Failed(e.clone()));
            return Err(e);
        }

        self.session_state.lock().capture_start = Some(Instant::now());
        self.set_state(CaptureState::Capturing);
        Ok(())
    }

    /// Stop recording, finalize the file, and return the result.
    /// Transitions: capturing → stopping → completed / failed.
    pub fn stop(&mut self) -> Result<RecordingResult, AudioError> {
        if !self.session_state.lock().state.is_capturing() {
            return Err(AudioError::ConfigurationFailed("can only stop from capturing state".into()));
        }
        self.set_state(CaptureState::Stopping);

        match self.finish() {
            Ok(result) => {
                log::info!(
                    "capture complete: {} ({} bytes, {:.2} s, {} xruns)",
                    result.file_path.display(),
                    result.bytes_written,
                    result.duration_secs,
                    result.metadata.xruns
                );
                self.set_state(CaptureState::Completed(Box::new(result.clone())));
                Ok(result)
            }
            Err(e) => {
                log::error!("capture failed: {}", e);
                self.set_state(CaptureState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    // --- Internal helpers ---

    fn finish(&mut self) -> Result<RecordingResult, AudioError> {
        let stream_result = self.stream.as_ref().map_or(Ok(()), Stream::stop);
        self.stop_processing_loop();

        let context = self
            .context
            .clone()
            .ok_or_else(|| AudioError::ConfigurationFailed("no capture stream is open".into()))?;
        let limit = self.stream.as_ref().and_then(|s| self.byte_limit(s.frames()));
        Self::process_buffers(&context, &self.writer, &self.session_state, limit);

        self.registration = None;
        if let Some(stream) = self.stream.take() {
            stream.close()?;
        }
        stream_result?;

        if let Some(e) = self.session_state.lock().write_error.take() {
            return Err(e);
        }

        let file_path = self
            .file_path
            .clone()
            .ok_or_else(|| AudioError::StorageError("no output file".into()))?;
        let (bytes_written, checksum) = {
            let mut guard = self.writer.lock();
            let writer = guard
                .as_mut()
                .ok_or_else(|| AudioError::StorageError("file writer not available".into()))?;
            let checksum = writer.close()?;
            let bytes = writer.bytes_written();
            *guard = None;
            (bytes, checksum)
        };

        let metadata = RecordingMetadata::for_capture(
            &self.config.format,
            self.config.interleaved,
            self.config.access,
            &file_path.to_string_lossy(),
            bytes_written,
            context.xruns.load(Ordering::Relaxed),
            &checksum,
        );
        let metadata_path = metadata::write_metadata(&metadata, &file_path)?;

        Ok(RecordingResult {
            file_path,
            metadata_path,
            bytes_written,
            frames: metadata.frames,
            duration_secs: metadata.duration_secs,
            metadata,
            checksum,
        })
    }

    /// Layout to request from the device. Raw access needs the configured
    /// layout natively; a safe buffer reshapes, so either will do.
    fn native_layout(&self, device: &Device) -> Result<bool, AudioError> {
        let wanted = self.config.interleaved;
        if self.config.access == BufferAccess::Raw || device.supports_access(wanted)? {
            return Ok(wanted);
        }
        Ok(!wanted)
    }

    /// Maximum bytes to persist, rounded up to whole buffers so that
    /// non-interleaved blocks are never cut.
    fn byte_limit(&self, frames_per_buffer: usize) -> Option<u64> {
        let format = &self.config.format;
        self.config.max_duration_secs.map(|secs| {
            let frames = format.frames_for(Duration::from_secs_f64(secs));
            let buffers = frames.div_ceil(frames_per_buffer.max(1));
            format.buffer_bytes(Direction::Input, buffers * frames_per_buffer) as u64
        })
    }

    fn set_state(&self, new_state: CaptureState) {
        log::debug!("capture session: {:?}", new_state);
        self.session_state.lock().state = new_state;
    }

    /// Start the background processing loop that drains the ring buffer
    /// into the file.
    fn start_processing_loop(&mut self, context: Arc<CaptureContext>, limit: Option<u64>) -> Result<(), AudioError> {
        self.processing_running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.processing_running);
        let session_state = Arc::clone(&self.session_state);
        let writer = Arc::clone(&self.writer);

        let handle = thread::Builder::new()
            .name("audio-processing".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(PROCESSING_INTERVAL);
                    Self::process_buffers(&context, &writer, &session_state, limit);
                }
            })
            .map_err(|e| {
                self.processing_running.store(false, Ordering::SeqCst);
                AudioError::StorageError(format!("failed to spawn processing thread: {}", e))
            })?;

        self.processing_handle = Some(handle);
        Ok(())
    }

    fn stop_processing_loop(&mut self) {
        self.processing_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.processing_handle.take() {
            if handle.join().is_err() {
                log::error!("audio processing thread panicked");
            }
        }
    }

    /// Move everything queued in the ring to the file.
    fn process_buffers(
        context: &CaptureContext,
        writer: &Mutex<Option<RawPcmWriter>>,
        session_state: &Mutex<SessionState>,
        limit: Option<u64>,
    ) {
        let dropped = context.dropped.load(Ordering::Relaxed);
        {
            let mut s = session_state.lock();
            if dropped > s.dropped {
                log::warn!("capture ring buffer overflowed, {} bytes dropped", dropped - s.dropped);
                s.dropped = dropped;
            }
        }

        let mut drain = context.drain.lock();
        let Drain { ring, chunk } = &mut *drain;
        chunk.clear();
        if ring.drain_into(chunk) == 0 {
            return;
        }
        let data = chunk.as_slice();

        if let Some(ref mut w) = *writer.lock() {
            let room = limit.map_or(data.len(), |l| l.saturating_sub(w.bytes_written()) as usize);
            let take = room.min(data.len());
            if take == 0 {
                return;
            }
            if let Err(e) = w.write(&data[..take]) {
                log::error!("Failed to write audio data: {}", e);
                session_state.lock().write_error.get_or_insert(e);
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.as_ref() {
            if stream.is_running() {
                let _ = stream.stop();
            }
        }
        self.stop_processing_loop();
        self.registration = None;
    }
}

/// Data callback: queue this buffer's input bytes. Never blocks; a buffer
/// that does not fit whole is dropped and counted.
fn capture_buffer(
    ctx: &mut StreamContext<'_>,
    buffer: &mut Buffer<'_>,
    capture: &Arc<CaptureContext>,
) -> Result<(), AudioError> {
    capture.buffers.fetch_add(1, Ordering::Relaxed);
    let Some(mut producer) = capture.producer.try_lock() else {
        capture.dropped.fetch_add(input_bytes(buffer) as u64, Ordering::Relaxed);
        return Ok(());
    };
    let CaptureProducer { ring, scratch } = &mut *producer;

    let (queued, bytes) = match capture.access {
        BufferAccess::Raw => match &buffer.input {
            Some(InputData::Interleaved(data)) => (ring.push_all(&[*data]), data.len()),
            Some(InputData::NonInterleaved(channels)) => (ring.push_all(channels), input_bytes(buffer)),
            None => (true, 0),
        },
        BufferAccess::Safe => {
            let safe = ctx
                .safe_buffer()
                .ok_or_else(|| AudioError::Callback("safe buffer is not registered".into()))?;
            safe.lock(buffer)?;
            scratch.clear();
            if let Some(input) = safe.input()? {
                input.extend_bytes(scratch);
            }
            safe.unlock(buffer)?;
            (ring.push_all(&[scratch.as_slice()]), scratch.len())
        }
    };
    if !queued {
        capture.dropped.fetch_add(bytes as u64, Ordering::Relaxed);
    }
    Ok(())
}

fn input_bytes(buffer: &Buffer<'_>) -> usize {
    match &buffer.input {
        Some(InputData::Interleaved(data)) => data.len(),
        Some(InputData::NonInterleaved(channels)) => channels.iter().map(|c| c.len()).sum(),
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{input_signal, SimulatedDeviceSpec, SimulatedProbe, SimulatedService};
    use crate::host::platform::Platform;
    use crate::models::enums::System;
    use crate::models::format::{Channels, Format, Mix};
    use crate::models::sample::SampleType;
    use crate::processing::samples::decode;
    use crate::storage::raw_writer::sha256_file;
    use std::fs;

    const FRAMES: usize = 512;

    fn device(spec: SimulatedDeviceSpec) -> (Device, SimulatedProbe) {
        let probe = spec.probe();
        let id = spec.id.clone();
        let service = Platform::builder("capture-tests")
            .with_service(Arc::new(SimulatedService::new(vec![spec])))
            .build()
            .service(System::Simulated)
            .unwrap();
        (service.open_device(&id).unwrap(), probe)
    }

    fn stereo_mic() -> SimulatedDeviceSpec {
        SimulatedDeviceSpec::new("mic", "Mic").with_channels(2, 0)
    }

    fn config(interleaved: bool, access: BufferAccess) -> CaptureConfiguration {
        let format = Format::new(Mix::new(44100, SampleType::Int24), Channels::new(2, 0, 0, 0));
        CaptureConfiguration {
            format,
            buffer_size_ms: Some(format.duration_for(FRAMES).as_secs_f64() * 1000.0),
            interleaved,
            access,
            output_directory: std::env::temp_dir().join(format!("audio_stream_capture_{}", uuid::Uuid::new_v4())),
            file_prefix: "take".into(),
            max_duration_secs: None,
        }
    }

    /// Decoded sample (`frame`, `channel`) of the first stored buffer.
    fn stored_sample(bytes: &[u8], frame: usize, channel: usize, interleaved: bool) -> f64 {
        let offset = if interleaved {
            (frame * 2 + channel) * 3
        } else {
            (channel * FRAMES + frame) * 3
        };
        decode(SampleType::Int24, &bytes[offset..offset + 3])
    }

    #[test]
    fn captures_all_layouts_and_access_modes() {
        for access in [BufferAccess::Raw, BufferAccess::Safe] {
            for interleaved in [true, false] {
                let (device, probe) = device(stereo_mic());
                let mut session = CaptureSession::new(config(interleaved, access)).unwrap();
                session.open(&device).unwrap();
                assert_eq!(session.state(), CaptureState::Ready);

                session.start().unwrap();
                assert!(session.state().is_capturing());
                probe.pump(173);
                let result = session.stop().unwrap();

                assert_eq!(result.bytes_written, (173 * FRAMES * 6) as u64);
                assert_eq!(session.dropped_bytes(), 0);
                assert!(result.bytes_written.abs_diff(88200 * 6) <= (FRAMES * 6) as u64);
                assert_eq!(result.frames, (173 * FRAMES) as u64);

                let bytes = fs::read(&result.file_path).unwrap();
                assert_eq!(bytes.len() as u64, result.bytes_written);
                for (frame, channel) in [(5, 0), (5, 1), (300, 1)] {
                    let stored = stored_sample(&bytes, frame, channel, interleaved);
                    let expected = input_signal(channel, frame as u64, 44100);
                    assert!((stored - expected).abs() < 1e-5, "{access:?} interleaved={interleaved}");
                }

                assert_eq!(result.checksum, sha256_file(&result.file_path).unwrap());
                let metadata = metadata::read_metadata(&result.file_path).unwrap();
                assert_eq!(metadata, result.metadata);
                assert_eq!(metadata.interleaved, interleaved);
                assert_eq!(metadata.access, access);
                assert!(matches!(session.state(), CaptureState::Completed(_)));

                fs::remove_dir_all(result.file_path.parent().unwrap()).ok();
            }
        }
    }

    #[test]
    fn safe_access_reshapes_when_device_lacks_layout() {
        let (device, probe) = device(stereo_mic().with_access(true, false));
        let mut session = CaptureSession::new(config(false, BufferAccess::Safe)).unwrap();
        session.open(&device).unwrap();
        session.start().unwrap();
        probe.pump(2);
        let result = session.stop().unwrap();

        let bytes = fs::read(&result.file_path).unwrap();
        assert_eq!(bytes.len(), 2 * FRAMES * 6);
        let stored = stored_sample(&bytes, 9, 1, false);
        assert!((stored - input_signal(1, 9, 44100)).abs() < 1e-5);

        fs::remove_dir_all(result.file_path.parent().unwrap()).ok();
    }

    #[test]
    fn raw_access_needs_native_layout() {
        let (device, _probe) = device(stereo_mic().with_access(true, false));
        let mut session = CaptureSession::new(config(false, BufferAccess::Raw)).unwrap();
        assert_eq!(
            session.open(&device).unwrap_err(),
            AudioError::UnsupportedAccess { interleaved: false }
        );
        assert!(session.state().is_idle());
    }

    #[test]
    fn maximum_duration_caps_the_file() {
        let (device, probe) = device(stereo_mic());
        let mut config = config(true, BufferAccess::Raw);
        config.max_duration_secs = Some(0.05);
        let mut session = CaptureSession::new(config).unwrap();
        session.open(&device).unwrap();
        session.start().unwrap();
        probe.pump(20);
        let result = session.stop().unwrap();

        // 0.05 s is 2205 frames, rounded up to five whole buffers.
        assert_eq!(result.bytes_written, (5 * FRAMES * 6) as u64);
        fs::remove_dir_all(result.file_path.parent().unwrap()).ok();
    }

    #[test]
    fn xruns_are_recorded_in_metadata() {
        let (device, probe) = device(stereo_mic());
        let mut session = CaptureSession::new(config(true, BufferAccess::Raw)).unwrap();
        session.open(&device).unwrap();
        session.start().unwrap();
        probe.pump(1);
        probe.inject_xrun(0);
        probe.pump(1);
        let result = session.stop().unwrap();

        assert_eq!(result.metadata.xruns, 1);
        assert_eq!(session.buffers_received(), 2);
        fs::remove_dir_all(result.file_path.parent().unwrap()).ok();
    }

    #[test]
    fn full_ring_drops_whole_buffers_without_blocking() {
        let format = config(true, BufferAccess::Raw).format;
        let capture = Arc::new(CaptureContext::new(BufferAccess::Raw, 10));
        let first = [1u8; 6];
        let second = [2u8; 6];

        for data in [&first, &second] {
            let mut ctx = StreamContext {
                format: &format,
                max_frames: 1,
                interleaved: true,
                safe: None,
            };
            let mut buffer = Buffer::new(1, Some(InputData::Interleaved(data)), None);
            capture_buffer(&mut ctx, &mut buffer, &capture).unwrap();
        }
        assert_eq!(capture.dropped.load(Ordering::Relaxed), 6);

        // Held producer lock: the callback drops instead of waiting.
        let held = capture.producer.lock();
        let mut ctx = StreamContext {
            format: &format,
            max_frames: 1,
            interleaved: true,
            safe: None,
        };
        let mut buffer = Buffer::new(1, Some(InputData::Interleaved(&second)), None);
        capture_buffer(&mut ctx, &mut buffer, &capture).unwrap();
        drop(held);
        assert_eq!(capture.dropped.load(Ordering::Relaxed), 12);
        assert_eq!(capture.buffers.load(Ordering::Relaxed), 3);

        let mut drain = capture.drain.lock();
        let Drain { ring, chunk } = &mut *drain;
        ring.drain_into(chunk);
        assert_eq!(chunk.as_slice(), &first);
    }

    #[test]
    fn transitions_are_enforced() {
        let (device, _probe) = device(stereo_mic());
        let mut session = CaptureSession::new(config(true, BufferAccess::Raw)).unwrap();
        assert!(session.start().is_err());
        assert!(session.stop().is_err());

        session.open(&device).unwrap();
        assert!(session.open(&device).is_err());
        assert!(session.stop().is_err());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = config(true, BufferAccess::Raw);
        config.file_prefix.clear();
        assert!(matches!(
            CaptureSession::new(config),
            Err(AudioError::ConfigurationFailed(_))
        ));
    }

    #[test]
    fn device_default_buffer_size_is_used() {
        let (device, probe) = device(stereo_mic());
        let mut config = config(true, BufferAccess::Raw);
        config.buffer_size_ms = None;
        let mut session = CaptureSession::new(config).unwrap();
        session.open(&device).unwrap();
        session.start().unwrap();
        probe.pump(1);
        let result = session.stop().unwrap();

        // 10 ms at 44.1 kHz
        assert_eq!(result.frames, 441);
        fs::remove_dir_all(result.file_path.parent().unwrap()).ok();
    }
}
