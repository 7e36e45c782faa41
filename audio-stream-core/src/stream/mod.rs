//! Stream lifecycle and the real-time buffer path.

pub mod aggregate;
pub(crate) mod dispatch;
pub mod safe_buffer;
pub mod views;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use self::dispatch::Dispatcher;
use self::safe_buffer::{SafeBuffer, SafeBufferRegistration};
use crate::models::diagnostics::StreamDiagnostics;
use crate::models::error::{AudioError, Fault, ProtocolViolation};
use crate::models::format::{Format, Latency};
use crate::models::state::StreamState;
use crate::traits::driver::{ServiceBackend, StreamBackend};

/// What the data callback can see of its stream.
///
/// The callback never gets the [`Stream`] itself, so it cannot start, stop
/// or close it.
pub struct StreamContext<'a> {
    pub(crate) format: &'a Format,
    pub(crate) max_frames: usize,
    pub(crate) interleaved: bool,
    pub(crate) safe: Option<&'a mut SafeBuffer>,
}

impl StreamContext<'_> {
    pub fn format(&self) -> &Format {
        self.format
    }

    /// Largest buffer the driver will deliver, in frames.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Native layout of the buffers the driver delivers.
    pub fn is_interleaved(&self) -> bool {
        self.interleaved
    }

    /// The registered safe buffer, if any.
    pub fn safe_buffer(&mut self) -> Option<&mut SafeBuffer> {
        self.safe.as_deref_mut()
    }
}

struct StreamInner {
    state: StreamState,
    backend: Option<Box<dyn StreamBackend>>,
}

/// An open stream on a device.
///
/// State transitions:
/// ```text
/// opened → running ⇄ stopped → closed
/// ```
/// `start` on a running stream and `stop` on a stream that is not running
/// fail with `InvalidState`. `close` refuses a running stream and a stream
/// that still has a safe buffer registered; closing twice is a no-op.
/// Dropping an open stream stops and closes it.
pub struct Stream {
    service: Arc<dyn ServiceBackend>,
    dispatcher: Arc<Dispatcher>,
    inner: Mutex<StreamInner>,
    format: Format,
    frames: usize,
}

impl Stream {
    pub(crate) fn new(
        service: Arc<dyn ServiceBackend>,
        dispatcher: Arc<Dispatcher>,
        backend: Box<dyn StreamBackend>,
        format: Format,
    ) -> Self {
        let frames = backend.frames();
        dispatcher.set_frames(frames);
        log::debug!("{} stream opened: {} ({} frames)", service.system(), format, frames);
        Self {
            service,
            dispatcher,
            inner: Mutex::new(StreamInner {
                state: StreamState::Opened,
                backend: Some(backend),
            }),
            format,
            frames,
        }
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    /// Maximum frames per buffer, as chosen by the driver.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_interleaved(&self) -> bool {
        self.dispatcher.interleaved()
    }

    pub fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    /// True while buffers reach the application callback. Turns false when
    /// the stream is stopped or a callback failed.
    pub fn is_running(&self) -> bool {
        self.dispatcher.is_running()
    }

    pub fn diagnostics(&self) -> StreamDiagnostics {
        self.dispatcher.diagnostics()
    }

    pub fn latency(&self) -> Result<Latency, AudioError> {
        let inner = self.inner.lock();
        match inner.backend.as_ref() {
            Some(backend) => backend.latency().map_err(|fault| self.driver_error(fault)),
            None => Err(AudioError::InvalidState {
                operation: "query the latency of",
                state: inner.state,
            }),
        }
    }

    /// Start delivering buffers to the callback. The callback is not called
    /// before the gate opens as the last step of this call.
    pub fn start(&self) -> Result<(), AudioError> {
        let mut inner = self.inner.lock();
        if !inner.state.can_start() {
            return Err(AudioError::InvalidState {
                operation: "start",
                state: inner.state,
            });
        }
        if let Some(backend) = inner.backend.as_mut() {
            backend.start().map_err(|fault| self.driver_error(fault))?;
        }
        inner.state = StreamState::Running;
        self.dispatcher.open_gate();
        log::debug!("stream started");
        self.dispatcher.notify_running(true, None);
        Ok(())
    }

    /// Stop delivering buffers. When this returns no callback is running
    /// and none will run until the next `start`.
    pub fn stop(&self) -> Result<(), AudioError> {
        let mut inner = self.inner.lock();
        if inner.state != StreamState::Running {
            return Err(AudioError::InvalidState {
                operation: "stop",
                state: inner.state,
            });
        }
        let result = self.halt(&mut inner);
        inner.state = StreamState::Stopped;
        log::debug!("stream stopped");
        self.dispatcher.notify_running(false, None);
        result.map_err(|fault| self.driver_error(fault))
    }

    /// Release the native stream. Terminal.
    pub fn close(&self) -> Result<(), AudioError> {
        let mut inner = self.inner.lock();
        match inner.state {
            StreamState::Closed => return Ok(()),
            StreamState::Running => {
                return Err(AudioError::InvalidState {
                    operation: "close",
                    state: inner.state,
                })
            }
            StreamState::Opened | StreamState::Stopped => {}
        }
        if self.dispatcher.has_safe_buffer() {
            self.dispatcher.record_violation(ProtocolViolation::SafeBufferStillRegistered);
            return Err(ProtocolViolation::SafeBufferStillRegistered.into());
        }
        inner.backend = None;
        inner.state = StreamState::Closed;
        log::debug!("stream closed");
        Ok(())
    }

    /// Attach a [`SafeBuffer`] presenting buffers in the given layout.
    ///
    /// Only allowed while the stream is not running. The returned
    /// registration must be dropped before the stream is closed.
    pub fn register_safe_buffer(&self, interleaved: bool) -> Result<SafeBufferRegistration, AudioError> {
        let inner = self.inner.lock();
        if matches!(inner.state, StreamState::Running | StreamState::Closed) {
            return Err(AudioError::InvalidState {
                operation: "register a safe buffer on",
                state: inner.state,
            });
        }
        let slot = self.dispatcher.safe_slot();
        let mut guard = slot.lock();
        if guard.is_some() {
            return Err(AudioError::SafeBufferRegistered);
        }
        *guard = Some(SafeBuffer::new(self.format, self.frames, interleaved));
        Ok(SafeBufferRegistration::new(Arc::clone(slot)))
    }

    fn halt(&self, inner: &mut StreamInner) -> Result<(), Fault> {
        self.dispatcher.close_gate();
        match inner.backend.as_mut() {
            Some(backend) => backend.stop(),
            None => Ok(()),
        }
    }

    fn driver_error(&self, fault: Fault) -> AudioError {
        crate::host::driver_error(self.service.as_ref(), fault)
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("system", &self.service.system())
            .field("format", &self.format)
            .field("frames", &self.frames)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.state == StreamState::Running {
            if let Err(fault) = self.halt(&mut inner) {
                log::warn!("failed to stop stream on drop: fault {}", fault);
            }
        }
        if inner.state != StreamState::Closed {
            inner.backend = None;
            inner.state = StreamState::Closed;
            log::debug!("stream closed on drop");
        }
    }
}
