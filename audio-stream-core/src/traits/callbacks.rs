use std::sync::Arc;
use std::time::Duration;

use crate::models::buffer::Buffer;
use crate::models::error::AudioError;
use crate::models::format::Format;
use crate::stream::StreamContext;

/// Data callback, invoked once per hardware buffer on the real-time thread.
///
/// It must not block, allocate or perform I/O. Returning an error silences
/// the stream until it is stopped and started again.
pub type OnBuffer<U> =
    Arc<dyn Fn(&mut StreamContext<'_>, &mut Buffer<'_>, &U) -> Result<(), AudioError> + Send + Sync + 'static>;

/// Xrun handler. Informational only; may run on a different thread than the
/// data callback, concurrently with it.
pub type OnXRun<U> = Arc<dyn Fn(i32, &U) + Send + Sync + 'static>;

/// Running-state notification: `(running, error)`. Reported on start, stop,
/// and when a callback failure silences the stream.
pub type OnRunning<U> = Arc<dyn Fn(bool, Option<&AudioError>, &U) + Send + Sync + 'static>;

/// Callbacks and layout for a stream. Immutable once the stream is open.
pub struct StreamParams<U> {
    pub interleaved: bool,
    pub on_buffer: OnBuffer<U>,
    pub on_xrun: Option<OnXRun<U>>,
    pub on_running: Option<OnRunning<U>>,
}

impl<U: Send + Sync + 'static> StreamParams<U> {
    pub fn new<F>(interleaved: bool, on_buffer: F) -> Self
    where
        F: Fn(&mut StreamContext<'_>, &mut Buffer<'_>, &U) -> Result<(), AudioError> + Send + Sync + 'static,
    {
        Self {
            interleaved,
            on_buffer: Arc::new(on_buffer),
            on_xrun: None,
            on_running: None,
        }
    }

    pub fn with_xrun<F>(mut self, on_xrun: F) -> Self
    where
        F: Fn(i32, &U) + Send + Sync + 'static,
    {
        self.on_xrun = Some(Arc::new(on_xrun));
        self
    }

    pub fn with_running<F>(mut self, on_running: F) -> Self
    where
        F: Fn(bool, Option<&AudioError>, &U) + Send + Sync + 'static,
    {
        self.on_running = Some(Arc::new(on_running));
        self
    }
}

impl<U> Clone for StreamParams<U> {
    fn clone(&self) -> Self {
        Self {
            interleaved: self.interleaved,
            on_buffer: Arc::clone(&self.on_buffer),
            on_xrun: self.on_xrun.clone(),
            on_running: self.on_running.clone(),
        }
    }
}

/// Everything needed to open a stream on a single device.
pub struct DeviceStreamParams<U> {
    pub stream: StreamParams<U>,
    pub format: Format,
    /// Requested buffer duration, normally the `current` value of the
    /// device's buffer size range.
    pub buffer_size: Duration,
}

impl<U> DeviceStreamParams<U> {
    pub fn new(stream: StreamParams<U>, format: Format, buffer_size: Duration) -> Self {
        Self {
            stream,
            format,
            buffer_size,
        }
    }
}
