use std::sync::Arc;
use std::time::Duration;

use crate::models::buffer::Buffer;
use crate::models::caps::{DeviceCaps, EnumFlags, ServiceCaps};
use crate::models::enums::{Cause, System};
use crate::models::error::Fault;
use crate::models::format::{BufferSizeRange, Format, Latency, Mix};

/// One driver system (ALSA, WASAPI, the simulated driver, ...).
///
/// Implemented by platform backends. Every fallible call reports a raw
/// [`Fault`]; the host layer turns it into an `AudioError` with the help of
/// [`ServiceBackend::describe_fault`].
pub trait ServiceBackend: Send + Sync {
    fn system(&self) -> System;

    fn capabilities(&self) -> ServiceCaps;

    fn open_device_list(&self, flags: EnumFlags) -> Result<Box<dyn DeviceListBackend>, Fault>;

    /// Id of the default input or output device, if the system has one.
    fn default_device_id(&self, output: bool) -> Result<Option<String>, Fault>;

    fn open_device(&self, id: &str) -> Result<Box<dyn DeviceBackend>, Fault>;

    /// Classify a fault and look up its human-readable text.
    fn describe_fault(&self, fault: Fault) -> (Cause, Option<String>);
}

/// Snapshot of the devices visible to a service.
pub trait DeviceListBackend: Send {
    fn count(&self) -> usize;

    fn id(&self, index: usize) -> Result<String, Fault>;

    fn name(&self, id: &str) -> Result<String, Fault>;

    fn capabilities(&self, id: &str) -> Result<DeviceCaps, Fault>;
}

/// An opened device.
///
/// Queries may perform driver I/O and must not be called from the
/// real-time thread.
pub trait DeviceBackend: Send {
    fn name(&self) -> Result<String, Fault>;

    /// The device's current mix, if it has a preferred one.
    fn mix(&self) -> Result<Option<Mix>, Fault>;

    fn channel_count(&self, output: bool) -> Result<usize, Fault>;

    fn channel_name(&self, output: bool, index: usize) -> Result<String, Fault>;

    fn supports_access(&self, interleaved: bool) -> Result<bool, Fault>;

    fn supports_format(&self, format: &Format) -> Result<bool, Fault>;

    fn buffer_size_range(&self, format: &Format) -> Result<BufferSizeRange, Fault>;

    /// Allocate a native stream delivering buffers to `sink`.
    ///
    /// The driver may start calling `sink` before [`StreamBackend::start`]
    /// (e.g. to prefill output); the sink decides what reaches application
    /// code.
    fn open_stream(
        &self,
        request: &StreamRequest,
        sink: Arc<dyn BufferSink>,
    ) -> Result<Box<dyn StreamBackend>, Fault>;
}

/// Parameters for [`DeviceBackend::open_stream`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamRequest {
    pub format: Format,
    pub buffer_size: Duration,
    pub interleaved: bool,
}

/// A native stream. Dropping it releases the native resources.
pub trait StreamBackend: Send {
    /// Maximum number of frames per delivered buffer.
    fn frames(&self) -> usize;

    fn latency(&self) -> Result<Latency, Fault>;

    fn start(&mut self) -> Result<(), Fault>;

    /// Stop delivery. Must not return while a buffer is being delivered.
    fn stop(&mut self) -> Result<(), Fault>;
}

/// Receiver of driver events. Called from driver-owned threads.
pub trait BufferSink: Send + Sync {
    /// One hardware buffer is ready. Must not block or allocate.
    fn on_buffer(&self, buffer: &mut Buffer<'_>);

    /// The driver dropped or skipped a buffer on device `index`.
    fn on_xrun(&self, index: i32);
}
