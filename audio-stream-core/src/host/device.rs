use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::driver_error;
use crate::models::caps::DeviceCaps;
use crate::models::enums::System;
use crate::models::error::{AudioError, Fault};
use crate::models::format::{BufferSizeRange, Format, Mix};
use crate::stream::dispatch::Dispatcher;
use crate::stream::Stream;
use crate::traits::callbacks::DeviceStreamParams;
use crate::traits::driver::{BufferSink, DeviceBackend, DeviceListBackend, ServiceBackend, StreamBackend, StreamRequest};

/// Snapshot of the devices of one service.
pub struct DeviceList {
    backend: Box<dyn DeviceListBackend>,
    service: Arc<dyn ServiceBackend>,
}

impl DeviceList {
    pub(crate) fn new(backend: Box<dyn DeviceListBackend>, service: Arc<dyn ServiceBackend>) -> Self {
        Self { backend, service }
    }

    pub fn count(&self) -> usize {
        self.backend.count()
    }

    pub fn id(&self, index: usize) -> Result<String, AudioError> {
        if index >= self.count() {
            return Err(AudioError::DeviceNotFound(format!("index {index} of {}", self.count())));
        }
        self.backend.id(index).map_err(|f| self.fault(f))
    }

    pub fn ids(&self) -> Result<Vec<String>, AudioError> {
        (0..self.count()).map(|i| self.id(i)).collect()
    }

    pub fn name(&self, id: &str) -> Result<String, AudioError> {
        self.backend.name(id).map_err(|f| self.fault(f))
    }

    pub fn capabilities(&self, id: &str) -> Result<DeviceCaps, AudioError> {
        self.backend.capabilities(id).map_err(|f| self.fault(f))
    }

    fn fault(&self, fault: Fault) -> AudioError {
        driver_error(self.service.as_ref(), fault)
    }
}

/// An open device. Streams are opened from here.
pub struct Device {
    id: String,
    backend: Box<dyn DeviceBackend>,
    service: Arc<dyn ServiceBackend>,
}

impl Device {
    pub(crate) fn new(id: String, backend: Box<dyn DeviceBackend>, service: Arc<dyn ServiceBackend>) -> Self {
        Self { id, backend, service }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn system(&self) -> System {
        self.service.system()
    }

    pub fn name(&self) -> Result<String, AudioError> {
        self.backend.name().map_err(|f| self.fault(f))
    }

    pub fn mix(&self) -> Result<Option<Mix>, AudioError> {
        self.backend.mix().map_err(|f| self.fault(f))
    }

    pub fn channel_count(&self, output: bool) -> Result<usize, AudioError> {
        self.backend.channel_count(output).map_err(|f| self.fault(f))
    }

    pub fn channel_name(&self, output: bool, index: usize) -> Result<String, AudioError> {
        self.backend.channel_name(output, index).map_err(|f| self.fault(f))
    }

    pub fn supports_access(&self, interleaved: bool) -> Result<bool, AudioError> {
        self.backend.supports_access(interleaved).map_err(|f| self.fault(f))
    }

    /// Whether the device can open a stream with `format`. A structurally
    /// invalid format is reported as unsupported.
    pub fn supports_format(&self, format: &Format) -> Result<bool, AudioError> {
        if let Err(e) = format.validate() {
            log::debug!("{}: rejecting invalid format {}: {}", self.id, format, e);
            return Ok(false);
        }
        self.backend.supports_format(format).map_err(|f| self.fault(f))
    }

    /// Legal buffer durations for `format`.
    pub fn buffer_size_range(&self, format: &Format) -> Result<BufferSizeRange, AudioError> {
        let range = self.backend.buffer_size_range(format).map_err(|f| self.fault(f))?;
        if !range.is_valid() {
            return Err(AudioError::ConfigurationFailed(format!(
                "driver reported buffer range {:?}..{:?} with current {:?}",
                range.min, range.max, range.current
            )));
        }
        Ok(range)
    }

    /// Open a stream with the given callbacks and user context.
    ///
    /// Fails without touching the driver when the format is invalid or
    /// unsupported, or when the requested layout is not available; the
    /// device stays usable either way.
    pub fn open_stream<U: Send + Sync + 'static>(
        &self,
        params: DeviceStreamParams<U>,
        user: U,
    ) -> Result<Stream, AudioError> {
        let format = params.format;
        let interleaved = params.stream.interleaved;
        self.check_stream(&format, interleaved)?;

        let dispatcher = Arc::new(Dispatcher::new(format, params.stream, user));
        let sink: Arc<dyn BufferSink> = dispatcher.clone();
        let backend = self.open_backend(format, params.buffer_size, interleaved, sink)?;
        Ok(Stream::new(Arc::clone(&self.service), dispatcher, backend, format))
    }

    /// Checks done before the driver is asked for a stream.
    pub(crate) fn check_stream(&self, format: &Format, interleaved: bool) -> Result<(), AudioError> {
        format.validate()?;
        if !self.supports_format(format)? {
            return Err(AudioError::UnsupportedFormat(format!("{} is not supported by {}", format, self.id)));
        }
        if !self.supports_access(interleaved)? {
            return Err(AudioError::UnsupportedAccess { interleaved });
        }
        Ok(())
    }

    /// Open a native stream feeding `sink`. Callers run [`Self::check_stream`]
    /// first.
    pub(crate) fn open_backend(
        &self,
        format: Format,
        buffer_size: Duration,
        interleaved: bool,
        sink: Arc<dyn BufferSink>,
    ) -> Result<Box<dyn StreamBackend>, AudioError> {
        let request = StreamRequest {
            format,
            buffer_size,
            interleaved,
        };
        self.backend.open_stream(&request, sink).map_err(|f| self.fault(f))
    }

    fn fault(&self, fault: Fault) -> AudioError {
        driver_error(self.service.as_ref(), fault)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("system", &self.service.system())
            .field("id", &self.id)
            .finish()
    }
}
