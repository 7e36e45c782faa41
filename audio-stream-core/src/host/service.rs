use std::fmt;
use std::sync::Arc;

use super::device::{Device, DeviceList};
use super::driver_error;
use crate::models::caps::{EnumFlags, ServiceCaps};
use crate::models::enums::System;
use crate::models::error::{AudioError, Fault};
use crate::stream::aggregate::{self, AggregateStreamParams};
use crate::stream::Stream;
use crate::traits::driver::ServiceBackend;

/// One driver system, as seen by the application.
#[derive(Clone)]
pub struct Service {
    backend: Arc<dyn ServiceBackend>,
}

impl Service {
    pub(crate) fn new(backend: Arc<dyn ServiceBackend>) -> Self {
        Self { backend }
    }

    pub fn system(&self) -> System {
        self.backend.system()
    }

    pub fn capabilities(&self) -> ServiceCaps {
        self.backend.capabilities()
    }

    pub fn open_device_list(&self, flags: EnumFlags) -> Result<DeviceList, AudioError> {
        let list = self.backend.open_device_list(flags).map_err(|f| self.error_info(f))?;
        Ok(DeviceList::new(list, Arc::clone(&self.backend)))
    }

    pub fn default_device_id(&self, output: bool) -> Result<Option<String>, AudioError> {
        self.backend.default_device_id(output).map_err(|f| self.error_info(f))
    }

    pub fn open_device(&self, id: &str) -> Result<Device, AudioError> {
        let backend = self.backend.open_device(id).map_err(|f| self.error_info(f))?;
        log::debug!("{} device opened: {}", self.system(), id);
        Ok(Device::new(id.to_string(), backend, Arc::clone(&self.backend)))
    }

    /// Open the default input or output device; `None` when the system has
    /// no default.
    pub fn open_default_device(&self, output: bool) -> Result<Option<Device>, AudioError> {
        match self.default_device_id(output)? {
            Some(id) => self.open_device(&id).map(Some),
            None => Ok(None),
        }
    }

    /// Open one stream over several devices of this service. Channels of
    /// the aggregate are the members' channels in device order; the master
    /// member's clock drives the callback.
    pub fn aggregate_stream<U: Send + Sync + 'static>(
        &self,
        params: AggregateStreamParams<'_, U>,
        user: U,
    ) -> Result<Stream, AudioError> {
        aggregate::open(&self.backend, params, user)
    }

    /// Structured error for a raw fault of this service, including the
    /// driver's description.
    pub fn error_info(&self, fault: Fault) -> AudioError {
        driver_error(self.backend.as_ref(), fault)
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service").field("system", &self.system()).finish()
    }
}
