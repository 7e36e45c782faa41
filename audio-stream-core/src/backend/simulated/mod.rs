//! In-process simulated driver.
//!
//! Behaves like a native service: devices with fixed capabilities, streams
//! that deliver buffers from their own clock thread (or on demand through a
//! [`SimulatedProbe`]), numeric faults with a text lookup. Input channels
//! carry [`input_signal`]; everything written to output channels is
//! recorded per hardware channel.

pub mod device;
pub mod stream;

use std::sync::Arc;

pub use device::{SimulatedClock, SimulatedDeviceSpec};
pub use stream::{input_signal, SimulatedProbe};

use self::device::{DeviceState, SimulatedDevice, SimulatedDeviceList};
use crate::models::caps::{EnumFlags, ServiceCaps};
use crate::models::enums::{Cause, System};
use crate::models::error::Fault;
use crate::traits::driver::{DeviceBackend, DeviceListBackend, ServiceBackend};

pub const FAULT_NOT_FOUND: Fault = 1;
pub const FAULT_BUSY: Fault = 2;
pub const FAULT_FORMAT: Fault = 3;
pub const FAULT_DISCONNECTED: Fault = 4;
pub const FAULT_INVALID_ARGUMENT: Fault = 5;
pub const FAULT_THREAD: Fault = 6;

/// The simulated driver system.
#[derive(Debug)]
pub struct SimulatedService {
    devices: Vec<Arc<DeviceState>>,
    capabilities: ServiceCaps,
}

impl SimulatedService {
    pub fn new(devices: Vec<SimulatedDeviceSpec>) -> Self {
        Self {
            devices: devices.into_iter().map(|spec| Arc::new(DeviceState::new(spec))).collect(),
            capabilities: ServiceCaps::TIME
                | ServiceCaps::LATENCY
                | ServiceCaps::FULL_DUPLEX
                | ServiceCaps::CHANNEL_MASK
                | ServiceCaps::XRUN_DETECTION,
        }
    }

    pub fn with_capabilities(mut self, capabilities: ServiceCaps) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl ServiceBackend for SimulatedService {
    fn system(&self) -> System {
        System::Simulated
    }

    fn capabilities(&self) -> ServiceCaps {
        self.capabilities
    }

    fn open_device_list(&self, flags: EnumFlags) -> Result<Box<dyn DeviceListBackend>, Fault> {
        if flags.is_empty() {
            return Err(FAULT_INVALID_ARGUMENT);
        }
        let entries = self.devices.iter().filter(|d| d.spec.matches(flags)).cloned().collect();
        Ok(Box::new(SimulatedDeviceList::new(entries)))
    }

    fn default_device_id(&self, output: bool) -> Result<Option<String>, Fault> {
        Ok(self
            .devices
            .iter()
            .map(|d| &d.spec)
            .find(|spec| if output { spec.default_output } else { spec.default_input })
            .map(|spec| spec.id.clone()))
    }

    fn open_device(&self, id: &str) -> Result<Box<dyn DeviceBackend>, Fault> {
        self.devices
            .iter()
            .find(|d| d.spec.id == id)
            .map(|d| Box::new(SimulatedDevice::new(Arc::clone(d))) as Box<dyn DeviceBackend>)
            .ok_or(FAULT_NOT_FOUND)
    }

    fn describe_fault(&self, fault: Fault) -> (Cause, Option<String>) {
        let (cause, text) = match fault {
            FAULT_NOT_FOUND => (Cause::Endpoint, "device not found"),
            FAULT_BUSY => (Cause::Endpoint, "device is in use by another stream"),
            FAULT_FORMAT => (Cause::Format, "format not supported"),
            FAULT_DISCONNECTED => (Cause::Endpoint, "device disconnected"),
            FAULT_INVALID_ARGUMENT => (Cause::Generic, "invalid argument"),
            FAULT_THREAD => (Cause::Service, "could not start the clock thread"),
            _ => return (Cause::Unknown, None),
        };
        (cause, Some(text.to_string()))
    }
}
