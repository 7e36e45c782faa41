//! Application-facing handles: platform, services, device lists, devices.

pub mod device;
pub mod platform;
pub mod service;

use crate::models::error::{AudioError, Fault};
use crate::traits::driver::ServiceBackend;

/// Convert a raw driver fault into an [`AudioError::Driver`] using the
/// owning service's lookup.
pub(crate) fn driver_error(service: &dyn ServiceBackend, fault: Fault) -> AudioError {
    let (cause, text) = service.describe_fault(fault);
    AudioError::Driver {
        system: service.system(),
        fault,
        cause,
        text,
    }
}
