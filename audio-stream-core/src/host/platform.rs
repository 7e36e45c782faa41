use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::service::Service;
use crate::models::enums::{Setup, System};
use crate::models::error::{split_error_code, AudioError};
use crate::traits::driver::ServiceBackend;

/// Root handle: the set of driver services available to this process.
pub struct Platform {
    id: String,
    services: BTreeMap<System, Arc<dyn ServiceBackend>>,
    setups: HashMap<Setup, System>,
}

impl Platform {
    pub fn builder(id: impl Into<String>) -> PlatformBuilder {
        PlatformBuilder {
            id: id.into(),
            services: Vec::new(),
            setups: HashMap::new(),
        }
    }

    /// Application id given at construction.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Systems with a registered service, in a stable order.
    pub fn systems(&self) -> Vec<System> {
        self.services.keys().copied().collect()
    }

    /// The system used for `setup`: an explicit override, or the default
    /// for the target OS.
    pub fn setup_to_system(&self, setup: Setup) -> System {
        self.setups.get(&setup).copied().unwrap_or_else(|| default_system(setup))
    }

    /// The service for `system`, or `None` when no such driver is
    /// available. Absence is normal and callers should skip the system.
    pub fn service(&self, system: System) -> Option<Service> {
        self.services.get(&system).map(|backend| Service::new(Arc::clone(backend)))
    }

    /// Describe a combined native error code (see
    /// [`AudioError::native_code`]). `None` when the code does not name a
    /// fault of a registered service.
    pub fn error_info(&self, code: u64) -> Option<AudioError> {
        let (system, fault) = split_error_code(code)?;
        self.service(system).map(|service| service.error_info(fault))
    }
}

/// Builder for [`Platform`].
pub struct PlatformBuilder {
    id: String,
    services: Vec<Arc<dyn ServiceBackend>>,
    setups: HashMap<Setup, System>,
}

impl PlatformBuilder {
    pub fn with_service(mut self, service: Arc<dyn ServiceBackend>) -> Self {
        self.services.push(service);
        self
    }

    /// Map `setup` to `system` instead of the OS default.
    pub fn with_setup(mut self, setup: Setup, system: System) -> Self {
        self.setups.insert(setup, system);
        self
    }

    pub fn build(self) -> Platform {
        let mut services = BTreeMap::new();
        for service in self.services {
            let system = service.system();
            if services.insert(system, service).is_some() {
                log::warn!("{} service registered twice, keeping the last one", system);
            }
        }
        log::debug!("platform {} initialized with {} service(s)", self.id, services.len());
        Platform {
            id: self.id,
            services,
            setups: self.setups,
        }
    }
}

/// Default setup mapping for the target OS.
pub fn default_system(setup: Setup) -> System {
    if cfg!(target_os = "linux") {
        match setup {
            Setup::ProAudio => System::Jack,
            Setup::SystemAudio => System::Alsa,
            Setup::ConsumerAudio => System::PulseAudio,
        }
    } else if cfg!(target_os = "windows") {
        match setup {
            Setup::ProAudio => System::Asio,
            Setup::SystemAudio => System::Wasapi,
            Setup::ConsumerAudio => System::DirectSound,
        }
    } else {
        System::Simulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::SimulatedService;

    #[test]
    fn missing_service_is_none() {
        let platform = Platform::builder("test").build();
        assert!(platform.systems().is_empty());
        assert!(platform.service(System::Alsa).is_none());
    }

    #[test]
    fn registered_service_is_found() {
        let platform = Platform::builder("test")
            .with_service(Arc::new(SimulatedService::new(Vec::new())))
            .build();
        assert_eq!(platform.systems(), vec![System::Simulated]);
        assert_eq!(platform.id(), "test");
        let service = platform.service(System::Simulated).unwrap();
        assert_eq!(service.system(), System::Simulated);
    }

    #[test]
    fn native_error_code_is_described_by_its_service() {
        let platform = Platform::builder("test")
            .with_service(Arc::new(SimulatedService::new(Vec::new())))
            .build();
        let service = platform.service(System::Simulated).unwrap();
        let err = service.error_info(crate::backend::simulated::FAULT_BUSY);
        let described = platform.error_info(err.native_code().unwrap()).unwrap();
        assert_eq!(described, err);
        assert!(platform.error_info(crate::models::error::error_code(System::Alsa, 1)).is_none());
    }

    #[test]
    fn setup_override_wins() {
        let platform = Platform::builder("test")
            .with_setup(Setup::ConsumerAudio, System::Simulated)
            .build();
        assert_eq!(platform.setup_to_system(Setup::ConsumerAudio), System::Simulated);
        assert_eq!(platform.setup_to_system(Setup::ProAudio), default_system(Setup::ProAudio));
    }
}
