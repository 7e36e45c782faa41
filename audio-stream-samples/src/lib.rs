//! Shared pieces of the sample programs.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atomic_float::AtomicF64;

use audio_stream_core::{
    Platform, SampleType, Setup, SimulatedClock, SimulatedDeviceSpec, SimulatedService, System,
};

pub const APP_ID: &str = "audio-stream-samples";

/// Devices of the simulated driver used by the samples: a duplex
/// interface, a stereo microphone and a four-channel speaker set, all
/// clocked in real time.
pub fn simulated_devices() -> Vec<SimulatedDeviceSpec> {
    vec![
        SimulatedDeviceSpec::new("sim-interface", "Simulated Interface")
            .with_channels(2, 2)
            .with_clock(SimulatedClock::RealTime),
        SimulatedDeviceSpec::new("sim-mic", "Simulated Microphone")
            .with_channels(2, 0)
            .with_samples(&[SampleType::Int16, SampleType::Int24, SampleType::Float32])
            .as_default(true, false)
            .with_clock(SimulatedClock::RealTime),
        SimulatedDeviceSpec::new("sim-speakers", "Simulated Speakers")
            .with_channels(0, 4)
            .with_buffer_range(Duration::from_millis(2), Duration::from_millis(50), Duration::from_millis(10))
            .as_default(false, true)
            .with_clock(SimulatedClock::RealTime),
    ]
}

/// A platform with only the simulated service, mapped to every setup.
pub fn simulated_platform(devices: Vec<SimulatedDeviceSpec>) -> Platform {
    Setup::ALL
        .into_iter()
        .fold(Platform::builder(APP_ID), |builder, setup| builder.with_setup(setup, System::Simulated))
        .with_service(Arc::new(SimulatedService::new(devices)))
        .build()
}

/// Sine generator used as a stream's user context.
///
/// The phase is atomic so the context can be shared by the data callback
/// and the xrun handler without a lock.
#[derive(Debug)]
pub struct SineOscillator {
    frequency: f64,
    rate: f64,
    amplitude: f64,
    phase: AtomicF64,
    xruns: AtomicU64,
}

impl SineOscillator {
    pub fn new(frequency: f64, rate: u32, amplitude: f64) -> Self {
        Self {
            frequency,
            rate: rate as f64,
            amplitude,
            phase: AtomicF64::new(0.0),
            xruns: AtomicU64::new(0),
        }
    }

    /// Next sample. Only the data callback advances the phase.
    pub fn next_sample(&self) -> f64 {
        let mut phase = self.phase.load(Ordering::Relaxed) + self.frequency / self.rate;
        if phase >= 1.0 {
            phase -= 1.0;
        }
        self.phase.store(phase, Ordering::Relaxed);
        self.amplitude * (TAU * phase).sin()
    }

    pub fn phase(&self) -> f64 {
        self.phase.load(Ordering::Relaxed)
    }

    pub fn record_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn xruns(&self) -> u64 {
        self.xruns.load(Ordering::Relaxed)
    }
}

/// Largest absolute sample value.
pub fn peak(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0, |peak: f64, s| peak.max(s.abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn oscillator_wraps_phase() {
        let osc = SineOscillator::new(11025.0, 44100, 1.0);
        assert_relative_eq!(osc.next_sample(), 1.0);
        assert_relative_eq!(osc.next_sample(), 0.0, epsilon = 1e-12);
        osc.next_sample();
        osc.next_sample();
        assert!(osc.phase() < 1.0);
        assert_relative_eq!(osc.phase(), 0.0);
    }

    #[test]
    fn oscillator_counts_xruns() {
        let osc = SineOscillator::new(440.0, 48000, 0.5);
        osc.record_xrun();
        osc.record_xrun();
        assert_eq!(osc.xruns(), 2);
    }

    #[test]
    fn platform_maps_every_setup_to_simulated() {
        let platform = simulated_platform(simulated_devices());
        for setup in Setup::ALL {
            assert_eq!(platform.setup_to_system(setup), System::Simulated);
        }
        let service = platform.service(System::Simulated).unwrap();
        assert_eq!(service.default_device_id(true).unwrap().as_deref(), Some("sim-speakers"));
    }

    #[test]
    fn peak_of_signed_samples() {
        assert_relative_eq!(peak(&[0.1, -0.7, 0.3]), 0.7);
        assert_relative_eq!(peak(&[]), 0.0);
    }
}
